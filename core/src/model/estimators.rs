//! Estimator implementations backing model artifacts
//!
//! Trees and support vector machines are linfa models stored as-is through
//! their serde support. The MLP is a plain forward pass over `ndarray`
//! weights.

use linfa::dataset::Pr;
use linfa::prelude::Predict;
use linfa_svm::Svm;
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Label-index prediction over a projected feature matrix.
pub trait Classifier: Send + Sync {
    fn n_classes(&self) -> usize;

    /// Predicted class index per row, indexing the artifact's class labels.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<usize>;
}

/// Classifiers that can also estimate class probabilities.
pub trait ProbabilisticClassifier: Classifier {
    /// `(rows × classes)` probabilities; each row sums to one.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64>;
}

/// Serialized estimator variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    RandomForest(RandomForest),
    DecisionTree(TreeClassifier),
    LinearSvm(LinearSvm),
    Mlp(Mlp),
}

impl Estimator {
    pub fn kind(&self) -> &'static str {
        match self {
            Estimator::RandomForest(_) => "random_forest",
            Estimator::DecisionTree(_) => "decision_tree",
            Estimator::LinearSvm(_) => "linear_svm",
            Estimator::Mlp(_) => "mlp",
        }
    }

    /// Whether the stored model allows probability estimation. A single
    /// tree only yields hard labels.
    pub fn can_estimate_probability(&self) -> bool {
        !matches!(self, Estimator::DecisionTree(_))
    }

    /// Check internal shape consistency against the artifact contract.
    pub fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        match self {
            Estimator::RandomForest(forest) => forest.validate(n_features, n_classes),
            Estimator::DecisionTree(tree) => {
                check_dims("decision tree", (tree.n_features, tree.n_classes), n_features, n_classes)
            }
            Estimator::LinearSvm(svm) => svm.validate(n_features, n_classes),
            Estimator::Mlp(mlp) => mlp.validate(n_features, n_classes),
        }
    }
}

fn check_dims(
    what: &str,
    declared: (usize, usize),
    n_features: usize,
    n_classes: usize,
) -> Result<(), String> {
    if declared != (n_features, n_classes) {
        return Err(format!(
            "{what} expects {}x{} features/classes, artifact declares {n_features}x{n_classes}",
            declared.0, declared.1
        ));
    }
    Ok(())
}

fn argmax(row: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    for (idx, value) in row.iter().enumerate() {
        if *value > row[best] {
            best = idx;
        }
    }
    best
}

fn argmax_rows(scores: &Array2<f64>) -> Array1<usize> {
    scores.axis_iter(Axis(0)).map(argmax).collect()
}

fn normalize_rows(scores: &mut Array2<f64>) {
    for mut row in scores.axis_iter_mut(Axis(0)) {
        let total: f64 = row.sum();
        if total > 0.0 {
            row.mapv_inplace(|p| p / total);
        } else {
            let uniform = 1.0 / row.len() as f64;
            row.fill(uniform);
        }
    }
}

// ---------------------------------------------------------------------------
// Trees
// ---------------------------------------------------------------------------

/// One fitted linfa tree; predicts hard labels only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeClassifier {
    pub n_features: usize,
    pub n_classes: usize,
    pub tree: DecisionTree<f64, usize>,
}

impl Classifier for TreeClassifier {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<usize> {
        self.tree.predict(&x)
    }
}

/// Ensemble of linfa trees. Class probabilities are the share of trees
/// voting for each class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub n_classes: usize,
    pub trees: Vec<DecisionTree<f64, usize>>,
}

impl RandomForest {
    fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        check_dims("forest", (self.n_features, self.n_classes), n_features, n_classes)?;
        if self.trees.is_empty() {
            return Err("random forest has no trees".to_string());
        }
        Ok(())
    }

    fn votes(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut votes = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for tree in &self.trees {
            let predicted: Array1<usize> = tree.predict(&x);
            for (mut row, class) in votes.axis_iter_mut(Axis(0)).zip(predicted.iter()) {
                // A leaf label outside the class list casts no vote.
                if let Some(slot) = row.get_mut(*class) {
                    *slot += 1.0;
                }
            }
        }
        votes
    }
}

impl Classifier for RandomForest {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<usize> {
        argmax_rows(&self.votes(x))
    }
}

impl ProbabilisticClassifier for RandomForest {
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut proba = self.votes(x);
        normalize_rows(&mut proba);
        proba
    }
}

// ---------------------------------------------------------------------------
// Linear SVM
// ---------------------------------------------------------------------------

/// One-vs-rest linfa SVMs, one per class in class-label order. Each machine
/// carries its own Platt calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvm {
    pub n_features: usize,
    pub machines: Vec<Svm<f64, Pr>>,
}

impl LinearSvm {
    /// Calibrated one-vs-rest scores, `(rows × classes)`.
    pub fn class_scores(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut scores = Array2::<f64>::zeros((x.nrows(), self.machines.len()));
        for (machine, mut column) in self.machines.iter().zip(scores.axis_iter_mut(Axis(1))) {
            let positive: Array1<Pr> = machine.predict(&x);
            for (slot, p) in column.iter_mut().zip(positive.iter()) {
                *slot = f64::from(**p);
            }
        }
        scores
    }

    fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        check_dims("svm", (self.n_features, self.machines.len()), n_features, n_classes)
    }
}

impl Classifier for LinearSvm {
    fn n_classes(&self) -> usize {
        self.machines.len()
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<usize> {
        argmax_rows(&self.class_scores(x))
    }
}

impl ProbabilisticClassifier for LinearSvm {
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut scores = self.class_scores(x);
        normalize_rows(&mut scores);
        scores
    }
}

// ---------------------------------------------------------------------------
// Multi-layer perceptron
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// `(inputs × outputs)`
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

/// Feed-forward network with ReLU hidden layers and a softmax output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mlp {
    pub layers: Vec<DenseLayer>,
}

impl Mlp {
    fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        let mut width = n_features;
        if self.layers.is_empty() {
            return Err("mlp has no layers".to_string());
        }
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.weights.nrows() != width {
                return Err(format!(
                    "layer {idx} takes {} inputs, previous width is {width}",
                    layer.weights.nrows()
                ));
            }
            if layer.bias.len() != layer.weights.ncols() {
                return Err(format!("layer {idx} bias does not match its outputs"));
            }
            width = layer.weights.ncols();
        }
        if width != n_classes {
            return Err(format!("mlp outputs {width} classes, expected {n_classes}"));
        }
        Ok(())
    }

    fn forward(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut activations = x.to_owned();
        let last = self.layers.len().saturating_sub(1);
        for (idx, layer) in self.layers.iter().enumerate() {
            activations = activations.dot(&layer.weights) + &layer.bias;
            if idx < last {
                activations.mapv_inplace(|v| v.max(0.0));
            }
        }
        activations
    }
}

impl Classifier for Mlp {
    fn n_classes(&self) -> usize {
        self.layers.last().map(|l| l.weights.ncols()).unwrap_or(0)
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<usize> {
        argmax_rows(&self.forward(x))
    }
}

impl ProbabilisticClassifier for Mlp {
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut logits = self.forward(x);
        for mut row in logits.axis_iter_mut(Axis(0)) {
            let max = row.fold(f64::NEG_INFINITY, |acc, v| acc.max(*v));
            row.mapv_inplace(|v| (v - max).exp());
        }
        normalize_rows(&mut logits);
        logits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linfa::prelude::{Dataset, Fit};
    use ndarray::array;

    /// Class 0 when `x0` is small, class 1 when it is large; `x1` is noise.
    fn training_set() -> (Array2<f64>, Array1<usize>) {
        let x = array![
            [0.0, 5.0],
            [0.1, 1.0],
            [0.2, 4.0],
            [0.3, 2.0],
            [0.9, 4.5],
            [1.0, 1.5],
            [1.1, 3.0],
            [1.2, 2.5]
        ];
        let y = array![0, 0, 0, 0, 1, 1, 1, 1];
        (x, y)
    }

    fn fit_tree(x: &Array2<f64>, y: &Array1<usize>) -> DecisionTree<f64, usize> {
        let dataset = Dataset::new(x.clone(), y.clone());
        DecisionTree::params()
            .max_depth(Some(3))
            .fit(&dataset)
            .expect("tree should fit")
    }

    fn fit_svm(x: &Array2<f64>, y: &Array1<usize>, n_classes: usize) -> LinearSvm {
        let machines = (0..n_classes)
            .map(|class| {
                let dataset = Dataset::new(x.clone(), y.mapv(|c| c == class));
                Svm::<f64, Pr>::params()
                    .linear_kernel()
                    .fit(&dataset)
                    .expect("svm should fit")
            })
            .collect();
        LinearSvm {
            n_features: x.ncols(),
            machines,
        }
    }

    #[test]
    fn test_forest_votes_become_probabilities() {
        let (x, y) = training_set();
        let tree = fit_tree(&x, &y);
        let forest = RandomForest {
            n_features: 2,
            n_classes: 2,
            trees: vec![tree.clone(), tree.clone(), tree],
        };

        let rows = array![[0.05, 3.0], [1.15, 3.0]];
        assert_eq!(forest.predict(rows.view()), array![0, 1]);
        let proba = forest.predict_proba(rows.view());
        assert_eq!(proba, array![[1.0, 0.0], [0.0, 1.0]]);
    }

    #[test]
    fn test_forest_validation() {
        let (x, y) = training_set();
        let forest = RandomForest {
            n_features: 2,
            n_classes: 2,
            trees: vec![fit_tree(&x, &y)],
        };
        assert!(forest.validate(2, 2).is_ok());
        assert!(forest.validate(3, 2).is_err());

        let empty = RandomForest {
            trees: Vec::new(),
            ..forest
        };
        assert!(empty.validate(2, 2).is_err());
    }

    #[test]
    fn test_single_tree_is_deterministic() {
        let (x, y) = training_set();
        let estimator = Estimator::DecisionTree(TreeClassifier {
            n_features: 2,
            n_classes: 2,
            tree: fit_tree(&x, &y),
        });
        assert!(!estimator.can_estimate_probability());
        assert!(estimator.validate(2, 2).is_ok());
        assert_eq!(estimator.kind(), "decision_tree");
    }

    #[test]
    fn test_svm_one_vs_rest_probabilities() {
        let (x, y) = training_set();
        let svm = fit_svm(&x, &y, 2);
        assert!(svm.validate(2, 2).is_ok());
        assert!(svm.validate(2, 3).is_err());

        let rows = array![[0.0, 3.0], [1.2, 3.0]];
        assert_eq!(svm.predict(rows.view()), array![0, 1]);
        let proba = svm.predict_proba(rows.view());
        for row in proba.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert!(proba[[0, 0]] > proba[[0, 1]]);
        assert!(proba[[1, 1]] > proba[[1, 0]]);
    }

    #[test]
    fn test_fitted_models_survive_serde() {
        let (x, y) = training_set();
        let estimator = Estimator::LinearSvm(fit_svm(&x, &y, 2));
        let json = serde_json::to_string(&estimator).expect("encode");
        let decoded: Estimator = serde_json::from_str(&json).expect("decode");

        let (before, after) = match (&estimator, &decoded) {
            (Estimator::LinearSvm(a), Estimator::LinearSvm(b)) => (a, b),
            _ => panic!("variant changed"),
        };
        assert_eq!(before.predict(x.view()), after.predict(x.view()));
    }

    #[test]
    fn test_mlp_softmax() {
        let mlp = Mlp {
            layers: vec![
                DenseLayer {
                    weights: array![[1.0, -1.0]],
                    bias: array![0.0, 0.0],
                },
                DenseLayer {
                    weights: array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                    bias: array![0.0, 0.0, 0.5],
                },
            ],
        };
        assert!(mlp.validate(1, 3).is_ok());
        assert!(mlp.validate(1, 2).is_err());

        let x = array![[3.0], [-3.0], [0.0]];
        assert_eq!(mlp.predict(x.view()), array![0, 1, 2]);
        let proba = mlp.predict_proba(x.view());
        for row in proba.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }
}
