//! Model artifacts and the estimators behind them

pub mod artifact;
pub mod estimators;

pub use artifact::{
    model_name_from_path, ArtifactEnvelope, ArtifactFormat, Capability, ClassProbabilities,
    ModelArtifact, StandardScaler, ARTIFACT_FORMAT_VERSION,
};
pub use estimators::{
    Classifier, DenseLayer, Estimator, LinearSvm, Mlp, ProbabilisticClassifier, RandomForest,
    TreeClassifier,
};
