//! Score-ranking metrics for one-vs-rest probability columns

use serde::Serialize;

/// One point of a ROC or precision-recall curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub x: f64,
    pub y: f64,
    pub threshold: f64,
}

/// Cumulative true/false positives at each distinct score, highest first.
fn cumulative_counts(y_true: &[bool], scores: &[f64]) -> Vec<(f64, u64, u64)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut out = Vec::new();
    let (mut tp, mut fp) = (0u64, 0u64);
    for (pos, &idx) in order.iter().enumerate() {
        if y_true[idx] {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_group = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[idx]);
        if last_of_group {
            out.push((scores[idx], tp, fp));
        }
    }
    out
}

fn class_counts(y_true: &[bool]) -> (u64, u64) {
    let positives = y_true.iter().filter(|&&t| t).count() as u64;
    (positives, y_true.len() as u64 - positives)
}

/// Area under the ROC curve, computed from the tie-aware rank statistic.
///
/// Undefined (`NaN`) when only one class is present.
pub fn roc_auc(y_true: &[bool], scores: &[f64]) -> f64 {
    let (n_pos, n_neg) = class_counts(y_true);
    if n_pos == 0 || n_neg == 0 {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Average 1-based ranks across tied scores.
    let mut rank_sum_pos = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let tied_pos = order[start..end].iter().filter(|&&i| y_true[i]).count();
        rank_sum_pos += avg_rank * tied_pos as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    (rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

/// Average precision: `Σ (R_n - R_{n-1}) P_n` over distinct thresholds.
///
/// Undefined (`NaN`) when there are no positives.
pub fn average_precision(y_true: &[bool], scores: &[f64]) -> f64 {
    let (n_pos, _) = class_counts(y_true);
    if n_pos == 0 {
        return f64::NAN;
    }

    let mut ap = 0.0;
    let mut prev_recall = 0.0;
    for (_, tp, fp) in cumulative_counts(y_true, scores) {
        let recall = tp as f64 / n_pos as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    ap
}

/// ROC curve as (false positive rate, true positive rate) points, starting
/// at the origin.
pub fn roc_curve(y_true: &[bool], scores: &[f64]) -> Vec<CurvePoint> {
    let (n_pos, n_neg) = class_counts(y_true);
    let rate = |count: u64, total: u64| {
        if total == 0 {
            f64::NAN
        } else {
            count as f64 / total as f64
        }
    };

    let mut points = vec![CurvePoint {
        x: 0.0,
        y: 0.0,
        threshold: f64::INFINITY,
    }];
    points.extend(
        cumulative_counts(y_true, scores)
            .into_iter()
            .map(|(threshold, tp, fp)| CurvePoint {
                x: rate(fp, n_neg),
                y: rate(tp, n_pos),
                threshold,
            }),
    );
    points
}

/// Precision-recall curve as (recall, precision) points, starting at
/// recall 0 / precision 1.
pub fn precision_recall_curve(y_true: &[bool], scores: &[f64]) -> Vec<CurvePoint> {
    let (n_pos, _) = class_counts(y_true);
    let mut points = vec![CurvePoint {
        x: 0.0,
        y: 1.0,
        threshold: f64::INFINITY,
    }];
    points.extend(
        cumulative_counts(y_true, scores)
            .into_iter()
            .map(|(threshold, tp, fp)| CurvePoint {
                x: if n_pos == 0 { f64::NAN } else { tp as f64 / n_pos as f64 },
                y: tp as f64 / (tp + fp) as f64,
                threshold,
            }),
    );
    points
}
