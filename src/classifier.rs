use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::TrainError;
use crate::models::EvaluationMetrics;

pub const FEATURE_NAMES: [&str; 4] = ["Attendance", "Test Avg", "Assignment Avg", "Previous GPA"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Result<Self, TrainError> {
        if x.nrows() == 0 {
            return Err(TrainError::TooFewSamples(0));
        }
        let mean = x.mean_axis(Axis(0)).ok_or(TrainError::TooFewSamples(0))?;
        // Population std; constant columns keep a unit scale.
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });

        Ok(Self {
            mean: mean.to_vec(),
            scale: scale.to_vec(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, TrainError> {
        if x.ncols() != self.n_features() {
            return Err(TrainError::DimensionMismatch {
                expected: self.n_features(),
                got: x.ncols(),
            });
        }
        let mean = Array1::from(self.mean.clone());
        let scale = Array1::from(self.scale.clone());
        Ok((x - &mean) / &scale)
    }
}

/// Batch gradient descent with an L2 penalty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    /// Inverse regularization strength.
    pub c: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iter: 1000,
            tolerance: 1e-6,
            c: 1.0,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let exp_z = z.exp();
        exp_z / (1.0 + exp_z)
    }
}

fn log_loss(y: &Array1<f64>, p: &Array1<f64>) -> f64 {
    let eps = 1e-15;
    -y.iter()
        .zip(p.iter())
        .map(|(&y, &p)| {
            let p = p.clamp(eps, 1.0 - eps);
            y * p.ln() + (1.0 - y) * (1.0 - p).ln()
        })
        .sum::<f64>()
        / y.len() as f64
}

impl LogisticRegression {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, options: FitOptions) -> Result<Self, TrainError> {
        if x.nrows() != y.len() {
            return Err(TrainError::DimensionMismatch {
                expected: x.nrows(),
                got: y.len(),
            });
        }
        if x.nrows() == 0 {
            return Err(TrainError::TooFewSamples(0));
        }
        let positives = y.iter().filter(|&&label| label >= 0.5).count();
        if positives == 0 || positives == y.len() {
            return Err(TrainError::SingleClass);
        }

        let n_samples = x.nrows() as f64;
        let alpha = 1.0 / (options.c * n_samples);
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        let mut previous_cost = f64::INFINITY;
        let mut iterations = 0;

        for iter in 0..options.max_iter {
            iterations = iter + 1;
            let predictions = (x.dot(&weights) + bias).mapv(sigmoid);
            let errors = &predictions - y;

            let dw = x.t().dot(&errors) / n_samples + &weights * alpha;
            let db = errors.sum() / n_samples;

            weights = &weights - &(dw * options.learning_rate);
            bias -= options.learning_rate * db;

            let cost = log_loss(y, &predictions);
            if (previous_cost - cost).abs() < options.tolerance {
                tracing::debug!(iteration = iter, cost, "logistic regression converged");
                break;
            }
            previous_cost = cost;
        }

        Ok(Self {
            coefficients: weights.to_vec(),
            intercept: bias,
            iterations,
        })
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainError> {
        if x.ncols() != self.n_features() {
            return Err(TrainError::DimensionMismatch {
                expected: self.n_features(),
                got: x.ncols(),
            });
        }
        let weights = Array1::from(self.coefficients.clone());
        Ok((x.dot(&weights) + self.intercept).mapv(sigmoid))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainError> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }
}

// Matrix covers labels seen in either vector; one label gives `[[n]]`.
pub fn evaluate(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> EvaluationMetrics {
    let (mut tp, mut tn, mut fp, mut fn_) = (0u64, 0u64, 0u64, 0u64);
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        match (t >= 0.5, p >= 0.5) {
            (true, true) => tp += 1,
            (false, false) => tn += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
        }
    }

    let total = tp + tn + fp + fn_;
    let ratio = |num: u64, denom: u64| if denom == 0 { 0.0 } else { num as f64 / denom as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1_score = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    let has_positive = tp + fn_ + fp > 0;
    let has_negative = tn + fp + fn_ > 0;
    let confusion_matrix = if has_positive && has_negative {
        vec![vec![tn, fp], vec![fn_, tp]]
    } else {
        vec![vec![total]]
    };

    EvaluationMetrics {
        accuracy: ratio(tp + tn, total),
        precision,
        recall,
        f1_score,
        confusion_matrix,
    }
}
