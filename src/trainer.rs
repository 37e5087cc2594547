use std::path::Path;

use anyhow::Context;
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::classifier::{self, FitOptions, LogisticRegression, StandardScaler, FEATURE_NAMES};
use crate::error::TrainError;
use crate::models::EvaluationMetrics;
use crate::store::{ModelStore, TrainedModel};

pub const HOLDOUT_RATIO: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct TrainOptions {
    pub seed: u64,
    pub max_iter: usize,
}

/// What a training run left behind.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    Trained(TrainedModel),
    /// No data or the run failed; carries the placeholder metrics.
    Fallback(EvaluationMetrics),
}

impl TrainOutcome {
    pub fn metrics(&self) -> &EvaluationMetrics {
        match self {
            TrainOutcome::Trained(model) => &model.metrics,
            TrainOutcome::Fallback(metrics) => metrics,
        }
    }
}

/// Fits, evaluates and persists a classifier. Never fails: missing data or
/// any error along the way produces `TrainOutcome::Fallback`.
pub fn train(
    features: Option<&Array2<f64>>,
    labels: Option<&Array1<f64>>,
    options: TrainOptions,
    store: &ModelStore,
) -> TrainOutcome {
    let (x, y) = match (features, labels) {
        (Some(x), Some(y)) if x.nrows() > 0 && !y.is_empty() => (x, y),
        _ => {
            tracing::warn!("no training data provided, using rule-based scoring");
            return TrainOutcome::Fallback(EvaluationMetrics::placeholder());
        }
    };

    tracing::info!(samples = x.nrows(), "training model");
    let result = fit_and_evaluate(x, y, options).and_then(|model| {
        store.save(&model)?;
        Ok(model)
    });

    match result {
        Ok(model) => TrainOutcome::Trained(model),
        Err(err) => {
            tracing::error!(error = %err, "error training model, using rule-based scoring");
            TrainOutcome::Fallback(EvaluationMetrics::placeholder())
        }
    }
}

pub fn fit_and_evaluate(
    x: &Array2<f64>,
    y: &Array1<f64>,
    options: TrainOptions,
) -> Result<TrainedModel, TrainError> {
    validate(x, y)?;

    let (train_idx, test_idx) = split_indices(x.nrows(), options.seed)?;
    let x_train = x.select(Axis(0), &train_idx);
    let x_test = x.select(Axis(0), &test_idx);
    let y_train = y.select(Axis(0), &train_idx);
    let y_test = y.select(Axis(0), &test_idx);

    let scaler = StandardScaler::fit(&x_train)?;
    let x_train = scaler.transform(&x_train)?;
    let x_test = scaler.transform(&x_test)?;

    let fit_options = FitOptions {
        max_iter: options.max_iter,
        ..FitOptions::default()
    };
    let classifier = LogisticRegression::fit(&x_train, &y_train, fit_options)?;
    let y_pred = classifier.predict(&x_test)?;
    let metrics = classifier::evaluate(&y_test, &y_pred);

    tracing::info!(
        accuracy = metrics.accuracy,
        iterations = classifier.iterations,
        "model trained"
    );
    for (name, coef) in FEATURE_NAMES.iter().zip(classifier.coefficients.iter()) {
        tracing::info!(feature = name, coefficient = coef, "feature importance");
    }

    Ok(TrainedModel {
        classifier,
        scaler,
        metrics,
    })
}

fn validate(x: &Array2<f64>, y: &Array1<f64>) -> Result<(), TrainError> {
    if x.ncols() != FEATURE_NAMES.len() {
        return Err(TrainError::DimensionMismatch {
            expected: FEATURE_NAMES.len(),
            got: x.ncols(),
        });
    }
    if x.nrows() != y.len() {
        return Err(TrainError::DimensionMismatch {
            expected: x.nrows(),
            got: y.len(),
        });
    }
    if let Some(&label) = y.iter().find(|&&label| label != 0.0 && label != 1.0) {
        return Err(TrainError::NonBinaryLabel(label));
    }
    if let Some(row) = x
        .axis_iter(Axis(0))
        .position(|row| row.iter().any(|v| !v.is_finite()))
    {
        return Err(TrainError::NonFinite { row });
    }
    Ok(())
}

/// Shuffled (train, holdout) row indices. The holdout takes the ceiling of
/// 20% and both sides must be non-empty.
pub fn split_indices(n: usize, seed: u64) -> Result<(Vec<usize>, Vec<usize>), TrainError> {
    let n_test = (n as f64 * HOLDOUT_RATIO).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(TrainError::TooFewSamples(n));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Columns: `attendance,test_avg,assignment_avg,previous_gpa,at_risk`.
pub fn read_labelled_csv(path: &Path) -> anyhow::Result<(Array2<f64>, Array1<f64>)> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        attendance: f64,
        test_avg: f64,
        assignment_avg: f64,
        previous_gpa: f64,
        at_risk: u8,
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut features = Vec::new();
    let mut labels = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        features.extend([row.attendance, row.test_avg, row.assignment_avg, row.previous_gpa]);
        labels.push(f64::from(row.at_risk));
    }

    let x = Array2::from_shape_vec((labels.len(), FEATURE_NAMES.len()), features)?;
    Ok((x, Array1::from(labels)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const OPTIONS: TrainOptions = TrainOptions { seed: 42, max_iter: 1000 };

    /// Students under a 60 performance are labelled at risk.
    fn cohort(n: usize) -> (Array2<f64>, Array1<f64>) {
        let mut rows = Vec::with_capacity(n * 4);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f64 / (n - 1) as f64;
            let attendance = 30.0 + 70.0 * t;
            let test = 6.0 + 24.0 * t;
            let assignment = 4.0 + 16.0 * ((i * 7) % n) as f64 / n as f64;
            let gpa = ((test + assignment) / 50.0) * 4.0;
            let performance = crate::risk::performance(attendance, test, assignment, gpa);
            rows.extend([attendance, test, assignment, gpa]);
            labels.push(if performance < 60.0 { 1.0 } else { 0.0 });
        }
        (
            Array2::from_shape_vec((n, 4), rows).unwrap(),
            Array1::from(labels),
        )
    }

    fn store_in(dir: &tempfile::TempDir) -> ModelStore {
        ModelStore::new(dir.path().join("model.json"), dir.path().join("scaler.json"))
    }

    #[test]
    fn missing_data_returns_placeholder() {
        let dir = tempdir().unwrap();
        let outcome = train(None, None, OPTIONS, &store_in(&dir));

        assert_eq!(outcome, TrainOutcome::Fallback(EvaluationMetrics::placeholder()));
        assert_eq!(outcome.metrics().accuracy, 0.85);
        assert_eq!(outcome.metrics().confusion_matrix, vec![vec![0, 0], vec![0, 0]]);
        assert!(!dir.path().join("model.json").exists());
    }

    #[test]
    fn empty_matrix_counts_as_missing() {
        let dir = tempdir().unwrap();
        let x = Array2::<f64>::zeros((0, 4));
        let y = Array1::<f64>::zeros(0);
        let outcome = train(Some(&x), Some(&y), OPTIONS, &store_in(&dir));
        assert!(matches!(outcome, TrainOutcome::Fallback(_)));
    }

    #[test]
    fn labelled_cohort_trains_and_persists() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let (x, y) = cohort(60);

        let outcome = train(Some(&x), Some(&y), OPTIONS, &store);
        let model = match outcome {
            TrainOutcome::Trained(model) => model,
            other => panic!("expected a trained model, got {other:?}"),
        };

        assert!(model.metrics.accuracy >= 0.75, "{:?}", model.metrics);
        let holdout: u64 = model.metrics.confusion_matrix.iter().flatten().sum();
        assert_eq!(holdout, 12);
        assert_eq!(store.load().unwrap(), Some(model));
    }

    #[test]
    fn training_is_reproducible_for_a_seed() {
        let (x, y) = cohort(40);
        let a = fit_and_evaluate(&x, &y, OPTIONS).unwrap();
        let b = fit_and_evaluate(&x, &y, OPTIONS).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_class_falls_back() {
        let dir = tempdir().unwrap();
        let (x, _) = cohort(20);
        let y = Array1::<f64>::zeros(20);

        let outcome = train(Some(&x), Some(&y), OPTIONS, &store_in(&dir));
        assert_eq!(outcome, TrainOutcome::Fallback(EvaluationMetrics::placeholder()));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let (x, mut y) = cohort(10);
        assert!(matches!(
            fit_and_evaluate(&x, &y.slice(ndarray::s![..9]).to_owned(), OPTIONS),
            Err(TrainError::DimensionMismatch { expected: 10, got: 9 })
        ));

        y[3] = 2.0;
        assert!(matches!(
            fit_and_evaluate(&x, &y, OPTIONS),
            Err(TrainError::NonBinaryLabel(_))
        ));

        let (mut x, y) = cohort(10);
        x[[4, 1]] = f64::NAN;
        assert!(matches!(
            fit_and_evaluate(&x, &y, OPTIONS),
            Err(TrainError::NonFinite { row: 4 })
        ));
    }

    #[test]
    fn split_is_eighty_twenty_and_disjoint() {
        let (train, test) = split_indices(10, 42).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        assert_eq!(split_indices(10, 42).unwrap(), (train, test));
    }

    #[test]
    fn reads_labelled_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");
        std::fs::write(
            &path,
            "attendance,test_avg,assignment_avg,previous_gpa,at_risk\n\
             92,26,18,3.52,0\n\
             41,9,6,1.2,1\n",
        )
        .unwrap();

        let (x, y) = read_labelled_csv(&path).unwrap();
        assert_eq!(x.dim(), (2, 4));
        assert_eq!(x[[1, 3]], 1.2);
        assert_eq!(y.to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn tiny_datasets_cannot_split() {
        assert!(matches!(split_indices(1, 42), Err(TrainError::TooFewSamples(1))));
        assert_eq!(split_indices(2, 42).unwrap().1.len(), 1);
    }
}
