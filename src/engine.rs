use ndarray::{Array1, Array2};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::metrics;
use crate::models::{
    AssessmentRecord, AttendanceRecord, EvaluationMetrics, PredictionResult, StudentMetrics,
    Thresholds,
};
use crate::risk;
use crate::store::{ModelStore, TrainedModel};
use crate::trainer::{self, TrainOptions, TrainOutcome};

/// Lifecycle of the classifier artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelState {
    /// Rule-based scoring only. `metrics` is `None` until a training run has
    /// reported placeholder metrics.
    Untrained { metrics: Option<EvaluationMetrics> },
    Trained(TrainedModel),
}

impl ModelState {
    pub fn metrics(&self) -> Option<&EvaluationMetrics> {
        match self {
            ModelState::Untrained { metrics } => metrics.as_ref(),
            ModelState::Trained(model) => Some(&model.metrics),
        }
    }
}

/// Scoring is lock-free and uses the rule-based bands only; a trained
/// classifier feeds the reported metrics and nothing else. Train, save and
/// load share one writer lock.
pub struct RiskEngine {
    config: EngineConfig,
    store: ModelStore,
    state: RwLock<ModelState>,
    writer: Mutex<()>,
}

impl RiskEngine {
    pub fn new(config: EngineConfig) -> Self {
        let store = ModelStore::new(config.model_path.clone(), config.scaler_path.clone());
        Self {
            config,
            store,
            state: RwLock::new(ModelState::Untrained { metrics: None }),
            writer: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn thresholds(&self) -> Thresholds {
        self.config.thresholds()
    }

    /// Startup: load the persisted model, or fall back to placeholder
    /// metrics when none exists. Corrupt artifacts are returned as errors.
    pub fn initialize(&self) -> Result<(), StoreError> {
        if !self.load_artifact()? {
            tracing::info!("no persisted model found, training without data");
            self.train(None, None);
        }
        Ok(())
    }

    pub fn aggregate(
        &self,
        student_id: Uuid,
        assessments: &[AssessmentRecord],
        attendances: &[AttendanceRecord],
    ) -> Option<StudentMetrics> {
        metrics::aggregate(student_id, assessments, attendances)
    }

    pub fn score(
        &self,
        attendance_pct: f64,
        test_avg: f64,
        assignment_avg: f64,
        previous_gpa: f64,
    ) -> PredictionResult {
        risk::score(
            attendance_pct,
            test_avg,
            assignment_avg,
            previous_gpa,
            self.thresholds(),
        )
    }

    /// Aggregate then score. `None` when the student has no assessments.
    pub fn predict(
        &self,
        student_id: Uuid,
        assessments: &[AssessmentRecord],
        attendances: &[AttendanceRecord],
    ) -> Option<PredictionResult> {
        let m = self.aggregate(student_id, assessments, attendances)?;
        Some(self.score(m.attendance_avg, m.test_avg, m.assignment_avg, m.previous_gpa_proxy))
    }

    pub fn train(
        &self,
        features: Option<&Array2<f64>>,
        labels: Option<&Array1<f64>>,
    ) -> EvaluationMetrics {
        let _writer = self.writer.lock();
        let options = TrainOptions {
            seed: self.config.random_seed,
            max_iter: self.config.max_iter,
        };

        let outcome = trainer::train(features, labels, options, &self.store);
        let metrics = outcome.metrics().clone();
        *self.state.write() = match outcome {
            TrainOutcome::Trained(model) => ModelState::Trained(model),
            TrainOutcome::Fallback(metrics) => ModelState::Untrained {
                metrics: Some(metrics),
            },
        };
        metrics
    }

    /// `Ok(false)` when the artifact pair is not on disk; state is untouched.
    pub fn load_artifact(&self) -> Result<bool, StoreError> {
        let _writer = self.writer.lock();
        match self.store.load()? {
            Some(model) => {
                *self.state.write() = ModelState::Trained(model);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn save_artifact(&self, model: &TrainedModel) -> Result<(), StoreError> {
        let _writer = self.writer.lock();
        self.store.save(model)
    }

    pub fn is_trained(&self) -> bool {
        matches!(*self.state.read(), ModelState::Trained(_))
    }

    pub fn metrics(&self) -> Option<EvaluationMetrics> {
        self.state.read().metrics().cloned()
    }

    pub fn state(&self) -> ModelState {
        self.state.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskStatus;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn engine_in(dir: &TempDir) -> RiskEngine {
        RiskEngine::new(EngineConfig {
            model_path: dir.path().join("model.json"),
            scaler_path: dir.path().join("scaler.json"),
            ..EngineConfig::default()
        })
    }

    fn labelled(n: usize) -> (Array2<f64>, Array1<f64>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n {
            let t = i as f64 / n as f64;
            let test = 5.0 + 25.0 * t;
            let assignment = 3.0 + 17.0 * ((i * 3) % n) as f64 / n as f64;
            let gpa = metrics::gpa_proxy(test, assignment);
            rows.extend([40.0 + 60.0 * t, test, assignment, gpa]);
            labels.push(if t < 0.5 { 1.0 } else { 0.0 });
        }
        (Array2::from_shape_vec((n, 4), rows).unwrap(), Array1::from(labels))
    }

    fn assessment(student_id: Uuid, test: f64, assignment: f64, exam: f64) -> AssessmentRecord {
        AssessmentRecord {
            student_id,
            course_id: Uuid::new_v4(),
            test_score: test,
            assignment_score: assignment,
            exam_score: exam,
        }
    }

    #[test]
    fn starts_untrained_without_metrics() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        assert!(!engine.is_trained());
        assert_eq!(engine.metrics(), None);
    }

    #[test]
    fn initialize_without_artifacts_reports_placeholder() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        engine.initialize().unwrap();

        assert!(!engine.is_trained());
        assert_eq!(engine.metrics(), Some(EvaluationMetrics::placeholder()));
    }

    #[test]
    fn train_without_data_stays_untrained() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        assert_eq!(engine.train(None, None), EvaluationMetrics::placeholder());
        assert_eq!(
            engine.state(),
            ModelState::Untrained {
                metrics: Some(EvaluationMetrics::placeholder())
            }
        );
    }

    #[test]
    fn trained_model_survives_restart() {
        let dir = tempdir().unwrap();
        let (x, y) = labelled(50);
        let engine = engine_in(&dir);
        let metrics = engine.train(Some(&x), Some(&y));
        assert!(engine.is_trained());

        let restarted = engine_in(&dir);
        restarted.initialize().unwrap();
        assert!(restarted.is_trained());
        assert_eq!(restarted.metrics(), Some(metrics));
        assert_eq!(restarted.state(), engine.state());
    }

    #[test]
    fn saved_artifact_loads_into_another_engine() {
        let source_dir = tempdir().unwrap();
        let (x, y) = labelled(50);
        let source = engine_in(&source_dir);
        source.train(Some(&x), Some(&y));
        let model = match source.state() {
            ModelState::Trained(model) => model,
            other => panic!("expected trained state, got {other:?}"),
        };

        let target_dir = tempdir().unwrap();
        let target = engine_in(&target_dir);
        assert!(!target.load_artifact().unwrap());
        target.save_artifact(&model).unwrap();
        assert!(target.load_artifact().unwrap());
        assert_eq!(target.state(), ModelState::Trained(model));
    }

    #[test]
    fn failed_retrain_marks_untrained() {
        let dir = tempdir().unwrap();
        let (x, y) = labelled(50);
        let engine = engine_in(&dir);
        engine.train(Some(&x), Some(&y));

        let single_class = Array1::<f64>::ones(50);
        let metrics = engine.train(Some(&x), Some(&single_class));
        assert_eq!(metrics, EvaluationMetrics::placeholder());
        assert!(!engine.is_trained());
    }

    #[test]
    fn corrupt_artifact_fails_initialization() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("model.json"), "{ not json").unwrap();
        fs::write(dir.path().join("scaler.json"), "{}").unwrap();

        let engine = engine_in(&dir);
        assert!(engine.initialize().is_err());
        assert!(!engine.is_trained());
    }

    #[test]
    fn scoring_ignores_model_state() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let before = engine.score(90.0, 25.0, 18.0, 3.44);

        let (x, y) = labelled(50);
        engine.train(Some(&x), Some(&y));
        let after = engine.score(90.0, 25.0, 18.0, 3.44);

        assert_eq!(before, after);
        assert_eq!(after.risk_status, RiskStatus::Low);
        assert_eq!(after.thresholds, Thresholds { high: 0.65, medium: 0.45 });
    }

    #[test]
    fn predicts_from_raw_records() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let id = Uuid::new_v4();
        let attendances = vec![AttendanceRecord {
            student_id: id,
            course_id: Uuid::new_v4(),
            attendance_percentage: 90.0,
        }];

        let result = engine
            .predict(id, &[assessment(id, 25.0, 18.0, 40.0)], &attendances)
            .unwrap();
        assert_eq!(result.risk_status, RiskStatus::Low);
        assert_eq!(result.probability, 0.20);
        assert_eq!(result.predicted_score, 88.8);

        assert!(engine.predict(id, &[], &attendances).is_none());
    }

    #[test]
    fn concurrent_training_leaves_consistent_artifacts() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let (x, y) = labelled(50);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| engine.train(Some(&x), Some(&y)));
            }
        });

        let restarted = engine_in(&dir);
        assert!(restarted.load_artifact().unwrap());
        assert_eq!(restarted.state(), engine.state());
    }
}
