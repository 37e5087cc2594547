pub mod classifier;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod report;
pub mod risk;
pub mod store;
pub mod trainer;

pub use config::EngineConfig;
pub use engine::{ModelState, RiskEngine};
pub use error::{StoreError, TrainError};
pub use models::{
    AssessmentRecord, AttendanceRecord, EvaluationMetrics, PredictionResult, RiskStatus,
    StudentMetrics, Thresholds,
};
pub use store::{ModelStore, TrainedModel};
