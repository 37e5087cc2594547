use crate::metrics::round_to;
use crate::models::{PredictionResult, RiskStatus, Thresholds};

/// A row of the banding table: applies when performance >= `floor`.
#[derive(Debug, Clone, Copy)]
struct Band {
    floor: f64,
    probability: f64,
    status: RiskStatus,
    base_score: f64,
}

/// Evaluated top-down, first match wins.
const BANDS: [Band; 4] = [
    Band { floor: 80.0, probability: 0.20, status: RiskStatus::Low, base_score: 85.0 },
    Band { floor: 70.0, probability: 0.40, status: RiskStatus::Low, base_score: 75.0 },
    Band { floor: 60.0, probability: 0.60, status: RiskStatus::Medium, base_score: 65.0 },
    Band { floor: 50.0, probability: 0.80, status: RiskStatus::High, base_score: 45.0 },
];

const FLOOR_PROBABILITY: f64 = 0.95;
const MIN_PREDICTED_SCORE: f64 = 30.0;

/// 40% attendance, 40% academics (test + assignment on a 100 scale),
/// 20% GPA (on a 100 scale).
pub fn performance(attendance_pct: f64, test_avg: f64, assignment_avg: f64, previous_gpa: f64) -> f64 {
    let academic_score = (test_avg + assignment_avg) * 2.0;
    let gpa_score = previous_gpa * 25.0;
    let performance = attendance_pct * 0.4 + academic_score * 0.4 + gpa_score * 0.2;

    tracing::debug!(
        attendance_pct,
        academic_score,
        gpa_score,
        performance,
        "performance computed"
    );
    performance
}

/// (probability, status, predicted score rounded to one decimal)
pub fn band(performance: f64) -> (f64, RiskStatus, f64) {
    let (probability, status, raw_score) = BANDS
        .iter()
        .find(|band| performance >= band.floor)
        .map(|band| {
            (
                band.probability,
                band.status,
                band.base_score + (performance - band.floor) * 0.5,
            )
        })
        .unwrap_or_else(|| {
            (
                FLOOR_PROBABILITY,
                RiskStatus::High,
                (45.0 - (50.0 - performance)).max(MIN_PREDICTED_SCORE),
            )
        });

    (probability, status, round_to(raw_score, 1))
}

/// Scores one student. Total over all inputs: out-of-range values are not
/// rejected here. `thresholds` is echoed back and does not affect banding.
pub fn score(
    attendance_pct: f64,
    test_avg: f64,
    assignment_avg: f64,
    previous_gpa: f64,
    thresholds: Thresholds,
) -> PredictionResult {
    let performance = performance(attendance_pct, test_avg, assignment_avg, previous_gpa);
    let (probability, risk_status, predicted_score) = band(performance);

    tracing::debug!(probability, predicted_score, %risk_status, "risk scored");

    PredictionResult {
        probability,
        predicted_score,
        risk_status,
        performance,
        thresholds,
    }
}
