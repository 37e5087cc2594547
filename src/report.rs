use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{
    AssessmentRecord, AttendanceRecord, EvaluationMetrics, RiskStatistics, RiskStatus,
    StoredPrediction, StudentRiskDetail, Thresholds,
};

pub fn summarize_risk(predictions: &[StoredPrediction]) -> RiskStatistics {
    let total = predictions.len();
    let count = |status: RiskStatus| predictions.iter().filter(|p| p.risk_status == status).count();
    let low_risk = count(RiskStatus::Low);
    let medium_risk = count(RiskStatus::Medium);
    let high_risk = count(RiskStatus::High);
    let percentage = |n: usize| {
        if total == 0 {
            0.0
        } else {
            n as f64 / total as f64 * 100.0
        }
    };

    RiskStatistics {
        total_students: total,
        low_risk,
        medium_risk,
        high_risk,
        low_risk_percentage: percentage(low_risk),
        medium_risk_percentage: percentage(medium_risk),
        high_risk_percentage: percentage(high_risk),
    }
}

/// Mean total mark (test + assignment + exam) per assessment.
pub fn assessment_average(assessments: &[AssessmentRecord]) -> f64 {
    if assessments.is_empty() {
        return 0.0;
    }
    assessments
        .iter()
        .map(|a| a.test_score + a.assignment_score + a.exam_score)
        .sum::<f64>()
        / assessments.len() as f64
}

pub fn attendance_average(attendances: &[AttendanceRecord]) -> f64 {
    if attendances.is_empty() {
        return 0.0;
    }
    attendances
        .iter()
        .map(|a| a.attendance_percentage)
        .sum::<f64>()
        / attendances.len() as f64
}

pub fn build_report(
    generated_on: NaiveDate,
    predictions: &[StoredPrediction],
    high_risk: &[StudentRiskDetail],
    metrics: Option<&EvaluationMetrics>,
    thresholds: Thresholds,
) -> String {
    let stats = summarize_risk(predictions);
    let mut output = String::new();

    let _ = writeln!(output, "# Student Risk Report");
    let _ = writeln!(output, "Generated on {}", generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Mix");

    if stats.total_students == 0 {
        let _ = writeln!(output, "No predictions recorded yet.");
    } else {
        let _ = writeln!(output, "- Students scored: {}", stats.total_students);
        let _ = writeln!(
            output,
            "- Low: {} ({:.1}%)",
            stats.low_risk, stats.low_risk_percentage
        );
        let _ = writeln!(
            output,
            "- Medium: {} ({:.1}%)",
            stats.medium_risk, stats.medium_risk_percentage
        );
        let _ = writeln!(
            output,
            "- High: {} ({:.1}%)",
            stats.high_risk, stats.high_risk_percentage
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## High Risk Students");

    let mut ranked = high_risk.to_vec();
    ranked.sort_by(|a, b| {
        a.predicted_score
            .partial_cmp(&b.predicted_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if ranked.is_empty() {
        let _ = writeln!(output, "No high risk students.");
    } else {
        for detail in ranked.iter() {
            let _ = writeln!(
                output,
                "- {} ({}, {} L{}) predicted {:.1}, attendance {:.1}%, assessment avg {:.1}",
                detail.student.name,
                detail.student.matric_no,
                detail.student.department,
                detail.student.level,
                detail.predicted_score,
                detail.attendance_percentage,
                detail.assessment_average
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Model");
    let _ = writeln!(
        output,
        "Thresholds: high {:.2}, medium {:.2}",
        thresholds.high, thresholds.medium
    );
    match metrics {
        Some(m) => {
            let _ = writeln!(
                output,
                "Accuracy {:.2}, precision {:.2}, recall {:.2}, F1 {:.2}",
                m.accuracy, m.precision, m.recall, m.f1_score
            );
            let _ = writeln!(output, "Confusion matrix: {:?}", m.confusion_matrix);
        }
        None => {
            let _ = writeln!(output, "Model not trained yet.");
        }
    }

    output
}
