use uuid::Uuid;

use crate::models::{AssessmentRecord, AttendanceRecord, StudentMetrics};

/// Reduces a student's records to the four scoring features.
///
/// Returns `None` when there are no assessments, whatever the attendance
/// records hold. Missing attendance only zeroes `attendance_avg`. Exam scores
/// are collected upstream but take no part in the features.
pub fn aggregate(
    student_id: Uuid,
    assessments: &[AssessmentRecord],
    attendances: &[AttendanceRecord],
) -> Option<StudentMetrics> {
    if assessments.is_empty() {
        tracing::warn!(%student_id, "no assessments found, metrics unavailable");
        return None;
    }

    let test_avg = mean(assessments.iter().map(|a| a.test_score));
    let assignment_avg = mean(assessments.iter().map(|a| a.assignment_score));
    let attendance_avg = mean(attendances.iter().map(|a| a.attendance_percentage));

    let metrics = StudentMetrics {
        attendance_avg,
        test_avg,
        assignment_avg,
        previous_gpa_proxy: gpa_proxy(test_avg, assignment_avg),
    };
    tracing::debug!(%student_id, ?metrics, "student metrics aggregated");
    Some(metrics)
}

/// Scales the 50-point test + assignment total onto a 4.0 GPA.
pub fn gpa_proxy(test_avg: f64, assignment_avg: f64) -> f64 {
    round_to(((test_avg + assignment_avg) / 50.0) * 4.0, 2)
}

// Half-to-even on the exact binary value.
pub(crate) fn round_to(value: f64, decimals: usize) -> f64 {
    format!("{value:.decimals$}").parse().unwrap_or(value)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(student_id: Uuid, test: f64, assignment: f64, exam: f64) -> AssessmentRecord {
        AssessmentRecord {
            student_id,
            course_id: Uuid::new_v4(),
            test_score: test,
            assignment_score: assignment,
            exam_score: exam,
        }
    }

    fn attendance(student_id: Uuid, pct: f64) -> AttendanceRecord {
        AttendanceRecord {
            student_id,
            course_id: Uuid::new_v4(),
            attendance_percentage: pct,
        }
    }

    #[test]
    fn empty_assessments_yield_no_metrics() {
        let id = Uuid::new_v4();
        assert!(aggregate(id, &[], &[attendance(id, 95.0)]).is_none());
        assert!(aggregate(id, &[], &[]).is_none());
    }

    #[test]
    fn zero_scores_are_still_metrics() {
        let id = Uuid::new_v4();
        let metrics = aggregate(id, &[assessment(id, 0.0, 0.0, 0.0)], &[]).unwrap();
        assert_eq!(metrics.test_avg, 0.0);
        assert_eq!(metrics.assignment_avg, 0.0);
        assert_eq!(metrics.attendance_avg, 0.0);
        assert_eq!(metrics.previous_gpa_proxy, 0.0);
    }

    #[test]
    fn averages_across_courses() {
        let id = Uuid::new_v4();
        let assessments = vec![assessment(id, 20.0, 10.0, 30.0), assessment(id, 30.0, 20.0, 50.0)];
        let attendances = vec![attendance(id, 80.0), attendance(id, 60.0)];

        let metrics = aggregate(id, &assessments, &attendances).unwrap();
        assert_eq!(metrics.test_avg, 25.0);
        assert_eq!(metrics.assignment_avg, 15.0);
        assert_eq!(metrics.attendance_avg, 70.0);
        assert_eq!(metrics.previous_gpa_proxy, 3.2);
    }

    #[test]
    fn gpa_proxy_ignores_exam_scores() {
        let id = Uuid::new_v4();
        let low_exam = aggregate(id, &[assessment(id, 25.0, 18.0, 5.0)], &[]).unwrap();
        let high_exam = aggregate(id, &[assessment(id, 25.0, 18.0, 50.0)], &[]).unwrap();
        assert_eq!(low_exam, high_exam);
        assert_eq!(low_exam.previous_gpa_proxy, 3.44);
    }

    #[test]
    fn gpa_proxy_rounds_to_two_decimals() {
        assert_eq!(gpa_proxy(10.0, 3.333), 1.07);
    }

    #[test]
    fn exact_halves_round_to_even() {
        assert_eq!(gpa_proxy(39.0625, 0.0), 3.12);
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.375, 2), 0.38);
    }

    #[test]
    fn rounding_uses_the_stored_value() {
        // 1.005 is stored as 1.00499999...
        assert_eq!(round_to(1.005, 2), 1.0);
        assert_eq!(round_to(2.675, 2), 2.67);
    }
}
