use anyhow::{ensure, Context};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    AssessmentRecord, AttendanceRecord, PredictionResult, RiskStatus, StoredPrediction,
    StudentRecord,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

struct SeedStudent {
    name: &'static str,
    matric_no: &'static str,
    department: &'static str,
    level: i32,
    // (course_code, test, assignment, exam, attendance)
    results: &'static [(&'static str, f64, f64, f64, f64)],
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let courses = [
        ("CSC201", "Data Structures", 3),
        ("MTH202", "Linear Algebra", 3),
        ("GST211", "Communication Skills", 2),
    ];
    for (code, title, credit_unit) in courses {
        upsert_course(pool, code, title, credit_unit).await?;
    }

    let students = [
        SeedStudent {
            name: "Adaeze Okafor",
            matric_no: "CSC/2021/014",
            department: "Computer Science",
            level: 300,
            results: &[("CSC201", 26.0, 18.0, 41.0, 94.0), ("MTH202", 24.0, 17.0, 38.0, 88.0)],
        },
        SeedStudent {
            name: "Tunde Bakare",
            matric_no: "CSC/2021/027",
            department: "Computer Science",
            level: 300,
            results: &[("CSC201", 18.0, 12.0, 30.0, 72.0), ("GST211", 17.0, 13.0, 28.0, 68.0)],
        },
        SeedStudent {
            name: "Ngozi Eze",
            matric_no: "MTH/2022/009",
            department: "Mathematics",
            level: 200,
            results: &[("MTH202", 9.0, 6.0, 15.0, 45.0), ("GST211", 11.0, 5.0, 19.0, 38.0)],
        },
    ];

    for student in students.iter() {
        let student_id = upsert_student(
            pool,
            student.name,
            student.matric_no,
            student.department,
            student.level,
        )
        .await?;

        for &(code, test, assignment, exam, attendance) in student.results {
            let course_id: Uuid = sqlx::query(
                "SELECT id FROM student_risk.courses WHERE course_code = $1",
            )
            .bind(code)
            .fetch_one(pool)
            .await?
            .get("id");

            upsert_assessment(pool, student_id, course_id, test, assignment, exam).await?;
            upsert_attendance(pool, student_id, course_id, attendance).await?;
        }
    }

    Ok(())
}

async fn upsert_student(
    pool: &PgPool,
    name: &str,
    matric_no: &str,
    department: &str,
    level: i32,
) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO student_risk.students (id, name, matric_no, department, level)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (matric_no) DO UPDATE
        SET name = EXCLUDED.name, department = EXCLUDED.department, level = EXCLUDED.level
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(matric_no)
    .bind(department)
    .bind(level)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn upsert_course(
    pool: &PgPool,
    course_code: &str,
    course_title: &str,
    credit_unit: i32,
) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO student_risk.courses (id, course_code, course_title, credit_unit)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (course_code) DO UPDATE
        SET course_title = EXCLUDED.course_title, credit_unit = EXCLUDED.credit_unit
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(course_code)
    .bind(course_title)
    .bind(credit_unit)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn upsert_assessment(
    pool: &PgPool,
    student_id: Uuid,
    course_id: Uuid,
    test_score: f64,
    assignment_score: f64,
    exam_score: f64,
) -> anyhow::Result<()> {
    ensure!((0.0..=30.0).contains(&test_score), "test_score {test_score} outside 0-30");
    ensure!(
        (0.0..=20.0).contains(&assignment_score),
        "assignment_score {assignment_score} outside 0-20"
    );
    ensure!((0.0..=50.0).contains(&exam_score), "exam_score {exam_score} outside 0-50");

    sqlx::query(
        r#"
        INSERT INTO student_risk.assessments
        (id, student_id, course_id, test_score, assignment_score, exam_score)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (student_id, course_id) DO UPDATE
        SET test_score = EXCLUDED.test_score,
            assignment_score = EXCLUDED.assignment_score,
            exam_score = EXCLUDED.exam_score
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(course_id)
    .bind(test_score)
    .bind(assignment_score)
    .bind(exam_score)
    .execute(pool)
    .await?;
    Ok(())
}

async fn upsert_attendance(
    pool: &PgPool,
    student_id: Uuid,
    course_id: Uuid,
    attendance_percentage: f64,
) -> anyhow::Result<()> {
    ensure!(
        (0.0..=100.0).contains(&attendance_percentage),
        "attendance_percentage {attendance_percentage} outside 0-100"
    );

    sqlx::query(
        r#"
        INSERT INTO student_risk.attendance
        (id, student_id, course_id, attendance_percentage)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (student_id, course_id) DO UPDATE
        SET attendance_percentage = EXCLUDED.attendance_percentage
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(course_id)
    .bind(attendance_percentage)
    .execute(pool)
    .await?;
    Ok(())
}

/// Imports one row per student and course. Attendance is optional per row.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        name: String,
        matric_no: String,
        department: String,
        level: i32,
        course_code: String,
        course_title: String,
        credit_unit: i32,
        test_score: f64,
        assignment_score: f64,
        exam_score: f64,
        attendance_percentage: Option<f64>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let student_id =
            upsert_student(pool, &row.name, &row.matric_no, &row.department, row.level).await?;
        let course_id =
            upsert_course(pool, &row.course_code, &row.course_title, row.credit_unit).await?;

        upsert_assessment(
            pool,
            student_id,
            course_id,
            row.test_score,
            row.assignment_score,
            row.exam_score,
        )
        .await
        .with_context(|| format!("row {} ({})", line + 2, row.matric_no))?;

        if let Some(attendance) = row.attendance_percentage {
            upsert_attendance(pool, student_id, course_id, attendance)
                .await
                .with_context(|| format!("row {} ({})", line + 2, row.matric_no))?;
        }
        imported += 1;
    }

    Ok(imported)
}

fn student_from_row(row: &sqlx::postgres::PgRow) -> StudentRecord {
    StudentRecord {
        id: row.get("id"),
        name: row.get("name"),
        matric_no: row.get("matric_no"),
        department: row.get("department"),
        level: row.get("level"),
    }
}

pub async fn fetch_students(pool: &PgPool) -> anyhow::Result<Vec<StudentRecord>> {
    let rows = sqlx::query(
        "SELECT id, name, matric_no, department, level FROM student_risk.students ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(student_from_row).collect())
}

pub async fn fetch_student(pool: &PgPool, matric_no: &str) -> anyhow::Result<Option<StudentRecord>> {
    let row = sqlx::query(
        "SELECT id, name, matric_no, department, level FROM student_risk.students WHERE matric_no = $1",
    )
    .bind(matric_no)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(student_from_row))
}

pub async fn fetch_assessments(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<AssessmentRecord>> {
    let rows = sqlx::query(
        "SELECT student_id, course_id, test_score, assignment_score, exam_score \
         FROM student_risk.assessments WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| AssessmentRecord {
            student_id: row.get("student_id"),
            course_id: row.get("course_id"),
            test_score: row.get("test_score"),
            assignment_score: row.get("assignment_score"),
            exam_score: row.get("exam_score"),
        })
        .collect())
}

pub async fn fetch_attendance(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    let rows = sqlx::query(
        "SELECT student_id, course_id, attendance_percentage \
         FROM student_risk.attendance WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| AttendanceRecord {
            student_id: row.get("student_id"),
            course_id: row.get("course_id"),
            attendance_percentage: row.get("attendance_percentage"),
        })
        .collect())
}

/// Drops earlier predictions for the student and stores the new one.
pub async fn replace_prediction(
    pool: &PgPool,
    student_id: Uuid,
    result: &PredictionResult,
) -> anyhow::Result<StoredPrediction> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM student_risk.predictions WHERE student_id = $1")
        .bind(student_id)
        .execute(&mut *tx)
        .await?;

    let created_at: DateTime<Utc> = sqlx::query(
        r#"
        INSERT INTO student_risk.predictions
        (id, student_id, predicted_score, risk_status, created_at)
        VALUES ($1, $2, $3, $4, now())
        RETURNING created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(result.predicted_score)
    .bind(result.risk_status.as_str())
    .fetch_one(&mut *tx)
    .await?
    .get("created_at");

    tx.commit().await?;

    Ok(StoredPrediction {
        student_id,
        predicted_score: result.predicted_score,
        risk_status: result.risk_status,
        created_at,
    })
}

fn prediction_from_row(row: &sqlx::postgres::PgRow) -> anyhow::Result<StoredPrediction> {
    let status: String = row.get("risk_status");
    Ok(StoredPrediction {
        student_id: row.get("student_id"),
        predicted_score: row.get("predicted_score"),
        risk_status: status.parse::<RiskStatus>().map_err(anyhow::Error::msg)?,
        created_at: row.get("created_at"),
    })
}

pub async fn fetch_predictions(pool: &PgPool) -> anyhow::Result<Vec<StoredPrediction>> {
    let rows = sqlx::query(
        "SELECT student_id, predicted_score, risk_status, created_at \
         FROM student_risk.predictions ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(prediction_from_row).collect()
}

pub async fn fetch_latest_prediction(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Option<StoredPrediction>> {
    let row = sqlx::query(
        "SELECT student_id, predicted_score, risk_status, created_at \
         FROM student_risk.predictions WHERE student_id = $1 \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(prediction_from_row).transpose()
}
