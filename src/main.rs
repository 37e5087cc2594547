use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use student_risk_engine::models::{StudentRecord, StudentRiskDetail};
use student_risk_engine::{db, report, trainer, EngineConfig, RiskEngine, RiskStatus};

#[derive(Parser)]
#[command(name = "student-risk")]
#[command(about = "Student risk prediction from assessment and attendance records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import students, assessments and attendance from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Score raw feature values without touching the database
    Score {
        #[arg(long)]
        attendance: f64,
        #[arg(long)]
        test_avg: f64,
        #[arg(long)]
        assignment_avg: f64,
        #[arg(long)]
        previous_gpa: f64,
    },
    /// Generate and store a prediction for one student
    Predict {
        #[arg(long)]
        matric_no: String,
    },
    /// Generate and store predictions for every student with enough data
    PredictAll,
    /// Train the classifier from a labelled CSV, or report placeholder metrics without one
    Train {
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Show the current model evaluation metrics
    Metrics,
    /// Show the configured risk thresholds
    Thresholds,
    /// Generate a markdown risk report
    Report {
        #[arg(long, default_value = "risk-report.md")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Returns `false` when the student lacks assessments or attendance.
async fn predict_student(
    pool: &PgPool,
    engine: &RiskEngine,
    student: &StudentRecord,
) -> anyhow::Result<bool> {
    let assessments = db::fetch_assessments(pool, student.id).await?;
    let attendances = db::fetch_attendance(pool, student.id).await?;
    tracing::debug!(
        student = %student.matric_no,
        assessments = assessments.len(),
        attendances = attendances.len(),
        "records fetched"
    );

    if assessments.is_empty() || attendances.is_empty() {
        tracing::warn!(student = %student.matric_no, "insufficient data for prediction");
        return Ok(false);
    }

    let Some(result) = engine.predict(student.id, &assessments, &attendances) else {
        return Ok(false);
    };
    let stored = db::replace_prediction(pool, student.id, &result).await?;
    println!(
        "- {} ({}) {} risk, predicted score {:.1} (performance {:.1}, probability {:.2})",
        student.name,
        student.matric_no,
        stored.risk_status,
        stored.predicted_score,
        result.performance,
        result.probability
    );
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("student_risk_engine=info,student_risk=info")),
        )
        .init();

    let cli = Cli::parse();
    let engine = RiskEngine::new(EngineConfig::from_env());
    engine
        .initialize()
        .context("failed to load persisted model artifacts")?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let imported = db::import_csv(&pool, &csv).await?;
            println!("Imported {imported} rows from {}.", csv.display());
        }
        Commands::Score {
            attendance,
            test_avg,
            assignment_avg,
            previous_gpa,
        } => {
            let result = engine.score(attendance, test_avg, assignment_avg, previous_gpa);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Predict { matric_no } => {
            let pool = connect().await?;
            let student = db::fetch_student(&pool, &matric_no)
                .await?
                .with_context(|| format!("student {matric_no} not found"))?;

            if !predict_student(&pool, &engine, &student).await? {
                anyhow::bail!(
                    "insufficient data for prediction: {matric_no} needs both assessment and attendance records"
                );
            }
        }
        Commands::PredictAll => {
            let pool = connect().await?;
            let students = db::fetch_students(&pool).await?;
            tracing::info!(students = students.len(), "generating predictions");

            let mut generated = 0usize;
            for student in students.iter() {
                match predict_student(&pool, &engine, student).await {
                    Ok(true) => generated += 1,
                    Ok(false) => println!("- {} ({}) skipped: insufficient data", student.name, student.matric_no),
                    Err(err) => {
                        tracing::error!(student = %student.matric_no, error = %err, "prediction failed")
                    }
                }
            }
            println!("Generated predictions for {generated} of {} students.", students.len());
        }
        Commands::Train { csv } => {
            let data = csv
                .as_deref()
                .map(trainer::read_labelled_csv)
                .transpose()?;
            let metrics = match &data {
                Some((x, y)) => engine.train(Some(x), Some(y)),
                None => engine.train(None, None),
            };
            let trained = engine.is_trained();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "trained": trained,
                    "metrics": metrics,
                    "config": {
                        "samples": data.as_ref().map(|(x, _)| x.nrows()).unwrap_or(0),
                        "seed": engine.config().random_seed,
                        "thresholds": engine.thresholds(),
                    }
                }))?
            );
        }
        Commands::Metrics => match engine.metrics() {
            Some(metrics) => println!("{}", serde_json::to_string_pretty(&metrics)?),
            None => println!("Model not trained yet."),
        },
        Commands::Thresholds => {
            println!("{}", serde_json::to_string_pretty(&engine.thresholds())?);
        }
        Commands::Report { out } => {
            let pool = connect().await?;
            let predictions = db::fetch_predictions(&pool).await?;
            let students = db::fetch_students(&pool).await?;

            let mut high_risk = Vec::new();
            for student in students {
                let Some(latest) = db::fetch_latest_prediction(&pool, student.id).await? else {
                    continue;
                };
                if latest.risk_status != RiskStatus::High {
                    continue;
                }
                let assessments = db::fetch_assessments(&pool, student.id).await?;
                let attendances = db::fetch_attendance(&pool, student.id).await?;
                high_risk.push(StudentRiskDetail {
                    student,
                    predicted_score: latest.predicted_score,
                    risk_status: latest.risk_status,
                    attendance_percentage: report::attendance_average(&attendances),
                    assessment_average: report::assessment_average(&assessments),
                });
            }

            let metrics = engine.metrics();
            let report = report::build_report(
                Utc::now().date_naive(),
                &predictions,
                &high_risk,
                metrics.as_ref(),
                engine.thresholds(),
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
