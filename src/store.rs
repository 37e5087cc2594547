//! Artifacts are JSON envelopes:
//! `{ "format": "student-risk/scaler", "version": 1, "fit_id": "<uuid>", "body": {..} }`.
//! Both files of a pair carry the same `fit_id`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::{LogisticRegression, StandardScaler, FEATURE_NAMES};
use crate::error::StoreError;
use crate::models::EvaluationMetrics;

pub const CLASSIFIER_FORMAT: &str = "student-risk/classifier";
pub const SCALER_FORMAT: &str = "student-risk/scaler";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub classifier: LogisticRegression,
    pub scaler: StandardScaler,
    pub metrics: EvaluationMetrics,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    format: String,
    version: u32,
    fit_id: Uuid,
    body: T,
}

#[derive(Serialize, Deserialize)]
struct ClassifierBody {
    feature_names: Vec<String>,
    classifier: LogisticRegression,
    #[serde(default)]
    metrics: Option<EvaluationMetrics>,
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    model_path: PathBuf,
    scaler_path: PathBuf,
}

impl ModelStore {
    pub fn new(model_path: impl Into<PathBuf>, scaler_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            scaler_path: scaler_path.into(),
        }
    }

    pub fn save(&self, model: &TrainedModel) -> Result<(), StoreError> {
        let fit_id = Uuid::new_v4();
        let classifier = Envelope {
            format: CLASSIFIER_FORMAT.to_string(),
            version: FORMAT_VERSION,
            fit_id,
            body: ClassifierBody {
                feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
                classifier: model.classifier.clone(),
                metrics: Some(model.metrics.clone()),
            },
        };
        let scaler = Envelope {
            format: SCALER_FORMAT.to_string(),
            version: FORMAT_VERSION,
            fit_id,
            body: model.scaler.clone(),
        };

        // Nothing is renamed until both temp files are on disk.
        let model_tmp = write_temp(&self.model_path, &classifier)?;
        let scaler_tmp = match write_temp(&self.scaler_path, &scaler) {
            Ok(tmp) => tmp,
            Err(err) => {
                let _ = fs::remove_file(&model_tmp);
                return Err(err);
            }
        };
        rename_into_place(&scaler_tmp, &self.scaler_path)?;
        rename_into_place(&model_tmp, &self.model_path)?;

        tracing::info!(
            %fit_id,
            model = %self.model_path.display(),
            scaler = %self.scaler_path.display(),
            "model artifacts saved"
        );
        Ok(())
    }

    /// `Ok(None)` when either file is absent.
    pub fn load(&self) -> Result<Option<TrainedModel>, StoreError> {
        let model_exists = self.model_path.exists();
        let scaler_exists = self.scaler_path.exists();
        if !(model_exists && scaler_exists) {
            if model_exists || scaler_exists {
                tracing::warn!(
                    model_exists,
                    scaler_exists,
                    "only one model artifact present, treating as not found"
                );
            }
            return Ok(None);
        }

        let classifier: Envelope<ClassifierBody> = read_envelope(&self.model_path, CLASSIFIER_FORMAT)?;
        let scaler: Envelope<StandardScaler> = read_envelope(&self.scaler_path, SCALER_FORMAT)?;
        if classifier.fit_id != scaler.fit_id {
            return Err(StoreError::MismatchedPair {
                classifier: classifier.fit_id,
                scaler: scaler.fit_id,
            });
        }
        let (classifier, scaler) = (classifier.body, scaler.body);

        if classifier.classifier.n_features() != scaler.n_features() {
            return Err(StoreError::FeatureCountMismatch {
                classifier: classifier.classifier.n_features(),
                scaler: scaler.n_features(),
            });
        }

        tracing::info!(model = %self.model_path.display(), "model loaded");
        Ok(Some(TrainedModel {
            classifier: classifier.classifier,
            scaler,
            metrics: classifier.metrics.unwrap_or_else(EvaluationMetrics::placeholder),
        }))
    }
}

fn write_temp<T: Serialize>(path: &Path, value: &T) -> Result<PathBuf, StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let bytes = serde_json::to_vec_pretty(value).map_err(StoreError::Serialize)?;
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp_path).map_err(io_err)?;
    file.write_all(&bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);
    Ok(tmp_path)
}

fn rename_into_place(tmp_path: &Path, path: &Path) -> Result<(), StoreError> {
    fs::rename(tmp_path, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_envelope<T: DeserializeOwned>(path: &Path, format: &str) -> Result<Envelope<T>, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let envelope: Envelope<T> = serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    if envelope.format != format || envelope.version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: envelope.format,
            version: envelope.version,
        });
    }
    Ok(envelope)
}
