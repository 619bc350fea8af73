use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::classifier::Classifier;
use crate::config::AppConfig;
use crate::imaging::ImageNormalizer;
use crate::scans::{PgScanStore, PredictionService, ScanStore};
use crate::storage::{LocalUploads, UploadStorage};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub scans: Arc<dyn ScanStore>,
    pub predictor: Arc<PredictionService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        // The model is loaded exactly once here and shared read-only with
        // every request.
        let classifier = load_classifier(&config)?;
        let uploads =
            Arc::new(LocalUploads::new(&config.uploads_dir)) as Arc<dyn UploadStorage>;
        let scans = Arc::new(PgScanStore::new(db.clone())) as Arc<dyn ScanStore>;

        let predictor = Arc::new(PredictionService::new(
            ImageNormalizer::new(config.image_size),
            classifier,
            Arc::clone(&scans),
            uploads,
            Duration::from_secs(config.classifier_timeout_secs),
        ));

        Ok(Self {
            db,
            config,
            scans,
            predictor,
        })
    }
}

#[cfg(feature = "onnx")]
fn load_classifier(config: &AppConfig) -> anyhow::Result<Arc<dyn Classifier>> {
    use crate::classifier::onnx::OnnxClassifier;
    Ok(Arc::new(OnnxClassifier::load(&config.model_path)?))
}

#[cfg(not(feature = "onnx"))]
fn load_classifier(config: &AppConfig) -> anyhow::Result<Arc<dyn Classifier>> {
    anyhow::bail!(
        "no inference backend compiled in; rebuild with `--features onnx` to serve model {}",
        config.model_path.display()
    )
}
