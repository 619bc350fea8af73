use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::repo_types::Role;
use crate::classifier::{ClassificationResult, Classifier};
use crate::error::{AppError, AppResult};
use crate::imaging::ImageNormalizer;
use crate::scans::repo::ScanStore;
use crate::scans::repo_types::{NewScan, ScanRecord};
use crate::storage::UploadStorage;

/// Orchestrates one prediction request end to end: normalize the upload,
/// persist the raw bytes for audit, run the classifier, reduce the
/// probability vector and append the scan record.
///
/// Every collaborator is injected, so the whole pipeline runs under test
/// with a substitute classifier and store. There are no retries anywhere; a
/// failed classification is reported to the caller, who decides whether to
/// re-submit.
pub struct PredictionService {
    normalizer: ImageNormalizer,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn ScanStore>,
    uploads: Arc<dyn UploadStorage>,
    timeout: Duration,
}

impl PredictionService {
    pub fn new(
        normalizer: ImageNormalizer,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn ScanStore>,
        uploads: Arc<dyn UploadStorage>,
        timeout: Duration,
    ) -> Self {
        Self {
            normalizer,
            classifier,
            store,
            uploads,
            timeout,
        }
    }

    /// Classify an uploaded scan for `user_id` and record the result.
    ///
    /// Side-effect ordering: decoding happens first, so an undecodable
    /// upload persists nothing. The raw file is saved before inference;
    /// a classifier failure or timeout therefore leaves the file on disk
    /// with no record — an accepted, garbage-collectible audit artifact.
    /// A store failure after successful inference is surfaced as a distinct
    /// storage error so callers can tell "no result" from "result computed
    /// but not recorded".
    pub async fn classify(
        &self,
        user_id: Uuid,
        role: Role,
        filename: &str,
        bytes: Bytes,
    ) -> AppResult<ScanRecord> {
        if role != Role::Patient {
            return Err(AppError::Forbidden(
                "only patients can submit scans for classification".into(),
            ));
        }

        let tensor = self
            .normalizer
            .normalize(&bytes)
            .map_err(AppError::ImageDecode)?;

        let key = upload_key(OffsetDateTime::now_utc(), filename)?;
        let image_path = self
            .uploads
            .save(&key, bytes)
            .await
            .map_err(AppError::Storage)?;

        // The model call is blocking and CPU-bound; run it on the blocking
        // pool under the configured deadline.
        let classifier = Arc::clone(&self.classifier);
        let task = tokio::task::spawn_blocking(move || classifier.predict(&tensor));
        let probabilities = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                warn!(user_id = %user_id, path = %image_path, timeout = ?self.timeout,
                      "classification timed out; upload kept on disk");
                return Err(AppError::ClassifierTimeout(self.timeout));
            }
            Ok(Err(join_err)) => {
                return Err(AppError::ClassifierUnavailable(anyhow::anyhow!(join_err)))
            }
            Ok(Ok(Err(e))) => {
                warn!(user_id = %user_id, path = %image_path,
                      "classifier failed; upload kept on disk");
                return Err(AppError::ClassifierUnavailable(e));
            }
            Ok(Ok(Ok(probs))) => probs,
        };

        let result = ClassificationResult::from_probabilities(probabilities)
            .map_err(AppError::ClassifierUnavailable)?;

        let record = self
            .store
            .append(NewScan {
                user_id,
                image_path,
                predicted_label: result.label,
                confidence: result.confidence,
                probabilities: result.probabilities,
            })
            .await
            .map_err(AppError::Storage)?;

        info!(
            user_id = %user_id,
            scan_id = %record.id,
            label = %record.predicted_label,
            confidence = record.confidence,
            "scan classified"
        );
        Ok(record)
    }
}

/// Storage key for a raw upload: time of receipt plus the sanitized original
/// filename. The filename is informational only and never trusted; same
/// second, same name collisions are accepted.
fn upload_key(now: OffsetDateTime, filename: &str) -> AppResult<String> {
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = now
        .format(&format)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    let safe: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = if safe.is_empty() {
        "scan".to_string()
    } else {
        safe
    };
    Ok(format!("{stamp}_{safe}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ScanLabel;
    use crate::scans::repo::MemoryScanStore;
    use crate::storage::LocalUploads;
    use axum::async_trait;
    use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma};
    use ndarray::Array4;
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::datetime;

    struct StubClassifier {
        probabilities: Vec<f64>,
        calls: AtomicUsize,
    }

    impl StubClassifier {
        fn new(probabilities: Vec<f64>) -> Arc<Self> {
            Arc::new(Self {
                probabilities,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Classifier for StubClassifier {
        fn predict(&self, _input: &Array4<f32>) -> anyhow::Result<Vec<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.probabilities.clone())
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn predict(&self, _input: &Array4<f32>) -> anyhow::Result<Vec<f64>> {
            anyhow::bail!("model artifact failed to load")
        }
    }

    struct SlowClassifier;

    impl Classifier for SlowClassifier {
        fn predict(&self, _input: &Array4<f32>) -> anyhow::Result<Vec<f64>> {
            std::thread::sleep(Duration::from_millis(250));
            Ok(vec![0.25, 0.25, 0.25, 0.25])
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ScanStore for FailingStore {
        async fn append(&self, _scan: NewScan) -> anyhow::Result<ScanRecord> {
            anyhow::bail!("connection reset")
        }
        async fn history(&self, _user_id: Uuid) -> anyhow::Result<Vec<ScanRecord>> {
            Ok(Vec::new())
        }
        async fn latest(&self, _user_id: Uuid) -> anyhow::Result<Option<ScanRecord>> {
            Ok(None)
        }
    }

    struct TestEnv {
        service: PredictionService,
        store: Arc<MemoryScanStore>,
        uploads_dir: PathBuf,
    }

    impl Drop for TestEnv {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.uploads_dir).ok();
        }
    }

    fn env_with(classifier: Arc<dyn Classifier>, timeout: Duration) -> TestEnv {
        let uploads_dir =
            std::env::temp_dir().join(format!("neuroscan-scans-{}", Uuid::new_v4()));
        let store = Arc::new(MemoryScanStore::new());
        let service = PredictionService::new(
            ImageNormalizer::new(128),
            classifier,
            Arc::clone(&store) as Arc<dyn ScanStore>,
            Arc::new(LocalUploads::new(&uploads_dir)),
            timeout,
        );
        TestEnv {
            service,
            store,
            uploads_dir,
        }
    }

    fn white_png() -> Bytes {
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 10, Luma([255u8])))
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .expect("png encode");
        Bytes::from(buf)
    }

    fn stored_upload_count(dir: &PathBuf) -> usize {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    #[tokio::test]
    async fn white_scan_classifies_and_persists_one_record() {
        let env = env_with(
            StubClassifier::new(vec![0.7, 0.1, 0.1, 0.1]),
            Duration::from_secs(5),
        );
        let user_id = Uuid::new_v4();

        let record = env
            .service
            .classify(user_id, Role::Patient, "scan.png", white_png())
            .await
            .expect("classification succeeds");

        assert_eq!(record.predicted_label, ScanLabel::NonDemented);
        assert_eq!(record.confidence, 0.7);
        assert_eq!(record.probabilities, vec![0.7, 0.1, 0.1, 0.1]);
        assert_eq!(record.user_id, user_id);

        let history = env.store.history(user_id).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], record);

        assert!(std::fs::metadata(&record.image_path).is_ok());
        assert_eq!(stored_upload_count(&env.uploads_dir), 1);
    }

    #[tokio::test]
    async fn corrupt_bytes_abort_before_any_side_effect() {
        let classifier = StubClassifier::new(vec![0.7, 0.1, 0.1, 0.1]);
        let env = env_with(Arc::clone(&classifier) as Arc<dyn Classifier>, Duration::from_secs(5));
        let user_id = Uuid::new_v4();

        let err = env
            .service
            .classify(user_id, Role::Patient, "scan.png", Bytes::from_static(b"not-an-image"))
            .await
            .expect_err("must fail");

        assert_eq!(err.kind(), "image_decode");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert!(env.store.history(user_id).await.expect("history").is_empty());
        assert_eq!(stored_upload_count(&env.uploads_dir), 0);
    }

    #[tokio::test]
    async fn admin_role_is_rejected_before_any_work() {
        let classifier = StubClassifier::new(vec![0.7, 0.1, 0.1, 0.1]);
        let env = env_with(Arc::clone(&classifier) as Arc<dyn Classifier>, Duration::from_secs(5));

        let err = env
            .service
            .classify(Uuid::new_v4(), Role::Admin, "scan.png", white_png())
            .await
            .expect_err("must fail");

        assert_eq!(err.kind(), "forbidden");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(stored_upload_count(&env.uploads_dir), 0);
    }

    #[tokio::test]
    async fn classifier_failure_keeps_the_upload_but_records_nothing() {
        let env = env_with(Arc::new(FailingClassifier), Duration::from_secs(5));
        let user_id = Uuid::new_v4();

        let err = env
            .service
            .classify(user_id, Role::Patient, "scan.png", white_png())
            .await
            .expect_err("must fail");

        assert_eq!(err.kind(), "classifier_unavailable");
        assert!(env.store.history(user_id).await.expect("history").is_empty());
        // The documented asymmetry: the raw upload was already saved.
        assert_eq!(stored_upload_count(&env.uploads_dir), 1);
    }

    #[tokio::test]
    async fn slow_classifier_times_out() {
        let env = env_with(Arc::new(SlowClassifier), Duration::from_millis(20));
        let user_id = Uuid::new_v4();

        let err = env
            .service
            .classify(user_id, Role::Patient, "scan.png", white_png())
            .await
            .expect_err("must fail");

        assert_eq!(err.kind(), "classifier_timeout");
        assert!(env.store.history(user_id).await.expect("history").is_empty());
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_storage_not_as_classifier_error() {
        let uploads_dir =
            std::env::temp_dir().join(format!("neuroscan-scans-{}", Uuid::new_v4()));
        let service = PredictionService::new(
            ImageNormalizer::new(128),
            StubClassifier::new(vec![0.7, 0.1, 0.1, 0.1]),
            Arc::new(FailingStore),
            Arc::new(LocalUploads::new(&uploads_dir)),
            Duration::from_secs(5),
        );

        let err = service
            .classify(Uuid::new_v4(), Role::Patient, "scan.png", white_png())
            .await
            .expect_err("must fail");

        assert_eq!(err.kind(), "storage");
        std::fs::remove_dir_all(&uploads_dir).ok();
    }

    #[tokio::test]
    async fn back_to_back_scans_build_a_newest_first_history() {
        let env = env_with(
            StubClassifier::new(vec![0.1, 0.2, 0.6, 0.1]),
            Duration::from_secs(5),
        );
        let user_id = Uuid::new_v4();

        let first = env
            .service
            .classify(user_id, Role::Patient, "a.png", white_png())
            .await
            .expect("first");
        let second = env
            .service
            .classify(user_id, Role::Patient, "b.png", white_png())
            .await
            .expect("second");

        assert_ne!(first.id, second.id);

        let history = env.store.history(user_id).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);
        assert!(history.iter().all(|r| r.predicted_label == ScanLabel::MildDemented));
    }

    #[test]
    fn upload_key_is_timestamp_plus_sanitized_filename() {
        let now = datetime!(2024-03-05 07:08:09 UTC);
        let key = upload_key(now, "my scan (1).png").expect("key");
        assert_eq!(key, "20240305_070809_my_scan__1_.png");
    }

    #[test]
    fn upload_key_falls_back_when_filename_is_empty() {
        let now = datetime!(2024-03-05 07:08:09 UTC);
        let key = upload_key(now, "").expect("key");
        assert_eq!(key, "20240305_070809_scan");
    }
}
