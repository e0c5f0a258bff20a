//! CalibrationJob - Stereo calibration lifecycle
//!
//! ## Responsibilities
//!
//! - Accept an uploaded image archive and validate its stereo pairs
//! - Drive the external calibration routine in the background
//! - Publish the packaged result under the public data prefix
//! - Refuse intake and deletion while a calibration is running
//!
//! ## Design
//!
//! - Every status change goes through `JobStatus::transition`
//! - Transitions are persisted before they are acknowledged
//! - Status reads use a published snapshot and never wait for intake or
//!   for the background computation
//! - Persisted status is authoritative at startup; an IN_PROGRESS file left
//!   by a previous process keeps the job gated until it is edited or removed
//!
//! ## Working directory
//!
//! ```text
//! <data_dir>/
//!   status.json
//!   unpacked/          extracted archive
//!   unpacked.staging/  upload being validated
//!   calibration/       calibrator output
//!   calibration.zip    packaged result
//! ```

mod stereo;
mod types;

pub use stereo::count_stereo_pairs;
pub use types::*;

use crate::archive::{self, ArchiveExtractor};
use crate::calibrator::Calibrator;
use crate::change_notifier::{ChangeContext, ChangeNotifier};
use crate::error::{Error, Result};
use crate::models::{JobStatus, StatusChange, StatusDocument};
use crate::status_store::StatusStore;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const UNPACKED_DIR: &str = "unpacked";
const STAGING_DIR: &str = "unpacked.staging";
pub const OUTPUT_DIR: &str = "calibration";
pub const RESULT_FILE_NAME: &str = "calibration.zip";

struct Shared {
    data_dir: PathBuf,
    url_prefix: String,
    extractor: Arc<dyn ArchiveExtractor>,
    calibrator: Arc<dyn Calibrator>,
    notifier: Mutex<ChangeNotifier<StatusDocument>>,
    snapshot: Arc<RwLock<StatusDocument>>,
}

/// CalibrationJob instance
pub struct CalibrationJob {
    shared: Arc<Shared>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CalibrationJob {
    /// Create new CalibrationJob
    ///
    /// # Arguments
    /// * `data_dir` - Job working directory
    /// * `status_file` - Status file name inside `data_dir`
    /// * `url_prefix` - Public URL under which `data_dir` is served
    /// * `extractor` - Archive intake implementation
    /// * `calibrator` - Calibration routine
    pub fn new(
        data_dir: impl Into<PathBuf>,
        status_file: &str,
        url_prefix: impl Into<String>,
        extractor: Arc<dyn ArchiveExtractor>,
        calibrator: Arc<dyn Calibrator>,
    ) -> Result<Self> {
        let data_dir = data_dir.into();
        let store = StatusStore::new(data_dir.join(status_file));
        let status = store
            .load()?
            .unwrap_or_else(StatusDocument::initial_calibration);

        let snapshot = Arc::new(RwLock::new(status.clone()));
        let mut notifier = ChangeNotifier::new(status.clone());
        notifier.add_listener("onSaveStatus", move |new: &StatusDocument, old: &StatusDocument, ctx: &ChangeContext| {
            store.save(new)?;
            tracing::info!(
                operation = ctx.operation,
                request_id = %ctx.request_id,
                from = %old.job_status(),
                to = %new.job_status(),
                "Calibration status saved"
            );
            Ok(())
        });
        let published = snapshot.clone();
        notifier.add_listener("onPublishStatus", move |new: &StatusDocument, _: &StatusDocument, _: &ChangeContext| {
            publish(&published, new.clone());
            Ok(())
        });

        if status.job_status() == JobStatus::InProgress {
            tracing::warn!(
                data_dir = %data_dir.display(),
                "Persisted calibration status is IN_PROGRESS, intake stays closed until it is cleared"
            );
        }

        tracing::info!(
            data_dir = %data_dir.display(),
            status = %status.job_status(),
            "CalibrationJob initialized"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                data_dir,
                url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
                extractor,
                calibrator,
                notifier: Mutex::new(notifier),
                snapshot,
            }),
            task: std::sync::Mutex::new(None),
        })
    }

    /// Job working directory
    pub fn data_dir(&self) -> &Path {
        &self.shared.data_dir
    }

    /// Current status (never waits)
    pub fn get_status(&self) -> StatusDocument {
        match self.shared.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Validate an uploaded archive and start calibrating it
    ///
    /// Returns the IN_PROGRESS document once it is persisted. The
    /// calibration itself continues in the background.
    pub async fn submit_archive(&self, archive: Vec<u8>) -> Result<StatusDocument> {
        let mut notifier = self
            .shared
            .notifier
            .try_lock()
            .map_err(|_| Error::JobBusy(ACCEPT_BUSY_MESSAGE.to_string()))?;

        let next = notifier
            .model()
            .job_status()
            .transition(CalibrationEvent::ArchiveAccepted)?;

        // Previously accepted images stay in place until the upload validates
        let staging = self.shared.data_dir.join(STAGING_DIR);
        remove_dir_if_exists(&staging).await?;
        let (entries, found) = match stage_archive(self.shared.extractor.as_ref(), archive, &staging).await {
            Ok(staged) => staged,
            Err(e) => {
                remove_dir_if_exists(&staging).await?;
                return Err(e);
            }
        };

        let unpacked = self.shared.unpacked_dir();
        remove_dir_if_exists(&unpacked).await?;
        tokio::fs::rename(&staging, &unpacked).await?;

        notifier.request_update(StatusChange::Status(next));
        notifier.request_update(StatusChange::ResultUrl(None));
        notifier.commit(&ChangeContext::new("submit_archive"))?;
        let accepted = notifier.model().clone();
        drop(notifier);

        tracing::info!(entries, stereo_pairs = found, "Archive accepted, calibration started");

        let shared = self.shared.clone();
        let handle = tokio::spawn(async move { shared.run_calibration().await });
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(handle);
        }

        Ok(accepted)
    }

    /// Stereo pairs in the extracted archive
    pub async fn num_of_stereo_images(&self) -> Result<usize> {
        let unpacked = self.shared.unpacked_dir();
        if !tokio::fs::try_exists(&unpacked).await? {
            return Err(Error::NoStereoImages);
        }

        let found = count_stereo_pairs(&unpacked).await?;
        if found < REQUIRED_STEREO_IMAGES {
            return Err(Error::InsufficientStereoImages {
                found,
                required: REQUIRED_STEREO_IMAGES,
            });
        }
        Ok(found)
    }

    /// Remove the working directory and return to READY
    pub async fn delete(&self) -> Result<()> {
        let mut notifier = self.lock_for_delete()?;
        notifier
            .model()
            .job_status()
            .transition(CalibrationEvent::Delete)?;

        remove_dir_if_exists(&self.shared.data_dir).await?;

        let initial = StatusDocument::initial_calibration();
        notifier.replace(initial.clone());
        publish(&self.shared.snapshot, initial);

        tracing::info!(data_dir = %self.shared.data_dir.display(), "Calibration data deleted");
        Ok(())
    }

    /// Remove only the extracted archive
    pub async fn delete_images(&self) -> Result<()> {
        let notifier = self.lock_for_delete()?;
        notifier
            .model()
            .job_status()
            .transition(CalibrationEvent::Delete)?;

        remove_dir_if_exists(&self.shared.unpacked_dir()).await?;

        tracing::info!("Extracted calibration images deleted");
        Ok(())
    }

    /// Wait for a running background calibration to finish
    pub async fn wait_until_settled(&self) {
        let handle = self.task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Calibration task aborted");
            }
        }
    }

    fn lock_for_delete(&self) -> Result<tokio::sync::MutexGuard<'_, ChangeNotifier<StatusDocument>>> {
        self.shared
            .notifier
            .try_lock()
            .map_err(|_| Error::JobBusy(DELETE_BUSY_MESSAGE.to_string()))
    }
}

impl Shared {
    fn unpacked_dir(&self) -> PathBuf {
        self.data_dir.join(UNPACKED_DIR)
    }

    fn result_url(&self) -> String {
        format!("{}/{}", self.url_prefix, RESULT_FILE_NAME)
    }

    async fn compute(&self) -> Result<PathBuf> {
        let output = self.data_dir.join(OUTPUT_DIR);
        remove_dir_if_exists(&output).await?;

        self.calibrator.calibrate(&self.unpacked_dir(), &output).await?;
        archive::package_dir(&output, &self.data_dir.join(RESULT_FILE_NAME)).await
    }

    async fn run_calibration(&self) {
        let outcome = self.compute().await;

        let mut notifier = self.notifier.lock().await;
        let current = notifier.model().job_status();
        let (event, result_url) = match &outcome {
            Ok(zip_path) => {
                tracing::info!(result = %zip_path.display(), "Calibration complete");
                (CalibrationEvent::CalibrationCompleted, Some(self.result_url()))
            }
            Err(e) => {
                tracing::error!(error = %e, "Calibration failed, job returned to READY");
                (CalibrationEvent::CalibrationFailed, None)
            }
        };

        let next = match current.transition(event) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(status = %current, error = %e, "Calibration outcome discarded");
                return;
            }
        };

        let mut recorded = record_outcome(&mut notifier, next, result_url.clone());
        if let Err(e) = &recorded {
            tracing::warn!(error = %e, "Failed to record calibration outcome, retrying");
            recorded = record_outcome(&mut notifier, next, result_url);
        }
        if let Err(e) = &recorded {
            tracing::error!(error = %e, "Failed to record calibration outcome, returning to READY");
            recorded = current
                .transition(CalibrationEvent::CalibrationFailed)
                .and_then(|ready| record_outcome(&mut notifier, ready, None));
        }

        if let Err(e) = recorded {
            // Disk still says IN_PROGRESS; keep the job usable in this process
            let mut ready = notifier.model().clone();
            ready.status = Some(JobStatus::Ready);
            ready.result_url = None;
            notifier.replace(ready.clone());
            publish(&self.snapshot, ready);
            tracing::error!(
                error = %e,
                "Calibration status could not be persisted, job reset to READY in memory only"
            );
        }
    }
}

fn record_outcome(
    notifier: &mut ChangeNotifier<StatusDocument>,
    status: JobStatus,
    result_url: Option<String>,
) -> Result<bool> {
    notifier.request_update(StatusChange::Status(status));
    notifier.request_update(StatusChange::ResultUrl(result_url));
    notifier.commit(&ChangeContext::new("calibrate"))
}

fn publish(snapshot: &RwLock<StatusDocument>, doc: StatusDocument) {
    match snapshot.write() {
        Ok(mut guard) => *guard = doc,
        Err(poisoned) => *poisoned.into_inner() = doc,
    }
}

/// Extract into `staging` and require enough stereo pairs
async fn stage_archive(
    extractor: &dyn ArchiveExtractor,
    archive: Vec<u8>,
    staging: &Path,
) -> Result<(usize, usize)> {
    let entries = extractor.extract(archive, staging).await?;

    let found = count_stereo_pairs(staging).await?;
    if found < REQUIRED_STEREO_IMAGES {
        tracing::warn!(
            entries,
            found,
            required = REQUIRED_STEREO_IMAGES,
            "Archive rejected, not enough stereo pairs"
        );
        return Err(Error::InsufficientStereoImages {
            found,
            required: REQUIRED_STEREO_IMAGES,
        });
    }
    Ok((entries, found))
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::zip_bytes;
    use crate::archive::ZipExtractor;
    use crate::calibrator::{CalibrationError, MockCalibrator};

    fn job(root: &Path, calibrator: Arc<MockCalibrator>) -> CalibrationJob {
        CalibrationJob::new(
            root.join("calibrate"),
            "status.json",
            "/data/calibrate/",
            Arc::new(ZipExtractor::new()),
            calibrator,
        )
        .unwrap()
    }

    fn stereo_archive(pairs: usize) -> Vec<u8> {
        let names: Vec<String> = (0..pairs)
            .flat_map(|i| [format!("capture-0_{}.jpg", i), format!("capture-1_{}.jpg", i)])
            .collect();
        let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &b"jpeg"[..])).collect();
        zip_bytes(&entries)
    }

    fn status_file(job: &CalibrationJob) -> PathBuf {
        job.data_dir().join("status.json")
    }

    #[tokio::test]
    async fn test_fresh_job_is_ready() {
        let root = tempfile::tempdir().unwrap();
        let job = job(root.path(), Arc::new(MockCalibrator::new()));

        assert_eq!(job.get_status(), StatusDocument::initial_calibration());
        let value = serde_json::to_value(job.get_status()).unwrap();
        assert_eq!(value, serde_json::json!({"status": "READY", "index": 0, "totalCaptures": 0}));
    }

    #[tokio::test]
    async fn test_empty_archive_is_insufficient() {
        let root = tempfile::tempdir().unwrap();
        let job = job(root.path(), Arc::new(MockCalibrator::new()));

        let err = job.submit_archive(zip_bytes(&[])).await.unwrap_err();

        assert!(matches!(err, Error::InsufficientStereoImages { found: 0, required: REQUIRED_STEREO_IMAGES }));
        assert_eq!(err.error_code(), "NO_STEREO_IMAGES");
        assert_eq!(job.get_status().job_status(), JobStatus::Ready);
        assert!(!status_file(&job).exists());
    }

    #[tokio::test]
    async fn test_too_few_pairs_stay_ready() {
        let root = tempfile::tempdir().unwrap();
        let job = job(root.path(), Arc::new(MockCalibrator::new()));

        let err = job.submit_archive(stereo_archive(REQUIRED_STEREO_IMAGES - 1)).await.unwrap_err();

        assert!(matches!(err, Error::InsufficientStereoImages { found, .. } if found == REQUIRED_STEREO_IMAGES - 1));
        assert_eq!(job.get_status().job_status(), JobStatus::Ready);
    }

    #[tokio::test]
    async fn test_bad_archive_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let job = job(root.path(), Arc::new(MockCalibrator::new()));

        let err = job.submit_archive(b"not a zip".to_vec()).await.unwrap_err();

        assert!(matches!(err, Error::InvalidArchive(_)));
        assert_eq!(job.get_status().job_status(), JobStatus::Ready);
    }

    #[tokio::test]
    async fn test_in_progress_refuses_intake_and_delete() {
        let root = tempfile::tempdir().unwrap();
        let calibrator = Arc::new(MockCalibrator::held());
        let job = job(root.path(), calibrator.clone());

        let accepted = job.submit_archive(stereo_archive(REQUIRED_STEREO_IMAGES)).await.unwrap();
        assert_eq!(accepted.job_status(), JobStatus::InProgress);
        assert_eq!(job.get_status(), accepted);

        let on_disk = std::fs::read(status_file(&job)).unwrap();

        let err = job.submit_archive(stereo_archive(REQUIRED_STEREO_IMAGES)).await.unwrap_err();
        assert!(matches!(err, Error::JobBusy(ref m) if m == ACCEPT_BUSY_MESSAGE));
        assert_eq!(std::fs::read(status_file(&job)).unwrap(), on_disk);

        let err = job.delete().await.unwrap_err();
        assert!(matches!(err, Error::JobBusy(ref m) if m == DELETE_BUSY_MESSAGE));
        assert!(job.data_dir().exists());

        let err = job.delete_images().await.unwrap_err();
        assert!(matches!(err, Error::JobBusy(_)));
        assert!(job.data_dir().join(UNPACKED_DIR).exists());

        calibrator.release();
        job.wait_until_settled().await;
    }

    #[tokio::test]
    async fn test_completed_calibration_publishes_result() {
        let root = tempfile::tempdir().unwrap();
        let calibrator = Arc::new(MockCalibrator::held());
        let job = job(root.path(), calibrator.clone());

        job.submit_archive(stereo_archive(REQUIRED_STEREO_IMAGES)).await.unwrap();
        calibrator.release();
        job.wait_until_settled().await;

        let status = job.get_status();
        assert_eq!(status.job_status(), JobStatus::Complete);
        assert_eq!(status.result_url.as_deref(), Some("/data/calibrate/calibration.zip"));
        assert!(job.data_dir().join(RESULT_FILE_NAME).exists());

        let stored = StatusStore::new(status_file(&job)).load().unwrap();
        assert_eq!(stored, Some(status));

        job.delete().await.unwrap();
        assert!(!job.data_dir().exists());
        assert_eq!(job.get_status(), StatusDocument::initial_calibration());
    }

    #[tokio::test]
    async fn test_new_archive_after_complete_clears_result() {
        let root = tempfile::tempdir().unwrap();
        let calibrator = Arc::new(MockCalibrator::held());
        let job = job(root.path(), calibrator.clone());

        job.submit_archive(stereo_archive(REQUIRED_STEREO_IMAGES)).await.unwrap();
        calibrator.release();
        job.wait_until_settled().await;

        let accepted = job.submit_archive(stereo_archive(REQUIRED_STEREO_IMAGES + 2)).await.unwrap();
        assert_eq!(accepted.job_status(), JobStatus::InProgress);
        assert!(accepted.result_url.is_none());

        calibrator.release();
        job.wait_until_settled().await;
        assert_eq!(job.get_status().job_status(), JobStatus::Complete);
    }

    #[tokio::test]
    async fn test_failed_calibration_returns_to_ready() {
        let root = tempfile::tempdir().unwrap();
        let calibrator = Arc::new(MockCalibrator::new());
        calibrator.fail_next(CalibrationError::Failed("singular matrix".to_string()));
        let job = job(root.path(), calibrator);

        job.submit_archive(stereo_archive(REQUIRED_STEREO_IMAGES)).await.unwrap();
        job.wait_until_settled().await;

        let status = job.get_status();
        assert_eq!(status.job_status(), JobStatus::Ready);
        assert!(status.result_url.is_none());
    }

    #[tokio::test]
    async fn test_num_of_stereo_images() {
        let root = tempfile::tempdir().unwrap();
        let job = job(root.path(), Arc::new(MockCalibrator::new()));

        assert!(matches!(job.num_of_stereo_images().await, Err(Error::NoStereoImages)));

        let unpacked = job.data_dir().join(UNPACKED_DIR);
        std::fs::create_dir_all(&unpacked).unwrap();
        assert!(matches!(
            job.num_of_stereo_images().await,
            Err(Error::InsufficientStereoImages { found: 0, .. })
        ));

        for i in 0..REQUIRED_STEREO_IMAGES {
            for camera in 0..2 {
                std::fs::write(unpacked.join(format!("capture-{}_{}.jpg", camera, i)), b"x").unwrap();
            }
        }
        assert_eq!(job.num_of_stereo_images().await.unwrap(), REQUIRED_STEREO_IMAGES);

        job.delete_images().await.unwrap();
        assert!(!unpacked.exists());
    }

    #[tokio::test]
    async fn test_persisted_in_progress_is_honored() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("calibrate");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("status.json"), r#"{"status": "IN_PROGRESS"}"#).unwrap();

        let job = job(root.path(), Arc::new(MockCalibrator::new()));
        assert_eq!(job.get_status().job_status(), JobStatus::InProgress);

        let err = job.submit_archive(stereo_archive(REQUIRED_STEREO_IMAGES)).await.unwrap_err();
        assert!(matches!(err, Error::JobBusy(_)));
        assert!(matches!(job.delete().await, Err(Error::JobBusy(_))));
        assert!(dir.exists());
    }

    #[tokio::test]
    async fn test_two_images_per_index_count_as_pairs() {
        let root = tempfile::tempdir().unwrap();
        let job = job(root.path(), Arc::new(MockCalibrator::new()));
        let unpacked = job.data_dir().join(UNPACKED_DIR);
        std::fs::create_dir_all(&unpacked).unwrap();

        for i in 0..REQUIRED_STEREO_IMAGES {
            std::fs::write(unpacked.join(format!("capture-{}_1.jpg", i)), b"left").unwrap();
            std::fs::write(unpacked.join(format!("capture-{}_2.jpg", i)), b"right").unwrap();
        }

        assert_eq!(job.num_of_stereo_images().await.unwrap(), REQUIRED_STEREO_IMAGES);
    }

    #[tokio::test]
    async fn test_delete_while_ready_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let job = job(root.path(), Arc::new(MockCalibrator::new()));
        std::fs::create_dir_all(job.data_dir().join(UNPACKED_DIR)).unwrap();
        std::fs::write(job.data_dir().join(UNPACKED_DIR).join("capture-0_0.jpg"), b"x").unwrap();
        assert_eq!(job.get_status().job_status(), JobStatus::Ready);

        job.delete().await.unwrap();

        assert!(!job.data_dir().exists());
        assert_eq!(job.get_status(), StatusDocument::initial_calibration());
    }

    #[tokio::test]
    async fn test_unrecordable_outcome_does_not_leave_job_in_progress() {
        let root = tempfile::tempdir().unwrap();
        let calibrator = Arc::new(MockCalibrator::held());
        let job = job(root.path(), calibrator.clone());

        job.submit_archive(stereo_archive(REQUIRED_STEREO_IMAGES)).await.unwrap();
        let blocker = status_file(&job);
        std::fs::remove_file(&blocker).unwrap();
        std::fs::create_dir_all(blocker.join("occupied")).unwrap();

        calibrator.release();
        job.wait_until_settled().await;

        assert_eq!(job.get_status().job_status(), JobStatus::Ready);
        job.delete().await.unwrap();
        assert!(!job.data_dir().exists());
    }

    #[tokio::test]
    async fn test_rejected_upload_keeps_accepted_images() {
        let root = tempfile::tempdir().unwrap();
        let job = job(root.path(), Arc::new(MockCalibrator::new()));

        job.submit_archive(stereo_archive(REQUIRED_STEREO_IMAGES)).await.unwrap();
        job.wait_until_settled().await;
        assert_eq!(job.get_status().job_status(), JobStatus::Complete);

        let err = job.submit_archive(stereo_archive(1)).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientStereoImages { found: 1, .. }));
        let err = job.submit_archive(b"not a zip".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArchive(_)));

        assert_eq!(job.num_of_stereo_images().await.unwrap(), REQUIRED_STEREO_IMAGES);
        assert!(!job.data_dir().join(STAGING_DIR).exists());
        assert_eq!(job.get_status().job_status(), JobStatus::Complete);
    }
}
