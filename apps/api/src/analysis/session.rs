//! Per-session analysis context.
//!
//! Each browser session owns its own stored video, remote processing phase and
//! cancellation token. Nothing here outlives the process.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::video::StoredVideo;

/// Where a session currently is in the upload → process → generate flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum AnalysisPhase {
    Uploaded,
    Ingesting,
    Processing { polls: u32 },
    Generating,
    Completed,
    Failed { reason: String },
    Cancelled,
}

impl AnalysisPhase {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            AnalysisPhase::Ingesting | AnalysisPhase::Processing { .. } | AnalysisPhase::Generating
        )
    }
}

#[derive(Debug)]
struct Session {
    video: StoredVideo,
    phase: AnalysisPhase,
    cancel: Option<CancellationToken>,
    /// A replacement video is being written; no analysis may start meanwhile.
    uploading: bool,
    updated_at: DateTime<Utc>,
}

impl Session {
    fn new(video: StoredVideo) -> Self {
        Self {
            video,
            phase: AnalysisPhase::Uploaded,
            cancel: None,
            uploading: false,
            updated_at: Utc::now(),
        }
    }

    fn is_busy(&self) -> bool {
        self.uploading || self.phase.is_running()
    }

    fn set_phase(&mut self, phase: AnalysisPhase) {
        if !phase.is_running() {
            self.cancel = None;
        }
        self.phase = phase;
        self.updated_at = Utc::now();
    }
}

/// Read-only view of a session returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub phase: AnalysisPhase,
    pub uploading: bool,
    pub video: StoredVideo,
    pub updated_at: DateTime<Utc>,
}

/// In-memory session registry shared by all handlers.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Session>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Session>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a session around a video that is already stored.
    pub fn open(&self, id: Uuid, video: StoredVideo) {
        self.write().insert(id, Session::new(video));
    }

    pub fn snapshot(&self, id: Uuid) -> Result<SessionSnapshot, AppError> {
        let sessions = self.read();
        let session = sessions.get(&id).ok_or_else(|| not_found(id))?;
        Ok(SessionSnapshot {
            session_id: id,
            phase: session.phase.clone(),
            uploading: session.uploading,
            video: session.video.clone(),
            updated_at: session.updated_at,
        })
    }

    pub fn video(&self, id: Uuid) -> Result<StoredVideo, AppError> {
        Ok(self.read().get(&id).ok_or_else(|| not_found(id))?.video.clone())
    }

    /// Reserves the session for a replacement upload. Until the returned slot is
    /// finished or dropped, analyses and other uploads are refused.
    pub fn begin_upload(&self, id: Uuid) -> Result<UploadSlot, AppError> {
        let mut sessions = self.write();
        let session = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
        if session.is_busy() {
            return Err(busy(id));
        }
        session.uploading = true;
        Ok(UploadSlot {
            sessions: self.clone(),
            id,
            previous: session.video.clone(),
            finished: false,
        })
    }

    fn release_upload(&self, id: Uuid) {
        if let Some(session) = self.write().get_mut(&id) {
            session.uploading = false;
        }
    }

    /// Marks the session as analysing and hands out its video plus a fresh
    /// cancellation token. At most one analysis runs per session.
    pub fn begin_analysis(&self, id: Uuid) -> Result<(StoredVideo, CancellationToken), AppError> {
        let mut sessions = self.write();
        let session = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
        if session.is_busy() {
            return Err(busy(id));
        }

        let token = CancellationToken::new();
        session.cancel = Some(token.clone());
        session.set_phase(AnalysisPhase::Ingesting);
        Ok((session.video.clone(), token))
    }

    /// Records a phase change. Sessions deleted mid-analysis are ignored.
    pub fn set_phase(&self, id: Uuid, phase: AnalysisPhase) {
        if let Some(session) = self.write().get_mut(&id) {
            session.set_phase(phase);
        }
    }

    pub fn cancel(&self, id: Uuid) -> Result<(), AppError> {
        let sessions = self.read();
        let session = sessions.get(&id).ok_or_else(|| not_found(id))?;
        match (&session.phase, &session.cancel) {
            (phase, Some(token)) if phase.is_running() => {
                token.cancel();
                Ok(())
            }
            _ => Err(AppError::Conflict(format!(
                "No analysis is running for session {id}"
            ))),
        }
    }

    /// Forgets the session, cancelling any running analysis. Returns its video so
    /// the caller can delete the file.
    pub fn remove(&self, id: Uuid) -> Result<StoredVideo, AppError> {
        let session = self.write().remove(&id).ok_or_else(|| not_found(id))?;
        if let Some(token) = session.cancel {
            token.cancel();
        }
        Ok(session.video)
    }

    #[cfg(test)]
    pub fn count(&self) -> usize {
        self.read().len()
    }
}

/// A session reserved for a replacement upload. Dropping it without `finish`
/// leaves the session exactly as it was.
pub struct UploadSlot {
    sessions: SessionStore,
    id: Uuid,
    previous: StoredVideo,
    finished: bool,
}

impl UploadSlot {
    /// The video the upload replaces.
    pub fn previous(&self) -> &StoredVideo {
        &self.previous
    }

    /// Swaps in the new video. Fails if the session was deleted meanwhile.
    pub fn finish(mut self, video: StoredVideo) -> Result<(), AppError> {
        self.finished = true;
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(&self.id).ok_or_else(|| not_found(self.id))?;
        session.video = video;
        session.uploading = false;
        session.set_phase(AnalysisPhase::Uploaded);
        Ok(())
    }
}

impl Drop for UploadSlot {
    fn drop(&mut self) {
        if !self.finished {
            self.sessions.release_upload(self.id);
        }
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Session {id} not found"))
}

fn busy(id: Uuid) -> AppError {
    AppError::Conflict(format!(
        "Session {id} is busy: an analysis or upload is in progress"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::storage::VideoStorage;
    use crate::models::video::VideoFormat;
    use std::path::PathBuf;

    fn video(session_id: Uuid) -> StoredVideo {
        StoredVideo {
            session_id,
            local_path: PathBuf::from(format!("/tmp/{session_id}.mp4")),
            file_name: "interview.mp4".to_string(),
            format: VideoFormat::Mp4,
            size_bytes: 3,
            uploaded_at: Utc::now(),
        }
    }

    fn opened(store: &SessionStore) -> Uuid {
        let id = Uuid::new_v4();
        store.open(id, video(id));
        id
    }

    #[test]
    fn test_opened_session_is_uploaded() {
        let store = SessionStore::new();
        let id = opened(&store);
        let snapshot = store.snapshot(id).unwrap();
        assert_eq!(snapshot.phase, AnalysisPhase::Uploaded);
        assert!(!snapshot.uploading);
        assert_eq!(snapshot.video.session_id, id);
    }

    #[test]
    fn test_unknown_session_is_not_found() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.snapshot(id), Err(AppError::NotFound(_))));
        assert!(matches!(store.begin_analysis(id), Err(AppError::NotFound(_))));
        assert!(matches!(store.begin_upload(id), Err(AppError::NotFound(_))));
        assert!(matches!(store.remove(id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_only_one_analysis_per_session() {
        let store = SessionStore::new();
        let id = opened(&store);

        let (_video, _token) = store.begin_analysis(id).unwrap();
        assert!(matches!(store.begin_analysis(id), Err(AppError::Conflict(_))));
        assert!(matches!(store.begin_upload(id), Err(AppError::Conflict(_))));

        store.set_phase(id, AnalysisPhase::Completed);
        assert!(store.begin_analysis(id).is_ok());
    }

    #[test]
    fn test_upload_in_progress_blocks_analysis_and_other_uploads() {
        let store = SessionStore::new();
        let id = opened(&store);

        let slot = store.begin_upload(id).unwrap();
        assert!(store.snapshot(id).unwrap().uploading);
        assert!(matches!(store.begin_analysis(id), Err(AppError::Conflict(_))));
        assert!(matches!(store.begin_upload(id), Err(AppError::Conflict(_))));

        let mut replacement = video(id);
        replacement.file_name = "retake.mp4".to_string();
        slot.finish(replacement).unwrap();

        let snapshot = store.snapshot(id).unwrap();
        assert!(!snapshot.uploading);
        assert_eq!(snapshot.video.file_name, "retake.mp4");
        assert!(store.begin_analysis(id).is_ok());
    }

    #[test]
    fn test_dropped_upload_leaves_session_unchanged() {
        let store = SessionStore::new();
        let id = opened(&store);
        store.set_phase(id, AnalysisPhase::Completed);

        let slot = store.begin_upload(id).unwrap();
        assert_eq!(slot.previous().file_name, "interview.mp4");
        drop(slot);

        let snapshot = store.snapshot(id).unwrap();
        assert!(!snapshot.uploading);
        assert_eq!(snapshot.phase, AnalysisPhase::Completed);
        assert_eq!(snapshot.video.file_name, "interview.mp4");
        assert!(store.begin_analysis(id).is_ok());
    }

    #[test]
    fn test_finishing_upload_for_deleted_session_fails() {
        let store = SessionStore::new();
        let id = opened(&store);
        let slot = store.begin_upload(id).unwrap();
        store.remove(id).unwrap();
        assert!(matches!(slot.finish(video(id)), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_analysis_started_during_upload_keeps_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VideoStorage::new(dir.path());
        let store = SessionStore::new();
        let id = Uuid::new_v4();

        let mut upload = storage.begin(id, "a.mp4", VideoFormat::Mp4).await.unwrap();
        upload.write(b"under analysis").await.unwrap();
        store.open(id, upload.commit(None).await.unwrap());

        // a replacement upload reserves the session before touching the disk
        let slot = store.begin_upload(id).unwrap();
        assert!(matches!(store.begin_analysis(id), Err(AppError::Conflict(_))));

        let mut upload = storage.begin(id, "b.mov", VideoFormat::Mov).await.unwrap();
        upload.write(b"replacement").await.unwrap();
        let replacement = upload.commit(Some(slot.previous())).await.unwrap();
        slot.finish(replacement.clone()).unwrap();

        let (analysed, _token) = store.begin_analysis(id).unwrap();
        assert_eq!(analysed.local_path, replacement.local_path);
        assert_eq!(
            tokio::fs::read(&analysed.local_path).await.unwrap(),
            b"replacement"
        );
    }

    #[test]
    fn test_cancel_trips_token_and_only_while_running() {
        let store = SessionStore::new();
        let id = opened(&store);
        assert!(matches!(store.cancel(id), Err(AppError::Conflict(_))));

        let (_video, token) = store.begin_analysis(id).unwrap();
        store.cancel(id).unwrap();
        assert!(token.is_cancelled());

        store.set_phase(id, AnalysisPhase::Cancelled);
        assert!(matches!(store.cancel(id), Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_remove_cancels_and_returns_video() {
        let store = SessionStore::new();
        let id = opened(&store);
        let (_video, token) = store.begin_analysis(id).unwrap();

        let removed = store.remove(id).unwrap();
        assert!(token.is_cancelled());
        assert_eq!(removed.session_id, id);

        // late phase updates from the analysis task are dropped
        store.set_phase(id, AnalysisPhase::Completed);
        assert!(store.snapshot(id).is_err());
    }

    #[test]
    fn test_snapshot_flattens_phase() {
        let store = SessionStore::new();
        let id = opened(&store);
        store.set_phase(id, AnalysisPhase::Processing { polls: 3 });
        let value = serde_json::to_value(store.snapshot(id).unwrap()).unwrap();
        assert_eq!(value["phase"], "processing");
        assert_eq!(value["polls"], 3);
        assert_eq!(value["uploading"], false);
        assert_eq!(value["session_id"], id.to_string());
    }
}
