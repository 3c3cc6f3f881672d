//! Local storage for uploaded videos, one file per session.
//!
//! Uploads are streamed into a `.part` sibling of their final path and renamed
//! into place only once every byte is on disk, so a failed or abandoned upload
//! never disturbs the video a session already has.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::video::{StoredVideo, VideoFormat};

#[derive(Debug, Clone)]
pub struct VideoStorage {
    root: PathBuf,
}

impl VideoStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// `<root>/<session_id>.<ext>`: sessions never share a path.
    pub fn path_for(&self, session_id: Uuid, format: VideoFormat) -> PathBuf {
        self.root.join(format!("{session_id}.{}", format.extension()))
    }

    /// Opens a temporary file for a new upload of `session_id`.
    pub async fn begin(
        &self,
        session_id: Uuid,
        file_name: &str,
        format: VideoFormat,
    ) -> std::io::Result<PendingUpload> {
        let final_path = self.path_for(session_id, format);
        let temp_path = self
            .root
            .join(format!("{session_id}.{}.part", format.extension()));
        let file = File::create(&temp_path).await?;

        Ok(PendingUpload {
            file,
            temp_path,
            final_path,
            session_id,
            file_name: file_name.to_string(),
            format,
            size_bytes: 0,
            committed: false,
        })
    }

    /// Deletes a stored video. A file that is already gone is not an error.
    pub async fn remove(&self, video: &StoredVideo) -> std::io::Result<()> {
        match tokio::fs::remove_file(&video.local_path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// An upload being written chunk by chunk. Dropping it before `commit` deletes
/// the partial file.
#[derive(Debug)]
pub struct PendingUpload {
    file: File,
    temp_path: PathBuf,
    final_path: PathBuf,
    session_id: Uuid,
    file_name: String,
    format: VideoFormat,
    size_bytes: u64,
    committed: bool,
}

impl PendingUpload {
    pub async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.file.write_all(chunk).await?;
        self.size_bytes += chunk.len() as u64;
        Ok(())
    }

    /// Moves the finished upload to the session's path, then deletes `previous`
    /// if it lived under a different extension.
    pub async fn commit(mut self, previous: Option<&StoredVideo>) -> std::io::Result<StoredVideo> {
        self.file.flush().await?;
        tokio::fs::rename(&self.temp_path, &self.final_path).await?;
        self.committed = true;

        if let Some(previous) = previous.filter(|p| p.local_path != self.final_path) {
            match tokio::fs::remove_file(&previous.local_path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
                _ => {}
            }
        }

        info!(
            "Stored {} ({} bytes) for session {}",
            self.file_name, self.size_bytes, self.session_id
        );

        Ok(StoredVideo {
            session_id: self.session_id,
            local_path: self.final_path.clone(),
            file_name: self.file_name.clone(),
            format: self.format,
            size_bytes: self.size_bytes,
            uploaded_at: Utc::now(),
        })
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.temp_path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                debug!("Could not remove {}: {e}", self.temp_path.display())
            }
            _ => debug!("Discarded partial upload {}", self.temp_path.display()),
        }
    }
}
