//! In-memory `MediaModel` for tests. Replays a fixed sequence of file states and
//! counts every call so tests can assert on how the remote service was used.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{LlmError, MediaModel};
use crate::models::video::{FileState, RemoteFile};

pub struct ScriptedModel {
    states: Mutex<VecDeque<FileState>>,
    feedback: Result<String, u16>,
    upload_calls: AtomicUsize,
    status_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedModel {
    /// `states[0]` is returned by the upload, each following entry by one status query.
    /// Once the script is exhausted, status queries keep returning `PROCESSING`.
    pub fn new(states: &[FileState], feedback: &str) -> Self {
        Self {
            states: Mutex::new(states.iter().copied().collect()),
            feedback: Ok(feedback.to_string()),
            upload_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Like `new`, but every generation call fails with the given HTTP status.
    pub fn failing_generation(states: &[FileState], status: u16) -> Self {
        Self {
            feedback: Err(status),
            ..Self::new(states, "")
        }
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }

    fn next_file(&self, name: &str) -> RemoteFile {
        let state = self
            .states
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FileState::Processing);
        RemoteFile {
            name: name.to_string(),
            display_name: Some("Interview Video".to_string()),
            mime_type: Some("video/mp4".to_string()),
            uri: format!("https://example.test/v1beta/{name}"),
            state,
        }
    }
}

#[async_trait]
impl MediaModel for ScriptedModel {
    async fn upload_file(
        &self,
        path: &Path,
        _display_name: &str,
        _mime_type: &str,
    ) -> Result<RemoteFile, LlmError> {
        tokio::fs::metadata(path).await?;
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_file("files/scripted"))
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, LlmError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_file(name))
    }

    async fn generate(&self, prompt: &str, _file: &RemoteFile) -> Result<String, LlmError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        match &self.feedback {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(LlmError::Api {
                status: *status,
                message: "scripted failure".to_string(),
            }),
        }
    }
}
