use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Failures from the question-answering collaborator. Always surfaced as a
/// structured failure at the coordinator boundary, never propagated as an
/// unhandled fault.
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(reqwest::Error),
    #[error("request timed out")]
    Timeout,
    /// The backend answered, but refused the request.
    #[error("{0}")]
    Rejected(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Request(err)
        }
    }
}

/// The question-answering collaborator. Only the transport contract is part
/// of this crate; answer quality is somebody else's problem.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    async fn ask(&self, video_id: &str, question: &str) -> Result<String, BackendError>;
}

/// The transcript-processing collaborator driving PROCESS_VIDEO.
#[async_trait]
pub trait VideoProcessor: Send + Sync {
    async fn process(&self, video_id: &str) -> Result<String, BackendError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    video_id: &'a str,
    question: &'a str,
}

#[derive(Deserialize)]
struct ChatReply {
    success: bool,
    response: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct ProcessRequest<'a> {
    video_id: &'a str,
}

#[derive(Deserialize)]
struct ProcessReply {
    success: bool,
    message: Option<String>,
    error: Option<String>,
}

/// HTTP client for the companion API server (`POST /chat`,
/// `POST /process-video`, `{success, response|error}` envelopes).
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AnswerBackend for HttpBackend {
    async fn ask(&self, video_id: &str, question: &str) -> Result<String, BackendError> {
        let url = format!("{}/chat", self.base_url);
        let reply: ChatReply = self
            .client
            .post(&url)
            .json(&ChatRequest { video_id, question })
            .send()
            .await?
            .json()
            .await?;

        if reply.success {
            Ok(reply.response.unwrap_or_default())
        } else {
            Err(BackendError::Rejected(
                reply.error.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }
}

#[async_trait]
impl VideoProcessor for HttpBackend {
    async fn process(&self, video_id: &str) -> Result<String, BackendError> {
        let url = format!("{}/process-video", self.base_url);
        let reply: ProcessReply = self
            .client
            .post(&url)
            .json(&ProcessRequest { video_id })
            .send()
            .await?
            .json()
            .await?;

        if reply.success {
            Ok(reply
                .message
                .unwrap_or_else(|| "Video processed successfully".to_string()))
        } else {
            Err(BackendError::Rejected(
                reply.error.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }
}

/// Stand-in collaborator used when no API server is running. Mirrors the
/// canned reply the extension shipped with before the server existed.
pub struct CannedBackend {
    delay: Duration,
}

impl CannedBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl AnswerBackend for CannedBackend {
    async fn ask(&self, video_id: &str, question: &str) -> Result<String, BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok(format!(
            "This is a simulated response for video {video_id} about: {question}. \
             In your implementation, this would be the actual AI response from your RAG system."
        ))
    }
}

#[async_trait]
impl VideoProcessor for CannedBackend {
    async fn process(&self, _video_id: &str) -> Result<String, BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok("Video processed successfully".to_string())
    }
}
