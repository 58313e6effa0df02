//! Remote control-service client
//!
//! The remote service is fixed and outside this engine's control; the
//! trait is the seam the orchestrator and the lifecycle coordinator are
//! written against, with [`HttpRemote`] as the production implementation.

use async_trait::async_trait;
use grille_common::protocol::Submission;
use std::time::Duration;
use tracing::debug;

use crate::sync::BatchPayload;
use crate::{Error, Result};

const USER_AGENT: &str = "GrilleEngine/0.1.0";

/// Boundary to the remote control service
///
/// A call either completes, fails, or times out; there is no mid-flight
/// cancellation. Transport failures and server rejections are both
/// recoverable by the caller through the offline queue.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Upload one control in the submission encoding
    async fn submit_control(&self, residence_id: &str, submission: &Submission) -> Result<()>;

    /// Fetch the fetch/resume stream of the residence's last submitted
    /// control, `None` when it has none
    async fn fetch_previous(&self, residence_id: &str) -> Result<Option<String>>;

    /// Submit the whole offline queue as one batch; returns the raw reply
    async fn submit_batch(&self, payload: &BatchPayload) -> Result<String>;

    /// Confirm server-side closure of a control
    async fn close_control(&self, residence_id: &str, note: Option<u8>) -> Result<()>;

    /// Send the final close-of-control notification
    async fn notify(&self, recipient: &str, message: &str) -> Result<()>;
}

/// HTTP implementation of the remote service boundary
pub struct HttpRemote {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    /// Build a client with the fixed submission timeout
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn submit_control(&self, residence_id: &str, submission: &Submission) -> Result<()> {
        debug!(residence_id, "Submitting control");

        let params = [
            ("residence", residence_id),
            ("grille", submission.grille.as_str()),
            ("comments", submission.comments.as_str()),
        ];

        let response = self
            .http_client
            .post(self.url("/controls/submit"))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rejected(body));
        }
        Ok(())
    }

    async fn fetch_previous(&self, residence_id: &str) -> Result<Option<String>> {
        debug!(residence_id, "Fetching previous control");

        let response = self
            .http_client
            .get(self.url(&format!("/controls/{}/previous", residence_id)))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rejected(body));
        }

        let stream = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Some(stream))
    }

    async fn submit_batch(&self, payload: &BatchPayload) -> Result<String> {
        debug!(residences = payload.len(), "Submitting synchronization batch");

        let response = self
            .http_client
            .post(self.url("/controls/sync"))
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Rejected(body));
        }
        Ok(body)
    }

    async fn close_control(&self, residence_id: &str, note: Option<u8>) -> Result<()> {
        debug!(residence_id, "Closing control");

        let note = note.map(|n| n.to_string()).unwrap_or_default();
        let params = [("residence", residence_id), ("note", note.as_str())];

        let response = self
            .http_client
            .post(self.url("/controls/close"))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rejected(body));
        }
        Ok(())
    }

    async fn notify(&self, recipient: &str, message: &str) -> Result<()> {
        debug!(recipient, "Sending close notification");

        let params = [("recipient", recipient), ("message", message)];
        let response = self
            .http_client
            .post(self.url("/notify"))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rejected(body));
        }
        Ok(())
    }
}
