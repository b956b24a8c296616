//! Completion webhooks.
//!
//! After the upload step the coordinator reports back to the hub: once with
//! the full build result, and once more from the finish phase when the build
//! log has landed. Both are plain JSON POSTs; a non-success status is an
//! error the caller decides how to handle.

use reqwest::blocking::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Errors from a completion webhook call.
#[derive(Debug, Error)]
pub enum NotifyError {
  #[error("webhook transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("webhook returned status {0}")]
  Status(u16),
}

/// Payload of the build completion webhook.
///
/// The uploaded-object list and the build metadata travel as JSON strings
/// inside the JSON body. Optional fields that were never set are omitted
/// from the payload entirely.
#[derive(Debug, Serialize)]
pub struct BuildResponse {
  /// JSON-encoded list of uploaded object records.
  pub files: String,
  pub repo_url: Option<String>,
  pub commit: Option<String>,
  pub repo_id: Option<String>,
  pub secret: Option<String>,
  /// JSON-encoded build metadata from the engine.
  pub metadata: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub logfile: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub token: Option<String>,
}

/// Posts completion payloads back to the hub.
pub struct Notifier {
  client: Client,
}

impl Default for Notifier {
  fn default() -> Self {
    Self::new()
  }
}

impl Notifier {
  pub fn new() -> Self {
    Self { client: Client::new() }
  }

  /// Report the finished build to the response endpoint.
  pub fn send_build_data(&self, response_url: &str, response: &BuildResponse) -> Result<(), NotifyError> {
    info!(url = %response_url, "sending build response");
    self.post(response_url, response)
  }

  /// Report the uploaded build log to the logging endpoint.
  pub fn send_build_close<T: Serialize>(&self, logging_url: &str, payload: &T) -> Result<(), NotifyError> {
    info!(url = %logging_url, "sending build close");
    self.post(logging_url, payload)
  }

  fn post<T: Serialize>(&self, url: &str, payload: &T) -> Result<(), NotifyError> {
    let response = self.client.post(url).json(payload).send()?;
    let status = response.status();
    if status.is_success() {
      Ok(())
    } else {
      Err(NotifyError::Status(status.as_u16()))
    }
  }
}
