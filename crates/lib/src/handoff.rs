//! Persisted job state between the build and finish phases.
//!
//! The finish phase runs as a separate process after the build phase exits,
//! so the resolved parameters are written to a versioned state file and
//! reloaded from there. The write is atomic: content goes to a temp file in
//! the same directory first, then renames into place.

use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{HANDOFF_FILENAME, HANDOFF_VERSION};
use crate::params::JobParameters;

/// Errors from loading or saving persisted job state.
#[derive(Debug, Error)]
pub enum HandoffError {
  /// No state file exists. Fatal for the finish phase: it means no build
  /// phase completed on this instance.
  #[error("no persisted job state at {0}")]
  Missing(PathBuf),

  #[error("could not read job state: {0}")]
  Read(#[source] std::io::Error),

  #[error("could not write job state: {0}")]
  Write(#[source] std::io::Error),

  #[error("malformed job state: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("unsupported job state version {0}")]
  UnsupportedVersion(u32),

  #[error("could not serialize job state: {0}")]
  Serialize(#[source] serde_json::Error),
}

/// The state carried from the build phase to the finish phase.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobState {
  pub version: u32,
  pub params: JobParameters,
}

impl JobState {
  pub fn new(params: JobParameters) -> Self {
    Self { version: HANDOFF_VERSION, params }
  }
}

/// Reads and writes the job state file.
pub struct HandoffStore {
  base_dir: PathBuf,
}

impl HandoffStore {
  pub fn new(base_dir: impl Into<PathBuf>) -> Self {
    Self { base_dir: base_dir.into() }
  }

  /// Store in the system temp directory, matching where the build phase of a
  /// fresh instance leaves its state.
  pub fn default_store() -> Self {
    Self::new(env::temp_dir())
  }

  pub fn state_path(&self) -> PathBuf {
    self.base_dir.join(HANDOFF_FILENAME)
  }

  /// Persist the job state atomically.
  pub fn save(&self, state: &JobState) -> Result<(), HandoffError> {
    fs::create_dir_all(&self.base_dir).map_err(HandoffError::Write)?;
    let body = serde_json::to_vec_pretty(state).map_err(HandoffError::Serialize)?;

    let path = self.state_path();
    let temp = path.with_extension("tmp");
    let mut file = fs::File::create(&temp).map_err(HandoffError::Write)?;
    file.write_all(&body).map_err(HandoffError::Write)?;
    file.sync_all().map_err(HandoffError::Write)?;
    fs::rename(&temp, &path).map_err(HandoffError::Write)?;

    debug!(path = %path.display(), "job state saved");
    Ok(())
  }

  /// Load the persisted job state.
  pub fn load(&self) -> Result<JobState, HandoffError> {
    let path = self.state_path();
    let body = match fs::read(&path) {
      Ok(body) => body,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        return Err(HandoffError::Missing(path));
      }
      Err(err) => return Err(HandoffError::Read(err)),
    };

    let state: JobState = serde_json::from_slice(&body).map_err(HandoffError::Parse)?;
    if state.version != HANDOFF_VERSION {
      return Err(HandoffError::UnsupportedVersion(state.version));
    }
    Ok(state)
  }
}

impl Default for HandoffStore {
  fn default() -> Self {
    Self::default_store()
  }
}
