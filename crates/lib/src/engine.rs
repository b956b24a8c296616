//! Build engine seam.
//!
//! The engine that turns a spec file plus repository checkout into a
//! compressed image is an external program. This module defines the contract
//! the coordinator consumes and a command-line adapter for it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::params::JobParameters;

/// Errors from a build engine invocation. Opaque to the coordinator: any of
/// them is fatal for the job.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("build engine exited with code {code:?}")]
  Failed { code: Option<i32> },

  #[error("malformed build engine output: {0}")]
  Output(#[from] serde_json::Error),
}

/// Result bundle of one build engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactBundle {
  /// Zip archive holding the auxiliary build files.
  pub image_package: PathBuf,
  /// The compressed image itself.
  pub image: PathBuf,
  /// Free-form build metadata reported by the engine.
  pub metadata: serde_json::Value,
  /// Job parameters, possibly updated by the engine.
  pub params: JobParameters,
}

/// The external build process.
pub trait BuildEngine {
  /// Run one build in `build_dir` with the given parameters.
  fn run(&self, build_dir: &Path, params: &JobParameters) -> Result<ArtifactBundle, EngineError>;
}

/// Adapter invoking an external engine command.
///
/// The command is called as `<program> <build_dir> <params_file>` where
/// `params_file` holds the parameters as JSON, and must print the result
/// bundle as JSON on stdout.
pub struct CommandEngine {
  program: String,
}

impl CommandEngine {
  pub fn new(program: impl Into<String>) -> Self {
    Self { program: program.into() }
  }
}

impl BuildEngine for CommandEngine {
  fn run(&self, build_dir: &Path, params: &JobParameters) -> Result<ArtifactBundle, EngineError> {
    let params_file = build_dir.join("params.json");
    fs::write(&params_file, serde_json::to_string_pretty(params)?)?;

    info!(program = %self.program, build_dir = %build_dir.display(), "invoking build engine");
    let output = Command::new(&self.program).arg(build_dir).arg(&params_file).output()?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "build engine stderr");
      }
      return Err(EngineError::Failed { code: output.status.code() });
    }

    let bundle = serde_json::from_slice(&output.stdout)?;
    Ok(bundle)
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  fn empty_params() -> JobParameters {
    serde_json::from_str("{}").unwrap()
  }

  #[cfg(unix)]
  fn write_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("engine.sh");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
  }

  #[test]
  #[cfg(unix)]
  fn command_engine_parses_result_bundle() {
    let temp = TempDir::new().unwrap();
    let bundle = serde_json::json!({
      "image_package": "/tmp/repo.zip",
      "image": "/tmp/repo.img.gz",
      "metadata": {"size": 128},
      "params": {}
    });
    let script = write_script(temp.path(), &format!("echo '{}'", bundle));

    let engine = CommandEngine::new(script.to_string_lossy());
    let result = engine.run(temp.path(), &empty_params()).unwrap();

    assert_eq!(result.image_package, PathBuf::from("/tmp/repo.zip"));
    assert_eq!(result.image, PathBuf::from("/tmp/repo.img.gz"));
    assert_eq!(result.metadata["size"], 128);
    // The coordinator wrote the params file for the engine to read.
    assert!(temp.path().join("params.json").exists());
  }

  #[test]
  #[cfg(unix)]
  fn command_engine_failure_is_fatal() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "exit 3");

    let engine = CommandEngine::new(script.to_string_lossy());
    let result = engine.run(temp.path(), &empty_params());

    assert!(matches!(result, Err(EngineError::Failed { code: Some(3) })));
  }

  #[test]
  #[cfg(unix)]
  fn command_engine_garbage_output_is_an_error() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "echo not-json");

    let engine = CommandEngine::new(script.to_string_lossy());
    let result = engine.run(temp.path(), &empty_params());

    assert!(matches!(result, Err(EngineError::Output(_))));
  }
}
