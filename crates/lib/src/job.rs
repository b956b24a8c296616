//! The build-job lifecycle coordinator.
//!
//! Drives one job end to end: trigger check, parameter resolution, delegated
//! build, artifact upload, completion webhook, and state handoff. The finish
//! phase runs later as a separate process and closes the job out by uploading
//! the build log.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::archive::{ArchiveError, extract_package};
use crate::consts::{DEBUG_KEY, STORAGE_BASE_URL, TRIGGER_KEY};
use crate::engine::{BuildEngine, EngineError};
use crate::handoff::{HandoffError, HandoffStore, JobState};
use crate::metadata::{MetadataError, MetadataResolver};
use crate::notify::{BuildResponse, Notifier, NotifyError};
use crate::params::{JobParameters, ParamOverrides};
use crate::retry::RetryPolicy;
use crate::storage::{StorageClient, StorageError, UploadedObject, image_path};

/// Any failure that aborts a job.
#[derive(Debug, Error)]
pub enum JobError {
  #[error(transparent)]
  Metadata(#[from] MetadataError),

  #[error(transparent)]
  Storage(#[from] StorageError),

  #[error(transparent)]
  Archive(#[from] ArchiveError),

  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error(transparent)]
  Notify(#[from] NotifyError),

  #[error(transparent)]
  Handoff(#[from] HandoffError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("could not serialize payload: {0}")]
  Serialize(#[from] serde_json::Error),

  /// A parameter the current step cannot proceed without is unset.
  #[error("required parameter '{0}' is not set")]
  MissingParameter(&'static str),
}

/// Lifecycle phases, logged as the job advances.
#[derive(Debug, Clone, Copy)]
pub enum Phase {
  ParamsResolved,
  BuildRunning,
  ArtifactsExtracted,
  Uploading,
  Notified,
  Done,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Phase::ParamsResolved => "params-resolved",
      Phase::BuildRunning => "build-running",
      Phase::ArtifactsExtracted => "artifacts-extracted",
      Phase::Uploading => "uploading",
      Phase::Notified => "notified",
      Phase::Done => "done",
    };
    f.write_str(name)
  }
}

/// How a build phase run ended.
#[derive(Debug)]
pub enum BuildOutcome {
  /// No build is assigned to this instance.
  Skipped,
  /// The engine finished but produced no package archive. Not an error;
  /// nothing was uploaded and nobody was notified.
  NoArtifacts { image_package: PathBuf },
  /// Artifacts uploaded and the hub notified.
  Completed {
    build_dir: PathBuf,
    prefix: String,
    files: Vec<UploadedObject>,
  },
}

/// How a finish phase run ended.
#[derive(Debug)]
pub enum FinishOutcome {
  /// No build is assigned to this instance.
  Skipped,
  /// The build log was uploaded and the job closed out.
  Closed { log_object: UploadedObject },
}

/// Caller-side knobs for one build run.
#[derive(Debug, Default)]
pub struct BuildOptions {
  /// Working directory. A fresh persistent temp dir when unset.
  pub build_dir: Option<PathBuf>,
  pub overrides: ParamOverrides,
}

/// Where the object storage API lives and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct StorageConfig {
  pub base_url: String,
  /// Fetch a bearer token from the metadata service. Off for local runs
  /// against a storage fake.
  pub use_metadata_token: bool,
  /// Retry policy for bucket lookup, upload, and listing.
  pub transfer_policy: RetryPolicy,
  /// Retry policy for best-effort deletes.
  pub delete_policy: RetryPolicy,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      base_url: STORAGE_BASE_URL.to_string(),
      use_metadata_token: true,
      transfer_policy: RetryPolicy::unlimited(),
      delete_policy: RetryPolicy::limited(10),
    }
  }
}

/// Coordinates the two phases of a build job.
pub struct Coordinator {
  resolver: MetadataResolver,
  notifier: Notifier,
  handoff: HandoffStore,
  storage: StorageConfig,
}

impl Coordinator {
  pub fn new(resolver: MetadataResolver, notifier: Notifier, handoff: HandoffStore) -> Self {
    Self { resolver, notifier, handoff, storage: StorageConfig::default() }
  }

  pub fn with_storage(mut self, storage: StorageConfig) -> Self {
    self.storage = storage;
    self
  }

  /// Run the build phase.
  pub fn run(&self, engine: &dyn BuildEngine, options: BuildOptions) -> Result<BuildOutcome, JobError> {
    // Nothing but the trigger lookup happens on an idle instance.
    if self.resolver.resolve(TRIGGER_KEY)?.is_none() {
      info!("no build assigned to this instance");
      return Ok(BuildOutcome::Skipped);
    }
    let debug = self.resolver.resolve(DEBUG_KEY)?.is_some();

    let build_dir = match options.build_dir {
      Some(dir) => {
        fs::create_dir_all(&dir)?;
        dir
      }
      None => tempfile::Builder::new().prefix("imageforge-").tempdir()?.keep(),
    };

    let mut params = JobParameters::resolve(&self.resolver, options.overrides)?;
    params.debug = debug;
    info!(phase = %Phase::ParamsResolved, build_dir = %build_dir.display(), debug_flag = params.debug, "job parameters resolved");

    info!(phase = %Phase::BuildRunning, "delegating to build engine");
    let bundle = engine.run(&build_dir, &params)?;
    let mut params = bundle.params.clone();
    params.debug = debug;

    // A build without a package archive uploads nothing, notifies nobody,
    // and leaves no state behind for the finish phase.
    if !bundle.image_package.exists() {
      warn!(package = %bundle.image_package.display(), "no package archive produced, nothing to upload");
      return Ok(BuildOutcome::NoArtifacts { image_package: bundle.image_package });
    }

    let extract_dir = build_dir.join("build");
    let mut upload_files = extract_package(&bundle.image_package, &extract_dir)?;
    upload_files.push(bundle.image.clone());
    upload_files.push(bundle.image_package.clone());
    info!(phase = %Phase::ArtifactsExtracted, count = upload_files.len(), "artifacts ready");

    let prefix = self.object_prefix(&params)?;
    let client = self.storage_client()?;
    let bucket_name = params.bucket_name.clone().ok_or(JobError::MissingParameter("bucket_name"))?;
    let bucket = client.get_bucket(&bucket_name)?;

    info!(phase = %Phase::Uploading, bucket = %bucket.id, prefix = %prefix, "uploading artifacts");
    let mut files = Vec::with_capacity(upload_files.len());
    for file in &upload_files {
      files.push(client.upload_file(&bucket, &prefix, file)?);
    }

    let response = BuildResponse {
      files: serde_json::to_string(&files)?,
      repo_url: params.repo_url.clone(),
      commit: params.commit.clone(),
      repo_id: params.repo_id.clone(),
      secret: params.secret.clone(),
      metadata: serde_json::to_string(&bundle.metadata)?,
      logfile: params.logfile.clone(),
      branch: params.branch.clone(),
      token: params.token.clone(),
    };
    let response_url = params.response_url.clone().ok_or(JobError::MissingParameter("response_url"))?;
    self.notifier.send_build_data(&response_url, &response)?;
    info!(phase = %Phase::Notified, url = %response_url, "hub notified");

    self.handoff.save(&JobState::new(params))?;
    info!(phase = %Phase::Done, "build phase complete");
    Ok(BuildOutcome::Completed { build_dir, prefix, files })
  }

  /// Run the finish phase: upload the build log recorded during the build
  /// phase and post the closing payload.
  pub fn finish(&self) -> Result<FinishOutcome, JobError> {
    if self.resolver.resolve(TRIGGER_KEY)?.is_none() {
      info!("no build assigned to this instance");
      return Ok(FinishOutcome::Skipped);
    }

    let state = self.handoff.load()?;
    let mut params = state.params;

    let prefix = self.object_prefix(&params)?;
    let logfile = params.logfile.clone().ok_or(JobError::MissingParameter("logfile"))?;
    let client = self.storage_client()?;
    let bucket_name = params.bucket_name.clone().ok_or(JobError::MissingParameter("bucket_name"))?;
    let bucket = client.get_bucket(&bucket_name)?;

    info!(phase = %Phase::Uploading, bucket = %bucket.id, logfile = %logfile, "uploading build log");
    let log_object = client.upload_file(&bucket, &prefix, Path::new(&logfile))?;
    params.log_file = Some(serde_json::to_value(&log_object)?);

    let logging_url = params.logging_url.clone().ok_or(JobError::MissingParameter("logging_url"))?;
    self.notifier.send_build_close(&logging_url, &params)?;
    info!(phase = %Phase::Done, url = %logging_url, "build closed");
    Ok(FinishOutcome::Closed { log_object })
  }

  fn object_prefix(&self, params: &JobParameters) -> Result<String, JobError> {
    let repo_url = params.repo_url.as_deref().ok_or(JobError::MissingParameter("repo_url"))?;
    let commit = params.commit.as_deref().ok_or(JobError::MissingParameter("commit"))?;
    Ok(image_path(repo_url, commit))
  }

  fn storage_client(&self) -> Result<StorageClient, JobError> {
    let token = if self.storage.use_metadata_token {
      Some(self.resolver.access_token()?)
    } else {
      None
    };
    let client = StorageClient::new(&self.storage.base_url, token)?
      .with_policies(self.storage.transfer_policy, self.storage.delete_policy);
    Ok(client)
  }
}
