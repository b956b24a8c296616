use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use imageforge_lib::engine::CommandEngine;
use imageforge_lib::job::{BuildOptions, BuildOutcome};
use imageforge_lib::params::ParamOverrides;

/// Flags for the build phase. Every parameter flag overrides the value the
/// instance metadata would otherwise provide.
#[derive(Args)]
pub struct BuildArgs {
  /// Build engine command to invoke
  #[arg(long, default_value = "imageforge-engine")]
  engine: String,

  /// Working directory (a fresh temp dir if not given)
  #[arg(long)]
  build_dir: Option<PathBuf>,

  /// Source repository URL
  #[arg(long)]
  repo_url: Option<String>,

  /// Hub identifier of the repository
  #[arg(long)]
  repo_id: Option<String>,

  /// Webhook receiving the build response
  #[arg(long)]
  response_url: Option<String>,

  /// Destination storage bucket
  #[arg(long)]
  bucket_name: Option<String>,

  /// Repository access token
  #[arg(long)]
  token: Option<String>,

  /// Commit to build
  #[arg(long)]
  commit: Option<String>,

  /// Shared secret echoed back in the build response
  #[arg(long)]
  secret: Option<String>,

  /// Requested image size
  #[arg(long)]
  size: Option<String>,

  /// Branch to build
  #[arg(long)]
  branch: Option<String>,

  /// Name of the build spec file inside the repository
  #[arg(long)]
  spec_file: Option<String>,

  /// Image padding in MB
  #[arg(long)]
  padding: Option<u32>,

  /// Webhook receiving the build-closed payload
  #[arg(long)]
  logging_url: Option<String>,

  /// Path of the build log to upload during finish
  #[arg(long)]
  logfile: Option<String>,
}

impl BuildArgs {
  fn overrides(&self) -> ParamOverrides {
    ParamOverrides {
      repo_url: self.repo_url.clone(),
      repo_id: self.repo_id.clone(),
      response_url: self.response_url.clone(),
      bucket_name: self.bucket_name.clone(),
      token: self.token.clone(),
      commit: self.commit.clone(),
      secret: self.secret.clone(),
      size: self.size.clone(),
      branch: self.branch.clone(),
      spec_file: self.spec_file.clone(),
      padding: self.padding,
      logging_url: self.logging_url.clone(),
      logfile: self.logfile.clone(),
    }
  }
}

pub fn cmd_build(args: BuildArgs) -> Result<()> {
  let coordinator = super::coordinator();
  let engine = CommandEngine::new(args.engine.as_str());
  let options = BuildOptions { build_dir: args.build_dir.clone(), overrides: args.overrides() };

  let outcome = coordinator.run(&engine, options).context("build job failed")?;
  match outcome {
    BuildOutcome::Skipped => println!("No build assigned to this instance"),
    BuildOutcome::NoArtifacts { image_package } => {
      println!("Build finished without a package archive ({}), nothing uploaded", image_package.display());
    }
    BuildOutcome::Completed { build_dir, prefix, files } => {
      println!("Uploaded {} file(s) under {}", files.len(), prefix);
      println!("Build directory: {}", build_dir.display());
    }
  }
  Ok(())
}
