//! The typed parameter set describing one build job.
//!
//! Every field is either supplied explicitly by the caller or resolved from
//! the instance metadata service; fields that resolve to nothing stay unset.
//! Exactly three fields fall back to fixed defaults afterwards: the spec file
//! name, the target bucket, and the image padding.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::consts::{DEFAULT_BUCKET_NAME, DEFAULT_PADDING_MB, DEFAULT_SPEC_FILE};
use crate::metadata::{MetadataError, MetadataResolver};

/// Explicit parameter overrides supplied by the caller.
///
/// A `None` field is resolved from instance metadata instead.
#[derive(Debug, Clone, Default)]
pub struct ParamOverrides {
  pub repo_url: Option<String>,
  pub repo_id: Option<String>,
  pub response_url: Option<String>,
  pub bucket_name: Option<String>,
  pub token: Option<String>,
  pub commit: Option<String>,
  pub secret: Option<String>,
  pub size: Option<String>,
  pub branch: Option<String>,
  pub spec_file: Option<String>,
  pub padding: Option<u32>,
  pub logging_url: Option<String>,
  pub logfile: Option<String>,
}

/// The resolved parameter set for one job.
///
/// Constructed once at coordinator start, persisted at the end of the build
/// phase, and reloaded unchanged by the finish phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
  pub repo_url: Option<String>,
  pub repo_id: Option<String>,
  pub response_url: Option<String>,
  pub bucket_name: Option<String>,
  pub token: Option<String>,
  pub commit: Option<String>,
  pub secret: Option<String>,
  pub size: Option<String>,
  pub branch: Option<String>,
  pub spec_file: Option<String>,
  pub padding: Option<u32>,
  pub logging_url: Option<String>,
  pub logfile: Option<String>,
  #[serde(default)]
  pub debug: bool,
  /// Object resource of the uploaded build log, recorded during finish.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub log_file: Option<serde_json::Value>,
}

impl JobParameters {
  /// Resolve the full parameter set.
  ///
  /// Explicit overrides win; everything else is queried from the metadata
  /// service in a fixed field order. The three fixed defaults apply only to
  /// fields that are still unset afterwards.
  pub fn resolve(resolver: &MetadataResolver, overrides: ParamOverrides) -> Result<Self, MetadataError> {
    let o = overrides;
    let fields: [(&str, Option<String>); 13] = [
      ("repo_url", o.repo_url),
      ("repo_id", o.repo_id),
      ("response_url", o.response_url),
      ("bucket_name", o.bucket_name),
      ("token", o.token),
      ("commit", o.commit),
      ("secret", o.secret),
      ("size", o.size),
      ("branch", o.branch),
      ("spec_file", o.spec_file),
      ("padding", o.padding.map(|p| p.to_string())),
      ("logging_url", o.logging_url),
      ("logfile", o.logfile),
    ];

    let mut values = resolver.resolve_all(&fields)?;
    let mut take = |key: &str| values.remove(key).flatten();

    let padding = match take("padding") {
      Some(raw) => match raw.parse::<u32>() {
        Ok(padding) => Some(padding),
        Err(_) => {
          warn!(value = %raw, "ignoring unparsable padding");
          None
        }
      },
      None => None,
    };

    let mut params = Self {
      repo_url: take("repo_url"),
      repo_id: take("repo_id"),
      response_url: take("response_url"),
      bucket_name: take("bucket_name"),
      token: take("token"),
      commit: take("commit"),
      secret: take("secret"),
      size: take("size"),
      branch: take("branch"),
      spec_file: take("spec_file"),
      padding,
      logging_url: take("logging_url"),
      logfile: take("logfile"),
      debug: false,
      log_file: None,
    };
    params.apply_defaults();
    Ok(params)
  }

  fn apply_defaults(&mut self) {
    self.spec_file.get_or_insert_with(|| DEFAULT_SPEC_FILE.to_string());
    self.bucket_name.get_or_insert_with(|| DEFAULT_BUCKET_NAME.to_string());
    self.padding.get_or_insert(DEFAULT_PADDING_MB);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Server with no attributes set: every lookup returns 501 (not 200),
  /// which the resolver treats as absence.
  fn empty_resolver(server: &mockito::Server) -> MetadataResolver {
    MetadataResolver::with_base_url(server.url())
  }

  #[test]
  fn unresolved_fields_get_only_the_three_defaults() {
    let server = mockito::Server::new();
    let resolver = empty_resolver(&server);

    let params = JobParameters::resolve(&resolver, ParamOverrides::default()).unwrap();

    assert_eq!(params.spec_file.as_deref(), Some("Singularity"));
    assert_eq!(params.bucket_name.as_deref(), Some("singularity-hub-regional"));
    assert_eq!(params.padding, Some(200));

    assert_eq!(params.repo_url, None);
    assert_eq!(params.repo_id, None);
    assert_eq!(params.response_url, None);
    assert_eq!(params.token, None);
    assert_eq!(params.commit, None);
    assert_eq!(params.secret, None);
    assert_eq!(params.size, None);
    assert_eq!(params.branch, None);
    assert_eq!(params.logging_url, None);
    assert_eq!(params.logfile, None);
    assert!(!params.debug);
  }

  #[test]
  fn explicit_overrides_suppress_defaults() {
    let server = mockito::Server::new();
    let resolver = empty_resolver(&server);

    let overrides = ParamOverrides {
      spec_file: Some("Singularity.dev".to_string()),
      bucket_name: Some("my-bucket".to_string()),
      padding: Some(50),
      ..Default::default()
    };
    let params = JobParameters::resolve(&resolver, overrides).unwrap();

    assert_eq!(params.spec_file.as_deref(), Some("Singularity.dev"));
    assert_eq!(params.bucket_name.as_deref(), Some("my-bucket"));
    assert_eq!(params.padding, Some(50));
  }

  #[test]
  fn metadata_values_fill_unset_fields() {
    let mut server = mockito::Server::new();
    server
      .mock("GET", "/computeMetadata/v1/instance/attributes/repo_url")
      .with_status(200)
      .with_body("https://github.com/org/repo")
      .create();
    server
      .mock("GET", "/computeMetadata/v1/instance/attributes/padding")
      .with_status(200)
      .with_body("300")
      .create();

    let resolver = empty_resolver(&server);
    let params = JobParameters::resolve(&resolver, ParamOverrides::default()).unwrap();

    assert_eq!(params.repo_url.as_deref(), Some("https://github.com/org/repo"));
    assert_eq!(params.padding, Some(300));
  }

  #[test]
  fn unparsable_padding_falls_back_to_default() {
    let mut server = mockito::Server::new();
    server
      .mock("GET", "/computeMetadata/v1/instance/attributes/padding")
      .with_status(200)
      .with_body("lots")
      .create();

    let resolver = empty_resolver(&server);
    let params = JobParameters::resolve(&resolver, ParamOverrides::default()).unwrap();

    assert_eq!(params.padding, Some(200));
  }

  #[test]
  fn parameters_round_trip_through_json() {
    let server = mockito::Server::new();
    let resolver = empty_resolver(&server);

    let overrides = ParamOverrides {
      repo_url: Some("https://github.com/org/repo".to_string()),
      commit: Some("abc123".to_string()),
      secret: Some("s3cr3t".to_string()),
      ..Default::default()
    };
    let params = JobParameters::resolve(&resolver, overrides).unwrap();

    let json = serde_json::to_string(&params).unwrap();
    let restored: JobParameters = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, params);
  }
}
