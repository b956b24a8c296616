//! Instance metadata resolution.
//!
//! Build jobs are parameterized through instance attributes on the compute
//! instance's local metadata endpoint. A missing key is a normal outcome, not
//! an error: it means the field was simply not set for this job.

use std::collections::BTreeMap;

use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{ATTRIBUTES_PATH, CREDENTIAL_FIELD, METADATA_FLAVOR, METADATA_HOST, TOKEN_PATH};

/// Errors from the metadata transport. Key absence is never an error.
#[derive(Debug, Error)]
pub enum MetadataError {
  /// The request to the metadata endpoint could not complete.
  #[error("metadata request failed for '{key}': {source}")]
  Request {
    key: String,
    #[source]
    source: reqwest::Error,
  },

  /// The service-account token request could not complete.
  #[error("token request failed: {0}")]
  Token(#[source] reqwest::Error),

  /// The token endpoint answered with a non-success status.
  #[error("token endpoint returned status {0}")]
  TokenStatus(u16),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
}

/// Resolves job parameters from the instance metadata endpoint.
pub struct MetadataResolver {
  base_url: String,
  client: Client,
}

impl Default for MetadataResolver {
  fn default() -> Self {
    Self::new()
  }
}

impl MetadataResolver {
  /// Resolver against the production metadata host.
  pub fn new() -> Self {
    Self::with_base_url(METADATA_HOST)
  }

  /// Resolver against an explicit base URL. For tests and local runs.
  pub fn with_base_url(base_url: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into().trim_end_matches('/').to_string(),
      client: Client::new(),
    }
  }

  /// Look up a single instance attribute.
  ///
  /// A 200 response yields the body as the value; any other status means the
  /// key is not set and yields `None`.
  pub fn resolve(&self, key: &str) -> Result<Option<String>, MetadataError> {
    let url = format!("{}{}/{}", self.base_url, ATTRIBUTES_PATH, key);
    let response = self
      .client
      .get(&url)
      .header("Metadata-Flavor", METADATA_FLAVOR)
      .send()
      .map_err(|source| MetadataError::Request { key: key.to_string(), source })?;

    let status = response.status();
    if status.is_success() {
      let value = response
        .text()
        .map_err(|source| MetadataError::Request { key: key.to_string(), source })?;
      Ok(Some(value))
    } else {
      debug!(key = %key, status = %status, "metadata key not present");
      Ok(None)
    }
  }

  /// Resolve an ordered list of `(key, explicit_value)` pairs.
  ///
  /// An explicit value is used as-is without a network call; everything else
  /// queries the metadata endpoint. Every field is logged as it settles,
  /// except the designated credential field.
  pub fn resolve_all(
    &self,
    fields: &[(&str, Option<String>)],
  ) -> Result<BTreeMap<String, Option<String>>, MetadataError> {
    let mut resolved = BTreeMap::new();
    for (key, explicit) in fields {
      let value = match explicit {
        Some(value) => Some(value.clone()),
        None => self.resolve(key)?,
      };
      if *key != CREDENTIAL_FIELD {
        match &value {
          Some(value) => info!(key = %key, value = %value, "parameter set"),
          None => info!(key = %key, "parameter not set"),
        }
      }
      resolved.insert((*key).to_string(), value);
    }
    Ok(resolved)
  }

  /// Fetch a bearer token for the instance's default service account.
  pub fn access_token(&self) -> Result<String, MetadataError> {
    let url = format!("{}{}", self.base_url, TOKEN_PATH);
    let response = self
      .client
      .get(&url)
      .header("Metadata-Flavor", METADATA_FLAVOR)
      .send()
      .map_err(MetadataError::Token)?;

    let status = response.status();
    if !status.is_success() {
      return Err(MetadataError::TokenStatus(status.as_u16()));
    }

    let token: TokenResponse = response.json().map_err(MetadataError::Token)?;
    Ok(token.access_token)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn attribute_path(key: &str) -> String {
    format!("{}/{}", ATTRIBUTES_PATH, key)
  }

  #[test]
  fn resolve_returns_body_on_200() {
    let mut server = mockito::Server::new();
    let mock = server
      .mock("GET", attribute_path("repo_url").as_str())
      .match_header("Metadata-Flavor", "Google")
      .with_status(200)
      .with_body("https://github.com/org/repo")
      .create();

    let resolver = MetadataResolver::with_base_url(server.url());
    let value = resolver.resolve("repo_url").unwrap();

    assert_eq!(value.as_deref(), Some("https://github.com/org/repo"));
    mock.assert();
  }

  #[test]
  fn resolve_returns_none_on_non_200() {
    let mut server = mockito::Server::new();
    let mock = server
      .mock("GET", attribute_path("missing").as_str())
      .with_status(404)
      .create();

    let resolver = MetadataResolver::with_base_url(server.url());
    let value = resolver.resolve("missing").unwrap();

    assert_eq!(value, None);
    mock.assert();
  }

  #[test]
  fn resolve_all_prefers_explicit_values() {
    let mut server = mockito::Server::new();
    // An explicit value must not produce a network call.
    let mock = server
      .mock("GET", attribute_path("commit").as_str())
      .expect(0)
      .create();

    let resolver = MetadataResolver::with_base_url(server.url());
    let fields = [("commit", Some("abc123".to_string()))];
    let resolved = resolver.resolve_all(&fields).unwrap();

    assert_eq!(resolved["commit"].as_deref(), Some("abc123"));
    mock.assert();
  }

  #[test]
  fn resolve_all_queries_unset_fields() {
    let mut server = mockito::Server::new();
    server
      .mock("GET", attribute_path("branch").as_str())
      .with_status(200)
      .with_body("main")
      .create();

    let resolver = MetadataResolver::with_base_url(server.url());
    let fields = [("branch", None), ("commit", None)];
    let resolved = resolver.resolve_all(&fields).unwrap();

    assert_eq!(resolved["branch"].as_deref(), Some("main"));
    assert_eq!(resolved["commit"], None);
  }

  #[test]
  fn access_token_parses_token_response() {
    let mut server = mockito::Server::new();
    server
      .mock("GET", TOKEN_PATH)
      .with_status(200)
      .with_body(r#"{"access_token":"ya29.token","expires_in":3599,"token_type":"Bearer"}"#)
      .create();

    let resolver = MetadataResolver::with_base_url(server.url());
    assert_eq!(resolver.access_token().unwrap(), "ya29.token");
  }

  #[test]
  fn access_token_fails_on_error_status() {
    let mut server = mockito::Server::new();
    server.mock("GET", TOKEN_PATH).with_status(403).create();

    let resolver = MetadataResolver::with_base_url(server.url());
    assert!(matches!(resolver.access_token(), Err(MetadataError::TokenStatus(403))));
  }
}
