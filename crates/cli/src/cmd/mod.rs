//! Subcommand implementations.

mod build;
mod finish;

pub use build::{BuildArgs, cmd_build};
pub use finish::cmd_finish;

use std::env;

use imageforge_lib::handoff::HandoffStore;
use imageforge_lib::job::{Coordinator, StorageConfig};
use imageforge_lib::metadata::MetadataResolver;
use imageforge_lib::notify::Notifier;

// Endpoint overrides for local runs and integration tests. Production
// instances use the built-in metadata and storage endpoints.
const METADATA_URL_VAR: &str = "IMAGEFORGE_METADATA_URL";
const STORAGE_URL_VAR: &str = "IMAGEFORGE_STORAGE_URL";
const STATE_DIR_VAR: &str = "IMAGEFORGE_STATE_DIR";

fn coordinator() -> Coordinator {
  let resolver = match env::var(METADATA_URL_VAR) {
    Ok(url) => MetadataResolver::with_base_url(url),
    Err(_) => MetadataResolver::new(),
  };
  let handoff = match env::var(STATE_DIR_VAR) {
    Ok(dir) => HandoffStore::new(dir),
    Err(_) => HandoffStore::default_store(),
  };
  // A storage override implies a local fake with no token endpoint behind it.
  let storage = match env::var(STORAGE_URL_VAR) {
    Ok(url) => StorageConfig { base_url: url, use_metadata_token: false, ..StorageConfig::default() },
    Err(_) => StorageConfig::default(),
  };
  Coordinator::new(resolver, Notifier::new(), handoff).with_storage(storage)
}
