//! Well-known endpoints, metadata keys, and fixed parameter defaults.

/// Host serving the instance metadata API.
pub const METADATA_HOST: &str = "http://metadata.google.internal";

/// Path under the metadata host for instance attributes.
pub const ATTRIBUTES_PATH: &str = "/computeMetadata/v1/instance/attributes";

/// Path under the metadata host for the default service-account token.
pub const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Header every metadata request must carry.
pub const METADATA_FLAVOR: &str = "Google";

/// Production object-storage API endpoint.
pub const STORAGE_BASE_URL: &str = "https://storage.googleapis.com";

/// Metadata key that assigns a build to this instance. Absent means no work.
pub const TRIGGER_KEY: &str = "dobuild";

/// Metadata key enabling verbose build output. Absent means off.
pub const DEBUG_KEY: &str = "debug";

/// Parameter field that must never appear in logs.
pub const CREDENTIAL_FIELD: &str = "secret";

/// Default spec file name, applied only when unresolved.
pub const DEFAULT_SPEC_FILE: &str = "Singularity";

/// Default target bucket, applied only when unresolved.
pub const DEFAULT_BUCKET_NAME: &str = "singularity-hub-regional";

/// Default image padding in MB, applied only when unresolved.
pub const DEFAULT_PADDING_MB: u32 = 200;

/// Schema version of the persisted job-state record.
pub const HANDOFF_VERSION: u32 = 1;

/// File name of the persisted job-state record.
pub const HANDOFF_FILENAME: &str = "imageforge-params.json";
