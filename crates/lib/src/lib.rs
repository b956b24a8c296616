//! Build-job coordination for cloud machine-image builds.
//!
//! A job runs on a dedicated compute instance: parameters arrive through the
//! instance metadata service, an external build engine produces the image and
//! a package archive, artifacts land in an object-storage bucket, and the hub
//! is notified through completion webhooks. The [`job::Coordinator`] drives
//! the build phase; a later finish phase uploads the build log from persisted
//! state.

pub mod archive;
pub mod consts;
pub mod engine;
pub mod handoff;
pub mod job;
pub mod metadata;
pub mod notify;
pub mod params;
pub mod retry;
pub mod storage;
