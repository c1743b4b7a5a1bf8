//! Versioned dataset storage.
//!
//! Provides the registry that owns every committed version of every dataset:
//! - Manifests describing each version on disk
//! - Reference-counted handles that keep a version alive while queried
//! - Atomic promotion of a new active version
//! - Pruning of old versions, deferred while they are still in use

pub mod error;
pub mod manifest;
pub mod registry;
pub mod version;

pub use error::{RegistryError, Result};
pub use manifest::{Manifest, MANIFEST_FILE};
pub use registry::{DatasetRegistry, PruneReport, VersionListing, STAGING_DIR};
pub use version::{version_id_for, DatasetVersion, VersionHandle};
