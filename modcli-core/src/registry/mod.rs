//! Package registry access
//!
//! The registry speaks the npm metadata protocol: `GET <registry>/<name>`
//! returns a document whose `versions` map is keyed by version string.
//! [`version`] holds the pure selection rules applied to those keys.

mod client;
pub mod version;

pub use client::{
    registry_url_for, Dist, HttpRegistry, PackageMetadata, Registry, VersionMetadata,
};
pub use version::{latest_compatible, latest_overall};
