//! Advisory "newer CLI available" check
//!
//! Never fails the calling command: registry problems are logged and
//! swallowed.

use semver::Version;

use crate::registry::{version, Registry};

/// Newest caret-compatible release of `name` newer than `current`, if any.
///
/// Logs an upgrade hint at warn level when one exists.
pub async fn check_global_update(
    registry: &dyn Registry,
    name: &str,
    current: &str,
) -> Option<Version> {
    let current_version = match Version::parse(current) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Invalid version '{}' for {}: {}", current, name, e);
            return None;
        }
    };

    let versions = match registry.fetch_versions(name).await {
        Ok(versions) => versions,
        Err(e) => {
            tracing::error!("Failed to check {} versions: {}", name, e);
            return None;
        }
    };

    let latest = version::latest_compatible(&current_version, &versions)
        .filter(|latest| latest.cmp_precedence(&current_version).is_gt())?;

    tracing::warn!(
        "Please update {}: current version {}, latest version {}. Run: cargo install {} --force",
        name,
        current_version,
        latest,
        name
    );
    Some(latest)
}
