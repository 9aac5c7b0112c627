//! Version selection over a registry's published versions
//!
//! Ordering is full semver precedence: pre-releases sort below their release
//! and build metadata is ignored, so `1.0.0+a` and `1.0.0+b` count as one
//! version.

use semver::{Comparator, Op, Version, VersionReq};

use crate::error::{PluginError, Result};

/// Parse, sort newest-first and deduplicate. Unparseable strings are skipped.
pub fn sorted_descending<I, S>(versions: I) -> Vec<Version>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed: Vec<Version> = versions
        .into_iter()
        .filter_map(|v| match Version::parse(v.as_ref()) {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::trace!("Skipping unparseable version '{}': {}", v.as_ref(), e);
                None
            }
        })
        .collect();

    parsed.sort_by(|a, b| b.cmp_precedence(a));
    parsed.dedup_by(|a, b| a.cmp_precedence(b).is_eq());
    parsed
}

/// The caret range `^base` with npm semantics: below `1.0.0` the leftmost
/// non-zero component is the compatibility boundary, so `^0.1.0` stops
/// before `0.2.0`. Pre-releases only match within `base`'s own
/// `major.minor.patch`.
pub fn caret_requirement(base: &Version) -> VersionReq {
    VersionReq {
        comparators: vec![Comparator {
            op: Op::Caret,
            major: base.major,
            minor: Some(base.minor),
            patch: Some(base.patch),
            pre: base.pre.clone(),
        }],
    }
}

pub fn is_caret_compatible(base: &Version, candidate: &Version) -> bool {
    caret_requirement(base).matches(candidate)
}

/// All caret-compatible versions, newest first
pub fn compatible_versions<I, S>(base: &Version, versions: I) -> Vec<Version>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let requirement = caret_requirement(base);
    sorted_descending(versions)
        .into_iter()
        .filter(|v| requirement.matches(v))
        .collect()
}

/// Newest version in `^base`, if any
pub fn latest_compatible<I, S>(base: &Version, versions: I) -> Option<Version>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    compatible_versions(base, versions).into_iter().next()
}

/// Newest version irrespective of range
pub fn latest_overall<I, S>(name: &str, versions: I) -> Result<Version>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    sorted_descending(versions)
        .into_iter()
        .next()
        .ok_or_else(|| PluginError::NoVersionsAvailable(name.to_string()))
}
