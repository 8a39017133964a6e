//! Version comparison
//!
//! Decides whether a resolved version is newer than the installed one.
//! Each app brings its own `VersionScheme`; an installed version that
//! cannot be parsed always counts as outdated.

use crate::domain::{LatestVersion, UpdateCheckResult, VersionScheme};
use chrono::DateTime;
use std::cmp::Ordering;

/// Compare two dotted numeric version strings
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parts_a = numeric_parts(a);
    let parts_b = numeric_parts(b);

    for (pa, pb) in parts_a.iter().zip(parts_b.iter()) {
        match pa.cmp(pb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    // If all common parts are equal, the longer version is greater
    parts_a.len().cmp(&parts_b.len())
}

/// Numeric components of a version, ignoring a leading 'v'
fn numeric_parts(version: &str) -> Vec<u64> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    version
        .split(['.', '-'])
        .filter_map(|p| p.parse().ok())
        .collect()
}

/// Whether `candidate` is newer than `installed` under `scheme`
///
/// A malformed installed version yields `true`, a malformed candidate
/// yields `false`.
pub fn is_newer(installed: &str, candidate: &str, scheme: VersionScheme) -> bool {
    match scheme {
        VersionScheme::Dotted => {
            if numeric_parts(candidate).is_empty() {
                return false;
            }
            if numeric_parts(installed).is_empty() {
                return true;
            }
            compare_versions(installed, candidate) == Ordering::Less
        }
        VersionScheme::Timestamp => {
            let Ok(candidate) = DateTime::parse_from_rfc3339(candidate.trim()) else {
                return false;
            };
            match DateTime::parse_from_rfc3339(installed.trim()) {
                Ok(installed) => installed < candidate,
                Err(_) => true,
            }
        }
    }
}

/// Build the check result for an installed version
///
/// Apps that are not installed have no update to apply.
pub fn check_update(
    installed: Option<&str>,
    latest: LatestVersion,
    scheme: VersionScheme,
) -> UpdateCheckResult {
    let available = installed
        .map(|installed| is_newer(installed, &latest.version, scheme))
        .unwrap_or(false);
    UpdateCheckResult::new(latest, installed.map(str::to_string), available)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_versions_basic() {
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.0", "2.0.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0", "1.0.0"), Ordering::Greater);
    }

    #[test]
    fn test_compare_versions_multi_digit() {
        assert_eq!(compare_versions("1.9.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare_versions("10.0.0", "9.0.0"), Ordering::Greater);
    }

    #[test]
    fn test_compare_versions_with_v_prefix() {
        assert_eq!(compare_versions("v1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("v1.0.0", "v2.0.0"), Ordering::Less);
    }

    #[test]
    fn test_compare_versions_different_lengths() {
        // 1.0 is considered less than 1.0.0 (fewer parts)
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("12.5", "12.5.1"), Ordering::Less);
    }

    #[test]
    fn test_dotted_newer() {
        assert!(is_newer("12.0.7", "12.5.1", VersionScheme::Dotted));
        assert!(is_newer("2.9.1", "2.10.0", VersionScheme::Dotted));
        assert!(!is_newer("12.5.1", "12.5.1", VersionScheme::Dotted));
        assert!(!is_newer("13.0", "12.5.1", VersionScheme::Dotted));
    }

    #[test]
    fn test_dotted_malformed_installed_fails_open() {
        assert!(is_newer("", "12.5.1", VersionScheme::Dotted));
        assert!(is_newer("unknown", "12.5.1", VersionScheme::Dotted));
    }

    #[test]
    fn test_dotted_malformed_candidate() {
        assert!(!is_newer("12.5.1", "latest", VersionScheme::Dotted));
    }

    #[test]
    fn test_timestamp_newer() {
        let scheme = VersionScheme::Timestamp;
        assert!(is_newer(
            "2021-01-10T12:45:23.396Z",
            "2021-01-19T21:52:21.911Z",
            scheme
        ));
        assert!(!is_newer(
            "2021-01-19T21:52:21.911Z",
            "2021-01-19T21:52:21.911Z",
            scheme
        ));
        assert!(!is_newer(
            "2021-02-01T00:00:00Z",
            "2021-01-19T21:52:21.911Z",
            scheme
        ));
    }

    #[test]
    fn test_timestamp_compares_instants() {
        // Same instant in different offsets is not newer
        assert!(!is_newer(
            "2021-01-19T22:52:21.911+01:00",
            "2021-01-19T21:52:21.911Z",
            VersionScheme::Timestamp
        ));
    }

    #[test]
    fn test_timestamp_malformed_installed_fails_open() {
        assert!(is_newer(
            "1.0",
            "2021-01-19T21:52:21.911Z",
            VersionScheme::Timestamp
        ));
    }

    #[test]
    fn test_check_update() {
        let date = DateTime::parse_from_rfc3339("2023-07-04T13:30:00Z").unwrap();
        let latest = LatestVersion::new("u", "12.5.1", date);

        let result = check_update(Some("12.0.7"), latest.clone(), VersionScheme::Dotted);
        assert!(result.is_update_available);
        assert_eq!(result.installed_version.as_deref(), Some("12.0.7"));

        let result = check_update(Some("12.5.1"), latest.clone(), VersionScheme::Dotted);
        assert!(!result.is_update_available);

        let result = check_update(None, latest, VersionScheme::Dotted);
        assert!(!result.is_update_available);
    }
}
