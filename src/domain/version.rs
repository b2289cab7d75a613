use std::cmp::Ordering;
use std::fmt;

/// A strict `major.minor.patch` version.
///
/// Pin files, manifest names, and migration targets all normalize through
/// this type so `v1.2.3`, ` 1.2.3 `, and `1.2.3` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionTriplet {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionTriplet {
    /// Parse a version string into a triplet.
    ///
    /// Accepts an optional leading `v` and surrounding whitespace; rejects
    /// anything that is not exactly three numeric segments.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().trim_start_matches('v');
        let mut parts = normalized.split('.');

        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;

        if parts.next().is_some() {
            return None;
        }

        Some(Self { major, minor, patch })
    }

    pub fn cmp(self, other: Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl fmt::Display for VersionTriplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Normalize a version string to its canonical `X.Y.Z` form.
pub fn normalize_version(value: &str) -> Option<String> {
    VersionTriplet::parse(value).map(|triplet| triplet.to_string())
}
