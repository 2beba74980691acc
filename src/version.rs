use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::{ErrorKind, Result, WandError};

/// A semantic version as used by formulas, release tags and the registry.
///
/// Parsing is lenient compared to strict SemVer: a leading `v` is accepted and
/// missing minor/patch segments default to `0` (`8.7` is `8.7.0`).
/// Build metadata is kept for display but ignored by equality and ordering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: String,
    pub build: String,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Version {
        Version {
            major,
            minor,
            patch,
            ..Default::default()
        }
    }

    /// Parses `MAJOR[.MINOR[.PATCH]][-PRE][+BUILD]` with an optional leading `v`.
    ///
    /// # Errors
    /// Returns [`ErrorKind::InvalidVersion`] for empty input, non-numeric
    /// segments or more than three dot-separated segments.
    pub fn parse(text: &str) -> Result<Version> {
        let invalid = |reason: &str| {
            WandError::with_details(
                ErrorKind::InvalidVersion,
                format!("Invalid version: {text:?}"),
                reason.to_string(),
            )
        };
        if text.is_empty() {
            return Err(invalid("version string is empty"));
        }
        let rest = text.strip_prefix('v').unwrap_or(text);

        let (rest, build) = match rest.split_once('+') {
            Some((rest, build)) => (rest, build.to_string()),
            None => (rest, String::new()),
        };
        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) => (core, pre.to_string()),
            None => (rest, String::new()),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid("more than three numeric segments"));
        }
        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("segments must be non-negative integers"));
            }
            *slot = part
                .parse()
                .map_err(|_| invalid("numeric segment out of range"))?;
        }

        Ok(Version {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre,
            build,
        })
    }

    /// Like `Display` but drops trailing `.0` segments: `8.7.0` becomes `8.7`,
    /// `9.0.0` becomes `9`. Used only for URL templating.
    pub fn short_string(&self) -> String {
        let mut s = if self.patch != 0 {
            format!("{}.{}.{}", self.major, self.minor, self.patch)
        } else if self.minor != 0 {
            format!("{}.{}", self.major, self.minor)
        } else {
            self.major.to_string()
        };
        if !self.pre.is_empty() {
            s.push('-');
            s.push_str(&self.pre);
        }
        s
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.pre.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = WandError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = WandError;

    fn try_from(value: String) -> Result<Self> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_full() {
        let version = v("v1.2.3-rc.1+build.5");
        assert_eq!((version.major, version.minor, version.patch), (1, 2, 3));
        assert_eq!(version.pre, "rc.1");
        assert_eq!(version.build, "build.5");
    }

    #[test]
    fn test_parse_defaults_missing_segments() {
        assert_eq!(v("8.7").to_string(), "8.7.0");
        assert_eq!(v("8").to_string(), "8.0.0");
        assert_eq!(v("v14.1.0").to_string(), "14.1.0");
    }

    #[test]
    fn test_parse_round_trips() {
        for text in ["0.0.1", "1.2.3-alpha", "10.20.30+meta", "2.0.0-beta.2+exp.sha"] {
            assert_eq!(v(text).to_string(), text);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for text in ["", "v", "abc", "1.2.3.4", "1..2", "-1.0.0", "1.x", "+1.0.0"] {
            let err = Version::parse(text).unwrap_err();
            assert!(err.is(ErrorKind::InvalidVersion), "{text} should fail");
        }
    }

    #[test]
    fn test_short_string() {
        assert_eq!(v("8.7.0").short_string(), "8.7");
        assert_eq!(v("9.0.0").short_string(), "9");
        assert_eq!(v("1.0.2").short_string(), "1.0.2");
        assert_eq!(v("2.0.0-rc1").short_string(), "2-rc1");
    }

    #[test]
    fn test_ordering() {
        assert!(v("1.2.3") < v("1.2.4"));
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("2.0.0") > v("1.99.99"));
        assert!(v("1.0.0") > v("1.0.0-rc1"));
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert_eq!(v("1.0.0").cmp(&v("1.0.0")), Ordering::Equal);
    }

    #[test]
    fn test_build_metadata_ignored_in_equality() {
        assert_eq!(v("1.0.0+a"), v("1.0.0+b"));
        assert_ne!(v("1.0.0-a"), v("1.0.0-b"));
    }

    #[test]
    fn test_total_order_is_consistent() {
        let mut versions: Vec<Version> = ["1.0.0", "0.9.0", "1.0.0-rc1", "1.0.0-alpha", "2.0.0", "1.2.0"]
            .iter()
            .map(|s| v(s))
            .collect();
        versions.sort();
        let sorted: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(
            sorted,
            vec!["0.9.0", "1.0.0-alpha", "1.0.0-rc1", "1.0.0", "1.2.0", "2.0.0"]
        );
        for a in &versions {
            for b in &versions {
                assert_eq!(a.cmp(b), b.cmp(a).reverse());
            }
        }
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&v("1.4.0")).unwrap();
        assert_eq!(json, "\"1.4.0\"");
        let back: Version = serde_json::from_str("\"v2.1\"").unwrap();
        assert_eq!(back, v("2.1.0"));
        assert!(serde_json::from_str::<Version>("\"nope\"").is_err());
    }
}
