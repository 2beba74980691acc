//! Version constraint matching.
//!
//! Supported forms:
//! - `""`, `latest`, `*` – the newest version
//! - `^1.2.3` – same major, `minor.patch >= 2.3`
//! - `~1.2.3` – same `major.minor`, `patch >= 3`
//! - `>=1.0`, `<=2.0`, `>1.0`, `<2.0` – boundary search
//! - `1.x`, `1.2.x` – newest version with the fixed prefix
//! - anything else – an exact version

use std::fmt;
use std::str::FromStr;
use crate::error::{ErrorKind, Result, WandError};
use crate::version::Version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Latest,
    Caret(Version),
    Tilde(Version),
    GreaterOrEqual(Version),
    LessOrEqual(Version),
    Greater(Version),
    Less(Version),
    /// `N.x` (minor is `None`) or `N.M.x`. `x` alone is `Latest`.
    XRange { major: u64, minor: Option<u64> },
    Exact(Version),
}

impl Constraint {
    pub fn parse(text: &str) -> Result<Constraint> {
        let text = text.trim();
        let base = |s: &str| {
            Version::parse(s.trim()).map_err(|_| {
                WandError::new(
                    ErrorKind::InvalidVersion,
                    format!("Invalid version constraint: {text:?}"),
                )
            })
        };

        if matches!(text, "" | "latest" | "*") {
            return Ok(Constraint::Latest);
        }
        if let Some(rest) = text.strip_prefix('^') {
            return Ok(Constraint::Caret(base(rest)?));
        }
        if let Some(rest) = text.strip_prefix('~') {
            return Ok(Constraint::Tilde(base(rest)?));
        }
        if let Some(rest) = text.strip_prefix(">=") {
            return Ok(Constraint::GreaterOrEqual(base(rest)?));
        }
        if let Some(rest) = text.strip_prefix("<=") {
            return Ok(Constraint::LessOrEqual(base(rest)?));
        }
        if let Some(rest) = text.strip_prefix('>') {
            return Ok(Constraint::Greater(base(rest)?));
        }
        if let Some(rest) = text.strip_prefix('<') {
            return Ok(Constraint::Less(base(rest)?));
        }
        if is_x_range(text) {
            return Self::parse_x_range(text);
        }
        Ok(Constraint::Exact(base(text)?))
    }

    fn parse_x_range(text: &str) -> Result<Constraint> {
        let invalid = || {
            WandError::new(
                ErrorKind::InvalidVersion,
                format!("Invalid version constraint: {text:?}"),
            )
        };
        let number = |s: &str| s.parse::<u64>().map_err(|_| invalid());

        let parts: Vec<&str> = text.split('.').collect();
        match parts.as_slice() {
            ["x", ..] => Ok(Constraint::Latest),
            [major, "x", ..] => Ok(Constraint::XRange { major: number(major)?, minor: None }),
            [major] => Ok(Constraint::XRange { major: number(major)?, minor: None }),
            [major, minor, rest @ ..] if rest.iter().all(|p| *p == "x") => Ok(Constraint::XRange {
                major: number(major)?,
                minor: Some(number(minor)?),
            }),
            _ => Err(invalid()),
        }
    }

    /// Picks the best candidate from `versions`, which must be sorted newest first.
    ///
    /// Upper-bounded searches (`<=`, `<`) walk from the tail, so they yield the
    /// oldest satisfying version.
    pub fn select<'a>(&self, versions: &'a [Version]) -> Option<&'a Version> {
        match self {
            Constraint::Latest => versions.first(),
            Constraint::Caret(base) => versions.iter().find(|v| {
                v.major == base.major
                    && (v.minor > base.minor || (v.minor == base.minor && v.patch >= base.patch))
            }),
            Constraint::Tilde(base) => versions.iter().find(|v| {
                v.major == base.major && v.minor == base.minor && v.patch >= base.patch
            }),
            Constraint::GreaterOrEqual(base) => versions.iter().find(|v| *v >= base),
            Constraint::Greater(base) => versions.iter().find(|v| *v > base),
            Constraint::LessOrEqual(base) => versions.iter().rev().find(|v| *v <= base),
            Constraint::Less(base) => versions.iter().rev().find(|v| *v < base),
            Constraint::XRange { major, minor } => versions.iter().find(|v| {
                v.major == *major && minor.is_none_or(|minor| v.minor == minor)
            }),
            Constraint::Exact(target) => versions.iter().find(|v| *v == target),
        }
    }
}

/// `x` as a whole segment of the numeric part; `2.0.0-next` is an exact version.
fn is_x_range(text: &str) -> bool {
    let numeric = text.split(['-', '+']).next().unwrap_or(text);
    numeric.split('.').any(|part| part == "x")
}

impl FromStr for Constraint {
    type Err = WandError;

    fn from_str(s: &str) -> Result<Self> {
        Constraint::parse(s)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Latest => f.write_str("latest"),
            Constraint::Caret(v) => write!(f, "^{v}"),
            Constraint::Tilde(v) => write!(f, "~{v}"),
            Constraint::GreaterOrEqual(v) => write!(f, ">={v}"),
            Constraint::LessOrEqual(v) => write!(f, "<={v}"),
            Constraint::Greater(v) => write!(f, ">{v}"),
            Constraint::Less(v) => write!(f, "<{v}"),
            Constraint::XRange { major, minor: None } => write!(f, "{major}.x"),
            Constraint::XRange { major, minor: Some(minor) } => write!(f, "{major}.{minor}.x"),
            Constraint::Exact(v) => write!(f, "{v}"),
        }
    }
}
