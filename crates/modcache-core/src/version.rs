//! Semantic version parsing and comparison.
//!
//! The grammar follows SemVer 2.0.0's version-core/pre-release/build shape,
//! but comparison of the pre-release component is **plain string comparison**
//! rather than SemVer's per-dot-identifier rules. This mirrors the proxy this
//! crate replaces and is preserved deliberately — see the crate-level design
//! notes for the open question this leaves.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

const NUM_IDENT: &str = r"0|[1-9]\d*";
const IDENT: &str = r"[0-9A-Za-z\-]";
const NON_DIGIT: &str = r"[A-Za-z\-]";

static SEMVER_RE: Lazy<Regex> = Lazy::new(|| {
    let alphanum_ident = format!(r"(?:{IDENT}*{NON_DIGIT}{IDENT}*)");
    let pre_release_ident = format!(r"(?:{alphanum_ident}|(?:{NUM_IDENT}))");
    let pre_release = format!(r"{pre_release_ident}(?:\.{pre_release_ident})*");
    let build_ident = format!(r"(?:{alphanum_ident}|\d+)");
    let build = format!(r"{build_ident}(?:\.{build_ident})*");
    let core = format!(r"({NUM_IDENT})\.({NUM_IDENT})\.({NUM_IDENT})");
    let pattern = format!(r"^{core}(?:\-({pre_release}))?(?:\+({build}))?$");
    Regex::new(&pattern).expect("semver pattern is a valid regex")
});

/// A parsed `MAJOR.MINOR.PATCH[-PRE][+BUILD]` version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: String,
    pub build: String,
}

impl Version {
    /// The zero version, returned when a module has no tags at all.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            major: 0,
            minor: 0,
            patch: 0,
            pre_release: String::new(),
            build: String::new(),
        }
    }

    /// Parses a bare `MAJOR.MINOR.PATCH[...]` string (no leading `v`).
    pub fn parse(input: &str) -> Result<Self> {
        let caps = SEMVER_RE
            .captures(input)
            .ok_or_else(|| Error::Other(format!("invalid version format: {input}")))?;
        let major = caps[1]
            .parse()
            .map_err(|_| Error::Other(format!("invalid version format: {input}")))?;
        let minor = caps[2]
            .parse()
            .map_err(|_| Error::Other(format!("invalid version format: {input}")))?;
        let patch = caps[3]
            .parse()
            .map_err(|_| Error::Other(format!("invalid version format: {input}")))?;
        Ok(Self {
            major,
            minor,
            patch,
            pre_release: caps.get(4).map_or(String::new(), |m| m.as_str().to_string()),
            build: caps.get(5).map_or(String::new(), |m| m.as_str().to_string()),
        })
    }

    /// Parses a tag (`v`-prefixed) version string.
    pub fn parse_tag(input: &str) -> Result<Self> {
        let rest = input
            .strip_prefix('v')
            .ok_or_else(|| Error::Other(format!("invalid version format: {input}")))?;
        Self::parse(rest)
    }

    /// Total ordering: `(major, minor, patch)` numerically, then
    /// `pre_release` compared as a plain string (not per-identifier). A
    /// non-empty pre-release sorts *before* the stable release of the same
    /// core version (an empty string compares greatest), matching the
    /// original's `strings.Compare(ver.PreRelease, v.PreRelease)` with the
    /// receiver and argument swapped.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| other.pre_release.cmp(&self.pre_release))
    }

    /// Returns the larger of `self` and `other`, preferring `self` on a tie.
    #[must_use]
    pub fn latest(&self, other: &Self) -> Self {
        if self.compare(other) == Ordering::Less {
            other.clone()
        } else {
            self.clone()
        }
    }

    /// Renders as `vMAJOR.MINOR.PATCH[...]`.
    #[must_use]
    pub fn render_tag(&self) -> String {
        format!("v{self}")
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre_release.is_empty() {
            write!(f, "-{}", self.pre_release)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

/// Compares two raw (non-`v`-prefixed) version strings.
pub fn compare_str(a: &str, b: &str) -> Result<Ordering> {
    Ok(Version::parse(a)?.compare(&Version::parse(b)?))
}

/// Compares two `v`-prefixed tag strings.
pub fn compare_tag_str(a: &str, b: &str) -> Result<Ordering> {
    Ok(Version::parse_tag(a)?.compare(&Version::parse_tag(b)?))
}

/// Returns the later of two raw version strings, `a` on a tie.
pub fn latest_str(a: &str, b: &str) -> Result<Version> {
    Ok(Version::parse(a)?.latest(&Version::parse(b)?))
}

/// Returns the later of two tag-version strings, `a` on a tie.
pub fn latest_tag_str(a: &str, b: &str) -> Result<Version> {
    Ok(Version::parse_tag(a)?.latest(&Version::parse_tag(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_version() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
        assert!(v.pre_release.is_empty());
        assert!(v.build.is_empty());
    }

    #[test]
    fn parses_prerelease_and_build() {
        let v = Version::parse("1.2.3-rc.1+build.7").unwrap();
        assert_eq!(v.pre_release, "rc.1");
        assert_eq!(v.build, "build.7");
    }

    #[test]
    fn rejects_leading_zero() {
        assert!(Version::parse("01.2.3").is_err());
        assert!(Version::parse("1.02.3").is_err());
    }

    #[test]
    fn round_trips_through_render() {
        for raw in ["0.0.0", "1.2.3", "1.2.3-alpha.1", "1.2.3+build", "1.2.3-rc.1+b.2"] {
            let v = Version::parse(raw).unwrap();
            assert_eq!(v.to_string(), raw);
            assert_eq!(Version::parse(&v.to_string()).unwrap(), v);
        }
    }

    #[test]
    fn tag_parses_and_renders_with_v_prefix() {
        let v = Version::parse_tag("v1.2.3").unwrap();
        assert_eq!(v.render_tag(), "v1.2.3");
        assert!(Version::parse_tag("1.2.3").is_err());
    }

    #[test]
    fn compares_numeric_components_first() {
        let a = Version::parse("2.0.0").unwrap();
        let b = Version::parse("1.9.9").unwrap();
        assert_eq!(a.compare(&b), Ordering::Greater);
    }

    #[test]
    fn prerelease_is_compared_as_plain_string_not_semver_rules() {
        // Under strict SemVer, numeric identifiers compare numerically (so
        // "2" < "10"). This proxy instead compares the whole pre-release
        // string lexicographically, where "2" sorts after "10" (byte '2' >
        // byte '1').
        let a = Version::parse("1.0.0-2").unwrap();
        let b = Version::parse("1.0.0-10").unwrap();
        assert_eq!(a.compare(&b), "10".cmp("2"));
        assert_eq!(a.compare(&b), Ordering::Less);
    }

    #[test]
    fn prerelease_sorts_before_its_own_stable_release() {
        let pre = Version::parse("1.0.0-alfa.1").unwrap();
        let stable = Version::parse("1.0.0").unwrap();
        assert_eq!(pre.compare(&stable), Ordering::Less);
        assert_eq!(stable.compare(&pre), Ordering::Greater);
    }

    #[test]
    fn latest_prefers_self_on_tie() {
        let a = Version::parse("1.0.0").unwrap();
        let b = Version::parse("1.0.0").unwrap();
        assert_eq!(a.latest(&b), a);
    }

    #[test]
    fn latest_picks_the_greater_version() {
        let a = Version::parse("1.0.0").unwrap();
        let b = Version::parse("1.2.0").unwrap();
        assert_eq!(a.latest(&b), b);
        assert_eq!(b.latest(&a), b);
    }

    #[test]
    fn latest_tag_str_helper_matches_version_helper() {
        let v = latest_tag_str("v1.0.0", "v2.0.0").unwrap();
        assert_eq!(v.to_string(), "2.0.0");
    }
}
