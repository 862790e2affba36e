//! Comparable version values used for ordering and compatibility checks.

use std::fmt;

/// A mod, manager or host version parsed from a manifest string.
///
/// Up to four numeric segments are kept. The all-zero value doubles as an
/// "unspecified" sentinel throughout the runtime: a zero manager or host
/// version disables the corresponding compatibility check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

impl Version {
    /// The "unspecified" sentinel.
    pub const ZERO: Version = Version {
        major: 0,
        minor: 0,
        patch: 0,
        build: 0,
    };

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build: 0,
        }
    }

    /// Lenient parse: segments split on `.`, non-digit characters stripped
    /// per segment, anything missing or still unparseable becomes zero.
    /// Manifests in the wild carry strings like `"1.2.3b"` or `"v1.0"`.
    pub fn parse(raw: &str) -> Version {
        let mut segments = [0u32; 4];
        for (i, segment) in raw.split('.').take(4).enumerate() {
            let digits: String = segment.chars().filter(|c| c.is_ascii_digit()).collect();
            segments[i] = digits.parse().unwrap_or(0);
        }
        Version {
            major: segments[0],
            minor: segments[1],
            patch: segments[2],
            build: segments[3],
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.build != 0 {
            write!(f, ".{}", self.build)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_versions() {
        assert_eq!(Version::parse("1.2.3"), Version::new(1, 2, 3));
        assert_eq!(Version::parse("0.13"), Version::new(0, 13, 0));
        assert_eq!(
            Version::parse("1.2.3.4"),
            Version {
                major: 1,
                minor: 2,
                patch: 3,
                build: 4
            }
        );
    }

    #[test]
    fn strips_non_digit_characters_per_segment() {
        assert_eq!(Version::parse("v1.2.3"), Version::new(1, 2, 3));
        assert_eq!(Version::parse("1.0.3b"), Version::new(1, 0, 3));
        assert_eq!(Version::parse("1.2-rc.3"), Version::new(1, 2, 3));
    }

    #[test]
    fn garbage_segments_become_zero() {
        assert_eq!(Version::parse(""), Version::ZERO);
        assert_eq!(Version::parse("abc.def"), Version::ZERO);
        assert_eq!(Version::parse("1..3"), Version::new(1, 0, 3));
    }

    #[test]
    fn total_order() {
        assert!(Version::new(1, 3, 0) > Version::new(1, 2, 9));
        assert!(Version::new(2, 0, 0) > Version::new(1, 99, 99));
        assert!(Version::new(1, 2, 3) < Version::parse("1.2.3.1"));
        assert!(Version::ZERO < Version::new(0, 0, 1));
    }

    #[test]
    fn zero_sentinel() {
        assert!(Version::parse("0.0.0").is_zero());
        assert!(!Version::new(0, 0, 1).is_zero());
    }

    #[test]
    fn display_omits_zero_build() {
        assert_eq!(Version::new(1, 2, 3).to_string(), "1.2.3");
        assert_eq!(Version::parse("1.2.3.4").to_string(), "1.2.3.4");
    }
}
