use std::fmt;
use std::str::FromStr;

/// The N5 format version this crate reads and writes.
pub const FORMAT_VERSION: Version = Version::new(2, 0, 2);

/// Attribute key holding the format version at the container root.
pub const VERSION_ATTRIBUTE_KEY: &str = "n5";

/// A `major.minor.patch` format version.
///
/// Containers whose major version differs from [FORMAT_VERSION] cannot be
/// opened; a differing minor version only warrants a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether a container with this version can be opened by the engine.
    pub fn is_compatible(&self, engine: &Version) -> bool {
        self.major == engine.major
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut next = |name: &str| -> Result<u32, String> {
            match parts.next() {
                // Missing minor/patch components default to zero.
                None => Ok(0),
                Some(p) => p
                    .parse()
                    .map_err(|_| format!("invalid {name} version component in {s:?}")),
            }
        };
        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        if parts.next().is_some() {
            return Err(format!("too many version components in {s:?}"));
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let v: Version = "2.0.2".parse().unwrap();
        assert_eq!(v, Version::new(2, 0, 2));
        assert_eq!(v.to_string(), "2.0.2");

        assert_eq!("2".parse::<Version>().unwrap(), Version::new(2, 0, 0));
        assert_eq!("2.1".parse::<Version>().unwrap(), Version::new(2, 1, 0));
        assert!("two.one".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
    }

    #[test]
    fn compatibility_is_major_only() {
        let engine = Version::new(2, 0, 2);
        assert!(Version::new(2, 9, 0).is_compatible(&engine));
        assert!(!Version::new(3, 0, 0).is_compatible(&engine));
        assert!(!Version::new(1, 0, 0).is_compatible(&engine));
    }
}
