//! Cache keys
//!
//! A key identifies one deterministic transformation: the source library,
//! the build-tools revision that processed it, and whatever extra options a
//! specialization adds. Two keys are equal only if every field matches.

use crate::error::{PredexError, PredexResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Extra attributes of a persisted record, by attribute name
pub type Attributes = BTreeMap<String, String>;

/// Kind of a preview revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviewType {
    /// Release candidate
    Rc,
    /// Alpha preview
    Alpha,
    /// Beta preview
    Beta,
}

impl PreviewType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Rc => "rc",
            Self::Alpha => "alpha",
            Self::Beta => "beta",
        }
    }

    fn all() -> [Self; 3] {
        [Self::Rc, Self::Alpha, Self::Beta]
    }
}

/// Build-tools revision, e.g. `23.0.1` or `22.0.0 rc1`
///
/// Missing minor and micro components default to zero, so `23` and `23.0.0`
/// are the same revision. A preview number of zero means a final release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision {
    major: u32,
    minor: u32,
    micro: u32,
    preview_type: PreviewType,
    preview: u32,
}

impl Revision {
    /// Create a final (non-preview) revision
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            preview_type: PreviewType::Rc,
            preview: 0,
        }
    }

    /// Create a preview revision
    pub fn preview(major: u32, minor: u32, micro: u32, kind: PreviewType, number: u32) -> Self {
        if number == 0 {
            return Self::new(major, minor, micro);
        }
        Self {
            major,
            minor,
            micro,
            preview_type: kind,
            preview: number,
        }
    }

    pub fn is_preview(&self) -> bool {
        self.preview > 0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if self.preview > 0 {
            write!(f, " {}{}", self.preview_type.as_str(), self.preview)?;
        }
        Ok(())
    }
}

impl FromStr for Revision {
    type Err = PredexError;

    fn from_str(s: &str) -> PredexResult<Self> {
        let invalid = || PredexError::InvalidRevision(s.to_string());
        let text = s.trim();

        let numeric_end = text
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(text.len());
        let (numbers, rest) = text.split_at(numeric_end);

        let mut parts = numbers.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let mut component = || -> PredexResult<u32> {
            match parts.next() {
                Some(p) => p.parse().map_err(|_| invalid()),
                None => Ok(0),
            }
        };
        let minor = component()?;
        let micro = component()?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        let rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '-');
        if rest.is_empty() {
            return Ok(Self::new(major, minor, micro));
        }

        let kind = PreviewType::all()
            .into_iter()
            .find(|k| rest.starts_with(k.as_str()))
            .ok_or_else(invalid)?;
        let number = rest[kind.as_str().len()..]
            .parse()
            .map_err(|_| invalid())?;

        Ok(Self::preview(major, minor, micro, kind, number))
    }
}

impl TryFrom<String> for Revision {
    type Error = PredexError;

    fn try_from(value: String) -> PredexResult<Self> {
        value.parse()
    }
}

impl From<Revision> for String {
    fn from(value: Revision) -> Self {
        value.to_string()
    }
}

/// Behaviour the cache engine needs from a key type
pub trait CacheKey: Clone + Eq + Hash + Send + Sync + fmt::Debug {
    /// The library this key's transformation reads
    fn source_file(&self) -> &Path;

    /// The tool revision the transformation ran with
    fn revision(&self) -> &Revision;
}

/// Base key: source file and tool revision
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    source_file: PathBuf,
    revision: Revision,
}

impl Key {
    pub fn new(source_file: impl Into<PathBuf>, revision: Revision) -> Self {
        Self {
            source_file: source_file.into(),
            revision,
        }
    }

    /// Codec for keys with no extra attributes
    pub fn codec() -> KeyCodec<Key> {
        KeyCodec {
            read: |source, revision, _| Some(Key::new(source, *revision)),
            write: |_, _| {},
        }
    }
}

impl CacheKey for Key {
    fn source_file(&self) -> &Path {
        &self.source_file
    }

    fn revision(&self) -> &Revision {
        &self.revision
    }
}

/// How a specialization maps its key to and from a persisted record
///
/// `read` rebuilds a key from the record's source path, revision and extra
/// attributes, returning `None` if the attributes are unusable. `write`
/// adds the key's extra attributes to a record.
pub struct KeyCodec<K> {
    pub read: fn(&Path, &Revision, &Attributes) -> Option<K>,
    pub write: fn(&K, &mut Attributes),
}

impl<K> Clone for KeyCodec<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for KeyCodec<K> {}
