//! Content identifiers, content paths and the hot pointer.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace prefix for immutable content paths.
pub const IPFS_NAMESPACE: &str = "/ipfs/";

/// Namespace prefix for mutable naming-system paths.
pub const IPNS_NAMESPACE: &str = "/ipns/";

/// A content identifier as reported by the node.
///
/// CIDs are compared by their string form. The node's canonical encoding is
/// what both the naming system and the pin listing report, so two CIDs for
/// the same content in different bases are treated as different pins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(String);

impl Cid {
    /// Create a CID from its string form.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(Error::InvalidInput("empty CID".into()));
        }
        if s.contains('/') || s.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInput(format!("malformed CID: {:?}", s)));
        }
        Ok(Self(s))
    }

    /// Get the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        let start = self.0.len().saturating_sub(8);
        self.0.get(start..).unwrap_or(&self.0)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Cid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Cid {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

/// A path into the content namespace, e.g. `/ipfs/<cid>/docs`.
///
/// This is what the naming system hands back: a path, not a CID. It has to
/// be dereferenced once more to learn the identifier of the content it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentPath(String);

impl ContentPath {
    /// Parse a content path. It must be absolute and carry a namespace.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| Error::InvalidInput(format!("content path must be absolute: {:?}", s)))?;
        match rest.split_once('/') {
            Some((ns, tail)) if !ns.is_empty() && !tail.is_empty() => Ok(Self(s)),
            _ => Err(Error::InvalidInput(format!("content path lacks a namespace: {:?}", s))),
        }
    }

    /// The immutable path of a CID.
    pub fn ipfs(cid: &Cid) -> Self {
        Self(format!("{}{}", IPFS_NAMESPACE, cid))
    }

    /// Get the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The CID at the root of an `/ipfs/` path, with whatever follows it.
    ///
    /// Returns `None` for other namespaces.
    pub fn ipfs_root(&self) -> Option<(Cid, Option<&str>)> {
        let rest = self.0.strip_prefix(IPFS_NAMESPACE)?;
        let (root, tail) = match rest.split_once('/') {
            Some((root, tail)) => (root, Some(tail).filter(|t| !t.is_empty())),
            None => (rest, None),
        };
        Cid::new(root).ok().map(|cid| (cid, tail))
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentPath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ContentPath> for String {
    fn from(path: ContentPath) -> Self {
        path.0
    }
}

/// The process-configured symbolic path naming the current hot dataset.
///
/// Only emptiness is checked here; anything else is for the naming system
/// to accept or refuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HotPointer(String);

impl HotPointer {
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(Error::InvalidInput("hot pointer must not be empty".into()));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HotPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HotPointer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for HotPointer {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<HotPointer> for String {
    fn from(pointer: HotPointer) -> Self {
        pointer.0
    }
}
