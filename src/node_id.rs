//! Compact NodeId representation using a length-prefixed byte array.
//!
//! Format: [collection_len: u8][collection_bytes][key_bytes]
//!
//! The display form is the document id `Collection/key`, e.g. `Accounts/alice`.
//! Prefix scans over the byte form still find every node of a collection.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::constants::{
    is_node_collection, ACCOUNTS_COL, NAMESPACES_COL, OBJECTS_COL, PLUGINS_COL,
};
use crate::error::GraphError;

/// Maximum length for a collection name (255 bytes)
pub const MAX_COLLECTION_LEN: usize = 255;

/// Maximum encoded length, so an id fits one length-prefixed key part
pub const MAX_ID_LEN: usize = 255;

/// Kind of node, derived from its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Account,
    Namespace,
    Object,
    Plugin,
}

impl NodeKind {
    pub fn collection(self) -> &'static str {
        match self {
            NodeKind::Account => ACCOUNTS_COL,
            NodeKind::Namespace => NAMESPACES_COL,
            NodeKind::Object => OBJECTS_COL,
            NodeKind::Plugin => PLUGINS_COL,
        }
    }

    pub fn from_collection(col: &str) -> Option<NodeKind> {
        match col {
            ACCOUNTS_COL => Some(NodeKind::Account),
            NAMESPACES_COL => Some(NodeKind::Namespace),
            OBJECTS_COL => Some(NodeKind::Object),
            PLUGINS_COL => Some(NodeKind::Plugin),
            _ => None,
        }
    }

    /// Whether access edges may point at nodes of this kind.
    pub fn is_target(self) -> bool {
        !matches!(self, NodeKind::Account)
    }
}

/// Compact document identifier.
#[derive(Clone)]
pub struct NodeId {
    data: Box<[u8]>,
}

impl NodeId {
    /// Create from collection and key. The collection must be a known node collection.
    ///
    /// # Example
    /// ```
    /// use meshgraph::NodeId;
    /// let id = NodeId::new("Accounts", "alice").unwrap();
    /// assert_eq!(id.collection(), "Accounts");
    /// assert_eq!(id.key(), "alice");
    /// ```
    pub fn new(collection: &str, key: &str) -> Result<Self, GraphError> {
        if !is_node_collection(collection) {
            return Err(GraphError::InvalidArgument(format!(
                "unknown collection '{}'",
                collection
            )));
        }
        if collection.len() > MAX_COLLECTION_LEN {
            return Err(GraphError::InvalidArgument(format!(
                "collection too long: {} bytes (max {})",
                collection.len(),
                MAX_COLLECTION_LEN
            )));
        }
        if key.is_empty() {
            return Err(GraphError::InvalidArgument("node key cannot be empty".into()));
        }
        if 1 + collection.len() + key.len() > MAX_ID_LEN {
            return Err(GraphError::InvalidArgument(format!(
                "node id too long: {} bytes (max {})",
                1 + collection.len() + key.len(),
                MAX_ID_LEN
            )));
        }
        if key.contains('/') {
            return Err(GraphError::InvalidArgument(format!(
                "node key '{}' cannot contain '/'",
                key
            )));
        }

        let mut data = Vec::with_capacity(1 + collection.len() + key.len());
        data.push(collection.len() as u8);
        data.extend_from_slice(collection.as_bytes());
        data.extend_from_slice(key.as_bytes());
        Ok(Self { data: data.into_boxed_slice() })
    }

    /// Parse from `Collection/key` document id format.
    pub fn parse(s: &str) -> Result<Self, GraphError> {
        let (collection, key) = s.split_once('/').ok_or_else(|| {
            GraphError::InvalidArgument(format!("invalid node id '{}': must be 'Collection/key'", s))
        })?;
        Self::new(collection, key)
    }

    /// Create from raw stored bytes. Validates format and UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GraphError> {
        let corrupt = |m: String| GraphError::StoreUnavailable(format!("corrupt node id: {}", m));
        let len = *bytes.first().ok_or_else(|| corrupt("empty".into()))? as usize;
        if bytes.len() < 1 + len + 1 {
            return Err(corrupt(format!("{} bytes is too short", bytes.len())));
        }
        let collection = std::str::from_utf8(&bytes[1..1 + len]).map_err(|e| corrupt(e.to_string()))?;
        let key = std::str::from_utf8(&bytes[1 + len..]).map_err(|e| corrupt(e.to_string()))?;
        Self::new(collection, key).map_err(|e| corrupt(e.to_string()))
    }

    #[inline]
    pub fn collection(&self) -> &str {
        let len = self.data[0] as usize;
        // SAFETY: validated UTF-8 on construction
        unsafe { std::str::from_utf8_unchecked(&self.data[1..1 + len]) }
    }

    #[inline]
    pub fn key(&self) -> &str {
        let len = self.data[0] as usize;
        // SAFETY: validated UTF-8 on construction
        unsafe { std::str::from_utf8_unchecked(&self.data[1 + len..]) }
    }

    /// Node kind. Always known, since construction rejects other collections.
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_collection(self.collection()).unwrap_or(NodeKind::Object)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn is(&self, kind: NodeKind) -> bool {
        self.collection() == kind.collection()
    }

    /// Prefix bytes for scanning every node of a collection.
    pub fn prefix_for_collection(collection: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(1 + collection.len());
        prefix.push(collection.len() as u8);
        prefix.extend_from_slice(collection.as_bytes());
        prefix
    }
}

impl PartialEq for NodeId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for NodeId {}

impl PartialOrd for NodeId {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeId {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.data.cmp(&other.data)
    }
}

impl Hash for NodeId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.hash(state);
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection(), self.key())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}/{})", self.collection(), self.key())
    }
}

impl TryFrom<&str> for NodeId {
    type Error = GraphError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl AsRef<[u8]> for NodeId {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

// Serialized as the "Collection/key" string
impl serde::Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for NodeId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let id = NodeId::new("Objects", "sample-node").unwrap();
        assert_eq!(id.collection(), "Objects");
        assert_eq!(id.key(), "sample-node");
        assert_eq!(id.kind(), NodeKind::Object);
        assert_eq!(id.to_string(), "Objects/sample-node");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(NodeId::parse("no_slash").is_err());
        assert!(NodeId::parse("").is_err());
        assert!(NodeId::parse("/alice").is_err());
        assert!(NodeId::parse("Accounts/").is_err());
        assert!(NodeId::parse("Users/alice").is_err());
        assert!(NodeId::parse("Accounts/a/b").is_err());
    }

    #[test]
    fn test_byte_format() {
        let id = NodeId::new("Plugins", "p1").unwrap();
        let bytes = id.as_bytes();
        assert_eq!(bytes[0], 7);
        assert_eq!(&bytes[1..8], b"Plugins");
        assert_eq!(&bytes[8..], b"p1");
        assert_eq!(NodeId::from_bytes(bytes).unwrap(), id);
    }

    #[test]
    fn test_from_bytes_corrupt() {
        assert!(NodeId::from_bytes(&[]).is_err());
        assert!(NodeId::from_bytes(&[8, b'A']).is_err());
        let mut bad = NodeId::prefix_for_collection("Accounts");
        bad.push(0xFF);
        assert!(NodeId::from_bytes(&bad).is_err());
    }

    #[test]
    fn test_prefix_for_collection() {
        let prefix = NodeId::prefix_for_collection("Accounts");
        assert!(NodeId::new("Accounts", "alice").unwrap().as_bytes().starts_with(&prefix));
        assert!(!NodeId::new("Objects", "alice").unwrap().as_bytes().starts_with(&prefix));
    }

    #[test]
    fn test_long_key() {
        assert!(NodeId::new("Objects", &"k".repeat(240)).is_ok());
        assert!(NodeId::new("Objects", &"k".repeat(250)).is_err());
    }

    #[test]
    fn test_kind_targets() {
        assert!(!NodeKind::Account.is_target());
        assert!(NodeKind::Namespace.is_target());
        assert!(NodeKind::Plugin.is_target());
    }

    #[test]
    fn test_serde_string_form() {
        let id = NodeId::new("Namespaces", "default").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"Namespaces/default\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
