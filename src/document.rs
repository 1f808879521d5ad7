//! Typed views over graph documents.
//!
//! Blank constructors return well-formed, not-yet-persisted nodes with every
//! optional sub-structure empty. No validation happens here; plugin
//! descriptors are checked by [`crate::plugins::validate_plugin`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::access::{Access, Level};
use crate::error::{GraphError, Result};
use crate::node_id::{NodeId, NodeKind};

/// A principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: NodeId,
    pub title: String,
    pub enabled: bool,
    /// Grants unconditional access to everything.
    pub is_root: bool,
    pub default_namespace: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub access: Option<Access>,
}

/// Tenancy boundary and permission-inheritance root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub id: NodeId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub access: Option<Access>,
}

/// A managed resource (device, asset, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub id: NodeId,
    pub title: String,
    /// Free-form classification
    pub kind: String,
    /// Owning namespace, recorded for display. The `Children` edges are authoritative.
    pub namespace: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub access: Option<Access>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginKind {
    #[default]
    Unknown,
    Embedded,
    Standalone,
}

/// Configuration required by embedded plugins.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmbeddedConf {
    pub frontend_url: String,
}

/// Extension descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    pub id: NodeId,
    pub title: String,
    pub kind: PluginKind,
    #[serde(default)]
    pub description: String,
    /// Visible to every authenticated principal.
    #[serde(default)]
    pub public: bool,
    /// Namespace a private plugin is scoped to.
    #[serde(default)]
    pub namespace: Option<NodeId>,
    #[serde(default)]
    pub embedded_conf: Option<EmbeddedConf>,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub access: Option<Access>,
}

/// Any node stored in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Document {
    Account(Account),
    Namespace(Namespace),
    Object(Object),
    Plugin(Plugin),
}

impl Account {
    pub fn new_blank(key: &str) -> Result<Self> {
        Ok(Account {
            id: NodeId::new(NodeKind::Account.collection(), key)?,
            title: String::new(),
            enabled: false,
            is_root: false,
            default_namespace: None,
            access: None,
        })
    }
}

impl Namespace {
    pub fn new_blank(key: &str) -> Result<Self> {
        Ok(Namespace {
            id: NodeId::new(NodeKind::Namespace.collection(), key)?,
            title: String::new(),
            access: None,
        })
    }
}

impl Object {
    pub fn new_blank(key: &str) -> Result<Self> {
        Ok(Object {
            id: NodeId::new(NodeKind::Object.collection(), key)?,
            title: String::new(),
            kind: String::new(),
            namespace: None,
            access: None,
        })
    }
}

impl Plugin {
    pub fn new_blank(key: &str) -> Result<Self> {
        Ok(Plugin {
            id: NodeId::new(NodeKind::Plugin.collection(), key)?,
            title: String::new(),
            kind: PluginKind::Unknown,
            description: String::new(),
            public: false,
            namespace: None,
            embedded_conf: None,
            vars: BTreeMap::new(),
            access: None,
        })
    }
}

impl Document {
    /// Blank document of the given kind.
    pub fn new_blank(kind: NodeKind, key: &str) -> Result<Self> {
        Ok(match kind {
            NodeKind::Account => Document::Account(Account::new_blank(key)?),
            NodeKind::Namespace => Document::Namespace(Namespace::new_blank(key)?),
            NodeKind::Object => Document::Object(Object::new_blank(key)?),
            NodeKind::Plugin => Document::Plugin(Plugin::new_blank(key)?),
        })
    }

    pub fn id(&self) -> &NodeId {
        match self {
            Document::Account(a) => &a.id,
            Document::Namespace(n) => &n.id,
            Document::Object(o) => &o.id,
            Document::Plugin(p) => &p.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Document::Account(_) => NodeKind::Account,
            Document::Namespace(_) => NodeKind::Namespace,
            Document::Object(_) => NodeKind::Object,
            Document::Plugin(_) => NodeKind::Plugin,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Document::Account(a) => &a.title,
            Document::Namespace(n) => &n.title,
            Document::Object(o) => &o.title,
            Document::Plugin(p) => &p.title,
        }
    }

    pub fn access(&self) -> Option<&Access> {
        self.access_slot_ref().as_ref()
    }

    /// Set the access level, allocating the access block if absent.
    pub fn set_access_level(&mut self, level: Level) {
        let slot = self.access_slot();
        if let Some(access) = slot.as_mut() {
            access.level = level;
        } else {
            *slot = Some(Access::new(level));
        }
    }

    fn access_slot(&mut self) -> &mut Option<Access> {
        match self {
            Document::Account(a) => &mut a.access,
            Document::Namespace(n) => &mut n.access,
            Document::Object(o) => &mut o.access,
            Document::Plugin(p) => &mut p.access,
        }
    }

    fn access_slot_ref(&self) -> &Option<Access> {
        match self {
            Document::Account(a) => &a.access,
            Document::Namespace(n) => &n.access,
            Document::Object(o) => &o.access,
            Document::Plugin(p) => &p.access,
        }
    }

    /// Copy with the access block stripped, as written to the store.
    pub fn without_access(&self) -> Document {
        let mut doc = self.clone();
        *doc.access_slot() = None;
        doc
    }

    pub fn into_account(self) -> Result<Account> {
        match self {
            Document::Account(a) => Ok(a),
            other => Err(wrong_kind(other.id(), NodeKind::Account)),
        }
    }

    pub fn into_namespace(self) -> Result<Namespace> {
        match self {
            Document::Namespace(n) => Ok(n),
            other => Err(wrong_kind(other.id(), NodeKind::Namespace)),
        }
    }

    pub fn into_object(self) -> Result<Object> {
        match self {
            Document::Object(o) => Ok(o),
            other => Err(wrong_kind(other.id(), NodeKind::Object)),
        }
    }

    pub fn into_plugin(self) -> Result<Plugin> {
        match self {
            Document::Plugin(p) => Ok(p),
            other => Err(wrong_kind(other.id(), NodeKind::Plugin)),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.without_access()).map_err(crate::error::err)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(crate::error::err)
    }
}

fn wrong_kind(id: &NodeId, expected: NodeKind) -> GraphError {
    GraphError::InvalidArgument(format!("{} is not a {:?}", id, expected))
}

impl From<Account> for Document {
    fn from(a: Account) -> Self {
        Document::Account(a)
    }
}

impl From<Namespace> for Document {
    fn from(n: Namespace) -> Self {
        Document::Namespace(n)
    }
}

impl From<Object> for Document {
    fn from(o: Object) -> Self {
        Document::Object(o)
    }
}

impl From<Plugin> for Document {
    fn from(p: Plugin) -> Self {
        Document::Plugin(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;

    #[test]
    fn test_blank_plugin_is_empty() {
        let p = Plugin::new_blank("p1").unwrap();
        assert_eq!(p.id.to_string(), "Plugins/p1");
        assert!(p.title.is_empty());
        assert_eq!(p.kind, PluginKind::Unknown);
        assert!(p.embedded_conf.is_none());
        assert!(p.access.is_none());
        assert!(p.vars.is_empty());
    }

    #[test]
    fn test_blank_by_kind() {
        let doc = Document::new_blank(NodeKind::Namespace, "default").unwrap();
        assert_eq!(doc.kind(), NodeKind::Namespace);
        assert_eq!(doc.id().to_string(), "Namespaces/default");
        assert!(doc.access().is_none());
    }

    #[test]
    fn test_set_access_level_allocates() {
        let mut doc: Document = Object::new_blank("o1").unwrap().into();
        doc.set_access_level(Level::Read);
        assert_eq!(doc.access(), Some(&Access::new(Level::Read)));
    }

    #[test]
    fn test_set_access_level_keeps_role() {
        let mut p = Plugin::new_blank("p1").unwrap();
        p.access = Some(Access::owner(Level::Admin));
        let mut doc: Document = p.into();
        doc.set_access_level(Level::Mgmt);
        let access = doc.access().unwrap();
        assert_eq!(access.level, Level::Mgmt);
        assert_eq!(access.role, Role::Owner);
    }

    #[test]
    fn test_json_strips_access() {
        let mut doc: Document = Namespace::new_blank("ns").unwrap().into();
        doc.set_access_level(Level::Admin);
        let back = Document::from_json(&doc.to_json().unwrap()).unwrap();
        assert!(back.access().is_none());
        assert_eq!(back.id(), doc.id());
    }

    #[test]
    fn test_into_wrong_kind() {
        let doc: Document = Namespace::new_blank("ns").unwrap().into();
        assert!(matches!(doc.into_account(), Err(GraphError::InvalidArgument(_))));
    }

    #[test]
    fn test_blank_rejects_bad_key() {
        assert!(Account::new_blank("").is_err());
        assert!(Object::new_blank("a/b").is_err());
    }
}
