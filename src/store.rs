//! Graph store adapter: the narrow interface the engine needs from the
//! underlying document database.
//!
//! Implementations own physical storage and transaction boundaries. The
//! engine only passes ids and resolves them on demand.

use crate::access::{Access, Level};
use crate::constants::is_edge_collection;
use crate::document::Document;
use crate::error::{GraphError, Result};
use crate::node_id::NodeId;

/// A directed edge as returned by traversal calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub access: Access,
}

/// Operation types for WriteBatch
#[derive(Debug, Clone)]
pub enum WriteOp {
    PutNode(Document),
    DeleteNode(NodeId),
    UpsertEdge { collection: &'static str, from: NodeId, to: NodeId, access: Access },
    /// Set the level, keeping the role of an existing edge.
    MergeEdgeLevel { collection: &'static str, from: NodeId, to: NodeId, level: Level },
    DeleteEdge { collection: &'static str, from: NodeId, to: NodeId },
    /// Reserve a unique name for `owner`. Released when the owner is deleted.
    ClaimName { scope: &'static str, name: String, owner: NodeId },
}

/// A batch of mutations applied atomically by [`GraphStore::transact`].
///
/// # Example
/// ```ignore
/// let mut batch = WriteBatch::new();
/// batch.put_node(account.into());
/// batch.put_node(namespace.into());
/// batch.upsert_edge(PERMISSIONS_EDGE, &account_id, &ns_id, Access::owner(Level::Root));
/// store.transact(batch)?; // all or nothing
/// ```
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { ops: Vec::with_capacity(capacity) }
    }

    /// Insert or overwrite a node. The access block is never persisted.
    pub fn put_node(&mut self, doc: Document) -> &mut Self {
        self.ops.push(WriteOp::PutNode(doc.without_access()));
        self
    }

    pub fn delete_node(&mut self, id: &NodeId) -> &mut Self {
        self.ops.push(WriteOp::DeleteNode(id.clone()));
        self
    }

    pub fn upsert_edge(&mut self, collection: &'static str, from: &NodeId, to: &NodeId, access: Access) -> &mut Self {
        self.ops.push(WriteOp::UpsertEdge { collection, from: from.clone(), to: to.clone(), access });
        self
    }

    pub fn merge_edge_level(&mut self, collection: &'static str, from: &NodeId, to: &NodeId, level: Level) -> &mut Self {
        self.ops.push(WriteOp::MergeEdgeLevel { collection, from: from.clone(), to: to.clone(), level });
        self
    }

    /// Fail the whole batch if another node already holds `name` in `scope`.
    pub fn claim_name(&mut self, scope: &'static str, name: &str, owner: &NodeId) -> &mut Self {
        self.ops.push(WriteOp::ClaimName { scope, name: name.to_string(), owner: owner.clone() });
        self
    }

    pub fn delete_edge(&mut self, collection: &'static str, from: &NodeId, to: &NodeId) -> &mut Self {
        self.ops.push(WriteOp::DeleteEdge { collection, from: from.clone(), to: to.clone() });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Operations the engine consumes from the document/graph database.
///
/// All methods may block on I/O. Implementations must be safe for concurrent
/// use and must surface connection and conflict failures as
/// [`GraphError::StoreUnavailable`] rather than swallowing them.
pub trait GraphStore: Send + Sync {
    /// Fetch a node. Fails with `NotFound` when absent.
    fn get_node(&self, id: &NodeId) -> Result<Document>;

    /// Edges leaving `from` in `collection`.
    fn outbound(&self, collection: &str, from: &NodeId) -> Result<Vec<Edge>>;

    /// Edges arriving at `to` in `collection`.
    fn inbound(&self, collection: &str, to: &NodeId) -> Result<Vec<Edge>>;

    /// A single edge, if present.
    fn get_edge(&self, collection: &str, from: &NodeId, to: &NodeId) -> Result<Option<Access>> {
        Ok(self.outbound(collection, from)?.into_iter().find(|e| &e.to == to).map(|e| e.access))
    }

    /// Insert or overwrite an edge (last write wins).
    fn upsert_edge(&self, collection: &'static str, from: &NodeId, to: &NodeId, access: Access) -> Result<()> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.upsert_edge(collection, from, to, access);
        self.transact(batch)
    }

    /// Remove an edge. Returns whether it existed.
    fn delete_edge(&self, collection: &'static str, from: &NodeId, to: &NodeId) -> Result<bool>;

    /// Apply every operation or none of them.
    fn transact(&self, batch: WriteBatch) -> Result<()>;

    /// Every node in a node collection.
    fn list_nodes(&self, collection: &str) -> Result<Vec<Document>>;

    /// Node holding `name` in `scope`, if claimed.
    fn name_owner(&self, scope: &str, name: &str) -> Result<Option<NodeId>>;
}

/// Reject edge operations naming an unknown edge collection.
pub(crate) fn check_edge_collection(collection: &str) -> Result<()> {
    if is_edge_collection(collection) {
        Ok(())
    } else {
        Err(GraphError::InvalidArgument(format!("unknown edge collection '{}'", collection)))
    }
}

/// Names are stored as one length-prefixed key part.
pub(crate) fn check_name(scope: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.len() > u8::MAX as usize {
        return Err(GraphError::InvalidArgument(format!(
            "{} name must be 1..=255 bytes, got {}",
            scope,
            name.len()
        )));
    }
    Ok(())
}

pub(crate) fn name_taken(scope: &str, name: &str) -> GraphError {
    GraphError::InvalidArgument(format!("{} '{}' already exists", scope, name))
}
