//! In-memory graph store.
//!
//! Used by tests and by embedders that do not need persistence. Supports
//! fault injection so callers can verify that store failures surface as
//! errors instead of decisions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::access::Access;
use crate::constants::is_node_collection;
use crate::document::Document;
use crate::error::{GraphError, Result};
use crate::node_id::NodeId;
use crate::store::{check_edge_collection, check_name, name_taken, Edge, GraphStore, WriteBatch, WriteOp};

type EdgeKey = (String, NodeId, NodeId);

#[derive(Debug, Clone, Default)]
struct Inner {
    nodes: BTreeMap<NodeId, Document>,
    edges: BTreeMap<EdgeKey, Access>,
    // (scope, name) -> owner
    names: BTreeMap<(String, String), NodeId>,
}

impl Inner {
    fn check_endpoints(&self, from: &NodeId, to: &NodeId) -> Result<()> {
        for end in [from, to] {
            if !self.nodes.contains_key(end) {
                return Err(GraphError::NotFound(format!("edge endpoint {}", end)));
            }
        }
        Ok(())
    }

    fn apply(&mut self, op: WriteOp) -> Result<()> {
        match op {
            WriteOp::PutNode(doc) => {
                self.nodes.insert(doc.id().clone(), doc);
            }
            WriteOp::DeleteNode(id) => {
                self.nodes.remove(&id);
                self.edges.retain(|(_, from, to), _| from != &id && to != &id);
                self.names.retain(|_, owner| owner != &id);
            }
            WriteOp::UpsertEdge { collection, from, to, access } => {
                check_edge_collection(collection)?;
                self.check_endpoints(&from, &to)?;
                self.edges.insert((collection.to_string(), from, to), access);
            }
            WriteOp::MergeEdgeLevel { collection, from, to, level } => {
                check_edge_collection(collection)?;
                self.check_endpoints(&from, &to)?;
                let key = (collection.to_string(), from, to);
                let role = self.edges.get(&key).map(|a| a.role).unwrap_or_default();
                self.edges.insert(key, Access { level, role });
            }
            WriteOp::ClaimName { scope, name, owner } => {
                check_name(scope, &name)?;
                if !self.nodes.contains_key(&owner) {
                    return Err(GraphError::NotFound(format!("name owner {}", owner)));
                }
                let key = (scope.to_string(), name);
                match self.names.get(&key) {
                    Some(held) if held != &owner => return Err(name_taken(scope, &key.1)),
                    Some(_) => {}
                    None => {
                        self.names.insert(key, owner);
                    }
                }
            }
            WriteOp::DeleteEdge { collection, from, to } => {
                check_edge_collection(collection)?;
                self.edges.remove(&(collection.to_string(), from, to));
            }
        }
        Ok(())
    }
}

/// Graph store held entirely in memory.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
    // Remaining successful calls before every call fails; usize::MAX disables
    fail_after: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: RwLock::new(Inner::default()),
            unavailable: AtomicBool::new(false),
            fail_after: AtomicUsize::new(usize::MAX),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent call fail with `StoreUnavailable` (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Allow `n` more calls to succeed, then fail every call.
    pub fn fail_after(&self, n: usize) {
        self.fail_after.store(n, Ordering::SeqCst);
    }

    /// Number of store calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Write an edge without checking endpoints; lets tests build corrupted graphs.
    pub fn force_edge(&self, collection: &str, from: &NodeId, to: &NodeId, access: Access) {
        self.write_unchecked().edges.insert((collection.to_string(), from.clone(), to.clone()), access);
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GraphError::StoreUnavailable("memory store offline".into()));
        }
        let budget = self.fail_after.load(Ordering::SeqCst);
        if budget != usize::MAX {
            if budget == 0 {
                return Err(GraphError::StoreUnavailable("memory store offline".into()));
            }
            self.fail_after.store(budget - 1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.enter()?;
        Ok(self.inner.read().unwrap_or_else(|p| p.into_inner()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.enter()?;
        Ok(self.write_unchecked())
    }

    fn write_unchecked(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore for MemoryStore {
    fn get_node(&self, id: &NodeId) -> Result<Document> {
        self.read()?
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::NotFound(id.to_string()))
    }

    fn outbound(&self, collection: &str, from: &NodeId) -> Result<Vec<Edge>> {
        check_edge_collection(collection)?;
        Ok(self
            .read()?
            .edges
            .iter()
            .filter(|((c, f, _), _)| c == collection && f == from)
            .map(|((_, f, t), a)| Edge { from: f.clone(), to: t.clone(), access: *a })
            .collect())
    }

    fn inbound(&self, collection: &str, to: &NodeId) -> Result<Vec<Edge>> {
        check_edge_collection(collection)?;
        Ok(self
            .read()?
            .edges
            .iter()
            .filter(|((c, _, t), _)| c == collection && t == to)
            .map(|((_, f, t), a)| Edge { from: f.clone(), to: t.clone(), access: *a })
            .collect())
    }

    fn get_edge(&self, collection: &str, from: &NodeId, to: &NodeId) -> Result<Option<Access>> {
        check_edge_collection(collection)?;
        Ok(self.read()?.edges.get(&(collection.to_string(), from.clone(), to.clone())).copied())
    }

    fn delete_edge(&self, collection: &'static str, from: &NodeId, to: &NodeId) -> Result<bool> {
        check_edge_collection(collection)?;
        Ok(self.write()?.edges.remove(&(collection.to_string(), from.clone(), to.clone())).is_some())
    }

    fn transact(&self, batch: WriteBatch) -> Result<()> {
        let mut guard = self.write()?;
        // Stage on a copy so a failing op leaves the store untouched
        let mut staged = guard.clone();
        for op in batch.into_ops() {
            staged.apply(op)?;
        }
        *guard = staged;
        Ok(())
    }

    fn list_nodes(&self, collection: &str) -> Result<Vec<Document>> {
        if !is_node_collection(collection) {
            return Err(GraphError::InvalidArgument(format!("unknown collection '{}'", collection)));
        }
        Ok(self
            .read()?
            .nodes
            .values()
            .filter(|d| d.id().collection() == collection)
            .cloned()
            .collect())
    }

    fn name_owner(&self, scope: &str, name: &str) -> Result<Option<NodeId>> {
        Ok(self.read()?.names.get(&(scope.to_string(), name.to_string())).cloned())
    }
}
