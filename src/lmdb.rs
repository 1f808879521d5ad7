//! LMDB-backed graph store.
//!
//! Storage patterns:
//! - `nodes`: node id bytes -> document JSON
//! - `edges_out`: [collection][from][to] -> packed Access
//! - `edges_in`: [collection][to][from] -> packed Access (reverse index)
//! - `names`: [n][scope][name] -> owner id, and [o][owner][scope][name] -> empty
//!   so deleting a node can release its names
//!
//! Every heed error surfaces as `StoreUnavailable`.

use std::path::Path;

use heed::types::{Bytes, U64};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use tracing::debug;

use crate::access::Access;
use crate::constants::{is_node_collection, DEFAULT_MAP_SIZE, EDGE_COLLECTIONS, MAX_DBS};
use crate::document::Document;
use crate::error::{err, GraphError, Result};
use crate::keys::{build_key, build_prefix, get_part, parse_edge_key};
use crate::node_id::NodeId;
use crate::store::{check_edge_collection, check_name, name_taken, Edge, GraphStore, WriteBatch, WriteOp};

const NAME_TAG: &[u8] = b"n";
const OWNER_TAG: &[u8] = b"o";

pub type EdgeDb = Database<Bytes, U64<byteorder::BigEndian>>;
pub type NodeDb = Database<Bytes, Bytes>;

/// Bidirectional edge index: out[c,a,b] and in[c,b,a] stay in sync
#[derive(Clone, Copy)]
struct BiPair {
    out: EdgeDb,
    rev: EdgeDb,
}

impl BiPair {
    #[inline]
    fn get(&self, tx: &RoTxn, c: &str, a: &NodeId, b: &NodeId) -> Result<Option<Access>> {
        match self.out.get(tx, &build_key(&[c.as_bytes(), a.as_bytes(), b.as_bytes()])).map_err(err)? {
            Some(bits) => Ok(Some(Access::from_bits(bits)?)),
            None => Ok(None),
        }
    }

    #[inline]
    fn put(&self, tx: &mut RwTxn, c: &str, a: &NodeId, b: &NodeId, v: Access) -> Result<()> {
        let bits = v.to_bits();
        self.out.put(tx, &build_key(&[c.as_bytes(), a.as_bytes(), b.as_bytes()]), &bits).map_err(err)?;
        self.rev.put(tx, &build_key(&[c.as_bytes(), b.as_bytes(), a.as_bytes()]), &bits).map_err(err)
    }

    #[inline]
    fn del(&self, tx: &mut RwTxn, c: &str, a: &NodeId, b: &NodeId) -> Result<bool> {
        let r = self.out.delete(tx, &build_key(&[c.as_bytes(), a.as_bytes(), b.as_bytes()])).map_err(err)?;
        self.rev.delete(tx, &build_key(&[c.as_bytes(), b.as_bytes(), a.as_bytes()])).map_err(err)?;
        Ok(r)
    }

    fn list_out(&self, tx: &RoTxn, c: &str, a: &NodeId) -> Result<Vec<Edge>> {
        Self::list_pfx(tx, &self.out, c, a, false)
    }

    fn list_in(&self, tx: &RoTxn, c: &str, b: &NodeId) -> Result<Vec<Edge>> {
        Self::list_pfx(tx, &self.rev, c, b, true)
    }

    fn list_pfx(tx: &RoTxn, db: &EdgeDb, c: &str, anchor: &NodeId, reversed: bool) -> Result<Vec<Edge>> {
        let mut r = Vec::new();
        let prefix = build_prefix(&[c.as_bytes(), anchor.as_bytes()]);
        for item in db.prefix_iter(tx, &prefix).map_err(err)? {
            let (k, bits) = item.map_err(err)?;
            let (_, first, second) = parse_edge_key(k)?;
            // Prefix bytes may also match a longer anchor id; compare exactly
            if first != anchor.as_bytes() {
                continue;
            }
            let other = NodeId::from_bytes(second)?;
            let access = Access::from_bits(bits)?;
            let (from, to) = if reversed { (other, anchor.clone()) } else { (anchor.clone(), other) };
            r.push(Edge { from, to, access });
        }
        Ok(r)
    }
}

/// Graph store persisted in an LMDB environment.
#[derive(Clone)]
pub struct LmdbStore {
    env: Env,
    nodes: NodeDb,
    edges: BiPair,
    names: NodeDb,
}

impl LmdbStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn open_with_map_size(path: impl AsRef<Path>, map_size: usize) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(err)?;
        // SAFETY: LMDB requires no other processes access this path concurrently during open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)
                .map_err(err)?
        };
        let mut tx = env.write_txn().map_err(err)?;
        let nodes = env.create_database(&mut tx, Some("nodes")).map_err(err)?;
        let edges = BiPair {
            out: env.create_database(&mut tx, Some("edges_out")).map_err(err)?,
            rev: env.create_database(&mut tx, Some("edges_in")).map_err(err)?,
        };
        let names = env.create_database(&mut tx, Some("names")).map_err(err)?;
        tx.commit().map_err(err)?;
        debug!(path = %path.display(), "opened lmdb graph store");
        Ok(LmdbStore { env, nodes, edges, names })
    }

    #[inline]
    fn read<T, F: FnOnce(&RoTxn) -> Result<T>>(&self, f: F) -> Result<T> {
        f(&self.env.read_txn().map_err(err)?)
    }

    #[inline]
    fn write<T, F: FnOnce(&mut RwTxn) -> Result<T>>(&self, f: F) -> Result<T> {
        let mut tx = self.env.write_txn().map_err(err)?;
        let r = f(&mut tx)?;
        tx.commit().map_err(err)?;
        Ok(r)
    }

    fn node_exists(&self, tx: &RoTxn, id: &NodeId) -> Result<bool> {
        Ok(self.nodes.get(tx, id.as_bytes()).map_err(err)?.is_some())
    }

    fn check_endpoints(&self, tx: &RoTxn, from: &NodeId, to: &NodeId) -> Result<()> {
        for end in [from, to] {
            if !self.node_exists(tx, end)? {
                return Err(GraphError::NotFound(format!("edge endpoint {}", end)));
            }
        }
        Ok(())
    }

    // Runs inside the batch's write txn, so check and insert cannot interleave
    fn claim_name(&self, tx: &mut RwTxn, scope: &str, name: &str, owner: &NodeId) -> Result<()> {
        check_name(scope, name)?;
        if !self.node_exists(tx, owner)? {
            return Err(GraphError::NotFound(format!("name owner {}", owner)));
        }
        let key = build_key(&[NAME_TAG, scope.as_bytes(), name.as_bytes()]);
        match self.names.get(tx, &key).map_err(err)? {
            Some(held) if held != owner.as_bytes() => return Err(name_taken(scope, name)),
            Some(_) => return Ok(()),
            None => {}
        }
        self.names.put(tx, &key, owner.as_bytes()).map_err(err)?;
        let rev = build_key(&[OWNER_TAG, owner.as_bytes(), scope.as_bytes(), name.as_bytes()]);
        self.names.put(tx, &rev, &[]).map_err(err)
    }

    fn release_names(&self, tx: &mut RwTxn, owner: &NodeId) -> Result<()> {
        let mut held = Vec::new();
        for item in self.names.prefix_iter(tx, &build_prefix(&[OWNER_TAG, owner.as_bytes()])).map_err(err)? {
            let (k, _) = item.map_err(err)?;
            match (get_part(k, 1), get_part(k, 2), get_part(k, 3)) {
                (Some(o), Some(scope), Some(name)) if o == owner.as_bytes() => {
                    held.push((k.to_vec(), build_key(&[NAME_TAG, scope, name])));
                }
                _ => {}
            }
        }
        for (rev, fwd) in held {
            self.names.delete(tx, &rev).map_err(err)?;
            self.names.delete(tx, &fwd).map_err(err)?;
        }
        Ok(())
    }

    fn apply(&self, tx: &mut RwTxn, op: WriteOp) -> Result<()> {
        match op {
            WriteOp::PutNode(doc) => {
                self.nodes.put(tx, doc.id().as_bytes(), &doc.to_json()?).map_err(err)?;
            }
            WriteOp::DeleteNode(id) => {
                for c in EDGE_COLLECTIONS {
                    for e in self.edges.list_out(tx, c, &id)? {
                        self.edges.del(tx, c, &e.from, &e.to)?;
                    }
                    for e in self.edges.list_in(tx, c, &id)? {
                        self.edges.del(tx, c, &e.from, &e.to)?;
                    }
                }
                self.release_names(tx, &id)?;
                self.nodes.delete(tx, id.as_bytes()).map_err(err)?;
            }
            WriteOp::UpsertEdge { collection, from, to, access } => {
                check_edge_collection(collection)?;
                self.check_endpoints(tx, &from, &to)?;
                self.edges.put(tx, collection, &from, &to, access)?;
            }
            WriteOp::MergeEdgeLevel { collection, from, to, level } => {
                check_edge_collection(collection)?;
                self.check_endpoints(tx, &from, &to)?;
                let role = self.edges.get(tx, collection, &from, &to)?.map(|a| a.role).unwrap_or_default();
                self.edges.put(tx, collection, &from, &to, Access { level, role })?;
            }
            WriteOp::ClaimName { scope, name, owner } => {
                self.claim_name(tx, scope, &name, &owner)?;
            }
            WriteOp::DeleteEdge { collection, from, to } => {
                check_edge_collection(collection)?;
                self.edges.del(tx, collection, &from, &to)?;
            }
        }
        Ok(())
    }
}

impl GraphStore for LmdbStore {
    fn get_node(&self, id: &NodeId) -> Result<Document> {
        self.read(|tx| match self.nodes.get(tx, id.as_bytes()).map_err(err)? {
            Some(bytes) => Document::from_json(bytes),
            None => Err(GraphError::NotFound(id.to_string())),
        })
    }

    fn outbound(&self, collection: &str, from: &NodeId) -> Result<Vec<Edge>> {
        check_edge_collection(collection)?;
        self.read(|tx| self.edges.list_out(tx, collection, from))
    }

    fn inbound(&self, collection: &str, to: &NodeId) -> Result<Vec<Edge>> {
        check_edge_collection(collection)?;
        self.read(|tx| self.edges.list_in(tx, collection, to))
    }

    fn get_edge(&self, collection: &str, from: &NodeId, to: &NodeId) -> Result<Option<Access>> {
        check_edge_collection(collection)?;
        self.read(|tx| self.edges.get(tx, collection, from, to))
    }

    fn delete_edge(&self, collection: &'static str, from: &NodeId, to: &NodeId) -> Result<bool> {
        check_edge_collection(collection)?;
        self.write(|tx| self.edges.del(tx, collection, from, to))
    }

    fn transact(&self, batch: WriteBatch) -> Result<()> {
        // An early return drops the txn, which aborts it
        self.write(|tx| {
            for op in batch.into_ops() {
                self.apply(tx, op)?;
            }
            Ok(())
        })
    }

    fn list_nodes(&self, collection: &str) -> Result<Vec<Document>> {
        if !is_node_collection(collection) {
            return Err(GraphError::InvalidArgument(format!("unknown collection '{}'", collection)));
        }
        self.read(|tx| {
            let mut r = Vec::new();
            let prefix = NodeId::prefix_for_collection(collection);
            for item in self.nodes.prefix_iter(tx, &prefix).map_err(err)? {
                let (_, bytes) = item.map_err(err)?;
                r.push(Document::from_json(bytes)?);
            }
            Ok(r)
        })
    }

    fn name_owner(&self, scope: &str, name: &str) -> Result<Option<NodeId>> {
        self.read(|tx| {
            let key = build_key(&[NAME_TAG, scope.as_bytes(), name.as_bytes()]);
            match self.names.get(tx, &key).map_err(err)? {
                Some(bytes) => Ok(Some(NodeId::from_bytes(bytes)?)),
                None => Ok(None),
            }
        })
    }
}
