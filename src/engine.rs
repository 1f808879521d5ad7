//! Authorization traversal engine.
//!
//! Effective level of a principal on a target is the best level granted by a
//! `Permissions` edge on the target or on any of its ancestors, found by
//! walking inbound `Children` edges (Object -> parent Object -> ... -> Namespace).
//! Edges closer to the target only ever raise the result; they never cap an
//! inherited grant.
//!
//! Any store failure aborts the check. A corrupted hierarchy (cycle, several
//! parents, orphan object, runaway depth) is reported as `StoreUnavailable`,
//! never as a denial.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::access::Level;
use crate::constants::{CHILDREN_EDGE, MAX_INHERITANCE_DEPTH, PERMISSIONS_EDGE};
use crate::context::Context;
use crate::document::Document;
use crate::error::{GraphError, Result};
use crate::node_id::{NodeId, NodeKind};
use crate::store::GraphStore;

/// Computes effective access levels by walking the graph.
///
/// Stateless between calls; share it behind an `Arc` across worker threads.
pub struct Authorizer<S> {
    store: Arc<S>,
    max_depth: usize,
}

impl<S> Clone for Authorizer<S> {
    fn clone(&self) -> Self {
        Authorizer { store: Arc::clone(&self.store), max_depth: self.max_depth }
    }
}

impl<S: GraphStore> Authorizer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_max_depth(store, MAX_INHERITANCE_DEPTH)
    }

    pub fn with_max_depth(store: Arc<S>, max_depth: usize) -> Self {
        Authorizer { store, max_depth }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Effective level of `principal` on `target`.
    pub fn effective_level(&self, ctx: &Context, principal: &NodeId, target: &NodeId) -> Result<Level> {
        // Root marker: no traversal, no edge lookups
        if ctx.is_root() {
            return Ok(Level::MAX);
        }
        if let Some(level) = self.principal_override(ctx, principal)? {
            debug!(%principal, %target, %level, "principal override");
            return Ok(level);
        }

        ctx.check()?;
        self.store.get_node(target)?;

        let mut level = Level::MIN;
        for node in self.ancestry(ctx, target)? {
            ctx.check()?;
            if let Some(access) = self.store.get_edge(PERMISSIONS_EDGE, principal, &node)? {
                level = level.max(access.level);
                if level == Level::MAX {
                    break;
                }
            }
        }
        debug!(%principal, %target, %level, "resolved effective level");
        Ok(level)
    }

    /// Whether `principal` holds at least `required` on `target`.
    pub fn is_authorized(&self, ctx: &Context, principal: &NodeId, target: &NodeId, required: Level) -> Result<bool> {
        Ok(self.effective_level(ctx, principal, target)?.meets(required))
    }

    /// Fail with `PermissionDenied` unless the principal holds `required`.
    pub fn require(&self, ctx: &Context, principal: &NodeId, target: &NodeId, required: Level) -> Result<Level> {
        let level = self.effective_level(ctx, principal, target)?;
        if level.meets(required) {
            Ok(level)
        } else {
            Err(GraphError::PermissionDenied(format!(
                "{} has {} on {}, needs {}",
                principal, level, target, required
            )))
        }
    }

    /// Fetch `target` with its access block set to the principal's effective
    /// level. Nodes the principal cannot read are reported as absent.
    pub fn access_level_and_get(&self, ctx: &Context, principal: &NodeId, target: &NodeId) -> Result<Document> {
        let level = self.effective_level(ctx, principal, target)?;
        if level == Level::None {
            return Err(GraphError::NotFound(target.to_string()));
        }
        ctx.check()?;
        let mut doc = self.store.get_node(target)?;
        doc.set_access_level(level);
        Ok(doc)
    }

    /// Caller must be a root context or an enabled root account.
    pub fn require_root(&self, ctx: &Context) -> Result<()> {
        if ctx.is_root() {
            return Ok(());
        }
        let caller = ctx.require_principal()?;
        ctx.check()?;
        let account = self.store.get_node(caller)?.into_account()?;
        if account.enabled && account.is_root {
            Ok(())
        } else {
            Err(GraphError::PermissionDenied(format!("{} is not root", caller)))
        }
    }

    /// Whether `principal` is an enabled account.
    pub fn is_enabled(&self, ctx: &Context, principal: &NodeId) -> Result<bool> {
        ctx.check()?;
        Ok(self.store.get_node(principal)?.into_account()?.enabled)
    }

    /// Root accounts get the maximum, disabled accounts get nothing.
    pub(crate) fn principal_override(&self, ctx: &Context, principal: &NodeId) -> Result<Option<Level>> {
        if !principal.is(NodeKind::Account) {
            return Err(GraphError::InvalidArgument(format!("{} is not an account", principal)));
        }
        ctx.check()?;
        let account = self.store.get_node(principal)?.into_account()?;
        if !account.enabled {
            return Ok(Some(Level::MIN));
        }
        if account.is_root {
            return Ok(Some(Level::MAX));
        }
        Ok(None)
    }

    /// `node` followed by its ancestors up to the hierarchy root.
    pub fn ancestry(&self, ctx: &Context, node: &NodeId) -> Result<Vec<NodeId>> {
        let mut chain = vec![node.clone()];
        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(node.clone());

        let mut cur = node.clone();
        loop {
            if chain.len() > self.max_depth {
                return Err(self.corrupt(node, format!("hierarchy deeper than {}", self.max_depth)));
            }
            ctx.check()?;
            let parents = self.store.inbound(CHILDREN_EDGE, &cur)?;
            let parent = match parents.as_slice() {
                [] => {
                    if cur.is(NodeKind::Object) {
                        return Err(self.corrupt(node, format!("object {} has no parent", cur)));
                    }
                    return Ok(chain);
                }
                [edge] => edge.from.clone(),
                many => {
                    return Err(self.corrupt(node, format!("{} has {} parents", cur, many.len())));
                }
            };
            if !allowed_parent(cur.kind(), parent.kind()) {
                return Err(self.corrupt(node, format!("{} cannot be a parent of {}", parent, cur)));
            }
            if !visited.insert(parent.clone()) {
                return Err(self.corrupt(node, format!("cycle through {}", parent)));
            }
            chain.push(parent.clone());
            cur = parent;
        }
    }

    /// Nearest Namespace above (or at) `node`.
    pub fn owning_namespace(&self, ctx: &Context, node: &NodeId) -> Result<Option<NodeId>> {
        Ok(self.ancestry(ctx, node)?.into_iter().find(|n| n.is(NodeKind::Namespace)))
    }

    pub(crate) fn corrupt(&self, target: &NodeId, detail: String) -> GraphError {
        warn!(%target, %detail, "corrupted hierarchy");
        GraphError::StoreUnavailable(format!("corrupted hierarchy at {}: {}", target, detail))
    }
}

/// Which node kinds may sit directly above which.
pub(crate) fn allowed_parent(child: NodeKind, parent: NodeKind) -> bool {
    matches!(
        (child, parent),
        (NodeKind::Object, NodeKind::Object)
            | (NodeKind::Object, NodeKind::Namespace)
            | (NodeKind::Plugin, NodeKind::Namespace)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_parent() {
        assert!(allowed_parent(NodeKind::Object, NodeKind::Namespace));
        assert!(allowed_parent(NodeKind::Object, NodeKind::Object));
        assert!(allowed_parent(NodeKind::Plugin, NodeKind::Namespace));
        assert!(!allowed_parent(NodeKind::Namespace, NodeKind::Namespace));
        assert!(!allowed_parent(NodeKind::Object, NodeKind::Account));
        assert!(!allowed_parent(NodeKind::Plugin, NodeKind::Object));
    }
}
