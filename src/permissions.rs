//! Permission management: grant, revoke, list, and node lifecycle.
//!
//! Every mutation passes the authorization gate before it touches the store.
//! The caller is the context principal; a root context passes every gate.
//! Writes that touch more than one node or edge go through a single
//! [`WriteBatch`].

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::access::{Access, Level, Role};
use crate::config::GrantPolicy;
use crate::constants::{CHILDREN_EDGE, NAMESPACES_COL, PERMISSIONS_EDGE};
use crate::context::Context;
use crate::document::{Account, Document, Namespace, Object};
use crate::engine::{allowed_parent, Authorizer};
use crate::error::{GraphError, Result};
use crate::keys::generate_key;
use crate::node_id::{NodeId, NodeKind};
use crate::store::{GraphStore, WriteBatch};

/// A direct Access edge pointing at a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub principal: NodeId,
    pub level: Level,
    pub role: Role,
}

pub struct PermissionService<S> {
    authz: Authorizer<S>,
    policy: GrantPolicy,
}

impl<S> Clone for PermissionService<S> {
    fn clone(&self) -> Self {
        PermissionService { authz: self.authz.clone(), policy: self.policy }
    }
}

impl<S: GraphStore> PermissionService<S> {
    pub fn new(authz: Authorizer<S>, policy: GrantPolicy) -> Self {
        PermissionService { authz, policy }
    }

    /// Service over `store` with the default depth bound and grant policy.
    pub fn with_store(store: Arc<S>) -> Self {
        Self::new(Authorizer::new(store), GrantPolicy::default())
    }

    pub fn authorizer(&self) -> &Authorizer<S> {
        &self.authz
    }

    pub fn policy(&self) -> GrantPolicy {
        self.policy
    }

    fn store(&self) -> &S {
        self.authz.store()
    }

    // ------------------------------------------------------------------------
    // Gates
    // ------------------------------------------------------------------------

    /// Caller must hold `required` on `target`.
    fn gate(&self, ctx: &Context, target: &NodeId, required: Level) -> Result<Level> {
        if ctx.is_root() {
            return Ok(Level::MAX);
        }
        let caller = ctx.require_principal()?;
        self.authz.require(ctx, caller, target, required)
    }

    fn require_root(&self, ctx: &Context) -> Result<()> {
        self.authz.require_root(ctx)
    }

    fn required_to_grant(&self, level: Level) -> Level {
        match self.policy {
            GrantPolicy::MatchLevel => level.max(Level::Mgmt),
            GrantPolicy::AdminOnly => Level::Admin,
        }
    }

    // ------------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------------

    pub fn effective_level(&self, ctx: &Context, principal: &NodeId, target: &NodeId) -> Result<Level> {
        self.authz.effective_level(ctx, principal, target)
    }

    /// Side-effect free check.
    pub fn is_authorized(&self, ctx: &Context, principal: &NodeId, target: &NodeId, required: Level) -> Result<bool> {
        self.authz.is_authorized(ctx, principal, target, required)
    }

    /// Effective level of `principal` on `target` as an untrusted caller may ask it.
    ///
    /// A root context sees the principal's real level. Anyone else must be able
    /// to read `target` first; targets they cannot see are `NotFound`, the same
    /// as targets that do not exist.
    pub fn check_access(&self, ctx: &Context, principal: &NodeId, target: &NodeId) -> Result<Level> {
        if ctx.is_root() {
            return self.authz.effective_level(&ctx.without_root(), principal, target);
        }
        let caller = ctx.require_principal()?;
        let own = self.authz.effective_level(ctx, caller, target)?;
        if own == Level::None {
            return Err(GraphError::NotFound(target.to_string()));
        }
        if principal == caller {
            return Ok(own);
        }
        self.authz.effective_level(ctx, principal, target)
    }

    // ------------------------------------------------------------------------
    // Access edges
    // ------------------------------------------------------------------------

    /// Write or overwrite the Access edge `principal -> target`.
    #[instrument(skip_all, fields(%principal, %target, %level))]
    pub fn grant(&self, ctx: &Context, principal: &NodeId, target: &NodeId, level: Level) -> Result<()> {
        if level == Level::None {
            return Err(GraphError::InvalidArgument("cannot grant NONE, revoke instead".into()));
        }
        if !principal.is(NodeKind::Account) {
            return Err(GraphError::InvalidArgument(format!("{} is not an account", principal)));
        }
        if !target.kind().is_target() {
            return Err(GraphError::InvalidArgument(format!("{} cannot carry permissions", target)));
        }
        self.gate(ctx, target, self.required_to_grant(level))?;

        ctx.check()?;
        // Role is merged inside the write so an owner edge keeps its role
        let mut batch = WriteBatch::with_capacity(1);
        batch.merge_edge_level(PERMISSIONS_EDGE, principal, target, level);
        self.store().transact(batch)?;
        info!("granted");
        Ok(())
    }

    /// Remove the Access edge `principal -> target`. A missing edge is success.
    #[instrument(skip_all, fields(%principal, %target))]
    pub fn revoke(&self, ctx: &Context, principal: &NodeId, target: &NodeId) -> Result<()> {
        let held = self.gate(ctx, target, self.required_to_grant(Level::Mgmt))?;

        ctx.check()?;
        let existing = match self.store().get_edge(PERMISSIONS_EDGE, principal, target)? {
            Some(access) => access,
            None => {
                debug!("no edge to revoke");
                return Ok(());
            }
        };
        if self.policy == GrantPolicy::MatchLevel && !held.meets(existing.level) {
            return Err(GraphError::PermissionDenied(format!(
                "caller holds {} on {}, edge carries {}",
                held, target, existing.level
            )));
        }
        ctx.check()?;
        self.store().delete_edge(PERMISSIONS_EDGE, principal, target)?;
        info!(level = %existing.level, "revoked");
        Ok(())
    }

    /// Direct Access edges on `target`, sorted by principal id.
    #[instrument(skip_all, fields(%target))]
    pub fn list_permissions(&self, ctx: &Context, target: &NodeId) -> Result<Vec<Permission>> {
        self.gate(ctx, target, Level::Read)?;
        ctx.check()?;
        self.store().get_node(target)?;
        ctx.check()?;
        let mut r: Vec<Permission> = self
            .store()
            .inbound(PERMISSIONS_EDGE, target)?
            .into_iter()
            .map(|e| Permission { principal: e.from, level: e.access.level, role: e.access.role })
            .collect();
        r.sort_by(|a, b| a.principal.cmp(&b.principal));
        Ok(r)
    }

    // ------------------------------------------------------------------------
    // Node lifecycle
    // ------------------------------------------------------------------------

    #[instrument(skip(self, ctx))]
    pub fn create_namespace(&self, ctx: &Context, title: &str) -> Result<Namespace> {
        self.require_root(ctx)?;
        check_title(title)?;
        let mut ns = Namespace::new_blank(&generate_key()?)?;
        ns.title = title.to_string();

        ctx.check()?;
        let mut batch = WriteBatch::with_capacity(2);
        batch.put_node(ns.clone().into()).claim_name(NAMESPACES_COL, title, &ns.id);
        self.store().transact(batch)?;
        info!(id = %ns.id, "namespace created");
        Ok(ns)
    }

    /// Account plus its default namespace and an owner ROOT edge onto it, in one write.
    /// The namespace takes the account title, so account titles are unique too.
    #[instrument(skip(self, ctx))]
    pub fn create_account(&self, ctx: &Context, title: &str, is_root: bool, enabled: bool) -> Result<Account> {
        self.require_root(ctx)?;
        check_title(title)?;
        let key = generate_key()?;
        let mut ns = Namespace::new_blank(&key)?;
        ns.title = title.to_string();
        let mut account = Account::new_blank(&key)?;
        account.title = title.to_string();
        account.is_root = is_root;
        account.enabled = enabled;
        account.default_namespace = Some(ns.id.clone());

        ctx.check()?;
        self.store().transact(self.account_batch(&account, ns))?;
        info!(id = %account.id, "account created");
        Ok(account)
    }

    fn account_batch(&self, account: &Account, ns: Namespace) -> WriteBatch {
        let mut batch = WriteBatch::with_capacity(4);
        batch
            .put_node(account.clone().into())
            .put_node(ns.clone().into())
            .claim_name(NAMESPACES_COL, &ns.title, &ns.id)
            .upsert_edge(PERMISSIONS_EDGE, &account.id, &ns.id, Access::owner(Level::Root));
        batch
    }

    /// Object under `parent` (a Namespace or Object). Caller needs MGMT on the parent.
    #[instrument(skip_all, fields(%parent))]
    pub fn create_object(&self, ctx: &Context, title: &str, kind: &str, parent: &NodeId) -> Result<Object> {
        check_title(title)?;
        if !allowed_parent(NodeKind::Object, parent.kind()) {
            return Err(GraphError::InvalidArgument(format!("{} cannot hold objects", parent)));
        }
        self.gate(ctx, parent, Level::Mgmt)?;
        ctx.check()?;
        self.store().get_node(parent)?;

        let mut obj = Object::new_blank(&generate_key()?)?;
        obj.title = title.to_string();
        obj.kind = kind.to_string();
        obj.namespace = self.authz.owning_namespace(ctx, parent)?;

        ctx.check()?;
        let mut batch = WriteBatch::with_capacity(2);
        batch
            .put_node(obj.clone().into())
            .upsert_edge(CHILDREN_EDGE, parent, &obj.id, Access::default());
        self.store().transact(batch)?;
        info!(id = %obj.id, "object created");
        Ok(obj)
    }

    /// Re-parent an object. Needs ADMIN on the object and MGMT on the new parent.
    #[instrument(skip_all, fields(%object, %new_parent))]
    pub fn move_object(&self, ctx: &Context, object: &NodeId, new_parent: &NodeId) -> Result<Object> {
        if !object.is(NodeKind::Object) {
            return Err(GraphError::InvalidArgument(format!("{} is not an object", object)));
        }
        if !allowed_parent(NodeKind::Object, new_parent.kind()) {
            return Err(GraphError::InvalidArgument(format!("{} cannot hold objects", new_parent)));
        }
        if object == new_parent {
            return Err(GraphError::InvalidArgument(format!("{} cannot be its own parent", object)));
        }
        self.gate(ctx, object, Level::Admin)?;
        self.gate(ctx, new_parent, Level::Mgmt)?;

        ctx.check()?;
        let mut obj = self.store().get_node(object)?.into_object()?;
        self.store().get_node(new_parent)?;
        let above = self.authz.ancestry(ctx, new_parent)?;
        if above.contains(object) {
            return Err(GraphError::InvalidArgument(format!(
                "moving {} under {} would create a cycle",
                object, new_parent
            )));
        }
        obj.namespace = above.into_iter().find(|n| n.is(NodeKind::Namespace));

        ctx.check()?;
        let mut batch = WriteBatch::with_capacity(4);
        for edge in self.store().inbound(CHILDREN_EDGE, object)? {
            batch.delete_edge(CHILDREN_EDGE, &edge.from, object);
        }
        batch
            .upsert_edge(CHILDREN_EDGE, new_parent, object, Access::default())
            .put_node(obj.clone().into());
        self.store().transact(batch)?;
        info!("object moved");
        Ok(obj)
    }

    /// Flip an account's `enabled` flag. Returns the new value.
    #[instrument(skip_all, fields(%account))]
    pub fn toggle_account(&self, ctx: &Context, account: &NodeId) -> Result<bool> {
        self.require_root(ctx)?;
        ctx.check()?;
        let mut acc = self.store().get_node(account)?.into_account()?;
        acc.enabled = !acc.enabled;
        let mut batch = WriteBatch::with_capacity(1);
        batch.put_node(acc.clone().into());
        self.store().transact(batch)?;
        info!(enabled = acc.enabled, "account toggled");
        Ok(acc.enabled)
    }

    /// Objects under `namespace` the caller can read, nested by parent.
    ///
    /// Levels are inherited down the walk exactly as the engine resolves them.
    /// A visible object below a hidden one is listed under its nearest visible
    /// ancestor (or at the top). Without `recursive` only the top level is kept.
    #[instrument(skip_all, fields(%namespace, recursive))]
    pub fn list_objects(&self, ctx: &Context, namespace: &NodeId, recursive: bool) -> Result<Vec<ObjectTree>> {
        if !namespace.is(NodeKind::Namespace) {
            return Err(GraphError::InvalidArgument(format!("{} is not a namespace", namespace)));
        }
        let walk = if ctx.is_root() {
            ObjectWalk { caller: None, fixed: Some(Level::MAX) }
        } else {
            let caller = ctx.require_principal()?;
            let fixed = self.authz.principal_override(ctx, caller)?;
            ObjectWalk { caller: Some(caller), fixed }
        };
        ctx.check()?;
        self.store().get_node(namespace)?;
        if walk.fixed == Some(Level::None) {
            return Ok(Vec::new());
        }
        let base = walk.level(self.store(), namespace, Level::MIN)?;

        let mut visited = HashSet::new();
        visited.insert(namespace.clone());
        let mut trees = self.collect_objects(ctx, &walk, namespace, base, 1, &mut visited)?;
        if !recursive {
            for tree in &mut trees {
                tree.objects.clear();
            }
        }
        debug!(count = trees.len(), "listed objects");
        Ok(trees)
    }

    fn collect_objects(
        &self,
        ctx: &Context,
        walk: &ObjectWalk<'_>,
        parent: &NodeId,
        inherited: Level,
        depth: usize,
        visited: &mut HashSet<NodeId>,
    ) -> Result<Vec<ObjectTree>> {
        if depth > self.authz.max_depth() {
            return Err(self.authz.corrupt(parent, format!("hierarchy deeper than {}", self.authz.max_depth())));
        }
        ctx.check()?;
        let mut children: Vec<NodeId> = self
            .store()
            .outbound(CHILDREN_EDGE, parent)?
            .into_iter()
            .map(|e| e.to)
            .filter(|id| id.is(NodeKind::Object))
            .collect();
        children.sort();

        let mut out = Vec::new();
        for child in children {
            if !visited.insert(child.clone()) {
                return Err(self.authz.corrupt(&child, format!("reached twice under {}", parent)));
            }
            ctx.check()?;
            let level = walk.level(self.store(), &child, inherited)?;
            let below = self.collect_objects(ctx, walk, &child, level, depth + 1, visited)?;
            if level.meets(Level::Read) {
                let mut object = self.store().get_node(&child)?.into_object()?;
                object.access = Some(Access::new(level));
                out.push(ObjectTree { object, objects: below });
            } else {
                out.extend(below);
            }
        }
        Ok(out)
    }

    /// Fetch a node as seen by the caller, access block filled in.
    pub fn get(&self, ctx: &Context, target: &NodeId) -> Result<Document> {
        if ctx.is_root() {
            ctx.check()?;
            let mut doc = self.store().get_node(target)?;
            doc.set_access_level(Level::MAX);
            return Ok(doc);
        }
        let caller = ctx.require_principal()?;
        self.authz.access_level_and_get(ctx, caller, target)
    }

    // ------------------------------------------------------------------------
    // Bootstrap
    // ------------------------------------------------------------------------

    pub fn is_bootstrapped(&self, key: &str) -> Result<bool> {
        let id = NodeId::new(NodeKind::Account.collection(), key)?;
        match self.store().get_node(&id) {
            Ok(_) => Ok(true),
            Err(GraphError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create the first root account under a fixed key. Needs no caller.
    #[instrument(skip(self))]
    pub fn bootstrap(&self, key: &str) -> Result<Account> {
        if self.is_bootstrapped(key)? {
            return Err(GraphError::InvalidArgument("already bootstrapped".into()));
        }
        let mut ns = Namespace::new_blank(key)?;
        ns.title = key.to_string();
        let mut account = Account::new_blank(key)?;
        account.title = key.to_string();
        account.enabled = true;
        account.is_root = true;
        account.default_namespace = Some(ns.id.clone());
        self.store().transact(self.account_batch(&account, ns))?;
        info!(id = %account.id, "bootstrapped root account");
        Ok(account)
    }
}

/// An object and the visible objects beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectTree {
    #[serde(flatten)]
    pub object: Object,
    pub objects: Vec<ObjectTree>,
}

// Per-listing caller state: a fixed level for root/disabled callers, else edge lookups
struct ObjectWalk<'a> {
    caller: Option<&'a NodeId>,
    fixed: Option<Level>,
}

impl ObjectWalk<'_> {
    fn level<S: GraphStore>(&self, store: &S, node: &NodeId, inherited: Level) -> Result<Level> {
        if let Some(level) = self.fixed {
            return Ok(level);
        }
        let direct = match self.caller {
            Some(caller) => store.get_edge(PERMISSIONS_EDGE, caller, node)?.map(|a| a.level),
            None => None,
        };
        Ok(direct.map_or(inherited, |l| inherited.max(l)))
    }
}

fn check_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        Err(GraphError::InvalidArgument("title cannot be empty".into()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn service(policy: GrantPolicy) -> (PermissionService<MemoryStore>, Context) {
        let store = Arc::new(MemoryStore::new());
        (PermissionService::new(Authorizer::new(store), policy), Context::background().elevate_root())
    }

    #[test]
    fn test_required_to_grant() {
        let (svc, _) = service(GrantPolicy::MatchLevel);
        assert_eq!(svc.required_to_grant(Level::Read), Level::Mgmt);
        assert_eq!(svc.required_to_grant(Level::Admin), Level::Admin);
        let (svc, _) = service(GrantPolicy::AdminOnly);
        assert_eq!(svc.required_to_grant(Level::Read), Level::Admin);
    }

    #[test]
    fn test_create_account_writes_owner_edge() {
        let (svc, root) = service(GrantPolicy::MatchLevel);
        let alice = svc.create_account(&root, "alice", false, true).unwrap();
        let ns = alice.default_namespace.clone().unwrap();
        let edge = svc.store().get_edge(PERMISSIONS_EDGE, &alice.id, &ns).unwrap().unwrap();
        assert_eq!(edge, Access::owner(Level::Root));

        let ctx = Context::for_principal(alice.id.clone());
        assert_eq!(svc.effective_level(&ctx, &alice.id, &ns).unwrap(), Level::Root);
    }

    #[test]
    fn test_grant_rejects_none_and_account_target() {
        let (svc, root) = service(GrantPolicy::MatchLevel);
        let a = svc.create_account(&root, "a", false, true).unwrap();
        let b = svc.create_account(&root, "b", false, true).unwrap();
        let ns = a.default_namespace.clone().unwrap();
        assert!(matches!(svc.grant(&root, &b.id, &ns, Level::None), Err(GraphError::InvalidArgument(_))));
        assert!(matches!(svc.grant(&root, &b.id, &a.id, Level::Read), Err(GraphError::InvalidArgument(_))));
    }

    #[test]
    fn test_grant_keeps_owner_role() {
        let (svc, root) = service(GrantPolicy::MatchLevel);
        let a = svc.create_account(&root, "a", false, true).unwrap();
        let ns = a.default_namespace.clone().unwrap();
        svc.grant(&root, &a.id, &ns, Level::Admin).unwrap();
        let edge = svc.store().get_edge(PERMISSIONS_EDGE, &a.id, &ns).unwrap().unwrap();
        assert_eq!(edge, Access::owner(Level::Admin));
    }

    #[test]
    fn test_non_root_cannot_create_namespace() {
        let (svc, root) = service(GrantPolicy::MatchLevel);
        let a = svc.create_account(&root, "a", false, true).unwrap();
        let ctx = Context::for_principal(a.id);
        assert!(matches!(svc.create_namespace(&ctx, "x"), Err(GraphError::PermissionDenied(_))));
        assert!(matches!(
            svc.create_namespace(&Context::background(), "x"),
            Err(GraphError::Unauthenticated)
        ));
    }

    #[test]
    fn test_namespace_titles_unique() {
        let (svc, root) = service(GrantPolicy::MatchLevel);
        svc.create_namespace(&root, "tenant").unwrap();
        assert!(matches!(svc.create_namespace(&root, "tenant"), Err(GraphError::InvalidArgument(_))));
        // An account's default namespace takes the account title
        assert!(matches!(svc.create_account(&root, "tenant", false, true), Err(GraphError::InvalidArgument(_))));
        svc.create_account(&root, "alice", false, true).unwrap();
        assert!(svc.create_namespace(&root, "alice").is_err());
    }

    #[test]
    fn test_bootstrap_once() {
        let (svc, _) = service(GrantPolicy::MatchLevel);
        assert!(!svc.is_bootstrapped("root").unwrap());
        let root = svc.bootstrap("root").unwrap();
        assert!(root.is_root && root.enabled);
        assert!(svc.bootstrap("root").is_err());

        let ctx = Context::for_principal(root.id.clone());
        assert!(svc.create_namespace(&ctx, "tenant").is_ok());
    }
}
