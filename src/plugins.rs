//! Plugin descriptor validation and registry.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::access::{Access, Level};
use crate::constants::{CHILDREN_EDGE, PLUGINS_COL};
use crate::context::Context;
use crate::document::{Plugin, PluginKind};
use crate::engine::Authorizer;
use crate::error::{GraphError, Result};
use crate::node_id::{NodeId, NodeKind};
use crate::store::{GraphStore, WriteBatch};

/// Check a descriptor before it may enter the graph.
///
/// Returns `None` when valid, otherwise the first failing rule. Pure; never
/// touches the store.
pub fn validate_plugin(plugin: &Plugin) -> Option<&'static str> {
    if plugin.title.is_empty() {
        return Some("Title cannot be empty");
    }
    if plugin.kind == PluginKind::Unknown {
        return Some("Kind can't be Unknown");
    }
    if plugin.kind == PluginKind::Embedded && plugin.embedded_conf.is_none() {
        return Some("Kind is set to Embedded, but no conf provided");
    }
    None
}

pub struct PluginRegistry<S> {
    authz: Authorizer<S>,
}

impl<S> Clone for PluginRegistry<S> {
    fn clone(&self) -> Self {
        PluginRegistry { authz: self.authz.clone() }
    }
}

impl<S: GraphStore> PluginRegistry<S> {
    pub fn new(authz: Authorizer<S>) -> Self {
        PluginRegistry { authz }
    }

    pub fn with_store(store: Arc<S>) -> Self {
        Self::new(Authorizer::new(store))
    }

    /// Admit (or overwrite) a plugin under `key`. Root only.
    #[instrument(skip(self, ctx, plugin), fields(title = %plugin.title))]
    pub fn register(&self, ctx: &Context, key: &str, mut plugin: Plugin) -> Result<Plugin> {
        self.authz.require_root(ctx)?;
        if let Some(reason) = validate_plugin(&plugin) {
            warn!(reason, "plugin rejected");
            return Err(GraphError::ValidationFailed(reason.to_string()));
        }
        plugin.id = NodeId::new(PLUGINS_COL, key)?;
        plugin.access = None;
        if let Some(ns) = &plugin.namespace {
            if !ns.is(NodeKind::Namespace) {
                return Err(GraphError::InvalidArgument(format!("{} is not a namespace", ns)));
            }
        }

        let store = self.authz.store();
        ctx.check()?;
        let mut batch = WriteBatch::with_capacity(3);
        match store.get_node(&plugin.id) {
            Ok(_) => {
                for edge in store.inbound(CHILDREN_EDGE, &plugin.id)? {
                    batch.delete_edge(CHILDREN_EDGE, &edge.from, &plugin.id);
                }
            }
            Err(GraphError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        batch.put_node(plugin.clone().into());
        if let Some(ns) = &plugin.namespace {
            batch.upsert_edge(CHILDREN_EDGE, ns, &plugin.id, Access::default());
        }
        ctx.check()?;
        store.transact(batch)?;
        info!(id = %plugin.id, "plugin registered");
        Ok(plugin)
    }

    /// A plugin as seen by the caller. Hidden plugins are reported as absent.
    pub fn get(&self, ctx: &Context, id: &NodeId) -> Result<Plugin> {
        if !id.is(NodeKind::Plugin) {
            return Err(GraphError::InvalidArgument(format!("{} is not a plugin", id)));
        }
        ctx.check()?;
        let plugin = self.authz.store().get_node(id)?.into_plugin()?;
        self.visible(ctx, plugin)?.ok_or_else(|| GraphError::NotFound(id.to_string()))
    }

    /// Every plugin the caller can see, sorted by id.
    #[instrument(skip(self, ctx))]
    pub fn list(&self, ctx: &Context) -> Result<Vec<Plugin>> {
        ctx.check()?;
        let mut r = Vec::new();
        for doc in self.authz.store().list_nodes(PLUGINS_COL)? {
            if let Some(p) = self.visible(ctx, doc.into_plugin()?)? {
                r.push(p);
            }
        }
        r.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(r)
    }

    /// Remove a plugin and its edges. Root only.
    #[instrument(skip_all, fields(%id))]
    pub fn unregister(&self, ctx: &Context, id: &NodeId) -> Result<()> {
        self.authz.require_root(ctx)?;
        let store = self.authz.store();
        ctx.check()?;
        store.get_node(id)?.into_plugin()?;
        let mut batch = WriteBatch::with_capacity(1);
        batch.delete_node(id);
        store.transact(batch)?;
        info!("plugin unregistered");
        Ok(())
    }

    fn visible(&self, ctx: &Context, mut plugin: Plugin) -> Result<Option<Plugin>> {
        let level = if ctx.is_root() {
            Level::MAX
        } else {
            let caller = ctx.require_principal()?;
            let level = self.authz.effective_level(ctx, caller, &plugin.id)?;
            // Disabled accounts resolve to NONE and stay there, public or not
            if plugin.public && level < Level::Read && self.authz.is_enabled(ctx, caller)? {
                Level::Read
            } else {
                level
            }
        };
        if level == Level::None {
            return Ok(None);
        }
        plugin.access = Some(Access::new(level));
        Ok(Some(plugin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::EmbeddedConf;

    fn plugin(title: &str, kind: PluginKind) -> Plugin {
        let mut p = Plugin::new_blank("p").unwrap();
        p.title = title.to_string();
        p.kind = kind;
        p
    }

    #[test]
    fn test_empty_title_checked_first() {
        assert_eq!(validate_plugin(&plugin("", PluginKind::Unknown)), Some("Title cannot be empty"));
    }

    #[test]
    fn test_unknown_kind() {
        assert_eq!(validate_plugin(&plugin("t", PluginKind::Unknown)), Some("Kind can't be Unknown"));
    }

    #[test]
    fn test_embedded_needs_conf() {
        let mut p = plugin("t", PluginKind::Embedded);
        assert_eq!(validate_plugin(&p), Some("Kind is set to Embedded, but no conf provided"));
        p.embedded_conf = Some(EmbeddedConf { frontend_url: "https://ui.example/p".into() });
        assert_eq!(validate_plugin(&p), None);
    }

    #[test]
    fn test_standalone_without_conf_passes() {
        assert_eq!(validate_plugin(&plugin("t", PluginKind::Standalone)), None);
    }
}
