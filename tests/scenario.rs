//! End-to-end flows on the LMDB store

use std::sync::Arc;

use meshgraph::{Context, Level, LmdbStore, PermissionService, PluginKind, PluginRegistry, Plugin, EmbeddedConf};
use tempfile::TempDir;

fn open(dir: &TempDir) -> PermissionService<LmdbStore> {
    let store = Arc::new(LmdbStore::open(dir.path()).unwrap());
    PermissionService::with_store(store)
}

/// namespace, account, object, READ grant, then READ passes and ADMIN does not
#[test]
fn sample_node_scenario() {
    let dir = TempDir::new().unwrap();
    let perms = open(&dir);
    let root = Context::background().elevate_root();

    let ns = perms.create_namespace(&root, "default").unwrap();
    let alice = perms.create_account(&root, "alice", false, true).unwrap();
    let node = perms.create_object(&root, "sample-node", "asset", &ns.id).unwrap();
    perms.grant(&root, &alice.id, &node.id, Level::Read).unwrap();

    let ctx = Context::for_principal(alice.id.clone());
    assert!(perms.is_authorized(&ctx, &alice.id, &node.id, Level::Read).unwrap());
    assert!(!perms.is_authorized(&ctx, &alice.id, &node.id, Level::Admin).unwrap());
    assert!(!perms.is_authorized(&ctx, &alice.id, &ns.id, Level::Read).unwrap());
}

/// WRITE on a namespace shows up in its permission listing
#[test]
fn listing_scenario() {
    let dir = TempDir::new().unwrap();
    let perms = open(&dir);
    let root = Context::background().elevate_root();

    let ns = perms.create_namespace(&root, "N").unwrap();
    let a = perms.create_account(&root, "A", false, true).unwrap();
    perms.grant(&root, &a.id, &ns.id, "WRITE".parse().unwrap()).unwrap();

    let listed = perms.list_permissions(&root, &ns.id).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].principal, a.id);
    assert_eq!(listed[0].level, Level::Mgmt);
}

/// Graph state survives closing and reopening the environment
#[test]
fn state_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let root = Context::background().elevate_root();
    let (alice, obj) = {
        let perms = open(&dir);
        let ns = perms.create_namespace(&root, "default").unwrap();
        let alice = perms.create_account(&root, "alice", false, true).unwrap();
        let rack = perms.create_object(&root, "rack", "asset", &ns.id).unwrap();
        let obj = perms.create_object(&root, "server", "asset", &rack.id).unwrap();
        perms.grant(&root, &alice.id, &ns.id, Level::Admin).unwrap();
        (alice, obj)
    };

    let perms = open(&dir);
    let ctx = Context::for_principal(alice.id.clone());
    assert_eq!(perms.effective_level(&ctx, &alice.id, &obj.id).unwrap(), Level::Admin);
}

/// Bootstrapped root account drives the whole lifecycle
#[test]
fn bootstrapped_root_flow() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LmdbStore::open(dir.path()).unwrap());
    let perms = PermissionService::with_store(Arc::clone(&store));
    let plugins = PluginRegistry::with_store(store);

    let admin = perms.bootstrap("root").unwrap();
    let ctx = Context::for_principal(admin.id.clone());

    let tenant = perms.create_namespace(&ctx, "tenant").unwrap();
    let bob = perms.create_account(&ctx, "bob", false, true).unwrap();
    perms.grant(&ctx, &bob.id, &tenant.id, Level::Mgmt).unwrap();

    let mut p = Plugin::new_blank("draft").unwrap();
    p.title = "Dashboard".into();
    p.kind = PluginKind::Embedded;
    p.embedded_conf = Some(EmbeddedConf { frontend_url: "https://dash.local".into() });
    p.namespace = Some(tenant.id.clone());
    plugins.register(&ctx, "dashboard", p).unwrap();

    let bob_ctx = Context::for_principal(bob.id.clone());
    let visible = plugins.list(&bob_ctx).unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].access.map(|a| a.level), Some(Level::Mgmt));

    let obj = perms.create_object(&bob_ctx, "sensor", "device", &tenant.id).unwrap();
    assert_eq!(obj.namespace, Some(tenant.id));
}
