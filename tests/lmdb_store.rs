//! LMDB adapter contract tests

use meshgraph::{
    Access, Account, GraphError, GraphStore, Level, LmdbStore, Namespace, NodeId, Object, Role, WriteBatch,
    CHILDREN_EDGE, PERMISSIONS_EDGE,
};
use tempfile::TempDir;

fn setup() -> (TempDir, LmdbStore) {
    let dir = TempDir::new().unwrap();
    let store = LmdbStore::open(dir.path()).unwrap();
    (dir, store)
}

fn seed(store: &LmdbStore) -> (NodeId, NodeId) {
    let mut acc = Account::new_blank("alice").unwrap();
    acc.enabled = true;
    let ns = Namespace::new_blank("default").unwrap();
    let ids = (acc.id.clone(), ns.id.clone());
    let mut batch = WriteBatch::new();
    batch.put_node(acc.into()).put_node(ns.into());
    store.transact(batch).unwrap();
    ids
}

#[test]
fn node_round_trip() {
    let (_dir, store) = setup();
    let mut obj = Object::new_blank("o1").unwrap();
    obj.title = "Pump".into();
    obj.kind = "device".into();
    let id = obj.id.clone();
    let mut batch = WriteBatch::new();
    batch.put_node(obj.clone().into());
    store.transact(batch).unwrap();

    assert_eq!(store.get_node(&id).unwrap().into_object().unwrap(), obj);
    let missing = NodeId::parse("Objects/none").unwrap();
    assert!(matches!(store.get_node(&missing), Err(GraphError::NotFound(_))));
}

#[test]
fn edge_upsert_last_write_wins() {
    let (_dir, store) = setup();
    let (a, n) = seed(&store);
    store.upsert_edge(PERMISSIONS_EDGE, &a, &n, Access::owner(Level::Root)).unwrap();
    store.upsert_edge(PERMISSIONS_EDGE, &a, &n, Access::new(Level::Read)).unwrap();

    assert_eq!(store.get_edge(PERMISSIONS_EDGE, &a, &n).unwrap(), Some(Access::new(Level::Read)));
    let out = store.outbound(PERMISSIONS_EDGE, &a).unwrap();
    let inb = store.inbound(PERMISSIONS_EDGE, &n).unwrap();
    assert_eq!(out, inb);
    assert_eq!(out.len(), 1);
    assert_eq!((out[0].from.clone(), out[0].to.clone()), (a, n));
}

/// Edge collections are separate indexes
#[test]
fn edge_collections_are_isolated() {
    let (_dir, store) = setup();
    let (a, n) = seed(&store);
    store.upsert_edge(PERMISSIONS_EDGE, &a, &n, Access::new(Level::Admin)).unwrap();
    assert!(store.inbound(CHILDREN_EDGE, &n).unwrap().is_empty());
    assert_eq!(store.get_edge(CHILDREN_EDGE, &a, &n).unwrap(), None);
}

/// Ids sharing a byte prefix never bleed into each other's scans
#[test]
fn prefix_ids_do_not_collide() {
    let (_dir, store) = setup();
    let ns = Namespace::new_blank("n").unwrap();
    let ns_long = Namespace::new_blank("n2").unwrap();
    let o = Object::new_blank("x").unwrap();
    let (n_id, n2_id, o_id) = (ns.id.clone(), ns_long.id.clone(), o.id.clone());
    let mut batch = WriteBatch::new();
    batch
        .put_node(ns.into())
        .put_node(ns_long.into())
        .put_node(o.into())
        .upsert_edge(CHILDREN_EDGE, &n2_id, &o_id, Access::default());
    store.transact(batch).unwrap();

    assert!(store.outbound(CHILDREN_EDGE, &n_id).unwrap().is_empty());
    assert_eq!(store.outbound(CHILDREN_EDGE, &n2_id).unwrap().len(), 1);
}

/// Edges may point at nodes written earlier in the same batch; dangling ones abort it
#[test]
fn transact_is_atomic() {
    let (_dir, store) = setup();
    let (a, _) = seed(&store);
    let ns = Namespace::new_blank("fresh").unwrap();
    let ns_id = ns.id.clone();
    let ghost = NodeId::parse("Objects/ghost").unwrap();

    let mut bad = WriteBatch::new();
    bad.put_node(ns.clone().into())
        .upsert_edge(PERMISSIONS_EDGE, &a, &ns_id, Access::new(Level::Read))
        .upsert_edge(PERMISSIONS_EDGE, &a, &ghost, Access::new(Level::Read));
    assert!(matches!(store.transact(bad), Err(GraphError::NotFound(_))));
    assert!(matches!(store.get_node(&ns_id), Err(GraphError::NotFound(_))));
    assert!(store.outbound(PERMISSIONS_EDGE, &a).unwrap().is_empty());

    let mut good = WriteBatch::new();
    good.put_node(ns.into()).upsert_edge(PERMISSIONS_EDGE, &a, &ns_id, Access::new(Level::Read));
    store.transact(good).unwrap();
    assert_eq!(store.get_edge(PERMISSIONS_EDGE, &a, &ns_id).unwrap(), Some(Access::new(Level::Read)));
}

#[test]
fn delete_edge_reports_existence() {
    let (_dir, store) = setup();
    let (a, n) = seed(&store);
    store.upsert_edge(PERMISSIONS_EDGE, &a, &n, Access::new(Level::Read)).unwrap();
    assert!(store.delete_edge(PERMISSIONS_EDGE, &a, &n).unwrap());
    assert!(!store.delete_edge(PERMISSIONS_EDGE, &a, &n).unwrap());
    assert!(store.inbound(PERMISSIONS_EDGE, &n).unwrap().is_empty());
}

/// Deleting a node drops every edge touching it, both directions
#[test]
fn delete_node_cascades() {
    let (_dir, store) = setup();
    let (a, n) = seed(&store);
    let o = Object::new_blank("o").unwrap();
    let o_id = o.id.clone();
    let mut batch = WriteBatch::new();
    batch
        .put_node(o.into())
        .upsert_edge(CHILDREN_EDGE, &n, &o_id, Access::default())
        .upsert_edge(PERMISSIONS_EDGE, &a, &n, Access::owner(Level::Root));
    store.transact(batch).unwrap();

    let mut batch = WriteBatch::new();
    batch.delete_node(&n);
    store.transact(batch).unwrap();
    assert!(store.inbound(CHILDREN_EDGE, &o_id).unwrap().is_empty());
    assert!(store.outbound(PERMISSIONS_EDGE, &a).unwrap().is_empty());
}

#[test]
fn list_nodes_by_collection() {
    let (_dir, store) = setup();
    seed(&store);
    assert_eq!(store.list_nodes("Accounts").unwrap().len(), 1);
    assert_eq!(store.list_nodes("Namespaces").unwrap().len(), 1);
    assert!(store.list_nodes("Objects").unwrap().is_empty());
    assert!(matches!(store.list_nodes("Permissions"), Err(GraphError::InvalidArgument(_))));
}

#[test]
fn unknown_edge_collection_rejected() {
    let (_dir, store) = setup();
    let (a, n) = seed(&store);
    assert!(matches!(store.outbound("Friends", &a), Err(GraphError::InvalidArgument(_))));
    assert!(matches!(store.upsert_edge("Friends", &a, &n, Access::default()), Err(GraphError::InvalidArgument(_))));
}

/// Roles survive the packed encoding
#[test]
fn owner_role_persists() {
    let (_dir, store) = setup();
    let (a, n) = seed(&store);
    store.upsert_edge(PERMISSIONS_EDGE, &a, &n, Access::owner(Level::Admin)).unwrap();
    let got = store.get_edge(PERMISSIONS_EDGE, &a, &n).unwrap().unwrap();
    assert_eq!(got.role, Role::Owner);
    assert_eq!(got.level, Level::Admin);
}

/// Merging a level keeps the stored role; a fresh edge gets no role
#[test]
fn merge_edge_level_keeps_role() {
    let (_dir, store) = setup();
    let (a, n) = seed(&store);
    let mut batch = WriteBatch::new();
    batch.merge_edge_level(PERMISSIONS_EDGE, &a, &n, Level::Read);
    store.transact(batch).unwrap();
    assert_eq!(store.get_edge(PERMISSIONS_EDGE, &a, &n).unwrap(), Some(Access::new(Level::Read)));

    store.upsert_edge(PERMISSIONS_EDGE, &a, &n, Access::owner(Level::Root)).unwrap();
    let mut batch = WriteBatch::new();
    batch.merge_edge_level(PERMISSIONS_EDGE, &a, &n, Level::Mgmt);
    store.transact(batch).unwrap();
    assert_eq!(store.get_edge(PERMISSIONS_EDGE, &a, &n).unwrap(), Some(Access::owner(Level::Mgmt)));
}

/// A claimed name belongs to one node until that node is deleted
#[test]
fn claimed_names_unique_until_owner_deleted() {
    let (_dir, store) = setup();
    let (_, n) = seed(&store);
    let mut batch = WriteBatch::new();
    batch.claim_name("Namespaces", "default", &n);
    store.transact(batch).unwrap();
    assert_eq!(store.name_owner("Namespaces", "default").unwrap(), Some(n.clone()));

    let rival = Namespace::new_blank("rival").unwrap();
    let rival_id = rival.id.clone();
    let mut batch = WriteBatch::new();
    batch.put_node(rival.clone().into()).claim_name("Namespaces", "default", &rival_id);
    assert!(matches!(store.transact(batch), Err(GraphError::InvalidArgument(_))));
    assert!(matches!(store.get_node(&rival_id), Err(GraphError::NotFound(_))));

    let mut batch = WriteBatch::new();
    batch.delete_node(&n);
    store.transact(batch).unwrap();
    assert_eq!(store.name_owner("Namespaces", "default").unwrap(), None);

    let mut batch = WriteBatch::new();
    batch.put_node(rival.into()).claim_name("Namespaces", "default", &rival_id);
    store.transact(batch).unwrap();
    assert_eq!(store.name_owner("Namespaces", "default").unwrap(), Some(rival_id));
}
