//! Collection names and traversal bounds

// Node collections
pub const ACCOUNTS_COL: &str = "Accounts";
pub const NAMESPACES_COL: &str = "Namespaces";
pub const OBJECTS_COL: &str = "Objects";
pub const PLUGINS_COL: &str = "Plugins";

// Edge collections
pub const PERMISSIONS_EDGE: &str = "Permissions"; // account -> target, carries Access
pub const CHILDREN_EDGE: &str = "Children"; // parent -> child hierarchy

pub const NODE_COLLECTIONS: &[&str] = &[ACCOUNTS_COL, NAMESPACES_COL, OBJECTS_COL, PLUGINS_COL];
pub const EDGE_COLLECTIONS: &[&str] = &[PERMISSIONS_EDGE, CHILDREN_EDGE];

// Maximum hierarchy depth walked before the graph is treated as corrupted
pub const MAX_INHERITANCE_DEPTH: usize = 32;

// LMDB defaults
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;
pub const MAX_DBS: u32 = 4;

/// Whether `name` is a known node collection
pub fn is_node_collection(name: &str) -> bool {
    NODE_COLLECTIONS.contains(&name)
}

/// Whether `name` is a known edge collection
pub fn is_edge_collection(name: &str) -> bool {
    EDGE_COLLECTIONS.contains(&name)
}
