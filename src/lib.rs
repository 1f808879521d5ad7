//! meshgraph - Authorization graph engine
//!
//! Accounts, namespaces, objects and plugins are nodes; permissions are
//! leveled `Permissions` edges, and the `Children` edges form the
//! namespace/object hierarchy that grants inherit down.
//!
//! ```ignore
//! let store = Arc::new(LmdbStore::open("./data/meshgraph.mdb")?);
//! let perms = PermissionService::with_store(store);
//! let root = Context::background().elevate_root();
//!
//! let ns = perms.create_namespace(&root, "default")?;
//! let alice = perms.create_account(&root, "alice", false, true)?;
//! let node = perms.create_object(&root, "sample-node", "asset", &ns.id)?;
//! perms.grant(&root, &alice.id, &node.id, Level::Read)?;
//!
//! let ctx = Context::for_principal(alice.id.clone());
//! assert!(perms.is_authorized(&ctx, &alice.id, &node.id, Level::Read)?);
//! assert!(!perms.is_authorized(&ctx, &alice.id, &node.id, Level::Admin)?);
//! ```

pub mod access;
pub mod config;
pub mod constants;
pub mod context;
pub mod document;
pub mod engine;
pub mod error;
pub mod keys;
pub mod lmdb;
pub mod memory;
pub mod node_id;
pub mod permissions;
pub mod plugins;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

pub use access::{Access, Level, Role};
pub use config::{Config, GrantPolicy};
pub use constants::{CHILDREN_EDGE, PERMISSIONS_EDGE};
pub use context::{CancelToken, Context};
pub use document::{Account, Document, EmbeddedConf, Namespace, Object, Plugin, PluginKind};
pub use engine::Authorizer;
pub use error::{ErrorKind, GraphError, Result};
pub use lmdb::LmdbStore;
pub use memory::MemoryStore;
pub use node_id::{NodeId, NodeKind};
pub use permissions::{ObjectTree, Permission, PermissionService};
pub use plugins::{validate_plugin, PluginRegistry};
pub use store::{Edge, GraphStore, WriteBatch, WriteOp};
