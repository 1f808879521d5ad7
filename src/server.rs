//! REST transport over the permission service and plugin registry.
//!
//! Every route except `/health` resolves a principal before it reaches the
//! engine:
//!   - `x-root-token` equal to the configured token elevates the request to root
//!     (`x-principal` then becomes optional)
//!   - otherwise `x-principal: Accounts/<key>` must name an existing, enabled account
//!
//! Endpoints:
//!   GET  /health                        - Liveness
//!   POST /check                         - Is a principal authorized for a level
//!                                         (non-root callers must see the target)
//!   GET  /level/:collection/:key        - Target as seen by the caller
//!   POST /grant                         - Write an Access edge
//!   POST /revoke                        - Remove an Access edge
//!   GET  /permissions/:collection/:key  - Direct Access edges on a target
//!   POST /namespaces                    - Create namespace (root)
//!   POST /accounts                      - Create account (root)
//!   POST /accounts/toggle               - Enable/disable account (root)
//!   POST /objects                       - Create object under a parent
//!   POST /objects/move                  - Re-parent an object
//!   GET  /objects/:namespace_key        - Objects the caller can see (?recursive=true nests)
//!   POST /plugins/validate              - Validate a descriptor
//!   POST /plugins                       - Register plugin (root)
//!   GET  /plugins                       - Plugins visible to the caller
//!   DELETE /plugins/:key                - Unregister plugin (root)

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::access::Level;
use crate::config::Config;
use crate::constants::{NAMESPACES_COL, PLUGINS_COL};
use crate::context::Context;
use crate::document::{Account, Document, EmbeddedConf, Namespace, Object, Plugin, PluginKind};
use crate::engine::Authorizer;
use crate::error::{ErrorKind, GraphError};
use crate::keys::generate_key;
use crate::node_id::{NodeId, NodeKind};
use crate::permissions::{ObjectTree, Permission, PermissionService};
use crate::plugins::{validate_plugin, PluginRegistry};
use crate::store::GraphStore;

pub const PRINCIPAL_HEADER: &str = "x-principal";
pub const ROOT_TOKEN_HEADER: &str = "x-root-token";

/// Upper bound on a single request's engine work.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// State
// ============================================================================

pub struct AppState<S> {
    pub permissions: PermissionService<S>,
    pub plugins: PluginRegistry<S>,
    root_token: Option<String>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        AppState {
            permissions: self.permissions.clone(),
            plugins: self.plugins.clone(),
            root_token: self.root_token.clone(),
        }
    }
}

impl<S: GraphStore> AppState<S> {
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        let authz = Authorizer::with_max_depth(store, config.max_depth);
        AppState {
            permissions: PermissionService::new(authz.clone(), config.grant_policy),
            plugins: PluginRegistry::new(authz),
            root_token: config.root_token.clone(),
        }
    }

    /// Resolve the request context from headers.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Context, GraphError> {
        let principal = match headers.get(PRINCIPAL_HEADER) {
            Some(v) => {
                let s = v.to_str().map_err(|_| GraphError::Unauthenticated)?;
                let id = NodeId::parse(s).map_err(|_| GraphError::Unauthenticated)?;
                if !id.is(NodeKind::Account) {
                    return Err(GraphError::Unauthenticated);
                }
                Some(id)
            }
            None => None,
        };

        let elevated = match (&self.root_token, headers.get(ROOT_TOKEN_HEADER)) {
            (Some(expected), Some(given)) => given.as_bytes() == expected.as_bytes(),
            _ => false,
        };

        let ctx = match (principal, elevated) {
            (Some(id), true) => Context::for_principal(id).elevate_root(),
            (None, true) => Context::background().elevate_root(),
            (Some(id), false) => {
                let store = self.permissions.authorizer().store();
                let account = match store.get_node(&id) {
                    Ok(doc) => doc.into_account().map_err(|_| GraphError::Unauthenticated)?,
                    Err(GraphError::NotFound(_)) => return Err(GraphError::Unauthenticated),
                    Err(e) => return Err(e),
                };
                if !account.enabled {
                    return Err(GraphError::Unauthenticated);
                }
                Context::for_principal(id)
            }
            (None, false) => return Err(GraphError::Unauthenticated),
        };
        Ok(ctx.with_timeout(REQUEST_TIMEOUT))
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    fn err(msg: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(msg.into()) }
    }
}

/// Transport wrapper giving every error kind its status code.
pub struct ApiError(pub GraphError);

impl From<GraphError> for ApiError {
    fn from(e: GraphError) -> Self {
        ApiError(e)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        debug!(%status, error = %self.0, "request failed");
        (status, Json(ApiResponse::<()>::err(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

#[derive(Deserialize)]
struct CheckReq {
    principal: NodeId,
    target: NodeId,
    level: Level,
}

#[derive(Serialize)]
struct CheckRes {
    allowed: bool,
    effective: Level,
    required: Level,
}

#[derive(Deserialize)]
struct GrantReq {
    principal: NodeId,
    target: NodeId,
    level: Level,
}

#[derive(Deserialize)]
struct RevokeReq {
    principal: NodeId,
    target: NodeId,
}

#[derive(Deserialize)]
struct NamespaceReq {
    title: String,
}

#[derive(Deserialize)]
struct AccountReq {
    title: String,
    #[serde(default)]
    is_root: bool,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Deserialize)]
struct ToggleReq {
    account: NodeId,
}

#[derive(Serialize)]
struct ToggleRes {
    enabled: bool,
}

#[derive(Deserialize)]
struct ObjectReq {
    title: String,
    #[serde(default)]
    kind: String,
    parent: NodeId,
}

#[derive(Deserialize)]
struct ObjectsQuery {
    #[serde(default)]
    recursive: bool,
}

#[derive(Deserialize)]
struct MoveReq {
    object: NodeId,
    new_parent: NodeId,
}

/// Plugin descriptor as sent by clients; the id is derived from `key`.
#[derive(Deserialize, Default)]
#[serde(default)]
struct PluginReq {
    key: Option<String>,
    title: String,
    kind: PluginKind,
    description: String,
    public: bool,
    namespace: Option<NodeId>,
    embedded_conf: Option<EmbeddedConf>,
    vars: BTreeMap<String, String>,
}

impl PluginReq {
    fn into_plugin(self, key: &str) -> Result<Plugin, GraphError> {
        let mut p = Plugin::new_blank(key)?;
        p.title = self.title;
        p.kind = self.kind;
        p.description = self.description;
        p.public = self.public;
        p.namespace = self.namespace;
        p.embedded_conf = self.embedded_conf;
        p.vars = self.vars;
        Ok(p)
    }
}

#[derive(Serialize)]
struct ValidateRes {
    valid: bool,
    reason: String,
}

#[derive(Serialize)]
struct HealthRes {
    status: &'static str,
    version: &'static str,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<HealthRes> {
    Json(HealthRes { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

async fn post_check<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(req): Json<CheckReq>,
) -> ApiResult<CheckRes> {
    let ctx = state.authenticate(&headers)?;
    let effective = state.permissions.check_access(&ctx, &req.principal, &req.target)?;
    ok(CheckRes { allowed: effective.meets(req.level), effective, required: req.level })
}

async fn get_level<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path((collection, key)): Path<(String, String)>,
) -> ApiResult<Document> {
    let ctx = state.authenticate(&headers)?;
    let target = NodeId::new(&collection, &key)?;
    ok(state.permissions.get(&ctx, &target)?)
}

async fn post_grant<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(req): Json<GrantReq>,
) -> ApiResult<&'static str> {
    let ctx = state.authenticate(&headers)?;
    state.permissions.grant(&ctx, &req.principal, &req.target, req.level)?;
    ok("granted")
}

async fn post_revoke<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(req): Json<RevokeReq>,
) -> ApiResult<&'static str> {
    let ctx = state.authenticate(&headers)?;
    state.permissions.revoke(&ctx, &req.principal, &req.target)?;
    ok("revoked")
}

async fn get_permissions<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path((collection, key)): Path<(String, String)>,
) -> ApiResult<Vec<Permission>> {
    let ctx = state.authenticate(&headers)?;
    let target = NodeId::new(&collection, &key)?;
    ok(state.permissions.list_permissions(&ctx, &target)?)
}

async fn post_namespace<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(req): Json<NamespaceReq>,
) -> ApiResult<Namespace> {
    let ctx = state.authenticate(&headers)?;
    ok(state.permissions.create_namespace(&ctx, &req.title)?)
}

async fn post_account<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(req): Json<AccountReq>,
) -> ApiResult<Account> {
    let ctx = state.authenticate(&headers)?;
    ok(state.permissions.create_account(&ctx, &req.title, req.is_root, req.enabled)?)
}

async fn post_toggle<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(req): Json<ToggleReq>,
) -> ApiResult<ToggleRes> {
    let ctx = state.authenticate(&headers)?;
    let enabled = state.permissions.toggle_account(&ctx, &req.account)?;
    ok(ToggleRes { enabled })
}

async fn post_object<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(req): Json<ObjectReq>,
) -> ApiResult<Object> {
    let ctx = state.authenticate(&headers)?;
    ok(state.permissions.create_object(&ctx, &req.title, &req.kind, &req.parent)?)
}

async fn get_objects<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(namespace_key): Path<String>,
    Query(query): Query<ObjectsQuery>,
) -> ApiResult<Vec<ObjectTree>> {
    let ctx = state.authenticate(&headers)?;
    let ns = NodeId::new(NAMESPACES_COL, &namespace_key)?;
    ok(state.permissions.list_objects(&ctx, &ns, query.recursive)?)
}

async fn post_move<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(req): Json<MoveReq>,
) -> ApiResult<Object> {
    let ctx = state.authenticate(&headers)?;
    ok(state.permissions.move_object(&ctx, &req.object, &req.new_parent)?)
}

async fn post_validate_plugin<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(req): Json<PluginReq>,
) -> ApiResult<ValidateRes> {
    state.authenticate(&headers)?;
    let plugin = req.into_plugin("draft")?;
    let reason = validate_plugin(&plugin).unwrap_or_default();
    ok(ValidateRes { valid: reason.is_empty(), reason: reason.to_string() })
}

async fn post_plugin<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(mut req): Json<PluginReq>,
) -> ApiResult<Plugin> {
    let ctx = state.authenticate(&headers)?;
    let key = match req.key.take() {
        Some(k) => k,
        None => generate_key()?,
    };
    let plugin = req.into_plugin(&key)?;
    ok(state.plugins.register(&ctx, &key, plugin)?)
}

async fn get_plugins<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> ApiResult<Vec<Plugin>> {
    let ctx = state.authenticate(&headers)?;
    ok(state.plugins.list(&ctx)?)
}

async fn delete_plugin<S: GraphStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> ApiResult<&'static str> {
    let ctx = state.authenticate(&headers)?;
    state.plugins.unregister(&ctx, &NodeId::new(PLUGINS_COL, &key)?)?;
    ok("unregistered")
}

// ============================================================================
// Router
// ============================================================================

pub fn router<S: GraphStore + 'static>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/check", post(post_check::<S>))
        .route("/level/:collection/:key", get(get_level::<S>))
        .route("/grant", post(post_grant::<S>))
        .route("/revoke", post(post_revoke::<S>))
        .route("/permissions/:collection/:key", get(get_permissions::<S>))
        .route("/namespaces", post(post_namespace::<S>))
        .route("/accounts", post(post_account::<S>))
        .route("/accounts/toggle", post(post_toggle::<S>))
        .route("/objects", post(post_object::<S>))
        .route("/objects/move", post(post_move::<S>))
        .route("/objects/:namespace_key", get(get_objects::<S>))
        .route("/plugins/validate", post(post_validate_plugin::<S>))
        .route("/plugins", post(post_plugin::<S>).get(get_plugins::<S>))
        .route("/plugins/:key", delete(delete_plugin::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
