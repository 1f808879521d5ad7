//! Per-call request context: principal, root marker, deadline, cancellation.
//!
//! The root marker is threaded through every call instead of living in
//! process state. Only the authentication layer should call
//! [`Context::elevate_root`]; the engine trusts the marker completely.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{GraphError, Result};
use crate::node_id::NodeId;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    principal: Option<NodeId>,
    root: bool,
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl Context {
    /// Empty context: no principal, not root, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Context acting on behalf of an authenticated account.
    pub fn for_principal(principal: NodeId) -> Self {
        Context { principal: Some(principal), ..Self::default() }
    }

    /// Mark the request as superuser-authenticated.
    pub fn elevate_root(mut self) -> Self {
        self.root = true;
        self
    }

    /// Same deadline and cancellation, without the root marker.
    pub fn without_root(&self) -> Self {
        Context { root: false, ..self.clone() }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn principal(&self) -> Option<&NodeId> {
        self.principal.as_ref()
    }

    /// The calling principal, or `Unauthenticated`.
    pub fn require_principal(&self) -> Result<&NodeId> {
        self.principal.as_ref().ok_or(GraphError::Unauthenticated)
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    /// Fail with `Cancelled` once the token fired or the deadline passed.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Err(GraphError::Cancelled),
            _ => Ok(()),
        }
    }
}
