use serde::Serialize;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::backend::{Backend, BackendRequest};
use crate::cache::QueryCache;
use crate::error::ErrorInfo;
use crate::keys::QueryKey;
use crate::plans::{InvalidationPlan, MutationKind};

#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    pub id: Uuid,
    pub data: serde_json::Value,
    pub message: Option<String>,
    /// Prefixes from the plan, in the order they were invalidated.
    pub invalidated: Vec<QueryKey>,
    /// Concrete keys that were refreshed from the backend.
    pub refetched: Vec<QueryKey>,
}

/// Sends a write and, only if it succeeds, applies the kind's invalidation
/// plan: every prefix is invalidated before anything is refetched, so a
/// refetch can never be undone by a later stale-marking of the same write.
/// Failures come back as [`ErrorInfo`] and leave the cache untouched.
pub fn run_mutation(
    cache: &mut QueryCache,
    backend: &dyn Backend,
    kind: &MutationKind,
    request: &BackendRequest,
) -> Result<MutationOutcome, ErrorInfo> {
    let id = Uuid::new_v4();
    let label = kind.label();
    let span = info_span!("mutation", %id, kind = %label);
    let _guard = span.enter();

    let envelope = match backend.send(request) {
        Ok(envelope) => envelope,
        Err(e) => {
            let info = ErrorInfo::from(&e);
            warn!(error = %e, message = %info.message, "mutation failed");
            return Err(info);
        }
    };

    let plan = kind.plan();
    let refetched = apply_plan(cache, backend, &plan);
    info!(
        invalidated = plan.invalidate.len(),
        refetched = refetched.len(),
        "mutation applied"
    );

    Ok(MutationOutcome {
        id,
        data: envelope.data.unwrap_or(serde_json::Value::Null),
        message: envelope.message,
        invalidated: plan.invalidate,
        refetched,
    })
}

/// Invalidates every prefix of `plan`, then refetches; returns the keys that
/// were refreshed.
pub fn apply_plan(
    cache: &mut QueryCache,
    backend: &dyn Backend,
    plan: &InvalidationPlan,
) -> Vec<QueryKey> {
    for prefix in &plan.invalidate {
        cache.invalidate(prefix);
    }
    let mut refetched = Vec::new();
    for prefix in &plan.refetch {
        refetched.extend(cache.refetch(prefix, backend));
    }
    refetched
}
