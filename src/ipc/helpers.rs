use serde_json::json;

use crate::backend::BackendError;
use crate::error::ErrorInfo;
use crate::ipc::error::{bad_params, mutation_failed, no_backend, ok, query_failed};
use crate::ipc::types::{AppState, Request};
use crate::keys::{EntityId, QueryKey};
use crate::mutation::{self, MutationOutcome};
use crate::plans::InvalidationPlan;
use crate::resources::{Mutation, Query};

/// Reads `params[name]` as an id, accepting numbers and numeric strings.
pub fn required_id(req: &Request, name: &str) -> Result<EntityId, serde_json::Value> {
    match req.params.get(name) {
        None | Some(serde_json::Value::Null) => {
            Err(bad_params(&req.id, format!("missing params.{}", name)))
        }
        Some(v) => EntityId::from_json(v)
            .ok_or_else(|| bad_params(&req.id, format!("params.{} must be a numeric id", name))),
    }
}

pub fn optional_id(req: &Request, name: &str) -> Result<Option<EntityId>, serde_json::Value> {
    match req.params.get(name) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(_) => required_id(req, name).map(Some),
    }
}

pub fn required_key(req: &Request, name: &str) -> Result<QueryKey, serde_json::Value> {
    req.params
        .get(name)
        .and_then(QueryKey::from_json)
        .ok_or_else(|| bad_params(&req.id, format!("params.{} must be a query key", name)))
}

/// Form payload: `params.data` when present, otherwise `params` itself.
pub fn form(req: &Request) -> &serde_json::Value {
    req.params
        .get("data")
        .filter(|d| d.is_object())
        .unwrap_or(&req.params)
}

/// Reads through the cache and answers with `{key, data, fromCache}`.
pub fn run_query(state: &mut AppState, req: &Request, query: Query) -> serde_json::Value {
    let Some(backend) = state.backend.as_deref() else {
        return no_backend(&req.id);
    };
    let key = query.key.clone();
    match state.cache.fetch(query.key, query.request, backend) {
        Ok(fetched) => ok(
            &req.id,
            json!({
                "key": key,
                "data": fetched.data,
                "fromCache": fetched.from_cache,
            }),
        ),
        Err(e) => {
            let status = match &e {
                BackendError::Status { status, .. } => Some(*status),
                _ => None,
            };
            query_failed(&req.id, status, &ErrorInfo::from(&e))
        }
    }
}

/// Sends a write and applies its plan. `extra` is applied after the kind's
/// own plan, for writes that touch more than the plan can name (a reassigned
/// link also changes the previous teacher).
pub fn run_mutation(
    state: &mut AppState,
    req: &Request,
    m: Mutation,
    extra: Option<InvalidationPlan>,
) -> serde_json::Value {
    match execute(state, m, extra) {
        Ok(outcome) => ok(&req.id, mutation_result(&outcome)),
        Err(None) => no_backend(&req.id),
        Err(Some(info)) => mutation_failed(&req.id, &info),
    }
}

/// `Err(None)` means there is no backend to send to.
pub fn execute(
    state: &mut AppState,
    m: Mutation,
    extra: Option<InvalidationPlan>,
) -> Result<MutationOutcome, Option<ErrorInfo>> {
    let Some(backend) = state.backend.as_deref() else {
        return Err(None);
    };
    let mut outcome = mutation::run_mutation(&mut state.cache, backend, &m.kind, &m.request)?;
    if let Some(plan) = extra {
        let refetched = mutation::apply_plan(&mut state.cache, backend, &plan);
        outcome.invalidated.extend(plan.invalidate);
        outcome.refetched.extend(refetched);
    }
    Ok(outcome)
}

pub fn mutation_result(outcome: &MutationOutcome) -> serde_json::Value {
    json!({
        "mutationId": outcome.id,
        "data": outcome.data,
        "message": outcome.message,
        "invalidated": outcome.invalidated,
        "refetched": outcome.refetched,
    })
}
