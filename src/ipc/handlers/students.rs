use crate::ipc::error::{bad_params, err, mutation_failed, no_backend, ok, validation_failed};
use crate::ipc::helpers::{execute, mutation_result, run_query};
use crate::ipc::types::{AppState, Request};
use crate::model::ListParams;
use crate::registration::WizardError;
use crate::resources;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

fn wizard_id(req: &Request) -> Result<Uuid, serde_json::Value> {
    req.params
        .get("wizardId")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| bad_params(&req.id, "missing or malformed params.wizardId"))
}

fn wizard_error(req: &Request, e: &WizardError) -> serde_json::Value {
    match e {
        WizardError::Invalid { errors, .. } => validation_failed(&req.id, errors),
        WizardError::WrongStep { .. } => err(&req.id, "wrong_step", e.to_string(), None),
    }
}

fn unknown_wizard(req: &Request, id: Uuid) -> serde_json::Value {
    err(&req.id, "not_found", format!("no registration wizard {}", id), None)
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = ListParams::from_json(&req.params);
    run_query(state, req, resources::students_list(&p))
}

fn handle_registration_begin(state: &mut AppState, req: &Request) -> serde_json::Value {
    let wizard = state.wizards.begin();
    debug!(wizard = %wizard.id(), "registration wizard opened");
    ok(&req.id, wizard.snapshot())
}

fn handle_registration_submit_step(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match wizard_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(wizard) = state.wizards.get_mut(&id) else {
        return unknown_wizard(req, id);
    };
    let fields = req.params.get("fields").cloned().unwrap_or(json!({}));
    match wizard.submit_step(&fields) {
        Ok(step) => {
            debug!(wizard = %id, step = step.as_str(), "registration step accepted");
            ok(&req.id, wizard.snapshot())
        }
        Err(e) => wizard_error(req, &e),
    }
}

fn handle_registration_back(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match wizard_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(wizard) = state.wizards.get_mut(&id) else {
        return unknown_wizard(req, id);
    };
    wizard.back();
    ok(&req.id, wizard.snapshot())
}

fn handle_registration_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match wizard_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match state.wizards.get_mut(&id) {
        Some(wizard) => ok(&req.id, wizard.snapshot()),
        None => unknown_wizard(req, id),
    }
}

/// Registers the student. The wizard is dropped only once the server has
/// accepted it; a failure leaves it at review with every field intact.
fn handle_registration_complete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match wizard_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(wizard) = state.wizards.get_mut(&id) else {
        return unknown_wizard(req, id);
    };
    let mut input = match wizard.student_input() {
        Ok(v) => v,
        Err(e) => return wizard_error(req, &e),
    };
    if input.institution_id.is_none() {
        input.institution_id = Some(state.institution(&req.params));
    }

    match execute(state, resources::register_student(&input), None) {
        Ok(outcome) => {
            state.wizards.remove(&id);
            info!(wizard = %id, "student registered");
            ok(&req.id, mutation_result(&outcome))
        }
        Err(None) => no_backend(&req.id),
        Err(Some(info)) => mutation_failed(&req.id, &info),
    }
}

fn handle_registration_cancel(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match wizard_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let removed = state.wizards.remove(&id).is_some();
    ok(&req.id, json!({ "wizardId": id, "cancelled": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "registration.begin" => Some(handle_registration_begin(state, req)),
        "registration.submitStep" => Some(handle_registration_submit_step(state, req)),
        "registration.back" => Some(handle_registration_back(state, req)),
        "registration.state" => Some(handle_registration_state(state, req)),
        "registration.complete" => Some(handle_registration_complete(state, req)),
        "registration.cancel" => Some(handle_registration_cancel(state, req)),
        _ => None,
    }
}
