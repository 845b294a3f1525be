use crate::ipc::error::validation_failed;
use crate::ipc::helpers::{form, required_id, run_mutation, run_query};
use crate::ipc::types::{AppState, Request};
use crate::model::ListParams;
use crate::resources;
use crate::validation;

fn handle_classrooms_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = ListParams::from_json(&req.params);
    run_query(state, req, resources::classrooms_list(&p))
}

fn handle_classrooms_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match required_id(req, "id") {
        Ok(id) => run_query(state, req, resources::classroom_details(id)),
        Err(e) => e,
    }
}

fn handle_classrooms_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    match validation::classroom(form(req)) {
        Ok(input) => run_mutation(state, req, resources::create_classroom(&input), None),
        Err(errors) => validation_failed(&req.id, &errors),
    }
}

fn handle_classrooms_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_id(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match validation::classroom(form(req)) {
        Ok(input) => run_mutation(state, req, resources::update_classroom(id, &input), None),
        Err(errors) => validation_failed(&req.id, &errors),
    }
}

fn handle_classrooms_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    match required_id(req, "id") {
        Ok(id) => run_mutation(state, req, resources::delete_classroom(id), None),
        Err(e) => e,
    }
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = ListParams::from_json(&req.params);
    run_query(state, req, resources::subjects_list(&p))
}

fn handle_subjects_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match required_id(req, "id") {
        Ok(id) => run_query(state, req, resources::subject_details(id)),
        Err(e) => e,
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    match validation::subject(form(req)) {
        Ok(input) => run_mutation(state, req, resources::create_subject(&input), None),
        Err(errors) => validation_failed(&req.id, &errors),
    }
}

fn handle_subjects_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_id(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match validation::subject(form(req)) {
        Ok(input) => run_mutation(state, req, resources::update_subject(id, &input), None),
        Err(errors) => validation_failed(&req.id, &errors),
    }
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    match required_id(req, "id") {
        Ok(id) => run_mutation(state, req, resources::delete_subject(id), None),
        Err(e) => e,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classrooms.list" => Some(handle_classrooms_list(state, req)),
        "classrooms.get" => Some(handle_classrooms_get(state, req)),
        "classrooms.create" => Some(handle_classrooms_create(state, req)),
        "classrooms.update" => Some(handle_classrooms_update(state, req)),
        "classrooms.delete" => Some(handle_classrooms_delete(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.get" => Some(handle_subjects_get(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.update" => Some(handle_subjects_update(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        _ => None,
    }
}
