use crate::ipc::error::validation_failed;
use crate::ipc::helpers::{form, required_id, run_mutation, run_query};
use crate::ipc::types::{AppState, Request};
use crate::model::ListParams;
use crate::resources;
use crate::validation;

fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = ListParams::from_json(&req.params);
    run_query(state, req, resources::teachers_list(&p))
}

fn handle_teachers_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let term = req.params.get("q").and_then(|v| v.as_str());
    run_query(state, req, resources::teachers_search(term))
}

fn handle_teachers_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match required_id(req, "id") {
        Ok(id) => run_query(state, req, resources::teacher_details(id)),
        Err(e) => e,
    }
}

fn handle_teachers_basic_info(state: &mut AppState, req: &Request) -> serde_json::Value {
    match required_id(req, "id") {
        Ok(id) => run_query(state, req, resources::teacher_basic_info(id)),
        Err(e) => e,
    }
}

fn handle_teachers_classes(state: &mut AppState, req: &Request) -> serde_json::Value {
    let institution = state.institution(&req.params);
    run_query(state, req, resources::teacher_classes(institution))
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    match validation::teacher(form(req)) {
        Ok(input) => run_mutation(state, req, resources::create_teacher(&input), None),
        Err(errors) => validation_failed(&req.id, &errors),
    }
}

fn handle_teachers_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_id(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match validation::teacher(form(req)) {
        Ok(input) => run_mutation(state, req, resources::update_teacher(id, &input), None),
        Err(errors) => validation_failed(&req.id, &errors),
    }
}

fn handle_teachers_update_basic_info(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_id(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match validation::teacher_basic_info(form(req)) {
        Ok(patch) => run_mutation(
            state,
            req,
            resources::update_teacher_basic_info(id, &patch),
            None,
        ),
        Err(errors) => validation_failed(&req.id, &errors),
    }
}

fn handle_teachers_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    match required_id(req, "id") {
        Ok(id) => run_mutation(state, req, resources::delete_teacher(id), None),
        Err(e) => e,
    }
}

fn handle_teachers_bulk_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    match validation::bulk_import(form(req)) {
        Ok(input) => run_mutation(state, req, resources::bulk_import_teachers(&input), None),
        Err(errors) => validation_failed(&req.id, &errors),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.search" => Some(handle_teachers_search(state, req)),
        "teachers.get" => Some(handle_teachers_get(state, req)),
        "teachers.basicInfo" => Some(handle_teachers_basic_info(state, req)),
        "teachers.classes" => Some(handle_teachers_classes(state, req)),
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "teachers.update" => Some(handle_teachers_update(state, req)),
        "teachers.updateBasicInfo" => Some(handle_teachers_update_basic_info(state, req)),
        "teachers.delete" => Some(handle_teachers_delete(state, req)),
        "teachers.bulkImport" => Some(handle_teachers_bulk_import(state, req)),
        _ => None,
    }
}
