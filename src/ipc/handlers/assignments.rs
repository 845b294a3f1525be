use crate::ipc::error::validation_failed;
use crate::ipc::helpers::{form, optional_id, required_id, run_mutation, run_query};
use crate::ipc::types::{AppState, Request};
use crate::keys::{self, EntityId};
use crate::plans::InvalidationPlan;
use crate::resources;
use crate::validation;

/// After a reassignment the previous teacher's details view is out of date too.
/// Without `previousTeacherId` the kind's own plan already covers every teacher.
fn previous_teacher_plan(previous: Option<EntityId>, current: EntityId) -> Option<InvalidationPlan> {
    let previous = previous.filter(|p| *p != current)?;
    let details = keys::teacher_details(Some(previous));
    Some(InvalidationPlan {
        invalidate: vec![details.clone()],
        refetch: vec![details],
    })
}

fn handle_tutors_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let institution = state.institution(&req.params);
    match validation::tutor_link(form(req)) {
        Ok(input) => run_mutation(state, req, resources::assign_tutor(&input, institution), None),
        Err(errors) => validation_failed(&req.id, &errors),
    }
}

fn handle_tutors_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (link, previous) = match (required_id(req, "id"), optional_id(req, "previousTeacherId")) {
        (Ok(link), Ok(previous)) => (link, previous),
        (Err(e), _) | (_, Err(e)) => return e,
    };
    let institution = state.institution(&req.params);
    match validation::reassign(form(req)) {
        Ok(input) => {
            let extra = previous_teacher_plan(previous, input.teacher_id);
            run_mutation(
                state,
                req,
                resources::reassign_tutor(link, &input, previous, institution),
                extra,
            )
        }
        Err(errors) => validation_failed(&req.id, &errors),
    }
}

fn handle_tutors_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (link, teacher) = match (required_id(req, "id"), required_id(req, "teacherId")) {
        (Ok(link), Ok(teacher)) => (link, teacher),
        (Err(e), _) | (_, Err(e)) => return e,
    };
    let institution = state.institution(&req.params);
    run_mutation(
        state,
        req,
        resources::remove_tutor(link, teacher, institution),
        None,
    )
}

fn handle_teaching_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let institution = state.institution(&req.params);
    match validation::teaching_link(form(req)) {
        Ok(input) => run_mutation(
            state,
            req,
            resources::assign_teaching(&input, institution),
            None,
        ),
        Err(errors) => validation_failed(&req.id, &errors),
    }
}

fn handle_teaching_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (link, previous) = match (required_id(req, "id"), optional_id(req, "previousTeacherId")) {
        (Ok(link), Ok(previous)) => (link, previous),
        (Err(e), _) | (_, Err(e)) => return e,
    };
    let institution = state.institution(&req.params);
    match validation::reassign(form(req)) {
        Ok(input) => {
            let extra = previous_teacher_plan(previous, input.teacher_id);
            run_mutation(
                state,
                req,
                resources::reassign_teaching(link, &input, previous, institution),
                extra,
            )
        }
        Err(errors) => validation_failed(&req.id, &errors),
    }
}

/// Without `teacherId` every teacher-details entry is refreshed.
fn handle_teaching_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (link, teacher) = match (required_id(req, "id"), optional_id(req, "teacherId")) {
        (Ok(link), Ok(teacher)) => (link, teacher),
        (Err(e), _) | (_, Err(e)) => return e,
    };
    let institution = state.institution(&req.params);
    run_mutation(
        state,
        req,
        resources::remove_teaching(link, teacher, institution),
        None,
    )
}

fn handle_course_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let institution = state.institution(&req.params);
    run_query(state, req, resources::course_subjects(institution))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tutors.assign" => Some(handle_tutors_assign(state, req)),
        "tutors.update" => Some(handle_tutors_update(state, req)),
        "tutors.remove" => Some(handle_tutors_remove(state, req)),
        "teaching.assign" => Some(handle_teaching_assign(state, req)),
        "teaching.update" => Some(handle_teaching_update(state, req)),
        "teaching.remove" => Some(handle_teaching_remove(state, req)),
        "courseSubjects.list" => Some(handle_course_subjects_list(state, req)),
        _ => None,
    }
}
