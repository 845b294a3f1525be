use serde::Serialize;

use crate::backend::{BackendRequest, Method};
use crate::keys::{self, EntityId, QueryKey};
use crate::model::{
    BulkImportInput, ClassroomInput, ListParams, ReassignInput, StudentInput, SubjectInput,
    TeacherBasicInfoPatch, TeacherInput, TeachingLinkInput, TutorLinkInput,
};
use crate::plans::{MutationKind, Op};

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub key: QueryKey,
    pub request: BackendRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub request: BackendRequest,
}

fn list_request(path: &str, p: &ListParams) -> BackendRequest {
    let req = BackendRequest::get(path)
        .query("page", p.page)
        .query("limit", p.limit);
    match &p.search {
        Some(s) => req.query("search", s),
        None => req,
    }
}

fn body_of<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

// ---- queries ----

pub fn teachers_list(p: &ListParams) -> Query {
    Query {
        key: keys::teachers_list(p.page, p.limit, p.search.as_deref()),
        request: list_request("/teachers", p),
    }
}

pub fn teachers_search(term: Option<&str>) -> Query {
    let term = term.map(str::trim).filter(|t| !t.is_empty());
    let request = BackendRequest::get("/teachers/search");
    Query {
        key: keys::teachers_search(term),
        request: match term {
            Some(t) => request.query("q", t),
            None => request,
        },
    }
}

pub fn teacher_details(teacher: EntityId) -> Query {
    Query {
        key: keys::teacher_details(Some(teacher)),
        request: BackendRequest::get(format!("/teachers/{}", teacher)),
    }
}

pub fn teacher_basic_info(teacher: EntityId) -> Query {
    Query {
        key: keys::teacher_basic_info(teacher),
        request: BackendRequest::get(format!("/teachers/{}/basic-info", teacher)),
    }
}

pub fn teacher_classes(institution: EntityId) -> Query {
    Query {
        key: keys::teacher_classes(Some(institution)),
        request: BackendRequest::get(format!("/institutions/{}/teacher-classes", institution)),
    }
}

pub fn course_subjects(institution: EntityId) -> Query {
    Query {
        key: keys::course_subjects(Some(institution)),
        request: BackendRequest::get(format!("/institutions/{}/course-subjects", institution)),
    }
}

pub fn classrooms_list(p: &ListParams) -> Query {
    Query {
        key: keys::classrooms_list(p.page, p.limit, p.search.as_deref()),
        request: list_request("/classrooms", p),
    }
}

pub fn classroom_details(classroom: EntityId) -> Query {
    Query {
        key: keys::classroom_details(classroom),
        request: BackendRequest::get(format!("/classrooms/{}", classroom)),
    }
}

pub fn subjects_list(p: &ListParams) -> Query {
    Query {
        key: keys::subjects_list(p.page, p.limit, p.search.as_deref()),
        request: list_request("/subjects", p),
    }
}

pub fn subject_details(subject: EntityId) -> Query {
    Query {
        key: keys::subject_details(subject),
        request: BackendRequest::get(format!("/subjects/{}", subject)),
    }
}

pub fn students_list(p: &ListParams) -> Query {
    Query {
        key: keys::students_list(p.page, p.limit, p.search.as_deref()),
        request: list_request("/students", p),
    }
}

// ---- teachers ----

pub fn create_teacher(input: &TeacherInput) -> Mutation {
    Mutation {
        kind: MutationKind::Teacher(Op::Create),
        request: BackendRequest::with_body(Method::Post, "/teachers", body_of(input)),
    }
}

pub fn update_teacher(teacher: EntityId, input: &TeacherInput) -> Mutation {
    Mutation {
        kind: MutationKind::Teacher(Op::Update),
        request: BackendRequest::with_body(
            Method::Put,
            format!("/teachers/{}", teacher),
            body_of(input),
        ),
    }
}

pub fn delete_teacher(teacher: EntityId) -> Mutation {
    Mutation {
        kind: MutationKind::Teacher(Op::Delete),
        request: BackendRequest::delete(format!("/teachers/{}", teacher)),
    }
}

pub fn update_teacher_basic_info(teacher: EntityId, patch: &TeacherBasicInfoPatch) -> Mutation {
    Mutation {
        kind: MutationKind::TeacherBasicInfo { teacher },
        request: BackendRequest::with_body(
            Method::Patch,
            format!("/teachers/{}/basic-info", teacher),
            body_of(patch),
        ),
    }
}

pub fn bulk_import_teachers(input: &BulkImportInput) -> Mutation {
    Mutation {
        kind: MutationKind::TeacherBulkImport,
        request: BackendRequest::with_body(Method::Post, "/teachers/bulk", body_of(input)),
    }
}

// ---- classrooms and subjects ----

pub fn create_classroom(input: &ClassroomInput) -> Mutation {
    Mutation {
        kind: MutationKind::Classroom(Op::Create),
        request: BackendRequest::with_body(Method::Post, "/classrooms", body_of(input)),
    }
}

pub fn update_classroom(classroom: EntityId, input: &ClassroomInput) -> Mutation {
    Mutation {
        kind: MutationKind::Classroom(Op::Update),
        request: BackendRequest::with_body(
            Method::Put,
            format!("/classrooms/{}", classroom),
            body_of(input),
        ),
    }
}

pub fn delete_classroom(classroom: EntityId) -> Mutation {
    Mutation {
        kind: MutationKind::Classroom(Op::Delete),
        request: BackendRequest::delete(format!("/classrooms/{}", classroom)),
    }
}

pub fn create_subject(input: &SubjectInput) -> Mutation {
    Mutation {
        kind: MutationKind::Subject(Op::Create),
        request: BackendRequest::with_body(Method::Post, "/subjects", body_of(input)),
    }
}

pub fn update_subject(subject: EntityId, input: &SubjectInput) -> Mutation {
    Mutation {
        kind: MutationKind::Subject(Op::Update),
        request: BackendRequest::with_body(
            Method::Put,
            format!("/subjects/{}", subject),
            body_of(input),
        ),
    }
}

pub fn delete_subject(subject: EntityId) -> Mutation {
    Mutation {
        kind: MutationKind::Subject(Op::Delete),
        request: BackendRequest::delete(format!("/subjects/{}", subject)),
    }
}

// ---- assignments ----

pub fn assign_tutor(input: &TutorLinkInput, institution: EntityId) -> Mutation {
    Mutation {
        kind: MutationKind::TutorLink {
            op: Op::Create,
            teacher: Some(input.teacher_id),
            institution,
        },
        request: BackendRequest::with_body(Method::Post, "/tutor-assignments", body_of(input)),
    }
}

/// Hands a tutor link to `input.teacher_id`. The plan narrows to the new
/// tutor only when the previous one is known and refreshed separately.
pub fn reassign_tutor(
    link: EntityId,
    input: &ReassignInput,
    previous: Option<EntityId>,
    institution: EntityId,
) -> Mutation {
    Mutation {
        kind: MutationKind::TutorLink {
            op: Op::Update,
            teacher: previous.map(|_| input.teacher_id),
            institution,
        },
        request: BackendRequest::with_body(
            Method::Put,
            format!("/tutor-assignments/{}", link),
            body_of(input),
        ),
    }
}

pub fn remove_tutor(link: EntityId, teacher: EntityId, institution: EntityId) -> Mutation {
    Mutation {
        kind: MutationKind::TutorLink {
            op: Op::Delete,
            teacher: Some(teacher),
            institution,
        },
        request: BackendRequest::delete(format!("/tutor-assignments/{}", link)),
    }
}

pub fn assign_teaching(input: &TeachingLinkInput, institution: EntityId) -> Mutation {
    Mutation {
        kind: MutationKind::TeachingLink {
            op: Op::Create,
            teacher: Some(input.teacher_id),
            institution,
        },
        request: BackendRequest::with_body(Method::Post, "/teaching-assignments", body_of(input)),
    }
}

/// Same narrowing rule as [`reassign_tutor`].
pub fn reassign_teaching(
    link: EntityId,
    input: &ReassignInput,
    previous: Option<EntityId>,
    institution: EntityId,
) -> Mutation {
    Mutation {
        kind: MutationKind::TeachingLink {
            op: Op::Update,
            teacher: previous.map(|_| input.teacher_id),
            institution,
        },
        request: BackendRequest::with_body(
            Method::Put,
            format!("/teaching-assignments/{}", link),
            body_of(input),
        ),
    }
}

pub fn remove_teaching(
    link: EntityId,
    teacher: Option<EntityId>,
    institution: EntityId,
) -> Mutation {
    Mutation {
        kind: MutationKind::TeachingLink {
            op: Op::Delete,
            teacher,
            institution,
        },
        request: BackendRequest::delete(format!("/teaching-assignments/{}", link)),
    }
}

// ---- students ----

pub fn register_student(input: &StudentInput) -> Mutation {
    Mutation {
        kind: MutationKind::StudentRegistration,
        request: BackendRequest::with_body(Method::Post, "/students", body_of(input)),
    }
}
