use std::collections::{BTreeMap, HashSet};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::keys::EntityId;
use crate::model::{
    BulkImportInput, ClassroomInput, ReassignInput, SubjectInput, TeacherBasicInfoPatch,
    TeacherInput, TeachingLinkInput, TutorLinkInput,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        // First message per field wins; it is the one the form shows.
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self.0)
    }

    fn finish<T: DeserializeOwned>(mut self, data: &serde_json::Value) -> Result<T, Self> {
        if !self.is_empty() {
            return Err(self);
        }
        serde_json::from_value(data.clone()).map_err(|e| {
            self.add("payload", e.to_string());
            self
        })
    }
}

pub fn require_text(data: &serde_json::Value, field: &str, errs: &mut ValidationErrors) {
    let present = data
        .get(field)
        .and_then(|v| v.as_str())
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    if !present {
        errs.add(field, "required");
    }
}

pub fn require_id(data: &serde_json::Value, field: &str, errs: &mut ValidationErrors) {
    match data.get(field) {
        None | Some(serde_json::Value::Null) => errs.add(field, "required"),
        Some(v) if EntityId::from_json(v).is_none() => errs.add(field, "must be a numeric id"),
        Some(_) => {}
    }
}

/// Optional field; when present it must look like `local@domain`.
pub fn check_email(data: &serde_json::Value, field: &str, errs: &mut ValidationErrors) {
    let Some(raw) = data.get(field).and_then(|v| v.as_str()) else {
        return;
    };
    let email = raw.trim();
    if email.is_empty() {
        return;
    }
    let mut parts = email.split('@');
    let valid = matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
    );
    if !valid {
        errs.add(field, "invalid email address");
    }
}

fn non_blank_if_present(data: &serde_json::Value, field: &str, errs: &mut ValidationErrors) {
    if let Some(v) = data.get(field) {
        if !v.is_null() && v.as_str().map(|s| s.trim().is_empty()).unwrap_or(true) {
            errs.add(field, "must not be empty");
        }
    }
}

fn teacher_errors(data: &serde_json::Value, prefix: &str, errs: &mut ValidationErrors) {
    let mut local = ValidationErrors::default();
    require_text(data, "first_name", &mut local);
    require_text(data, "last_name", &mut local);
    require_text(data, "cedula", &mut local);
    check_email(data, "email", &mut local);
    for (field, message) in local.0 {
        errs.add(format!("{}{}", prefix, field), message);
    }
}

pub fn teacher(data: &serde_json::Value) -> Result<TeacherInput, ValidationErrors> {
    let mut errs = ValidationErrors::default();
    teacher_errors(data, "", &mut errs);
    errs.finish(data)
}

pub fn teacher_basic_info(
    data: &serde_json::Value,
) -> Result<TeacherBasicInfoPatch, ValidationErrors> {
    let mut errs = ValidationErrors::default();
    non_blank_if_present(data, "first_name", &mut errs);
    non_blank_if_present(data, "last_name", &mut errs);
    check_email(data, "email", &mut errs);
    errs.finish(data)
}

pub fn bulk_import(data: &serde_json::Value) -> Result<BulkImportInput, ValidationErrors> {
    let mut errs = ValidationErrors::default();
    let rows = data
        .get("teachers")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    if rows.is_empty() {
        errs.add("teachers", "at least one teacher is required");
    }
    let mut seen = HashSet::new();
    for (i, row) in rows.iter().enumerate() {
        let prefix = format!("teachers[{}].", i);
        teacher_errors(row, &prefix, &mut errs);
        if let Some(cedula) = row.get("cedula").and_then(|v| v.as_str()) {
            let cedula = cedula.trim();
            if !cedula.is_empty() && !seen.insert(cedula.to_string()) {
                errs.add(format!("{}cedula", prefix), "duplicated in this file");
            }
        }
    }
    errs.finish(data)
}

pub fn classroom(data: &serde_json::Value) -> Result<ClassroomInput, ValidationErrors> {
    let mut errs = ValidationErrors::default();
    require_text(data, "name", &mut errs);
    require_text(data, "grade", &mut errs);
    require_text(data, "section", &mut errs);
    if let Some(capacity) = data.get("capacity").filter(|v| !v.is_null()) {
        if !capacity.as_i64().map(|c| c > 0).unwrap_or(false) {
            errs.add("capacity", "must be a positive number");
        }
    }
    errs.finish(data)
}

pub fn subject(data: &serde_json::Value) -> Result<SubjectInput, ValidationErrors> {
    let mut errs = ValidationErrors::default();
    require_text(data, "name", &mut errs);
    require_text(data, "code", &mut errs);
    errs.finish(data)
}

pub fn tutor_link(data: &serde_json::Value) -> Result<TutorLinkInput, ValidationErrors> {
    let mut errs = ValidationErrors::default();
    require_id(data, "teacher_id", &mut errs);
    require_id(data, "classroom_id", &mut errs);
    errs.finish(data)
}

pub fn teaching_link(data: &serde_json::Value) -> Result<TeachingLinkInput, ValidationErrors> {
    let mut errs = ValidationErrors::default();
    require_id(data, "teacher_id", &mut errs);
    require_id(data, "classroom_id", &mut errs);
    match data.get("subject_ids").and_then(|v| v.as_array()) {
        Some(ids) if !ids.is_empty() => {
            let mut seen = HashSet::new();
            for raw in ids {
                match EntityId::from_json(raw) {
                    Some(id) => {
                        if !seen.insert(id) {
                            errs.add("subject_ids", format!("subject {} selected twice", id));
                        }
                    }
                    None => errs.add("subject_ids", "must contain numeric ids"),
                }
            }
        }
        _ => errs.add("subject_ids", "select at least one subject"),
    }
    errs.finish(data)
}

pub fn reassign(data: &serde_json::Value) -> Result<ReassignInput, ValidationErrors> {
    let mut errs = ValidationErrors::default();
    require_id(data, "teacher_id", &mut errs);
    errs.finish(data)
}
