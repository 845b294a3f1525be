use crate::keys::EntityId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        ListParams {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            search: None,
        }
    }
}

impl ListParams {
    /// Lenient parse: numbers or numeric strings, clamped into range. Blank
    /// searches collapse to `None` so they share a cache entry with no search.
    pub fn from_json(params: &serde_json::Value) -> Self {
        let number = |key: &str| -> Option<u32> {
            match params.get(key)? {
                serde_json::Value::Number(n) => n.as_u64().map(|v| v.min(u32::MAX as u64) as u32),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
        };
        let search = params
            .get("search")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        ListParams {
            page: number("page").unwrap_or(1).max(1),
            limit: number("limit")
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            search,
        }
    }

    pub fn from_query(query: &[(String, String)]) -> Self {
        let mut obj = serde_json::Map::new();
        for (k, v) in query {
            obj.insert(k.clone(), serde_json::Value::String(v.clone()));
        }
        ListParams::from_json(&serde_json::Value::Object(obj))
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherInput {
    pub first_name: String,
    pub last_name: String,
    pub cedula: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub institution_id: Option<EntityId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeacherBasicInfoPatch {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkImportInput {
    pub teachers: Vec<TeacherInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassroomInput {
    pub name: String,
    pub grade: String,
    pub section: String,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub institution_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectInput {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub institution_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorLinkInput {
    pub teacher_id: EntityId,
    pub classroom_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeachingLinkInput {
    pub teacher_id: EntityId,
    pub classroom_id: EntityId,
    pub subject_ids: Vec<EntityId>,
}

/// Body of `PUT /tutor-assignments/:id` and `PUT /teaching-assignments/:id`:
/// hands the link over to another teacher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReassignInput {
    pub teacher_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentInput {
    pub first_name: String,
    pub last_name: String,
    pub document_id: String,
    pub birth_date: chrono::NaiveDate,
    pub guardian_name: String,
    pub guardian_phone: String,
    pub guardian_relationship: String,
    #[serde(default)]
    pub guardian_email: Option<String>,
    pub classroom_id: EntityId,
    #[serde(default)]
    pub institution_id: Option<EntityId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_params_clamp_and_normalize() {
        let p = ListParams::from_json(&json!({ "page": "0", "limit": 500, "search": "  " }));
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, MAX_PAGE_SIZE);
        assert_eq!(p.search, None);

        let q = ListParams::from_query(&[
            ("page".to_string(), "3".to_string()),
            ("search".to_string(), "ana".to_string()),
        ]);
        assert_eq!(q.page, 3);
        assert_eq!(q.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(q.offset(), 20);
        assert_eq!(q.search.as_deref(), Some("ana"));
    }

    #[test]
    fn student_input_parses_iso_birth_date() {
        let input: StudentInput = serde_json::from_value(json!({
            "first_name": "Lucia",
            "last_name": "Mora",
            "document_id": "0912345678",
            "birth_date": "2015-04-09",
            "guardian_name": "Rosa Mora",
            "guardian_phone": "0999999999",
            "guardian_relationship": "mother",
            "classroom_id": "3"
        }))
        .expect("student input");
        assert_eq!(input.classroom_id, EntityId::new(3));
        assert_eq!(input.birth_date.to_string(), "2015-04-09");
    }
}
