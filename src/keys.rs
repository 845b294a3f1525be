use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::json;
use std::fmt;

pub const TEACHERS: &str = "teachers";
pub const TEACHERS_SEARCH: &str = "teachers-search";
pub const TEACHER_DETAILS: &str = "teacher-details";
pub const TEACHER_BASIC_INFO: &str = "teacher-basic-info";
pub const TEACHER_CLASSES: &str = "teacher-classes";
pub const COURSE_SUBJECTS: &str = "course-subjects";
pub const CLASSROOMS: &str = "classrooms";
pub const SUBJECTS: &str = "subjects";
pub const STUDENTS: &str = "students";

/// Accepts JSON numbers and numeric strings; `"42"` and `42` are the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(i64);

impl EntityId {
    pub fn new(v: i64) -> Self {
        EntityId(v)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub fn from_json(v: &serde_json::Value) -> Option<Self> {
        match v {
            serde_json::Value::Number(n) => n.as_i64().map(EntityId),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok().map(EntityId),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        EntityId::from_json(&raw)
            .ok_or_else(|| D::Error::custom(format!("expected an integer id, got {}", raw)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Name(String),
    Id(EntityId),
    /// Sorted `(name, value)` pairs so that parameter order never splits a key.
    Params(Vec<(String, String)>),
}

impl KeyPart {
    fn to_json(&self) -> serde_json::Value {
        match self {
            KeyPart::Name(n) => json!(n),
            KeyPart::Id(id) => json!(id.get()),
            KeyPart::Params(pairs) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in pairs {
                    obj.insert(k.clone(), json!(v));
                }
                serde_json::Value::Object(obj)
            }
        }
    }

    fn from_json(v: &serde_json::Value) -> Option<Self> {
        match v {
            serde_json::Value::Number(_) => EntityId::from_json(v).map(KeyPart::Id),
            serde_json::Value::String(s) => match EntityId::from_json(v) {
                Some(id) => Some(KeyPart::Id(id)),
                None if !s.trim().is_empty() => Some(KeyPart::Name(s.trim().to_string())),
                None => None,
            },
            serde_json::Value::Object(obj) => {
                let pairs = obj
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| {
                        let text = match v {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), text)
                    })
                    .collect();
                Some(KeyPart::params(pairs))
            }
            _ => None,
        }
    }

    pub fn params(mut pairs: Vec<(String, String)>) -> Self {
        pairs.sort();
        KeyPart::Params(pairs)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Name(n) => write!(f, "{}", n),
            KeyPart::Id(id) => write!(f, "{}", id),
            KeyPart::Params(pairs) => {
                let inner = pairs
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(",");
                write!(f, "{{{}}}", inner)
            }
        }
    }
}

/// Composite cache key. Invalidation matches whole leading segments, so
/// `teachers` covers every `teachers:list:{..}` entry but not `teachers-search`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    pub fn new(resource: &str) -> Self {
        QueryKey(vec![KeyPart::Name(resource.to_string())])
    }

    pub fn name(mut self, part: &str) -> Self {
        self.0.push(KeyPart::Name(part.to_string()));
        self
    }

    pub fn id(mut self, id: EntityId) -> Self {
        self.0.push(KeyPart::Id(id));
        self
    }

    pub fn params(mut self, pairs: Vec<(String, String)>) -> Self {
        self.0.push(KeyPart::params(pairs));
        self
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0.iter().zip(prefix.0.iter()).all(|(a, b)| a == b)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.0.iter().map(KeyPart::to_json).collect())
    }

    /// Accepts `["teacher-details", 42]`, `["teacher-details", "42"]` or the
    /// single string form `"teacher-details:42"`.
    pub fn from_json(v: &serde_json::Value) -> Option<Self> {
        let parts = match v {
            serde_json::Value::Array(items) => items
                .iter()
                .map(KeyPart::from_json)
                .collect::<Option<Vec<_>>>()?,
            serde_json::Value::String(s) => s
                .split(':')
                .map(|p| KeyPart::from_json(&json!(p)))
                .collect::<Option<Vec<_>>>()?,
            _ => return None,
        };
        if parts.is_empty() {
            return None;
        }
        Some(QueryKey(parts))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(":");
        write!(f, "{}", joined)
    }
}

impl Serialize for QueryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

pub fn teachers() -> QueryKey {
    QueryKey::new(TEACHERS)
}

pub fn teachers_list(page: u32, limit: u32, search: Option<&str>) -> QueryKey {
    teachers().name("list").params(list_pairs(page, limit, search))
}

pub fn teachers_search(term: Option<&str>) -> QueryKey {
    let key = QueryKey::new(TEACHERS_SEARCH);
    match term {
        Some(t) => key.params(vec![("q".to_string(), t.to_string())]),
        None => key,
    }
}

pub fn teacher_details(teacher: Option<EntityId>) -> QueryKey {
    let key = QueryKey::new(TEACHER_DETAILS);
    match teacher {
        Some(id) => key.id(id),
        None => key,
    }
}

pub fn teacher_basic_info(teacher: EntityId) -> QueryKey {
    QueryKey::new(TEACHER_BASIC_INFO).id(teacher)
}

pub fn teacher_classes(institution: Option<EntityId>) -> QueryKey {
    let key = QueryKey::new(TEACHER_CLASSES);
    match institution {
        Some(id) => key.id(id),
        None => key,
    }
}

pub fn course_subjects(institution: Option<EntityId>) -> QueryKey {
    let key = QueryKey::new(COURSE_SUBJECTS);
    match institution {
        Some(id) => key.id(id),
        None => key,
    }
}

pub fn classrooms() -> QueryKey {
    QueryKey::new(CLASSROOMS)
}

pub fn classrooms_list(page: u32, limit: u32, search: Option<&str>) -> QueryKey {
    classrooms().name("list").params(list_pairs(page, limit, search))
}

/// Nested under `classrooms` so classroom writes refresh open detail views too.
pub fn classroom_details(classroom: EntityId) -> QueryKey {
    classrooms().name("detail").id(classroom)
}

pub fn subjects() -> QueryKey {
    QueryKey::new(SUBJECTS)
}

pub fn subjects_list(page: u32, limit: u32, search: Option<&str>) -> QueryKey {
    subjects().name("list").params(list_pairs(page, limit, search))
}

pub fn subject_details(subject: EntityId) -> QueryKey {
    subjects().name("detail").id(subject)
}

pub fn students() -> QueryKey {
    QueryKey::new(STUDENTS)
}

pub fn students_list(page: u32, limit: u32, search: Option<&str>) -> QueryKey {
    students().name("list").params(list_pairs(page, limit, search))
}

fn list_pairs(page: u32, limit: u32, search: Option<&str>) -> Vec<(String, String)> {
    let mut pairs = vec![
        ("page".to_string(), page.to_string()),
        ("limit".to_string(), limit.to_string()),
    ];
    if let Some(s) = search {
        pairs.push(("search".to_string(), s.to_string()));
    }
    pairs
}
