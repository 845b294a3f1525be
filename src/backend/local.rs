use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{Backend, BackendError, BackendRequest, Envelope, Method};
use crate::db;
use crate::keys::EntityId;
use crate::model::{
    BulkImportInput, ClassroomInput, ListParams, ReassignInput, StudentInput, SubjectInput,
    TeacherBasicInfoPatch, TeacherInput, TeachingLinkInput, TutorLinkInput,
};

type LocalResult<T> = Result<T, BackendError>;

const SEARCH_LIMIT: i64 = 20;

const TEACHER_COLUMNS: &str = "id, institution_id, first_name, last_name, cedula, email, phone, specialty, active, created_at, updated_at";
const CLASSROOM_COLUMNS: &str =
    "id, institution_id, name, grade, section, capacity, active, created_at, updated_at";
const SUBJECT_COLUMNS: &str =
    "id, institution_id, name, code, description, active, created_at, updated_at";
const STUDENT_COLUMNS: &str = "id, institution_id, first_name, last_name, document_id, birth_date, guardian_name, guardian_phone, guardian_relationship, guardian_email, classroom_id, active, created_at";

pub struct LocalBackend {
    conn: Connection,
    institution: EntityId,
}

impl LocalBackend {
    pub fn open(workspace: &Path, institution: EntityId) -> anyhow::Result<Self> {
        let conn = db::open_db(workspace)?;
        Ok(LocalBackend { conn, institution })
    }
}

impl Backend for LocalBackend {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn send(&self, req: &BackendRequest) -> Result<Envelope, BackendError> {
        debug!(method = req.method.as_str(), path = %req.path, "local backend request");
        let segments: Vec<&str> = req
            .path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match (req.method, segments.as_slice()) {
            (Method::Get, ["teachers"]) => self.list_teachers(req),
            (Method::Post, ["teachers"]) => self.create_teacher(body(req)?),
            (Method::Get, ["teachers", "search"]) => self.search_teachers(req),
            (Method::Post, ["teachers", "bulk"]) => self.bulk_import_teachers(body(req)?),
            (Method::Get, ["teachers", id]) => self.teacher_details(parse_id(id)?),
            (Method::Put, ["teachers", id]) => self.update_teacher(parse_id(id)?, body(req)?),
            (Method::Delete, ["teachers", id]) => self.deactivate_teacher(parse_id(id)?),
            (Method::Get, ["teachers", id, "basic-info"]) => {
                self.teacher_basic_info(parse_id(id)?)
            }
            (Method::Patch, ["teachers", id, "basic-info"]) => {
                self.patch_teacher_basic_info(parse_id(id)?, body(req)?)
            }

            (Method::Get, ["classrooms"]) => self.list_classrooms(req),
            (Method::Post, ["classrooms"]) => self.create_classroom(body(req)?),
            (Method::Get, ["classrooms", id]) => self.classroom_details(parse_id(id)?),
            (Method::Put, ["classrooms", id]) => self.update_classroom(parse_id(id)?, body(req)?),
            (Method::Delete, ["classrooms", id]) => self.deactivate_classroom(parse_id(id)?),

            (Method::Get, ["subjects"]) => self.list_subjects(req),
            (Method::Post, ["subjects"]) => self.create_subject(body(req)?),
            (Method::Get, ["subjects", id]) => self.subject_details(parse_id(id)?),
            (Method::Put, ["subjects", id]) => self.update_subject(parse_id(id)?, body(req)?),
            (Method::Delete, ["subjects", id]) => self.deactivate_subject(parse_id(id)?),

            (Method::Post, ["tutor-assignments"]) => self.assign_tutor(body(req)?),
            (Method::Put, ["tutor-assignments", id]) => {
                self.reassign_tutor(parse_id(id)?, body(req)?)
            }
            (Method::Delete, ["tutor-assignments", id]) => {
                self.deactivate_link("tutor_assignments", parse_id(id)?)
            }

            (Method::Post, ["teaching-assignments"]) => self.assign_teaching(body(req)?),
            (Method::Put, ["teaching-assignments", id]) => {
                self.reassign_teaching(parse_id(id)?, body(req)?)
            }
            (Method::Delete, ["teaching-assignments", id]) => {
                self.deactivate_link("teaching_assignments", parse_id(id)?)
            }

            (Method::Get, ["institutions", id, "teacher-classes"]) => {
                self.teacher_classes(parse_id(id)?)
            }
            (Method::Get, ["institutions", id, "course-subjects"]) => {
                self.course_subjects(parse_id(id)?)
            }

            (Method::Get, ["students"]) => self.list_students(req),
            (Method::Post, ["students"]) => self.register_student(body(req)?),

            _ => Err(BackendError::status(
                404,
                &format!("no route for {} {}", req.method.as_str(), req.path),
                "NOT_FOUND",
            )),
        }
    }
}

// ---- teachers ----

impl LocalBackend {
    fn list_teachers(&self, req: &BackendRequest) -> LocalResult<Envelope> {
        let p = ListParams::from_query(&req.query);
        let pattern = like_pattern(&p.search);
        let filter = "active = 1 AND (?1 IS NULL OR first_name LIKE ?1 OR last_name LIKE ?1 OR cedula LIKE ?1)";

        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM teachers WHERE {}", filter),
                params![pattern],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM teachers WHERE {} ORDER BY last_name, first_name, id LIMIT ?2 OFFSET ?3",
                TEACHER_COLUMNS, filter
            ))
            .map_err(db_err)?;
        let items = stmt
            .query_map(params![pattern, p.limit, p.offset()], teacher_json)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err)?;
        Ok(paginated(items, total, &p))
    }

    fn search_teachers(&self, req: &BackendRequest) -> LocalResult<Envelope> {
        let term = req
            .query_param("q")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let pattern = like_pattern(&term);
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM teachers
                 WHERE active = 1 AND (?1 IS NULL OR first_name LIKE ?1 OR last_name LIKE ?1 OR cedula LIKE ?1)
                 ORDER BY last_name, first_name, id
                 LIMIT ?2",
                TEACHER_COLUMNS
            ))
            .map_err(db_err)?;
        let items = stmt
            .query_map(params![pattern, SEARCH_LIMIT], teacher_json)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err)?;
        Ok(Envelope::ok(json!({ "items": items })))
    }

    fn create_teacher(&self, input: TeacherInput) -> LocalResult<Envelope> {
        let id = insert_teacher(&self.conn, &input, self.institution)?;
        let teacher = load_teacher(&self.conn, id)?;
        Ok(Envelope::ok_with_message(Some(teacher), "Teacher created"))
    }

    fn bulk_import_teachers(&self, input: BulkImportInput) -> LocalResult<Envelope> {
        if input.teachers.is_empty() {
            return Err(BackendError::status(
                400,
                "no teachers to import",
                "VALIDATION_ERROR",
            ));
        }
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        let mut ids = Vec::with_capacity(input.teachers.len());
        for (row, teacher) in input.teachers.iter().enumerate() {
            match insert_teacher(&tx, teacher, self.institution) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    let _ = tx.rollback();
                    return Err(prefix_row_error(e, row + 1));
                }
            }
        }
        tx.commit().map_err(db_err)?;
        let count = ids.len();
        Ok(Envelope::ok_with_message(
            Some(json!({ "imported": count, "ids": ids })),
            format!("{} teachers imported", count),
        ))
    }

    fn teacher_details(&self, id: i64) -> LocalResult<Envelope> {
        let mut teacher = load_teacher(&self.conn, id)?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT ta.id, ta.classroom_id, c.name, c.grade, c.section
                 FROM tutor_assignments ta
                 JOIN classrooms c ON c.id = ta.classroom_id
                 WHERE ta.teacher_id = ? AND ta.active = 1
                 ORDER BY c.name, ta.id",
            )
            .map_err(db_err)?;
        let tutor_of = stmt
            .query_map([id], |r| {
                Ok(json!({
                    "assignment_id": r.get::<_, i64>(0)?,
                    "classroom_id": r.get::<_, i64>(1)?,
                    "classroom_name": r.get::<_, String>(2)?,
                    "grade": r.get::<_, String>(3)?,
                    "section": r.get::<_, String>(4)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err)?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT ta.id, ta.classroom_id, c.name, ta.subject_id, s.name
                 FROM teaching_assignments ta
                 JOIN classrooms c ON c.id = ta.classroom_id
                 JOIN subjects s ON s.id = ta.subject_id
                 WHERE ta.teacher_id = ? AND ta.active = 1
                 ORDER BY c.name, s.name, ta.id",
            )
            .map_err(db_err)?;
        let teaching = stmt
            .query_map([id], |r| {
                Ok(json!({
                    "assignment_id": r.get::<_, i64>(0)?,
                    "classroom_id": r.get::<_, i64>(1)?,
                    "classroom_name": r.get::<_, String>(2)?,
                    "subject_id": r.get::<_, i64>(3)?,
                    "subject_name": r.get::<_, String>(4)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err)?;

        teacher["tutor_of"] = json!(tutor_of);
        teacher["teaching"] = json!(teaching);
        Ok(Envelope::ok(teacher))
    }

    fn update_teacher(&self, id: i64, input: TeacherInput) -> LocalResult<Envelope> {
        load_teacher(&self.conn, id)?;
        let first_name = required("first_name", &input.first_name)?;
        let last_name = required("last_name", &input.last_name)?;
        let cedula = required("cedula", &input.cedula)?;
        ensure_cedula_free(&self.conn, &cedula, Some(id))?;

        self.conn
            .execute(
                "UPDATE teachers
                 SET first_name = ?, last_name = ?, cedula = ?, email = ?, phone = ?, specialty = ?, updated_at = ?
                 WHERE id = ?",
                params![
                    first_name,
                    last_name,
                    cedula,
                    trimmed(&input.email),
                    trimmed(&input.phone),
                    trimmed(&input.specialty),
                    now(),
                    id
                ],
            )
            .map_err(db_err)?;
        let teacher = load_teacher(&self.conn, id)?;
        Ok(Envelope::ok_with_message(Some(teacher), "Teacher updated"))
    }

    fn teacher_basic_info(&self, id: i64) -> LocalResult<Envelope> {
        let teacher = load_teacher(&self.conn, id)?;
        Ok(Envelope::ok(basic_info_of(&teacher)))
    }

    fn patch_teacher_basic_info(
        &self,
        id: i64,
        patch: TeacherBasicInfoPatch,
    ) -> LocalResult<Envelope> {
        load_teacher(&self.conn, id)?;
        let first_name = patch
            .first_name
            .as_deref()
            .map(|v| required("first_name", v))
            .transpose()?;
        let last_name = patch
            .last_name
            .as_deref()
            .map(|v| required("last_name", v))
            .transpose()?;

        self.conn
            .execute(
                "UPDATE teachers
                 SET first_name = COALESCE(?, first_name),
                     last_name = COALESCE(?, last_name),
                     email = COALESCE(?, email),
                     phone = COALESCE(?, phone),
                     specialty = COALESCE(?, specialty),
                     updated_at = ?
                 WHERE id = ?",
                params![
                    first_name,
                    last_name,
                    trimmed(&patch.email),
                    trimmed(&patch.phone),
                    trimmed(&patch.specialty),
                    now(),
                    id
                ],
            )
            .map_err(db_err)?;
        let teacher = load_teacher(&self.conn, id)?;
        Ok(Envelope::ok_with_message(
            Some(basic_info_of(&teacher)),
            "Basic information updated",
        ))
    }

    fn deactivate_teacher(&self, id: i64) -> LocalResult<Envelope> {
        load_teacher(&self.conn, id)?;
        let links: i64 = self
            .conn
            .query_row(
                "SELECT
                   (SELECT COUNT(*) FROM tutor_assignments WHERE teacher_id = ?1 AND active = 1)
                 + (SELECT COUNT(*) FROM teaching_assignments WHERE teacher_id = ?1 AND active = 1)",
                [id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        if links > 0 {
            return Err(BackendError::status(
                409,
                "teacher still has active classroom assignments",
                "RESOURCE_IN_USE",
            ));
        }
        self.conn
            .execute(
                "UPDATE teachers SET active = 0, updated_at = ? WHERE id = ?",
                params![now(), id],
            )
            .map_err(db_err)?;
        Ok(Envelope::ok_with_message(None, "Teacher deactivated"))
    }
}

// ---- classrooms ----

impl LocalBackend {
    fn list_classrooms(&self, req: &BackendRequest) -> LocalResult<Envelope> {
        let p = ListParams::from_query(&req.query);
        let pattern = like_pattern(&p.search);
        let filter =
            "active = 1 AND (?1 IS NULL OR name LIKE ?1 OR grade LIKE ?1 OR section LIKE ?1)";

        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM classrooms WHERE {}", filter),
                params![pattern],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM classrooms WHERE {} ORDER BY grade, section, name, id LIMIT ?2 OFFSET ?3",
                CLASSROOM_COLUMNS, filter
            ))
            .map_err(db_err)?;
        let items = stmt
            .query_map(params![pattern, p.limit, p.offset()], classroom_json)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err)?;
        Ok(paginated(items, total, &p))
    }

    fn classroom_details(&self, id: i64) -> LocalResult<Envelope> {
        let mut classroom = load_classroom(&self.conn, id)?;
        let tutor = self
            .conn
            .query_row(
                "SELECT ta.id, t.id, t.first_name, t.last_name
                 FROM tutor_assignments ta
                 JOIN teachers t ON t.id = ta.teacher_id
                 WHERE ta.classroom_id = ? AND ta.active = 1",
                [id],
                |r| {
                    Ok(json!({
                        "assignment_id": r.get::<_, i64>(0)?,
                        "teacher_id": r.get::<_, i64>(1)?,
                        "teacher_name": format!("{} {}", r.get::<_, String>(2)?, r.get::<_, String>(3)?),
                    }))
                },
            )
            .optional()
            .map_err(db_err)?;
        let student_count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM students WHERE classroom_id = ? AND active = 1",
                [id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        classroom["tutor"] = tutor.unwrap_or(serde_json::Value::Null);
        classroom["student_count"] = json!(student_count);
        Ok(Envelope::ok(classroom))
    }

    fn create_classroom(&self, input: ClassroomInput) -> LocalResult<Envelope> {
        let (name, grade, section) = classroom_fields(&input)?;
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO classrooms(institution_id, name, grade, section, capacity, active, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, 1, ?, ?)",
                params![
                    input.institution_id.unwrap_or(self.institution).get(),
                    name,
                    grade,
                    section,
                    input.capacity,
                    ts,
                    ts
                ],
            )
            .map_err(db_err)?;
        let classroom = load_classroom(&self.conn, self.conn.last_insert_rowid())?;
        Ok(Envelope::ok_with_message(Some(classroom), "Classroom created"))
    }

    fn update_classroom(&self, id: i64, input: ClassroomInput) -> LocalResult<Envelope> {
        load_classroom(&self.conn, id)?;
        let (name, grade, section) = classroom_fields(&input)?;
        self.conn
            .execute(
                "UPDATE classrooms SET name = ?, grade = ?, section = ?, capacity = ?, updated_at = ? WHERE id = ?",
                params![name, grade, section, input.capacity, now(), id],
            )
            .map_err(db_err)?;
        let classroom = load_classroom(&self.conn, id)?;
        Ok(Envelope::ok_with_message(Some(classroom), "Classroom updated"))
    }

    fn deactivate_classroom(&self, id: i64) -> LocalResult<Envelope> {
        load_classroom(&self.conn, id)?;
        let students: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM students WHERE classroom_id = ? AND active = 1",
                [id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        if students > 0 {
            return Err(BackendError::status(
                409,
                "classroom still has enrolled students",
                "RESOURCE_IN_USE",
            ));
        }

        let ts = now();
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        // Links die with the classroom so teacher details stop listing it.
        for sql in [
            "UPDATE tutor_assignments SET active = 0, updated_at = ?1 WHERE classroom_id = ?2 AND active = 1",
            "UPDATE teaching_assignments SET active = 0, updated_at = ?1 WHERE classroom_id = ?2 AND active = 1",
            "UPDATE classrooms SET active = 0, updated_at = ?1 WHERE id = ?2",
        ] {
            if let Err(e) = tx.execute(sql, params![ts, id]) {
                let _ = tx.rollback();
                return Err(db_err(e));
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(Envelope::ok_with_message(None, "Classroom deactivated"))
    }
}

// ---- subjects ----

impl LocalBackend {
    fn list_subjects(&self, req: &BackendRequest) -> LocalResult<Envelope> {
        let p = ListParams::from_query(&req.query);
        let pattern = like_pattern(&p.search);
        let filter = "active = 1 AND (?1 IS NULL OR name LIKE ?1 OR code LIKE ?1)";

        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM subjects WHERE {}", filter),
                params![pattern],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM subjects WHERE {} ORDER BY name, id LIMIT ?2 OFFSET ?3",
                SUBJECT_COLUMNS, filter
            ))
            .map_err(db_err)?;
        let items = stmt
            .query_map(params![pattern, p.limit, p.offset()], subject_json)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err)?;
        Ok(paginated(items, total, &p))
    }

    fn subject_details(&self, id: i64) -> LocalResult<Envelope> {
        Ok(Envelope::ok(load_subject(&self.conn, id)?))
    }

    fn create_subject(&self, input: SubjectInput) -> LocalResult<Envelope> {
        let name = required("name", &input.name)?;
        let code = required("code", &input.code)?;
        ensure_subject_code_free(&self.conn, &code, None)?;
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO subjects(institution_id, name, code, description, active, created_at, updated_at)
                 VALUES(?, ?, ?, ?, 1, ?, ?)",
                params![
                    input.institution_id.unwrap_or(self.institution).get(),
                    name,
                    code,
                    trimmed(&input.description),
                    ts,
                    ts
                ],
            )
            .map_err(db_err)?;
        let subject = load_subject(&self.conn, self.conn.last_insert_rowid())?;
        Ok(Envelope::ok_with_message(Some(subject), "Subject created"))
    }

    fn update_subject(&self, id: i64, input: SubjectInput) -> LocalResult<Envelope> {
        load_subject(&self.conn, id)?;
        let name = required("name", &input.name)?;
        let code = required("code", &input.code)?;
        ensure_subject_code_free(&self.conn, &code, Some(id))?;
        self.conn
            .execute(
                "UPDATE subjects SET name = ?, code = ?, description = ?, updated_at = ? WHERE id = ?",
                params![name, code, trimmed(&input.description), now(), id],
            )
            .map_err(db_err)?;
        let subject = load_subject(&self.conn, id)?;
        Ok(Envelope::ok_with_message(Some(subject), "Subject updated"))
    }

    fn deactivate_subject(&self, id: i64) -> LocalResult<Envelope> {
        load_subject(&self.conn, id)?;
        let links: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM teaching_assignments WHERE subject_id = ? AND active = 1",
                [id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        if links > 0 {
            return Err(BackendError::status(
                409,
                "subject is still taught in at least one classroom",
                "RESOURCE_IN_USE",
            ));
        }
        self.conn
            .execute(
                "UPDATE subjects SET active = 0, updated_at = ? WHERE id = ?",
                params![now(), id],
            )
            .map_err(db_err)?;
        Ok(Envelope::ok_with_message(None, "Subject deactivated"))
    }
}

// ---- assignments ----

impl LocalBackend {
    fn assign_tutor(&self, input: TutorLinkInput) -> LocalResult<Envelope> {
        load_teacher(&self.conn, input.teacher_id.get())?;
        load_classroom(&self.conn, input.classroom_id.get())?;
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM tutor_assignments WHERE classroom_id = ? AND active = 1",
                [input.classroom_id.get()],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if existing.is_some() {
            return Err(BackendError::status(
                409,
                "classroom already has a tutor",
                "CLASSROOM_HAS_TUTOR",
            ));
        }
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO tutor_assignments(teacher_id, classroom_id, active, created_at, updated_at)
                 VALUES(?, ?, 1, ?, ?)",
                params![input.teacher_id.get(), input.classroom_id.get(), ts, ts],
            )
            .map_err(db_err)?;
        let id = self.conn.last_insert_rowid();
        Ok(Envelope::ok_with_message(
            Some(json!({
                "id": id,
                "teacher_id": input.teacher_id,
                "classroom_id": input.classroom_id,
            })),
            "Tutor assigned",
        ))
    }

    fn reassign_tutor(&self, id: i64, input: ReassignInput) -> LocalResult<Envelope> {
        let classroom_id = load_link(&self.conn, "tutor_assignments", id)?;
        load_teacher(&self.conn, input.teacher_id.get())?;
        self.conn
            .execute(
                "UPDATE tutor_assignments SET teacher_id = ?, updated_at = ? WHERE id = ?",
                params![input.teacher_id.get(), now(), id],
            )
            .map_err(db_err)?;
        Ok(Envelope::ok_with_message(
            Some(json!({
                "id": id,
                "teacher_id": input.teacher_id,
                "classroom_id": classroom_id,
            })),
            "Tutor updated",
        ))
    }

    fn assign_teaching(&self, input: TeachingLinkInput) -> LocalResult<Envelope> {
        if input.subject_ids.is_empty() {
            return Err(BackendError::status(
                400,
                "select at least one subject",
                "VALIDATION_ERROR",
            ));
        }
        load_teacher(&self.conn, input.teacher_id.get())?;
        load_classroom(&self.conn, input.classroom_id.get())?;

        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        let mut ids = Vec::with_capacity(input.subject_ids.len());
        for subject in &input.subject_ids {
            let res = insert_teaching(&tx, &input, *subject);
            match res {
                Ok(id) => ids.push(id),
                Err(e) => {
                    let _ = tx.rollback();
                    return Err(e);
                }
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(Envelope::ok_with_message(
            Some(json!({
                "ids": ids,
                "teacher_id": input.teacher_id,
                "classroom_id": input.classroom_id,
            })),
            "Subjects assigned",
        ))
    }

    fn reassign_teaching(&self, id: i64, input: ReassignInput) -> LocalResult<Envelope> {
        let classroom_id = load_link(&self.conn, "teaching_assignments", id)?;
        load_teacher(&self.conn, input.teacher_id.get())?;
        self.conn
            .execute(
                "UPDATE teaching_assignments SET teacher_id = ?, updated_at = ? WHERE id = ?",
                params![input.teacher_id.get(), now(), id],
            )
            .map_err(db_err)?;
        Ok(Envelope::ok_with_message(
            Some(json!({
                "id": id,
                "teacher_id": input.teacher_id,
                "classroom_id": classroom_id,
            })),
            "Teaching assignment updated",
        ))
    }

    fn deactivate_link(&self, table: &str, id: i64) -> LocalResult<Envelope> {
        load_link(&self.conn, table, id)?;
        self.conn
            .execute(
                &format!(
                    "UPDATE {} SET active = 0, updated_at = ? WHERE id = ?",
                    table
                ),
                params![now(), id],
            )
            .map_err(db_err)?;
        Ok(Envelope::ok_with_message(None, "Assignment removed"))
    }

    fn teacher_classes(&self, institution: i64) -> LocalResult<Envelope> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT ta.id, t.id, t.first_name, t.last_name, c.id, c.name, c.grade, c.section
                 FROM tutor_assignments ta
                 JOIN teachers t ON t.id = ta.teacher_id
                 JOIN classrooms c ON c.id = ta.classroom_id
                 WHERE ta.active = 1 AND c.active = 1 AND c.institution_id = ?
                 ORDER BY c.grade, c.section, c.name",
            )
            .map_err(db_err)?;
        let items = stmt
            .query_map([institution], |r| {
                Ok(json!({
                    "assignment_id": r.get::<_, i64>(0)?,
                    "teacher_id": r.get::<_, i64>(1)?,
                    "teacher_name": format!("{} {}", r.get::<_, String>(2)?, r.get::<_, String>(3)?),
                    "classroom_id": r.get::<_, i64>(4)?,
                    "classroom_name": r.get::<_, String>(5)?,
                    "grade": r.get::<_, String>(6)?,
                    "section": r.get::<_, String>(7)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err)?;
        Ok(Envelope::ok(json!({ "items": items })))
    }

    fn course_subjects(&self, institution: i64) -> LocalResult<Envelope> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT ta.id, c.id, c.name, s.id, s.name, s.code, t.id, t.first_name, t.last_name
                 FROM teaching_assignments ta
                 JOIN classrooms c ON c.id = ta.classroom_id
                 JOIN subjects s ON s.id = ta.subject_id
                 JOIN teachers t ON t.id = ta.teacher_id
                 WHERE ta.active = 1 AND c.active = 1 AND c.institution_id = ?
                 ORDER BY c.name, s.name",
            )
            .map_err(db_err)?;
        let items = stmt
            .query_map([institution], |r| {
                Ok(json!({
                    "assignment_id": r.get::<_, i64>(0)?,
                    "classroom_id": r.get::<_, i64>(1)?,
                    "classroom_name": r.get::<_, String>(2)?,
                    "subject_id": r.get::<_, i64>(3)?,
                    "subject_name": r.get::<_, String>(4)?,
                    "subject_code": r.get::<_, String>(5)?,
                    "teacher_id": r.get::<_, i64>(6)?,
                    "teacher_name": format!("{} {}", r.get::<_, String>(7)?, r.get::<_, String>(8)?),
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err)?;
        Ok(Envelope::ok(json!({ "items": items })))
    }
}

// ---- students ----

impl LocalBackend {
    fn list_students(&self, req: &BackendRequest) -> LocalResult<Envelope> {
        let p = ListParams::from_query(&req.query);
        let pattern = like_pattern(&p.search);
        let filter = "active = 1 AND (?1 IS NULL OR first_name LIKE ?1 OR last_name LIKE ?1 OR document_id LIKE ?1)";

        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM students WHERE {}", filter),
                params![pattern],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM students WHERE {} ORDER BY last_name, first_name, id LIMIT ?2 OFFSET ?3",
                STUDENT_COLUMNS, filter
            ))
            .map_err(db_err)?;
        let items = stmt
            .query_map(params![pattern, p.limit, p.offset()], student_json)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err)?;
        Ok(paginated(items, total, &p))
    }

    fn register_student(&self, input: StudentInput) -> LocalResult<Envelope> {
        let first_name = required("first_name", &input.first_name)?;
        let last_name = required("last_name", &input.last_name)?;
        let document_id = required("document_id", &input.document_id)?;
        let guardian_name = required("guardian_name", &input.guardian_name)?;
        let guardian_phone = required("guardian_phone", &input.guardian_phone)?;
        let guardian_relationship =
            required("guardian_relationship", &input.guardian_relationship)?;

        let classroom = load_classroom(&self.conn, input.classroom_id.get())?;
        if let Some(capacity) = classroom.get("capacity").and_then(|v| v.as_i64()) {
            let enrolled: i64 = self
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM students WHERE classroom_id = ? AND active = 1",
                    [input.classroom_id.get()],
                    |r| r.get(0),
                )
                .map_err(db_err)?;
            if enrolled >= capacity {
                return Err(BackendError::status(
                    409,
                    "classroom is full",
                    "CLASSROOM_FULL",
                ));
            }
        }

        let taken: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM students WHERE document_id = ? AND active = 1",
                [&document_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if taken.is_some() {
            return Err(BackendError::status(
                409,
                "a student with this document is already registered",
                "DUPLICATE_DOCUMENT",
            ));
        }

        self.conn
            .execute(
                "INSERT INTO students(institution_id, first_name, last_name, document_id, birth_date,
                   guardian_name, guardian_phone, guardian_relationship, guardian_email, classroom_id,
                   active, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
                params![
                    input.institution_id.unwrap_or(self.institution).get(),
                    first_name,
                    last_name,
                    document_id,
                    input.birth_date.format("%Y-%m-%d").to_string(),
                    guardian_name,
                    guardian_phone,
                    guardian_relationship,
                    trimmed(&input.guardian_email),
                    input.classroom_id.get(),
                    now()
                ],
            )
            .map_err(db_err)?;
        let id = self.conn.last_insert_rowid();
        let student = self
            .conn
            .query_row(
                &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
                [id],
                student_json,
            )
            .map_err(db_err)?;
        Ok(Envelope::ok_with_message(Some(student), "Student registered"))
    }
}

// ---- row helpers ----

fn insert_teacher(
    conn: &Connection,
    input: &TeacherInput,
    default_institution: EntityId,
) -> LocalResult<i64> {
    let first_name = required("first_name", &input.first_name)?;
    let last_name = required("last_name", &input.last_name)?;
    let cedula = required("cedula", &input.cedula)?;
    ensure_cedula_free(conn, &cedula, None)?;

    let ts = now();
    conn.execute(
        "INSERT INTO teachers(institution_id, first_name, last_name, cedula, email, phone, specialty, active, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        params![
            input.institution_id.unwrap_or(default_institution).get(),
            first_name,
            last_name,
            cedula,
            trimmed(&input.email),
            trimmed(&input.phone),
            trimmed(&input.specialty),
            ts,
            ts
        ],
    )
    .map_err(db_err)?;
    Ok(conn.last_insert_rowid())
}

fn insert_teaching(
    conn: &Connection,
    input: &TeachingLinkInput,
    subject: EntityId,
) -> LocalResult<i64> {
    load_subject(conn, subject.get())?;
    let taken: Option<i64> = conn
        .query_row(
            "SELECT id FROM teaching_assignments WHERE classroom_id = ? AND subject_id = ? AND active = 1",
            [input.classroom_id.get(), subject.get()],
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err)?;
    if taken.is_some() {
        return Err(BackendError::status(
            409,
            &format!("subject {} is already assigned in this classroom", subject),
            "SUBJECT_ALREADY_ASSIGNED",
        ));
    }
    let ts = now();
    conn.execute(
        "INSERT INTO teaching_assignments(teacher_id, classroom_id, subject_id, active, created_at, updated_at)
         VALUES(?, ?, ?, 1, ?, ?)",
        params![
            input.teacher_id.get(),
            input.classroom_id.get(),
            subject.get(),
            ts,
            ts
        ],
    )
    .map_err(db_err)?;
    Ok(conn.last_insert_rowid())
}

fn ensure_cedula_free(conn: &Connection, cedula: &str, except: Option<i64>) -> LocalResult<()> {
    let taken: Option<i64> = conn
        .query_row(
            "SELECT id FROM teachers WHERE cedula = ? AND active = 1 AND (? IS NULL OR id <> ?)",
            params![cedula, except, except],
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err)?;
    if taken.is_some() {
        return Err(BackendError::Status {
            status: 409,
            body: Some(json!({
                "success": false,
                "error": "Cedula duplicada",
                "message": "A teacher with this cedula is already registered",
                "code": "DUPLICATE_CEDULA",
            })),
        });
    }
    Ok(())
}

fn ensure_subject_code_free(conn: &Connection, code: &str, except: Option<i64>) -> LocalResult<()> {
    let taken: Option<i64> = conn
        .query_row(
            "SELECT id FROM subjects WHERE code = ? AND active = 1 AND (? IS NULL OR id <> ?)",
            params![code, except, except],
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err)?;
    if taken.is_some() {
        return Err(BackendError::status(
            409,
            &format!("subject code {} is already in use", code),
            "DUPLICATE_CODE",
        ));
    }
    Ok(())
}

fn load_teacher(conn: &Connection, id: i64) -> LocalResult<serde_json::Value> {
    conn.query_row(
        &format!(
            "SELECT {} FROM teachers WHERE id = ? AND active = 1",
            TEACHER_COLUMNS
        ),
        [id],
        teacher_json,
    )
    .optional()
    .map_err(db_err)?
    .ok_or_else(|| BackendError::not_found("teacher"))
}

fn load_classroom(conn: &Connection, id: i64) -> LocalResult<serde_json::Value> {
    conn.query_row(
        &format!(
            "SELECT {} FROM classrooms WHERE id = ? AND active = 1",
            CLASSROOM_COLUMNS
        ),
        [id],
        classroom_json,
    )
    .optional()
    .map_err(db_err)?
    .ok_or_else(|| BackendError::not_found("classroom"))
}

fn load_subject(conn: &Connection, id: i64) -> LocalResult<serde_json::Value> {
    conn.query_row(
        &format!(
            "SELECT {} FROM subjects WHERE id = ? AND active = 1",
            SUBJECT_COLUMNS
        ),
        [id],
        subject_json,
    )
    .optional()
    .map_err(db_err)?
    .ok_or_else(|| BackendError::not_found("subject"))
}

/// Returns the classroom id of an active assignment row.
fn load_link(conn: &Connection, table: &str, id: i64) -> LocalResult<i64> {
    conn.query_row(
        &format!(
            "SELECT classroom_id FROM {} WHERE id = ? AND active = 1",
            table
        ),
        [id],
        |r| r.get(0),
    )
    .optional()
    .map_err(db_err)?
    .ok_or_else(|| BackendError::not_found("assignment"))
}

fn teacher_json(r: &Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "institution_id": r.get::<_, i64>(1)?,
        "first_name": r.get::<_, String>(2)?,
        "last_name": r.get::<_, String>(3)?,
        "cedula": r.get::<_, String>(4)?,
        "email": r.get::<_, Option<String>>(5)?,
        "phone": r.get::<_, Option<String>>(6)?,
        "specialty": r.get::<_, Option<String>>(7)?,
        "active": r.get::<_, i64>(8)? != 0,
        "created_at": r.get::<_, String>(9)?,
        "updated_at": r.get::<_, String>(10)?,
    }))
}

fn classroom_json(r: &Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "institution_id": r.get::<_, i64>(1)?,
        "name": r.get::<_, String>(2)?,
        "grade": r.get::<_, String>(3)?,
        "section": r.get::<_, String>(4)?,
        "capacity": r.get::<_, Option<i64>>(5)?,
        "active": r.get::<_, i64>(6)? != 0,
        "created_at": r.get::<_, String>(7)?,
        "updated_at": r.get::<_, String>(8)?,
    }))
}

fn subject_json(r: &Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "institution_id": r.get::<_, i64>(1)?,
        "name": r.get::<_, String>(2)?,
        "code": r.get::<_, String>(3)?,
        "description": r.get::<_, Option<String>>(4)?,
        "active": r.get::<_, i64>(5)? != 0,
        "created_at": r.get::<_, String>(6)?,
        "updated_at": r.get::<_, String>(7)?,
    }))
}

fn student_json(r: &Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "institution_id": r.get::<_, i64>(1)?,
        "first_name": r.get::<_, String>(2)?,
        "last_name": r.get::<_, String>(3)?,
        "document_id": r.get::<_, String>(4)?,
        "birth_date": r.get::<_, String>(5)?,
        "guardian_name": r.get::<_, String>(6)?,
        "guardian_phone": r.get::<_, String>(7)?,
        "guardian_relationship": r.get::<_, String>(8)?,
        "guardian_email": r.get::<_, Option<String>>(9)?,
        "classroom_id": r.get::<_, i64>(10)?,
        "active": r.get::<_, i64>(11)? != 0,
        "created_at": r.get::<_, String>(12)?,
    }))
}

fn basic_info_of(teacher: &serde_json::Value) -> serde_json::Value {
    json!({
        "id": teacher["id"],
        "first_name": teacher["first_name"],
        "last_name": teacher["last_name"],
        "email": teacher["email"],
        "phone": teacher["phone"],
        "specialty": teacher["specialty"],
    })
}

fn classroom_fields(input: &ClassroomInput) -> LocalResult<(String, String, String)> {
    let name = required("name", &input.name)?;
    let grade = required("grade", &input.grade)?;
    let section = required("section", &input.section)?;
    if matches!(input.capacity, Some(c) if c <= 0) {
        return Err(BackendError::status(
            400,
            "capacity must be greater than zero",
            "VALIDATION_ERROR",
        ));
    }
    Ok((name, grade, section))
}

fn paginated(items: Vec<serde_json::Value>, total: i64, p: &ListParams) -> Envelope {
    let limit = i64::from(p.limit);
    let total_pages = (total + limit - 1) / limit;
    Envelope::ok(json!({
        "items": items,
        "pagination": {
            "page": p.page,
            "limit": p.limit,
            "total": total,
            "totalPages": total_pages,
        }
    }))
}

fn body<T: DeserializeOwned>(req: &BackendRequest) -> LocalResult<T> {
    let raw = req.body.clone().unwrap_or(serde_json::Value::Null);
    serde_json::from_value(raw).map_err(|e| {
        BackendError::status(400, &format!("invalid payload: {}", e), "VALIDATION_ERROR")
    })
}

fn parse_id(raw: &str) -> LocalResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| BackendError::status(400, &format!("invalid id: {}", raw), "BAD_REQUEST"))
}

fn required(field: &str, value: &str) -> LocalResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(BackendError::status(
            400,
            &format!("{} is required", field),
            "VALIDATION_ERROR",
        ));
    }
    Ok(v.to_string())
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn like_pattern(search: &Option<String>) -> Option<String> {
    search.as_ref().map(|s| format!("%{}%", s))
}

fn prefix_row_error(e: BackendError, row: usize) -> BackendError {
    match e {
        BackendError::Status {
            status,
            body: Some(mut body),
        } => {
            let prefixed = body
                .get("error")
                .and_then(|v| v.as_str())
                .map(|msg| format!("row {}: {}", row, msg));
            if let Some(msg) = prefixed {
                body["error"] = json!(msg);
            }
            BackendError::Status {
                status,
                body: Some(body),
            }
        }
        other => other,
    }
}

fn db_err(e: rusqlite::Error) -> BackendError {
    BackendError::status(500, &format!("database error: {}", e), "INTERNAL")
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_backend(prefix: &str) -> LocalBackend {
        let dir = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        LocalBackend::open(&dir, EntityId::new(1)).expect("open local backend")
    }

    fn teacher_body(cedula: &str) -> serde_json::Value {
        json!({ "first_name": "Ana", "last_name": "Vera", "cedula": cedula })
    }

    fn status_of(e: &BackendError) -> (u16, Option<String>) {
        match e {
            BackendError::Status { status, body } => (
                *status,
                body.as_ref()
                    .and_then(|b| b.get("code"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            ),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn duplicate_cedula_is_a_conflict_with_spanish_error() {
        let backend = temp_backend("schoold-local-cedula");
        backend
            .send(&BackendRequest::with_body(
                Method::Post,
                "/teachers",
                teacher_body("0102030405"),
            ))
            .expect("first create");
        let err = backend
            .send(&BackendRequest::with_body(
                Method::Post,
                "/teachers",
                teacher_body("0102030405"),
            ))
            .expect_err("duplicate must fail");
        match &err {
            BackendError::Status { status, body } => {
                assert_eq!(*status, 409);
                let body = body.as_ref().expect("body");
                assert_eq!(body["error"], json!("Cedula duplicada"));
                assert_eq!(body["code"], json!("DUPLICATE_CEDULA"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn soft_delete_hides_rows_and_allows_reuse_of_cedula() {
        let backend = temp_backend("schoold-local-soft-delete");
        let created = backend
            .send(&BackendRequest::with_body(
                Method::Post,
                "/teachers",
                teacher_body("111"),
            ))
            .expect("create");
        let id = created.data.as_ref().and_then(|d| d["id"].as_i64()).expect("id");

        backend
            .send(&BackendRequest::delete(format!("/teachers/{}", id)))
            .expect("soft delete");
        let err = backend
            .send(&BackendRequest::get(format!("/teachers/{}", id)))
            .expect_err("inactive teacher is not found");
        assert_eq!(status_of(&err), (404, Some("NOT_FOUND".to_string())));

        let list = backend
            .send(&BackendRequest::get("/teachers"))
            .expect("list");
        let data = list.data.expect("data");
        assert_eq!(data["pagination"]["total"], json!(0));

        backend
            .send(&BackendRequest::with_body(
                Method::Post,
                "/teachers",
                teacher_body("111"),
            ))
            .expect("cedula is free again");
    }

    #[test]
    fn classroom_tutor_and_teaching_conflicts() {
        let backend = temp_backend("schoold-local-links");
        let teacher = backend
            .send(&BackendRequest::with_body(
                Method::Post,
                "/teachers",
                teacher_body("222"),
            ))
            .expect("teacher")
            .data
            .expect("teacher data");
        let classroom = backend
            .send(&BackendRequest::with_body(
                Method::Post,
                "/classrooms",
                json!({ "name": "3A", "grade": "3", "section": "A" }),
            ))
            .expect("classroom")
            .data
            .expect("classroom data");
        let subject = backend
            .send(&BackendRequest::with_body(
                Method::Post,
                "/subjects",
                json!({ "name": "Math", "code": "MAT" }),
            ))
            .expect("subject")
            .data
            .expect("subject data");

        let link = json!({ "teacher_id": teacher["id"], "classroom_id": classroom["id"] });
        backend
            .send(&BackendRequest::with_body(Method::Post, "/tutor-assignments", link.clone()))
            .expect("tutor");
        let err = backend
            .send(&BackendRequest::with_body(Method::Post, "/tutor-assignments", link))
            .expect_err("second tutor");
        assert_eq!(status_of(&err), (409, Some("CLASSROOM_HAS_TUTOR".to_string())));

        let teaching = json!({
            "teacher_id": teacher["id"],
            "classroom_id": classroom["id"],
            "subject_ids": [subject["id"]],
        });
        backend
            .send(&BackendRequest::with_body(Method::Post, "/teaching-assignments", teaching.clone()))
            .expect("teaching");
        let err = backend
            .send(&BackendRequest::with_body(Method::Post, "/teaching-assignments", teaching))
            .expect_err("same subject twice");
        assert_eq!(status_of(&err), (409, Some("SUBJECT_ALREADY_ASSIGNED".to_string())));

        let err = backend
            .send(&BackendRequest::delete(format!("/teachers/{}", teacher["id"])))
            .expect_err("teacher in use");
        assert_eq!(status_of(&err), (409, Some("RESOURCE_IN_USE".to_string())));

        let details = backend
            .send(&BackendRequest::get(format!("/teachers/{}", teacher["id"])))
            .expect("details")
            .data
            .expect("details data");
        assert_eq!(details["tutor_of"].as_array().map(Vec::len), Some(1));
        assert_eq!(details["teaching"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn bulk_import_is_all_or_nothing() {
        let backend = temp_backend("schoold-local-bulk");
        let err = backend
            .send(&BackendRequest::with_body(
                Method::Post,
                "/teachers/bulk",
                json!({ "teachers": [teacher_body("1"), teacher_body("2"), teacher_body("1")] }),
            ))
            .expect_err("duplicate row");
        match err {
            BackendError::Status { body, .. } => {
                assert_eq!(body.expect("body")["error"], json!("row 3: Cedula duplicada"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        let list = backend
            .send(&BackendRequest::get("/teachers"))
            .expect("list")
            .data
            .expect("data");
        assert_eq!(list["pagination"]["total"], json!(0));
    }

    #[test]
    fn unknown_route_is_not_found() {
        let backend = temp_backend("schoold-local-route");
        let err = backend
            .send(&BackendRequest::get("/nope"))
            .expect_err("unknown route");
        assert_eq!(status_of(&err), (404, Some("NOT_FOUND".to_string())));
    }
}
