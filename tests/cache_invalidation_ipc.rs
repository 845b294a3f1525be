use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

fn staleness(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    key: &serde_json::Value,
) -> serde_json::Value {
    let inspected = request_ok(stdin, reader, id, "cache.inspect", json!({ "key": key }));
    inspected["staleness"].clone()
}

#[test]
fn tutor_assignment_refreshes_open_teacher_details() {
    let workspace = temp_dir("schoold-tutor-refresh");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let classroom = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classrooms.create",
        json!({ "name": "3A", "grade": "3", "section": "A", "capacity": 30 }),
    );
    let classroom_id = classroom["data"]["id"].as_i64().expect("classroom id");
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.create",
        json!({ "first_name": "Ana", "last_name": "Vera", "cedula": "0102030405" }),
    );
    let teacher_id = teacher["data"]["id"].as_i64().expect("teacher id");

    // Opened with a string id, later addressed with a number: one entry.
    let details = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.get",
        json!({ "id": teacher_id.to_string() }),
    );
    assert_eq!(details["fromCache"], json!(false));
    assert_eq!(details["data"]["tutor_of"], json!([]));
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.get",
        json!({ "id": teacher_id }),
    );
    assert_eq!(again["fromCache"], json!(true));

    let list = request_ok(&mut stdin, &mut reader, "6", "teachers.list", json!({}));
    let list_key = list["key"].clone();
    let classes = request_ok(&mut stdin, &mut reader, "7", "teachers.classes", json!({}));
    let classes_key = classes["key"].clone();

    let assigned = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "tutors.assign",
        json!({ "teacher_id": teacher_id, "classroom_id": classroom_id }),
    );
    assert_eq!(assigned["refetched"], json!([["teacher-details", teacher_id]]));
    assert_eq!(
        assigned["invalidated"],
        json!([["teacher-details", teacher_id], ["teachers"], ["teacher-classes", 1]])
    );

    assert_eq!(
        staleness(&mut stdin, &mut reader, "9", &details["key"]),
        json!("fresh")
    );
    assert_eq!(staleness(&mut stdin, &mut reader, "10", &list_key), json!("stale"));
    assert_eq!(staleness(&mut stdin, &mut reader, "11", &classes_key), json!("stale"));

    let refreshed = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "teachers.get",
        json!({ "id": teacher_id }),
    );
    assert_eq!(refreshed["fromCache"], json!(true));
    assert_eq!(
        refreshed["data"]["tutor_of"][0]["classroom_id"],
        json!(classroom_id)
    );

    let relisted = request_ok(&mut stdin, &mut reader, "13", "teachers.list", json!({}));
    assert_eq!(relisted["fromCache"], json!(false));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn failed_mutation_shows_one_toast_and_invalidates_nothing() {
    let workspace = temp_dir("schoold-duplicate-cedula");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.create",
        json!({ "first_name": "Ana", "last_name": "Vera", "cedula": "0102030405" }),
    );
    let list = request_ok(&mut stdin, &mut reader, "3", "teachers.list", json!({}));
    let search = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.search",
        json!({ "q": "Ana" }),
    );

    let error = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.create",
        json!({ "data": { "first_name": "Otra", "last_name": "Persona", "cedula": "0102030405" } }),
    );
    assert_eq!(error["code"], json!("mutation_failed"));
    assert_eq!(error["message"], json!("Cedula duplicada"));
    assert_eq!(error["details"]["toast"]["message"], json!("Cedula duplicada"));
    assert!(error["details"]["toast"]["description"].is_string());
    assert_eq!(error["details"]["code"], json!("DUPLICATE_CEDULA"));
    assert_eq!(error["details"]["invalidated"], json!([]));

    assert_eq!(staleness(&mut stdin, &mut reader, "6", &list["key"]), json!("fresh"));
    assert_eq!(staleness(&mut stdin, &mut reader, "7", &search["key"]), json!("fresh"));

    // A successful create does reach both families.
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "teachers.create",
        json!({ "first_name": "Luis", "last_name": "Paz", "cedula": "0911111111" }),
    );
    assert_eq!(created["invalidated"], json!([["teachers"], ["teachers-search"]]));
    assert_eq!(staleness(&mut stdin, &mut reader, "9", &list["key"]), json!("stale"));
    assert_eq!(staleness(&mut stdin, &mut reader, "10", &search["key"]), json!("stale"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn referenced_teacher_cannot_be_deleted_until_unlinked() {
    let workspace = temp_dir("schoold-resource-in-use");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let classroom = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classrooms.create",
        json!({ "name": "5B", "grade": "5", "section": "B" }),
    );
    let classroom_id = classroom["data"]["id"].as_i64().expect("classroom id");
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.create",
        json!({ "first_name": "Rosa", "last_name": "Lema", "cedula": "1712345678" }),
    );
    let teacher_id = teacher["data"]["id"].as_i64().expect("teacher id");
    let link = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "tutors.assign",
        json!({ "teacher_id": teacher_id, "classroom_id": classroom_id }),
    );
    let link_id = link["data"]["id"].as_i64().expect("link id");

    let in_use = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.delete",
        json!({ "id": teacher_id }),
    );
    assert_eq!(in_use["code"], json!("mutation_failed"));
    assert_eq!(in_use["details"]["code"], json!("RESOURCE_IN_USE"));
    assert!(in_use["details"]["toast"]["description"].is_string());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "tutors.remove",
        json!({ "id": link_id, "teacherId": teacher_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "teachers.delete",
        json!({ "id": teacher_id }),
    );
    let gone = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "teachers.get",
        json!({ "id": teacher_id }),
    );
    assert_eq!(gone["code"], json!("not_found"));

    let listed = request_ok(&mut stdin, &mut reader, "9", "teachers.list", json!({}));
    assert_eq!(listed["data"]["pagination"]["total"], json!(0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn invalid_forms_never_reach_the_backend() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // No backend is selected: a validation error proves nothing was sent.
    let error = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "teachers.create",
        json!({ "first_name": "", "last_name": "Vera", "email": "not-an-email" }),
    );
    assert_eq!(error["code"], json!("validation_failed"));
    assert_eq!(error["details"]["fields"]["first_name"], json!("required"));
    assert_eq!(error["details"]["fields"]["cedula"], json!("required"));
    assert_eq!(
        error["details"]["fields"]["email"],
        json!("invalid email address")
    );

    let error = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "teaching.assign",
        json!({ "teacher_id": 1, "classroom_id": 2, "subject_ids": [4, "4"] }),
    );
    assert_eq!(error["code"], json!("validation_failed"));
    assert!(error["details"]["fields"]["subject_ids"].is_string());

    let error = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.create",
        json!({ "first_name": "Ana", "last_name": "Vera", "cedula": "1" }),
    );
    assert_eq!(error["code"], json!("no_backend"));

    drop(stdin);
    let _ = child.wait();
}

fn ids_of(list: &serde_json::Value) -> Vec<i64> {
    list["data"]["items"]
        .as_array()
        .map(|items| items.iter().filter_map(|i| i["id"].as_i64()).collect())
        .unwrap_or_default()
}

#[test]
fn deleted_classroom_drops_out_of_the_relisted_page() {
    let workspace = temp_dir("schoold-classroom-delete");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let kept = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classrooms.create",
        json!({ "name": "2A", "grade": "2", "section": "A" }),
    );
    let kept_id = kept["data"]["id"].as_i64().expect("classroom id");
    let doomed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classrooms.create",
        json!({ "name": "2B", "grade": "2", "section": "B" }),
    );
    let doomed_id = doomed["data"]["id"].as_i64().expect("classroom id");

    let list = request_ok(&mut stdin, &mut reader, "4", "classrooms.list", json!({}));
    assert_eq!(list["fromCache"], json!(false));
    assert_eq!(ids_of(&list), vec![kept_id, doomed_id]);
    let cached = request_ok(&mut stdin, &mut reader, "5", "classrooms.list", json!({}));
    assert_eq!(cached["fromCache"], json!(true));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "classrooms.delete",
        json!({ "id": doomed_id.to_string() }),
    );
    assert_eq!(
        deleted["invalidated"],
        json!([["classrooms"], ["teacher-details"], ["teacher-classes"], ["course-subjects"]])
    );
    assert_eq!(deleted["refetched"], json!([]));
    assert_eq!(staleness(&mut stdin, &mut reader, "7", &list["key"]), json!("stale"));

    let relisted = request_ok(&mut stdin, &mut reader, "8", "classrooms.list", json!({}));
    assert_eq!(relisted["key"], list["key"]);
    assert_eq!(relisted["fromCache"], json!(false));
    assert_eq!(ids_of(&relisted), vec![kept_id]);

    let gone = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "classrooms.get",
        json!({ "id": doomed_id }),
    );
    assert_eq!(gone["code"], json!("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn teaching_reassignment_refreshes_both_teachers() {
    let workspace = temp_dir("schoold-teaching-links");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let classroom = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classrooms.create",
        json!({ "name": "3A", "grade": "3", "section": "A" }),
    );
    let classroom_id = classroom["data"]["id"].as_i64().expect("classroom id");
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.create",
        json!({ "name": "Math", "code": "MAT-3" }),
    );
    let subject_id = subject["data"]["id"].as_i64().expect("subject id");
    let a = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.create",
        json!({ "first_name": "Ana", "last_name": "Vera", "cedula": "0102030405" }),
    );
    let a = a["data"]["id"].as_i64().expect("teacher id");
    let b = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.create",
        json!({ "first_name": "Luis", "last_name": "Paz", "cedula": "0911111111" }),
    );
    let b = b["data"]["id"].as_i64().expect("teacher id");

    let _ = request_ok(&mut stdin, &mut reader, "6", "teachers.get", json!({ "id": a }));
    let _ = request_ok(&mut stdin, &mut reader, "7", "teachers.get", json!({ "id": b }));
    let subjects = request_ok(&mut stdin, &mut reader, "8", "courseSubjects.list", json!({}));

    let assigned = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "teaching.assign",
        json!({ "teacher_id": a, "classroom_id": classroom_id, "subject_ids": [subject_id] }),
    );
    assert_eq!(
        assigned["invalidated"],
        json!([["teacher-details", a], ["teachers"], ["course-subjects", 1]])
    );
    assert_eq!(assigned["refetched"], json!([["teacher-details", a]]));
    assert_eq!(
        staleness(&mut stdin, &mut reader, "10", &subjects["key"]),
        json!("stale")
    );
    let link = assigned["data"]["ids"][0].as_i64().expect("link id");

    // The caller does not say who owned the link: every open teacher view is refreshed.
    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "teaching.update",
        json!({ "id": link, "teacher_id": b }),
    );
    assert_eq!(
        moved["invalidated"],
        json!([["teacher-details"], ["teachers"], ["course-subjects", 1]])
    );
    let refetched = moved["refetched"].as_array().expect("refetched keys");
    assert_eq!(refetched.len(), 2);
    assert!(refetched.contains(&json!(["teacher-details", a])));
    assert!(refetched.contains(&json!(["teacher-details", b])));

    let previous = request_ok(&mut stdin, &mut reader, "12", "teachers.get", json!({ "id": a }));
    assert_eq!(previous["fromCache"], json!(true));
    assert_eq!(previous["data"]["teaching"], json!([]));
    let current = request_ok(&mut stdin, &mut reader, "13", "teachers.get", json!({ "id": b }));
    assert_eq!(current["fromCache"], json!(true));
    assert_eq!(current["data"]["teaching"][0]["subject_name"], json!("Math"));

    // With the previous owner named, only the two affected teachers are touched.
    let back = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "teaching.update",
        json!({ "id": link, "teacher_id": a, "previousTeacherId": b }),
    );
    assert_eq!(
        back["invalidated"],
        json!([
            ["teacher-details", a],
            ["teachers"],
            ["course-subjects", 1],
            ["teacher-details", b]
        ])
    );
    assert_eq!(
        back["refetched"],
        json!([["teacher-details", a], ["teacher-details", b]])
    );

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "teaching.remove",
        json!({ "id": link, "teacherId": a }),
    );
    assert_eq!(removed["refetched"], json!([["teacher-details", a]]));
    let after = request_ok(&mut stdin, &mut reader, "16", "teachers.get", json!({ "id": a }));
    assert_eq!(after["fromCache"], json!(true));
    assert_eq!(after["data"]["teaching"], json!([]));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
