use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar(env: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut cmd = Command::new(exe);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    for (k, v) in env {
        cmd.env(k, v);
    }
    let mut child = cmd.spawn().expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn nested_dialogs_lock_once_and_restore_the_first_offset() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[]);

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "modal.open",
        json!({ "dialogId": "teacher-form", "scrollY": 480 }),
    );
    assert_eq!(opened["openCount"], json!(1));
    assert_eq!(opened["locked"], json!(true));
    assert_eq!(
        opened["body"],
        json!({ "position": "fixed", "top": "-480px", "width": "100%", "overflow": "hidden" })
    );
    assert_eq!(opened["scrollTo"], json!(null));

    // The page is pinned, so the nested dialog's reported offset is ignored.
    let nested = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "modal.open",
        json!({ "dialogId": "confirm-delete", "scrollY": 0 }),
    );
    assert_eq!(nested["openCount"], json!(2));
    assert_eq!(nested["body"]["top"], json!("-480px"));

    let inner_closed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "modal.close",
        json!({ "dialogId": "confirm-delete" }),
    );
    assert_eq!(inner_closed["openCount"], json!(1));
    assert_eq!(inner_closed["locked"], json!(true));
    assert_eq!(inner_closed["scrollTo"], json!(null));

    let repeated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "modal.close",
        json!({ "dialogId": "confirm-delete" }),
    );
    assert_eq!(repeated["changed"], json!(false));
    assert_eq!(repeated["openCount"], json!(1));

    let outer_closed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "modal.close",
        json!({ "dialogId": "teacher-form" }),
    );
    assert_eq!(outer_closed["openCount"], json!(0));
    assert_eq!(outer_closed["locked"], json!(false));
    assert_eq!(outer_closed["body"]["position"], json!(null));
    assert_eq!(outer_closed["scrollTo"], json!(480));

    let status = request_ok(&mut stdin, &mut reader, "6", "modal.status", json!({}));
    assert_eq!(status["scrollTo"], json!(null));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn top_of_page_offset_is_restored() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[]);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "modal.open",
        json!({ "dialogId": "subject-form", "scrollY": 0 }),
    );
    let closed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "modal.close",
        json!({ "dialogId": "subject-form" }),
    );
    assert_eq!(closed["scrollTo"], json!(0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn force_reset_recovers_from_leaked_dialogs() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[]);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "modal.open",
        json!({ "dialogId": "a", "scrollY": 120 }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "2", "modal.open", json!({ "dialogId": "b" }));
    let reset = request_ok(&mut stdin, &mut reader, "3", "modal.forceReset", json!({}));
    assert_eq!(reset["openCount"], json!(0));
    assert_eq!(reset["locked"], json!(false));
    assert_eq!(reset["mounted"], json!([]));
    assert_eq!(reset["scrollTo"], json!(120));

    // A stray close after the reset must not underflow or restore again.
    let stray = request_ok(&mut stdin, &mut reader, "4", "modal.close", json!({ "dialogId": "a" }));
    assert_eq!(stray["changed"], json!(false));
    assert_eq!(stray["openCount"], json!(0));
    assert_eq!(stray["scrollTo"], json!(null));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn release_settles_after_the_configured_delay() {
    let (mut child, mut stdin, mut reader) =
        spawn_sidecar(&[("SCHOOLD_MODAL_SETTLE_MS", "60000")]);
    let _ = request_ok(&mut stdin, &mut reader, "1", "modal.open", json!({ "dialogId": "x" }));
    let closed = request_ok(&mut stdin, &mut reader, "2", "modal.close", json!({ "dialogId": "x" }));
    assert_eq!(closed["settled"], json!(false));
    assert!(closed["settleRemainingMs"].as_u64().unwrap_or(0) > 0);
    drop(stdin);
    let _ = child.wait();

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[("SCHOOLD_MODAL_SETTLE_MS", "0")]);
    let _ = request_ok(&mut stdin, &mut reader, "1", "modal.open", json!({ "dialogId": "x" }));
    let closed = request_ok(&mut stdin, &mut reader, "2", "modal.close", json!({ "dialogId": "x" }));
    assert_eq!(closed["settled"], json!(true));
    drop(stdin);
    let _ = child.wait();
}
