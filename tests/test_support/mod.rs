#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_ciemarkd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn ciemarkd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
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

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

/// A running daemon with auto-numbered requests.
pub struct Session {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Session {
    pub fn start() -> Self {
        let (child, stdin, reader) = spawn_sidecar();
        Self {
            child,
            stdin,
            reader,
            next_id: 1,
        }
    }

    pub fn open(workspace: &std::path::Path) -> Self {
        let mut s = Self::start();
        s.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
        s
    }

    fn id(&mut self) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        id
    }

    pub fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.id();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.id();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    /// Sends a request expected to fail and returns its error code.
    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let resp = self.call(method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            resp
        );
        resp.pointer("/error/code")
            .and_then(|v| v.as_str())
            .expect("error code")
            .to_string()
    }

    pub fn shutdown(mut self) {
        drop(self.stdin);
        let _ = self.child.wait();
    }

    pub fn student(&mut self, reg_no: &str, department: &str, section: &str) -> String {
        let res = self.ok(
            "students.create",
            json!({
                "regNo": reg_no,
                "name": format!("Student {reg_no}"),
                "department": department,
                "semester": 3,
                "section": section,
            }),
        );
        res["id"].as_str().expect("student id").to_string()
    }

    pub fn subject(&mut self, name: &str, code: &str, department: &str) -> String {
        let res = self.ok(
            "subjects.create",
            json!({ "name": name, "code": code, "department": department }),
        );
        res["id"].as_str().expect("subject id").to_string()
    }

    pub fn write(&mut self, student: &str, subject: &str, round: &str, score: serde_json::Value) -> serde_json::Value {
        self.ok(
            "marks.write",
            json!({
                "actor": faculty_actor(),
                "studentId": student,
                "subjectId": subject,
                "round": round,
                "score": score,
            }),
        )
    }

    pub fn transition(&mut self, method: &str, subject: &str, round: &str) -> u64 {
        let res = self.ok(
            method,
            json!({ "actor": hod_actor(), "subjectId": subject, "round": round }),
        );
        res["affected"].as_u64().expect("affected")
    }
}

pub fn faculty_actor() -> serde_json::Value {
    json!({ "username": "fac1", "role": "faculty" })
}

pub fn hod_actor() -> serde_json::Value {
    json!({ "username": "hod1", "role": "hod" })
}
