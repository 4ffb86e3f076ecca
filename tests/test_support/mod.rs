#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoolreportd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoolreportd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
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
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(Value::Null)
}

pub fn error_code(value: &Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

/// Sidecar with a freshly selected workspace plus one school, class and student.
pub struct Fixture {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    pub workspace: PathBuf,
    pub school_id: String,
    pub class_id: String,
    pub student_id: String,
    seq: usize,
}

impl Fixture {
    pub fn new(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut f = Fixture {
            child,
            stdin,
            reader,
            workspace,
            school_id: String::new(),
            class_id: String::new(),
            student_id: String::new(),
            seq: 0,
        };
        let path = f.workspace.to_string_lossy().to_string();
        f.ok("workspace.select", json!({ "path": path }));
        f.school_id = f.create_id(
            "schools.create",
            json!({ "name": "Riverside School" }),
            "schoolId",
        );
        let school_id = f.school_id.clone();
        f.class_id = f.create_id(
            "classes.create",
            json!({ "schoolId": school_id, "name": "7A" }),
            "classId",
        );
        let class_id = f.class_id.clone();
        f.student_id = f.create_id(
            "students.create",
            json!({ "classId": class_id, "name": "Ana Souza", "registration": "2025-001" }),
            "studentId",
        );
        f
    }

    fn next_id(&mut self) -> String {
        self.seq += 1;
        self.seq.to_string()
    }

    pub fn call(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    pub fn create_id(&mut self, method: &str, params: Value, key: &str) -> String {
        self.ok(method, params)
            .get(key)
            .and_then(|v| v.as_str())
            .expect("created id")
            .to_string()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.workspace);
    }
}

/// Text of every `text` draw instruction in a document result.
pub fn texts(doc: &Value) -> Vec<String> {
    doc.get("instructions")
        .and_then(|v| v.as_array())
        .expect("instructions")
        .iter()
        .filter(|op| op.get("op").and_then(|v| v.as_str()) == Some("text"))
        .filter_map(|op| op.get("text").and_then(|v| v.as_str()).map(|s| s.to_string()))
        .collect()
}

pub fn count_ops(doc: &Value, kind: &str) -> usize {
    doc.get("instructions")
        .and_then(|v| v.as_array())
        .expect("instructions")
        .iter()
        .filter(|op| op.get("op").and_then(|v| v.as_str()) == Some(kind))
        .count()
}
