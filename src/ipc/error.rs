use crate::layout::LayoutError;
use crate::reconcile::AssignmentError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Failure of a single request, rendered into the error envelope.
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Maps a storage failure onto `code`, e.g. `.map_err(db_err("db_query_failed"))`.
pub fn db_err<E: std::fmt::Display>(code: &'static str) -> impl Fn(E) -> HandlerErr {
    move |e| HandlerErr::new(code, e.to_string())
}

impl From<AssignmentError> for HandlerErr {
    fn from(e: AssignmentError) -> Self {
        let details = match &e {
            AssignmentError::DuplicateAssignment {
                teacher_id,
                class_id,
            }
            | AssignmentError::AssignmentNotFound {
                teacher_id,
                class_id,
            } => Some(json!({ "teacherId": teacher_id, "classId": class_id })),
            _ => None,
        };
        Self {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

impl From<LayoutError> for HandlerErr {
    fn from(e: LayoutError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}
