use crate::error::CoreError;
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

/// Engine failure as an error envelope. Lookups that miss name the entity and key.
pub fn core_err(id: &str, e: CoreError) -> serde_json::Value {
    let details = match &e {
        CoreError::NotFound { entity, key } => Some(json!({ "entity": entity, "key": key })),
        _ => None,
    };
    err(id, e.code(), e.to_string(), details)
}
