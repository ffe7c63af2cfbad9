//! Mezzo - Script Host
//!
//! Executes transformation and collector scripts in one of two engines:
//! `javascript` (boa) or `starlark`. The host contract is the same for
//! both:
//!
//! - a script defines `transform(body, headers)` or `collect()`;
//! - returning None/null filters the message (not an error);
//! - a `transform` result is a mapping whose `body` field becomes the
//!   new message body, headers pass through unchanged;
//! - a `collect` result mapping becomes the message body with fresh
//!   headers.
//!
//! Scripts get `log.debug|info|warn|error` and `http.get|post`
//! injected; Starlark additionally sees the standard `json` module.
//!
//! Engines are synchronous, so [`ScriptService::execute`] runs them on
//! the blocking pool. Values cross the host boundary as JSON trees
//! (null, bool, i64, f64, string, list, string-keyed map); integers
//! beyond the signed 64-bit range are rejected.

mod engines;
mod error;
mod http;

pub use error::{Result, ScriptError};
pub use http::{HttpClient, HttpResponse};

use serde_json::{Map, Value};

/// The engine name for JavaScript transformations.
pub const ENGINE_JAVASCRIPT: &str = "javascript";

/// The engine name for Starlark transformations.
pub const ENGINE_STARLARK: &str = "starlark";

/// Output of a script run: the message to publish downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutput {
    pub body: Map<String, Value>,
    pub headers: Map<String, Value>,
}

/// Dispatches script execution to the named engine.
#[derive(Debug, Default)]
pub struct ScriptService;

impl ScriptService {
    /// Create a new script service.
    pub fn new() -> Self {
        Self
    }

    /// Execute a script on the blocking pool.
    ///
    /// `Ok(None)` means the script filtered the message.
    pub async fn execute(
        &self,
        engine: &str,
        script: &str,
        body: Map<String, Value>,
        headers: Map<String, Value>,
    ) -> Result<Option<ScriptOutput>> {
        let engine = engine.to_string();
        let script = script.to_string();

        tokio::task::spawn_blocking(move || Self::execute_blocking(&engine, &script, body, headers))
            .await
            .map_err(|e| ScriptError::Runtime(format!("script task failed: {e}")))?
    }

    /// Synchronous entry point (used by the async wrapper and tests).
    pub fn execute_blocking(
        engine: &str,
        script: &str,
        body: Map<String, Value>,
        headers: Map<String, Value>,
    ) -> Result<Option<ScriptOutput>> {
        match engine {
            ENGINE_JAVASCRIPT => engines::javascript::execute(script, body, headers),
            ENGINE_STARLARK => engines::starlark::execute(script, body, headers),
            other => Err(ScriptError::UnknownEngine(other.to_string())),
        }
    }
}

/// Interpret the raw value a `transform` function returned.
///
/// `None` filters. A mapping without a mapping-valued `body` field also
/// filters, mirroring the established contract. Anything else is a
/// script bug worth surfacing.
pub(crate) fn finish_transform(
    result: Option<Value>,
    headers: Map<String, Value>,
) -> Result<Option<ScriptOutput>> {
    let value = match result {
        None => return Ok(None),
        Some(value) => value,
    };

    let mut mapping = match value {
        Value::Object(mapping) => mapping,
        other => {
            return Err(ScriptError::BadResult(format!(
                "transform must return a mapping or None, got {}",
                type_name(&other)
            )));
        }
    };

    match mapping.remove("body") {
        Some(Value::Object(body)) => Ok(Some(ScriptOutput { body, headers })),
        _ => Ok(None),
    }
}

/// Interpret the raw value a `collect` function returned.
///
/// The whole mapping becomes the message body; an empty mapping or
/// `None` means nothing was collected this tick.
pub(crate) fn finish_collect(result: Option<Value>) -> Result<Option<ScriptOutput>> {
    let value = match result {
        None => return Ok(None),
        Some(value) => value,
    };

    match value {
        Value::Object(body) if !body.is_empty() => Ok(Some(ScriptOutput {
            body,
            headers: Map::new(),
        })),
        Value::Object(_) => Ok(None),
        other => Err(ScriptError::BadResult(format!(
            "collect must return a mapping or None, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn run(engine: &str, script: &str, body: Value) -> Result<Option<ScriptOutput>> {
        ScriptService::execute_blocking(engine, script, obj(body), Map::new())
    }

    // =========================================================================
    // Starlark
    // =========================================================================

    #[test]
    fn test_starlark_transform_rewrites_body() {
        let script = r#"
def transform(body, headers):
    return {"body": {"doubled": body["n"] * 2}}
"#;
        let out = run(ENGINE_STARLARK, script, json!({"n": 21})).unwrap().unwrap();
        assert_eq!(out.body["doubled"], json!(42));
    }

    #[test]
    fn test_starlark_transform_filters_below_threshold() {
        let script = r#"
def transform(body, headers):
    return {"body": body} if body["total"] > 10 else None
"#;
        assert!(run(ENGINE_STARLARK, script, json!({"total": 5})).unwrap().is_none());

        let kept = run(ENGINE_STARLARK, script, json!({"total": 20})).unwrap().unwrap();
        assert_eq!(kept.body["total"], json!(20));
    }

    #[test]
    fn test_starlark_headers_pass_through() {
        let script = r#"
def transform(body, headers):
    return {"body": {"seen": headers["trace"]}}
"#;
        let headers = obj(json!({"trace": "abc-123"}));
        let out = ScriptService::execute_blocking(
            ENGINE_STARLARK,
            script,
            obj(json!({})),
            headers.clone(),
        )
        .unwrap()
        .unwrap();

        assert_eq!(out.headers, headers);
        assert_eq!(out.body["seen"], json!("abc-123"));
    }

    #[test]
    fn test_starlark_collect_returns_whole_mapping() {
        let script = "def collect(): return {\"ts\": 1}";
        let out = run(ENGINE_STARLARK, script, json!({})).unwrap().unwrap();
        assert_eq!(out.body["ts"], json!(1));
        assert!(out.headers.is_empty());
    }

    #[test]
    fn test_starlark_collect_none_and_empty_are_filtered() {
        assert!(run(ENGINE_STARLARK, "def collect(): return None", json!({}))
            .unwrap()
            .is_none());
        assert!(run(ENGINE_STARLARK, "def collect(): return {}", json!({}))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_starlark_json_module_available() {
        let script = r#"
def transform(body, headers):
    return {"body": json.decode(json.encode(body))}
"#;
        let out = run(
            ENGINE_STARLARK,
            script,
            json!({"a": [1, 2.5, "x", Value::Null, true]}),
        )
            .unwrap()
            .unwrap();
        assert_eq!(out.body["a"], json!([1, 2.5, "x", null, true]));
    }

    #[test]
    fn test_starlark_log_capability() {
        let script = r#"
def transform(body, headers):
    log.info("processing")
    log.warn("still processing")
    return {"body": body}
"#;
        assert!(run(ENGINE_STARLARK, script, json!({"x": 1})).unwrap().is_some());
    }

    #[test]
    fn test_starlark_syntax_error_is_compile() {
        let err = run(ENGINE_STARLARK, "def transform(", json!({})).unwrap_err();
        assert!(matches!(err, ScriptError::Compile(_)));
    }

    #[test]
    fn test_starlark_runtime_error() {
        let script = "def transform(body, headers): return body[\"missing\"]";
        let err = run(ENGINE_STARLARK, script, json!({})).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(_)));
    }

    #[test]
    fn test_starlark_huge_int_rejected() {
        let mut body = Map::new();
        body.insert("n".into(), Value::from(u64::MAX));
        let err = ScriptService::execute_blocking(
            ENGINE_STARLARK,
            "def transform(body, headers): return {\"body\": body}",
            body,
            Map::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ScriptError::IntOutOfRange));
    }

    // =========================================================================
    // JavaScript
    // =========================================================================

    #[test]
    fn test_javascript_transform_rewrites_body() {
        let script = r#"
function transform(body, headers) {
    return {body: {doubled: body.n * 2}};
}
"#;
        let out = run(ENGINE_JAVASCRIPT, script, json!({"n": 21})).unwrap().unwrap();
        assert_eq!(out.body["doubled"], json!(42));
    }

    #[test]
    fn test_javascript_null_filters() {
        let script = r#"
function transform(body, headers) {
    if (body.total <= 10) { return null; }
    return {body: body};
}
"#;
        assert!(run(ENGINE_JAVASCRIPT, script, json!({"total": 5})).unwrap().is_none());
        assert!(run(ENGINE_JAVASCRIPT, script, json!({"total": 20})).unwrap().is_some());
    }

    #[test]
    fn test_javascript_collect() {
        let script = "function collect() { return {rate: 91.4}; }";
        let out = run(ENGINE_JAVASCRIPT, script, json!({})).unwrap().unwrap();
        assert_eq!(out.body["rate"], json!(91.4));
        assert!(out.headers.is_empty());
    }

    #[test]
    fn test_javascript_log_capability() {
        let script = r#"
function transform(body, headers) {
    log.info("hello from js");
    return {body: body};
}
"#;
        assert!(run(ENGINE_JAVASCRIPT, script, json!({})).unwrap().is_some());
    }

    #[test]
    fn test_javascript_syntax_error_is_compile() {
        let err = run(ENGINE_JAVASCRIPT, "function transform(", json!({})).unwrap_err();
        assert!(matches!(err, ScriptError::Compile(_)));
    }

    // =========================================================================
    // Shared contract
    // =========================================================================

    #[test]
    fn test_unknown_engine_rejected() {
        let err = run("lua", "whatever", json!({})).unwrap_err();
        assert!(matches!(err, ScriptError::UnknownEngine(_)));
    }

    #[test]
    fn test_missing_entry_function() {
        for engine in [ENGINE_STARLARK, ENGINE_JAVASCRIPT] {
            let err = run(engine, "x = 1", json!({})).unwrap_err();
            assert!(matches!(err, ScriptError::NoEntryFunction), "{engine}");
        }
    }

    #[test]
    fn test_non_mapping_result_is_bad() {
        let err = run(ENGINE_STARLARK, "def transform(body, headers): return 42", json!({}))
            .unwrap_err();
        assert!(matches!(err, ScriptError::BadResult(_)));
    }

    #[test]
    fn test_transform_without_body_field_filters() {
        let script = "def transform(body, headers): return {\"note\": \"no body here\"}";
        assert!(run(ENGINE_STARLARK, script, json!({})).unwrap().is_none());
    }
}
