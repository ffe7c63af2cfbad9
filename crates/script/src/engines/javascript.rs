//! JavaScript engine (boa)

use std::collections::HashMap;

use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsResult, JsValue, NativeFunction, Source};
use serde_json::{Map, Value};

use crate::error::{Result, ScriptError};
use crate::{finish_collect, finish_transform, http, ScriptOutput};

/// Execute a JavaScript script against the host contract.
pub(crate) fn execute(
    script: &str,
    body: Map<String, Value>,
    headers: Map<String, Value>,
) -> Result<Option<ScriptOutput>> {
    let mut context = Context::default();

    register_capabilities(&mut context)
        .map_err(|e| ScriptError::Runtime(format!("failed to install host objects: {e}")))?;

    context
        .eval(Source::from_bytes(script))
        .map_err(|e| ScriptError::Compile(e.to_string()))?;

    let body_js = JsValue::from_json(&Value::Object(body), &mut context)
        .map_err(|e| ScriptError::Runtime(format!("body conversion failed: {e}")))?;
    let headers_js = JsValue::from_json(&Value::Object(headers.clone()), &mut context)
        .map_err(|e| ScriptError::Runtime(format!("headers conversion failed: {e}")))?;

    let global = context.global_object();

    let transform = global
        .get(js_string!("transform"), &mut context)
        .unwrap_or(JsValue::undefined());
    if let Some(function) = transform.as_callable() {
        let result = function
            .call(&JsValue::undefined(), &[body_js, headers_js], &mut context)
            .map_err(|e| ScriptError::Runtime(e.to_string()))?;
        return finish_transform(export(&result, &mut context)?, headers);
    }

    let collect = global
        .get(js_string!("collect"), &mut context)
        .unwrap_or(JsValue::undefined());
    if let Some(function) = collect.as_callable() {
        let result = function
            .call(&JsValue::undefined(), &[], &mut context)
            .map_err(|e| ScriptError::Runtime(e.to_string()))?;
        return finish_collect(export(&result, &mut context)?);
    }

    Err(ScriptError::NoEntryFunction)
}

/// Export a script result into the host value tree; null/undefined is
/// the filter signal.
fn export(value: &JsValue, context: &mut Context) -> Result<Option<Value>> {
    if value.is_null_or_undefined() {
        return Ok(None);
    }
    value
        .to_json(context)
        .map(Some)
        .map_err(|e| ScriptError::BadResult(e.to_string()))
}

// =============================================================================
// Injected capabilities
// =============================================================================

fn register_capabilities(context: &mut Context) -> JsResult<()> {
    let log = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(log_debug), js_string!("debug"), 1)
        .function(NativeFunction::from_fn_ptr(log_info), js_string!("info"), 1)
        .function(NativeFunction::from_fn_ptr(log_warn), js_string!("warn"), 1)
        .function(NativeFunction::from_fn_ptr(log_error), js_string!("error"), 1)
        .build();
    context.register_global_property(js_string!("log"), log, Attribute::all())?;

    let http = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(http_get), js_string!("get"), 2)
        .function(NativeFunction::from_fn_ptr(http_post), js_string!("post"), 3)
        .build();
    context.register_global_property(js_string!("http"), http, Attribute::all())?;

    Ok(())
}

fn arg_string(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<String> {
    Ok(args
        .get(index)
        .cloned()
        .unwrap_or(JsValue::undefined())
        .to_string(context)?
        .to_std_string_escaped())
}

fn arg_string_map(
    args: &[JsValue],
    index: usize,
    context: &mut Context,
) -> JsResult<HashMap<String, String>> {
    let mut map = HashMap::new();
    if let Some(value) = args.get(index) {
        if !value.is_null_or_undefined() {
            if let Ok(Value::Object(object)) = value.to_json(context) {
                for (key, value) in object {
                    match value {
                        Value::String(s) => map.insert(key, s),
                        other => map.insert(key, other.to_string()),
                    };
                }
            }
        }
    }
    Ok(map)
}

fn log_debug(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let msg = arg_string(args, 0, context)?;
    tracing::debug!(target: "script", "{msg}");
    Ok(JsValue::undefined())
}

fn log_info(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let msg = arg_string(args, 0, context)?;
    tracing::info!(target: "script", "{msg}");
    Ok(JsValue::undefined())
}

fn log_warn(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let msg = arg_string(args, 0, context)?;
    tracing::warn!(target: "script", "{msg}");
    Ok(JsValue::undefined())
}

fn log_error(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let msg = arg_string(args, 0, context)?;
    tracing::error!(target: "script", "{msg}");
    Ok(JsValue::undefined())
}

fn http_get(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let url = arg_string(args, 0, context)?;
    let headers = arg_string_map(args, 1, context)?;

    let response = http::shared().get(&url, &headers);
    JsValue::from_json(&response.to_json(), context)
}

fn http_post(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let url = arg_string(args, 0, context)?;
    let headers = arg_string_map(args, 1, context)?;
    let body = arg_string(args, 2, context)?;

    let response = http::shared().post(&url, &headers, &body);
    JsValue::from_json(&response.to_json(), context)
}
