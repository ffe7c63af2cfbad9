//! Starlark engine
//!
//! Marshalling between the host's JSON tree and Starlark values is
//! explicit and total over {None, bool, int, float, string, list,
//! dict}; integers outside the signed 64-bit range are rejected in
//! both directions. Tuples flatten to lists on the way out.

use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue};
use starlark::environment::{GlobalsBuilder, LibraryExtension, Module};
use starlark::eval::Evaluator;
use starlark::starlark_module;
use starlark::syntax::{AstModule, Dialect};
use starlark::values::dict::{AllocDict, DictRef};
use starlark::values::float::StarlarkFloat;
use starlark::values::list::ListRef;
use starlark::values::none::NoneType;
use starlark::values::tuple::TupleRef;
use starlark::values::{Heap, UnpackValue, Value, ValueLike};

use crate::error::{Result, ScriptError};
use crate::{finish_collect, finish_transform, http, ScriptOutput};

/// Execute a Starlark script against the host contract.
pub(crate) fn execute(
    script: &str,
    body: Map<String, JsonValue>,
    headers: Map<String, JsonValue>,
) -> Result<Option<ScriptOutput>> {
    let ast = AstModule::parse("transformation.star", script.to_owned(), &Dialect::Standard)
        .map_err(|e| ScriptError::Compile(e.to_string()))?;

    let globals = GlobalsBuilder::extended_by(&[LibraryExtension::Json])
        .with_struct("log", log_module)
        .with_struct("http", http_module)
        .build();

    let module = Module::new();
    let mut eval = Evaluator::new(&module);

    eval.eval_module(ast, &globals)
        .map_err(|e| ScriptError::Compile(e.to_string()))?;

    if let Some(function) = module.get("transform") {
        let body_value = alloc_json(module.heap(), &JsonValue::Object(body))?;
        let headers_value = alloc_json(module.heap(), &JsonValue::Object(headers.clone()))?;

        let result = eval
            .eval_function(function, &[body_value, headers_value], &[])
            .map_err(|e| ScriptError::Runtime(e.to_string()))?;
        return finish_transform(export(result)?, headers);
    }

    if let Some(function) = module.get("collect") {
        let result = eval
            .eval_function(function, &[], &[])
            .map_err(|e| ScriptError::Runtime(e.to_string()))?;
        return finish_collect(export(result)?);
    }

    Err(ScriptError::NoEntryFunction)
}

/// Script result → host tree; `None` is the filter signal.
fn export(value: Value) -> Result<Option<JsonValue>> {
    if value.is_none() {
        return Ok(None);
    }
    from_starlark(value).map(Some)
}

// =============================================================================
// Value marshalling
// =============================================================================

fn alloc_json<'v>(heap: &'v Heap, value: &JsonValue) -> Result<Value<'v>> {
    Ok(match value {
        JsonValue::Null => Value::new_none(),
        JsonValue::Bool(b) => Value::new_bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                heap.alloc(i)
            } else if n.is_u64() {
                return Err(ScriptError::IntOutOfRange);
            } else if let Some(f) = n.as_f64() {
                heap.alloc(f)
            } else {
                return Err(ScriptError::BadResult("unrepresentable number".into()));
            }
        }
        JsonValue::String(s) => heap.alloc(s.as_str()),
        JsonValue::Array(items) => {
            let values: Vec<Value> = items
                .iter()
                .map(|item| alloc_json(heap, item))
                .collect::<Result<_>>()?;
            heap.alloc(values)
        }
        JsonValue::Object(map) => {
            let entries: Vec<(Value, Value)> = map
                .iter()
                .map(|(key, value)| Ok((heap.alloc(key.as_str()), alloc_json(heap, value)?)))
                .collect::<Result<_>>()?;
            heap.alloc(AllocDict(entries))
        }
    })
}

fn from_starlark(value: Value) -> Result<JsonValue> {
    if value.is_none() {
        return Ok(JsonValue::Null);
    }
    if let Some(b) = value.unpack_bool() {
        return Ok(JsonValue::Bool(b));
    }
    if let Some(s) = value.unpack_str() {
        return Ok(JsonValue::String(s.to_owned()));
    }
    if value.get_type() == "int" {
        return match i64::unpack_value(value) {
            Some(i) => Ok(JsonValue::from(i)),
            None => Err(ScriptError::IntOutOfRange),
        };
    }
    if let Some(f) = value.downcast_ref::<StarlarkFloat>() {
        return serde_json::Number::from_f64(f.0)
            .map(JsonValue::Number)
            .ok_or_else(|| ScriptError::BadResult("non-finite float".into()));
    }
    if let Some(list) = ListRef::from_value(value) {
        let items: Vec<JsonValue> = list.iter().map(from_starlark).collect::<Result<_>>()?;
        return Ok(JsonValue::Array(items));
    }
    if let Some(tuple) = TupleRef::from_value(value) {
        let items: Vec<JsonValue> = tuple.iter().map(from_starlark).collect::<Result<_>>()?;
        return Ok(JsonValue::Array(items));
    }
    if let Some(dict) = DictRef::from_value(value) {
        let mut map = Map::new();
        for (key, item) in dict.iter() {
            let key = key.unpack_str().ok_or_else(|| {
                ScriptError::BadResult(format!("dict key must be a string, got {}", key.get_type()))
            })?;
            map.insert(key.to_owned(), from_starlark(item)?);
        }
        return Ok(JsonValue::Object(map));
    }

    Err(ScriptError::BadResult(format!(
        "unsupported value type: {}",
        value.get_type()
    )))
}

fn dict_to_string_map(value: Option<Value>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(dict) = value.and_then(DictRef::from_value) {
        for (key, item) in dict.iter() {
            if let (Some(key), Some(item)) = (key.unpack_str(), item.unpack_str()) {
                map.insert(key.to_owned(), item.to_owned());
            }
        }
    }
    map
}

fn response_dict<'v>(heap: &'v Heap, response: &crate::HttpResponse) -> Value<'v> {
    let headers: Vec<(Value, Value)> = response
        .headers
        .iter()
        .map(|(k, v)| (heap.alloc(k.as_str()), heap.alloc(v.as_str())))
        .collect();

    heap.alloc(AllocDict([
        (heap.alloc("status_code"), heap.alloc(response.status_code as i64)),
        (heap.alloc("body"), heap.alloc(response.body.as_str())),
        (heap.alloc("headers"), heap.alloc(AllocDict(headers))),
        (heap.alloc("error"), heap.alloc(response.error.as_str())),
    ]))
}

// =============================================================================
// Injected capabilities
// =============================================================================

#[starlark_module]
fn log_module(builder: &mut GlobalsBuilder) {
    fn debug(msg: &str) -> anyhow::Result<NoneType> {
        tracing::debug!(target: "script", "{msg}");
        Ok(NoneType)
    }

    fn info(msg: &str) -> anyhow::Result<NoneType> {
        tracing::info!(target: "script", "{msg}");
        Ok(NoneType)
    }

    fn warn(msg: &str) -> anyhow::Result<NoneType> {
        tracing::warn!(target: "script", "{msg}");
        Ok(NoneType)
    }

    fn error(msg: &str) -> anyhow::Result<NoneType> {
        tracing::error!(target: "script", "{msg}");
        Ok(NoneType)
    }
}

#[starlark_module]
fn http_module(builder: &mut GlobalsBuilder) {
    fn get<'v>(
        url: &str,
        headers: Option<Value<'v>>,
        heap: &'v Heap,
    ) -> anyhow::Result<Value<'v>> {
        let headers = dict_to_string_map(headers);
        let response = http::shared().get(url, &headers);
        Ok(response_dict(heap, &response))
    }

    fn post<'v>(
        url: &str,
        headers: Option<Value<'v>>,
        body: &str,
        heap: &'v Heap,
    ) -> anyhow::Result<Value<'v>> {
        let headers = dict_to_string_map(headers);
        let response = http::shared().post(url, &headers, body);
        Ok(response_dict(heap, &response))
    }
}
