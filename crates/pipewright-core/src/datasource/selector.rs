use jaq_interpret::{Ctx, FilterT, ParseCtx, RcIter, Val};
use pipewright_kit::types::diagnostics::Diagnostic;
use serde_json::{Map, Value as JsonValue};

/// Applies a jq-style result selector to a raw data source response.
/// Zero outputs collapse to `null` ("no data"), a single output is returned
/// as-is, multiple outputs are wrapped in an array.
pub fn select(selector: &str, input: &JsonValue) -> Result<JsonValue, Diagnostic> {
    let mut defs = ParseCtx::new(Vec::new());

    let (filter, errs) = jaq_parse::parse(selector, jaq_parse::main());
    if let Some(err) = errs.first() {
        return Err(Diagnostic::error_from_string(format!(
            "invalid result selector '{}': {}",
            selector, err
        )));
    }
    let Some(filter) = filter else {
        return Err(Diagnostic::error_from_string(format!(
            "invalid result selector '{}'",
            selector
        )));
    };

    let filter = defs.compile(filter);
    if let Some((err, _)) = defs.errs.first() {
        return Err(Diagnostic::error_from_string(format!(
            "invalid result selector '{}': {}",
            selector, err
        )));
    }

    let inputs = RcIter::new(core::iter::empty());
    let mut outputs = vec![];
    for output in filter.run((Ctx::new([], &inputs), Val::from(input.clone()))) {
        let val = output.map_err(|e| {
            Diagnostic::error_from_string(format!(
                "result selector '{}' failed: {}",
                selector, e
            ))
        })?;
        outputs.push(json_from_jaq(&val)?);
    }

    Ok(match outputs.len() {
        0 => JsonValue::Null,
        1 => outputs.swap_remove(0),
        _ => JsonValue::Array(outputs),
    })
}

fn json_from_jaq(value: &Val) -> Result<JsonValue, Diagnostic> {
    let res = match value {
        Val::Null => JsonValue::Null,
        Val::Bool(val) => JsonValue::Bool(*val),
        Val::Num(val) => {
            if let Ok(int) = val.parse::<i64>() {
                JsonValue::Number(serde_json::Number::from(int))
            } else {
                let float = val.parse::<f64>().map_err(|e| {
                    Diagnostic::error_from_string(format!("failed to parse number: {}", e))
                })?;
                serde_json::Number::from_f64(float)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null)
            }
        }
        Val::Int(val) => JsonValue::Number(serde_json::Number::from(*val as i64)),
        Val::Float(val) => serde_json::Number::from_f64(*val)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Val::Str(val) => JsonValue::String(val.to_string()),
        Val::Arr(val) => JsonValue::Array(
            val.iter().map(json_from_jaq).collect::<Result<Vec<JsonValue>, Diagnostic>>()?,
        ),
        Val::Obj(val) => JsonValue::Object(
            val.iter()
                .map(|(k, v)| json_from_jaq(v).map(|v| (k.to_string(), v)))
                .collect::<Result<Map<String, JsonValue>, Diagnostic>>()?,
        ),
    };
    Ok(res)
}
