//! Request validation against a route's merged schema.
//!
//! # Responsibilities
//! - Check headers, query/querystring, params and body against their schema
//! - Coerce string values to the declared scalar type for non-body targets
//! - Fill in `default` values of missing properties
//!
//! # Design Decisions
//! - Supports the keywords in `SUPPORTED_KEYWORDS` and the formats in
//!   `SUPPORTED_FORMATS`; `unsupported_keywords` lists anything else so the
//!   loader can warn about it
//! - All failures of a request are reported together as one 400

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{LazyLock, RwLock};

use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::http::exchange::{Exchange, RequestError};
use crate::routing::schema::{RouteSchema, SchemaTarget};

/// Validate the exchange in place. Coerced values and defaults are written back.
pub fn validate_exchange(schema: &RouteSchema, exchange: &mut Exchange) -> Result<(), RequestError> {
    let mut errors = Vec::new();

    for (target, target_schema) in schema.iter() {
        match target {
            SchemaTarget::Headers => {
                let mut headers = Value::Object(exchange.headers_object());
                validate(target_schema, &mut headers, target.as_str(), true, &mut errors);
            }
            SchemaTarget::Query | SchemaTarget::Querystring => {
                let mut query = Value::Object(std::mem::take(&mut exchange.query));
                validate(target_schema, &mut query, target.as_str(), true, &mut errors);
                exchange.query = into_object(query);
            }
            SchemaTarget::Params => {
                let mut params = Value::Object(std::mem::take(&mut exchange.params));
                validate(target_schema, &mut params, target.as_str(), true, &mut errors);
                exchange.params = into_object(params);
            }
            SchemaTarget::Body => {
                let mut body = exchange.body.take().unwrap_or(Value::Null);
                validate(target_schema, &mut body, target.as_str(), false, &mut errors);
                exchange.body = (!body.is_null()).then_some(body);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(RequestError::bad_request(errors.join(", ")))
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Keywords `validate` checks or accepts as annotations.
pub const SUPPORTED_KEYWORDS: &[&str] = &[
    "type",
    "enum",
    "const",
    "properties",
    "required",
    "additionalProperties",
    "minProperties",
    "maxProperties",
    "items",
    "minItems",
    "maxItems",
    "uniqueItems",
    "minLength",
    "maxLength",
    "pattern",
    "format",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "default",
    "title",
    "description",
    "examples",
    "$id",
    "$schema",
    "$comment",
];

/// Values of `format` that `validate` checks.
pub const SUPPORTED_FORMATS: &[&str] = &["email", "uri", "uuid", "date", "date-time", "hostname", "ipv4", "ipv6"];

/// Keywords of `schema` and its subschemas that `validate` would skip,
/// as JSON-pointer-like paths (`properties/name/minContains`).
///
/// Fails if a `pattern` is not a valid regular expression.
pub fn unsupported_keywords(schema: &Value) -> Result<Vec<String>, String> {
    let mut unsupported = Vec::new();
    collect_unsupported(schema, "", &mut unsupported)?;
    Ok(unsupported)
}

fn collect_unsupported(schema: &Value, at: &str, out: &mut Vec<String>) -> Result<(), String> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };
    let here = |key: &str| if at.is_empty() { key.to_string() } else { format!("{}/{}", at, key) };

    for (key, value) in schema {
        if !SUPPORTED_KEYWORDS.contains(&key.as_str()) {
            out.push(here(key));
            continue;
        }
        match key.as_str() {
            "properties" => {
                for (name, property) in value.as_object().into_iter().flatten() {
                    collect_unsupported(property, &format!("{}/{}", here(key), name), out)?;
                }
            }
            "items" | "not" | "additionalProperties" => collect_unsupported(value, &here(key), out)?,
            "allOf" | "anyOf" | "oneOf" => {
                for (i, sub) in value.as_array().into_iter().flatten().enumerate() {
                    collect_unsupported(sub, &format!("{}/{}", here(key), i), out)?;
                }
            }
            "pattern" => {
                let pattern = value.as_str().unwrap_or_default();
                Regex::new(pattern).map_err(|e| format!("invalid pattern at {}: {}", here(key), e))?;
            }
            "format" => {
                if !value.as_str().is_some_and(|f| SUPPORTED_FORMATS.contains(&f)) {
                    out.push(format!("{}={}", here(key), value));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Validate `value` against `schema`, appending messages to `errors`.
pub fn validate(schema: &Value, value: &mut Value, path: &str, coerce: bool, errors: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        let types: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !types.is_empty() && !types.iter().any(|t| matches_type(t, value)) {
            let coerced = coerce
                .then(|| types.iter().find_map(|t| coerce_to(t, value)))
                .flatten();
            match coerced {
                Some(v) => *value = v,
                None => {
                    errors.push(format!("{} must be {}", path, types.join(",")));
                    return;
                }
            }
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            errors.push(format!("{} must be equal to one of the allowed values", path));
        }
    }
    if let Some(expected) = schema.get("const") {
        if expected != value {
            errors.push(format!("{} must be equal to constant", path));
        }
    }

    validate_combinators(schema, value, path, coerce, errors);

    match value {
        Value::Object(object) => validate_object(schema, object, path, coerce, errors),
        Value::Array(items) => {
            if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
                if (items.len() as u64) < min {
                    errors.push(format!("{} must NOT have fewer than {} items", path, min));
                }
            }
            if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
                if (items.len() as u64) > max {
                    errors.push(format!("{} must NOT have more than {} items", path, max));
                }
            }
            if schema.get("uniqueItems") == Some(&Value::Bool(true)) {
                let duplicate = items
                    .iter()
                    .enumerate()
                    .any(|(i, item)| items[..i].contains(item));
                if duplicate {
                    errors.push(format!("{} must NOT have duplicate items", path));
                }
            }
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter_mut().enumerate() {
                    validate(item_schema, item, &format!("{}/{}", path, i), coerce, errors);
                }
            }
        }
        Value::String(text) => {
            let len = text.chars().count() as u64;
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if len < min {
                    errors.push(format!("{} must NOT have fewer than {} characters", path, min));
                }
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                if len > max {
                    errors.push(format!("{} must NOT have more than {} characters", path, max));
                }
            }
            if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
                if matches_pattern(pattern, text) == Some(false) {
                    errors.push(format!("{} must match pattern \"{}\"", path, pattern));
                }
            }
            if let Some(format) = schema.get("format").and_then(Value::as_str) {
                if matches_format(format, text) == Some(false) {
                    errors.push(format!("{} must match format \"{}\"", path, format));
                }
            }
        }
        Value::Number(number) => {
            let n = number.as_f64().unwrap_or(0.0);
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
                if n < min {
                    errors.push(format!("{} must be >= {}", path, min));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
                if n > max {
                    errors.push(format!("{} must be <= {}", path, max));
                }
            }
            if let Some(min) = schema.get("exclusiveMinimum").and_then(Value::as_f64) {
                if n <= min {
                    errors.push(format!("{} must be > {}", path, min));
                }
            }
            if let Some(max) = schema.get("exclusiveMaximum").and_then(Value::as_f64) {
                if n >= max {
                    errors.push(format!("{} must be < {}", path, max));
                }
            }
            if let Some(step) = schema.get("multipleOf").and_then(Value::as_f64) {
                let quotient = n / step;
                if step > 0.0 && (quotient - quotient.round()).abs() > 1e-9 {
                    errors.push(format!("{} must be multiple of {}", path, step));
                }
            }
        }
        _ => {}
    }
}

/// `allOf`, `anyOf`, `oneOf` and `not`. Coercions made by the branch that
/// decides the outcome are kept.
fn validate_combinators(
    schema: &Map<String, Value>,
    value: &mut Value,
    path: &str,
    coerce: bool,
    errors: &mut Vec<String>,
) {
    if let Some(all) = schema.get("allOf").and_then(Value::as_array) {
        for sub in all {
            validate(sub, value, path, coerce, errors);
        }
    }

    let passing = |subs: &[Value], value: &Value| -> Vec<Value> {
        subs.iter()
            .filter_map(|sub| {
                let mut candidate = value.clone();
                let mut sub_errors = Vec::new();
                validate(sub, &mut candidate, path, coerce, &mut sub_errors);
                sub_errors.is_empty().then_some(candidate)
            })
            .collect()
    };

    if let Some(any) = schema.get("anyOf").and_then(Value::as_array) {
        match passing(any, value).into_iter().next() {
            Some(candidate) => *value = candidate,
            None => errors.push(format!("{} must match a schema in anyOf", path)),
        }
    }
    if let Some(one) = schema.get("oneOf").and_then(Value::as_array) {
        let mut matched = passing(one, value);
        if matched.len() == 1 {
            *value = matched.remove(0);
        } else {
            errors.push(format!("{} must match exactly one schema in oneOf", path));
        }
    }
    if let Some(not) = schema.get("not") {
        if passing(std::slice::from_ref(not), value).len() == 1 {
            errors.push(format!("{} must NOT be valid", path));
        }
    }
}

static PATTERNS: LazyLock<RwLock<HashMap<String, Regex>>> = LazyLock::new(Default::default);

/// `None` if `pattern` does not compile; the loader rejects those up front.
fn matches_pattern(pattern: &str, text: &str) -> Option<bool> {
    if let Some(regex) = PATTERNS.read().ok()?.get(pattern) {
        return Some(regex.is_match(text));
    }
    let regex = Regex::new(pattern).ok()?;
    let matched = regex.is_match(text);
    if let Ok(mut cache) = PATTERNS.write() {
        cache.insert(pattern.to_string(), regex);
    }
    Some(matched)
}

type FormatRegex = LazyLock<Option<Regex>>;

static EMAIL: FormatRegex = LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());
static URI: FormatRegex = LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:[^\s]*$").ok());
static UUID: FormatRegex = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").ok()
});
static DATE: FormatRegex = LazyLock::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$").ok());
static DATE_TIME: FormatRegex = LazyLock::new(|| {
    Regex::new(
        r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])[Tt ]([01]\d|2[0-3]):[0-5]\d:([0-5]\d|60)(\.\d+)?([Zz]|[+-]([01]\d|2[0-3]):[0-5]\d)$",
    )
    .ok()
});
static HOSTNAME: FormatRegex = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*$").ok()
});

fn is_match(regex: &FormatRegex, text: &str) -> Option<bool> {
    regex.as_ref().map(|regex| regex.is_match(text))
}

/// `None` for formats outside `SUPPORTED_FORMATS`.
fn matches_format(format: &str, text: &str) -> Option<bool> {
    match format {
        "email" => is_match(&EMAIL, text),
        "uri" => is_match(&URI, text),
        "uuid" => is_match(&UUID, text),
        "date" => is_match(&DATE, text),
        "date-time" => is_match(&DATE_TIME, text),
        "hostname" => is_match(&HOSTNAME, text).map(|ok| ok && text.len() <= 253),
        "ipv4" => Some(text.parse::<Ipv4Addr>().is_ok()),
        "ipv6" => Some(text.parse::<Ipv6Addr>().is_ok()),
        _ => None,
    }
}

fn validate_object(
    schema: &Map<String, Value>,
    object: &mut Map<String, Value>,
    path: &str,
    coerce: bool,
    errors: &mut Vec<String>,
) {
    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(properties) = properties {
        for (name, property) in properties {
            if !object.contains_key(name) {
                if let Some(default) = property.get("default") {
                    object.insert(name.clone(), default.clone());
                }
            }
            if let Some(value) = object.get_mut(name) {
                validate(property, value, &format!("{}/{}", path, name), coerce, errors);
            }
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(name) {
                errors.push(format!("{} must have required property '{}'", path, name));
            }
        }
    }

    let declared = |name: &str| properties.is_some_and(|p| p.contains_key(name));
    match schema.get("additionalProperties") {
        Some(Value::Bool(false)) => {
            for name in object.keys().filter(|name| !declared(name)) {
                errors.push(format!("{} must NOT have additional property '{}'", path, name));
            }
        }
        Some(extra @ Value::Object(_)) => {
            for (name, value) in object.iter_mut().filter(|(name, _)| !declared(name)) {
                validate(extra, value, &format!("{}/{}", path, name), coerce, errors);
            }
        }
        _ => {}
    }

    let count = object.len() as u64;
    if let Some(min) = schema.get("minProperties").and_then(Value::as_u64) {
        if count < min {
            errors.push(format!("{} must NOT have fewer than {} properties", path, min));
        }
    }
    if let Some(max) = schema.get("maxProperties").and_then(Value::as_u64) {
        if count > max {
            errors.push(format!("{} must NOT have more than {} properties", path, max));
        }
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn coerce_to(expected: &str, value: &Value) -> Option<Value> {
    let text = value.as_str()?;
    match expected {
        "integer" => text.parse::<i64>().ok().map(Value::from),
        "number" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        "boolean" => match text {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}
