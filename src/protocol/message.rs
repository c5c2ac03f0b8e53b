//! Request and response shapes for the compute protocol.
//!
//! Requests are kept as the raw JSON value they arrived as: the cache key is
//! derived from the whole object, including `options`, so two requests that
//! differ only in their options are cached separately.

use std::time::Instant;

use serde_json::{json, Map, Value};
use thiserror::Error;

/// Compute mode selected by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Calc,
    Gpt,
}

impl Mode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "calc" => Some(Self::Calc),
            "gpt" => Some(Self::Gpt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calc => "calc",
            Self::Gpt => "gpt",
        }
    }

    /// Name of the `data` field this mode requires.
    pub fn payload_field(&self) -> &'static str {
        match self {
            Self::Calc => "expr",
            Self::Gpt => "prompt",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Bad request: request must be a JSON object")]
    NotAnObject,

    #[error("Bad request: unknown mode")]
    UnknownMode,

    #[error("Bad request: 'data' must be an object")]
    InvalidData,

    #[error("Bad request: '{0}' is required (string)")]
    MissingField(&'static str),

    #[error("Bad request: 'options' must be an object")]
    InvalidOptions,

    #[error("Bad request: 'options.cache' must be a boolean")]
    InvalidCacheOption,
}

/// A validated request. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Request {
    raw: Value,
    mode: Mode,
    payload: String,
    use_cache: bool,
}

impl Request {
    /// Validate a decoded frame: mode first, then the mode's payload field.
    pub fn from_value(raw: Value) -> Result<Self, ValidationError> {
        let object = raw.as_object().ok_or(ValidationError::NotAnObject)?;

        let mode = object
            .get("mode")
            .and_then(Value::as_str)
            .and_then(Mode::parse)
            .ok_or(ValidationError::UnknownMode)?;

        let data = match object.get("data") {
            None | Some(Value::Null) => None,
            Some(Value::Object(data)) => Some(data),
            Some(_) => return Err(ValidationError::InvalidData),
        };
        let field = mode.payload_field();
        let payload = data
            .and_then(|data| data.get(field))
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .ok_or(ValidationError::MissingField(field))?
            .to_string();

        let use_cache = read_cache_option(object)?;

        Ok(Self {
            raw,
            mode,
            payload,
            use_cache,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The expression (calc) or prompt (gpt).
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn cache_key(&self) -> String {
        cache_key(&self.raw)
    }
}

/// `options.cache`, defaulting to `true` when absent.
fn read_cache_option(object: &Map<String, Value>) -> Result<bool, ValidationError> {
    let options = match object.get("options") {
        None | Some(Value::Null) => return Ok(true),
        Some(Value::Object(options)) => options,
        Some(_) => return Err(ValidationError::InvalidOptions),
    };
    match options.get("cache") {
        None => Ok(true),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(_) => Err(ValidationError::InvalidCacheOption),
    }
}

/// Whether a request asks to bypass caches. Used by the proxy, which does not
/// validate requests beyond JSON syntax.
pub fn cache_disabled(request: &Value) -> bool {
    request
        .get("options")
        .and_then(|options| options.get("cache"))
        .map(|flag| flag == &Value::Bool(false))
        .unwrap_or(false)
}

/// Canonical cache key: compact JSON with object keys sorted at every level.
pub fn cache_key(request: &Value) -> String {
    serde_json::to_string(&canonicalize(request)).unwrap_or_default()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut keys: Vec<&String> = object.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(object.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&object[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Response metadata attached on success paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub from_cache: bool,
    pub took_ms: u64,
}

/// Response to a single request frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success { result: Value, meta: Meta },
    Failure { error: String },
}

impl Response {
    pub fn success(result: Value, from_cache: bool, took_ms: u64) -> Self {
        Self::Success {
            result,
            meta: Meta {
                from_cache,
                took_ms,
            },
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    /// Wire representation. Failures carry no `meta`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Success { result, meta } => json!({
                "ok": true,
                "result": result,
                "meta": {
                    "from_cache": meta.from_cache,
                    "took_ms": meta.took_ms,
                },
            }),
            Self::Failure { error } => json!({
                "ok": false,
                "error": error,
            }),
        }
    }
}

/// Deep-copy a stored response and stamp it with this request's provenance.
///
/// Only successful responses that already carry a `meta` object are touched;
/// anything else is returned as an unmodified copy.
pub fn rewrite_provenance(stored: &Value, from_cache: bool, took_ms: u64) -> Value {
    let mut copy = stored.clone();
    if copy.get("ok") != Some(&Value::Bool(true)) {
        return copy;
    }
    if let Some(meta) = copy.get_mut("meta").and_then(Value::as_object_mut) {
        meta.insert("from_cache".into(), Value::Bool(from_cache));
        meta.insert("took_ms".into(), Value::from(took_ms));
    }
    copy
}

/// Milliseconds elapsed since `started`, saturating.
pub fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
