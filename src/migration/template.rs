//! `{{ path }}` substitution for manifest values.
//!
//! A string that is exactly one template is replaced by the JSON value at the path, keeping
//! its type. Templates embedded in longer strings are interpolated as text and must resolve
//! to scalars. Paths are dotted; numeric segments index arrays.
//!
//! Roots:
//! - `signer`: the signer address
//! - `previous.<path>`: the state before the migration (health check and down only)
//! - anything else: the state being acted on

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::errors::ManifestError;
use crate::state::NetworkState;

static TEMPLATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").unwrap());

static WHOLE_TEMPLATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}$").unwrap());

const SIGNER_ROOT: &str = "signer";
const PREVIOUS_ROOT: &str = "previous";

/// The values templates can see.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub signer: &'a str,
    pub current: &'a NetworkState,
    pub previous: Option<&'a NetworkState>,
}

impl<'a> Scope<'a> {
    pub fn new(signer: &'a str, current: &'a NetworkState) -> Self {
        Self {
            signer,
            current,
            previous: None,
        }
    }

    pub fn with_previous(mut self, previous: &'a NetworkState) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Value at a dotted path, or `None` if any segment is missing.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        if path == SIGNER_ROOT {
            return Some(Value::String(self.signer.to_string()));
        }
        let (root, rest) = match path.split_once('.') {
            Some((PREVIOUS_ROOT, rest)) => (self.previous?, rest),
            _ => (self.current, path),
        };
        lookup_path(root, rest).cloned()
    }

    /// Resolve every template inside `value`, recursing into arrays and objects.
    pub fn resolve(&self, value: &Value) -> Result<Value, ManifestError> {
        match value {
            Value::String(s) => self.resolve_str(s),
            Value::Array(items) => items
                .iter()
                .map(|v| self.resolve(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    pub fn resolve_all(&self, values: &[Value]) -> Result<Vec<Value>, ManifestError> {
        values.iter().map(|v| self.resolve(v)).collect()
    }

    /// Resolve a template string.
    pub fn resolve_str(&self, template: &str) -> Result<Value, ManifestError> {
        if let Some(caps) = WHOLE_TEMPLATE_REGEX.captures(template) {
            let path = &caps[1];
            return self.lookup(path).ok_or_else(|| ManifestError::UnresolvedPath {
                template: template.to_string(),
                path: path.to_string(),
            });
        }

        if !TEMPLATE_REGEX.is_match(template) {
            return Ok(Value::String(template.to_string()));
        }

        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in TEMPLATE_REGEX.captures_iter(template) {
            let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&template[last..whole.start()]);
            let value =
                self.lookup(path.as_str())
                    .ok_or_else(|| ManifestError::UnresolvedPath {
                        template: template.to_string(),
                        path: path.as_str().to_string(),
                    })?;
            match value {
                Value::String(s) => out.push_str(&s),
                Value::Number(n) => out.push_str(&n.to_string()),
                Value::Bool(b) => out.push_str(&b.to_string()),
                _ => {
                    return Err(ManifestError::NonScalarInterpolation {
                        template: template.to_string(),
                    });
                }
            }
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(Value::String(out))
    }

    /// Resolve a template that must produce an address string.
    pub fn resolve_address(&self, field: &str, template: &str) -> Result<String, ManifestError> {
        match self.resolve_str(template)? {
            Value::String(s) if !s.is_empty() => Ok(s),
            other => Err(ManifestError::NotAnAddress {
                field: field.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

fn lookup_path<'v>(state: &'v NetworkState, path: &str) -> Option<&'v Value> {
    let mut segments = path.split('.');
    let mut value = state.get(segments.next()?)?;
    for segment in segments {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Set `key` in `state`. A dotted key writes into nested objects, creating them.
pub fn set_path(state: &mut NetworkState, key: &str, value: Value) {
    let mut segments: Vec<&str> = key.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut map = state;
    for segment in segments {
        let entry = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(serde_json::Map::new());
        }
        let Value::Object(inner) = entry else {
            return;
        };
        map = inner;
    }
    map.insert(last.to_string(), value);
}

/// Remove `key` from `state`, returning the old value.
pub fn remove_path(state: &mut NetworkState, key: &str) -> Option<Value> {
    match key.rsplit_once('.') {
        None => state.remove(key),
        Some((parent, last)) => {
            let mut map = state;
            for segment in parent.split('.') {
                map = map.get_mut(segment)?.as_object_mut()?;
            }
            map.remove(last)
        }
    }
}

/// Value at a dotted key in a state, without template syntax.
pub fn get_path<'v>(state: &'v NetworkState, key: &str) -> Option<&'v Value> {
    lookup_path(state, key)
}
