use regex::Regex;
use serde_json::Value;
use smithrun_core::ensure_object;

const REDACTED: &str = "[REDACTED]";

pub const DEFAULT_MAX_FIELD_BYTES: usize = 100_000;

/// Redacts then truncates payloads before they leave the process.
#[derive(Clone, Debug)]
pub struct Sanitizer {
    redact: Option<Regex>,
    max_bytes: usize,
}

impl Sanitizer {
    pub fn new(redact: Option<Regex>, max_bytes: usize) -> Self {
        Self { redact, max_bytes }
    }

    pub fn object(&self, value: Value) -> Value {
        ensure_object(self.scrub(value))
    }

    pub fn text(&self, value: Value) -> String {
        match self.scrub(value) {
            Value::String(text) => text,
            other => other.to_string(),
        }
    }

    fn scrub(&self, value: Value) -> Value {
        truncate_value(sanitize_value(value, self.redact.as_ref()), self.max_bytes)
    }
}

pub fn sanitize_value(value: Value, regex: Option<&Regex>) -> Value {
    let Some(pattern) = regex else {
        return value;
    };
    map_strings(value, &|text: String| pattern.replace_all(&text, REDACTED).into_owned())
}

pub fn truncate_value(value: Value, max_bytes: usize) -> Value {
    map_strings(value, &|text: String| truncate_string(text, max_bytes))
}

fn map_strings(value: Value, f: &dyn Fn(String) -> String) -> Value {
    match value {
        Value::String(text) => Value::String(f(text)),
        Value::Array(items) => Value::Array(items.into_iter().map(|item| map_strings(item, f)).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, map_strings(value, f)))
                .collect(),
        ),
        other => other,
    }
}

fn truncate_string(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}
