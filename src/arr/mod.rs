//! Media organizer webhook payloads.
//!
//! Radarr, Sonarr and generic callers all post JSON objects. Only the paths
//! and an optional event kind are taken from them; everything else is
//! ignored.

use omniscan_common::EventKind;
use serde_json::{Map, Value};

/// Why a payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("webhook payload must be a JSON object")]
    NotAnObject,

    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("no path found in webhook payload")]
    MissingPath,
}

impl PayloadError {
    pub fn code(&self) -> &'static str {
        match self {
            PayloadError::NotAnObject => "invalid_payload",
            PayloadError::InvalidField { .. } => "invalid_field",
            PayloadError::MissingPath => "missing_path",
        }
    }
}

/// A validated webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    /// De-duplicated, in payload order
    pub paths: Vec<String>,
    pub kind: EventKind,
    /// Raw `eventType`/`kind` as sent
    pub event_type: Option<String>,
    /// Connection test from the organizer; acknowledged and ignored
    pub is_test: bool,
}

/// Nested string fields, as (object, field, reported name).
const NESTED_PATHS: &[(&str, &str, &str)] = &[
    ("movie", "folderPath", "movie.folderPath"),
    ("movieFile", "path", "movieFile.path"),
    ("series", "path", "series.path"),
    ("episodeFile", "path", "episodeFile.path"),
];

impl WebhookRequest {
    pub fn from_json(value: &Value) -> Result<Self, PayloadError> {
        let obj = value.as_object().ok_or(PayloadError::NotAnObject)?;

        let event_type = match obj.get("eventType").or_else(|| obj.get("kind")) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(PayloadError::InvalidField {
                    field: "eventType",
                    expected: "a string",
                })
            }
        };
        let is_test = event_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("test"));
        let kind = event_type
            .as_deref()
            .map(map_event_type)
            .unwrap_or(EventKind::Unknown);

        let mut paths = Vec::new();
        let mut push = |p: &str| {
            if !p.is_empty() && !paths.iter().any(|e: &String| e == p) {
                paths.push(p.to_string());
            }
        };

        if let Some(path) = string_field(obj, "path", "path")? {
            push(path);
        }
        match obj.get("paths") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    let path = item.as_str().ok_or(PayloadError::InvalidField {
                        field: "paths",
                        expected: "an array of strings",
                    })?;
                    push(path);
                }
            }
            Some(_) => {
                return Err(PayloadError::InvalidField {
                    field: "paths",
                    expected: "an array of strings",
                })
            }
        }
        for &(object, field, name) in NESTED_PATHS {
            if let Some(Value::Object(inner)) = obj.get(object) {
                if let Some(path) = string_field(inner, field, name)? {
                    push(path);
                }
            }
        }
        for field in ["sourcePath", "destPath"] {
            if let Some(path) = string_field(obj, field, field)? {
                push(path);
            }
        }

        if paths.is_empty() && !is_test {
            return Err(PayloadError::MissingPath);
        }

        Ok(Self {
            paths,
            kind,
            event_type,
            is_test,
        })
    }
}

fn string_field<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    name: &'static str,
) -> Result<Option<&'a str>, PayloadError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(PayloadError::InvalidField {
            field: name,
            expected: "a string",
        }),
    }
}

/// Organizer event names onto our kinds.
pub fn map_event_type(event_type: &str) -> EventKind {
    let lower = event_type.to_ascii_lowercase();
    if lower.contains("delete") {
        EventKind::Deleted
    } else if lower.contains("rename") {
        EventKind::Renamed
    } else if lower.contains("download") || lower.contains("upgrade") || lower.contains("import") {
        EventKind::Created
    } else {
        EventKind::Unknown
    }
}
