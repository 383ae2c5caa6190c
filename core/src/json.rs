//! JSON encoding and decoding with diagnostic errors.
//!
//! # Design
//! Encoding goes through `serde_json::Value` so object keys come out sorted
//! regardless of struct field order; two encodings of equal values are
//! byte-identical. Dates use chrono's serde support (RFC 3339). Decoding
//! tolerates a leading UTF-8 byte-order mark, and a document serde_json
//! rejects on syntax gets a second pass as JSON5 (comments, trailing commas,
//! single quotes, unquoted keys). If that also fails, the strict error is
//! the one reported.
//!
//! Failures are classified from serde_json's error category and message
//! into a `JsonFailure`, so the error can say *which* key was missing
//! rather than only that decoding failed.

use std::any::type_name;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::error::Category;
use tracing::debug;

use crate::error::{JsonError, JsonFailure, JsonProcess};

const BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCoder {
    pretty: bool,
}

impl JsonCoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A coder that indents its output.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, JsonError> {
        let tree =
            serde_json::to_value(value).map_err(|err| failure::<T>(JsonProcess::Encode, err))?;
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(&tree)
        } else {
            serde_json::to_vec(&tree)
        };
        encoded.map_err(|err| failure::<T>(JsonProcess::Encode, err))
    }

    pub fn encode_to_string<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, JsonError> {
        let bytes = self.encode(value)?;
        // serde_json only ever emits UTF-8.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, JsonError> {
        let body = data.strip_prefix(BOM).unwrap_or(data);
        let err = match serde_json::from_slice(body) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if err.classify() == Category::Syntax {
            if let Some(value) = relaxed(body) {
                return Ok(value);
            }
        }
        Err(failure::<T>(JsonProcess::Decode, err).with_json_text(data))
    }
}

fn relaxed<T: DeserializeOwned>(body: &[u8]) -> Option<T> {
    let text = std::str::from_utf8(body).ok()?;
    let value = json5::from_str(text).ok()?;
    debug!(type_name = type_name::<T>(), "decoded as relaxed JSON");
    Some(value)
}

fn failure<T: ?Sized>(process: JsonProcess, err: serde_json::Error) -> JsonError {
    let kind = classify(&err);
    let location = if err.line() > 0 {
        format!(" at line {}, column {}", err.line(), err.column())
    } else {
        String::new()
    };
    let details = match &kind {
        JsonFailure::CorruptedData => format!("The JSON is malformed{location}."),
        JsonFailure::KeyNotFound { key } => {
            format!("Key `{key}` was not found{location}.")
        }
        JsonFailure::ValueNotFound => format!("A required value is null{location}."),
        JsonFailure::TypeMismatch => format!("A value has the wrong type{location}: {err}"),
        JsonFailure::Other => format!("{err}"),
    };
    let clarification = match process {
        JsonProcess::Encode => "The data could not be prepared for sending.",
        JsonProcess::Decode => "The data received could not be read.",
    };

    JsonError::new(process, kind)
        .with_clarification(clarification)
        .with_details(details)
        .with_user_info("type", type_name::<T>())
        .with_cause(err)
}

fn classify(err: &serde_json::Error) -> JsonFailure {
    match err.classify() {
        Category::Syntax | Category::Eof => JsonFailure::CorruptedData,
        Category::Io => JsonFailure::Other,
        Category::Data => {
            let message = err.to_string();
            if message.starts_with("missing field") {
                let key = message.split('`').nth(1).unwrap_or_default().to_string();
                JsonFailure::KeyNotFound { key }
            } else if message.starts_with("invalid type: null") {
                JsonFailure::ValueNotFound
            } else if message.starts_with("invalid type") || message.starts_with("invalid value")
            {
                JsonFailure::TypeMismatch
            } else {
                JsonFailure::Other
            }
        }
    }
}
