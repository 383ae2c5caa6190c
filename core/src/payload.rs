//! Request bodies: raw bytes, text, JSON, multipart and URL-encoded forms.
//!
//! # Design
//! Every encoder ends in a `Payload`: the bytes to send, the content type
//! to declare, and a one-line summary for logs. Summaries name fields and
//! count bytes; they never contain field values or file contents.

use std::any::type_name;
use std::collections::BTreeMap;

use serde::Serialize;
use url::form_urlencoded;
use uuid::Uuid;

use crate::error::JsonError;
use crate::json::JsonCoder;

pub const JSON: &str = "application/json";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const TEXT: &str = "text/plain; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Encoded body of an outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    data: Vec<u8>,
    content_type: Option<String>,
    type_name: Option<String>,
    summary: String,
}

impl Payload {
    pub fn empty() -> Self {
        Self {
            summary: "empty".to_string(),
            ..Self::default()
        }
    }

    pub fn bytes(data: Vec<u8>, content_type: Option<&str>) -> Self {
        let content_type = content_type.unwrap_or(OCTET_STREAM);
        Self {
            summary: format!("{content_type} ({} bytes)", data.len()),
            data,
            content_type: Some(content_type.to_string()),
            type_name: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        let data = text.into().into_bytes();
        Self {
            summary: format!("text ({} bytes)", data.len()),
            data,
            content_type: Some(TEXT.to_string()),
            type_name: None,
        }
    }

    pub fn json<T: Serialize + ?Sized>(coder: &JsonCoder, value: &T) -> Result<Self, JsonError> {
        let data = coder.encode(value)?;
        let name = type_name::<T>();
        Ok(Self {
            summary: format!("JSON {name} ({} bytes)", data.len()),
            data,
            content_type: Some(JSON.to_string()),
            type_name: Some(name.to_string()),
        })
    }

    pub fn multipart(form: &MultipartForm) -> Self {
        Self {
            data: form.encode(),
            content_type: Some(form.content_type()),
            type_name: None,
            summary: form.summary(),
        }
    }

    pub fn form(form: &UrlEncodedForm) -> Self {
        let data = form.encode().into_bytes();
        Self {
            summary: form.summary(data.len()),
            data,
            content_type: Some(FORM_URLENCODED.to_string()),
            type_name: None,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Rust type the payload was serialized from, for JSON payloads.
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartPart {
    Field {
        name: String,
        value: String,
    },
    Json {
        name: String,
        data: Vec<u8>,
    },
    File {
        name: String,
        filename: String,
        content_type: Option<String>,
        data: Vec<u8>,
    },
}

/// `multipart/form-data` body with ordered parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<MultipartPart>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    /// New form with a random boundary.
    pub fn new() -> Self {
        Self::with_boundary(format!("mirage-{}", Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart::Field {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn json<T: Serialize + ?Sized>(
        mut self,
        name: impl Into<String>,
        coder: &JsonCoder,
        value: &T,
    ) -> Result<Self, JsonError> {
        let data = coder.encode(value)?;
        self.parts.push(MultipartPart::Json {
            name: name.into(),
            data,
        });
        Ok(self)
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: Option<&str>,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push(MultipartPart::File {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.map(str::to_string),
            data,
        });
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            match part {
                MultipartPart::Field { name, value } => {
                    out.extend_from_slice(disposition(name, None).as_bytes());
                    out.extend_from_slice(b"\r\n");
                    out.extend_from_slice(value.as_bytes());
                }
                MultipartPart::Json { name, data } => {
                    out.extend_from_slice(disposition(name, None).as_bytes());
                    out.extend_from_slice(format!("Content-Type: {JSON}\r\n\r\n").as_bytes());
                    out.extend_from_slice(data);
                }
                MultipartPart::File {
                    name,
                    filename,
                    content_type,
                    data,
                } => {
                    let content_type = content_type.as_deref().unwrap_or(OCTET_STREAM);
                    out.extend_from_slice(disposition(name, Some(filename)).as_bytes());
                    out.extend_from_slice(
                        format!("Content-Type: {content_type}\r\n\r\n").as_bytes(),
                    );
                    out.extend_from_slice(data);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out
    }

    /// One entry per part, each reporting only its size.
    pub fn summary(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                MultipartPart::Field { name, value } => {
                    format!("{name}: text ({} bytes)", value.len())
                }
                MultipartPart::Json { name, data } => {
                    format!("{name}: JSON ({} bytes)", data.len())
                }
                MultipartPart::File {
                    name,
                    filename,
                    content_type,
                    data,
                } => format!(
                    "{name}: file {filename} ({}, {} bytes)",
                    content_type.as_deref().unwrap_or(OCTET_STREAM),
                    data.len()
                ),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn disposition(name: &str, filename: Option<&str>) -> String {
    match filename {
        Some(filename) => format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            escape_quoted(name),
            escape_quoted(filename)
        ),
        None => format!(
            "Content-Disposition: form-data; name=\"{}\"\r\n",
            escape_quoted(name)
        ),
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

// ---------------------------------------------------------------------------
// URL-encoded form
// ---------------------------------------------------------------------------

/// `application/x-www-form-urlencoded` body. Setting a name twice keeps
/// the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlEncodedForm {
    fields: BTreeMap<String, String>,
}

impl UrlEncodedForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `form [names] (N bytes)`, given the encoded length.
    fn summary(&self, encoded_len: usize) -> String {
        let names = self.fields.keys().map(String::as_str).collect::<Vec<_>>();
        format!("form [{}] ({encoded_len} bytes)", names.join(", "))
    }

    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.fields)
            .finish()
    }
}
