//! Display-ready rendering of errors for UI layers.

use serde::Serialize;

use crate::error::MirageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Fault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub title: Option<String>,
    pub summary: String,
    pub details: Option<String>,
    pub severity: Severity,
}

impl Message {
    pub fn new(summary: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: None,
            summary: summary.into(),
            details: None,
            severity,
        }
    }
}

impl From<&MirageError> for Message {
    fn from(err: &MirageError) -> Self {
        let default_title = match err {
            MirageError::Url(_) => "Invalid Address",
            MirageError::Json(_) => "Data Error",
            MirageError::Http(_) => "Network Error",
            MirageError::Csv(_) => "Export Failed",
        };
        let title = err.alert_title().unwrap_or(default_title).to_string();

        let summary = err
            .clarification()
            .map(str::to_string)
            .unwrap_or_else(|| err.summary());
        let mut details: Vec<String> = Vec::new();
        if let Some(text) = err.details() {
            details.push(text.to_string());
        }
        if let Some(text) = err.recovery() {
            details.push(text.to_string());
        }
        if let Some(refcode) = err.refcode() {
            details.push(format!("Reference: {refcode}"));
        }

        Self {
            title: Some(title),
            summary,
            details: (!details.is_empty()).then(|| details.join("\n\n")),
            severity: Severity::Error,
        }
    }
}
