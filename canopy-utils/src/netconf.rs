//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

/// NETCONF `error-type` classifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Application,
    Protocol,
}

/// NETCONF `error-tag` closed set (RFC 6241, appendix A).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    MissingElement,
    UnknownElement,
    BadAttribute,
    OperationFailed,
    DataMissing,
    DataExists,
    AccessDenied,
    LockDenied,
}

/// NETCONF `error-severity`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Error,
    Warning,
}

/// A single NETCONF `rpc-error` element.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RpcError {
    pub error_type: ErrorType,
    pub error_tag: ErrorTag,
    pub error_severity: ErrorSeverity,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_app_tag: Option<String>,
}

/// Accumulating buffer of `rpc-error` elements.
///
/// Validation passes push into the buffer and keep going; the caller
/// decides whether to stop at the first entry.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RpcErrors(Vec<RpcError>);

// ===== impl ErrorTag =====

impl ErrorTag {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::BadAttribute => "bad-attribute",
            ErrorTag::OperationFailed => "operation-failed",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::AccessDenied => "access-denied",
            ErrorTag::LockDenied => "lock-denied",
        }
    }
}

impl std::fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ===== impl RpcError =====

impl RpcError {
    pub fn new(error_tag: ErrorTag, error_message: impl Into<String>) -> Self {
        RpcError {
            error_type: ErrorType::Application,
            error_tag,
            error_severity: ErrorSeverity::Error,
            error_message: error_message.into(),
            error_path: None,
            error_app_tag: None,
        }
    }

    #[must_use]
    pub fn protocol(mut self) -> Self {
        self.error_type = ErrorType::Protocol;
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.error_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_app_tag(mut self, app_tag: impl Into<String>) -> Self {
        self.error_app_tag = Some(app_tag.into());
        self
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error_tag)?;
        if let Some(path) = &self.error_path {
            write!(f, " ({path})")?;
        }
        write!(f, ": {}", self.error_message)
    }
}

// ===== impl RpcErrors =====

impl RpcErrors {
    pub fn push(&mut self, error: RpcError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<&RpcError> {
        self.0.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RpcError> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<RpcError> {
        self.0
    }
}

impl std::fmt::Display for RpcErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl From<RpcError> for RpcErrors {
    fn from(error: RpcError) -> RpcErrors {
        RpcErrors(vec![error])
    }
}

impl IntoIterator for RpcErrors {
    type Item = RpcError;
    type IntoIter = std::vec::IntoIter<RpcError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
