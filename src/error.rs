//! Error types for schema refinement, parsing, loading and validation.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::schema::SchemaKind;

/// Errors raised while refining a schema.
#[derive(Debug, Error)]
pub enum RefineError {
    #[error("unsupported schema kind for refinement: {kind} (expected object or union)")]
    UnsupportedSchema { kind: SchemaKind },

    #[error("invalid refine descriptor at {path}: expected boolean or object, got {actual}")]
    InvalidDescriptor { path: String, actual: String },
}

impl RefineError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors raised while loading schema documents and JSON inputs.
#[derive(Debug, Error)]
pub enum DocumentError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    // Document errors (exit code 2)
    #[error("invalid schema node at {path}: {message}")]
    InvalidNode { path: String, message: String },

    #[error("unknown schema type \"{name}\" at {path}")]
    UnknownType { path: String, name: String },

    #[error("unknown definition \"{name}\" referenced at {path}")]
    UnknownRef { path: String, name: String },
}

impl DocumentError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            DocumentError::FileNotFound { .. } | DocumentError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}

/// Machine-readable category of a parse issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    InvalidType,
    InvalidLiteral,
    InvalidDate,
    UnrecognizedKeys,
    InvalidUnion,
    InvalidIntersectionTypes,
    TooBig,
    Custom,
}

/// Single parse failure with path context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    /// JSON Pointer (RFC 6901) to the offending value.
    pub path: String,
    pub code: IssueCode,
    /// Human-readable error message.
    pub message: String,
    /// Issues of each union alternative, for `invalid_union`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub union_errors: Vec<Vec<Issue>>,
}

impl Issue {
    pub fn new(path: &str, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            code,
            message: message.into(),
            union_errors: Vec::new(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{}: {}", path, self.message)
    }
}

/// Structured parse failure: every issue found in the input.
#[derive(Debug, Clone, Error)]
#[error("parse failed with {} issue(s)", issues.len())]
pub struct ParseError {
    pub issues: Vec<Issue>,
}

impl ParseError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Errors during JSON Schema validation.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("invalid JSON Schema: {message}")]
    InvalidSchema { message: String },

    #[error("validation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<SchemaError> },
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::InvalidSchema { .. } => 2,
            ValidateError::Invalid { .. } => 1,
        }
    }
}

/// Single JSON Schema validation error with path context.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaError {
    /// JSON Pointer (RFC 6901) to the invalid field.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
