//! Schema Select
//!
//! Derive selection and refinement views of object validation schemas.
//!
//! Given a [`Schema`], this library builds:
//!
//! - a *select schema* ([`build_select_schema`]) whose values name the fields
//!   of the source schema to include in a result, and
//! - a *refined schema* ([`refine_schema`]) narrowed to the fields a
//!   [`RefineShape`] descriptor names, with optional per-field transforms.
//!
//! Recursive schemas are supported through lazy nodes; both derivations
//! terminate on cyclic graphs.
//!
//! # Example
//!
//! ```
//! use schema_select::{build_select_schema, refine_schema, RefineShape, Schema};
//! use serde_json::json;
//!
//! let user = Schema::object([
//!     ("id", Schema::string()),
//!     ("profile", Schema::object([("displayName", Schema::string())])),
//!     ("age", Schema::number().optional()),
//! ]);
//!
//! // Which fields may be selected
//! let select = build_select_schema(&user);
//! assert!(select.is_valid(&json!({ "id": true, "profile": { "displayName": true } })));
//! assert!(!select.is_valid(&json!({ "email": true })));
//!
//! // The schema narrowed to a selection
//! let shape = RefineShape::new()
//!     .keep("id")
//!     .nest("profile", RefineShape::new().keep("displayName"));
//! let refined = refine_schema(&user, &shape).unwrap();
//! assert_eq!(refined.keys(), vec!["id", "profile"]);
//! ```
//!
//! # Select Values
//!
//! | Schema field | Accepted select value |
//! |--------------|-----------------------|
//! | leaf (string, number, ...) | `true` / `false` / absent |
//! | object, record | `true` / `false` / nested select object / absent |
//! | array of objects | same as its element |
//! | union, intersection, tuple | nested select over the merged fields of its members |
//! | unknown | `true` / `false` / a record of nested selects, at any depth |
//!
//! # Refine Descriptors
//!
//! Descriptors can be built in code or read from JSON:
//! ```json
//! { "firstName": true, "address": { "city": true }, "age": false }
//! ```

mod error;
mod export;
mod loader;
mod merge;
mod parse;
mod refine;
mod schema;
mod select;
mod types;
mod validator;

pub use error::{
    DocumentError, Issue, IssueCode, ParseError, RefineError, SchemaError, ValidateError,
};
pub use export::{to_json_schema, JSON_SCHEMA_DRAFT};
pub use loader::{
    load_document, load_document_str, load_json, load_json_str, parse_document, SchemaDocument,
};
pub use merge::{merge_select, resolve_selection, MultiSelect, Select};
pub use refine::{refine_schema, refine_schema_with, Refine, RefineShape, TransformFn};
pub use schema::{
    CustomSchema, LazySchema, ObjectSchema, Predicate, Schema, SchemaDef, SchemaKind, Shape,
    UnknownKeys,
};
pub use select::{build_select_schema, SelectSchema};
pub use types::RefineOptions;
pub use validator::{validate, validate_against_json_schema};
