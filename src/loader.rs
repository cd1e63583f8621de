//! Schema document loading from files and strings.
//!
//! A document is either a bare schema node or
//! `{ "definitions": { name: node }, "schema": node }`. Nodes are objects
//! tagged with `"type"` (or a plain type name as shorthand), and
//! `{ "$ref": name }` points at a definition. Definitions become lazy nodes,
//! so they may refer to themselves and to each other.

use std::path::Path;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::DocumentError;
use crate::schema::{LazySchema, Schema, SchemaDef, Shape, UnknownKeys};
use crate::types::{child_path, json_type_name};

/// A parsed schema document.
///
/// The document owns its definitions. References between definitions are
/// back-references, so keep the document alive while its schemas are used.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    root: Schema,
    definitions: IndexMap<String, Schema>,
}

impl SchemaDocument {
    pub fn root(&self) -> &Schema {
        &self.root
    }

    /// Lazy node of a named definition.
    pub fn definition(&self, name: &str) -> Option<&Schema> {
        self.definitions.get(name)
    }

    pub fn definitions(&self) -> &IndexMap<String, Schema> {
        &self.definitions
    }
}

/// Load a JSON value from a file path.
///
/// # Errors
///
/// Returns `DocumentError::FileNotFound` if the file doesn't exist,
/// or `DocumentError::InvalidJson` if the file isn't valid JSON.
pub fn load_json(path: &Path) -> Result<Value, DocumentError> {
    if !path.exists() {
        return Err(DocumentError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| DocumentError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_json_str(&content)
}

/// Load a JSON value from a string.
///
/// # Errors
///
/// Returns `DocumentError::InvalidJson` if the string isn't valid JSON.
pub fn load_json_str(content: &str) -> Result<Value, DocumentError> {
    serde_json::from_str(content).map_err(|source| DocumentError::InvalidJson { source })
}

/// Load and parse a schema document from a file path.
///
/// # Errors
///
/// Returns `DocumentError` if the file can't be read, isn't JSON, or isn't
/// a valid document.
pub fn load_document(path: &Path) -> Result<SchemaDocument, DocumentError> {
    let document = parse_document(&load_json(path)?)?;
    debug!(
        path = %path.display(),
        definitions = document.definitions.len(),
        "loaded schema document"
    );
    Ok(document)
}

/// Parse a schema document from a string.
///
/// # Errors
///
/// Returns `DocumentError` if the string isn't JSON or isn't a valid document.
pub fn load_document_str(content: &str) -> Result<SchemaDocument, DocumentError> {
    parse_document(&load_json_str(content)?)
}

/// Build a schema document from a JSON value.
///
/// # Errors
///
/// Returns `DocumentError::InvalidNode`, `UnknownType` or `UnknownRef` for
/// malformed nodes.
pub fn parse_document(value: &Value) -> Result<SchemaDocument, DocumentError> {
    let (definitions, root, root_path) = match value {
        Value::Object(map) if map.contains_key("schema") && !map.contains_key("type") => {
            let definitions = match map.get("definitions") {
                None => None,
                Some(Value::Object(definitions)) => Some(definitions),
                Some(other) => {
                    return Err(invalid_node(
                        "/definitions",
                        format!("expected object, got {}", json_type_name(other)),
                    ))
                }
            };
            (definitions, &map["schema"], "/schema")
        }
        _ => (None, value, ""),
    };

    // Every definition gets its lazy node first so bodies can refer to any of them.
    let handles: IndexMap<String, Schema> = definitions
        .into_iter()
        .flatten()
        .map(|(name, _)| {
            (
                name.clone(),
                Schema::from(SchemaDef::Lazy(LazySchema::pending())),
            )
        })
        .collect();

    let mut builder = Builder {
        definitions: &handles,
        in_definition: true,
    };
    for (name, body) in definitions.into_iter().flatten() {
        let target = builder.node(body, &child_path("/definitions", name))?;
        if let Some(handle) = handles.get(name) {
            if let SchemaDef::Lazy(lazy) = &*handle.def() {
                lazy.define(target);
            }
        }
    }

    builder.in_definition = false;
    let root = builder.node(root, root_path)?;

    Ok(SchemaDocument {
        root,
        definitions: handles,
    })
}

struct Builder<'a> {
    definitions: &'a IndexMap<String, Schema>,
    // References inside definition bodies are back-references.
    in_definition: bool,
}

impl Builder<'_> {
    fn node(&self, value: &Value, path: &str) -> Result<Schema, DocumentError> {
        let map = match value {
            Value::String(name) => return self.primitive(name, path),
            Value::Object(map) => map,
            other => {
                return Err(invalid_node(
                    path,
                    format!("expected object or type name, got {}", json_type_name(other)),
                ))
            }
        };

        if let Some(reference) = map.get("$ref") {
            return self.reference(reference, path);
        }

        let name = match map.get("type") {
            Some(Value::String(name)) => name.as_str(),
            Some(other) => {
                return Err(invalid_node(
                    path,
                    format!("\"type\" must be a string, got {}", json_type_name(other)),
                ))
            }
            None => return Err(invalid_node(path, "missing \"type\"")),
        };

        match name {
            "literal" => Ok(Schema::literal(required(map, "value", path)?.clone())),
            "custom" => {
                let name = match required(map, "name", path)? {
                    Value::String(name) => name.clone(),
                    other => {
                        return Err(invalid_node(
                            path,
                            format!("\"name\" must be a string, got {}", json_type_name(other)),
                        ))
                    }
                };
                // Predicates can't be expressed in JSON; document customs accept any value.
                Ok(Schema::custom(name, |_| true))
            }
            "object" => self.object(map, path),
            "union" => Ok(Schema::union(self.list(map, "options", path)?)),
            "intersection" => Ok(Schema::intersection(
                self.child(map, "left", path)?,
                self.child(map, "right", path)?,
            )),
            "tuple" => Ok(Schema::tuple(self.list(map, "items", path)?)),
            "array" => Ok(Schema::array(self.child(map, "element", path)?)),
            "record" => {
                let key = match map.get("key") {
                    Some(key) => self.node(key, &child_path(path, "key"))?,
                    None => Schema::string(),
                };
                Ok(Schema::record(key, self.child(map, "value", path)?))
            }
            "optional" => Ok(self.child(map, "inner", path)?.optional()),
            "nullable" => Ok(self.child(map, "inner", path)?.nullable()),
            "default" => {
                let fallback = required(map, "value", path)?.clone();
                Ok(self.child(map, "inner", path)?.with_default(fallback))
            }
            "catch" => {
                let fallback = required(map, "value", path)?.clone();
                Ok(self.child(map, "inner", path)?.catch(fallback))
            }
            other => self.primitive(other, path),
        }
    }

    fn primitive(&self, name: &str, path: &str) -> Result<Schema, DocumentError> {
        match name {
            "string" => Ok(Schema::string()),
            "number" => Ok(Schema::number()),
            "boolean" => Ok(Schema::boolean()),
            "date" => Ok(Schema::date()),
            "unknown" => Ok(Schema::unknown()),
            "never" => Ok(Schema::never()),
            other => Err(DocumentError::UnknownType {
                path: display_path(path),
                name: other.to_string(),
            }),
        }
    }

    fn reference(&self, reference: &Value, path: &str) -> Result<Schema, DocumentError> {
        let Value::String(name) = reference else {
            return Err(invalid_node(
                path,
                format!("\"$ref\" must be a string, got {}", json_type_name(reference)),
            ));
        };
        let name = name.strip_prefix("#/definitions/").unwrap_or(name);
        let handle = self
            .definitions
            .get(name)
            .ok_or_else(|| DocumentError::UnknownRef {
                path: display_path(path),
                name: name.to_string(),
            })?;

        if self.in_definition {
            Ok(handle.downgrade())
        } else {
            Ok(handle.clone())
        }
    }

    fn object(&self, map: &Map<String, Value>, path: &str) -> Result<Schema, DocumentError> {
        let shape_path = child_path(path, "shape");
        let mut shape = Shape::new();
        match map.get("shape") {
            None => {}
            Some(Value::Object(fields)) => {
                for (key, field) in fields {
                    shape.insert(key.clone(), self.node(field, &child_path(&shape_path, key))?);
                }
            }
            Some(other) => {
                return Err(invalid_node(
                    &shape_path,
                    format!("expected object, got {}", json_type_name(other)),
                ))
            }
        }

        let unknown_keys = match map.get("unknownKeys") {
            None => UnknownKeys::default(),
            Some(Value::String(policy)) => UnknownKeys::parse(policy).ok_or_else(|| {
                invalid_node(
                    &child_path(path, "unknownKeys"),
                    format!(
                        "unknown policy \"{}\" (expected strip, strict or passthrough)",
                        policy
                    ),
                )
            })?,
            Some(other) => {
                return Err(invalid_node(
                    &child_path(path, "unknownKeys"),
                    format!("expected string, got {}", json_type_name(other)),
                ))
            }
        };

        Ok(Schema::object_with(shape, unknown_keys))
    }

    fn child(
        &self,
        map: &Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Result<Schema, DocumentError> {
        self.node(required(map, key, path)?, &child_path(path, key))
    }

    fn list(
        &self,
        map: &Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Result<Vec<Schema>, DocumentError> {
        let list_path = child_path(path, key);
        let Value::Array(items) = required(map, key, path)? else {
            return Err(invalid_node(&list_path, "expected array"));
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.node(item, &child_path(&list_path, &i.to_string())))
            .collect()
    }
}

fn required<'v>(map: &'v Map<String, Value>, key: &str, path: &str) -> Result<&'v Value, DocumentError> {
    map.get(key)
        .ok_or_else(|| invalid_node(path, format!("missing \"{}\"", key)))
}

fn invalid_node(path: &str, message: impl Into<String>) -> DocumentError {
    DocumentError::InvalidNode {
        path: display_path(path),
        message: message.into(),
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}
