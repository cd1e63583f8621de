//! JSON Schema export.
//!
//! Produces a draft 2020-12 document for any [`Schema`]. Every lazy node is
//! exported once under `$defs` and referenced through `$ref`, which keeps
//! recursive schemas (and the select schemas derived from them) finite.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::schema::{Schema, SchemaDef, UnknownKeys};

/// `$schema` URI written at the root of exported documents.
pub const JSON_SCHEMA_DRAFT: &str = "https://json-schema.org/draft/2020-12/schema";

/// Export `schema` as a standalone JSON Schema document.
pub fn to_json_schema(schema: &Schema) -> Value {
    let mut exporter = Exporter::default();
    let body = exporter.export(schema);

    let mut document = Map::new();
    document.insert("$schema".into(), Value::String(JSON_SCHEMA_DRAFT.into()));
    if let Value::Object(body) = body {
        document.extend(body);
    }
    if !exporter.defs.is_empty() {
        document.insert("$defs".into(), Value::Object(exporter.defs));
    }
    Value::Object(document)
}

#[derive(Default)]
struct Exporter {
    defs: Map<String, Value>,
    names: HashMap<usize, String>,
    // Keeps exported lazy nodes alive so their ids stay unique.
    pinned: Vec<Schema>,
}

impl Exporter {
    fn export(&mut self, schema: &Schema) -> Value {
        let def = schema.def();
        match &*def {
            SchemaDef::Boolean => json!({ "type": "boolean" }),
            SchemaDef::String => json!({ "type": "string" }),
            SchemaDef::Number => json!({ "type": "number" }),
            SchemaDef::Date => json!({ "type": "string", "format": "date-time" }),
            SchemaDef::Literal(value) => json!({ "const": value }),
            SchemaDef::Unknown | SchemaDef::Catch(..) => json!({}),
            SchemaDef::Never => json!({ "not": {} }),
            SchemaDef::Custom(custom) => json!({ "title": custom.name() }),
            SchemaDef::Object(object) => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for (key, field) in object.shape() {
                    properties.insert(key.clone(), self.export(field));
                    if !field.accepts_absent() {
                        required.push(Value::String(key.clone()));
                    }
                }

                let mut out = Map::new();
                out.insert("type".into(), json!("object"));
                out.insert("properties".into(), Value::Object(properties));
                if !required.is_empty() {
                    out.insert("required".into(), Value::Array(required));
                }
                if object.unknown_keys() == UnknownKeys::Strict {
                    out.insert("additionalProperties".into(), Value::Bool(false));
                }
                Value::Object(out)
            }
            SchemaDef::Union(options) => {
                let options: Vec<Value> = options.iter().map(|o| self.export(o)).collect();
                json!({ "anyOf": options })
            }
            SchemaDef::Intersection(left, right) => {
                json!({ "allOf": [self.export(left), self.export(right)] })
            }
            SchemaDef::Tuple(items) => {
                let min_items = items
                    .iter()
                    .rposition(|item| !item.accepts_absent())
                    .map_or(0, |i| i + 1);
                let prefix: Vec<Value> = items.iter().map(|i| self.export(i)).collect();
                json!({
                    "type": "array",
                    "prefixItems": prefix,
                    "minItems": min_items,
                    "maxItems": items.len(),
                })
            }
            SchemaDef::Array(element) => {
                json!({ "type": "array", "items": self.export(element) })
            }
            SchemaDef::Record(key, value) => json!({
                "type": "object",
                "propertyNames": self.export(key),
                "additionalProperties": self.export(value),
            }),
            SchemaDef::Lazy(lazy) => {
                let name = match self.names.get(&schema.id()) {
                    Some(name) => name.clone(),
                    None => {
                        let name = format!("lazy{}", self.names.len());
                        self.names.insert(schema.id(), name.clone());
                        self.pinned.push(schema.clone());
                        let target = self.export(&lazy.resolve());
                        self.defs.insert(name.clone(), target);
                        name
                    }
                };
                json!({ "$ref": format!("#/$defs/{}", name) })
            }
            // Presence is expressed through the parent's `required` list.
            SchemaDef::Optional(inner) => self.export(inner),
            SchemaDef::Nullable(inner) => {
                json!({ "anyOf": [self.export(inner), { "type": "null" }] })
            }
            SchemaDef::Default(inner, value) => {
                let mut out = self.export(inner);
                if let Value::Object(map) = &mut out {
                    map.insert("default".into(), value.clone());
                }
                out
            }
        }
    }
}
