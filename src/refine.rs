//! Schema refinement - narrows an object or union schema to a descriptor.
//!
//! A [`RefineShape`] names the fields to keep. Each entry either keeps the
//! field as is, descends into it with a nested shape, replaces it with a
//! given schema, or maps it through a function. Fields the shape does not
//! name are dropped; names the schema does not have are ignored.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::RefineError;
use crate::schema::{ObjectSchema, Schema, SchemaDef, Shape, UnknownKeys};
use crate::types::{child_path, json_type_name, RefineOptions};

/// Function applied to a field schema by [`Refine::Transform`].
pub type TransformFn = Arc<dyn Fn(&Schema) -> Schema + Send + Sync>;

/// What to do with one selected field.
#[derive(Clone)]
pub enum Refine {
    /// Keep the field schema unchanged (`true` in JSON descriptors).
    Keep,
    /// Refine the field's object, union or array structure.
    Shape(RefineShape),
    /// Replace the field schema with the function's result.
    Transform(TransformFn),
    /// Replace the field schema outright.
    Replace(Schema),
}

impl fmt::Debug for Refine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refine::Keep => f.write_str("Keep"),
            Refine::Shape(shape) => f.debug_tuple("Shape").field(shape).finish(),
            Refine::Transform(_) => f.write_str("Transform(..)"),
            Refine::Replace(schema) => f.debug_tuple("Replace").field(schema).finish(),
        }
    }
}

impl From<RefineShape> for Refine {
    fn from(shape: RefineShape) -> Self {
        Refine::Shape(shape)
    }
}

impl From<Schema> for Refine {
    fn from(schema: Schema) -> Self {
        Refine::Replace(schema)
    }
}

/// Ordered mapping of field names to [`Refine`] entries.
#[derive(Debug, Clone, Default)]
pub struct RefineShape {
    fields: IndexMap<String, Refine>,
}

impl RefineShape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `key` unchanged.
    pub fn keep(self, key: impl Into<String>) -> Self {
        self.insert(key, Refine::Keep)
    }

    /// Descend into `key` with a nested shape.
    pub fn nest(self, key: impl Into<String>, shape: RefineShape) -> Self {
        self.insert(key, Refine::Shape(shape))
    }

    /// Map `key`'s schema through `transform`.
    pub fn transform(
        self,
        key: impl Into<String>,
        transform: impl Fn(&Schema) -> Schema + Send + Sync + 'static,
    ) -> Self {
        self.insert(key, Refine::Transform(Arc::new(transform)))
    }

    /// Replace `key`'s schema with `schema`.
    pub fn replace(self, key: impl Into<String>, schema: Schema) -> Self {
        self.insert(key, Refine::Replace(schema))
    }

    pub fn insert(mut self, key: impl Into<String>, refine: impl Into<Refine>) -> Self {
        self.fields.insert(key.into(), refine.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Refine> {
        self.fields.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Refine)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a shape from a JSON descriptor.
    ///
    /// `true` keeps a field, `false` leaves it out, and an object nests.
    ///
    /// # Errors
    ///
    /// Returns `RefineError::InvalidDescriptor` for any other value.
    pub fn from_json(descriptor: &Value) -> Result<Self, RefineError> {
        shape_from_json(descriptor, "")
    }
}

impl Refine {
    /// Build one entry from a JSON descriptor value.
    ///
    /// Returns `Ok(None)` for `false`.
    pub fn from_json(value: &Value) -> Result<Option<Self>, RefineError> {
        refine_from_json(value, "")
    }
}

fn shape_from_json(descriptor: &Value, path: &str) -> Result<RefineShape, RefineError> {
    let Value::Object(map) = descriptor else {
        return Err(invalid_descriptor(path, descriptor));
    };

    let mut shape = RefineShape::new();
    for (key, value) in map {
        if let Some(refine) = refine_from_json(value, &child_path(path, key))? {
            shape = shape.insert(key.clone(), refine);
        }
    }
    Ok(shape)
}

fn refine_from_json(value: &Value, path: &str) -> Result<Option<Refine>, RefineError> {
    match value {
        Value::Bool(true) => Ok(Some(Refine::Keep)),
        Value::Bool(false) => Ok(None),
        Value::Object(_) => Ok(Some(Refine::Shape(shape_from_json(value, path)?))),
        other => Err(invalid_descriptor(path, other)),
    }
}

fn invalid_descriptor(path: &str, value: &Value) -> RefineError {
    RefineError::InvalidDescriptor {
        path: if path.is_empty() { "/".into() } else { path.into() },
        actual: json_type_name(value).into(),
    }
}

/// Refine an object or union schema with default options.
///
/// # Errors
///
/// Returns `RefineError::UnsupportedSchema` if `schema` is neither an object
/// nor a union.
pub fn refine_schema(schema: &Schema, shape: &RefineShape) -> Result<Schema, RefineError> {
    refine_schema_with(schema, shape, &RefineOptions::default())
}

/// Refine an object or union schema.
///
/// Objects keep the fields named by `shape`, in the shape's order. Unions
/// apply `shape` to every alternative and keep their order and count.
///
/// # Errors
///
/// Returns `RefineError::UnsupportedSchema` if `schema` is neither an object
/// nor a union.
pub fn refine_schema_with(
    schema: &Schema,
    shape: &RefineShape,
    options: &RefineOptions,
) -> Result<Schema, RefineError> {
    let def = schema.def();
    let refined = match &*def {
        SchemaDef::Object(object) => refine_object(object, shape, options),
        SchemaDef::Union(members) => refine_union(members, shape, options),
        other => return Err(RefineError::UnsupportedSchema { kind: other.kind() }),
    };
    debug!(kind = %schema.kind(), fields = shape.len(), "refined schema");
    Ok(refined)
}

fn refine_object(object: &ObjectSchema, shape: &RefineShape, options: &RefineOptions) -> Schema {
    let mut fields = Shape::new();
    for (key, refine) in shape.iter() {
        match object.shape().get(key) {
            Some(child) => {
                fields.insert(key.clone(), refine_field(child, refine, options));
            }
            None => trace!(key = %key, "descriptor key not in object, ignored"),
        }
    }

    let unknown_keys = if options.preserve_unknown_keys {
        object.unknown_keys()
    } else {
        UnknownKeys::default()
    };
    Schema::object_with(fields, unknown_keys)
}

fn refine_union(members: &[Schema], shape: &RefineShape, options: &RefineOptions) -> Schema {
    Schema::union(
        members
            .iter()
            .map(|member| refine_nested(member, shape, options)),
    )
}

fn refine_field(child: &Schema, refine: &Refine, options: &RefineOptions) -> Schema {
    match refine {
        Refine::Keep => child.clone(),
        Refine::Transform(transform) => transform(child),
        Refine::Replace(schema) => schema.clone(),
        Refine::Shape(shape) => refine_nested(child, shape, options),
    }
}

/// Apply a nested shape to a field, keeping its wrappers in place.
fn refine_nested(child: &Schema, shape: &RefineShape, options: &RefineOptions) -> Schema {
    let def = child.def();
    match &*def {
        SchemaDef::Object(object) => refine_object(object, shape, options),
        SchemaDef::Union(members) => refine_union(members, shape, options),
        SchemaDef::Array(element) => Schema::array(refine_nested(element, shape, options)),
        SchemaDef::Optional(inner) => refine_nested(inner, shape, options).optional(),
        SchemaDef::Nullable(inner) => refine_nested(inner, shape, options).nullable(),
        SchemaDef::Default(inner, value) => {
            refine_nested(inner, shape, options).with_default(value.clone())
        }
        SchemaDef::Catch(inner, value) => refine_nested(inner, shape, options).catch(value.clone()),
        SchemaDef::Lazy(_) => match child.concrete_target() {
            Some(target) => refine_nested(&target, shape, options),
            None => child.clone(),
        },
        other => {
            trace!(kind = %other.kind(), "nested descriptor on leaf, passing through");
            child.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaKind;
    use serde_json::json;

    fn person() -> Schema {
        Schema::object([
            ("age", Schema::number().optional()),
            ("firstName", Schema::string()),
            ("lastName", Schema::string()),
        ])
    }

    mod descriptors {
        use super::*;

        #[test]
        fn from_json_keeps_true_and_drops_false() {
            let shape =
                RefineShape::from_json(&json!({ "a": true, "b": false, "c": { "d": true } }))
                    .unwrap();
            assert_eq!(shape.len(), 2);
            assert!(matches!(shape.get("a"), Some(Refine::Keep)));
            assert!(shape.get("b").is_none());
            match shape.get("c") {
                Some(Refine::Shape(nested)) => assert!(nested.get("d").is_some()),
                other => panic!("expected nested shape, got {:?}", other),
            }
        }

        #[test]
        fn from_json_rejects_other_values() {
            let err = RefineShape::from_json(&json!({ "user": { "id": "yes" } })).unwrap_err();
            match err {
                RefineError::InvalidDescriptor { path, actual } => {
                    assert_eq!(path, "/user/id");
                    assert_eq!(actual, "string");
                }
                other => panic!("expected InvalidDescriptor, got {:?}", other),
            }
        }

        #[test]
        fn from_json_requires_object_root() {
            let err = RefineShape::from_json(&json!(true)).unwrap_err();
            assert!(matches!(
                err,
                RefineError::InvalidDescriptor { ref path, .. } if path == "/"
            ));
        }

        #[test]
        fn single_entry_from_json() {
            assert!(matches!(Refine::from_json(&json!(true)), Ok(Some(Refine::Keep))));
            assert!(matches!(Refine::from_json(&json!(false)), Ok(None)));
            assert!(Refine::from_json(&json!(1)).is_err());
        }
    }

    mod objects {
        use super::*;

        #[test]
        fn keeps_only_named_fields() {
            let shape = RefineShape::new().keep("firstName").keep("lastName");
            let refined = refine_schema(&person(), &shape).unwrap();
            assert_eq!(refined.keys(), vec!["firstName", "lastName"]);
        }

        #[test]
        fn kept_fields_share_source_nodes() {
            let source = person();
            let refined = refine_schema(&source, &RefineShape::new().keep("lastName")).unwrap();
            assert!(Schema::ptr_eq(
                &refined.field("lastName").unwrap(),
                &source.field("lastName").unwrap()
            ));
        }

        #[test]
        fn unknown_descriptor_keys_are_ignored() {
            let shape = RefineShape::new().keep("firstName").keep("nickname");
            let refined = refine_schema(&person(), &shape).unwrap();
            assert_eq!(refined.keys(), vec!["firstName"]);
        }

        #[test]
        fn rebuilt_with_strip_policy_by_default() {
            let source = person().strict();
            let refined = refine_schema(&source, &RefineShape::new().keep("firstName")).unwrap();
            let def = refined.def();
            let SchemaDef::Object(object) = &*def else {
                panic!("expected object");
            };
            assert_eq!(object.unknown_keys(), UnknownKeys::Strip);
        }

        #[test]
        fn preserve_unknown_keys_option() {
            let source = person().strict();
            let options = RefineOptions::new().preserve_unknown_keys(true);
            let refined =
                refine_schema_with(&source, &RefineShape::new().keep("firstName"), &options)
                    .unwrap();
            assert!(!refined.is_valid(&json!({ "firstName": "a", "age": 3 })));
        }

        #[test]
        fn replace_and_transform() {
            let shape = RefineShape::new()
                .replace("firstName", Schema::number())
                .transform("lastName", |schema| schema.clone().optional());
            let refined = refine_schema(&person(), &shape).unwrap();
            assert_eq!(refined.field("firstName").unwrap().kind(), SchemaKind::Number);
            assert_eq!(refined.field("lastName").unwrap().kind(), SchemaKind::Optional);
        }
    }

    mod nesting {
        use super::*;

        #[test]
        fn default_and_catch_are_rewrapped() {
            let source = Schema::object([(
                "profile",
                Schema::object([("bio", Schema::string()), ("age", Schema::number())])
                    .with_default(json!({ "bio": "none" }))
                    .catch(json!({ "bio": "broken" })),
            )]);
            let shape = RefineShape::new().nest("profile", RefineShape::new().keep("bio"));
            let refined = refine_schema(&source, &shape).unwrap();

            let profile = refined.field("profile").unwrap();
            assert_eq!(profile.kind(), SchemaKind::Catch);
            let inner = profile.inner_type().unwrap();
            assert_eq!(inner.kind(), SchemaKind::Default);
            assert_eq!(inner.inner_type().unwrap().keys(), vec!["bio"]);

            assert_eq!(
                refined.parse(&json!({})).unwrap(),
                json!({ "profile": { "bio": "none" } })
            );
        }

        #[test]
        fn lazy_field_is_resolved_one_level() {
            let tree = Schema::recursive(|tree| {
                Schema::object([
                    ("label", Schema::string()),
                    ("weight", Schema::number()),
                    ("next", tree.optional()),
                ])
            });
            let source = Schema::object([("root", tree)]);
            let shape = RefineShape::new().nest(
                "root",
                RefineShape::new()
                    .keep("label")
                    .nest("next", RefineShape::new().keep("weight")),
            );
            let refined = refine_schema(&source, &shape).unwrap();
            let value = json!({
                "root": { "label": "a", "weight": 1, "next": { "label": "b", "weight": 2 } }
            });
            assert_eq!(
                refined.parse(&value).unwrap(),
                json!({ "root": { "label": "a", "next": { "weight": 2 } } })
            );
        }

        #[test]
        fn pure_lazy_cycle_passes_through() {
            let cycle = Schema::recursive(|this| this);
            let source = Schema::object([("loop", cycle.clone())]);
            let shape = RefineShape::new().nest("loop", RefineShape::new().keep("x"));
            let refined = refine_schema(&source, &shape).unwrap();
            assert!(Schema::ptr_eq(&refined.field("loop").unwrap(), &cycle));
        }

        #[test]
        fn leaf_with_nested_descriptor_is_unchanged() {
            let source = Schema::object([("name", Schema::string())]);
            let shape = RefineShape::new().nest("name", RefineShape::new().keep("first"));
            let refined = refine_schema(&source, &shape).unwrap();
            assert!(Schema::ptr_eq(
                &refined.field("name").unwrap(),
                &source.field("name").unwrap()
            ));
        }
    }

    #[test]
    fn unsupported_kinds_fail() {
        for schema in [
            Schema::string(),
            Schema::array(person()),
            person().optional(),
            Schema::lazy(person),
        ] {
            let err = refine_schema(&schema, &RefineShape::new()).unwrap_err();
            assert!(matches!(err, RefineError::UnsupportedSchema { .. }));
        }
    }
}
