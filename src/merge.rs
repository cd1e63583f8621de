//! Combining several selections of one schema.
//!
//! [`merge_select`] only normalizes its arguments into a list. The list is
//! turned into a schema by [`resolve_selection`], which refines every shape
//! against the source and deep-merges the results.

use tracing::debug;

use crate::error::RefineError;
use crate::refine::{refine_schema, RefineShape};
use crate::schema::{Schema, SchemaDef, Shape, UnknownKeys};

/// One selection: a refine shape or a ready-made schema.
#[derive(Debug, Clone)]
pub enum Select {
    Shape(RefineShape),
    Schema(Schema),
}

impl From<RefineShape> for Select {
    fn from(shape: RefineShape) -> Self {
        Select::Shape(shape)
    }
}

impl From<Schema> for Select {
    fn from(schema: Schema) -> Self {
        Select::Schema(schema)
    }
}

/// Additional selections: a single one or an ordered list.
#[derive(Debug, Clone)]
pub enum MultiSelect {
    One(Select),
    Many(Vec<Select>),
}

impl From<Select> for MultiSelect {
    fn from(select: Select) -> Self {
        MultiSelect::One(select)
    }
}

impl From<Vec<Select>> for MultiSelect {
    fn from(selects: Vec<Select>) -> Self {
        MultiSelect::Many(selects)
    }
}

/// Normalize a primary selection plus optional extras into one list.
///
/// Without extras the list pairs `primary` with the full `schema`.
pub fn merge_select(
    schema: &Schema,
    primary: impl Into<Select>,
    additional: Option<MultiSelect>,
) -> Vec<Select> {
    let primary = primary.into();
    match additional {
        None => vec![primary, Select::Schema(schema.clone())],
        Some(MultiSelect::Many(rest)) => {
            let mut selects = Vec::with_capacity(rest.len() + 1);
            selects.push(primary);
            selects.extend(rest);
            selects
        }
        Some(MultiSelect::One(other)) => vec![primary, other],
    }
}

/// Build the schema a list of selections describes.
///
/// Shapes are refined against `schema`; schemas are taken as they are. An
/// empty list yields `schema` itself.
///
/// # Errors
///
/// Returns `RefineError` if a shape is applied to a schema that is neither
/// an object nor a union.
pub fn resolve_selection(schema: &Schema, selects: &[Select]) -> Result<Schema, RefineError> {
    let mut merged: Option<Schema> = None;
    for select in selects {
        let next = match select {
            Select::Shape(shape) => refine_schema(schema, shape)?,
            Select::Schema(other) => other.clone(),
        };
        merged = Some(match merged {
            Some(current) => merge_schemas(&current, &next),
            None => next,
        });
    }
    debug!(selects = selects.len(), "resolved selection");
    Ok(merged.unwrap_or_else(|| schema.clone()))
}

/// Deep-merge two schemas.
///
/// Objects merge key-wise and matching wrappers merge their inner types.
/// Anything else that is not the same node becomes a union of both.
fn merge_schemas(a: &Schema, b: &Schema) -> Schema {
    if Schema::ptr_eq(a, b) {
        return a.clone();
    }

    let (left, right) = (a.def(), b.def());
    match (&*left, &*right) {
        (SchemaDef::Object(left), SchemaDef::Object(right)) => {
            let mut shape: Shape = left.shape().clone();
            for (key, field) in right.shape() {
                let merged = match shape.get(key) {
                    Some(existing) => merge_schemas(existing, field),
                    None => field.clone(),
                };
                shape.insert(key.clone(), merged);
            }
            let unknown_keys = match (left.unknown_keys(), right.unknown_keys()) {
                (UnknownKeys::Strict, UnknownKeys::Strict) => UnknownKeys::Strict,
                (UnknownKeys::Passthrough, _) | (_, UnknownKeys::Passthrough) => {
                    UnknownKeys::Passthrough
                }
                _ => UnknownKeys::Strip,
            };
            Schema::object_with(shape, unknown_keys)
        }
        (SchemaDef::Optional(left), SchemaDef::Optional(right)) => {
            merge_schemas(left, right).optional()
        }
        (SchemaDef::Nullable(left), SchemaDef::Nullable(right)) => {
            merge_schemas(left, right).nullable()
        }
        (SchemaDef::Array(left), SchemaDef::Array(right)) => {
            Schema::array(merge_schemas(left, right))
        }
        _ => Schema::union([a.clone(), b.clone()]),
    }
}
