//! Select-schema derivation.
//!
//! [`build_select_schema`] turns a schema into a schema of selections: every
//! reachable field maps to `optional(union(boolean, <nested selection>))`
//! (`optional(boolean)` for plain leaves), so a value such as
//! `{ "user": { "id": true } }` names the fields to include in a result.
//!
//! The walk is identity-memoized through one cache per call, shared with
//! every deferred resolution the call produces. Lazy nodes are answered with
//! a deferred select node that is registered before its target is visited,
//! so a cycle back to the same lazy node gets that very node back.
//!
//! The cache owns every select node it builds. Deferred nodes are only ever
//! embedded as back-references, which keeps recursive select graphs free of
//! ownership cycles; [`SelectSchema`] keeps the cache alive.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::schema::{LazySchema, Schema, SchemaDef, SchemaKind, Shape, UnknownKeys};

/// A derived select schema.
///
/// Derefs to the compound select node (an object or record schema). Select
/// nodes reachable from it stay valid for as long as the `SelectSchema` (or
/// a clone of it) is alive.
#[derive(Debug, Clone)]
pub struct SelectSchema {
    schema: Schema,
    root: Schema,
    cache: Arc<Mutex<SelectCache>>,
}

impl SelectSchema {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The full `optional(union(boolean, ...))` envelope, or the deferred
    /// node wrapping it.
    pub fn envelope(&self) -> &Schema {
        &self.root
    }
}

impl Deref for SelectSchema {
    type Target = Schema;

    fn deref(&self) -> &Schema {
        &self.schema
    }
}

/// Build the select schema of `schema`.
///
/// Objects, records, unions, intersections and tuples (and lazy nodes
/// resolving to them) yield their compound select node directly; any other
/// schema yields `optional(boolean)`.
pub fn build_select_schema(schema: &Schema) -> SelectSchema {
    let cache = SelectCache::shared();
    let root = {
        let mut guard = cache.lock();
        let select = build_select(schema, &mut guard);
        debug!(
            kind = %schema.kind(),
            visited = guard.entries.len(),
            "built select schema"
        );
        guard.owner(&schema.unwrap_modifiers()).unwrap_or(select)
    };
    // Resolving the root runs deferred resolvers, which take the lock.
    let compound = compound_of(&root).unwrap_or_else(|| root.clone());
    SelectSchema {
        schema: compound,
        root,
        cache,
    }
}

struct CacheEntry {
    // Pins the source node so its id cannot be reused while cached.
    source: Schema,
    select: Schema,
}

struct SelectCache {
    entries: HashMap<usize, CacheEntry>,
    shared: Weak<Mutex<SelectCache>>,
}

impl fmt::Debug for SelectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectCache")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl SelectCache {
    fn shared() -> Arc<Mutex<SelectCache>> {
        Arc::new_cyclic(|shared| {
            Mutex::new(SelectCache {
                entries: HashMap::new(),
                shared: shared.clone(),
            })
        })
    }

    fn get(&self, source: &Schema) -> Option<Schema> {
        self.entries
            .get(&source.id())
            .map(|entry| embedded(&entry.select))
    }

    /// The owning handle of a cached select.
    fn owner(&self, source: &Schema) -> Option<Schema> {
        self.entries
            .get(&source.id())
            .map(|entry| entry.select.clone())
    }

    /// Register `select` and return the handle to embed in parent nodes.
    fn insert(&mut self, source: &Schema, select: Schema) -> Schema {
        let handle = embedded(&select);
        self.entries.insert(
            source.id(),
            CacheEntry {
                source: source.clone(),
                select,
            },
        );
        handle
    }
}

/// Deferred nodes are embedded as back-references; the cache owns them.
fn embedded(select: &Schema) -> Schema {
    if select.is_lazy() {
        select.downgrade()
    } else {
        select.clone()
    }
}

fn build_select(schema: &Schema, cache: &mut SelectCache) -> Schema {
    let node = schema.unwrap_modifiers();
    if let Some(hit) = cache.get(&node) {
        trace!(kind = %node.kind(), "select cache hit");
        return hit;
    }

    let def = node.def();
    let select = match &*def {
        SchemaDef::Lazy(_) => defer_lazy(&node, cache),
        SchemaDef::Object(object) => {
            let shape: Shape = object
                .shape()
                .iter()
                .map(|(key, field)| (key.clone(), build_select(field, cache)))
                .collect();
            let policy = if object.is_loose() {
                UnknownKeys::Passthrough
            } else {
                UnknownKeys::Strict
            };
            selectable(Schema::object_with(shape, policy))
        }
        SchemaDef::Record(key, value) => {
            selectable(Schema::record(key.clone(), build_select(value, cache)))
        }
        SchemaDef::Unknown => {
            Schema::recursive(|this| selectable(Schema::record(Schema::string(), this)))
        }
        SchemaDef::Intersection(left, right) => {
            merge_members(&[left.clone(), right.clone()], cache)
        }
        SchemaDef::Tuple(members) | SchemaDef::Union(members) => merge_members(members, cache),
        _ => Schema::boolean().optional(),
    };

    cache.insert(&node, select)
}

/// Deferred select for a lazy node.
///
/// The resolver builds the target's select through the same cache as the
/// call that created the node, so nodes seen on either side of a lazy
/// boundary share one select.
fn defer_lazy(source: &Schema, cache: &SelectCache) -> Schema {
    let shared = cache.shared.clone();
    let pinned = source.clone();
    Schema::from(SchemaDef::Lazy(LazySchema::deferred(move || {
        let Some(shared) = shared.upgrade() else {
            debug!("select schema dropped before deferred resolution");
            return Schema::never();
        };
        let target = pinned.resolve().unwrap_or_else(Schema::never);
        let mut cache = shared.lock();
        build_select(&target, &mut cache)
    })))
}

/// Merge the select shapes of union, intersection or tuple members.
///
/// Members whose select is still deferred cannot be inspected without
/// running resolvers, so the merge itself is deferred until first use.
fn merge_members(members: &[Schema], cache: &mut SelectCache) -> Schema {
    let selects: Vec<Schema> = members
        .iter()
        .map(|member| build_select(member, cache))
        .collect();

    if let Some(envelopes) = selects.iter().map(settled).collect::<Option<Vec<_>>>() {
        return merge_compounds(envelopes.iter().filter_map(envelope_compound));
    }

    debug!(members = selects.len(), "deferring select merge");
    Schema::from(SchemaDef::Lazy(LazySchema::deferred(move || {
        merge_compounds(selects.iter().filter_map(compound_of))
    })))
}

/// Last write wins per key.
///
/// Strict only if every contributing member is; with no object members the
/// merged object uses the default policy.
fn merge_compounds(compounds: impl Iterator<Item = Schema>) -> Schema {
    let mut shape = Shape::new();
    let mut strict = None;

    for compound in compounds {
        let def = compound.def();
        let SchemaDef::Object(object) = &*def else {
            continue;
        };
        for (key, field) in object.shape() {
            shape.insert(key.clone(), field.clone());
        }
        let member_strict = object.unknown_keys() == UnknownKeys::Strict;
        strict = Some(strict.unwrap_or(true) && member_strict);
    }

    let policy = match strict {
        None => UnknownKeys::Strip,
        Some(true) => UnknownKeys::Strict,
        Some(false) => UnknownKeys::Passthrough,
    };
    selectable(Schema::object_with(shape, policy))
}

fn selectable(compound: Schema) -> Schema {
    Schema::union([Schema::boolean(), compound]).optional()
}

/// The envelope behind already-resolved deferred nodes, or `None` while a
/// resolver has yet to run.
fn settled(select: &Schema) -> Option<Schema> {
    let mut seen = Vec::new();
    let mut current = select.clone();
    loop {
        let next = match &*current.def() {
            SchemaDef::Lazy(lazy) if lazy.is_resolved() => lazy.resolve(),
            SchemaDef::Lazy(_) => return None,
            _ => return Some(current),
        };
        if seen.contains(&current.id()) {
            return Some(Schema::never());
        }
        seen.push(current.id());
        current = next;
    }
}

/// The compound node of a select, resolving deferred nodes on the way.
fn compound_of(select: &Schema) -> Option<Schema> {
    if select.is_lazy() {
        envelope_compound(&select.concrete_target()?)
    } else {
        envelope_compound(select)
    }
}

/// The compound node of an `optional(union(boolean, compound))` envelope.
fn envelope_compound(envelope: &Schema) -> Option<Schema> {
    match &*envelope.def() {
        SchemaDef::Optional(inner) => match &*inner.def() {
            SchemaDef::Union(options)
                if options.len() == 2 && options[0].kind() == SchemaKind::Boolean =>
            {
                Some(options[1].clone())
            }
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn leaf_yields_optional_boolean() {
        let select = build_select_schema(&Schema::string());
        assert_eq!(select.kind(), SchemaKind::Optional);
        assert_eq!(select.base_type().kind(), SchemaKind::Boolean);
    }

    #[test]
    fn envelope_wraps_compound() {
        let select = build_select_schema(&Schema::object([("a", Schema::string())]));
        assert_eq!(select.kind(), SchemaKind::Object);
        assert_eq!(select.envelope().kind(), SchemaKind::Optional);
        assert!(select.envelope().is_valid(&json!(true)));
        assert!(select.envelope().is_valid(&json!({ "a": true })));
    }

    #[test]
    fn shared_subschema_is_built_once() {
        let address = Schema::object([("city", Schema::string())]);
        let schema = Schema::object([("home", address.clone()), ("work", address)]);
        let select = build_select_schema(&schema);
        let home = select.field("home").unwrap();
        let work = select.field("work").unwrap();
        assert!(Schema::ptr_eq(&home, &work));
    }

    #[test]
    fn array_of_objects_selects_element_fields() {
        let schema = Schema::object([(
            "items",
            Schema::array(Schema::object([("sku", Schema::string())])).optional(),
        )]);
        let select = build_select_schema(&schema);
        assert!(select.is_valid(&json!({ "items": { "sku": true } })));
        assert!(select.is_valid(&json!({ "items": true })));
        assert!(!select.is_valid(&json!({ "items": { "price": true } })));
    }

    #[test]
    fn wrappers_are_unwrapped_before_dispatch() {
        let schema = Schema::object([(
            "profile",
            Schema::object([("bio", Schema::string())])
                .nullable()
                .with_default(serde_json::Value::Null)
                .catch(serde_json::Value::Null),
        )]);
        let select = build_select_schema(&schema);
        assert!(select.is_valid(&json!({ "profile": { "bio": true } })));
    }

    #[test]
    fn union_of_primitives_merges_to_empty_object() {
        let select = build_select_schema(&Schema::union([Schema::string(), Schema::number()]));
        assert_eq!(select.kind(), SchemaKind::Object);
        assert!(select.keys().is_empty());
        assert!(matches!(
            &*select.def(),
            SchemaDef::Object(object) if object.unknown_keys() == UnknownKeys::Strip
        ));
        assert_eq!(select.parse(&json!({ "x": true })).unwrap(), json!({}));
    }

    #[test]
    fn node_shared_across_lazy_boundary_is_built_once() {
        let address = Schema::object([("city", Schema::string())]);
        let inner = address.clone();
        let schema = Schema::object([
            ("home", address),
            (
                "office",
                Schema::lazy(move || Schema::object([("address", inner.clone())])),
            ),
        ]);
        let select = build_select_schema(&schema);

        let office = compound_of(&select.field("office").unwrap()).unwrap();
        assert!(Schema::ptr_eq(
            &office.field("address").unwrap(),
            &select.field("home").unwrap()
        ));
    }

    #[test]
    fn deferred_nodes_are_embedded_as_back_references() {
        let node = Schema::recursive(|node| {
            Schema::object([("next", node.optional())])
        });
        let select = build_select_schema(&node);
        assert!(!select.envelope().is_back_reference());
        assert!(select.field("next").unwrap().is_back_reference());
    }

    #[test]
    fn deferred_resolution_after_drop_is_never() {
        let lazy = Schema::lazy(|| Schema::object([("a", Schema::string())]));
        let schema = Schema::object([("child", lazy)]);
        let field = build_select_schema(&schema).field("child").unwrap();
        assert_eq!(field.kind(), SchemaKind::Never);
    }

    #[test]
    fn later_members_overwrite_earlier_keys() {
        let schema = Schema::union([
            Schema::object([("id", Schema::string())]),
            Schema::object([("id", Schema::object([("value", Schema::string())]))]),
        ]);
        let select = build_select_schema(&schema);
        assert!(select.is_valid(&json!({ "id": { "value": true } })));
    }

    #[test]
    fn union_with_lazy_member_is_deferred() {
        let lazy = Schema::lazy(|| Schema::object([("a", Schema::string())]));
        let schema = Schema::object([(
            "choice",
            Schema::union([lazy, Schema::object([("b", Schema::number())])]),
        )]);
        let select = build_select_schema(&schema);
        let choice = select.field("choice").unwrap();
        assert_eq!(choice.kind(), SchemaKind::Lazy);
        assert!(select.is_valid(&json!({ "choice": { "a": true, "b": true } })));
        assert!(!select.is_valid(&json!({ "choice": { "c": true } })));
    }

    #[test]
    fn recursion_through_union_terminates() {
        let tree = Schema::recursive(|tree| {
            Schema::object([
                ("label", Schema::string()),
                ("children", Schema::array(Schema::union([tree, Schema::string()]))),
            ])
        });
        let select = build_select_schema(&tree);
        assert!(select.is_valid(&json!({
            "label": true,
            "children": { "label": true, "children": { "label": true } }
        })));
        assert!(!select.is_valid(&json!({ "children": { "size": true } })));
    }
}
