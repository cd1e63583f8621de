//! Schema node model.
//!
//! A [`Schema`] is a cheap-to-clone handle to an immutable node. Nodes are
//! plain data ([`SchemaDef`]) and are compared by identity, never by
//! structure: [`Schema::id`] and [`Schema::ptr_eq`] are what the select
//! builder and the exporters key their caches on.
//!
//! Recursive shapes go through [`SchemaDef::Lazy`]. A handle either owns its
//! node or is a back-reference to it; [`Schema::recursive`] hands the body a
//! back-reference to the node being built, so self-referential graphs never
//! form ownership cycles.

use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock, Weak};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Ordered field mapping of an object schema.
pub type Shape = IndexMap<String, Schema>;

/// Predicate used by [`SchemaDef::Custom`] leaves.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

type Resolver = Box<dyn Fn() -> Schema + Send + Sync>;

/// Node a dangling back-reference resolves to.
static DANGLING: LazyLock<Arc<SchemaDef>> = LazyLock::new(|| Arc::new(SchemaDef::Never));

/// How an object schema treats keys that are not part of its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKeys {
    /// Unknown keys are accepted and dropped from the parsed output.
    #[default]
    Strip,
    /// Unknown keys are a validation failure.
    Strict,
    /// Unknown keys are accepted and kept (a "loose" object).
    Passthrough,
}

impl UnknownKeys {
    /// Parse a policy name (`strip`, `strict`, `passthrough`).
    ///
    /// `loose` is accepted as an alias of `passthrough`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "strip" => Some(UnknownKeys::Strip),
            "strict" => Some(UnknownKeys::Strict),
            "passthrough" | "loose" => Some(UnknownKeys::Passthrough),
            _ => None,
        }
    }
}

/// Discriminator of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Boolean,
    String,
    Number,
    Date,
    Literal,
    Unknown,
    Never,
    Custom,
    Object,
    Union,
    Intersection,
    Tuple,
    Array,
    Record,
    Lazy,
    Optional,
    Nullable,
    Default,
    Catch,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Boolean => "boolean",
            SchemaKind::String => "string",
            SchemaKind::Number => "number",
            SchemaKind::Date => "date",
            SchemaKind::Literal => "literal",
            SchemaKind::Unknown => "unknown",
            SchemaKind::Never => "never",
            SchemaKind::Custom => "custom",
            SchemaKind::Object => "object",
            SchemaKind::Union => "union",
            SchemaKind::Intersection => "intersection",
            SchemaKind::Tuple => "tuple",
            SchemaKind::Array => "array",
            SchemaKind::Record => "record",
            SchemaKind::Lazy => "lazy",
            SchemaKind::Optional => "optional",
            SchemaKind::Nullable => "nullable",
            SchemaKind::Default => "default",
            SchemaKind::Catch => "catch",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object node: ordered shape plus unknown-key policy.
#[derive(Clone, Debug)]
pub struct ObjectSchema {
    shape: Shape,
    unknown_keys: UnknownKeys,
}

impl ObjectSchema {
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn unknown_keys(&self) -> UnknownKeys {
        self.unknown_keys
    }

    /// True for passthrough objects, which accept keys outside their shape.
    pub fn is_loose(&self) -> bool {
        self.unknown_keys == UnknownKeys::Passthrough
    }
}

/// Opaque named leaf validated by a predicate.
#[derive(Clone)]
pub struct CustomSchema {
    name: String,
    check: Predicate,
}

impl CustomSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, value: &Value) -> bool {
        (self.check)(value)
    }
}

impl fmt::Debug for CustomSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Custom").field(&self.name).finish()
    }
}

/// Deferred reference to another schema.
///
/// The resolver runs at most once; its result is memoized.
pub struct LazySchema {
    resolver: Option<Resolver>,
    resolved: OnceLock<Schema>,
}

impl LazySchema {
    pub(crate) fn deferred(resolver: impl Fn() -> Schema + Send + Sync + 'static) -> Self {
        Self {
            resolver: Some(Box::new(resolver)),
            resolved: OnceLock::new(),
        }
    }

    pub(crate) fn resolved(target: Schema) -> Self {
        let resolved = OnceLock::new();
        let _ = resolved.set(target);
        Self {
            resolver: None,
            resolved,
        }
    }

    /// A lazy node whose target is supplied later through [`LazySchema::define`].
    pub(crate) fn pending() -> Self {
        Self {
            resolver: None,
            resolved: OnceLock::new(),
        }
    }

    /// Set the target of a pending node. Returns false if it was already set.
    pub(crate) fn define(&self, target: Schema) -> bool {
        self.resolved.set(target).is_ok()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Resolve the target, running the resolver on first use.
    ///
    /// A pending node that was never defined resolves to `never`.
    pub fn resolve(&self) -> Schema {
        self.resolved
            .get_or_init(|| match &self.resolver {
                Some(resolver) => resolver(),
                None => Schema::never(),
            })
            .clone()
    }
}

impl fmt::Debug for LazySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// The closed set of schema node variants.
#[derive(Debug)]
pub enum SchemaDef {
    Boolean,
    String,
    Number,
    /// RFC 3339 timestamp string.
    Date,
    Literal(Value),
    /// Any value, including an absent one.
    Unknown,
    /// No value at all.
    Never,
    Custom(CustomSchema),
    Object(ObjectSchema),
    Union(Vec<Schema>),
    Intersection(Schema, Schema),
    Tuple(Vec<Schema>),
    Array(Schema),
    Record(Schema, Schema),
    Lazy(LazySchema),
    Optional(Schema),
    Nullable(Schema),
    Default(Schema, Value),
    Catch(Schema, Value),
}

impl SchemaDef {
    pub fn kind(&self) -> SchemaKind {
        match self {
            SchemaDef::Boolean => SchemaKind::Boolean,
            SchemaDef::String => SchemaKind::String,
            SchemaDef::Number => SchemaKind::Number,
            SchemaDef::Date => SchemaKind::Date,
            SchemaDef::Literal(_) => SchemaKind::Literal,
            SchemaDef::Unknown => SchemaKind::Unknown,
            SchemaDef::Never => SchemaKind::Never,
            SchemaDef::Custom(_) => SchemaKind::Custom,
            SchemaDef::Object(_) => SchemaKind::Object,
            SchemaDef::Union(_) => SchemaKind::Union,
            SchemaDef::Intersection(..) => SchemaKind::Intersection,
            SchemaDef::Tuple(_) => SchemaKind::Tuple,
            SchemaDef::Array(_) => SchemaKind::Array,
            SchemaDef::Record(..) => SchemaKind::Record,
            SchemaDef::Lazy(_) => SchemaKind::Lazy,
            SchemaDef::Optional(_) => SchemaKind::Optional,
            SchemaDef::Nullable(_) => SchemaKind::Nullable,
            SchemaDef::Default(..) => SchemaKind::Default,
            SchemaDef::Catch(..) => SchemaKind::Catch,
        }
    }
}

#[derive(Clone)]
enum Link {
    Owned(Arc<SchemaDef>),
    Back(Weak<SchemaDef>),
}

/// Handle to a schema node.
#[derive(Clone)]
pub struct Schema(Link);

impl From<SchemaDef> for Schema {
    fn from(def: SchemaDef) -> Self {
        Schema(Link::Owned(Arc::new(def)))
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Link::Owned(def) => def.fmt(f),
            // Back-references only occur on cycles; printing the target would recurse.
            Link::Back(_) => write!(f, "BackRef({:#x})", self.id()),
        }
    }
}

// --- Construction ---

impl Schema {
    /// Build a node that holds a back-reference to itself.
    pub(crate) fn cyclic(build: impl FnOnce(Schema) -> SchemaDef) -> Self {
        Schema(Link::Owned(Arc::new_cyclic(|weak| {
            build(Schema(Link::Back(weak.clone())))
        })))
    }

    pub fn boolean() -> Self {
        SchemaDef::Boolean.into()
    }

    pub fn string() -> Self {
        SchemaDef::String.into()
    }

    pub fn number() -> Self {
        SchemaDef::Number.into()
    }

    pub fn date() -> Self {
        SchemaDef::Date.into()
    }

    pub fn unknown() -> Self {
        SchemaDef::Unknown.into()
    }

    pub fn never() -> Self {
        SchemaDef::Never.into()
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        SchemaDef::Literal(value.into()).into()
    }

    /// Opaque leaf accepting every value `check` returns true for.
    pub fn custom(
        name: impl Into<String>,
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        SchemaDef::Custom(CustomSchema {
            name: name.into(),
            check: Arc::new(check),
        })
        .into()
    }

    /// Object with the default (strip) unknown-key policy.
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Schema)>) -> Self {
        Self::object_with(collect_shape(fields), UnknownKeys::Strip)
    }

    pub fn strict_object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Schema)>) -> Self {
        Self::object_with(collect_shape(fields), UnknownKeys::Strict)
    }

    pub fn loose_object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Schema)>) -> Self {
        Self::object_with(collect_shape(fields), UnknownKeys::Passthrough)
    }

    pub fn object_with(shape: Shape, unknown_keys: UnknownKeys) -> Self {
        SchemaDef::Object(ObjectSchema {
            shape,
            unknown_keys,
        })
        .into()
    }

    pub fn union(options: impl IntoIterator<Item = Schema>) -> Self {
        SchemaDef::Union(options.into_iter().collect()).into()
    }

    pub fn intersection(left: Schema, right: Schema) -> Self {
        SchemaDef::Intersection(left, right).into()
    }

    pub fn tuple(items: impl IntoIterator<Item = Schema>) -> Self {
        SchemaDef::Tuple(items.into_iter().collect()).into()
    }

    pub fn array(element: Schema) -> Self {
        SchemaDef::Array(element).into()
    }

    pub fn record(key: Schema, value: Schema) -> Self {
        SchemaDef::Record(key, value).into()
    }

    /// Lazy node resolved by calling `resolver` on first use.
    ///
    /// Suitable for schemas stored in statics, where the resolver can refer
    /// back to the static itself.
    pub fn lazy(resolver: impl Fn() -> Schema + Send + Sync + 'static) -> Self {
        SchemaDef::Lazy(LazySchema::deferred(resolver)).into()
    }

    /// Self-referential lazy node.
    ///
    /// `body` receives a back-reference to the node being built and returns
    /// its target.
    ///
    /// ```
    /// use schema_select::Schema;
    ///
    /// let role = Schema::recursive(|role| {
    ///     Schema::object([("name", Schema::string()), ("roles", Schema::array(role))])
    /// });
    /// let target = role.resolve().unwrap();
    /// let element = target.field("roles").unwrap().element().unwrap();
    /// assert!(Schema::ptr_eq(&element, &role));
    /// ```
    pub fn recursive(body: impl FnOnce(Schema) -> Schema) -> Self {
        Self::cyclic(|this| SchemaDef::Lazy(LazySchema::resolved(body(this))))
    }

    pub fn optional(self) -> Self {
        SchemaDef::Optional(self).into()
    }

    pub fn nullable(self) -> Self {
        SchemaDef::Nullable(self).into()
    }

    /// Substitute `value` when the input is absent.
    pub fn with_default(self, value: impl Into<Value>) -> Self {
        SchemaDef::Default(self, value.into()).into()
    }

    /// Substitute `value` when the input fails to parse.
    pub fn catch(self, value: impl Into<Value>) -> Self {
        SchemaDef::Catch(self, value.into()).into()
    }

    /// Same object with the strict policy. Non-objects are returned unchanged.
    pub fn strict(self) -> Self {
        self.with_unknown_keys(UnknownKeys::Strict)
    }

    /// Same object with the passthrough policy. Non-objects are returned unchanged.
    pub fn loose(self) -> Self {
        self.with_unknown_keys(UnknownKeys::Passthrough)
    }

    /// Same object with the strip policy. Non-objects are returned unchanged.
    pub fn strip(self) -> Self {
        self.with_unknown_keys(UnknownKeys::Strip)
    }

    fn with_unknown_keys(self, unknown_keys: UnknownKeys) -> Self {
        let def = self.def();
        match &*def {
            SchemaDef::Object(object) => Self::object_with(object.shape.clone(), unknown_keys),
            _ => self,
        }
    }

    /// Object with extra fields; existing keys are overwritten in place.
    /// Non-objects are returned unchanged.
    pub fn extend<K: Into<String>>(self, fields: impl IntoIterator<Item = (K, Schema)>) -> Self {
        let def = self.def();
        match &*def {
            SchemaDef::Object(object) => {
                let mut shape = object.shape.clone();
                shape.extend(fields.into_iter().map(|(k, v)| (k.into(), v)));
                Self::object_with(shape, object.unknown_keys)
            }
            _ => self,
        }
    }
}

fn collect_shape<K: Into<String>>(fields: impl IntoIterator<Item = (K, Schema)>) -> Shape {
    fields.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

// --- Identity and capability queries ---

impl Schema {
    /// The node this handle points at.
    ///
    /// A back-reference whose owner is gone yields a `never` node.
    pub fn def(&self) -> Arc<SchemaDef> {
        match &self.0 {
            Link::Owned(def) => Arc::clone(def),
            Link::Back(weak) => weak.upgrade().unwrap_or_else(|| Arc::clone(&DANGLING)),
        }
    }

    /// Identity of the node, stable for as long as any handle to it exists.
    pub fn id(&self) -> usize {
        match &self.0 {
            Link::Owned(def) => Arc::as_ptr(def) as usize,
            Link::Back(weak) => Weak::as_ptr(weak) as usize,
        }
    }

    /// True when both handles point at the same node.
    pub fn ptr_eq(a: &Schema, b: &Schema) -> bool {
        a.id() == b.id()
    }

    /// Non-owning handle to the same node.
    pub fn downgrade(&self) -> Schema {
        match &self.0 {
            Link::Owned(def) => Schema(Link::Back(Arc::downgrade(def))),
            Link::Back(_) => self.clone(),
        }
    }

    pub fn is_back_reference(&self) -> bool {
        matches!(self.0, Link::Back(_))
    }

    pub fn kind(&self) -> SchemaKind {
        self.def().kind()
    }

    pub fn is_object(&self) -> bool {
        self.kind() == SchemaKind::Object
    }

    pub fn is_union(&self) -> bool {
        self.kind() == SchemaKind::Union
    }

    pub fn is_lazy(&self) -> bool {
        self.kind() == SchemaKind::Lazy
    }

    /// True for passthrough objects.
    pub fn is_loose(&self) -> bool {
        matches!(&*self.def(), SchemaDef::Object(object) if object.is_loose())
    }

    /// Child schema of an object field.
    pub fn field(&self, key: &str) -> Option<Schema> {
        match &*self.def() {
            SchemaDef::Object(object) => object.shape.get(key).cloned(),
            _ => None,
        }
    }

    /// Field names of an object, in declaration order.
    pub fn keys(&self) -> Vec<String> {
        match &*self.def() {
            SchemaDef::Object(object) => object.shape.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Constituents of a union, tuple or intersection.
    pub fn options(&self) -> Vec<Schema> {
        match &*self.def() {
            SchemaDef::Union(options) | SchemaDef::Tuple(options) => options.clone(),
            SchemaDef::Intersection(left, right) => vec![left.clone(), right.clone()],
            _ => Vec::new(),
        }
    }

    /// Element of an array.
    pub fn element(&self) -> Option<Schema> {
        match &*self.def() {
            SchemaDef::Array(element) => Some(element.clone()),
            _ => None,
        }
    }

    /// Target of a lazy node.
    pub fn resolve(&self) -> Option<Schema> {
        match &*self.def() {
            SchemaDef::Lazy(lazy) => Some(lazy.resolve()),
            _ => None,
        }
    }

    /// One level of unwrapping: the inner type of a modifier, or the target
    /// of a lazy node.
    pub fn inner_type(&self) -> Option<Schema> {
        match &*self.def() {
            SchemaDef::Optional(inner)
            | SchemaDef::Nullable(inner)
            | SchemaDef::Default(inner, _)
            | SchemaDef::Catch(inner, _) => Some(inner.clone()),
            SchemaDef::Lazy(lazy) => Some(lazy.resolve()),
            _ => None,
        }
    }

    /// Strip optional, nullable, default, catch and array layers.
    ///
    /// Lazy nodes are left in place.
    pub fn unwrap_modifiers(&self) -> Schema {
        let mut current = self.clone();
        loop {
            let next = match &*current.def() {
                SchemaDef::Optional(inner)
                | SchemaDef::Nullable(inner)
                | SchemaDef::Default(inner, _)
                | SchemaDef::Catch(inner, _)
                | SchemaDef::Array(inner) => inner.clone(),
                _ => return current,
            };
            current = next;
        }
    }

    /// Strip every wrapper, lazy nodes included.
    ///
    /// A lazy cycle with no concrete node in between stops at the lazy node.
    pub fn base_type(&self) -> Schema {
        let mut seen = Vec::new();
        let mut current = self.unwrap_modifiers();
        while let Some(target) = current.resolve() {
            if seen.contains(&current.id()) {
                break;
            }
            seen.push(current.id());
            current = target.unwrap_modifiers();
        }
        current
    }

    /// Follow a chain of lazy nodes to the first non-lazy target.
    ///
    /// Returns `None` when the chain loops without reaching one, or when
    /// this node is not lazy.
    pub(crate) fn concrete_target(&self) -> Option<Schema> {
        let mut seen = vec![self.id()];
        let mut current = self.resolve()?;
        while let Some(next) = current.resolve() {
            if seen.contains(&current.id()) {
                return None;
            }
            seen.push(current.id());
            current = next;
        }
        Some(current)
    }

    /// True when the schema accepts an absent value.
    pub fn accepts_absent(&self) -> bool {
        match &*self.def() {
            SchemaDef::Optional(_)
            | SchemaDef::Default(..)
            | SchemaDef::Catch(..)
            | SchemaDef::Unknown => true,
            SchemaDef::Nullable(inner) => inner.accepts_absent(),
            SchemaDef::Union(options) => options.iter().any(Schema::accepts_absent),
            _ => false,
        }
    }
}
