// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Item identity and the scalar value model.
//!
//! An item is either a node, addressed by a [`Uuid`], or a property, addressed
//! by its parent node's `Uuid` plus a namespace-qualified [`Name`].

use std::fmt;

use uuid::Uuid;

/// A namespace-qualified name: a namespace URI paired with a local name.
///
/// Equality and hashing are defined on `(uri, local)` only. The optional
/// prefix is carried for `Display` purposes and does not participate in
/// identity — two `Name`s with the same uri/local but different prefixes are
/// the same name.
#[derive(Debug, Clone)]
pub struct Name {
    uri: String,
    local: String,
    prefix: Option<String>,
}

impl Name {
    /// Builds a name in no namespace (the empty URI).
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            uri: String::new(),
            local: local.into(),
            prefix: None,
        }
    }

    /// Builds a namespace-qualified name.
    pub fn namespaced(uri: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            local: local.into(),
            prefix: None,
        }
    }

    /// Attaches a display prefix; does not affect equality or hashing.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// The namespace URI (empty string for the default namespace).
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The local name.
    pub fn local(&self) -> &str {
        &self.local
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri && self.local == other.local
    }
}

impl Eq for Name {}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
        self.local.hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.uri, &self.local).cmp(&(&other.uri, &other.local))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => write!(f, "{}:{}", prefix, self.local),
            _ => write!(f, "{}", self.local),
        }
    }
}

/// The identity of a node or property.
///
/// Every node carries its own [`Uuid`]; every property is addressed by its
/// parent node's `Uuid` plus a qualified [`Name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemId {
    /// Identifies a node by its own UUID.
    NodeId(Uuid),
    /// Identifies a property by its parent node's UUID and qualified name.
    PropertyId(Uuid, NameKey),
}

/// Hashable/orderable projection of [`Name`], used as the second field of
/// [`ItemId::PropertyId`] so `ItemId` can derive `Hash`/`Ord` directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameKey(String, String);

impl From<&Name> for NameKey {
    fn from(name: &Name) -> Self {
        NameKey(name.uri.clone(), name.local.clone())
    }
}

impl From<Name> for NameKey {
    fn from(name: Name) -> Self {
        NameKey(name.uri, name.local)
    }
}

impl NameKey {
    /// The namespace URI half of this key.
    pub fn uri(&self) -> &str {
        &self.0
    }

    /// The local-name half of this key.
    pub fn local(&self) -> &str {
        &self.1
    }

    /// Recovers a display-able [`Name`] from this key. The original prefix
    /// (if any) is not recoverable — identity never carried it — so the
    /// result has no prefix.
    pub fn to_name(&self) -> Name {
        Name::namespaced(self.0.clone(), self.1.clone())
    }
}

impl ItemId {
    /// Builds a node identity.
    pub fn node(uuid: Uuid) -> Self {
        ItemId::NodeId(uuid)
    }

    /// Builds a property identity from a parent UUID and name.
    pub fn property(parent: Uuid, name: impl Into<NameKey>) -> Self {
        ItemId::PropertyId(parent, name.into())
    }

    /// Total predicate: true when this id denotes a node rather than a
    /// property.
    pub fn denotes_node(&self) -> bool {
        matches!(self, ItemId::NodeId(_))
    }

    /// The node UUID this id is rooted at: its own UUID for a node id, or
    /// its parent's UUID for a property id.
    pub fn root_uuid(&self) -> Uuid {
        match self {
            ItemId::NodeId(uuid) => *uuid,
            ItemId::PropertyId(parent, _) => *parent,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::NodeId(uuid) => write!(f, "node:{}", uuid),
            ItemId::PropertyId(parent, name) => write!(f, "property:{}/{}", parent, name.1),
        }
    }
}

/// The scalar type of a property's values.
///
/// Superset of the types named explicitly in the item-state invariants
/// (`NAME`, `REFERENCE`, `STRING`) — a real content repository needs the
/// full set of scalar kinds so every `InternalValue` variant has a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// UTF-8 text.
    String,
    /// A namespace-qualified name.
    Name,
    /// A reference to another node's UUID.
    Reference,
    /// A signed 64-bit integer.
    Long,
    /// A 64-bit float.
    Double,
    /// An arbitrary-precision decimal, carried as its canonical string form.
    Decimal,
    /// A boolean.
    Boolean,
    /// An ISO-8601 timestamp, carried as its canonical string form.
    Date,
    /// Opaque binary data.
    Binary,
    /// An absolute or relative item path.
    Path,
    /// A URI.
    Uri,
    /// Type could not be determined (e.g. an as-yet-unvalued transient
    /// property).
    Undefined,
}

/// A single typed value held by a property.
#[derive(Debug, Clone, PartialEq)]
pub enum InternalValue {
    /// See [`PropertyType::String`].
    String(String),
    /// See [`PropertyType::Name`].
    Name(Name),
    /// See [`PropertyType::Reference`]; the referenced node's UUID.
    Reference(Uuid),
    /// See [`PropertyType::Long`].
    Long(i64),
    /// See [`PropertyType::Double`].
    Double(f64),
    /// See [`PropertyType::Decimal`].
    Decimal(String),
    /// See [`PropertyType::Boolean`].
    Boolean(bool),
    /// See [`PropertyType::Date`].
    Date(String),
    /// See [`PropertyType::Binary`].
    Binary(Vec<u8>),
    /// See [`PropertyType::Path`].
    Path(String),
    /// See [`PropertyType::Uri`].
    Uri(String),
}

impl InternalValue {
    /// The scalar type this value belongs to. Total over every variant.
    pub fn property_type(&self) -> PropertyType {
        match self {
            InternalValue::String(_) => PropertyType::String,
            InternalValue::Name(_) => PropertyType::Name,
            InternalValue::Reference(_) => PropertyType::Reference,
            InternalValue::Long(_) => PropertyType::Long,
            InternalValue::Double(_) => PropertyType::Double,
            InternalValue::Decimal(_) => PropertyType::Decimal,
            InternalValue::Boolean(_) => PropertyType::Boolean,
            InternalValue::Date(_) => PropertyType::Date,
            InternalValue::Binary(_) => PropertyType::Binary,
            InternalValue::Path(_) => PropertyType::Path,
            InternalValue::Uri(_) => PropertyType::Uri,
        }
    }

    /// The target UUID of a `REFERENCE` value, if this is one.
    pub fn as_reference(&self) -> Option<Uuid> {
        match self {
            InternalValue::Reference(uuid) => Some(*uuid),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_identity_ignores_prefix() {
        let a = Name::namespaced("https://ns.example/a", "child").with_prefix("a");
        let b = Name::namespaced("https://ns.example/a", "child").with_prefix("b");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "a:child");
        assert_eq!(b.to_string(), "b:child");
    }

    #[test]
    fn denotes_node_is_total() {
        let node = ItemId::node(Uuid::new_v4());
        let property = ItemId::property(Uuid::new_v4(), Name::new("jcr:primaryType"));
        assert!(node.denotes_node());
        assert!(!property.denotes_node());
    }

    #[test]
    fn property_type_is_total_over_internal_value() {
        let values = vec![
            InternalValue::String("s".into()),
            InternalValue::Name(Name::new("n")),
            InternalValue::Reference(Uuid::new_v4()),
            InternalValue::Long(1),
            InternalValue::Double(1.0),
            InternalValue::Decimal("1.0".into()),
            InternalValue::Boolean(true),
            InternalValue::Date("2020-01-01T00:00:00Z".into()),
            InternalValue::Binary(vec![1, 2, 3]),
            InternalValue::Path("/a/b".into()),
            InternalValue::Uri("https://example/".into()),
        ];
        for value in values {
            let _ = value.property_type();
        }
    }

    #[test]
    fn root_uuid_resolves_for_both_id_kinds() {
        let node_uuid = Uuid::new_v4();
        let parent_uuid = Uuid::new_v4();
        assert_eq!(ItemId::node(node_uuid).root_uuid(), node_uuid);
        assert_eq!(
            ItemId::property(parent_uuid, Name::new("x")).root_uuid(),
            parent_uuid
        );
    }
}
