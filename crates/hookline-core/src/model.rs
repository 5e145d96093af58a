//! Domain model descriptors consumed by source construction.
//!
//! Building full metadata (EDM) is the host's concern; the core only needs to
//! know which element type a named entity set or composable operation yields.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Result row type of a query source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    String,
    Int64,
    Float64,
    Boolean,
    Json,
    /// A named entity type defined by the host.
    Entity(String),
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::String => write!(f, "string"),
            ElementType::Int64 => write!(f, "int64"),
            ElementType::Float64 => write!(f, "float64"),
            ElementType::Boolean => write!(f, "boolean"),
            ElementType::Json => write!(f, "json"),
            ElementType::Entity(name) => write!(f, "{name}"),
        }
    }
}

/// Rust types that can be the element type of a typed source.
///
/// Hosts implement this for their entity structs:
///
/// ```
/// use hookline_core::{Element, ElementType};
///
/// struct Product;
///
/// impl Element for Product {
///     fn element_type() -> ElementType {
///         ElementType::Entity("Product".into())
///     }
/// }
/// ```
pub trait Element {
    fn element_type() -> ElementType;
}

impl Element for String {
    fn element_type() -> ElementType {
        ElementType::String
    }
}

impl Element for i64 {
    fn element_type() -> ElementType {
        ElementType::Int64
    }
}

impl Element for f64 {
    fn element_type() -> ElementType {
        ElementType::Float64
    }
}

impl Element for bool {
    fn element_type() -> ElementType {
        ElementType::Boolean
    }
}

impl Element for serde_json::Value {
    fn element_type() -> ElementType {
        ElementType::Json
    }
}

/// Model element denoted by an expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelReference {
    /// A named queryable entity set.
    EntitySet { name: String },
    /// A composable operation addressed by namespace and name.
    Operation { namespace: String, name: String },
}

impl ModelReference {
    /// Entity set name, if this reference denotes one.
    pub fn entity_set(&self) -> Option<&str> {
        match self {
            ModelReference::EntitySet { name } => Some(name),
            ModelReference::Operation { .. } => None,
        }
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelReference::EntitySet { name } => write!(f, "{name}"),
            ModelReference::Operation { namespace, name } => write!(f, "{namespace}.{name}"),
        }
    }
}

/// Metadata model supplied by the model handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainModel {
    /// Entity set name → element type.
    #[serde(default)]
    pub entity_sets: BTreeMap<String, ElementType>,
    /// `namespace.name` → result element type of a composable operation.
    #[serde(default)]
    pub operations: BTreeMap<String, ElementType>,
}

impl DomainModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity set (builder style).
    pub fn with_entity_set(mut self, name: impl Into<String>, element_type: ElementType) -> Self {
        self.entity_sets.insert(name.into(), element_type);
        self
    }

    /// Add a composable operation (builder style).
    pub fn with_operation(
        mut self,
        namespace: &str,
        name: &str,
        element_type: ElementType,
    ) -> Self {
        self.operations
            .insert(operation_key(namespace, name), element_type);
        self
    }

    pub fn entity_set(&self, name: &str) -> Option<&ElementType> {
        self.entity_sets.get(name)
    }

    pub fn operation(&self, namespace: &str, name: &str) -> Option<&ElementType> {
        self.operations.get(&operation_key(namespace, name))
    }
}

fn operation_key(namespace: &str, name: &str) -> String {
    format!("{namespace}.{name}")
}
