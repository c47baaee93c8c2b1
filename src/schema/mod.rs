use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::SchemaExtractionError;

/// Upper bound on `ofType` links followed while flattening a type reference.
pub const MAX_TYPE_REF_DEPTH: usize = 16;

/// Prefix reserved for introspection meta-types (`__Schema`, `__Type`, ...).
pub const RESERVED_PREFIX: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    List,
    NonNull,
    Unknown,
}

impl TypeKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "SCALAR" => TypeKind::Scalar,
            "OBJECT" => TypeKind::Object,
            "INTERFACE" => TypeKind::Interface,
            "UNION" => TypeKind::Union,
            "ENUM" => TypeKind::Enum,
            "INPUT_OBJECT" => TypeKind::InputObject,
            "LIST" => TypeKind::List,
            "NON_NULL" => TypeKind::NonNull,
            _ => TypeKind::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TypeKind::Scalar => "SCALAR",
            TypeKind::Object => "OBJECT",
            TypeKind::Interface => "INTERFACE",
            TypeKind::Union => "UNION",
            TypeKind::Enum => "ENUM",
            TypeKind::InputObject => "INPUT_OBJECT",
            TypeKind::List => "LIST",
            TypeKind::NonNull => "NON_NULL",
            TypeKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeLink {
    pub kind: TypeKind,
    pub name: Option<String>,
}

/// A type reference flattened outermost-first: `[Post!]` is `LIST -> NON_NULL -> OBJECT(Post)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TypeRef {
    pub chain: Vec<TypeLink>,
}

impl TypeRef {
    pub fn named(kind: TypeKind, name: impl Into<String>) -> Self {
        Self {
            chain: vec![TypeLink {
                kind,
                name: Some(name.into()),
            }],
        }
    }

    pub fn list(self) -> Self {
        self.wrap(TypeKind::List)
    }

    pub fn non_null(self) -> Self {
        self.wrap(TypeKind::NonNull)
    }

    fn wrap(mut self, kind: TypeKind) -> Self {
        self.chain.insert(0, TypeLink { kind, name: None });
        self
    }

    /// Flattens an introspection `__Type` object by walking `ofType` iteratively.
    pub fn from_value(value: Option<&Value>) -> Self {
        let mut chain = Vec::new();
        let mut current = value.and_then(Value::as_object);
        while let Some(obj) = current {
            if chain.len() >= MAX_TYPE_REF_DEPTH {
                break;
            }
            chain.push(TypeLink {
                kind: TypeKind::parse(str_field(obj, "kind").unwrap_or_default()),
                name: str_field(obj, "name").map(str::to_string),
            });
            current = obj.get("ofType").and_then(Value::as_object);
        }
        Self { chain }
    }

    /// SDL-style signature, e.g. `[[Post!]!]!`. A reference without a name renders as `?`.
    pub fn signature(&self) -> String {
        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut name = "?";
        for link in &self.chain {
            if let Some(n) = link.name.as_deref() {
                name = n;
                break;
            }
            match link.kind {
                TypeKind::List => {
                    prefix.push('[');
                    suffix.insert(0, ']');
                }
                TypeKind::NonNull => suffix.insert(0, '!'),
                _ => {}
            }
        }
        format!("{prefix}{name}{suffix}")
    }
}

/// Resolves the named type at the bottom of a possibly wrapped reference.
///
/// Returns `None` when no link in the chain carries a name.
pub fn named_type(type_ref: &TypeRef) -> Option<&str> {
    type_ref.chain.iter().find_map(|link| link.name.as_deref())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputValue {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaType {
    pub kind: TypeKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<Field>,
    pub input_fields: Vec<InputValue>,
    pub interfaces: Vec<String>,
    pub possible_types: Vec<String>,
    pub enum_values: Vec<String>,
}

impl SchemaType {
    pub fn is_reserved(&self) -> bool {
        self.name.starts_with(RESERVED_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directive {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
    pub types: Vec<SchemaType>,
    pub directives: Vec<Directive>,
}

impl Schema {
    pub fn types_of_kind(&self, kind: TypeKind) -> impl Iterator<Item = &SchemaType> {
        self.types.iter().filter(move |t| t.kind == kind)
    }

    /// Number of declared types per kind, excluding introspection meta-types.
    pub fn kind_counts(&self) -> BTreeMap<TypeKind, usize> {
        let mut counts = BTreeMap::new();
        for ty in self.types.iter().filter(|t| !t.is_reserved()) {
            *counts.entry(ty.kind).or_insert(0) += 1;
        }
        counts
    }
}

/// Builds a [`Schema`] from an introspection response.
///
/// Accepts either the whole response body (`{"data": {"__schema": ...}}`) or its `data` object.
/// Any non-empty `errors` list rejects the response, even next to a (partial) `__schema`.
pub fn extract(body: &Value) -> Result<Schema, SchemaExtractionError> {
    let errors = server_errors(body);
    if !errors.is_empty() {
        return Err(SchemaExtractionError::IntrospectionDisabled { errors });
    }

    let Some(schema) = introspection_data(body)
        .get("__schema")
        .and_then(Value::as_object)
    else {
        return Err(SchemaExtractionError::MissingSchema);
    };

    let raw_types = match schema.get("types") {
        None | Some(Value::Null) => return Err(SchemaExtractionError::MissingTypes),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(SchemaExtractionError::TypesNotSequence),
    };

    let mut types = Vec::with_capacity(raw_types.len());
    for (index, raw) in raw_types.iter().enumerate() {
        types.push(parse_type(index, raw)?);
    }

    let directives = array_field(schema, "directives")
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|d| {
            Some(Directive {
                name: str_field(d, "name")?.to_string(),
                description: str_field(d, "description").map(str::to_string),
                locations: array_field(d, "locations")
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            })
        })
        .collect();

    Ok(Schema {
        query_type: root_name(schema, "queryType"),
        mutation_type: root_name(schema, "mutationType"),
        subscription_type: root_name(schema, "subscriptionType"),
        types,
        directives,
    })
}

fn parse_type(index: usize, raw: &Value) -> Result<SchemaType, SchemaExtractionError> {
    let Some(obj) = raw.as_object() else {
        return Err(SchemaExtractionError::InvalidType {
            index,
            reason: "not an object".to_string(),
        });
    };
    let Some(name) = str_field(obj, "name") else {
        return Err(SchemaExtractionError::InvalidType {
            index,
            reason: "missing `name`".to_string(),
        });
    };

    let fields = array_field(obj, "fields")
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|f| {
            Some(Field {
                name: str_field(f, "name")?.to_string(),
                ty: TypeRef::from_value(f.get("type")),
                description: str_field(f, "description").map(str::to_string),
                is_deprecated: f
                    .get("isDeprecated")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                deprecation_reason: str_field(f, "deprecationReason").map(str::to_string),
            })
        })
        .collect();

    let input_fields = array_field(obj, "inputFields")
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|f| {
            Some(InputValue {
                name: str_field(f, "name")?.to_string(),
                ty: TypeRef::from_value(f.get("type")),
            })
        })
        .collect();

    Ok(SchemaType {
        kind: TypeKind::parse(str_field(obj, "kind").unwrap_or_default()),
        name: name.to_string(),
        description: str_field(obj, "description").map(str::to_string),
        fields,
        input_fields,
        interfaces: named_refs(obj, "interfaces"),
        possible_types: named_refs(obj, "possibleTypes"),
        enum_values: array_field(obj, "enumValues")
            .iter()
            .filter_map(|v| v.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
    })
}

/// The `data` object of a response body, or the body itself when it has none.
pub fn introspection_data(body: &Value) -> &Value {
    match body.get("data") {
        Some(data @ Value::Object(_)) => data,
        _ => body,
    }
}

fn named_refs(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    array_field(obj, key)
        .iter()
        .filter_map(|v| named_type(&TypeRef::from_value(Some(v))).map(str::to_string))
        .collect()
}

fn root_name(schema: &Map<String, Value>, key: &str) -> Option<String> {
    schema
        .get(key)
        .and_then(|v| v.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn server_errors(body: &Value) -> Vec<Value> {
    body.get("errors")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    obj.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
