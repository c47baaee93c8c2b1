use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::schema::{Schema, SchemaType, TypeKind, named_type};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl TypeGraph {
    /// Edges leaving `source`, in field order.
    pub fn outgoing<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub name: String,
    pub field_count: usize,
    pub fields: Vec<String>,
    /// SDL signature of each entry in `fields`, same order.
    pub field_types: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaArtifacts {
    pub object_count: usize,
    pub objects: Vec<ObjectSummary>,
    pub graph: TypeGraph,
    pub kind_counts: BTreeMap<TypeKind, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutation_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_type: Option<String>,
}

/// Object types that take part in the graph: `OBJECT` kind, not an introspection meta-type.
pub fn graph_objects(schema: &Schema) -> impl Iterator<Item = &SchemaType> {
    schema
        .types_of_kind(TypeKind::Object)
        .filter(|t| !t.is_reserved())
}

pub fn build_graph(schema: &Schema) -> TypeGraph {
    let node_names: HashSet<&str> = graph_objects(schema).map(|t| t.name.as_str()).collect();

    let mut graph = TypeGraph::default();
    for obj in graph_objects(schema) {
        graph.nodes.push(GraphNode {
            id: obj.name.clone(),
            label: obj.name.clone(),
        });

        for field in &obj.fields {
            let Some(target) = named_type(&field.ty) else {
                continue;
            };
            if !node_names.contains(target) {
                continue;
            }
            graph.edges.push(GraphEdge {
                id: format!("{}->{}:{}", obj.name, target, field.name),
                source: obj.name.clone(),
                target: target.to_string(),
                label: field.name.clone(),
            });
        }
    }
    graph
}

pub fn build(schema: &Schema) -> SchemaArtifacts {
    let mut objects: Vec<ObjectSummary> = graph_objects(schema)
        .map(|t| ObjectSummary {
            name: t.name.clone(),
            field_count: t.fields.len(),
            fields: t.fields.iter().map(|f| f.name.clone()).collect(),
            field_types: t.fields.iter().map(|f| f.ty.signature()).collect(),
        })
        .collect();
    objects.sort_by(|a, b| a.name.cmp(&b.name));

    SchemaArtifacts {
        object_count: objects.len(),
        objects,
        graph: build_graph(schema),
        kind_counts: schema.kind_counts(),
        query_type: schema.query_type.clone(),
        mutation_type: schema.mutation_type.clone(),
        subscription_type: schema.subscription_type.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, TypeRef, extract};
    use serde_json::json;

    fn object(name: &str, fields: Vec<(&str, TypeRef)>) -> SchemaType {
        SchemaType {
            kind: TypeKind::Object,
            name: name.to_string(),
            description: None,
            fields: fields
                .into_iter()
                .map(|(n, ty)| Field {
                    name: n.to_string(),
                    ty,
                    description: None,
                    is_deprecated: false,
                    deprecation_reason: None,
                })
                .collect(),
            input_fields: vec![],
            interfaces: vec![],
            possible_types: vec![],
            enum_values: vec![],
        }
    }

    #[test]
    fn list_field_yields_single_edge() {
        let body = json!({"data":{"__schema":{"types":[
            {"kind":"OBJECT","name":"User","fields":[
                {"name":"posts","type":{"kind":"LIST","name":null,"ofType":{"kind":"OBJECT","name":"Post"}}}
            ]},
            {"kind":"OBJECT","name":"Post","fields":[]}
        ],"directives":[]}}});
        let schema = extract(&body).unwrap();
        let graph = build_graph(&schema);

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(
            graph.edges,
            vec![GraphEdge {
                id: "User->Post:posts".to_string(),
                source: "User".to_string(),
                target: "Post".to_string(),
                label: "posts".to_string(),
            }]
        );
    }

    #[test]
    fn reserved_and_non_object_types_are_not_nodes() {
        let post = TypeRef::named(TypeKind::Object, "Post");
        let schema = Schema {
            types: vec![
                object("__Schema", vec![("types", TypeRef::named(TypeKind::Object, "__Type"))]),
                object("__Type", vec![]),
                object("Post", vec![("self", post.clone()), ("parent", post.clone())]),
                SchemaType {
                    kind: TypeKind::Interface,
                    ..object("Node", vec![("post", post)])
                },
            ],
            ..Schema::default()
        };
        let graph = build_graph(&schema);
        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["Post"]);
        // self-loops and multi-edges are both kept
        let labels: Vec<&str> = graph.outgoing("Post").map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["self", "parent"]);
    }

    #[test]
    fn fields_pointing_at_scalars_make_no_edges() {
        let schema = Schema {
            types: vec![object(
                "User",
                vec![
                    ("name", TypeRef::named(TypeKind::Scalar, "String")),
                    ("broken", TypeRef::default()),
                ],
            )],
            ..Schema::default()
        };
        let artifacts = build(&schema);
        assert!(artifacts.graph.edges.is_empty());
        assert_eq!(artifacts.objects[0].field_count, 2);
    }

    #[test]
    fn summaries_sorted_and_build_is_idempotent() {
        let schema = Schema {
            types: vec![
                object("Zoo", vec![("animal", TypeRef::named(TypeKind::Object, "Animal"))]),
                object("Animal", vec![("zoo", TypeRef::named(TypeKind::Object, "Zoo").non_null())]),
            ],
            ..Schema::default()
        };
        let first = build(&schema);
        let second = build(&schema);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );

        let names: Vec<&str> = first.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Animal", "Zoo"]);
        let nodes: Vec<&str> = first.graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(nodes, vec!["Zoo", "Animal"]);
        assert_eq!(first.objects[0].field_types, vec!["Zoo!"]);
    }

    #[test]
    fn summaries_carry_field_signatures() {
        let posts = TypeRef::named(TypeKind::Object, "Post").non_null().list().non_null();
        let schema = Schema {
            types: vec![object(
                "User",
                vec![("posts", posts), ("broken", TypeRef::default())],
            )],
            ..Schema::default()
        };
        let summary = &build(&schema).objects[0];
        assert_eq!(summary.fields, vec!["posts", "broken"]);
        assert_eq!(summary.field_types, vec!["[Post!]!", "?"]);
    }

    #[test]
    fn empty_schema_has_empty_graph() {
        let artifacts = build(&Schema::default());
        assert_eq!(artifacts.object_count, 0);
        assert!(artifacts.graph.nodes.is_empty());
        assert!(artifacts.graph.edges.is_empty());
    }
}
