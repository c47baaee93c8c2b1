//! Best-effort guess of the GraphQL server implementation behind a target.
//!
//! Header literals and schema conventions each add a fixed weight to one engine. The highest score
//! wins, ties go to the engine declared first in [`Engine::KNOWN`], and a zero score means
//! [`Engine::Unknown`]. False positives from coincidental header text are accepted; the full table is
//! returned so the operator can judge the guess.

use std::collections::HashSet;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::schema::Schema;
use crate::transport::Headers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Engine {
    Apollo,
    Hasura,
    GraphenePython,
    PostGraphile,
    Ariadne,
    HotChocolate,
    Unknown,
}

const ENGINE_COUNT: usize = 6;

impl Engine {
    /// Scored engines in tie-break order.
    pub const KNOWN: [Engine; ENGINE_COUNT] = [
        Engine::Apollo,
        Engine::Hasura,
        Engine::GraphenePython,
        Engine::PostGraphile,
        Engine::Ariadne,
        Engine::HotChocolate,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Engine::Apollo => "Apollo",
            Engine::Hasura => "Hasura",
            Engine::GraphenePython => "graphene-python",
            Engine::PostGraphile => "PostGraphile",
            Engine::Ariadne => "Ariadne",
            Engine::HotChocolate => "Hot Chocolate",
            Engine::Unknown => "Unknown",
        }
    }

    const fn slot(self) -> Option<usize> {
        match self {
            Engine::Apollo => Some(0),
            Engine::Hasura => Some(1),
            Engine::GraphenePython => Some(2),
            Engine::PostGraphile => Some(3),
            Engine::Ariadne => Some(4),
            Engine::HotChocolate => Some(5),
            Engine::Unknown => None,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Engine {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Score per known engine. Serializes as an object in [`Engine::KNOWN`] order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalTable {
    scores: [u32; ENGINE_COUNT],
}

impl SignalTable {
    pub fn add(&mut self, engine: Engine, weight: u32) {
        if let Some(slot) = engine.slot() {
            self.scores[slot] = self.scores[slot].saturating_add(weight);
        }
    }

    pub fn score(&self, engine: Engine) -> u32 {
        engine.slot().map(|slot| self.scores[slot]).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Engine, u32)> + '_ {
        Engine::KNOWN.iter().map(|e| (*e, self.score(*e)))
    }

    /// Highest-scoring engine; first declared wins a tie, an all-zero table is `Unknown`.
    pub fn best(&self) -> (Engine, u32) {
        let mut best = (Engine::Unknown, 0);
        for (engine, score) in self.iter() {
            if score > best.1 {
                best = (engine, score);
            }
        }
        best
    }
}

impl Serialize for SignalTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ENGINE_COUNT))?;
        for (engine, score) in self.iter() {
            map.serialize_entry(engine.as_str(), &score)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Header,
    Directive,
    TypeName,
    TypeBlob,
}

/// One rule that fired during classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signal {
    pub engine: Engine,
    pub source: SignalSource,
    pub literal: &'static str,
    pub weight: u32,
}

const HEADER_WEIGHT: u32 = 3;

struct HeaderRule {
    engine: Engine,
    literals: &'static [&'static str],
}

const HEADER_RULES: &[HeaderRule] = &[
    HeaderRule {
        engine: Engine::Apollo,
        literals: &["apollo"],
    },
    HeaderRule {
        engine: Engine::Hasura,
        literals: &["hasura"],
    },
    HeaderRule {
        engine: Engine::GraphenePython,
        literals: &["graphene"],
    },
    HeaderRule {
        engine: Engine::PostGraphile,
        literals: &["postgraphile"],
    },
    HeaderRule {
        engine: Engine::Ariadne,
        literals: &["ariadne"],
    },
    HeaderRule {
        engine: Engine::HotChocolate,
        literals: &["hotchocolate", "chilli"],
    },
];

enum SchemaMatcher {
    /// Any of these lowercased directive names is declared.
    Directive(&'static [&'static str]),
    /// A type with exactly this lowercased name is declared.
    TypeName(&'static str),
    /// Substring of all type names joined by spaces, lowercased.
    TypeBlob(&'static str),
}

struct SchemaRule {
    engine: Engine,
    weight: u32,
    matcher: SchemaMatcher,
}

const SCHEMA_RULES: &[SchemaRule] = &[
    SchemaRule {
        engine: Engine::Apollo,
        weight: 2,
        matcher: SchemaMatcher::Directive(&["cachecontrol"]),
    },
    SchemaRule {
        engine: Engine::Hasura,
        weight: 2,
        matcher: SchemaMatcher::Directive(&["cached", "frontend"]),
    },
    SchemaRule {
        engine: Engine::PostGraphile,
        weight: 1,
        matcher: SchemaMatcher::TypeBlob("relay"),
    },
    SchemaRule {
        engine: Engine::Hasura,
        weight: 2,
        matcher: SchemaMatcher::TypeName("query_root"),
    },
    SchemaRule {
        engine: Engine::PostGraphile,
        weight: 1,
        matcher: SchemaMatcher::TypeName("pageinfo"),
    },
];

pub fn remediation_notes(engine: Engine) -> &'static [&'static str] {
    match engine {
        Engine::Apollo => &[
            "Disable introspection and GraphQL Playground in production.",
            "Apply query depth and complexity limits to prevent DoS.",
            "Avoid detailed stack traces and GraphQL error internals in responses.",
        ],
        Engine::Hasura => &[
            "Require strict admin secret/JWT validation and rotate credentials.",
            "Harden row/column permission policies for every role.",
            "Disable metadata/admin endpoints from public exposure.",
        ],
        Engine::GraphenePython => &[
            "Disable debug middleware and tracing extensions in production.",
            "Add rate limiting and query cost control to endpoint.",
            "Disable GraphiQL on internet-facing deployments.",
        ],
        Engine::PostGraphile => &[
            "Constrain role privileges and schema exposure at DB level.",
            "Use persisted queries / allow-lists for sensitive operations.",
            "Disable detailed error hints leaking SQL metadata.",
        ],
        Engine::Ariadne => &[
            "Turn off debug mode and rich tracebacks in production.",
            "Apply operation depth and complexity guards.",
            "Restrict introspection where not needed.",
        ],
        Engine::HotChocolate => &[
            "Disable Banana Cake Pop / tooling endpoints on production.",
            "Use cost analysis middleware and request timeout limits.",
            "Harden authorization directives and resolver-level checks.",
        ],
        Engine::Unknown => &[
            "Apply strict authZ/authN controls on each resolver path.",
            "Use query complexity, depth, and rate limiting protections.",
            "Disable introspection/UI tooling for public production endpoints.",
        ],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineReport {
    pub engine: Engine,
    pub confidence: u32,
    pub security_notes: &'static [&'static str],
    pub signals: SignalTable,
    pub matched: Vec<Signal>,
}

/// Lowercased `name:value` pairs joined by spaces.
pub fn header_blob(headers: &Headers) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{}:{}", k.to_lowercase(), v.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn classify(schema: &Schema, headers: &Headers) -> EngineReport {
    let mut table = SignalTable::default();
    let mut matched = Vec::new();

    let blob = header_blob(headers);
    for rule in HEADER_RULES {
        if let Some(literal) = rule.literals.iter().copied().find(|l| blob.contains(*l)) {
            table.add(rule.engine, HEADER_WEIGHT);
            matched.push(Signal {
                engine: rule.engine,
                source: SignalSource::Header,
                literal,
                weight: HEADER_WEIGHT,
            });
        }
    }

    let directives: HashSet<String> = schema
        .directives
        .iter()
        .map(|d| d.name.to_lowercase())
        .collect();
    let type_names: HashSet<String> = schema.types.iter().map(|t| t.name.to_lowercase()).collect();
    let type_blob = schema
        .types
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    for rule in SCHEMA_RULES {
        let hit = match rule.matcher {
            SchemaMatcher::Directive(names) => names
                .iter()
                .find(|n| directives.contains(**n))
                .map(|n| (SignalSource::Directive, *n)),
            SchemaMatcher::TypeName(name) => type_names
                .contains(name)
                .then_some((SignalSource::TypeName, name)),
            SchemaMatcher::TypeBlob(needle) => type_blob
                .contains(needle)
                .then_some((SignalSource::TypeBlob, needle)),
        };
        if let Some((source, literal)) = hit {
            table.add(rule.engine, rule.weight);
            matched.push(Signal {
                engine: rule.engine,
                source,
                literal,
                weight: rule.weight,
            });
        }
    }

    let (engine, confidence) = table.best();
    EngineReport {
        engine,
        confidence,
        security_notes: remediation_notes(engine),
        signals: table,
        matched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Directive, SchemaType, TypeKind};

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn schema_with(types: &[&str], directives: &[&str]) -> Schema {
        Schema {
            types: types
                .iter()
                .map(|n| SchemaType {
                    kind: TypeKind::Object,
                    name: n.to_string(),
                    description: None,
                    fields: vec![],
                    input_fields: vec![],
                    interfaces: vec![],
                    possible_types: vec![],
                    enum_values: vec![],
                })
                .collect(),
            directives: directives
                .iter()
                .map(|n| Directive {
                    name: n.to_string(),
                    description: None,
                    locations: vec![],
                })
                .collect(),
            ..Schema::default()
        }
    }

    #[test]
    fn empty_input_is_unknown() {
        let report = classify(&Schema::default(), &Headers::new());
        assert_eq!(report.engine, Engine::Unknown);
        assert_eq!(report.confidence, 0);
        assert_eq!(report.security_notes, remediation_notes(Engine::Unknown));
        assert!(report.matched.is_empty());
    }

    #[test]
    fn all_zero_table_is_unknown() {
        assert_eq!(SignalTable::default().best(), (Engine::Unknown, 0));
    }

    #[test]
    fn hasura_powered_by_header() {
        let report = classify(
            &Schema::default(),
            &headers(&[("X-Powered-By", "Hasura GraphQL Engine")]),
        );
        assert_eq!(report.engine, Engine::Hasura);
        assert_eq!(report.confidence, 3);
    }

    #[test]
    fn apollo_literal_adds_exactly_three() {
        let base = schema_with(&["Query"], &["cacheControl"]);
        let without = classify(&base, &headers(&[("server", "nginx")]));
        let with = classify(&base, &headers(&[("server", "nginx"), ("x-trace", "via-APOLLO-gw")]));
        assert_eq!(
            with.signals.score(Engine::Apollo),
            without.signals.score(Engine::Apollo) + 3
        );
        assert_eq!(with.engine, Engine::Apollo);
        assert_eq!(with.confidence, 5);
    }

    #[test]
    fn tie_goes_to_first_declared_engine() {
        let report = classify(
            &Schema::default(),
            &headers(&[("x-a", "ariadne"), ("x-b", "postgraphile")]),
        );
        assert_eq!(report.signals.score(Engine::Ariadne), 3);
        assert_eq!(report.signals.score(Engine::PostGraphile), 3);
        assert_eq!(report.engine, Engine::PostGraphile);
    }

    #[test]
    fn hot_chocolate_literals_count_once() {
        let report = classify(
            &Schema::default(),
            &headers(&[("server", "HotChocolate"), ("x-tool", "chilli")]),
        );
        assert_eq!(report.signals.score(Engine::HotChocolate), 3);
        assert_eq!(report.engine, Engine::HotChocolate);
    }

    #[test]
    fn schema_conventions_score() {
        let report = classify(
            &schema_with(&["query_root", "PageInfo", "RelayNode"], &["cached"]),
            &Headers::new(),
        );
        assert_eq!(report.signals.score(Engine::Hasura), 4);
        assert_eq!(report.signals.score(Engine::PostGraphile), 2);
        assert_eq!(report.engine, Engine::Hasura);
        assert_eq!(report.matched.len(), 4);
    }

    #[test]
    fn signal_table_serializes_in_declaration_order() {
        let mut table = SignalTable::default();
        table.add(Engine::HotChocolate, 1);
        table.add(Engine::Unknown, 9);
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(
            json,
            r#"{"Apollo":0,"Hasura":0,"graphene-python":0,"PostGraphile":0,"Ariadne":0,"Hot Chocolate":1}"#
        );
    }

    #[test]
    fn every_engine_has_notes() {
        for engine in Engine::KNOWN.iter().copied().chain([Engine::Unknown]) {
            assert!(!remediation_notes(engine).is_empty(), "{engine}");
        }
    }
}
