use tracing::info;

use crate::error::ScanError;
use crate::transport::{GraphqlResponse, Headers, Transport, execute};

/// Fixed introspection document. `TypeRef` unwraps seven levels, enough for `[[T!]!]!`-style nesting.
pub const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types {
      kind
      name
      description
      fields(includeDeprecated: true) {
        name
        description
        isDeprecated
        deprecationReason
        type { ...TypeRef }
      }
      inputFields {
        name
        type { ...TypeRef }
      }
      interfaces { ...TypeRef }
      possibleTypes { ...TypeRef }
      enumValues(includeDeprecated: true) { name }
    }
    directives {
      name
      description
      locations
    }
  }
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
            ofType {
              kind
              name
              ofType {
                kind
                name
              }
            }
          }
        }
      }
    }
  }
}
"#;

pub const OPERATION_NAME: &str = "IntrospectionQuery";

/// Sends the introspection document and returns the raw body with the response headers.
pub fn introspect(
    transport: &dyn Transport,
    target: &str,
    headers: &Headers,
) -> Result<GraphqlResponse, ScanError> {
    info!(target_url = target, "running introspection");
    execute(
        transport,
        target,
        headers,
        INTROSPECTION_QUERY,
        None,
        Some(OPERATION_NAME),
    )
}
