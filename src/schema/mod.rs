mod join_spec;
pub mod metadata;

use crate::error::QueryPlanError;
use crate::schema::metadata::{
    FederationFieldMetadata, FederationSchemaMetadata, FederationTypeMetadata, Graph, ServiceName,
};
use apollo_compiler::ast::{Name, NamedType};
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use apollo_compiler::{NodeStr, Schema};
use indexmap::IndexMap;

/// A composed supergraph schema together with its indexed federation
/// metadata.
///
/// Composition itself happens elsewhere; this type only reads the join spec
/// annotations off an already-composed schema and answers the ownership and
/// key questions query planning asks.
#[derive(Debug)]
pub struct ComposedSchema {
    schema: Valid<Schema>,
    metadata: FederationSchemaMetadata,
    types: IndexMap<NamedType, FederationTypeMetadata>,
    fields: IndexMap<(NamedType, Name), FederationFieldMetadata>,
    possible_types: IndexMap<NamedType, Vec<NamedType>>,
}

impl ComposedSchema {
    pub fn parse(source: &str) -> Result<Self, QueryPlanError> {
        let schema = Schema::parse_and_validate(source, "supergraph.graphql")?;
        Self::new(schema)
    }

    pub fn new(schema: Valid<Schema>) -> Result<Self, QueryPlanError> {
        let extracted = join_spec::extract_metadata(&schema)?;
        let possible_types = build_possible_types(&schema);
        Ok(Self {
            schema,
            metadata: extracted.metadata,
            types: extracted.types,
            fields: extracted.fields,
            possible_types,
        })
    }

    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    /// The subgraphs this supergraph was composed from, keyed by their
    /// `join__Graph` enum value.
    pub fn graphs(&self) -> &IndexMap<Name, Graph> {
        &self.metadata.graphs
    }

    pub fn type_metadata(&self, type_name: &NamedType) -> Option<&FederationTypeMetadata> {
        self.types.get(type_name)
    }

    pub fn field_metadata(
        &self,
        parent_type: &NamedType,
        field_name: &Name,
    ) -> Option<&FederationFieldMetadata> {
        self.fields
            .get(&(parent_type.clone(), field_name.clone()))
    }

    pub fn is_value_type(&self, type_name: &NamedType) -> bool {
        self.type_metadata(type_name)
            .is_some_and(|metadata| metadata.is_value_type())
    }

    /// The graph a type is defined in. `None` for value types and types
    /// without federation metadata.
    pub fn base_service(&self, parent_type: &NamedType) -> Option<ServiceName> {
        self.type_metadata(parent_type)
            .and_then(|metadata| metadata.graph_name().cloned())
    }

    /// The graph that resolves a field: the field's own graph when
    /// `@join__field` names one, the parent type's base graph otherwise.
    pub fn owning_service(
        &self,
        parent_type: &NamedType,
        field_name: &Name,
    ) -> Option<ServiceName> {
        match self
            .field_metadata(parent_type, field_name)
            .and_then(|metadata| metadata.graph_name.clone())
        {
            Some(graph_name) => Some(graph_name),
            None => self.base_service(parent_type),
        }
    }

    pub(crate) fn keys(
        &self,
        type_name: &NamedType,
        service_name: &NodeStr,
    ) -> Option<&Vec<SelectionSet>> {
        self.type_metadata(type_name)?.keys_for_service(service_name)
    }

    /// The concrete object types a composite type can be at runtime, in
    /// schema definition order. Singleton for objects, implementers for
    /// interfaces, members for unions.
    pub(crate) fn possible_types(&self, type_name: &NamedType) -> &[NamedType] {
        self.possible_types
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn build_possible_types(schema: &Schema) -> IndexMap<NamedType, Vec<NamedType>> {
    let mut map: IndexMap<NamedType, Vec<NamedType>> = IndexMap::new();
    for (name, ty) in &schema.types {
        if name.as_str().starts_with("__") {
            continue;
        }
        match ty {
            ExtendedType::Object(object) => {
                map.entry(name.clone()).or_default().push(name.clone());
                for interface in &object.implements_interfaces {
                    map.entry(interface.name.clone())
                        .or_default()
                        .push(name.clone());
                }
            }
            ExtendedType::Interface(_) => {
                map.entry(name.clone()).or_default();
            }
            ExtendedType::Union(union_) => {
                let members = union_.members.iter().map(|m| m.name.clone()).collect();
                map.insert(name.clone(), members);
            }
            _ => {}
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_compiler::name;

    const SUPERGRAPH: &str = r#"
      schema
        @link(url: "https://specs.apollo.dev/link/v1.0")
        @link(url: "https://specs.apollo.dev/join/v0.2", for: EXECUTION)
      {
        query: Query
      }

      directive @join__field(graph: join__Graph, requires: join__FieldSet, provides: join__FieldSet, type: String, external: Boolean, override: String, usedOverridden: Boolean) repeatable on FIELD_DEFINITION | INPUT_FIELD_DEFINITION

      directive @join__graph(name: String!, url: String!) on ENUM_VALUE

      directive @join__implements(graph: join__Graph!, interface: String!) repeatable on OBJECT | INTERFACE

      directive @join__type(graph: join__Graph!, key: join__FieldSet, extension: Boolean! = false, resolvable: Boolean! = true) repeatable on OBJECT | INTERFACE | UNION | ENUM | INPUT_OBJECT | SCALAR

      directive @link(url: String, as: String, for: link__Purpose, import: [link__Import]) repeatable on SCHEMA

      scalar join__FieldSet

      scalar link__Import

      enum link__Purpose {
        SECURITY
        EXECUTION
      }

      enum join__Graph {
        ACCOUNTS @join__graph(name: "accounts", url: "http://localhost:4001")
        REVIEWS @join__graph(name: "reviews", url: "http://localhost:4002")
      }

      type Query
        @join__type(graph: ACCOUNTS)
        @join__type(graph: REVIEWS)
      {
        me: User @join__field(graph: ACCOUNTS)
      }

      type User
        @join__type(graph: ACCOUNTS, key: "id")
        @join__type(graph: REVIEWS, key: "id")
      {
        id: ID!
        name: String @join__field(graph: ACCOUNTS)
        reviews: [Review] @join__field(graph: REVIEWS)
      }

      type Review
        @join__type(graph: REVIEWS, key: "id")
      {
        id: ID!
        body: String @join__field(graph: REVIEWS)
        author: User @join__field(graph: REVIEWS, provides: "name")
      }

      type PageInfo
        @join__type(graph: REVIEWS)
      {
        hasNextPage: Boolean
      }
    "#;

    #[test]
    fn extracts_graphs_and_type_ownership() {
        let schema = ComposedSchema::parse(SUPERGRAPH).unwrap();

        let graphs: Vec<&str> = schema
            .graphs()
            .values()
            .map(|graph| graph.name.as_str())
            .collect();
        assert_eq!(graphs, vec!["accounts", "reviews"]);

        assert_eq!(
            schema.base_service(&name!("User")).unwrap().as_str(),
            "accounts"
        );
        assert!(schema.is_value_type(&name!("PageInfo")));
        assert!(schema.is_value_type(&name!("Query")));
    }

    #[test]
    fn resolves_field_ownership_and_keys() {
        let schema = ComposedSchema::parse(SUPERGRAPH).unwrap();

        assert_eq!(
            schema
                .owning_service(&name!("User"), &name!("reviews"))
                .unwrap()
                .as_str(),
            "reviews"
        );
        // No @join__field on User.id: ownership falls back to the base graph.
        assert_eq!(
            schema
                .owning_service(&name!("User"), &name!("id"))
                .unwrap()
                .as_str(),
            "accounts"
        );

        let keys = schema
            .keys(&name!("User"), &NodeStr::new("reviews"))
            .unwrap();
        assert_eq!(keys.len(), 1);

        let provides = schema
            .field_metadata(&name!("Review"), &name!("author"))
            .unwrap()
            .provides
            .as_ref()
            .unwrap();
        assert_eq!(provides.selections.len(), 1);
    }
}
