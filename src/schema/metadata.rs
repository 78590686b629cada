use apollo_compiler::ast::Name;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::NodeStr;
use indexmap::IndexMap;
use multimap::MultiMap;
use url::Url;

pub type GraphName = NodeStr;
pub type ServiceName = NodeStr;

/// One subgraph participating in the supergraph, as declared by
/// `@join__graph` on the `join__Graph` enum.
#[derive(Debug, Clone)]
pub struct Graph {
    pub name: NodeStr,
    pub url: Url,
}

/// Schema-level federation metadata: the subgraphs the supergraph was
/// composed from, keyed by their `join__Graph` enum value name.
#[derive(Debug, Clone, Default)]
pub struct FederationSchemaMetadata {
    pub graphs: IndexMap<Name, Graph>,
}

/// Per-type federation metadata.
///
/// Entities are fetchable across subgraph boundaries through `_entities`
/// and carry per-subgraph key selections. Value types are replicated across
/// subgraphs with identical shape and belong to whichever fetch group
/// currently holds them.
#[derive(Debug, Clone)]
pub enum FederationTypeMetadata {
    Entity {
        /// The graph the type is defined in (its base service).
        graph_name: GraphName,
        /// Key selections per graph, in declaration order.
        keys: MultiMap<GraphName, SelectionSet>,
    },
    ValueType,
}

impl FederationTypeMetadata {
    pub fn is_value_type(&self) -> bool {
        matches!(self, FederationTypeMetadata::ValueType)
    }

    pub(crate) fn graph_name(&self) -> Option<&GraphName> {
        match self {
            FederationTypeMetadata::Entity { graph_name, .. } => Some(graph_name),
            FederationTypeMetadata::ValueType => None,
        }
    }

    pub(crate) fn keys_for_service(&self, service_name: &NodeStr) -> Option<&Vec<SelectionSet>> {
        match self {
            FederationTypeMetadata::Entity { keys, .. } => keys.get_vec(service_name),
            FederationTypeMetadata::ValueType => None,
        }
    }
}

/// Per-field federation metadata from `@join__field`.
#[derive(Debug, Clone, Default)]
pub struct FederationFieldMetadata {
    /// The graph that resolves this field, when it differs from (or
    /// restates) the parent type's base graph.
    pub graph_name: Option<GraphName>,
    /// Sibling fields that must accompany an entity representation before
    /// the owning subgraph can resolve this field.
    pub requires: Option<SelectionSet>,
    /// Child fields of this field's return type that the owning subgraph
    /// returns even though it does not own them.
    pub provides: Option<SelectionSet>,
}
