use apollo_compiler::executable::Selection;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

mod build_plan;
mod fetch_group;
mod field_set;
pub(crate) mod generate;
mod planning_context;
pub mod query_planner;

/// A query plan for one client operation against the supergraph.
///
/// `node` is absent for an empty operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPlan {
    pub node: Option<PlanNode>,
}

impl QueryPlan {
    pub fn new(node: impl Into<PlanNode>) -> Self {
        Self {
            node: Some(node.into()),
        }
    }
}

impl Serialize for QueryPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("QueryPlan", 2)?;
        state.serialize_field("kind", "QueryPlan")?;
        state.serialize_field("node", &self.node)?;
        state.end()
    }
}

/// One node of a query plan.
#[derive(Debug, Clone, PartialEq, Serialize, derive_more::From)]
#[serde(tag = "kind")]
pub enum PlanNode {
    Fetch(FetchNode),
    Flatten(FlattenNode),
    Sequence(SequenceNode),
    Parallel(ParallelNode),
}

/// The leaf of a query plan: one GraphQL request against one subgraph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchNode {
    pub service_name: String,
    /// The operation variables the fetch's operation references, in order of
    /// first use. The synthetic `representations` variable of entity
    /// fetches is not listed here.
    pub variable_usages: Vec<String>,
    /// Present iff this is an `_entities` fetch: the selection identifying
    /// the entity representations to send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires: Option<Vec<QueryPlanSelectionNode>>,
    /// The printed, whitespace-stripped GraphQL document to send.
    pub operation: String,
}

/// Applies the wrapped fetch at `path` relative to the parent result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenNode {
    pub path: ResponsePath,
    pub node: Box<PlanNode>,
}

/// Ordered execution: each child observes the previous child's effects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceNode {
    pub nodes: Vec<PlanNode>,
}

/// Unordered execution of independent children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParallelNode {
    pub nodes: Vec<PlanNode>,
}

/// Path in the response shape, made of field response names and the `"@"`
/// sentinel for list traversal. No absolute indices.
pub type ResponsePath = Vec<ResponsePathElement>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePathElement {
    Key(String),
    AnyIndex,
}

impl Serialize for ResponsePathElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResponsePathElement::Key(key) => serializer.serialize_str(key),
            ResponsePathElement::AnyIndex => serializer.serialize_str("@"),
        }
    }
}

impl fmt::Display for ResponsePathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponsePathElement::Key(key) => f.write_str(key),
            ResponsePathElement::AnyIndex => f.write_str("@"),
        }
    }
}

/// Trimmed selection tree attached to an entity fetch's `requires`.
///
/// Fragment spreads cannot occur here; the information they carry is already
/// inlined in the fetch's operation document.
#[derive(Debug, Clone, PartialEq, Serialize, derive_more::From)]
#[serde(tag = "kind")]
pub enum QueryPlanSelectionNode {
    Field(QueryPlanFieldNode),
    InlineFragment(QueryPlanInlineFragmentNode),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlanFieldNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selections: Option<Vec<QueryPlanSelectionNode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlanInlineFragmentNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_condition: Option<String>,
    pub selections: Vec<QueryPlanSelectionNode>,
}

/// Strips AST selections down to the response-shape skeleton used by
/// `FetchNode.requires`.
pub fn trim_selection_nodes(selections: &[Selection]) -> Vec<QueryPlanSelectionNode> {
    selections
        .iter()
        .filter_map(|selection| match selection {
            Selection::Field(field) => Some(
                QueryPlanFieldNode {
                    alias: field.alias.as_ref().map(|alias| alias.as_str().to_owned()),
                    name: field.name.as_str().to_owned(),
                    selections: if field.selection_set.selections.is_empty() {
                        None
                    } else {
                        Some(trim_selection_nodes(&field.selection_set.selections))
                    },
                }
                .into(),
            ),
            Selection::InlineFragment(inline_fragment) => Some(
                QueryPlanInlineFragmentNode {
                    type_condition: inline_fragment
                        .type_condition
                        .as_ref()
                        .map(|condition| condition.as_str().to_owned()),
                    selections: trim_selection_nodes(&inline_fragment.selection_set.selections),
                }
                .into(),
            ),
            Selection::FragmentSpread(_) => None,
        })
        .collect()
}
