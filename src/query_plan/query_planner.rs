use crate::error::QueryPlanError;
use crate::query_plan::build_plan::{collect_fields, split_root_fields, split_root_fields_serially};
use crate::query_plan::generate::{execution_node_for_group, flat_wrap, NodeCollectionKind};
use crate::query_plan::planning_context::QueryPlanningContext;
use crate::query_plan::QueryPlan;
use crate::schema::ComposedSchema;
use apollo_compiler::ast::Name;
use apollo_compiler::executable::{Fragment, Operation, OperationType};
use apollo_compiler::validation::Valid;
use apollo_compiler::{ExecutableDocument, Node};
use indexmap::{IndexMap, IndexSet};
use std::rc::Rc;
use tracing::debug;

/// Options controlling how query plans are built.
#[derive(Debug, Clone, Default)]
pub struct QueryPlannerConfig {
    /// Whether to compress repeated selection sets in subgraph fetches into
    /// generated fragments (`__QueryPlanFragment_N`).
    ///
    /// This can shrink large fetch documents considerably when the same
    /// composite selection recurs, at the cost of a per-plan fragment table.
    /// Defaults to false.
    pub auto_fragmentization: bool,
}

/// Everything needed to plan one validated operation: the composed
/// supergraph, the operation itself, and its fragment table.
pub struct OperationContext<'a> {
    pub schema: &'a ComposedSchema,
    pub operation: &'a Node<Operation>,
    pub fragments: &'a IndexMap<Name, Node<Fragment>>,
}

/// Builds the query plan for one operation.
///
/// Root fields are collected, attributed to their owning subgraphs, and
/// grouped into fetches: in parallel for queries, serially for mutations.
/// Subscriptions are rejected.
pub fn build_query_plan(
    operation_context: &OperationContext<'_>,
    options: &QueryPlannerConfig,
) -> Result<QueryPlan, QueryPlanError> {
    let context = QueryPlanningContext::new(
        operation_context.schema,
        operation_context.operation,
        operation_context.fragments,
        options.auto_fragmentization,
    );

    if context.operation.operation_type == OperationType::Subscription {
        return Err(QueryPlanError::UnsupportedSubscription);
    }

    let root_type = context.operation_root_type()?;
    let is_mutation = context.operation.operation_type == OperationType::Mutation;
    debug!(
        root_type = root_type.as_str(),
        mutation = is_mutation,
        auto_fragmentization = options.auto_fragmentization,
        "building query plan"
    );

    let mut fields = Vec::new();
    collect_fields(
        &context,
        Rc::new(context.new_scope(root_type.clone(), None)),
        &context.operation.selection_set,
        &mut fields,
        &mut IndexSet::new(),
    )?;

    // Mutations are more specific in how fetch groups are formed: calls to
    // the same service may need to execute serially.
    let groups = if is_mutation {
        split_root_fields_serially(&context, fields)?
    } else {
        split_root_fields(&context, fields)?
    };
    debug!(groups = groups.len(), "computed root fetch groups");

    let nodes = groups
        .into_iter()
        .map(|group| execution_node_for_group(&context, group, Some(&root_type)))
        .collect::<Result<Vec<_>, _>>()?;

    if nodes.is_empty() {
        return Ok(QueryPlan::default());
    }
    let node = if is_mutation {
        flat_wrap(NodeCollectionKind::Sequence, nodes)?
    } else {
        flat_wrap(NodeCollectionKind::Parallel, nodes)?
    };
    Ok(QueryPlan { node: Some(node) })
}

/// Plans operations against one composed supergraph.
///
/// The planner holds no per-operation state; it may be shared across
/// threads.
pub struct QueryPlanner {
    supergraph: ComposedSchema,
    config: QueryPlannerConfig,
}

impl QueryPlanner {
    pub fn new(supergraph: ComposedSchema, config: QueryPlannerConfig) -> Self {
        Self { supergraph, config }
    }

    pub fn supergraph(&self) -> &ComposedSchema {
        &self.supergraph
    }

    pub fn build_query_plan(
        &self,
        document: &Valid<ExecutableDocument>,
        operation_name: Option<&str>,
    ) -> Result<QueryPlan, QueryPlanError> {
        let operation =
            document
                .get_operation(operation_name)
                .map_err(|_| match operation_name {
                    Some(_) => QueryPlanError::UnknownOperation,
                    None => QueryPlanError::OperationNameNotProvided,
                })?;
        if operation.selection_set.selections.is_empty() {
            return Ok(QueryPlan::default());
        }
        let operation_context = OperationContext {
            schema: &self.supergraph,
            operation,
            fragments: &document.fragments,
        };
        build_query_plan(&operation_context, &self.config)
    }
}
