use crate::error::QueryPlanError;
use crate::query_plan::fetch_group::FetchGroup;
use crate::query_plan::field_set::selection_set_from_field_set;
use crate::query_plan::planning_context::QueryPlanningContext;
use crate::query_plan::{
    trim_selection_nodes, FetchNode, FlattenNode, ParallelNode, PlanNode, SequenceNode,
};
use crate::utils::strip_ignored_characters;
use apollo_compiler::ast::{self, Name, NamedType, OperationType, Type, VariableDefinition};
use apollo_compiler::executable::{self, Fragment};
use apollo_compiler::{name, Node};
use indexmap::IndexMap;

pub(crate) enum NodeCollectionKind {
    Sequence,
    Parallel,
}

/// Emits the plan node for a fetch group and, recursively, its dependents:
/// the group's own fetch (wrapped in `Flatten` when it applies below the
/// response root), sequenced before the parallel block of its children.
pub(crate) fn execution_node_for_group(
    context: &QueryPlanningContext,
    mut group: FetchGroup,
    parent_type: Option<&NamedType>,
) -> Result<PlanNode, QueryPlanError> {
    let dependent_groups = group.take_dependent_groups();
    let FetchGroup {
        service_name,
        fields,
        required_fields,
        merge_at,
        internal_fragments,
        ..
    } = group;

    let selections = selection_set_from_field_set(context.schema, fields, parent_type);
    let requires = if required_fields.is_empty() {
        None
    } else {
        Some(selection_set_from_field_set(
            context.schema,
            required_fields,
            None,
        ))
    };

    let ast_selections = ast_selection_set(&selections);
    let fragment_definitions: Vec<Node<ast::FragmentDefinition>> = internal_fragments
        .values()
        .map(ast_fragment_definition)
        .collect();
    let variable_usages = variable_usages(
        &ast_selections,
        &fragment_definitions,
        context.variable_definitions(),
    )?;

    let document = if requires.is_some() {
        operation_for_entities_fetch(ast_selections, &variable_usages, fragment_definitions)
    } else {
        operation_for_root_fetch(
            ast_selections,
            &variable_usages,
            fragment_definitions,
            context.operation.operation_type,
        )
    };

    let fetch_node = FetchNode {
        service_name: service_name.as_str().to_owned(),
        variable_usages: variable_usages
            .keys()
            .map(|name| name.as_str().to_owned())
            .collect(),
        requires: requires.as_deref().map(trim_selection_nodes),
        operation: strip_ignored_characters(&document.to_string()),
    };

    let node: PlanNode = if merge_at.is_empty() {
        fetch_node.into()
    } else {
        FlattenNode {
            path: merge_at,
            node: Box::new(fetch_node.into()),
        }
        .into()
    };

    if dependent_groups.is_empty() {
        Ok(node)
    } else {
        let dependent_nodes = dependent_groups
            .into_iter()
            .map(|dependent_group| execution_node_for_group(context, dependent_group, None))
            .collect::<Result<Vec<_>, _>>()?;
        let children = flat_wrap(NodeCollectionKind::Parallel, dependent_nodes)?;
        flat_wrap(NodeCollectionKind::Sequence, vec![node, children])
    }
}

/// Wraps `nodes` in a node of the given kind, unless there is only one, in
/// which case it is returned directly. Parallel children of a parallel wrap
/// are spliced into the list; sequences are wrapped as-is and keep their
/// shape.
pub(crate) fn flat_wrap(
    kind: NodeCollectionKind,
    nodes: Vec<PlanNode>,
) -> Result<PlanNode, QueryPlanError> {
    if nodes.is_empty() {
        return Err(QueryPlanError::internal(
            "flat_wrap must be called with at least one node",
        ));
    }
    if nodes.len() == 1 {
        let mut nodes = nodes;
        return Ok(nodes.swap_remove(0));
    }
    match kind {
        NodeCollectionKind::Parallel => {
            let nodes = nodes
                .into_iter()
                .flat_map(|node| match node {
                    PlanNode::Parallel(ParallelNode { nodes }) => nodes,
                    other => vec![other],
                })
                .collect();
            Ok(PlanNode::Parallel(ParallelNode { nodes }))
        }
        NodeCollectionKind::Sequence => Ok(PlanNode::Sequence(SequenceNode { nodes })),
    }
}

/// Builds the `_entities` document of an entity fetch, with the
/// `representations` variable prepended to the collected usages.
fn operation_for_entities_fetch(
    selection_set: Vec<ast::Selection>,
    variable_usages: &IndexMap<Name, Node<VariableDefinition>>,
    fragments: Vec<Node<ast::FragmentDefinition>>,
) -> ast::Document {
    let mut variables = Vec::with_capacity(variable_usages.len() + 1);
    variables.push(Node::new(VariableDefinition {
        name: name!("representations"),
        ty: Node::new(Type::NonNullList(Box::new(Type::NonNullNamed(name!(
            "_Any"
        ))))),
        default_value: None,
        directives: Default::default(),
    }));
    variables.extend(variable_usages.values().cloned());

    let entities_field = ast::Field {
        alias: None,
        name: name!("_entities"),
        arguments: vec![Node::new(ast::Argument {
            name: name!("representations"),
            value: Node::new(ast::Value::Variable(name!("representations"))),
        })],
        directives: Default::default(),
        selection_set,
    };

    document_for_operation(
        ast::OperationDefinition {
            operation_type: OperationType::Query,
            name: None,
            variables,
            directives: Default::default(),
            selection_set: vec![ast::Selection::Field(Node::new(entities_field))],
        },
        fragments,
    )
}

fn operation_for_root_fetch(
    selection_set: Vec<ast::Selection>,
    variable_usages: &IndexMap<Name, Node<VariableDefinition>>,
    fragments: Vec<Node<ast::FragmentDefinition>>,
    operation_type: OperationType,
) -> ast::Document {
    document_for_operation(
        ast::OperationDefinition {
            operation_type,
            name: None,
            variables: variable_usages.values().cloned().collect(),
            directives: Default::default(),
            selection_set,
        },
        fragments,
    )
}

fn document_for_operation(
    operation: ast::OperationDefinition,
    fragments: Vec<Node<ast::FragmentDefinition>>,
) -> ast::Document {
    let mut document = ast::Document::new();
    document
        .definitions
        .push(ast::Definition::OperationDefinition(Node::new(operation)));
    document
        .definitions
        .extend(fragments.into_iter().map(ast::Definition::FragmentDefinition));
    document
}

/// Every variable referenced by the outbound selections and generated
/// fragments, mapped to its definition from the client operation, in order
/// of first use.
fn variable_usages(
    selections: &[ast::Selection],
    fragments: &[Node<ast::FragmentDefinition>],
    definitions: &IndexMap<Name, Node<VariableDefinition>>,
) -> Result<IndexMap<Name, Node<VariableDefinition>>, QueryPlanError> {
    let mut usages = IndexMap::new();
    collect_variables_in_selections(selections, definitions, &mut usages)?;
    for fragment in fragments {
        collect_variables_in_directives(&fragment.directives, definitions, &mut usages)?;
        collect_variables_in_selections(&fragment.selection_set, definitions, &mut usages)?;
    }
    Ok(usages)
}

fn collect_variables_in_selections(
    selections: &[ast::Selection],
    definitions: &IndexMap<Name, Node<VariableDefinition>>,
    usages: &mut IndexMap<Name, Node<VariableDefinition>>,
) -> Result<(), QueryPlanError> {
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => {
                for argument in &field.arguments {
                    collect_variables_in_value(&argument.value, definitions, usages)?;
                }
                collect_variables_in_directives(&field.directives, definitions, usages)?;
                collect_variables_in_selections(&field.selection_set, definitions, usages)?;
            }
            ast::Selection::InlineFragment(inline_fragment) => {
                collect_variables_in_directives(&inline_fragment.directives, definitions, usages)?;
                collect_variables_in_selections(
                    &inline_fragment.selection_set,
                    definitions,
                    usages,
                )?;
            }
            ast::Selection::FragmentSpread(spread) => {
                collect_variables_in_directives(&spread.directives, definitions, usages)?;
            }
        }
    }
    Ok(())
}

fn collect_variables_in_directives(
    directives: &ast::DirectiveList,
    definitions: &IndexMap<Name, Node<VariableDefinition>>,
    usages: &mut IndexMap<Name, Node<VariableDefinition>>,
) -> Result<(), QueryPlanError> {
    for directive in directives.iter() {
        for argument in &directive.arguments {
            collect_variables_in_value(&argument.value, definitions, usages)?;
        }
    }
    Ok(())
}

fn collect_variables_in_value(
    value: &ast::Value,
    definitions: &IndexMap<Name, Node<VariableDefinition>>,
    usages: &mut IndexMap<Name, Node<VariableDefinition>>,
) -> Result<(), QueryPlanError> {
    match value {
        ast::Value::Variable(name) => {
            let Some(definition) = definitions.get(name) else {
                return Err(QueryPlanError::internal(format!(
                    "no definition for variable \"${name}\" referenced in a subgraph fetch"
                )));
            };
            usages
                .entry(name.clone())
                .or_insert_with(|| definition.clone());
        }
        ast::Value::List(values) => {
            for value in values {
                collect_variables_in_value(value, definitions, usages)?;
            }
        }
        ast::Value::Object(entries) => {
            for (_, value) in entries {
                collect_variables_in_value(value, definitions, usages)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn ast_selection_set(selections: &[executable::Selection]) -> Vec<ast::Selection> {
    selections
        .iter()
        .map(|selection| match selection {
            executable::Selection::Field(field) => ast::Selection::Field(Node::new(ast::Field {
                alias: field.alias.clone(),
                name: field.name.clone(),
                arguments: field.arguments.clone(),
                directives: field.directives.clone(),
                selection_set: ast_selection_set(&field.selection_set.selections),
            })),
            executable::Selection::InlineFragment(inline_fragment) => {
                ast::Selection::InlineFragment(Node::new(ast::InlineFragment {
                    type_condition: inline_fragment.type_condition.clone(),
                    directives: inline_fragment.directives.clone(),
                    selection_set: ast_selection_set(&inline_fragment.selection_set.selections),
                }))
            }
            executable::Selection::FragmentSpread(spread) => {
                ast::Selection::FragmentSpread(Node::new(ast::FragmentSpread {
                    fragment_name: spread.fragment_name.clone(),
                    directives: spread.directives.clone(),
                }))
            }
        })
        .collect()
}

fn ast_fragment_definition(fragment: &Node<Fragment>) -> Node<ast::FragmentDefinition> {
    Node::new(ast::FragmentDefinition {
        name: fragment.name.clone(),
        type_condition: fragment.type_condition().clone(),
        directives: fragment.directives.clone(),
        selection_set: ast_selection_set(&fragment.selection_set.selections),
    })
}
