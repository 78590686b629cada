use crate::error::QueryPlanError;
use crate::query_plan::fetch_group::{
    FetchGroup, GroupForField, GroupForSubField, ParallelGroupForField, SerialGroupForField,
};
use crate::query_plan::field_set::{
    group_by_parent_type, group_by_response_name, response_name, selection_set_from_field_set,
    Field, FieldSet, Scope,
};
use crate::query_plan::planning_context::{typename_field, QueryPlanningContext};
use crate::query_plan::{ResponsePath, ResponsePathElement};
use crate::utils::{is_abstract_type, is_composite_type, is_introspection_type, is_object_type};
use apollo_compiler::ast::{Name, NamedType, Type};
use apollo_compiler::executable::{self, Selection, SelectionSet};
use apollo_compiler::Node;
use indexmap::IndexSet;
use std::rc::Rc;
use tracing::trace;

/// Walks a selection set depth-first, expanding fragments, and appends one
/// `Field` record per field node encountered. Source order is preserved and
/// duplicates are left in place; response-name grouping resolves them
/// during splitting.
pub(crate) fn collect_fields(
    context: &QueryPlanningContext,
    scope: Rc<Scope>,
    selection_set: &SelectionSet,
    fields: &mut FieldSet,
    visited_fragment_names: &mut IndexSet<Name>,
) -> Result<(), QueryPlanError> {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field_node) => {
                let field_def = context.get_field_def(&scope.parent_type, field_node)?;
                fields.push(Field {
                    scope: scope.clone(),
                    field_node: field_node.clone(),
                    field_def,
                });
            }
            Selection::InlineFragment(inline_fragment) => {
                let condition = inline_fragment
                    .type_condition
                    .clone()
                    .unwrap_or_else(|| scope.parent_type.clone());
                let mut new_scope = context.new_scope(condition, Some(scope.clone()));
                if new_scope.possible_types.is_empty() {
                    continue;
                }
                if !inline_fragment.directives.is_empty() {
                    new_scope.directives = Some(inline_fragment.directives.clone());
                }
                collect_fields(
                    context,
                    Rc::new(new_scope),
                    &inline_fragment.selection_set,
                    fields,
                    visited_fragment_names,
                )?;
            }
            Selection::FragmentSpread(spread) => {
                let Some(fragment) = context.fragments.get(&spread.fragment_name) else {
                    continue;
                };
                let new_scope =
                    context.new_scope(fragment.type_condition().clone(), Some(scope.clone()));
                if new_scope.possible_types.is_empty() {
                    continue;
                }
                if visited_fragment_names.contains(&spread.fragment_name) {
                    continue;
                }
                visited_fragment_names.insert(spread.fragment_name.clone());
                collect_fields(
                    context,
                    Rc::new(new_scope),
                    &fragment.selection_set,
                    fields,
                    visited_fragment_names,
                )?;
            }
        }
    }
    Ok(())
}

/// Collects the merged subfields of the same-response-name parents, against
/// the composite return type as the new scope. The visited-fragment set is
/// shared across the parents so a spread repeated among them expands once.
fn collect_subfields(
    context: &QueryPlanningContext,
    return_type: &NamedType,
    fields: &[Field],
) -> Result<FieldSet, QueryPlanError> {
    let mut subfields = Vec::new();
    let mut visited_fragment_names = IndexSet::new();
    for field in fields {
        let selection_set = &field.field_node.selection_set;
        if !selection_set.selections.is_empty() {
            let scope = Rc::new(context.new_scope(return_type.clone(), None));
            collect_fields(
                context,
                scope,
                selection_set,
                &mut subfields,
                &mut visited_fragment_names,
            )?;
        }
    }
    Ok(subfields)
}

pub(crate) fn split_root_fields(
    context: &QueryPlanningContext,
    fields: FieldSet,
) -> Result<Vec<FetchGroup>, QueryPlanError> {
    let mut grouper = ParallelGroupForField::new(context);
    split_fields(context, &ResponsePath::new(), fields, &mut grouper)?;
    Ok(grouper.into_groups())
}

/// Mutation root fields are grouped in order: consecutive same-subgraph
/// fields batch into one group, and a subgraph change starts a new group,
/// so the plan replays the fields serially.
pub(crate) fn split_root_fields_serially(
    context: &QueryPlanningContext,
    fields: FieldSet,
) -> Result<Vec<FetchGroup>, QueryPlanError> {
    let mut grouper = SerialGroupForField::new(context);
    split_fields(context, &ResponsePath::new(), fields, &mut grouper)?;
    Ok(grouper.into_groups())
}

fn split_subfields(
    context: &QueryPlanningContext,
    path: &ResponsePath,
    fields: FieldSet,
    sub_group: FetchGroup,
) -> Result<FetchGroup, QueryPlanError> {
    let mut grouper = GroupForSubField::new(context, sub_group);
    split_fields(context, path, fields, &mut grouper)?;
    Ok(grouper.into_group())
}

/// Routes fields to fetch groups: by response name, then by lexical parent
/// type. Object parents route directly; abstract parents route as-is when
/// every runtime type resolves the field in one subgraph, and otherwise
/// explode into one routed field per runtime type.
fn split_fields(
    context: &QueryPlanningContext,
    path: &ResponsePath,
    fields: FieldSet,
    grouper: &mut impl GroupForField,
) -> Result<(), QueryPlanError> {
    for (_, fields_for_response_name) in group_by_response_name(fields) {
        for (parent_type, fields_for_parent_type) in group_by_parent_type(fields_for_response_name)
        {
            let field = &fields_for_parent_type[0];
            let scope = field.scope.clone();
            let field_def = field.field_def.clone();

            // `__typename` of a root operation type never reaches a
            // subgraph.
            if field_def.name.as_str() == "__typename" && context.is_root_type(&parent_type) {
                continue;
            }

            // Introspection is answered locally, not planned.
            if is_introspection_type(field_def.ty.inner_named_type().as_str()) {
                continue;
            }

            if is_object_type(context.schema.schema(), &parent_type)
                && scope.possible_types.contains(&parent_type)
            {
                let group = grouper.group_for_field(field)?;
                let completed =
                    complete_field(context, scope, group, path, &fields_for_parent_type)?;
                group.fields.push(completed);
                continue;
            }

            let mut has_extending_field_defs = false;
            for possible_type in &scope.possible_types {
                let possible_def = context.get_field_def(possible_type, &field.field_node)?;
                if context
                    .schema
                    .field_metadata(possible_type, &possible_def.name)
                    .is_some_and(|metadata| metadata.graph_name.is_some())
                {
                    has_extending_field_defs = true;
                    break;
                }
            }

            // Every runtime type resolves this field through the same
            // subgraph as the abstract type itself: no explosion needed.
            if !has_extending_field_defs {
                let group = grouper.group_for_field(field)?;
                let completed =
                    complete_field(context, scope, group, path, &fields_for_parent_type)?;
                group.fields.push(completed);
                continue;
            }

            for runtime_type in scope.possible_types.iter() {
                let new_field_def = context.get_field_def(runtime_type, &field.field_node)?;
                let new_scope =
                    Rc::new(context.new_scope(runtime_type.clone(), Some(scope.clone())));
                let routing_field = Field {
                    scope: new_scope.clone(),
                    field_node: field.field_node.clone(),
                    field_def: new_field_def.clone(),
                };
                let fields_with_runtime_parent: FieldSet = fields_for_parent_type
                    .iter()
                    .map(|f| Field {
                        scope: f.scope.clone(),
                        field_node: f.field_node.clone(),
                        field_def: new_field_def.clone(),
                    })
                    .collect();
                let group = grouper.group_for_field(&routing_field)?;
                let completed = complete_field(
                    context,
                    new_scope,
                    group,
                    path,
                    &fields_with_runtime_parent,
                )?;
                group.fields.push(completed);
            }
        }
    }
    Ok(())
}

/// Finishes one routed field. Leaves pass through unchanged; composite
/// return types get a subgroup on the same subgraph, a recursive descent
/// over the merged subfields, and a rebuilt selection set. The subgroup's
/// dependents and generated fragments are hoisted into the parent group.
fn complete_field(
    context: &QueryPlanningContext,
    scope: Rc<Scope>,
    parent_group: &mut FetchGroup,
    path: &ResponsePath,
    fields: &[Field],
) -> Result<Field, QueryPlanError> {
    let field_node = &fields[0].field_node;
    let field_def = &fields[0].field_def;
    let return_type = field_def.ty.inner_named_type();

    if !is_composite_type(context.schema.schema(), return_type) {
        return Ok(Field {
            scope,
            field_node: field_node.clone(),
            field_def: field_def.clone(),
        });
    }

    let field_path = add_path(path, response_name(field_node), &field_def.ty);
    let mut sub_group = FetchGroup::new(parent_group.service_name.clone());
    sub_group.merge_at = field_path.clone();
    sub_group.provided_fields = context.get_provided_fields(
        &scope.parent_type,
        field_def,
        &parent_group.service_name,
    )?;

    // Abstract results need `__typename` to be discriminated at stitching
    // time.
    if is_abstract_type(context.schema.schema(), return_type) {
        sub_group.fields.push(typename_field(Rc::new(
            context.new_scope(return_type.clone(), Some(scope.clone())),
        )));
    }

    let subfields = collect_subfields(context, return_type, fields)?;
    trace!(
        subfields = subfields.len(),
        field = field_node.name.as_str(),
        "descending into composite field"
    );
    let mut sub_group = split_subfields(context, &field_path, subfields, sub_group)?;

    parent_group
        .other_dependent_groups
        .extend(sub_group.take_dependent_groups());

    let sub_group_field_count = sub_group.fields.len();
    let FetchGroup {
        fields: sub_group_fields,
        internal_fragments: sub_group_fragments,
        ..
    } = sub_group;

    let mut selections =
        selection_set_from_field_set(context.schema, sub_group_fields, Some(return_type));

    if context.auto_fragmentization && sub_group_field_count > 2 {
        let (fragment_name, fragment) = context.get_internal_fragment(return_type, selections);
        parent_group
            .internal_fragments
            .insert(fragment_name.clone(), fragment);
        selections = vec![Selection::FragmentSpread(Node::new(
            executable::FragmentSpread {
                fragment_name,
                directives: Default::default(),
            },
        ))];
    }
    for (name, fragment) in sub_group_fragments {
        parent_group.internal_fragments.insert(name, fragment);
    }

    // Client AST nodes are shared; substitute the selection set on a fresh
    // node instead of mutating in place.
    let mut new_node = (**field_node).clone();
    new_node.selection_set = SelectionSet {
        ty: return_type.clone(),
        selections,
    };
    Ok(Field {
        scope,
        field_node: Node::new(new_node),
        field_def: field_def.clone(),
    })
}

/// Extends a response path with a field's response name and one `"@"` per
/// list wrapper in its type.
fn add_path(path: &ResponsePath, response_name: &Name, ty: &Type) -> ResponsePath {
    let mut path = path.clone();
    path.push(ResponsePathElement::Key(response_name.as_str().to_owned()));
    let mut ty = ty;
    loop {
        match ty {
            Type::Named(_) | Type::NonNullNamed(_) => break,
            Type::List(inner) | Type::NonNullList(inner) => {
                path.push(ResponsePathElement::AnyIndex);
                ty = inner.as_ref();
            }
        }
    }
    path
}
