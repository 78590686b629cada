use crate::schema::ComposedSchema;
use crate::utils::is_composite_type;
use apollo_compiler::ast::{DirectiveList, Name, NamedType};
use apollo_compiler::executable::{self, InlineFragment, Selection, SelectionSet};
use apollo_compiler::Node;
use indexmap::IndexMap;
use std::rc::Rc;

/// Lexical context of a field occurrence: the composite type it appears at,
/// the concrete types that type can be at runtime, and the directives of
/// the nearest enclosing inline fragment.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    pub(crate) parent_type: NamedType,
    pub(crate) possible_types: Vec<NamedType>,
    pub(crate) directives: Option<DirectiveList>,
    /// Kept for debugging scope chains; never consulted for ownership
    /// decisions.
    #[allow(dead_code)]
    pub(crate) enclosing_scope: Option<Rc<Scope>>,
}

/// A collected field occurrence: its scope, the client AST node, and the
/// field definition resolved for it.
#[derive(Debug, Clone)]
pub(crate) struct Field {
    pub(crate) scope: Rc<Scope>,
    pub(crate) field_node: Node<executable::Field>,
    pub(crate) field_def: Node<apollo_compiler::ast::FieldDefinition>,
}

/// Ordered sequence of collected fields. Order is preserved end-to-end so
/// mutation fields keep their serialization contract.
pub(crate) type FieldSet = Vec<Field>;

pub(crate) fn response_name(field: &executable::Field) -> &Name {
    field.alias.as_ref().unwrap_or(&field.name)
}

pub(crate) fn group_by_response_name(fields: FieldSet) -> IndexMap<Name, FieldSet> {
    let mut map: IndexMap<Name, FieldSet> = IndexMap::new();
    for field in fields {
        map.entry(response_name(&field.field_node).clone())
            .or_default()
            .push(field);
    }
    map
}

pub(crate) fn group_by_parent_type(fields: FieldSet) -> IndexMap<NamedType, FieldSet> {
    let mut map: IndexMap<NamedType, FieldSet> = IndexMap::new();
    for field in fields {
        map.entry(field.scope.parent_type.clone())
            .or_default()
            .push(field);
    }
    map
}

/// Prints the selection set a field set stands for.
///
/// Fields are grouped by their scope's parent type; each group deduplicates
/// by response name (merging child selections of composite fields) and is
/// wrapped in an inline fragment unless it matches the surrounding type and
/// its first scope carries no directives. Taking the directives from the
/// first field of a parent-type group means an inline fragment's directives
/// spread to every same-parent-type field of the group.
pub(crate) fn selection_set_from_field_set(
    schema: &ComposedSchema,
    fields: FieldSet,
    parent_type: Option<&NamedType>,
) -> Vec<Selection> {
    let mut selections = Vec::new();
    for (type_condition, fields_for_parent_type) in group_by_parent_type(fields) {
        let scope = fields_for_parent_type[0].scope.clone();
        let mut bucket = Vec::new();
        for (_, fields_for_response_name) in group_by_response_name(fields_for_parent_type) {
            bucket.push(Selection::Field(combine_fields(
                schema,
                fields_for_response_name,
            )));
        }

        let no_directives = scope
            .directives
            .as_ref()
            .map_or(true, |directives| directives.is_empty());
        if parent_type == Some(&type_condition) && no_directives {
            selections.extend(bucket);
        } else {
            selections.push(Selection::InlineFragment(Node::new(InlineFragment {
                type_condition: Some(type_condition.clone()),
                directives: scope.directives.clone().unwrap_or_default(),
                selection_set: SelectionSet {
                    ty: type_condition,
                    selections: bucket,
                },
            })));
        }
    }
    selections
}

/// Collapses same-response-name fields into one node, unioning the child
/// selections when the return type is composite.
fn combine_fields(schema: &ComposedSchema, fields: FieldSet) -> Node<executable::Field> {
    let first = &fields[0];
    let return_type = first.field_def.ty.inner_named_type();
    if is_composite_type(schema.schema(), return_type) {
        let mut merged = Vec::new();
        for field in &fields {
            merged.extend(field.field_node.selection_set.selections.iter().cloned());
        }
        let mut node = (*first.field_node).clone();
        node.selection_set = SelectionSet {
            ty: return_type.clone(),
            selections: merged,
        };
        Node::new(node)
    } else {
        first.field_node.clone()
    }
}
