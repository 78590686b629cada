use crate::error::QueryPlanError;
use crate::query_plan::build_plan::collect_fields;
use crate::query_plan::field_set::{Field, FieldSet, Scope};
use crate::schema::metadata::ServiceName;
use crate::schema::ComposedSchema;
use crate::utils::{is_composite_type, is_object_type};
use apollo_compiler::ast::{
    FieldDefinition, Name, NamedType, Type, VariableDefinition,
};
use apollo_compiler::executable::{self, Fragment, Operation, Selection, SelectionSet};
use apollo_compiler::{name, Node, NodeStr};
use indexmap::{IndexMap, IndexSet};
use lazy_static::lazy_static;
use std::cell::RefCell;
use std::rc::Rc;

lazy_static! {
    static ref TYPENAME_FIELD_DEF: Node<FieldDefinition> = Node::new(FieldDefinition {
        description: None,
        name: name!("__typename"),
        arguments: Vec::new(),
        ty: Type::NonNullNamed(name!("String")),
        directives: Default::default(),
    });
    static ref SCHEMA_FIELD_DEF: Node<FieldDefinition> = Node::new(FieldDefinition {
        description: None,
        name: name!("__schema"),
        arguments: Vec::new(),
        ty: Type::NonNullNamed(name!("__Schema")),
        directives: Default::default(),
    });
    static ref TYPE_FIELD_DEF: Node<FieldDefinition> = Node::new(FieldDefinition {
        description: None,
        name: name!("__type"),
        arguments: vec![Node::new(apollo_compiler::ast::InputValueDefinition {
            description: None,
            name: name!("name"),
            ty: Node::new(Type::NonNullNamed(name!("String"))),
            default_value: None,
            directives: Default::default(),
        })],
        ty: Type::Named(name!("__Type")),
        directives: Default::default(),
    });
}

/// A synthetic `__typename` field occurrence at the given scope.
pub(crate) fn typename_field(scope: Rc<Scope>) -> Field {
    Field {
        scope,
        field_node: Node::new(executable::Field {
            definition: TYPENAME_FIELD_DEF.clone(),
            alias: None,
            name: name!("__typename"),
            arguments: Vec::new(),
            directives: Default::default(),
            selection_set: SelectionSet {
                ty: name!("String"),
                selections: Vec::new(),
            },
        }),
        field_def: TYPENAME_FIELD_DEF.clone(),
    }
}

#[derive(Default)]
struct InternalFragmentTable {
    counter: usize,
    by_selection: IndexMap<String, (Name, Node<Fragment>)>,
}

/// Per-plan state: the operation being planned, its fragment table, the
/// variable definitions, and the generated-fragment table. Constructed per
/// planning call and discarded when planning returns.
pub(crate) struct QueryPlanningContext<'a> {
    pub(crate) schema: &'a ComposedSchema,
    pub(crate) operation: &'a Node<Operation>,
    pub(crate) fragments: &'a IndexMap<Name, Node<Fragment>>,
    pub(crate) auto_fragmentization: bool,
    variable_definitions: IndexMap<Name, Node<VariableDefinition>>,
    internal_fragments: RefCell<InternalFragmentTable>,
}

impl<'a> QueryPlanningContext<'a> {
    pub(crate) fn new(
        schema: &'a ComposedSchema,
        operation: &'a Node<Operation>,
        fragments: &'a IndexMap<Name, Node<Fragment>>,
        auto_fragmentization: bool,
    ) -> Self {
        let variable_definitions = operation
            .variables
            .iter()
            .map(|definition| (definition.name.clone(), definition.clone()))
            .collect();
        Self {
            schema,
            operation,
            fragments,
            auto_fragmentization,
            variable_definitions,
            internal_fragments: RefCell::new(InternalFragmentTable::default()),
        }
    }

    pub(crate) fn variable_definitions(&self) -> &IndexMap<Name, Node<VariableDefinition>> {
        &self.variable_definitions
    }

    pub(crate) fn new_scope(
        &self,
        parent_type: NamedType,
        enclosing_scope: Option<Rc<Scope>>,
    ) -> Scope {
        let possible = self.schema.possible_types(&parent_type);
        let possible_types = match &enclosing_scope {
            Some(enclosing) => possible
                .iter()
                .filter(|ty| enclosing.possible_types.contains(ty))
                .cloned()
                .collect(),
            None => possible.to_vec(),
        };
        Scope {
            parent_type,
            possible_types,
            directives: None,
            enclosing_scope,
        }
    }

    /// Resolves a field node's definition on a parent type, with the
    /// meta fields spelled out since the schema's own types don't carry
    /// planner-usable definitions for them.
    pub(crate) fn get_field_def(
        &self,
        parent_type: &NamedType,
        field_node: &executable::Field,
    ) -> Result<Node<FieldDefinition>, QueryPlanError> {
        let field_name = field_node.name.as_str();
        let schema = self.schema.schema();
        if field_name == "__schema" && self.is_query_root(parent_type) {
            return Ok(SCHEMA_FIELD_DEF.clone());
        }
        if field_name == "__type" && self.is_query_root(parent_type) {
            return Ok(TYPE_FIELD_DEF.clone());
        }
        if field_name == "__typename" && is_composite_type(schema, parent_type) {
            return Ok(TYPENAME_FIELD_DEF.clone());
        }
        let definition = match schema.types.get(parent_type) {
            Some(apollo_compiler::schema::ExtendedType::Object(object)) => {
                object.fields.get(&field_node.name)
            }
            Some(apollo_compiler::schema::ExtendedType::Interface(interface)) => {
                interface.fields.get(&field_node.name)
            }
            _ => None,
        };
        definition
            .map(|component| component.node.clone())
            .ok_or_else(|| QueryPlanError::UndefinedField {
                parent_type: parent_type.clone(),
                field_name: field_node.name.clone(),
            })
    }

    pub(crate) fn owning_service(
        &self,
        parent_type: &NamedType,
        field_def: &FieldDefinition,
    ) -> Result<ServiceName, QueryPlanError> {
        self.schema
            .owning_service(parent_type, &field_def.name)
            .ok_or_else(|| QueryPlanError::NoOwningService {
                parent_type: parent_type.clone(),
                field_name: field_def.name.clone(),
            })
    }

    pub(crate) fn base_service(
        &self,
        parent_type: &NamedType,
    ) -> Result<ServiceName, QueryPlanError> {
        self.schema
            .base_service(parent_type)
            .ok_or_else(|| QueryPlanError::NoBaseService {
                type_name: parent_type.clone(),
            })
    }

    /// Whether subfield routing should treat a parent type as a value type:
    /// declared value types, and any abstract parent.
    pub(crate) fn is_value_type_like(&self, parent_type: &NamedType) -> bool {
        !is_object_type(self.schema.schema(), parent_type)
            || self.schema.is_value_type(parent_type)
    }

    /// The selection identifying an entity of `parent_type` on a subgraph:
    /// `__typename` plus the key fields each possible runtime type declares
    /// for that subgraph (the first key, or all of them with `fetch_all`).
    pub(crate) fn get_key_fields(
        &self,
        parent_type: &NamedType,
        service_name: &NodeStr,
        fetch_all: bool,
    ) -> Result<FieldSet, QueryPlanError> {
        let mut key_fields = vec![typename_field(Rc::new(
            self.new_scope(parent_type.clone(), None),
        ))];
        for possible_type in self.schema.possible_types(parent_type) {
            let Some(keys) = self.schema.keys(possible_type, service_name) else {
                continue;
            };
            if keys.is_empty() {
                continue;
            }
            let scope = Rc::new(self.new_scope(possible_type.clone(), None));
            if fetch_all {
                for key in keys {
                    collect_fields(
                        self,
                        scope.clone(),
                        key,
                        &mut key_fields,
                        &mut IndexSet::new(),
                    )?;
                }
            } else {
                collect_fields(
                    self,
                    scope.clone(),
                    &keys[0],
                    &mut key_fields,
                    &mut IndexSet::new(),
                )?;
            }
        }
        Ok(key_fields)
    }

    /// What must accompany an entity representation before `service_name`
    /// can resolve the field: the entity keys plus any `@requires`
    /// selection.
    pub(crate) fn get_required_fields(
        &self,
        parent_type: &NamedType,
        field_def: &FieldDefinition,
        service_name: &NodeStr,
    ) -> Result<FieldSet, QueryPlanError> {
        let mut required_fields = self.get_key_fields(parent_type, service_name, false)?;
        if let Some(requires) = self
            .schema
            .field_metadata(parent_type, &field_def.name)
            .and_then(|metadata| metadata.requires.as_ref())
        {
            let scope = Rc::new(self.new_scope(parent_type.clone(), None));
            collect_fields(
                self,
                scope,
                requires,
                &mut required_fields,
                &mut IndexSet::new(),
            )?;
        }
        Ok(required_fields)
    }

    /// What a subgraph already returns for a composite field without owning
    /// it: every key of the return type on that subgraph, plus the field's
    /// `@provides` selection.
    pub(crate) fn get_provided_fields(
        &self,
        parent_type: &NamedType,
        field_def: &FieldDefinition,
        service_name: &NodeStr,
    ) -> Result<FieldSet, QueryPlanError> {
        let return_type = field_def.ty.inner_named_type();
        if !is_composite_type(self.schema.schema(), return_type) {
            return Ok(Vec::new());
        }
        let mut provided_fields = self.get_key_fields(return_type, service_name, true)?;
        if let Some(provides) = self
            .schema
            .field_metadata(parent_type, &field_def.name)
            .and_then(|metadata| metadata.provides.as_ref())
        {
            let scope = Rc::new(self.new_scope(return_type.clone(), None));
            collect_fields(
                self,
                scope,
                provides,
                &mut provided_fields,
                &mut IndexSet::new(),
            )?;
        }
        Ok(provided_fields)
    }

    pub(crate) fn is_root_type(&self, type_name: &NamedType) -> bool {
        let definition = &self.schema.schema().schema_definition;
        [
            definition.query.as_ref(),
            definition.mutation.as_ref(),
            definition.subscription.as_ref(),
        ]
        .into_iter()
        .flatten()
        .any(|root| root.name == *type_name)
    }

    fn is_query_root(&self, type_name: &NamedType) -> bool {
        self.schema
            .schema()
            .schema_definition
            .query
            .as_ref()
            .is_some_and(|root| root.name == *type_name)
    }

    pub(crate) fn operation_root_type(&self) -> Result<NamedType, QueryPlanError> {
        use apollo_compiler::executable::OperationType;
        let definition = &self.schema.schema().schema_definition;
        let root = match self.operation.operation_type {
            OperationType::Query => definition.query.as_ref(),
            OperationType::Mutation => definition.mutation.as_ref(),
            OperationType::Subscription => definition.subscription.as_ref(),
        };
        root.map(|component| component.name.clone()).ok_or_else(|| {
            let kind = match self.operation.operation_type {
                OperationType::Query => "queries",
                OperationType::Mutation => "mutations",
                OperationType::Subscription => "subscriptions",
            };
            QueryPlanError::InvalidGraphQL {
                message: format!("Schema is not configured for {kind}"),
            }
        })
    }

    /// Returns the generated fragment for a selection set, reusing the one
    /// already generated for an identical selection set in this plan.
    pub(crate) fn get_internal_fragment(
        &self,
        return_type: &NamedType,
        selections: Vec<Selection>,
    ) -> (Name, Node<Fragment>) {
        // The printed selection set is the canonical identity fragments are
        // deduplicated by.
        let key = executable::Operation {
            operation_type: executable::OperationType::Query,
            name: None,
            variables: Vec::new(),
            directives: Default::default(),
            selection_set: SelectionSet {
                ty: return_type.clone(),
                selections: selections.clone(),
            },
        }
        .to_string();
        let mut table = self.internal_fragments.borrow_mut();
        if let Some((name, fragment)) = table.by_selection.get(&key) {
            return (name.clone(), fragment.clone());
        }
        let name = Name::new_unchecked(NodeStr::new(&format!(
            "__QueryPlanFragment_{}",
            table.counter
        )));
        table.counter += 1;
        let fragment = Node::new(Fragment {
            name: name.clone(),
            directives: Default::default(),
            selection_set: SelectionSet {
                ty: return_type.clone(),
                selections,
            },
        });
        table
            .by_selection
            .insert(key, (name.clone(), fragment.clone()));
        (name, fragment)
    }
}
