use crate::error::QueryPlanError;
use crate::query_plan::field_set::{Field, FieldSet};
use crate::query_plan::planning_context::QueryPlanningContext;
use crate::query_plan::ResponsePath;
use apollo_compiler::executable::Fragment;
use apollo_compiler::ast::Name;
use apollo_compiler::{Node, NodeStr};
use indexmap::IndexMap;

/// A set of fields to fetch from one subgraph, plus the groups that depend
/// on its result.
///
/// A group with a non-empty `required_fields` is fetched through the
/// subgraph's `_entities` field; a group without is a plain root fetch.
#[derive(Debug)]
pub(crate) struct FetchGroup {
    pub(crate) service_name: NodeStr,
    pub(crate) fields: FieldSet,
    /// Fragment definitions generated by auto-fragmentization, hoisted
    /// upward so the emitted document carries each of them once.
    pub(crate) internal_fragments: IndexMap<Name, Node<Fragment>>,
    /// What this group demands from its parent: entity keys plus any
    /// `@requires` selections. Root groups never require.
    pub(crate) required_fields: FieldSet,
    /// What the parent context already supplies (from `@provides`), which
    /// can absorb what would otherwise be a dependent fetch.
    pub(crate) provided_fields: FieldSet,
    /// Response path at which this group's result is spliced into the
    /// parent response. Empty for root fetches.
    pub(crate) merge_at: ResponsePath,
    pub(crate) dependent_groups_by_service: IndexMap<NodeStr, FetchGroup>,
    pub(crate) other_dependent_groups: Vec<FetchGroup>,
}

impl FetchGroup {
    pub(crate) fn new(service_name: NodeStr) -> Self {
        Self {
            service_name,
            fields: Vec::new(),
            internal_fragments: IndexMap::new(),
            required_fields: Vec::new(),
            provided_fields: Vec::new(),
            merge_at: Vec::new(),
            dependent_groups_by_service: IndexMap::new(),
            other_dependent_groups: Vec::new(),
        }
    }

    /// Returns the dependent group targeting `service_name`, creating it on
    /// first request. Repeat requests for the same subgraph coalesce into
    /// one child. Non-empty `required_fields` are appended both to the
    /// child's requirements and to this group's own selection, so the
    /// dependent entity fetch has its input.
    pub(crate) fn dependent_group_for_service(
        &mut self,
        service_name: NodeStr,
        required_fields: FieldSet,
    ) -> &mut FetchGroup {
        if !required_fields.is_empty() {
            self.fields.extend(required_fields.iter().cloned());
        }
        let merge_at = self.merge_at.clone();
        let service = service_name.clone();
        let group = self
            .dependent_groups_by_service
            .entry(service_name)
            .or_insert_with(|| {
                let mut group = FetchGroup::new(service);
                group.merge_at = merge_at;
                group
            });
        if !required_fields.is_empty() {
            group.required_fields.extend(required_fields);
        }
        group
    }

    /// Drains the effective children: the service-keyed map followed by the
    /// groups hoisted from composite-return subfields. After this the group
    /// is only good for emission of its own fetch.
    pub(crate) fn take_dependent_groups(&mut self) -> Vec<FetchGroup> {
        let mut groups: Vec<FetchGroup> = self
            .dependent_groups_by_service
            .drain(..)
            .map(|(_, group)| group)
            .collect();
        groups.append(&mut self.other_dependent_groups);
        groups
    }
}

/// Routing policy mapping each split field to its destination group.
pub(crate) trait GroupForField {
    fn group_for_field(&mut self, field: &Field) -> Result<&mut FetchGroup, QueryPlanError>;
}

/// Root query routing: one group per owning subgraph, shared across all
/// root fields.
pub(crate) struct ParallelGroupForField<'q> {
    context: &'q QueryPlanningContext<'q>,
    groups_map: IndexMap<NodeStr, FetchGroup>,
}

impl<'q> ParallelGroupForField<'q> {
    pub(crate) fn new(context: &'q QueryPlanningContext<'q>) -> Self {
        Self {
            context,
            groups_map: IndexMap::new(),
        }
    }

    pub(crate) fn into_groups(self) -> Vec<FetchGroup> {
        self.groups_map.into_values().collect()
    }
}

impl GroupForField for ParallelGroupForField<'_> {
    fn group_for_field(&mut self, field: &Field) -> Result<&mut FetchGroup, QueryPlanError> {
        let service_name = self
            .context
            .owning_service(&field.scope.parent_type, &field.field_def)?;
        let service = service_name.clone();
        Ok(self
            .groups_map
            .entry(service_name)
            .or_insert_with(|| FetchGroup::new(service)))
    }
}

/// Root mutation routing: fields extend the last group when it targets the
/// same subgraph, and start a new group otherwise, preserving the mutation
/// execution contract.
pub(crate) struct SerialGroupForField<'q> {
    context: &'q QueryPlanningContext<'q>,
    groups: Vec<FetchGroup>,
}

impl<'q> SerialGroupForField<'q> {
    pub(crate) fn new(context: &'q QueryPlanningContext<'q>) -> Self {
        Self {
            context,
            groups: Vec::new(),
        }
    }

    pub(crate) fn into_groups(self) -> Vec<FetchGroup> {
        self.groups
    }
}

impl GroupForField for SerialGroupForField<'_> {
    fn group_for_field(&mut self, field: &Field) -> Result<&mut FetchGroup, QueryPlanError> {
        let service_name = self
            .context
            .owning_service(&field.scope.parent_type, &field.field_def)?;
        if self
            .groups
            .last()
            .map_or(true, |group| group.service_name != service_name)
        {
            self.groups.push(FetchGroup::new(service_name));
        }
        self.groups
            .last_mut()
            .ok_or_else(|| QueryPlanError::internal("serial grouping produced no group"))
    }
}

/// Subfield routing: fields stay in the parent group when it can resolve
/// them, and otherwise hop to the owning subgraph through entity fetches,
/// bridging via keys or `@requires` selections.
pub(crate) struct GroupForSubField<'q> {
    context: &'q QueryPlanningContext<'q>,
    group: FetchGroup,
}

impl<'q> GroupForSubField<'q> {
    pub(crate) fn new(context: &'q QueryPlanningContext<'q>, group: FetchGroup) -> Self {
        Self { context, group }
    }

    pub(crate) fn into_group(self) -> FetchGroup {
        self.group
    }
}

impl GroupForField for GroupForSubField<'_> {
    fn group_for_field(&mut self, field: &Field) -> Result<&mut FetchGroup, QueryPlanError> {
        let parent_type = &field.scope.parent_type;
        let field_def = &field.field_def;

        if field_def.name.as_str() == "__typename" {
            return Ok(&mut self.group);
        }

        // Value types belong to whoever holds them, and abstract parents are
        // treated the same way here; type explosion has already routed the
        // cases where implementors differ in ownership.
        let (base_service, owning_service) = if self.context.is_value_type_like(parent_type) {
            (self.group.service_name.clone(), self.group.service_name.clone())
        } else {
            (
                self.context.base_service(parent_type)?,
                self.context.owning_service(parent_type, field_def)?,
            )
        };

        if owning_service == base_service {
            // Can the field be fetched from the parent group directly?
            if owning_service == self.group.service_name
                || self
                    .group
                    .provided_fields
                    .iter()
                    .any(|provided| provided.field_def.name == field_def.name)
            {
                Ok(&mut self.group)
            } else {
                // Fetch the key fields from the parent group first, then
                // fetch the field itself from the owning service.
                let mut key_fields =
                    self.context
                        .get_key_fields(parent_type, &self.group.service_name, false)?;
                if key_fields.len() == 1
                    && key_fields[0].field_def.name.as_str() == "__typename"
                {
                    // The parent group's subgraph has no usable @key for
                    // this type; fall back to the owning subgraph's keys.
                    key_fields =
                        self.context
                            .get_key_fields(parent_type, &owning_service, false)?;
                }
                if key_fields.len() == 1
                    && key_fields[0].field_def.name.as_str() == "__typename"
                {
                    return Err(QueryPlanError::MissingKeys {
                        type_name: parent_type.clone(),
                        service_name: owning_service,
                    });
                }
                Ok(self
                    .group
                    .dependent_group_for_service(owning_service, key_fields))
            }
        } else {
            // An extension field: its required fields must reach the owning
            // service first.
            let required_fields =
                self.context
                    .get_required_fields(parent_type, field_def, &owning_service)?;

            let all_required_fields_are_provided = required_fields.iter().all(|required| {
                self.group
                    .provided_fields
                    .iter()
                    .any(|provided| provided.field_def.name == required.field_def.name)
            });
            if all_required_fields_are_provided {
                if owning_service == self.group.service_name {
                    Ok(&mut self.group)
                } else {
                    Ok(self
                        .group
                        .dependent_group_for_service(owning_service, required_fields))
                }
            } else if base_service == self.group.service_name {
                Ok(self
                    .group
                    .dependent_group_for_service(owning_service, required_fields))
            } else {
                // Two hops: through the base service, then on to the owner.
                let key_fields =
                    self.context
                        .get_key_fields(parent_type, &self.group.service_name, false)?;
                Ok(self
                    .group
                    .dependent_group_for_service(base_service, key_fields)
                    .dependent_group_for_service(owning_service, required_fields))
            }
        }
    }
}
