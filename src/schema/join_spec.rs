//! Extraction of federation metadata from the join spec directives of a
//! composed supergraph (`@join__graph`, `@join__type`, `@join__field`, and
//! the older `@join__owner`).

use crate::error::QueryPlanError;
use crate::schema::metadata::{
    FederationFieldMetadata, FederationSchemaMetadata, FederationTypeMetadata, Graph,
};
use apollo_compiler::ast::{Directive, Name, NamedType, Value};
use apollo_compiler::executable::FieldSet;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use apollo_compiler::{NodeStr, Schema};
use std::ops::Deref;
use indexmap::IndexMap;
use multimap::MultiMap;
use url::Url;

pub(crate) const JOIN_GRAPH_ENUM_NAME: &str = "join__Graph";
pub(crate) const JOIN_GRAPH_DIRECTIVE_NAME: &str = "join__graph";
pub(crate) const JOIN_TYPE_DIRECTIVE_NAME: &str = "join__type";
pub(crate) const JOIN_FIELD_DIRECTIVE_NAME: &str = "join__field";
pub(crate) const JOIN_OWNER_DIRECTIVE_NAME: &str = "join__owner";

pub(crate) const JOIN_NAME_ARGUMENT_NAME: &str = "name";
pub(crate) const JOIN_URL_ARGUMENT_NAME: &str = "url";
pub(crate) const JOIN_GRAPH_ARGUMENT_NAME: &str = "graph";
pub(crate) const JOIN_KEY_ARGUMENT_NAME: &str = "key";
pub(crate) const JOIN_REQUIRES_ARGUMENT_NAME: &str = "requires";
pub(crate) const JOIN_PROVIDES_ARGUMENT_NAME: &str = "provides";
pub(crate) const JOIN_EXTERNAL_ARGUMENT_NAME: &str = "external";

pub(crate) struct SupergraphMetadata {
    pub(crate) metadata: FederationSchemaMetadata,
    pub(crate) types: IndexMap<NamedType, FederationTypeMetadata>,
    pub(crate) fields: IndexMap<(NamedType, Name), FederationFieldMetadata>,
}

fn directive_optional_enum_argument<'d>(
    application: &'d Directive,
    name: &str,
) -> Result<Option<&'d Name>, QueryPlanError> {
    match application.arguments.iter().find(|a| *a.name == *name) {
        Some(argument) => match argument.value.deref() {
            Value::Enum(value) => Ok(Some(value)),
            Value::Null => Ok(None),
            _ => Err(QueryPlanError::InvalidSupergraph {
                message: format!(
                    "argument \"{}\" of directive \"@{}\" must be an enum value",
                    name, application.name
                ),
            }),
        },
        None => Ok(None),
    }
}

fn directive_required_enum_argument<'d>(
    application: &'d Directive,
    name: &str,
) -> Result<&'d Name, QueryPlanError> {
    directive_optional_enum_argument(application, name)?.ok_or_else(|| {
        QueryPlanError::InvalidSupergraph {
            message: format!(
                "required argument \"{}\" of directive \"@{}\" was not present",
                name, application.name
            ),
        }
    })
}

fn directive_optional_string_argument<'d>(
    application: &'d Directive,
    name: &str,
) -> Result<Option<&'d NodeStr>, QueryPlanError> {
    match application.arguments.iter().find(|a| *a.name == *name) {
        Some(argument) => match argument.value.deref() {
            Value::String(value) => Ok(Some(value)),
            Value::Null => Ok(None),
            _ => Err(QueryPlanError::InvalidSupergraph {
                message: format!(
                    "argument \"{}\" of directive \"@{}\" must be a string",
                    name, application.name
                ),
            }),
        },
        None => Ok(None),
    }
}

fn directive_required_string_argument<'d>(
    application: &'d Directive,
    name: &str,
) -> Result<&'d NodeStr, QueryPlanError> {
    directive_optional_string_argument(application, name)?.ok_or_else(|| {
        QueryPlanError::InvalidSupergraph {
            message: format!(
                "required argument \"{}\" of directive \"@{}\" was not present",
                name, application.name
            ),
        }
    })
}

fn directive_optional_boolean_argument(
    application: &Directive,
    name: &str,
) -> Result<Option<bool>, QueryPlanError> {
    match application.arguments.iter().find(|a| *a.name == *name) {
        Some(argument) => match argument.value.deref() {
            Value::Boolean(value) => Ok(Some(*value)),
            Value::Null => Ok(None),
            _ => Err(QueryPlanError::InvalidSupergraph {
                message: format!(
                    "argument \"{}\" of directive \"@{}\" must be a boolean",
                    name, application.name
                ),
            }),
        },
        None => Ok(None),
    }
}

fn parse_field_set(
    schema: &Valid<Schema>,
    parent_type_name: &NamedType,
    value: &NodeStr,
) -> Result<apollo_compiler::executable::SelectionSet, QueryPlanError> {
    // Parsing takes care of adding curly braces ("{" and "}") if they
    // aren't in the string.
    let field_set = FieldSet::parse_and_validate(
        schema,
        parent_type_name.clone(),
        value.as_str(),
        "field_set.graphql",
    )
    .map_err(|err| QueryPlanError::InvalidSupergraph {
        message: format!(
            "invalid field set \"{}\" on type \"{}\": {}",
            value.as_str(),
            parent_type_name,
            QueryPlanError::from(err)
        ),
    })?;
    Ok(field_set.into_inner().selection_set)
}

fn extract_graphs(schema: &Valid<Schema>) -> Result<FederationSchemaMetadata, QueryPlanError> {
    let Some(ExtendedType::Enum(graph_enum)) = schema.types.get(JOIN_GRAPH_ENUM_NAME) else {
        return Err(QueryPlanError::InvalidSupergraph {
            message: format!("must use the join spec (no \"{JOIN_GRAPH_ENUM_NAME}\" enum found)"),
        });
    };
    let mut graphs = IndexMap::new();
    for (value_name, value) in &graph_enum.values {
        let Some(application) = value.directives.get(JOIN_GRAPH_DIRECTIVE_NAME) else {
            return Err(QueryPlanError::InvalidSupergraph {
                message: format!(
                    "enum value \"{JOIN_GRAPH_ENUM_NAME}.{value_name}\" has no \
                     \"@{JOIN_GRAPH_DIRECTIVE_NAME}\" application"
                ),
            });
        };
        let name = directive_required_string_argument(application, JOIN_NAME_ARGUMENT_NAME)?;
        let url = directive_required_string_argument(application, JOIN_URL_ARGUMENT_NAME)?;
        let url = Url::parse(url.as_str()).map_err(|err| QueryPlanError::InvalidSupergraph {
            message: format!("invalid url for graph \"{}\": {}", name.as_str(), err),
        })?;
        graphs.insert(
            value_name.clone(),
            Graph {
                name: name.clone(),
                url,
            },
        );
    }
    Ok(FederationSchemaMetadata { graphs })
}

fn resolve_graph(
    metadata: &FederationSchemaMetadata,
    graph_enum_value: &Name,
) -> Result<NodeStr, QueryPlanError> {
    metadata
        .graphs
        .get(graph_enum_value)
        .map(|graph| graph.name.clone())
        .ok_or_else(|| QueryPlanError::InvalidSupergraph {
            message: format!("unknown graph \"{graph_enum_value}\""),
        })
}

/// Indexes the federation metadata of a composed supergraph: the graph map,
/// per-type ownership and keys, and per-field ownership/requires/provides.
pub(crate) fn extract_metadata(
    schema: &Valid<Schema>,
) -> Result<SupergraphMetadata, QueryPlanError> {
    let metadata = extract_graphs(schema)?;
    let mut types = IndexMap::new();
    let mut fields = IndexMap::new();

    for (type_name, ty) in &schema.types {
        if type_name.as_str().starts_with("__") {
            continue;
        }
        if !matches!(
            ty,
            ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_)
        ) {
            continue;
        }

        let mut keys: MultiMap<NodeStr, apollo_compiler::executable::SelectionSet> =
            MultiMap::new();
        let mut first_graph = None;
        for application in ty.directives().get_all(JOIN_TYPE_DIRECTIVE_NAME) {
            let graph_enum_value =
                directive_required_enum_argument(application, JOIN_GRAPH_ARGUMENT_NAME)?;
            let service_name = resolve_graph(&metadata, graph_enum_value)?;
            if first_graph.is_none() {
                first_graph = Some(service_name.clone());
            }
            if let Some(key) =
                directive_optional_string_argument(application, JOIN_KEY_ARGUMENT_NAME)?
            {
                keys.insert(service_name, parse_field_set(schema, type_name, key)?);
            }
        }

        let owner = match ty.directives().get_all(JOIN_OWNER_DIRECTIVE_NAME).next() {
            Some(application) => Some(resolve_graph(
                &metadata,
                directive_required_enum_argument(application, JOIN_GRAPH_ARGUMENT_NAME)?,
            )?),
            None => None,
        };

        let type_metadata = match (keys.is_empty(), owner.or(first_graph)) {
            (false, Some(graph_name)) => FederationTypeMetadata::Entity { graph_name, keys },
            _ => FederationTypeMetadata::ValueType,
        };
        types.insert(type_name.clone(), type_metadata);

        let type_fields = match ty {
            ExtendedType::Object(object) => &object.fields,
            ExtendedType::Interface(interface) => &interface.fields,
            _ => continue,
        };
        for (field_name, field) in type_fields {
            // A field can carry several `@join__field` applications; the
            // external ones only mark foreign copies of the field.
            let application = field
                .directives
                .get_all(JOIN_FIELD_DIRECTIVE_NAME)
                .map(|application| {
                    Ok::<_, QueryPlanError>((
                        application,
                        directive_optional_boolean_argument(
                            application,
                            JOIN_EXTERNAL_ARGUMENT_NAME,
                        )?
                        .unwrap_or(false),
                    ))
                })
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .find(|(_, external)| !external)
                .map(|(application, _)| application);
            let Some(application) = application else {
                continue;
            };

            let graph_name =
                match directive_optional_enum_argument(application, JOIN_GRAPH_ARGUMENT_NAME)? {
                    Some(graph_enum_value) => Some(resolve_graph(&metadata, graph_enum_value)?),
                    None => None,
                };
            let requires =
                match directive_optional_string_argument(application, JOIN_REQUIRES_ARGUMENT_NAME)?
                {
                    Some(value) => Some(parse_field_set(schema, type_name, value)?),
                    None => None,
                };
            let provides =
                match directive_optional_string_argument(application, JOIN_PROVIDES_ARGUMENT_NAME)?
                {
                    Some(value) => {
                        let return_type = field.ty.inner_named_type();
                        if !crate::utils::is_composite_type(schema, return_type) {
                            return Err(QueryPlanError::InvalidSupergraph {
                                message: format!(
                                    "field \"{type_name}.{field_name}\" has a \
                                     \"{JOIN_PROVIDES_ARGUMENT_NAME}\" argument but its return \
                                     type \"{return_type}\" is not composite"
                                ),
                            });
                        }
                        Some(parse_field_set(schema, return_type, value)?)
                    }
                    None => None,
                };

            fields.insert(
                (type_name.clone(), field_name.clone()),
                FederationFieldMetadata {
                    graph_name,
                    requires,
                    provides,
                },
            );
        }
    }

    Ok(SupergraphMetadata {
        metadata,
        types,
        fields,
    })
}
