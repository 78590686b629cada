use apollo_compiler::ast::Name;
use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::WithErrors;
use apollo_compiler::NodeStr;
use itertools::Itertools;

/// Errors raised while planning a query against a composed supergraph.
///
/// Planning is all-or-nothing: the first fatal condition aborts the current
/// plan and surfaces here. Nothing is recovered locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryPlanError {
    #[error("Query planning does not support subscriptions for now.")]
    UnsupportedSubscription,
    #[error("Operation name not found")]
    UnknownOperation,
    #[error("Must provide operation name if query contains multiple operations")]
    OperationNameNotProvided,
    #[error("Cannot query field \"{field_name}\" on type \"{parent_type}\"")]
    UndefinedField { parent_type: Name, field_name: Name },
    #[error("Couldn't find base service for type \"{type_name}\"")]
    NoBaseService { type_name: Name },
    #[error("Couldn't find owning service for field \"{parent_type}.{field_name}\"")]
    NoOwningService { parent_type: Name, field_name: Name },
    #[error("Couldn't find keys for type \"{type_name}\" in service \"{service_name}\"")]
    MissingKeys {
        type_name: Name,
        service_name: NodeStr,
    },
    #[error("Invalid supergraph: {message}")]
    InvalidSupergraph { message: String },
    #[error("{message}")]
    InvalidGraphQL { message: String },
    #[error("An internal error has occurred during query planning.\n\nDetails: {message}")]
    Internal { message: String },
}

impl QueryPlanError {
    pub fn internal(message: impl Into<String>) -> Self {
        QueryPlanError::Internal {
            message: message.into(),
        }
    }

    /// A stable machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            QueryPlanError::UnsupportedSubscription => ErrorCode::UnsupportedSubscription,
            QueryPlanError::UnknownOperation => ErrorCode::UnknownOperation,
            QueryPlanError::OperationNameNotProvided => ErrorCode::OperationNameNotProvided,
            QueryPlanError::UndefinedField { .. } => ErrorCode::UndefinedField,
            QueryPlanError::NoBaseService { .. } => ErrorCode::NoBaseService,
            QueryPlanError::NoOwningService { .. } => ErrorCode::NoOwningService,
            QueryPlanError::MissingKeys { .. } => ErrorCode::MissingKeys,
            QueryPlanError::InvalidSupergraph { .. } => ErrorCode::InvalidSupergraph,
            QueryPlanError::InvalidGraphQL { .. } => ErrorCode::InvalidGraphQL,
            QueryPlanError::Internal { .. } => ErrorCode::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ErrorCode {
    #[strum(to_string = "UNSUPPORTED_SUBSCRIPTION")]
    UnsupportedSubscription,
    #[strum(to_string = "UNKNOWN_OPERATION")]
    UnknownOperation,
    #[strum(to_string = "OPERATION_NAME_NOT_PROVIDED")]
    OperationNameNotProvided,
    #[strum(to_string = "UNDEFINED_FIELD")]
    UndefinedField,
    #[strum(to_string = "NO_BASE_SERVICE")]
    NoBaseService,
    #[strum(to_string = "NO_OWNING_SERVICE")]
    NoOwningService,
    #[strum(to_string = "MISSING_KEYS")]
    MissingKeys,
    #[strum(to_string = "INVALID_SUPERGRAPH")]
    InvalidSupergraph,
    #[strum(to_string = "INVALID_GRAPHQL")]
    InvalidGraphQL,
    #[strum(to_string = "INTERNAL")]
    Internal,
}

impl From<DiagnosticList> for QueryPlanError {
    fn from(diagnostics: DiagnosticList) -> Self {
        QueryPlanError::InvalidGraphQL {
            message: diagnostics.iter().map(|d| d.to_string()).join("\n"),
        }
    }
}

impl<T> From<WithErrors<T>> for QueryPlanError {
    fn from(value: WithErrors<T>) -> Self {
        value.errors.into()
    }
}
