use pipewright_kit::types::diagnostics::Diagnostic;

/// Broad failure classes, matching how hosts react: configuration and remote
/// errors abort the pass, validation errors may re-prompt, cancellation is
/// not a failure at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    RemoteData,
    Validation,
    Cancellation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceKind {
    Input,
    DataSource,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::Input => write!(f, "input"),
            ReferenceKind::DataSource => write!(f, "data source"),
        }
    }
}

#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum ResolutionError {
    #[error("circular dependency between inputs: {}", ids.join(" -> "))]
    Cycle { ids: Vec<String> },

    #[error("'{referenced_by}' references unknown {kind} '{reference}'")]
    UnknownReference { referenced_by: String, kind: ReferenceKind, reference: String },

    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: ReferenceKind, id: String },

    #[error("malformed template '{template}': {reason}")]
    MalformedTemplate { template: String, reason: String },

    #[error("malformed data source expression '{expression}': {reason}")]
    MalformedDataSourceExpression { expression: String, reason: String },

    #[error("unknown data source operator '{operator}'")]
    UnknownDataSourceOperator { operator: String },

    #[error("malformed visibility rule '{rule}': {reason}")]
    MalformedVisibilityRule { rule: String, reason: String },

    #[error("data source '{source_id}' declares invalid http method '{method}'")]
    InvalidHttpMethod { source_id: String, method: String },

    #[error("input '{input_id}' declares both possibleValues and a dataSourceId")]
    ConflictingValueSources { input_id: String },

    #[error("input '{input_id}' declares invalid validation pattern '{pattern}'")]
    InvalidValidationPattern { input_id: String, pattern: String },

    #[error("data source '{source_id}' failed: {diagnostic}")]
    RemoteData { source_id: String, diagnostic: Diagnostic },

    #[error("validation failed for input '{input_id}': {message}")]
    Validation { input_id: String, message: String },

    #[error("prompt for input '{input_id}' failed: {diagnostic}")]
    Prompt { input_id: String, diagnostic: Diagnostic },

    #[error("resolution pass cancelled")]
    Cancelled,
}

impl ResolutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolutionError::Cycle { .. }
            | ResolutionError::UnknownReference { .. }
            | ResolutionError::DuplicateId { .. }
            | ResolutionError::MalformedTemplate { .. }
            | ResolutionError::MalformedDataSourceExpression { .. }
            | ResolutionError::UnknownDataSourceOperator { .. }
            | ResolutionError::MalformedVisibilityRule { .. }
            | ResolutionError::InvalidHttpMethod { .. }
            | ResolutionError::ConflictingValueSources { .. }
            | ResolutionError::InvalidValidationPattern { .. } => ErrorKind::Configuration,
            ResolutionError::RemoteData { .. } | ResolutionError::Prompt { .. } => {
                ErrorKind::RemoteData
            }
            ResolutionError::Validation { .. } => ErrorKind::Validation,
            ResolutionError::Cancelled => ErrorKind::Cancellation,
        }
    }

    /// Recoverable errors leave the host free to re-prompt instead of
    /// abandoning the pass.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation)
    }
}

impl From<ResolutionError> for Diagnostic {
    fn from(err: ResolutionError) -> Self {
        let diagnostic = Diagnostic::error_from_string(err.to_string());
        match err.kind() {
            ErrorKind::Configuration => diagnostic.with_code("config"),
            ErrorKind::RemoteData => diagnostic.with_code("remote"),
            ErrorKind::Validation => diagnostic.with_code("validation"),
            ErrorKind::Cancellation => diagnostic.with_code("cancelled"),
        }
    }
}
