use serde::{Deserialize, Serialize};

/// What went wrong, independent of where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// A step has no target path at all.
    MissingTarget,
    /// A target path is not declared in the schema.
    UnknownPath,
    /// A step's expected type disagrees with the schema.
    TypeMismatch,
    /// Two steps write the same target path.
    DuplicateWrite,
    /// A condition guard names a path the schema does not know.
    UnresolvedBinding,
    /// An expression does not parse under the restricted grammar.
    InvalidExpressionSyntax,
    StepExecutionFailure,
    InvocationFailure,
    WorkflowDefinition,
    Cancelled,
    ConfigError,
    SerializationError,
    IoError,
    InternalError,
}

impl ErrorCategory {
    pub fn default_code(&self) -> &'static str {
        match self {
            ErrorCategory::MissingTarget => "PW-VAL-001",
            ErrorCategory::UnknownPath => "PW-VAL-002",
            ErrorCategory::TypeMismatch => "PW-VAL-003",
            ErrorCategory::DuplicateWrite => "PW-VAL-004",
            ErrorCategory::UnresolvedBinding => "PW-VAL-005",
            ErrorCategory::InvalidExpressionSyntax => "PW-VAL-006",
            ErrorCategory::StepExecutionFailure => "PW-STEP-001",
            ErrorCategory::InvocationFailure => "PW-INV-001",
            ErrorCategory::WorkflowDefinition => "PW-WF-001",
            ErrorCategory::Cancelled => "PW-RUN-002",
            ErrorCategory::ConfigError => "PW-CFG-001",
            ErrorCategory::SerializationError => "PW-SER-001",
            ErrorCategory::IoError => "PW-IO-001",
            ErrorCategory::InternalError => "PW-INT-001",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ErrorCategory::Cancelled => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns `true` for categories raised by the static pipeline validator.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorCategory::MissingTarget
                | ErrorCategory::UnknownPath
                | ErrorCategory::TypeMismatch
                | ErrorCategory::DuplicateWrite
                | ErrorCategory::UnresolvedBinding
                | ErrorCategory::InvalidExpressionSyntax
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
}
