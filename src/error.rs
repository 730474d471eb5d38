//! Error types for the rule engine.
//!
//! Errors are strongly typed with thiserror and grouped by pipeline stage:
//! parsing, query translation, expression evaluation, execution, and graph
//! I/O. A flat [`ErrorKind`] taxonomy is derivable from every error for
//! result records and structured logs.

use thiserror::Error;

/// Errors raised while parsing DSL text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The text is not well-formed DSL. Locations are 1-based.
    #[error("{line}:{column}: {message}")]
    Syntax {
        /// Line of the first unexpected token.
        line: u32,
        /// Column of the first unexpected token.
        column: u32,
        /// What was expected / found.
        message: String,
    },

    /// The text parsed but violates a structural rule (duplicate names,
    /// invalid trigger shape, dangling variable).
    #[error("semantic error: {message}")]
    Semantic {
        /// Violation description.
        message: String,
    },

    /// A DSL file could not be read.
    #[error("cannot read rule file '{path}': {message}")]
    Io {
        /// File path as given.
        path: String,
        /// Underlying I/O error text.
        message: String,
    },
}

/// Errors raised while translating a `FOR` clause to a graph query.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// A label (entity type, relationship type, or property) contains
    /// characters outside `[A-Za-z0-9_]`.
    #[error("unsafe label '{label}' cannot appear in a query")]
    UnsafeLabel {
        /// The rejected label.
        label: String,
    },

    /// The guard uses a construct that has no query equivalent.
    #[error("cannot translate {construct} in a WHERE guard")]
    Unsupported {
        /// Construct description (e.g. `function call NOW()`).
        construct: String,
    },

    /// The guard references a variable no enclosing `FOR` binds.
    #[error("variable '{name}' is not bound in this scope")]
    UnboundVariable {
        /// The unresolved variable.
        name: String,
    },
}

/// Errors raised by the graph driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The backend rejected or failed the query.
    #[error("graph backend error: {message}")]
    Backend {
        /// Error details from the driver.
        message: String,
    },

    /// The driver connection is gone.
    #[error("graph driver disconnected: {message}")]
    Disconnected {
        /// Error details from the driver.
        message: String,
    },
}

/// Errors raised while evaluating an expression.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A function call named something outside the built-in table.
    #[error("unknown function '{name}'")]
    UnknownFunction {
        /// The unresolved function name.
        name: String,
    },

    /// An `EXISTS` pattern referenced a variable with no entity binding.
    #[error("unknown variable '{name}'")]
    UnknownVariable {
        /// The unresolved variable name.
        name: String,
    },

    /// A built-in was called with the wrong arguments.
    #[error("invalid arguments to {function}: {reason}")]
    InvalidArguments {
        /// Built-in name.
        function: String,
        /// What was wrong.
        reason: String,
    },

    /// A `MATCHES` pattern failed to compile.
    #[error("invalid match pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern source.
        pattern: String,
        /// Compile error text.
        reason: String,
    },

    /// Graph I/O performed for `EXISTS` failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Query translation performed for `EXISTS` failed.
    #[error(transparent)]
    Translation(#[from] TranslationError),
}

/// Errors raised while executing rules and actions.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No action registered under `(entity_type, name)`.
    #[error("Action {entity_type}.{name} not found")]
    ActionNotFound {
        /// Entity type of the lookup.
        entity_type: String,
        /// Action name of the lookup.
        name: String,
    },

    /// No rule registered under the given name.
    #[error("Rule '{name}' not found")]
    RuleNotFound {
        /// Rule name of the lookup.
        name: String,
    },

    /// A definition with the same key is already registered.
    #[error("'{name}' is already registered")]
    DuplicateRegistration {
        /// The conflicting key.
        name: String,
    },

    /// The supplied parameter mapping does not match the declaration.
    #[error("Invalid parameters: {reason}")]
    InvalidParameters {
        /// Mismatch description.
        reason: String,
    },

    /// A precondition expression raised while evaluating.
    #[error("precondition '{label}' failed to evaluate: {message}")]
    Precondition {
        /// Precondition label (or its index when unlabeled).
        label: String,
        /// Evaluator error text.
        message: String,
    },

    /// A cascade exceeded its depth or queue bound.
    #[error("cascade overflow: {detail}")]
    CascadeOverflow {
        /// What overflowed.
        detail: String,
    },

    /// The firing was cancelled by its caller.
    #[error("firing cancelled")]
    Cancelled,

    /// A statement referenced an entity binding that is not in scope.
    #[error("statement target '{name}' is not a bound entity")]
    UnboundTarget {
        /// The unresolved binding name.
        name: String,
    },
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// DSL parsing failed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Query translation failed.
    #[error("translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Expression evaluation failed.
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// Rule or action execution failed.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// The graph driver failed.
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Internal invariant violation.
    #[error("internal error: {message}")]
    Internal {
        /// Error description.
        message: String,
    },
}

impl EngineError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The flat taxonomy kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(ParseError::Syntax { .. } | ParseError::Io { .. }) => ErrorKind::Syntax,
            Self::Parse(ParseError::Semantic { .. }) => ErrorKind::Semantic,
            Self::Translation(_) => ErrorKind::Translation,
            Self::Eval(e) => match e {
                EvalError::UnknownFunction { .. } => ErrorKind::UnknownFunction,
                EvalError::UnknownVariable { .. } => ErrorKind::UnknownVariable,
                EvalError::Graph(_) => ErrorKind::GraphIo,
                EvalError::Translation(_) => ErrorKind::Translation,
                EvalError::InvalidArguments { .. } | EvalError::InvalidPattern { .. } => {
                    ErrorKind::Internal
                }
            },
            Self::Execution(e) => match e {
                ExecutionError::ActionNotFound { .. } => ErrorKind::ActionNotFound,
                ExecutionError::RuleNotFound { .. } => ErrorKind::RuleNotFound,
                ExecutionError::Precondition { .. } => ErrorKind::PreconditionError,
                ExecutionError::CascadeOverflow { .. } => ErrorKind::CascadeOverflow,
                ExecutionError::UnboundTarget { .. } => ErrorKind::UnknownVariable,
                ExecutionError::Cancelled => ErrorKind::Internal,
                ExecutionError::DuplicateRegistration { .. }
                | ExecutionError::InvalidParameters { .. } => ErrorKind::Semantic,
            },
            Self::Graph(_) => ErrorKind::GraphIo,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Flat error taxonomy surfaced in result records, reports, and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed DSL.
    Syntax,
    /// Duplicate name, invalid trigger shape, dangling variable.
    Semantic,
    /// Guard not expressible as a graph query, or unsafe label.
    Translation,
    /// Evaluator called an undefined function.
    UnknownFunction,
    /// Evaluator resolved against an unbound variable.
    UnknownVariable,
    /// A precondition returned falsy.
    PreconditionFailure,
    /// A precondition raised while evaluating.
    PreconditionError,
    /// Action lookup failed.
    ActionNotFound,
    /// Rule lookup failed.
    RuleNotFound,
    /// Cascade depth or queue bound hit.
    CascadeOverflow,
    /// The graph driver failed.
    GraphIo,
    /// Internal invariant violation.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Syntax => "SyntaxError",
            Self::Semantic => "SemanticError",
            Self::Translation => "TranslationError",
            Self::UnknownFunction => "UnknownFunction",
            Self::UnknownVariable => "UnknownVariable",
            Self::PreconditionFailure => "PreconditionFailure",
            Self::PreconditionError => "PreconditionError",
            Self::ActionNotFound => "ActionNotFound",
            Self::RuleNotFound => "RuleNotFound",
            Self::CascadeOverflow => "CascadeOverflow",
            Self::GraphIo => "GraphIOError",
            Self::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_displays_location_first() {
        let err = ParseError::Syntax {
            line: 3,
            column: 14,
            message: "expected '{', found 'FOR'".to_string(),
        };
        assert_eq!(err.to_string(), "3:14: expected '{', found 'FOR'");
    }

    #[test]
    fn test_action_not_found_message_shape() {
        let err = ExecutionError::ActionNotFound {
            entity_type: "PurchaseOrder".to_string(),
            name: "submit".to_string(),
        };
        assert_eq!(err.to_string(), "Action PurchaseOrder.submit not found");
    }

    #[test]
    fn test_error_kinds() {
        let err: EngineError = ParseError::Semantic {
            message: "dup".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Semantic);

        let err: EngineError = EvalError::UnknownFunction {
            name: "FOO".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::UnknownFunction);

        let err: EngineError = GraphError::Backend {
            message: "boom".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::GraphIo);
    }

    #[test]
    fn test_error_kind_display_matches_taxonomy() {
        assert_eq!(ErrorKind::GraphIo.to_string(), "GraphIOError");
        assert_eq!(ErrorKind::CascadeOverflow.to_string(), "CascadeOverflow");
        assert_eq!(ErrorKind::Syntax.to_string(), "SyntaxError");
    }
}
