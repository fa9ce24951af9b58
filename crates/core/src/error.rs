use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the persistence collaborators the engine reads from
/// and writes to.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Alert not found: {0}")]
    AlertNotFound(Uuid),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

/// A persisted rule whose optional fields do not satisfy its `rule_type`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleDefinitionError {
    #[error("unknown rule_type '{0}'")]
    UnknownRuleType(String),

    #[error("unknown severity '{0}'")]
    UnknownSeverity(String),

    #[error("rule_type '{rule_type}' requires `{field}`")]
    MissingField {
        rule_type: &'static str,
        field: &'static str,
    },

    #[error("`{field}` must be positive, got {value}")]
    NonPositive { field: &'static str, value: i64 },

    #[error("`{field}` must be at most {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        max: i64,
    },

    #[error("`threshold` must be finite")]
    NonFiniteThreshold,
}
