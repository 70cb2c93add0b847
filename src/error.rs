// ⚠️ Admissions Errors - typed failures surfaced to callers
//
// Every engine operation returns `Result<T, AdmissionsError>`. The HTTP layer
// maps each variant to a status code through `status_code()`; the CLI just
// prints the message.

use thiserror::Error;

pub type AdmissionsResult<T> = std::result::Result<T, AdmissionsError>;

#[derive(Error, Debug)]
pub enum AdmissionsError {
    /// The payload is not a batch (nor a single object where one is allowed)
    #[error("Expected a list of cohort users, got {found}")]
    MalformedBatch { found: &'static str },

    /// Singular update without both correlating identifiers
    #[error("Missing cohort_id or user_id")]
    MissingIdentifiers,

    /// Delete request without an id set or a complete user/cohort pair
    #[error("Missing user_id or cohort_id")]
    SelectorRequired,

    /// Batch item carries neither an id nor a user/cohort pair
    #[error("Cannot determine CohortUser in index {index}")]
    CannotResolveEntity { index: usize },

    #[error("{entity} not found: {id}")]
    EntityNotFound { entity: &'static str, id: String },

    /// Natural-key collision on (user, cohort)
    #[error("User {user} already belongs to cohort {cohort}")]
    DuplicateMembership { user: i64, cohort: i64 },

    #[error("Invalid value for '{field}' in index {index}: {reason}")]
    InvalidField {
        index: usize,
        field: String,
        reason: String,
    },

    #[error("Invalid {field} identifier: '{value}'")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("CohortUser {membership} does not belong to academy {academy}")]
    AccessDenied { membership: i64, academy: i64 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdmissionsError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AdmissionsError::EntityNotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// HTTP status the API layer answers with
    pub fn status_code(&self) -> u16 {
        match self {
            AdmissionsError::MalformedBatch { .. }
            | AdmissionsError::MissingIdentifiers
            | AdmissionsError::SelectorRequired
            | AdmissionsError::CannotResolveEntity { .. }
            | AdmissionsError::DuplicateMembership { .. }
            | AdmissionsError::InvalidField { .. }
            | AdmissionsError::InvalidIdentifier { .. } => 400,
            AdmissionsError::AccessDenied { .. } => 403,
            AdmissionsError::EntityNotFound { .. } => 404,
            AdmissionsError::Database(_) | AdmissionsError::Serialization(_) => 500,
        }
    }
}

/// Names the JSON type of a rejected top-level payload
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "an object",
    }
}
