use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("Invalid syntax for orderBy parameter: {0}")]
    InvalidOrderToken(String),

    #[error("Invalid syntax for filter parameter: {0}")]
    InvalidFilterToken(String),

    #[error("Invalid search field: {0}")]
    InvalidSearchField(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),
}

impl FilterError {
    /// Offending token mapped to a client-facing message
    pub fn field_errors(&self) -> HashMap<String, String> {
        let (key, message) = match self {
            FilterError::InvalidTableName(name) => (name, "Invalid resource name"),
            FilterError::InvalidOrderToken(token) => (token, "Invalid syntax for orderBy parameter"),
            FilterError::InvalidFilterToken(token) => (token, "Invalid syntax for filter parameter"),
            FilterError::InvalidSearchField(field) => (field, "Invalid search field"),
            FilterError::UnknownField(detail) => (detail, "Unknown field"),
        };
        HashMap::from([(key.clone(), message.to_string())])
    }
}
