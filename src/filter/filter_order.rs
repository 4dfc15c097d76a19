use super::error::FilterError;
use super::filter_where::quote_field;
use super::types::{OrderClause, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// `-price` sorts descending, `price` ascending
    pub fn parse_token(token: &str) -> OrderClause {
        let trimmed = token.trim();
        let (field, direction) = match trimmed.strip_prefix('-') {
            Some(field) => (field, SortDirection::Desc),
            None => (trimmed, SortDirection::Asc),
        };
        OrderClause {
            field: field.to_string(),
            direction,
            token: token.to_string(),
        }
    }

    pub fn generate(clauses: &[OrderClause]) -> Result<String, FilterError> {
        if clauses.is_empty() {
            return Ok(String::new());
        }
        let parts = clauses
            .iter()
            .map(|c| {
                let column = quote_field(&c.field).ok_or_else(|| FilterError::InvalidOrderToken(c.token.clone()))?;
                Ok(format!("{} {}", column, c.direction.to_sql()))
            })
            .collect::<Result<Vec<_>, FilterError>>()?;
        Ok(format!("ORDER BY {}", parts.join(", ")))
    }
}
