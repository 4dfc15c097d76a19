use crate::database::manager::{is_valid_identifier, quote_identifier, quote_literal};

use super::error::FilterError;
use super::types::{FilterClause, Operator, QueryPlan};

pub struct FilterWhere;

impl FilterWhere {
    /// Parse `field|value`. Tokens without a `|` carry no value and yield `None`.
    pub fn parse_token(token: &str, soft_delete_marker: &str) -> Option<FilterClause> {
        let (field, raw_value) = token.split_once('|')?;
        let field = field.trim();
        let (operator, value) = Self::parse_value(raw_value);

        Some(FilterClause {
            field: field.to_string(),
            operator,
            value,
            include_soft_deleted: !soft_delete_marker.is_empty() && field.contains(soft_delete_marker),
            token: token.to_string(),
        })
    }

    /// Operator dispatch; the first matching rule wins
    pub fn parse_value(value: &str) -> (Operator, Option<String>) {
        if let Some(rest) = value.strip_prefix(">=") {
            return (Operator::Gte, Some(rest.to_string()));
        }
        if let Some(rest) = value.strip_prefix("<=") {
            return (Operator::Lte, Some(rest.to_string()));
        }

        if value.contains('!') {
            let rest = strip_first_char(value);
            return if rest == "null" {
                (Operator::IsNotNull, None)
            } else {
                (Operator::Neq, Some(rest.to_string()))
            };
        }

        if let Some(symbol) = value.chars().find(|c| *c == '<' || *c == '>') {
            let operator = if symbol == '<' { Operator::Lt } else { Operator::Gt };
            return (operator, Some(strip_first_char(value).to_string()));
        }

        if value == "null" {
            (Operator::IsNull, None)
        } else {
            (Operator::Eq, Some(value.to_string()))
        }
    }

    /// WHERE body for the plan, including the soft-delete guard. Empty when
    /// there is nothing to filter on.
    pub fn generate(plan: &QueryPlan, soft_delete_marker: &str) -> Result<String, FilterError> {
        let mut conditions = vec![];
        if !plan.include_soft_deleted && !soft_delete_marker.is_empty() {
            let column = quote_field(soft_delete_marker)
                .ok_or_else(|| FilterError::InvalidFilterToken(soft_delete_marker.to_string()))?;
            conditions.push(format!("{} IS NULL", column));
        }
        for clause in &plan.filters {
            conditions.push(Self::build_condition(clause)?);
        }
        Ok(conditions.join(" AND "))
    }

    fn build_condition(clause: &FilterClause) -> Result<String, FilterError> {
        let invalid = || FilterError::InvalidFilterToken(clause.token.clone());
        let column = quote_field(&clause.field).ok_or_else(invalid)?;

        if !clause.operator.takes_value() {
            return Ok(format!("{} {}", column, clause.operator.to_sql()));
        }

        let literal = quote_literal(clause.value.as_deref().unwrap_or_default()).map_err(|_| invalid())?;
        Ok(format!("{} {} {}", column, clause.operator.to_sql(), literal))
    }
}

/// Quote a `column` or `table.column` reference; `None` if any segment is not
/// a plain identifier
pub(crate) fn quote_field(field: &str) -> Option<String> {
    let segments: Vec<&str> = field.split('.').collect();
    if segments.len() > 2 || !segments.iter().all(|s| is_valid_identifier(s)) {
        return None;
    }
    Some(segments.into_iter().map(quote_identifier).collect::<Vec<_>>().join("."))
}

fn strip_first_char(value: &str) -> &str {
    let mut chars = value.chars();
    chars.next();
    chars.as_str()
}
