use crate::database::manager::{is_valid_identifier, quote_identifier, quote_literal};

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::{quote_field, FilterWhere};
use super::types::QueryPlan;

pub const DEFAULT_SOFT_DELETE_MARKER: &str = "deleted_at";

/// Turns raw `orderBy` / `filters` tokens into a [`QueryPlan`]. Never fails:
/// anything questionable is caught when the plan is rendered.
#[derive(Debug, Clone)]
pub struct QueryFilterCompiler {
    soft_delete_marker: String,
}

impl Default for QueryFilterCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_SOFT_DELETE_MARKER)
    }
}

impl QueryFilterCompiler {
    pub fn new(soft_delete_marker: impl Into<String>) -> Self {
        Self { soft_delete_marker: soft_delete_marker.into() }
    }

    pub fn soft_delete_marker(&self) -> &str {
        &self.soft_delete_marker
    }

    pub fn compile<S: AsRef<str>>(&self, order_tokens: &[S], filter_tokens: &[S]) -> QueryPlan {
        let mut plan = QueryPlan::default();

        for token in order_tokens {
            let token = token.as_ref();
            if token.trim().is_empty() {
                continue;
            }
            plan.order.push(FilterOrder::parse_token(token));
        }

        for token in filter_tokens {
            let Some(clause) = FilterWhere::parse_token(token.as_ref(), &self.soft_delete_marker) else {
                tracing::debug!("Skipping filter token without a value: {:?}", token.as_ref());
                continue;
            };
            plan.include_soft_deleted |= clause.include_soft_deleted;
            plan.filters.push(clause);
        }

        plan
    }
}

/// Comma-separated query parameter into tokens, blanks dropped
pub fn split_tokens(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[derive(Debug, Clone)]
struct SearchClause {
    term: String,
    columns: Vec<String>,
}

/// SELECT builder for one resource table driven by a [`QueryPlan`]
#[derive(Debug, Clone)]
pub struct Filter {
    table_name: String,
    soft_delete_marker: String,
    plan: QueryPlan,
    search: Option<SearchClause>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        if !is_valid_identifier(&table_name) {
            return Err(FilterError::InvalidTableName(table_name));
        }
        Ok(Self {
            table_name,
            soft_delete_marker: DEFAULT_SOFT_DELETE_MARKER.to_string(),
            plan: QueryPlan::default(),
            search: None,
            limit: None,
            offset: None,
        })
    }

    pub fn soft_delete_marker(&mut self, marker: impl Into<String>) -> &mut Self {
        self.soft_delete_marker = marker.into();
        self
    }

    pub fn plan(&mut self, plan: QueryPlan) -> &mut Self {
        self.plan = plan;
        self
    }

    /// `LIKE '%term%'` across the given columns, OR-ed together
    pub fn search(&mut self, term: &str, fields: &[String]) -> Result<&mut Self, FilterError> {
        let columns = fields
            .iter()
            .map(|f| quote_field(f.trim()).ok_or_else(|| FilterError::InvalidSearchField(f.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(FilterError::InvalidSearchField(String::new()));
        }
        self.search = Some(SearchClause { term: term.to_string(), columns });
        Ok(self)
    }

    pub fn limit(&mut self, limit: i64, offset: Option<i64>) -> &mut Self {
        self.limit = Some(limit.max(0));
        self.offset = offset.map(|o| o.max(0));
        self
    }

    pub fn to_sql(&self) -> Result<String, FilterError> {
        let mut sql = format!("SELECT * FROM {}", quote_identifier(&self.table_name));
        let where_clause = self.where_clause()?;
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }

        let order_clause = FilterOrder::generate(&self.plan.order)?;
        if !order_clause.is_empty() {
            sql.push(' ');
            sql.push_str(&order_clause);
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        Ok(sql)
    }

    /// Row count for the same WHERE clause, ignoring order and paging
    pub fn count_sql(&self) -> Result<String, FilterError> {
        let mut sql = format!("SELECT count(*) FROM {}", quote_identifier(&self.table_name));
        let where_clause = self.where_clause()?;
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        Ok(sql)
    }

    fn where_clause(&self) -> Result<String, FilterError> {
        let mut conditions = FilterWhere::generate(&self.plan, &self.soft_delete_marker)?;

        if let Some(search) = &self.search {
            let pattern = quote_literal(&format!("%{}%", search.term))
                .map_err(|_| FilterError::InvalidSearchField(search.term.clone()))?;
            let alternatives = search
                .columns
                .iter()
                .map(|c| format!("{}::text LIKE {}", c, pattern))
                .collect::<Vec<_>>()
                .join(" OR ");
            if !conditions.is_empty() {
                conditions.push_str(" AND ");
            }
            conditions.push_str(&format!("({})", alternatives));
        }

        Ok(conditions)
    }
}
