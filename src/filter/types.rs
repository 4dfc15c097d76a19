use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn to_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Neq => "<>",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Lte => "<=",
            Operator::Gte => ">=",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }

    pub fn takes_value(&self) -> bool {
        !matches!(self, Operator::IsNull | Operator::IsNotNull)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderClause {
    pub field: String,
    pub direction: SortDirection,
    /// Raw token this clause was parsed from
    #[serde(skip)]
    pub token: String,
}

impl OrderClause {
    pub fn to_token(&self) -> String {
        match self.direction {
            SortDirection::Asc => self.field.clone(),
            SortDirection::Desc => format!("-{}", self.field),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterClause {
    pub field: String,
    pub operator: Operator,
    pub value: Option<String>,
    pub include_soft_deleted: bool,
    #[serde(skip)]
    pub token: String,
}

impl FilterClause {
    pub fn to_token(&self) -> String {
        let value = self.value.as_deref().unwrap_or_default();
        let rendered = match self.operator {
            Operator::Eq => value.to_string(),
            Operator::Neq => format!("!{}", value),
            Operator::Lt | Operator::Gt => Self::comparison_token(self.operator, value),
            Operator::Lte => format!("<={}", value),
            Operator::Gte => format!(">={}", value),
            Operator::IsNull => "null".to_string(),
            Operator::IsNotNull => "!null".to_string(),
        };
        format!("{}|{}", self.field, rendered)
    }

    /// `<v` / `>v`, except a value starting with `=` would read back as
    /// `<=` / `>=`. Such a value already carries its own symbol first, so a
    /// neutral leading character is enough.
    fn comparison_token(operator: Operator, value: &str) -> String {
        if value.starts_with('=') {
            return format!("_{}", value);
        }
        let symbol = if operator == Operator::Lt { '<' } else { '>' };
        format!("{}{}", symbol, value)
    }
}

/// Compiled order and filter request, applied in clause order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryPlan {
    pub order: Vec<OrderClause>,
    pub filters: Vec<FilterClause>,
    pub include_soft_deleted: bool,
}

impl QueryPlan {
    /// Re-serialize to `(order_tokens, filter_tokens)`
    pub fn to_tokens(&self) -> (Vec<String>, Vec<String>) {
        (
            self.order.iter().map(OrderClause::to_token).collect(),
            self.filters.iter().map(FilterClause::to_token).collect(),
        )
    }
}
