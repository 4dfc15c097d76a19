use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{Connection, PgConnection};
use tracing::debug;
use uuid::Uuid;

use crate::database::cascade::CascadeRegistry;
use crate::database::manager::{is_valid_identifier, quote_identifier, DatabaseError};
use crate::filter::filter::DEFAULT_SOFT_DELETE_MARKER;
use crate::filter::{Filter, FilterError, QueryPlan};

/// Columns the repository maintains itself; request bodies cannot set them
const MANAGED_COLUMNS: [&str; 3] = ["id", "created_at", "updated_at"];

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Page {
    /// Clamp to sane bounds: page from 1, size within `1..=max_size`
    pub fn bounded(page: Option<i64>, per_page: Option<i64>, default_size: i64, max_size: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default_size).clamp(1, max_size.max(1)),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// Paginated listing in the usual `{current_page, data, ...}` layout
#[derive(Debug, Clone, Serialize)]
pub struct Paginated {
    pub current_page: i64,
    pub data: Vec<Value>,
    pub per_page: i64,
    pub total: i64,
    pub last_page: i64,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl Paginated {
    pub fn new(page: Page, data: Vec<Value>, total: i64) -> Self {
        let count = data.len() as i64;
        let (from, to) = if count == 0 {
            (None, None)
        } else {
            (Some(page.offset() + 1), Some(page.offset() + count))
        };
        Self {
            current_page: page.page,
            per_page: page.per_page,
            last_page: ((total + page.per_page - 1) / page.per_page).max(1),
            total,
            from,
            to,
            data,
        }
    }
}

/// Table-level data access on an already routed connection. Rows come back as
/// JSON objects straight from Postgres.
pub struct ResourceRepository {
    table_name: String,
    soft_delete_marker: String,
}

impl ResourceRepository {
    pub fn new(table_name: impl Into<String>) -> Result<Self, DatabaseError> {
        let table_name = table_name.into();
        if !is_valid_identifier(&table_name) {
            return Err(FilterError::InvalidTableName(table_name).into());
        }
        Ok(Self {
            table_name,
            soft_delete_marker: DEFAULT_SOFT_DELETE_MARKER.to_string(),
        })
    }

    pub fn with_soft_delete_marker(mut self, marker: impl Into<String>) -> Self {
        self.soft_delete_marker = marker.into();
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub async fn find_all(
        &self,
        conn: &mut PgConnection,
        plan: QueryPlan,
        page: Page,
    ) -> Result<Paginated, DatabaseError> {
        let mut filter = self.filter()?;
        filter.plan(plan.clone());
        self.paginate(conn, filter, &plan, page).await
    }

    /// LIKE search over `fields`, narrowed further by the plan
    pub async fn search(
        &self,
        conn: &mut PgConnection,
        term: &str,
        fields: &[String],
        plan: QueryPlan,
        page: Page,
    ) -> Result<Paginated, DatabaseError> {
        let mut filter = self.filter()?;
        filter.plan(plan.clone()).search(term, fields)?;
        self.paginate(conn, filter, &plan, page).await
    }

    pub async fn find_one(&self, conn: &mut PgConnection, id: &str) -> Result<Value, DatabaseError> {
        sqlx::query_scalar::<_, Value>(&self.find_one_sql())
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(write_error)?
            .ok_or_else(|| self.not_found(id))
    }

    /// Insert with a fresh UUIDv4 id and timestamps
    pub async fn create(&self, conn: &mut PgConnection, payload: Map<String, Value>) -> Result<Value, DatabaseError> {
        let mut record = self.writable(payload)?;
        let now = Value::String(chrono::Utc::now().to_rfc3339());
        record.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        record.insert("created_at".to_string(), now.clone());
        record.insert("updated_at".to_string(), now);

        let row = sqlx::query_scalar::<_, Value>(&self.insert_sql(&record))
            .bind(Value::Object(record))
            .fetch_one(&mut *conn)
            .await
            .map_err(write_error)?;
        debug!("Created row in {}", self.table_name);
        Ok(row)
    }

    /// Partial update of a live row; unknown ids are `NotFound`
    pub async fn update(
        &self,
        conn: &mut PgConnection,
        id: &str,
        payload: Map<String, Value>,
    ) -> Result<Value, DatabaseError> {
        let mut record = self.writable(payload)?;
        record.insert("updated_at".to_string(), Value::String(chrono::Utc::now().to_rfc3339()));

        sqlx::query_scalar::<_, Value>(&self.update_sql(&record))
            .bind(Value::Object(record))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(write_error)?
            .ok_or_else(|| self.not_found(id))
    }

    /// Soft delete (or hard delete without a marker) plus registered cascades,
    /// all in one transaction
    pub async fn delete(
        &self,
        conn: &mut PgConnection,
        id: &str,
        cascades: &CascadeRegistry,
    ) -> Result<u64, DatabaseError> {
        let mut tx = conn.begin().await?;

        let cascaded = cascades
            .apply(&mut tx, &self.table_name, vec![id.to_string()], &self.soft_delete_marker)
            .await?;

        let result = sqlx::query(&self.delete_sql())
            .bind(id).execute(&mut *tx).await.map_err(write_error)?;
        if result.rows_affected() == 0 {
            // dropping the transaction rolls back any cascaded rows
            return Err(self.not_found(id));
        }

        tx.commit().await?;
        debug!("Deleted {} {} ({} cascaded rows)", self.table_name, id, cascaded);
        Ok(result.rows_affected() + cascaded)
    }

    /// Clear the soft-delete marker on a trashed row
    pub async fn restore(&self, conn: &mut PgConnection, id: &str) -> Result<Value, DatabaseError> {
        if self.soft_delete_marker.is_empty() {
            return Err(DatabaseError::QueryError(format!("{} does not support restore", self.table_name)));
        }
        sqlx::query_scalar::<_, Value>(&self.restore_sql())
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(write_error)?
            .ok_or_else(|| self.not_found(id))
    }

    async fn paginate(
        &self,
        conn: &mut PgConnection,
        mut filter: Filter,
        plan: &QueryPlan,
        page: Page,
    ) -> Result<Paginated, DatabaseError> {
        let total = sqlx::query_scalar::<_, i64>(&filter.count_sql()?)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| execution_error(e, plan))?;

        filter.limit(page.per_page, Some(page.offset()));
        let sql = format!("SELECT row_to_json(r) FROM ({}) r", filter.to_sql()?);
        let data = sqlx::query_scalar::<_, Value>(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| execution_error(e, plan))?;

        Ok(Paginated::new(page, data, total))
    }

    pub fn find_one_sql(&self) -> String {
        format!(
            "SELECT row_to_json(r) FROM (SELECT * FROM {} WHERE \"id\"::text = $1{}) r",
            self.table(),
            self.live_guard()
        )
    }

    /// `$1` is the record as JSON, cast through the table's row type
    pub fn insert_sql(&self, record: &Map<String, Value>) -> String {
        format!(
            "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1) \
             RETURNING row_to_json({table}.*)",
            table = self.table(),
            columns = column_list(record)
        )
    }

    /// `$1` is the changed columns as JSON, `$2` the id
    pub fn update_sql(&self, record: &Map<String, Value>) -> String {
        format!(
            "UPDATE {table} SET ({columns}) = (SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1)) \
             WHERE \"id\"::text = $2{guard} RETURNING row_to_json({table}.*)",
            table = self.table(),
            columns = column_list(record),
            guard = self.live_guard()
        )
    }

    pub fn delete_sql(&self) -> String {
        if self.soft_delete_marker.is_empty() {
            format!("DELETE FROM {} WHERE \"id\"::text = $1", self.table())
        } else {
            format!(
                "UPDATE {table} SET {marker} = now() WHERE \"id\"::text = $1 AND {marker} IS NULL",
                table = self.table(),
                marker = quote_identifier(&self.soft_delete_marker)
            )
        }
    }

    pub fn restore_sql(&self) -> String {
        format!(
            "UPDATE {table} SET {marker} = NULL WHERE \"id\"::text = $1 AND {marker} IS NOT NULL \
             RETURNING row_to_json({table}.*)",
            table = self.table(),
            marker = quote_identifier(&self.soft_delete_marker)
        )
    }

    fn filter(&self) -> Result<Filter, DatabaseError> {
        let mut filter = Filter::new(&self.table_name)?;
        filter.soft_delete_marker(self.soft_delete_marker.clone());
        Ok(filter)
    }

    fn table(&self) -> String {
        quote_identifier(&self.table_name)
    }

    fn live_guard(&self) -> String {
        if self.soft_delete_marker.is_empty() {
            String::new()
        } else {
            format!(" AND {} IS NULL", quote_identifier(&self.soft_delete_marker))
        }
    }

    fn not_found(&self, id: &str) -> DatabaseError {
        DatabaseError::NotFound(format!("{} {} not found", self.table_name, id))
    }

    /// Drop managed columns and reject anything that is not a plain identifier
    fn writable(&self, payload: Map<String, Value>) -> Result<Map<String, Value>, DatabaseError> {
        let mut record = Map::new();
        for (key, value) in payload {
            if MANAGED_COLUMNS.contains(&key.as_str()) || key == self.soft_delete_marker {
                continue;
            }
            if !is_valid_identifier(&key) {
                return Err(DatabaseError::InvalidIdentifier(key));
            }
            record.insert(key, value);
        }
        Ok(record)
    }
}

fn column_list(record: &Map<String, Value>) -> String {
    record.keys().map(|k| quote_identifier(k)).collect::<Vec<_>>().join(", ")
}

/// Postgres error code, when the failure came from the server
fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Map read failures caused by the caller's tokens to validation errors
/// naming the token
fn execution_error(err: sqlx::Error, plan: &QueryPlan) -> DatabaseError {
    let code = sqlstate(&err);
    let message = match &err {
        sqlx::Error::Database(db) => Some(db.message().to_string()),
        _ => None,
    };
    match code.as_deref() {
        Some("42703") => {
            let column = message.as_deref().and_then(missing_column);
            let token = column
                .as_deref()
                .and_then(|c| token_for_column(plan, c))
                .or(column)
                .unwrap_or_else(|| plan_tokens(plan));
            FilterError::UnknownField(token).into()
        }
        // bad literal for the column type, or no operator for that type
        Some(code) if (code.starts_with("22") || code == "42883") && !plan.filters.is_empty() => {
            let token = message
                .as_deref()
                .and_then(offending_value)
                .and_then(|value| token_for_value(plan, &value))
                .unwrap_or_else(|| filter_tokens(plan));
            FilterError::InvalidFilterToken(token).into()
        }
        _ => err.into(),
    }
}

fn write_error(err: sqlx::Error) -> DatabaseError {
    let code = sqlstate(&err);
    match code.as_deref() {
        Some("42703") => {
            let column = match &err {
                sqlx::Error::Database(db) => missing_column(db.message()),
                _ => None,
            };
            FilterError::UnknownField(column.unwrap_or_default()).into()
        }
        Some(code) if code.starts_with("23") => DatabaseError::Constraint(err.to_string()),
        Some(code) if code.starts_with("22") => DatabaseError::InvalidValue(err.to_string()),
        _ => err.into(),
    }
}

/// Column name out of `column "foo" does not exist` / `column t.foo does not exist`
fn missing_column(message: &str) -> Option<String> {
    let rest = message.strip_prefix("column ")?;
    let name = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next()?,
        None => rest.split_whitespace().next()?,
    };
    let name = name.rsplit('.').next().unwrap_or(name);
    Some(name.to_string())
}

fn token_for_column(plan: &QueryPlan, column: &str) -> Option<String> {
    let matches = |field: &str| field == column || field.rsplit('.').next() == Some(column);
    plan.filters
        .iter()
        .find(|c| matches(&c.field))
        .map(|c| c.token.clone())
        .or_else(|| plan.order.iter().find(|c| matches(&c.field)).map(|c| c.token.clone()))
}

/// Quoted input out of `invalid input syntax for type integer: "abc"`
fn offending_value(message: &str) -> Option<String> {
    let (_, quoted) = message.rsplit_once(": \"")?;
    let value = quoted.strip_suffix('"')?;
    Some(value.to_string())
}

fn token_for_value(plan: &QueryPlan, value: &str) -> Option<String> {
    plan.filters
        .iter()
        .find(|c| c.value.as_deref() == Some(value))
        .map(|c| c.token.clone())
}

/// Every filter token, used when the failing one cannot be pinned down
fn filter_tokens(plan: &QueryPlan) -> String {
    plan.filters.iter().map(|c| c.token.as_str()).collect::<Vec<_>>().join(",")
}

fn plan_tokens(plan: &QueryPlan) -> String {
    let (order, filters) = plan.to_tokens();
    order.into_iter().chain(filters).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::QueryFilterCompiler;

    #[test]
    fn page_bounds() {
        let page = Page::bounded(None, None, 15, 100);
        assert_eq!(page, Page { page: 1, per_page: 15 });
        assert_eq!(page.offset(), 0);

        let page = Page::bounded(Some(3), Some(500), 15, 100);
        assert_eq!(page, Page { page: 3, per_page: 100 });
        assert_eq!(page.offset(), 200);

        let page = Page::bounded(Some(-2), Some(0), 15, 100);
        assert_eq!(page, Page { page: 1, per_page: 1 });
    }

    #[test]
    fn paginated_metadata() {
        let page = Page { page: 2, per_page: 2 };
        let result = Paginated::new(page, vec![Value::Null], 3);
        assert_eq!(result.last_page, 2);
        assert_eq!(result.from, Some(3));
        assert_eq!(result.to, Some(3));

        let empty = Paginated::new(Page { page: 1, per_page: 15 }, vec![], 0);
        assert_eq!(empty.last_page, 1);
        assert_eq!(empty.from, None);
    }

    #[test]
    fn rejects_bad_table_names() {
        assert!(matches!(
            ResourceRepository::new("users; drop"),
            Err(DatabaseError::Filter(FilterError::InvalidTableName(_)))
        ));
    }

    #[test]
    fn writable_strips_managed_columns() {
        let repo = ResourceRepository::new("products").unwrap();
        let payload = serde_json::json!({
            "id": "x", "created_at": "y", "deleted_at": "z", "name": "Lamp", "price": 10
        });
        let record = repo.writable(payload.as_object().unwrap().clone()).unwrap();
        let keys: Vec<_> = record.keys().cloned().collect();
        assert_eq!(keys, vec!["name", "price"]);
    }

    #[test]
    fn writable_rejects_odd_keys() {
        let repo = ResourceRepository::new("products").unwrap();
        let payload = serde_json::json!({ "name\"; drop": 1 });
        assert!(matches!(
            repo.writable(payload.as_object().unwrap().clone()),
            Err(DatabaseError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn extracts_missing_column() {
        assert_eq!(missing_column("column \"colour\" does not exist").as_deref(), Some("colour"));
        assert_eq!(missing_column("column products.colour does not exist").as_deref(), Some("colour"));
        assert_eq!(missing_column("relation \"x\" does not exist"), None);
    }

    #[test]
    fn unknown_column_maps_back_to_token() {
        let plan = QueryFilterCompiler::default().compile(&["-price"], &["colour|red"]);
        assert_eq!(token_for_column(&plan, "colour").as_deref(), Some("colour|red"));
        assert_eq!(token_for_column(&plan, "price").as_deref(), Some("-price"));
        assert_eq!(token_for_column(&plan, "size"), None);
        assert_eq!(plan_tokens(&plan), "-price,colour|red");
    }

    #[test]
    fn bad_literal_maps_back_to_its_token() {
        let plan = QueryFilterCompiler::default().compile::<&str>(&[], &["status|active", "price|>abc"]);
        let value = offending_value("invalid input syntax for type integer: \"abc\"").unwrap();
        assert_eq!(value, "abc");
        assert_eq!(token_for_value(&plan, &value).as_deref(), Some("price|>abc"));
        assert_eq!(token_for_value(&plan, "zzz"), None);
        assert_eq!(filter_tokens(&plan), "status|active,price|>abc");
    }

    #[test]
    fn offending_value_needs_a_quoted_tail() {
        assert_eq!(offending_value("operator does not exist: integer > text"), None);
        assert_eq!(
            offending_value("invalid input syntax for type timestamp: \"2021-13-01\"").as_deref(),
            Some("2021-13-01")
        );
    }

    #[test]
    fn soft_delete_sql_guards_live_rows() {
        let repo = ResourceRepository::new("products").unwrap();
        assert_eq!(
            repo.find_one_sql(),
            "SELECT row_to_json(r) FROM (SELECT * FROM \"products\" WHERE \"id\"::text = $1 \
             AND \"deleted_at\" IS NULL) r"
        );
        assert_eq!(
            repo.delete_sql(),
            "UPDATE \"products\" SET \"deleted_at\" = now() WHERE \"id\"::text = $1 AND \"deleted_at\" IS NULL"
        );
        assert_eq!(
            repo.restore_sql(),
            "UPDATE \"products\" SET \"deleted_at\" = NULL WHERE \"id\"::text = $1 \
             AND \"deleted_at\" IS NOT NULL RETURNING row_to_json(\"products\".*)"
        );
    }

    #[test]
    fn markerless_tables_hard_delete() {
        let repo = ResourceRepository::new("logs").unwrap().with_soft_delete_marker("");
        assert_eq!(repo.delete_sql(), "DELETE FROM \"logs\" WHERE \"id\"::text = $1");
        assert_eq!(
            repo.find_one_sql(),
            "SELECT row_to_json(r) FROM (SELECT * FROM \"logs\" WHERE \"id\"::text = $1) r"
        );
    }

    #[test]
    fn writes_go_through_the_row_type() {
        let repo = ResourceRepository::new("products").unwrap();
        let payload = serde_json::json!({ "name": "Lamp", "price": 10 });
        let record = repo.writable(payload.as_object().unwrap().clone()).unwrap();

        assert_eq!(
            repo.insert_sql(&record),
            "INSERT INTO \"products\" (\"name\", \"price\") SELECT \"name\", \"price\" \
             FROM jsonb_populate_record(NULL::\"products\", $1) RETURNING row_to_json(\"products\".*)"
        );
        assert_eq!(
            repo.update_sql(&record),
            "UPDATE \"products\" SET (\"name\", \"price\") = (SELECT \"name\", \"price\" \
             FROM jsonb_populate_record(NULL::\"products\", $1)) WHERE \"id\"::text = $2 \
             AND \"deleted_at\" IS NULL RETURNING row_to_json(\"products\".*)"
        );
    }
}
