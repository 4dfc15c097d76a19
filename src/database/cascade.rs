use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use std::str::FromStr;
use tracing::debug;

use super::manager::{is_valid_identifier, quote_identifier, DatabaseError};

/// Guards against rule cycles such as `a -> b -> a`
pub const MAX_CASCADE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadeMode {
    /// Stamp the soft-delete marker on child rows
    Soft,
    /// Remove child rows permanently
    Force,
}

impl FromStr for CascadeMode {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soft" => Ok(CascadeMode::Soft),
            "force" => Ok(CascadeMode::Force),
            other => Err(DatabaseError::QueryError(format!("Unknown cascade mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeRule {
    pub parent: String,
    pub child: String,
    pub foreign_key: String,
    pub mode: CascadeMode,
}

impl CascadeRule {
    /// `parent:child.foreign_key:mode`
    pub fn parse(raw: &str) -> Result<Self, DatabaseError> {
        let malformed = || DatabaseError::QueryError(format!("Malformed cascade rule: {}", raw));

        let mut parts = raw.trim().splitn(3, ':');
        let parent = parts.next().ok_or_else(malformed)?.trim();
        let target = parts.next().ok_or_else(malformed)?.trim();
        let mode = parts.next().map(CascadeMode::from_str).transpose()?.unwrap_or(CascadeMode::Soft);
        let (child, foreign_key) = target.split_once('.').ok_or_else(malformed)?;

        for ident in [parent, child, foreign_key] {
            if !is_valid_identifier(ident) {
                return Err(DatabaseError::InvalidIdentifier(ident.to_string()));
            }
        }

        Ok(Self {
            parent: parent.to_string(),
            child: child.to_string(),
            foreign_key: foreign_key.to_string(),
            mode,
        })
    }

    /// Live child ids referencing any of `$1`; soft rules skip rows already trashed
    pub fn child_ids_sql(&self, soft_delete_marker: &str) -> String {
        let mut sql = format!(
            "SELECT \"id\"::text FROM {} WHERE {}::text = ANY($1)",
            quote_identifier(&self.child),
            quote_identifier(&self.foreign_key)
        );
        if self.mode == CascadeMode::Soft && !soft_delete_marker.is_empty() {
            sql.push_str(&format!(" AND {} IS NULL", quote_identifier(soft_delete_marker)));
        }
        sql
    }

    /// Stamp or delete the child rows in `$1`. Without a marker every rule deletes.
    pub fn remove_sql(&self, soft_delete_marker: &str) -> String {
        let table = quote_identifier(&self.child);
        match self.mode {
            CascadeMode::Soft if !soft_delete_marker.is_empty() => format!(
                "UPDATE {} SET {} = now() WHERE \"id\"::text = ANY($1)",
                table,
                quote_identifier(soft_delete_marker)
            ),
            _ => format!("DELETE FROM {} WHERE \"id\"::text = ANY($1)", table),
        }
    }
}

/// Source of child row ids for a rule
#[async_trait]
pub trait ChildRows: Send {
    async fn child_ids(
        &mut self,
        rule: &CascadeRule,
        parent_ids: &[String],
        soft_delete_marker: &str,
    ) -> Result<Vec<String>, DatabaseError>;
}

#[async_trait]
impl ChildRows for PgConnection {
    async fn child_ids(
        &mut self,
        rule: &CascadeRule,
        parent_ids: &[String],
        soft_delete_marker: &str,
    ) -> Result<Vec<String>, DatabaseError> {
        let ids = sqlx::query_scalar::<_, String>(&rule.child_ids_sql(soft_delete_marker))
            .bind(parent_ids)
            .fetch_all(&mut *self)
            .await?;
        Ok(ids)
    }
}

/// One rule applied to the child rows it reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeStep<'a> {
    pub rule: &'a CascadeRule,
    pub ids: Vec<String>,
}

/// Statically declared parent/child relations followed when a record is deleted
#[derive(Debug, Clone, Default)]
pub struct CascadeRegistry {
    rules: Vec<CascadeRule>,
}

impl CascadeRegistry {
    pub fn new(rules: Vec<CascadeRule>) -> Self {
        Self { rules }
    }

    /// Comma separated rule list, see [`CascadeRule::parse`]
    pub fn parse(raw: &str) -> Result<Self, DatabaseError> {
        let rules = raw
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(CascadeRule::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[CascadeRule] {
        &self.rules
    }

    pub fn rules_for(&self, parent: &str) -> Vec<&CascadeRule> {
        self.rules.iter().filter(|r| r.parent == parent).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Follow every rule below `table` for the given parent ids.
    ///
    /// Runs on the caller's connection; callers wrap it in a transaction together
    /// with the parent delete. Returns the number of child rows touched.
    pub async fn apply(
        &self,
        conn: &mut PgConnection,
        table: &str,
        ids: Vec<String>,
        soft_delete_marker: &str,
    ) -> Result<u64, DatabaseError> {
        let steps = self.removal_plan(&mut *conn, table, ids, soft_delete_marker).await?;

        let mut touched = 0u64;
        for step in steps {
            let result = sqlx::query(&step.rule.remove_sql(soft_delete_marker))
                .bind(&step.ids)
                .execute(&mut *conn)
                .await?;
            touched += result.rows_affected();
            debug!(
                "Cascaded {:?} delete {} -> {} ({} rows)",
                step.rule.mode,
                step.rule.parent,
                step.rule.child,
                step.ids.len()
            );
        }

        Ok(touched)
    }

    /// Walk the rules depth-first and return the steps deepest rows first, so
    /// force deletes never trip foreign keys.
    pub async fn removal_plan<C: ChildRows + ?Sized>(
        &self,
        rows: &mut C,
        table: &str,
        ids: Vec<String>,
        soft_delete_marker: &str,
    ) -> Result<Vec<CascadeStep<'_>>, DatabaseError> {
        let mut stack = vec![(table.to_string(), ids, 0usize)];
        let mut steps = vec![];

        while let Some((parent, parent_ids, depth)) = stack.pop() {
            if parent_ids.is_empty() {
                continue;
            }
            for rule in self.rules_for(&parent) {
                if depth >= MAX_CASCADE_DEPTH {
                    return Err(DatabaseError::QueryError(format!(
                        "Cascade from {} exceeded depth {}",
                        table, MAX_CASCADE_DEPTH
                    )));
                }

                let child_ids = rows.child_ids(rule, &parent_ids, soft_delete_marker).await?;
                if child_ids.is_empty() {
                    continue;
                }
                stack.push((rule.child.clone(), child_ids.clone(), depth + 1));
                steps.push(CascadeStep { rule, ids: child_ids });
            }
        }

        steps.reverse();
        Ok(steps)
    }
}
