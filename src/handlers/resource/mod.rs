pub mod collection;
pub mod record;

use serde::Deserialize;

use crate::database::repository::{Page, ResourceRepository};
use crate::database::DatabaseError;
use crate::filter::{split_tokens, QueryPlan};
use crate::state::{AppState, RequestSettings};

pub use collection::{index, search, store};
pub use record::{destroy, restore, show, update};

/// Query string accepted by the listing endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Comma separated, `-field` for descending. Example: orderBy=-price,id
    #[serde(rename = "orderBy")]
    pub order_by: Option<String>,
    /// Comma separated `field|value` tokens. Example: filters=price|>5000,status|!null
    pub filters: Option<String>,
    /// Search columns, defaults to `name`
    pub fields: Option<String>,
    pub page: Option<i64>,
    #[serde(rename = "perPage")]
    pub per_page: Option<i64>,
}

impl ListQuery {
    pub fn plan(&self, state: &AppState) -> QueryPlan {
        state.compiler.compile(
            &split_tokens(self.order_by.as_deref()),
            &split_tokens(self.filters.as_deref()),
        )
    }

    pub fn page(&self, settings: &RequestSettings) -> Page {
        Page::bounded(self.page, self.per_page, settings.default_page_size, settings.max_page_size)
    }

    pub fn search_fields(&self) -> Vec<String> {
        match split_tokens(self.fields.as_deref()) {
            fields if fields.is_empty() => vec!["name".to_string()],
            fields => fields,
        }
    }
}

pub(crate) fn repository(state: &AppState, resource: &str) -> Result<ResourceRepository, DatabaseError> {
    Ok(ResourceRepository::new(resource)?.with_soft_delete_marker(state.compiler.soft_delete_marker()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(default_page_size: i64, max_page_size: i64) -> RequestSettings {
        RequestSettings {
            api_key_header: "X-Api-Key".into(),
            tenant_header: "X-Current-Tenant".into(),
            echo_tenant_header: true,
            resolve_by_hostname: false,
            trust_forwarded_tenant: false,
            default_page_size,
            max_page_size,
        }
    }

    #[test]
    fn page_sizes_come_from_settings() {
        let query = ListQuery::default();
        assert_eq!(query.page(&settings(25, 50)), Page { page: 1, per_page: 25 });

        let query = ListQuery { page: Some(2), per_page: Some(500), ..Default::default() };
        assert_eq!(query.page(&settings(25, 50)), Page { page: 2, per_page: 50 });
        assert_eq!(query.page(&settings(25, 1000)), Page { page: 2, per_page: 500 });
    }

    #[test]
    fn search_defaults_to_name() {
        assert_eq!(ListQuery::default().search_fields(), vec!["name"]);
        let query = ListQuery { fields: Some("name,sku".into()), ..Default::default() };
        assert_eq!(query.search_fields(), vec!["name", "sku"]);
    }
}
