use std::sync::Arc;
use std::time::Instant;
use validator::Validate;

use super::error::ListError;
use super::model::{page_size_message, ListQuery, PropertyPage, PAGE_MESSAGE};
use crate::db::{PageWindow, PropertyFilter, QueryExecutor};
use crate::metrics::{LIST_DURATION, LIST_REQUESTS};

/// Lists a tenant's properties, one page at a time.
#[derive(Clone)]
pub struct PropertyLister {
    executor: Arc<dyn QueryExecutor>,
}

impl PropertyLister {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    pub async fn list(&self, query: ListQuery) -> Result<PropertyPage, ListError> {
        let start = Instant::now();
        let result = self.list_inner(&query).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome().as_str(),
        };
        LIST_REQUESTS.with_label_values(&[outcome]).inc();
        LIST_DURATION.observe(start.elapsed().as_secs_f64());

        result
    }

    async fn list_inner(&self, query: &ListQuery) -> Result<PropertyPage, ListError> {
        let tenant_id = query.tenant().ok_or_else(|| {
            tracing::debug!("Rejecting property listing without tenant");
            ListError::Authorization
        })?;

        query.validate().map_err(|e| {
            tracing::debug!(tenant_id, "Rejecting property listing: {}", e);
            ListError::Validation(validation_message(&e))
        })?;

        let window = PageWindow::for_page(query.page, query.page_size)
            .ok_or_else(|| ListError::Validation("page is out of range".to_string()))?;

        let mut session = self
            .executor
            .acquire_session()
            .await
            .map_err(ListError::Configuration)?;

        let filter = PropertyFilter::for_tenant(tenant_id).with_search(query.search.as_deref());

        let fetched = async {
            let items = session.fetch_summaries(&filter, window).await?;
            let total = session.fetch_count(&filter).await?;
            anyhow::Ok(PropertyPage { items, total })
        }
        .await;

        match fetched {
            Ok(page) => {
                tracing::debug!(
                    tenant_id,
                    page = query.page,
                    page_size = query.page_size,
                    returned = page.items.len(),
                    total = page.total,
                    "Listed properties"
                );
                Ok(page)
            }
            Err(e) => {
                tracing::error!(tenant_id, "Failed to load properties for tenant {}: {:#}", tenant_id, e);
                Err(ListError::Query(e))
            }
        }
    }
}

fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, _)| {
            let field: &str = &field;
            match field {
                "page" => PAGE_MESSAGE.to_string(),
                "page_size" => page_size_message(),
                other => format!("{} is invalid", other),
            }
        })
        .collect();
    messages.sort();
    messages.join(", ")
}
