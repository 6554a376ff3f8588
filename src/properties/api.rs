use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Json,
    routing::get,
    Router,
};

use super::model::{page_size_message, PAGE_MESSAGE};
use super::{ListError, ListParams, ListQuery, PropertyLister, PropertyPage};
use crate::metrics::LIST_REQUESTS;
use crate::tenant::TenantContext;

pub fn create_property_routes() -> Router<PropertyLister> {
    Router::new().route("/properties", get(list_properties))
}

async fn list_properties(
    State(lister): State<PropertyLister>,
    tenant: TenantContext,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<PropertyPage>, ListError> {
    // Requests rejected here never reach the lister, so they are counted here.
    let query = parse_request(tenant, params).map_err(|e| {
        LIST_REQUESTS.with_label_values(&[e.outcome().as_str()]).inc();
        e
    })?;

    let page = lister.list(query).await?;
    Ok(Json(page))
}

fn parse_request(
    tenant: TenantContext,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<ListQuery, ListError> {
    // Tenant check precedes parameter parsing, matching the lister's order.
    if tenant.tenant_id.as_deref().map_or(true, |t| t.trim().is_empty()) {
        tracing::debug!(key_id = %tenant.key_id, "Authenticated caller has no tenant");
        return Err(ListError::Authorization);
    }

    let Query(params) = params.map_err(|e| ListError::Validation(e.body_text()))?;
    to_list_query(tenant, params)
}

fn to_list_query(tenant: TenantContext, params: ListParams) -> Result<ListQuery, ListError> {
    let page = u32::try_from(params.page)
        .map_err(|_| ListError::Validation(PAGE_MESSAGE.to_string()))?;
    let page_size = u32::try_from(params.page_size)
        .map_err(|_| ListError::Validation(page_size_message()))?;

    Ok(ListQuery {
        tenant_id: tenant.tenant_id,
        page,
        page_size,
        search: params.search,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::SqliteExecutor;
    use std::sync::Arc;

    fn tenant(tenant_id: Option<&str>) -> TenantContext {
        TenantContext {
            tenant_id: tenant_id.map(str::to_string),
            key_id: "key".to_string(),
        }
    }

    #[test]
    fn test_params_convert_to_query() {
        let params = ListParams {
            page: 3,
            page_size: 25,
            search: Some("inn".to_string()),
        };

        let query = to_list_query(tenant(Some("t1")), params).unwrap();
        assert_eq!(query, ListQuery::new("t1").page(3).page_size(25).search("inn"));
    }

    #[test]
    fn test_negative_page_is_validation_error() {
        let params = ListParams {
            page: -1,
            ..ListParams::default()
        };

        let err = to_list_query(tenant(Some("t1")), params).unwrap_err();
        assert!(matches!(err, ListError::Validation(_)));
    }

    #[test]
    fn test_missing_tenant_rejected_before_params() {
        let err = parse_request(tenant(Some("  ")), Ok(Query(ListParams::default()))).unwrap_err();
        assert!(matches!(err, ListError::Authorization));
    }

    #[tokio::test]
    async fn test_handler_rejections_are_counted() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout_secs: 1,
            run_migrations: true,
            seed_file: None,
        };
        let executor = SqliteExecutor::connect(&config).await.unwrap();
        let lister = PropertyLister::new(Arc::new(executor));
        let rejected = LIST_REQUESTS.with_label_values(&["rejected"]);

        let before = rejected.get();
        let result = list_properties(
            State(lister.clone()),
            tenant(None),
            Ok(Query(ListParams::default())),
        )
        .await;
        assert!(matches!(result, Err(ListError::Authorization)));

        let params = ListParams {
            page_size: -5,
            ..ListParams::default()
        };
        let result = list_properties(State(lister), tenant(Some("t1")), Ok(Query(params))).await;
        assert!(matches!(result, Err(ListError::Validation(_))));

        // Other tests share the global counter, so only a lower bound holds.
        assert!(rejected.get() >= before + 2);
    }

    #[test]
    fn test_missing_tenant_passes_through() {
        let query = to_list_query(tenant(None), ListParams::default()).unwrap();
        assert!(query.tenant().is_none());
    }
}
