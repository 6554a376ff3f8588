use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 1000;
pub const MAX_PAGE_SIZE: u32 = 5000;

pub const PAGE_MESSAGE: &str = "page must be greater than or equal to 1";

pub fn page_size_message() -> String {
    format!("page_size must be between 1 and {}", MAX_PAGE_SIZE)
}

/// Caller-visible view of a property. The owning tenant is never exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PropertySummary {
    pub id: String,
    pub name: String,
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyPage {
    pub items: Vec<PropertySummary>,
    pub total: u64,
}

impl PropertyPage {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct ListQuery {
    pub tenant_id: Option<String>,
    #[validate(range(min = 1))]
    pub page: u32,
    #[validate(range(min = 1, max = MAX_PAGE_SIZE))]
    pub page_size: u32,
    pub search: Option<String>,
}

impl ListQuery {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            search: None,
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Tenant id if present and non-blank.
    pub fn tenant(&self) -> Option<&str> {
        self.tenant_id
            .as_deref()
            .filter(|tenant_id| !tenant_id.trim().is_empty())
    }
}

/// Query-string parameters of `GET /api/v1/properties`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default)]
    pub search: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            search: None,
        }
    }
}

fn default_page() -> i64 {
    DEFAULT_PAGE as i64
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE as i64
}
