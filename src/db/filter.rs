use serde::Serialize;

/// Escape character used in `LIKE ... ESCAPE` clauses.
const LIKE_ESCAPE: char = '\\';

/// A single condition of a property filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Clause {
    /// Row is owned by the given tenant.
    TenantIs(String),
    /// Row name contains the given text, ignoring case.
    ///
    /// Matched against `name_folded`, which holds the Unicode lowercase of
    /// `name`; SQLite's own `LOWER` only folds ASCII.
    NameContains(String),
}

impl Clause {
    fn sql(&self) -> String {
        match self {
            Clause::TenantIs(_) => "tenant_id = ?".to_string(),
            Clause::NameContains(_) => format!("name_folded LIKE ? ESCAPE '{}'", LIKE_ESCAPE),
        }
    }

    fn param(&self) -> String {
        match self {
            Clause::TenantIs(tenant_id) => tenant_id.clone(),
            Clause::NameContains(text) => format!("%{}%", escape_like(&fold_case(text))),
        }
    }
}

/// Composed `WHERE` predicate over the `properties` table.
///
/// The SQL text is built only from fixed fragments; every caller-supplied
/// value travels as a bound parameter. The page query and the count query
/// must be given the same filter so `total` describes the same rows as
/// `items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyFilter {
    clauses: Vec<Clause>,
}

impl PropertyFilter {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            clauses: vec![Clause::TenantIs(tenant_id.into())],
        }
    }

    /// Adds a name search. `None` and the empty string leave the filter unchanged.
    pub fn with_search(mut self, search: Option<&str>) -> Self {
        if let Some(text) = search.filter(|s| !s.is_empty()) {
            self.clauses.push(Clause::NameContains(text.to_string()));
        }
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn where_sql(&self) -> String {
        self.clauses
            .iter()
            .map(Clause::sql)
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Bind values, in placeholder order.
    pub fn params(&self) -> Vec<String> {
        self.clauses.iter().map(Clause::param).collect()
    }
}

/// Limit/offset window of the page query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub limit: i64,
    pub offset: i64,
}

impl PageWindow {
    /// Window for a 1-based page number. Returns `None` on overflow.
    pub fn for_page(page: u32, page_size: u32) -> Option<Self> {
        let offset = u64::from(page.checked_sub(1)?).checked_mul(u64::from(page_size))?;
        Some(Self {
            limit: i64::from(page_size),
            offset: i64::try_from(offset).ok()?,
        })
    }
}

/// Case folding applied to stored names and to search text alike.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '%' || ch == '_' || ch == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(ch);
    }
    escaped
}
