//! Paging, sorting and free-text filtering parameters shared by list endpoints.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Query string accepted by every list endpoint: `?page=2&per_page=50&sort=title&order=desc&q=ethics`
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
    pub q: Option<String>,
}

impl ListParams {
    /// 1-based page number
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page())
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * self.limit()
    }

    /// Resolve the requested sort column against a whitelist.
    ///
    /// Unknown columns fall back to `default` so the value can be pushed into SQL verbatim.
    pub fn sort_column<'a>(&self, allowed: &[&'a str], default: &'a str) -> &'a str {
        self.sort
            .as_deref()
            .and_then(|requested| allowed.iter().copied().find(|c| *c == requested))
            .unwrap_or(default)
    }

    pub fn order(&self) -> SortOrder {
        self.order.unwrap_or_default()
    }

    /// `LIKE` pattern for the free-text filter, if one was given
    pub fn search_pattern(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q.replace('%', "").replace('_', "")))
    }
}

/// One page of a list result
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page(),
            per_page: params.per_page(),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = ListParams::default();
        assert_eq!(params.page(), 1);
        assert_eq!(params.per_page(), DEFAULT_PER_PAGE);
        assert_eq!(params.offset(), 0);
        assert_eq!(params.order(), SortOrder::Asc);
    }

    #[test]
    fn test_per_page_is_clamped() {
        let params = ListParams {
            page: Some(3),
            per_page: Some(500),
            ..Default::default()
        };
        assert_eq!(params.per_page(), MAX_PER_PAGE);
        assert_eq!(params.offset(), 200);

        let zero = ListParams {
            page: Some(0),
            per_page: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.page(), 1);
        assert_eq!(zero.per_page(), 1);
    }

    #[test]
    fn test_sort_column_whitelist() {
        let params = ListParams {
            sort: Some("title; DROP TABLE users".to_string()),
            ..Default::default()
        };
        assert_eq!(params.sort_column(&["title", "created_at"], "created_at"), "created_at");

        let params = ListParams {
            sort: Some("title".to_string()),
            ..Default::default()
        };
        assert_eq!(params.sort_column(&["title", "created_at"], "created_at"), "title");
    }

    #[test]
    fn test_search_pattern() {
        let blank = ListParams {
            q: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(blank.search_pattern(), None);

        let params = ListParams {
            q: Some(" 50%_ethics ".to_string()),
            ..Default::default()
        };
        assert_eq!(params.search_pattern().as_deref(), Some("%50ethics%"));
    }
}
