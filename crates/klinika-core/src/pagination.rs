//! Page requests and paginated results

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A validated request for one page of records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// Page number (1-based)
    pub page: u32,

    /// Number of items per page
    pub page_size: u32,

    /// Case-insensitive substring filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl PageRequest {
    /// Create a page request
    ///
    /// # Errors
    ///
    /// Returns a validation error when `page` is zero or `page_size` is zero.
    pub fn new(page: u32, page_size: u32, search: Option<String>) -> Result<Self> {
        if page == 0 {
            return Err(Error::validation("page", "page must be at least 1"));
        }
        if page_size == 0 {
            return Err(Error::validation("pageSize", "pageSize must be greater than 0"));
        }
        Ok(Self {
            page,
            page_size,
            search,
        })
    }

    /// First page of `page_size` items with no filter
    ///
    /// # Errors
    ///
    /// Returns a validation error when `page_size` is zero.
    pub fn first(page_size: u32) -> Result<Self> {
        Self::new(1, page_size, None)
    }

    /// Number of records skipped before this page
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.page_size as u64
    }

    /// Maximum number of records on this page
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.page_size
    }

    /// The trimmed search term, `None` when absent or blank
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    /// Convert to SQL LIMIT/OFFSET values
    #[must_use]
    pub fn to_sql(&self) -> (i64, i64) {
        (
            i64::from(self.limit()),
            i64::try_from(self.offset()).unwrap_or(i64::MAX),
        )
    }
}

/// Number of pages needed for `total_count` records, `ceil(total / page_size)`
///
/// An empty result has zero pages.
#[must_use]
pub fn total_pages(total_count: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    let pages = total_count.div_ceil(u64::from(page_size));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// One page of records plus the totals the table needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Records on this page
    pub data: Vec<T>,

    /// Total number of pages for the filtered set
    pub total_pages: u32,

    /// Total number of records matching the filter
    #[serde(default)]
    pub total_count: u64,

    /// Current page (1-based)
    #[serde(default)]
    pub page: u32,

    /// Items per page
    #[serde(default)]
    pub page_size: u32,
}

impl<T> Page<T> {
    /// Wrap an already-sliced page
    #[must_use]
    pub fn new(data: Vec<T>, total_count: u64, request: &PageRequest) -> Self {
        Self {
            data,
            total_pages: total_pages(total_count, request.page_size),
            total_count,
            page: request.page,
            page_size: request.page_size,
        }
    }

    /// Slice the full, already-filtered record set down to the requested page
    ///
    /// Pages past the end are empty.
    #[must_use]
    pub fn from_all(items: Vec<T>, request: &PageRequest) -> Self {
        let total_count = items.len() as u64;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let data = items
            .into_iter()
            .skip(offset)
            .take(request.page_size as usize)
            .collect();
        Self::new(data, total_count, request)
    }

    /// Transform each record, keeping the totals
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total_pages: self.total_pages,
            total_count: self.total_count,
            page: self.page,
            page_size: self.page_size,
        }
    }

    /// Whether a later page exists
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    /// Whether an earlier page exists
    #[must_use]
    pub const fn has_prev(&self) -> bool {
        self.page > 1
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 10, 0)]
    #[case(1, 10, 1)]
    #[case(10, 10, 1)]
    #[case(11, 10, 2)]
    #[case(25, 10, 3)]
    #[case(25, 1, 25)]
    fn test_total_pages(#[case] total: u64, #[case] size: u32, #[case] expected: u32) {
        assert_eq!(total_pages(total, size), expected);
    }

    #[test]
    fn test_page_request_rejects_zero_page() {
        let err = PageRequest::new(0, 10, None).unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "page"));
    }

    #[test]
    fn test_page_request_rejects_zero_page_size() {
        let err = PageRequest::new(1, 0, None).unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "pageSize"));
    }

    #[test]
    fn test_offset_and_sql() {
        let request = PageRequest::new(3, 20, None).unwrap();
        assert_eq!(request.offset(), 40);
        assert_eq!(request.to_sql(), (20, 40));
    }

    #[test]
    fn test_search_term_is_trimmed() {
        let request = PageRequest::new(1, 10, Some("  ann ".to_string())).unwrap();
        assert_eq!(request.search_term(), Some("ann"));

        let blank = PageRequest::new(1, 10, Some("   ".to_string())).unwrap();
        assert_eq!(blank.search_term(), None);
    }

    #[test]
    fn test_first_page_of_twenty_five() {
        let items: Vec<u32> = (1..=25).collect();
        let page = Page::from_all(items, &PageRequest::first(10).unwrap());

        assert_eq!(page.data.len(), 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_count, 25);
        assert!(page.has_next());
        assert!(!page.has_prev());
    }

    #[test]
    fn test_last_partial_page() {
        let items: Vec<u32> = (1..=25).collect();
        let page = Page::from_all(items, &PageRequest::new(3, 10, None).unwrap());
        assert_eq!(page.data, vec![21, 22, 23, 24, 25]);
        assert!(!page.has_next());
    }

    #[test]
    fn test_page_past_the_end_is_empty() {
        let items: Vec<u32> = (1..=5).collect();
        let page = Page::from_all(items, &PageRequest::new(4, 10, None).unwrap());
        assert!(page.data.is_empty());
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_page_serializes_camel_case() {
        let page = Page::from_all(vec![1, 2], &PageRequest::first(10).unwrap());
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["totalPages"], 1);
        assert_eq!(json["totalCount"], 2);
        assert_eq!(json["pageSize"], 10);
    }

    #[test]
    fn test_page_deserializes_minimal_shape() {
        let page: Page<u32> = serde_json::from_str(r#"{"data":[1],"totalPages":4}"#).unwrap();
        assert_eq!(page.data, vec![1]);
        assert_eq!(page.total_pages, 4);
    }

    proptest! {
        #[test]
        fn test_page_never_exceeds_page_size(
            total in 0usize..500,
            page in 1u32..60,
            size in 1u32..50,
        ) {
            let items: Vec<usize> = (0..total).collect();
            let request = PageRequest::new(page, size, None).unwrap();
            let result = Page::from_all(items, &request);

            prop_assert!(result.data.len() <= size as usize);
            prop_assert_eq!(result.total_pages as usize, total.div_ceil(size as usize));
        }

        #[test]
        fn test_pages_partition_the_set(total in 0usize..200, size in 1u32..30) {
            let items: Vec<usize> = (0..total).collect();
            let pages = total_pages(total as u64, size);
            let mut seen = Vec::new();
            for page in 1..=pages {
                let request = PageRequest::new(page, size, None).unwrap();
                seen.extend(Page::from_all(items.clone(), &request).data);
            }
            prop_assert_eq!(seen, items);
        }
    }
}
