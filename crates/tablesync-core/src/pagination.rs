//! Pagination arithmetic for the "Showing 11 to 20 of 120" bar.

use serde::Serialize;

use crate::types::FetchResult;

/// Page sizes offered to the user when the config names none.
pub const DEFAULT_PAGE_SIZE_OPTIONS: [u32; 4] = [10, 25, 50, 100];

/// Derived position of the current page within the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    /// 1-based index of the first row shown, 0 when there are no rows.
    pub start_record: u64,
    /// 1-based index of the last row shown.
    pub end_record: u64,
}

impl PageWindow {
    pub fn new(page: u32, limit: u32, total: u64, total_pages: u64) -> Self {
        let page_u64 = u64::from(page);
        let limit_u64 = u64::from(limit);
        let start_record = if total == 0 {
            0
        } else {
            page_u64.saturating_sub(1) * limit_u64 + 1
        };
        let end_record = (page_u64 * limit_u64).min(total);
        Self {
            page,
            limit,
            total,
            total_pages,
            start_record,
            end_record,
        }
    }

    /// Window for the page currently requested, using the totals of the
    /// last result seen (which may belong to a previous request).
    pub fn for_result<T>(page: u32, limit: u32, result: Option<&FetchResult<T>>) -> Self {
        match result {
            Some(r) => Self::new(page, limit, r.total, r.total_pages),
            None => Self::new(page, limit, 0, 0),
        }
    }

    /// Total pages for display: never less than one.
    pub fn display_total_pages(&self) -> u64 {
        self.total_pages.max(1)
    }

    pub fn can_previous(&self) -> bool {
        self.page > 1
    }

    pub fn can_next(&self) -> bool {
        u64::from(self.page) < self.total_pages
    }

    pub fn last_page(&self) -> u64 {
        self.total_pages
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_page_window() {
        let w = PageWindow::new(2, 10, 120, 12);
        assert_eq!((w.start_record, w.end_record), (11, 20));
        assert!(w.can_previous());
        assert!(w.can_next());
    }

    #[test]
    fn last_page_is_truncated() {
        let w = PageWindow::new(13, 10, 121, 13);
        assert_eq!((w.start_record, w.end_record), (121, 121));
        assert!(!w.can_next());
    }

    #[test]
    fn empty_result_window() {
        let w = PageWindow::new(1, 10, 0, 0);
        assert_eq!((w.start_record, w.end_record), (0, 0));
        assert_eq!(w.display_total_pages(), 1);
        assert!(!w.can_previous());
        assert!(!w.can_next());
        assert!(w.is_empty());
    }
}
