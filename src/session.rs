use crate::db::{PageResult, SortField, SortOrder};
use crate::filters::{AuctionFilters, FilterPatch};
use crate::models::AuctionCar;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// `max(1, ceil(total_count / page_size))`.
pub fn total_pages_for(total_count: usize, page_size: u32) -> u32 {
    let pages = (total_count as u64).div_ceil(page_size as u64) as u32;
    pages.max(1)
}

/// Snapshot of listing state for one store query. Carries the sequence
/// number that decides whether its response is still current when it lands.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub seq: u64,
    pub filters: AuctionFilters,
    pub sort: SortField,
    pub order: SortOrder,
    pub page: u32,
    pub page_size: u32,
}

/// Listing state for the filtered auction view: current filters, sort, page,
/// and the last committed result page.
///
/// Every mutation bumps an internal sequence number and every issued request
/// captures it, so when two queries race the one matching the latest state
/// wins; a slower, superseded response is dropped at `commit` instead of
/// overwriting newer results.
pub struct ListingSession {
    filters: AuctionFilters,
    sort: SortField,
    order: SortOrder,
    page: u32,
    page_size: u32,
    total_pages: u32,
    seq: u64,
    issued: Option<u64>,
    result: Option<PageResult>,
    stale: bool,
}

impl ListingSession {
    pub fn new(page_size: u32) -> Self {
        Self {
            filters: AuctionFilters::default(),
            sort: SortField::EndDate,
            order: SortOrder::Asc,
            page: 1,
            page_size,
            total_pages: 1,
            seq: 0,
            issued: None,
            result: None,
            stale: false,
        }
    }

    pub fn filters(&self) -> &AuctionFilters {
        &self.filters
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn sort(&self) -> (SortField, SortOrder) {
        (self.sort, self.order)
    }

    /// A request has been issued for the current state and no response has
    /// been committed for it yet.
    pub fn is_loading(&self) -> bool {
        self.issued == Some(self.seq)
    }

    pub fn current_cars(&self) -> &[AuctionCar] {
        self.result.as_ref().map(|r| r.cars.as_slice()).unwrap_or(&[])
    }

    pub fn total_cars(&self) -> usize {
        self.result.as_ref().map(|r| r.total_count).unwrap_or(0)
    }

    /// Merge a filter patch and reset to page 1. Supersedes any in-flight
    /// query.
    pub fn apply_patch(&mut self, patch: &FilterPatch) {
        self.filters = self.filters.apply(patch);
        self.page = 1;
        self.seq += 1;
    }

    /// Select a sort field: first selection applies the field's natural
    /// default order, re-selecting the current field toggles it. Resets to
    /// page 1 either way.
    pub fn set_sort(&mut self, field: SortField) {
        if field == self.sort {
            self.order = self.order.toggled();
        } else {
            self.sort = field;
            self.order = field.default_order();
        }
        self.page = 1;
        self.seq += 1;
    }

    /// Explicit page change, clamped into `[1, total_pages]`.
    pub fn set_page(&mut self, page: u32) {
        let clamped = page.clamp(1, self.total_pages);
        if clamped != self.page {
            self.page = clamped;
            self.seq += 1;
        }
    }

    /// Capture the current state as a query request.
    pub fn next_request(&mut self) -> QueryRequest {
        self.issued = Some(self.seq);
        QueryRequest {
            seq: self.seq,
            filters: self.filters.clone(),
            sort: self.sort,
            order: self.order,
            page: self.page,
            page_size: self.page_size,
        }
    }

    /// Commit a query response. Returns false (dropping the result) when the
    /// session state has moved on since the request was issued. On commit the
    /// page is re-clamped in case the match set shrank below it.
    pub fn commit(&mut self, seq: u64, result: PageResult) -> bool {
        if seq != self.seq {
            return false;
        }
        self.total_pages = total_pages_for(result.total_count, self.page_size);
        if self.page > self.total_pages {
            self.page = self.total_pages;
        }
        self.result = Some(result);
        self.issued = None;
        self.stale = false;
        true
    }

    /// Mark cached results stale (after a successful ingest); the next render
    /// should re-query.
    pub fn mark_stale(&mut self) {
        self.stale = true;
        self.seq += 1;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

// ── Tests ──
