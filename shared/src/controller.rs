//! Request lifecycle for the paginated feed fetch.
//!
//! Only one fetch is active at a time. Every issue bumps a generation
//! counter; a result is applied only if its ticket still carries the active
//! generation, so a superseded or cancelled fetch can never touch the store.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::capabilities::{FeedApiError, FeedRequest};
use crate::error::{AppError, SyncError, SyncResult};
use crate::model::{FeedFilter, FeedPage};
use crate::store::FeedStore;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum FetchMode {
    Initial,
    Refresh,
    LoadMore,
    Search(String),
    Filter(FeedFilter),
}

impl FetchMode {
    #[must_use]
    pub fn loading_flag(&self) -> LoadingFlag {
        match self {
            Self::Refresh => LoadingFlag::Refreshing,
            Self::LoadMore => LoadingFlag::LoadingMore,
            Self::Initial | Self::Search(_) | Self::Filter(_) => LoadingFlag::Loading,
        }
    }

    #[must_use]
    pub fn replaces_collection(&self) -> bool {
        !matches!(self, Self::LoadMore)
    }

    #[must_use]
    pub fn resets_cursor(&self) -> bool {
        matches!(self, Self::Refresh | Self::Search(_) | Self::Filter(_))
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Refresh => "refresh",
            Self::LoadMore => "load_more",
            Self::Search(_) => "search",
            Self::Filter(_) => "filter",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadingFlag {
    Loading,
    Refreshing,
    LoadingMore,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadingFlags {
    pub is_loading: bool,
    pub is_refreshing: bool,
    pub is_loading_more: bool,
}

impl LoadingFlags {
    fn set(&mut self, flag: LoadingFlag, value: bool) {
        match flag {
            LoadingFlag::Loading => self.is_loading = value,
            LoadingFlag::Refreshing => self.is_refreshing = value,
            LoadingFlag::LoadingMore => self.is_loading_more = value,
        }
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.is_loading || self.is_refreshing || self.is_loading_more
    }
}

/// Next page to fetch and whether the server has one.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageCursor {
    pub page_number: u32,
    pub has_more: bool,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            page_number: 1,
            has_more: true,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedQuery {
    pub search: Option<String>,
    pub filter: FeedFilter,
}

/// Handle for one outstanding page request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub page: u32,
    pub mode: FetchMode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedFetch {
    pub ticket: FetchTicket,
    pub request: FeedRequest,
    /// Previously active fetch, now invalid. The shell may abort it.
    pub superseded: Option<FetchTicket>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    Replaced { count: usize },
    Appended { added: usize },
    Failed(AppError),
    Discarded,
}

#[derive(Clone, Debug)]
struct ActiveFetch {
    ticket: FetchTicket,
    /// Cursor and query matching the collection on screen when issued.
    cursor_before: PageCursor,
    query_before: FeedQuery,
}

#[derive(Debug, Clone)]
pub struct FetchController {
    page_size: u32,
    max_query_length: usize,
    generation: u64,
    active: Option<ActiveFetch>,
    cursor: PageCursor,
    query: FeedQuery,
    loading: LoadingFlags,
    error: Option<AppError>,
}

impl FetchController {
    #[must_use]
    pub fn new(page_size: u32, max_query_length: usize) -> Self {
        Self {
            page_size,
            max_query_length,
            generation: 0,
            active: None,
            cursor: PageCursor::default(),
            query: FeedQuery::default(),
            loading: LoadingFlags::default(),
            error: None,
        }
    }

    /// Issue a fetch for `page`, superseding whatever is in flight.
    ///
    /// Returns `Ok(None)` for a `LoadMore` that has nothing to do.
    #[instrument(level = "debug", skip(self))]
    pub fn fetch_page(&mut self, page: u32, mode: FetchMode) -> SyncResult<Option<IssuedFetch>> {
        if page == 0 {
            return Err(SyncError::validation("Page number must be at least 1"));
        }

        if mode == FetchMode::LoadMore && (!self.cursor.has_more || self.active.is_some()) {
            debug!(
                has_more = self.cursor.has_more,
                in_flight = self.active.is_some(),
                "load more skipped"
            );
            return Ok(None);
        }

        let mut next_query = self.query.clone();
        let mode = match mode {
            FetchMode::Search(raw) => {
                let query = raw.trim();
                if query.chars().count() > self.max_query_length {
                    return Err(SyncError::validation(format!(
                        "Search is limited to {} characters",
                        self.max_query_length
                    )));
                }
                next_query.search = (!query.is_empty()).then(|| query.to_string());
                FetchMode::Search(query.to_string())
            }
            FetchMode::Filter(filter) => {
                next_query.filter = filter.clone();
                FetchMode::Filter(filter)
            }
            other => other,
        };

        // A superseded fetch never landed, so the last consistent state is
        // still the one it recorded.
        let superseded = self.active.take();
        let (cursor_before, query_before) = match &superseded {
            Some(previous) => {
                self.loading.set(previous.ticket.mode.loading_flag(), false);
                debug!(generation = previous.ticket.generation, "fetch superseded");
                (previous.cursor_before, previous.query_before.clone())
            }
            None => (self.cursor, self.query.clone()),
        };
        self.query = next_query;
        if mode.resets_cursor() {
            self.cursor = PageCursor::default();
        }

        self.generation += 1;
        let ticket = FetchTicket {
            generation: self.generation,
            page,
            mode,
        };
        self.loading.set(ticket.mode.loading_flag(), true);
        self.error = None;
        self.active = Some(ActiveFetch {
            ticket: ticket.clone(),
            cursor_before,
            query_before,
        });

        info!(
            generation = ticket.generation,
            page,
            mode = ticket.mode.name(),
            "issuing feed fetch"
        );

        let request = FeedRequest {
            generation: ticket.generation,
            page,
            page_size: self.page_size,
            filter: self.query.filter.clone(),
            search: self.query.search.clone(),
        };

        Ok(Some(IssuedFetch {
            ticket,
            request,
            superseded: superseded.map(|previous| previous.ticket),
        }))
    }

    /// Continue the generation sequence of a previous session's controller.
    pub fn resume_from(&mut self, previous: &FetchController) {
        self.generation = self.generation.max(previous.generation);
    }

    /// Invalidate the active fetch. Its result will be discarded and the
    /// cursor and query go back to what the collection was loaded with.
    pub fn cancel(&mut self) -> Option<FetchTicket> {
        let active = self.active.take()?;
        self.loading.set(active.ticket.mode.loading_flag(), false);
        debug!(generation = active.ticket.generation, "fetch cancelled");
        Some(self.restore(active))
    }

    fn restore(&mut self, active: ActiveFetch) -> FetchTicket {
        self.cursor = active.cursor_before;
        self.query = active.query_before;
        active.ticket
    }

    #[must_use]
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.ticket.generation == ticket.generation)
    }

    /// Apply a resolved fetch to `store` if `ticket` is still current.
    #[instrument(level = "debug", skip(self, result, store), fields(generation = ticket.generation))]
    pub fn complete(
        &mut self,
        ticket: &FetchTicket,
        result: Result<FeedPage, FeedApiError>,
        store: &mut FeedStore,
    ) -> FetchOutcome {
        if !self.is_current(ticket) {
            debug!("discarding superseded page");
            return FetchOutcome::Discarded;
        }
        let Some(active) = self.active.take() else {
            return FetchOutcome::Discarded;
        };
        self.loading.set(ticket.mode.loading_flag(), false);

        match result {
            Ok(page) => {
                self.cursor = PageCursor {
                    page_number: ticket.page.saturating_add(1),
                    has_more: page.has_more,
                };
                if ticket.mode.replaces_collection() {
                    let count = page.items.len();
                    store.replace_all(page.items);
                    info!(count, has_more = self.cursor.has_more, "feed replaced");
                    FetchOutcome::Replaced { count }
                } else {
                    let added = store.append_page(page.items);
                    info!(added, has_more = self.cursor.has_more, "feed page appended");
                    FetchOutcome::Appended { added }
                }
            }
            Err(e) => match SyncError::from_fetch_error(&e) {
                SyncError::Cancelled => {
                    self.restore(active);
                    debug!("fetch aborted by transport");
                    FetchOutcome::Discarded
                }
                classified => {
                    self.restore(active);
                    let error = AppError::from(classified);
                    info!(code = error.code(), "feed fetch failed");
                    self.error = Some(error.clone());
                    FetchOutcome::Failed(error)
                }
            },
        }
    }

    #[must_use]
    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    #[must_use]
    pub fn query(&self) -> &FeedQuery {
        &self.query
    }

    #[must_use]
    pub fn loading(&self) -> LoadingFlags {
        self.loading
    }

    #[must_use]
    pub fn error(&self) -> Option<&AppError> {
        self.error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    #[must_use]
    pub fn active(&self) -> Option<&FetchTicket> {
        self.active.as_ref().map(|a| &a.ticket)
    }

    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.active.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{FeedSort, ItemId};
    use crate::store::testing::item;
    use assert_matches::assert_matches;

    fn page(ids: &[&str], has_more: bool) -> FeedPage {
        FeedPage {
            items: ids.iter().map(|id| item(id, "u1")).collect(),
            has_more,
        }
    }

    fn ids(store: &FeedStore) -> Vec<&str> {
        store.get().iter().map(|i| i.id.as_str()).collect()
    }

    fn controller() -> FetchController {
        FetchController::new(10, 50)
    }

    #[test]
    fn issue_sets_matching_loading_flag() {
        let mut c = controller();
        c.fetch_page(1, FetchMode::Refresh).unwrap();
        assert!(c.loading().is_refreshing);
        assert!(!c.loading().is_loading);
        assert!(!c.loading().is_loading_more);
    }

    #[test]
    fn page_zero_is_validation_failure() {
        let mut c = controller();
        assert_matches!(
            c.fetch_page(0, FetchMode::Initial),
            Err(SyncError::ValidationFailure(_))
        );
        assert!(!c.loading().any());
    }

    #[test]
    fn superseded_result_never_mutates_store() {
        let mut c = controller();
        let mut store = FeedStore::new(100);
        let first = c.fetch_page(1, FetchMode::Initial).unwrap().unwrap();
        let second = c.fetch_page(1, FetchMode::Refresh).unwrap().unwrap();
        assert_eq!(second.superseded.as_ref(), Some(&first.ticket));
        assert!(!c.loading().is_loading);

        let outcome = c.complete(&second.ticket, Ok(page(&["new"], true)), &mut store);
        assert_eq!(outcome, FetchOutcome::Replaced { count: 1 });

        let late = c.complete(&first.ticket, Ok(page(&["old"], false)), &mut store);
        assert_eq!(late, FetchOutcome::Discarded);
        assert_eq!(ids(&store), vec!["new"]);
        assert!(c.cursor().has_more);
    }

    #[test]
    fn load_more_appends_and_advances() {
        let mut c = controller();
        let mut store = FeedStore::new(100);
        let initial = c.fetch_page(1, FetchMode::Initial).unwrap().unwrap();
        c.complete(&initial.ticket, Ok(page(&["a", "b"], true)), &mut store);
        assert_eq!(c.cursor().page_number, 2);

        let more = c.fetch_page(2, FetchMode::LoadMore).unwrap().unwrap();
        assert!(c.loading().is_loading_more);
        let outcome = c.complete(&more.ticket, Ok(page(&["c"], false)), &mut store);
        assert_eq!(outcome, FetchOutcome::Appended { added: 1 });
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
        assert_eq!(
            c.cursor(),
            PageCursor {
                page_number: 3,
                has_more: false
            }
        );
        assert!(!c.loading().any());
    }

    #[test]
    fn load_more_is_noop_when_exhausted_or_busy() {
        let mut c = controller();
        let mut store = FeedStore::new(100);
        let initial = c.fetch_page(1, FetchMode::Initial).unwrap().unwrap();
        assert_eq!(c.fetch_page(2, FetchMode::LoadMore), Ok(None));

        c.complete(&initial.ticket, Ok(page(&["a"], false)), &mut store);
        assert_eq!(c.fetch_page(2, FetchMode::LoadMore), Ok(None));
        assert!(!c.loading().is_loading_more);
        assert!(!c.in_flight());
    }

    #[test]
    fn failure_keeps_collection_and_sets_error() {
        let mut c = controller();
        let mut store = FeedStore::new(100);
        let initial = c.fetch_page(1, FetchMode::Initial).unwrap().unwrap();
        c.complete(&initial.ticket, Ok(page(&["a"], true)), &mut store);

        let refresh = c.fetch_page(1, FetchMode::Refresh).unwrap().unwrap();
        let outcome = c.complete(&refresh.ticket, Err(FeedApiError::Timeout), &mut store);
        assert_matches!(outcome, FetchOutcome::Failed(ref e) if e.kind == ErrorKind::Timeout);
        assert_eq!(ids(&store), vec!["a"]);
        assert_eq!(c.cursor().page_number, 2);
        assert!(c.error().is_some());
        assert!(!c.loading().any());
    }

    #[test]
    fn aborted_result_is_silent() {
        let mut c = controller();
        let mut store = FeedStore::new(100);
        let issued = c.fetch_page(1, FetchMode::Initial).unwrap().unwrap();
        let outcome = c.complete(&issued.ticket, Err(FeedApiError::Aborted), &mut store);
        assert_eq!(outcome, FetchOutcome::Discarded);
        assert!(c.error().is_none());
        assert!(!c.loading().any());
    }

    #[test]
    fn filter_resets_cursor_and_replaces() {
        let mut c = controller();
        let mut store = FeedStore::new(100);
        let initial = c.fetch_page(1, FetchMode::Initial).unwrap().unwrap();
        c.complete(&initial.ticket, Ok(page(&["a"], true)), &mut store);
        for (n, id) in [(2, "b"), (3, "c")] {
            let more = c.fetch_page(n, FetchMode::LoadMore).unwrap().unwrap();
            c.complete(&more.ticket, Ok(page(&[id], true)), &mut store);
        }
        assert_eq!(c.cursor().page_number, 4);

        let filter = FeedFilter {
            category: Some("nails".into()),
            sort: FeedSort::Popular,
            following_only: false,
        };
        let issued = c.fetch_page(1, FetchMode::Filter(filter.clone())).unwrap().unwrap();
        assert_eq!(c.cursor(), PageCursor::default());
        assert_eq!(issued.request.filter, filter);
        assert_eq!(issued.request.page, 1);

        c.complete(&issued.ticket, Ok(page(&["n1", "n2"], true)), &mut store);
        assert_eq!(ids(&store), vec!["n1", "n2"]);
        assert_eq!(c.cursor().page_number, 2);
    }

    #[test]
    fn failed_filter_restores_cursor_and_query() {
        let mut c = controller();
        let mut store = FeedStore::new(100);
        let initial = c.fetch_page(1, FetchMode::Initial).unwrap().unwrap();
        c.complete(&initial.ticket, Ok(page(&["a"], true)), &mut store);
        let before = c.cursor();

        let filter = FeedFilter {
            category: Some("nails".into()),
            ..FeedFilter::default()
        };
        let issued = c.fetch_page(1, FetchMode::Filter(filter)).unwrap().unwrap();
        let outcome = c.complete(
            &issued.ticket,
            Err(FeedApiError::Status { code: 503, body: None }),
            &mut store,
        );
        assert_matches!(outcome, FetchOutcome::Failed(_));
        assert_eq!(c.cursor(), before);
        assert_eq!(c.query(), &FeedQuery::default());

        let more = c.fetch_page(2, FetchMode::LoadMore).unwrap().unwrap();
        assert_eq!(more.request.filter, FeedFilter::default());
        assert_eq!(more.request.page, 2);
    }

    #[test]
    fn cancelled_search_restores_query() {
        let mut c = controller();
        let mut store = FeedStore::new(100);
        let initial = c.fetch_page(1, FetchMode::Initial).unwrap().unwrap();
        c.complete(&initial.ticket, Ok(page(&["a"], true)), &mut store);

        c.fetch_page(1, FetchMode::Search("curls".into())).unwrap();
        c.cancel();
        assert!(c.query().search.is_none());
        assert_eq!(c.cursor().page_number, 2);
    }

    #[test]
    fn superseding_search_keeps_pending_filter() {
        let mut c = controller();
        let mut store = FeedStore::new(100);
        let initial = c.fetch_page(1, FetchMode::Initial).unwrap().unwrap();
        c.complete(&initial.ticket, Ok(page(&["a"], true)), &mut store);

        let filter = FeedFilter {
            following_only: true,
            ..FeedFilter::default()
        };
        c.fetch_page(1, FetchMode::Filter(filter.clone())).unwrap();
        let search = c
            .fetch_page(1, FetchMode::Search("bob".into()))
            .unwrap()
            .unwrap();
        assert_eq!(search.request.filter, filter);

        c.complete(&search.ticket, Err(FeedApiError::Timeout), &mut store);
        assert_eq!(c.query(), &FeedQuery::default());
        assert_eq!(c.cursor().page_number, 2);
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[test]
    fn search_trims_and_clears() {
        let mut c = controller();
        let issued = c
            .fetch_page(1, FetchMode::Search("  balayage ".into()))
            .unwrap()
            .unwrap();
        assert_eq!(issued.request.search.as_deref(), Some("balayage"));
        assert_eq!(issued.ticket.mode, FetchMode::Search("balayage".into()));

        let cleared = c.fetch_page(1, FetchMode::Search("   ".into())).unwrap().unwrap();
        assert_eq!(cleared.request.search, None);
    }

    #[test]
    fn overlong_search_rejected_without_side_effects() {
        let mut c = FetchController::new(10, 5);
        let result = c.fetch_page(1, FetchMode::Search("abcdefgh".into()));
        assert_matches!(result, Err(SyncError::ValidationFailure(_)));
        assert!(c.query().search.is_none());
        assert!(!c.in_flight());
    }

    #[test]
    fn cancel_clears_flag_and_invalidates() {
        let mut c = controller();
        let mut store = FeedStore::new(100);
        let issued = c.fetch_page(1, FetchMode::Initial).unwrap().unwrap();
        assert_eq!(c.cancel(), Some(issued.ticket.clone()));
        assert!(!c.loading().is_loading);
        let outcome = c.complete(&issued.ticket, Ok(page(&["a"], true)), &mut store);
        assert_eq!(outcome, FetchOutcome::Discarded);
        assert!(store.find(&ItemId::new("a")).is_none());
    }
}
