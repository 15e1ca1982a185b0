//! Comment threads, one per feed item, kept in a bounded LRU cache.

use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capabilities::FeedApiError;
use crate::error::{AppError, SyncError};
use crate::model::{Comment, CommentId, CommentPage, ItemId, ToggleState};
use crate::store::StoreError;
use crate::tracker::{MutationKind, MutationTarget};

#[derive(Debug, Clone, PartialEq)]
pub struct CommentThread {
    item_id: ItemId,
    comments: Vec<Comment>,
    next_page: u32,
    has_more: bool,
    in_flight: Option<CommentTicket>,
    error: Option<AppError>,
}

impl CommentThread {
    fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            comments: Vec::new(),
            next_page: 1,
            has_more: true,
            in_flight: None,
            error: None,
        }
    }

    #[must_use]
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    #[must_use]
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    #[must_use]
    pub fn error(&self) -> Option<&AppError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn find(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.iter().find(|c| &c.id == id)
    }

    fn position(&self, id: &CommentId) -> Option<usize> {
        self.comments.iter().position(|c| &c.id == id)
    }

    fn append_unique(&mut self, incoming: Vec<Comment>) -> usize {
        let mut added = 0;
        for comment in incoming {
            if let Some(existing) = self.comments.iter_mut().find(|c| c.id == comment.id) {
                *existing = comment;
            } else {
                self.comments.push(comment);
                added += 1;
            }
        }
        added
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CommentTicket {
    pub item_id: ItemId,
    pub generation: u64,
    pub page: u32,
}

/// Comments taken out by a delete, with their original positions.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RemovedComments {
    pub item_id: ItemId,
    pub removed: Vec<(usize, Comment)>,
}

impl RemovedComments {
    #[must_use]
    pub fn count(&self) -> u32 {
        u32::try_from(self.removed.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommentFetchOutcome {
    Applied { count: usize },
    Failed(AppError),
    Discarded,
}

pub struct CommentStore {
    threads: LruCache<ItemId, CommentThread>,
    active: Option<ItemId>,
    generation: u64,
    page_size: u32,
    pending_deletes: HashMap<CommentId, RemovedComments>,
    /// Local ids of posts awaiting the server. Survives thread eviction.
    pending_posts: HashSet<CommentId>,
}

impl fmt::Debug for CommentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentStore")
            .field("active", &self.active)
            .field("threads", &self.threads.len())
            .field("capacity", &self.threads.cap())
            .field("generation", &self.generation)
            .field("pending_deletes", &self.pending_deletes.len())
            .field("pending_posts", &self.pending_posts.len())
            .finish()
    }
}

impl CommentStore {
    #[must_use]
    pub fn new(capacity: NonZeroUsize, page_size: u32) -> Self {
        Self {
            threads: LruCache::new(capacity),
            active: None,
            generation: 0,
            page_size: page_size.max(1),
            pending_deletes: HashMap::new(),
            pending_posts: HashSet::new(),
        }
    }

    /// Make `item_id` the active thread and fetch its first page. Cached
    /// comments stay visible until the page arrives.
    pub fn open(&mut self, item_id: ItemId) -> Option<CommentTicket> {
        if self.threads.contains(&item_id) {
            self.threads.promote(&item_id);
        } else if let Some((evicted, _)) = self
            .threads
            .push(item_id.clone(), CommentThread::new(item_id.clone()))
        {
            debug!(%evicted, "evicted comment thread");
        }
        self.active = Some(item_id.clone());
        self.issue(&item_id, 1)
    }

    pub fn load_more(&mut self) -> Option<CommentTicket> {
        let item_id = self.active.clone()?;
        let thread = self.threads.peek(&item_id)?;
        if !thread.has_more || thread.in_flight.is_some() {
            debug!(%item_id, "comment load more skipped");
            return None;
        }
        let page = thread.next_page;
        self.issue(&item_id, page)
    }

    pub fn close(&mut self) {
        self.active = None;
    }

    pub fn resume_from(&mut self, previous: &CommentStore) {
        self.generation = self.generation.max(previous.generation);
    }

    fn issue(&mut self, item_id: &ItemId, page: u32) -> Option<CommentTicket> {
        let thread = self.threads.peek_mut(item_id)?;
        self.generation += 1;
        let ticket = CommentTicket {
            item_id: item_id.clone(),
            generation: self.generation,
            page,
        };
        thread.in_flight = Some(ticket.clone());
        thread.error = None;
        Some(ticket)
    }

    pub fn complete_fetch(
        &mut self,
        ticket: &CommentTicket,
        result: Result<CommentPage, FeedApiError>,
    ) -> CommentFetchOutcome {
        let page_size = self.page_size as usize;
        let deleting: HashSet<CommentId> = self.pending_deletes.keys().cloned().collect();

        let Some(thread) = self.threads.peek_mut(&ticket.item_id) else {
            debug!(item_id = %ticket.item_id, "comment thread evicted before page arrived");
            return CommentFetchOutcome::Discarded;
        };
        if thread.in_flight.as_ref().map(|t| t.generation) != Some(ticket.generation) {
            debug!(generation = ticket.generation, "discarding stale comment page");
            return CommentFetchOutcome::Discarded;
        }
        thread.in_flight = None;

        match result {
            Ok(page) => {
                let count = page.comments.len();
                let incoming: Vec<Comment> = page
                    .comments
                    .into_iter()
                    .filter(|c| !deleting.contains(&c.id))
                    .collect();
                if ticket.page == 1 {
                    let locals: Vec<Comment> =
                        thread.comments.drain(..).filter(|c| c.is_local).collect();
                    thread.append_unique(incoming);
                    thread.comments.extend(locals);
                } else {
                    thread.append_unique(incoming);
                }
                thread.has_more = count >= page_size;
                thread.next_page = ticket.page.saturating_add(1);
                info!(item_id = %ticket.item_id, page = ticket.page, count, "comments loaded");
                CommentFetchOutcome::Applied { count }
            }
            Err(e) => match SyncError::from_fetch_error(&e) {
                SyncError::Cancelled => CommentFetchOutcome::Discarded,
                classified => {
                    let error = AppError::from(classified);
                    thread.error = Some(error.clone());
                    CommentFetchOutcome::Failed(error)
                }
            },
        }
    }

    /// Append an optimistic comment to its item's thread.
    pub fn insert_local(&mut self, comment: Comment) -> Result<(), StoreError> {
        let thread = self
            .threads
            .peek_mut(&comment.item_id)
            .ok_or_else(|| StoreError::NotFound(comment.item_id.to_string()))?;
        self.pending_posts.insert(comment.id.clone());
        thread.comments.push(comment);
        Ok(())
    }

    /// Stop tracking a post once the server answers. False when the post
    /// was never issued by this store.
    pub fn settle_post(&mut self, local_id: &CommentId) -> bool {
        self.pending_posts.remove(local_id)
    }

    /// Swap a local comment for the server's version, in place.
    pub fn confirm_local(
        &mut self,
        item_id: &ItemId,
        local_id: &CommentId,
        confirmed: Comment,
    ) -> Result<(), StoreError> {
        let thread = self
            .threads
            .peek_mut(item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        let index = thread
            .position(local_id)
            .ok_or_else(|| StoreError::NotFound(local_id.to_string()))?;

        if thread.position(&confirmed.id).is_some() {
            thread.comments.remove(index);
        } else {
            thread.comments[index] = Comment {
                is_local: false,
                ..confirmed
            };
        }
        Ok(())
    }

    /// Drop a local comment whose post failed.
    pub fn discard_local(&mut self, item_id: &ItemId, local_id: &CommentId) -> Result<Comment, StoreError> {
        let thread = self
            .threads
            .peek_mut(item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        let index = thread
            .position(local_id)
            .ok_or_else(|| StoreError::NotFound(local_id.to_string()))?;
        Ok(thread.comments.remove(index))
    }

    /// Remove a comment and its confirmed direct replies, remembering them
    /// until the delete settles. Local replies stay put: their own post
    /// result settles them.
    pub fn begin_delete(&mut self, id: &CommentId) -> Result<RemovedComments, StoreError> {
        let thread = self
            .threads
            .iter_mut()
            .map(|(_, thread)| thread)
            .find(|thread| thread.position(id).is_some())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let indices: Vec<usize> = thread
            .comments
            .iter()
            .enumerate()
            .filter(|(_, c)| &c.id == id || (c.parent_id.as_ref() == Some(id) && !c.is_local))
            .map(|(i, _)| i)
            .collect();

        let mut removed = Vec::with_capacity(indices.len());
        for &index in indices.iter().rev() {
            removed.push((index, thread.comments.remove(index)));
        }
        removed.reverse();

        let removed = RemovedComments {
            item_id: thread.item_id.clone(),
            removed,
        };
        self.pending_deletes.insert(id.clone(), removed.clone());
        Ok(removed)
    }

    /// Settle a delete. On failure the comments go back where they were.
    pub fn finish_delete(&mut self, id: &CommentId, succeeded: bool) -> Option<RemovedComments> {
        let removed = self.pending_deletes.remove(id)?;
        if !succeeded {
            if let Some(thread) = self.threads.peek_mut(&removed.item_id) {
                for (index, comment) in &removed.removed {
                    let at = (*index).min(thread.comments.len());
                    thread.comments.insert(at, comment.clone());
                }
            }
        }
        Some(removed)
    }

    #[must_use]
    pub fn find(&self, id: &CommentId) -> Option<&Comment> {
        self.threads.iter().find_map(|(_, thread)| thread.find(id))
    }

    #[must_use]
    pub fn thread(&self, item_id: &ItemId) -> Option<&CommentThread> {
        self.threads.peek(item_id)
    }

    #[must_use]
    pub fn active_item(&self) -> Option<&ItemId> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn active_thread(&self) -> Option<&CommentThread> {
        self.active.as_ref().and_then(|id| self.threads.peek(id))
    }

    /// Outstanding page request of the active thread.
    #[must_use]
    pub fn in_flight_ticket(&self) -> Option<CommentTicket> {
        self.active_thread().and_then(|t| t.in_flight.clone())
    }

    #[must_use]
    pub fn is_deleting(&self, id: &CommentId) -> bool {
        self.pending_deletes.contains_key(id)
    }

    #[must_use]
    pub fn cached_threads(&self) -> usize {
        self.threads.len()
    }
}

impl MutationTarget for CommentStore {
    fn read(&self, kind: MutationKind, entity_id: &str) -> Option<ToggleState> {
        if kind != MutationKind::CommentLike {
            return None;
        }
        self.find(&CommentId::new(entity_id))
            .map(|c| ToggleState::counted(c.is_liked, c.likes_count))
    }

    fn write(
        &mut self,
        kind: MutationKind,
        entity_id: &str,
        state: ToggleState,
    ) -> Result<(), StoreError> {
        if kind != MutationKind::CommentLike {
            return Err(StoreError::UnsupportedKind { kind });
        }
        let comment = self
            .threads
            .iter_mut()
            .find_map(|(_, thread)| thread.comments.iter_mut().find(|c| c.id.as_str() == entity_id))
            .ok_or_else(|| StoreError::NotFound(entity_id.to_string()))?;
        comment.is_liked = state.active;
        if let Some(count) = state.count {
            comment.likes_count = count;
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use crate::model::{Comment, CommentId, ItemId, UnixTimeMs, UserId};

    pub fn comment(id: &str, item: &str, parent: Option<&str>) -> Comment {
        Comment {
            id: CommentId::new(id),
            item_id: ItemId::new(item),
            author_id: UserId::new("author"),
            author_name: "Author".into(),
            text: format!("text {id}"),
            parent_id: parent.map(CommentId::new),
            likes_count: 1,
            is_liked: false,
            created_at: UnixTimeMs(1_700_000_000_000),
            is_local: false,
        }
    }
}
