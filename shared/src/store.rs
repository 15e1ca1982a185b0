//! Canonical in-memory feed collection.
//!
//! Every write goes through the narrow API below and completes fully before
//! returning. A missing item is reported as [`StoreError::NotFound`]; callers
//! treat that as a no-op since the item may have left the page window.

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::model::{FeedItem, ItemId, ToggleState, UserId};
use crate::tracker::{MutationKind, MutationTarget};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("{kind} mutations are not supported by this store")]
    UnsupportedKind { kind: MutationKind },
}

#[derive(Debug, Clone)]
pub struct FeedStore {
    items: Vec<FeedItem>,
    max_items: usize,
}

impl FeedStore {
    #[must_use]
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            max_items: max_items.max(1),
        }
    }

    #[must_use]
    pub fn get(&self) -> &[FeedItem] {
        &self.items
    }

    #[must_use]
    pub fn find(&self, id: &ItemId) -> Option<&FeedItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the whole collection. Later duplicates of an id are dropped.
    pub fn replace_all(&mut self, items: Vec<FeedItem>) {
        let mut seen = HashSet::with_capacity(items.len());
        self.items = items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect();
        self.enforce_window();
    }

    /// Append a page. Ids already present are updated in place rather than
    /// duplicated. Returns how many new items were added.
    pub fn append_page(&mut self, items: Vec<FeedItem>) -> usize {
        let mut added = 0;
        for item in items {
            if let Some(existing) = self.items.iter_mut().find(|i| i.id == item.id) {
                *existing = item;
            } else {
                self.items.push(item);
                added += 1;
            }
        }
        self.enforce_window();
        added
    }

    pub fn patch_by_id<F>(&mut self, id: &ItemId, patch: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut FeedItem),
    {
        let item = self
            .items
            .iter_mut()
            .find(|item| &item.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch(item);
        Ok(())
    }

    /// Apply `patch` to every item by `author`. Returns the number patched.
    pub fn patch_by_author<F>(&mut self, author: &UserId, mut patch: F) -> Result<usize, StoreError>
    where
        F: FnMut(&mut FeedItem),
    {
        let mut patched = 0;
        for item in self.items.iter_mut().filter(|item| &item.author.id == author) {
            patch(item);
            patched += 1;
        }
        if patched == 0 {
            return Err(StoreError::NotFound(author.to_string()));
        }
        Ok(patched)
    }

    pub fn remove_by_id(&mut self, id: &ItemId) -> Result<FeedItem, StoreError> {
        let index = self
            .items
            .iter()
            .position(|item| &item.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(self.items.remove(index))
    }

    fn enforce_window(&mut self) {
        if self.items.len() > self.max_items {
            let overflow = self.items.len() - self.max_items;
            self.items.drain(..overflow);
            debug!(trimmed = overflow, kept = self.items.len(), "trimmed feed window");
        }
    }
}

impl MutationTarget for FeedStore {
    fn read(&self, kind: MutationKind, entity_id: &str) -> Option<ToggleState> {
        match kind {
            MutationKind::Like => self
                .items
                .iter()
                .find(|i| i.id.as_str() == entity_id)
                .map(|i| ToggleState::counted(i.is_liked, i.likes_count)),
            MutationKind::Save => self
                .items
                .iter()
                .find(|i| i.id.as_str() == entity_id)
                .map(|i| ToggleState::flag(i.is_saved)),
            MutationKind::Follow => self
                .items
                .iter()
                .find(|i| i.author.id.as_str() == entity_id)
                .map(|i| ToggleState::counted(i.is_following_author, i.author.followers_count)),
            MutationKind::CommentLike => None,
        }
    }

    fn write(
        &mut self,
        kind: MutationKind,
        entity_id: &str,
        state: ToggleState,
    ) -> Result<(), StoreError> {
        match kind {
            MutationKind::Like => self.patch_by_id(&ItemId::new(entity_id), |item| {
                item.is_liked = state.active;
                if let Some(count) = state.count {
                    item.likes_count = count;
                }
            }),
            MutationKind::Save => self.patch_by_id(&ItemId::new(entity_id), |item| {
                item.is_saved = state.active;
            }),
            MutationKind::Follow => self
                .patch_by_author(&UserId::new(entity_id), |item| {
                    item.is_following_author = state.active;
                    if let Some(count) = state.count {
                        item.author.followers_count = count;
                    }
                })
                .map(|_| ()),
            MutationKind::CommentLike => Err(StoreError::UnsupportedKind { kind }),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use crate::model::{Author, FeedItem, ItemId, UnixTimeMs, UserId};

    pub fn item(id: &str, author: &str) -> FeedItem {
        FeedItem {
            id: ItemId::new(id),
            author: Author {
                id: UserId::new(author),
                display_name: format!("{author} name"),
                avatar_url: None,
                followers_count: 10,
            },
            caption: Some(format!("caption {id}")),
            service_category: Some("hair".into()),
            media: Vec::new(),
            likes_count: 5,
            comments_count: 2,
            is_liked: false,
            is_saved: false,
            is_following_author: false,
            created_at: UnixTimeMs(1_700_000_000_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::item;
    use super::*;

    #[test]
    fn replace_all_drops_duplicate_ids() {
        let mut store = FeedStore::new(100);
        store.replace_all(vec![item("a", "u1"), item("b", "u1"), item("a", "u2")]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get()[0].author.id, UserId::new("u1"));
    }

    #[test]
    fn append_updates_existing_in_place() {
        let mut store = FeedStore::new(100);
        store.replace_all(vec![item("a", "u1"), item("b", "u1")]);
        let mut updated = item("a", "u1");
        updated.likes_count = 99;
        let added = store.append_page(vec![updated, item("c", "u2")]);
        assert_eq!(added, 1);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get()[0].likes_count, 99);
        assert_eq!(store.get()[2].id, ItemId::new("c"));
    }

    #[test]
    fn window_trims_oldest() {
        let mut store = FeedStore::new(3);
        store.replace_all(vec![item("a", "u"), item("b", "u")]);
        store.append_page(vec![item("c", "u"), item("d", "u")]);
        let ids: Vec<_> = store.get().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
    }

    #[test]
    fn patch_missing_is_not_found() {
        let mut store = FeedStore::new(10);
        let result = store.patch_by_id(&ItemId::new("nope"), |i| i.is_saved = true);
        assert_eq!(result, Err(StoreError::NotFound("nope".into())));
    }

    #[test]
    fn remove_returns_item() {
        let mut store = FeedStore::new(10);
        store.replace_all(vec![item("a", "u"), item("b", "u")]);
        let removed = store.remove_by_id(&ItemId::new("a")).unwrap();
        assert_eq!(removed.id, ItemId::new("a"));
        assert_eq!(store.len(), 1);
        assert!(store.remove_by_id(&ItemId::new("a")).is_err());
    }

    #[test]
    fn follow_writes_every_item_by_author() {
        let mut store = FeedStore::new(10);
        store.replace_all(vec![item("a", "u1"), item("b", "u2"), item("c", "u1")]);
        store
            .write(MutationKind::Follow, "u1", ToggleState::counted(true, 11))
            .unwrap();
        let following: Vec<_> = store
            .get()
            .iter()
            .map(|i| (i.id.as_str(), i.is_following_author, i.author.followers_count))
            .collect();
        assert_eq!(
            following,
            vec![("a", true, 11), ("b", false, 10), ("c", true, 11)]
        );
    }

    #[test]
    fn comment_likes_are_unsupported() {
        let mut store = FeedStore::new(10);
        store.replace_all(vec![item("a", "u1")]);
        assert_eq!(store.read(MutationKind::CommentLike, "a"), None);
        assert!(matches!(
            store.write(MutationKind::CommentLike, "a", ToggleState::flag(true)),
            Err(StoreError::UnsupportedKind { .. })
        ));
    }
}
