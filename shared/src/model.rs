use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::comments::CommentStore;
use crate::config::{ConfigError, FeedConfig};
use crate::controller::FetchController;
use crate::error::AppError;
use crate::store::FeedStore;
use crate::tracker::MutationTracker;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(ItemId);
typed_id!(UserId);
typed_id!(CommentId);

const LOCAL_COMMENT_PREFIX: &str = "local-";

impl CommentId {
    /// Client-side id for a comment the server has not confirmed yet.
    #[must_use]
    pub fn local() -> Self {
        Self(format!("{LOCAL_COMMENT_PREFIX}{}", Uuid::new_v4()))
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_COMMENT_PREFIX)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        Self(get_current_time_ms())
    }
}

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

// --- Feed data ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub followers_count: u32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

/// Before/after pair. Opaque to the sync engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub before_url: String,
    pub after_url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FeedItem {
    pub id: ItemId,
    pub author: Author,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub service_category: Option<String>,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub comments_count: u32,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub is_saved: bool,
    #[serde(default)]
    pub is_following_author: bool,
    #[serde(default)]
    pub created_at: UnixTimeMs,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub item_id: ItemId,
    pub author_id: UserId,
    pub author_name: String,
    pub text: String,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub created_at: UnixTimeMs,
    /// Optimistic comment still waiting for the server.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_local: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeedSort {
    #[default]
    Recent,
    Popular,
    Trending,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FeedFilter {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sort: FeedSort,
    #[serde(default)]
    pub following_only: bool,
}

impl FeedFilter {
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub has_more: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CommentPage {
    pub comments: Vec<Comment>,
}

/// Flag plus optional counter: the value a toggle mutation flips.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToggleState {
    pub active: bool,
    pub count: Option<u32>,
}

impl ToggleState {
    #[must_use]
    pub const fn flag(active: bool) -> Self {
        Self {
            active,
            count: None,
        }
    }

    /// An active counted state always includes the viewer, so its count is
    /// at least one. This keeps a double toggle an exact round trip.
    #[must_use]
    pub const fn counted(active: bool, count: u32) -> Self {
        let count = if active && count == 0 { 1 } else { count };
        Self {
            active,
            count: Some(count),
        }
    }

    /// Flip the flag and move the counter by one, never below zero.
    #[must_use]
    pub fn toggled(self) -> Self {
        let count = self.count.map(|c| {
            if self.active {
                c.saturating_sub(1)
            } else {
                c.saturating_add(1)
            }
        });
        Self {
            active: !self.active,
            count,
        }
    }
}

// --- Toasts ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl ToastKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Success => 2000,
            Self::Warning => 4000,
            Self::Error => 5000,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ToastMessage {
    pub message: String,
    pub kind: ToastKind,
    pub created_at_ms: u64,
    pub duration_ms: u64,
}

impl ToastMessage {
    #[must_use]
    pub fn new(message: impl Into<String>, kind: ToastKind) -> Self {
        Self {
            message: message.into(),
            kind,
            created_at_ms: get_current_time_ms(),
            duration_ms: kind.default_duration_ms(),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.duration_ms
    }
}

// --- Session model ---

/// State of one feed session. Built fresh per session, never shared.
#[derive(Debug)]
pub struct Model {
    pub config: FeedConfig,
    pub viewer_id: Option<UserId>,
    pub feed: FeedStore,
    pub comments: CommentStore,
    pub mutations: MutationTracker,
    pub fetches: FetchController,
    pub active_error: Option<AppError>,
    pub active_toast: Option<ToastMessage>,
    pub view_timestamp_ms: u64,
}

impl Default for Model {
    fn default() -> Self {
        Self::from_valid_config(FeedConfig::default(), None)
    }
}

impl Model {
    pub fn with_config(config: FeedConfig, viewer_id: Option<UserId>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config, viewer_id))
    }

    fn from_valid_config(config: FeedConfig, viewer_id: Option<UserId>) -> Self {
        Self {
            feed: FeedStore::new(config.max_cached_items),
            comments: CommentStore::new(config.thread_capacity(), config.comment_page_size),
            mutations: MutationTracker::new(),
            fetches: FetchController::new(config.page_size, config.max_search_query_length),
            viewer_id,
            active_error: None,
            active_toast: None,
            view_timestamp_ms: get_current_time_ms(),
            config,
        }
    }

    pub fn update_timestamp(&mut self) {
        self.view_timestamp_ms = get_current_time_ms();
    }

    pub fn set_error(&mut self, error: AppError) {
        self.active_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.active_error = None;
    }

    pub fn show_toast(&mut self, message: impl Into<String>, kind: ToastKind) {
        self.active_toast = Some(ToastMessage::new(message, kind));
    }

    pub fn clear_toast(&mut self) {
        self.active_toast = None;
    }

    #[must_use]
    pub fn is_viewer(&self, user_id: &UserId) -> bool {
        self.viewer_id.as_ref() == Some(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn local_comment_ids_are_marked() {
        let id = CommentId::local();
        assert!(id.is_local());
        assert!(!CommentId::new("c-42").is_local());
        assert_ne!(CommentId::local(), id);
    }

    #[test]
    fn toggle_never_goes_negative() {
        let state = ToggleState {
            active: true,
            count: Some(0),
        };
        assert_eq!(state.toggled(), ToggleState::counted(false, 0));
    }

    #[test]
    fn active_count_is_at_least_one() {
        let state = ToggleState::counted(true, 0);
        assert_eq!(state.count, Some(1));
        assert_eq!(state.toggled().toggled(), state);
    }

    #[test]
    fn flag_toggle_has_no_counter() {
        assert_eq!(ToggleState::flag(false).toggled(), ToggleState::flag(true));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = FeedConfig {
            page_size: 0,
            ..FeedConfig::default()
        };
        assert!(Model::with_config(config, None).is_err());
    }

    #[test]
    fn item_deserializes_with_defaults() {
        let json = r#"{"id":"p1","author":{"id":"u1","display_name":"Ana"}}"#;
        let item: FeedItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.likes_count, 0);
        assert!(!item.is_liked);
        assert!(item.media.is_empty());
    }

    proptest! {
        #[test]
        fn double_toggle_is_identity(active in any::<bool>(), count in 0u32..u32::MAX) {
            let state = ToggleState::counted(active, count);
            prop_assert_eq!(state.toggled().toggled(), state);
        }
    }
}
