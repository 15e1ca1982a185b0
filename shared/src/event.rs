use serde::{Deserialize, Serialize};

use crate::capabilities::FeedApiError;
use crate::comments::CommentTicket;
use crate::config::FeedConfig;
use crate::controller::{FetchMode, FetchTicket};
use crate::model::{Comment, CommentId, CommentPage, FeedFilter, FeedPage, ItemId, UserId};
use crate::tracker::MutationTicket;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    SessionStarted {
        viewer_id: Option<UserId>,
        #[serde(default)]
        config: FeedConfig,
    },

    // --- Feed fetching ---
    FetchPage {
        page: u32,
        mode: FetchMode,
    },
    Refresh,
    LoadMore,
    Search {
        query: String,
    },
    UpdateFilter {
        filter: FeedFilter,
    },
    CancelFetch,

    // --- Optimistic toggles ---
    ToggleLike {
        item_id: ItemId,
    },
    ToggleSave {
        item_id: ItemId,
    },
    ToggleFollow {
        user_id: UserId,
    },

    // --- Comments ---
    OpenComments {
        item_id: ItemId,
    },
    CloseComments,
    LoadMoreComments,
    AddComment {
        text: String,
        #[serde(default)]
        parent_id: Option<CommentId>,
    },
    DeleteComment {
        comment_id: CommentId,
    },
    ToggleCommentLike {
        comment_id: CommentId,
    },

    DismissError,
    DismissToast,

    // --- Continuations, never sent by the shell ---
    #[serde(skip)]
    PageFetched {
        ticket: FetchTicket,
        result: Box<Result<FeedPage, FeedApiError>>,
    },
    #[serde(skip)]
    MutationSettled {
        ticket: MutationTicket,
        result: Result<(), FeedApiError>,
    },
    #[serde(skip)]
    CommentsFetched {
        ticket: CommentTicket,
        result: Box<Result<CommentPage, FeedApiError>>,
    },
    #[serde(skip)]
    CommentPosted {
        item_id: ItemId,
        local_id: CommentId,
        result: Box<Result<Comment, FeedApiError>>,
    },
    #[serde(skip)]
    CommentDeleteSettled {
        comment_id: CommentId,
        result: Result<(), FeedApiError>,
    },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::FetchPage { .. } => "fetch_page",
            Self::Refresh => "refresh",
            Self::LoadMore => "load_more",
            Self::Search { .. } => "search",
            Self::UpdateFilter { .. } => "update_filter",
            Self::CancelFetch => "cancel_fetch",
            Self::ToggleLike { .. } => "toggle_like",
            Self::ToggleSave { .. } => "toggle_save",
            Self::ToggleFollow { .. } => "toggle_follow",
            Self::OpenComments { .. } => "open_comments",
            Self::CloseComments => "close_comments",
            Self::LoadMoreComments => "load_more_comments",
            Self::AddComment { .. } => "add_comment",
            Self::DeleteComment { .. } => "delete_comment",
            Self::ToggleCommentLike { .. } => "toggle_comment_like",
            Self::DismissError => "dismiss_error",
            Self::DismissToast => "dismiss_toast",
            Self::PageFetched { .. } => "page_fetched",
            Self::MutationSettled { .. } => "mutation_settled",
            Self::CommentsFetched { .. } => "comments_fetched",
            Self::CommentPosted { .. } => "comment_posted",
            Self::CommentDeleteSettled { .. } => "comment_delete_settled",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        !matches!(
            self,
            Self::PageFetched { .. }
                | Self::MutationSettled { .. }
                | Self::CommentsFetched { .. }
                | Self::CommentPosted { .. }
                | Self::CommentDeleteSettled { .. }
        )
    }
}
