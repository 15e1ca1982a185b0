use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::capabilities::{Capabilities, FeedApiError, MutationRequest};
use crate::comments::{CommentFetchOutcome, CommentTicket};
use crate::config::FeedConfig;
use crate::controller::{FetchMode, FetchOutcome};
use crate::error::{AppError, ErrorKind, ErrorSeverity, SyncError, SyncResult};
use crate::event::Event;
use crate::model::{
    Comment, CommentId, ItemId, Model, ToastKind, ToastMessage, ToggleState, UnixTimeMs, UserId,
};
use crate::selectors::{self, CommentsView, FeedItemView, FeedStatus};
use crate::store::StoreError;
use crate::tracker::{MutationKind, MutationOutcome, Resolution};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub is_transient: bool,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_transient: e.severity == ErrorSeverity::Transient,
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToastView {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl From<&ToastMessage> for ToastView {
    fn from(t: &ToastMessage) -> Self {
        Self {
            message: t.message.clone(),
            kind: t.kind,
            duration_ms: t.duration_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub items: Vec<FeedItemView>,
    pub status: FeedStatus,
    pub comments: Option<CommentsView>,
    pub error: Option<UserFacingError>,
    pub toast: Option<ToastView>,
    pub pending_mutations: usize,
    pub viewer_id: Option<String>,
}

#[derive(Default)]
pub struct App;

impl App {
    /// Replace the session. Request counters carry over so continuations
    /// from the previous session can never match a new ticket.
    fn start_session(
        model: &mut Model,
        viewer_id: Option<UserId>,
        config: FeedConfig,
        caps: &Capabilities,
    ) -> bool {
        let mut next = match Model::with_config(config, viewer_id) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "rejected session config");
                model.set_error(
                    AppError::new(ErrorKind::Validation, "Invalid feed configuration")
                        .with_internal(e.to_string()),
                );
                return true;
            }
        };

        if let Some(old) = model.fetches.cancel() {
            caps.feed_api.cancel_fetch(old.generation);
        }
        next.fetches.resume_from(&model.fetches);
        next.comments.resume_from(&model.comments);
        next.mutations.resume_from(&model.mutations);
        *model = next;

        info!(viewer = ?model.viewer_id, page_size = model.config.page_size, "feed session started");
        Self::issue_fetch(model, caps, 1, FetchMode::Initial);
        true
    }

    fn issue_fetch(model: &mut Model, caps: &Capabilities, page: u32, mode: FetchMode) -> bool {
        match model.fetches.fetch_page(page, mode) {
            Ok(Some(issued)) => {
                if let Some(old) = issued.superseded {
                    caps.feed_api.cancel_fetch(old.generation);
                }
                let ticket = issued.ticket;
                caps.feed_api.fetch_feed(issued.request, move |result| Event::PageFetched {
                    ticket,
                    result: Box::new(result),
                });
                true
            }
            Ok(None) => false,
            Err(e) => Self::report(model, e),
        }
    }

    fn begin_toggle(
        model: &mut Model,
        caps: &Capabilities,
        kind: MutationKind,
        entity_id: &str,
    ) -> bool {
        let now = UnixTimeMs::now();
        let begun = match kind {
            MutationKind::CommentLike => {
                model
                    .mutations
                    .begin(&mut model.comments, kind, entity_id, now, ToggleState::toggled)
            }
            MutationKind::Like | MutationKind::Save | MutationKind::Follow => {
                model
                    .mutations
                    .begin(&mut model.feed, kind, entity_id, now, ToggleState::toggled)
            }
        };

        match begun {
            Ok(ticket) => {
                let request = MutationRequest::new(kind, ticket.entity_id.clone(), ticket.action);
                caps.feed_api.mutate(request, move |result| Event::MutationSettled {
                    ticket,
                    result,
                });
                true
            }
            Err(StoreError::NotFound(id)) => {
                debug!(%kind, %id, "toggle target not loaded");
                false
            }
            Err(e) => {
                warn!(%kind, error = %e, "toggle rejected by store");
                false
            }
        }
    }

    fn settle_mutation(
        model: &mut Model,
        ticket: &crate::tracker::MutationTicket,
        result: Result<(), FeedApiError>,
    ) -> bool {
        let outcome = if result.is_ok() {
            MutationOutcome::Success
        } else {
            MutationOutcome::Failure
        };
        let resolution = match ticket.kind {
            MutationKind::CommentLike => {
                model.mutations.resolve(&mut model.comments, ticket, outcome)
            }
            MutationKind::Like | MutationKind::Save | MutationKind::Follow => {
                model.mutations.resolve(&mut model.feed, ticket, outcome)
            }
        };

        match (resolution, result) {
            (Resolution::Committed, _) => true,
            (Resolution::RolledBack { applied, .. }, Err(e)) => {
                let error = AppError::from(SyncError::from_mutation_error(&e));
                info!(kind = %ticket.kind, code = error.code(), applied, "mutation failed");
                model.show_toast(error.user_facing_message(), ToastKind::Error);
                true
            }
            (Resolution::RolledBack { .. }, Ok(())) => true,
            (Resolution::Superseded | Resolution::Stale, _) => false,
        }
    }

    fn fetch_comments(model: &Model, caps: &Capabilities, ticket: CommentTicket) {
        caps.feed_api.fetch_comments(
            ticket.item_id.clone(),
            ticket.page,
            model.config.comment_page_size,
            move |result| Event::CommentsFetched {
                ticket,
                result: Box::new(result),
            },
        );
    }

    fn validate_comment(
        model: &Model,
        text: &str,
        parent_id: Option<&CommentId>,
    ) -> SyncResult<(ItemId, UserId, String)> {
        let item_id = model
            .comments
            .active_item()
            .cloned()
            .ok_or_else(|| SyncError::validation("Open a post to comment on it"))?;
        let viewer = model
            .viewer_id
            .clone()
            .ok_or_else(|| SyncError::validation("Sign in to comment"))?;

        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::validation("Comment cannot be empty"));
        }
        let max = model.config.max_comment_length;
        if text.chars().count() > max {
            return Err(SyncError::validation(format!(
                "Comments are limited to {max} characters"
            )));
        }

        if let Some(parent) = parent_id {
            if parent.is_local() {
                return Err(SyncError::validation(
                    "Wait for that comment to post before replying",
                ));
            }
            let exists = model
                .comments
                .thread(&item_id)
                .and_then(|thread| thread.find(parent))
                .is_some();
            if !exists {
                return Err(SyncError::validation("That comment is no longer available"));
            }
        }

        Ok((item_id, viewer, text.to_string()))
    }

    fn add_comment(
        model: &mut Model,
        caps: &Capabilities,
        text: &str,
        parent_id: Option<CommentId>,
    ) -> bool {
        let (item_id, viewer, text) = match Self::validate_comment(model, text, parent_id.as_ref())
        {
            Ok(valid) => valid,
            Err(e) => return Self::report(model, e),
        };

        let local = Comment {
            id: CommentId::local(),
            item_id: item_id.clone(),
            author_id: viewer,
            author_name: "You".into(),
            text: text.clone(),
            parent_id: parent_id.clone(),
            likes_count: 0,
            is_liked: false,
            created_at: UnixTimeMs::now(),
            is_local: true,
        };
        let local_id = local.id.clone();
        if let Err(e) = model.comments.insert_local(local) {
            warn!(error = %e, "could not insert local comment");
            return false;
        }
        Self::adjust_comment_count(model, &item_id, 1);

        debug!(%item_id, %local_id, "posting comment");
        caps.feed_api
            .post_comment(item_id.clone(), text, parent_id, move |result| {
                Event::CommentPosted {
                    item_id,
                    local_id,
                    result: Box::new(result),
                }
            });
        true
    }

    fn comment_posted(
        model: &mut Model,
        item_id: &ItemId,
        local_id: &CommentId,
        result: Result<Comment, FeedApiError>,
    ) -> bool {
        if !model.comments.settle_post(local_id) {
            debug!(%local_id, "post result from an earlier session");
            return false;
        }
        match result {
            Ok(confirmed) => match model.comments.confirm_local(item_id, local_id, confirmed) {
                Ok(()) => true,
                Err(e) => {
                    debug!(error = %e, "posted comment no longer cached");
                    false
                }
            },
            Err(e) => {
                if let Err(missing) = model.comments.discard_local(item_id, local_id) {
                    debug!(error = %missing, "failed comment no longer cached");
                }
                Self::adjust_comment_count(model, item_id, -1);
                let error = AppError::from(SyncError::from_mutation_error(&e));
                info!(%item_id, code = error.code(), "comment post failed");
                model.show_toast(
                    format!("Couldn't post your comment. {}", error.user_facing_message()),
                    ToastKind::Error,
                );
                true
            }
        }
    }

    fn delete_comment(model: &mut Model, caps: &Capabilities, comment_id: CommentId) -> bool {
        if comment_id.is_local() {
            return Self::report(
                model,
                SyncError::validation("Wait for that comment to post before deleting it"),
            );
        }
        if model.comments.is_deleting(&comment_id) {
            return false;
        }
        let Some(comment) = model.comments.find(&comment_id) else {
            debug!(%comment_id, "delete target not loaded");
            return false;
        };
        if !model.is_viewer(&comment.author_id) {
            return Self::report(
                model,
                SyncError::validation("You can only delete your own comments"),
            );
        }

        match model.comments.begin_delete(&comment_id) {
            Ok(removed) => {
                let delta = i64::from(removed.count());
                Self::adjust_comment_count(model, &removed.item_id, -delta);
                caps.feed_api.delete_comment(comment_id.clone(), move |result| {
                    Event::CommentDeleteSettled { comment_id, result }
                });
                true
            }
            Err(e) => {
                debug!(error = %e, "delete target vanished");
                false
            }
        }
    }

    fn comment_delete_settled(
        model: &mut Model,
        comment_id: &CommentId,
        result: Result<(), FeedApiError>,
    ) -> bool {
        let succeeded = result.is_ok();
        let Some(removed) = model.comments.finish_delete(comment_id, succeeded) else {
            return false;
        };
        match result {
            Ok(()) => false,
            Err(e) => {
                Self::adjust_comment_count(model, &removed.item_id, i64::from(removed.count()));
                let error = AppError::from(SyncError::from_mutation_error(&e));
                info!(%comment_id, code = error.code(), "comment delete failed");
                model.show_toast(
                    format!("Couldn't delete the comment. {}", error.user_facing_message()),
                    ToastKind::Error,
                );
                true
            }
        }
    }

    fn adjust_comment_count(model: &mut Model, item_id: &ItemId, delta: i64) {
        let patched = model.feed.patch_by_id(item_id, |item| {
            let next = i64::from(item.comments_count).saturating_add(delta).max(0);
            item.comments_count = u32::try_from(next).unwrap_or(u32::MAX);
        });
        if let Err(e) = patched {
            debug!(error = %e, "comment count not patched");
        }
    }

    /// Surface a failure raised before any network call.
    fn report(model: &mut Model, error: SyncError) -> bool {
        if error.is_silent() {
            return false;
        }
        debug!(%error, "rejected action");
        let error = AppError::from(error);
        model.show_toast(error.user_facing_message(), ToastKind::Warning);
        true
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    #[instrument(level = "debug", skip_all, fields(event = event.name()))]
    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        model.update_timestamp();

        if event.is_user_initiated() {
            debug!(event = event.name(), "user action");
        }

        let changed = match event {
            Event::SessionStarted { viewer_id, config } => {
                Self::start_session(model, viewer_id, config, caps)
            }

            Event::FetchPage { page, mode } => Self::issue_fetch(model, caps, page, mode),
            Event::Refresh => Self::issue_fetch(model, caps, 1, FetchMode::Refresh),
            Event::LoadMore => {
                let page = model.fetches.cursor().page_number;
                Self::issue_fetch(model, caps, page, FetchMode::LoadMore)
            }
            Event::Search { query } => Self::issue_fetch(model, caps, 1, FetchMode::Search(query)),
            Event::UpdateFilter { filter } => {
                Self::issue_fetch(model, caps, 1, FetchMode::Filter(filter))
            }
            Event::CancelFetch => match model.fetches.cancel() {
                Some(ticket) => {
                    caps.feed_api.cancel_fetch(ticket.generation);
                    true
                }
                None => false,
            },

            Event::PageFetched { ticket, result } => {
                let was_current = model.fetches.is_current(&ticket);
                match model.fetches.complete(&ticket, *result, &mut model.feed) {
                    FetchOutcome::Replaced { .. } | FetchOutcome::Appended { .. } => {
                        model.mutations.reapply(&mut model.feed);
                        true
                    }
                    FetchOutcome::Failed(_) => true,
                    FetchOutcome::Discarded => was_current,
                }
            }

            Event::ToggleLike { item_id } => {
                Self::begin_toggle(model, caps, MutationKind::Like, item_id.as_str())
            }
            Event::ToggleSave { item_id } => {
                Self::begin_toggle(model, caps, MutationKind::Save, item_id.as_str())
            }
            Event::ToggleFollow { user_id } => {
                if model.is_viewer(&user_id) {
                    Self::report(model, SyncError::validation("You can't follow yourself"))
                } else {
                    Self::begin_toggle(model, caps, MutationKind::Follow, user_id.as_str())
                }
            }
            Event::MutationSettled { ticket, result } => {
                Self::settle_mutation(model, &ticket, result)
            }

            Event::OpenComments { item_id } => {
                if let Some(ticket) = model.comments.open(item_id) {
                    Self::fetch_comments(model, caps, ticket);
                }
                true
            }
            Event::CloseComments => {
                model.comments.close();
                true
            }
            Event::LoadMoreComments => match model.comments.load_more() {
                Some(ticket) => {
                    Self::fetch_comments(model, caps, ticket);
                    true
                }
                None => false,
            },
            Event::CommentsFetched { ticket, result } => {
                match model.comments.complete_fetch(&ticket, *result) {
                    CommentFetchOutcome::Applied { .. } => {
                        model.mutations.reapply(&mut model.comments);
                        true
                    }
                    CommentFetchOutcome::Failed(_) => true,
                    CommentFetchOutcome::Discarded => false,
                }
            }
            Event::AddComment { text, parent_id } => {
                Self::add_comment(model, caps, &text, parent_id)
            }
            Event::CommentPosted {
                item_id,
                local_id,
                result,
            } => Self::comment_posted(model, &item_id, &local_id, *result),
            Event::DeleteComment { comment_id } => Self::delete_comment(model, caps, comment_id),
            Event::CommentDeleteSettled { comment_id, result } => {
                Self::comment_delete_settled(model, &comment_id, result)
            }
            Event::ToggleCommentLike { comment_id } => {
                if comment_id.is_local() {
                    Self::report(
                        model,
                        SyncError::validation("Wait for that comment to post before liking it"),
                    )
                } else {
                    Self::begin_toggle(model, caps, MutationKind::CommentLike, comment_id.as_str())
                }
            }

            Event::DismissError => {
                model.clear_error();
                model.fetches.clear_error();
                true
            }
            Event::DismissToast => {
                model.clear_toast();
                true
            }
        };

        if changed {
            caps.render.render();
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        ViewModel {
            items: selectors::feed_items(model),
            status: selectors::feed_status(model),
            comments: selectors::active_comments(model),
            error: model.active_error.as_ref().map(UserFacingError::from),
            toast: model
                .active_toast
                .as_ref()
                .filter(|t| !t.is_expired(model.view_timestamp_ms))
                .map(ToastView::from),
            pending_mutations: model.mutations.len(),
            viewer_id: model.viewer_id.as_ref().map(ToString::to_string),
        }
    }
}
