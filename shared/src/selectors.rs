//! Pure projections from [`Model`] to what the shell draws.
//!
//! Selectors never mutate and never look at in-flight results, so they see
//! either the state before an update or the state fully after it.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::controller::PageCursor;
use crate::model::{Comment, CommentId, FeedFilter, FeedItem, ItemId, MediaRef, Model};
use crate::tracker::MutationKind;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FeedItemView {
    pub id: ItemId,
    pub author_id: String,
    pub author_name: String,
    pub avatar_url: Option<String>,
    pub caption: Option<String>,
    pub service_category: Option<String>,
    pub media: Vec<MediaRef>,
    pub is_liked: bool,
    pub is_saved: bool,
    pub is_following_author: bool,
    pub is_own_post: bool,
    pub likes_label: String,
    pub comments_label: String,
    pub followers_label: String,
    pub time_ago: String,
    /// A toggle on this item or its author is waiting for the server.
    pub is_syncing: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedStatus {
    pub is_loading: bool,
    pub is_refreshing: bool,
    pub is_loading_more: bool,
    pub can_load_more: bool,
    pub show_empty_state: bool,
    pub show_initial_spinner: bool,
    pub show_footer_spinner: bool,
    pub error_message: Option<String>,
    pub page_number: u32,
    pub has_more: bool,
    pub search: Option<String>,
    pub filter: FeedFilter,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CommentView {
    pub id: CommentId,
    pub author_name: String,
    pub text: String,
    pub is_liked: bool,
    pub likes_label: String,
    pub time_ago: String,
    pub is_local: bool,
    pub is_syncing: bool,
    pub can_delete: bool,
    pub replies: Vec<CommentView>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CommentsView {
    pub item_id: ItemId,
    pub comments: Vec<CommentView>,
    pub total: usize,
    pub is_loading: bool,
    pub has_more: bool,
    pub error_message: Option<String>,
}

#[must_use]
pub fn feed_items(model: &Model) -> Vec<FeedItemView> {
    model
        .feed
        .get()
        .iter()
        .map(|item| feed_item(model, item))
        .collect()
}

fn feed_item(model: &Model, item: &FeedItem) -> FeedItemView {
    let tracker = &model.mutations;
    let is_syncing = tracker.is_pending(MutationKind::Like, item.id.as_str())
        || tracker.is_pending(MutationKind::Save, item.id.as_str())
        || tracker.is_pending(MutationKind::Follow, item.author.id.as_str());

    FeedItemView {
        id: item.id.clone(),
        author_id: item.author.id.to_string(),
        author_name: item.author.display_name.clone(),
        avatar_url: item.author.avatar_url.clone(),
        caption: item.caption.clone(),
        service_category: item.service_category.clone(),
        media: item.media.clone(),
        is_liked: item.is_liked,
        is_saved: item.is_saved,
        is_following_author: item.is_following_author,
        is_own_post: model.is_viewer(&item.author.id),
        likes_label: format_count(item.likes_count),
        comments_label: format_count(item.comments_count),
        followers_label: format_count(item.author.followers_count),
        time_ago: format_time_ago(item.created_at.0, model.view_timestamp_ms),
        is_syncing,
    }
}

#[must_use]
pub fn feed_status(model: &Model) -> FeedStatus {
    let fetches = &model.fetches;
    let loading = fetches.loading();
    let PageCursor {
        page_number,
        has_more,
    } = fetches.cursor();
    let is_empty = model.feed.is_empty();
    let error_message = fetches.error().map(|e| e.user_facing_message());

    FeedStatus {
        is_loading: loading.is_loading,
        is_refreshing: loading.is_refreshing,
        is_loading_more: loading.is_loading_more,
        can_load_more: has_more && !loading.any() && !is_empty,
        show_empty_state: is_empty && !loading.any() && error_message.is_none(),
        show_initial_spinner: loading.is_loading && is_empty,
        show_footer_spinner: loading.is_loading_more,
        error_message,
        page_number,
        has_more,
        search: fetches.query().search.clone(),
        filter: fetches.query().filter.clone(),
    }
}

#[must_use]
pub fn active_comments(model: &Model) -> Option<CommentsView> {
    let thread = model.comments.active_thread()?;
    Some(CommentsView {
        item_id: thread.item_id().clone(),
        comments: comment_tree(model, thread.comments()),
        total: thread.comments().len(),
        is_loading: thread.is_loading(),
        has_more: thread.has_more(),
        error_message: thread.error().map(|e| e.user_facing_message()),
    })
}

/// Nest replies under their parents. A reply whose parent is not loaded is
/// shown at the top level.
#[must_use]
pub fn comment_tree(model: &Model, comments: &[Comment]) -> Vec<CommentView> {
    let present: HashSet<&CommentId> = comments.iter().map(|c| &c.id).collect();
    let mut children: HashMap<&CommentId, Vec<&Comment>> = HashMap::new();
    let mut roots = Vec::new();

    for comment in comments {
        match &comment.parent_id {
            Some(parent) if present.contains(parent) && parent != &comment.id => {
                children.entry(parent).or_default().push(comment);
            }
            _ => roots.push(comment),
        }
    }

    roots
        .into_iter()
        .map(|c| comment_view(model, c, &children))
        .collect()
}

fn comment_view(
    model: &Model,
    comment: &Comment,
    children: &HashMap<&CommentId, Vec<&Comment>>,
) -> CommentView {
    let replies = children
        .get(&comment.id)
        .map(|replies| {
            replies
                .iter()
                .map(|reply| comment_view(model, reply, children))
                .collect()
        })
        .unwrap_or_default();

    CommentView {
        id: comment.id.clone(),
        author_name: comment.author_name.clone(),
        text: comment.text.clone(),
        is_liked: comment.is_liked,
        likes_label: format_count(comment.likes_count),
        time_ago: format_time_ago(comment.created_at.0, model.view_timestamp_ms),
        is_local: comment.is_local,
        is_syncing: comment.is_local
            || model
                .mutations
                .is_pending(MutationKind::CommentLike, comment.id.as_str()),
        can_delete: !comment.is_local && model.is_viewer(&comment.author_id),
        replies,
    }
}

/// Compact counter label: `999`, `1.2K`, `12K`, `3.4M`.
#[must_use]
pub fn format_count(count: u32) -> String {
    fn compact(value: u32, unit: u32, suffix: char) -> String {
        let whole = value / unit;
        let tenth = (value % unit) / (unit / 10);
        if whole >= 10 || tenth == 0 {
            format!("{whole}{suffix}")
        } else {
            format!("{whole}.{tenth}{suffix}")
        }
    }

    match count {
        0..=999 => count.to_string(),
        1_000..=999_999 => compact(count, 1_000, 'K'),
        _ => compact(count, 1_000_000, 'M'),
    }
}

#[must_use]
pub fn format_time_ago(timestamp_ms: u64, now_ms: u64) -> String {
    if timestamp_ms > now_ms {
        return "Just now".into();
    }

    let diff_secs = now_ms.saturating_sub(timestamp_ms) / 1000;
    if diff_secs < 60 {
        return "Just now".into();
    }

    let diff_mins = diff_secs / 60;
    if diff_mins < 60 {
        return format!("{diff_mins}m");
    }

    let diff_hours = diff_mins / 60;
    if diff_hours < 24 {
        return format!("{diff_hours}h");
    }

    let diff_days = diff_hours / 24;
    if diff_days < 7 {
        return format!("{diff_days}d");
    }
    if diff_days < 30 {
        return format!("{}w", diff_days / 7);
    }
    if diff_days < 365 {
        return format!("{}mo", diff_days / 30);
    }

    format!("{}y", diff_days / 365)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::testing::comment;
    use crate::controller::FetchMode;
    use crate::model::{ToggleState, UnixTimeMs, UserId};
    use crate::store::testing::item;
    use crate::tracker::MutationTarget;

    #[test]
    fn count_labels() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1K");
        assert_eq!(format_count(1_250), "1.2K");
        assert_eq!(format_count(12_900), "12K");
        assert_eq!(format_count(3_400_000), "3.4M");
        assert_eq!(format_count(u32::MAX), "4294M");
    }

    #[test]
    fn time_labels() {
        let now = 1_700_000_000_000;
        assert_eq!(format_time_ago(now, now), "Just now");
        assert_eq!(format_time_ago(now + 5_000, now), "Just now");
        assert_eq!(format_time_ago(now - 59_000, now), "Just now");
        assert_eq!(format_time_ago(now - 5 * 60_000, now), "5m");
        assert_eq!(format_time_ago(now - 3 * 3_600_000, now), "3h");
        assert_eq!(format_time_ago(now - 2 * 86_400_000, now), "2d");
        assert_eq!(format_time_ago(now - 14 * 86_400_000, now), "2w");
        assert_eq!(format_time_ago(now - 400 * 86_400_000, now), "1y");
    }

    #[test]
    fn pending_toggle_marks_item_syncing() {
        let mut model = Model::default();
        model.feed.replace_all(vec![item("a", "u1"), item("b", "u1"), item("c", "u2")]);
        model
            .mutations
            .begin(&mut model.feed, MutationKind::Follow, "u1", UnixTimeMs(0), ToggleState::toggled)
            .unwrap();

        let syncing: Vec<_> = feed_items(&model)
            .into_iter()
            .map(|v| (v.id.to_string(), v.is_syncing, v.followers_label))
            .collect();
        assert_eq!(
            syncing,
            vec![
                ("a".to_string(), true, "11".to_string()),
                ("b".to_string(), true, "11".to_string()),
                ("c".to_string(), false, "10".to_string()),
            ]
        );
    }

    #[test]
    fn status_flags_follow_fetch_state() {
        let mut model = Model::default();
        let status = feed_status(&model);
        assert!(status.show_empty_state);
        assert!(!status.can_load_more);

        let issued = model.fetches.fetch_page(1, FetchMode::Initial).unwrap().unwrap();
        let status = feed_status(&model);
        assert!(status.show_initial_spinner);
        assert!(!status.show_empty_state);

        model.fetches.complete(
            &issued.ticket,
            Ok(crate::model::FeedPage {
                items: vec![item("a", "u1")],
                has_more: true,
            }),
            &mut model.feed,
        );
        let status = feed_status(&model);
        assert!(status.can_load_more);
        assert!(!status.show_initial_spinner);
        assert_eq!(status.page_number, 2);

        model.fetches.fetch_page(2, FetchMode::LoadMore).unwrap();
        let status = feed_status(&model);
        assert!(status.show_footer_spinner);
        assert!(!status.can_load_more);
    }

    #[test]
    fn replies_nest_and_orphans_promote() {
        let mut model = Model::default();
        model.viewer_id = Some(UserId::new("author"));
        let comments = vec![
            comment("c1", "p1", None),
            comment("r1", "p1", Some("c1")),
            comment("r2", "p1", Some("missing")),
            comment("rr", "p1", Some("r1")),
        ];
        let tree = comment_tree(&model, &comments);
        let top: Vec<_> = tree.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(top, vec!["c1", "r2"]);
        assert_eq!(tree[0].replies[0].id, CommentId::new("r1"));
        assert_eq!(tree[0].replies[0].replies[0].id, CommentId::new("rr"));
        assert!(tree[0].can_delete);
    }

    #[test]
    fn comment_like_marks_syncing() {
        let mut model = Model::default();
        let ticket = model.comments.open(ItemId::new("p1")).unwrap();
        model.comments.complete_fetch(
            &ticket,
            Ok(crate::model::CommentPage {
                comments: vec![comment("c1", "p1", None)],
            }),
        );
        assert_eq!(
            model.comments.read(MutationKind::CommentLike, "c1"),
            Some(ToggleState::counted(false, 1))
        );
        model
            .mutations
            .begin(
                &mut model.comments,
                MutationKind::CommentLike,
                "c1",
                UnixTimeMs(0),
                ToggleState::toggled,
            )
            .unwrap();

        let view = active_comments(&model).unwrap();
        assert_eq!(view.total, 1);
        assert!(view.comments[0].is_syncing);
        assert!(view.comments[0].is_liked);
        assert_eq!(view.comments[0].likes_label, "2");
    }
}
