#![allow(dead_code)]

use crux_core::testing::AppTester;
use feed_core::tracker::{MutationKey, MutationTicket};
use feed_core::{
    App, Author, Effect, Event, FeedConfig, FeedItem, FeedOperation, FeedPage, FetchTicket,
    ItemId, Model, MutationAction, MutationKind, UnixTimeMs, UserId,
};

pub type Tester = AppTester<App, Effect>;

pub fn item(id: &str, author: &str) -> FeedItem {
    FeedItem {
        id: ItemId::new(id),
        author: Author {
            id: UserId::new(author),
            display_name: format!("{author} name"),
            avatar_url: None,
            followers_count: 10,
        },
        caption: None,
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

pub fn feed_ops(effects: &[Effect]) -> Vec<FeedOperation> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::FeedApi(request) => Some(request.operation.clone()),
            _ => None,
        })
        .collect()
}

pub fn renders(effects: &[Effect]) -> bool {
    effects.iter().any(|e| matches!(e, Effect::Render(_)))
}

/// Start a session as `viewer` and return the initial fetch ticket.
pub fn start(app: &Tester, model: &mut Model, viewer: &str) -> FetchTicket {
    app.update(
        Event::SessionStarted {
            viewer_id: Some(UserId::new(viewer)),
            config: FeedConfig::default(),
        },
        model,
    );
    model.fetches.active().cloned().expect("initial fetch issued")
}

pub fn deliver_page(
    app: &Tester,
    model: &mut Model,
    ticket: FetchTicket,
    items: Vec<FeedItem>,
    has_more: bool,
) -> Vec<Effect> {
    app.update(
        Event::PageFetched {
            ticket,
            result: Box::new(Ok(FeedPage { items, has_more })),
        },
        model,
    )
    .effects
}

/// Start a session and load one page of `items`.
pub fn loaded(app: &Tester, items: Vec<FeedItem>, has_more: bool) -> Model {
    let mut model = Model::default();
    let ticket = start(app, &mut model, "viewer");
    deliver_page(app, &mut model, ticket, items, has_more);
    model
}

/// Ticket of the live mutation on `kind:entity_id`.
pub fn live_ticket(model: &Model, kind: MutationKind, entity_id: &str) -> MutationTicket {
    let key = MutationKey::new(kind, entity_id);
    let pending = model.mutations.get(&key).expect("mutation pending");
    MutationTicket {
        key,
        kind,
        entity_id: entity_id.to_string(),
        seq: pending.seq,
        action: MutationAction::for_state(pending.optimistic),
    }
}

pub fn find<'a>(model: &'a Model, id: &str) -> &'a FeedItem {
    model.feed.find(&ItemId::new(id)).expect("item loaded")
}
