//! Capabilities the core asks the shell to perform.
//!
//! Crux's built-in Render is all the shell needs to redraw; everything
//! remote goes through the typed [`FeedApi`].

mod feed_api;

pub use self::feed_api::{
    FeedApi, FeedApiError, FeedApiResult, FeedOperation, FeedOutput, FeedRequest, MutationRequest,
};
pub use crux_core::render::Render;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
#[effect(app = "App")]
pub struct Capabilities {
    pub feed_api: FeedApi<Event>,
    pub render: Render<Event>,
}
