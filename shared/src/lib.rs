// lib.rs - Optimistic feed sync core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod comments;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod model;
pub mod selectors;
pub mod store;
pub mod tracker;

pub use app::{App, ToastView, UserFacingError, ViewModel};
pub use capabilities::{
    Capabilities, Effect, FeedApiError, FeedOperation, FeedOutput, FeedRequest, MutationRequest,
};
pub use config::{ConfigError, FeedConfig};
pub use controller::{FetchMode, FetchTicket, PageCursor};
pub use crux_core::{render::Render, App as CruxApp};
pub use error::{AppError, ErrorKind, ErrorSeverity, SyncError, SyncResult};
pub use event::Event;
pub use model::{
    Author, Comment, CommentId, CommentPage, FeedFilter, FeedItem, FeedPage, FeedSort, ItemId,
    Model, ToastKind, ToggleState, UnixTimeMs, UserId,
};
pub use tracker::{MutationAction, MutationKind};
