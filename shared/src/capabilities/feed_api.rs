//! Typed access to the remote feed service.
//!
//! The core never builds URLs or touches sockets. Each operation is handed
//! to the shell, which performs the call and resolves the request with a
//! [`FeedApiResult`].

use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Comment, CommentId, CommentPage, FeedFilter, FeedPage, ItemId};
use crate::tracker::{MutationAction, MutationKind};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FeedRequest {
    /// Echoed by the shell so it can abort a superseded request.
    pub generation: u64,
    pub page: u32,
    pub page_size: u32,
    pub filter: FeedFilter,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MutationRequest {
    pub kind: MutationKind,
    pub entity_id: String,
    pub action: MutationAction,
    /// Lets the server drop a replayed request.
    pub idempotency_key: Uuid,
}

impl MutationRequest {
    #[must_use]
    pub fn new(kind: MutationKind, entity_id: impl Into<String>, action: MutationAction) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
            action,
            idempotency_key: Uuid::new_v4(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum FeedOperation {
    FetchFeed(FeedRequest),
    CancelFetch {
        generation: u64,
    },
    Mutate(MutationRequest),
    FetchComments {
        item_id: ItemId,
        page: u32,
        page_size: u32,
    },
    PostComment {
        item_id: ItemId,
        text: String,
        parent_id: Option<CommentId>,
    },
    DeleteComment {
        comment_id: CommentId,
    },
}

impl Operation for FeedOperation {
    type Output = FeedApiResult;
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum FeedOutput {
    Page(FeedPage),
    Comments(CommentPage),
    Comment(Comment),
    Ack,
}

impl FeedOutput {
    pub fn into_page(self) -> Result<FeedPage, FeedApiError> {
        match self {
            Self::Page(page) => Ok(page),
            _ => Err(FeedApiError::unexpected("page")),
        }
    }

    pub fn into_comments(self) -> Result<CommentPage, FeedApiError> {
        match self {
            Self::Comments(page) => Ok(page),
            _ => Err(FeedApiError::unexpected("comments")),
        }
    }

    pub fn into_comment(self) -> Result<Comment, FeedApiError> {
        match self {
            Self::Comment(comment) => Ok(comment),
            _ => Err(FeedApiError::unexpected("comment")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Error)]
pub enum FeedApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("server responded with status {code}")]
    Status { code: u16, body: Option<Vec<u8>> },
    #[error("request aborted")]
    Aborted,
    #[error("unexpected response, expected {expected}")]
    UnexpectedOutput { expected: String },
    #[error("{0}")]
    Other(String),
}

impl FeedApiError {
    fn unexpected(expected: &str) -> Self {
        Self::UnexpectedOutput {
            expected: expected.to_string(),
        }
    }
}

pub type FeedApiResult = Result<FeedOutput, FeedApiError>;

pub struct FeedApi<E> {
    context: CapabilityContext<FeedOperation, E>,
}

impl<E> Clone for FeedApi<E> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
        }
    }
}

impl<Ev> Capability<Ev> for FeedApi<Ev> {
    type Operation = FeedOperation;
    type MappedSelf<MappedEv> = FeedApi<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        FeedApi::new(self.context.map_event(f))
    }
}

impl<E> FeedApi<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<FeedOperation, E>) -> Self {
        Self { context }
    }

    fn request<T, F, C>(&self, operation: FeedOperation, extract: F, callback: C)
    where
        T: 'static,
        F: FnOnce(FeedOutput) -> Result<T, FeedApiError> + Send + 'static,
        C: FnOnce(Result<T, FeedApiError>) -> E + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx.request_from_shell(operation).await;
            ctx.update_app(callback(result.and_then(extract)));
        });
    }

    pub fn fetch_feed<F>(&self, request: FeedRequest, callback: F)
    where
        F: FnOnce(Result<FeedPage, FeedApiError>) -> E + Send + 'static,
    {
        self.request(FeedOperation::FetchFeed(request), FeedOutput::into_page, callback);
    }

    /// Ask the shell to abort an in-flight fetch. No event comes back; the
    /// aborted fetch still resolves through its own callback.
    pub fn cancel_fetch(&self, generation: u64) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let _ = ctx
                .request_from_shell(FeedOperation::CancelFetch { generation })
                .await;
        });
    }

    pub fn mutate<F>(&self, request: MutationRequest, callback: F)
    where
        F: FnOnce(Result<(), FeedApiError>) -> E + Send + 'static,
    {
        self.request(FeedOperation::Mutate(request), |_| Ok(()), callback);
    }

    pub fn fetch_comments<F>(&self, item_id: ItemId, page: u32, page_size: u32, callback: F)
    where
        F: FnOnce(Result<CommentPage, FeedApiError>) -> E + Send + 'static,
    {
        self.request(
            FeedOperation::FetchComments {
                item_id,
                page,
                page_size,
            },
            FeedOutput::into_comments,
            callback,
        );
    }

    pub fn post_comment<F>(
        &self,
        item_id: ItemId,
        text: String,
        parent_id: Option<CommentId>,
        callback: F,
    ) where
        F: FnOnce(Result<Comment, FeedApiError>) -> E + Send + 'static,
    {
        self.request(
            FeedOperation::PostComment {
                item_id,
                text,
                parent_id,
            },
            FeedOutput::into_comment,
            callback,
        );
    }

    pub fn delete_comment<F>(&self, comment_id: CommentId, callback: F)
    where
        F: FnOnce(Result<(), FeedApiError>) -> E + Send + 'static,
    {
        self.request(
            FeedOperation::DeleteComment { comment_id },
            |_| Ok(()),
            callback,
        );
    }
}
