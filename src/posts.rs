//! Post collection store: the feed and its create/update/delete operations.
//!
//! Same lifecycle shape as the auth machine (`loading`, then `succeeded` or
//! `failed`), without any identity concerns. Authorization is the backend's
//! job; the bearer token rides along on every gateway call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, Gateway, decode};
use crate::auth::AuthStatus;
use crate::types::{DraftError, Post, PostDraft};

const FETCH_FAILED: &str = "Failed to fetch posts";
const CREATE_FAILED: &str = "Failed to create post";
const UPDATE_FAILED: &str = "Failed to update post";
const DELETE_FAILED: &str = "Failed to delete post";

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    /// Rejected locally before any request was sent.
    #[error(transparent)]
    Invalid(#[from] DraftError),

    /// The request failed; `message` is what the store recorded in `error`.
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: ApiError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostState {
    pub posts: Vec<Post>,
    pub status: AuthStatus,
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct PostList {
    posts: Vec<Post>,
}

#[derive(Deserialize)]
struct PostEnvelope {
    post: Post,
}

pub struct PostStore {
    gateway: Arc<dyn Gateway>,
    state: Mutex<PostState>,
}

impl PostStore {
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway, state: Mutex::new(PostState::default()) }
    }

    #[must_use]
    pub fn snapshot(&self) -> PostState {
        self.lock().clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    fn lock(&self) -> MutexGuard<'_, PostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) {
        self.lock().status = AuthStatus::Loading;
    }

    fn fail(&self, source: ApiError, fallback: &str) -> PostError {
        let message = source.server_message().unwrap_or(fallback).to_owned();
        tracing::warn!(error = %source, %message, "post operation failed");
        let mut state = self.lock();
        state.status = AuthStatus::Failed;
        state.error = Some(message.clone());
        PostError::Failed { message, source }
    }

    /// Replace the feed with `GET /posts`.
    ///
    /// # Errors
    ///
    /// Returns [`PostError::Failed`] if the request or the decode fails.
    pub async fn load_all(&self) -> Result<Vec<Post>, PostError> {
        self.begin();
        let posts = match self
            .gateway
            .request(Method::GET, "/posts", None)
            .await
            .and_then(decode::<PostList>)
        {
            Ok(list) => list.posts,
            Err(e) => return Err(self.fail(e, FETCH_FAILED)),
        };

        let mut state = self.lock();
        state.posts.clone_from(&posts);
        state.status = AuthStatus::Succeeded;
        tracing::debug!(count = posts.len(), "posts loaded");
        Ok(posts)
    }

    /// Create a post and put it at the top of the feed.
    ///
    /// # Errors
    ///
    /// Returns [`PostError::Invalid`] for a blank title or content (no request
    /// is made), otherwise [`PostError::Failed`].
    pub async fn create(&self, draft: PostDraft) -> Result<Post, PostError> {
        let draft = draft.validate()?;
        self.begin();
        let post = match self.send_draft(Method::POST, "/posts", &draft).await {
            Ok(post) => post,
            Err(e) => return Err(self.fail(e, CREATE_FAILED)),
        };

        let mut state = self.lock();
        state.posts.insert(0, post.clone());
        state.status = AuthStatus::Succeeded;
        tracing::info!(post_id = %post.id, "post created");
        Ok(post)
    }

    /// Replace post `id` with `draft`. The feed entry is swapped in place if present.
    ///
    /// # Errors
    ///
    /// Returns [`PostError::Invalid`] for a blank title or content (no request
    /// is made), otherwise [`PostError::Failed`].
    pub async fn update(&self, id: &str, draft: PostDraft) -> Result<Post, PostError> {
        let draft = draft.validate()?;
        self.begin();
        let path = format!("/posts/{id}");
        let post = match self.send_draft(Method::PUT, &path, &draft).await {
            Ok(post) => post,
            Err(e) => return Err(self.fail(e, UPDATE_FAILED)),
        };

        let mut state = self.lock();
        if let Some(slot) = state.posts.iter_mut().find(|p| p.id == post.id) {
            *slot = post.clone();
        }
        state.status = AuthStatus::Succeeded;
        tracing::info!(post_id = %post.id, "post updated");
        Ok(post)
    }

    /// Delete post `id` and drop it from the feed.
    ///
    /// # Errors
    ///
    /// Returns [`PostError::Failed`] if the request fails.
    pub async fn delete(&self, id: &str) -> Result<(), PostError> {
        self.begin();
        let path = format!("/posts/{id}");
        if let Err(e) = self.gateway.request(Method::DELETE, &path, None).await {
            return Err(self.fail(e, DELETE_FAILED));
        }

        let mut state = self.lock();
        state.posts.retain(|p| p.id != id);
        state.status = AuthStatus::Succeeded;
        tracing::info!(post_id = %id, "post deleted");
        Ok(())
    }

    async fn send_draft(&self, method: Method, path: &str, draft: &PostDraft) -> Result<Post, ApiError> {
        let body = serde_json::to_value(draft).map_err(|e| ApiError::Decode(e.to_string()))?;
        let value = self.gateway.request(method, path, Some(body)).await?;
        decode::<PostEnvelope>(value).map(|envelope| envelope.post)
    }
}

#[cfg(test)]
#[path = "posts_test.rs"]
mod tests;
