//! Boundary records for the posting API.
//!
//! DESIGN
//! ======
//! The backend returns loosely shaped JSON. Everything that crosses the wire
//! is parsed into one of these records first, and a payload that does not
//! fit is rejected as a whole rather than partially trusted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// PROVIDER
// =============================================================================

/// Identity source that produced the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Local,
    Google,
    GitHub,
    #[serde(other)]
    Unknown,
}

impl Provider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Google => "google",
            Self::GitHub => "github",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the backend exposes a redirect flow (`GET /auth/<provider>`) for this provider.
    #[must_use]
    pub fn is_oauth(self) -> bool {
        matches!(self, Self::Google | Self::GitHub)
    }
}

impl From<&str> for Provider {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Self::Local,
            "google" => Self::Google,
            "github" => Self::GitHub,
            _ => Self::Unknown,
        }
    }
}

impl FromStr for Provider {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// USER
// =============================================================================

/// A user record as returned by `/auth/login`, `/auth/me` and the OAuth redirect.
///
/// The id may arrive as `id`, `_id` or both; `id` wins. Unknown fields are
/// kept in `extra` so a stored record serializes back to what the server sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawUser")]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), username: None, name: None, provider: None, extra: Map::new() }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Best label for display: username, then name, then id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Wire shape of [`User`] before the id keys are reconciled.
#[derive(Deserialize)]
struct RawUser {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default, rename = "_id")]
    mongo_id: Option<RawId>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    provider: Option<Provider>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<RawUser> for User {
    type Error = String;

    fn try_from(raw: RawUser) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .and_then(RawId::into_id)
            .or_else(|| raw.mongo_id.and_then(RawId::into_id))
            .ok_or_else(|| "user record has no id".to_owned())?;
        Ok(Self { id, username: raw.username, name: raw.name, provider: raw.provider, extra: raw.extra })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    /// Blank strings count as no id.
    fn into_id(self) -> Option<String> {
        match self {
            Self::Text(s) if s.trim().is_empty() => None,
            Self::Text(s) => Some(s),
            Self::Number(n) => Some(n.to_string()),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer)?
        .into_id()
        .ok_or_else(|| serde::de::Error::custom("id must not be empty"))
}

// =============================================================================
// AUTH PAYLOADS
// =============================================================================

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `POST /auth/login` success body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// `POST /auth/register` success body. The server may send a bare confirmation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// POSTS
// =============================================================================

/// Post author as embedded by the server: either a bare user id or a populated profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PostAuthor {
    Id(String),
    Profile(User),
}

impl PostAuthor {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Profile(user) => &user.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(alias = "_id", deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<PostAuthor>,
    #[serde(default, rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Post {
    /// True when `user` wrote this post. Only authors may edit or delete.
    #[must_use]
    pub fn is_authored_by(&self, user: &User) -> bool {
        self.author.as_ref().is_some_and(|a| a.id() == user.id)
    }
}

/// Body for `POST /posts` and `PUT /posts/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("Title is required")]
    MissingTitle,
    #[error("Content is required")]
    MissingContent,
}

impl PostDraft {
    /// Reject drafts the server would refuse anyway. Blank image URLs are dropped.
    ///
    /// # Errors
    ///
    /// Returns the first missing required field.
    pub fn validate(mut self) -> Result<Self, DraftError> {
        if self.title.trim().is_empty() {
            return Err(DraftError::MissingTitle);
        }
        if self.content.trim().is_empty() {
            return Err(DraftError::MissingContent);
        }
        self.image = self.image.filter(|i| !i.trim().is_empty());
        Ok(self)
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
