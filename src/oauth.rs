//! OAuth redirect handler: turns the backend's redirect back into a session.
//!
//! The backend finishes the provider dance and sends the browser to a fixed
//! landing path with three query parameters: `token`, `user` (URL-encoded
//! JSON) and `provider`. [`OAuthRedirect::complete`] takes `self` by value,
//! so a parsed redirect can be completed once, successfully or not. Retrying
//! means starting a new redirect.

use url::Url;

use crate::auth::{AuthError, AuthMachine, OAuthGrant};
use crate::types::{Provider, User};

/// Where the user goes after a successful landing.
pub const HOME_PATH: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OAuthError {
    #[error("Authentication failed. Token not received.")]
    MissingToken,
    #[error("Error processing user data.")]
    InvalidUser,
    #[error("Authentication failed. Please try again.")]
    Unexpected,
}

/// Successful landing: the caller should navigate to `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landing {
    pub path: &'static str,
}

/// Raw query parameters from one redirect landing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthRedirect {
    token: Option<String>,
    user: Option<String>,
    provider: Option<String>,
}

impl OAuthRedirect {
    /// Parse the full landing URL.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Unexpected`] if `url` is not a valid absolute URL.
    pub fn from_url(url: &str) -> Result<Self, OAuthError> {
        let parsed = Url::parse(url).map_err(|e| {
            tracing::warn!(error = %e, "oauth redirect URL unparseable");
            OAuthError::Unexpected
        })?;
        Ok(Self::from_pairs(parsed.query_pairs()))
    }

    /// Parse a bare query string, with or without the leading `?`.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    /// First occurrence of each accepted key wins; anything else is ignored.
    fn from_pairs<'a>(pairs: impl Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>) -> Self {
        let mut redirect = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "token" => &mut redirect.token,
                "user" => &mut redirect.user,
                "provider" => &mut redirect.provider,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        redirect
    }

    /// Validate the payload and hand the identity to `machine`.
    ///
    /// Nothing is written to the store unless the token is present and the
    /// user record parses.
    ///
    /// # Errors
    ///
    /// - [`OAuthError::MissingToken`]: no (or blank) `token` parameter.
    /// - [`OAuthError::InvalidUser`]: `user` absent or not a valid user record.
    /// - [`OAuthError::Unexpected`]: the session could not be stored.
    pub fn complete(self, machine: &AuthMachine) -> Result<Landing, OAuthError> {
        let grant = self.into_grant()?;
        let provider = grant.provider;

        machine.ingest_oauth_callback(grant).map_err(|e| match e {
            AuthError::MissingToken => OAuthError::MissingToken,
            other => {
                tracing::error!(error = %other, "oauth callback could not be applied");
                OAuthError::Unexpected
            }
        })?;

        tracing::info!(%provider, "oauth redirect completed");
        Ok(Landing { path: HOME_PATH })
    }

    fn into_grant(self) -> Result<OAuthGrant, OAuthError> {
        let Some(token) = self.token.filter(|t| !t.trim().is_empty()) else {
            tracing::warn!("oauth redirect without token");
            return Err(OAuthError::MissingToken);
        };

        let raw_user = self.user.ok_or_else(|| {
            tracing::warn!("oauth redirect without user payload");
            OAuthError::InvalidUser
        })?;
        let user: User = serde_json::from_str(&raw_user).map_err(|e| {
            tracing::warn!(error = %e, "oauth user payload unparseable");
            OAuthError::InvalidUser
        })?;

        let provider = self
            .provider
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(Provider::from)
            .or(user.provider)
            .unwrap_or(Provider::Unknown);

        Ok(OAuthGrant { token, user, provider })
    }
}

#[cfg(test)]
#[path = "oauth_test.rs"]
mod tests;
