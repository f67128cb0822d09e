//! Client-side session and feed core for the Postboard posting service.
//!
//! ARCHITECTURE
//! ============
//! - [`store`]: durable key-value session store (token, user, provider tag).
//! - [`api`]: HTTP gateway that attaches the stored bearer token per request.
//! - [`auth`]: auth state machine driven by register/login/logout/me/OAuth.
//! - [`oauth`]: one-shot reconciliation of an OAuth redirect landing.
//! - [`posts`]: post feed with create/update/delete.
//!
//! The store and gateway are passed in explicitly, never read from globals,
//! so every component can be driven by in-memory fakes in tests.

pub mod api;
pub mod auth;
pub mod config;
pub mod oauth;
pub mod posts;
pub mod store;
pub mod types;
