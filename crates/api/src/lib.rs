//! HTTP surface for the activity monitoring core.
//!
//! Exposes the operator endpoints (activity queries, flag triage, audit
//! trails) and the request-scoped recording middleware that any
//! authenticated route on the platform attaches.
//!
//! Authentication itself lives outside this workspace: the platform's auth
//! layer validates the session and inserts an
//! [`middleware::auth::AuthUser`] into the request extensions before
//! requests reach these routes.

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod state;
