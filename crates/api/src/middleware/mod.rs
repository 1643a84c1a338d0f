//! Request-scoped middleware: the auth-layer interface and the activity
//! recorder.

pub mod activity;
pub mod auth;
