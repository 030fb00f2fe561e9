//! Router Module Index
//!
//! Splits the HTTP surface by who may call it. Authentication is applied as
//! a layer on the authenticated router; admin handlers additionally ask the
//! access engine whether the caller may use the permission editor.

/// Routes accessible to any client, anonymous included.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
pub mod authenticated;

/// Permission editor endpoints, nested under `/admin`.
pub mod admin;
