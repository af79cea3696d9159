//! services/client/src/lib.rs
//!
//! The course-marketplace client library: session management, the gateway
//! adapter, the notification cache, the per-course reconciler, and the
//! read-only screen projections.

pub mod adapters;
pub mod config;
pub mod error;
pub mod notifications;
pub mod reconciler;
pub mod session;
pub mod state;
pub mod views;
