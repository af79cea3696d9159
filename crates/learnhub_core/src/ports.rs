//! crates/learnhub_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the client's core logic.
//! These traits form the boundary of the hexagonal architecture: one trait
//! per upstream service behind the API gateway, plus the durable session
//! vault. Components depend on these traits, never on the HTTP adapter,
//! so tests can substitute in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AuthReply, ContentDraft, ContentItem, Course, Enrollment, EnrollmentStats, Notification,
    NotificationKind, Payment, RatingSummary, RegisterProfile, Review, ReviewDraft, StoredSession,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The uniform error shape every port operation resolves to.
///
/// `Unauthorized` is a 401 from any endpoint and is globally fatal to the
/// session; `Api` is any other non-2xx response, normalized by the gateway
/// adapter; `Transport` covers failures below HTTP semantics (connect,
/// decode).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("session rejected by the gateway")]
    Unauthorized,
    #[error("gateway error {status} on {path}: {message}")]
    Api {
        status: u16,
        path: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    #[error("transport error: {0}")]
    Transport(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Gateway Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> PortResult<AuthReply>;
    async fn register(&self, profile: &RegisterProfile) -> PortResult<AuthReply>;
}

#[async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn list_courses(&self) -> PortResult<Vec<Course>>;
    async fn course_by_id(&self, course_id: u64) -> PortResult<Course>;
    async fn create_course(&self, course: &Course) -> PortResult<Course>;
    async fn rating_summary(&self, course_id: u64) -> PortResult<RatingSummary>;
    async fn reviews_for_course(&self, course_id: u64) -> PortResult<Vec<Review>>;
    async fn create_review(&self, draft: &ReviewDraft) -> PortResult<Review>;
}

#[async_trait]
pub trait EnrollmentApi: Send + Sync {
    async fn enroll(&self, student_id: u64, course_id: u64) -> PortResult<Enrollment>;
    async fn enrollments_by_student(&self, student_id: u64) -> PortResult<Vec<Enrollment>>;
    async fn enrollments_by_course(&self, course_id: u64) -> PortResult<Vec<Enrollment>>;
    async fn update_progress(&self, enrollment_id: u64, progress: u8) -> PortResult<Enrollment>;
    async fn update_completion(&self, enrollment_id: u64, completed: bool)
        -> PortResult<Enrollment>;
    async fn update_stage1(&self, enrollment_id: u64, completed: bool) -> PortResult<Enrollment>;
    async fn update_stage2(&self, enrollment_id: u64, completed: bool) -> PortResult<Enrollment>;
    async fn stats_for_student(&self, student_id: u64) -> PortResult<EnrollmentStats>;
}

#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn content_by_course(&self, course_id: u64) -> PortResult<Vec<ContentItem>>;
    async fn add_content(&self, draft: &ContentDraft) -> PortResult<ContentItem>;
    async fn delete_content(&self, content_id: u64) -> PortResult<()>;
    /// Records that a user opened a content item. Callers treat this as
    /// fire-and-forget; failures must not block the open.
    async fn log_access(&self, user_id: u64, content_id: u64) -> PortResult<()>;
}

#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn send(
        &self,
        user_id: u64,
        title: &str,
        message: &str,
        kind: NotificationKind,
    ) -> PortResult<Notification>;
    async fn notifications_for_user(&self, user_id: u64) -> PortResult<Vec<Notification>>;
    async fn mark_read(&self, notification_id: u64) -> PortResult<()>;
    async fn delete(&self, notification_id: u64) -> PortResult<()>;
}

#[async_trait]
pub trait PaymentApi: Send + Sync {
    async fn payments_for_user(&self, user_id: u64) -> PortResult<Vec<Payment>>;
}

//=========================================================================================
// Durable Session Vault
//=========================================================================================

/// The durable storage boundary for the session blob.
///
/// The vault holds two fixed keys (token and user record) and treats them
/// as a unit: `load` yields a session only when both are present and
/// parsable, `store` writes both in the same call, `clear` removes both.
/// The session store is the vault's single writer.
pub trait SessionVault: Send + Sync {
    /// Reads the stored session. Missing or unparsable state yields `None`;
    /// no error is surfaced.
    fn load(&self) -> Option<StoredSession>;
    fn store(&self, session: &StoredSession) -> PortResult<()>;
    fn clear(&self);
}
