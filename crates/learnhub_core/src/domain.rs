//! crates/learnhub_core/src/domain.rs
//!
//! Defines the pure, core data structures for the course marketplace.
//! These structs are independent of the gateway wire format; the JSON
//! shapes live in the service's adapters.

use chrono::{DateTime, Utc};

/// The role a user holds on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

/// Represents an authenticated (or authenticatable) user of the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccount {
    pub id: u64,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

/// The outcome of a login or register call, exactly as the gateway reports
/// it. Deciding whether this constitutes a valid session is the session
/// store's job, not the adapter's.
#[derive(Debug, Clone)]
pub struct AuthReply {
    pub success: bool,
    pub user: Option<UserAccount>,
    pub token: Option<String>,
    pub message: Option<String>,
}

/// Profile data submitted when registering a new account.
#[derive(Debug, Clone)]
pub struct RegisterProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub username: Option<String>,
}

impl RegisterProfile {
    /// The username sent to the gateway: the explicit one if set, otherwise
    /// the local part of the email address.
    pub fn effective_username(&self) -> String {
        self.username.clone().unwrap_or_else(|| {
            self.email
                .split('@')
                .next()
                .unwrap_or(self.email.as_str())
                .to_string()
        })
    }
}

/// A course as listed in the catalog.
#[derive(Debug, Clone)]
pub struct Course {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub instructor_id: Option<u64>,
    pub enrollment_count: Option<u64>,
    pub level: Option<String>,
    pub language: Option<String>,
    pub duration: Option<String>,
}

/// Aggregate rating for one course (or the whole catalog).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub average: f64,
    pub count: u64,
}

#[derive(Debug, Clone)]
pub struct Review {
    pub id: u64,
    pub course_id: u64,
    pub user_id: u64,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Review data submitted by a student.
#[derive(Debug, Clone)]
pub struct ReviewDraft {
    pub course_id: u64,
    pub user_id: u64,
    pub rating: u8,
    pub comment: Option<String>,
}

/// The record linking one student to one course.
///
/// `progress` and `completed` are independently settable: the upstream API
/// exposes separate write calls for each and never derives one from the
/// other. Callers that want `completed` set when progress reaches 100 must
/// write it explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrollment {
    pub id: u64,
    pub student_id: u64,
    pub course_id: u64,
    pub progress: u8,
    pub stage1_completed: bool,
    pub stage2_completed: bool,
    pub completed: bool,
    pub enrolled_at: Option<DateTime<Utc>>,
}

/// Aggregate enrollment figures for one student.
#[derive(Debug, Clone)]
pub struct EnrollmentStats {
    pub total_enrollments: u64,
    pub completed_courses: u64,
    pub average_progress: f64,
    pub recent_enrollments: Vec<Enrollment>,
}

/// The kind of a course material item. `Text` carries its payload inline;
/// every other kind points at a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Video,
    Pdf,
    Doc,
    Image,
    Text,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Video => "VIDEO",
            ContentKind::Pdf => "PDF",
            ContentKind::Doc => "DOC",
            ContentKind::Image => "IMAGE",
            ContentKind::Text => "TEXT",
        }
    }
}

/// A single course material item.
#[derive(Debug, Clone)]
pub struct ContentItem {
    pub content_id: u64,
    pub course_id: u64,
    pub kind: ContentKind,
    pub title: String,
    pub url: Option<String>,
    pub body: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    /// The payload field selected by the item's kind.
    pub fn payload(&self) -> Option<&str> {
        match self.kind {
            ContentKind::Text => self.body.as_deref(),
            _ => self.url.as_deref(),
        }
    }
}

/// An error raised when a content draft's payload does not match its kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentPayloadError {
    #[error("content of kind {0} requires a url")]
    MissingUrl(&'static str),
    #[error("TEXT content requires a body")]
    MissingBody,
}

/// Instructor-side payload for creating a new content item.
#[derive(Debug, Clone)]
pub struct ContentDraft {
    pub course_id: u64,
    pub kind: ContentKind,
    pub title: String,
    pub url: Option<String>,
    pub body: Option<String>,
}

impl ContentDraft {
    /// Checks the payload invariant: `Text` requires a `body`, every other
    /// kind requires a `url`.
    pub fn validate(&self) -> Result<(), ContentPayloadError> {
        match self.kind {
            ContentKind::Text => {
                if self.body.as_deref().map_or(true, |b| b.trim().is_empty()) {
                    return Err(ContentPayloadError::MissingBody);
                }
            }
            kind => {
                if self.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    return Err(ContentPayloadError::MissingUrl(kind.as_str()));
                }
            }
        }
        Ok(())
    }
}

/// Delivery channel of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    InApp,
    Email,
    Sms,
}

/// A notification belonging to exactly one user.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: u64,
    pub user_id: u64,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// One payment in a user's history, as displayed on the dashboards.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: u64,
    pub user_id: u64,
    pub course_id: u64,
    pub amount: f64,
    pub status: PaymentStatus,
    pub created_at: Option<DateTime<Utc>>,
}

/// The durable session blob: the token and the user record together. The
/// session is authenticated exactly when both are present, so the vault
/// stores and yields them as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub user: UserAccount,
    pub token: String,
}
