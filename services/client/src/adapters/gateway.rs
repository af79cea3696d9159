//! services/client/src/adapters/gateway.rs
//!
//! The HTTP adapter: one `reqwest`-backed struct implementing every gateway
//! port from the `core` crate. It attaches the bearer token from the
//! session store, normalizes non-2xx responses into the uniform
//! `PortError::Api` shape, and treats a 401 from any endpoint as a global
//! forced logout. No retries happen at this layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learnhub_core::domain::{
    AuthReply, ContentDraft, ContentItem, ContentKind, Course, Enrollment, EnrollmentStats,
    Notification, NotificationKind, Payment, PaymentStatus, RatingSummary, RegisterProfile,
    Review, ReviewDraft, Role, UserAccount,
};
use learnhub_core::ports::{
    AuthApi, ContentApi, CourseCatalog, EnrollmentApi, NotificationApi, PaymentApi, PortError,
    PortResult,
};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::session::SessionStore;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A gateway adapter that implements the client's service ports over
/// HTTP/JSON.
#[derive(Clone)]
pub struct GatewayAdapter {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl GatewayAdapter {
    /// Creates a new `GatewayAdapter`. `base_url` must not end with a
    /// slash.
    pub fn new(http: reqwest::Client, base_url: String, session: Arc<SessionStore>) -> Self {
        Self {
            http,
            base_url,
            session,
        }
    }

    /// Issues a request and maps the outcome to the port error taxonomy.
    /// A 401 expires the session before the error is returned, regardless
    /// of which endpoint produced it.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> PortResult<reqwest::Response> {
        let mut builder = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = self.session.token().await {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PortError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.session.expire().await;
            return Err(PortError::Unauthorized);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = error_message(&text, status);
            debug!(status = status.as_u16(), path, %message, "gateway rejected request");
            return Err(PortError::Api {
                status: status.as_u16(),
                path: path.to_string(),
                message,
                timestamp: Utc::now(),
            });
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> PortResult<T> {
        let response = self.send(method, path, body).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PortError::Transport(e.to_string()))
    }

    /// Like [`fetch`], for endpoints whose response bodies the client
    /// ignores.
    ///
    /// [`fetch`]: GatewayAdapter::fetch
    async fn execute(&self, method: Method, path: &str, body: Option<Value>) -> PortResult<()> {
        self.send(method, path, body).await.map(|_| ())
    }
}

/// Extracts a human-readable message from an error body: the `message`,
/// `error`, or `title` field when the body is JSON, the raw text when it is
/// not, the status reason when there is no body at all.
fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error", "title"] {
            if let Some(text) = value.get(key).and_then(Value::as_str) {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    if !body.trim().is_empty() {
        return body.trim().to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

//=========================================================================================
// Wire Record Structs
//=========================================================================================

/// The gateway reports user ids as either numbers or strings depending on
/// the service; both collapse to `u64`.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Num(u64),
    Str(String),
}

impl IdRepr {
    fn to_u64(&self) -> u64 {
        match self {
            IdRepr::Num(n) => *n,
            IdRepr::Str(s) => s.parse().unwrap_or(0),
        }
    }
}

fn role_from_wire(raw: &str) -> Role {
    match raw {
        "INSTRUCTOR" => Role::Instructor,
        "ADMIN" => Role::Admin,
        _ => Role::Student,
    }
}

fn role_to_wire(role: Role) -> &'static str {
    match role {
        Role::Student => "STUDENT",
        Role::Instructor => "INSTRUCTOR",
        Role::Admin => "ADMIN",
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    id: IdRepr,
    email: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    role: String,
}

impl UserRecord {
    fn to_domain(self) -> UserAccount {
        let display_name = match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            _ => self
                .username
                .clone()
                .unwrap_or_else(|| self.email.split('@').next().unwrap_or_default().to_string()),
        };
        UserAccount {
            id: self.id.to_u64(),
            email: self.email,
            display_name,
            role: role_from_wire(&self.role),
        }
    }
}

#[derive(Deserialize)]
struct AuthReplyRecord {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<UserRecord>,
}

impl AuthReplyRecord {
    fn to_domain(self) -> AuthReply {
        AuthReply {
            success: self.success,
            user: self.user.map(UserRecord::to_domain),
            token: self.token,
            message: self.message,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseRecord {
    id: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    instructor_id: Option<u64>,
    #[serde(default)]
    enrollment_count: Option<u64>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

impl CourseRecord {
    fn to_domain(self) -> Course {
        Course {
            id: self.id,
            title: self.title,
            description: self.description,
            price: self.price,
            instructor_id: self.instructor_id,
            enrollment_count: self.enrollment_count,
            level: self.level,
            language: self.language,
            duration: self.duration,
        }
    }
}

#[derive(Deserialize)]
struct RatingSummaryRecord {
    #[serde(default)]
    average: f64,
    #[serde(default)]
    count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRecord {
    id: u64,
    course_id: u64,
    user_id: u64,
    rating: f64,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl ReviewRecord {
    fn to_domain(self) -> Review {
        Review {
            id: self.id,
            course_id: self.course_id,
            user_id: self.user_id,
            rating: self.rating.clamp(0.0, 5.0) as u8,
            comment: self.comment,
            created_at: self.created_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrollmentRecord {
    id: u64,
    student_id: u64,
    course_id: u64,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    stage1_completed: bool,
    #[serde(default)]
    stage2_completed: bool,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    enrolled_at: Option<DateTime<Utc>>,
}

impl EnrollmentRecord {
    fn to_domain(self) -> Enrollment {
        Enrollment {
            id: self.id,
            student_id: self.student_id,
            course_id: self.course_id,
            progress: self.progress.clamp(0.0, 100.0) as u8,
            stage1_completed: self.stage1_completed,
            stage2_completed: self.stage2_completed,
            completed: self.completed,
            enrolled_at: self.enrolled_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrollmentStatsRecord {
    #[serde(default)]
    total_enrollments: u64,
    #[serde(default)]
    completed_courses: u64,
    #[serde(default)]
    average_progress: f64,
    #[serde(default)]
    recent_enrollments: Vec<EnrollmentRecord>,
}

impl EnrollmentStatsRecord {
    fn to_domain(self) -> EnrollmentStats {
        EnrollmentStats {
            total_enrollments: self.total_enrollments,
            completed_courses: self.completed_courses,
            average_progress: self.average_progress,
            recent_enrollments: self
                .recent_enrollments
                .into_iter()
                .map(EnrollmentRecord::to_domain)
                .collect(),
        }
    }
}

fn content_kind_from_wire(raw: &str) -> ContentKind {
    match raw {
        "VIDEO" => ContentKind::Video,
        "PDF" => ContentKind::Pdf,
        "DOC" => ContentKind::Doc,
        "IMAGE" => ContentKind::Image,
        _ => ContentKind::Text,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentRecord {
    content_id: u64,
    course_id: u64,
    #[serde(rename = "type")]
    kind: String,
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    uploaded_at: Option<DateTime<Utc>>,
}

impl ContentRecord {
    fn to_domain(self) -> ContentItem {
        ContentItem {
            content_id: self.content_id,
            course_id: self.course_id,
            kind: content_kind_from_wire(&self.kind),
            title: self.title,
            url: self.url,
            body: self.body,
            uploaded_at: self.uploaded_at,
        }
    }
}

fn notification_kind_from_wire(raw: &str) -> NotificationKind {
    match raw {
        "EMAIL" => NotificationKind::Email,
        "SMS" => NotificationKind::Sms,
        _ => NotificationKind::InApp,
    }
}

fn notification_kind_to_wire(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::InApp => "IN_APP",
        NotificationKind::Email => "EMAIL",
        NotificationKind::Sms => "SMS",
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRecord {
    #[serde(default)]
    id: u64,
    user_id: u64,
    title: String,
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    read: bool,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    fn to_domain(self) -> Notification {
        Notification {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            message: self.message,
            kind: notification_kind_from_wire(self.kind.as_deref().unwrap_or("IN_APP")),
            read: self.read,
            created_at: self.created_at,
        }
    }
}

fn payment_status_from_wire(raw: &str) -> PaymentStatus {
    match raw {
        "COMPLETED" => PaymentStatus::Completed,
        "FAILED" => PaymentStatus::Failed,
        "REFUNDED" => PaymentStatus::Refunded,
        _ => PaymentStatus::Pending,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRecord {
    id: u64,
    user_id: u64,
    course_id: u64,
    #[serde(default)]
    amount: f64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    fn to_domain(self) -> Payment {
        Payment {
            id: self.id,
            user_id: self.user_id,
            course_id: self.course_id,
            amount: self.amount,
            status: payment_status_from_wire(self.status.as_deref().unwrap_or("PENDING")),
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// Port Trait Implementations
//=========================================================================================

#[async_trait]
impl AuthApi for GatewayAdapter {
    async fn login(&self, email: &str, password: &str) -> PortResult<AuthReply> {
        let record: AuthReplyRecord = self
            .fetch(
                Method::POST,
                "/user-management-service/api/users/login",
                Some(json!({ "email": email, "password": password })),
            )
            .await?;
        Ok(record.to_domain())
    }

    async fn register(&self, profile: &RegisterProfile) -> PortResult<AuthReply> {
        let record: AuthReplyRecord = self
            .fetch(
                Method::POST,
                "/user-management-service/api/users/register",
                Some(json!({
                    "firstName": profile.first_name,
                    "lastName": profile.last_name,
                    "email": profile.email,
                    "password": profile.password,
                    "role": role_to_wire(profile.role),
                    "username": profile.effective_username(),
                })),
            )
            .await?;
        Ok(record.to_domain())
    }
}

#[async_trait]
impl CourseCatalog for GatewayAdapter {
    async fn list_courses(&self) -> PortResult<Vec<Course>> {
        let records: Vec<CourseRecord> = self
            .fetch(Method::GET, "/course-management-service/api/courses", None)
            .await?;
        Ok(records.into_iter().map(CourseRecord::to_domain).collect())
    }

    async fn course_by_id(&self, course_id: u64) -> PortResult<Course> {
        let record: CourseRecord = self
            .fetch(
                Method::GET,
                &format!("/course-management-service/api/courses/{}", course_id),
                None,
            )
            .await?;
        Ok(record.to_domain())
    }

    async fn create_course(&self, course: &Course) -> PortResult<Course> {
        let record: CourseRecord = self
            .fetch(
                Method::POST,
                "/course-management-service/api/courses",
                Some(json!({
                    "title": course.title,
                    "description": course.description,
                    "price": course.price,
                    "instructorId": course.instructor_id,
                    "level": course.level,
                    "language": course.language,
                    "duration": course.duration,
                })),
            )
            .await?;
        Ok(record.to_domain())
    }

    async fn rating_summary(&self, course_id: u64) -> PortResult<RatingSummary> {
        let record: RatingSummaryRecord = self
            .fetch(
                Method::GET,
                &format!(
                    "/course-management-service/api/reviews/course/{}/summary",
                    course_id
                ),
                None,
            )
            .await?;
        Ok(RatingSummary {
            average: record.average,
            count: record.count,
        })
    }

    async fn reviews_for_course(&self, course_id: u64) -> PortResult<Vec<Review>> {
        let records: Vec<ReviewRecord> = self
            .fetch(
                Method::GET,
                &format!("/course-management-service/api/reviews/course/{}", course_id),
                None,
            )
            .await?;
        Ok(records.into_iter().map(ReviewRecord::to_domain).collect())
    }

    async fn create_review(&self, draft: &ReviewDraft) -> PortResult<Review> {
        let record: ReviewRecord = self
            .fetch(
                Method::POST,
                "/course-management-service/api/reviews",
                Some(json!({
                    "courseId": draft.course_id,
                    "userId": draft.user_id,
                    "rating": draft.rating,
                    "comment": draft.comment,
                })),
            )
            .await?;
        Ok(record.to_domain())
    }
}

#[async_trait]
impl EnrollmentApi for GatewayAdapter {
    async fn enroll(&self, student_id: u64, course_id: u64) -> PortResult<Enrollment> {
        let record: EnrollmentRecord = self
            .fetch(
                Method::POST,
                "/enrollment-service/api/enrollments",
                Some(json!({ "studentId": student_id, "courseId": course_id })),
            )
            .await?;
        Ok(record.to_domain())
    }

    async fn enrollments_by_student(&self, student_id: u64) -> PortResult<Vec<Enrollment>> {
        let records: Vec<EnrollmentRecord> = self
            .fetch(
                Method::GET,
                &format!("/enrollment-service/api/enrollments/student/{}", student_id),
                None,
            )
            .await?;
        Ok(records.into_iter().map(EnrollmentRecord::to_domain).collect())
    }

    async fn enrollments_by_course(&self, course_id: u64) -> PortResult<Vec<Enrollment>> {
        let records: Vec<EnrollmentRecord> = self
            .fetch(
                Method::GET,
                &format!("/enrollment-service/api/enrollments/course/{}", course_id),
                None,
            )
            .await?;
        Ok(records.into_iter().map(EnrollmentRecord::to_domain).collect())
    }

    async fn update_progress(&self, enrollment_id: u64, progress: u8) -> PortResult<Enrollment> {
        let record: EnrollmentRecord = self
            .fetch(
                Method::PUT,
                &format!("/enrollment-service/api/enrollments/{}/progress", enrollment_id),
                Some(json!({ "progress": progress })),
            )
            .await?;
        Ok(record.to_domain())
    }

    async fn update_completion(
        &self,
        enrollment_id: u64,
        completed: bool,
    ) -> PortResult<Enrollment> {
        let record: EnrollmentRecord = self
            .fetch(
                Method::PUT,
                &format!("/enrollment-service/api/enrollments/{}/complete", enrollment_id),
                Some(json!({ "completed": completed })),
            )
            .await?;
        Ok(record.to_domain())
    }

    async fn update_stage1(&self, enrollment_id: u64, completed: bool) -> PortResult<Enrollment> {
        let record: EnrollmentRecord = self
            .fetch(
                Method::PUT,
                &format!("/enrollment-service/api/enrollments/{}/stage1", enrollment_id),
                Some(json!({ "completed": completed })),
            )
            .await?;
        Ok(record.to_domain())
    }

    async fn update_stage2(&self, enrollment_id: u64, completed: bool) -> PortResult<Enrollment> {
        let record: EnrollmentRecord = self
            .fetch(
                Method::PUT,
                &format!("/enrollment-service/api/enrollments/{}/stage2", enrollment_id),
                Some(json!({ "completed": completed })),
            )
            .await?;
        Ok(record.to_domain())
    }

    async fn stats_for_student(&self, student_id: u64) -> PortResult<EnrollmentStats> {
        let record: EnrollmentStatsRecord = self
            .fetch(
                Method::GET,
                &format!(
                    "/enrollment-service/api/enrollments/student/{}/stats",
                    student_id
                ),
                None,
            )
            .await?;
        Ok(record.to_domain())
    }
}

#[async_trait]
impl ContentApi for GatewayAdapter {
    async fn content_by_course(&self, course_id: u64) -> PortResult<Vec<ContentItem>> {
        let records: Vec<ContentRecord> = self
            .fetch(
                Method::GET,
                &format!("/content-delivery-service/api/content/course/{}", course_id),
                None,
            )
            .await?;
        Ok(records.into_iter().map(ContentRecord::to_domain).collect())
    }

    async fn add_content(&self, draft: &ContentDraft) -> PortResult<ContentItem> {
        let record: ContentRecord = self
            .fetch(
                Method::POST,
                "/content-delivery-service/api/content",
                Some(json!({
                    "courseId": draft.course_id,
                    "type": draft.kind.as_str(),
                    "title": draft.title,
                    "url": draft.url,
                    "body": draft.body,
                })),
            )
            .await?;
        Ok(record.to_domain())
    }

    async fn delete_content(&self, content_id: u64) -> PortResult<()> {
        self.execute(
            Method::DELETE,
            &format!("/content-delivery-service/api/content/{}", content_id),
            None,
        )
        .await
    }

    async fn log_access(&self, user_id: u64, content_id: u64) -> PortResult<()> {
        self.execute(
            Method::POST,
            "/content-delivery-service/api/logs",
            Some(json!({
                "userId": user_id,
                "content": { "contentId": content_id },
                "action": "STREAM",
            })),
        )
        .await
    }
}

#[async_trait]
impl NotificationApi for GatewayAdapter {
    async fn send(
        &self,
        user_id: u64,
        title: &str,
        message: &str,
        kind: NotificationKind,
    ) -> PortResult<Notification> {
        let record: NotificationRecord = self
            .fetch(
                Method::POST,
                "/notification-service/api/notifications/send",
                Some(json!({
                    "userId": user_id,
                    "title": title,
                    "message": message,
                    "type": notification_kind_to_wire(kind),
                })),
            )
            .await?;
        Ok(record.to_domain())
    }

    async fn notifications_for_user(&self, user_id: u64) -> PortResult<Vec<Notification>> {
        let records: Vec<NotificationRecord> = self
            .fetch(
                Method::GET,
                &format!("/notification-service/api/notifications/user/{}", user_id),
                None,
            )
            .await?;
        Ok(records
            .into_iter()
            .map(NotificationRecord::to_domain)
            .collect())
    }

    async fn mark_read(&self, notification_id: u64) -> PortResult<()> {
        self.execute(
            Method::PUT,
            &format!("/notification-service/api/notifications/{}/read", notification_id),
            None,
        )
        .await
    }

    async fn delete(&self, notification_id: u64) -> PortResult<()> {
        self.execute(
            Method::DELETE,
            &format!("/notification-service/api/notifications/{}", notification_id),
            None,
        )
        .await
    }
}

#[async_trait]
impl PaymentApi for GatewayAdapter {
    async fn payments_for_user(&self, user_id: u64) -> PortResult<Vec<Payment>> {
        let records: Vec<PaymentRecord> = self
            .fetch(
                Method::GET,
                &format!("/payment-service/api/payments/user/{}", user_id),
                None,
            )
            .await?;
        Ok(records.into_iter().map(PaymentRecord::to_domain).collect())
    }
}
