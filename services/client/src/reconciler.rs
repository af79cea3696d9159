//! services/client/src/reconciler.rs
//!
//! The per-course enrollment/progress reconciler. It merges the
//! server-authoritative enrollment with locally-triggered updates (content
//! opens incrementing progress, explicit stage completions) and
//! resynchronizes on a fixed interval. Background sync failures are
//! swallowed; user-initiated actions surface their errors and are never
//! retried here.
//!
//! Overlapping syncs are resolved with a monotone ticket taken when the
//! request is issued: a response is applied only if no newer response has
//! been applied already, so the latest-issued request always wins and a
//! slow stale response cannot overwrite fresher state. Write-path updates
//! take tickets of their own, so a sync that was issued before a write can
//! no longer land on top of it.

use learnhub_core::domain::{
    ContentDraft, ContentItem, ContentPayloadError, Course, Enrollment, RatingSummary, Review,
    ReviewDraft, Role, UserAccount,
};
use learnhub_core::ports::{
    ContentApi, CourseCatalog, EnrollmentApi, PortError, PortResult,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::SessionStore;

/// An error from a user-initiated course action. Background sync never
/// produces these; it logs and waits for the next tick.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("no user is signed in")]
    NotSignedIn,
    #[error("already enrolled in course {0}")]
    AlreadyEnrolled(u64),
    #[error("not enrolled in course {0}")]
    NotEnrolled(u64),
    #[error("stage 1 must be completed before stage 2")]
    StageOrder,
    #[error("only the course instructor can manage content")]
    NotInstructor,
    #[error("unknown content item {0}")]
    UnknownContent(u64),
    #[error(transparent)]
    Content(#[from] ContentPayloadError),
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Everything the course view renders, replaced wholesale by each applied
/// sync.
#[derive(Debug, Clone, Default)]
pub struct CourseSnapshot {
    pub course: Option<Course>,
    pub enrollment: Option<Enrollment>,
    pub contents: Vec<ContentItem>,
    pub reviews: Vec<Review>,
    pub rating: Option<RatingSummary>,
    pub enrollment_count: u64,
}

struct Inner {
    snapshot: CourseSnapshot,
    last_applied_seq: u64,
}

pub struct CourseReconciler {
    course_id: u64,
    enrollments: Arc<dyn EnrollmentApi>,
    content: Arc<dyn ContentApi>,
    catalog: Arc<dyn CourseCatalog>,
    session: Arc<SessionStore>,
    state: RwLock<Inner>,
    sync_seq: AtomicU64,
    poll_interval: Duration,
}

impl CourseReconciler {
    pub fn new(
        course_id: u64,
        enrollments: Arc<dyn EnrollmentApi>,
        content: Arc<dyn ContentApi>,
        catalog: Arc<dyn CourseCatalog>,
        session: Arc<SessionStore>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            course_id,
            enrollments,
            content,
            catalog,
            session,
            state: RwLock::new(Inner {
                snapshot: CourseSnapshot::default(),
                last_applied_seq: 0,
            }),
            sync_seq: AtomicU64::new(0),
            poll_interval,
        }
    }

    pub fn course_id(&self) -> u64 {
        self.course_id
    }

    pub async fn snapshot(&self) -> CourseSnapshot {
        self.state.read().await.snapshot.clone()
    }

    //=====================================================================================
    // Synchronization
    //=====================================================================================

    /// The initial load for a view mount: same parallel fetches as the
    /// background sync, but errors surface to the caller.
    pub async fn load(&self) -> Result<CourseSnapshot, ActionError> {
        let ticket = self.next_ticket();
        let snapshot = self.fetch_snapshot().await?;
        self.apply_snapshot(ticket, snapshot).await;
        Ok(self.snapshot().await)
    }

    /// One background resynchronization pass. Fetch failures are logged
    /// and swallowed; the previous snapshot stays visible until the next
    /// tick.
    pub async fn sync(&self) {
        let ticket = self.next_ticket();
        match self.fetch_snapshot().await {
            Ok(snapshot) => self.apply_snapshot(ticket, snapshot).await,
            Err(e) => {
                debug!(course_id = self.course_id, error = %e, "background sync failed");
            }
        }
    }

    /// The resync loop: one [`sync`] per interval tick until cancelled.
    ///
    /// [`sync`]: CourseReconciler::sync
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(course_id = self.course_id, "course resync stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }
            self.sync().await;
        }
    }

    fn next_ticket(&self) -> u64 {
        self.sync_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn fetch_snapshot(&self) -> PortResult<CourseSnapshot> {
        let user = self.session.user().await;
        let (course, rating, reviews, contents, rolls) = futures::try_join!(
            self.catalog.course_by_id(self.course_id),
            self.catalog.rating_summary(self.course_id),
            self.catalog.reviews_for_course(self.course_id),
            self.content.content_by_course(self.course_id),
            self.enrollments.enrollments_by_course(self.course_id),
        )?;

        let enrollment = user
            .as_ref()
            .and_then(|u| rolls.iter().find(|e| e.student_id == u.id).cloned());
        Ok(CourseSnapshot {
            course: Some(course),
            enrollment,
            contents,
            reviews,
            rating: Some(rating),
            enrollment_count: rolls.len() as u64,
        })
    }

    /// Applies a fetched snapshot unless a newer one has been applied
    /// since this request was issued.
    async fn apply_snapshot(&self, ticket: u64, snapshot: CourseSnapshot) {
        let mut inner = self.state.write().await;
        if ticket <= inner.last_applied_seq {
            debug!(
                course_id = self.course_id,
                ticket,
                applied = inner.last_applied_seq,
                "discarding stale sync response"
            );
            return;
        }
        inner.snapshot = snapshot;
        inner.last_applied_seq = ticket;
    }

    /// Applies a partial, write-path update under the same ticket
    /// discipline as a full snapshot. Each update takes its own ticket, so
    /// an in-flight sync issued before the write cannot overwrite it.
    async fn apply_write<F>(&self, ticket: u64, update: F)
    where
        F: FnOnce(&mut CourseSnapshot),
    {
        let mut inner = self.state.write().await;
        if ticket <= inner.last_applied_seq {
            return;
        }
        update(&mut inner.snapshot);
        inner.last_applied_seq = ticket;
    }

    /// Re-fetches the authoritative enrollment after a write; the server
    /// value wins over any locally computed one. Failures are swallowed,
    /// the next sync tick corrects any divergence.
    async fn refetch_enrollment(&self, student_id: u64) {
        let ticket = self.next_ticket();
        match self.enrollments.enrollments_by_course(self.course_id).await {
            Ok(rolls) => {
                let own = rolls.iter().find(|e| e.student_id == student_id).cloned();
                let count = rolls.len() as u64;
                self.apply_write(ticket, |snapshot| {
                    snapshot.enrollment = own;
                    snapshot.enrollment_count = count;
                })
                .await;
            }
            Err(e) => {
                debug!(course_id = self.course_id, error = %e, "enrollment refetch failed");
            }
        }
    }

    //=====================================================================================
    // Enrollment Transitions
    //=====================================================================================

    /// Enrolls the signed-in student, guarded by "not already enrolled".
    /// On success the local state is set optimistically, then confirmed
    /// with an authoritative re-fetch; on failure the state stays
    /// NOT_ENROLLED and the error surfaces.
    pub async fn enroll(&self) -> Result<Enrollment, ActionError> {
        let user = self.require_user().await?;
        if self.state.read().await.snapshot.enrollment.is_some() {
            return Err(ActionError::AlreadyEnrolled(self.course_id));
        }

        let enrollment = self.enrollments.enroll(user.id, self.course_id).await?;
        let ticket = self.next_ticket();
        let optimistic = enrollment.clone();
        self.apply_write(ticket, |snapshot| {
            snapshot.enrollment = Some(optimistic);
        })
        .await;
        info!(course_id = self.course_id, student_id = user.id, "enrolled");
        self.refetch_enrollment(user.id).await;
        Ok(enrollment)
    }

    /// Opens a content item: allowed when enrolled or when the caller is
    /// the course's instructor. Logs the access fire-and-forget, bumps
    /// progress by `floor(100 / content_count)` capped at 100 (writing
    /// `completed` once the cap is reached), then re-fetches the
    /// authoritative enrollment. Returns the opened item.
    pub async fn open_content(&self, content_id: u64) -> Result<ContentItem, ActionError> {
        let user = self.require_user().await?;
        let (enrollment, contents, course) = {
            let inner = self.state.read().await;
            (
                inner.snapshot.enrollment.clone(),
                inner.snapshot.contents.clone(),
                inner.snapshot.course.clone(),
            )
        };

        let item = contents
            .iter()
            .find(|c| c.content_id == content_id)
            .cloned()
            .ok_or(ActionError::UnknownContent(content_id))?;

        let instructor = is_course_instructor(&user, course.as_ref());
        let Some(enrollment) = enrollment else {
            if instructor {
                self.log_access(user.id, content_id);
                return Ok(item);
            }
            return Err(ActionError::NotEnrolled(self.course_id));
        };

        self.log_access(user.id, content_id);

        let step = if contents.is_empty() {
            0
        } else {
            (100 / contents.len() as u64) as u8
        };
        let new_progress = enrollment.progress.saturating_add(step).min(100);
        if new_progress > enrollment.progress {
            self.enrollments
                .update_progress(enrollment.id, new_progress)
                .await?;
            if new_progress >= 100 && !enrollment.completed {
                self.enrollments
                    .update_completion(enrollment.id, true)
                    .await?;
            }
            self.refetch_enrollment(user.id).await;
        }
        Ok(item)
    }

    /// Marks stage 1 complete, then re-fetches the authoritative
    /// enrollment.
    pub async fn complete_stage1(&self) -> Result<(), ActionError> {
        let (user, enrollment) = self.require_enrollment().await?;
        self.enrollments.update_stage1(enrollment.id, true).await?;
        self.refetch_enrollment(user.id).await;
        Ok(())
    }

    /// Marks stage 2 complete. The ordering invariant (stage 1 first) is a
    /// client-side policy: this method refuses out-of-order completion,
    /// but the underlying API does not enforce it.
    pub async fn complete_stage2(&self) -> Result<(), ActionError> {
        let (user, enrollment) = self.require_enrollment().await?;
        if !enrollment.stage1_completed {
            return Err(ActionError::StageOrder);
        }
        self.enrollments.update_stage2(enrollment.id, true).await?;
        self.refetch_enrollment(user.id).await;
        Ok(())
    }

    /// Explicit full-completion write, independent of the numeric
    /// progress.
    pub async fn complete_course(&self) -> Result<(), ActionError> {
        let (user, enrollment) = self.require_enrollment().await?;
        self.enrollments
            .update_completion(enrollment.id, true)
            .await?;
        self.refetch_enrollment(user.id).await;
        Ok(())
    }

    //=====================================================================================
    // Reviews and Content Management
    //=====================================================================================

    /// Submits a review, surfacing any error, then re-fetches the review
    /// list and rating summary (refresh-after-write).
    pub async fn submit_review(
        &self,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Review, ActionError> {
        let user = self.require_user().await?;
        let draft = ReviewDraft {
            course_id: self.course_id,
            user_id: user.id,
            rating,
            comment,
        };
        let review = self.catalog.create_review(&draft).await?;

        let ticket = self.next_ticket();
        match futures::try_join!(
            self.catalog.reviews_for_course(self.course_id),
            self.catalog.rating_summary(self.course_id),
        ) {
            Ok((reviews, summary)) => {
                self.apply_write(ticket, |snapshot| {
                    snapshot.reviews = reviews;
                    snapshot.rating = Some(summary);
                })
                .await;
            }
            Err(e) => {
                debug!(course_id = self.course_id, error = %e, "review refetch failed");
            }
        }
        Ok(review)
    }

    /// Adds a content item; instructor only. The draft's payload invariant
    /// is checked locally before the write.
    pub async fn add_content(&self, draft: ContentDraft) -> Result<ContentItem, ActionError> {
        self.require_instructor().await?;
        draft.validate()?;
        let item = self.content.add_content(&draft).await?;
        self.refetch_contents().await;
        Ok(item)
    }

    /// Deletes a content item; instructor only.
    pub async fn remove_content(&self, content_id: u64) -> Result<(), ActionError> {
        self.require_instructor().await?;
        self.content.delete_content(content_id).await?;
        self.refetch_contents().await;
        Ok(())
    }

    //=====================================================================================
    // Helpers
    //=====================================================================================

    fn log_access(&self, user_id: u64, content_id: u64) {
        let content = Arc::clone(&self.content);
        tokio::spawn(async move {
            if let Err(e) = content.log_access(user_id, content_id).await {
                debug!(user_id, content_id, error = %e, "access log failed");
            }
        });
    }

    async fn refetch_contents(&self) {
        let ticket = self.next_ticket();
        match self.content.content_by_course(self.course_id).await {
            Ok(contents) => {
                self.apply_write(ticket, |snapshot| {
                    snapshot.contents = contents;
                })
                .await;
            }
            Err(e) => {
                debug!(course_id = self.course_id, error = %e, "content refetch failed");
            }
        }
    }

    async fn require_user(&self) -> Result<UserAccount, ActionError> {
        self.session.user().await.ok_or(ActionError::NotSignedIn)
    }

    async fn require_enrollment(&self) -> Result<(UserAccount, Enrollment), ActionError> {
        let user = self.require_user().await?;
        let enrollment = self
            .state
            .read()
            .await
            .snapshot
            .enrollment
            .clone()
            .ok_or(ActionError::NotEnrolled(self.course_id))?;
        Ok((user, enrollment))
    }

    async fn require_instructor(&self) -> Result<UserAccount, ActionError> {
        let user = self.require_user().await?;
        let course = self.state.read().await.snapshot.course.clone();
        if is_course_instructor(&user, course.as_ref()) {
            Ok(user)
        } else {
            Err(ActionError::NotInstructor)
        }
    }
}

fn is_course_instructor(user: &UserAccount, course: Option<&Course>) -> bool {
    user.role == Role::Instructor
        && course.and_then(|c| c.instructor_id) == Some(user.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use learnhub_core::domain::{ContentKind, EnrollmentStats, StoredSession};
    use learnhub_core::ports::SessionVault;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    //=====================================================================================
    // In-memory fakes
    //=====================================================================================

    struct MemoryVault(Mutex<Option<StoredSession>>);

    impl SessionVault for MemoryVault {
        fn load(&self) -> Option<StoredSession> {
            self.0.lock().unwrap().clone()
        }
        fn store(&self, session: &StoredSession) -> PortResult<()> {
            *self.0.lock().unwrap() = Some(session.clone());
            Ok(())
        }
        fn clear(&self) {
            *self.0.lock().unwrap() = None;
        }
    }

    #[derive(Default)]
    struct FakeEnrollments {
        slot: Mutex<Option<Enrollment>>,
        fail_enroll: bool,
    }

    #[async_trait]
    impl EnrollmentApi for FakeEnrollments {
        async fn enroll(&self, student_id: u64, course_id: u64) -> PortResult<Enrollment> {
            if self.fail_enroll {
                return Err(PortError::Api {
                    status: 409,
                    path: "/enrollment-service/api/enrollments".to_string(),
                    message: "already enrolled".to_string(),
                    timestamp: chrono::Utc::now(),
                });
            }
            let enrollment = Enrollment {
                id: 1,
                student_id,
                course_id,
                progress: 0,
                stage1_completed: false,
                stage2_completed: false,
                completed: false,
                enrolled_at: None,
            };
            *self.slot.lock().unwrap() = Some(enrollment.clone());
            Ok(enrollment)
        }

        async fn enrollments_by_student(&self, _student_id: u64) -> PortResult<Vec<Enrollment>> {
            Ok(self.slot.lock().unwrap().clone().into_iter().collect())
        }

        async fn enrollments_by_course(&self, _course_id: u64) -> PortResult<Vec<Enrollment>> {
            Ok(self.slot.lock().unwrap().clone().into_iter().collect())
        }

        async fn update_progress(&self, _id: u64, progress: u8) -> PortResult<Enrollment> {
            let mut slot = self.slot.lock().unwrap();
            let enrollment = slot.as_mut().expect("no enrollment");
            enrollment.progress = progress;
            Ok(enrollment.clone())
        }

        async fn update_completion(&self, _id: u64, completed: bool) -> PortResult<Enrollment> {
            let mut slot = self.slot.lock().unwrap();
            let enrollment = slot.as_mut().expect("no enrollment");
            enrollment.completed = completed;
            Ok(enrollment.clone())
        }

        async fn update_stage1(&self, _id: u64, completed: bool) -> PortResult<Enrollment> {
            let mut slot = self.slot.lock().unwrap();
            let enrollment = slot.as_mut().expect("no enrollment");
            enrollment.stage1_completed = completed;
            Ok(enrollment.clone())
        }

        async fn update_stage2(&self, _id: u64, completed: bool) -> PortResult<Enrollment> {
            let mut slot = self.slot.lock().unwrap();
            let enrollment = slot.as_mut().expect("no enrollment");
            enrollment.stage2_completed = completed;
            Ok(enrollment.clone())
        }

        async fn stats_for_student(&self, _student_id: u64) -> PortResult<EnrollmentStats> {
            Ok(EnrollmentStats {
                total_enrollments: 0,
                completed_courses: 0,
                average_progress: 0.0,
                recent_enrollments: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    struct FakeContent {
        items: Mutex<Vec<ContentItem>>,
    }

    #[async_trait]
    impl ContentApi for FakeContent {
        async fn content_by_course(&self, _course_id: u64) -> PortResult<Vec<ContentItem>> {
            Ok(self.items.lock().unwrap().clone())
        }
        async fn add_content(&self, draft: &ContentDraft) -> PortResult<ContentItem> {
            let mut items = self.items.lock().unwrap();
            let item = ContentItem {
                content_id: items.len() as u64 + 1,
                course_id: draft.course_id,
                kind: draft.kind,
                title: draft.title.clone(),
                url: draft.url.clone(),
                body: draft.body.clone(),
                uploaded_at: None,
            };
            items.push(item.clone());
            Ok(item)
        }
        async fn delete_content(&self, content_id: u64) -> PortResult<()> {
            self.items
                .lock()
                .unwrap()
                .retain(|c| c.content_id != content_id);
            Ok(())
        }
        async fn log_access(&self, _user_id: u64, _content_id: u64) -> PortResult<()> {
            Ok(())
        }
    }

    struct FakeCatalog {
        course: Course,
        reviews: Mutex<Vec<Review>>,
    }

    #[async_trait]
    impl CourseCatalog for FakeCatalog {
        async fn list_courses(&self) -> PortResult<Vec<Course>> {
            Ok(vec![self.course.clone()])
        }
        async fn course_by_id(&self, _course_id: u64) -> PortResult<Course> {
            Ok(self.course.clone())
        }
        async fn create_course(&self, course: &Course) -> PortResult<Course> {
            Ok(course.clone())
        }
        async fn rating_summary(&self, _course_id: u64) -> PortResult<RatingSummary> {
            let reviews = self.reviews.lock().unwrap();
            let count = reviews.len() as u64;
            let average = if count == 0 {
                0.0
            } else {
                reviews.iter().map(|r| r.rating as f64).sum::<f64>() / count as f64
            };
            Ok(RatingSummary { average, count })
        }
        async fn reviews_for_course(&self, _course_id: u64) -> PortResult<Vec<Review>> {
            Ok(self.reviews.lock().unwrap().clone())
        }
        async fn create_review(&self, draft: &ReviewDraft) -> PortResult<Review> {
            let mut reviews = self.reviews.lock().unwrap();
            let review = Review {
                id: reviews.len() as u64 + 1,
                course_id: draft.course_id,
                user_id: draft.user_id,
                rating: draft.rating,
                comment: draft.comment.clone(),
                created_at: None,
            };
            reviews.push(review.clone());
            Ok(review)
        }
    }

    //=====================================================================================
    // Fixture
    //=====================================================================================

    fn content_item(id: u64) -> ContentItem {
        ContentItem {
            content_id: id,
            course_id: 7,
            kind: ContentKind::Video,
            title: format!("Lesson {}", id),
            url: Some(format!("https://cdn.example/{}", id)),
            body: None,
            uploaded_at: None,
        }
    }

    struct Fixture {
        reconciler: CourseReconciler,
        enrollments: Arc<FakeEnrollments>,
        catalog: Arc<FakeCatalog>,
        session: Arc<SessionStore>,
    }

    async fn fixture(content_count: u64) -> Fixture {
        let enrollments = Arc::new(FakeEnrollments::default());
        let content = Arc::new(FakeContent::default());
        *content.items.lock().unwrap() = (1..=content_count).map(content_item).collect();
        let catalog = Arc::new(FakeCatalog {
            course: Course {
                id: 7,
                title: "Systems Programming".to_string(),
                description: None,
                price: 49.0,
                instructor_id: Some(9),
                enrollment_count: None,
                level: None,
                language: None,
                duration: None,
            },
            reviews: Mutex::new(Vec::new()),
        });
        let session = Arc::new(SessionStore::new(Arc::new(MemoryVault(Mutex::new(None)))));
        session
            .establish(
                UserAccount {
                    id: 42,
                    email: "student@example.com".to_string(),
                    display_name: "Student".to_string(),
                    role: Role::Student,
                },
                "tok".to_string(),
            )
            .await
            .unwrap();

        let reconciler = CourseReconciler::new(
            7,
            enrollments.clone(),
            content,
            catalog.clone(),
            session.clone(),
            Duration::from_secs(5),
        );
        reconciler.load().await.unwrap();
        Fixture {
            reconciler,
            enrollments,
            catalog,
            session,
        }
    }

    //=====================================================================================
    // Tests
    //=====================================================================================

    #[tokio::test]
    async fn enroll_then_open_all_content_completes_course() {
        let fx = fixture(4).await;
        let enrollment = fx.reconciler.enroll().await.unwrap();
        assert_eq!(enrollment.progress, 0);

        fx.reconciler.open_content(1).await.unwrap();
        assert_eq!(fx.reconciler.snapshot().await.enrollment.unwrap().progress, 25);

        for id in 2..=4 {
            fx.reconciler.open_content(id).await.unwrap();
        }
        let final_state = fx.reconciler.snapshot().await.enrollment.unwrap();
        assert_eq!(final_state.progress, 100);
        assert!(final_state.completed);
    }

    #[tokio::test]
    async fn progress_is_monotone_and_capped() {
        let fx = fixture(3).await;
        fx.reconciler.enroll().await.unwrap();

        let mut last = 0;
        // Far more opens than items: progress must never regress or pass
        // 100.
        for _ in 0..10 {
            fx.reconciler.open_content(1).await.unwrap();
            let progress = fx.reconciler.snapshot().await.enrollment.unwrap().progress;
            assert!(progress >= last);
            assert!(progress <= 100);
            last = progress;
        }
        // 3 items: floor(100/3) = 33 per open, so 33, 66, 99, then the cap.
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn enroll_is_guarded_against_double_enrollment() {
        let fx = fixture(4).await;
        fx.reconciler.enroll().await.unwrap();
        let err = fx.reconciler.enroll().await.unwrap_err();
        assert!(matches!(err, ActionError::AlreadyEnrolled(7)));
    }

    #[tokio::test]
    async fn failed_enroll_leaves_state_not_enrolled() {
        let mut fx = fixture(4).await;
        // Rebuild with a failing enrollment port.
        let failing = Arc::new(FakeEnrollments {
            fail_enroll: true,
            ..Default::default()
        });
        fx.reconciler = CourseReconciler::new(
            7,
            failing,
            Arc::new(FakeContent::default()),
            fx.catalog.clone(),
            fx.session.clone(),
            Duration::from_secs(5),
        );
        fx.reconciler.load().await.unwrap();

        let err = fx.reconciler.enroll().await.unwrap_err();
        assert!(matches!(err, ActionError::Port(PortError::Api { status: 409, .. })));
        assert!(fx.reconciler.snapshot().await.enrollment.is_none());
    }

    #[tokio::test]
    async fn open_content_requires_enrollment_or_instructorship() {
        let fx = fixture(4).await;
        let err = fx.reconciler.open_content(1).await.unwrap_err();
        assert!(matches!(err, ActionError::NotEnrolled(7)));

        // The course's instructor may open content without enrolling, and
        // no progress is ever written for them.
        fx.session
            .establish(
                UserAccount {
                    id: 9,
                    email: "instructor@example.com".to_string(),
                    display_name: "Instructor".to_string(),
                    role: Role::Instructor,
                },
                "tok-instr".to_string(),
            )
            .await
            .unwrap();
        let item = fx.reconciler.open_content(1).await.unwrap();
        assert_eq!(item.content_id, 1);
        assert!(fx.enrollments.slot.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn stage2_is_gated_on_stage1() {
        let fx = fixture(4).await;
        fx.reconciler.enroll().await.unwrap();

        let err = fx.reconciler.complete_stage2().await.unwrap_err();
        assert!(matches!(err, ActionError::StageOrder));
        let enrollment = fx.reconciler.snapshot().await.enrollment.unwrap();
        assert!(!enrollment.stage2_completed && !enrollment.stage1_completed);

        fx.reconciler.complete_stage1().await.unwrap();
        fx.reconciler.complete_stage2().await.unwrap();
        let enrollment = fx.reconciler.snapshot().await.enrollment.unwrap();
        assert!(enrollment.stage1_completed && enrollment.stage2_completed);
    }

    #[tokio::test]
    async fn completed_is_independent_of_progress() {
        let fx = fixture(4).await;
        fx.reconciler.enroll().await.unwrap();
        fx.reconciler.complete_course().await.unwrap();
        let enrollment = fx.reconciler.snapshot().await.enrollment.unwrap();
        assert!(enrollment.completed);
        assert_eq!(enrollment.progress, 0);
    }

    /// Serves an empty course roll on the first call, holding the response
    /// until released; later calls answer immediately with one enrollment.
    struct GatedEnrollments {
        calls: AtomicUsize,
        gate: tokio::sync::Notify,
    }

    #[async_trait]
    impl EnrollmentApi for GatedEnrollments {
        async fn enroll(&self, _student_id: u64, _course_id: u64) -> PortResult<Enrollment> {
            unimplemented!("not exercised by this fake")
        }
        async fn enrollments_by_student(&self, _student_id: u64) -> PortResult<Vec<Enrollment>> {
            Ok(Vec::new())
        }
        async fn enrollments_by_course(&self, course_id: u64) -> PortResult<Vec<Enrollment>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.gate.notified().await;
                Ok(Vec::new())
            } else {
                Ok(vec![Enrollment {
                    id: 1,
                    student_id: 42,
                    course_id,
                    progress: 50,
                    stage1_completed: false,
                    stage2_completed: false,
                    completed: false,
                    enrolled_at: None,
                }])
            }
        }
        async fn update_progress(&self, _id: u64, _progress: u8) -> PortResult<Enrollment> {
            unimplemented!("not exercised by this fake")
        }
        async fn update_completion(&self, _id: u64, _completed: bool) -> PortResult<Enrollment> {
            unimplemented!("not exercised by this fake")
        }
        async fn update_stage1(&self, _id: u64, _completed: bool) -> PortResult<Enrollment> {
            unimplemented!("not exercised by this fake")
        }
        async fn update_stage2(&self, _id: u64, _completed: bool) -> PortResult<Enrollment> {
            unimplemented!("not exercised by this fake")
        }
        async fn stats_for_student(&self, _student_id: u64) -> PortResult<EnrollmentStats> {
            unimplemented!("not exercised by this fake")
        }
    }

    #[tokio::test]
    async fn stale_sync_response_is_discarded() {
        let fx = fixture(4).await;
        let enrollments = Arc::new(GatedEnrollments {
            calls: AtomicUsize::new(0),
            gate: tokio::sync::Notify::new(),
        });
        let reconciler = Arc::new(CourseReconciler::new(
            7,
            enrollments.clone(),
            Arc::new(FakeContent::default()),
            fx.catalog.clone(),
            fx.session.clone(),
            Duration::from_secs(5),
        ));

        // The first sync takes its ticket, then stalls inside the fetch.
        let first = {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { reconciler.sync().await })
        };
        while enrollments.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // A later sync completes while the first is still in flight.
        reconciler.sync().await;
        assert_eq!(reconciler.snapshot().await.enrollment_count, 1);

        // The stale response finally lands; its apply must be discarded.
        enrollments.gate.notify_one();
        first.await.unwrap();
        let snapshot = reconciler.snapshot().await;
        assert_eq!(snapshot.enrollment_count, 1);
        assert_eq!(snapshot.enrollment.unwrap().progress, 50);
    }

    #[tokio::test]
    async fn in_flight_sync_cannot_overwrite_a_later_write() {
        let fx = fixture(4).await;

        // A sync issued before the write whose response arrives after it.
        let stale_ticket = fx.reconciler.next_ticket();
        let stale = fx.reconciler.fetch_snapshot().await.unwrap();

        fx.reconciler.enroll().await.unwrap();
        fx.reconciler.open_content(1).await.unwrap();
        assert_eq!(fx.reconciler.snapshot().await.enrollment.unwrap().progress, 25);

        fx.reconciler.apply_snapshot(stale_ticket, stale).await;
        let enrollment = fx.reconciler.snapshot().await.enrollment.unwrap();
        assert_eq!(enrollment.progress, 25);
    }

    #[tokio::test]
    async fn submit_review_refreshes_reviews_and_rating() {
        let fx = fixture(4).await;
        fx.reconciler
            .submit_review(5, Some("great".to_string()))
            .await
            .unwrap();
        let snapshot = fx.reconciler.snapshot().await;
        assert_eq!(snapshot.reviews.len(), 1);
        assert_eq!(snapshot.rating.unwrap().count, 1);
        assert_eq!(fx.catalog.reviews.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn content_management_is_instructor_gated() {
        let fx = fixture(2).await;
        let draft = ContentDraft {
            course_id: 7,
            kind: ContentKind::Text,
            title: "Syllabus".to_string(),
            url: None,
            body: Some("week by week".to_string()),
        };

        let err = fx.reconciler.add_content(draft.clone()).await.unwrap_err();
        assert!(matches!(err, ActionError::NotInstructor));

        fx.session
            .establish(
                UserAccount {
                    id: 9,
                    email: "instructor@example.com".to_string(),
                    display_name: "Instructor".to_string(),
                    role: Role::Instructor,
                },
                "tok-instr".to_string(),
            )
            .await
            .unwrap();
        let item = fx.reconciler.add_content(draft).await.unwrap();
        assert_eq!(fx.reconciler.snapshot().await.contents.len(), 3);

        fx.reconciler.remove_content(item.content_id).await.unwrap();
        assert_eq!(fx.reconciler.snapshot().await.contents.len(), 2);
    }

    #[tokio::test]
    async fn invalid_content_draft_is_rejected_locally() {
        let fx = fixture(1).await;
        fx.session
            .establish(
                UserAccount {
                    id: 9,
                    email: "instructor@example.com".to_string(),
                    display_name: "Instructor".to_string(),
                    role: Role::Instructor,
                },
                "tok-instr".to_string(),
            )
            .await
            .unwrap();

        let draft = ContentDraft {
            course_id: 7,
            kind: ContentKind::Video,
            title: "Broken".to_string(),
            url: None,
            body: None,
        };
        let err = fx.reconciler.add_content(draft).await.unwrap_err();
        assert!(matches!(err, ActionError::Content(_)));
        // Nothing was written.
        assert_eq!(fx.reconciler.snapshot().await.contents.len(), 1);
    }
}
