//! services/client/src/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::notifications::NotificationCache;
use crate::reconciler::CourseReconciler;
use crate::session::SessionStore;
use learnhub_core::ports::{AuthApi, ContentApi, CourseCatalog, EnrollmentApi, PaymentApi};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across the Whole Client)
//=========================================================================================

/// The shared application state, created once at startup and passed to all
/// screens.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: Arc<SessionStore>,
    pub auth: Arc<dyn AuthApi>,
    pub catalog: Arc<dyn CourseCatalog>,
    pub enrollments: Arc<dyn EnrollmentApi>,
    pub content: Arc<dyn ContentApi>,
    pub payments: Arc<dyn PaymentApi>,
    pub notifications: Arc<NotificationCache>,
}

impl AppState {
    /// Creates the reconciler backing one course-detail screen, polling at
    /// the configured enrollment interval.
    pub fn course_view(&self, course_id: u64) -> CourseReconciler {
        CourseReconciler::new(
            course_id,
            self.enrollments.clone(),
            self.content.clone(),
            self.catalog.clone(),
            self.session.clone(),
            self.config.enrollment_poll,
        )
    }
}
