//! services/client/src/views.rs
//!
//! Read-only projections backing the catalog, course detail and dashboard
//! screens. Each `load` issues its fetches in parallel and surfaces the
//! first error; ongoing refresh of the course detail is the reconciler's
//! job, not these projections'.

use learnhub_core::domain::{
    ContentItem, Course, Enrollment, EnrollmentStats, Payment, RatingSummary, Review,
};
use learnhub_core::ports::{
    ContentApi, CourseCatalog, EnrollmentApi, PaymentApi, PortResult,
};

/// One catalog row: the course plus its enrollment count (zero when the
/// gateway omits it).
#[derive(Debug, Clone)]
pub struct CourseCard {
    pub course: Course,
    pub enrollment_count: u64,
}

pub async fn catalog(catalog: &dyn CourseCatalog) -> PortResult<Vec<CourseCard>> {
    let courses = catalog.list_courses().await?;
    Ok(courses
        .into_iter()
        .map(|course| {
            let enrollment_count = course.enrollment_count.unwrap_or(0);
            CourseCard {
                course,
                enrollment_count,
            }
        })
        .collect())
}

/// The initial course-detail screen, fetched in one parallel round.
#[derive(Debug, Clone)]
pub struct CourseDetail {
    pub course: Course,
    pub rating: RatingSummary,
    pub reviews: Vec<Review>,
    pub contents: Vec<ContentItem>,
}

impl CourseDetail {
    pub async fn load(
        catalog: &dyn CourseCatalog,
        content: &dyn ContentApi,
        course_id: u64,
    ) -> PortResult<Self> {
        let (course, rating, reviews, contents) = futures::try_join!(
            catalog.course_by_id(course_id),
            catalog.rating_summary(course_id),
            catalog.reviews_for_course(course_id),
            content.content_by_course(course_id),
        )?;
        Ok(Self {
            course,
            rating,
            reviews,
            contents,
        })
    }
}

/// The signed-in student's home screen: their enrollments, aggregate
/// figures and payment history.
#[derive(Debug, Clone)]
pub struct StudentDashboard {
    pub enrollments: Vec<Enrollment>,
    pub stats: EnrollmentStats,
    pub payments: Vec<Payment>,
}

impl StudentDashboard {
    pub async fn load(
        enrollments: &dyn EnrollmentApi,
        payments: &dyn PaymentApi,
        student_id: u64,
    ) -> PortResult<Self> {
        let (enrolled, stats, history) = futures::try_join!(
            enrollments.enrollments_by_student(student_id),
            enrollments.stats_for_student(student_id),
            payments.payments_for_user(student_id),
        )?;
        Ok(Self {
            enrollments: enrolled,
            stats,
            payments: history,
        })
    }
}

/// One row of the instructor dashboard.
#[derive(Debug, Clone)]
pub struct InstructorCourse {
    pub course: Course,
    pub enrollment_count: u64,
}

/// The instructor's home screen: their courses with live enrollment
/// counts.
#[derive(Debug, Clone)]
pub struct InstructorDashboard {
    pub courses: Vec<InstructorCourse>,
}

impl InstructorDashboard {
    pub async fn load(
        catalog: &dyn CourseCatalog,
        enrollments: &dyn EnrollmentApi,
        instructor_id: u64,
    ) -> PortResult<Self> {
        let owned: Vec<Course> = catalog
            .list_courses()
            .await?
            .into_iter()
            .filter(|c| c.instructor_id == Some(instructor_id))
            .collect();

        let counts = futures::future::try_join_all(
            owned
                .iter()
                .map(|c| enrollments.enrollments_by_course(c.id)),
        )
        .await?;

        let courses = owned
            .into_iter()
            .zip(counts)
            .map(|(course, rolls)| InstructorCourse {
                course,
                enrollment_count: rolls.len() as u64,
            })
            .collect();
        Ok(Self { courses })
    }
}
