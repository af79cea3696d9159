pub mod domain;
pub mod ports;

pub use domain::{
    AuthReply, ContentDraft, ContentItem, ContentKind, ContentPayloadError, Course, Enrollment,
    EnrollmentStats, Notification, NotificationKind, Payment, PaymentStatus, RatingSummary,
    RegisterProfile, Review, ReviewDraft, Role, StoredSession, UserAccount,
};
pub use ports::{
    AuthApi, ContentApi, CourseCatalog, EnrollmentApi, NotificationApi, PaymentApi, PortError,
    PortResult, SessionVault,
};
