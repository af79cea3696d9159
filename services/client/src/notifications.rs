//! services/client/src/notifications.rs
//!
//! The notification cache: a polled snapshot of the current user's
//! notifications plus transient, auto-dismissing popups. Background fetch
//! failures never evict the cached list (stale-but-available); writes are
//! followed by exactly one unconditional refresh whether or not the write
//! succeeded.

use learnhub_core::domain::{Notification, NotificationKind};
use learnhub_core::ports::NotificationApi;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::SessionStore;

/// A transient visual notice, shown immediately and dismissed after the
/// configured TTL without any server round-trip.
#[derive(Debug, Clone)]
pub struct Popup {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    expires_at: Instant,
}

pub struct NotificationCache {
    api: Arc<dyn NotificationApi>,
    session: Arc<SessionStore>,
    items: RwLock<Vec<Notification>>,
    popups: Mutex<Vec<Popup>>,
    focus: Notify,
    poll_interval: Duration,
    popup_ttl: Duration,
}

impl NotificationCache {
    pub fn new(
        api: Arc<dyn NotificationApi>,
        session: Arc<SessionStore>,
        poll_interval: Duration,
        popup_ttl: Duration,
    ) -> Self {
        Self {
            api,
            session,
            items: RwLock::new(Vec::new()),
            popups: Mutex::new(Vec::new()),
            focus: Notify::new(),
            poll_interval,
            popup_ttl,
        }
    }

    /// Fetches the current user's notifications and replaces the cached
    /// list wholesale. A fetch failure leaves the existing list untouched
    /// and is not surfaced to the caller.
    pub async fn refresh(&self) {
        let Some(user) = self.session.user().await else {
            return;
        };
        match self.api.notifications_for_user(user.id).await {
            Ok(list) => {
                *self.items.write().await = list;
            }
            Err(e) => {
                debug!(error = %e, "notification refresh failed, keeping cached list");
            }
        }
    }

    pub async fn items(&self) -> Vec<Notification> {
        self.items.read().await.clone()
    }

    /// Issues the mark-read write, swallowing its error, then refreshes
    /// exactly once regardless of the outcome.
    pub async fn mark_read(&self, notification_id: u64) {
        if let Err(e) = self.api.mark_read(notification_id).await {
            debug!(notification_id, error = %e, "mark-read failed");
        }
        self.refresh().await;
    }

    /// Issues the delete write with the same contract as [`mark_read`].
    ///
    /// [`mark_read`]: NotificationCache::mark_read
    pub async fn remove(&self, notification_id: u64) {
        if let Err(e) = self.api.delete(notification_id).await {
            debug!(notification_id, error = %e, "notification delete failed");
        }
        self.refresh().await;
    }

    /// Presents a popup immediately and fires a best-effort persist to the
    /// server whose failure is swallowed. The popup is visible until its
    /// TTL elapses.
    pub async fn push_popup(&self, title: &str, message: &str) -> Popup {
        let popup = Popup {
            id: Uuid::new_v4(),
            title: title.to_string(),
            message: message.to_string(),
            expires_at: Instant::now() + self.popup_ttl,
        };
        self.popups
            .lock()
            .expect("popup lock poisoned")
            .push(popup.clone());

        if let Some(user) = self.session.user().await {
            let api = Arc::clone(&self.api);
            let (title, message) = (popup.title.clone(), popup.message.clone());
            tokio::spawn(async move {
                if let Err(e) = api
                    .send(user.id, &title, &message, NotificationKind::InApp)
                    .await
                {
                    debug!(error = %e, "popup persist failed");
                }
            });
        }
        popup
    }

    /// The currently visible popups; expired ones are pruned on read.
    pub fn visible_popups(&self) -> Vec<Popup> {
        let now = Instant::now();
        let mut popups = self.popups.lock().expect("popup lock poisoned");
        popups.retain(|p| p.expires_at > now);
        popups.clone()
    }

    /// Requests an immediate refresh from the poller, the equivalent of a
    /// window regaining focus.
    pub fn notify_focus(&self) {
        self.focus.notify_one();
    }

    /// The refresh loop: wakes on a fixed interval or a focus signal and
    /// refreshes while a user is present. Runs until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("notification poller stopped");
                    return;
                }
                _ = ticker.tick() => {}
                _ = self.focus.notified() => {}
            }
            if self.session.is_authenticated().await {
                self.refresh().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use learnhub_core::domain::{Role, StoredSession, UserAccount};
    use learnhub_core::ports::{PortError, PortResult, SessionVault};
    use std::sync::atomic::{AtomicUsize, Ordering};

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
    struct CountingApi {
        list_calls: AtomicUsize,
        fail_list: std::sync::atomic::AtomicBool,
        fail_writes: bool,
        served: Mutex<Vec<Notification>>,
    }

    impl CountingApi {
        fn transport() -> PortError {
            PortError::Transport("connection reset".to_string())
        }
    }

    #[async_trait]
    impl NotificationApi for CountingApi {
        async fn send(
            &self,
            user_id: u64,
            title: &str,
            message: &str,
            kind: NotificationKind,
        ) -> PortResult<Notification> {
            if self.fail_writes {
                return Err(Self::transport());
            }
            Ok(Notification {
                id: 1,
                user_id,
                title: title.to_string(),
                message: message.to_string(),
                kind,
                read: false,
                created_at: None,
            })
        }

        async fn notifications_for_user(&self, _user_id: u64) -> PortResult<Vec<Notification>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(Self::transport());
            }
            Ok(self.served.lock().unwrap().clone())
        }

        async fn mark_read(&self, _notification_id: u64) -> PortResult<()> {
            if self.fail_writes {
                return Err(Self::transport());
            }
            Ok(())
        }

        async fn delete(&self, _notification_id: u64) -> PortResult<()> {
            if self.fail_writes {
                return Err(Self::transport());
            }
            Ok(())
        }
    }

    async fn signed_in_session() -> Arc<SessionStore> {
        let store = Arc::new(SessionStore::new(Arc::new(MemoryVault(Mutex::new(None)))));
        store
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
        store
    }

    fn sample(id: u64) -> Notification {
        Notification {
            id,
            user_id: 42,
            title: "t".to_string(),
            message: "m".to_string(),
            kind: NotificationKind::InApp,
            read: false,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn mark_read_refreshes_exactly_once_even_on_failure() {
        let api = Arc::new(CountingApi {
            fail_writes: true,
            ..Default::default()
        });
        let cache = NotificationCache::new(
            api.clone(),
            signed_in_session().await,
            Duration::from_secs(15),
            Duration::from_secs(4),
        );

        cache.mark_read(7).await;
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stale_list() {
        let api = Arc::new(CountingApi::default());
        *api.served.lock().unwrap() = vec![sample(1), sample(2)];
        let cache = NotificationCache::new(
            api.clone(),
            signed_in_session().await,
            Duration::from_secs(15),
            Duration::from_secs(4),
        );

        cache.refresh().await;
        assert_eq!(cache.items().await.len(), 2);

        api.fail_list.store(true, Ordering::SeqCst);
        cache.refresh().await;
        assert_eq!(cache.items().await.len(), 2);
    }

    #[tokio::test]
    async fn refresh_replaces_list_wholesale() {
        let api = Arc::new(CountingApi::default());
        *api.served.lock().unwrap() = vec![sample(1), sample(2)];
        let cache = NotificationCache::new(
            api.clone(),
            signed_in_session().await,
            Duration::from_secs(15),
            Duration::from_secs(4),
        );
        cache.refresh().await;

        *api.served.lock().unwrap() = vec![sample(3)];
        cache.refresh().await;
        let items = cache.items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn popups_expire_after_ttl() {
        let api = Arc::new(CountingApi::default());
        let cache = NotificationCache::new(
            api,
            signed_in_session().await,
            Duration::from_secs(15),
            Duration::from_secs(4),
        );

        cache.push_popup("Enrolled", "Welcome to the course").await;
        assert_eq!(cache.visible_popups().len(), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.visible_popups().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn poller_refreshes_on_interval_and_focus() {
        let api = Arc::new(CountingApi::default());
        let cache = Arc::new(NotificationCache::new(
            api.clone(),
            signed_in_session().await,
            Duration::from_secs(15),
            Duration::from_secs(4),
        ));
        let cancel = CancellationToken::new();
        let worker = {
            let cache = Arc::clone(&cache);
            let cancel = cancel.clone();
            tokio::spawn(async move { cache.run(cancel).await })
        };

        // First interval tick fires immediately.
        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;
        let after_first = api.list_calls.load(Ordering::SeqCst);
        assert!(after_first >= 1);

        cache.notify_focus();
        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;
        assert!(api.list_calls.load(Ordering::SeqCst) > after_first);

        cancel.cancel();
        worker.await.unwrap();
    }
}
