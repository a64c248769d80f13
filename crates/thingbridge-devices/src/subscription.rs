/*!
 * Subscriptions.
 *
 * A subscription pairs a service endpoint with the two listener tasks a
 * driver attaches to it: one on the failure channel, one on the
 * state-change channel. Detaching is idempotent and leaves no listener
 * behind; a subscription can only reach the failed status through
 * `mark_failed`, which detaches first, so a failed subscription never
 * has listeners attached.
 */
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Status of a per-service subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    /// The subscribe request is outstanding
    Pending,
    /// The subscribe request was confirmed
    Active,
    /// The subscription failed; its listeners are detached
    Failed,
}

/// The two listener tasks attached to a service endpoint
#[derive(Debug)]
struct ListenerPair {
    failed: JoinHandle<()>,
    state_changed: JoinHandle<()>,
}

#[derive(Debug)]
struct SubscriptionInner {
    service_type: String,
    status: Mutex<SubscriptionStatus>,
    listeners: Mutex<Option<ListenerPair>>,
}

/// A per-service state-change subscription owned by a driver instance
#[derive(Debug, Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    /// Create a pending subscription with no listeners attached
    pub fn new<S: Into<String>>(service_type: S) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                service_type: service_type.into(),
                status: Mutex::new(SubscriptionStatus::Pending),
                listeners: Mutex::new(None),
            }),
        }
    }

    /// The service-type URN this subscription covers
    pub fn service_type(&self) -> &str {
        &self.inner.service_type
    }

    /// The current subscription status
    pub fn status(&self) -> SubscriptionStatus {
        *self
            .inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether listener tasks are currently attached
    pub fn has_listeners(&self) -> bool {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Attach the failure and state-change listener tasks.
    ///
    /// A subscription that already failed refuses the listeners and
    /// stops their tasks, so the failed-implies-listener-free invariant
    /// holds even when the failure races the attach.
    pub(crate) fn attach_listeners(&self, failed: JoinHandle<()>, state_changed: JoinHandle<()>) {
        if self.status() == SubscriptionStatus::Failed {
            failed.abort();
            state_changed.abort();
            return;
        }

        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *listeners = Some(ListenerPair {
            failed,
            state_changed,
        });
    }

    /// Detach both listeners. Safe to call again once detached.
    pub(crate) fn detach_listeners(&self) {
        let taken = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(pair) = taken {
            pair.failed.abort();
            pair.state_changed.abort();
        }
    }

    /// Record the subscribe confirmation
    pub(crate) fn mark_active(&self) {
        let mut status = self
            .inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *status == SubscriptionStatus::Pending {
            *status = SubscriptionStatus::Active;
        }
    }

    /// Fail the subscription: detach both listeners, then record the
    /// failed status. The ordering is what keeps a failed subscription
    /// listener-free.
    pub(crate) fn mark_failed(&self) {
        self.detach_listeners();
        let mut status = self
            .inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *status = SubscriptionStatus::Failed;
    }
}
