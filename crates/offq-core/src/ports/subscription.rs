//! Subscription - 購読解除のハンドル

use std::fmt;

/// Disposer returned by every subscribe-style call (connectivity listeners,
/// event listeners).
///
/// Dropping a `Subscription` does NOT unsubscribe; call [`Subscription::unsubscribe`].
#[must_use = "dropping a Subscription keeps the listener registered; call `unsubscribe` to remove it"]
pub struct Subscription {
    disposer: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(disposer: impl FnOnce() + Send + 'static) -> Self {
        Self {
            disposer: Some(Box::new(disposer)),
        }
    }

    /// Remove the listener. Consumes the handle, so it runs at most once.
    pub fn unsubscribe(mut self) {
        if let Some(disposer) = self.disposer.take() {
            disposer();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.disposer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unsubscribe_runs_disposer_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sub = {
            let calls = Arc::clone(&calls);
            Subscription::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
