//! Observable state container: one value, published to subscribers as
//! immutable snapshots.
//!
//! All core state (auth, session list, conversation thread) lives in cells so
//! a front-end can subscribe for re-renders while tests read plain snapshots.

use tokio::sync::watch;

/// A single shared state value. Writers replace or modify it; readers take
/// cloned snapshots or subscribe for change notifications.
pub struct StateCell<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> StateCell<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Clone of the current value.
    pub fn snapshot(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Modify the value in place and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Receiver that observes every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + Default> Default for StateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_is_detached_from_later_writes() {
        let cell = StateCell::new(vec![1]);
        let before = cell.snapshot();
        cell.update(|v| v.push(2));
        assert_eq!(before, vec![1]);
        assert_eq!(cell.snapshot(), vec![1, 2]);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let cell = StateCell::new(0u32);
        let mut rx = cell.subscribe();
        cell.set(7);
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow(), 7);
    }
}
