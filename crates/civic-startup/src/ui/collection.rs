//! A list that can be mutated from any thread and observed on the UI thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::util::{lock, panic_message};

use super::marshal::UiDispatcher;

/// A change notification, delivered on the UI thread in mutation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange<T> {
    Added { index: usize, items: Vec<T> },
    Removed { index: usize, item: T },
    Replaced { index: usize, old: T, new: T },
    /// The whole contents changed; observers should re-read everything.
    Reset { items: Vec<T> },
}

pub type SubscriptionId = u64;

type Observer<T> = Arc<dyn Fn(&CollectionChange<T>) + Send + Sync>;

struct State<T> {
    items: Vec<T>,
    observers: Vec<(SubscriptionId, Observer<T>)>,
    next_id: SubscriptionId,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    ui: UiDispatcher,
}

/// Thread-safe observable list backing a view.
///
/// Mutations are serialized by an internal lock. Notifications are posted to
/// the UI loop while the lock is held, so their order matches the order of
/// the mutations. Bulk operations emit a single notification.
pub struct ObservableCollection<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ObservableCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableCollection<T> {
    pub fn new(ui: UiDispatcher) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    items: Vec::new(),
                    observers: Vec::new(),
                    next_id: 1,
                }),
                ui,
            }),
        }
    }

    /// Register an observer. It is called on the UI thread only.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&CollectionChange<T>) + Send + Sync + 'static,
    {
        let mut state = lock(&self.inner.state);
        let id = state.next_id;
        state.next_id += 1;
        state.observers.push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = lock(&self.inner.state);
        let before = state.observers.len();
        state.observers.retain(|(i, _)| *i != id);
        state.observers.len() != before
    }

    pub fn push(&self, item: T) {
        let mut state = lock(&self.inner.state);
        let index = state.items.len();
        state.items.push(item.clone());
        self.notify(&state, CollectionChange::Added {
            index,
            items: vec![item],
        });
    }

    /// Append many items with one notification.
    pub fn extend<I: IntoIterator<Item = T>>(&self, items: I) {
        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            return;
        }
        let mut state = lock(&self.inner.state);
        let index = state.items.len();
        state.items.extend(items.iter().cloned());
        self.notify(&state, CollectionChange::Added { index, items });
    }

    /// Insert at `index`, clamped to the current length.
    pub fn insert(&self, index: usize, item: T) {
        let mut state = lock(&self.inner.state);
        let index = index.min(state.items.len());
        state.items.insert(index, item.clone());
        self.notify(&state, CollectionChange::Added {
            index,
            items: vec![item],
        });
    }

    pub fn remove(&self, index: usize) -> Option<T> {
        let mut state = lock(&self.inner.state);
        if index >= state.items.len() {
            return None;
        }
        let item = state.items.remove(index);
        self.notify(&state, CollectionChange::Removed {
            index,
            item: item.clone(),
        });
        Some(item)
    }

    pub fn replace(&self, index: usize, item: T) -> Option<T> {
        let mut state = lock(&self.inner.state);
        let slot = state.items.get_mut(index)?;
        let old = std::mem::replace(slot, item.clone());
        self.notify(&state, CollectionChange::Replaced {
            index,
            old: old.clone(),
            new: item,
        });
        Some(old)
    }

    pub fn clear(&self) {
        let mut state = lock(&self.inner.state);
        if state.items.is_empty() {
            return;
        }
        state.items.clear();
        self.notify(&state, CollectionChange::Reset { items: Vec::new() });
    }

    /// Swap the contents wholesale, as after a reload.
    pub fn replace_all<I: IntoIterator<Item = T>>(&self, items: I) {
        let mut state = lock(&self.inner.state);
        state.items = items.into_iter().collect();
        let items = state.items.clone();
        self.notify(&state, CollectionChange::Reset { items });
    }

    /// Run several mutations under one lock and emit a single `Reset`.
    pub fn batch<F, R>(&self, mutate: F) -> R
    where
        F: FnOnce(&mut Vec<T>) -> R,
    {
        let mut state = lock(&self.inner.state);
        let result = mutate(&mut state.items);
        let items = state.items.clone();
        self.notify(&state, CollectionChange::Reset { items });
        result
    }

    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.inner.state).items.clone()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        lock(&self.inner.state).items.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, state: &State<T>, change: CollectionChange<T>) {
        if state.observers.is_empty() {
            return;
        }
        let observers: Vec<Observer<T>> =
            state.observers.iter().map(|(_, o)| o.clone()).collect();
        let posted = self.inner.ui.post(move || {
            for observer in &observers {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer(&change))) {
                    tracing::warn!(
                        panic = %panic_message(payload.as_ref()),
                        "collection observer panicked"
                    );
                }
            }
        });
        if posted.is_err() {
            tracing::debug!("ui loop closed, dropping collection notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::marshal::UiLoop;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn concurrent_adds_land_exactly_once() {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let dispatcher = ui.dispatcher();
        let list = ObservableCollection::new(dispatcher.clone());

        let notified = Arc::new(AtomicUsize::new(0));
        let off_thread = Arc::new(AtomicBool::new(false));
        {
            let notified = notified.clone();
            let off_thread = off_thread.clone();
            let d = dispatcher.clone();
            list.subscribe(move |change| {
                if !d.is_ui_thread() {
                    off_thread.store(true, Ordering::SeqCst);
                }
                if let CollectionChange::Added { items, .. } = change {
                    notified.fetch_add(items.len(), Ordering::SeqCst);
                }
            });
        }

        const THREADS: usize = 8;
        const PER_THREAD: usize = 250;
        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let list = list.clone();
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        list.push(t * PER_THREAD + i);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        // Flush: the loop is FIFO, so every notification has run after this.
        dispatcher.run_on_ui(|| ()).unwrap();

        let mut items = list.snapshot();
        items.sort_unstable();
        assert_eq!(items, (0..THREADS * PER_THREAD).collect::<Vec<_>>());
        assert_eq!(notified.load(Ordering::SeqCst), THREADS * PER_THREAD);
        assert!(!off_thread.load(Ordering::SeqCst));
    }

    #[test]
    fn notifications_follow_mutation_order() {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let dispatcher = ui.dispatcher();
        let list = ObservableCollection::new(dispatcher.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let log = log.clone();
            list.subscribe(move |change: &CollectionChange<&'static str>| {
                log.lock().unwrap().push(change.clone());
            });
        }

        list.push("general");
        list.insert(0, "capital");
        list.replace(1, "debt-service");
        list.remove(0);
        dispatcher.run_on_ui(|| ()).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                CollectionChange::Added { index: 0, items: vec!["general"] },
                CollectionChange::Added { index: 0, items: vec!["capital"] },
                CollectionChange::Replaced { index: 1, old: "general", new: "debt-service" },
                CollectionChange::Removed { index: 0, item: "capital" },
            ]
        );
        assert_eq!(list.snapshot(), vec!["debt-service"]);
    }

    #[test]
    fn bulk_operations_emit_one_notification() {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let dispatcher = ui.dispatcher();
        let list = ObservableCollection::new(dispatcher.clone());
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            list.subscribe(move |_: &CollectionChange<u32>| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        list.extend(0..100);
        list.batch(|items| {
            items.retain(|v| v % 2 == 0);
            items.push(1000);
        });
        list.replace_all(vec![1, 2, 3]);
        dispatcher.run_on_ui(|| ()).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn panicking_observer_does_not_stop_others() {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let dispatcher = ui.dispatcher();
        let list = ObservableCollection::new(dispatcher.clone());
        let seen = Arc::new(AtomicUsize::new(0));

        list.subscribe(|_: &CollectionChange<u8>| panic!("bad binding"));
        {
            let seen = seen.clone();
            list.subscribe(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }

        list.push(1);
        list.push(2);
        dispatcher.run_on_ui(|| ()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let dispatcher = ui.dispatcher();
        let list = ObservableCollection::new(dispatcher.clone());
        let seen = Arc::new(AtomicUsize::new(0));
        let id = {
            let seen = seen.clone();
            list.subscribe(move |_: &CollectionChange<u8>| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        };

        list.push(1);
        assert!(list.unsubscribe(id));
        list.push(2);
        dispatcher.run_on_ui(|| ()).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!list.unsubscribe(id));
    }

    #[test]
    fn out_of_range_mutations_are_ignored() {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let list: ObservableCollection<u8> = ObservableCollection::new(ui.dispatcher());
        assert_eq!(list.remove(3), None);
        assert_eq!(list.replace(0, 1), None);
        list.insert(10, 7);
        assert_eq!(list.snapshot(), vec![7]);
        assert!(list.get(1).is_none());
    }
}
