use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// An observable, editable value: one input of a form.
pub trait FieldWatcher<T>: Send + Sync {
    /// Register a callback run after every value change.
    fn on_change(&self, callback: ChangeCallback) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);
    fn current_value(&self) -> T;
    /// Replace the value; listeners run only when it actually changed.
    fn set_value(&self, value: T);
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;
}

struct FieldState<T> {
    value: T,
    enabled: bool,
    listeners: Vec<(ListenerId, ChangeCallback)>,
}

/// In-memory [`FieldWatcher`].
pub struct Field<T> {
    state: Mutex<FieldState<T>>,
    next_id: AtomicU64,
}

impl<T> Field<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(FieldState {
                value,
                enabled: true,
                listeners: Vec::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, FieldState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }
}

impl<T: Default> Default for Field<T> {
    fn default() -> Self {
        Field::new(T::default())
    }
}

impl<T> FieldWatcher<T> for Field<T>
where
    T: Clone + PartialEq + Send,
{
    fn on_change(&self, callback: ChangeCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.state().listeners.push((id, callback));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.state().listeners.retain(|(l, _)| *l != id);
    }

    fn current_value(&self) -> T {
        self.state().value.clone()
    }

    fn set_value(&self, value: T) {
        let listeners: Vec<ChangeCallback> = {
            let mut state = self.state();
            if state.value == value {
                return;
            }
            state.value = value;
            state.listeners.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        // lock released: listeners may read or write this field
        for listener in listeners {
            listener();
        }
    }

    fn set_enabled(&self, enabled: bool) {
        self.state().enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.state().enabled
    }
}
