use super::{Backend, StateScope};
use std::ops::Deref;

// Captures the host pipeline state on creation and puts it back when dropped, so every exit
// path of a pass running inside a foreign render loop leaves the host bindings untouched.
// Nothing may be bound between the capture and the first use of the guard.
pub struct StateGuard<'a, B: Backend> {
    backend: &'a B,
    saved: Option<B::SavedState>,
}

impl<'a, B: Backend> StateGuard<'a, B> {
    pub fn capture(backend: &'a B, scope: StateScope) -> Self {
        Self {
            backend,
            saved: Some(backend.capture_state(scope)),
        }
    }
}

impl<'a, B: Backend> Deref for StateGuard<'a, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<'a, B: Backend> Drop for StateGuard<'a, B> {
    fn drop(&mut self) {
        if let Some(state) = self.saved.take() {
            self.backend.restore_state(state);
        }
    }
}
