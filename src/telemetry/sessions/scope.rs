//! Explicit session scoping for code that records without a handle.
//!
//! A task-local scope (async) wins over a thread-local scope (sync); both win
//! over registry resolution.

use std::cell::RefCell;
use std::future::Future;

use crate::telemetry::sessions::session::Session;

thread_local! {
    static THREAD_SCOPE: RefCell<Vec<Session>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static TASK_SCOPE: Session;
}

struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        THREAD_SCOPE.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Run `f` with `session` as the current session of this thread.
pub fn in_scope<R>(session: &Session, f: impl FnOnce() -> R) -> R {
    THREAD_SCOPE.with(|stack| stack.borrow_mut().push(session.clone()));
    let _guard = ScopeGuard;
    f()
}

/// Run `future` with `session` as the current session of the task.
pub async fn scope_async<F: Future>(session: Session, future: F) -> F::Output {
    TASK_SCOPE.scope(session, future).await
}

/// The innermost explicitly scoped session, if any.
pub fn current() -> Option<Session> {
    TASK_SCOPE
        .try_with(Session::clone)
        .ok()
        .or_else(|| THREAD_SCOPE.with(|stack| stack.borrow().last().cloned()))
}
