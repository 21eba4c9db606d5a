//! Page-wide provider bootstrap
//!
//! The loader resource behind a [`MapProvider`] is a singleton for the page
//! session. [`ProviderRegistry`] is the one place that knows whether it has
//! been requested, is loading, or has settled, and it is handed explicitly to
//! every view instead of living in a global.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::{
    core::config::{BootstrapPolicy, CleanupPolicy, PendingCallerPolicy},
    provider::MapProvider,
    MapError,
};

/// Load state of the external provider for the current page session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderLoadState {
    NotRequested,
    Loading,
    Ready,
    Failed,
}

impl fmt::Display for ProviderLoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderLoadState::NotRequested => write!(f, "not-requested"),
            ProviderLoadState::Loading => write!(f, "loading"),
            ProviderLoadState::Ready => write!(f, "ready"),
            ProviderLoadState::Failed => write!(f, "failed"),
        }
    }
}

type ReadyCallback = Box<dyn FnOnce()>;
type ErrorCallback = Box<dyn FnOnce(MapError)>;

struct Waiter {
    on_ready: ReadyCallback,
    on_error: ErrorCallback,
}

struct RegistryInner {
    state: ProviderLoadState,
    failure: Option<String>,
    /// Bumped whenever the loader is removed; completions carry the value
    /// they were issued under.
    session: u64,
    waiters: Vec<Waiter>,
    insertions: usize,
    leases: usize,
    policy: BootstrapPolicy,
}

impl RegistryInner {
    /// Restart the session when the ref-counted loader has no consumers left
    /// and is not mid-load. Returns true when the loader must be removed.
    fn reset_if_unused(&mut self) -> bool {
        let settled = matches!(self.state, ProviderLoadState::Ready | ProviderLoadState::Failed);
        if self.leases == 0 && self.policy.cleanup == CleanupPolicy::RefCounted && settled {
            self.state = ProviderLoadState::NotRequested;
            self.failure = None;
            self.session += 1;
            true
        } else {
            false
        }
    }
}

enum EnsureAction {
    Load(u64),
    Wait,
    Drop,
    Ready(Waiter),
    Failed(Waiter, String),
}

/// Shared handle to the provider and its load state
#[derive(Clone)]
pub struct ProviderRegistry {
    inner: Rc<RefCell<RegistryInner>>,
    provider: Rc<dyn MapProvider>,
}

impl ProviderRegistry {
    pub fn new(provider: Rc<dyn MapProvider>) -> Self {
        Self::with_policy(provider, BootstrapPolicy::default())
    }

    pub fn with_policy(provider: Rc<dyn MapProvider>, policy: BootstrapPolicy) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                state: ProviderLoadState::NotRequested,
                failure: None,
                session: 0,
                waiters: Vec::new(),
                insertions: 0,
                leases: 0,
                policy,
            })),
            provider,
        }
    }

    pub fn provider(&self) -> &Rc<dyn MapProvider> {
        &self.provider
    }

    pub fn state(&self) -> ProviderLoadState {
        self.inner.borrow().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ProviderLoadState::Ready
    }

    /// Reason reported by the provider when the load failed
    pub fn failure(&self) -> Option<String> {
        self.inner.borrow().failure.clone()
    }

    /// How many times the loader resource has been inserted
    pub fn insertion_count(&self) -> usize {
        self.inner.borrow().insertions
    }

    pub fn lease_count(&self) -> usize {
        self.inner.borrow().leases
    }

    pub fn policy(&self) -> BootstrapPolicy {
        self.inner.borrow().policy
    }

    /// Make sure the provider is loaded, then report the outcome.
    ///
    /// The first caller inserts the loader. A caller arriving after the load
    /// settled is answered synchronously. A caller arriving while the load is
    /// in flight is queued or dropped according to [`PendingCallerPolicy`].
    /// Callbacks always run with no internal borrow held, so they may call
    /// back into the registry.
    pub fn ensure<R, E>(&self, on_ready: R, on_error: E)
    where
        R: FnOnce() + 'static,
        E: FnOnce(MapError) + 'static,
    {
        let waiter = Waiter {
            on_ready: Box::new(on_ready),
            on_error: Box::new(on_error),
        };

        let action = {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                ProviderLoadState::NotRequested => {
                    inner.state = ProviderLoadState::Loading;
                    inner.insertions += 1;
                    inner.waiters.push(waiter);
                    EnsureAction::Load(inner.session)
                }
                ProviderLoadState::Loading => match inner.policy.pending {
                    PendingCallerPolicy::Queue => {
                        inner.waiters.push(waiter);
                        EnsureAction::Wait
                    }
                    PendingCallerPolicy::DropLate => EnsureAction::Drop,
                },
                ProviderLoadState::Ready => EnsureAction::Ready(waiter),
                ProviderLoadState::Failed => {
                    let reason = inner
                        .failure
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string());
                    EnsureAction::Failed(waiter, reason)
                }
            }
        };

        match action {
            EnsureAction::Load(session) => {
                log::info!("inserting {} loader (session {})", self.provider.name(), session);
                self.provider.load(LoadCompletion {
                    registry: Rc::downgrade(&self.inner),
                    provider: Rc::downgrade(&self.provider),
                    session,
                });
            }
            EnsureAction::Wait => {
                log::debug!("{} still loading, caller queued", self.provider.name());
            }
            EnsureAction::Drop => {
                log::debug!("{} still loading, late caller dropped", self.provider.name());
            }
            EnsureAction::Ready(waiter) => (waiter.on_ready)(),
            EnsureAction::Failed(waiter, reason) => {
                (waiter.on_error)(MapError::ProviderLoadFailed(reason))
            }
        }
    }

    /// Register a consumer of the loader resource
    pub fn acquire(&self) -> ProviderLease {
        self.inner.borrow_mut().leases += 1;
        ProviderLease {
            registry: Some(self.clone()),
        }
    }

    fn release(&self) {
        let unload = {
            let mut inner = self.inner.borrow_mut();
            inner.leases = inner.leases.saturating_sub(1);
            inner.reset_if_unused()
        };

        if unload {
            log::info!("last consumer released, removing {} loader", self.provider.name());
            self.provider.unload();
        }
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ProviderRegistry")
            .field("provider", &self.provider.name())
            .field("state", &inner.state)
            .field("session", &inner.session)
            .field("insertions", &inner.insertions)
            .field("leases", &inner.leases)
            .finish()
    }
}

/// One-shot token a provider uses to report the outcome of a load
pub struct LoadCompletion {
    registry: Weak<RefCell<RegistryInner>>,
    provider: Weak<dyn MapProvider>,
    session: u64,
}

impl LoadCompletion {
    pub fn succeed(self) {
        self.complete(Ok(()))
    }

    pub fn fail(self, reason: impl Into<String>) {
        self.complete(Err(reason.into()))
    }

    /// Settle the load. Completions for a dropped registry or a removed
    /// loader are ignored.
    pub fn complete(self, outcome: std::result::Result<(), String>) {
        let Some(inner) = self.registry.upgrade() else {
            log::trace!("provider load settled after registry was dropped");
            return;
        };

        let waiters = {
            let mut inner = inner.borrow_mut();
            if inner.session != self.session || inner.state != ProviderLoadState::Loading {
                log::trace!(
                    "ignoring stale provider completion (session {}, current {})",
                    self.session,
                    inner.session
                );
                return;
            }
            match &outcome {
                Ok(()) => inner.state = ProviderLoadState::Ready,
                Err(reason) => {
                    inner.state = ProviderLoadState::Failed;
                    inner.failure = Some(reason.clone());
                }
            }
            std::mem::take(&mut inner.waiters)
        };

        match outcome {
            Ok(()) => {
                log::info!("provider ready, notifying {} waiter(s)", waiters.len());
                for waiter in waiters {
                    (waiter.on_ready)();
                }
            }
            Err(reason) => {
                log::warn!("provider failed to load: {}", reason);
                for waiter in waiters {
                    (waiter.on_error)(MapError::ProviderLoadFailed(reason.clone()));
                }
            }
        }

        // Every consumer may have left while the load was in flight.
        let unload = inner.borrow_mut().reset_if_unused();
        if unload {
            if let Some(provider) = self.provider.upgrade() {
                log::info!("load settled with no consumers, removing {} loader", provider.name());
                provider.unload();
            }
        }
    }
}

impl fmt::Debug for LoadCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadCompletion")
            .field("session", &self.session)
            .finish()
    }
}

/// Keeps the loader resource alive while held
pub struct ProviderLease {
    registry: Option<ProviderRegistry>,
}

impl ProviderLease {
    /// Release early; dropping the lease has the same effect
    pub fn release(mut self) {
        if let Some(registry) = self.registry.take() {
            registry.release();
        }
    }
}

impl Drop for ProviderLease {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.release();
        }
    }
}

impl fmt::Debug for ProviderLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderLease")
            .field("held", &self.registry.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::config::BootstrapProfile, provider::headless::HeadlessProvider};
    use std::cell::Cell;

    fn counters() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)))
    }

    fn ensure_counting(
        registry: &ProviderRegistry,
        ready: &Rc<Cell<usize>>,
        failed: &Rc<Cell<usize>>,
    ) {
        let ready = ready.clone();
        let failed = failed.clone();
        registry.ensure(
            move || ready.set(ready.get() + 1),
            move |_| failed.set(failed.get() + 1),
        );
    }

    #[test]
    fn test_first_ensure_inserts_loader() {
        let provider = Rc::new(HeadlessProvider::new());
        let registry = ProviderRegistry::new(provider.clone());
        assert_eq!(registry.state(), ProviderLoadState::NotRequested);

        let (ready, failed) = counters();
        ensure_counting(&registry, &ready, &failed);

        assert!(registry.is_ready());
        assert_eq!(ready.get(), 1);
        assert_eq!(failed.get(), 0);
        assert_eq!(registry.insertion_count(), 1);
        assert_eq!(provider.loader_insertions(), 1);
    }

    #[test]
    fn test_ready_answers_synchronously_without_reinserting() {
        let provider = Rc::new(HeadlessProvider::new());
        let registry = ProviderRegistry::new(provider.clone());
        let (ready, failed) = counters();

        for _ in 0..4 {
            ensure_counting(&registry, &ready, &failed);
        }

        assert_eq!(ready.get(), 4);
        assert_eq!(provider.loader_insertions(), 1);
    }

    #[test]
    fn test_pending_callers_are_queued() {
        let provider = Rc::new(HeadlessProvider::deferred());
        let registry = ProviderRegistry::new(provider.clone());
        let (ready, failed) = counters();

        ensure_counting(&registry, &ready, &failed);
        ensure_counting(&registry, &ready, &failed);
        assert_eq!(registry.state(), ProviderLoadState::Loading);
        assert_eq!(ready.get(), 0);

        provider.finish_load();
        assert_eq!(registry.state(), ProviderLoadState::Ready);
        assert_eq!(ready.get(), 2);
        assert_eq!(provider.loader_insertions(), 1);
    }

    #[test]
    fn test_drop_late_policy_only_notifies_first_caller() {
        let provider = Rc::new(HeadlessProvider::deferred());
        let registry =
            ProviderRegistry::with_policy(provider.clone(), BootstrapProfile::Minimal.resolve());
        let (ready, failed) = counters();

        ensure_counting(&registry, &ready, &failed);
        ensure_counting(&registry, &ready, &failed);
        provider.finish_load();

        assert_eq!(ready.get(), 1);
        assert_eq!(failed.get(), 0);
    }

    #[test]
    fn test_failure_is_terminal_without_retry() {
        let provider = Rc::new(HeadlessProvider::failing("network unreachable"));
        let registry = ProviderRegistry::new(provider.clone());
        let reasons = Rc::new(RefCell::new(Vec::new()));

        for _ in 0..2 {
            let reasons = reasons.clone();
            registry.ensure(
                || panic!("provider must not become ready"),
                move |err| reasons.borrow_mut().push(err.to_string()),
            );
        }

        assert_eq!(registry.state(), ProviderLoadState::Failed);
        assert_eq!(registry.failure().as_deref(), Some("network unreachable"));
        assert_eq!(provider.loader_insertions(), 1);
        assert_eq!(reasons.borrow().len(), 2);
        assert!(reasons.borrow()[0].contains("network unreachable"));
    }

    #[test]
    fn test_completion_after_registry_dropped_is_ignored() {
        let provider = Rc::new(HeadlessProvider::deferred());
        {
            let registry = ProviderRegistry::new(provider.clone());
            registry.ensure(|| panic!("registry is gone"), |_| panic!("registry is gone"));
        }
        provider.finish_load();
        assert_eq!(provider.loader_insertions(), 1);
    }

    #[test]
    fn test_retain_policy_keeps_loader() {
        let provider = Rc::new(HeadlessProvider::new());
        let registry = ProviderRegistry::new(provider.clone());

        let lease = registry.acquire();
        registry.ensure(|| {}, |_| {});
        drop(lease);

        assert_eq!(registry.lease_count(), 0);
        assert!(registry.is_ready());
        assert!(provider.is_loader_present());
    }

    #[test]
    fn test_ref_counted_policy_removes_after_last_lease() {
        let provider = Rc::new(HeadlessProvider::new());
        let registry =
            ProviderRegistry::with_policy(provider.clone(), BootstrapProfile::Scoped.resolve());

        let first = registry.acquire();
        let second = registry.acquire();
        registry.ensure(|| {}, |_| {});

        first.release();
        assert!(provider.is_loader_present());
        assert!(registry.is_ready());

        drop(second);
        assert!(!provider.is_loader_present());
        assert_eq!(registry.state(), ProviderLoadState::NotRequested);

        let _lease = registry.acquire();
        registry.ensure(|| {}, |_| {});
        assert_eq!(registry.insertion_count(), 2);
    }

    #[test]
    fn test_reload_after_removal() {
        let provider = Rc::new(HeadlessProvider::deferred());
        let registry =
            ProviderRegistry::with_policy(provider.clone(), BootstrapProfile::Scoped.resolve());

        let lease = registry.acquire();
        registry.ensure(|| {}, |_| {});
        provider.finish_load();
        drop(lease);

        let _lease = registry.acquire();
        let ready = Rc::new(Cell::new(false));
        let flag = ready.clone();
        registry.ensure(move || flag.set(true), |_| {});
        assert_eq!(registry.state(), ProviderLoadState::Loading);

        provider.finish_load();
        assert!(ready.get());
        assert_eq!(registry.state(), ProviderLoadState::Ready);
        assert_eq!(provider.loader_insertions(), 2);
    }

    #[test]
    fn test_ref_counted_unload_waits_for_inflight_load() {
        let provider = Rc::new(HeadlessProvider::deferred());
        let registry =
            ProviderRegistry::with_policy(provider.clone(), BootstrapProfile::Scoped.resolve());

        let lease = registry.acquire();
        registry.ensure(|| {}, |_| {});
        drop(lease);
        assert_eq!(registry.state(), ProviderLoadState::Loading);
        assert!(provider.is_loader_present());

        provider.finish_load();
        assert_eq!(registry.lease_count(), 0);
        assert_eq!(registry.state(), ProviderLoadState::NotRequested);
        assert!(!provider.is_loader_present());

        let _lease = registry.acquire();
        registry.ensure(|| {}, |_| {});
        assert_eq!(registry.state(), ProviderLoadState::Loading);
        assert_eq!(provider.loader_insertions(), 2);
    }

    #[test]
    fn test_ref_counted_failed_load_without_consumers_resets() {
        let provider = Rc::new(HeadlessProvider::deferred());
        let registry =
            ProviderRegistry::with_policy(provider.clone(), BootstrapProfile::Scoped.resolve());

        let lease = registry.acquire();
        registry.ensure(|| {}, |_| {});
        drop(lease);
        provider.fail_load("404");

        assert_eq!(registry.state(), ProviderLoadState::NotRequested);
        assert!(registry.failure().is_none());
        assert!(!provider.is_loader_present());
    }

    #[test]
    fn test_retain_policy_keeps_loader_after_inflight_load() {
        let provider = Rc::new(HeadlessProvider::deferred());
        let registry = ProviderRegistry::new(provider.clone());

        let lease = registry.acquire();
        registry.ensure(|| {}, |_| {});
        drop(lease);
        provider.finish_load();

        assert!(registry.is_ready());
        assert!(provider.is_loader_present());
    }

    #[test]
    fn test_completion_from_old_session_ignored() {
        let provider = Rc::new(HeadlessProvider::deferred());
        let registry = ProviderRegistry::new(provider.clone());
        registry.ensure(|| {}, |_| {});

        let stale = LoadCompletion {
            registry: Rc::downgrade(&registry.inner),
            provider: Rc::downgrade(registry.provider()),
            session: 7,
        };
        stale.fail("old loader errored");
        assert_eq!(registry.state(), ProviderLoadState::Loading);
        assert!(registry.failure().is_none());

        provider.finish_load();
        assert!(registry.is_ready());
    }
}
