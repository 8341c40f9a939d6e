//! Dependencies and the active-computation stack
//!
//! A [`Dep`] is the broadcast list for one tracked property (or one
//! container's shape). Computations register themselves while they evaluate
//! and are told to re-run when the dependency notifies.
//!
//! The currently evaluating computation lives on a thread-local stack. A
//! computation pushes itself before running its getter and the returned
//! [`TargetGuard`] pops it again, also when the getter unwinds, so reads
//! made after a nested evaluation are always attributed to the right
//! computation.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tracing::trace;

use crate::config;

static NEXT_DEP_ID: AtomicU64 = AtomicU64::new(0);
static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a [`Dep`], monotonically increasing in creation order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

/// Identity of a subscriber, monotonically increasing in creation order
///
/// Synchronous notification sorts by this id so that computations created
/// first run first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }
}

/// A computation that can depend on [`Dep`]s
///
/// Implementors own de-duplication: `add_dep` is called on every tracked
/// read, and must only call [`Dep::add_sub`] the first time a given
/// dependency is seen.
pub trait Subscriber {
    fn id(&self) -> SubscriberId;

    /// Record `dep` as a dependency of the current evaluation
    fn add_dep(&self, dep: &Dep);

    /// A dependency changed. Re-run now or enqueue for a later flush.
    fn update(&self);
}

struct DepInner {
    id: DepId,
    subs: RefCell<SmallVec<[Weak<dyn Subscriber>; 4]>>,
}

/// Broadcast list of subscribers for one tracked property or container shape
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

impl Dep {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DepInner {
                id: DepId(NEXT_DEP_ID.fetch_add(1, Ordering::Relaxed)),
                subs: RefCell::new(SmallVec::new()),
            }),
        }
    }

    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Append a subscriber. No uniqueness check.
    pub fn add_sub(&self, sub: Weak<dyn Subscriber>) {
        self.inner.subs.borrow_mut().push(sub);
    }

    /// Remove the first subscriber with the given id
    pub fn remove_sub(&self, id: SubscriberId) {
        let mut subs = self.inner.subs.borrow_mut();
        let position = subs
            .iter()
            .position(|sub| sub.upgrade().is_some_and(|s| s.id() == id));
        if let Some(index) = position {
            subs.remove(index);
        }
    }

    /// Register the active computation (if any) as a subscriber
    pub fn depend(&self) {
        if let Some(target) = current_target() {
            target.add_dep(self);
        }
    }

    /// Tell every subscriber to update
    ///
    /// Walks a snapshot of the list, so subscribers may add or remove
    /// themselves while being notified.
    pub fn notify(&self) {
        let mut subs: SmallVec<[Rc<dyn Subscriber>; 4]> = {
            let mut list = self.inner.subs.borrow_mut();
            list.retain(|sub| sub.strong_count() > 0);
            list.iter().filter_map(Weak::upgrade).collect()
        };

        if !config::config().async_updates {
            // no scheduler will sort them for us
            subs.sort_by_key(|sub| sub.id());
        }

        trace!(dep = self.inner.id.0, subscribers = subs.len(), "notify");
        for sub in subs {
            sub.update();
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subs
            .borrow()
            .iter()
            .filter(|sub| sub.strong_count() > 0)
            .count()
    }

    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id.0)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// =========================================================================
// Active computation stack
// =========================================================================

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Rc<dyn Subscriber>>>> = const { RefCell::new(Vec::new()) };
}

/// Keeps a pushed target on the stack until dropped
///
/// Dropping restores the stack to the depth it had before the push, so an
/// evaluation that unwinds cannot leave a stale target behind.
#[must_use = "the target is popped as soon as the guard is dropped"]
pub struct TargetGuard {
    depth: usize,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        let popped: Vec<_> = TARGET_STACK
            .try_with(|stack| {
                let mut stack = stack.borrow_mut();
                let depth = self.depth.min(stack.len());
                stack.drain(depth..).collect()
            })
            .unwrap_or_default();
        drop(popped);
    }
}

/// Make `target` the active computation until the guard is dropped
///
/// Pushing `None` suspends tracking: reads made while it is on top register
/// nothing.
pub fn push_target(target: Option<Rc<dyn Subscriber>>) -> TargetGuard {
    TARGET_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let depth = stack.len();
        stack.push(target);
        TargetGuard {
            depth,
            _not_send: PhantomData,
        }
    })
}

/// The computation currently being evaluated, if any
pub fn current_target() -> Option<Rc<dyn Subscriber>> {
    TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
}

pub fn has_target() -> bool {
    TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
}

/// Number of entries on the stack, including suspended ones
pub fn target_depth() -> usize {
    TARGET_STACK.with(|stack| stack.borrow().len())
}

/// Run `f` without registering any dependencies
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = push_target(None);
    f()
}
