//! Tracked computations
//!
//! A [`Watcher`] evaluates a getter with itself as the active computation,
//! remembers every [`Dep`] the getter read, and re-runs when one of them
//! notifies. Re-running can be immediate or deferred to a [`Scheduler`];
//! deciding when a scheduler flushes is left to the host.
//!
//! ```
//! use ripple_core::{observe, Object, Value, Watcher};
//!
//! let state = Object::from_pairs([("count", 1)]);
//! observe(&Value::from(state.clone()), false);
//!
//! let source = state.clone();
//! let doubled = Watcher::new(move || {
//!     Value::from(source.get("count").as_number().unwrap_or(0.0) * 2.0)
//! });
//! assert_eq!(doubled.value(), Value::from(2));
//!
//! state.set("count", 5);
//! assert_eq!(doubled.value(), Value::from(10));
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::config::emit_warning;
use crate::dep::{push_target, Dep, DepId, Subscriber, SubscriberId};
use crate::error::Warning;
use crate::value::Value;

/// Re-runs a queued watcher more than this many times in one flush is
/// treated as an infinite update loop
pub const MAX_UPDATE_COUNT: u32 = 100;

/// The "re-run this computation later" primitive a host provides
pub trait Scheduler {
    fn schedule(&self, watcher: Rc<Watcher>);
}

type WatchGetter = Box<dyn Fn() -> Value>;
type WatchCallback = Box<dyn Fn(&Value, &Value)>;

#[derive(Default)]
struct DepSet {
    deps: Vec<Dep>,
    dep_ids: FxHashSet<DepId>,
    new_deps: Vec<Dep>,
    new_dep_ids: FxHashSet<DepId>,
}

/// Builder for [`Watcher`]
pub struct WatcherBuilder {
    getter: WatchGetter,
    callback: Option<WatchCallback>,
    lazy: bool,
    deep: bool,
    sync: bool,
    scheduler: Option<Rc<dyn Scheduler>>,
}

impl WatcherBuilder {
    /// Don't evaluate until [`Watcher::evaluate`]; updates only mark dirty
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Also depend on everything nested inside the returned value
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    /// Re-run immediately on update even if a scheduler is set
    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }

    /// Called with `(new, old)` after a re-run that changed the value
    pub fn callback(mut self, callback: impl Fn(&Value, &Value) + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> Rc<Watcher> {
        let watcher = Rc::new_cyclic(|this| Watcher {
            id: SubscriberId::next(),
            this: this.clone(),
            getter: self.getter,
            callback: self.callback,
            lazy: self.lazy,
            deep: self.deep,
            sync: self.sync,
            scheduler: self.scheduler,
            deps: RefCell::new(DepSet::default()),
            value: RefCell::new(Value::Undefined),
            dirty: Cell::new(self.lazy),
            active: Cell::new(true),
            evaluating: Cell::new(false),
        });
        if !watcher.lazy {
            let value = watcher.get();
            *watcher.value.borrow_mut() = value;
        }
        watcher
    }
}

/// A tracked computation over a getter
pub struct Watcher {
    id: SubscriberId,
    this: Weak<Watcher>,
    getter: WatchGetter,
    callback: Option<WatchCallback>,
    lazy: bool,
    deep: bool,
    sync: bool,
    scheduler: Option<Rc<dyn Scheduler>>,
    deps: RefCell<DepSet>,
    value: RefCell<Value>,
    dirty: Cell<bool>,
    active: Cell<bool>,
    evaluating: Cell<bool>,
}

/// Clears the evaluating flag and commits the collected dependencies when
/// an evaluation ends, including by unwinding
struct Evaluation<'a> {
    watcher: &'a Watcher,
    was_evaluating: bool,
}

impl Drop for Evaluation<'_> {
    fn drop(&mut self) {
        self.watcher.evaluating.set(self.was_evaluating);
        self.watcher.cleanup_deps();
    }
}

impl Watcher {
    /// Eager, synchronous watcher over `getter`
    pub fn new(getter: impl Fn() -> Value + 'static) -> Rc<Self> {
        Self::builder(getter).build()
    }

    pub fn builder(getter: impl Fn() -> Value + 'static) -> WatcherBuilder {
        WatcherBuilder {
            getter: Box::new(getter),
            callback: None,
            lazy: false,
            deep: false,
            sync: false,
            scheduler: None,
        }
    }

    /// Evaluate the getter, collecting dependencies
    pub fn get(&self) -> Value {
        trace!(watcher = self.id.to_raw(), "evaluate");
        let _evaluation = Evaluation {
            watcher: self,
            was_evaluating: self.evaluating.replace(true),
        };
        let target = self.this.upgrade().map(|this| this as Rc<dyn Subscriber>);
        let _target = push_target(target);

        let value = (self.getter)();
        if self.deep {
            traverse(&value);
        }
        value
    }

    /// Re-evaluate and fire the callback if the value changed
    pub fn run(&self) {
        if !self.active.get() {
            return;
        }
        if self.evaluating.get() {
            emit_warning(Warning::ReentrantUpdate {
                id: self.id.to_raw(),
            });
            return;
        }

        let value = self.get();
        let old = self.value.replace(value.clone());
        if value != old || value.is_container() || self.deep {
            if let Some(callback) = &self.callback {
                callback(&value, &old);
            }
        }
    }

    /// Evaluate a lazy watcher and clear its dirty flag
    pub fn evaluate(&self) -> Value {
        let value = self.get();
        *self.value.borrow_mut() = value.clone();
        self.dirty.set(false);
        value
    }

    /// Register every dependency of this watcher with the active computation
    pub fn depend(&self) {
        let deps = self.deps.borrow().deps.clone();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dependency; the watcher never runs again
    pub fn teardown(&self) {
        if !self.active.replace(false) {
            return;
        }
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps.deps {
            dep.remove_sub(self.id);
        }
    }

    pub fn value(&self) -> Value {
        self.value.borrow().clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Number of dependencies collected by the last evaluation
    pub fn dep_count(&self) -> usize {
        self.deps.borrow().deps.len()
    }

    /// Swap in the dependencies collected by the evaluation that just ended
    fn cleanup_deps(&self) {
        let mut set = self.deps.borrow_mut();
        let set = &mut *set;
        for dep in &set.deps {
            if !set.new_dep_ids.contains(&dep.id()) {
                dep.remove_sub(self.id);
            }
        }
        std::mem::swap(&mut set.dep_ids, &mut set.new_dep_ids);
        set.new_dep_ids.clear();
        std::mem::swap(&mut set.deps, &mut set.new_deps);
        set.new_deps.clear();
    }
}

impl Subscriber for Watcher {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        let mut set = self.deps.borrow_mut();
        if set.new_dep_ids.insert(id) {
            set.new_deps.push(dep.clone());
            if !set.dep_ids.contains(&id) {
                dep.add_sub(self.this.clone());
            }
        }
    }

    fn update(&self) {
        if self.lazy {
            self.dirty.set(true);
            return;
        }
        match (&self.scheduler, self.this.upgrade()) {
            (Some(scheduler), Some(this)) if !self.sync => scheduler.schedule(this),
            _ => self.run(),
        }
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id.to_raw())
            .field("lazy", &self.lazy)
            .field("deep", &self.deep)
            .field("active", &self.active.get())
            .field("deps", &self.dep_count())
            .finish()
    }
}

/// Read everything reachable from `value` so the active computation depends
/// on all of it
fn traverse(value: &Value) {
    let mut seen = FxHashSet::default();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut FxHashSet<usize>) {
    match value {
        Value::Object(obj) => {
            if !seen.insert(obj.addr()) {
                return;
            }
            for key in obj.keys() {
                traverse_inner(&obj.get(&key), seen);
            }
        }
        Value::Array(arr) => {
            if !seen.insert(arr.addr()) {
                return;
            }
            for item in arr.to_vec() {
                traverse_inner(&item, seen);
            }
        }
        _ => {}
    }
}

/// Manually flushed queue of pending watchers
///
/// Scheduling the same watcher twice before a flush queues it once.
#[derive(Default)]
pub struct UpdateQueue {
    queue: RefCell<Vec<Rc<Watcher>>>,
    pending: RefCell<FxHashSet<SubscriberId>>,
    flushing: Cell<bool>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Run queued watchers in creation order until the queue is empty,
    /// including watchers queued by the flush itself. Returns how many runs
    /// happened.
    pub fn flush(&self) -> usize {
        if self.flushing.replace(true) {
            return 0;
        }

        let mut runs: FxHashMap<SubscriberId, u32> = FxHashMap::default();
        let mut total = 0;
        loop {
            let mut batch = std::mem::take(&mut *self.queue.borrow_mut());
            if batch.is_empty() {
                break;
            }
            batch.sort_by_key(|watcher| watcher.id());

            for watcher in batch {
                let id = watcher.id();
                self.pending.borrow_mut().remove(&id);
                let count = runs.entry(id).or_insert(0);
                *count += 1;
                if *count > MAX_UPDATE_COUNT {
                    emit_warning(Warning::InfiniteUpdateLoop { id: id.to_raw() });
                    continue;
                }
                watcher.run();
                total += 1;
            }
        }

        self.flushing.set(false);
        trace!(runs = total, "flushed update queue");
        total
    }
}

impl Scheduler for UpdateQueue {
    fn schedule(&self, watcher: Rc<Watcher>) {
        if self.pending.borrow_mut().insert(watcher.id()) {
            self.queue.borrow_mut().push(watcher);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dep::current_target;
    use crate::object::Object;
    use crate::observer::observe;

    fn observed(pairs: &[(&str, i32)]) -> Object {
        let obj = Object::from_pairs(pairs.iter().map(|(k, v)| (*k, *v)));
        observe(&Value::from(obj.clone()), false);
        obj
    }

    #[test]
    fn test_dedups_repeated_reads() {
        let state = observed(&[("a", 1)]);
        let source = state.clone();
        let watcher = Watcher::new(move || {
            source.get("a");
            source.get("a")
        });
        assert_eq!(watcher.dep_count(), 1);
    }

    #[test]
    fn test_drops_deps_no_longer_read() {
        let state = observed(&[("flag", 1), ("a", 1), ("b", 2)]);
        let source = state.clone();
        let watcher = Watcher::new(move || {
            if source.get("flag") == Value::from(1) {
                source.get("a")
            } else {
                source.get("b")
            }
        });
        assert_eq!(watcher.value(), Value::from(1));

        state.set("flag", 0);
        assert_eq!(watcher.value(), Value::from(2));
        assert_eq!(watcher.dep_count(), 2);

        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let _callback = Watcher::builder({
            let source = state.clone();
            move || source.get("b")
        })
        .callback(move |_, _| counter.set(counter.get() + 1))
        .build();

        // `a` is no longer a dependency
        state.set("a", 10);
        assert_eq!(watcher.value(), Value::from(2));
        state.set("b", 3);
        assert_eq!(watcher.value(), Value::from(3));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_callback_receives_new_and_old() {
        let state = observed(&[("a", 1)]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let source = state.clone();
        let _watcher = Watcher::builder(move || source.get("a"))
            .callback(move |new, old| sink.borrow_mut().push((new.clone(), old.clone())))
            .build();

        state.set("a", 2);
        assert_eq!(*seen.borrow(), vec![(Value::from(2), Value::from(1))]);
    }

    #[test]
    fn test_lazy_marks_dirty() {
        let state = observed(&[("a", 1)]);
        let source = state.clone();
        let watcher = Watcher::builder(move || source.get("a")).lazy().build();
        assert!(watcher.is_dirty());
        assert_eq!(watcher.value(), Value::Undefined);

        assert_eq!(watcher.evaluate(), Value::from(1));
        assert!(!watcher.is_dirty());

        state.set("a", 2);
        assert!(watcher.is_dirty());
        assert_eq!(watcher.value(), Value::from(1));
        assert_eq!(watcher.evaluate(), Value::from(2));
    }

    #[test]
    fn test_lazy_depend_propagates_to_outer() {
        let state = observed(&[("a", 1)]);
        let source = state.clone();
        let inner = Watcher::builder(move || source.get("a")).lazy().build();

        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let computed = inner.clone();
        let _outer = Watcher::new(move || {
            counter.set(counter.get() + 1);
            if computed.is_dirty() {
                computed.evaluate();
            }
            computed.depend();
            computed.value()
        });
        assert_eq!(runs.get(), 1);

        state.set("a", 5);
        assert_eq!(runs.get(), 2);
        assert_eq!(inner.value(), Value::from(5));
    }

    #[test]
    fn test_teardown_stops_updates() {
        let state = observed(&[("a", 1)]);
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let source = state.clone();
        let watcher = Watcher::new(move || {
            counter.set(counter.get() + 1);
            source.get("a")
        });

        watcher.teardown();
        assert!(!watcher.is_active());
        assert_eq!(watcher.dep_count(), 0);
        state.set("a", 2);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_deep_tracks_nested_keys() {
        let nested = Object::from_pairs([("x", 1)]);
        let state = Object::from_pairs([("nested", Value::from(nested.clone()))]);
        observe(&Value::from(state.clone()), false);

        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let source = state.clone();
        let _watcher = Watcher::builder(move || source.get("nested"))
            .deep()
            .callback(move |_, _| counter.set(counter.get() + 1))
            .build();

        nested.set("x", 2);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_queue_dedups_and_flushes_in_order() {
        let state = observed(&[("a", 1)]);
        let queue = Rc::new(UpdateQueue::new());
        let order = Rc::new(RefCell::new(Vec::new()));

        let make = |label: &'static str| {
            let source = state.clone();
            let log = order.clone();
            Watcher::builder(move || {
                log.borrow_mut().push(label);
                source.get("a")
            })
            .scheduler(queue.clone())
            .build()
        };
        let first = make("first");
        let second = make("second");
        order.borrow_mut().clear();

        state.set("a", 2);
        state.set("a", 3);
        assert_eq!(queue.len(), 2);
        assert!(order.borrow().is_empty());

        assert_eq!(queue.flush(), 2);
        assert_eq!(*order.borrow(), vec!["first", "second"]);
        assert_eq!(first.value(), Value::from(3));
        assert_eq!(second.value(), Value::from(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_sync_bypasses_scheduler() {
        let state = observed(&[("a", 1)]);
        let queue = Rc::new(UpdateQueue::new());
        let source = state.clone();
        let watcher = Watcher::builder(move || source.get("a"))
            .sync()
            .scheduler(queue.clone())
            .build();

        state.set("a", 2);
        assert_eq!(watcher.value(), Value::from(2));
        assert!(queue.is_empty());
        assert_eq!(queue.flush(), 0);
    }

    #[test]
    fn test_queue_breaks_infinite_loop() {
        let mut cfg = crate::config::config();
        cfg.dev_warnings = true;
        crate::config::configure(cfg);
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        crate::config::set_warn_handler(Some(Rc::new(move |w: &Warning| {
            sink.borrow_mut().push(w.clone())
        })));

        let state = observed(&[("n", 0)]);
        let queue = Rc::new(UpdateQueue::new());
        let source = state.clone();
        let _watcher = Watcher::builder(move || {
            let n = source.get("n").as_number().unwrap_or(0.0);
            source.set("n", n + 1.0);
            Value::from(n)
        })
        .scheduler(queue.clone())
        .build();

        state.set("n", 100);
        queue.flush();
        assert!(matches!(
            warnings.borrow().last(),
            Some(Warning::InfiniteUpdateLoop { .. })
        ));
        crate::config::set_warn_handler(None);
    }

    #[test]
    fn test_get_restores_target_on_panic() {
        let outer_target = Watcher::builder(|| Value::Null).lazy().build();
        let _guard = push_target(Some(outer_target.clone() as Rc<dyn Subscriber>));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            Watcher::new(|| panic!("getter failed"));
        }));
        assert!(result.is_err());
        assert_eq!(current_target().map(|t| t.id()), Some(outer_target.id));
    }
}
