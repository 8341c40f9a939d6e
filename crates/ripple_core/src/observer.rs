//! Observers
//!
//! An [`Observer`] is attached once to each observed container. Attaching
//! one to an object turns every enumerable key into a reactive slot; attaching
//! one to an array switches its mutators to the tracked variants and observes
//! every element. Either way the observer carries a shape [`Dep`] that fires
//! when keys or elements are added or removed.

use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

use crate::array::{Array, WeakArray};
use crate::config;
use crate::dep::Dep;
use crate::object::{Object, WeakObject};
use crate::property::define_reactive;
use crate::value::Value;

enum WeakContainer {
    Object(WeakObject),
    Array(WeakArray),
}

struct ObserverInner {
    /// Back-reference to the container; the container owns the observer
    value: WeakContainer,
    dep: Dep,
    /// Number of root state trees using this container as their root data
    vm_count: Cell<usize>,
}

/// Change tracking attached to one observed container
#[derive(Clone)]
pub struct Observer {
    inner: Rc<ObserverInner>,
}

impl Observer {
    fn new(value: WeakContainer) -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                value,
                dep: Dep::new(),
                vm_count: Cell::new(0),
            }),
        }
    }

    fn attach_object(obj: &Object) -> Self {
        let observer = Self::new(WeakContainer::Object(obj.downgrade()));
        // mark first so self-referencing graphs terminate
        obj.set_observer(observer.clone());
        debug!(dep = observer.dep().id().to_raw(), "observing object");
        Self::walk(obj);
        observer
    }

    fn attach_array(arr: &Array) -> Self {
        let observer = Self::new(WeakContainer::Array(arr.downgrade()));
        arr.set_observer(observer.clone());
        debug!(dep = observer.dep().id().to_raw(), "observing array");
        Self::observe_array(&arr.raw_items());
        observer
    }

    /// Make every enumerable key of `obj` reactive
    pub fn walk(obj: &Object) {
        for key in obj.enumerable_keys() {
            define_reactive(obj, &key, None, None, false);
        }
    }

    /// Observe each element
    pub fn observe_array(items: &[Value]) {
        for item in items {
            observe(item, false);
        }
    }

    /// The observed container, while it is alive
    pub fn value(&self) -> Option<Value> {
        match &self.inner.value {
            WeakContainer::Object(obj) => obj.upgrade().map(Value::Object),
            WeakContainer::Array(arr) => arr.upgrade().map(Value::Array),
        }
    }

    /// Shape dependency: fires when keys or elements are added or removed
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// How many root state trees use this container as their root data
    pub fn vm_count(&self) -> usize {
        self.inner.vm_count.get()
    }

    pub fn ptr_eq(&self, other: &Observer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.inner.dep)
            .field("vm_count", &self.inner.vm_count.get())
            .finish()
    }
}

/// Observe `value`, returning its observer
///
/// Returns the existing observer if `value` was already observed. A new one
/// is created only for extensible plain objects and arrays that are not
/// virtual nodes or root instances, and only while observation is enabled
/// and not server rendering. Primitives and opaque values yield `None`.
/// With `as_root_data` the observer's root usage count is incremented.
pub fn observe(value: &Value, as_root_data: bool) -> Option<Observer> {
    if value.is_primitive() || config::is_vnode(value) {
        return None;
    }

    let observer = match value.observer() {
        Some(existing) => Some(existing),
        None if can_observe(value) => match value {
            Value::Object(obj) => Some(Observer::attach_object(obj)),
            Value::Array(arr) => Some(Observer::attach_array(arr)),
            _ => None,
        },
        None => None,
    };

    if as_root_data {
        if let Some(observer) = &observer {
            observer.inner.vm_count.set(observer.vm_count() + 1);
        }
    }
    observer
}

fn can_observe(value: &Value) -> bool {
    if !config::observation_enabled() || config::config().server_rendering {
        return false;
    }
    match value {
        Value::Object(obj) => obj.is_extensible() && !obj.is_instance(),
        Value::Array(arr) => !arr.is_frozen(),
        _ => false,
    }
}

/// Observe `value` and hand it back
pub fn observable(value: Value) -> Value {
    observe(&value, false);
    value
}

/// Subscribe the active computation to the shape of every observed element
/// of `arr`, recursing into nested arrays
pub(crate) fn depend_array(arr: &Array) {
    for item in arr.raw_items() {
        if let Some(observer) = item.observer() {
            observer.dep().depend();
        }
        if let Value::Array(nested) = &item {
            depend_array(nested);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{set_observation_enabled, set_vnode_predicate, ReactiveConfig};

    #[test]
    fn test_primitives_not_observed() {
        assert!(observe(&Value::from(1), false).is_none());
        assert!(observe(&Value::from("s"), false).is_none());
        assert!(observe(&Value::Null, false).is_none());
        assert!(observe(&Value::opaque(3u8), false).is_none());
    }

    #[test]
    fn test_observe_is_idempotent() {
        let value = Value::from(Object::from_pairs([("a", 1)]));
        let first = observe(&value, false).unwrap();
        let second = observe(&value, false).unwrap();
        assert!(first.ptr_eq(&second));
        assert!(first.value().is_some_and(|v| v == value));
    }

    #[test]
    fn test_walk_is_recursive() {
        let inner = Array::from_values([Value::from(Object::from_pairs([("z", 0)]))]);
        let obj = Object::from_pairs([("list", Value::from(inner.clone()))]);
        observe(&Value::from(obj.clone()), false);

        assert!(obj.is_reactive("list"));
        assert!(inner.observer().is_some());
        let element = inner.get(0);
        assert!(element.as_object().is_some_and(|o| o.is_reactive("z")));
    }

    #[test]
    fn test_root_data_counts() {
        let value = Value::from(Object::new());
        observe(&value, true);
        let observer = observe(&value, true).unwrap();
        assert_eq!(observer.vm_count(), 2);
        assert_eq!(observe(&value, false).unwrap().vm_count(), 2);
    }

    #[test]
    fn test_refuses_frozen_instance_and_vnode() {
        let frozen = Object::from_pairs([("a", 1)]);
        frozen.freeze();
        assert!(observe(&Value::from(frozen), false).is_none());

        let instance = Object::new_instance();
        assert!(observe(&Value::from(instance), false).is_none());

        let vnode = Object::from_pairs([("tag", "div")]);
        let marker = vnode.clone();
        set_vnode_predicate(Some(Rc::new(move |v: &Value| {
            v.as_object().is_some_and(|o| o.ptr_eq(&marker))
        })));
        assert!(observe(&Value::from(vnode), false).is_none());
        set_vnode_predicate(None);
    }

    #[test]
    fn test_toggle_and_server_rendering_suppress_creation() {
        let value = Value::from(Object::new());
        set_observation_enabled(false);
        assert!(observe(&value, false).is_none());
        set_observation_enabled(true);

        config::configure(ReactiveConfig {
            server_rendering: true,
            ..ReactiveConfig::default()
        });
        assert!(observe(&value, false).is_none());
        config::configure(ReactiveConfig::default());

        let observer = observe(&value, false).unwrap();
        // existing observers are still returned while disabled
        set_observation_enabled(false);
        assert!(observe(&value, false).unwrap().ptr_eq(&observer));
        set_observation_enabled(true);
    }

    #[test]
    fn test_self_referencing_object() {
        let obj = Object::new();
        obj.set("me", obj.clone());
        let observer = observe(&Value::from(obj.clone()), false);
        assert!(observer.is_some());
        assert!(obj.is_reactive("me"));
    }

    #[test]
    fn test_observable_returns_same_value() {
        let arr = Array::from_values([1, 2]);
        let value = observable(Value::from(arr.clone()));
        assert_eq!(value, Value::from(arr.clone()));
        assert!(arr.observer().is_some());
    }
}
