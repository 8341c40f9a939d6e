//! Reactive property accessors
//!
//! [`define_reactive`] replaces one property of an [`Object`] with a
//! reactive slot. The slot owns a private [`Dep`], the current value and,
//! for container values, the child [`Observer`]. Reads register the active
//! computation; writes that change the value notify it.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::config;
use crate::dep::{has_target, untracked, Dep};
use crate::object::{Object, SlotKind};
use crate::observer::{depend_array, observe, Observer};
use crate::value::Value;

/// Accessor getter
pub type Getter = Rc<dyn Fn() -> Value>;

/// Accessor setter
pub type Setter = Rc<dyn Fn(Value)>;

/// Hook run right before a reactive write takes effect (development only)
pub type SetHook = Rc<dyn Fn()>;

/// State behind one reactive slot
pub(crate) struct ReactiveCell {
    dep: Dep,
    value: RefCell<Value>,
    child: RefCell<Option<Observer>>,
    /// Accessor pair that existed before the slot was made reactive
    getter: Option<Getter>,
    setter: Option<Setter>,
    on_set: Option<SetHook>,
    shallow: bool,
}

impl ReactiveCell {
    fn current(&self) -> Value {
        match &self.getter {
            Some(get) => get(),
            None => self.value.borrow().clone(),
        }
    }

    pub(crate) fn get(&self) -> Value {
        let value = self.current();
        if has_target() {
            self.dep.depend();
            let child = self.child.borrow().clone();
            if let Some(child) = child {
                child.dep().depend();
                // element reads can't be intercepted, so subscribe to every
                // nested array's shape up front
                if let Value::Array(arr) = &value {
                    depend_array(arr);
                }
            }
        }
        value
    }

    pub(crate) fn set(&self, new_value: Value) {
        let value = self.current();
        if new_value == value || (new_value.is_nan() && value.is_nan()) {
            return;
        }
        if let Some(on_set) = &self.on_set {
            if config::config().dev_warnings {
                on_set();
            }
        }
        if self.getter.is_some() && self.setter.is_none() {
            return;
        }

        match &self.setter {
            Some(set) => set(new_value.clone()),
            None => *self.value.borrow_mut() = new_value.clone(),
        }
        let child = if self.shallow {
            None
        } else {
            observe(&new_value, false)
        };
        *self.child.borrow_mut() = child;
        self.dep.notify();
    }

    /// Current value without registering anything
    #[cfg(test)]
    pub(crate) fn peek(&self) -> Value {
        untracked(|| self.current())
    }

    #[cfg(test)]
    pub(crate) fn dep(&self) -> &Dep {
        &self.dep
    }
}

/// Make `obj[key]` reactive
///
/// When `value` is `None` the current value of the property is adopted
/// (unless it is a getter-only accessor). An existing accessor pair is kept
/// and wrapped. Non-configurable properties are left untouched, and a new
/// key is not added to a non-extensible object. `shallow` skips observing
/// the value.
pub fn define_reactive(
    obj: &Object,
    key: &str,
    value: Option<Value>,
    on_set: Option<SetHook>,
    shallow: bool,
) {
    let existing = obj.slot(key);
    match &existing {
        Some((false, _)) => {
            trace!(key, "property is not configurable, skipping");
            return;
        }
        None if !obj.is_extensible() => return,
        _ => {}
    }

    let (getter, setter, stored) = match existing.map(|(_, kind)| kind) {
        Some(SlotKind::Accessor { get, set }) => (get, set, Value::Undefined),
        Some(SlotKind::Reactive(cell)) => {
            let read = cell.clone();
            let getter: Getter = Rc::new(move || read.get());
            let setter: Setter = Rc::new(move |v| cell.set(v));
            (Some(getter), Some(setter), Value::Undefined)
        }
        Some(SlotKind::Data { value, .. }) => (None, None, value),
        None => (None, None, Value::Undefined),
    };

    let value = match value {
        Some(value) => value,
        None if getter.is_none() || setter.is_some() => match &getter {
            Some(get) => untracked(|| get()),
            None => stored,
        },
        None => Value::Undefined,
    };

    let child = if shallow {
        None
    } else {
        observe(&value, false)
    };

    obj.install_reactive(
        key,
        Rc::new(ReactiveCell {
            dep: Dep::new(),
            value: RefCell::new(value),
            child: RefCell::new(child),
            getter,
            setter,
            on_set,
            shallow,
        }),
    );
    debug!(key, shallow, "defined reactive property");
}
