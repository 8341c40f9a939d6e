//! Key-value containers
//!
//! [`Object`] is a shared handle to an insertion-ordered property table.
//! Every property is a slot: a plain data slot, an accessor pair, or a
//! reactive slot installed by [`define_reactive`](crate::define_reactive).
//! Reads and writes go through the slot, which is how observed objects
//! intercept them.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::observer::Observer;
use crate::property::{Getter, ReactiveCell, Setter};
use crate::value::Value;

/// What a property holds
#[derive(Clone)]
pub enum Property {
    Data { value: Value, writable: bool },
    Accessor {
        get: Option<Getter>,
        set: Option<Setter>,
    },
}

/// A property definition for [`Object::define_property`]
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub property: Property,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    /// Writable, enumerable, configurable data property
    pub fn data(value: impl Into<Value>) -> Self {
        Self {
            property: Property::Data {
                value: value.into(),
                writable: true,
            },
            enumerable: true,
            configurable: true,
        }
    }

    /// Enumerable, configurable accessor property
    pub fn accessor(get: Option<Getter>, set: Option<Setter>) -> Self {
        Self {
            property: Property::Accessor { get, set },
            enumerable: true,
            configurable: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        if let Property::Data { writable, .. } = &mut self.property {
            *writable = false;
        }
        self
    }

    pub fn non_configurable(mut self) -> Self {
        self.configurable = false;
        self
    }

    pub fn non_enumerable(mut self) -> Self {
        self.enumerable = false;
        self
    }
}

#[derive(Clone)]
pub(crate) enum SlotKind {
    Data { value: Value, writable: bool },
    Accessor {
        get: Option<Getter>,
        set: Option<Setter>,
    },
    Reactive(Rc<ReactiveCell>),
}

struct Slot {
    kind: SlotKind,
    enumerable: bool,
    configurable: bool,
}

impl Slot {
    fn plain(value: Value) -> Self {
        Self {
            kind: SlotKind::Data {
                value,
                writable: true,
            },
            enumerable: true,
            configurable: true,
        }
    }
}

impl From<PropertyDescriptor> for Slot {
    fn from(desc: PropertyDescriptor) -> Self {
        let kind = match desc.property {
            Property::Data { value, writable } => SlotKind::Data { value, writable },
            Property::Accessor { get, set } => SlotKind::Accessor { get, set },
        };
        Self {
            kind,
            enumerable: desc.enumerable,
            configurable: desc.configurable,
        }
    }
}

struct ObjectData {
    props: IndexMap<String, Slot>,
    observer: Option<Observer>,
    extensible: bool,
    /// Full application-root instance; never observed itself
    instance: bool,
}

/// Shared handle to a key-value container
///
/// Cloning the handle shares the container.
#[derive(Clone)]
pub struct Object(Rc<RefCell<ObjectData>>);

#[derive(Clone)]
pub(crate) struct WeakObject(Weak<RefCell<ObjectData>>);

impl WeakObject {
    pub(crate) fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }
}

/// Outcome of looking a key up, resolved before any user code runs so no
/// borrow is held across getters, setters or notification.
enum Read {
    Value(Value),
    Getter(Getter),
    Reactive(Rc<ReactiveCell>),
    Missing,
}

enum Write {
    Setter(Setter),
    Reactive(Rc<ReactiveCell>),
}

impl Object {
    pub fn new() -> Self {
        Self::with_flags(false)
    }

    /// An application-root instance. The observe entry point refuses it and
    /// the `set` / `del` helpers will not add or remove its properties.
    pub fn new_instance() -> Self {
        Self::with_flags(true)
    }

    fn with_flags(instance: bool) -> Self {
        Self(Rc::new(RefCell::new(ObjectData {
            props: IndexMap::new(),
            observer: None,
            extensible: true,
            instance,
        })))
    }

    /// Build a plain object from key-value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let obj = Self::new();
        {
            let mut data = obj.0.borrow_mut();
            for (key, value) in pairs {
                data.props.insert(key.into(), Slot::plain(value.into()));
            }
        }
        obj
    }

    /// Read a property
    ///
    /// Reactive slots register the active computation. Reading a missing key
    /// of an observed object registers it with the object's shape
    /// dependency instead, so a later reactive `set` of that key re-runs it.
    pub fn get(&self, key: &str) -> Value {
        let read = {
            let data = self.0.borrow();
            match data.props.get(key) {
                None => Read::Missing,
                Some(slot) => match &slot.kind {
                    SlotKind::Data { value, .. } => Read::Value(value.clone()),
                    SlotKind::Accessor { get: Some(get), .. } => Read::Getter(get.clone()),
                    SlotKind::Accessor { get: None, .. } => Read::Value(Value::Undefined),
                    SlotKind::Reactive(cell) => Read::Reactive(cell.clone()),
                },
            }
        };

        match read {
            Read::Value(value) => value,
            Read::Getter(get) => get(),
            Read::Reactive(cell) => cell.get(),
            Read::Missing => {
                self.depend_shape();
                Value::Undefined
            }
        }
    }

    /// Assign a property
    ///
    /// Existing keys go through their slot: reactive setter, accessor
    /// setter, or writable data. Read-only slots and getter-only accessors
    /// drop the write. A missing key becomes a plain, untracked data slot
    /// (use [`set`](crate::set) to add a tracked one); on a non-extensible
    /// object the write is dropped.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let write = {
            let mut data = self.0.borrow_mut();
            if !data.props.contains_key(key) {
                if data.extensible {
                    data.props.insert(key.to_string(), Slot::plain(value));
                }
                return;
            }
            let Some(slot) = data.props.get_mut(key) else {
                return;
            };
            match &mut slot.kind {
                SlotKind::Data {
                    value: current,
                    writable,
                } => {
                    if *writable {
                        *current = value;
                    }
                    return;
                }
                SlotKind::Accessor { set: Some(set), .. } => Write::Setter(set.clone()),
                SlotKind::Accessor { set: None, .. } => return,
                SlotKind::Reactive(cell) => Write::Reactive(cell.clone()),
            }
        };

        match write {
            Write::Setter(set) => set(value),
            Write::Reactive(cell) => cell.set(value),
        }
    }

    /// Whether `key` exists. Tracks the object's shape when observed.
    pub fn has(&self, key: &str) -> bool {
        self.depend_shape();
        self.has_own(key)
    }

    /// Whether `key` exists, without tracking
    pub fn has_own(&self, key: &str) -> bool {
        self.0.borrow().props.contains_key(key)
    }

    /// Enumerable keys in insertion order. Tracks the object's shape when
    /// observed.
    pub fn keys(&self) -> Vec<String> {
        self.depend_shape();
        self.enumerable_keys()
    }

    pub(crate) fn enumerable_keys(&self) -> Vec<String> {
        self.0
            .borrow()
            .props
            .iter()
            .filter(|(_, slot)| slot.enumerable)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of own properties, without tracking
    pub fn len(&self) -> usize {
        self.0.borrow().props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Define or redefine a property
    ///
    /// Returns `false` (and changes nothing) if the existing property is
    /// non-configurable, or if the key is new and the object is not
    /// extensible.
    pub fn define_property(&self, key: &str, desc: PropertyDescriptor) -> bool {
        let mut data = self.0.borrow_mut();
        match data.props.get(key) {
            Some(slot) if !slot.configurable => return false,
            None if !data.extensible => return false,
            _ => {}
        }
        data.props.insert(key.to_string(), desc.into());
        true
    }

    /// Delete a property without notifying anyone
    ///
    /// Returns `false` if the key is missing or non-configurable.
    pub fn remove(&self, key: &str) -> bool {
        let mut data = self.0.borrow_mut();
        match data.props.get(key) {
            Some(slot) if slot.configurable => {
                data.props.shift_remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn prevent_extensions(&self) {
        self.0.borrow_mut().extensible = false;
    }

    /// Lock the object: no new keys, no reconfiguration, data read-only
    pub fn freeze(&self) {
        let mut data = self.0.borrow_mut();
        data.extensible = false;
        for slot in data.props.values_mut() {
            slot.configurable = false;
            if let SlotKind::Data { writable, .. } = &mut slot.kind {
                *writable = false;
            }
        }
    }

    pub fn is_extensible(&self) -> bool {
        self.0.borrow().extensible
    }

    pub fn is_frozen(&self) -> bool {
        let data = self.0.borrow();
        !data.extensible
            && data.props.values().all(|slot| {
                !slot.configurable
                    && !matches!(slot.kind, SlotKind::Data { writable: true, .. })
            })
    }

    pub fn is_instance(&self) -> bool {
        self.0.borrow().instance
    }

    /// Whether `key` is served by a reactive slot
    pub fn is_reactive(&self, key: &str) -> bool {
        matches!(
            self.0.borrow().props.get(key).map(|slot| &slot.kind),
            Some(SlotKind::Reactive(_))
        )
    }

    /// The observer attached to this object, if any
    pub fn observer(&self) -> Option<Observer> {
        self.0.borrow().observer.clone()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.0))
    }

    pub(crate) fn set_observer(&self, observer: Observer) {
        self.0.borrow_mut().observer = Some(observer);
    }

    /// Existing slot for `key` with its `configurable` flag
    pub(crate) fn slot(&self, key: &str) -> Option<(bool, SlotKind)> {
        self.0
            .borrow()
            .props
            .get(key)
            .map(|slot| (slot.configurable, slot.kind.clone()))
    }

    pub(crate) fn install_reactive(&self, key: &str, cell: Rc<ReactiveCell>) {
        self.0.borrow_mut().props.insert(
            key.to_string(),
            Slot {
                kind: SlotKind::Reactive(cell),
                enumerable: true,
                configurable: true,
            },
        );
    }

    fn depend_shape(&self) {
        if let Some(observer) = self.observer() {
            observer.dep().depend();
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(data) => f
                .debug_struct("Object")
                .field("keys", &data.props.keys().collect::<Vec<_>>())
                .field("observed", &data.observer.is_some())
                .finish(),
            Err(_) => f.write_str("Object { <borrowed> }"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_plain_get_set() {
        let obj = Object::from_pairs([("a", 1)]);
        assert_eq!(obj.get("a"), Value::from(1));
        assert_eq!(obj.get("missing"), Value::Undefined);

        obj.set("a", 2);
        obj.set("b", "x");
        assert_eq!(obj.get("a"), Value::from(2));
        assert_eq!(obj.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_read_only_and_getter_only_drop_writes() {
        let obj = Object::new();
        obj.define_property("ro", PropertyDescriptor::data(1).read_only());
        let getter: Getter = Rc::new(|| Value::from(7));
        obj.define_property("computed", PropertyDescriptor::accessor(Some(getter), None));

        obj.set("ro", 2);
        obj.set("computed", 3);
        assert_eq!(obj.get("ro"), Value::from(1));
        assert_eq!(obj.get("computed"), Value::from(7));
    }

    #[test]
    fn test_accessor_setter_runs() {
        let store = Rc::new(Cell::new(0.0));
        let read = store.clone();
        let write = store.clone();
        let obj = Object::new();
        obj.define_property(
            "n",
            PropertyDescriptor::accessor(
                Some(Rc::new(move || Value::from(read.get()))),
                Some(Rc::new(move |v: Value| write.set(v.as_number().unwrap_or(0.0)))),
            ),
        );

        obj.set("n", 4);
        assert_eq!(store.get(), 4.0);
        assert_eq!(obj.get("n"), Value::from(4));
    }

    #[test]
    fn test_non_configurable_cannot_be_redefined_or_removed() {
        let obj = Object::new();
        obj.define_property("locked", PropertyDescriptor::data(1).non_configurable());
        assert!(!obj.define_property("locked", PropertyDescriptor::data(2)));
        assert!(!obj.remove("locked"));
        assert_eq!(obj.get("locked"), Value::from(1));
    }

    #[test]
    fn test_freeze() {
        let obj = Object::from_pairs([("a", 1)]);
        obj.freeze();
        assert!(obj.is_frozen());
        assert!(!obj.is_extensible());

        obj.set("a", 2);
        obj.set("b", 3);
        assert_eq!(obj.get("a"), Value::from(1));
        assert!(!obj.has_own("b"));
    }

    #[test]
    fn test_non_enumerable_hidden_from_keys() {
        let obj = Object::from_pairs([("a", 1)]);
        obj.define_property("hidden", PropertyDescriptor::data(2).non_enumerable());
        assert_eq!(obj.keys(), vec!["a".to_string()]);
        assert!(obj.has("hidden"));
        assert_eq!(obj.len(), 2);
    }

    #[test]
    fn test_remove_keeps_order() {
        let obj = Object::from_pairs([("a", 1), ("b", 2), ("c", 3)]);
        assert!(obj.remove("b"));
        assert!(!obj.remove("b"));
        assert_eq!(obj.keys(), vec!["a".to_string(), "c".to_string()]);
    }
}
