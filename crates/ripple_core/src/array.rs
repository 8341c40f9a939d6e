//! Indexable sequences with tracked mutation
//!
//! [`Array`] forwards reads to its storage and owns the seven in-place
//! mutators (`push`, `pop`, `shift`, `unshift`, `splice`, `sort`,
//! `reverse`). Once the array has an [`Observer`] every mutator runs the
//! native operation, observes newly inserted elements and then notifies the
//! observer's shape dependency. Unobserved arrays get the plain operations.
//!
//! Element writes by index are not intercepted; use [`set`](crate::set) and
//! [`del`](crate::del) for those.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::observer::{observe, Observer};
use crate::value::Value;

/// Comparator used by [`Array::sort_by`]
pub type Compare<'a> = Box<dyn FnMut(&Value, &Value) -> Ordering + 'a>;

struct ArrayData {
    items: Vec<Value>,
    observer: Option<Observer>,
    frozen: bool,
}

/// Shared handle to an indexable sequence
#[derive(Clone)]
pub struct Array(Rc<RefCell<ArrayData>>);

#[derive(Clone)]
pub(crate) struct WeakArray(Weak<RefCell<ArrayData>>);

impl WeakArray {
    pub(crate) fn upgrade(&self) -> Option<Array> {
        self.0.upgrade().map(Array)
    }
}

enum Mutation<'a> {
    Push(Vec<Value>),
    Pop,
    Shift,
    Unshift(Vec<Value>),
    Splice {
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    },
    Sort(Option<Compare<'a>>),
    Reverse,
}

impl Mutation<'_> {
    fn name(&self) -> &'static str {
        match self {
            Mutation::Push(_) => "push",
            Mutation::Pop => "pop",
            Mutation::Shift => "shift",
            Mutation::Unshift(_) => "unshift",
            Mutation::Splice { .. } => "splice",
            Mutation::Sort(_) => "sort",
            Mutation::Reverse => "reverse",
        }
    }
}

enum Outcome {
    Len(usize),
    Removed(Value),
    Spliced(Vec<Value>),
    Unit,
}

impl Array {
    pub fn new() -> Self {
        Self::from_values(Vec::<Value>::new())
    }

    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self(Rc::new(RefCell::new(ArrayData {
            items: values.into_iter().map(Into::into).collect(),
            observer: None,
            frozen: false,
        })))
    }

    // =========================================================================
    // Reads (tracked when observed)
    // =========================================================================

    pub fn len(&self) -> usize {
        self.depend_shape();
        self.0.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, or `Undefined` when out of range
    pub fn get(&self, index: usize) -> Value {
        self.depend_shape();
        self.0
            .borrow()
            .items
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of the elements
    pub fn to_vec(&self) -> Vec<Value> {
        self.depend_shape();
        self.raw_items()
    }

    pub(crate) fn raw_items(&self) -> Vec<Value> {
        self.0.borrow().items.clone()
    }

    pub(crate) fn raw_len(&self) -> usize {
        self.0.borrow().items.len()
    }

    /// Pad with `Undefined` up to `len` without notifying
    ///
    /// Returns `false` if the storage for `len` elements can't be reserved.
    pub(crate) fn grow_to(&self, len: usize) -> bool {
        let mut data = self.0.borrow_mut();
        if data.frozen || data.items.len() >= len {
            return true;
        }
        let extra = len - data.items.len();
        if data.items.try_reserve(extra).is_err() {
            return false;
        }
        data.items.resize(len, Value::Undefined);
        true
    }

    // =========================================================================
    // Mutators
    // =========================================================================

    /// Append one element, returning the new length
    pub fn push(&self, value: impl Into<Value>) -> usize {
        self.push_all(vec![value.into()])
    }

    /// Append several elements, returning the new length
    pub fn push_all(&self, values: Vec<Value>) -> usize {
        match self.mutate(Mutation::Push(values)) {
            Outcome::Len(len) => len,
            _ => self.raw_len(),
        }
    }

    /// Remove and return the last element
    pub fn pop(&self) -> Value {
        match self.mutate(Mutation::Pop) {
            Outcome::Removed(value) => value,
            _ => Value::Undefined,
        }
    }

    /// Remove and return the first element
    pub fn shift(&self) -> Value {
        match self.mutate(Mutation::Shift) {
            Outcome::Removed(value) => value,
            _ => Value::Undefined,
        }
    }

    /// Insert one element at the front, returning the new length
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        self.unshift_all(vec![value.into()])
    }

    /// Insert several elements at the front (in order), returning the new
    /// length
    pub fn unshift_all(&self, values: Vec<Value>) -> usize {
        match self.mutate(Mutation::Unshift(values)) {
            Outcome::Len(len) => len,
            _ => self.raw_len(),
        }
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    /// Both bounds are clamped to the array. Returns the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        match self.mutate(Mutation::Splice {
            start,
            delete_count,
            items,
        }) {
            Outcome::Spliced(removed) => removed,
            _ => Vec::new(),
        }
    }

    /// Stable sort with the default ordering: `Undefined` last, everything
    /// else compared by string coercion
    pub fn sort(&self) {
        self.mutate(Mutation::Sort(None));
    }

    /// Stable sort with a custom comparator
    pub fn sort_by<'a>(&self, compare: impl FnMut(&Value, &Value) -> Ordering + 'a) {
        let compare: Compare<'a> = Box::new(compare);
        self.mutate(Mutation::Sort(Some(compare)));
    }

    pub fn reverse(&self) {
        self.mutate(Mutation::Reverse);
    }

    /// Run the native operation, then observe inserted elements and notify
    /// if this array is observed
    fn mutate(&self, mutation: Mutation<'_>) -> Outcome {
        let name = mutation.name();
        let (outcome, inserted) = {
            let mut data = self.0.borrow_mut();
            if data.frozen {
                return Self::frozen_outcome(&mutation, data.items.len());
            }
            match mutation {
                Mutation::Push(values) => {
                    data.items.extend(values.iter().cloned());
                    (Outcome::Len(data.items.len()), values)
                }
                Mutation::Pop => (Outcome::Removed(data.items.pop().unwrap_or_default()), Vec::new()),
                Mutation::Shift => {
                    let removed = if data.items.is_empty() {
                        Value::Undefined
                    } else {
                        data.items.remove(0)
                    };
                    (Outcome::Removed(removed), Vec::new())
                }
                Mutation::Unshift(values) => {
                    let tail = std::mem::take(&mut data.items);
                    data.items = values.iter().cloned().chain(tail).collect();
                    (Outcome::Len(data.items.len()), values)
                }
                Mutation::Splice {
                    start,
                    delete_count,
                    items,
                } => {
                    let len = data.items.len();
                    let start = start.min(len);
                    let end = start + delete_count.min(len - start);
                    let removed: Vec<Value> =
                        data.items.splice(start..end, items.iter().cloned()).collect();
                    (Outcome::Spliced(removed), items)
                }
                Mutation::Sort(compare) => {
                    // sort a copy outside the borrow so comparators may read
                    // the array; a panicking comparator leaves it untouched
                    let mut sorted = data.items.clone();
                    drop(data);
                    match compare {
                        Some(mut compare) => sorted.sort_by(|a, b| compare(a, b)),
                        None => sorted.sort_by(default_order),
                    }
                    self.0.borrow_mut().items = sorted;
                    (Outcome::Unit, Vec::new())
                }
                Mutation::Reverse => {
                    data.items.reverse();
                    (Outcome::Unit, Vec::new())
                }
            }
        };

        if let Some(observer) = self.observer() {
            for value in &inserted {
                observe(value, false);
            }
            trace!(method = name, inserted = inserted.len(), "tracked array mutation");
            observer.dep().notify();
        }
        outcome
    }

    fn frozen_outcome(mutation: &Mutation<'_>, len: usize) -> Outcome {
        match mutation {
            Mutation::Push(_) | Mutation::Unshift(_) => Outcome::Len(len),
            Mutation::Pop | Mutation::Shift => Outcome::Removed(Value::Undefined),
            Mutation::Splice { .. } => Outcome::Spliced(Vec::new()),
            Mutation::Sort(_) | Mutation::Reverse => Outcome::Unit,
        }
    }

    // =========================================================================
    // Identity and observation
    // =========================================================================

    /// Make the array immutable. Mutators become no-ops and the array can
    /// no longer be observed.
    pub fn freeze(&self) {
        self.0.borrow_mut().frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.0.borrow().frozen
    }

    /// The observer attached to this array, if any
    pub fn observer(&self) -> Option<Observer> {
        self.0.borrow().observer.clone()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> WeakArray {
        WeakArray(Rc::downgrade(&self.0))
    }

    pub(crate) fn set_observer(&self, observer: Observer) {
        self.0.borrow_mut().observer = Some(observer);
    }

    fn depend_shape(&self) {
        if let Some(observer) = self.observer() {
            observer.dep().depend();
        }
    }
}

fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => Ordering::Equal,
        (Value::Undefined, _) => Ordering::Greater,
        (_, Value::Undefined) => Ordering::Less,
        _ => a.to_display_string().cmp(&b.to_display_string()),
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(data) => f.debug_list().entries(data.items.iter()).finish(),
            Err(_) => f.write_str("[<borrowed>]"),
        }
    }
}
