//! Ripple Core
//!
//! Fine-grained dependency tracking over plain object graphs:
//!
//! - **Observers**: Turn objects and arrays into reactive containers in place
//! - **Dependencies**: Record which computations read which properties
//! - **Watchers**: Re-run a computation when something it read changes
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use ripple_core::{observable, set, Object, Value, Watcher};
//!
//! let state = observable(Value::from(Object::from_pairs([("count", 0)])));
//! let obj = state.as_object().unwrap().clone();
//!
//! let runs = Rc::new(Cell::new(0));
//! let counter = runs.clone();
//! let source = obj.clone();
//! let _watcher = Watcher::new(move || {
//!     counter.set(counter.get() + 1);
//!     source.get("count")
//! });
//!
//! // Writing a tracked property re-runs the watcher
//! obj.set("count", 1);
//! assert_eq!(runs.get(), 2);
//!
//! // Keys added through `set` are reactive too
//! set(&state, "label", "clicks");
//! assert!(obj.is_reactive("label"));
//! ```

pub mod array;
pub mod config;
pub mod dep;
pub mod error;
pub mod mutation;
pub mod object;
pub mod observer;
pub mod property;
pub mod value;
pub mod watcher;

pub use array::Array;
pub use config::ReactiveConfig;
pub use dep::{
    current_target, push_target, untracked, Dep, DepId, Subscriber, SubscriberId, TargetGuard,
};
pub use error::{ReactiveError, Warning};
pub use mutation::{del, set};
pub use object::{Object, Property, PropertyDescriptor};
pub use observer::{observable, observe, Observer};
pub use property::{define_reactive, Getter, SetHook, Setter};
pub use value::{PropertyKey, Value};
pub use watcher::{Scheduler, UpdateQueue, Watcher, WatcherBuilder};
