//! Reactive `set` / `del`
//!
//! Adding or removing keys on an observed container cannot be intercepted by
//! the existing slots. These helpers perform the change and fire the
//! container's shape dependency themselves.

use tracing::trace;

use crate::config::emit_warning;
use crate::error::Warning;
use crate::property::define_reactive;
use crate::value::{PropertyKey, Value};

/// Set `target[key] = value`, adding a reactive property if the key is new
///
/// - Arrays with an index key grow to fit and splice the value in, which
///   goes through the tracked `splice`.
/// - Existing object keys are assigned through their slot.
/// - New keys on a root instance or root data are refused with a warning.
/// - New keys on an unobserved object are assigned without tracking.
/// - Otherwise the key becomes reactive and the shape dependency fires.
///
/// Returns `value`.
pub fn set(target: &Value, key: impl Into<PropertyKey>, value: impl Into<Value>) -> Value {
    let key = key.into();
    let value = value.into();

    match target {
        Value::Array(arr) => {
            let Some(index) = key.as_index().filter(|index| arr.grow_to(*index)) else {
                emit_warning(Warning::NonIndexArrayKey {
                    key: key.to_name(),
                });
                return value;
            };
            arr.splice(index, 1, vec![value.clone()]);
            value
        }
        Value::Object(obj) => {
            let name = key.to_name();
            if obj.has_own(&name) {
                obj.set(&name, value.clone());
                return value;
            }

            let observer = obj.observer();
            if obj.is_instance() || observer.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
                emit_warning(Warning::AddToRoot { key: name });
                return value;
            }
            let Some(observer) = observer else {
                obj.set(&name, value.clone());
                return value;
            };

            define_reactive(obj, &name, Some(value.clone()), None, false);
            trace!(key = %name, "added reactive property");
            observer.dep().notify();
            value
        }
        Value::Opaque(_) => {
            emit_warning(Warning::UnsupportedTarget {
                target: target.to_display_string(),
            });
            value
        }
        _ => {
            emit_warning(Warning::SetOnPrimitive {
                target: target.to_display_string(),
            });
            value
        }
    }
}

/// Delete `target[key]`, notifying the container's shape dependency
///
/// Arrays with an index key splice the element out through the tracked
/// `splice`. Missing or non-configurable object keys are a no-op, and root
/// instances or root data refuse deletion with a warning.
pub fn del(target: &Value, key: impl Into<PropertyKey>) {
    let key = key.into();

    match target {
        Value::Array(arr) => match key.as_index() {
            Some(index) => {
                arr.splice(index, 1, Vec::new());
            }
            None => emit_warning(Warning::NonIndexArrayKey {
                key: key.to_name(),
            }),
        },
        Value::Object(obj) => {
            let name = key.to_name();
            let observer = obj.observer();
            if obj.is_instance() || observer.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
                emit_warning(Warning::DeleteOnRoot { key: name });
                return;
            }
            if !obj.has_own(&name) || !obj.remove(&name) {
                return;
            }
            if let Some(observer) = observer {
                trace!(key = %name, "deleted reactive property");
                observer.dep().notify();
            }
        }
        Value::Opaque(_) => {}
        _ => emit_warning(Warning::DeleteOnPrimitive {
            target: target.to_display_string(),
        }),
    }
}
