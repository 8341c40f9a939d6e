//! Runtime configuration
//!
//! Configuration is thread-local: every thread that hosts observed state has
//! its own settings, warn handler and virtual-node predicate.
//!
//! ```
//! use ripple_core::config::{self, ReactiveConfig};
//!
//! let cfg = ReactiveConfig::from_toml_str("async_updates = false").unwrap();
//! config::configure(cfg);
//! assert!(!config::config().async_updates);
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ReactiveError, Warning};
use crate::value::Value;

/// Reactive core settings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReactiveConfig {
    /// Notified computations are batched by a scheduler. When off, `notify`
    /// sorts subscribers by id itself.
    pub async_updates: bool,
    /// Emit development diagnostics and run `on_set` hooks
    pub dev_warnings: bool,
    /// Suppress the default `tracing` output for warnings
    pub silent: bool,
    /// No new observers are created while rendering on a server
    pub server_rendering: bool,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            async_updates: true,
            dev_warnings: cfg!(debug_assertions),
            silent: false,
            server_rendering: false,
        }
    }
}

impl ReactiveConfig {
    /// Parse a config from TOML. Missing fields take their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, ReactiveError> {
        Ok(toml::from_str(src)?)
    }
}

/// Callback receiving development warnings instead of the log
pub type WarnHandler = Rc<dyn Fn(&Warning)>;

/// Predicate recognizing render output that must never be observed
pub type VNodePredicate = Rc<dyn Fn(&Value) -> bool>;

thread_local! {
    static CONFIG: Cell<ReactiveConfig> = Cell::new(ReactiveConfig::default());
    static WARN_HANDLER: RefCell<Option<WarnHandler>> = const { RefCell::new(None) };
    static VNODE_PREDICATE: RefCell<Option<VNodePredicate>> = const { RefCell::new(None) };
    static OBSERVATION_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Current config for this thread
pub fn config() -> ReactiveConfig {
    CONFIG.with(Cell::get)
}

/// Replace the config for this thread
pub fn configure(cfg: ReactiveConfig) {
    CONFIG.with(|c| c.set(cfg));
}

/// Install (or clear) the handler that receives development warnings
pub fn set_warn_handler(handler: Option<WarnHandler>) {
    WARN_HANDLER.with(|h| *h.borrow_mut() = handler);
}

/// Install (or clear) the renderer-supplied virtual-node predicate
pub fn set_vnode_predicate(predicate: Option<VNodePredicate>) {
    VNODE_PREDICATE.with(|p| *p.borrow_mut() = predicate);
}

pub(crate) fn is_vnode(value: &Value) -> bool {
    let predicate = VNODE_PREDICATE.with(|p| p.borrow().clone());
    predicate.is_some_and(|is_vnode| is_vnode(value))
}

/// Enable or disable creation of new observers
///
/// Existing observers keep working. Callers must restore the previous value
/// themselves.
pub fn set_observation_enabled(enabled: bool) {
    OBSERVATION_ENABLED.with(|flag| flag.set(enabled));
}

pub fn observation_enabled() -> bool {
    OBSERVATION_ENABLED.with(Cell::get)
}

/// Report a development diagnostic
///
/// Dropped entirely when `dev_warnings` is off. Otherwise delivered to the
/// warn handler if one is installed, or logged unless `silent`.
pub fn emit_warning(warning: Warning) {
    let cfg = config();
    if !cfg.dev_warnings {
        return;
    }

    let handler = WARN_HANDLER.with(|h| h.borrow().clone());
    match handler {
        Some(handler) => handler(&warning),
        None if !cfg.silent => warn!("{}", warning),
        None => {}
    }
}
