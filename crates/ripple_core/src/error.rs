use thiserror::Error;

/// Errors raised by fallible ripple operations
///
/// Tracking and notification never fail; only ambient setup such as
/// configuration loading can.
#[derive(Debug, Error)]
pub enum ReactiveError {
    #[error("invalid reactive config: {0}")]
    Config(#[from] toml::de::Error),
}

/// Development diagnostics
///
/// These never abort the operation that raised them; see
/// [`crate::config::emit_warning`] for where they go.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Warning {
    #[error("cannot set reactive property on undefined, null, or primitive value: {target}")]
    SetOnPrimitive { target: String },

    #[error("cannot delete reactive property on undefined, null, or primitive value: {target}")]
    DeleteOnPrimitive { target: String },

    #[error("cannot add reactive property to a value that is not a plain object or array: {target}")]
    UnsupportedTarget { target: String },

    #[error(
        "avoid adding reactive property `{key}` to a root instance or its root data at runtime; declare it upfront"
    )]
    AddToRoot { key: String },

    #[error("avoid deleting property `{key}` on a root instance or its root data; set it to null instead")]
    DeleteOnRoot { key: String },

    #[error("array key `{key}` is not a valid index")]
    NonIndexArrayKey { key: String },

    #[error("watcher {id} triggered itself while evaluating; update skipped")]
    ReentrantUpdate { id: u64 },

    #[error("possible infinite update loop in watcher {id}")]
    InfiniteUpdateLoop { id: u64 },
}
