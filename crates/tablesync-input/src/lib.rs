//! tablesync-input — debounced text input.
//!
//! Keeps a text box responsive while only committing settled values
//! upstream. See [`DebouncedInput`].

pub mod debounce;

pub use debounce::{CommitFn, DebouncedInput};
