//! # weakmemo
//!
//! Function-result memoization keyed by the exact argument sequence.
//!
//! ## Architecture
//! - **Key trie**: one level per argument, two branch tables per node
//! - **Value keys**: primitives hashed with AHash, NaN equal to itself
//! - **Reference keys**: objects and functions by identity, held through
//!   `Weak` anchors so the cache never keeps an argument alive
//! - **Receiver**: a call receiver other than `Undefined` is key zero
//!
//! ```
//! use weakmemo::{memoize, Value};
//!
//! let square = memoize(|args: &[Value]| match args.first() {
//!     Some(Value::Number(n)) => n * n,
//!     _ => 0.0,
//! });
//!
//! assert_eq!(square.call(&[Value::from(4)]), 16.0);
//! assert_eq!(square.call(&[Value::from(4)]), 16.0);
//! assert_eq!(square.stats().hits(), 1);
//!
//! square.clear(&[Value::from(4)]);
//! assert!(square.is_empty());
//! ```

#![warn(missing_docs)]

mod callable;
mod error;
mod key;
mod memoize;
mod options;
mod stats;
mod trie;

pub use callable::{Callable, Fallible, Function, Method};
pub use error::{Error, Result};
pub use key::{Handle, KeyClass, NativeFunction, Value};
pub use memoize::{memoize, memoize_method, try_memoize, Memoized};
pub use options::{MemoizeOptions, DEFAULT_SWEEP_THRESHOLD};
pub use stats::CacheStats;
