//! Coalescing Module
//!
//! Primitives that collapse many waiting callers onto one real fetch:
//! - [`Coalescer`]: same key, same time window, one fetch
//! - [`Batcher`]: many keys, same time window, one multi-key fetch

mod batcher;
mod coalescer;

pub use batcher::{Batcher, DEFAULT_BATCH_WINDOW};
pub use coalescer::{Coalescer, DEFAULT_DEDUPE_WINDOW};
