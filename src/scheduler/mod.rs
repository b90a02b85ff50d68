// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Flush scheduling primitives.
//!
//! - [`Debouncer`]: a single-shot deadline that every enqueue pushes back
//! - [`FlushGuard`]: a non-blocking "skip if busy" guard per family

pub mod debounce;
pub mod guard;

pub use debounce::Debouncer;
pub use guard::{FlushGuard, FlushPermit};
