//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a cache instance.
//!
//! # Tasks
//! - Buffer sweep: Drops hot-read buffer values past their freshness window
//! - Metadata flush: Debounced side-car writes after bursts of mutations

mod flush;
mod sweep;

pub(crate) use flush::spawn_flush_task;
pub(crate) use sweep::spawn_sweep_task;
