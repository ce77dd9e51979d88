//! Harness measuring the overhead of LTTng-UST instrumentation.
//!
//! The benchmark runner binary is invoked for an uninstrumented baseline and
//! for its instrumented twin, with and without an active tracing session.
//! Timings are reduced to start-up and per-event overhead, averaged across
//! passes and written as a JSON dump plus flat plot property files.

pub mod cpu;
pub mod driver;
pub mod error;
pub mod flatten;
pub mod harness;
pub mod kernel;
pub mod output;
pub mod platform;
pub mod runner;
pub mod schema;
pub mod session;
pub mod stats;
pub mod tpgen;
pub mod trace_reader;

mod command;

pub use error::{Error, Result};
