// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The embeddable core's host-facing surface: program lifecycle
//! (`create`/`parse`/`run`/`destroy`), the parse-option bit set a host
//! restricts a program with, the exception-sink handshake, host-side value
//! construction, and thread attachment.
//!
//! There is no on-disk format, no wire protocol, and no CLI at this layer —
//! see the workspace's scope note. A host embeds this crate directly and
//! talks to it through [`Program`]; [`vellum_threads::ThreadContext::attach`]
//! is re-exported here as the thread-attachment half of that contract.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

pub mod config;
pub mod host_value;
pub mod logging;
mod parse_options;
mod program;
mod report;
#[cfg(feature = "python")]
mod python;
mod restricted;

pub use crate::config::RuntimeConfig;
pub use crate::parse_options::ParseOptions;
pub use crate::program::Program;
pub use crate::report::{ExceptionReport, ReportFrame};
#[cfg(feature = "python")]
pub use crate::python::PyProgram;

/// Registers the calling OS thread with the runtime (deadlock detector,
/// per-thread exception sink, resource registry) and returns a guard that
/// tears that state down when dropped. A host thread that will call
/// [`Program::run`] more than once should hold this for the thread's whole
/// lifetime rather than letting each `run` call attach and detach on its
/// own — see spec §6's "omitting unregistration leaks the thread record".
pub use vellum_threads::{ThreadContext, ThreadHandle};
