// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The per-thread exception channel ("sink") that carries structured, chained
//! exceptions through evaluation.
//!
//! [`Sink`] is generic over the type of the `arg` a user exception carries
//! (`throw` accepts an arbitrary language value) so that this crate has no
//! dependency on `vellum-value`; downstream crates bind the type parameter,
//! e.g. `type Sink = vellum_exceptions::Sink<vellum_value::Value>;`.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

mod error_kind;
mod exception;
mod sink;

pub use crate::{
    error_kind::ErrorKind,
    exception::{CallFrame, Exception, ExceptionKind},
    sink::Sink,
};
