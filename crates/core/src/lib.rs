// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Foundational types and utilities shared across the Vellum runtime.
//!
//! The *core* crate is deliberately dependency-light: it supplies the small
//! building blocks every other `vellum-*` crate needs, without knowing
//! anything about values, locks, or evaluation. It supplies:
//!
//! - Design-by-contract style correctness checks ([`correctness`]).
//! - Monotonic time and UUID generation ([`nanos`], [`uuid`]).
//! - A small generic finite-state machine ([`fsm`]) reused by the
//!   concurrency substrate to model lock-primitive state transitions.
//! - Ordered-collection helpers ([`collections`]).
//! - Process-wide constants ([`consts`]).
//!
//! # Feature flags
//!
//! This crate has no optional feature flags; it is always built in full.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

pub mod collections;
pub mod consts;
pub mod correctness;
pub mod fsm;
pub mod nanos;
pub mod uuid;

pub use crate::{nanos::UnixNanos, uuid::Uuid4};
