// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The refcounted value and ownership model.
//!
//! [`Value`] is the single tagged-union type every expression evaluates to.
//! Heap-backed variants are held behind [`envelope::StrongRef`]/
//! [`envelope::WeakRef`] handles so that `ref()`/`deref()`/weak-reference
//! semantics are explicit operations rather than implicit `Clone`/`Drop`.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

pub mod coerce;
pub mod envelope;
pub mod equality;
mod local_slot;
mod qbinary;
mod qcallref;
mod qclosure;
mod qdate;
mod qhash;
mod qlist;
mod qobject;
mod qregex;
mod qstring;
mod reference;
mod value;

pub use crate::coerce::Coerce;
pub use crate::envelope::{ContentsGuard, HeapDestroy, StrongRef, WeakRef};
pub use crate::equality::{hard_eq, soft_eq};
pub use crate::local_slot::LocalSlot;
pub use crate::qbinary::QBinary;
pub use crate::qcallref::{CallRefFn, QCallRef};
pub use crate::qclosure::{ClosureFn, QClosure};
pub use crate::qdate::QDate;
pub use crate::qhash::QHash;
pub use crate::qlist::QList;
pub use crate::qobject::{DestructorFn, MemberSlot, QObject, WeakObjectRef};
pub use crate::qregex::{QRegex, RegexOptions};
pub use crate::qstring::{Encoding, QString};
pub use crate::reference::{QReference, ReferenceTarget};
pub use crate::value::Value;

/// The exception channel bound to this runtime's user-exception payload
/// type. Downstream crates use this alias instead of naming
/// `vellum_exceptions::Sink<Value>` directly.
pub type Sink = vellum_exceptions::Sink<Value>;

/// A chained exception carrying a [`Value`] as its `throw` argument.
pub type Exception = vellum_exceptions::Exception<Value>;
