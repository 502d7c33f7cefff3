//! Write-once promises with callback futures.
//!
//! A [`Promise`] is completed exactly once by a producer. Its [`Future`]
//! lets a consumer register a success callback (with a requested
//! [`QualityOfService`]) and a failure callback; whichever matches the
//! resolution is handed to an [`Executor`] to run concurrently. If the
//! promise resolves before a callback is registered, the outcome is
//! buffered and replayed at registration time, so no ordering of
//! "register" and "resolve" loses the value.
//!
//! Both callback paths go through the executor. Earlier designs of this
//! protocol ran failure callbacks inline on the resolving thread; this
//! crate deliberately dispatches failures too, so producers never block
//! on consumer code.
//!
//! This is the single-resolution primitive only: no `map`, no `all`, no
//! chained futures.
//!
//! # Examples
//!
//! ```
//! use promise_cell::{Promise, QualityOfService};
//! use std::sync::mpsc;
//!
//! let promise = Promise::<i32, String>::new();
//! let (tx, rx) = mpsc::channel();
//! promise
//!     .future()
//!     .on_success(QualityOfService::UserInitiated, move |value| {
//!         tx.send(value).unwrap();
//!     })
//!     .unwrap();
//! promise.complete_with_success(42).unwrap();
//! assert_eq!(rx.recv().unwrap(), 42);
//! ```

use thiserror::Error;

pub mod executor;
pub mod pair;

pub use executor::{default_executor, Executor, InlineExecutor, QualityOfService, Task, ThreadExecutor};
pub use pair::{Future, Promise};

/// Misuse of the single-resolution protocol.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PromiseError {
    /// The promise was already completed by an earlier call.
    #[error("promise already resolved")]
    AlreadyResolved,
    /// The callback slot was already claimed by an earlier registration.
    #[error("callback already registered")]
    AlreadyRegistered,
}

/// The payload a [`Promise`] pushes into its [`Future`] at resolution
/// time. Not retained once delivered to a matching callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Success(T),
    Error(E),
}

impl<T, E> Outcome<T, E> {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::Error(_) => "error",
        }
    }
}
