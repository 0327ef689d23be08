//! Stackful coroutines on a single shared stack.
//!
//! Every coroutine runs on the same execution stack, always starting from the
//! same address. When a coroutine gives up control, the part of the stack it
//! uses is copied to the heap; when it is resumed, the copy is written back to
//! the very same addresses before the jump. Suspended coroutines therefore
//! cost only what their frames actually use, and pointers into a coroutine's
//! own stack stay valid across suspensions.
//!
//! Everything runs on the thread that called [`Runtime::run`]. Coroutines
//! give up control only by calling [`spawn`], [`yield_now`], [`yield_to`] or
//! [`exit`], or by returning.
//!
//! ```no_run
//! #[heapros::main]
//! fn main() {
//!     let root = heapros::task::id();
//!
//!     heapros::spawn(move || {
//!         println!("child runs first");
//!         heapros::yield_to(root).unwrap();
//!         println!("never printed, nobody resumes the child");
//!     })
//!     .unwrap();
//!
//!     println!("back in the root coroutine");
//! }
//! ```
//!
//! [`Runtime::run`]: crate::runtime::Runtime::run

#[doc(inline)]
pub use heapros_macros::main;

#[doc(inline)]
pub use heapros_macros::test;

mod context;

mod continuation;

pub mod runtime;
pub use runtime::{Builder, Outcome, Runtime, SchedulerError, exit, spawn, yield_now, yield_to};

pub mod task;

mod utils;

#[cfg(test)]
mod test_utils;
