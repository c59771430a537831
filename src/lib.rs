//! A minimal stackful coroutine primitive.
//!
//! `costack` lets a program create independently-stacked execution contexts
//! and transfer control between them synchronously, carrying one owned value
//! across each transfer. There is no scheduler, no preemption and no I/O
//! here: this is the building block a cooperative scheduler sits on top of.
//!
//! The public surface is four operations: [`create`], [`switch`], [`delete`]
//! and [`current`]. Scheduling policy, closure bodies and the shapes of
//! transferred values are entirely the caller's business.
//!
//! Contexts are confined to the thread that created them; every thread owns
//! an independent set of contexts rooted at an implicit context representing
//! the thread's original flow of execution.
//!
//! ```
//! use costack::{create, current, delete, switch, DEFAULT_STACK_SIZE};
//!
//! let root = current();
//! let h = create(root, move |v| {
//!     let n = *v.downcast::<i32>().unwrap();
//!     Box::new(n + 1)
//! }, DEFAULT_STACK_SIZE).unwrap();
//!
//! let out = switch(h, Box::new(5i32)).unwrap();
//! assert_eq!(*out.downcast::<i32>().unwrap(), 6);
//! delete(h).unwrap();
//! ```

pub mod arch;
pub mod config;
pub mod error;
pub mod stack;

mod coroutine;

pub use config::{default_stack_size, DEFAULT_STACK_SIZE, MIN_STACK_SIZE};
pub use coroutine::{create, current, delete, status, switch, Handle, Status, Transfer};
pub use error::{Error, Result};
