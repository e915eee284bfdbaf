//! # Thread Management
//!
//! Threads, their mailboxes and the shared entry trampoline.

pub mod message;
pub mod states;
#[allow(clippy::module_inception)]
pub mod thread;

mod entry;

pub use message::{MessageType, ThreadMessage, TransportData};
pub use states::ThreadState;
pub use thread::{Thread, ThreadFlags, ThreadHandle};

pub(crate) use entry::thread_entry;
