//! # Architecture-Specific Implementations
//!
//! Real CPU control and context switching for bare-metal targets. Hosted
//! builds fall back to the portable implementations in the crate root.

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", target_os = "none"))] {
        pub mod x86_64;

        /// The current architecture's implementation
        pub use self::x86_64 as current;
    }
}
