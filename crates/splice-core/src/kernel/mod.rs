//! # Splice Core Kernel
//!
//! Cross-cutting pieces shared by every other module:
//!
//! - **Error Handling**: the aggregate [`Error`](error::Error) type and its
//!   `Result` alias. Subsystem errors convert into it with `?`.
//! - **Component Lifecycle**: the [`KernelComponent`](component::KernelComponent)
//!   trait implemented by daemon minions and the
//!   [`ComponentRegistry`](component::ComponentRegistry) that tracks them.
//! - **Constants**: ABI symbol names, default ports and other fixed values.
pub mod component;
pub mod constants;
pub mod error;

pub use component::{ComponentRegistry, KernelComponent};
pub use error::{Error, Result};
