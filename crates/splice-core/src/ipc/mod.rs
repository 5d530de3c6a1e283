//! # Splice Core IPC
//!
//! Transport between a controller and the worker it drives, and between a
//! client and the executer daemon.
//!
//! Messages are JSON payloads in `u32` little-endian length-prefixed frames.
//! The [`Channel`] trait only exposes non-blocking operations; waiting is done
//! by [`send_with_retry`] and [`recv_with_retry`], which poll with a short sleep
//! and give up with [`ChannelError::Cancelled`] as soon as the owner's
//! [`CancellationFlag`] is banished.
pub mod channel;
pub mod error;
pub mod message;

pub use channel::{recv_with_retry, send_with_retry, CancellationFlag, Channel, FramedChannel};
pub use error::ChannelError;
pub use message::{ControlMessage, ExecuteRequest, ExecuteResponse, WorkerReply};
