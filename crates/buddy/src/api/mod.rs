//! Wire-level helpers for the completion endpoint.
//!
//! - [`streaming`]: SSE line splitting, chunk parsing and the
//!   [`FragmentStream`] producer/consumer channel that relays text fragments
//!   from the network to the caller.

pub mod streaming;

pub use streaming::{FragmentSender, FragmentStream, SseLine, SseLineBuffer, parse_sse_data};
