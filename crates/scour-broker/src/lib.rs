//! # scour-broker: Request broker for `Scour`
//!
//! One coordinator thread multiplexes two sides:
//!
//! - the **frontend**, where clients submit request lines, and
//! - the **backend**, where a fixed pool of worker threads announce
//!   themselves, request locks and deliver replies.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Coordinator                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  1. Handle one backend report (Ready / Response / LockReq)   │
//! │  2. If any worker is idle, poll the frontend                  │
//! │  3. Dispatch: pop LRU worker, allocate task + snapshot        │
//! │  4. On Response: forward reply, commit task, run GC           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Admission control falls out of step 2: with every worker busy the
//! frontend is never polled, so at most `pool_size` requests are in
//! flight and the rest wait in the transport.
//!
//! Workers are dispatched in LRU order — a FIFO of identities, re-queued
//! on every `Ready`/`Response`. Lock arbitration is serialized through
//! the coordinator: a request is granted only if no *other* busy
//! worker's snapshot holds any of the named resources.

mod broker;
mod error;
mod frontend;
mod queue;
mod tcp;
mod worker;

pub use broker::Broker;
pub use error::{BrokerError, BrokerResult};
pub use frontend::{ChannelFrontend, ChannelFrontendHandle, Frontend};
pub use tcp::TcpFrontend;
pub use worker::{BackendReport, RetryPolicy, Worker, WorkerDispatch};

#[cfg(test)]
mod tests;
