//! # scour-wire: Wire protocol for `Scour`
//!
//! Two layers:
//!
//! - [`Multipart`]: the logical message body — a sequence of parts where
//!   zero-length parts act as field separators and list terminators.
//! - [`Frame`]: the TCP envelope around one multipart body — a typed
//!   header (request or reply, declared part count, CRC32 over the
//!   body), decoded incrementally from a byte buffer straight into the
//!   body's parts.
//!
//! On top of the multipart codec, [`message`] defines the concrete message
//! shapes of the protocol: the client request/reply bodies framed on TCP,
//! and the backend announcements exchanged between the coordinator and
//! its workers — `Ready`, `Response`, and the two lock-request forms,
//! each tagged with an [`Action`] byte.

mod error;
mod frame;
mod message;
mod multipart;

pub use error::{WireError, WireResult};
pub use frame::{Frame, FrameKind, FRAME_HEADER_SIZE, MAGIC, MAX_BODY_SIZE, PROTOCOL_VERSION};
pub use message::{
    decode_client_reply, decode_client_request, decode_dispatch, decode_lock_reply, decode_report,
    encode_client_reply, encode_client_request, encode_dataset_lock_req, encode_dispatch,
    encode_iterator_lock_req, encode_lock_reply, encode_ready, encode_response, Action, LockReply,
    Report,
};
pub use multipart::Multipart;
