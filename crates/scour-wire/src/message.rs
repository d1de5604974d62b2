//! Backend message shapes.
//!
//! Workers announce themselves and deliver replies as multipart messages
//! tagged with an [`Action`] byte; the coordinator answers lock requests
//! with a single-byte [`LockReply`]. Channel endpoints carry the socket
//! identity, so no identity part appears in the bodies themselves.
//!
//! Shapes:
//!
//! ```text
//! dispatch           [client_addr][∅][request]
//! ready              [Ready]
//! response           [Response][∅][client_addr][∅][reply]
//! dataset lock req   [DatasetLockReq][∅][name1][∅][name2]…[∅][""]
//! iterator lock req  [IteratorLockReq][∅][name][∅]
//! lock reply         [LockOk | LockDenied]
//! ```
//!
//! The empty name part terminates the dataset lock-request list, matching
//! the zero-size terminator frame of the original protocol.

use bytes::Bytes;
use scour_types::ConnId;

use crate::error::{WireError, WireResult};
use crate::multipart::Multipart;

// ============================================================================
// Tags
// ============================================================================

/// Action tag announcing what a backend message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Worker is idle and ready for a dispatch.
    Ready,
    /// Worker finished a task; body carries the client reply.
    Response,
    /// Worker asks for exclusive dataset locks.
    DatasetLockReq,
    /// Worker asks for an exclusive iterator lock.
    IteratorLockReq,
}

impl Action {
    pub fn as_byte(self) -> u8 {
        match self {
            Action::Ready => 0,
            Action::Response => 1,
            Action::DatasetLockReq => 2,
            Action::IteratorLockReq => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Action::Ready),
            1 => Some(Action::Response),
            2 => Some(Action::DatasetLockReq),
            3 => Some(Action::IteratorLockReq),
            _ => None,
        }
    }
}

/// Coordinator's answer to a lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReply {
    Ok,
    Denied,
}

impl LockReply {
    pub fn as_byte(self) -> u8 {
        match self {
            LockReply::Ok => 0,
            LockReply::Denied => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(LockReply::Ok),
            1 => Some(LockReply::Denied),
            _ => None,
        }
    }
}

// ============================================================================
// Decoded backend reports
// ============================================================================

/// A decoded worker-to-coordinator message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Ready,
    Response { conn: ConnId, reply: Bytes },
    DatasetLockReq { names: Vec<String> },
    IteratorLockReq { name: String },
}

// ============================================================================
// Encoders
// ============================================================================

/// Builds the body of a client request frame: the bare command line.
///
/// The transport supplies the client address, so the on-wire body has no
/// address part; the coordinator-facing `[client_addr][∅][request]` shape
/// exists from [`encode_dispatch`] on.
pub fn encode_client_request(request: &str) -> Multipart {
    let mut mp = Multipart::new();
    mp.push(Bytes::copy_from_slice(request.as_bytes()));
    mp
}

/// Builds the body of a reply frame.
pub fn encode_client_reply(reply: &[u8]) -> Multipart {
    let mut mp = Multipart::new();
    mp.push(Bytes::copy_from_slice(reply));
    mp
}

/// Builds a coordinator-to-worker dispatch body.
pub fn encode_dispatch(conn: &ConnId, request: &str) -> Multipart {
    let mut mp = Multipart::new();
    mp.push(conn.as_bytes().clone())
        .push_separator()
        .push(Bytes::copy_from_slice(request.as_bytes()));
    mp
}

/// Builds a `Ready` announcement.
pub fn encode_ready() -> Multipart {
    let mut mp = Multipart::new();
    mp.push(action_part(Action::Ready));
    mp
}

/// Builds a `Response` announcement carrying the client reply.
pub fn encode_response(conn: &ConnId, reply: &[u8]) -> Multipart {
    let mut mp = Multipart::new();
    mp.push(action_part(Action::Response))
        .push_separator()
        .push(conn.as_bytes().clone())
        .push_separator()
        .push(Bytes::copy_from_slice(reply));
    mp
}

/// Builds a dataset lock request over the given names.
pub fn encode_dataset_lock_req<S: AsRef<str>>(names: &[S]) -> Multipart {
    let mut mp = Multipart::new();
    mp.push(action_part(Action::DatasetLockReq));
    for name in names {
        mp.push_separator()
            .push(Bytes::copy_from_slice(name.as_ref().as_bytes()));
    }
    // Terminating empty name, preceded by its separator.
    mp.push_separator().push(Bytes::new());
    mp
}

/// Builds an iterator lock request.
pub fn encode_iterator_lock_req(name: &str) -> Multipart {
    let mut mp = Multipart::new();
    mp.push(action_part(Action::IteratorLockReq))
        .push_separator()
        .push(Bytes::copy_from_slice(name.as_bytes()))
        .push_separator();
    mp
}

/// Builds a lock reply body.
pub fn encode_lock_reply(reply: LockReply) -> Multipart {
    let mut mp = Multipart::new();
    mp.push(Bytes::copy_from_slice(&[reply.as_byte()]));
    mp
}

fn action_part(action: Action) -> Bytes {
    Bytes::copy_from_slice(&[action.as_byte()])
}

// ============================================================================
// Decoders
// ============================================================================

/// Decodes a client request body.
pub fn decode_client_request(mp: &Multipart) -> WireResult<String> {
    let mut reader = mp.reader();
    let request = reader.next_str("request")?.to_string();
    if !reader.finished() {
        return Err(WireError::Malformed("trailing parts after request"));
    }
    Ok(request)
}

/// Decodes a reply body.
pub fn decode_client_reply(mp: &Multipart) -> WireResult<Bytes> {
    let mut reader = mp.reader();
    let reply = reader.next()?.clone();
    if !reader.finished() {
        return Err(WireError::Malformed("trailing parts after reply"));
    }
    Ok(reply)
}

/// Decodes a coordinator-to-worker dispatch body.
pub fn decode_dispatch(mp: &Multipart) -> WireResult<(ConnId, String)> {
    let mut reader = mp.reader();
    let conn = ConnId::new(reader.next()?.clone());
    reader.expect_separator()?;
    let request = reader.next_str("request")?.to_string();
    if !reader.finished() {
        return Err(WireError::Malformed("trailing parts after dispatch"));
    }
    Ok((conn, request))
}

/// Decodes a worker-to-coordinator message.
pub fn decode_report(mp: &Multipart) -> WireResult<Report> {
    let mut reader = mp.reader();
    let tag = reader.next()?;
    if tag.len() != 1 {
        return Err(WireError::Malformed("action tag must be one byte"));
    }
    let action = Action::from_byte(tag[0]).ok_or(WireError::UnknownAction(tag[0]))?;

    match action {
        Action::Ready => {
            if !reader.finished() {
                return Err(WireError::Malformed("trailing parts after Ready"));
            }
            Ok(Report::Ready)
        }
        Action::Response => {
            reader.expect_separator()?;
            let conn = ConnId::new(reader.next()?.clone());
            reader.expect_separator()?;
            let reply = reader.next()?.clone();
            if !reader.finished() {
                return Err(WireError::Malformed("trailing parts after Response"));
            }
            Ok(Report::Response { conn, reply })
        }
        Action::DatasetLockReq => {
            let mut names = Vec::new();
            loop {
                reader.expect_separator()?;
                let name = reader.next_str("dataset name")?;
                if name.is_empty() {
                    break;
                }
                names.push(name.to_string());
            }
            if !reader.finished() {
                return Err(WireError::Malformed("trailing parts after lock request"));
            }
            Ok(Report::DatasetLockReq { names })
        }
        Action::IteratorLockReq => {
            reader.expect_separator()?;
            let name = reader.next_str("iterator name")?.to_string();
            reader.expect_separator()?;
            if !reader.finished() {
                return Err(WireError::Malformed("trailing parts after lock request"));
            }
            Ok(Report::IteratorLockReq { name })
        }
    }
}

/// Decodes a lock reply body.
pub fn decode_lock_reply(mp: &Multipart) -> WireResult<LockReply> {
    let mut reader = mp.reader();
    let part = reader.next()?;
    if part.len() != 1 || !reader.finished() {
        return Err(WireError::Malformed("lock reply must be one byte"));
    }
    LockReply::from_byte(part[0]).ok_or(WireError::UnknownLockReply(part[0]))
}
