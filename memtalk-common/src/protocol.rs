//! # Memcached Text Protocol Codec
//!
//! Purpose: Render `add`/`set`/`get`/`delete` commands and classify the
//! server replies without any intermediate allocations beyond the output
//! buffer.
//!
//! ## Design Principles
//!
//! 1. **Caller-Owned Buffers**: Encoders append into a `Vec<u8>` supplied by
//!    the caller so connections can reuse their write buffers.
//! 2. **Terminator Framing**: Replies carry no length prefix, so a read is
//!    complete only once a known token closes the last line.
//! 3. **Binary-Safe Values**: The `VALUE` header length is honoured when it
//!    is present; the line scan is only a fallback.
//! 4. **Fail Fast**: Replies that match neither the success nor the miss
//!    token become protocol errors carrying the raw bytes.
//!
//! ## Wire Format
//!
//! ```text
//! add|set:  "<cmd> <key> 0 <ttl> <len>\r\n<value>\r\n" -> "STORED\r\n" | "NOT_STORED\r\n"
//! get:      "get <key>\r\n"                            -> "VALUE <key> <flags> <len>\r\n<value>\r\nEND\r\n" | "END\r\n"
//! delete:   "delete <key>\r\n"                         -> "DELETED\r\n" | "NOT_FOUND\r\n"
//! ```

use std::ops::Range;

use crate::error::{MemtalkError, MemtalkResult};
use crate::types::{Command, StorageCommand};

/// Line terminator used by every request and reply line.
pub const CRLF: &[u8] = b"\r\n";

/// Header prefix of a cache hit.
pub const VALUE: &[u8] = b"VALUE";
pub const STORED: &[u8] = b"STORED";
pub const NOT_STORED: &[u8] = b"NOT_STORED";
pub const END: &[u8] = b"END";
pub const DELETED: &[u8] = b"DELETED";
pub const NOT_FOUND: &[u8] = b"NOT_FOUND";

/// Generic error replies. They end a read for any command.
pub const ERROR: &[u8] = b"ERROR";
pub const CLIENT_ERROR: &[u8] = b"CLIENT_ERROR";
pub const SERVER_ERROR: &[u8] = b"SERVER_ERROR";

const ERROR_REPLIES: [&[u8]; 3] = [ERROR, CLIENT_ERROR, SERVER_ERROR];

/// Longest key accepted by memcached's text protocol.
pub const MAX_KEY_LEN: usize = 250;

/// Flags field written with every storage command (unused by this client).
const STORAGE_FLAGS: &[u8] = b"0";

/// Tokens used to read and classify the reply to one command family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSet {
    /// Tokens that close the reply.
    pub terminators: &'static [&'static [u8]],
    /// Prefix of a successful reply.
    pub success: &'static [u8],
    /// Prefix of a miss (not stored / not found).
    pub miss: &'static [u8],
}

pub const STORAGE_RESPONSES: ResponseSet = ResponseSet {
    terminators: &[STORED, NOT_STORED],
    success: STORED,
    miss: NOT_STORED,
};

pub const FETCH_RESPONSES: ResponseSet = ResponseSet {
    terminators: &[END],
    success: VALUE,
    miss: END,
};

pub const DELETE_RESPONSES: ResponseSet = ResponseSet {
    terminators: &[DELETED, NOT_FOUND],
    success: DELETED,
    miss: NOT_FOUND,
};

impl ResponseSet {
    /// Returns the reply tokens for a command.
    pub const fn for_command(cmd: Command) -> &'static ResponseSet {
        match cmd {
            Command::Add | Command::Set => &STORAGE_RESPONSES,
            Command::Get => &FETCH_RESPONSES,
            Command::Delete => &DELETE_RESPONSES,
        }
    }
}

/// Classification of a well-formed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Stored, found, or deleted.
    Success,
    /// Not stored, not found.
    Miss,
}

impl Outcome {
    #[inline]
    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }
}

/// Checks that a key can travel over the text protocol.
///
/// Keys are 1..=250 bytes without whitespace or control characters;
/// anything else would split the command line.
pub fn validate_key(key: &[u8]) -> MemtalkResult<()> {
    if key.is_empty() {
        return Err(MemtalkError::InvalidKey("key is empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(MemtalkError::InvalidKey("key longer than 250 bytes"));
    }
    if key
        .iter()
        .any(|&b| b.is_ascii_whitespace() || b.is_ascii_control())
    {
        return Err(MemtalkError::InvalidKey(
            "key contains whitespace or control characters",
        ));
    }
    Ok(())
}

/// Encodes `<cmd> <key> 0 <ttl> <len>\r\n<value>\r\n` into `out`.
pub fn encode_storage(
    cmd: StorageCommand,
    key: &[u8],
    value: &[u8],
    ttl_secs: u64,
    out: &mut Vec<u8>,
) {
    out.reserve(key.len() + value.len() + 48);
    out.extend_from_slice(Command::from(cmd).as_bytes());
    out.push(b' ');
    out.extend_from_slice(key);
    out.push(b' ');
    out.extend_from_slice(STORAGE_FLAGS);
    out.push(b' ');
    push_u64(out, ttl_secs);
    out.push(b' ');
    push_u64(out, value.len() as u64);
    out.extend_from_slice(CRLF);
    out.extend_from_slice(value);
    out.extend_from_slice(CRLF);
}

/// Encodes `<cmd> <key>\r\n` into `out`. Used for `get` and `delete`.
pub fn encode_key_only(cmd: Command, key: &[u8], out: &mut Vec<u8>) {
    debug_assert!(!cmd.is_storage(), "storage commands carry a value");
    let verb = cmd.as_bytes();
    out.reserve(verb.len() + key.len() + 3);
    out.extend_from_slice(verb);
    out.push(b' ');
    out.extend_from_slice(key);
    out.extend_from_slice(CRLF);
}

/// Returns true once `buf` holds a complete reply.
///
/// A reply is complete when it ends with CRLF and its last line is one of
/// `terminators` (exactly, or followed by a space and a message), or a
/// generic error line. For a `VALUE` reply the data block declared by the
/// header is skipped first, so payload lines never end a read early.
pub fn is_complete(buf: &[u8], terminators: &[&[u8]]) -> bool {
    let scan_from = match value_block_end(buf) {
        Some(end) if end > buf.len() => return false,
        Some(end) => end,
        None => 0,
    };

    let tail = &buf[scan_from..];
    let Some(body) = tail.strip_suffix(CRLF) else {
        return false;
    };
    let line_start = body
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |idx| idx + 1);
    let line = &body[line_start..];

    terminators
        .iter()
        .chain(ERROR_REPLIES.iter())
        .any(|token| matches_token(line, token))
}

/// Classifies a complete reply for `cmd`.
///
/// The success prefix is checked first, then the miss prefix; anything else
/// is a protocol error carrying the raw reply.
pub fn classify(cmd: Command, response: &[u8]) -> MemtalkResult<Outcome> {
    let set = ResponseSet::for_command(cmd);
    if response.starts_with(set.success) {
        return Ok(Outcome::Success);
    }
    if response.starts_with(set.miss) {
        return Ok(Outcome::Miss);
    }
    Err(MemtalkError::Protocol {
        command: cmd,
        reason: "unexpected response",
        response: response.to_vec(),
    })
}

/// Locates the value bytes inside a `VALUE` reply.
///
/// **Logic**:
/// 1. If the header declares a length and the buffer holds that many bytes
///    after the header line, return exactly that range.
/// 2. Otherwise take the bytes between the first LF and the next CR.
/// 3. Without a closing CR the range ends one byte before the buffer end.
/// 4. Without any LF there is no value: protocol error.
pub fn extract_value(response: &[u8]) -> MemtalkResult<Range<usize>> {
    if let Some((start, len)) = parse_value_header(response) {
        if let Some(end) = start.checked_add(len).filter(|&end| end <= response.len()) {
            return Ok(start..end);
        }
    }

    let start = match response.iter().position(|&b| b == b'\n') {
        Some(idx) => idx + 1,
        None => {
            return Err(MemtalkError::Protocol {
                command: Command::Get,
                reason: "no value found",
                response: response.to_vec(),
            })
        }
    };

    let end = response[start..]
        .iter()
        .position(|&b| b == b'\r')
        .map(|idx| start + idx)
        .unwrap_or_else(|| response.len().saturating_sub(1).max(start));

    Ok(start..end)
}

fn matches_token(line: &[u8], token: &[u8]) -> bool {
    line == token || (line.starts_with(token) && line.get(token.len()) == Some(&b' '))
}

/// Returns the offset just past the data block of a `VALUE` reply, i.e.
/// header + payload + CRLF. `None` when `buf` is not a parsable hit.
fn value_block_end(buf: &[u8]) -> Option<usize> {
    let (start, len) = parse_value_header(buf)?;
    start.checked_add(len)?.checked_add(CRLF.len())
}

/// Parses `VALUE <key> <flags> <bytes>[ <cas>]\r\n`.
///
/// Returns `(payload_start, payload_len)`. A length whose data block cannot
/// be addressed counts as no length at all.
fn parse_value_header(buf: &[u8]) -> Option<(usize, usize)> {
    if !buf.starts_with(VALUE) || buf.get(VALUE.len()) != Some(&b' ') {
        return None;
    }
    let header_end = find_crlf(buf)?;
    let len_field = buf[..header_end]
        .split(|&b| b == b' ')
        .filter(|field| !field.is_empty())
        .nth(3)?;
    let len = parse_usize(len_field)?;
    let start = header_end + CRLF.len();
    start.checked_add(len)?.checked_add(CRLF.len())?;
    Some((start, len))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|window| window == CRLF)
}

fn parse_usize(data: &[u8]) -> Option<usize> {
    if data.is_empty() {
        return None;
    }
    let mut value: usize = 0;
    for &b in data {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as usize)?;
    }
    Some(value)
}

fn push_u64(out: &mut Vec<u8>, mut value: u64) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    for idx in (0..len).rev() {
        out.push(buf[idx]);
    }
}
