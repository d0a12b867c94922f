//! JSONP wire frames.
//!
//! Every JSONP body the relay emits is assembled here so the exact wire
//! text lives in one place. The format is long-lived and clients depend on
//! its quirks: object keys are unquoted, `cid` and `seq` are quoted strings
//! in subscriber-path frames but bare numbers in `sign` frames, and every
//! wrapped body ends in `);\n`. Interpolated payloads (message content,
//! tokens, channel names) are escaped as JSON string literals.

use std::fmt::Write;

use bytes::Bytes;

/// Frame type delivered to parked subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    /// A published message.
    Data,
    /// Terminal frame sent when the channel is closed.
    Close,
}

impl PushKind {
    /// The `type` field carried on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PushKind::Data => "data",
            PushKind::Close => "close",
        }
    }
}

/// In-band rejection of a `/sub` request.
///
/// Carried over HTTP 200 so cross-origin JSONP clients, which cannot read
/// error status codes, still observe the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No channel slot exists for the requested cid.
    NotFound,
    /// Token auth is enabled and the presented token does not match.
    TokenError,
    /// The channel is at its subscriber limit.
    TooManyRequests,
}

impl Rejection {
    /// The `type` field carried on the wire.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Rejection::NotFound => "404",
            Rejection::TokenError => "401",
            Rejection::TooManyRequests => "429",
        }
    }

    /// The human-readable `content` field.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Rejection::NotFound => "Not Found",
            Rejection::TokenError => "Token Error",
            Rejection::TooManyRequests => "Too Many Requests",
        }
    }
}

/// Append `s` escaped as the body of a JSON string literal.
fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
}

/// Append one subscriber-path object: `{type: "data", cid: "0", seq: "5",
/// content: "..."}`.
fn push_object_into(out: &mut String, kind: &str, cid: usize, seq: u32, content: &str) {
    let _ = write!(out, "{{type: \"{kind}\", cid: \"{cid}\", seq: \"{seq}\", content: \"");
    escape_into(out, content);
    out.push_str("\"}");
}

/// A single delivered frame, as written into a parked response.
#[must_use]
pub fn push(cb: &str, kind: PushKind, cid: usize, seq: u32, content: &str) -> Bytes {
    let mut out = String::new();
    let _ = write!(out, "{cb}(");
    push_object_into(&mut out, kind.as_str(), cid, seq, content);
    out.push_str(");\n");
    Bytes::from(out)
}

/// Keep-alive frame echoing the client's `noop` sequence.
#[must_use]
pub fn noop(cb: &str, cid: usize, seq: u32) -> Bytes {
    Bytes::from(format!("{cb}({{type: \"noop\", cid: \"{cid}\", seq: \"{seq}\"}});\n"))
}

/// In-band rejection frame. `cid` is echoed exactly as requested, which may
/// be negative or out of range.
#[must_use]
pub fn rejection(cb: &str, rejection: Rejection, cid: i64) -> Bytes {
    Bytes::from(format!(
        "{cb}({{type: \"{}\", cid: \"{cid}\", seq: \"0\", content: \"{}\"}});\n",
        rejection.code(),
        rejection.reason(),
    ))
}

/// Ring replay: an array of `data` objects for sequences `start..`, one per
/// message, in publish order.
#[must_use]
pub fn backlog<'a, I>(cb: &str, cid: usize, start: u32, msgs: I) -> Bytes
where
    I: Iterator<Item = &'a str>,
{
    let mut out = String::new();
    let _ = write!(out, "{cb}([");
    let mut seq = start;
    let mut first = true;
    for msg in msgs {
        if !first {
            out.push(',');
        }
        first = false;
        push_object_into(&mut out, PushKind::Data.as_str(), cid, seq, msg);
        seq = seq.wrapping_add(1);
    }
    out.push_str("]);\n");
    Bytes::from(out)
}

/// `ping` probe body carrying the poll timeout in seconds.
#[must_use]
pub fn ping(cb: &str, sub_timeout: u32) -> Bytes {
    Bytes::from(format!("{cb}({{type: \"ping\", sub_timeout: {sub_timeout}}});\n"))
}

/// Publisher acknowledgement; wrapped only when a callback was provided.
#[must_use]
pub fn ok(cb: Option<&str>) -> Bytes {
    match cb {
        Some(cb) => Bytes::from(format!("{cb}({{type: \"ok\"}});\n")),
        None => Bytes::from_static(b"{type: \"ok\"}\n"),
    }
}

/// `sign` body. Unlike subscriber frames, `cid` and `seq` are bare numbers
/// here; wrapped only when a callback was provided.
#[must_use]
pub fn sign(cb: Option<&str>, cid: usize, seq: u32, token: &str, expires: i64, sub_timeout: u32) -> Bytes {
    let mut out = String::new();
    if let Some(cb) = cb {
        let _ = write!(out, "{cb}(");
    }
    let _ = write!(out, "{{type: \"sign\", cid: {cid}, seq: {seq}, token: \"");
    escape_into(&mut out, token);
    let _ = write!(out, "\", expires: {expires}, sub_timeout: {sub_timeout}}}");
    match cb {
        Some(_) => out.push_str(");\n"),
        None => out.push('\n'),
    }
    Bytes::from(out)
}

/// Per-channel `info` body.
#[must_use]
pub fn info_channel(cname: &str, subscribers: usize) -> Bytes {
    let mut out = String::from("{cname: \"");
    escape_into(&mut out, cname);
    let _ = write!(out, "\", subscribers: {subscribers}}}\n");
    Bytes::from(out)
}

/// Global `info` body.
#[must_use]
pub fn info_global(channels: usize, subscribers: usize) -> Bytes {
    Bytes::from(format!("{{channels: {channels}, subscribers: {subscribers}}}\n"))
}

/// `check` body: `{"<cname>": 1}` when the channel is live, `{}` otherwise.
#[must_use]
pub fn check(live: Option<&str>) -> Bytes {
    match live {
        Some(cname) => {
            let mut out = String::from("{\"");
            escape_into(&mut out, cname);
            out.push_str("\": 1}\n");
            Bytes::from(out)
        }
        None => Bytes::from_static(b"{}\n"),
    }
}
