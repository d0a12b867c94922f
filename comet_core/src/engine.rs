//! The channel engine.
//!
//! Operation-level API consumed by the HTTP transport: admit and refresh
//! channels (`sign`), park or resume long polls (`sub`), fan published
//! messages out to parked subscribers (`publish`), terminate channels
//! (`close`), report state (`info`, `check`, `ping`), and age everything on
//! a fixed tick (`sweep`).
//!
//! The engine never blocks. A parked subscriber is only a frame sender held
//! in the subscriber arena; delivery is a send on that channel followed by
//! detach, and dropping the sender ends the chunked response on the
//! transport side. Every operation returns promptly, so a single mutex in
//! front of the engine is enough when the transport is multi-threaded.

use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, trace, warn};

use crate::config::{AuthMode, EngineConfig};
use crate::frame::{self, PushKind, Rejection};
use crate::pool::SlotPool;
use crate::seq;
use crate::subscriber::{Subscriber, SubscriberKey, SubscriberPool};

/// `Content-Type` of JSONP bodies.
pub const CONTENT_TYPE_JS: &str = "text/javascript; charset=utf-8";

/// `Content-Type` of admin bodies (`sign`, `close`, `info`, `check`).
pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";

/// A finished HTTP response described by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header value.
    pub content_type: &'static str,
    /// Response body.
    pub body: Bytes,
}

impl Reply {
    fn js(body: Bytes) -> Self {
        Self { status: 200, content_type: CONTENT_TYPE_JS, body }
    }

    fn html(body: impl Into<Bytes>) -> Self {
        Self { status: 200, content_type: CONTENT_TYPE_HTML, body: body.into() }
    }

    fn not_found(body: String) -> Self {
        Self { status: 404, content_type: CONTENT_TYPE_HTML, body: Bytes::from(body) }
    }
}

/// Parameters of a `/sub` request.
#[derive(Debug, Clone)]
pub struct SubRequest {
    /// Requested channel slot. Negative or out-of-range values get an
    /// in-band 404.
    pub cid: i64,
    /// Next sequence the client expects.
    pub seq: u32,
    /// Echo sequence carried back on noop frames.
    pub noop: u32,
    /// JSONP callback name.
    pub callback: String,
    /// Channel token, checked under token auth.
    pub token: String,
}

/// What `sub` decided to do with the request.
#[derive(Debug)]
pub enum SubOutcome {
    /// Respond immediately: ring replay or in-band rejection.
    Reply(Reply),
    /// The request is parked.
    Parked(Parked),
}

/// Receiver side of a parked subscription.
///
/// Frames arrive until the engine detaches the subscriber (delivery, sweep,
/// or channel close), at which point the channel closes and the response is
/// complete.
#[derive(Debug)]
pub struct Parked {
    /// Key the transport reports back on client disconnect.
    pub key: SubscriberKey,
    /// JSONP frames to stream as response chunks.
    pub frames: UnboundedReceiver<Bytes>,
}

/// The relay core: slot pool, subscriber arena, and the operations the
/// transport exposes over HTTP.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    pool: SlotPool,
    subs: SubscriberPool,
    /// Parked subscribers across all channels.
    subscribers: usize,
}

impl Engine {
    /// Build an engine with `config.max_channels` preallocated slots.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let pool = SlotPool::new(config.max_channels);
        Self {
            config,
            pool,
            subs: SubscriberPool::default(),
            subscribers: 0,
        }
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of allocated channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.pool.used_len()
    }

    /// Parked subscribers across all channels.
    #[must_use]
    pub const fn subscriber_count(&self) -> usize {
        self.subscribers
    }

    /// Slot at `cid`, free or used.
    #[must_use]
    pub fn channel(&self, cid: i64) -> Option<&crate::channel::Channel> {
        self.pool.get(cid)
    }

    /// Resume-or-park a long poll.
    ///
    /// Rejections (`404`, `401`, `429`) are in-band JSONP replies with HTTP
    /// status 200. A client whose `seq` lags the ring gets an immediate
    /// replay; an up-to-date client is parked.
    pub fn sub(&mut self, req: SubRequest) -> SubOutcome {
        let cb = &req.callback;
        let Some(channel) = self.pool.get(req.cid) else {
            return SubOutcome::Reply(Reply::js(frame::rejection(cb, Rejection::NotFound, req.cid)));
        };
        if self.config.auth == AuthMode::Token
            && (channel.is_free() || channel.token.is_empty() || channel.token != req.token)
        {
            debug!(cid = req.cid, token = %req.token, "token error");
            return SubOutcome::Reply(Reply::js(frame::rejection(cb, Rejection::TokenError, req.cid)));
        }
        if channel.subs_len >= self.config.max_subscribers_per_channel {
            debug!(cid = req.cid, "too many subscribers");
            return SubOutcome::Reply(Reply::js(frame::rejection(
                cb,
                Rejection::TooManyRequests,
                req.cid,
            )));
        }

        let cid = channel.id();
        if self.pool.slot(cid).is_free() {
            self.pool.alloc(cid);
        }
        let channel_idles = self.config.channel_idles();
        self.pool.slot_mut(cid).idle = channel_idles;

        // replay the ring when the client is behind
        let channel = self.pool.slot(cid);
        if !channel.msgs.is_empty() && req.seq != channel.seq_next {
            let min = channel.msg_seq_min();
            let mut start = req.seq;
            if seq::gt(start, channel.seq_next) || seq::gt(min, start) {
                start = min;
            }
            debug!(cid, from = start, to = channel.seq_next.wrapping_sub(1), "replaying ring");
            let count = channel.seq_next.wrapping_sub(start) as usize;
            let skip = channel.msgs.len() - count;
            let body = frame::backlog(cb, cid, start, channel.msgs.iter().skip(skip).map(String::as_str));
            return SubOutcome::Reply(Reply::js(body));
        }

        // park
        let (tx, rx) = mpsc::unbounded_channel();
        let key = self.subs.insert(Subscriber {
            channel: cid,
            idle: 0,
            noop_seq: req.noop,
            callback: req.callback,
            frames: tx,
            prev: None,
            next: None,
        });
        self.attach(cid, key.index);
        self.subscribers += 1;
        debug!(
            cid,
            channels = self.pool.used_len(),
            subs = self.pool.slot(cid).subs_len,
            "sub parked"
        );
        SubOutcome::Parked(Parked { key, frames: rx })
    }

    /// Publish `content` to the channel named by `cid` (when non-negative)
    /// or `cname`.
    ///
    /// The publisher's reply is assembled before fan-out. Every parked
    /// subscriber receives one `data` frame and is detached; the message
    /// stays in the ring for resume.
    pub fn publish(&mut self, cid: i64, cname: &str, content: &str, cb: Option<&str>) -> Reply {
        let channel = if cid >= 0 {
            self.pool.get(cid)
        } else if !cname.is_empty() {
            self.pool.get_by_name(cname).map(|id| self.pool.slot(id))
        } else {
            None
        };
        let Some(channel) = channel.filter(|c| !c.is_free()) else {
            let body = if cid >= 0 {
                trace!(cid, content, "publish to unconnected channel");
                format!("channel[{cid}] not connected\n")
            } else {
                trace!(cname, content, "publish to unconnected cname");
                format!("cname[{cname}] not connected\n")
            };
            return Reply::not_found(body);
        };
        let id = channel.id();
        debug!(cid = id, subs = channel.subs_len, content, "publish");

        let reply = Reply::js(frame::ok(cb));
        self.pool
            .slot_mut(id)
            .append_message(content.to_owned(), self.config.max_messages);
        self.channel_send(id, PushKind::Data, content);
        reply
    }

    /// Admit or refresh the channel named `cname`.
    ///
    /// Consumes a free slot for an unknown name; issues the token on first
    /// sign; refreshes the idle budget from `expires` (defaulted to the
    /// channel timeout when non-positive). Re-signing an existing name
    /// preserves its cid and token.
    pub fn sign(&mut self, cname: &str, expires: i64, cb: Option<&str>) -> Reply {
        let expires = if expires <= 0 { i64::from(self.config.channel_timeout) } else { expires };

        let mut cid = if cname.is_empty() { None } else { self.pool.get_by_name(cname) };
        if cid.is_none() && !cname.is_empty() {
            if let Some(free) = self.pool.free_head() {
                self.pool.slot_mut(free).name = cname.to_owned();
                self.pool.alloc(free);
                cid = Some(free);
            }
        }
        let Some(cid) = cid else {
            warn!(cname, "no channel slot");
            return Reply::not_found(format!("Invalid channel for cname: {cname}\n"));
        };

        if self.pool.slot(cid).token.is_empty() {
            self.pool.slot_mut(cid).create_token();
        }
        let channel = self.pool.slot(cid);
        if channel.is_free() {
            debug!(cname, cid, token = %channel.token, expires, "sign");
        } else {
            debug!(cname, cid, token = %channel.token, expires, "re-sign");
        }

        let idle = (expires / i64::from(self.config.channel_check_interval)) as i32;
        let channel = self.pool.slot_mut(cid);
        channel.idle = idle;

        let body = frame::sign(
            cb,
            cid,
            channel.msg_seq_min(),
            &channel.token,
            expires,
            self.config.channel_timeout,
        );
        Reply::html(body)
    }

    /// Terminate the channel named `cname`.
    ///
    /// Parked subscribers receive a terminal `close` frame (not appended to
    /// the ring) and the slot is recycled immediately.
    pub fn close(&mut self, cname: &str, content: &str) -> Reply {
        let Some(cid) = self.pool.get_by_name(cname) else {
            warn!(cname, "channel not found");
            return Reply::not_found(format!("cname[{cname}] not connected\n"));
        };
        let channel = self.pool.slot(cid);
        debug!(cid, subs = channel.subs_len, content, "close channel");
        let reply = Reply::html(format!("ok {}\n", channel.seq_next));
        if !channel.is_free() {
            self.channel_send(cid, PushKind::Close, content);
            self.pool.release(cid);
        }
        reply
    }

    /// Channel statistics (`cname` given) or global statistics.
    #[must_use]
    pub fn info(&self, cname: &str) -> Reply {
        if cname.is_empty() {
            Reply::html(frame::info_global(self.pool.used_len(), self.subscribers))
        } else {
            let subs = self
                .pool
                .get_by_name(cname)
                .map_or(0, |cid| self.pool.slot(cid).subs_len);
            Reply::html(frame::info_channel(cname, subs))
        }
    }

    /// Channel liveness check.
    #[must_use]
    pub fn check(&self, cname: &str) -> Reply {
        let live = self
            .pool
            .get_by_name(cname)
            .is_some_and(|cid| !self.pool.slot(cid).is_free());
        Reply::html(frame::check(live.then_some(cname)))
    }

    /// Liveness probe carrying the poll timeout.
    #[must_use]
    pub fn ping(&self, cb: &str) -> Reply {
        Reply::js(frame::ping(cb, self.config.polling_timeout))
    }

    /// One sweeper tick: age channels and parked subscribers.
    ///
    /// Unsubscribed channels count down and are released once exhausted.
    /// Subscribed channels are clamped back up to the channel budget while
    /// their subscribers count up; a subscriber past the polling budget is
    /// flushed with a keep-alive noop and detached. Successors are cached
    /// before any removal, so dropping the current node is safe.
    pub fn sweep(&mut self) {
        let channel_idles = self.config.channel_idles();
        let polling_idles = self.config.polling_idles();

        let mut cursor = self.pool.used_head();
        while let Some(cid) = cursor {
            cursor = self.pool.slot(cid).next;

            if self.pool.slot(cid).subs_len == 0 {
                let channel = self.pool.slot_mut(cid);
                channel.idle -= 1;
                if channel.idle < 0 {
                    self.pool.release(cid);
                }
                continue;
            }

            {
                let channel = self.pool.slot_mut(cid);
                if channel.idle < channel_idles {
                    channel.idle = channel_idles;
                }
            }

            let mut sub_cursor = self.pool.slot(cid).subs_head;
            while let Some(index) = sub_cursor {
                sub_cursor = self.subs.at(index).next;
                let sub = self.subs.at_mut(index);
                sub.idle += 1;
                if sub.idle <= polling_idles {
                    continue;
                }
                let noop = frame::noop(&sub.callback, cid, sub.noop_seq);
                let _ = sub.frames.send(noop);
                self.sub_end(index);
            }
        }
    }

    /// Transport notification that a parked client hung up.
    ///
    /// Safe to call with a stale key: a subscriber the engine already
    /// detached (delivery, sweep, or close) has a bumped generation and the
    /// call is a no-op, so detach never runs twice.
    pub fn subscriber_closed(&mut self, key: SubscriberKey) {
        if self.subs.get(key).is_none() {
            return;
        }
        trace!("connection closed");
        self.sub_end(key.index);
    }

    /// Emit one frame to every parked subscriber of `cid` and detach them
    /// all, ending their responses.
    fn channel_send(&mut self, cid: usize, kind: PushKind, content: &str) {
        let seq = self.pool.slot(cid).seq_next.wrapping_sub(1);
        let mut cursor = self.pool.slot(cid).subs_head;
        while let Some(index) = cursor {
            cursor = self.subs.at(index).next;
            {
                let sub = self.subs.at(index);
                let frame = frame::push(&sub.callback, kind, cid, seq, content);
                // a failed send means the client is already gone; detach it
                // all the same, the message stays in the ring
                let _ = sub.frames.send(frame);
            }
            self.sub_end(index);
        }
        debug_assert_eq!(self.pool.slot(cid).subs_len, 0);
    }

    /// Append a parked subscriber to its channel's list.
    fn attach(&mut self, cid: usize, index: usize) {
        let tail = self.pool.slot(cid).subs_tail;
        {
            let sub = self.subs.at_mut(index);
            sub.prev = tail;
            sub.next = None;
            sub.idle = 0;
        }
        match tail {
            Some(t) => self.subs.at_mut(t).next = Some(index),
            None => self.pool.slot_mut(cid).subs_head = Some(index),
        }
        let channel = self.pool.slot_mut(cid);
        channel.subs_tail = Some(index);
        channel.subs_len += 1;
    }

    /// Detach a subscriber and return its record to the arena.
    ///
    /// Dropping the record closes the frame sender, which ends the chunked
    /// response if it is still open.
    fn sub_end(&mut self, index: usize) {
        let sub = self.subs.remove(index);
        let cid = sub.channel;
        match sub.prev {
            Some(p) => self.subs.at_mut(p).next = sub.next,
            None => self.pool.slot_mut(cid).subs_head = sub.next,
        }
        match sub.next {
            Some(n) => self.subs.at_mut(n).prev = sub.prev,
            None => self.pool.slot_mut(cid).subs_tail = sub.prev,
        }
        self.pool.slot_mut(cid).subs_len -= 1;
        self.subscribers -= 1;
        debug!(
            cid,
            channels = self.pool.used_len(),
            subs = self.pool.slot(cid).subs_len,
            "sub_end"
        );
        debug_assert_eq!(self.subscribers, self.subs.len());
    }
}
