//! Chunked response bodies for parked subscribers.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use comet_core::{Parked, SubscriberKey};
use futures::Stream;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::state::RelayState;

/// Streams JSONP frames to a parked subscriber.
///
/// The stream ends when the engine detaches the subscriber and drops the
/// frame sender. Dropping the body early (the client hung up) reports the
/// disconnect back to the engine through the guard.
pub(crate) struct ParkedBody {
    frames: UnboundedReceiver<Bytes>,
    _guard: DisconnectGuard,
}

impl ParkedBody {
    pub(crate) fn new(state: Arc<RelayState>, parked: Parked) -> Self {
        Self {
            frames: parked.frames,
            _guard: DisconnectGuard { state, key: parked.key },
        }
    }
}

impl Stream for ParkedBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().frames.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

/// Stands in for a connection close callback: runs when the response body
/// is dropped, whether the response completed or the client disconnected.
/// Keys of subscribers the engine already detached are stale and ignored.
struct DisconnectGuard {
    state: Arc<RelayState>,
    key: SubscriberKey,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.state.engine().subscriber_closed(self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comet_core::{EngineConfig, SubOutcome, SubRequest};
    use futures::StreamExt;

    fn park(state: &Arc<RelayState>) -> Parked {
        state.engine().sign("a", 60, None);
        let outcome = state.engine().sub(SubRequest {
            cid: 0,
            seq: 0,
            noop: 0,
            callback: "f".into(),
            token: String::new(),
        });
        match outcome {
            SubOutcome::Parked(parked) => parked,
            SubOutcome::Reply(reply) => panic!("expected park, got {reply:?}"),
        }
    }

    #[tokio::test]
    async fn body_yields_delivered_frames_then_ends() {
        let state = Arc::new(RelayState::new(EngineConfig::default()));
        let parked = park(&state);
        let mut body = ParkedBody::new(state.clone(), parked);

        state.engine().publish(0, "", "hello", None);

        let frame = body.next().await.expect("frame").expect("infallible");
        assert_eq!(frame, "f({type: \"data\", cid: \"0\", seq: \"0\", content: \"hello\"});\n");
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_body_detaches_the_subscriber() {
        let state = Arc::new(RelayState::new(EngineConfig::default()));
        let parked = park(&state);
        let body = ParkedBody::new(state.clone(), parked);

        assert_eq!(state.engine().subscriber_count(), 1);
        drop(body);
        assert_eq!(state.engine().subscriber_count(), 0);
    }
}
