//! Integration tests for the relay HTTP transport.
//!
//! Exercises the full flow over a real listener: sign a channel, park a
//! long poll, publish, and observe the JSONP frames a browser would see.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use comet_core::{AuthMode, EngineConfig};
use comet_http::{RelayServerBuilder, RelayState, router, run_sweeper};
use testresult::TestResult;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};

fn init_tracing() {
    static ONCE: OnceLock<()> = OnceLock::new();
    ONCE.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

fn test_config() -> EngineConfig {
    EngineConfig {
        max_channels: 4,
        ..EngineConfig::default()
    }
}

// ─── Test Server Harness ─────────────────────────────────────────────────────

struct TestServer {
    state: Arc<RelayState>,
    base_url: String,
    /// Cancels the server and sweeper tasks on drop.
    _cancel: DropGuard,
}

impl TestServer {
    async fn start(config: EngineConfig) -> Self {
        init_tracing();

        let state = RelayServerBuilder::new(config).build().expect("valid config");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");

        let cancel = CancellationToken::new();
        tokio::spawn(run_sweeper(state.clone(), cancel.clone()));

        let app = router(state.clone());
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .expect("serve");
        });

        Self {
            state,
            base_url: format!("http://{addr}"),
            _cancel: cancel.drop_guard(),
        }
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    /// Wait for the engine to reach `count` parked subscribers.
    async fn await_subscribers(&self, count: usize) {
        for _ in 0..500 {
            if self.state.engine().subscriber_count() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never reached {count} subscribers");
    }
}

fn sign_token(body: &str) -> String {
    let (_, rest) = body.split_once("token: \"").expect("token field");
    let (token, _) = rest.split_once('"').expect("token closing quote");
    token.to_owned()
}

// ─── Round Trips ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn sign_park_publish_round_trip() -> TestResult {
    let server = TestServer::start(test_config()).await;
    let client = reqwest::Client::new();

    let sign = client.get(server.url("/sign?cname=a&expires=60")).send().await?;
    assert_eq!(sign.status(), 200);
    let sign_body = sign.text().await?;
    assert!(sign_body.starts_with("{type: \"sign\", cid: 0, seq: 0, token: \""));

    let parked = client.get(server.url("/sub?cid=0&seq=0&cb=f")).send().await?;
    assert_eq!(parked.status(), 200);
    assert_eq!(
        parked.headers()[reqwest::header::CONTENT_TYPE],
        "text/javascript; charset=utf-8"
    );
    server.await_subscribers(1).await;

    let publish = client.get(server.url("/pub?cid=0&content=hello&cb=f")).send().await?;
    assert_eq!(publish.status(), 200);
    assert_eq!(publish.text().await?, "f({type: \"ok\"});\n");

    // the parked response completes with exactly the delivered frame
    let delivered = tokio::time::timeout(Duration::from_secs(5), parked.text()).await??;
    assert_eq!(delivered, "f({type: \"data\", cid: \"0\", seq: \"0\", content: \"hello\"});\n");

    Ok(())
}

#[tokio::test]
async fn lagging_sub_resumes_without_parking() -> TestResult {
    let server = TestServer::start(test_config()).await;
    let client = reqwest::Client::new();

    client.get(server.url("/sign?cname=a")).send().await?;
    client.get(server.url("/pub?cid=0&content=hello")).send().await?;

    let resumed = client.get(server.url("/sub?cid=0&seq=0&cb=f")).send().await?;
    let body = tokio::time::timeout(Duration::from_secs(5), resumed.text()).await??;
    assert_eq!(body, "f([{type: \"data\", cid: \"0\", seq: \"0\", content: \"hello\"}]);\n");
    assert_eq!(server.state.engine().subscriber_count(), 0);

    Ok(())
}

#[tokio::test]
async fn close_flushes_parked_subscribers() -> TestResult {
    let server = TestServer::start(test_config()).await;
    let client = reqwest::Client::new();

    client.get(server.url("/sign?cname=a")).send().await?;
    let parked = client.get(server.url("/sub?cid=0&seq=0&cb=f")).send().await?;
    server.await_subscribers(1).await;

    let close = client.get(server.url("/close?cname=a&content=bye")).send().await?;
    assert_eq!(close.status(), 200);
    assert_eq!(close.text().await?, "ok 0\n");

    let body = tokio::time::timeout(Duration::from_secs(5), parked.text()).await??;
    assert!(body.contains("{type: \"close\", cid: \"0\","));
    assert_eq!(server.state.engine().channel_count(), 0);

    Ok(())
}

#[tokio::test]
async fn token_auth_rejects_in_band() -> TestResult {
    let server = TestServer::start(EngineConfig {
        auth: AuthMode::Token,
        ..test_config()
    })
    .await;
    let client = reqwest::Client::new();

    let sign_body = client.get(server.url("/sign?cname=a")).send().await?.text().await?;
    let token = sign_token(&sign_body);

    let rejected = client.get(server.url("/sub?cid=0&token=WRONG&cb=f")).send().await?;
    assert_eq!(rejected.status(), 200);
    assert_eq!(
        rejected.text().await?,
        "f({type: \"401\", cid: \"0\", seq: \"0\", content: \"Token Error\"});\n"
    );

    // the issued token parks
    let parked = client
        .get(server.url(&format!("/sub?cid=0&seq=0&cb=f&token={token}")))
        .send()
        .await?;
    assert_eq!(parked.status(), 200);
    server.await_subscribers(1).await;

    Ok(())
}

#[tokio::test]
async fn unknown_targets_are_reported() -> TestResult {
    let server = TestServer::start(test_config()).await;
    let client = reqwest::Client::new();

    let sub = client.get(server.url("/sub?cid=99&cb=f")).send().await?;
    assert_eq!(sub.status(), 200);
    assert_eq!(
        sub.text().await?,
        "f({type: \"404\", cid: \"99\", seq: \"0\", content: \"Not Found\"});\n"
    );

    let publish = client.get(server.url("/pub?cid=99&content=x")).send().await?;
    assert_eq!(publish.status(), 404);
    assert_eq!(publish.text().await?, "channel[99] not connected\n");

    let close = client.get(server.url("/close?cname=ghost")).send().await?;
    assert_eq!(close.status(), 404);

    Ok(())
}

#[tokio::test]
async fn exhausted_pool_rejects_sign() -> TestResult {
    let server = TestServer::start(EngineConfig {
        max_channels: 1,
        ..test_config()
    })
    .await;
    let client = reqwest::Client::new();

    assert_eq!(client.get(server.url("/sign?cname=a")).send().await?.status(), 200);
    let overflow = client.get(server.url("/sign?cname=b")).send().await?;
    assert_eq!(overflow.status(), 404);
    assert_eq!(overflow.text().await?, "Invalid channel for cname: b\n");

    Ok(())
}

#[tokio::test]
async fn ping_info_and_check_report_state() -> TestResult {
    let server = TestServer::start(test_config()).await;
    let client = reqwest::Client::new();

    let ping = client.get(server.url("/ping?cb=f")).send().await?;
    assert_eq!(ping.text().await?, "f({type: \"ping\", sub_timeout: 60});\n");

    client.get(server.url("/sign?cname=a")).send().await?;

    let info = client.get(server.url("/info")).send().await?;
    assert_eq!(info.text().await?, "{channels: 1, subscribers: 0}\n");

    let info = client.get(server.url("/info?cname=a")).send().await?;
    assert_eq!(info.text().await?, "{cname: \"a\", subscribers: 0}\n");

    let check = client.get(server.url("/check?cname=a")).send().await?;
    assert_eq!(check.text().await?, "{\"a\": 1}\n");

    let check = client.get(server.url("/check?cname=ghost")).send().await?;
    assert_eq!(check.text().await?, "{}\n");

    Ok(())
}

#[tokio::test]
async fn non_get_methods_are_rejected() -> TestResult {
    let server = TestServer::start(test_config()).await;
    let client = reqwest::Client::new();

    let response = client.post(server.url("/sub?cid=0")).send().await?;
    assert_eq!(response.status(), 405);

    let response = client.post(server.url("/pub?cid=0&content=x")).send().await?;
    assert_eq!(response.status(), 405);

    Ok(())
}

// ─── Timeouts and Disconnects ────────────────────────────────────────────────

#[tokio::test]
async fn idle_poll_receives_a_noop_and_ends() -> TestResult {
    let server = TestServer::start(EngineConfig {
        polling_timeout: 1,
        channel_timeout: 60,
        channel_check_interval: 1,
        ..test_config()
    })
    .await;
    let client = reqwest::Client::new();

    client.get(server.url("/sign?cname=a&expires=60")).send().await?;
    let parked = client.get(server.url("/sub?cid=0&seq=0&noop=7&cb=f")).send().await?;
    server.await_subscribers(1).await;

    let body = tokio::time::timeout(Duration::from_secs(10), parked.text()).await??;
    assert_eq!(body, "f({type: \"noop\", cid: \"0\", seq: \"7\"});\n");
    assert_eq!(server.state.engine().subscriber_count(), 0);

    Ok(())
}

#[tokio::test]
async fn client_disconnect_detaches_the_subscriber() -> TestResult {
    let server = TestServer::start(test_config()).await;
    let client = reqwest::Client::new();

    client.get(server.url("/sign?cname=a")).send().await?;
    let parked = client.get(server.url("/sub?cid=0&seq=0&cb=f")).send().await?;
    server.await_subscribers(1).await;

    // hanging up mid-poll must release the subscriber slot
    drop(parked);
    server.await_subscribers(0).await;

    // the channel itself stays allocated until the sweeper expires it
    assert_eq!(server.state.engine().channel_count(), 1);

    Ok(())
}
