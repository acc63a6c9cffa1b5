//! End-to-end tests for the local fault detector.
//!
//! A fake GFD and fake servers talk to the real detector components over
//! loopback TCP: registration, handshakes, heartbeat streams and the
//! membership events that result.

use std::net::SocketAddr;
use std::time::Duration;

use lfd_core::{
    EventKind, HandshakePolicy, LfdConfig, LfdError, LfdId, LivenessDeadline, MembershipEvent,
    ProtocolError, ServerId, TerminationCause,
};
use lfd_daemon::{
    spawn_session, Dispatcher, GfdLink, LocalFaultDetector, RegistryListener, ServerSession,
    SessionContext,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

const LFD_ID: u64 = 5;
const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Fake GFD
// ============================================================================

/// Split a byte stream of back-to-back events ("7,add1,remove") into events.
fn parse_events(buf: &mut String) -> Vec<MembershipEvent> {
    let mut events = Vec::new();
    loop {
        let digits = buf.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 || buf.len() <= digits {
            break;
        }
        let rest = &buf[digits..];
        let len = if rest.starts_with(",add") {
            4
        } else if rest.starts_with(",remove") {
            7
        } else {
            break;
        };
        let end = digits + len;
        events.push(MembershipEvent::decode(buf[..end].as_bytes()).expect("valid event"));
        buf.drain(..end);
    }
    events
}

/// GFD stand-in: assigns an ID, then records every membership event.
struct FakeGfd {
    addr: String,
    events: mpsc::UnboundedReceiver<MembershipEvent>,
}

impl FakeGfd {
    /// Start a GFD that replies to registration with `reply`.
    async fn start_with_reply(reply: &'static [u8]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, events) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(reply).await.unwrap();

            let mut pending = String::new();
            let mut buf = [0u8; 1024];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        pending.push_str(std::str::from_utf8(&buf[..n]).unwrap());
                        for event in parse_events(&mut pending) {
                            let _ = tx.send(event);
                        }
                    }
                }
            }
        });

        Self { addr, events }
    }

    async fn start() -> Self {
        Self::start_with_reply(b"5").await
    }

    async fn expect_event(&mut self) -> MembershipEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for GFD event")
            .expect("GFD connection ended")
    }

    /// Assert nothing arrives for `quiet`.
    async fn expect_no_event(&mut self, quiet: Duration) {
        if let Ok(Some(event)) = timeout(quiet, self.events.recv()).await {
            panic!("unexpected GFD event: {}", event);
        }
    }
}

// ============================================================================
// Fake server
// ============================================================================

struct TestServer {
    stream: TcpStream,
    pending: String,
}

impl TestServer {
    /// Connect and announce `id`.
    async fn connect(addr: SocketAddr, id: u64) -> Self {
        let mut server = Self::connect_silent(addr).await;
        server.send(id.to_string().as_bytes()).await;
        server
    }

    /// Connect without sending a handshake.
    async fn connect_silent(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Failed to connect");
        Self {
            stream,
            pending: String::new(),
        }
    }

    async fn send(&mut self, data: &[u8]) {
        self.stream.write_all(data).await.expect("Failed to send");
    }

    /// Wait for the next heartbeat and return its text.
    async fn recv_heartbeat_within(&mut self, within: Duration) -> Option<String> {
        const SUFFIX: &str = " heartbeat";
        let deadline = Instant::now() + within;
        loop {
            if let Some(pos) = self.pending.find(SUFFIX) {
                let end = pos + SUFFIX.len();
                let heartbeat: String = self.pending.drain(..end).collect();
                return Some(heartbeat);
            }
            let mut buf = [0u8; 1024];
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => return None,
                Ok(Ok(n)) => self
                    .pending
                    .push_str(std::str::from_utf8(&buf[..n]).unwrap()),
            }
        }
    }

    async fn expect_heartbeat(&mut self) -> String {
        self.recv_heartbeat_within(WAIT)
            .await
            .expect("expected a heartbeat")
    }

    /// Whether the detector closed our connection within `within`.
    async fn closed_within(&mut self, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        let mut buf = [0u8; 1024];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(_)) => continue,
                Err(_) => return false,
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Register with `gfd` and run a dispatcher on a random port.
async fn start_detector(
    gfd: &FakeGfd,
    interval: Duration,
    configure: impl FnOnce(Dispatcher) -> Dispatcher,
) -> (SocketAddr, JoinHandle<Result<(), LfdError>>) {
    let (link, identity) = GfdLink::register(&gfd.addr, interval)
        .await
        .expect("registration failed");
    assert_eq!(identity.id, LfdId::new(LFD_ID));

    let listener = RegistryListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let dispatcher = configure(Dispatcher::new(identity, link, listener));

    (addr, tokio::spawn(dispatcher.run()))
}

fn join(id: u64) -> MembershipEvent {
    MembershipEvent::join(ServerId::new(id))
}

fn leave(id: u64) -> MembershipEvent {
    MembershipEvent::leave(ServerId::new(id))
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_server_join_then_crash_reports_add_and_remove_once() {
    let mut gfd = FakeGfd::start().await;
    let (addr, _dispatch) = start_detector(&gfd, Duration::from_millis(200), |d| d).await;

    let mut server = TestServer::connect(addr, 7).await;

    assert_eq!(server.expect_heartbeat().await, "LFD5 heartbeat");
    assert_eq!(gfd.expect_event().await, join(7));

    // Crash the server
    drop(server);

    assert_eq!(gfd.expect_event().await, leave(7));
    gfd.expect_no_event(Duration::from_millis(800)).await;
}

#[tokio::test]
async fn test_no_heartbeat_before_handshake() {
    let mut gfd = FakeGfd::start().await;
    let (addr, _dispatch) = start_detector(&gfd, Duration::from_millis(100), |d| d).await;

    let mut server = TestServer::connect_silent(addr).await;
    assert!(
        server
            .recv_heartbeat_within(Duration::from_millis(400))
            .await
            .is_none()
    );
    gfd.expect_no_event(Duration::from_millis(50)).await;

    server.send(b"9").await;
    server.expect_heartbeat().await;
    assert_eq!(gfd.expect_event().await, join(9));
}

#[tokio::test]
async fn test_heartbeats_follow_configured_interval() {
    let interval = Duration::from_millis(200);
    let gfd = FakeGfd::start().await;
    let (addr, _dispatch) = start_detector(&gfd, interval, |d| d).await;

    let mut server = TestServer::connect(addr, 4).await;

    server.expect_heartbeat().await;
    let first = Instant::now();
    for _ in 0..3 {
        server.expect_heartbeat().await;
    }
    let elapsed = first.elapsed();

    // Three intervals between the first and fourth heartbeat
    assert!(elapsed >= interval * 3 - Duration::from_millis(60), "{:?}", elapsed);
    assert!(elapsed < interval * 3 + Duration::from_millis(500), "{:?}", elapsed);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let mut gfd = FakeGfd::start().await;
    let (addr, _dispatch) = start_detector(&gfd, Duration::from_millis(150), |d| d).await;

    let mut one = TestServer::connect(addr, 1).await;
    let mut two = TestServer::connect(addr, 2).await;

    one.expect_heartbeat().await;
    two.expect_heartbeat().await;

    let mut joined = vec![gfd.expect_event().await, gfd.expect_event().await];
    joined.sort_by_key(|e| e.server_id);
    assert_eq!(joined, vec![join(1), join(2)]);

    drop(one);
    assert_eq!(gfd.expect_event().await, leave(1));

    // Server 2 keeps its stream
    for _ in 0..3 {
        assert_eq!(two.expect_heartbeat().await, "LFD5 heartbeat");
    }
    gfd.expect_no_event(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_malformed_handshake_halts_dispatch_under_strict_policy() {
    let gfd = FakeGfd::start().await;
    let (addr, dispatch) = start_detector(&gfd, Duration::from_millis(100), |d| {
        d.with_handshake_policy(HandshakePolicy::Strict)
    })
    .await;

    let mut server = TestServer::connect_silent(addr).await;
    server.send(b"server-one").await;

    let result = timeout(WAIT, dispatch)
        .await
        .expect("dispatch loop should halt")
        .unwrap();
    assert!(matches!(
        result,
        Err(LfdError::Protocol(ProtocolError::InvalidId { .. }))
    ));
}

#[tokio::test]
async fn test_malformed_handshake_only_drops_connection_under_isolated_policy() {
    let mut gfd = FakeGfd::start().await;
    let (addr, dispatch) = start_detector(&gfd, Duration::from_millis(100), |d| {
        d.with_handshake_policy(HandshakePolicy::Isolated)
    })
    .await;

    let mut bad = TestServer::connect_silent(addr).await;
    bad.send(b"garbage").await;
    assert!(bad.closed_within(WAIT).await);

    let mut good = TestServer::connect(addr, 3).await;
    good.expect_heartbeat().await;
    assert_eq!(gfd.expect_event().await, join(3));
    assert!(!dispatch.is_finished());
}

#[tokio::test]
async fn test_non_numeric_registration_fails_startup() {
    let gfd = FakeGfd::start_with_reply(b"not-an-id").await;
    let config = LfdConfig {
        gfd_host: "127.0.0.1".into(),
        gfd_port: gfd.addr.rsplit(':').next().unwrap().parse().unwrap(),
        listen_addr: "127.0.0.1:0".into(),
        ..Default::default()
    };

    let err = LocalFaultDetector::start(&config).await.err().unwrap();
    assert!(matches!(
        err,
        LfdError::Protocol(ProtocolError::InvalidId { .. })
    ));
}

#[tokio::test]
async fn test_detector_start_and_run_from_config() {
    let mut gfd = FakeGfd::start().await;
    let config = LfdConfig {
        heartbeat_interval_secs: 1,
        gfd_host: "127.0.0.1".into(),
        gfd_port: gfd.addr.rsplit(':').next().unwrap().parse().unwrap(),
        listen_addr: "127.0.0.1:0".into(),
        ..Default::default()
    };

    let detector = LocalFaultDetector::start(&config).await.unwrap();
    assert_eq!(detector.identity().id, LfdId::new(LFD_ID));
    let addr = detector.local_addr();
    tokio::spawn(detector.run());

    let mut server = TestServer::connect(addr, 11).await;
    assert_eq!(server.expect_heartbeat().await, "LFD5 heartbeat");
    assert_eq!(gfd.expect_event().await, join(11));
}

#[tokio::test]
async fn test_silent_server_expires_with_liveness_deadline() {
    let interval = Duration::from_millis(100);
    let mut gfd = FakeGfd::start().await;
    let (addr, _dispatch) = start_detector(&gfd, interval, |d| {
        d.with_liveness(Some(LivenessDeadline::new(interval, 3)))
    })
    .await;

    // Connected but never replies
    let mut server = TestServer::connect(addr, 8).await;
    server.expect_heartbeat().await;
    assert_eq!(gfd.expect_event().await, join(8));

    assert_eq!(gfd.expect_event().await, leave(8));
    assert!(server.closed_within(WAIT).await);
}

#[tokio::test]
async fn test_responsive_server_survives_liveness_deadline() {
    let interval = Duration::from_millis(100);
    let mut gfd = FakeGfd::start().await;
    let (addr, _dispatch) = start_detector(&gfd, interval, |d| {
        d.with_liveness(Some(LivenessDeadline::new(interval, 3)))
    })
    .await;

    let mut server = TestServer::connect(addr, 6).await;
    server.expect_heartbeat().await;
    assert_eq!(gfd.expect_event().await, join(6));

    // Answer every heartbeat for well past the deadline
    for _ in 0..10 {
        server.expect_heartbeat().await;
        server.send(b"ack").await;
    }
    gfd.expect_no_event(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_session_limit_defers_new_servers() {
    let mut gfd = FakeGfd::start().await;
    let (addr, _dispatch) = start_detector(&gfd, Duration::from_millis(100), |d| {
        d.with_max_sessions(Some(1))
    })
    .await;

    let mut first = TestServer::connect(addr, 1).await;
    first.expect_heartbeat().await;
    assert_eq!(gfd.expect_event().await, join(1));

    let mut second = TestServer::connect(addr, 2).await;
    assert!(
        second
            .recv_heartbeat_within(Duration::from_millis(400))
            .await
            .is_none()
    );

    drop(first);
    assert_eq!(gfd.expect_event().await, leave(1));

    second.expect_heartbeat().await;
    assert_eq!(gfd.expect_event().await, join(2));
}

// ============================================================================
// Session-level tests (spawn_session)
// ============================================================================

/// Accept one connection from a fresh server and build its session.
async fn accepted_session(id: u64) -> (ServerSession, TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap())
        .await
        .unwrap();
    let (stream, peer) = listener.accept().await.unwrap();
    (ServerSession::new(ServerId::new(id), peer), stream, client)
}

#[tokio::test]
async fn test_session_outcome_after_crash() {
    let mut gfd = FakeGfd::start().await;
    let (link, identity) = GfdLink::register(&gfd.addr, Duration::from_millis(100))
        .await
        .unwrap();
    let ctx = SessionContext {
        identity,
        gfd: link.handle(),
        liveness: None,
    };

    let (session, stream, client) = accepted_session(21).await;
    let handle = spawn_session(session, stream, &ctx, None);

    assert_eq!(gfd.expect_event().await, join(21));
    drop(client);

    let outcome = timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(outcome.is_terminated());
    assert!(outcome.has_announced_join());
    assert_eq!(
        outcome.termination_cause(),
        Some(TerminationCause::HeartbeatFailed)
    );
    assert_eq!(gfd.expect_event().await.kind, EventKind::Leave);
}

#[tokio::test]
async fn test_join_report_failure_ends_session_without_leave() {
    // GFD assigns an ID, then closes its end of the link
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gfd_addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"5").await.unwrap();
    });

    let (link, identity) = GfdLink::register(&gfd_addr, Duration::from_millis(50))
        .await
        .unwrap();
    let gfd = link.handle();

    // Writes into the closed socket fail once the peer resets it, which
    // stops the writer task for good.
    for _ in 0..50 {
        if gfd.send(join(99)).await.is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(gfd.is_closed());

    let ctx = SessionContext {
        identity,
        gfd,
        liveness: None,
    };
    let (session, stream, mut client) = accepted_session(22).await;
    let handle = spawn_session(session, stream, &ctx, None);

    // The heartbeat itself goes through; reporting the join does not.
    let mut buf = [0u8; 64];
    let n = timeout(WAIT, client.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf[..n], b"LFD5 heartbeat");

    let outcome = timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(outcome.is_terminated());
    assert!(outcome.has_announced_join());
    assert_eq!(outcome.heartbeats_sent(), 1);
    assert_eq!(
        outcome.termination_cause(),
        Some(TerminationCause::ReportFailed)
    );

    // The supervisor has released the connection
    let closed = timeout(WAIT, client.read(&mut buf)).await.unwrap();
    assert!(matches!(closed, Ok(0) | Err(_)));
}

#[test]
fn test_parse_events_splits_coalesced_writes() {
    let mut buf = String::from("7,add1,remove12,ad");
    let events = parse_events(&mut buf);
    assert_eq!(events, vec![join(7), leave(1)]);
    assert_eq!(buf, "12,ad");
}
