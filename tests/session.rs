mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{fast_policy, option, LogScript, MockForwarder, MockGateway, NAMESPACE, POD_NAME};
use kube_external_forward::errors::{AppError, AppResult};
use kube_external_forward::session::{Session, SessionOption};
use kube_external_forward::tunnel::Tunnel;
use kube_external_forward::types::SessionState;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn web() -> Tunnel {
    Tunnel::new(10080, "www.example.com", 80)
}

fn db() -> Tunnel {
    Tunnel::new(15432, "db.staging", 5432)
}

struct Running {
    gateway: Arc<MockGateway>,
    forwarder: Arc<MockForwarder>,
    states: watch::Receiver<SessionState>,
    shutdown: CancellationToken,
    handle: JoinHandle<AppResult<()>>,
}

fn start(gateway: MockGateway, forwarder: MockForwarder, option: SessionOption) -> Running {
    let gateway = Arc::new(gateway);
    let forwarder = Arc::new(forwarder);
    let session = Session::new(Arc::clone(&gateway), Arc::clone(&forwarder), option);
    let states = session.subscribe();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(session.run(shutdown.clone()));
    Running {
        gateway,
        forwarder,
        states,
        shutdown,
        handle,
    }
}

async fn finish(running: &mut Running) -> AppResult<()> {
    let res = tokio::time::timeout(Duration::from_secs(10), &mut running.handle)
        .await
        .expect("session did not finish")
        .expect("session task panicked");
    let state = *running.states.borrow();
    assert!(state.is_closed(), "session returned in state {state:?}");
    res
}

async fn wait_active(running: &mut Running) {
    tokio::time::timeout(
        Duration::from_secs(5),
        running.states.wait_for(|s| *s >= SessionState::Active),
    )
    .await
    .expect("session never became active")
    .expect("state channel closed");
}

#[tokio::test]
async fn interrupt_after_active_is_clean_and_deletes_once() {
    let gateway = MockGateway::default();
    let forwarder = gateway.forwarder();
    let mut running = start(gateway, forwarder, option(vec![web(), db()]));

    wait_active(&mut running).await;
    running.shutdown.cancel();

    let res = finish(&mut running).await;
    assert!(res.is_ok(), "unexpected error: {res:?}");
    assert_eq!(running.gateway.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(running.forwarder.runs.load(Ordering::SeqCst), 2);
    assert_eq!(running.gateway.log_streams.load(Ordering::SeqCst), 1);
    assert_eq!(*running.states.borrow(), SessionState::Closed);
}

#[tokio::test]
async fn tunnels_target_the_created_pod_on_the_local_port() {
    let gateway = MockGateway::default();
    let forwarder = gateway.forwarder();
    let mut running = start(gateway, forwarder, option(vec![web(), db()]));

    wait_active(&mut running).await;
    running.shutdown.cancel();
    finish(&mut running).await.unwrap();

    let mut seen = running.forwarder.seen.lock().unwrap().clone();
    seen.sort_by_key(|o| o.source_port);
    assert_eq!(seen.len(), 2);
    for (opt, tunnel) in seen.iter().zip([web(), db()]) {
        assert_eq!(opt.source_host, tunnel.local_host);
        assert_eq!(opt.source_port, tunnel.local_port);
        assert_eq!(opt.target_namespace, NAMESPACE);
        assert_eq!(opt.target_pod_name, POD_NAME);
        assert_eq!(opt.target_container_port, tunnel.local_port);
    }
}

#[tokio::test]
async fn nothing_streams_before_the_pod_runs() {
    let gateway = MockGateway {
        running_after_polls: Some(4),
        ..MockGateway::default()
    };
    let forwarder = gateway.forwarder();
    let mut running = start(gateway, forwarder, option(vec![web(), db()]));

    wait_active(&mut running).await;
    running.shutdown.cancel();
    finish(&mut running).await.unwrap();

    assert!(running.gateway.polls.load(Ordering::SeqCst) >= 4);
    assert_eq!(running.gateway.gate_violations.load(Ordering::SeqCst), 0);
    assert_eq!(running.forwarder.runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn pod_never_running_is_not_ready_and_still_deleted() {
    let gateway = MockGateway {
        running_after_polls: None,
        ..MockGateway::default()
    };
    let forwarder = gateway.forwarder();
    let opt = SessionOption {
        ready_policy: fast_policy(Duration::from_millis(200)),
        ..option(vec![web()])
    };
    let mut running = start(gateway, forwarder, opt);

    let res = finish(&mut running).await;
    match res {
        Err(AppError::PodNotReady { namespace, name, reason }) => {
            assert_eq!(namespace, NAMESPACE);
            assert_eq!(name, POD_NAME);
            assert!(reason.contains("Pending"), "reason: {reason}");
        }
        other => panic!("expected PodNotReady, got {other:?}"),
    }
    assert_eq!(running.gateway.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(running.forwarder.runs.load(Ordering::SeqCst), 0);
    assert_eq!(running.gateway.log_streams.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn delete_exhaustion_requires_manual_cleanup() {
    let gateway = MockGateway {
        fail_delete: true,
        ..MockGateway::default()
    };
    let forwarder = gateway.forwarder();
    let opt = SessionOption {
        delete_policy: fast_policy(Duration::from_millis(150)),
        ..option(vec![web()])
    };
    let mut running = start(gateway, forwarder, opt);

    wait_active(&mut running).await;
    running.shutdown.cancel();

    match finish(&mut running).await {
        Err(AppError::ManualCleanupRequired { namespace, name, .. }) => {
            assert_eq!(namespace, NAMESPACE);
            assert_eq!(name, POD_NAME);
        }
        other => panic!("expected ManualCleanupRequired, got {other:?}"),
    }
    assert!(running.gateway.deletes.load(Ordering::SeqCst) > 1);
    assert_eq!(*running.states.borrow(), SessionState::ClosedWithWarning);
}

#[tokio::test]
async fn create_failure_leaves_nothing_to_clean() {
    let gateway = MockGateway {
        fail_create: true,
        ..MockGateway::default()
    };
    let forwarder = gateway.forwarder();
    let mut running = start(gateway, forwarder, option(vec![web()]));

    let res = finish(&mut running).await;
    assert!(matches!(res, Err(AppError::PodCreate { .. })), "got {res:?}");
    assert_eq!(running.gateway.polls.load(Ordering::SeqCst), 0);
    assert_eq!(running.gateway.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(*running.states.borrow(), SessionState::Closed);
}

#[tokio::test]
async fn forward_failure_cancels_the_session() {
    let gateway = MockGateway::default();
    let forwarder = gateway
        .forwarder()
        .failing(15432, Duration::from_millis(30), "listener closed");
    let mut running = start(gateway, forwarder, option(vec![web(), db()]));

    match finish(&mut running).await {
        Err(AppError::Forward { tunnel, message }) => {
            assert!(tunnel.contains("15432"), "tunnel: {tunnel}");
            assert!(message.contains("listener closed"), "message: {message}");
        }
        other => panic!("expected Forward, got {other:?}"),
    }
    assert_eq!(running.gateway.deletes.load(Ordering::SeqCst), 1);
    assert!(!running.shutdown.is_cancelled());
}

#[tokio::test]
async fn first_failure_wins_over_later_cleanup_failure() {
    let gateway = MockGateway {
        fail_delete: true,
        ..MockGateway::default()
    };
    let forwarder = gateway
        .forwarder()
        .failing(10080, Duration::from_millis(20), "upstream reset");
    let opt = SessionOption {
        delete_policy: fast_policy(Duration::from_millis(100)),
        ..option(vec![web()])
    };
    let mut running = start(gateway, forwarder, opt);

    let res = finish(&mut running).await;
    assert!(matches!(res, Err(AppError::Forward { .. })), "got {res:?}");
    assert_eq!(*running.states.borrow(), SessionState::ClosedWithWarning);
}

#[tokio::test]
async fn concurrent_failures_tear_down_once() {
    let gateway = MockGateway {
        logs: LogScript::FailAfter(Duration::from_millis(25)),
        ..MockGateway::default()
    };
    let forwarder = gateway
        .forwarder()
        .failing(10080, Duration::from_millis(25), "boom")
        .failing(15432, Duration::from_millis(25), "boom")
        .failing(16379, Duration::from_millis(25), "boom");
    let tunnels = vec![web(), db(), Tunnel::new(16379, "cache.staging", 6379)];
    let mut running = start(gateway, forwarder, option(tunnels));

    let res = finish(&mut running).await;
    assert!(
        matches!(res, Err(AppError::Forward { .. }) | Err(AppError::LogStream { .. })),
        "got {res:?}"
    );
    assert_eq!(running.gateway.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn log_stream_failure_cancels_the_session() {
    let gateway = MockGateway {
        logs: LogScript::FailAfter(Duration::from_millis(20)),
        ..MockGateway::default()
    };
    let forwarder = gateway.forwarder();
    let mut running = start(gateway, forwarder, option(vec![web()]));

    match finish(&mut running).await {
        Err(AppError::LogStream { pod, container, .. }) => {
            assert_eq!(pod, POD_NAME);
            assert_eq!(container, "envoy");
        }
        other => panic!("expected LogStream, got {other:?}"),
    }
    assert_eq!(running.gateway.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn clean_log_eof_keeps_the_session_alive() {
    let gateway = MockGateway {
        logs: LogScript::Eof,
        ..MockGateway::default()
    };
    let forwarder = gateway.forwarder();
    let mut running = start(gateway, forwarder, option(vec![web()]));

    wait_active(&mut running).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!running.handle.is_finished());

    running.shutdown.cancel();
    assert!(finish(&mut running).await.is_ok());
    assert_eq!(running.gateway.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn forwarder_error_during_shutdown_is_not_a_failure() {
    let gateway = MockGateway::default();
    let forwarder = MockForwarder {
        fail_on_stop: Some("use of closed network connection".to_string()),
        ..gateway.forwarder()
    };
    let mut running = start(gateway, forwarder, option(vec![web()]));

    wait_active(&mut running).await;
    running.shutdown.cancel();
    assert!(finish(&mut running).await.is_ok());
}

#[tokio::test]
async fn interrupt_while_waiting_skips_streams_but_deletes() {
    let gateway = MockGateway {
        running_after_polls: None,
        ..MockGateway::default()
    };
    let forwarder = gateway.forwarder();
    let mut running = start(gateway, forwarder, option(vec![web()]));

    tokio::time::sleep(Duration::from_millis(50)).await;
    running.shutdown.cancel();

    assert!(finish(&mut running).await.is_ok());
    assert_eq!(running.gateway.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(running.forwarder.runs.load(Ordering::SeqCst), 0);
    assert_eq!(*running.states.borrow(), SessionState::Closed);
}
