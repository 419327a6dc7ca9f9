use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use depot_pool::{
    Directory, DirectoryError, EndpointPool, PoolError, PoolOptions, Server, Session, SessionError, Token,
};
use tokio::time::Instant;

struct MockDirectory {
    script:   Mutex<VecDeque<Result<Vec<Server>, DirectoryError>>>,
    fallback: Result<Vec<Server>, DirectoryError>,
    calls:    AtomicUsize,
}

impl MockDirectory {
    fn serving(servers: Vec<Server>) -> Arc<Self> { Self::scripted(vec![], Ok(servers)) }

    fn scripted(
        script: Vec<Result<Vec<Server>, DirectoryError>>,
        fallback: Result<Vec<Server>, DirectoryError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

impl Directory for MockDirectory {
    async fn list_servers(&self, _cell_id: u32) -> Result<Vec<Server>, DirectoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

struct MockSession {
    connected:    AtomicBool,
    token_calls:  AtomicUsize,
    denied_depot: Option<u32>,
    token_delay:  Duration,
}

impl MockSession {
    fn connected() -> Arc<Self> { Self::with(None, Duration::ZERO) }

    fn with(denied_depot: Option<u32>, token_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            token_calls: AtomicUsize::new(0),
            denied_depot,
            token_delay,
        })
    }

    fn disconnect(&self) { self.connected.store(false, Ordering::SeqCst); }

    fn token_calls(&self) -> usize { self.token_calls.load(Ordering::SeqCst) }
}

impl Session for MockSession {
    fn is_connected(&self) -> bool { self.connected.load(Ordering::SeqCst) }

    fn resolve_routing_host(&self, host: &str) -> String { host.to_string() }

    async fn request_token(&self, app_id: u32, depot_id: u32, host: &str) -> Result<Token, SessionError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        if !self.token_delay.is_zero() {
            tokio::time::sleep(self.token_delay).await;
        }
        if self.denied_depot == Some(depot_id) {
            return Err(SessionError::TokenUnavailable {
                depot_id,
                host: host.to_string(),
            });
        }
        Ok(Token::new(format!("{app_id}:{depot_id}:{host}")))
    }
}

type TestPool = EndpointPool<Arc<MockDirectory>, Arc<MockSession>, HashMap<String, i32>>;

fn start(options: PoolOptions, directory: &Arc<MockDirectory>, session: &Arc<MockSession>) -> TestPool {
    EndpointPool::start(options, directory.clone(), session.clone(), HashMap::new())
}

fn deadline() -> Instant { Instant::now() + Duration::from_secs(30) }

fn small() -> PoolOptions { PoolOptions::default().min_available(1) }

#[tokio::test(start_paused = true)]
async fn test_released_endpoint_is_reused_without_rediscovery() {
    let directory = MockDirectory::serving(vec![Server::new("a").entries(4)]);
    let session = MockSession::connected();
    let pool = start(small(), &directory, &session);

    let first = pool.acquire(440, 441, deadline()).await.unwrap();
    let endpoint = first.endpoint().clone();
    let listings = directory.calls();
    pool.release(first);
    assert_eq!(pool.active_len(), 1);

    let second = pool.acquire(440, 441, deadline()).await.unwrap();

    assert!(Arc::ptr_eq(second.endpoint(), &endpoint));
    assert_eq!(directory.calls(), listings);
    assert_eq!(session.token_calls(), 1);
    assert_eq!(second.token().secret(), "440:441:a");
    assert_eq!(pool.active_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_discarded_endpoint_never_comes_back() {
    let directory = MockDirectory::serving(vec![
        Server::new("a").weighted_load(1).entries(2),
        Server::new("b").weighted_load(2).entries(2),
    ]);
    let session = MockSession::connected();
    let pool = start(small(), &directory, &session);

    let broken = pool.acquire(1, 2, deadline()).await.unwrap();
    let still_held = pool.acquire(1, 2, deadline()).await.unwrap();
    let discarded_serial = broken.endpoint().serial();
    assert_eq!(still_held.endpoint().serial(), discarded_serial);

    pool.discard(broken);
    assert_eq!(pool.discarded_len(), 1);
    pool.release(still_held);
    assert_eq!(pool.active_len(), 0);
    assert_eq!(pool.available_len(), 2);
    assert_eq!(pool.discarded_len(), 0);

    let b1 = pool.acquire(1, 2, deadline()).await.unwrap();
    let b2 = pool.acquire(1, 2, deadline()).await.unwrap();
    assert_eq!(b1.endpoint().host(), "b");
    assert_eq!(b2.endpoint().host(), "b");

    let fresh = pool.acquire(1, 2, deadline()).await.unwrap();
    assert_eq!(fresh.endpoint().host(), "a");
    assert_ne!(fresh.endpoint().serial(), discarded_serial);
    assert_eq!(directory.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_discarded_serials_are_forgotten_once_unreferenced() {
    let directory = MockDirectory::serving(vec![Server::new("a").weighted_load(1).entries(1)]);
    let session = MockSession::connected();
    let pool = start(small(), &directory, &session);

    for _ in 0..20 {
        let lease = pool.acquire(1, 2, deadline()).await.unwrap();
        pool.discard(lease);
        assert_eq!(pool.discarded_len(), 0);
    }
    assert!(directory.calls() >= 20);
}

#[tokio::test(start_paused = true)]
async fn test_slots_follow_descending_penalty_then_load() {
    let directory = MockDirectory::serving(vec![
        Server::new("b").weighted_load(1),
        Server::new("a").weighted_load(3),
        Server::new("c").weighted_load(2),
    ]);
    let session = MockSession::connected();
    let penalties = HashMap::from([("a".to_string(), 5), ("c".to_string(), 5)]);
    let pool = EndpointPool::start(small(), directory.clone(), session.clone(), penalties);

    let mut order = Vec::new();
    for _ in 0..3 {
        let lease = pool.acquire(1, 1, deadline()).await.unwrap();
        order.push(lease.endpoint().host().to_string());
    }

    assert_eq!(order, ["c", "a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_times_out_while_directory_fails() {
    let directory = MockDirectory::scripted(vec![], Err(DirectoryError::Network("unreachable".into())));
    let session = MockSession::connected();
    let pool = start(PoolOptions::default(), &directory, &session);

    let result = pool.acquire(1, 1, Instant::now() + Duration::from_secs(3)).await;

    assert!(matches!(result, Err(PoolError::Timeout)));
    assert!(directory.calls() >= 2);
    assert!(!pool.is_exhausted());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_listing_is_retried_with_backoff() {
    let directory = MockDirectory::scripted(
        vec![Err(DirectoryError::RateLimited), Err(DirectoryError::RateLimited)],
        Ok(vec![Server::new("a")]),
    );
    let session = MockSession::connected();
    let pool = start(small(), &directory, &session);
    let started = Instant::now();

    let lease = pool.acquire(1, 1, deadline()).await.unwrap();

    assert_eq!(lease.endpoint().host(), "a");
    assert_eq!(directory.calls(), 3);
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_authentication_failure_keeps_endpoint_active() {
    let directory = MockDirectory::serving(vec![Server::new("a")]);
    let session = MockSession::with(Some(9), Duration::ZERO);
    let pool = start(small(), &directory, &session);

    let err = pool.acquire(1, 9, deadline()).await.unwrap_err();
    assert!(matches!(
        &err,
        PoolError::AuthenticationFailed { host, depot_id: 9, source: SessionError::TokenUnavailable { .. } }
            if host == "a"
    ));
    assert_eq!(pool.active_len(), 1);
    assert_eq!(pool.cached_tokens(), 0);

    let lease = pool.acquire(1, 10, deadline()).await.unwrap();
    assert_eq!(lease.endpoint().host(), "a");
    assert_eq!(pool.active_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_acquires_share_one_token_request() {
    let directory = MockDirectory::serving(vec![Server::new("a").entries(2)]);
    let session = MockSession::with(None, Duration::from_millis(100));
    let pool = start(small(), &directory, &session);

    let (l1, l2) = tokio::join!(pool.acquire(5, 7, deadline()), pool.acquire(5, 7, deadline()));

    assert_eq!(l1.unwrap().token(), l2.unwrap().token());
    assert_eq!(session.token_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_token_is_requested_again() {
    let directory = MockDirectory::serving(vec![Server::new("a").entries(4)]);
    let session = MockSession::connected();
    let pool = start(small().token_ttl(Some(Duration::from_secs(60))), &directory, &session);

    let lease = pool.acquire(1, 1, deadline()).await.unwrap();
    pool.release(lease);
    tokio::time::advance(Duration::from_secs(61)).await;
    pool.acquire(1, 1, deadline()).await.unwrap();

    assert_eq!(session.token_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_empty_listing_exhausts_the_pool() {
    let directory = MockDirectory::serving(vec![]);
    let session = MockSession::connected();
    let pool = start(PoolOptions::default(), &directory, &session);

    assert!(matches!(pool.acquire(1, 1, deadline()).await, Err(PoolError::PoolExhausted)));
    pool.exhausted().await;
    assert!(pool.is_exhausted());
    assert!(matches!(pool.acquire(1, 1, deadline()).await, Err(PoolError::PoolExhausted)));
    assert_eq!(directory.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_after_population_exhausts_the_pool() {
    let directory = MockDirectory::serving(vec![Server::new("a")]);
    let session = MockSession::connected();
    let pool = start(small(), &directory, &session);

    let _lease = pool.acquire(1, 1, deadline()).await.unwrap();
    session.disconnect();

    assert!(matches!(pool.acquire(1, 1, deadline()).await, Err(PoolError::PoolExhausted)));
    assert!(!pool.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_idempotent_and_rejects_acquire() {
    let directory = MockDirectory::serving(vec![Server::new("a")]);
    let session = MockSession::connected();
    let pool = start(small(), &directory, &session);

    pool.shutdown().await;
    pool.shutdown().await;

    assert!(pool.is_shut_down());
    assert!(!pool.is_exhausted());
    assert!(matches!(pool.acquire(1, 1, deadline()).await, Err(PoolError::ShutDown)));
}
