use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{backoff_delay, rank_servers};
use crate::data::{Endpoint, Lease, PoolOptions, Server};
use crate::effects::{Directory, Penalties, Session};
use crate::error::PoolError;
use crate::token::{TokenCache, TokenKey};

/// Self-replenishing pool of content server endpoints.
///
/// A background discovery task keeps at least
/// [`min_available`](PoolOptions::min_available) slots queued while the
/// session is connected. Workers [`acquire`](Self::acquire) an endpoint with a
/// token for their depot, then either [`release`](Self::release) it for reuse
/// or [`discard`](Self::discard) it after a failure.
pub struct EndpointPool<D, S, P> {
    shared:  Arc<Shared<D, S, P>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct Queues {
    /// Unclaimed slots in rank order.
    available: VecDeque<Arc<Endpoint>>,
    /// Endpoints that worked; most recently released on top.
    active:    Vec<Arc<Endpoint>>,
    /// Discarded instances that still have a lease out.
    discarded: HashMap<u64, Weak<Endpoint>>,
}

impl Queues {
    fn prune_discarded(&mut self) { self.discarded.retain(|_, endpoint| endpoint.strong_count() > 0); }
}

struct Shared<D, S, P> {
    options:     PoolOptions,
    directory:   D,
    session:     S,
    penalties:   P,
    queues:      Mutex<Queues>,
    item_ready:  Notify,
    populate:    Notify,
    exhausted:   watch::Sender<bool>,
    shutdown:    watch::Sender<bool>,
    next_serial: AtomicU64,
    tokens:      TokenCache,
}

enum Discovery {
    Populated(usize),
    Empty,
    Disconnected,
    Stopped,
}

impl<D, S, P> EndpointPool<D, S, P>
where
    D: Directory,
    S: Session,
    P: Penalties,
{
    /// Create the pool and start its discovery task on the current runtime.
    pub fn start(options: PoolOptions, directory: D, session: S, penalties: P) -> Self {
        let tokens = TokenCache::new(options.token_ttl);
        let shared = Arc::new(Shared {
            options,
            directory,
            session,
            penalties,
            queues: Mutex::default(),
            item_ready: Notify::new(),
            populate: Notify::new(),
            exhausted: watch::Sender::new(false),
            shutdown: watch::Sender::new(false),
            next_serial: AtomicU64::new(1),
            tokens,
        });
        let monitor = tokio::spawn(run_discovery(Arc::clone(&shared)));
        Self {
            shared,
            monitor: Mutex::new(Some(monitor)),
        }
    }

    /// Hand out an endpoint authenticated for `depot_id`.
    ///
    /// Endpoints released earlier are preferred over fresh slots. Waits for
    /// discovery until `deadline`.
    pub async fn acquire(&self, app_id: u32, depot_id: u32, deadline: Instant) -> Result<Lease, PoolError> {
        let shared = &self.shared;
        let endpoint = shared.take_endpoint(deadline).await?;
        let host = shared.session.resolve_routing_host(endpoint.host());

        let key = TokenKey {
            depot_id,
            host: host.clone(),
        };
        let token = shared
            .tokens
            .get_or_request(key, || shared.session.request_token(app_id, depot_id, &host))
            .await;

        match token {
            Ok(token) => {
                debug!(host = %host, depot_id, serial = endpoint.serial(), "endpoint acquired");
                Ok(Lease { endpoint, host, token })
            },
            Err(source) => {
                warn!(host = %host, depot_id, error = %source, "failed to obtain depot token");
                shared.push_active(endpoint);
                Err(PoolError::AuthenticationFailed { host, depot_id, source })
            },
        }
    }

    /// Return an endpoint that worked so the next `acquire` reuses it.
    pub fn release(&self, lease: Lease) {
        let serial = lease.endpoint.serial();
        {
            let mut queues = self.shared.lock_queues();
            if queues.discarded.contains_key(&serial) {
                debug!(host = lease.endpoint.host(), serial, "not returning discarded endpoint");
                drop(lease);
                queues.prune_discarded();
                return;
            }
            queues.active.push(lease.endpoint);
        }
        self.shared.item_ready.notify_waiters();
    }

    /// Take a failed endpoint out of circulation, including any of its slots
    /// still queued.
    pub fn discard(&self, lease: Lease) {
        let serial = lease.endpoint.serial();
        let mut queues = self.shared.lock_queues();
        queues.discarded.insert(serial, Arc::downgrade(&lease.endpoint));
        queues.active.retain(|e| e.serial() != serial);
        queues.available.retain(|e| e.serial() != serial);
        debug!(host = lease.endpoint.host(), serial, "endpoint discarded");
        drop(lease);
        queues.prune_discarded();
    }

    /// Stop discovery and wait for the task to exit. Later calls return at once.
    pub async fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
        let monitor = self.monitor.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(monitor) = monitor {
            if let Err(e) = monitor.await {
                warn!(error = %e, "endpoint discovery task failed");
            }
        }
    }

    pub fn available_len(&self) -> usize { self.shared.lock_queues().available.len() }

    pub fn active_len(&self) -> usize { self.shared.lock_queues().active.len() }

    /// Discarded endpoints with leases still outstanding.
    pub fn discarded_len(&self) -> usize { self.shared.lock_queues().discarded.len() }

    /// Number of tokens currently cached.
    pub fn cached_tokens(&self) -> usize { self.shared.tokens.len() }

    pub fn is_exhausted(&self) -> bool { *self.shared.exhausted.borrow() }

    pub fn is_shut_down(&self) -> bool { *self.shared.shutdown.borrow() }

    /// Resolve once the pool is exhausted.
    pub async fn exhausted(&self) {
        let mut exhausted = self.shared.exhausted.subscribe();
        let _ = exhausted.wait_for(|e| *e).await;
    }
}

impl<D, S, P> Drop for EndpointPool<D, S, P> {
    fn drop(&mut self) { self.shared.shutdown.send_replace(true); }
}

impl<D, S, P> Shared<D, S, P>
where
    D: Directory,
    S: Session,
    P: Penalties,
{
    fn lock_queues(&self) -> MutexGuard<'_, Queues> { self.queues.lock().unwrap_or_else(PoisonError::into_inner) }

    fn push_active(&self, endpoint: Arc<Endpoint>) {
        {
            let mut queues = self.lock_queues();
            if queues.discarded.contains_key(&endpoint.serial()) {
                drop(endpoint);
                queues.prune_discarded();
                return;
            }
            queues.active.push(endpoint);
        }
        self.item_ready.notify_waiters();
    }

    async fn take_endpoint(&self, deadline: Instant) -> Result<Arc<Endpoint>, PoolError> {
        let mut exhausted = self.exhausted.subscribe();
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if *exhausted.borrow_and_update() {
                return Err(PoolError::PoolExhausted);
            }
            if *shutdown.borrow_and_update() {
                return Err(PoolError::ShutDown);
            }

            let notified = self.item_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut queues = self.lock_queues();
                if let Some(endpoint) = queues.active.pop() {
                    return Ok(endpoint);
                }
                if queues.available.len() < self.options.min_available {
                    self.populate.notify_one();
                }
                if let Some(endpoint) = queues.available.pop_front() {
                    return Ok(endpoint);
                }
            }

            tokio::select! {
                _ = &mut notified => {},
                _ = exhausted.changed() => {},
                _ = shutdown.changed() => {},
                _ = tokio::time::sleep_until(deadline) => return Err(PoolError::Timeout),
            }
        }
    }

    fn signal_exhausted(&self, reason: &str) {
        warn!(reason, "content server pool exhausted");
        self.exhausted.send_replace(true);
    }

    /// Fetch candidates, retrying with backoff until the directory answers,
    /// the session drops or the pool shuts down.
    async fn discover(&self, shutdown: &mut watch::Receiver<bool>) -> Discovery {
        let options = &self.options;
        let mut attempt = 0;

        loop {
            let listed = tokio::select! {
                listed = self.directory.list_servers(options.cell_id) => listed,
                _ = shutdown.changed() => return Discovery::Stopped,
            };

            match listed {
                Ok(servers) if servers.is_empty() => return Discovery::Empty,
                Ok(servers) => return Discovery::Populated(self.enqueue(servers)),
                Err(e) => {
                    let delay = backoff_delay(attempt, options.backoff_base, options.max_backoff);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "failed to list content servers");
                    attempt = attempt.saturating_add(1);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {},
                        _ = shutdown.changed() => return Discovery::Stopped,
                    }
                    if !self.session.is_connected() {
                        return Discovery::Disconnected;
                    }
                },
            }
        }
    }

    fn enqueue(&self, servers: Vec<Server>) -> usize {
        let ranked = rank_servers(servers, |host| self.penalties.penalty(host));
        let mut added = 0;
        {
            let mut queues = self.lock_queues();
            for server in ranked {
                let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
                let slots = server.entries as usize;
                let endpoint = Arc::new(Endpoint::new(serial, server));
                for _ in 0..slots {
                    queues.available.push_back(Arc::clone(&endpoint));
                }
                added += slots;
            }
        }
        self.item_ready.notify_waiters();
        added
    }
}

async fn run_discovery<D, S, P>(shared: Arc<Shared<D, S, P>>)
where
    D: Directory,
    S: Session,
    P: Penalties,
{
    let mut shutdown = shared.shutdown.subscribe();
    let mut populated = false;

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let connected = shared.session.is_connected();
        let available = shared.lock_queues().available.len();

        if connected && available < shared.options.min_available {
            match shared.discover(&mut shutdown).await {
                Discovery::Populated(added) => {
                    populated = true;
                    info!(added, available = available + added, "content server pool populated");
                },
                Discovery::Empty => {
                    shared.signal_exhausted("directory listed no content servers");
                    break;
                },
                Discovery::Disconnected => debug!("session disconnected during discovery"),
                Discovery::Stopped => break,
            }
        } else if !connected && available == 0 && populated {
            shared.signal_exhausted("session disconnected and no endpoints remain");
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => {},
            _ = shared.populate.notified() => {},
            _ = tokio::time::sleep(shared.options.poll_interval) => {},
        }
    }

    debug!("endpoint discovery stopped");
}
