use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A content server as listed by the directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Server {
    pub host:          String,
    /// Lower is better.
    pub weighted_load: u32,
    /// Number of pool slots this server is worth.
    pub entries:       u32,
}

impl Server {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host:          host.into(),
            weighted_load: 0,
            entries:       1,
        }
    }

    pub fn weighted_load(mut self, weighted_load: u32) -> Self {
        self.weighted_load = weighted_load;
        self
    }

    pub fn entries(mut self, entries: u32) -> Self {
        self.entries = entries;
        self
    }
}

/// One discovered server instance.
///
/// Every slot produced by the same discovery shares the same `Endpoint`;
/// the serial tells instances of an identical server apart.
#[derive(Debug)]
pub struct Endpoint {
    serial: u64,
    server: Server,
}

impl Endpoint {
    pub(crate) fn new(serial: u64, server: Server) -> Self { Self { serial, server } }

    pub fn serial(&self) -> u64 { self.serial }

    pub fn server(&self) -> &Server { &self.server }

    pub fn host(&self) -> &str { &self.server.host }
}

/// Credential for one depot on one routing host.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(secret: impl Into<String>) -> Self { Self(secret.into()) }

    pub fn secret(&self) -> &str { &self.0 }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Token(<redacted>)") }
}

/// An endpoint handed out by [`EndpointPool::acquire`](crate::EndpointPool::acquire).
///
/// Give it back with `release` after successful use or `discard` after a
/// failure.
#[derive(Debug)]
pub struct Lease {
    pub(crate) endpoint: Arc<Endpoint>,
    pub(crate) host:     String,
    pub(crate) token:    Token,
}

impl Lease {
    pub fn endpoint(&self) -> &Arc<Endpoint> { &self.endpoint }

    /// Host the token was issued for.
    pub fn routing_host(&self) -> &str { &self.host }

    pub fn token(&self) -> &Token { &self.token }
}

#[derive(Clone, Debug)]
pub struct PoolOptions {
    pub cell_id:       u32,
    pub min_available: usize,
    pub poll_interval: Duration,
    pub backoff_base:  Duration,
    pub max_backoff:   Duration,
    pub token_ttl:     Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            cell_id:       0,
            min_available: 8,
            poll_interval: Duration::from_secs(1),
            backoff_base:  Duration::from_secs(1),
            max_backoff:   Duration::from_secs(5),
            token_ttl:     None,
        }
    }
}

impl PoolOptions {
    pub fn cell_id(mut self, cell_id: u32) -> Self {
        self.cell_id = cell_id;
        self
    }

    pub fn min_available(mut self, min_available: usize) -> Self {
        self.min_available = min_available;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.max_backoff = max;
        self
    }

    pub fn token_ttl(mut self, token_ttl: Option<Duration>) -> Self {
        self.token_ttl = token_ttl;
        self
    }
}
