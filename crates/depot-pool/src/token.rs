use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::data::Token;
use crate::effects::SessionError;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TokenKey {
    pub depot_id: u32,
    pub host:     String,
}

struct Issued {
    token:     Token,
    issued_at: Instant,
}

/// Tokens per `(depot, routing host)`, requested at most once per key while
/// valid. Concurrent callers for one key share a single request; a failed
/// request leaves the key empty for the next caller.
#[derive(Default)]
pub(crate) struct TokenCache {
    ttl:     Option<Duration>,
    entries: Mutex<HashMap<TokenKey, Arc<OnceCell<Issued>>>>,
}

impl TokenCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: Mutex::default(),
        }
    }

    pub async fn get_or_request<F, Fut>(&self, key: TokenKey, request: F) -> Result<Token, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Token, SessionError>>,
    {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = entries.entry(key.clone()).or_default();
            let expired = match (self.ttl, slot.get()) {
                (Some(ttl), Some(issued)) => issued.issued_at.elapsed() >= ttl,
                _ => false,
            };
            if expired {
                *slot = Arc::default();
            }
            Arc::clone(slot)
        };

        let issued = cell
            .get_or_try_init(|| async {
                let token = request().await?;
                Ok::<_, SessionError>(Issued {
                    token,
                    issued_at: Instant::now(),
                })
            })
            .await;
        match issued {
            Ok(issued) => Ok(issued.token.clone()),
            Err(e) => {
                self.forget_failed(&key, &cell);
                Err(e)
            }
        }
    }

    /// Drop the empty cell left by a failed request unless another caller
    /// still holds it and may fill it.
    fn forget_failed(&self, key: &TokenKey, cell: &Arc<OnceCell<Issued>>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let unused = entries
            .get(key)
            .is_some_and(|slot| Arc::ptr_eq(slot, cell) && !slot.initialized() && Arc::strong_count(slot) == 2);
        if unused {
            entries.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|cell| cell.initialized()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(depot_id: u32) -> TokenKey {
        TokenKey {
            depot_id,
            host: "cache.example".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_token_is_reused() {
        let cache = TokenCache::new(None);
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let request = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Token::new("t"))
        };

        cache.get_or_request(key(1), request).await.unwrap();
        cache.get_or_request(key(1), request).await.unwrap();
        cache.get_or_request(key(2), request).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_request_is_not_cached() {
        let cache = TokenCache::new(None);
        let err = cache
            .get_or_request(key(1), || async { Err(SessionError::Request("denied".into())) })
            .await;
        assert!(err.is_err());
        assert_eq!(cache.len(), 0);

        let token = cache.get_or_request(key(1), || async { Ok(Token::new("ok")) }).await.unwrap();
        assert_eq!(token.secret(), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_requests_leave_no_entries_behind() {
        let cache = TokenCache::new(None);
        for depot_id in 0..50 {
            let err = cache
                .get_or_request(key(depot_id), || async { Err(SessionError::Request("denied".into())) })
                .await;
            assert!(err.is_err());
        }
        assert!(cache.entries.lock().unwrap().is_empty());

        cache.get_or_request(key(7), || async { Ok(Token::new("ok")) }).await.unwrap();
        assert_eq!(cache.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_is_requested_again() {
        let cache = TokenCache::new(Some(Duration::from_secs(60)));
        cache.get_or_request(key(1), || async { Ok(Token::new("old")) }).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        let still = cache.get_or_request(key(1), || async { Ok(Token::new("new")) }).await.unwrap();
        assert_eq!(still.secret(), "old");

        tokio::time::advance(Duration::from_secs(31)).await;
        let fresh = cache.get_or_request(key(1), || async { Ok(Token::new("new")) }).await.unwrap();
        assert_eq!(fresh.secret(), "new");
    }
}
