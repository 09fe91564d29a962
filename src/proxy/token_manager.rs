use std::sync::Arc;
use tokio::sync::Mutex;

use crate::modules::oauth::TokenSource;

// Tokens are refreshed this long before the provider's stated expiry
// (55 of 60 minutes for a standard Google token).
const EXPIRY_SAFETY_WINDOW_SECS: i64 = 300;
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    /// Unix seconds after which the token is refreshed
    expires_at: i64,
}

/// Single-slot access token cache.
///
/// The slot lock is held across a refresh, so concurrent callers wait for
/// one identity-provider round trip instead of each starting their own.
pub struct TokenManager {
    source: Arc<dyn TokenSource>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    /// Returns a valid access token, refreshing it if needed.
    ///
    /// Identity-provider failures are logged and reported as `None`.
    pub async fn get_token(&self) -> Option<String> {
        let mut cached = self.cached.lock().await;

        let now = chrono::Utc::now().timestamp();
        if let Some(token) = cached.as_ref() {
            if now < token.expires_at {
                return Some(token.access_token.clone());
            }
            tracing::debug!("Cached access token expired, refreshing");
        }

        match self.source.fetch_token().await {
            Ok(token) => {
                let lifetime = if token.expires_in > 0 {
                    token.expires_in
                } else {
                    DEFAULT_TOKEN_LIFETIME_SECS
                };
                let valid_for = (lifetime - EXPIRY_SAFETY_WINDOW_SECS).max(0);
                tracing::info!("Access token refreshed, cached for {}s", valid_for);

                *cached = Some(CachedToken {
                    access_token: token.token.clone(),
                    expires_at: now + valid_for,
                });
                Some(token.token)
            }
            Err(e) => {
                tracing::error!("Error getting Google Auth token: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use crate::modules::oauth::AccessToken;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
        expires_in: i64,
        delay: Duration,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
                expires_in: 3600,
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> AppResult<AccessToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(AppError::OAuth("metadata server unreachable".to_string()));
            }
            Ok(AccessToken {
                token: format!("token-{}", n),
                expires_in: self.expires_in,
            })
        }
    }

    #[tokio::test]
    async fn test_cached_token_reused() {
        let source = Arc::new(CountingSource::new());
        let manager = TokenManager::new(source.clone());

        assert_eq!(manager.get_token().await.as_deref(), Some("token-1"));
        assert_eq!(manager.get_token().await.as_deref(), Some("token-1"));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_unexpired_seeded_token_skips_provider() {
        let source = Arc::new(CountingSource::new());
        let manager = TokenManager::new(source.clone());
        *manager.cached.lock().await = Some(CachedToken {
            access_token: "seeded".to_string(),
            expires_at: chrono::Utc::now().timestamp() + 600,
        });

        assert_eq!(manager.get_token().await.as_deref(), Some("seeded"));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_refreshed() {
        let source = Arc::new(CountingSource::new());
        let manager = TokenManager::new(source.clone());
        *manager.cached.lock().await = Some(CachedToken {
            access_token: "stale".to_string(),
            expires_at: chrono::Utc::now().timestamp() - 1,
        });

        assert_eq!(manager.get_token().await.as_deref(), Some("token-1"));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_expiry_has_safety_margin() {
        let source = Arc::new(CountingSource::new());
        let manager = TokenManager::new(source.clone());
        let before = chrono::Utc::now().timestamp();
        manager.get_token().await;

        let expires_at = manager.cached.lock().await.as_ref().unwrap().expires_at;
        assert!(expires_at >= before + 3300);
        assert!(expires_at <= chrono::Utc::now().timestamp() + 3300);
    }

    #[tokio::test]
    async fn test_short_lived_token_not_reused() {
        let mut source = CountingSource::new();
        source.expires_in = 120;
        let source = Arc::new(source);
        let manager = TokenManager::new(source.clone());

        manager.get_token().await;
        manager.get_token().await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_returns_none_and_retries() {
        let mut source = CountingSource::new();
        source.fail = true;
        let source = Arc::new(source);
        let manager = TokenManager::new(source.clone());

        assert!(manager.get_token().await.is_none());
        assert!(manager.get_token().await.is_none());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let mut source = CountingSource::new();
        source.delay = Duration::from_millis(50);
        let source = Arc::new(source);
        let manager = Arc::new(TokenManager::new(source.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().as_deref(), Some("token-1"));
        }
        assert_eq!(source.calls(), 1);
    }
}
