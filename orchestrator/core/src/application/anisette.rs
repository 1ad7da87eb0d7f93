// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Anisette fallback chain: fast path first, plugin only after the fast path
//! reports an interrupted connection.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::anisette::{AnisetteError, AnisetteSource};
use crate::domain::errors::AuthenticationError;
use crate::domain::session::AnisetteData;

pub struct AnisetteProvider {
    source: Arc<dyn AnisetteSource>,
    plugin_timeout: Duration,
}

impl AnisetteProvider {
    pub fn new(source: Arc<dyn AnisetteSource>, plugin_timeout: Duration) -> Self {
        Self {
            source,
            plugin_timeout,
        }
    }

    pub async fn fetch(&self) -> Result<AnisetteData, AuthenticationError> {
        match self.source.request_anisette_data().await {
            Ok(data) => Ok(data),
            Err(AnisetteError::ConnectionInterrupted) => {
                warn!(
                    timeout_secs = self.plugin_timeout.as_secs(),
                    "Anisette connection interrupted, falling back to plugin"
                );
                self.fetch_via_plugin().await
            }
            Err(e) => Err(AuthenticationError::AnisetteUnavailable(e.to_string())),
        }
    }

    async fn fetch_via_plugin(&self) -> Result<AnisetteData, AuthenticationError> {
        let request = self.source.request_via_plugin(self.plugin_timeout);
        match tokio::time::timeout(self.plugin_timeout, request).await {
            Ok(Ok(data)) => {
                info!("Received anisette data from plugin");
                Ok(data)
            }
            Ok(Err(e)) => Err(AuthenticationError::AnisetteUnavailable(e.to_string())),
            Err(_) => {
                warn!("Anisette plugin timed out");
                Err(AuthenticationError::AnisetteUnavailable(
                    AnisetteError::NotFound.to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    struct ScriptedSource {
        fast: Result<AnisetteData, AnisetteError>,
        plugin_delay: Duration,
        plugin_calls: Mutex<usize>,
    }

    fn data() -> AnisetteData {
        AnisetteData {
            machine_id: "machine".to_string(),
            one_time_password: "otp".to_string(),
            local_user_id: "user".to_string(),
            generated_at: Utc::now(),
        }
    }

    #[async_trait]
    impl AnisetteSource for ScriptedSource {
        async fn request_anisette_data(&self) -> Result<AnisetteData, AnisetteError> {
            self.fast.clone()
        }

        async fn request_via_plugin(&self, _timeout: Duration) -> Result<AnisetteData, AnisetteError> {
            *self.plugin_calls.lock() += 1;
            tokio::time::sleep(self.plugin_delay).await;
            Ok(data())
        }
    }

    fn provider(fast: Result<AnisetteData, AnisetteError>, plugin_delay: Duration) -> (AnisetteProvider, Arc<ScriptedSource>) {
        let source = Arc::new(ScriptedSource {
            fast,
            plugin_delay,
            plugin_calls: Mutex::new(0),
        });
        (AnisetteProvider::new(source.clone(), Duration::from_secs(5)), source)
    }

    #[tokio::test]
    async fn test_fast_path_skips_plugin() {
        let (provider, source) = provider(Ok(data()), Duration::ZERO);
        assert!(provider.fetch().await.is_ok());
        assert_eq!(*source.plugin_calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_other_errors_do_not_fall_back() {
        let (provider, source) = provider(Err(AnisetteError::Other("offline".into())), Duration::ZERO);
        assert!(matches!(
            provider.fetch().await,
            Err(AuthenticationError::AnisetteUnavailable(_))
        ));
        assert_eq!(*source.plugin_calls.lock(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_falls_back_to_plugin() {
        let (provider, source) = provider(Err(AnisetteError::ConnectionInterrupted), Duration::from_secs(1));
        assert!(provider.fetch().await.is_ok());
        assert_eq!(*source.plugin_calls.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plugin_timeout_is_not_found() {
        let (provider, _) = provider(Err(AnisetteError::ConnectionInterrupted), Duration::from_secs(60));
        let error = provider.fetch().await.unwrap_err();
        assert_eq!(
            error,
            AuthenticationError::AnisetteUnavailable(AnisetteError::NotFound.to_string())
        );
    }
}
