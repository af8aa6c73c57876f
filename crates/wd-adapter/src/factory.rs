//! Session opening: server normalisation, the legacy base-path retry, pool
//! readiness polling and the keep-alive probe.

use std::sync::{Arc, Weak};

use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;
use uiscout_core_types::Platform;

use crate::config::{merge_capabilities, AdapterConfig};
use crate::error::AdapterError;
use crate::pool::{BrowserPool, PoolStatus};
use crate::session::{DriverSession, WdSession};
use crate::transport::{TransportFactory, Verb, WdTransport};

/// Normalise a user-supplied server address into a base URL.
///
/// Accepts bare `host:port`, injecting the configured default scheme, and
/// optionally upgrades `http` to `https`. Trailing slashes are dropped so
/// path joining stays predictable.
pub fn normalize_server(raw: &str, config: &AdapterConfig) -> Result<Url, AdapterError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AdapterError::InvalidServer(raw.to_string()));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("{}://{}", config.default_scheme, trimmed)
    };
    let mut url = Url::parse(&with_scheme)
        .map_err(|_| AdapterError::InvalidServer(raw.to_string()))?;
    if config.force_tls && url.scheme() == "http" {
        // Scheme swap cannot fail for an http URL.
        let _ = url.set_scheme("https");
    }
    Ok(url)
}

/// Append the legacy `/wd/hub` base path, or `None` when already present.
pub fn append_wd_hub(url: &Url) -> Option<Url> {
    if url.path().trim_end_matches('/').ends_with("/wd/hub") {
        return None;
    }
    let mut retry = url.clone();
    {
        let mut segments = retry.path_segments_mut().ok()?;
        segments.pop_if_empty();
        segments.push("wd");
        segments.push("hub");
    }
    Some(retry)
}

/// Opens driver sessions against automation servers.
pub struct SessionFactory {
    config: AdapterConfig,
    transports: Box<dyn TransportFactory>,
}

impl SessionFactory {
    pub fn new(config: AdapterConfig, transports: Box<dyn TransportFactory>) -> Self {
        Self { config, transports }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Open a session, retrying once with `/wd/hub` appended when the remote
    /// end looks like a legacy-base-path Appium server.
    pub async fn open(
        &self,
        platform: Platform,
        server: &str,
        overrides: &Value,
    ) -> Result<Arc<WdSession>, AdapterError> {
        let base = normalize_server(server, &self.config)?;
        let capabilities = merge_capabilities(
            self.config.capabilities.for_platform(platform),
            overrides,
        );

        match self.open_at(base.clone(), platform, &capabilities).await {
            Ok(session) => Ok(session),
            Err(err) if err.needs_base_path_retry() => {
                let Some(retry_base) = append_wd_hub(&base) else {
                    return Err(err);
                };
                info!(server = %base, retry = %retry_base, "retrying session open with legacy base path");
                self.open_at(retry_base, platform, &capabilities).await
            }
            Err(err) => Err(err),
        }
    }

    /// Lease a browser from a pool, wait for it to come up, then open a
    /// session against its WebDriver endpoint.
    pub async fn open_pooled(
        &self,
        pool: &dyn BrowserPool,
        overrides: &Value,
    ) -> Result<Arc<WdSession>, AdapterError> {
        let lease = pool.acquire().await?;
        debug!(instance = %lease.instance_id, "leased browser instance");

        let mut ready_url = None;
        for attempt in 1..=self.config.pool_ready_attempts {
            match pool.status(&lease).await {
                Ok(PoolStatus::Ready { webdriver_url }) => {
                    ready_url = Some(webdriver_url);
                    break;
                }
                Ok(PoolStatus::Pending) => {
                    debug!(instance = %lease.instance_id, attempt, "browser instance not ready yet");
                }
                Err(err) => {
                    warn!(instance = %lease.instance_id, attempt, error = %err, "pool status check failed");
                }
            }
            if attempt < self.config.pool_ready_attempts {
                sleep(self.config.pool_ready_backoff).await;
            }
        }

        let Some(webdriver_url) = ready_url else {
            if let Err(err) = pool.release(&lease).await {
                warn!(instance = %lease.instance_id, error = %err, "failed to release unready instance");
            }
            return Err(AdapterError::NotReady {
                attempts: self.config.pool_ready_attempts,
            });
        };

        let capabilities = merge_capabilities(
            self.config.capabilities.for_platform(Platform::Web),
            overrides,
        );
        self.open_at(webdriver_url, Platform::Web, &capabilities)
            .await
    }

    async fn open_at(
        &self,
        base: Url,
        platform: Platform,
        capabilities: &Value,
    ) -> Result<Arc<WdSession>, AdapterError> {
        let transport = self.transports.transport(base.clone())?;
        let body = json!({
            "capabilities": {"alwaysMatch": capabilities, "firstMatch": [{}]},
        });
        let value = transport.execute(Verb::Post, "session", Some(body)).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::protocol("session response missing sessionId"))?
            .to_string();
        let negotiated = value
            .get("capabilities")
            .cloned()
            .unwrap_or_else(|| capabilities.clone());

        info!(server = %base, platform = %platform.as_str(), session_id = %session_id, "session opened");
        let session = Arc::new(WdSession::new(transport, session_id, platform, negotiated));
        spawn_keepalive(&session, &self.config);
        Ok(session)
    }
}

/// Periodically probe the session so idle command timeouts never reap it.
/// Probe failures are logged and the loop keeps going; it exits when the
/// session is quit or dropped.
fn spawn_keepalive(session: &Arc<WdSession>, config: &AdapterConfig) {
    let weak: Weak<WdSession> = Arc::downgrade(session);
    let token = session.keepalive_token();
    let interval = config.keepalive_interval;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(interval) => {}
            }
            let Some(session) = weak.upgrade() else { break };
            if let Err(err) = session.page_source().await {
                warn!(session_id = %session.session_id(), error = %err, "keep-alive probe failed");
            }
        }
    });
}
