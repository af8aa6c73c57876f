//! Browser pool port.
//!
//! Web targets may point at a pool service instead of a bare WebDriver
//! endpoint. The pool hands out browser instances asynchronously, so the
//! factory requests one and polls its status until a WebDriver URL is ready.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::AdapterError;

/// A leased browser instance, identified by the pool's own id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLease {
    pub instance_id: String,
}

/// Lifecycle state of a leased instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolStatus {
    /// Still starting up.
    Pending,
    /// Ready to accept sessions at the given WebDriver endpoint.
    Ready { webdriver_url: Url },
}

#[async_trait]
pub trait BrowserPool: Send + Sync {
    /// Request a new browser instance.
    async fn acquire(&self) -> Result<PoolLease, AdapterError>;

    /// Poll the state of a leased instance.
    async fn status(&self, lease: &PoolLease) -> Result<PoolStatus, AdapterError>;

    /// Return the instance to the pool. Best effort; errors are logged by
    /// callers, never propagated into run results.
    async fn release(&self, lease: &PoolLease) -> Result<(), AdapterError>;
}

#[derive(Debug, Deserialize)]
struct InstancePayload {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    webdriver_url: Option<String>,
}

/// Pool client over an HTTP instance-management API.
pub struct HttpBrowserPool {
    client: reqwest::Client,
    base: Url,
}

impl HttpBrowserPool {
    pub fn new(base: Url) -> Result<Self, AdapterError> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base,
        })
    }

    fn instances_url(&self, suffix: Option<&str>) -> Result<Url, AdapterError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AdapterError::InvalidServer(self.base.to_string()))?;
            segments.pop_if_empty();
            segments.push("instances");
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }

    fn parse_instance(payload: Value) -> Result<InstancePayload, AdapterError> {
        serde_json::from_value(payload)
            .map_err(|err| AdapterError::protocol(format!("malformed pool response: {err}")))
    }
}

#[async_trait]
impl BrowserPool for HttpBrowserPool {
    async fn acquire(&self) -> Result<PoolLease, AdapterError> {
        let url = self.instances_url(None)?;
        let payload: Value = self
            .client
            .post(url)
            .json(&Value::Object(Default::default()))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let instance = Self::parse_instance(payload)?;
        Ok(PoolLease {
            instance_id: instance.id,
        })
    }

    async fn status(&self, lease: &PoolLease) -> Result<PoolStatus, AdapterError> {
        let url = self.instances_url(Some(&lease.instance_id))?;
        let payload: Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let instance = Self::parse_instance(payload)?;

        if instance.status.eq_ignore_ascii_case("ready") {
            let raw = instance.webdriver_url.ok_or_else(|| {
                AdapterError::protocol("pool reported ready without a webdriver url")
            })?;
            let webdriver_url = Url::parse(&raw)
                .map_err(|err| AdapterError::protocol(format!("bad pool webdriver url: {err}")))?;
            return Ok(PoolStatus::Ready { webdriver_url });
        }
        Ok(PoolStatus::Pending)
    }

    async fn release(&self, lease: &PoolLease) -> Result<(), AdapterError> {
        let url = self.instances_url(Some(&lease.instance_id))?;
        self.client.delete(url).send().await?.error_for_status()?;
        Ok(())
    }
}
