//! Session-open behaviour against a scripted transport: the legacy base-path
//! retry and pool readiness polling.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;
use wd_adapter::DriverSession;

use uiscout_core_types::Platform;
use wd_adapter::{
    AdapterConfig, AdapterError, BrowserPool, PoolLease, PoolStatus, SessionFactory,
    TransportFactory, Verb, WdTransport,
};

/// Transport that rejects session creation everywhere except under /wd/hub.
struct LegacyPathTransport {
    base: Url,
    attempts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl WdTransport for LegacyPathTransport {
    async fn execute(
        &self,
        verb: Verb,
        path: &str,
        _body: Option<Value>,
    ) -> Result<Value, AdapterError> {
        self.attempts
            .lock()
            .unwrap()
            .push(format!("{} {}", self.base, path));
        if verb == Verb::Post && path == "session" {
            if self.base.path().ends_with("/wd/hub") {
                return Ok(json!({
                    "sessionId": "sess-1",
                    "capabilities": {"platformName": "Android"},
                }));
            }
            return Err(AdapterError::driver(
                "unknown command",
                "The requested resource could not be found",
            ));
        }
        Ok(Value::Null)
    }

    fn base_url(&self) -> &Url {
        &self.base
    }
}

struct RecordingFactory {
    attempts: Arc<Mutex<Vec<String>>>,
}

impl TransportFactory for RecordingFactory {
    fn transport(&self, base: Url) -> Result<Box<dyn WdTransport>, AdapterError> {
        Ok(Box::new(LegacyPathTransport {
            base,
            attempts: self.attempts.clone(),
        }))
    }
}

#[tokio::test]
async fn open_retries_once_with_wd_hub() {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let factory = SessionFactory::new(
        AdapterConfig::default(),
        Box::new(RecordingFactory {
            attempts: attempts.clone(),
        }),
    );

    let session = factory
        .open(Platform::Android, "device-farm:4723", &Value::Null)
        .await
        .expect("retry should succeed");
    assert_eq!(session.session_id(), "sess-1");

    let attempts = attempts.lock().unwrap();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[0].starts_with("http://device-farm:4723/"));
    assert!(attempts[1].starts_with("http://device-farm:4723/wd/hub"));
}

/// Pool that becomes ready after a configurable number of status polls.
struct SlowPool {
    ready_after: u32,
    polls: Mutex<u32>,
    released: Mutex<Vec<String>>,
}

#[async_trait]
impl BrowserPool for SlowPool {
    async fn acquire(&self) -> Result<PoolLease, AdapterError> {
        Ok(PoolLease {
            instance_id: "inst-1".to_string(),
        })
    }

    async fn status(&self, _lease: &PoolLease) -> Result<PoolStatus, AdapterError> {
        let mut polls = self.polls.lock().unwrap();
        *polls += 1;
        if *polls >= self.ready_after {
            Ok(PoolStatus::Ready {
                webdriver_url: Url::parse("http://browser-1:9515/wd/hub").unwrap(),
            })
        } else {
            Ok(PoolStatus::Pending)
        }
    }

    async fn release(&self, lease: &PoolLease) -> Result<(), AdapterError> {
        self.released.lock().unwrap().push(lease.instance_id.clone());
        Ok(())
    }
}

fn fast_config() -> AdapterConfig {
    AdapterConfig {
        pool_ready_attempts: 3,
        pool_ready_backoff: Duration::from_millis(1),
        ..AdapterConfig::default()
    }
}

#[tokio::test]
async fn pooled_open_waits_for_readiness() {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let factory = SessionFactory::new(
        fast_config(),
        Box::new(RecordingFactory {
            attempts: attempts.clone(),
        }),
    );
    let pool = SlowPool {
        ready_after: 2,
        polls: Mutex::new(0),
        released: Mutex::new(Vec::new()),
    };

    let session = factory
        .open_pooled(&pool, &Value::Null)
        .await
        .expect("pool becomes ready within budget");
    assert_eq!(session.platform(), Platform::Web);
    assert!(pool.released.lock().unwrap().is_empty());
}

#[tokio::test]
async fn pooled_open_gives_up_and_releases() {
    let factory = SessionFactory::new(
        fast_config(),
        Box::new(RecordingFactory {
            attempts: Arc::new(Mutex::new(Vec::new())),
        }),
    );
    let pool = SlowPool {
        ready_after: 10,
        polls: Mutex::new(0),
        released: Mutex::new(Vec::new()),
    };

    let err = factory.open_pooled(&pool, &Value::Null).await.unwrap_err();
    assert!(matches!(err, AdapterError::NotReady { attempts: 3 }));
    assert_eq!(*pool.released.lock().unwrap(), vec!["inst-1".to_string()]);
}
