use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};
use uiscout_core_types::{Platform, TargetConfig};
use wd_adapter::{AdapterError, BrowserPool, DriverSession, SessionFactory};

use crate::error::RegistryError;

/// Opens one session for a target. The indirection keeps registry
/// preparation testable without a remote end.
#[async_trait]
pub trait SessionOpener: Send + Sync {
    async fn open(
        &self,
        platform: Platform,
        server: &str,
        overrides: &Value,
    ) -> Result<Arc<dyn DriverSession>, AdapterError>;
}

/// Production opener: web targets go through the browser pool when one is
/// configured, everything else straight to the automation server.
pub struct PooledOpener {
    factory: SessionFactory,
    pool: Option<Arc<dyn BrowserPool>>,
}

impl PooledOpener {
    pub fn new(factory: SessionFactory, pool: Option<Arc<dyn BrowserPool>>) -> Self {
        Self { factory, pool }
    }
}

#[async_trait]
impl SessionOpener for PooledOpener {
    async fn open(
        &self,
        platform: Platform,
        server: &str,
        overrides: &Value,
    ) -> Result<Arc<dyn DriverSession>, AdapterError> {
        if platform == Platform::Web {
            if let Some(pool) = &self.pool {
                let session = self.factory.open_pooled(pool.as_ref(), overrides).await?;
                return Ok(session);
            }
        }
        let session = self.factory.open(platform, server, overrides).await?;
        Ok(session)
    }
}

/// One live target: its alias, coordinates and the open session.
#[derive(Clone)]
pub struct TargetHandle {
    pub alias: String,
    pub platform: Platform,
    pub server: String,
    pub is_default: bool,
    pub session: Arc<dyn DriverSession>,
}

/// Outcome of alias resolution for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub alias: String,
    /// Set when the requested alias or platform did not match and the
    /// engine fell back; recorded in logs, never fatal.
    pub warning: Option<String>,
}

/// The set of live targets for a run, in configuration order.
pub struct TargetRegistry {
    targets: Vec<TargetHandle>,
}

impl std::fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetRegistry")
            .field(
                "targets",
                &self.targets.iter().map(|t| &t.alias).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl TargetRegistry {
    /// Open a session for every configured target.
    ///
    /// `platform` and `server` are run-level defaults applied when a target
    /// config leaves them out. Any failure closes the sessions already
    /// opened before the error is returned.
    pub async fn prepare(
        opener: &dyn SessionOpener,
        configs: &[TargetConfig],
        platform: Option<Platform>,
        server: Option<&str>,
        overrides: &Value,
    ) -> Result<Self, RegistryError> {
        if configs.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut targets: Vec<TargetHandle> = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            let alias = config
                .alias
                .clone()
                .unwrap_or_else(|| format!("target{}", index + 1));

            let result = Self::open_one(opener, config, &alias, platform, server, overrides, &targets).await;
            match result {
                Ok(handle) => targets.push(handle),
                Err(err) => {
                    Self::close_handles(&targets).await;
                    return Err(err);
                }
            }
        }

        if !targets.iter().any(|t| t.is_default) {
            targets[0].is_default = true;
        }
        Ok(Self { targets })
    }

    async fn open_one(
        opener: &dyn SessionOpener,
        config: &TargetConfig,
        alias: &str,
        default_platform: Option<Platform>,
        default_server: Option<&str>,
        overrides: &Value,
        opened: &[TargetHandle],
    ) -> Result<TargetHandle, RegistryError> {
        if opened.iter().any(|t| t.alias == alias) {
            return Err(RegistryError::DuplicateAlias(alias.to_string()));
        }
        let platform = config
            .platform
            .or(default_platform)
            .ok_or_else(|| RegistryError::MissingPlatform {
                alias: alias.to_string(),
            })?;
        let server = config
            .server
            .as_deref()
            .or(default_server)
            .ok_or_else(|| RegistryError::MissingServer {
                alias: alias.to_string(),
            })?
            .to_string();

        info!(alias, platform = platform.as_str(), server = %server, "opening target");
        let session = opener
            .open(platform, &server, overrides)
            .await
            .map_err(|source| RegistryError::Open {
                alias: alias.to_string(),
                source,
            })?;

        Ok(TargetHandle {
            alias: alias.to_string(),
            platform,
            server,
            is_default: config.default,
            session,
        })
    }

    pub fn get(&self, alias: &str) -> Option<&TargetHandle> {
        self.targets.iter().find(|t| t.alias == alias)
    }

    /// The default dispatch destination. Preparation guarantees one exists.
    pub fn default_target(&self) -> &TargetHandle {
        self.targets
            .iter()
            .find(|t| t.is_default)
            .unwrap_or(&self.targets[0])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetHandle> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Pick the target an action should run on.
    ///
    /// Precedence: explicit alias, then first target matching the platform
    /// hint, then the current target, then the default. A requested alias
    /// that matched nothing produces a warning alongside the fallback.
    /// Pure function of the registry and its inputs.
    pub fn resolve(
        &self,
        desired: Option<&str>,
        hint: Option<&str>,
        current: Option<&str>,
    ) -> Resolution {
        if let Some(desired) = desired {
            if self.get(desired).is_some() {
                return Resolution {
                    alias: desired.to_string(),
                    warning: None,
                };
            }
        }

        if let Some(hint) = hint {
            if let Ok(platform) = hint.parse::<Platform>() {
                if let Some(target) = self.targets.iter().find(|t| t.platform == platform) {
                    return Resolution {
                        alias: target.alias.clone(),
                        warning: desired.map(|d| {
                            format!(
                                "unknown target '{d}', using '{}' for platform {}",
                                target.alias,
                                platform.as_str()
                            )
                        }),
                    };
                }
            }
        }

        let fallback = current
            .and_then(|alias| self.get(alias))
            .unwrap_or_else(|| self.default_target());
        let warning = match (desired, hint) {
            (Some(d), _) => Some(format!(
                "unknown target '{d}', using '{}'",
                fallback.alias
            )),
            (None, Some(h)) => Some(format!(
                "no target for platform '{h}', using '{}'",
                fallback.alias
            )),
            (None, None) => None,
        };
        Resolution {
            alias: fallback.alias.clone(),
            warning,
        }
    }

    /// Target metadata handed to the decision service so it can address
    /// actions by alias.
    pub fn describe(&self) -> Vec<Value> {
        self.targets
            .iter()
            .map(|t| {
                json!({
                    "alias": t.alias,
                    "platform": t.platform.as_str(),
                    "default": t.is_default,
                })
            })
            .collect()
    }

    /// Close every session. Errors are logged; closing never fails the run.
    pub async fn close_all(&self) {
        Self::close_handles(&self.targets).await;
    }

    async fn close_handles(targets: &[TargetHandle]) {
        for target in targets {
            if let Err(err) = target.session.quit().await {
                warn!(alias = %target.alias, error = %err, "failed to close target session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wd_adapter::MockSession;

    /// Opener that hands out mock sessions and remembers them.
    struct MockOpener {
        opened: Mutex<Vec<Arc<MockSession>>>,
        fail_on: Option<usize>,
    }

    impl MockOpener {
        fn new() -> Self {
            Self {
                opened: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(index: usize) -> Self {
            Self {
                opened: Mutex::new(Vec::new()),
                fail_on: Some(index),
            }
        }
    }

    #[async_trait]
    impl SessionOpener for MockOpener {
        async fn open(
            &self,
            platform: Platform,
            _server: &str,
            _overrides: &Value,
        ) -> Result<Arc<dyn DriverSession>, AdapterError> {
            let mut opened = self.opened.lock().unwrap();
            if self.fail_on == Some(opened.len()) {
                return Err(AdapterError::driver("session not created", "boom"));
            }
            let session = Arc::new(MockSession::new(platform));
            opened.push(session.clone());
            Ok(session)
        }
    }

    fn config(alias: Option<&str>, platform: Option<Platform>) -> TargetConfig {
        TargetConfig {
            alias: alias.map(str::to_string),
            platform,
            server: Some("device-farm:4723".to_string()),
            default: false,
        }
    }

    #[tokio::test]
    async fn aliases_are_generated_in_order() {
        let opener = MockOpener::new();
        let registry = TargetRegistry::prepare(
            &opener,
            &[
                config(None, Some(Platform::Android)),
                config(Some("tablet"), Some(Platform::Ios)),
                config(None, Some(Platform::Web)),
            ],
            None,
            None,
            &Value::Null,
        )
        .await
        .unwrap();

        let aliases: Vec<_> = registry.iter().map(|t| t.alias.clone()).collect();
        assert_eq!(aliases, ["target1", "tablet", "target3"]);
        assert_eq!(registry.default_target().alias, "target1");
    }

    #[tokio::test]
    async fn duplicate_alias_closes_opened_sessions() {
        let opener = MockOpener::new();
        let err = TargetRegistry::prepare(
            &opener,
            &[
                config(Some("phone"), Some(Platform::Android)),
                config(Some("phone"), Some(Platform::Ios)),
            ],
            None,
            None,
            &Value::Null,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateAlias(a) if a == "phone"));
        let opened = opener.opened.lock().unwrap();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].quit_count(), 1);
    }

    #[tokio::test]
    async fn open_failure_closes_earlier_sessions() {
        let opener = MockOpener::failing_on(1);
        let err = TargetRegistry::prepare(
            &opener,
            &[
                config(Some("a"), Some(Platform::Android)),
                config(Some("b"), Some(Platform::Ios)),
            ],
            None,
            None,
            &Value::Null,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RegistryError::Open { alias, .. } if alias == "b"));
        assert_eq!(opener.opened.lock().unwrap()[0].quit_count(), 1);
    }

    #[tokio::test]
    async fn missing_platform_and_server_are_rejected() {
        let opener = MockOpener::new();
        let err = TargetRegistry::prepare(
            &opener,
            &[config(Some("x"), None)],
            None,
            Some("device-farm:4723"),
            &Value::Null,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RegistryError::MissingPlatform { alias } if alias == "x"));

        let mut no_server = config(Some("y"), Some(Platform::Web));
        no_server.server = None;
        let err = TargetRegistry::prepare(&opener, &[no_server], None, None, &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingServer { alias } if alias == "y"));
    }

    #[tokio::test]
    async fn run_level_defaults_fill_in() {
        let opener = MockOpener::new();
        let registry = TargetRegistry::prepare(
            &opener,
            &[TargetConfig::default()],
            Some(Platform::Android),
            Some("device-farm:4723"),
            &Value::Null,
        )
        .await
        .unwrap();
        assert_eq!(registry.default_target().platform, Platform::Android);
    }

    #[tokio::test]
    async fn resolve_precedence() {
        let opener = MockOpener::new();
        let registry = TargetRegistry::prepare(
            &opener,
            &[
                config(Some("phone"), Some(Platform::Android)),
                config(Some("browser"), Some(Platform::Web)),
            ],
            None,
            None,
            &Value::Null,
        )
        .await
        .unwrap();

        // Explicit alias wins.
        let r = registry.resolve(Some("browser"), Some("android"), None);
        assert_eq!(r.alias, "browser");
        assert!(r.warning.is_none());

        // Unknown alias falls back to a platform match, with a warning.
        let r = registry.resolve(Some("laptop"), Some("web"), None);
        assert_eq!(r.alias, "browser");
        assert!(r.warning.is_some());

        // Platform hint alone.
        let r = registry.resolve(None, Some("web"), None);
        assert_eq!(r.alias, "browser");
        assert!(r.warning.is_none());

        // Nothing requested: the current target, silently.
        let r = registry.resolve(None, None, Some("browser"));
        assert_eq!(r.alias, "browser");
        assert!(r.warning.is_none());

        // Nothing at all: the default.
        let r = registry.resolve(None, None, None);
        assert_eq!(r.alias, "phone");
        assert!(r.warning.is_none());

        // Unmatched hint warns but keeps the current target.
        let r = registry.resolve(None, Some("ios"), Some("browser"));
        assert_eq!(r.alias, "browser");
        assert!(r.warning.is_some());
    }

    #[tokio::test]
    async fn resolve_is_idempotent() {
        let opener = MockOpener::new();
        let registry = TargetRegistry::prepare(
            &opener,
            &[
                config(Some("phone"), Some(Platform::Android)),
                config(Some("browser"), Some(Platform::Web)),
            ],
            None,
            None,
            &Value::Null,
        )
        .await
        .unwrap();

        let first = registry.resolve(Some("laptop"), Some("web"), Some("phone"));
        let second = registry.resolve(Some("laptop"), Some("web"), Some("phone"));
        assert_eq!(first, second);
    }
}
