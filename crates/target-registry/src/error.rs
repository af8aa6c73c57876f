use thiserror::Error;
use wd_adapter::AdapterError;

/// Failures while preparing or using the target registry.
///
/// Any of these during preparation aborts the run before the first step;
/// sessions opened up to that point are closed first.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two target configs resolved to the same alias.
    #[error("duplicate target alias '{0}'")]
    DuplicateAlias(String),

    /// A target config named no platform and none could be inferred.
    #[error("target '{alias}' has no platform")]
    MissingPlatform { alias: String },

    /// A target config named no automation server.
    #[error("target '{alias}' has no automation server")]
    MissingServer { alias: String },

    /// The platform string was not one of android/ios/web.
    #[error(transparent)]
    UnknownPlatform(#[from] uiscout_core_types::UnknownPlatform),

    /// Opening the session failed.
    #[error("failed to open target '{alias}': {source}")]
    Open {
        alias: String,
        #[source]
        source: AdapterError,
    },

    /// No targets were configured at all.
    #[error("no automation targets configured")]
    Empty,
}
