use thiserror::Error;
use wd_adapter::AdapterError;

/// Failures while capturing or condensing perception inputs.
///
/// Capture is never fatal to a run: callers degrade to an empty source or
/// skip the derived artifact and keep going.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// The markup could not be parsed even leniently.
    #[error("markup parse error: {0}")]
    Markup(String),

    /// The outline could not be serialised.
    #[error("outline serialisation failed: {0}")]
    Serialise(#[from] serde_yaml::Error),

    /// A vision service call failed.
    #[error("vision description failed: {0}")]
    Vision(String),
}
