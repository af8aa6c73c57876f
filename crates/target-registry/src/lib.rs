//! Named automation targets for a run.
//!
//! A run may drive several devices and browsers at once. This crate opens
//! one session per configured target, assigns each a stable alias, and
//! resolves which target an action should execute on.

mod error;
mod registry;

pub use error::RegistryError;
pub use registry::{
    PooledOpener, Resolution, SessionOpener, TargetHandle, TargetRegistry,
};
