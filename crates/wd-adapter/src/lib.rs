//! WebDriver/Appium session adapter.
//!
//! Translates the driver-session port used by the rest of the engine into
//! WebDriver wire commands: session opening with server normalisation and
//! the legacy `/wd/hub` retry, browser-pool leasing for web targets, a
//! keep-alive probe, and a scripted mock for tests.

pub mod config;
pub mod error;
pub mod factory;
pub mod mock;
pub mod pool;
pub mod session;
pub mod transport;

pub use config::{merge_capabilities, AdapterConfig, CapabilityProfiles};
pub use error::AdapterError;
pub use factory::{append_wd_hub, normalize_server, SessionFactory};
pub use mock::{MockSession, ScriptedError};
pub use pool::{BrowserPool, HttpBrowserPool, PoolLease, PoolStatus};
pub use session::{DriverSession, WdSession};
pub use transport::{HttpTransport, HttpTransportFactory, TransportFactory, Verb, WdTransport};
