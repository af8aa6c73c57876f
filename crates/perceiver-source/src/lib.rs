//! Perception layer: what the decision service gets to see.
//!
//! Captures page source with retries, condenses the raw XML/HTML markup
//! into an attribute-filtered YAML outline, and prepares screenshots for
//! vision-capable services.

mod detect;
mod error;
mod outline;
mod screenshot;
mod source;
mod vision;
mod web;

pub use detect::detect_platform;
pub use error::CaptureError;
pub use outline::{html_outline, markup_outline, xml_outline};
pub use screenshot::jpeg_derivative;
pub use source::{safe_page_source, CaptureConfig};
pub use vision::VisionDescriber;
pub use web::{switch_to_newest_window, wait_for_ready};
