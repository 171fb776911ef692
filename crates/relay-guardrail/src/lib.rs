//! PII and credential detection, deterministic anonymisation, and
//! streaming-safe deanonymisation for relay (spec component B).

pub mod body;
pub mod detector;
pub mod detectors;
pub mod regex_detector;
pub mod registry;
pub mod reverse_map;
pub mod stream;

pub use body::{anonymise_request, deanonymise_buffer};
pub use detector::{Category, Detector, DetectorMeta, Phase};
pub use registry::{DetectorRegistry, GuardrailConfig};
pub use reverse_map::ReverseMap;
pub use stream::StreamDeanonymizer;
