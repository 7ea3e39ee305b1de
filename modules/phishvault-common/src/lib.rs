pub mod config;
pub mod error;
pub mod fingerprint;
pub mod types;

pub use config::{Config, GraphBackend};
pub use error::PhishVaultError;
pub use fingerprint::{hamming, parse_fingerprint, similarity, FingerprintError, FINGERPRINT_BITS};
pub use types::*;
