//! HTTP client for the questionnaire scoring service.
//!
//! Client failures (4xx) surface at once; server and network failures are
//! retried with linear backoff up to [`ClientConfig::max_attempts`].

pub mod api;
pub mod config;
pub mod error;
pub mod transport;

pub use api::{QuestionnaireService, ScoringClient};
pub use config::{ClientConfig, ConfigError};
pub use error::TransportError;
pub use transport::{Exchange, RawResponse, ReqwestExchange, Transport, classify};
