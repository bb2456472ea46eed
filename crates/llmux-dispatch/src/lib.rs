//! Streaming retry state machine (C10) and HTTP request dispatcher (C11).
//!
//! [`classify`] is the pure `handleUpstreamError` decision function;
//! [`retry_driver`] is the async loop that acts on its decisions attempt by
//! attempt; [`dispatcher`] holds the stateless request-shape inspection the
//! HTTP entry point needs before it can even start a retry loop.

#![deny(unsafe_code)]

pub mod classify;
pub mod dispatcher;
pub mod retry_driver;
pub mod retry_state;

pub use classify::{ErrorContext, RetryAction, classify_upstream_error};
pub use dispatcher::{detect_dialect, extract_model, extract_model_from_path, wants_streaming};
pub use retry_driver::{
    DispatchOutcome, DriverContext, TransportError, UpstreamBody, UpstreamClient, UpstreamRequest,
    UpstreamResponse, dispatch_with_retry, provider_dialect,
};
pub use retry_state::RetryState;
