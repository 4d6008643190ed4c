//! Upload request metrics.
//!
//! Outcomes are recorded through the `metrics` facade. Without an installed recorder the calls
//! are no-ops; with `enable_metrics` the axum-prometheus recorder picks them up and they are
//! exposed at `/internal/metrics` next to the per-route HTTP metrics.

use metrics::counter;

pub const UPLOAD_REQUESTS_TOTAL: &str = "card_upload_requests_total";

/// How a single request to the upload endpoint ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Success,
    MethodNotAllowed,
    Unauthenticated,
    MissingPayload,
    MalformedPayload,
    PayloadTooLarge,
    UpstreamFailure,
    InternalError,
}

impl UploadOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadOutcome::Success => "success",
            UploadOutcome::MethodNotAllowed => "method_not_allowed",
            UploadOutcome::Unauthenticated => "unauthenticated",
            UploadOutcome::MissingPayload => "missing_payload",
            UploadOutcome::MalformedPayload => "malformed_payload",
            UploadOutcome::PayloadTooLarge => "payload_too_large",
            UploadOutcome::UpstreamFailure => "upstream_failure",
            UploadOutcome::InternalError => "internal_error",
        }
    }
}

pub fn record_upload(outcome: UploadOutcome) {
    counter!(UPLOAD_REQUESTS_TOTAL, "outcome" => outcome.as_str()).increment(1);
}
