use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a `POST /api/realtime-control` request. `speed` is passed through
/// untouched, so clients may send a number, a string, or nothing.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequest {
    pub action: String,
    pub speed: Option<Value>,
}

/// Acknowledgment echoed back for a control request. The replay cadence is
/// fixed at startup; this endpoint only confirms receipt.
#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    pub status: String,
    pub action: String,
    pub speed: Option<Value>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
