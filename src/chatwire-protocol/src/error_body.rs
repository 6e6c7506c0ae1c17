//! Body of a non-success response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Detail used when the body is JSON but carries no usable `detail`.
pub const MISSING_DETAIL: &str = "Failed to get response";

/// Detail used when the body is not JSON at all.
pub const UNPARSEABLE_DETAIL: &str = "Failed to parse error JSON.";

/// `{ "detail": string }`, as sent by the agent endpoint on rejection.
///
/// `detail` is kept loosely typed: validation failures from some servers put
/// a list of objects there instead of a string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Value,
}

impl ErrorBody {
    /// Non-empty string detail, if present.
    pub fn detail_text(&self) -> Option<&str> {
        self.detail.as_str().filter(|d| !d.is_empty())
    }

    /// Resolve the human-readable detail for a raw response body.
    pub fn detail_from_body(body: &str) -> String {
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return UNPARSEABLE_DETAIL.to_string();
        };
        let parsed = ErrorBody {
            detail: value.get("detail").cloned().unwrap_or_default(),
        };
        parsed.detail_text().unwrap_or(MISSING_DETAIL).to_string()
    }
}
