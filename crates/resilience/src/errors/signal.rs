use serde::{Deserialize, Serialize};

/// What a caller of the proxy should be told when a request fails.
///
/// Used by request handlers to choose the response surfaced to clients.
///
/// # Behavior Summary
///
/// | Signal | Upstream was called? | Typical HTTP mapping |
/// |--------|----------------------|----------------------|
/// | `Unavailable` | No (breaker rejected) | 503 with retry hint |
/// | `UpstreamFailure` | Yes, and it failed | 502 |
/// | `Misconfigured` | No | 500 |
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserSignal {
    /// The circuit is open and the upstream is being protected while it
    /// recovers. Distinct from an upstream failure so operators can tell
    /// "upstream is down" apart from "we are holding off".
    #[serde(rename = "TEMPORARILY_UNAVAILABLE")]
    Unavailable,

    /// The upstream was called (possibly several times) and the last attempt
    /// failed.
    UpstreamFailure,

    /// The proxy itself is misconfigured.
    Misconfigured,
}

impl UserSignal {
    /// Returns the string representation of this signal.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserSignal::Unavailable => "TEMPORARILY_UNAVAILABLE",
            UserSignal::UpstreamFailure => "UPSTREAM_FAILURE",
            UserSignal::Misconfigured => "MISCONFIGURED",
        }
    }
}

impl std::fmt::Display for UserSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
