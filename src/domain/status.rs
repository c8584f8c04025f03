use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Authorization state of a document in the FEL workflow.
///
/// Deserialization goes through [`map_status`], so any string the remote side
/// sends lands in this closed set. A `null` status decodes as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FelStatus {
    #[default]
    Pending,
    Processing,
    Authorized,
    Rejected,
    Error,
    Timeout,
}

impl FelStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FelStatus::Pending | FelStatus::Processing)
    }

    /// Terminal statuses that end the workflow without a UUID.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            FelStatus::Rejected | FelStatus::Error | FelStatus::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FelStatus::Pending => "pending",
            FelStatus::Processing => "processing",
            FelStatus::Authorized => "authorized",
            FelStatus::Rejected => "rejected",
            FelStatus::Error => "error",
            FelStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FelStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(map_status(raw.as_deref().unwrap_or("")))
    }
}

impl From<String> for FelStatus {
    fn from(raw: String) -> Self {
        map_status(&raw)
    }
}

impl From<&str> for FelStatus {
    fn from(raw: &str) -> Self {
        map_status(raw)
    }
}

/// Maps a raw status string from the API onto [`FelStatus`].
///
/// Unknown values map to `Pending`.
pub fn map_status(raw: &str) -> FelStatus {
    match raw {
        "pending" | "fel_pending" | "draft" | "PENDING" => FelStatus::Pending,
        "processing" | "fel_processing" | "in_process" | "PROCESSING" => FelStatus::Processing,
        "authorized" | "fel_authorized" | "certified" | "issued" | "ISSUED" | "AUTHORIZED" => {
            FelStatus::Authorized
        }
        "rejected" | "REJECTED" => FelStatus::Rejected,
        // The certifier reports a rejected submission as a processing error.
        "fel_rejected" | "error" | "fel_error" | "failed" | "ERROR" => FelStatus::Error,
        "timeout" | "fel_timeout" | "TIMEOUT" => FelStatus::Timeout,
        _ => FelStatus::Pending,
    }
}
