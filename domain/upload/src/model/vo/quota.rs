use serde::{Deserialize, Serialize};

/// Answer of the quota collaborator to a reservation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "decision")]
pub enum QuotaDecision {
    Approved,
    Denied { reason: String },
}
