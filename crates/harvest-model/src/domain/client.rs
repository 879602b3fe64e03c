use serde::{Deserialize, Serialize};

/// Agent identity sent once at startup via `PUT /api/v1/clients/update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Local address the agent uses to reach the control plane.
    pub address: String,
    /// Host name; empty when it cannot be determined.
    pub hostname: String,
    /// Agent version.
    pub version: String,
}
