use serde::{Deserialize, Serialize};

use crate::models::{AccountId, EntityId, Rights};

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterEntityRequest {
    pub entity: EntityId,
    pub owner: AccountId,
}

#[derive(Debug, Clone, Serialize)]
pub struct RightsResponse {
    pub entity: EntityId,
    pub rights: Rights,
}
