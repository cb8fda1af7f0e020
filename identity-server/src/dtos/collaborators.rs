use serde::Deserialize;

use crate::models::{Collaborator, EntityKind};

#[derive(Debug, Clone, Deserialize)]
pub struct SetCollaboratorRequest {
    pub collaborator: Collaborator,
}

/// Query of `GET …/memberships`.
#[derive(Debug, Clone, Deserialize)]
pub struct MembershipsQuery {
    pub kind: EntityKind,

    #[serde(default)]
    pub include_indirect: bool,
}
