use serde::{Deserialize, Serialize};

use super::ids::AccountId;
use super::rights::Rights;

/// A direct membership as exposed through the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    pub account: AccountId,
    /// Empty in the public projection handed to callers that may not see
    /// collaborator settings.
    #[serde(default, skip_serializing_if = "Rights::is_empty")]
    pub rights: Rights,
}

impl Collaborator {
    pub fn new(account: AccountId, rights: Rights) -> Self {
        Self { account, rights }
    }

    pub fn public(&self) -> Self {
        Self {
            account: self.account.clone(),
            rights: Rights::new(),
        }
    }
}
