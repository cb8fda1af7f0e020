pub mod api_keys;
pub mod collaborators;
pub mod entities;

use serde::Deserialize;
use validator::Validate;

pub use api_keys::{ApiKeyFields, CreateApiKeyRequest, FieldMask, UpdateApiKeyRequest};
pub use collaborators::{MembershipsQuery, SetCollaboratorRequest};
pub use entities::{RegisterEntityRequest, RightsResponse};

/// Header carrying the unpaginated total of a listing.
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// `limit` and `page` query parameters. A missing or zero limit returns
/// everything; pages start at 1.
#[derive(Debug, Clone, Copy, Default, Deserialize, Validate)]
pub struct Pagination {
    #[validate(range(max = 1000, message = "Limit must be at most 1000"))]
    pub limit: Option<u32>,

    #[validate(range(min = 1, message = "Page must be at least 1"))]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl Pagination {
    pub fn new(limit: u32, page: u32) -> Self {
        Self {
            limit: Some(limit),
            page: Some(page),
        }
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let items = match self.limit.filter(|limit| *limit > 0) {
            None => items,
            Some(limit) => {
                let limit = limit as usize;
                let page = self.page.unwrap_or(1).max(1) as usize;
                items
                    .into_iter()
                    .skip((page - 1).saturating_mul(limit))
                    .take(limit)
                    .collect()
            }
        };
        Page { items, total }
    }
}
