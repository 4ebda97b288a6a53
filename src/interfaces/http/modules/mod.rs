pub mod estimate;
pub mod health;
pub mod metrics;
pub mod payment_methods;
pub mod request_id;
pub mod sessions;
pub mod transactions;
pub mod webhooks;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::shared::validations::validate_pagination;

/// Page/limit query for list endpoints
#[derive(Debug, Default, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct PaginationParams {
    /// Page number, starting at 1
    pub page: Option<u64>,
    /// Items per page (1-100, default 20)
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    /// Slice one page out of a full, already ordered list.
    pub fn paginate(all: Vec<T>, params: &PaginationParams) -> Self {
        let (page, limit) = validate_pagination(params.page, params.limit);
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(((page - 1) * limit) as usize)
            .take(limit as usize)
            .collect();
        Self {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginates_ordered_lists() {
        let params = PaginationParams {
            page: Some(2),
            limit: Some(2),
        };
        let page = PaginatedResponse::paginate(vec![1, 2, 3, 4, 5], &params);
        assert_eq!(page.items, vec![3, 4]);
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
    }
}
