use common::{OrderStatus, OrganizationId, UserId};

use crate::Order;

/// Default page size for order listings.
pub const DEFAULT_TAKE: u32 = 50;

/// Filter and paging options for listing orders.
///
/// Results are always ordered newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderQuery {
    /// Number of orders to skip.
    pub skip: u32,

    /// Maximum number of orders to return.
    pub take: u32,

    /// Only orders in this status.
    pub status: Option<OrderStatus>,

    /// Only orders created by this user.
    pub user_id: Option<UserId>,

    /// Only orders placed for this organization.
    pub organization_id: Option<OrganizationId>,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            take: DEFAULT_TAKE,
            status: None,
            user_id: None,
            organization_id: None,
        }
    }
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = skip;
        self
    }

    pub fn take(mut self, take: u32) -> Self {
        self.take = take;
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_by(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    /// Returns true if the order passes every filter. Paging is not applied.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(user_id) = self.user_id
            && order.user_id != user_id
        {
            return false;
        }
        if let Some(organization_id) = self.organization_id
            && order.organization_id != organization_id
        {
            return false;
        }
        true
    }
}

/// One page of orders plus the unpaged match count.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
}
