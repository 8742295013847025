//! Price resolution against the catalog.

use catalog::CatalogStore;
use common::{DEFAULT_CURRENCY, Money, PriceListId, VariantId};
use serde::Serialize;

use crate::error::Result;

/// A unit price found for a variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPrice {
    pub amount: Money,
    pub currency: String,
}

/// Looks up the unit price of a variant, optionally within one price list.
///
/// A missing price is reported as `None`; it is never replaced by a zero or
/// default amount.
pub struct PriceResolver<S: CatalogStore> {
    store: S,
}

impl<S: CatalogStore> PriceResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn resolve_price(
        &self,
        variant_id: VariantId,
        price_list_id: Option<PriceListId>,
    ) -> Result<Option<ResolvedPrice>> {
        let price = self.store.find_price(variant_id, price_list_id).await?;

        Ok(price.map(|p| ResolvedPrice {
            amount: p.amount,
            currency: if p.currency.is_empty() {
                DEFAULT_CURRENCY.to_string()
            } else {
                p.currency
            },
        }))
    }
}
