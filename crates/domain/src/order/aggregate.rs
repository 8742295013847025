//! Order assembly: validation, pricing and totals.

use catalog::{CatalogStore, NewOrder, NewOrderItem};
use chrono::{Datelike, Utc};
use common::{DEFAULT_CURRENCY, Money, OrderId, VariantId};

use crate::error::Result;
use crate::pricing::PriceResolver;

use super::{CreateOrder, OrderError, OrderNumber};

/// A requested item with its captured unit price and line total.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub variant_id: VariantId,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub notes: Option<String>,
}

impl PricedLine {
    /// Prices a line. The total is `unit_price × quantity` rounded to minor
    /// units, midpoints away from zero.
    pub fn new(variant_id: VariantId, quantity: u32, unit_price: Money, notes: Option<String>) -> Self {
        Self {
            variant_id,
            quantity,
            unit_price,
            line_total: unit_price.times(quantity),
            notes,
        }
    }
}

impl From<PricedLine> for NewOrderItem {
    fn from(line: PricedLine) -> Self {
        NewOrderItem {
            variant_id: line.variant_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total,
            notes: line.notes,
        }
    }
}

/// Exact sum of the line totals. No further rounding is applied.
pub fn order_total(lines: &[PricedLine]) -> Money {
    lines.iter().map(|line| line.line_total).sum()
}

/// Turns a [`CreateOrder`] command into an immutable order-creation record.
///
/// Any failure aborts the whole assembly; nothing is written and no
/// partial order can result.
pub struct OrderAggregator<S: CatalogStore> {
    store: S,
    resolver: PriceResolver<S>,
}

impl<S: CatalogStore + Clone> OrderAggregator<S> {
    pub fn new(store: S) -> Self {
        Self {
            resolver: PriceResolver::new(store.clone()),
            store,
        }
    }

    #[tracing::instrument(skip(self, cmd), fields(factory_id = %cmd.factory_id, items = cmd.items.len()))]
    pub async fn assemble(&self, cmd: &CreateOrder) -> Result<NewOrder> {
        cmd.validate()?;

        if self.store.get_factory(cmd.factory_id).await?.is_none() {
            return Err(OrderError::factory_not_found(cmd.factory_id).into());
        }
        if self
            .store
            .get_organization(cmd.organization_id)
            .await?
            .is_none()
        {
            return Err(OrderError::ReferenceNotFound {
                entity: "Organization",
                id: cmd.organization_id.to_string(),
            }
            .into());
        }
        let price_list = match cmd.price_list_id {
            Some(id) => Some(self.store.get_price_list(id).await?.ok_or_else(|| {
                OrderError::ReferenceNotFound {
                    entity: "PriceList",
                    id: id.to_string(),
                }
            })?),
            None => None,
        };

        let mut currency: Option<String> = None;
        let mut lines = Vec::with_capacity(cmd.items.len());
        for item in &cmd.items {
            if self.store.get_variant(item.variant_id).await?.is_none() {
                return Err(OrderError::ReferenceNotFound {
                    entity: "Variant",
                    id: item.variant_id.to_string(),
                }
                .into());
            }

            let price = self
                .resolver
                .resolve_price(item.variant_id, cmd.price_list_id)
                .await?
                .ok_or(OrderError::PriceUnavailable {
                    variant_id: item.variant_id,
                })?;

            match &currency {
                Some(expected) if *expected != price.currency => {
                    return Err(OrderError::CurrencyMismatch {
                        variant_id: item.variant_id,
                        expected: expected.clone(),
                        found: price.currency,
                    }
                    .into());
                }
                Some(_) => {}
                None => currency = Some(price.currency.clone()),
            }

            lines.push(PricedLine::new(
                item.variant_id,
                item.quantity,
                price.amount,
                item.notes.clone(),
            ));
        }

        let currency = currency
            .or_else(|| price_list.map(|list| list.currency))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let total_amount = order_total(&lines);

        let created_at = Utc::now();
        let sequence = self.store.next_order_sequence().await?;
        let order_number = OrderNumber::new(created_at.year(), sequence);

        Ok(NewOrder {
            id: OrderId::new(),
            order_number: order_number.to_string(),
            organization_id: cmd.organization_id,
            user_id: cmd.actor_id,
            factory_id: cmd.factory_id,
            price_list_id: cmd.price_list_id,
            currency,
            total_amount,
            notes: cmd.notes.clone(),
            created_at,
            items: lines.into_iter().map(NewOrderItem::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn money(s: &str) -> Money {
        Money::new(s.parse::<Decimal>().unwrap())
    }

    #[test]
    fn line_total_multiplies_and_rounds() {
        let line = PricedLine::new(VariantId::new(), 3, money("450.00"), None);
        assert_eq!(line.line_total, money("1350.00"));

        let odd = PricedLine::new(VariantId::new(), 3, money("0.335"), None);
        assert_eq!(odd.line_total, money("1.01"));
    }

    #[test]
    fn midpoint_rounds_away_from_zero() {
        // 0.125 × 1 sits exactly on the midpoint.
        let line = PricedLine::new(VariantId::new(), 1, money("0.125"), None);
        assert_eq!(line.line_total, money("0.13"));
    }

    #[test]
    fn total_is_exact_sum_of_line_totals() {
        let lines = vec![
            PricedLine::new(VariantId::new(), 3, money("450.00"), None),
            PricedLine::new(VariantId::new(), 3, money("450.00"), None),
        ];
        assert_eq!(order_total(&lines), money("2700.00"));
        assert_eq!(order_total(&lines).to_string(), "2700.00");
    }

    #[test]
    fn many_small_lines_do_not_drift() {
        let lines: Vec<PricedLine> = (0..1000)
            .map(|_| PricedLine::new(VariantId::new(), 1, money("0.10"), None))
            .collect();
        assert_eq!(order_total(&lines), money("100.00"));
    }

    #[test]
    fn empty_order_totals_zero() {
        assert!(order_total(&[]).is_zero());
    }
}
