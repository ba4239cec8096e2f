//! Pure price computation. No I/O: callers pass a catalog snapshot and get
//! back a frozen quote to persist as order items.
//!
//! All arithmetic is in integer minor currency units. Percentage math runs
//! through `Decimal` and is rounded half-even exactly once per line, and once
//! more at the order level when a promo discount applies, so fractional cents
//! never compound.

use crate::{
    entities::order::PaymentMethod,
    errors::ServiceError,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// One cart line joined to its catalog snapshot.
#[derive(Debug, Clone)]
pub struct PricingItem {
    pub product_id: Uuid,
    pub unit_price_cents: i64,
    pub sale_percent: i32,
    pub warranty_days: i32,
    pub quantity: i32,
}

/// Flat surcharges applied after the promo discount.
#[derive(Debug, Clone, Copy)]
pub struct Surcharges {
    pub delivery_fee_cents: i64,
    pub cod_fee_cents: i64,
}

/// A priced line, frozen for persistence as an order item.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub unit_price_cents: i64,
    pub sale_percent: i32,
    pub warranty_days: i32,
    pub quantity: i32,
    pub subtotal_cents: i64,
}

/// Result of pricing a cart.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PriceQuote {
    pub lines: Vec<PricedLine>,
    /// Sum of line subtotals before promo and surcharges
    pub subtotal_cents: i64,
    /// Order-level promo discount actually subtracted
    pub discount_cents: i64,
    pub delivery_fee_cents: i64,
    pub cod_fee_cents: i64,
    pub total_cents: i64,
}

fn percent_factor(percent: i32) -> Decimal {
    (Decimal::ONE_HUNDRED - Decimal::from(percent)) / Decimal::ONE_HUNDRED
}

fn round_half_even(amount: Decimal) -> Result<i64, ServiceError> {
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_i64()
        .ok_or_else(|| ServiceError::InvalidInput("monetary amount out of range".into()))
}

/// Subtotal of a single line: unit price x quantity x (1 - sale%), rounded
/// half-even once.
pub fn line_subtotal_cents(
    unit_price_cents: i64,
    sale_percent: i32,
    quantity: i32,
) -> Result<i64, ServiceError> {
    if !(0..=100).contains(&sale_percent) {
        return Err(ServiceError::InvalidInput(format!(
            "sale percent {} out of range",
            sale_percent
        )));
    }
    if quantity <= 0 {
        return Err(ServiceError::InvalidInput("quantity must be positive".into()));
    }

    let gross = Decimal::from(unit_price_cents) * Decimal::from(quantity);
    round_half_even(gross * percent_factor(sale_percent))
}

/// Computes the full quote for a validated cart. Deterministic: identical
/// input always yields an identical quote.
pub fn quote(
    items: &[PricingItem],
    promo_discount_percent: Option<i32>,
    delivery_needed: bool,
    payment_method: PaymentMethod,
    surcharges: Surcharges,
) -> Result<PriceQuote, ServiceError> {
    if let Some(p) = promo_discount_percent {
        if !(0..=100).contains(&p) {
            return Err(ServiceError::InvalidInput(format!(
                "promo discount {} out of range",
                p
            )));
        }
    }

    let mut lines = Vec::with_capacity(items.len());
    let mut subtotal_cents: i64 = 0;

    for item in items {
        let line_cents =
            line_subtotal_cents(item.unit_price_cents, item.sale_percent, item.quantity)?;
        subtotal_cents = subtotal_cents
            .checked_add(line_cents)
            .ok_or_else(|| ServiceError::InvalidInput("order subtotal overflow".into()))?;
        lines.push(PricedLine {
            product_id: item.product_id,
            unit_price_cents: item.unit_price_cents,
            sale_percent: item.sale_percent,
            warranty_days: item.warranty_days,
            quantity: item.quantity,
            subtotal_cents: line_cents,
        });
    }

    // Promo applies once at the order level, not per line.
    let after_promo = match promo_discount_percent {
        Some(p) => round_half_even(Decimal::from(subtotal_cents) * percent_factor(p))?,
        None => subtotal_cents,
    };
    let discount_cents = subtotal_cents - after_promo;

    let delivery_fee_cents = if delivery_needed {
        surcharges.delivery_fee_cents
    } else {
        0
    };
    let cod_fee_cents = if payment_method == PaymentMethod::Cod {
        surcharges.cod_fee_cents
    } else {
        0
    };

    let total_cents = after_promo
        .checked_add(delivery_fee_cents)
        .and_then(|t| t.checked_add(cod_fee_cents))
        .ok_or_else(|| ServiceError::InvalidInput("order total overflow".into()))?;

    Ok(PriceQuote {
        lines,
        subtotal_cents,
        discount_cents,
        delivery_fee_cents,
        cod_fee_cents,
        total_cents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEES: Surcharges = Surcharges {
        delivery_fee_cents: 5000,
        cod_fee_cents: 1000,
    };

    fn item(price: i64, sale: i32, qty: i32) -> PricingItem {
        PricingItem {
            product_id: Uuid::new_v4(),
            unit_price_cents: price,
            sale_percent: sale,
            warranty_days: 365,
            quantity: qty,
        }
    }

    #[test]
    fn cod_order_with_delivery() {
        // 10000 x 2 = 20000, + delivery 5000 + COD 1000
        let q = quote(&[item(10000, 0, 2)], None, true, PaymentMethod::Cod, FEES).unwrap();
        assert_eq!(q.subtotal_cents, 20000);
        assert_eq!(q.discount_cents, 0);
        assert_eq!(q.delivery_fee_cents, 5000);
        assert_eq!(q.cod_fee_cents, 1000);
        assert_eq!(q.total_cents, 26000);
    }

    #[test]
    fn credit_card_with_promo() {
        // 20000 -> promo 10% -> 18000 -> + delivery 5000 = 23000, no COD fee
        let q = quote(
            &[item(10000, 0, 2)],
            Some(10),
            true,
            PaymentMethod::CreditCard,
            FEES,
        )
        .unwrap();
        assert_eq!(q.subtotal_cents, 20000);
        assert_eq!(q.discount_cents, 2000);
        assert_eq!(q.cod_fee_cents, 0);
        assert_eq!(q.total_cents, 23000);
    }

    #[test]
    fn sale_percent_applied_per_line() {
        // 10000 x 1 at 25% off = 7500
        let q = quote(&[item(10000, 25, 1)], None, false, PaymentMethod::CreditCard, FEES).unwrap();
        assert_eq!(q.total_cents, 7500);
    }

    #[test]
    fn half_even_rounding_on_line() {
        // 25 x 1 at 50% = 12.5 -> rounds to 12 (even)
        assert_eq!(line_subtotal_cents(25, 50, 1).unwrap(), 12);
        // 75 x 1 at 50% = 37.5 -> rounds to 38 (even)
        assert_eq!(line_subtotal_cents(75, 50, 1).unwrap(), 38);
        // Non-tie fractions round to nearest
        assert_eq!(line_subtotal_cents(1001, 5, 1).unwrap(), 951);
    }

    #[test]
    fn promo_rounds_once_at_order_level() {
        // Two lines of 125: subtotal 250; 25% promo -> 187.5 -> 188 (even).
        // Per-line rounding (93.75 -> 94, twice) would give 188 as well here,
        // so also check a case where the results diverge:
        // lines 33 and 33, promo 50%: order-level 66*0.5 = 33;
        // per-line would be 16.5 -> 16, twice = 32.
        let q = quote(
            &[item(33, 0, 1), item(33, 0, 1)],
            Some(50),
            false,
            PaymentMethod::CreditCard,
            FEES,
        )
        .unwrap();
        assert_eq!(q.total_cents, 33);
    }

    #[test]
    fn deterministic_on_identical_input() {
        let items = vec![item(9999, 15, 3), item(123, 33, 7)];
        let a = quote(&items, Some(7), true, PaymentMethod::Cod, FEES).unwrap();
        let b = quote(&items, Some(7), true, PaymentMethod::Cod, FEES).unwrap();
        assert_eq!(a.total_cents, b.total_cents);
        assert_eq!(a.subtotal_cents, b.subtotal_cents);
        assert_eq!(a.discount_cents, b.discount_cents);
    }

    #[test]
    fn rejects_out_of_range_inputs() {
        assert!(line_subtotal_cents(100, -1, 1).is_err());
        assert!(line_subtotal_cents(100, 101, 1).is_err());
        assert!(line_subtotal_cents(100, 0, 0).is_err());
        assert!(quote(&[item(100, 0, 1)], Some(101), false, PaymentMethod::Cod, FEES).is_err());
    }

    #[test]
    fn empty_cart_prices_to_fees_only() {
        let q = quote(&[], None, true, PaymentMethod::Cod, FEES).unwrap();
        assert_eq!(q.subtotal_cents, 0);
        assert_eq!(q.total_cents, 6000);
    }
}
