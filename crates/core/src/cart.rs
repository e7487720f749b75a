use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::domain::ProductId;

/// Per-session product accumulator. Owned exclusively by the active session
/// and mutated only by the workflow; discarded when the session ends.
///
/// Invariant: the map never holds a zero quantity. An upsert with quantity 0
/// removes the entry, so "not in cart" and "quantity 0" are the same thing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cart {
    items: BTreeMap<ProductId, u32>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the quantity for a product. Zero deletes the entry.
    pub fn upsert(&mut self, product_id: ProductId, quantity: u32) {
        if quantity == 0 {
            self.items.remove(&product_id);
        } else {
            self.items.insert(product_id, quantity);
        }
    }

    pub fn quantity(&self, product_id: ProductId) -> u32 {
        self.items.get(&product_id).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> u64 {
        self.items.values().map(|quantity| u64::from(*quantity)).sum()
    }

    pub fn entries(&self) -> impl Iterator<Item = (ProductId, u32)> + '_ {
        self.items.iter().map(|(id, quantity)| (*id, *quantity))
    }
}

/// Discounted line total for display: `unit_price * (1 - discount/100) * qty`.
/// Display-only; persisted orders carry exact integer quantities and prices
/// are always recomputed from the catalog.
pub fn line_total(unit_price: Decimal, discount_pct: Decimal, quantity: u32) -> Decimal {
    let factor = (Decimal::ONE_HUNDRED - discount_pct) / Decimal::ONE_HUNDRED;
    unit_price * factor * Decimal::from(quantity)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{line_total, Cart};
    use crate::domain::ProductId;

    #[test]
    fn upsert_zero_removes_regardless_of_prior_quantity() {
        let mut cart = Cart::new();
        cart.upsert(ProductId(1), 12);
        assert_eq!(cart.quantity(ProductId(1)), 12);

        cart.upsert(ProductId(1), 0);
        assert_eq!(cart.quantity(ProductId(1)), 0);
        assert!(cart.is_empty());
        assert!(!cart.entries().any(|(id, _)| id == ProductId(1)));
    }

    #[test]
    fn upsert_overwrites_existing_quantity() {
        let mut cart = Cart::new();
        cart.upsert(ProductId(3), 5);
        cart.upsert(ProductId(3), 2);
        assert_eq!(cart.quantity(ProductId(3)), 2);
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn totals_sum_across_entries() {
        let mut cart = Cart::new();
        cart.upsert(ProductId(1), 5);
        cart.upsert(ProductId(2), 2);
        assert_eq!(cart.total_quantity(), 7);
    }

    #[test]
    fn clear_empties_the_cart() {
        let mut cart = Cart::new();
        cart.upsert(ProductId(1), 1);
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.total_quantity(), 0);
    }

    #[test]
    fn line_total_applies_flat_discount() {
        // 100 each, 10% off, 3 units -> 270
        let total = line_total(Decimal::new(100, 0), Decimal::new(10, 0), 3);
        assert_eq!(total, Decimal::new(270, 0));
    }

    #[test]
    fn line_total_without_discount_is_price_times_quantity() {
        let total = line_total(Decimal::new(2550, 2), Decimal::ZERO, 4);
        assert_eq!(total, Decimal::new(10200, 2));
    }
}
