use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AreaId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShopId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub i64);

/// Top-level geographic grouping of shops. Immutable reference data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub id: AreaId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    pub id: ShopId,
    pub name: String,
    pub address: Option<String>,
    pub area_id: AreaId,
}

impl Shop {
    /// Display label for selection buttons: shop name plus a truncated
    /// address when one is on file.
    pub fn button_label(&self) -> String {
        match self.address.as_deref() {
            Some(address) if address.chars().count() > 30 => {
                let prefix: String = address.chars().take(30).collect();
                format!("{} ({prefix}...)", self.name)
            }
            Some(address) if !address.is_empty() => format!("{} ({address})", self.name),
            _ => self.name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Unit price before discount.
    pub unit_price: Decimal,
    /// Flat percentage discount in [0, 100], applied per line at display time.
    pub discount_pct: Decimal,
    /// Opaque grouping used only for display ordering.
    pub brand: String,
}
