//! Catalog entities: categories and stationery items
//!
//! `current_stock` is the physical on-hand count. What callers usually want
//! is *available* stock: physical minus the quantity reserved by outstanding
//! (pending or approved) requests. Reservation is computed on read by the
//! service, never persisted as a second counter that could drift.

use crate::money::Money;
use crate::timestamp::TimeStamp;
use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Category {
    #[n(0)]
    pub category_id: String,
    #[n(1)]
    pub category_name: String,
    #[n(2)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StationeryItem {
    #[n(0)]
    pub item_id: String,
    #[n(1)]
    pub item_name: String,
    #[n(2)]
    pub description: Option<String>,
    #[n(3)]
    pub category_id: Option<String>,
    #[n(4)]
    pub unit_cost: Money,
    #[n(5)]
    pub current_stock: u32,
    // opaque reference to an externally stored image; never interpreted here
    #[n(6)]
    pub image_ref: Option<String>,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
    #[n(8)]
    pub modified_at: Option<TimeStamp<Utc>>,
}

impl StationeryItem {
    pub fn new(item_id: String, item_name: &str, unit_cost: Money, current_stock: u32) -> Self {
        Self {
            item_id,
            item_name: item_name.to_string(),
            description: None,
            category_id: None,
            unit_cost,
            current_stock,
            image_ref: None,
            created_at: TimeStamp::new(),
            modified_at: None,
        }
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_category(mut self, category_id: &str) -> Self {
        self.category_id = Some(category_id.to_string());
        self
    }
    pub fn set_image_ref(mut self, image_ref: &str) -> Self {
        self.image_ref = Some(image_ref.to_string());
        self
    }
}

/// One row of the availability listing exposed to catalog browsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAvailability {
    pub item: StationeryItem,
    /// Clamped to zero for presentation. Administrative stock corrections can
    /// push the raw arithmetic below zero; callers never see that.
    pub available_stock: u64,
}

/// Reporting clamp: raw availability may go transiently negative after an
/// administrative stock correction, but is never shown negative.
pub fn clamp_available(raw: i64) -> u64 {
    raw.max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_cbor_roundtrip() {
        let item = StationeryItem::new(
            "item_test".to_string(),
            "Stapler",
            Money::new(12_50, 2),
            40,
        )
        .set_description("Heavy duty")
        .set_category("cat_office")
        .set_image_ref("img/stapler.png");

        let encoded = minicbor::to_vec(&item).unwrap();
        let decoded: StationeryItem = minicbor::decode(&encoded).unwrap();

        assert_eq!(item, decoded);
    }

    #[test]
    fn availability_is_clamped() {
        assert_eq!(clamp_available(-3), 0);
        assert_eq!(clamp_available(0), 0);
        assert_eq!(clamp_available(7), 7);
    }
}
