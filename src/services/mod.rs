//! Domain collaborators the agents delegate to
//!
//! Information Hiding:
//! - Catalog, pricing, inventory and document reading sit behind traits
//! - Sample implementations carry fixed reference data and hold no request state

pub mod catalog;
pub mod documents;
pub mod inventory;
pub mod pricing;

pub use catalog::{InteractionReport, Medicine, MedicineCatalog, SampleCatalog, SearchHit, SearchQuery};
pub use documents::{DocumentReader, ExtractedText, SampleDocumentReader};
pub use inventory::{InventoryService, Reservation, StaticInventory, StockShortage};
pub use pricing::{Coupon, OrderTotals, PricingPolicy, StandardPricing};

use serde::{Deserialize, Serialize};

/// One line of a shopping cart as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(default)]
    pub medicine_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default)]
    pub prescription_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription_id: Option<String>,
}

impl CartItem {
    pub fn new(medicine_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            medicine_id: Some(medicine_id.into()),
            name: None,
            quantity: Some(quantity),
            price: None,
            prescription_required: false,
            prescription_id: None,
        }
    }

    pub fn id(&self) -> &str {
        self.medicine_id.as_deref().unwrap_or_default()
    }

    /// Name for messages: explicit name, then id, then a placeholder.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.medicine_id.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or("item")
    }

    pub fn quantity(&self) -> i64 {
        self.quantity.unwrap_or(0)
    }
}

pub(crate) fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
