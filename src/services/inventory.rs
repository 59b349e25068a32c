//! Stock availability and reservation

use super::CartItem;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockShortage {
    pub medicine_id: String,
    pub requested: i64,
    pub available: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub reserved: bool,
    pub order_id: String,
    pub reserved_items: usize,
}

#[async_trait]
pub trait InventoryService: Send + Sync {
    async fn available(&self, medicine_id: &str) -> Result<i64>;

    async fn reserve(&self, order_id: &str, items: &[CartItem]) -> Result<Reservation>;

    /// Items whose requested quantity exceeds what is on hand.
    async fn shortages(&self, items: &[CartItem]) -> Result<Vec<StockShortage>> {
        let mut shortages = Vec::new();
        for item in items {
            let available = self.available(item.id()).await?;
            if item.quantity() > available {
                shortages.push(StockShortage {
                    medicine_id: item.id().to_string(),
                    requested: item.quantity(),
                    available,
                });
            }
        }
        Ok(shortages)
    }
}

/// Fixed stock levels: a default for every medicine plus per-id overrides.
#[derive(Debug, Clone)]
pub struct StaticInventory {
    default_available: i64,
    stock: HashMap<String, i64>,
}

impl StaticInventory {
    pub fn new(default_available: i64) -> Self {
        Self {
            default_available,
            stock: HashMap::new(),
        }
    }

    pub fn with_stock(mut self, medicine_id: impl Into<String>, available: i64) -> Self {
        self.stock.insert(medicine_id.into(), available);
        self
    }
}

#[async_trait]
impl InventoryService for StaticInventory {
    async fn available(&self, medicine_id: &str) -> Result<i64> {
        Ok(self
            .stock
            .get(medicine_id)
            .copied()
            .unwrap_or(self.default_available))
    }

    async fn reserve(&self, order_id: &str, items: &[CartItem]) -> Result<Reservation> {
        tracing::debug!(
            "[StaticInventory] Reserved {} items for order {}",
            items.len(),
            order_id
        );
        Ok(Reservation {
            reserved: true,
            order_id: order_id.to_string(),
            reserved_items: items.len(),
        })
    }
}
