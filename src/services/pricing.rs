//! Order pricing: tax, shipping and coupon discounts

use super::round_cents;
use crate::config::OrdersConfig;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coupon {
    /// Fraction of the subtotal, e.g. `0.10`
    Percentage(f64),
    Fixed(f64),
}

impl Coupon {
    pub fn kind(&self) -> &'static str {
        match self {
            Coupon::Percentage(_) => "percentage",
            Coupon::Fixed(_) => "fixed",
        }
    }

    /// Never more than the subtotal.
    pub fn discount(&self, subtotal: f64) -> f64 {
        let amount = match self {
            Coupon::Percentage(rate) => round_cents(subtotal * rate),
            Coupon::Fixed(amount) => *amount,
        };
        amount.min(subtotal).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderTotals {
    pub subtotal: f64,
    pub tax: f64,
    pub tax_rate: f64,
    pub shipping: f64,
    pub discount: f64,
    pub coupon_code: Option<String>,
    pub total: f64,
    pub currency: String,
}

pub trait PricingPolicy: Send + Sync {
    fn coupon(&self, code: &str) -> Option<Coupon>;

    /// Totals for a pre-computed subtotal. Unknown coupons give no discount.
    fn totals(&self, subtotal: f64, coupon_code: Option<&str>) -> OrderTotals;
}

/// Flat tax rate, free shipping above a threshold, static coupon table.
#[derive(Debug, Clone)]
pub struct StandardPricing {
    tax_rate: f64,
    free_shipping_threshold: f64,
    shipping_fee: f64,
    coupons: HashMap<String, Coupon>,
}

impl StandardPricing {
    pub fn new(config: &OrdersConfig) -> Self {
        let coupons = HashMap::from([
            ("SAVE10".to_string(), Coupon::Percentage(0.10)),
            ("SAVE20".to_string(), Coupon::Percentage(0.20)),
            ("FIRST5".to_string(), Coupon::Fixed(5.00)),
        ]);

        Self {
            tax_rate: config.tax_rate,
            free_shipping_threshold: config.free_shipping_threshold,
            shipping_fee: config.shipping_fee,
            coupons,
        }
    }

    pub fn with_coupon(mut self, code: &str, coupon: Coupon) -> Self {
        self.coupons.insert(code.to_uppercase(), coupon);
        self
    }
}

impl PricingPolicy for StandardPricing {
    fn coupon(&self, code: &str) -> Option<Coupon> {
        self.coupons.get(&code.trim().to_uppercase()).copied()
    }

    fn totals(&self, subtotal: f64, coupon_code: Option<&str>) -> OrderTotals {
        let tax = round_cents(subtotal * self.tax_rate);
        let shipping = if subtotal > self.free_shipping_threshold {
            0.0
        } else {
            self.shipping_fee
        };

        let coupon_code = coupon_code.filter(|c| !c.trim().is_empty());
        let discount = coupon_code
            .and_then(|code| self.coupon(code))
            .map(|coupon| coupon.discount(subtotal))
            .unwrap_or(0.0);

        OrderTotals {
            subtotal: round_cents(subtotal),
            tax,
            tax_rate: self.tax_rate,
            shipping,
            discount,
            coupon_code: coupon_code.map(str::to_string),
            total: round_cents(subtotal + tax + shipping - discount),
            currency: "USD".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing() -> StandardPricing {
        StandardPricing::new(&OrdersConfig::default())
    }

    #[test]
    fn test_small_order_pays_shipping() {
        let totals = pricing().totals(20.0, None);
        assert_eq!(totals.tax, 1.6);
        assert_eq!(totals.shipping, 5.99);
        assert_eq!(totals.discount, 0.0);
        assert_eq!(totals.total, 27.59);
        assert_eq!(totals.currency, "USD");
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert_eq!(pricing().totals(35.0, None).shipping, 5.99);
        assert_eq!(pricing().totals(35.01, None).shipping, 0.0);
    }

    #[test]
    fn test_coupons() {
        let totals = pricing().totals(100.0, Some("save10"));
        assert_eq!(totals.discount, 10.0);
        assert_eq!(totals.total, 98.0);
        assert_eq!(totals.coupon_code.as_deref(), Some("save10"));

        assert_eq!(pricing().totals(100.0, Some("SAVE20")).discount, 20.0);
        assert_eq!(pricing().totals(100.0, Some("FIRST5")).discount, 5.0);
        assert_eq!(pricing().totals(100.0, Some("BOGUS")).discount, 0.0);
        assert_eq!(pricing().totals(3.0, Some("FIRST5")).discount, 3.0);
    }

    #[test]
    fn test_custom_coupon_and_config() {
        let config = OrdersConfig {
            tax_rate: 0.1,
            ..OrdersConfig::default()
        };
        let pricing = StandardPricing::new(&config).with_coupon("staff", Coupon::Percentage(0.5));
        let totals = pricing.totals(50.0, Some("STAFF"));
        assert_eq!(totals.tax, 5.0);
        assert_eq!(totals.discount, 25.0);
        assert_eq!(totals.total, 30.0);
        assert_eq!(pricing.coupon("staff").map(|c| c.kind()), Some("percentage"));
    }
}
