//! Order Processing Agent - cart validation, stock, pricing, order lifecycle
//!
//! Deterministic: `process` never consults the model. The same `OrderDesk`
//! backs both the actions and the tools exposed to the model.

use crate::agents::base::{Agent, AgentCore};
use crate::agents::messages::{AgentRequest, AgentResponse, ErrorCode, Payload};
use crate::config::Settings;
use crate::core::llm::LanguageModel;
use crate::services::{
    round_cents, CartItem, InventoryService, MedicineCatalog, PricingPolicy, Reservation,
    StockShortage,
};
use crate::tools::{parse_args, FnTool, ToolRegistry};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const AGENT_ID: &str = "order_processing";

const ORDER_PROCESSING_PROMPT: &str = r#"You are an Order Processing AI for an online pharmacy.

Your role is to:
1. Validate cart contents before checkout
2. Verify prescriptions are attached for prescription medicines
3. Check inventory availability
4. Calculate totals with tax, shipping and discounts
5. Create orders and reserve inventory

Rules:
- Never create an order with validation errors
- Prescription medicines require a verified prescription
- Quantities must be between 1 and the per-item maximum

Respond in JSON format with the order summary or the list of problems."#;

pub const ORDER_STATUSES: [&str; 6] = [
    "pending",
    "confirmed",
    "processing",
    "shipped",
    "delivered",
    "cancelled",
];

/// Why an order could not be created.
#[derive(Debug)]
pub enum OrderRejection {
    Invalid(Vec<String>),
    OutOfStock(Vec<StockShortage>),
    Inventory(anyhow::Error),
}

impl OrderRejection {
    fn into_response(self) -> AgentResponse {
        match self {
            OrderRejection::Invalid(errors) => {
                AgentResponse::failure(ErrorCode::ValidationFailed, "Cart validation failed")
                    .with_data_field("errors", json!(errors))
            }
            OrderRejection::OutOfStock(shortages) => {
                AgentResponse::failure(ErrorCode::OutOfStock, "Some items are out of stock")
                    .with_data_field("unavailable_items", json!(shortages))
            }
            OrderRejection::Inventory(e) => AgentResponse::failure(
                ErrorCode::OutOfStock,
                format!("Inventory check failed: {}", e),
            ),
        }
    }
}

/// Catalog, pricing and stock for one pharmacy.
pub struct OrderDesk {
    catalog: Arc<dyn MedicineCatalog>,
    pricing: Arc<dyn PricingPolicy>,
    inventory: Arc<dyn InventoryService>,
    max_quantity: i64,
}

impl OrderDesk {
    pub fn new(
        catalog: Arc<dyn MedicineCatalog>,
        pricing: Arc<dyn PricingPolicy>,
        inventory: Arc<dyn InventoryService>,
        max_quantity: i64,
    ) -> Self {
        Self {
            catalog,
            pricing,
            inventory,
            max_quantity,
        }
    }

    fn requires_prescription(&self, item: &CartItem) -> bool {
        item.prescription_required
            || self
                .catalog
                .get(item.id())
                .map(|m| m.prescription_required)
                .unwrap_or(false)
    }

    /// Problems with the cart, one message per violation. Empty when valid.
    pub fn validate_cart(&self, items: &[CartItem]) -> Vec<String> {
        if items.is_empty() {
            return vec!["Cart is empty".to_string()];
        }

        let mut errors = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let position = index + 1;
            if item.id().trim().is_empty() {
                errors.push(format!("Item {}: missing medicine_id", position));
                continue;
            }
            match item.quantity {
                Some(quantity) if quantity < 1 => errors.push(format!(
                    "Item {} ({}): quantity must be at least 1",
                    position,
                    item.label()
                )),
                None => errors.push(format!(
                    "Item {} ({}): quantity is required",
                    position,
                    item.label()
                )),
                Some(quantity) if quantity > self.max_quantity => errors.push(format!(
                    "Item {} ({}): quantity exceeds maximum of {} per item",
                    position,
                    item.label(),
                    self.max_quantity
                )),
                Some(_) => {}
            }
            let has_prescription = item
                .prescription_id
                .as_deref()
                .is_some_and(|id| !id.trim().is_empty());
            if self.requires_prescription(item) && !has_prescription {
                errors.push(format!("{} requires a prescription", item.label()));
            }
        }
        errors
    }

    pub fn unit_price(&self, item: &CartItem) -> f64 {
        item.price
            .or_else(|| self.catalog.get(item.id()).map(|m| m.price))
            .unwrap_or(0.0)
    }

    /// Priced lines and their subtotal.
    pub fn price_lines(&self, items: &[CartItem]) -> (Vec<Value>, f64) {
        let mut subtotal = 0.0;
        let lines = items
            .iter()
            .map(|item| {
                let unit_price = self.unit_price(item);
                let line_total = round_cents(unit_price * item.quantity() as f64);
                subtotal += line_total;
                let name = item
                    .name
                    .clone()
                    .or_else(|| self.catalog.get(item.id()).map(|m| m.name.clone()))
                    .unwrap_or_else(|| item.label().to_string());
                json!({
                    "medicine_id": item.id(),
                    "name": name,
                    "quantity": item.quantity(),
                    "unit_price": unit_price,
                    "line_total": line_total,
                    "prescription_id": item.prescription_id,
                })
            })
            .collect();
        (lines, round_cents(subtotal))
    }

    /// Totals plus `coupon_error` when a supplied code is unknown.
    pub fn totals(&self, items: &[CartItem], coupon_code: Option<&str>) -> Value {
        let (_, subtotal) = self.price_lines(items);
        let mut totals = json!(self.pricing.totals(subtotal, coupon_code));
        if let Some(code) = coupon_code.filter(|c| !c.trim().is_empty()) {
            if self.pricing.coupon(code).is_none() {
                totals["coupon_error"] = json!(format!("Invalid coupon code: {}", code));
            }
        }
        totals
    }

    pub async fn shortages(&self, items: &[CartItem]) -> anyhow::Result<Vec<StockShortage>> {
        self.inventory.shortages(items).await
    }

    pub async fn reserve(&self, order_id: &str, items: &[CartItem]) -> anyhow::Result<Reservation> {
        self.inventory.reserve(order_id, items).await
    }

    /// Validate, check stock, price and reserve. Returns the order summary.
    pub async fn create_order(
        &self,
        items: &[CartItem],
        coupon_code: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Payload, OrderRejection> {
        let errors = self.validate_cart(items);
        if !errors.is_empty() {
            return Err(OrderRejection::Invalid(errors));
        }

        let shortages = self
            .shortages(items)
            .await
            .map_err(OrderRejection::Inventory)?;
        if !shortages.is_empty() {
            return Err(OrderRejection::OutOfStock(shortages));
        }

        let (lines, _) = self.price_lines(items);
        let totals = self.totals(items, coupon_code);

        let id = Uuid::new_v4();
        let order_id = format!("ord-{}", id);
        let order_number = format!(
            "ORD-{}-{:04}",
            Utc::now().format("%Y%m%d"),
            id.as_u128() % 10_000
        );

        let reservation = self
            .reserve(&order_id, items)
            .await
            .map_err(OrderRejection::Inventory)?;

        let mut next_steps = Vec::new();
        if items.iter().any(|item| self.requires_prescription(item)) {
            next_steps.push("Pharmacist verifies prescriptions");
        }
        next_steps.extend(["Complete payment", "Order ships within 1 business day"]);

        tracing::info!(
            "[{}] Created order {} ({} items)",
            AGENT_ID,
            order_number,
            items.len()
        );

        let mut order = Payload::new();
        order.insert("order_id".to_string(), json!(order_id));
        order.insert("order_number".to_string(), json!(order_number));
        order.insert("user_id".to_string(), json!(user_id));
        order.insert("status".to_string(), json!("pending"));
        order.insert("items".to_string(), Value::Array(lines));
        order.insert("totals".to_string(), totals);
        order.insert("reservation".to_string(), json!(reservation));
        order.insert("next_steps".to_string(), json!(next_steps));
        order.insert("created_at".to_string(), json!(Utc::now().to_rfc3339()));
        Ok(order)
    }
}

/// Cart lines from `cart_items` (or `items`). Missing means empty.
fn cart_from_payload(payload: &Payload) -> Result<Vec<CartItem>, String> {
    match payload.get("cart_items").or_else(|| payload.get("items")) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| format!("Invalid cart items: {}", e)),
    }
}

#[derive(Deserialize)]
struct CartArgs {
    items: Vec<CartItem>,
    #[serde(default)]
    coupon_code: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct CouponArgs {
    code: String,
    subtotal: f64,
}

#[derive(Deserialize)]
struct ReserveArgs {
    order_id: String,
    items: Vec<CartItem>,
}

fn order_tools(desk: Arc<OrderDesk>) -> ToolRegistry {
    let validate = desk.clone();
    let inventory = desk.clone();
    let totals = desk.clone();
    let coupons = desk.clone();
    let create = desk.clone();
    let reserve = desk;

    ToolRegistry::new()
        .with(FnTool::new(
            crate::tool_metadata!("validate_cart", "Validate cart items before checkout", {
                items: array @required => "Cart items with medicine_id, quantity and prescription_id",
            }),
            move |args| {
                let desk = validate.clone();
                async move {
                    let args: CartArgs = parse_args("validate_cart", args)?;
                    let errors = desk.validate_cart(&args.items);
                    Ok(json!({ "valid": errors.is_empty(), "errors": errors }))
                }
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("check_inventory", "Check stock for every cart item", {
                items: array @required => "Cart items to check",
            }),
            move |args| {
                let desk = inventory.clone();
                async move {
                    let args: CartArgs = parse_args("check_inventory", args)?;
                    let shortages = desk.shortages(&args.items).await?;
                    Ok(json!({
                        "available": shortages.is_empty(),
                        "unavailable_items": shortages,
                    }))
                }
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("calculate_totals", "Calculate subtotal, tax, shipping and discount", {
                items: array @required => "Cart items",
                coupon_code: string => "Optional coupon code",
            }),
            move |args| {
                let desk = totals.clone();
                async move {
                    let args: CartArgs = parse_args("calculate_totals", args)?;
                    Ok(desk.totals(&args.items, args.coupon_code.as_deref()))
                }
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("apply_coupon", "Look up a coupon and compute its discount", {
                code: string @required => "Coupon code",
                subtotal: number @required => "Order subtotal",
            }),
            move |args| {
                let desk = coupons.clone();
                async move {
                    let args: CouponArgs = parse_args("apply_coupon", args)?;
                    Ok(match desk.pricing.coupon(&args.code) {
                        Some(coupon) => json!({
                            "valid": true,
                            "code": args.code.to_uppercase(),
                            "type": coupon.kind(),
                            "discount": coupon.discount(args.subtotal),
                        }),
                        None => json!({
                            "valid": false,
                            "error": format!("Invalid coupon code: {}", args.code),
                        }),
                    })
                }
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("create_order", "Create an order from validated cart items", {
                items: array @required => "Cart items",
                coupon_code: string => "Optional coupon code",
                user_id: string => "Customer placing the order",
            }),
            move |args| {
                let desk = create.clone();
                async move {
                    let args: CartArgs = parse_args("create_order", args)?;
                    let result = desk
                        .create_order(&args.items, args.coupon_code.as_deref(), args.user_id.as_deref())
                        .await;
                    Ok(match result {
                        Ok(order) => json!({ "success": true, "order": order }),
                        Err(rejection) => {
                            let response = rejection.into_response();
                            json!({
                                "success": false,
                                "error": response.error,
                                "details": response.data,
                            })
                        }
                    })
                }
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("reserve_inventory", "Reserve stock for an order", {
                order_id: string @required => "Order the stock is held for",
                items: array @required => "Cart items to reserve",
            }),
            move |args| {
                let desk = reserve.clone();
                async move {
                    let args: ReserveArgs = parse_args("reserve_inventory", args)?;
                    let reservation = desk.reserve(&args.order_id, &args.items).await?;
                    Ok(json!(reservation))
                }
            },
        ))
}

pub struct OrderProcessingAgent {
    core: AgentCore,
    desk: Arc<OrderDesk>,
}

impl OrderProcessingAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: &Settings, desk: OrderDesk) -> Self {
        let desk = Arc::new(desk);
        let core = AgentCore::new(AGENT_ID, ORDER_PROCESSING_PROMPT, llm, &settings.llm)
            .with_description("Cart validation, order creation and order status changes")
            .with_temperature(0.3)
            .with_max_tool_rounds(settings.agents.max_tool_rounds)
            .with_tools(order_tools(desk.clone()));

        Self { core, desk }
    }

    async fn create(&self, request: &AgentRequest) -> AgentResponse {
        let items = match cart_from_payload(&request.payload) {
            Ok(items) => items,
            Err(e) => return OrderRejection::Invalid(vec![e]).into_response(),
        };
        let coupon = request.payload_str("coupon_code");
        let user_id = request.user_id.as_deref();

        match self.desk.create_order(&items, coupon, user_id).await {
            Ok(order) => AgentResponse::success(order),
            Err(rejection) => {
                tracing::info!("[{}] Order rejected: {:?}", AGENT_ID, rejection);
                rejection.into_response()
            }
        }
    }

    fn update_status(&self, request: &AgentRequest) -> AgentResponse {
        let Some(order_id) = request.payload_str("order_id").filter(|id| !id.is_empty()) else {
            return AgentResponse::failure(ErrorCode::ValidationFailed, "order_id is required");
        };
        let status = request.payload_str("status").unwrap_or_default();
        if !ORDER_STATUSES.contains(&status) {
            return AgentResponse::failure(
                ErrorCode::ValidationFailed,
                format!("Invalid status: {}", status),
            )
            .with_data_field("valid_statuses", json!(ORDER_STATUSES));
        }

        tracing::info!("[{}] Order {} now {}", AGENT_ID, order_id, status);
        let mut data = Payload::new();
        data.insert("order_id".to_string(), json!(order_id));
        data.insert("status".to_string(), json!(status));
        data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        if let Some(notes) = request.payload.get("notes") {
            data.insert("notes".to_string(), notes.clone());
        }
        AgentResponse::success(data)
    }

    fn cancel(&self, request: &AgentRequest) -> AgentResponse {
        let Some(order_id) = request.payload_str("order_id").filter(|id| !id.is_empty()) else {
            return AgentResponse::failure(ErrorCode::ValidationFailed, "order_id is required");
        };
        let reason = request
            .payload_str("reason")
            .filter(|r| !r.is_empty())
            .unwrap_or("Customer request");

        tracing::info!("[{}] Cancelled order {}: {}", AGENT_ID, order_id, reason);
        let mut data = Payload::new();
        data.insert("order_id".to_string(), json!(order_id));
        data.insert("status".to_string(), json!("cancelled"));
        data.insert("reason".to_string(), json!(reason));
        data.insert("refund_amount".to_string(), json!(0.0));
        data.insert("cancelled_at".to_string(), json!(Utc::now().to_rfc3339()));
        AgentResponse::success(data)
    }
}

#[async_trait]
impl Agent for OrderProcessingAgent {
    fn agent_type(&self) -> &str {
        self.core.agent_type()
    }

    fn description(&self) -> &str {
        self.core.description()
    }

    fn tool_names(&self) -> Vec<String> {
        self.core.tools().tool_names()
    }

    async fn process(&self, request: &AgentRequest) -> AgentResponse {
        match request.payload_str("action").unwrap_or("create") {
            "create" => self.create(request).await,
            "update_status" => self.update_status(request),
            "cancel" => self.cancel(request),
            other => AgentResponse::failure(
                ErrorCode::InvalidAction,
                format!("Unknown action: {}", other),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrdersConfig;
    use crate::services::{SampleCatalog, StandardPricing, StaticInventory};
    use crate::tools::Tool;

    fn desk(inventory: StaticInventory) -> OrderDesk {
        OrderDesk::new(
            Arc::new(SampleCatalog::new()),
            Arc::new(StandardPricing::new(&OrdersConfig::default())),
            Arc::new(inventory),
            100,
        )
    }

    fn item(value: Value) -> CartItem {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate_cart_reports_each_problem() {
        let desk = desk(StaticInventory::new(100));
        assert_eq!(desk.validate_cart(&[]), vec!["Cart is empty"]);

        let errors = desk.validate_cart(&[
            item(json!({"quantity": 1})),
            item(json!({"medicine_id": "med-001", "quantity": 0})),
            item(json!({"medicine_id": "med-002", "quantity": 101})),
            item(json!({"medicine_id": "med-005", "quantity": 1})),
            item(json!({"medicine_id": "med-001"})),
        ]);
        assert_eq!(errors.len(), 5);
        assert!(errors[0].contains("missing medicine_id"));
        assert!(errors[1].contains("at least 1"));
        assert!(errors[2].contains("maximum of 100"));
        assert!(errors[3].contains("requires a prescription"));
        assert!(errors[4].contains("quantity is required"));
    }

    #[test]
    fn test_prescription_items_pass_with_prescription_id() {
        let desk = desk(StaticInventory::new(100));
        let errors = desk.validate_cart(&[item(
            json!({"medicine_id": "med-005", "quantity": 1, "prescription_id": "rx-1"}),
        )]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_totals_use_catalog_price_and_flag_unknown_coupon() {
        let desk = desk(StaticInventory::new(100));
        let items = [CartItem::new("med-001", 2)];
        let unit = SampleCatalog::new().get("med-001").unwrap().price;

        let totals = desk.totals(&items, Some("NOPE"));
        assert_eq!(totals["subtotal"], json!(round_cents(unit * 2.0)));
        assert_eq!(totals["discount"], json!(0.0));
        assert_eq!(totals["coupon_error"], "Invalid coupon code: NOPE");

        let priced = [item(json!({"medicine_id": "x", "quantity": 3, "price": 10.0}))];
        assert_eq!(desk.totals(&priced, None)["subtotal"], json!(30.0));
    }

    #[tokio::test]
    async fn test_create_order_happy_path() {
        let desk = desk(StaticInventory::new(100));
        let order = desk
            .create_order(&[CartItem::new("med-001", 1)], Some("SAVE10"), Some("user-1"))
            .await
            .unwrap();

        assert!(order["order_id"].as_str().unwrap().starts_with("ord-"));
        assert!(order["order_number"].as_str().unwrap().starts_with("ORD-"));
        assert_eq!(order["status"], "pending");
        assert_eq!(order["reservation"]["reserved"], true);
        assert_eq!(order["items"].as_array().unwrap().len(), 1);
        assert!(order["totals"]["discount"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_create_order_out_of_stock() {
        let desk = desk(StaticInventory::new(100).with_stock("med-001", 1));
        let rejection = desk
            .create_order(&[CartItem::new("med-001", 5)], None, None)
            .await
            .unwrap_err();
        let response = rejection.into_response();
        assert_eq!(response.error_code, Some(ErrorCode::OutOfStock));
        assert_eq!(response.data["unavailable_items"][0]["available"], 1);
    }

    #[tokio::test]
    async fn test_apply_coupon_tool() {
        let tools = order_tools(Arc::new(desk(StaticInventory::new(100))));
        let tool = tools.get("apply_coupon").unwrap();
        let valid = tool
            .execute(json!({"code": "first5", "subtotal": 20.0}))
            .await
            .unwrap();
        assert_eq!(valid["discount"], json!(5.0));
        let invalid = tool
            .execute(json!({"code": "XYZ", "subtotal": 20.0}))
            .await
            .unwrap();
        assert_eq!(invalid["valid"], false);
    }
}
