//! Customer Support Agent - FAQs, order status, shipping policy, escalation

use crate::agents::base::{Agent, AgentCore};
use crate::agents::messages::{AgentRequest, AgentResponse, ErrorCode, Payload, Priority};
use crate::config::{OrdersConfig, Settings};
use crate::core::llm::{ChatMessage, LanguageModel, ResponseFormat};
use crate::tools::{parse_args, FnTool, ToolRegistry};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const AGENT_ID: &str = "customer_support";

const CUSTOMER_SUPPORT_PROMPT: &str = r#"You are a helpful Customer Support AI for an online pharmacy.

Your Capabilities:
1. Answer questions about medicines, shipping, returns, and policies
2. Provide general information about OTC (over-the-counter) products
3. Check order status and tracking information
4. Help with account-related questions
5. Escalate complex issues to human agents

SAFETY RULES (CRITICAL):
- NEVER provide medical advice or diagnose conditions
- NEVER recommend prescription medications
- NEVER provide specific dosages for prescription drugs
- ALWAYS suggest consulting a healthcare professional for medical questions
- ALWAYS include a disclaimer when discussing health-related topics

Response Guidelines:
- Be empathetic, clear, and concise
- Use the FAQ knowledge base for accurate information
- If unsure, acknowledge and offer to escalate
- Keep responses under 200 words when possible

ALWAYS respond in JSON format:
{
    "response": "Your helpful response text",
    "confidence": 0.95,
    "escalation_needed": false,
    "suggested_actions": ["action1", "action2"],
    "disclaimer": "Medical disclaimer if applicable"
}"#;

#[derive(Debug, Clone, PartialEq)]
pub struct FaqEntry {
    pub category: &'static str,
    pub question: &'static str,
    pub answer: &'static str,
}

fn faq_table() -> Vec<FaqEntry> {
    let entry = |category, question, answer| FaqEntry {
        category,
        question,
        answer,
    };
    vec![
        entry("shipping", "how long shipping", "Standard shipping takes 3-5 business days. Express shipping (1-2 days) is available for $15.99."),
        entry("shipping", "shipping cost", "Standard shipping is $5.99 or FREE for orders over $35. Express shipping is $15.99."),
        entry("shipping", "track order", "You can track your order in the 'Orders' section of your account or by clicking the tracking link in your shipping confirmation email."),
        entry("returns", "return policy", "Unopened items can be returned within 30 days for a full refund. Prescription medications cannot be returned."),
        entry("returns", "how to return", "Contact our support team to initiate a return. We'll provide a prepaid shipping label."),
        entry("prescriptions", "upload prescription", "You can upload your prescription in the 'Prescriptions' section. We accept JPG, PNG, and PDF files up to 10MB."),
        entry("prescriptions", "prescription valid", "Prescriptions are valid for 1 year from the issue date, or as specified by your doctor."),
        entry("prescriptions", "refill prescription", "You can request refills from the 'Prescriptions' section if you have remaining refills."),
        entry("general", "contact support", "You can reach us via chat, email at support@pharmacy.ai, or call 1-800-PHARMACY."),
        entry("general", "business hours", "Our pharmacy is open Monday-Friday 9AM-8PM, Saturday 10AM-6PM, Sunday 10AM-4PM (EST)."),
        entry("general", "insurance", "We accept most major insurance plans. You can add your insurance information in your profile."),
    ]
}

/// Entries whose question contains any word of `query`, at most three.
pub fn search_faq(faq: &[FaqEntry], query: &str) -> Value {
    let query = query.to_lowercase();
    let words: Vec<&str> = query.split_whitespace().collect();

    let results: Vec<Value> = faq
        .iter()
        .filter(|entry| words.iter().any(|word| entry.question.contains(word)))
        .take(3)
        .map(|entry| {
            json!({
                "category": entry.category,
                "question": entry.question,
                "answer": entry.answer,
            })
        })
        .collect();

    json!({
        "found": !results.is_empty(),
        "results": results,
    })
}

fn shipping_info(orders: &OrdersConfig, topic: Option<&str>) -> Value {
    let rates = json!({
        "standard": format!(
            "${:.2} (FREE over ${:.0})",
            orders.shipping_fee, orders.free_shipping_threshold
        ),
        "express": "$15.99",
    });
    let time = json!({
        "standard": "3-5 business days",
        "express": "1-2 business days",
    });
    let policy = json!("Orders placed before 2PM EST ship same day");

    match topic {
        Some("rates") => rates,
        Some("time") => time,
        Some("policy") => policy,
        _ => json!({ "rates": rates, "time": time, "policy": policy }),
    }
}

#[derive(Deserialize)]
struct SearchFaqArgs {
    query: String,
}

#[derive(Deserialize)]
struct OrderStatusArgs {
    order_number: String,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct EscalateArgs {
    reason: String,
    #[serde(default)]
    priority: Priority,
}

#[derive(Deserialize)]
struct ShippingArgs {
    #[serde(default)]
    topic: Option<String>,
}

fn support_tools(faq: Arc<Vec<FaqEntry>>, orders: OrdersConfig) -> ToolRegistry {
    ToolRegistry::new()
        .with(FnTool::new(
            crate::tool_metadata!("search_faq", "Search the FAQ knowledge base for answers", {
                query: string @required => "The search query",
            }),
            move |args| {
                let faq = faq.clone();
                async move {
                    let args: SearchFaqArgs = parse_args("search_faq", args)?;
                    Ok(search_faq(&faq, &args.query))
                }
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("get_order_status", "Get the status of a customer's order", {
                order_number: string @required => "The order number",
                user_id: string => "The user ID",
            }),
            |args| async move {
                let args: OrderStatusArgs = parse_args("get_order_status", args)?;
                Ok(json!({
                    "order_number": args.order_number,
                    "user_id": args.user_id,
                    "status": "shipped",
                    "status_display": "Shipped",
                    "tracking_number": "1Z999AA1234567890",
                    "carrier": "UPS",
                }))
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("escalate_to_human", "Escalate the conversation to a human agent", {
                reason: string @required => "Reason for escalation",
                priority: string = ["low", "normal", "high", "urgent"] => "Escalation priority",
            }),
            |args| async move {
                let args: EscalateArgs = parse_args("escalate_to_human", args)?;
                tracing::info!(
                    "[{}] Escalating to human ({}): {}",
                    AGENT_ID,
                    args.priority.as_str(),
                    args.reason
                );
                Ok(json!({
                    "escalated": true,
                    "ticket_id": format!("TKT-{}", Utc::now().format("%Y%m%d-%H%M%S")),
                    "reason": args.reason,
                    "priority": args.priority.as_str(),
                    "estimated_wait": "5-10 minutes",
                }))
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("get_shipping_info", "Get shipping information and policies", {
                topic: string = ["rates", "time", "policy", "international"] => "Shipping topic",
            }),
            move |args| {
                let orders = orders.clone();
                async move {
                    let args: ShippingArgs = parse_args("get_shipping_info", args)?;
                    Ok(shipping_info(&orders, args.topic.as_deref()))
                }
            },
        ))
}

pub struct CustomerSupportAgent {
    core: AgentCore,
}

impl CustomerSupportAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: &Settings) -> Self {
        let faq = Arc::new(faq_table());
        let core = AgentCore::new(AGENT_ID, CUSTOMER_SUPPORT_PROMPT, llm, &settings.llm)
            .with_description("General inquiries, FAQs, order status and shipping questions")
            .with_temperature(0.7)
            .with_max_tool_rounds(settings.agents.max_tool_rounds)
            .with_tools(support_tools(faq, settings.orders.clone()));

        Self { core }
    }
}

#[async_trait]
impl Agent for CustomerSupportAgent {
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
        let message = request.payload_str("message").unwrap_or_default();
        let messages = vec![
            self.core.system_message(request.payload_str("context")),
            ChatMessage::user(message),
        ];

        let reply = self
            .core
            .run_tool_loop(messages, Some(ResponseFormat::JsonObject))
            .await;

        if !reply.success {
            return AgentResponse::failure(ErrorCode::LlmError, reply.error_message());
        }

        let response = match reply.json_object() {
            Some(result) => {
                let confidence = result
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.5);
                let escalation = result
                    .get("escalation_needed")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);

                let mut data = Payload::new();
                data.insert(
                    "response".to_string(),
                    result.get("response").cloned().unwrap_or(json!("")),
                );
                data.insert("confidence".to_string(), json!(confidence));
                data.insert(
                    "suggested_actions".to_string(),
                    result.get("suggested_actions").cloned().unwrap_or(json!([])),
                );
                data.insert(
                    "disclaimer".to_string(),
                    result.get("disclaimer").cloned().unwrap_or(Value::Null),
                );

                AgentResponse::success(data)
                    .with_confidence(confidence)
                    .with_escalation(escalation)
            }
            None => AgentResponse::success(Payload::new())
                .with_data_field("response", json!(reply.content.clone().unwrap_or_default()))
                .with_confidence(0.5),
        };

        response.with_usage(reply.usage)
    }
}
