//! Medicine Search Agent - catalog search, details, interactions, alternatives

use crate::agents::base::{Agent, AgentCore};
use crate::agents::messages::{AgentRequest, AgentResponse, ErrorCode, Payload};
use crate::config::Settings;
use crate::core::llm::{ChatMessage, LanguageModel, ResponseFormat};
use crate::services::{MedicineCatalog, SearchHit, SearchQuery};
use crate::tools::{parse_args, FnTool, ToolRegistry};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const AGENT_ID: &str = "medicine_search";

const DISCLAIMER: &str = "Consult a healthcare professional before using any medication.";

const MEDICINE_SEARCH_PROMPT: &str = r#"You are a Medicine Search AI for an online pharmacy.

Your Capabilities:
1. Search for medicines by name, generic name, symptoms, or category
2. Provide detailed medicine information
3. Check availability and pricing
4. Recommend OTC alternatives
5. Check for drug interactions

SAFETY RULES (CRITICAL):
- NEVER provide medical advice or treatment recommendations
- NEVER diagnose conditions
- ALWAYS include: "Consult a healthcare professional before use"
- For prescription drugs, remind users a valid prescription is required
- Flag potential drug interactions clearly

ALWAYS respond in JSON format:
{
    "medicines": [
        {
            "name": "Medicine Name",
            "generic_name": "Generic Name",
            "description": "Brief description",
            "price": 29.99,
            "in_stock": true,
            "prescription_required": false,
            "warnings": ["warning1", "warning2"],
            "confidence_score": 0.95
        }
    ],
    "total_count": 5,
    "suggestions": ["related search 1", "related search 2"],
    "disclaimer": "Medical disclaimer"
}"#;

#[derive(Deserialize)]
struct DetailsArgs {
    #[serde(default)]
    medicine_id: Option<String>,
    #[serde(default)]
    sku: Option<String>,
}

#[derive(Deserialize)]
struct InteractionArgs {
    medicine_ids: Vec<String>,
}

#[derive(Deserialize)]
struct AlternativesArgs {
    medicine_id: String,
    #[serde(default = "default_same_generic")]
    same_generic: bool,
}

fn default_same_generic() -> bool {
    true
}

#[derive(Deserialize)]
struct AllergyArgs {
    medicine_id: String,
    user_id: String,
}

fn search_tools(catalog: Arc<dyn MedicineCatalog>) -> ToolRegistry {
    let search_catalog = catalog.clone();
    let details_catalog = catalog.clone();
    let interactions_catalog = catalog.clone();
    let alternatives_catalog = catalog.clone();

    ToolRegistry::new()
        .with(FnTool::new(
            crate::tool_metadata!("semantic_search", "Search medicines by name, ingredient or category", {
                query: string @required => "Search text",
                category: string => "Exact category filter",
                in_stock_only: boolean => "Only in-stock medicines (default true)",
                otc_only: boolean => "Only over-the-counter medicines",
                limit: integer => "Maximum results (default 10)",
            }),
            move |args| {
                let catalog = search_catalog.clone();
                async move {
                    let query: SearchQuery = parse_args("semantic_search", args)?;
                    let results = catalog.search(&query);
                    Ok(json!({
                        "found": results.total > 0,
                        "results": results.results,
                        "total": results.total,
                    }))
                }
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("get_medicine_details", "Get detailed information about a medicine", {
                medicine_id: string => "Catalog id",
                sku: string => "Stock keeping unit",
            }),
            move |args| {
                let catalog = details_catalog.clone();
                async move {
                    let args: DetailsArgs = parse_args("get_medicine_details", args)?;
                    let medicine = match (&args.medicine_id, &args.sku) {
                        (Some(id), _) => catalog.get(id),
                        (None, Some(sku)) => catalog.find_by_sku(sku),
                        (None, None) => anyhow::bail!("medicine_id or sku is required"),
                    };
                    match medicine {
                        Some(medicine) => Ok(serde_json::to_value(medicine)?),
                        None => anyhow::bail!("medicine not found"),
                    }
                }
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("check_interactions", "Check for drug interactions", {
                medicine_ids: array @required => "Medicine ids to check together",
                user_id: string => "The user ID",
            }),
            move |args| {
                let catalog = interactions_catalog.clone();
                async move {
                    let args: InteractionArgs = parse_args("check_interactions", args)?;
                    Ok(serde_json::to_value(catalog.check_interactions(&args.medicine_ids))?)
                }
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("get_alternatives", "Get alternative medicines", {
                medicine_id: string @required => "Medicine to replace",
                same_generic: boolean => "Require the same generic name (default true)",
            }),
            move |args| {
                let catalog = alternatives_catalog.clone();
                async move {
                    let args: AlternativesArgs = parse_args("get_alternatives", args)?;
                    let base_price = catalog
                        .get(&args.medicine_id)
                        .map(|m| m.price)
                        .ok_or_else(|| anyhow::anyhow!("medicine not found"))?;
                    let alternatives: Vec<Value> = catalog
                        .alternatives(&args.medicine_id, args.same_generic)
                        .into_iter()
                        .map(|m| {
                            json!({
                                "id": m.id,
                                "name": m.name,
                                "price": m.price,
                                "savings": crate::services::round_cents((base_price - m.price).max(0.0)),
                            })
                        })
                        .collect();
                    Ok(json!({ "alternatives": alternatives }))
                }
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("check_allergies", "Check medicine against user allergies", {
                medicine_id: string @required => "Medicine to check",
                user_id: string @required => "The user ID",
            }),
            move |args| {
                let catalog = catalog.clone();
                async move {
                    let args: AllergyArgs = parse_args("check_allergies", args)?;
                    let medicine = catalog
                        .get(&args.medicine_id)
                        .ok_or_else(|| anyhow::anyhow!("medicine not found"))?;
                    let allergy_note = medicine
                        .contraindications
                        .iter()
                        .find(|c| c.to_lowercase().contains("allergy"))
                        .cloned();
                    tracing::debug!(
                        "[{}] Allergy check for user {} on {}",
                        AGENT_ID,
                        args.user_id,
                        medicine.id
                    );
                    Ok(json!({
                        "safe": true,
                        "allergen_found": Value::Null,
                        "warning": allergy_note,
                    }))
                }
            },
        ))
}

pub struct MedicineSearchAgent {
    core: AgentCore,
    catalog: Arc<dyn MedicineCatalog>,
}

impl MedicineSearchAgent {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        settings: &Settings,
        catalog: Arc<dyn MedicineCatalog>,
    ) -> Self {
        let core = AgentCore::new(AGENT_ID, MEDICINE_SEARCH_PROMPT, llm, &settings.llm)
            .with_description("Find medicines, check availability and get details")
            .with_temperature(0.5)
            .with_max_tool_rounds(settings.agents.max_tool_rounds)
            .with_tools(search_tools(catalog.clone()));

        Self { core, catalog }
    }

    fn search_query(request: &AgentRequest) -> Result<SearchQuery, String> {
        let text = request
            .payload_str("query")
            .or_else(|| request.payload_str("message"))
            .unwrap_or_default();

        let mut filters = match request.payload.get("filters") {
            None | Some(Value::Null) => Payload::new(),
            Some(Value::Object(filters)) => filters.clone(),
            Some(_) => return Err("filters must be an object".to_string()),
        };
        filters.insert("query".to_string(), json!(text));

        serde_json::from_value(Value::Object(filters)).map_err(|e| format!("invalid filters: {}", e))
    }

    fn attach_interaction_warnings(&self, hits: &mut [SearchHit]) {
        let ids: Vec<String> = hits.iter().take(3).map(|h| h.medicine.id.clone()).collect();
        let report = self.catalog.check_interactions(&ids);
        for hit in hits.iter_mut() {
            hit.interaction_warning = report.warnings.get(&hit.medicine.id).cloned();
        }
    }
}

#[async_trait]
impl Agent for MedicineSearchAgent {
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
        let query = match Self::search_query(request) {
            Ok(query) => query,
            Err(e) => return AgentResponse::failure(ErrorCode::ValidationFailed, e),
        };

        let mut results = self.catalog.search(&query);
        tracing::debug!(
            "[{}] '{}' matched {} medicines",
            AGENT_ID,
            query.query,
            results.total
        );

        if results.results.is_empty() {
            return AgentResponse::success(Payload::new())
                .with_data_field("medicines", json!([]))
                .with_data_field("total_count", json!(0))
                .with_data_field(
                    "suggestions",
                    json!(["Try a different search term", "Browse by category"]),
                )
                .with_data_field("disclaimer", json!(DISCLAIMER));
        }

        if request.user_id.is_some() {
            self.attach_interaction_warnings(&mut results.results);
        }

        let top: Vec<&SearchHit> = results.results.iter().take(5).collect();
        let messages = vec![
            self.core.system_message(None),
            ChatMessage::user(format!(
                "Search query: {}\n\nResults: {}\n\nFormat the response.",
                query.query,
                json!(top)
            )),
        ];

        let reply = self
            .core
            .run_tool_loop(messages, Some(ResponseFormat::JsonObject))
            .await;

        if reply.success {
            if let Some(formatted) = reply.json_object() {
                return AgentResponse::success(formatted)
                    .with_confidence(0.9)
                    .with_usage(reply.usage);
            }
            tracing::warn!("[{}] Model output was not JSON, returning raw results", AGENT_ID);
        }

        AgentResponse::success(Payload::new())
            .with_data_field("medicines", json!(results.results))
            .with_data_field("total_count", json!(results.total))
            .with_data_field("suggestions", json!([]))
            .with_data_field("disclaimer", json!(DISCLAIMER))
            .with_usage(reply.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SampleCatalog;

    fn tools() -> ToolRegistry {
        search_tools(Arc::new(SampleCatalog::new()))
    }

    #[tokio::test]
    async fn test_details_by_id_and_sku() {
        let tools = tools();
        let details = tools.get("get_medicine_details").unwrap();

        let by_id = details.execute(json!({"medicine_id": "med-002"})).await.unwrap();
        assert_eq!(by_id["generic_name"], "Acetaminophen");

        let by_sku = details.execute(json!({"sku": "sku005"})).await.unwrap();
        assert_eq!(by_sku["id"], "med-005");

        assert!(details.execute(json!({})).await.is_err());
        assert!(details.execute(json!({"medicine_id": "med-999"})).await.is_err());
    }

    #[tokio::test]
    async fn test_alternatives_report_savings() {
        let tools = tools();
        let alternatives = tools.get("get_alternatives").unwrap();
        let result = alternatives
            .execute(json!({"medicine_id": "med-001", "same_generic": false}))
            .await
            .unwrap();

        let list = result["alternatives"].as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], "med-002");
        assert_eq!(list[0]["savings"], 3.0);
    }

    #[tokio::test]
    async fn test_semantic_search_tool_defaults() {
        let tools = tools();
        let search = tools.get("semantic_search").unwrap();
        let result = search.execute(json!({"query": "pain"})).await.unwrap();
        assert_eq!(result["found"], true);
        assert_eq!(result["total"], 2);
    }

    #[test]
    fn test_search_query_from_payload() {
        let request = AgentRequest::new(
            json!({"query": "allergy", "filters": {"otc_only": true, "limit": 1}})
                .as_object()
                .unwrap()
                .clone(),
        );
        let query = MedicineSearchAgent::search_query(&request).unwrap();
        assert_eq!(query.query, "allergy");
        assert!(query.otc_only);
        assert!(query.in_stock_only);
        assert_eq!(query.limit, 1);

        let bad = AgentRequest::new(json!({"filters": [1]}).as_object().unwrap().clone());
        assert!(MedicineSearchAgent::search_query(&bad).is_err());
    }
}
