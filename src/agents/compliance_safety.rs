//! Compliance & Safety Agent - PII detection, drug safety screening, audit entries

use crate::agents::base::{Agent, AgentCore};
use crate::agents::messages::{AgentRequest, AgentResponse, ErrorCode, Payload};
use crate::config::Settings;
use crate::core::llm::LanguageModel;
use crate::services::MedicineCatalog;
use crate::tools::{parse_args, FnTool, ToolRegistry};
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

pub const AGENT_ID: &str = "compliance_safety";

const COMPLIANCE_SAFETY_PROMPT: &str = r#"You are a Compliance & Safety AI for an online pharmacy.

Your role is to:
1. Enforce HIPAA compliance in all operations
2. Detect and flag PII (Personally Identifiable Information)
3. Audit all agent actions
4. Flag suspicious activities

Safety Checks:
- Drug interaction screening
- Allergy checking
- Dosage validation
- Contraindication screening

Response Format (JSON):
{
    "compliance_check": "passed|failed|warning",
    "safety_check": "passed|failed|warning",
    "flags": ["flag1", "flag2"],
    "recommendations": ["rec1", "rec2"],
    "requires_review": false,
    "audit_log_id": "uuid"
}"#;

const DEFAULT_ANONYMIZED_FIELDS: [&str; 5] = ["name", "email", "phone", "address", "ssn"];

static PII_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
        ("email", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
        ("phone", r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b"),
        ("credit_card", r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b"),
        ("dob", r"\b(0[1-9]|1[0-2])[/-](0[1-9]|[12]\d|3[01])[/-](19|20)\d{2}\b"),
        ("mrn", r"\bMRN[\s:]?\d{6,10}\b"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).unwrap()))
    .collect()
});

/// PII kinds found in `text` with their match counts.
pub fn detect_pii(text: &str) -> Value {
    let detected: Vec<(&str, usize)> = PII_PATTERNS
        .iter()
        .map(|(kind, pattern)| (*kind, pattern.find_iter(text).count()))
        .filter(|(_, count)| *count > 0)
        .collect();

    let has_pii = !detected.is_empty();
    json!({
        "has_pii": has_pii,
        "detected_types": detected.iter().map(|(kind, _)| *kind).collect::<Vec<_>>(),
        "count": detected.iter().map(|(_, count)| count).sum::<usize>(),
        "recommendation": if has_pii { "Anonymize or encrypt" } else { "No PII detected" },
    })
}

/// First 16 hex chars of the SHA-256 of the value's text form.
pub fn anonymize_value(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(digest)[..16].to_string()
}

pub fn anonymize(data: &Payload, fields: &[String]) -> Payload {
    let mut anonymized = data.clone();
    for field in fields {
        if let Some(value) = anonymized.get_mut(field) {
            *value = json!(anonymize_value(value));
        }
    }
    anonymized
}

/// Multiple medicines are always an issue; known interactions add one each.
pub fn drug_safety(catalog: &dyn MedicineCatalog, medicine_ids: &[String]) -> Value {
    let mut issues = Vec::new();
    if medicine_ids.len() > 1 {
        issues.push("Multiple medications - check interactions".to_string());
    }
    let report = catalog.check_interactions(medicine_ids);
    for (medicine_id, warning) in &report.warnings {
        issues.push(format!("Interaction ({}): {}", medicine_id, warning));
    }

    let has_issues = !issues.is_empty();
    json!({
        "has_issues": has_issues,
        "issues": issues,
        "recommendations": if has_issues { vec!["Consult pharmacist"] } else { Vec::new() },
    })
}

pub fn audit_entry(
    action: &str,
    user_id: Option<&str>,
    resource_type: Option<&str>,
    resource_id: Option<&str>,
    pii_involved: bool,
) -> Value {
    let log_id = format!("audit-{}", Uuid::new_v4());
    tracing::info!(
        "[{}] Audit {} action={} user={:?} pii={}",
        AGENT_ID,
        log_id,
        action,
        user_id,
        pii_involved
    );
    json!({
        "log_id": log_id,
        "logged": true,
        "action": action,
        "user_id": user_id,
        "resource_type": resource_type,
        "resource_id": resource_id,
        "timestamp": Utc::now().to_rfc3339(),
        "pii_involved": pii_involved,
    })
}

#[derive(Deserialize)]
struct DetectArgs {
    text: String,
}

#[derive(Deserialize)]
struct AnonymizeArgs {
    data: Payload,
    #[serde(default)]
    fields_to_anonymize: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct AuditArgs {
    action: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default)]
    pii_involved: bool,
}

#[derive(Deserialize)]
struct SafetyArgs {
    medicine_ids: Vec<String>,
}

#[derive(Deserialize)]
struct DosageArgs {
    medicine_id: String,
    dosage: String,
    #[serde(default)]
    patient_age: Option<f64>,
}

fn compliance_tools(catalog: Arc<dyn MedicineCatalog>) -> ToolRegistry {
    let dosage_catalog = catalog.clone();

    ToolRegistry::new()
        .with(FnTool::new(
            crate::tool_metadata!("detect_pii", "Detect PII/PHI in text", {
                text: string @required => "Text to scan",
            }),
            |args| async move {
                let args: DetectArgs = parse_args("detect_pii", args)?;
                Ok(detect_pii(&args.text))
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("anonymize_data", "Anonymize PII/PHI in data", {
                data: object @required => "Record to anonymize",
                fields_to_anonymize: array => "Fields to hash, defaults to common PII fields",
            }),
            |args| async move {
                let args: AnonymizeArgs = parse_args("anonymize_data", args)?;
                let fields = args.fields_to_anonymize.unwrap_or_else(|| {
                    DEFAULT_ANONYMIZED_FIELDS.iter().map(|f| f.to_string()).collect()
                });
                Ok(json!({
                    "anonymized": true,
                    "data": anonymize(&args.data, &fields),
                    "fields_anonymized": fields,
                }))
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("audit_log", "Create audit log entry", {
                action: string @required => "Action being audited",
                user_id: string => "Acting user",
                resource_type: string => "Kind of resource touched",
                resource_id: string => "Resource identifier",
                pii_involved: boolean => "Whether PII was accessed",
            }),
            |args| async move {
                let args: AuditArgs = parse_args("audit_log", args)?;
                Ok(audit_entry(
                    &args.action,
                    args.user_id.as_deref(),
                    args.resource_type.as_deref(),
                    args.resource_id.as_deref(),
                    args.pii_involved,
                ))
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("check_drug_safety", "Check drug safety (interactions, allergies, contraindications)", {
                medicine_ids: array @required => "Medicines to screen together",
            }),
            move |args| {
                let catalog = catalog.clone();
                async move {
                    let args: SafetyArgs = parse_args("check_drug_safety", args)?;
                    Ok(drug_safety(catalog.as_ref(), &args.medicine_ids))
                }
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("validate_dosage", "Validate medication dosage", {
                medicine_id: string @required => "Medicine being dosed",
                dosage: string @required => "Requested dosage",
                patient_age: number => "Patient age in years",
            }),
            move |args| {
                let catalog = dosage_catalog.clone();
                async move {
                    let args: DosageArgs = parse_args("validate_dosage", args)?;
                    let Some(medicine) = catalog.get(&args.medicine_id) else {
                        return Ok(json!({
                            "valid": false,
                            "error": format!("Medicine {} not found", args.medicine_id),
                        }));
                    };
                    let mut warnings = Vec::new();
                    if args.patient_age.is_some_and(|age| age < 12.0) {
                        warnings.push("Pediatric patient: confirm dosage with a pharmacist");
                    }
                    Ok(json!({
                        "valid": true,
                        "medicine": medicine.name,
                        "dosage": args.dosage,
                        "warnings": warnings,
                        "recommended_range": medicine.dosage_instructions,
                    }))
                }
            },
        ))
}

pub struct ComplianceSafetyAgent {
    core: AgentCore,
    catalog: Arc<dyn MedicineCatalog>,
}

impl ComplianceSafetyAgent {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        settings: &Settings,
        catalog: Arc<dyn MedicineCatalog>,
    ) -> Self {
        let core = AgentCore::new(AGENT_ID, COMPLIANCE_SAFETY_PROMPT, llm, &settings.llm)
            .with_description("PII detection, drug safety screening and audit logging")
            .with_temperature(0.2)
            .with_max_tool_rounds(settings.agents.max_tool_rounds)
            .with_tools(compliance_tools(catalog.clone()));

        Self { core, catalog }
    }

    fn medicine_ids(request: &AgentRequest) -> Result<Option<Vec<String>>, AgentResponse> {
        match request.payload.get("medicine_ids") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|_| {
                AgentResponse::failure(
                    ErrorCode::ValidationFailed,
                    "medicine_ids must be a list of medicine ids",
                )
            }),
        }
    }

    fn pii_check(&self, request: &AgentRequest) -> AgentResponse {
        let text = request.payload_str("text").unwrap_or_default();
        let result = detect_pii(text);
        AgentResponse::success(result.as_object().cloned().unwrap_or_default()).with_confidence(0.9)
    }

    fn drug_safety_check(&self, request: &AgentRequest) -> AgentResponse {
        let ids = match Self::medicine_ids(request) {
            Ok(ids) => ids.unwrap_or_default(),
            Err(response) => return response,
        };
        let result = drug_safety(self.catalog.as_ref(), &ids);
        let has_issues = result["has_issues"].as_bool().unwrap_or(false);
        AgentResponse::success(result.as_object().cloned().unwrap_or_default())
            .with_escalation(has_issues)
    }

    fn audit_action(&self, request: &AgentRequest) -> AgentResponse {
        let entry = audit_entry(
            request.payload_str("action").unwrap_or("unknown"),
            request.user_id.as_deref(),
            request.payload_str("resource_type"),
            request.payload_str("resource_id"),
            request
                .payload
                .get("pii_involved")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        );
        AgentResponse::success(entry.as_object().cloned().unwrap_or_default())
    }

    fn full_check(&self, request: &AgentRequest) -> AgentResponse {
        let ids = match Self::medicine_ids(request) {
            Ok(ids) => ids,
            Err(response) => return response,
        };

        let mut flags: Vec<Value> = Vec::new();
        let mut recommendations: Vec<Value> = Vec::new();
        let mut safety_check = "passed";
        let mut requires_review = false;

        let serialized = Value::Object(request.payload.clone()).to_string();
        let pii = detect_pii(&serialized);
        let has_pii = pii["has_pii"].as_bool().unwrap_or(false);
        if has_pii {
            flags.push(json!("pii_detected_in_payload"));
            recommendations.push(json!("Ensure PII is encrypted"));
        }

        if let Some(ids) = ids {
            let safety = drug_safety(self.catalog.as_ref(), &ids);
            if safety["has_issues"].as_bool().unwrap_or(false) {
                safety_check = "warning";
                requires_review = true;
                if let Some(issues) = safety["issues"].as_array() {
                    flags.extend(issues.iter().cloned());
                }
            }
        }

        let audit = audit_entry(
            "compliance_check",
            request.user_id.as_deref(),
            Some("compliance"),
            None,
            has_pii,
        );

        let mut data = Payload::new();
        data.insert("compliance_check".to_string(), json!("passed"));
        data.insert("safety_check".to_string(), json!(safety_check));
        data.insert("flags".to_string(), Value::Array(flags));
        data.insert("recommendations".to_string(), Value::Array(recommendations));
        data.insert("requires_review".to_string(), json!(requires_review));
        data.insert("audit_log_id".to_string(), audit["log_id"].clone());

        AgentResponse::success(data)
            .with_confidence(0.95)
            .with_escalation(requires_review)
    }
}

#[async_trait]
impl Agent for ComplianceSafetyAgent {
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
        match request.payload_str("check_type").unwrap_or("full") {
            "pii_detection" => self.pii_check(request),
            "drug_safety" => self.drug_safety_check(request),
            "audit" => self.audit_action(request),
            _ => self.full_check(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SampleCatalog;
    use crate::tools::Tool;

    #[test]
    fn test_detect_pii_kinds_and_counts() {
        let result = detect_pii("SSN 123-45-6789, mail jane@example.com, MRN:1234567");
        assert_eq!(result["has_pii"], true);
        assert_eq!(result["detected_types"], json!(["ssn", "email", "mrn"]));
        assert_eq!(result["count"], 3);

        let clean = detect_pii("I need something for a headache");
        assert_eq!(clean["has_pii"], false);
        assert_eq!(clean["recommendation"], "No PII detected");
    }

    #[test]
    fn test_detect_pii_dob_and_card() {
        let result = detect_pii("born 01/15/1985, card 4111 1111 1111 1111");
        assert_eq!(result["detected_types"], json!(["credit_card", "dob"]));
    }

    #[test]
    fn test_anonymize_hashes_selected_fields() {
        let data = json!({"name": "Jane", "city": "Boston", "age": 40})
            .as_object()
            .unwrap()
            .clone();
        let out = anonymize(&data, &["name".to_string(), "age".to_string(), "ssn".to_string()]);

        assert_eq!(out["city"], "Boston");
        let hashed = out["name"].as_str().unwrap();
        assert_eq!(hashed.len(), 16);
        assert_eq!(hashed, anonymize_value(&json!("Jane")));
        assert_ne!(hashed, "Jane");
        assert_eq!(out["age"].as_str().unwrap().len(), 16);
        assert!(!out.contains_key("ssn"));
    }

    #[test]
    fn test_drug_safety_uses_catalog_interactions() {
        let catalog = SampleCatalog::new();
        let single = drug_safety(&catalog, &["med-001".to_string()]);
        assert_eq!(single["has_issues"], false);

        let pair = drug_safety(&catalog, &["med-001".to_string(), "med-002".to_string()]);
        assert_eq!(pair["has_issues"], true);
        assert_eq!(pair["issues"].as_array().unwrap().len(), 2);
        assert_eq!(pair["recommendations"], json!(["Consult pharmacist"]));
    }

    #[tokio::test]
    async fn test_validate_dosage_tool() {
        let tools = compliance_tools(Arc::new(SampleCatalog::new()));
        let tool = tools.get("validate_dosage").unwrap();

        let child = tool
            .execute(json!({"medicine_id": "med-001", "dosage": "200mg", "patient_age": 8}))
            .await
            .unwrap();
        assert_eq!(child["valid"], true);
        assert_eq!(child["warnings"].as_array().unwrap().len(), 1);

        let unknown = tool
            .execute(json!({"medicine_id": "nope", "dosage": "1"}))
            .await
            .unwrap();
        assert_eq!(unknown["valid"], false);
    }
}
