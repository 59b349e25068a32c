//! Prescription Validation Agent - text extraction, model parsing, safety post-checks

use crate::agents::base::{Agent, AgentCore};
use crate::agents::messages::{AgentRequest, AgentResponse, ErrorCode, Payload, Priority};
use crate::config::Settings;
use crate::core::llm::{ChatMessage, LanguageModel, ResponseFormat};
use crate::services::DocumentReader;
use crate::tools::{parse_args, FnTool, ToolRegistry};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const AGENT_ID: &str = "prescription_validation";

const PRESCRIPTION_VALIDATION_PROMPT: &str = r#"You are a Prescription Validation AI for an online pharmacy.

Your role is to:
1. Parse text extracted from prescription images/PDFs
2. Validate prescription format and required fields
3. Check for tampering or fraud indicators
4. Verify prescription hasn't expired
5. Flag controlled substances

Required Fields on a Valid Prescription:
- Patient name
- Doctor name and credentials
- Doctor NPI (National Provider Identifier) or license
- Medication name and dosage
- Quantity prescribed
- Instructions (sig)
- Issue date
- Doctor signature

Response Format (JSON):
{
    "validation_status": "valid|invalid|needs_review",
    "confidence": 0.95,
    "extracted_data": {
        "patient_name": "",
        "doctor_name": "",
        "doctor_npi": "",
        "medicines": [{"name": "", "dosage": "", "quantity": 0}],
        "issue_date": "YYYY-MM-DD",
        "expiration_date": ""
    },
    "flags": ["flag1", "flag2"],
    "error_message": null,
    "requires_pharmacist_review": false
}"#;

/// Substring (lowercase) → DEA schedule
const CONTROLLED_SUBSTANCES: [(&str, &str); 6] = [
    ("adderall", "II"),
    ("oxycontin", "II"),
    ("xanax", "IV"),
    ("valium", "IV"),
    ("tramadol", "IV"),
    ("codeine", "II"),
];

const STALE_AFTER_DAYS: i64 = 30;
const EXPIRED_AFTER_DAYS: i64 = 180;
const REVIEW_CONFIDENCE: f64 = 0.8;

static NPI_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10}$").unwrap());

/// Schedule of a controlled substance named in `medicine_name`.
pub fn controlled_schedule(medicine_name: &str) -> Option<&'static str> {
    let name = medicine_name.to_lowercase();
    CONTROLLED_SUBSTANCES
        .iter()
        .find(|(substance, _)| name.contains(substance))
        .map(|(_, schedule)| *schedule)
}

/// NPI check digit: Luhn over the number prefixed with `80840`.
pub fn npi_checksum_valid(npi: &str) -> bool {
    if !NPI_FORMAT.is_match(npi) {
        return false;
    }
    let digits = format!("80840{}", npi);
    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Date, controlled-substance and review checks applied to the model's
/// parse of a prescription. Returns whether pharmacist review is needed.
pub fn apply_post_checks(result: &mut Payload, today: NaiveDate) -> bool {
    let mut flags: Vec<Value> = match result.get("flags") {
        Some(Value::Array(flags)) => flags.clone(),
        _ => Vec::new(),
    };
    let extracted = result
        .get("extracted_data")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    match extracted.get("issue_date") {
        None | Some(Value::Null) => {}
        Some(Value::String(date)) if date.is_empty() => {}
        Some(Value::String(date)) => match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            Ok(issued) => {
                let days_old = (today - issued).num_days();
                if days_old > EXPIRED_AFTER_DAYS {
                    flags.push(json!("prescription_over_6_months_old"));
                    result.insert("validation_status".to_string(), json!("invalid"));
                } else if days_old > STALE_AFTER_DAYS {
                    flags.push(json!("prescription_over_30_days_old"));
                }
            }
            Err(_) => flags.push(json!("invalid_issue_date")),
        },
        Some(_) => flags.push(json!("invalid_issue_date")),
    }

    let mut controlled = Vec::new();
    if let Some(Value::Array(medicines)) = extracted.get("medicines") {
        for medicine in medicines {
            let Some(name) = medicine.get("name").and_then(Value::as_str) else {
                continue;
            };
            if let Some(schedule) = controlled_schedule(name) {
                controlled.push(json!(name));
                flags.push(json!(format!("controlled_substance_{}", schedule)));
            }
        }
    }

    let needs_review = result.get("validation_status").and_then(Value::as_str)
        == Some("needs_review")
        || !controlled.is_empty()
        || result
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(1.0)
            < REVIEW_CONFIDENCE
        || flags.iter().any(|f| f.as_str() == Some("suspicious_format"));

    result.insert("flags".to_string(), Value::Array(flags));
    result.insert("requires_pharmacist_review".to_string(), json!(needs_review));
    result.insert("controlled_substances_found".to_string(), Value::Array(controlled));
    needs_review
}

#[derive(Deserialize)]
struct OcrArgs {
    file_url: String,
    #[serde(default = "default_file_type")]
    file_type: String,
}

fn default_file_type() -> String {
    "image".to_string()
}

#[derive(Deserialize)]
struct NpiArgs {
    npi: String,
}

#[derive(Deserialize)]
struct ControlledArgs {
    medicine_name: String,
}

#[derive(Deserialize)]
struct ReviewArgs {
    prescription_id: String,
    #[serde(default)]
    priority: Priority,
}

fn validation_tools(documents: Arc<dyn DocumentReader>) -> ToolRegistry {
    ToolRegistry::new()
        .with(FnTool::new(
            crate::tool_metadata!("extract_text_ocr", "Extract text from prescription image/PDF using OCR", {
                file_url: string @required => "Location of the uploaded file",
                file_type: string = ["image", "pdf"] => "Kind of document",
            }),
            move |args| {
                let documents = documents.clone();
                async move {
                    let args: OcrArgs = parse_args("extract_text_ocr", args)?;
                    let extracted = documents.extract_text(&args.file_url, &args.file_type).await?;
                    Ok(json!({
                        "success": true,
                        "text": extracted.text,
                        "confidence": extracted.confidence,
                    }))
                }
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("validate_doctor_npi", "Validate doctor's NPI number", {
                npi: string @required => "National Provider Identifier",
            }),
            |args| async move {
                let args: NpiArgs = parse_args("validate_doctor_npi", args)?;
                if !NPI_FORMAT.is_match(&args.npi) {
                    return Ok(json!({ "valid": false, "error": "NPI must be 10 digits" }));
                }
                Ok(json!({
                    "valid": true,
                    "npi": args.npi,
                    "checksum_valid": npi_checksum_valid(&args.npi),
                }))
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("check_controlled_substance", "Check if medicine is a controlled substance", {
                medicine_name: string @required => "Medicine name as written",
            }),
            |args| async move {
                let args: ControlledArgs = parse_args("check_controlled_substance", args)?;
                Ok(match controlled_schedule(&args.medicine_name) {
                    Some(schedule) => json!({
                        "is_controlled": true,
                        "schedule": schedule,
                        "additional_requirements": ["Pharmacist verification required"],
                    }),
                    None => json!({ "is_controlled": false, "schedule": Value::Null }),
                })
            },
        ))
        .with(FnTool::new(
            crate::tool_metadata!("queue_for_review", "Queue prescription for pharmacist review", {
                prescription_id: string @required => "Prescription to review",
                priority: string = ["low", "normal", "high", "urgent"] => "Review priority",
            }),
            |args| async move {
                let args: ReviewArgs = parse_args("queue_for_review", args)?;
                tracing::info!(
                    "[{}] Queued {} for pharmacist review ({})",
                    AGENT_ID,
                    args.prescription_id,
                    args.priority.as_str()
                );
                Ok(json!({
                    "queued": true,
                    "review_id": format!("REV-{}", Utc::now().format("%Y%m%d-%H%M%S")),
                    "prescription_id": args.prescription_id,
                    "priority": args.priority.as_str(),
                    "estimated_review_time": "15-30 minutes",
                }))
            },
        ))
}

pub struct PrescriptionValidationAgent {
    core: AgentCore,
    documents: Arc<dyn DocumentReader>,
}

impl PrescriptionValidationAgent {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        settings: &Settings,
        documents: Arc<dyn DocumentReader>,
    ) -> Self {
        let core = AgentCore::new(AGENT_ID, PRESCRIPTION_VALIDATION_PROMPT, llm, &settings.llm)
            .with_description("Validate uploaded prescriptions")
            .with_temperature(0.3)
            .with_max_tool_rounds(settings.agents.max_tool_rounds)
            .with_tools(validation_tools(documents.clone()));

        Self { core, documents }
    }
}

#[async_trait]
impl Agent for PrescriptionValidationAgent {
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
        let Some(file_url) = request
            .payload_str("prescription_file")
            .filter(|f| !f.trim().is_empty())
        else {
            return AgentResponse::failure(ErrorCode::MissingFile, "No prescription file provided");
        };
        let file_type = request.payload_str("file_type").unwrap_or("image");

        let extracted = match self.documents.extract_text(file_url, file_type).await {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::warn!("[{}] Text extraction failed: {}", AGENT_ID, e);
                return AgentResponse::failure(
                    ErrorCode::OcrError,
                    "Failed to extract text from prescription",
                )
                .with_data_field("ocr_error", json!(e.to_string()));
            }
        };

        let messages = vec![
            self.core.system_message(None),
            ChatMessage::user(format!(
                "Extracted text from prescription:\n\n{}\n\nParse and validate this prescription.",
                extracted.text
            )),
        ];
        let reply = self
            .core
            .run_tool_loop(messages, Some(ResponseFormat::JsonObject))
            .await;

        if !reply.success {
            return AgentResponse::failure(ErrorCode::ParsingError, "Failed to parse prescription")
                .with_data_field("llm_error", json!(reply.error_message()))
                .with_usage(reply.usage);
        }

        let Some(mut result) = reply.json_object() else {
            return AgentResponse::failure(
                ErrorCode::InvalidResponse,
                "Invalid validation response format",
            )
            .with_usage(reply.usage);
        };

        let needs_review = apply_post_checks(&mut result, Utc::now().date_naive());
        let confidence = result
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.5);

        if needs_review {
            tracing::info!("[{}] Prescription requires pharmacist review", AGENT_ID);
        }

        AgentResponse::success(result)
            .with_confidence(confidence)
            .with_escalation(needs_review)
            .with_usage(reply.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use chrono::Duration;

    fn parsed(issue_date: Value, medicines: Value, confidence: f64) -> Payload {
        json!({
            "validation_status": "valid",
            "confidence": confidence,
            "extracted_data": {
                "patient_name": "Jane Doe",
                "issue_date": issue_date,
                "medicines": medicines,
            },
            "flags": [],
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn flags(result: &Payload) -> Vec<&str> {
        result["flags"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect()
    }

    #[test]
    fn test_controlled_schedule_lookup() {
        assert_eq!(controlled_schedule("Adderall XR 20mg"), Some("II"));
        assert_eq!(controlled_schedule("xanax"), Some("IV"));
        assert_eq!(controlled_schedule("Amoxicillin"), None);
    }

    #[test]
    fn test_npi_checksum() {
        assert!(npi_checksum_valid("1234567893"));
        assert!(!npi_checksum_valid("1234567890"));
        assert!(!npi_checksum_valid("12345"));
    }

    #[test]
    fn test_fresh_prescription_passes() {
        let date = (today() - Duration::days(5)).format("%Y-%m-%d").to_string();
        let mut result = parsed(json!(date), json!([{"name": "Amoxicillin"}]), 0.95);
        let needs_review = apply_post_checks(&mut result, today());

        assert!(!needs_review);
        assert!(flags(&result).is_empty());
        assert_eq!(result["validation_status"], "valid");
        assert_eq!(result["controlled_substances_found"], json!([]));
    }

    #[test]
    fn test_old_prescriptions_are_flagged() {
        let stale = (today() - Duration::days(45)).format("%Y-%m-%d").to_string();
        let mut result = parsed(json!(stale), json!([]), 0.9);
        apply_post_checks(&mut result, today());
        assert_eq!(flags(&result), vec!["prescription_over_30_days_old"]);
        assert_eq!(result["validation_status"], "valid");

        let expired = (today() - Duration::days(200)).format("%Y-%m-%d").to_string();
        let mut result = parsed(json!(expired), json!([]), 0.9);
        apply_post_checks(&mut result, today());
        assert_eq!(flags(&result), vec!["prescription_over_6_months_old"]);
        assert_eq!(result["validation_status"], "invalid");
    }

    #[test]
    fn test_bad_dates_and_controlled_substances() {
        let mut result = parsed(json!("15/02/2024"), json!([{"name": "Oxycontin 10mg"}]), 0.9);
        let needs_review = apply_post_checks(&mut result, today());

        assert!(needs_review);
        assert_eq!(
            flags(&result),
            vec!["invalid_issue_date", "controlled_substance_II"]
        );
        assert_eq!(result["controlled_substances_found"], json!(["Oxycontin 10mg"]));
        assert_eq!(result["requires_pharmacist_review"], true);
    }

    #[test]
    fn test_low_confidence_and_suspicious_format_need_review() {
        let mut result = parsed(Value::Null, json!([]), 0.6);
        assert!(apply_post_checks(&mut result, today()));

        let mut result = parsed(Value::Null, json!([]), 0.99);
        result.insert("flags".to_string(), json!(["suspicious_format"]));
        assert!(apply_post_checks(&mut result, today()));

        let mut result = parsed(Value::Null, json!([]), 0.99);
        result.insert("validation_status".to_string(), json!("needs_review"));
        assert!(apply_post_checks(&mut result, today()));
    }

    #[tokio::test]
    async fn test_npi_tool() {
        let tools = validation_tools(Arc::new(crate::services::SampleDocumentReader));
        let tool = tools.get("validate_doctor_npi").unwrap();
        let bad = tool.execute(json!({"npi": "12ab"})).await.unwrap();
        assert_eq!(bad["valid"], false);
        let good = tool.execute(json!({"npi": "1234567893"})).await.unwrap();
        assert_eq!(good["checksum_valid"], true);
    }
}
