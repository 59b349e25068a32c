//! Medicine catalog and keyword search

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub generic_name: String,
    pub description: String,
    pub price: f64,
    pub in_stock: bool,
    pub prescription_required: bool,
    pub category: String,
    pub active_ingredient: String,
    pub warnings: Vec<String>,
    pub dosage_instructions: String,
    pub side_effects: Vec<String>,
    pub contraindications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub in_stock_only: bool,
    #[serde(default)]
    pub otc_only: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    10
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            category: None,
            in_stock_only: true,
            otc_only: false,
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub medicine: Medicine,
    pub confidence_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub results: Vec<SearchHit>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionReport {
    pub has_interactions: bool,
    /// Medicine id → warning
    pub warnings: BTreeMap<String, String>,
    pub recommendation: String,
}

/// Read-only medicine reference data.
pub trait MedicineCatalog: Send + Sync {
    fn medicines(&self) -> &[Medicine];

    /// Known interacting pairs; the warning is attached to the first id.
    fn interaction_pairs(&self) -> &[(String, String, String)];

    fn get(&self, id: &str) -> Option<&Medicine> {
        self.medicines().iter().find(|m| m.id == id)
    }

    fn find_by_sku(&self, sku: &str) -> Option<&Medicine> {
        self.medicines().iter().find(|m| m.sku.eq_ignore_ascii_case(sku))
    }

    /// Keyword scoring: name +10, generic name +8, category +5,
    /// description +3, exact category filter +5. Confidence is score / 20.
    fn search(&self, query: &SearchQuery) -> SearchResults {
        let needle = query.query.to_lowercase();
        let mut hits: Vec<SearchHit> = Vec::new();

        for medicine in self.medicines() {
            if query.in_stock_only && !medicine.in_stock {
                continue;
            }
            if query.otc_only && medicine.prescription_required {
                continue;
            }

            let mut score = 0u32;
            if medicine.name.to_lowercase().contains(&needle) {
                score += 10;
            }
            if medicine.generic_name.to_lowercase().contains(&needle) {
                score += 8;
            }
            if medicine.category.to_lowercase().contains(&needle) {
                score += 5;
            }
            if medicine.description.to_lowercase().contains(&needle) {
                score += 3;
            }
            if query.category.as_deref() == Some(medicine.category.as_str()) {
                score += 5;
            }

            if score > 0 {
                hits.push(SearchHit {
                    medicine: medicine.clone(),
                    confidence_score: (f64::from(score) / 20.0).min(1.0),
                    interaction_warning: None,
                });
            }
        }

        hits.sort_by(|a, b| b.confidence_score.total_cmp(&a.confidence_score));
        let total = hits.len();
        hits.truncate(query.limit);
        SearchResults {
            results: hits,
            total,
        }
    }

    fn check_interactions(&self, medicine_ids: &[String]) -> InteractionReport {
        let mut warnings = BTreeMap::new();
        for (first, second, warning) in self.interaction_pairs() {
            if medicine_ids.contains(first) && medicine_ids.contains(second) {
                warnings.insert(first.clone(), warning.clone());
            }
        }

        let has_interactions = !warnings.is_empty();
        InteractionReport {
            has_interactions,
            warnings,
            recommendation: if has_interactions {
                "Consult your pharmacist".to_string()
            } else {
                "No known interactions".to_string()
            },
        }
    }

    /// Cheaper-first alternatives sharing the generic name, or the category
    /// when `same_generic` is false.
    fn alternatives(&self, medicine_id: &str, same_generic: bool) -> Vec<&Medicine> {
        let Some(base) = self.get(medicine_id) else {
            return Vec::new();
        };

        let mut alternatives: Vec<&Medicine> = self
            .medicines()
            .iter()
            .filter(|m| m.id != base.id)
            .filter(|m| {
                if same_generic {
                    m.generic_name.eq_ignore_ascii_case(&base.generic_name)
                } else {
                    m.category == base.category
                }
            })
            .collect();
        alternatives.sort_by(|a, b| a.price.total_cmp(&b.price));
        alternatives
    }
}

/// Five-item demonstration catalog.
pub struct SampleCatalog {
    medicines: Vec<Medicine>,
    interactions: Vec<(String, String, String)>,
}

impl SampleCatalog {
    pub fn new() -> Self {
        Self {
            medicines: sample_medicines(),
            interactions: vec![(
                "med-001".to_string(),
                "med-002".to_string(),
                "Taking with other NSAIDs may increase stomach bleeding risk".to_string(),
            )],
        }
    }
}

impl Default for SampleCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MedicineCatalog for SampleCatalog {
    fn medicines(&self) -> &[Medicine] {
        &self.medicines
    }

    fn interaction_pairs(&self) -> &[(String, String, String)] {
        &self.interactions
    }
}

#[allow(clippy::too_many_arguments)]
fn medicine(
    id: &str,
    sku: &str,
    name: &str,
    generic_name: &str,
    description: &str,
    price: f64,
    prescription_required: bool,
    category: &str,
    active_ingredient: &str,
    warnings: &[&str],
    dosage_instructions: &str,
    side_effects: &[&str],
    contraindications: &[&str],
) -> Medicine {
    let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
    Medicine {
        id: id.to_string(),
        sku: sku.to_string(),
        name: name.to_string(),
        generic_name: generic_name.to_string(),
        description: description.to_string(),
        price,
        in_stock: true,
        prescription_required,
        category: category.to_string(),
        active_ingredient: active_ingredient.to_string(),
        warnings: owned(warnings),
        dosage_instructions: dosage_instructions.to_string(),
        side_effects: owned(side_effects),
        contraindications: owned(contraindications),
    }
}

fn sample_medicines() -> Vec<Medicine> {
    vec![
        medicine(
            "med-001",
            "SKU001",
            "Advil Pain Reliever",
            "Ibuprofen",
            "Pain reliever and fever reducer",
            12.99,
            false,
            "Pain Relief",
            "Ibuprofen 200mg",
            &["May cause stomach upset", "Avoid if allergic to NSAIDs"],
            "Take 1-2 tablets every 4-6 hours as needed",
            &["Stomach upset", "Heartburn", "Dizziness"],
            &["Pregnancy (3rd trimester)", "Stomach ulcers", "Kidney disease"],
        ),
        medicine(
            "med-002",
            "SKU002",
            "Tylenol Extra Strength",
            "Acetaminophen",
            "Fast pain relief",
            9.99,
            false,
            "Pain Relief",
            "Acetaminophen 500mg",
            &["Do not exceed 3000mg per day", "Avoid alcohol"],
            "Take 2 caplets every 6 hours as needed",
            &["Nausea", "Rash"],
            &["Liver disease"],
        ),
        medicine(
            "med-003",
            "SKU003",
            "Claritin Allergy Relief",
            "Loratadine",
            "24-hour allergy relief",
            19.99,
            false,
            "Allergy",
            "Loratadine 10mg",
            &["May cause drowsiness in some people"],
            "Take 1 tablet daily",
            &["Headache", "Dry mouth"],
            &["Severe liver impairment"],
        ),
        medicine(
            "med-004",
            "SKU004",
            "Zyrtec Allergy Tablets",
            "Cetirizine",
            "Allergy symptom relief",
            21.99,
            false,
            "Allergy",
            "Cetirizine 10mg",
            &["May cause drowsiness"],
            "Take 1 tablet daily",
            &["Drowsiness", "Fatigue"],
            &["Kidney disease"],
        ),
        medicine(
            "med-005",
            "SKU005",
            "Amoxicillin 500mg",
            "Amoxicillin",
            "Antibiotic for bacterial infections",
            15.99,
            true,
            "Prescription Medications",
            "Amoxicillin 500mg",
            &["Complete full course", "May cause diarrhea"],
            "Take as prescribed by your doctor",
            &["Diarrhea", "Nausea"],
            &["Penicillin allergy"],
        ),
    ]
}
