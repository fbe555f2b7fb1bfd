//! AI document extraction
//!
//! This module owns the structured-output contract between unstructured
//! document content and budget data:
//! - The typed `ExtractionResult` shape the model must produce
//! - Response cleanup (markdown code fences) and strict validation
//! - The HTTP client for the extraction model backend

mod client;
mod prompt;

pub use client::*;
pub use prompt::*;

use crate::db::{BudgetCategory, DocumentType, ExtractionSummary, NewLineItem};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Document classification the model may return. Deliberately excludes
/// `email`: that type is reserved for ingested email bodies and is never a
/// valid extraction outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractedDocumentType {
    Invoice,
    Quote,
    Estimate,
    ChangeOrder,
    Receipt,
    Other,
}

impl From<ExtractedDocumentType> for DocumentType {
    fn from(t: ExtractedDocumentType) -> Self {
        match t {
            ExtractedDocumentType::Invoice => DocumentType::Invoice,
            ExtractedDocumentType::Quote => DocumentType::Quote,
            ExtractedDocumentType::Estimate => DocumentType::Estimate,
            ExtractedDocumentType::ChangeOrder => DocumentType::ChangeOrder,
            ExtractedDocumentType::Receipt => DocumentType::Receipt,
            ExtractedDocumentType::Other => DocumentType::Other,
        }
    }
}

/// One extracted line item. `total` is always present even when
/// quantity/unit_price are not; the model may only see an aggregate amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedLineItem {
    pub description: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    pub total: f64,
    pub category: BudgetCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    #[serde(default)]
    pub number: Option<String>,
    /// YYYY-MM-DD
    pub date: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub po_number: Option<String>,
    #[serde(default)]
    pub valid_until: Option<String>,
    #[serde(default)]
    pub project_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Totals {
    #[serde(default)]
    pub subtotal: Option<f64>,
    #[serde(default)]
    pub tax: Option<f64>,
    pub total: f64,
    #[serde(default)]
    pub contingency: Option<f64>,
}

/// The full structured-extraction contract. Persisted verbatim as the
/// document's raw extraction and replayed to the reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document_type: ExtractedDocumentType,
    pub confidence: f64,
    pub vendor: Vendor,
    pub document_info: DocumentInfo,
    pub line_items: Vec<ExtractedLineItem>,
    pub totals: Totals,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ExtractionResult {
    /// Validate constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::ExtractionParse(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Denormalized summary fields for the document row
    pub fn summary(&self) -> ExtractionSummary {
        ExtractionSummary {
            document_type: Some(self.document_type.into()),
            vendor_name: Some(self.vendor.name.clone()),
            document_number: self.document_info.number.clone(),
            document_date: Some(self.document_info.date.clone()),
            due_date: self.document_info.due_date.clone(),
            total_amount: Some(self.totals.total),
        }
    }

    /// Line items in store-insert form, extraction order preserved
    pub fn new_line_items(&self) -> Vec<NewLineItem> {
        self.line_items
            .iter()
            .enumerate()
            .map(|(index, item)| NewLineItem {
                description: item.description.clone(),
                quantity: item.quantity,
                unit: item.unit.clone(),
                unit_price: item.unit_price,
                total: item.total,
                category: Some(item.category),
                cost_code: None,
                sort_order: Some(index as i64),
            })
            .collect()
    }
}

/// Strip an optional markdown code-fence wrapper from a model response
pub fn strip_code_fences(text: &str) -> &str {
    let mut t = text.trim();
    if let Some(rest) = t.strip_prefix("```json") {
        t = rest;
    }
    if let Some(rest) = t.strip_prefix("```") {
        t = rest;
    }
    if let Some(rest) = t.strip_suffix("```") {
        t = rest;
    }
    t.trim()
}

/// Parse and validate a raw model response into an `ExtractionResult`.
///
/// Every failure is `Error::ExtractionParse`; callers keep the raw text for
/// telemetry.
pub fn parse_extraction(text: &str) -> Result<ExtractionResult> {
    let cleaned = strip_code_fences(text);
    let result: ExtractionResult =
        serde_json::from_str(cleaned).map_err(|e| Error::ExtractionParse(e.to_string()))?;
    result.validate()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "document_type": "invoice",
            "confidence": 0.92,
            "vendor": {"name": "BuildCo Supply", "phone": "555-0100"},
            "document_info": {"number": "INV-1042", "date": "2024-03-15", "due_date": "2024-04-14"},
            "line_items": [
                {"description": "Framing lumber", "quantity": 120.0, "unit": "each", "unit_price": 8.5, "total": 1020.0, "category": "Materials"},
                {"description": "Delivery fee", "total": 75.0, "category": "Other"}
            ],
            "totals": {"subtotal": 1095.0, "tax": 87.6, "total": 1182.6},
            "notes": "Net 30"
        }"#
    }

    #[test]
    fn test_parse_valid_extraction() {
        let result = parse_extraction(sample_json()).unwrap();
        assert_eq!(result.document_type, ExtractedDocumentType::Invoice);
        assert_eq!(result.line_items.len(), 2);
        assert_eq!(result.line_items[1].total, 75.0);
        assert!(result.line_items[1].quantity.is_none());
        assert_eq!(result.totals.total, 1182.6);
    }

    #[test]
    fn test_fenced_response_parses_identically() {
        let plain = parse_extraction(sample_json()).unwrap();
        let fenced = format!("```json\n{}\n```", sample_json());
        let from_fenced = parse_extraction(&fenced).unwrap();
        assert_eq!(
            serde_json::to_value(&plain).unwrap(),
            serde_json::to_value(&from_fenced).unwrap()
        );

        let bare_fence = format!("```\n{}\n```", sample_json());
        let from_bare = parse_extraction(&bare_fence).unwrap();
        assert_eq!(
            serde_json::to_value(&plain).unwrap(),
            serde_json::to_value(&from_bare).unwrap()
        );
    }

    #[test]
    fn test_unknown_document_type_fails() {
        let json = sample_json().replace("\"invoice\"", "\"purchase_order\"");
        assert!(matches!(
            parse_extraction(&json),
            Err(Error::ExtractionParse(_))
        ));
    }

    #[test]
    fn test_email_is_not_an_extraction_type() {
        let json = sample_json().replace("\"invoice\"", "\"email\"");
        assert!(parse_extraction(&json).is_err());
    }

    #[test]
    fn test_unknown_category_fails() {
        let json = sample_json().replace("\"Materials\"", "\"Lumber\"");
        assert!(parse_extraction(&json).is_err());
    }

    #[test]
    fn test_confidence_out_of_range_fails() {
        let json = sample_json().replace("0.92", "1.5");
        assert!(matches!(
            parse_extraction(&json),
            Err(Error::ExtractionParse(_))
        ));
    }

    #[test]
    fn test_missing_line_item_total_fails() {
        let json = sample_json().replace("\"total\": 75.0, ", "");
        assert!(parse_extraction(&json).is_err());
    }

    #[test]
    fn test_non_json_fails() {
        assert!(matches!(
            parse_extraction("I could not read this document."),
            Err(Error::ExtractionParse(_))
        ));
    }

    #[test]
    fn test_summary_fields() {
        let result = parse_extraction(sample_json()).unwrap();
        let summary = result.summary();
        assert_eq!(summary.vendor_name.as_deref(), Some("BuildCo Supply"));
        assert_eq!(summary.document_number.as_deref(), Some("INV-1042"));
        assert_eq!(summary.document_date.as_deref(), Some("2024-03-15"));
        assert_eq!(summary.total_amount, Some(1182.6));

        let items = result.new_line_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].sort_order, Some(0));
        assert_eq!(items[1].sort_order, Some(1));
    }
}
