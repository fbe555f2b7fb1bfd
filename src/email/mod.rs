//! Inbound email handling
//!
//! Email transport and MIME decoding belong to the mail providers; this
//! module owns the normalized shape they all reduce to, the JSON webhook
//! adapter, and the heuristics that decide which attachments look like
//! financial documents.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// A provider-independent inbound email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub html_body: Option<String>,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<ParsedAttachment>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// A decoded attachment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedAttachment {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// The inbound-webhook provider payload (JSON POST per message)
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEmail {
    #[serde(rename = "FromFull")]
    pub from_full: Option<WebhookAddress>,
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "ToFull", default)]
    pub to_full: Vec<WebhookAddress>,
    #[serde(rename = "To")]
    pub to: Option<String>,
    #[serde(rename = "Subject")]
    pub subject: Option<String>,
    #[serde(rename = "TextBody")]
    pub text_body: Option<String>,
    #[serde(rename = "HtmlBody")]
    pub html_body: Option<String>,
    #[serde(rename = "Date")]
    pub date: Option<String>,
    #[serde(rename = "Attachments", default)]
    pub attachments: Vec<WebhookAttachment>,
    #[serde(rename = "Headers", default)]
    pub headers: Vec<WebhookHeader>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookAddress {
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Name", default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookAttachment {
    #[serde(rename = "Name")]
    pub name: String,
    /// Base64-encoded content
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "ContentType")]
    pub content_type: String,
    #[serde(rename = "ContentLength")]
    pub content_length: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookHeader {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// Normalize a webhook payload. Attachments that fail base64 decoding are
/// dropped rather than failing the whole message.
pub fn parse_webhook_email(data: WebhookEmail) -> ParsedEmail {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let from = data
        .from_full
        .map(|f| f.email)
        .or(data.from)
        .unwrap_or_default();
    let to = data
        .to_full
        .first()
        .map(|t| t.email.clone())
        .or(data.to)
        .unwrap_or_default();
    let subject = data
        .subject
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "(No Subject)".to_string());

    let received_at = data
        .date
        .as_deref()
        .and_then(parse_email_date)
        .unwrap_or_else(Utc::now);

    let attachments = data
        .attachments
        .into_iter()
        .filter_map(|att| {
            let content = STANDARD.decode(att.content.as_bytes()).ok()?;
            Some(ParsedAttachment {
                filename: att.name,
                content_type: att.content_type,
                size: att.content_length,
                content,
            })
        })
        .collect();

    let headers = data
        .headers
        .into_iter()
        .map(|h| (h.name, h.value))
        .collect();

    ParsedEmail {
        from,
        to,
        subject,
        body: data.text_body.unwrap_or_default(),
        html_body: data.html_body,
        received_at,
        attachments,
        headers,
    }
}

fn parse_email_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Render the normalized email as a plain RFC 822-style document for storage
pub fn render_email_file(email: &ParsedEmail) -> String {
    format!(
        "From: {}\nTo: {}\nSubject: {}\nDate: {}\n\n{}",
        email.from,
        email.to,
        email.subject,
        email.received_at.to_rfc3339(),
        email.body
    )
}

/// Decide whether an attachment is likely a financial document
pub fn is_financial_document(filename: &str, content_type: &str) -> bool {
    const FINANCIAL_EXTENSIONS: [&str; 6] = [".pdf", ".xlsx", ".xls", ".csv", ".doc", ".docx"];
    const FINANCIAL_KEYWORDS: [&str; 9] = [
        "invoice",
        "quote",
        "estimate",
        "receipt",
        "bill",
        "statement",
        "po",
        "purchase",
        "order",
    ];

    let lower_filename = filename.to_lowercase();

    let has_financial_ext = FINANCIAL_EXTENSIONS
        .iter()
        .any(|ext| lower_filename.ends_with(ext));
    let has_financial_keyword = FINANCIAL_KEYWORDS
        .iter()
        .any(|keyword| lower_filename.contains(keyword));

    // PDFs and spreadsheets are commonly financial documents
    let is_common_doc_type = content_type.contains("pdf")
        || content_type.contains("spreadsheet")
        || content_type.contains("excel");

    has_financial_ext || has_financial_keyword || is_common_doc_type
}

/// A currency amount spotted in an email body with its surrounding text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountMention {
    pub value: f64,
    pub context: String,
}

/// Financial signals scraped from an email body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinancialContext {
    pub amounts: Vec<AmountMention>,
    pub dates: Vec<String>,
    pub references: Vec<String>,
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\$[\d,]+\.?\d*|\b(?:USD|CAD|EUR)\s*[\d,]+\.?\d*").unwrap()
    })
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4}|\d{4}[/\-]\d{1,2}[/\-]\d{1,2}|(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4})",
        )
        .unwrap()
    })
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:Invoice|INV|Quote|QT|PO|Purchase Order|Estimate|EST)[#:\s]*[\w\-]+")
            .unwrap()
    })
}

/// Scan an email body for amounts (with surrounding context), dates, and
/// invoice/quote/PO references
pub fn extract_financial_context(body: &str) -> FinancialContext {
    let mut context = FinancialContext::default();

    for m in amount_re().find_iter(body) {
        let value_str: String = m
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let Ok(value) = value_str.parse::<f64>() else {
            continue;
        };
        if value <= 0.0 {
            continue;
        }

        // Surrounding context: up to 50 bytes either side, on char boundaries
        let start = m.start().saturating_sub(50);
        let start = (0..=start).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
        let end = (m.end() + 50).min(body.len());
        let end = (end..=body.len()).find(|&i| body.is_char_boundary(i)).unwrap_or(body.len());
        context.amounts.push(AmountMention {
            value,
            context: body[start..end].trim().to_string(),
        });
    }

    for m in date_re().find_iter(body) {
        context.dates.push(m.as_str().to_string());
    }

    for m in reference_re().find_iter(body) {
        context.references.push(m.as_str().to_string());
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    #[test]
    fn test_parse_webhook_email() {
        let payload = serde_json::json!({
            "FromFull": {"Email": "billing@buildco.com", "Name": "BuildCo Billing"},
            "ToFull": [{"Email": "a1b2c3d4e5f6@ingest.profitiq.app", "Name": ""}],
            "Subject": "Invoice INV-1042",
            "TextBody": "Please find attached invoice for $1,182.60 due 04/14/2024.",
            "Date": "Fri, 15 Mar 2024 10:30:00 +0000",
            "Attachments": [{
                "Name": "invoice-1042.pdf",
                "Content": STANDARD.encode(b"%PDF-1.4 fake"),
                "ContentType": "application/pdf",
                "ContentLength": 13
            }],
            "Headers": [{"Name": "Message-ID", "Value": "<abc@buildco.com>"}]
        });

        let webhook: WebhookEmail = serde_json::from_value(payload).unwrap();
        let email = parse_webhook_email(webhook);

        assert_eq!(email.from, "billing@buildco.com");
        assert_eq!(email.to, "a1b2c3d4e5f6@ingest.profitiq.app");
        assert_eq!(email.subject, "Invoice INV-1042");
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].content, b"%PDF-1.4 fake");
        assert_eq!(email.headers.get("Message-ID").unwrap(), "<abc@buildco.com>");
    }

    #[test]
    fn test_webhook_defaults() {
        let webhook: WebhookEmail =
            serde_json::from_value(serde_json::json!({"From": "x@y.com"})).unwrap();
        let email = parse_webhook_email(webhook);
        assert_eq!(email.from, "x@y.com");
        assert_eq!(email.subject, "(No Subject)");
        assert!(email.attachments.is_empty());
    }

    #[test]
    fn test_is_financial_document() {
        assert!(is_financial_document("invoice-march.pdf", "application/pdf"));
        assert!(is_financial_document("quote_final.docx", "application/msword"));
        assert!(is_financial_document(
            "site-costs",
            "application/vnd.ms-excel"
        ));
        assert!(!is_financial_document("team-photo.jpg", "image/jpeg"));
    }

    #[test]
    fn test_extract_financial_context() {
        let body = "Hi, invoice INV-1042 for $1,182.60 is due on 04/14/2024. \
                    Reference PO 7741 for the framing package.";
        let context = extract_financial_context(body);

        assert_eq!(context.amounts.len(), 1);
        assert_eq!(context.amounts[0].value, 1182.60);
        assert!(context.amounts[0].context.contains("INV-1042"));
        assert_eq!(context.dates, vec!["04/14/2024"]);
        assert!(context.references.iter().any(|r| r.contains("INV-1042")));
        assert!(context.references.iter().any(|r| r.starts_with("PO")));
    }

    #[test]
    fn test_render_email_file() {
        let email = ParsedEmail {
            from: "a@b.com".to_string(),
            to: "c@d.com".to_string(),
            subject: "Quote".to_string(),
            body: "See attached.".to_string(),
            html_body: None,
            received_at: Utc::now(),
            attachments: vec![],
            headers: HashMap::new(),
        };
        let rendered = render_email_file(&email);
        assert!(rendered.starts_with("From: a@b.com\n"));
        assert!(rendered.ends_with("See attached."));
    }
}
