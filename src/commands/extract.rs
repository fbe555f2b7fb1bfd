//! Document extraction command
//!
//! Drives a document through the extraction lifecycle: flip to processing,
//! fetch the stored bytes, invoke the model, parse and validate the response,
//! then persist either the extracted payload or the failure. Telemetry is
//! recorded for every model invocation, success or not, and a telemetry
//! failure never aborts the extraction itself.
//!
//! There is no automatic retry anywhere in this path: a failed document stays
//! failed until a reviewer re-runs extraction explicitly. Concurrent extract
//! calls on one document are tolerated, not excluded; the second writer
//! simply overwrites equivalent data.

use super::authorize_document;
use crate::blob::BlobStore;
use crate::config::Config;
use crate::db::{
    record_prompt_execution_best_effort, Db, Document, DocumentStatus, PromptExecution,
};
use crate::error::{Error, Result};
use crate::extract::{
    parse_extraction, ExtractionResult, ModelClient, TokenUsage, EXTRACTION_SYSTEM_PROMPT,
    EXTRACTION_USER_PROMPT,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};

/// Result of a successful extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOutcome {
    pub document: Document,
    pub extraction: ExtractionResult,
}

/// Run extraction on a document.
///
/// Legal only from pending, failed, or rejected status; a confirmed document
/// must be rejected before its extraction can be re-run.
pub async fn cmd_extract_document(
    config: &Config,
    db: &Db,
    blob: &dyn BlobStore,
    model: &dyn ModelClient,
    actor: &str,
    document_id: &str,
) -> Result<ExtractOutcome> {
    let (document, project) = authorize_document(db, document_id, actor).await?;

    document
        .get_status()?
        .transition(DocumentStatus::Processing)?;

    // Written before the model call so a concurrent request observes
    // processing rather than pending. Advisory only; see module docs.
    db.set_document_status(&document.id, DocumentStatus::Processing)
        .await?;

    let started = Instant::now();
    let telemetry = TelemetryContext {
        config,
        db,
        project_id: &project.id,
        document_id: &document.id,
    };

    let bytes = match blob.fetch(&document.file_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Extraction fetch failed for {}: {}", document.id, e);
            db.set_document_status(&document.id, DocumentStatus::Failed)
                .await?;
            telemetry
                .record_failure(started, None, None, &e.to_string())
                .await;
            return Err(e);
        }
    };

    let mime_type = document
        .mime_type
        .clone()
        .unwrap_or_else(|| "application/pdf".to_string());

    let output = match model
        .generate(
            EXTRACTION_SYSTEM_PROMPT,
            EXTRACTION_USER_PROMPT,
            &bytes,
            &mime_type,
        )
        .await
    {
        Ok(output) => output,
        Err(e) => {
            error!("Model invocation failed for {}: {}", document.id, e);
            db.set_document_status(&document.id, DocumentStatus::Failed)
                .await?;
            telemetry
                .record_failure(started, None, None, &e.to_string())
                .await;
            return Err(e);
        }
    };

    let extraction = match parse_extraction(&output.text) {
        Ok(extraction) => extraction,
        Err(e) => {
            error!("Failed to parse extraction for {}: {}", document.id, e);
            telemetry
                .record_failure(started, Some(&output.text), Some(&output.usage), "parse_failed")
                .await;
            db.set_document_status(&document.id, DocumentStatus::Failed)
                .await?;
            return Err(e);
        }
    };

    telemetry
        .record_success(started, &output.text, &output.usage, &extraction)
        .await;

    let raw_extraction = serde_json::to_string(&extraction)?;
    db.store_extraction(&document.id, &raw_extraction, &extraction.summary())
        .await?;

    info!(
        "Extracted {} line items from document {} (confidence {:.2})",
        extraction.line_items.len(),
        document.id,
        extraction.confidence
    );

    let document = db
        .get_document(&document.id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document.id.clone()))?;

    Ok(ExtractOutcome {
        document,
        extraction,
    })
}

/// Per-run telemetry context; all writes are fire-and-forget
struct TelemetryContext<'a> {
    config: &'a Config,
    db: &'a Db,
    project_id: &'a str,
    document_id: &'a str,
}

impl TelemetryContext<'_> {
    fn base(&self, started: Instant) -> PromptExecution {
        let mut execution = PromptExecution::new(self.config.model.prompt_id.clone());
        execution.project_id = Some(self.project_id.to_string());
        execution.document_id = Some(self.document_id.to_string());
        execution.latency_ms = Some(started.elapsed().as_millis() as i64);
        execution
    }

    async fn record_failure(
        &self,
        started: Instant,
        raw_response: Option<&str>,
        usage: Option<&TokenUsage>,
        error_kind: &str,
    ) {
        let mut execution = self.base(started);
        execution.raw_response = raw_response.map(str::to_string);
        if let Some(usage) = usage {
            execution.input_tokens = usage.prompt_tokens;
            execution.output_tokens = usage.completion_tokens;
        }
        execution.metadata = serde_json::json!({ "error": error_kind }).to_string();
        record_prompt_execution_best_effort(self.db, &execution).await;
    }

    async fn record_success(
        &self,
        started: Instant,
        raw_response: &str,
        usage: &TokenUsage,
        extraction: &ExtractionResult,
    ) {
        let mut execution = self.base(started);
        execution.raw_response = Some(raw_response.to_string());
        execution.input_tokens = usage.prompt_tokens;
        execution.output_tokens = usage.completion_tokens;
        execution.parsed_response = serde_json::to_string(extraction).ok();
        execution.metadata = serde_json::json!({
            "confidence": extraction.confidence,
            "documentType": extraction.document_type,
            "lineItemCount": extraction.line_items.len(),
        })
        .to_string();
        record_prompt_execution_best_effort(self.db, &execution).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::setup_env;
    use crate::extract::GenerateOutput;
    use async_trait::async_trait;

    /// Canned model backend for pipeline tests
    struct MockModelClient {
        response: std::sync::Mutex<Option<Result<GenerateOutput>>>,
    }

    impl MockModelClient {
        fn with_text(text: &str) -> Self {
            Self {
                response: std::sync::Mutex::new(Some(Ok(GenerateOutput {
                    text: text.to_string(),
                    usage: TokenUsage {
                        prompt_tokens: Some(1500),
                        completion_tokens: Some(300),
                    },
                }))),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                response: std::sync::Mutex::new(Some(Err(Error::Model(message.to_string())))),
            }
        }
    }

    #[async_trait]
    impl ModelClient for MockModelClient {
        async fn generate(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _file_bytes: &[u8],
            _mime_type: &str,
        ) -> Result<GenerateOutput> {
            self.response
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(Error::Model("mock exhausted".to_string())))
        }
    }

    fn valid_extraction_text() -> String {
        r#"```json
        {
            "document_type": "invoice",
            "confidence": 0.9,
            "vendor": {"name": "BuildCo Supply"},
            "document_info": {"number": "INV-7", "date": "2024-03-15"},
            "line_items": [
                {"description": "Lumber", "total": 1500.0, "category": "Materials"}
            ],
            "totals": {"total": 1500.0}
        }
        ```"#
            .to_string()
    }

    #[tokio::test]
    async fn test_extract_success_path() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Extract Job").await;
        let document = env.insert_pending_document(&project, b"%PDF-1.4").await;

        let model = MockModelClient::with_text(&valid_extraction_text());
        let outcome = cmd_extract_document(
            &env.config,
            &env.db,
            &env.blob,
            &model,
            "alice",
            &document.id,
        )
        .await
        .unwrap();

        assert_eq!(outcome.document.status, "extracted");
        assert_eq!(outcome.document.vendor_name.as_deref(), Some("BuildCo Supply"));
        assert_eq!(outcome.document.document_type.as_deref(), Some("invoice"));
        assert_eq!(outcome.document.total_amount, Some(1500.0));
        assert!(outcome.document.raw_extraction.is_some());
        assert_eq!(outcome.extraction.line_items.len(), 1);

        assert_eq!(
            env.db.count_prompt_executions(&document.id).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_extract_parse_failure_marks_failed_and_logs() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Extract Job").await;
        let document = env.insert_pending_document(&project, b"%PDF-1.4").await;

        let model = MockModelClient::with_text("Sorry, I cannot read this document.");
        let err = cmd_extract_document(
            &env.config,
            &env.db,
            &env.blob,
            &model,
            "alice",
            &document.id,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ExtractionParse(_)));

        let failed = env.db.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(failed.status, "failed");
        assert!(failed.raw_extraction.is_none());

        let metadata = env
            .db
            .last_prompt_execution_metadata(&document.id)
            .await
            .unwrap()
            .unwrap();
        assert!(metadata.contains("parse_failed"));
    }

    #[tokio::test]
    async fn test_extract_model_failure_marks_failed() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Extract Job").await;
        let document = env.insert_pending_document(&project, b"%PDF-1.4").await;

        let model = MockModelClient::failing("backend unavailable");
        let err = cmd_extract_document(
            &env.config,
            &env.db,
            &env.blob,
            &model,
            "alice",
            &document.id,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Model(_)));

        let failed = env.db.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(failed.status, "failed");
        assert_eq!(
            env.db.count_prompt_executions(&document.id).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_extract_fetch_failure_marks_failed() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Extract Job").await;

        let document = Document::new(
            project.id.clone(),
            project.owner.clone(),
            "gone.pdf".to_string(),
            "documents/does-not-exist.pdf".to_string(),
        );
        env.db.insert_document(&document).await.unwrap();

        let model = MockModelClient::with_text(&valid_extraction_text());
        let err = cmd_extract_document(
            &env.config,
            &env.db,
            &env.blob,
            &model,
            "alice",
            &document.id,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::BlobFetch(_)));

        let failed = env.db.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(failed.status, "failed");
    }

    #[tokio::test]
    async fn test_extract_refused_for_confirmed_document() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Extract Job").await;
        let document = env.insert_pending_document(&project, b"%PDF-1.4").await;
        env.db
            .set_document_status(&document.id, DocumentStatus::Processing)
            .await
            .unwrap();
        env.db
            .store_extraction(&document.id, "{}", &Default::default())
            .await
            .unwrap();
        env.db
            .confirm_document_replace(
                &document,
                &Default::default(),
                &[crate::db::NewLineItem {
                    description: "Lumber".to_string(),
                    quantity: None,
                    unit: None,
                    unit_price: None,
                    total: 10.0,
                    category: None,
                    cost_code: None,
                    sort_order: None,
                }],
            )
            .await
            .unwrap();

        let model = MockModelClient::with_text(&valid_extraction_text());
        let err = cmd_extract_document(
            &env.config,
            &env.db,
            &env.blob,
            &model,
            "alice",
            &document.id,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let unchanged = env.db.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, "confirmed");
    }

    #[tokio::test]
    async fn test_extract_rejected_document_can_rerun() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Extract Job").await;
        let document = env.insert_pending_document(&project, b"%PDF-1.4").await;
        env.db
            .set_document_status(&document.id, DocumentStatus::Rejected)
            .await
            .unwrap();

        let model = MockModelClient::with_text(&valid_extraction_text());
        let outcome = cmd_extract_document(
            &env.config,
            &env.db,
            &env.blob,
            &model,
            "alice",
            &document.id,
        )
        .await
        .unwrap();
        assert_eq!(outcome.document.status, "extracted");
    }

    #[tokio::test]
    async fn test_extract_authorization_isolation() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Extract Job").await;
        let document = env.insert_pending_document(&project, b"%PDF-1.4").await;

        let model = MockModelClient::with_text(&valid_extraction_text());
        let err = cmd_extract_document(
            &env.config,
            &env.db,
            &env.blob,
            &model,
            "mallory",
            &document.id,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Forbidden));

        let unchanged = env.db.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, "pending");
    }
}
