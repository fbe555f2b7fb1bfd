//! Human review commands: confirm and reject
//!
//! Confirmation is the only path that creates line items, and it is
//! replace-all: whatever the reviewer submits becomes the document's entire
//! line-item set. Rejection is the mirror-image clear. Both are safe to
//! repeat.

use super::authorize_document;
use crate::db::{Db, Document, DocumentStatus, DocumentType, ExtractionSummary, NewLineItem};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// The reviewer-edited copy of an extraction, submitted for confirmation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub document_type: Option<DocumentType>,
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub document_number: Option<String>,
    #[serde(default)]
    pub document_date: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    pub line_items: Vec<NewLineItem>,
}

/// Confirm a document: commit the edited line items and summary fields.
///
/// Requires extracted status and a non-empty line-item list. Re-confirming
/// replaces the previous set rather than merging into it.
pub async fn cmd_confirm_document(
    db: &Db,
    actor: &str,
    document_id: &str,
    request: ConfirmRequest,
) -> Result<Document> {
    let (document, _project) = authorize_document(db, document_id, actor).await?;

    if document.get_status()? != DocumentStatus::Extracted {
        return Err(Error::Validation(
            "Document must be in extracted status".to_string(),
        ));
    }

    if request.line_items.is_empty() {
        return Err(Error::Validation(
            "At least one line item is required".to_string(),
        ));
    }

    let summary = ExtractionSummary {
        document_type: request.document_type,
        vendor_name: request.vendor_name,
        document_number: request.document_number,
        document_date: request.document_date,
        due_date: request.due_date,
        total_amount: request.total_amount,
    };

    db.confirm_document_replace(&document, &summary, &request.line_items)
        .await?;

    info!(
        "Confirmed document {} with {} line items",
        document.id,
        request.line_items.len()
    );

    db.get_document(&document.id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document.id.clone()))
}

/// Reject a document: drop its line items and clear the extraction
pub async fn cmd_reject_document(db: &Db, actor: &str, document_id: &str) -> Result<Document> {
    let (document, _project) = authorize_document(db, document_id, actor).await?;

    document
        .get_status()?
        .transition(DocumentStatus::Rejected)?;

    db.reject_document_clear(&document.id).await?;

    info!("Rejected document {}", document.id);

    db.get_document(&document.id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document.id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::setup_env;
    use crate::db::BudgetCategory;

    fn confirm_request(items: Vec<(&str, f64)>) -> ConfirmRequest {
        ConfirmRequest {
            document_type: Some(DocumentType::Invoice),
            vendor_name: Some("BuildCo Supply".to_string()),
            document_number: Some("INV-7".to_string()),
            document_date: Some("2024-03-15".to_string()),
            total_amount: Some(items.iter().map(|(_, t)| t).sum()),
            line_items: items
                .into_iter()
                .map(|(description, total)| NewLineItem {
                    description: description.to_string(),
                    quantity: None,
                    unit: None,
                    unit_price: None,
                    total,
                    category: Some(BudgetCategory::Materials),
                    cost_code: None,
                    sort_order: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_confirm_commits_line_items() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Review Job").await;
        let document = env
            .insert_extracted_document(&project, "BuildCo Supply", "invoice")
            .await;

        let confirmed = cmd_confirm_document(
            &env.db,
            "alice",
            &document.id,
            confirm_request(vec![("Lumber", 1500.0), ("Delivery", 75.0)]),
        )
        .await
        .unwrap();

        assert_eq!(confirmed.status, "confirmed");
        assert!(confirmed.confirmed_at.is_some());
        assert_eq!(confirmed.total_amount, Some(1575.0));

        let items = env
            .db
            .list_line_items_by_document(&document.id)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "Lumber");
        assert_eq!(items[0].sort_order, Some(0));
        assert_eq!(items[1].sort_order, Some(1));
    }

    #[tokio::test]
    async fn test_confirm_is_idempotent() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Review Job").await;
        let document = env
            .insert_extracted_document(&project, "BuildCo Supply", "invoice")
            .await;

        let request = confirm_request(vec![("Lumber", 1500.0), ("Delivery", 75.0)]);
        cmd_confirm_document(&env.db, "alice", &document.id, request.clone())
            .await
            .unwrap();

        let first: Vec<(String, f64)> = env
            .db
            .list_line_items_by_document(&document.id)
            .await
            .unwrap()
            .into_iter()
            .map(|i| (i.description, i.total))
            .collect();

        // Re-confirmation needs the document back in extracted status
        env.db
            .set_document_status(&document.id, DocumentStatus::Extracted)
            .await
            .unwrap();
        cmd_confirm_document(&env.db, "alice", &document.id, request)
            .await
            .unwrap();

        let second: Vec<(String, f64)> = env
            .db
            .list_line_items_by_document(&document.id)
            .await
            .unwrap()
            .into_iter()
            .map(|i| (i.description, i.total))
            .collect();

        assert_eq!(first, second);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_reconfirm_replaces_not_merges() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Review Job").await;
        let document = env
            .insert_extracted_document(&project, "BuildCo Supply", "invoice")
            .await;

        cmd_confirm_document(
            &env.db,
            "alice",
            &document.id,
            confirm_request(vec![("Lumber", 1500.0), ("Delivery", 75.0), ("Nails", 40.0)]),
        )
        .await
        .unwrap();

        env.db
            .set_document_status(&document.id, DocumentStatus::Extracted)
            .await
            .unwrap();
        cmd_confirm_document(
            &env.db,
            "alice",
            &document.id,
            confirm_request(vec![("Lumber (corrected)", 1400.0)]),
        )
        .await
        .unwrap();

        let items = env
            .db
            .list_line_items_by_document(&document.id)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Lumber (corrected)");
    }

    #[tokio::test]
    async fn test_confirm_requires_extracted_status() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Review Job").await;
        let document = env.insert_pending_document(&project, b"%PDF-1.4").await;

        let err = cmd_confirm_document(
            &env.db,
            "alice",
            &document.id,
            confirm_request(vec![("Lumber", 10.0)]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_confirm_requires_line_items() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Review Job").await;
        let document = env
            .insert_extracted_document(&project, "BuildCo Supply", "invoice")
            .await;

        let err = cmd_confirm_document(&env.db, "alice", &document.id, confirm_request(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let unchanged = env.db.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, "extracted");
    }

    #[tokio::test]
    async fn test_reject_clears_extraction() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Review Job").await;
        let document = env
            .insert_extracted_document(&project, "BuildCo Supply", "invoice")
            .await;
        cmd_confirm_document(
            &env.db,
            "alice",
            &document.id,
            confirm_request(vec![("Lumber", 1500.0)]),
        )
        .await
        .unwrap();
        env.db
            .set_document_status(&document.id, DocumentStatus::Extracted)
            .await
            .unwrap();

        let rejected = cmd_reject_document(&env.db, "alice", &document.id)
            .await
            .unwrap();

        assert_eq!(rejected.status, "rejected");
        assert!(rejected.raw_extraction.is_none());
        assert!(rejected.vendor_name.is_none());
        assert!(rejected.document_type.is_none());
        assert!(rejected.total_amount.is_none());
        assert!(env
            .db
            .list_line_items_by_document(&document.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_reject_refused_for_confirmed_document() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Review Job").await;
        let document = env
            .insert_extracted_document(&project, "BuildCo Supply", "invoice")
            .await;
        cmd_confirm_document(
            &env.db,
            "alice",
            &document.id,
            confirm_request(vec![("Lumber", 1500.0)]),
        )
        .await
        .unwrap();

        let err = cmd_reject_document(&env.db, "alice", &document.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_review_authorization_isolation() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Review Job").await;
        let document = env
            .insert_extracted_document(&project, "BuildCo Supply", "invoice")
            .await;

        assert!(matches!(
            cmd_confirm_document(
                &env.db,
                "mallory",
                &document.id,
                confirm_request(vec![("Lumber", 10.0)])
            )
            .await,
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            cmd_reject_document(&env.db, "mallory", &document.id).await,
            Err(Error::Forbidden)
        ));
    }
}
