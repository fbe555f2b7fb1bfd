//! Document commands

use super::{authorize_document, authorize_project};
use crate::blob::{sanitize_file_name, BlobStore};
use crate::config::Config;
use crate::db::{Db, Document, DocumentStatus, DocumentType, LineItem};
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Optional document listing filters
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// Case-insensitive vendor substring match
    pub vendor: Option<String>,
    pub document_type: Option<DocumentType>,
    pub status: Option<DocumentStatus>,
}

/// Apply listing filters in memory
pub fn filter_documents(documents: Vec<Document>, filter: &DocumentFilter) -> Vec<Document> {
    documents
        .into_iter()
        .filter(|d| {
            if let Some(ref vendor) = filter.vendor {
                let needle = vendor.to_lowercase();
                let matches = d
                    .vendor_name
                    .as_deref()
                    .map(|v| v.to_lowercase().contains(&needle))
                    .unwrap_or(false);
                if !matches {
                    return false;
                }
            }
            if let Some(document_type) = filter.document_type {
                if d.document_type.as_deref() != Some(document_type.to_string().as_str()) {
                    return false;
                }
            }
            if let Some(status) = filter.status {
                if d.status != status.to_string() {
                    return false;
                }
            }
            true
        })
        .collect()
}

/// A document with its confirmed line items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDetail {
    pub document: Document,
    pub line_items: Vec<LineItem>,
}

/// Upload a local PDF into a project
pub async fn cmd_upload_document(
    config: &Config,
    db: &Db,
    blob: &dyn BlobStore,
    actor: &str,
    project_id: &str,
    file: &Path,
) -> Result<Document> {
    let project = authorize_project(db, project_id, actor).await?;

    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Validation("Invalid file name".to_string()))?
        .to_string();

    let mime_type = mime_guess::from_path(file)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    if mime_type != "application/pdf" {
        return Err(Error::Validation(
            "Only PDF files are allowed".to_string(),
        ));
    }

    let bytes = tokio::fs::read(file).await?;
    if bytes.len() as u64 > config.ingest.max_upload_bytes {
        return Err(Error::Validation(format!(
            "File size must be less than {} bytes",
            config.ingest.max_upload_bytes
        )));
    }

    let blob_path = format!(
        "documents/{}/{}-{}",
        project.id,
        Utc::now().timestamp_millis(),
        sanitize_file_name(&file_name)
    );
    let file_path = blob.store(&blob_path, &bytes, &mime_type).await?;

    let mut document = Document::new(project.id.clone(), project.owner.clone(), file_name, file_path);
    document.file_size = Some(bytes.len() as i64);
    document.mime_type = Some(mime_type);
    db.insert_document(&document).await?;

    info!("Uploaded document {} to project {}", document.id, project.id);
    Ok(document)
}

/// List a project's documents with optional filters, newest first
pub async fn cmd_list_documents(
    db: &Db,
    actor: &str,
    project_id: &str,
    filter: &DocumentFilter,
) -> Result<Vec<Document>> {
    let project = authorize_project(db, project_id, actor).await?;
    let documents = db.list_documents(&project.id).await?;
    Ok(filter_documents(documents, filter))
}

/// One document with its line items
pub async fn cmd_show_document(db: &Db, actor: &str, document_id: &str) -> Result<DocumentDetail> {
    let (document, _project) = authorize_document(db, document_id, actor).await?;
    let line_items = db.list_line_items_by_document(&document.id).await?;
    Ok(DocumentDetail {
        document,
        line_items,
    })
}

/// Delete a document. The backing blob delete is best-effort: the database
/// delete proceeds even if the file cannot be removed.
pub async fn cmd_delete_document(
    db: &Db,
    blob: &dyn BlobStore,
    actor: &str,
    document_id: &str,
) -> Result<()> {
    let (document, _project) = authorize_document(db, document_id, actor).await?;

    if let Err(e) = blob.delete(&document.file_path).await {
        warn!("Failed to delete blob {}: {}", document.file_path, e);
    }

    db.delete_document(&document.id).await?;
    info!("Deleted document {}", document.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::setup_env;

    #[tokio::test]
    async fn test_upload_and_show_document() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Upload Job").await;

        let pdf = env.write_scratch_file("site invoice.pdf", b"%PDF-1.4 test");
        let document =
            cmd_upload_document(&env.config, &env.db, &env.blob, "alice", &project.id, &pdf)
                .await
                .unwrap();

        assert_eq!(document.status, "pending");
        assert_eq!(document.file_size, Some(13));
        assert_eq!(document.mime_type.as_deref(), Some("application/pdf"));

        let detail = cmd_show_document(&env.db, "alice", &document.id)
            .await
            .unwrap();
        assert!(detail.line_items.is_empty());

        // Stored bytes are fetchable through the opaque reference
        let bytes = env.blob.fetch(&detail.document.file_path).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4 test");
    }

    #[tokio::test]
    async fn test_upload_rejects_non_pdf() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Upload Job").await;

        let txt = env.write_scratch_file("notes.txt", b"hello");
        let err = cmd_upload_document(&env.config, &env.db, &env.blob, "alice", &project.id, &txt)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_upload_rejects_oversize() {
        let mut env = setup_env().await;
        env.config.ingest.max_upload_bytes = 8;
        let project = env.create_project("alice", "Upload Job").await;

        let pdf = env.write_scratch_file("big.pdf", b"%PDF-1.4 too large");
        let err = cmd_upload_document(&env.config, &env.db, &env.blob, "alice", &project.id, &pdf)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_documents_filters() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Filter Job").await;

        env.insert_extracted_document(&project, "BuildCo Supply", "invoice")
            .await;
        env.insert_extracted_document(&project, "Ace Rentals", "quote")
            .await;

        let all = cmd_list_documents(&env.db, "alice", &project.id, &DocumentFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let by_vendor = cmd_list_documents(
            &env.db,
            "alice",
            &project.id,
            &DocumentFilter {
                vendor: Some("buildco".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_vendor.len(), 1);
        assert_eq!(by_vendor[0].vendor_name.as_deref(), Some("BuildCo Supply"));

        let by_type = cmd_list_documents(
            &env.db,
            "alice",
            &project.id,
            &DocumentFilter {
                document_type: Some(DocumentType::Quote),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_type.len(), 1);

        let by_status = cmd_list_documents(
            &env.db,
            "alice",
            &project.id,
            &DocumentFilter {
                status: Some(DocumentStatus::Confirmed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(by_status.is_empty());
    }

    #[tokio::test]
    async fn test_delete_document_survives_missing_blob() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Delete Job").await;
        let document = env
            .insert_extracted_document(&project, "BuildCo", "invoice")
            .await;

        // file_path points at nothing; the db delete must still go through
        cmd_delete_document(&env.db, &env.blob, "alice", &document.id)
            .await
            .unwrap();
        assert!(env.db.get_document(&document.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_document_authorization_isolation() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Private Job").await;
        let document = env
            .insert_extracted_document(&project, "BuildCo", "invoice")
            .await;

        assert!(matches!(
            cmd_show_document(&env.db, "mallory", &document.id).await,
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            cmd_delete_document(&env.db, &env.blob, "mallory", &document.id).await,
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            cmd_list_documents(&env.db, "mallory", &project.id, &DocumentFilter::default()).await,
            Err(Error::Forbidden)
        ));
    }
}
