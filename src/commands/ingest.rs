//! Email ingestion command
//!
//! The public entry point of the pipeline: authenticated by a per-project
//! ingest token rather than a session. The email body becomes a document of
//! type `email`; each sufficiently large attachment becomes a child document
//! that can run through extraction like any upload.

use super::authorize_project;
use crate::blob::{sanitize_file_name, BlobStore};
use crate::config::Config;
use crate::db::{Db, Document, DocumentType};
use crate::email::{is_financial_document, render_email_file, ParsedEmail};
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One ingested attachment in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedAttachment {
    pub id: String,
    pub filename: String,
    pub is_financial: bool,
    pub size: u64,
}

/// Outcome of one inbound email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub email_id: String,
    pub project_id: String,
    pub subject: String,
    pub from: String,
    pub attachments_processed: usize,
    pub attachments: Vec<IngestedAttachment>,
}

/// An email document together with its attachment documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailWithAttachments {
    pub email: Document,
    pub attachments: Vec<Document>,
}

/// Ingest one inbound email routed by its project token
pub async fn cmd_ingest_email(
    config: &Config,
    db: &Db,
    blob: &dyn BlobStore,
    token: &str,
    email: ParsedEmail,
) -> Result<IngestReport> {
    let project = db
        .get_project_by_ingest_token(token)
        .await?
        .ok_or(Error::InvalidIngestToken)?;

    // Store the email body as a file for reference
    let email_file_name = format!("email-{}.eml", Utc::now().timestamp_millis());
    let email_content = render_email_file(&email);
    let email_path = blob
        .store(
            &format!("projects/{}/emails/{}", project.id, email_file_name),
            email_content.as_bytes(),
            "message/rfc822",
        )
        .await?;

    let mut email_doc = Document::new(
        project.id.clone(),
        project.owner.clone(),
        if email.subject.is_empty() {
            email_file_name
        } else {
            email.subject.clone()
        },
        email_path,
    );
    email_doc.file_size = Some(email_content.len() as i64);
    email_doc.mime_type = Some("message/rfc822".to_string());
    email_doc.document_type = Some(DocumentType::Email.to_string());
    email_doc.email_from = Some(email.from.clone());
    email_doc.email_to = Some(email.to.clone());
    email_doc.email_subject = Some(email.subject.clone());
    email_doc.email_body = Some(email.body.clone());
    email_doc.email_received_at = Some(email.received_at.to_rfc3339());
    db.insert_document(&email_doc).await?;

    let mut report = IngestReport {
        email_id: email_doc.id.clone(),
        project_id: project.id.clone(),
        subject: email.subject.clone(),
        from: email.from.clone(),
        attachments_processed: 0,
        attachments: Vec::new(),
    };

    for attachment in &email.attachments {
        // Skip tiny files (likely signatures or icons)
        if attachment.size < config.ingest.min_attachment_bytes {
            debug!(
                "Skipping attachment {} ({} bytes)",
                attachment.filename, attachment.size
            );
            continue;
        }

        let is_financial = is_financial_document(&attachment.filename, &attachment.content_type);

        let attachment_path = blob
            .store(
                &format!(
                    "projects/{}/attachments/{}-{}",
                    project.id,
                    Utc::now().timestamp_millis(),
                    sanitize_file_name(&attachment.filename)
                ),
                &attachment.content,
                &attachment.content_type,
            )
            .await?;

        let mut attachment_doc = Document::new(
            project.id.clone(),
            project.owner.clone(),
            attachment.filename.clone(),
            attachment_path,
        );
        attachment_doc.file_size = Some(attachment.size as i64);
        attachment_doc.mime_type = Some(attachment.content_type.clone());
        // Attachments get their own type at extraction time, never `email`
        attachment_doc.parent_document_id = Some(email_doc.id.clone());
        db.insert_document(&attachment_doc).await?;

        report.attachments.push(IngestedAttachment {
            id: attachment_doc.id,
            filename: attachment.filename.clone(),
            is_financial,
            size: attachment.size,
        });
    }

    report.attachments_processed = report.attachments.len();

    info!(
        "Ingested email '{}' into project {} with {} attachments",
        report.subject, project.id, report.attachments_processed
    );

    Ok(report)
}

/// Check whether an ingest token resolves, without touching anything.
/// Mail providers ping this before delivering.
pub async fn cmd_verify_ingest_token(db: &Db, token: &str) -> Result<String> {
    let project = db
        .get_project_by_ingest_token(token)
        .await?
        .ok_or(Error::InvalidIngestToken)?;
    Ok(project.name)
}

/// List a project's ingested emails with their attachments, newest first
pub async fn cmd_list_emails(
    db: &Db,
    actor: &str,
    project_id: &str,
) -> Result<Vec<EmailWithAttachments>> {
    let project = authorize_project(db, project_id, actor).await?;

    let mut result = Vec::new();
    for email in db.list_email_documents(&project.id).await? {
        let attachments = db.list_attachments(&email.id).await?;
        result.push(EmailWithAttachments { email, attachments });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::setup_env;
    use crate::email::ParsedAttachment;
    use std::collections::HashMap;

    fn test_email(attachments: Vec<ParsedAttachment>) -> ParsedEmail {
        ParsedEmail {
            from: "billing@buildco.com".to_string(),
            to: "tok@ingest.example".to_string(),
            subject: "Invoice INV-1042".to_string(),
            body: "Invoice attached, $1,182.60 due.".to_string(),
            html_body: None,
            received_at: Utc::now(),
            attachments,
            headers: HashMap::new(),
        }
    }

    fn pdf_attachment(name: &str, size: usize) -> ParsedAttachment {
        ParsedAttachment {
            filename: name.to_string(),
            content_type: "application/pdf".to_string(),
            size: size as u64,
            content: vec![b'x'; size],
        }
    }

    #[tokio::test]
    async fn test_ingest_email_with_attachments() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Ingest Job").await;

        let report = cmd_ingest_email(
            &env.config,
            &env.db,
            &env.blob,
            &project.ingest_token,
            test_email(vec![
                pdf_attachment("invoice-1042.pdf", 4096),
                // Below the 1000-byte floor: discarded as a signature image
                pdf_attachment("logo.png", 300),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(report.attachments_processed, 1);
        assert!(report.attachments[0].is_financial);

        let email_doc = env.db.get_document(&report.email_id).await.unwrap().unwrap();
        assert!(email_doc.is_email());
        assert_eq!(email_doc.status, "pending");
        assert_eq!(email_doc.email_from.as_deref(), Some("billing@buildco.com"));

        let attachments = env.db.list_attachments(&report.email_id).await.unwrap();
        assert_eq!(attachments.len(), 1);
        // The email-type invariant: attachments never carry the email type
        assert!(attachments[0].document_type.is_none());
        assert_eq!(
            attachments[0].parent_document_id.as_deref(),
            Some(report.email_id.as_str())
        );

        // Attachment bytes are fetchable for later extraction
        let bytes = env
            .blob
            .fetch(&attachments[0].file_path)
            .await
            .unwrap();
        assert_eq!(bytes.len(), 4096);
    }

    #[tokio::test]
    async fn test_ingest_rejects_unknown_token() {
        let env = setup_env().await;
        env.create_project("alice", "Ingest Job").await;

        let err = cmd_ingest_email(
            &env.config,
            &env.db,
            &env.blob,
            "not-a-real-token",
            test_email(vec![]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidIngestToken));
    }

    #[tokio::test]
    async fn test_verify_ingest_token() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Ingest Job").await;

        let name = cmd_verify_ingest_token(&env.db, &project.ingest_token)
            .await
            .unwrap();
        assert_eq!(name, "Ingest Job");

        assert!(matches!(
            cmd_verify_ingest_token(&env.db, "bogus").await,
            Err(Error::InvalidIngestToken)
        ));
    }

    #[tokio::test]
    async fn test_list_emails_groups_attachments() {
        let env = setup_env().await;
        let project = env.create_project("alice", "Ingest Job").await;

        cmd_ingest_email(
            &env.config,
            &env.db,
            &env.blob,
            &project.ingest_token,
            test_email(vec![pdf_attachment("invoice.pdf", 2048)]),
        )
        .await
        .unwrap();

        let emails = cmd_list_emails(&env.db, "alice", &project.id).await.unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].attachments.len(), 1);

        assert!(matches!(
            cmd_list_emails(&env.db, "mallory", &project.id).await,
            Err(Error::Forbidden)
        ));
    }
}
