//! Persistent storage using SQLite
//!
//! This module handles all local storage including:
//! - Projects (one per construction job)
//! - Budget categories (per-project estimates)
//! - Documents (uploads, ingested emails, attachments) and their lifecycle
//! - Line items (confirmed extraction output)
//! - Prompt executions (write-only extraction telemetry)

mod schema;

pub use schema::*;

use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Project lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Completed,
    OnHold,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Completed => write!(f, "completed"),
            ProjectStatus::OnHold => write!(f, "on_hold"),
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ProjectStatus::Active),
            "completed" => Ok(ProjectStatus::Completed),
            "on_hold" => Ok(ProjectStatus::OnHold),
            _ => Err(Error::Validation(format!("Unknown project status: {}", s))),
        }
    }
}

/// The fixed five-way cost classification applied to every line item and
/// every estimate. Not user-extensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BudgetCategory {
    Labor,
    Materials,
    Equipment,
    Subcontractors,
    Other,
}

impl BudgetCategory {
    /// All categories, in display order. Aggregation output is driven by this
    /// list, never by which rows happen to exist.
    pub const ALL: [BudgetCategory; 5] = [
        BudgetCategory::Labor,
        BudgetCategory::Materials,
        BudgetCategory::Equipment,
        BudgetCategory::Subcontractors,
        BudgetCategory::Other,
    ];
}

impl std::fmt::Display for BudgetCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetCategory::Labor => write!(f, "Labor"),
            BudgetCategory::Materials => write!(f, "Materials"),
            BudgetCategory::Equipment => write!(f, "Equipment"),
            BudgetCategory::Subcontractors => write!(f, "Subcontractors"),
            BudgetCategory::Other => write!(f, "Other"),
        }
    }
}

impl FromStr for BudgetCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Labor" => Ok(BudgetCategory::Labor),
            "Materials" => Ok(BudgetCategory::Materials),
            "Equipment" => Ok(BudgetCategory::Equipment),
            "Subcontractors" => Ok(BudgetCategory::Subcontractors),
            "Other" => Ok(BudgetCategory::Other),
            _ => Err(Error::Validation(format!("Unknown budget category: {}", s))),
        }
    }
}

/// Document classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Quote,
    Estimate,
    ChangeOrder,
    Receipt,
    Other,
    Email,
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentType::Invoice => write!(f, "invoice"),
            DocumentType::Quote => write!(f, "quote"),
            DocumentType::Estimate => write!(f, "estimate"),
            DocumentType::ChangeOrder => write!(f, "change_order"),
            DocumentType::Receipt => write!(f, "receipt"),
            DocumentType::Other => write!(f, "other"),
            DocumentType::Email => write!(f, "email"),
        }
    }
}

impl FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "invoice" => Ok(DocumentType::Invoice),
            "quote" => Ok(DocumentType::Quote),
            "estimate" => Ok(DocumentType::Estimate),
            "change_order" => Ok(DocumentType::ChangeOrder),
            "receipt" => Ok(DocumentType::Receipt),
            "other" => Ok(DocumentType::Other),
            "email" => Ok(DocumentType::Email),
            _ => Err(Error::Validation(format!("Unknown document type: {}", s))),
        }
    }
}

/// Document extraction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Extracted,
    Confirmed,
    Rejected,
    Failed,
}

impl DocumentStatus {
    /// Validate a requested status transition.
    ///
    /// This is the single legality check for the extraction lifecycle:
    /// pending/failed/rejected -> processing (extraction, including
    /// re-extraction after a failure or a reject), processing ->
    /// extracted/failed (adapter outcome), extracted -> confirmed/rejected
    /// (human review), failed -> rejected (discard without re-extracting).
    /// A confirmed document cannot re-enter processing: its line items are
    /// load-bearing for actuals and must be rejected first.
    pub fn transition(self, to: DocumentStatus) -> Result<DocumentStatus> {
        use DocumentStatus::*;

        let legal = matches!(
            (self, to),
            (Pending, Processing)
                | (Failed, Processing)
                | (Rejected, Processing)
                | (Processing, Extracted)
                | (Processing, Failed)
                | (Extracted, Confirmed)
                | (Extracted, Rejected)
                | (Failed, Rejected)
        );

        if legal {
            Ok(to)
        } else {
            Err(Error::Validation(format!(
                "Illegal document status transition: {} -> {}",
                self, to
            )))
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentStatus::Pending => write!(f, "pending"),
            DocumentStatus::Processing => write!(f, "processing"),
            DocumentStatus::Extracted => write!(f, "extracted"),
            DocumentStatus::Confirmed => write!(f, "confirmed"),
            DocumentStatus::Rejected => write!(f, "rejected"),
            DocumentStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "extracted" => Ok(DocumentStatus::Extracted),
            "confirmed" => Ok(DocumentStatus::Confirmed),
            "rejected" => Ok(DocumentStatus::Rejected),
            "failed" => Ok(DocumentStatus::Failed),
            _ => Err(Error::Validation(format!("Unknown document status: {}", s))),
        }
    }
}

/// A construction project
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub client_name: Option<String>,
    pub address: Option<String>,
    pub status: String,
    pub contract_value: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub ingest_token: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    pub fn new(owner: String, name: String, ingest_token: String) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            owner,
            name,
            client_name: None,
            address: None,
            status: ProjectStatus::Active.to_string(),
            contract_value: None,
            start_date: None,
            end_date: None,
            ingest_token,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn get_status(&self) -> Result<ProjectStatus> {
        self.status.parse()
    }
}

/// A per-project budget estimate for one category
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BudgetEstimate {
    pub id: String,
    pub project_id: String,
    pub category: String,
    pub estimated_amount: f64,
    pub created_at: String,
}

impl BudgetEstimate {
    pub fn new(project_id: String, category: BudgetCategory, estimated_amount: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id,
            category: category.to_string(),
            estimated_amount,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A project document (upload, ingested email, or email attachment)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    pub owner: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub document_type: Option<String>,
    pub status: String,
    pub raw_extraction: Option<String>,
    pub vendor_name: Option<String>,
    pub document_number: Option<String>,
    pub document_date: Option<String>,
    pub due_date: Option<String>,
    pub total_amount: Option<f64>,
    pub confirmed_at: Option<String>,
    pub parent_document_id: Option<String>,
    pub email_from: Option<String>,
    pub email_to: Option<String>,
    pub email_subject: Option<String>,
    pub email_body: Option<String>,
    pub email_received_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Document {
    pub fn new(project_id: String, owner: String, file_name: String, file_path: String) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            project_id,
            owner,
            file_name,
            file_path,
            file_size: None,
            mime_type: None,
            document_type: None,
            status: DocumentStatus::Pending.to_string(),
            raw_extraction: None,
            vendor_name: None,
            document_number: None,
            document_date: None,
            due_date: None,
            total_amount: None,
            confirmed_at: None,
            parent_document_id: None,
            email_from: None,
            email_to: None,
            email_subject: None,
            email_body: None,
            email_received_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn get_status(&self) -> Result<DocumentStatus> {
        self.status.parse()
    }

    pub fn get_document_type(&self) -> Option<DocumentType> {
        self.document_type.as_deref().and_then(|t| t.parse().ok())
    }

    /// Top-level email body, as opposed to an upload or an attachment
    pub fn is_email(&self) -> bool {
        self.document_type.as_deref() == Some("email")
    }
}

/// A confirmed financial line item
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub document_id: String,
    pub project_id: String,
    pub description: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub unit_price: Option<f64>,
    pub total: f64,
    pub category: Option<String>,
    pub cost_code: Option<String>,
    pub sort_order: Option<i64>,
    pub created_at: String,
}

/// Input shape for bulk line-item creation on confirm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    pub description: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    pub total: f64,
    #[serde(default)]
    pub category: Option<BudgetCategory>,
    #[serde(default)]
    pub cost_code: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
}

/// Denormalized summary fields written to the document row on extraction and
/// again (possibly human-edited) on confirmation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub document_type: Option<DocumentType>,
    pub vendor_name: Option<String>,
    pub document_number: Option<String>,
    pub document_date: Option<String>,
    pub due_date: Option<String>,
    pub total_amount: Option<f64>,
}

/// A telemetry record for one model invocation
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PromptExecution {
    pub id: String,
    pub prompt_id: String,
    pub project_id: Option<String>,
    pub document_id: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub latency_ms: Option<i64>,
    pub raw_response: Option<String>,
    pub parsed_response: Option<String>,
    pub metadata: String,
    pub created_at: String,
}

impl PromptExecution {
    pub fn new(prompt_id: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt_id,
            project_id: None,
            document_id: None,
            input_tokens: None,
            output_tokens: None,
            latency_ms: None,
            raw_response: None,
            parsed_response: None,
            metadata: "{}".to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// One row of the budget-vs-actual summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLine {
    pub category: BudgetCategory,
    pub estimated_amount: f64,
    pub actual_amount: f64,
    /// estimated minus actual: positive means under budget
    pub variance: f64,
}

/// Project-level financial totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTotals {
    pub contract_value: f64,
    pub total_estimated: f64,
    pub total_actual: f64,
    pub margin_amount: f64,
    pub margin_percent: f64,
}

/// Global statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStats {
    pub project_count: usize,
    pub document_count: usize,
    pub line_item_count: usize,
}

/// Database handle
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (and create if missing) the database at the given path
    pub async fn new(db_path: &std::path::Path) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };

        // Auto-initialize schema if needed
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='projects'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Project Operations =====

    /// Insert a new project
    pub async fn insert_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, owner, name, client_name, address, status, contract_value, start_date, end_date, ingest_token, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&project.id)
        .bind(&project.owner)
        .bind(&project.name)
        .bind(&project.client_name)
        .bind(&project.address)
        .bind(&project.status)
        .bind(project.contract_value)
        .bind(&project.start_date)
        .bind(&project.end_date)
        .bind(&project.ingest_token)
        .bind(&project.created_at)
        .bind(&project.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get project by ID
    pub async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(project)
    }

    /// Get project by its email ingest token
    pub async fn get_project_by_ingest_token(&self, token: &str) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE ingest_token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(project)
    }

    /// List projects for an owner, newest first
    pub async fn list_projects(&self, owner: &str) -> Result<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE owner = ? ORDER BY created_at DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(projects)
    }

    /// Write back a full project row (read-modify-write update)
    pub async fn update_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE projects SET name = ?, client_name = ?, address = ?, status = ?,
                contract_value = ?, start_date = ?, end_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&project.name)
        .bind(&project.client_name)
        .bind(&project.address)
        .bind(&project.status)
        .bind(project.contract_value)
        .bind(&project.start_date)
        .bind(&project.end_date)
        .bind(Utc::now().to_rfc3339())
        .bind(&project.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a project and everything it owns. Telemetry rows are kept but
    /// unlinked.
    pub async fn delete_project(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM line_items WHERE project_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM documents WHERE project_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM budget_categories WHERE project_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "UPDATE prompt_executions SET project_id = NULL, document_id = NULL WHERE project_id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ===== Budget Category Operations =====

    /// Bulk-insert the estimate rows created with a new project
    pub async fn insert_budget_estimates(&self, estimates: &[BudgetEstimate]) -> Result<()> {
        for estimate in estimates {
            sqlx::query(
                r#"
                INSERT INTO budget_categories (id, project_id, category, estimated_amount, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&estimate.id)
            .bind(&estimate.project_id)
            .bind(&estimate.category)
            .bind(estimate.estimated_amount)
            .bind(&estimate.created_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// List estimate rows for a project
    pub async fn list_budget_estimates(&self, project_id: &str) -> Result<Vec<BudgetEstimate>> {
        let estimates = sqlx::query_as::<_, BudgetEstimate>(
            "SELECT * FROM budget_categories WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(estimates)
    }

    /// Upsert the estimate for one (project, category) pair
    pub async fn upsert_budget_estimate(
        &self,
        project_id: &str,
        category: BudgetCategory,
        estimated_amount: f64,
    ) -> Result<BudgetEstimate> {
        let estimate = BudgetEstimate::new(project_id.to_string(), category, estimated_amount);
        sqlx::query(
            r#"
            INSERT INTO budget_categories (id, project_id, category, estimated_amount, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(project_id, category) DO UPDATE SET
                estimated_amount = excluded.estimated_amount
            "#,
        )
        .bind(&estimate.id)
        .bind(&estimate.project_id)
        .bind(&estimate.category)
        .bind(estimate.estimated_amount)
        .bind(&estimate.created_at)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, BudgetEstimate>(
            "SELECT * FROM budget_categories WHERE project_id = ? AND category = ?",
        )
        .bind(project_id)
        .bind(category.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    // ===== Document Operations =====

    /// Insert a new document
    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, project_id, owner, file_name, file_path, file_size, mime_type,
                document_type, status, raw_extraction, vendor_name, document_number, document_date,
                due_date, total_amount, confirmed_at, parent_document_id, email_from, email_to,
                email_subject, email_body, email_received_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.project_id)
        .bind(&doc.owner)
        .bind(&doc.file_name)
        .bind(&doc.file_path)
        .bind(doc.file_size)
        .bind(&doc.mime_type)
        .bind(&doc.document_type)
        .bind(&doc.status)
        .bind(&doc.raw_extraction)
        .bind(&doc.vendor_name)
        .bind(&doc.document_number)
        .bind(&doc.document_date)
        .bind(&doc.due_date)
        .bind(doc.total_amount)
        .bind(&doc.confirmed_at)
        .bind(&doc.parent_document_id)
        .bind(&doc.email_from)
        .bind(&doc.email_to)
        .bind(&doc.email_subject)
        .bind(&doc.email_body)
        .bind(&doc.email_received_at)
        .bind(&doc.created_at)
        .bind(&doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get document by ID
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    /// List documents for a project, newest first
    pub async fn list_documents(&self, project_id: &str) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE project_id = ? ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    /// List ingested email documents for a project, newest received first
    pub async fn list_email_documents(&self, project_id: &str) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(
            r#"
            SELECT * FROM documents
            WHERE project_id = ? AND document_type = 'email'
            ORDER BY email_received_at DESC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    /// List attachment documents of an email
    pub async fn list_attachments(&self, parent_document_id: &str) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE parent_document_id = ? ORDER BY created_at",
        )
        .bind(parent_document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    /// Flip the document status (processing / failed transitions)
    pub async fn set_document_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist a successful extraction: raw payload, denormalized summary
    /// fields, and the extracted status, in one statement.
    pub async fn store_extraction(
        &self,
        id: &str,
        raw_extraction: &str,
        summary: &ExtractionSummary,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE documents SET status = ?, raw_extraction = ?, document_type = ?,
                vendor_name = ?, document_number = ?, document_date = ?, due_date = ?,
                total_amount = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(DocumentStatus::Extracted.to_string())
        .bind(raw_extraction)
        .bind(summary.document_type.map(|t| t.to_string()))
        .bind(&summary.vendor_name)
        .bind(&summary.document_number)
        .bind(&summary.document_date)
        .bind(&summary.due_date)
        .bind(summary.total_amount)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Confirm a document: replace its entire line-item set with the edited
    /// items, write the edited summary fields, and stamp confirmed_at, all in
    /// one transaction. Safe to call again on re-confirmation.
    pub async fn confirm_document_replace(
        &self,
        document: &Document,
        summary: &ExtractionSummary,
        items: &[NewLineItem],
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM line_items WHERE document_id = ?")
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;

        for (index, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO line_items (id, document_id, project_id, description, quantity, unit,
                    unit_price, total, category, cost_code, sort_order, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&document.id)
            .bind(&document.project_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(&item.unit)
            .bind(item.unit_price)
            .bind(item.total)
            .bind(item.category.map(|c| c.to_string()))
            .bind(&item.cost_code)
            .bind(item.sort_order.unwrap_or(index as i64))
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE documents SET status = ?, document_type = ?, vendor_name = ?,
                document_number = ?, document_date = ?, due_date = ?, total_amount = ?,
                confirmed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(DocumentStatus::Confirmed.to_string())
        .bind(summary.document_type.map(|t| t.to_string()))
        .bind(&summary.vendor_name)
        .bind(&summary.document_number)
        .bind(&summary.document_date)
        .bind(&summary.due_date)
        .bind(summary.total_amount)
        .bind(&now)
        .bind(&now)
        .bind(&document.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Reject a document: delete its line items, clear the raw extraction and
    /// every denormalized field, and set the rejected status, in one
    /// transaction. The mirror-image clear of confirm.
    pub async fn reject_document_clear(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM line_items WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE documents SET status = ?, raw_extraction = NULL, document_type = NULL,
                vendor_name = NULL, document_number = NULL, document_date = NULL,
                due_date = NULL, total_amount = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(DocumentStatus::Rejected.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete a document, its line items, and (for emails) its attachments.
    /// Telemetry rows are kept but unlinked.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        let mut doomed: Vec<String> =
            sqlx::query_scalar("SELECT id FROM documents WHERE parent_document_id = ?")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        doomed.push(id.to_string());

        for doc_id in &doomed {
            sqlx::query("DELETE FROM line_items WHERE document_id = ?")
                .bind(doc_id)
                .execute(&self.pool)
                .await?;

            sqlx::query("UPDATE prompt_executions SET document_id = NULL WHERE document_id = ?")
                .bind(doc_id)
                .execute(&self.pool)
                .await?;

            sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(doc_id)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    // ===== Line Item Operations =====

    /// List line items for a document in extraction order
    pub async fn list_line_items_by_document(&self, document_id: &str) -> Result<Vec<LineItem>> {
        let items = sqlx::query_as::<_, LineItem>(
            "SELECT * FROM line_items WHERE document_id = ? ORDER BY sort_order",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// List all line items for a project
    pub async fn list_line_items_by_project(&self, project_id: &str) -> Result<Vec<LineItem>> {
        let items = sqlx::query_as::<_, LineItem>(
            "SELECT * FROM line_items WHERE project_id = ? ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// List line items belonging to confirmed documents only
    pub async fn list_confirmed_line_items(&self, project_id: &str) -> Result<Vec<LineItem>> {
        let items = sqlx::query_as::<_, LineItem>(
            r#"
            SELECT li.* FROM line_items li
            JOIN documents d ON li.document_id = d.id
            WHERE li.project_id = ? AND d.status = 'confirmed'
            ORDER BY li.created_at
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    // ===== Budget Aggregation =====

    /// Budget-vs-actual summary for a project.
    ///
    /// Always returns exactly one row per category in `BudgetCategory::ALL`
    /// order; actuals count line items of confirmed documents only.
    pub async fn budget_summary(&self, project_id: &str) -> Result<Vec<BudgetLine>> {
        let estimates = self.list_budget_estimates(project_id).await?;

        let actuals: Vec<(String, f64)> = sqlx::query_as(
            r#"
            SELECT li.category, SUM(li.total) FROM line_items li
            JOIN documents d ON li.document_id = d.id
            WHERE li.project_id = ? AND d.status = 'confirmed' AND li.category IS NOT NULL
            GROUP BY li.category
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let summary = BudgetCategory::ALL
            .iter()
            .map(|&category| {
                let estimated = estimates
                    .iter()
                    .find(|e| e.category == category.to_string())
                    .map(|e| e.estimated_amount)
                    .unwrap_or(0.0);
                let actual = actuals
                    .iter()
                    .find(|(c, _)| *c == category.to_string())
                    .map(|(_, total)| *total)
                    .unwrap_or(0.0);
                BudgetLine {
                    category,
                    estimated_amount: estimated,
                    actual_amount: actual,
                    variance: estimated - actual,
                }
            })
            .collect();

        Ok(summary)
    }

    /// Project-level totals: contract value, estimated/actual sums, margin
    pub async fn project_totals(&self, project_id: &str) -> Result<ProjectTotals> {
        let project = self
            .get_project(project_id)
            .await?
            .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))?;
        let summary = self.budget_summary(project_id).await?;

        let contract_value = project.contract_value.unwrap_or(0.0);
        let total_estimated: f64 = summary.iter().map(|s| s.estimated_amount).sum();
        let total_actual: f64 = summary.iter().map(|s| s.actual_amount).sum();
        let margin_amount = contract_value - total_actual;
        let margin_percent = if contract_value > 0.0 {
            margin_amount / contract_value * 100.0
        } else {
            0.0
        };

        Ok(ProjectTotals {
            contract_value,
            total_estimated,
            total_actual,
            margin_amount,
            margin_percent,
        })
    }

    // ===== Telemetry =====

    /// Insert a prompt execution record. Callers treat this as fire-and-forget:
    /// a failure here is logged and never propagated as a domain error.
    pub async fn record_prompt_execution(&self, execution: &PromptExecution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO prompt_executions (id, prompt_id, project_id, document_id, input_tokens,
                output_tokens, latency_ms, raw_response, parsed_response, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.prompt_id)
        .bind(&execution.project_id)
        .bind(&execution.document_id)
        .bind(execution.input_tokens)
        .bind(execution.output_tokens)
        .bind(execution.latency_ms)
        .bind(&execution.raw_response)
        .bind(&execution.parsed_response)
        .bind(&execution.metadata)
        .bind(&execution.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ===== Statistics =====

    /// Get global statistics
    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        let project_count: i32 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(&self.pool)
            .await?;

        let document_count: i32 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;

        let line_item_count: i32 = sqlx::query_scalar("SELECT COUNT(*) FROM line_items")
            .fetch_one(&self.pool)
            .await?;

        Ok(GlobalStats {
            project_count: project_count as usize,
            document_count: document_count as usize,
            line_item_count: line_item_count as usize,
        })
    }

    /// Telemetry is write-only in production; tests verify the writes landed.
    #[cfg(test)]
    pub(crate) async fn count_prompt_executions(&self, document_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM prompt_executions WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Last telemetry metadata blob for a document, for test assertions
    #[cfg(test)]
    pub(crate) async fn last_prompt_execution_metadata(
        &self,
        document_id: &str,
    ) -> Result<Option<String>> {
        let metadata: Option<String> = sqlx::query_scalar(
            "SELECT metadata FROM prompt_executions WHERE document_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(metadata)
    }
}

/// Best-effort telemetry write: log and continue on failure
pub async fn record_prompt_execution_best_effort(db: &Db, execution: &PromptExecution) {
    if let Err(e) = db.record_prompt_execution(execution).await {
        warn!("Failed to record prompt execution: {}", e);
    }
}
