//! Project commands

use super::authorize_project;
use crate::blob::BlobStore;
use crate::db::{
    BudgetCategory, BudgetEstimate, BudgetLine, Db, Project, ProjectStatus, ProjectTotals,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Input for project creation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectCreate {
    pub name: String,
    pub client_name: Option<String>,
    pub address: Option<String>,
    pub contract_value: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Partial project update; None leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub client_name: Option<String>,
    pub address: Option<String>,
    pub status: Option<ProjectStatus>,
    pub contract_value: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// A project with its financial rollup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectOverview {
    pub project: Project,
    pub totals: ProjectTotals,
    pub budget: Vec<BudgetLine>,
}

/// Generate a per-project secret used to route inbound emails
fn generate_ingest_token() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Create a project and its five zero-amount budget rows
pub async fn cmd_create_project(db: &Db, actor: &str, input: ProjectCreate) -> Result<Project> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(Error::Validation("Project name is required".to_string()));
    }

    let mut project = Project::new(actor.to_string(), name.to_string(), generate_ingest_token());
    project.client_name = input.client_name.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    project.address = input.address.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    project.contract_value = input.contract_value;
    project.start_date = input.start_date;
    project.end_date = input.end_date;

    db.insert_project(&project).await?;

    let estimates: Vec<BudgetEstimate> = BudgetCategory::ALL
        .iter()
        .map(|&category| BudgetEstimate::new(project.id.clone(), category, 0.0))
        .collect();
    db.insert_budget_estimates(&estimates).await?;

    info!("Created project {} ({})", project.name, project.id);
    Ok(project)
}

/// List the caller's projects, newest first
pub async fn cmd_list_projects(db: &Db, actor: &str) -> Result<Vec<Project>> {
    db.list_projects(actor).await
}

/// One project with totals and budget summary
pub async fn cmd_show_project(db: &Db, actor: &str, project_id: &str) -> Result<ProjectOverview> {
    let project = authorize_project(db, project_id, actor).await?;
    let totals = db.project_totals(&project.id).await?;
    let budget = db.budget_summary(&project.id).await?;
    Ok(ProjectOverview {
        project,
        totals,
        budget,
    })
}

/// Apply a partial update to a project
pub async fn cmd_update_project(
    db: &Db,
    actor: &str,
    project_id: &str,
    update: ProjectUpdate,
) -> Result<Project> {
    let mut project = authorize_project(db, project_id, actor).await?;

    if let Some(name) = update.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("Project name is required".to_string()));
        }
        project.name = name;
    }
    if let Some(client_name) = update.client_name {
        project.client_name = Some(client_name);
    }
    if let Some(address) = update.address {
        project.address = Some(address);
    }
    if let Some(status) = update.status {
        project.status = status.to_string();
    }
    if let Some(contract_value) = update.contract_value {
        project.contract_value = Some(contract_value);
    }
    if let Some(start_date) = update.start_date {
        project.start_date = Some(start_date);
    }
    if let Some(end_date) = update.end_date {
        project.end_date = Some(end_date);
    }

    db.update_project(&project).await?;
    db.get_project(project_id)
        .await?
        .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))
}

/// Delete a project and everything it owns. Blob removal is best-effort; the
/// database delete proceeds regardless.
pub async fn cmd_delete_project(
    db: &Db,
    blob: &dyn BlobStore,
    actor: &str,
    project_id: &str,
) -> Result<()> {
    let project = authorize_project(db, project_id, actor).await?;

    for document in db.list_documents(&project.id).await? {
        if let Err(e) = blob.delete(&document.file_path).await {
            warn!("Failed to delete blob {}: {}", document.file_path, e);
        }
    }

    db.delete_project(&project.id).await?;
    info!("Deleted project {}", project.id);
    Ok(())
}
