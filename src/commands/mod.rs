//! Command implementations
//!
//! Each `cmd_*` function is one boundary operation: it authorizes the caller
//! first, then drives the stores and engines, and returns serializable data.
//! Rendering stays in `main.rs`; the MCP tools call the same functions.

mod budget;
mod document;
mod extract;
mod ingest;
mod project;
mod review;
mod status;

pub use budget::*;
pub use document::*;
pub use extract::*;
pub use ingest::*;
pub use project::*;
pub use review::*;
pub use status::*;

#[cfg(test)]
pub(crate) mod testutil;

use crate::db::{Db, Document, Project};
use crate::error::{Error, Result};

/// Resolve a project and require the caller to be its owner.
///
/// Ownership failures are opaque (`Error::Forbidden` renders as "not found or
/// access denied") so callers cannot probe for other owners' projects.
pub(crate) async fn authorize_project(db: &Db, project_id: &str, actor: &str) -> Result<Project> {
    let project = db
        .get_project(project_id)
        .await?
        .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))?;

    if project.owner != actor {
        return Err(Error::Forbidden);
    }

    Ok(project)
}

/// Resolve a document and require the caller to own its project
pub(crate) async fn authorize_document(
    db: &Db,
    document_id: &str,
    actor: &str,
) -> Result<(Document, Project)> {
    let document = db
        .get_document(document_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;

    let project = db.get_project(&document.project_id).await?;
    match project {
        Some(project) if project.owner == actor => Ok((document, project)),
        _ => Err(Error::Forbidden),
    }
}
