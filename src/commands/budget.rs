//! Budget commands

use super::authorize_project;
use crate::db::{BudgetEstimate, BudgetLine, Db};
use crate::error::{Error, Result};

/// Budget-vs-actual summary for a project (always the full five categories)
pub async fn cmd_budget_summary(db: &Db, actor: &str, project_id: &str) -> Result<Vec<BudgetLine>> {
    let project = authorize_project(db, project_id, actor).await?;
    db.budget_summary(&project.id).await
}

/// Upsert the estimate for one category
pub async fn cmd_set_budget(
    db: &Db,
    actor: &str,
    project_id: &str,
    category: &str,
    estimated_amount: f64,
) -> Result<BudgetEstimate> {
    let category = category.parse()?;

    if !estimated_amount.is_finite() || estimated_amount < 0.0 {
        return Err(Error::Validation(
            "Estimated amount must be a non-negative number".to_string(),
        ));
    }

    let project = authorize_project(db, project_id, actor).await?;
    db.upsert_budget_estimate(&project.id, category, estimated_amount)
        .await
}
