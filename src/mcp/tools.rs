//! MCP tool definitions and handlers
//!
//! Five read-only projections over one project's financial data, for a
//! conversational agent to narrate. The project is bound when the server
//! starts; no tool can reach across projects. No tool mutates anything.

use super::types::{ToolDefinition, ToolResult};
use crate::commands::{filter_documents, DocumentFilter};
use crate::db::{BudgetCategory, BudgetLine, Db};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::error;

/// Get all available tool definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    let category_schema = json!({
        "type": "string",
        "enum": ["Labor", "Materials", "Equipment", "Subcontractors", "Other"]
    });

    vec![
        ToolDefinition {
            name: "project_status".to_string(),
            description: "Get the current status and financial summary of the project including contract value, costs, and margin.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolDefinition {
            name: "budget_details".to_string(),
            description: "Get detailed budget information for a specific category or all categories, with under/over budget classification.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "enum": ["Labor", "Materials", "Equipment", "Subcontractors", "Other"],
                        "description": "Optional: specific category to filter by"
                    }
                }
            }),
        },
        ToolDefinition {
            name: "list_documents".to_string(),
            description: "Get a list of documents for the project, optionally filtered by vendor name, document type, or status.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "vendor_name": {
                        "type": "string",
                        "description": "Filter by vendor name (partial match)"
                    },
                    "document_type": {
                        "type": "string",
                        "enum": ["invoice", "quote", "estimate", "change_order", "receipt", "other", "email"],
                        "description": "Filter by document type"
                    },
                    "status": {
                        "type": "string",
                        "enum": ["pending", "processing", "extracted", "confirmed", "rejected", "failed"],
                        "description": "Filter by document status"
                    }
                }
            }),
        },
        ToolDefinition {
            name: "line_items".to_string(),
            description: "Get line items from confirmed documents, optionally filtered by category.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "category": category_schema,
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of items to return (default: 20)",
                        "default": 20,
                        "minimum": 1
                    }
                }
            }),
        },
        ToolDefinition {
            name: "cost_breakdown".to_string(),
            description: "Get a breakdown of costs by vendor or category to understand spending patterns.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "group_by": {
                        "type": "string",
                        "enum": ["vendor", "category"],
                        "description": "Group costs by vendor or by category"
                    }
                },
                "required": ["group_by"]
            }),
        },
    ]
}

/// Dispatch a tool call scoped to the bound project
pub async fn handle_tool_call(
    name: &str,
    arguments: &HashMap<String, Value>,
    db: &Db,
    project_id: &str,
) -> ToolResult {
    let result = match name {
        "project_status" => handle_project_status(db, project_id).await,
        "budget_details" => handle_budget_details(db, project_id, arguments).await,
        "list_documents" => handle_list_documents(db, project_id, arguments).await,
        "line_items" => handle_line_items(db, project_id, arguments).await,
        "cost_breakdown" => handle_cost_breakdown(db, project_id, arguments).await,
        _ => return ToolResult::error(format!("Unknown tool: {}", name)),
    };

    match result {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => ToolResult::text(text),
            Err(e) => ToolResult::error(format!("Failed to serialize result: {}", e)),
        },
        Err(e) => {
            error!("Tool {} failed: {}", name, e);
            ToolResult::error(format!("{} failed: {}", name, e))
        }
    }
}

fn arg_str(arguments: &HashMap<String, Value>, key: &str) -> Option<String> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn variance_status(line: &BudgetLine) -> &'static str {
    if line.variance > 0.0 {
        "under_budget"
    } else if line.variance < 0.0 {
        "over_budget"
    } else {
        "on_budget"
    }
}

async fn handle_project_status(db: &Db, project_id: &str) -> crate::error::Result<Value> {
    let project = db
        .get_project(project_id)
        .await?
        .ok_or_else(|| crate::error::Error::ProjectNotFound(project_id.to_string()))?;
    let totals = db.project_totals(project_id).await?;
    let summary = db.budget_summary(project_id).await?;

    Ok(json!({
        "project": {
            "name": project.name,
            "client_name": project.client_name,
            "status": project.status,
            "start_date": project.start_date,
            "end_date": project.end_date,
        },
        "financials": {
            "contract_value": totals.contract_value,
            "total_estimated": totals.total_estimated,
            "total_actual": totals.total_actual,
            "margin_amount": totals.margin_amount,
            "margin_percent": totals.margin_percent,
        },
        "budget_by_category": summary.iter().map(|s| json!({
            "category": s.category,
            "estimated": s.estimated_amount,
            "actual": s.actual_amount,
            "variance": s.variance,
            "variance_percent": if s.estimated_amount > 0.0 {
                json!(format!("{:.1}", s.variance / s.estimated_amount * 100.0))
            } else {
                json!("N/A")
            },
        })).collect::<Vec<_>>(),
    }))
}

async fn handle_budget_details(
    db: &Db,
    project_id: &str,
    arguments: &HashMap<String, Value>,
) -> crate::error::Result<Value> {
    let category: Option<BudgetCategory> = match arg_str(arguments, "category") {
        Some(raw) => Some(raw.parse()?),
        None => None,
    };

    let summary = db.budget_summary(project_id).await?;
    let filtered: Vec<&BudgetLine> = summary
        .iter()
        .filter(|s| category.map_or(true, |c| s.category == c))
        .collect();

    let total_estimated: f64 = filtered.iter().map(|s| s.estimated_amount).sum();
    let total_actual: f64 = filtered.iter().map(|s| s.actual_amount).sum();
    let total_variance: f64 = filtered.iter().map(|s| s.variance).sum();

    Ok(json!({
        "categories": filtered.iter().map(|s| json!({
            "category": s.category,
            "estimated": s.estimated_amount,
            "actual": s.actual_amount,
            "variance": s.variance,
            "status": variance_status(s),
        })).collect::<Vec<_>>(),
        "totals": {
            "total_estimated": total_estimated,
            "total_actual": total_actual,
            "total_variance": total_variance,
        },
    }))
}

async fn handle_list_documents(
    db: &Db,
    project_id: &str,
    arguments: &HashMap<String, Value>,
) -> crate::error::Result<Value> {
    let filter = DocumentFilter {
        vendor: arg_str(arguments, "vendor_name"),
        document_type: match arg_str(arguments, "document_type") {
            Some(raw) => Some(raw.parse()?),
            None => None,
        },
        status: match arg_str(arguments, "status") {
            Some(raw) => Some(raw.parse()?),
            None => None,
        },
    };

    let documents = filter_documents(db.list_documents(project_id).await?, &filter);

    Ok(json!({
        "count": documents.len(),
        "documents": documents.iter().map(|d| json!({
            "id": d.id,
            "file_name": d.file_name,
            "vendor_name": d.vendor_name,
            "document_type": d.document_type,
            "status": d.status,
            "document_date": d.document_date,
            "total_amount": d.total_amount,
        })).collect::<Vec<_>>(),
    }))
}

async fn handle_line_items(
    db: &Db,
    project_id: &str,
    arguments: &HashMap<String, Value>,
) -> crate::error::Result<Value> {
    let category: Option<BudgetCategory> = match arg_str(arguments, "category") {
        Some(raw) => Some(raw.parse()?),
        None => None,
    };
    let limit = arguments
        .get("limit")
        .and_then(|v| v.as_u64())
        .unwrap_or(20) as usize;

    let items = db.list_confirmed_line_items(project_id).await?;
    let filtered: Vec<_> = items
        .into_iter()
        .filter(|i| {
            category.map_or(true, |c| i.category.as_deref() == Some(c.to_string().as_str()))
        })
        .collect();

    let total_amount: f64 = filtered.iter().map(|i| i.total).sum();
    let limited: Vec<_> = filtered.iter().take(limit).collect();

    Ok(json!({
        "total_count": filtered.len(),
        "returned_count": limited.len(),
        "total_amount": total_amount,
        "items": limited.iter().map(|i| json!({
            "description": i.description,
            "quantity": i.quantity,
            "unit": i.unit,
            "unit_price": i.unit_price,
            "total": i.total,
            "category": i.category,
        })).collect::<Vec<_>>(),
    }))
}

async fn handle_cost_breakdown(
    db: &Db,
    project_id: &str,
    arguments: &HashMap<String, Value>,
) -> crate::error::Result<Value> {
    let group_by = arg_str(arguments, "group_by").unwrap_or_else(|| "category".to_string());

    if group_by == "vendor" {
        let documents = db.list_documents(project_id).await?;
        let mut by_vendor: HashMap<String, f64> = HashMap::new();
        for doc in documents.iter().filter(|d| d.status == "confirmed") {
            let vendor = doc
                .vendor_name
                .clone()
                .unwrap_or_else(|| "Unknown".to_string());
            *by_vendor.entry(vendor).or_insert(0.0) += doc.total_amount.unwrap_or(0.0);
        }

        let mut sorted: Vec<(String, f64)> = by_vendor.into_iter().collect();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let total: f64 = sorted.iter().map(|(_, amount)| amount).sum();

        Ok(json!({
            "grouped_by": "vendor",
            "breakdown": sorted.iter().map(|(vendor, amount)| json!({
                "vendor": vendor,
                "amount": amount,
            })).collect::<Vec<_>>(),
            "total": total,
        }))
    } else {
        let summary = db.budget_summary(project_id).await?;
        let total: f64 = summary.iter().map(|s| s.actual_amount).sum();

        Ok(json!({
            "grouped_by": "category",
            "breakdown": summary.iter().map(|s| json!({
                "category": s.category,
                "estimated": s.estimated_amount,
                "actual": s.actual_amount,
                "variance": s.variance,
            })).collect::<Vec<_>>(),
            "total": total,
        }))
    }
}
