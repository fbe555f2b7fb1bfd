//! profitiq CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use profitiq::{
    blob::FsBlobStore,
    commands::{
        cmd_budget_summary, cmd_confirm_document, cmd_create_project, cmd_delete_document,
        cmd_delete_project, cmd_extract_document, cmd_ingest_email, cmd_list_documents,
        cmd_list_emails, cmd_list_projects, cmd_reject_document, cmd_set_budget,
        cmd_show_document, cmd_show_project, cmd_status, cmd_update_project,
        cmd_upload_document, cmd_verify_ingest_token, ConfirmRequest, DocumentFilter,
        EmailWithAttachments, ProjectCreate, ProjectOverview, ProjectUpdate, SystemStatus,
    },
    config::Config,
    db::{BudgetLine, Db, Document, Project, ProjectStatus},
    email::{parse_webhook_email, ParsedEmail, WebhookEmail},
    error::{Error, Result},
    extract::{parse_extraction, HttpModelClient},
    mcp::McpServer,
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "profitiq")]
#[command(version, about = "Project profitability tracking with AI document extraction", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize profitiq configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage project budgets
    Budget {
        #[command(subcommand)]
        action: BudgetAction,
    },

    /// Manage project documents
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// Ingest an inbound email routed by its project token
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },

    /// List ingested emails for a project
    Emails {
        /// Project ID
        project_id: String,
    },

    /// Show system status
    Status,

    /// Start MCP server on stdio, bound to one project
    Mcp {
        /// Project ID to expose
        #[arg(short, long)]
        project: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a new project
    Create {
        /// Project name
        name: String,

        /// Client name
        #[arg(long)]
        client: Option<String>,

        /// Site address
        #[arg(long)]
        address: Option<String>,

        /// Contract value
        #[arg(long)]
        contract_value: Option<f64>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,
    },

    /// List your projects
    List,

    /// Show a project with budget summary and totals
    Show {
        /// Project ID
        project_id: String,
    },

    /// Update a project
    Update {
        /// Project ID
        project_id: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// Client name
        #[arg(long)]
        client: Option<String>,

        /// Site address
        #[arg(long)]
        address: Option<String>,

        /// Status: active, completed, or on_hold
        #[arg(long)]
        status: Option<String>,

        /// Contract value
        #[arg(long)]
        contract_value: Option<f64>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,
    },

    /// Delete a project and all its data
    Remove {
        /// Project ID
        project_id: String,
    },
}

#[derive(Subcommand)]
enum BudgetAction {
    /// Show the budget-vs-actual summary
    Show {
        /// Project ID
        project_id: String,
    },

    /// Set the estimate for one category
    Set {
        /// Project ID
        project_id: String,

        /// Category: Labor, Materials, Equipment, Subcontractors, or Other
        category: String,

        /// Estimated amount
        amount: f64,
    },
}

#[derive(Subcommand)]
enum DocAction {
    /// Upload a PDF into a project
    Upload {
        /// Project ID
        project_id: String,

        /// Path to the PDF file
        file: PathBuf,
    },

    /// List documents for a project
    List {
        /// Project ID
        project_id: String,

        /// Filter by vendor name (partial match)
        #[arg(long)]
        vendor: Option<String>,

        /// Filter by document type
        #[arg(long = "type")]
        document_type: Option<String>,

        /// Filter by status
        #[arg(long)]
        status: Option<String>,
    },

    /// Show a document and its line items
    Show {
        /// Document ID
        document_id: String,
    },

    /// Run AI extraction on a document
    Extract {
        /// Document ID
        document_id: String,
    },

    /// Confirm a document's extraction, committing its line items
    Confirm {
        /// Document ID
        document_id: String,

        /// Path to the reviewed confirmation JSON
        #[arg(long, conflicts_with = "accept")]
        file: Option<PathBuf>,

        /// Confirm the stored extraction as-is, without edits
        #[arg(long)]
        accept: bool,
    },

    /// Reject a document's extraction
    Reject {
        /// Document ID
        document_id: String,
    },

    /// Delete a document and its line items
    Remove {
        /// Document ID
        document_id: String,
    },
}

#[derive(Subcommand)]
enum IngestSource {
    /// Ingest an email from a JSON payload file
    Email {
        /// Project ingest token
        token: String,

        /// Path to the payload (inbound-webhook JSON, or normalized with --normalized)
        #[arg(long)]
        payload: Option<PathBuf>,

        /// Treat the payload as the normalized email JSON shape
        #[arg(long)]
        normalized: bool,

        /// Only verify the token resolves, without ingesting
        #[arg(long, conflicts_with = "payload")]
        verify: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli).await;
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "profitiq", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration
    let config = load_config(cli.config.as_deref())?;

    // Initialize components
    let db = Db::new(&config.paths.db_file).await?;
    let blob = FsBlobStore::new(config.paths.blob_dir.clone())?;
    let actor = config.owner.clone();

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Project { action } => match action {
            ProjectAction::Create {
                name,
                client,
                address,
                contract_value,
                start_date,
                end_date,
            } => {
                let project = cmd_create_project(
                    &db,
                    &actor,
                    ProjectCreate {
                        name,
                        client_name: client,
                        address,
                        contract_value,
                        start_date,
                        end_date,
                    },
                )
                .await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&project)?);
                } else {
                    println!("✓ Created project '{}'", project.name);
                    println!("  ID: {}", project.id);
                    println!("  Ingest token: {}", project.ingest_token);
                }
            }

            ProjectAction::List => {
                let projects = cmd_list_projects(&db, &actor).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&projects)?);
                } else {
                    print_projects(&projects);
                }
            }

            ProjectAction::Show { project_id } => {
                let overview = cmd_show_project(&db, &actor, &project_id).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&overview)?);
                } else {
                    print_overview(&overview);
                }
            }

            ProjectAction::Update {
                project_id,
                name,
                client,
                address,
                status,
                contract_value,
                start_date,
                end_date,
            } => {
                let status = match status {
                    Some(raw) => Some(raw.parse::<ProjectStatus>()?),
                    None => None,
                };
                let project = cmd_update_project(
                    &db,
                    &actor,
                    &project_id,
                    ProjectUpdate {
                        name,
                        client_name: client,
                        address,
                        status,
                        contract_value,
                        start_date,
                        end_date,
                    },
                )
                .await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&project)?);
                } else {
                    println!("✓ Updated project '{}'", project.name);
                }
            }

            ProjectAction::Remove { project_id } => {
                cmd_delete_project(&db, &blob, &actor, &project_id).await?;
                if cli.json {
                    println!(r#"{{"success": true}}"#);
                } else {
                    println!("✓ Project {} removed", project_id);
                }
            }
        },

        Commands::Budget { action } => match action {
            BudgetAction::Show { project_id } => {
                let summary = cmd_budget_summary(&db, &actor, &project_id).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                } else {
                    print_budget(&summary);
                }
            }

            BudgetAction::Set {
                project_id,
                category,
                amount,
            } => {
                let estimate = cmd_set_budget(&db, &actor, &project_id, &category, amount).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&estimate)?);
                } else {
                    println!(
                        "✓ {} estimate set to {:.2}",
                        estimate.category, estimate.estimated_amount
                    );
                }
            }
        },

        Commands::Doc { action } => match action {
            DocAction::Upload { project_id, file } => {
                let document =
                    cmd_upload_document(&config, &db, &blob, &actor, &project_id, &file).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&document)?);
                } else {
                    println!("✓ Uploaded '{}'", document.file_name);
                    println!("  ID: {}", document.id);
                    println!("  Status: {}", document.status);
                }
            }

            DocAction::List {
                project_id,
                vendor,
                document_type,
                status,
            } => {
                let filter = DocumentFilter {
                    vendor,
                    document_type: match document_type {
                        Some(raw) => Some(raw.parse()?),
                        None => None,
                    },
                    status: match status {
                        Some(raw) => Some(raw.parse()?),
                        None => None,
                    },
                };
                let documents = cmd_list_documents(&db, &actor, &project_id, &filter).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&documents)?);
                } else {
                    print_documents(&documents);
                }
            }

            DocAction::Show { document_id } => {
                let detail = cmd_show_document(&db, &actor, &document_id).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&detail)?);
                } else {
                    print_document_line(&detail.document);
                    if !detail.line_items.is_empty() {
                        println!("  Line items ({}):", detail.line_items.len());
                        for item in &detail.line_items {
                            println!(
                                "    {:<15} {:>12.2}  {}",
                                item.category.as_deref().unwrap_or("-"),
                                item.total,
                                item.description
                            );
                        }
                    }
                }
            }

            DocAction::Extract { document_id } => {
                let model = HttpModelClient::new(&config.model)?;
                let outcome =
                    cmd_extract_document(&config, &db, &blob, &model, &actor, &document_id).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                } else {
                    println!(
                        "✓ Extracted {} line items (confidence {:.2})",
                        outcome.extraction.line_items.len(),
                        outcome.extraction.confidence
                    );
                    println!("  Vendor: {}", outcome.extraction.vendor.name);
                    println!("  Total: {:.2}", outcome.extraction.totals.total);
                    println!(
                        "  Review and confirm with 'profitiq doc confirm {}'",
                        document_id
                    );
                }
            }

            DocAction::Confirm {
                document_id,
                file,
                accept,
            } => {
                let request = if accept {
                    confirm_request_from_stored(&db, &document_id).await?
                } else {
                    let path = file.ok_or_else(|| {
                        Error::Validation(
                            "Provide --file with the reviewed JSON, or --accept".to_string(),
                        )
                    })?;
                    let content = std::fs::read_to_string(&path)?;
                    serde_json::from_str::<ConfirmRequest>(&content)?
                };

                let document = cmd_confirm_document(&db, &actor, &document_id, request).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&document)?);
                } else {
                    println!("✓ Document confirmed; line items now count toward actuals");
                }
            }

            DocAction::Reject { document_id } => {
                let document = cmd_reject_document(&db, &actor, &document_id).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&document)?);
                } else {
                    println!("✓ Document rejected; extraction cleared");
                }
            }

            DocAction::Remove { document_id } => {
                cmd_delete_document(&db, &blob, &actor, &document_id).await?;
                if cli.json {
                    println!(r#"{{"success": true}}"#);
                } else {
                    println!("✓ Document {} removed", document_id);
                }
            }
        },

        Commands::Ingest { source } => match source {
            IngestSource::Email {
                token,
                payload,
                normalized,
                verify,
            } => {
                if verify {
                    let name = cmd_verify_ingest_token(&db, &token).await?;
                    if cli.json {
                        println!(r#"{{"status": "ok", "project": "{}"}}"#, name);
                    } else {
                        println!("✓ Ingest token routes to '{}'", name);
                    }
                    return Ok(());
                }

                let path = payload.ok_or_else(|| {
                    Error::Validation("Provide --payload with the email JSON".to_string())
                })?;
                let content = std::fs::read_to_string(&path)?;
                let email: ParsedEmail = if normalized {
                    serde_json::from_str(&content)?
                } else {
                    parse_webhook_email(serde_json::from_str::<WebhookEmail>(&content)?)
                };

                let report = cmd_ingest_email(&config, &db, &blob, &token, email).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("✓ Ingested email '{}'", report.subject);
                    println!("  From: {}", report.from);
                    println!("  Attachments stored: {}", report.attachments_processed);
                    for attachment in &report.attachments {
                        println!(
                            "    {} ({} bytes){}",
                            attachment.filename,
                            attachment.size,
                            if attachment.is_financial {
                                " [financial]"
                            } else {
                                ""
                            }
                        );
                    }
                }
            }
        },

        Commands::Emails { project_id } => {
            let emails = cmd_list_emails(&db, &actor, &project_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&emails)?);
            } else {
                print_emails(&emails);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &db).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Mcp { project } => {
            let project = resolve_owned_project(&db, &project, &actor).await?;
            let server = McpServer::new(db, project);
            server
                .run()
                .await
                .map_err(|e| Error::McpProtocol(e.to_string()))?;
        }
    }

    Ok(())
}

/// Build a confirmation request from the document's stored extraction
async fn confirm_request_from_stored(db: &Db, document_id: &str) -> Result<ConfirmRequest> {
    let document = db
        .get_document(document_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;
    let raw = document.raw_extraction.as_deref().ok_or_else(|| {
        Error::Validation("Document has no stored extraction to accept".to_string())
    })?;
    let extraction = parse_extraction(raw)?;
    let summary = extraction.summary();

    Ok(ConfirmRequest {
        document_type: summary.document_type,
        vendor_name: summary.vendor_name,
        document_number: summary.document_number,
        document_date: summary.document_date,
        due_date: summary.due_date,
        total_amount: summary.total_amount,
        line_items: extraction.new_line_items(),
    })
}

/// Resolve a project for the MCP server, enforcing ownership up front
async fn resolve_owned_project(db: &Db, project_id: &str, actor: &str) -> Result<Project> {
    let project = db
        .get_project(project_id)
        .await?
        .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))?;
    if project.owner != actor {
        return Err(Error::Forbidden);
    }
    Ok(project)
}

async fn handle_init(cli: Cli) -> Result<()> {
    let Commands::Init { force } = cli.command else {
        unreachable!()
    };

    // Get the base directory: if user specifies config file, use its parent
    // dir, otherwise use the default base dir
    let (base_dir, config_path) = if let Some(path) = cli.config {
        let base = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir);
        let config = if path.extension().map_or(false, |e| e == "toml") {
            path
        } else {
            path.join("config.toml")
        };
        (base, config)
    } else {
        let base = Config::default_base_dir();
        (base.clone(), base.join("config.toml"))
    };

    if config_path.exists() && !force {
        eprintln!(
            "Config file already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
        std::process::exit(1);
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.save()?;

    // Create the database and blob directory up front
    Db::new(&config.paths.db_file).await?;
    std::fs::create_dir_all(&config.paths.blob_dir)?;

    println!("✓ profitiq initialized successfully");
    println!("  Config: {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Edit the config file to point at your extraction backend");
    println!("  2. Create a project: profitiq project create \"My Job\"");
    println!("  3. Upload a document: profitiq doc upload <project-id> invoice.pdf");

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'profitiq init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}

fn print_projects(projects: &[Project]) {
    if projects.is_empty() {
        println!("No projects yet. Create one with 'profitiq project create <name>'");
        return;
    }

    println!("Projects ({}):", projects.len());
    for project in projects {
        println!("  {} [{}] {}", project.id, project.status, project.name);
        if let Some(client) = &project.client_name {
            println!("      Client: {}", client);
        }
    }
}

fn print_overview(overview: &ProjectOverview) {
    let project = &overview.project;
    println!("{} [{}]", project.name, project.status);
    println!("  ID: {}", project.id);
    if let Some(client) = &project.client_name {
        println!("  Client: {}", client);
    }
    println!("  Ingest token: {}", project.ingest_token);
    println!();
    print_budget(&overview.budget);
    println!();
    println!("  Contract value: {:>12.2}", overview.totals.contract_value);
    println!("  Total actual:   {:>12.2}", overview.totals.total_actual);
    println!(
        "  Margin:         {:>12.2} ({:.1}%)",
        overview.totals.margin_amount, overview.totals.margin_percent
    );
}

fn print_budget(summary: &[BudgetLine]) {
    println!(
        "  {:<15} {:>12} {:>12} {:>12}",
        "Category", "Estimated", "Actual", "Variance"
    );
    for line in summary {
        println!(
            "  {:<15} {:>12.2} {:>12.2} {:>+12.2}",
            line.category.to_string(),
            line.estimated_amount,
            line.actual_amount,
            line.variance
        );
    }
}

fn print_documents(documents: &[Document]) {
    if documents.is_empty() {
        println!("No documents found.");
        return;
    }

    println!("Documents ({}):", documents.len());
    for document in documents {
        print_document_line(document);
    }
}

fn print_document_line(document: &Document) {
    println!(
        "  {} [{}] {}",
        document.id, document.status, document.file_name
    );
    if let Some(vendor) = &document.vendor_name {
        println!(
            "      {} {} {}",
            vendor,
            document.document_date.as_deref().unwrap_or("-"),
            document
                .total_amount
                .map(|t| format!("{:.2}", t))
                .unwrap_or_else(|| "-".to_string())
        );
    }
}

fn print_emails(emails: &[EmailWithAttachments]) {
    if emails.is_empty() {
        println!("No ingested emails.");
        return;
    }

    println!("Emails ({}):", emails.len());
    for entry in emails {
        println!(
            "  {} {} (from {})",
            entry.email.id,
            entry
                .email
                .email_subject
                .as_deref()
                .unwrap_or("(No Subject)"),
            entry.email.email_from.as_deref().unwrap_or("unknown")
        );
        for attachment in &entry.attachments {
            println!(
                "      {} [{}] {}",
                attachment.id, attachment.status, attachment.file_name
            );
        }
    }
}

fn print_status(status: &SystemStatus) {
    println!("profitiq status:");
    println!("  Owner: {}", status.owner);
    println!("  Model backend: {}", status.model_backend);
    println!("  Model: {}", status.model_name);
    println!("  Database: {}", status.db_file);
    println!("  Projects: {}", status.stats.project_count);
    println!("  Documents: {}", status.stats.document_count);
    println!("  Line items: {}", status.stats.line_item_count);
}
