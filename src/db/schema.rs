//! SQLite schema definition

/// SQL schema for the profitiq database
pub const SCHEMA_SQL: &str = r#"
-- Projects: one per construction job
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    client_name TEXT,
    address TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    contract_value REAL,
    start_date TEXT,
    end_date TEXT,
    ingest_token TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Budget categories: exactly one row per (project, category)
CREATE TABLE IF NOT EXISTS budget_categories (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    category TEXT NOT NULL,
    estimated_amount REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(project_id, category)
);

-- Documents: uploaded files, ingested emails, and email attachments
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    owner TEXT NOT NULL,
    file_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    file_size INTEGER,
    mime_type TEXT,
    document_type TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    raw_extraction TEXT,
    vendor_name TEXT,
    document_number TEXT,
    document_date TEXT,
    due_date TEXT,
    total_amount REAL,
    confirmed_at TEXT,
    parent_document_id TEXT REFERENCES documents(id),
    email_from TEXT,
    email_to TEXT,
    email_subject TEXT,
    email_body TEXT,
    email_received_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Line items: created only by document confirmation, replace-all semantics
CREATE TABLE IF NOT EXISTS line_items (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    project_id TEXT NOT NULL REFERENCES projects(id),
    description TEXT NOT NULL,
    quantity REAL,
    unit TEXT,
    unit_price REAL,
    total REAL NOT NULL,
    category TEXT,
    cost_code TEXT,
    sort_order INTEGER,
    created_at TEXT NOT NULL
);

-- Prompt executions: write-only extraction telemetry
CREATE TABLE IF NOT EXISTS prompt_executions (
    id TEXT PRIMARY KEY,
    prompt_id TEXT NOT NULL,
    project_id TEXT,
    document_id TEXT,
    input_tokens INTEGER,
    output_tokens INTEGER,
    latency_ms INTEGER,
    raw_response TEXT,
    parsed_response TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner);
CREATE INDEX IF NOT EXISTS idx_projects_token ON projects(ingest_token);
CREATE INDEX IF NOT EXISTS idx_budget_project ON budget_categories(project_id);
CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_id);
CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents(parent_document_id);
CREATE INDEX IF NOT EXISTS idx_line_items_document ON line_items(document_id);
CREATE INDEX IF NOT EXISTS idx_line_items_project ON line_items(project_id);
CREATE INDEX IF NOT EXISTS idx_prompt_executions_document ON prompt_executions(document_id);
"#;
