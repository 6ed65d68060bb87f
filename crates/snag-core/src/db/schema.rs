//! Canonical SQLite schema for snag.
//!
//! - `users`, `projects`, `project_members`, `stages` hold the organizational
//!   records
//! - `defects` keeps the current fields of every defect
//! - `attachments`, `comments`, `status_history` are append-only children of
//!   a defect and cascade with it
//! - `snag_meta` mirrors the schema version for diagnostics

/// Migration v1: core tables, foreign keys and enum checks.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE CHECK (length(trim(username)) > 0),
    email TEXT UNIQUE,
    role TEXT NOT NULL CHECK (role IN ('manager', 'engineer', 'observer')),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    project_id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'closed')),
    start_date TEXT,
    end_date TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS project_members (
    project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    added_at_us INTEGER NOT NULL,
    PRIMARY KEY (project_id, user_id)
);

CREATE TABLE IF NOT EXISTS stages (
    stage_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS defects (
    defect_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    stage_id INTEGER REFERENCES stages(stage_id) ON DELETE SET NULL,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description TEXT NOT NULL DEFAULT '',
    priority TEXT NOT NULL DEFAULT 'medium' CHECK (priority IN ('low', 'medium', 'high')),
    status TEXT NOT NULL DEFAULT 'new'
        CHECK (status IN ('new', 'in_progress', 'review', 'closed', 'cancelled')),
    performer_id INTEGER REFERENCES users(user_id) ON DELETE SET NULL,
    deadline TEXT,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS attachments (
    attachment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    defect_id INTEGER NOT NULL REFERENCES defects(defect_id) ON DELETE CASCADE,
    file_ref TEXT NOT NULL CHECK (length(trim(file_ref)) > 0),
    uploaded_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    comment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    defect_id INTEGER NOT NULL REFERENCES defects(defect_id) ON DELETE CASCADE,
    author_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    body TEXT NOT NULL,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS status_history (
    change_id INTEGER PRIMARY KEY AUTOINCREMENT,
    defect_id INTEGER NOT NULL REFERENCES defects(defect_id) ON DELETE CASCADE,
    old_status TEXT NOT NULL,
    new_status TEXT NOT NULL,
    changed_by INTEGER REFERENCES users(user_id) ON DELETE SET NULL,
    changed_at_us INTEGER NOT NULL,
    CHECK (old_status <> new_status)
);

CREATE TABLE IF NOT EXISTS snag_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO snag_meta (id, schema_version, created_at_us) VALUES (1, 1, 0);
";

/// Migration v2: read-path indexes for listing and reports.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_defects_project_status
    ON defects(project_id, status);

CREATE INDEX IF NOT EXISTS idx_defects_performer
    ON defects(performer_id, status);

CREATE INDEX IF NOT EXISTS idx_defects_stage
    ON defects(stage_id);

CREATE INDEX IF NOT EXISTS idx_defects_created
    ON defects(created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_project_members_user
    ON project_members(user_id, project_id);

CREATE INDEX IF NOT EXISTS idx_stages_project
    ON stages(project_id);

CREATE INDEX IF NOT EXISTS idx_comments_defect_created
    ON comments(defect_id, created_at_us);

CREATE INDEX IF NOT EXISTS idx_attachments_defect
    ON attachments(defect_id);

CREATE INDEX IF NOT EXISTS idx_status_history_defect
    ON status_history(defect_id, change_id);
";

/// Indexes that must exist after all migrations have run.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_defects_project_status",
    "idx_defects_performer",
    "idx_defects_stage",
    "idx_defects_created",
    "idx_project_members_user",
    "idx_stages_project",
    "idx_comments_defect_created",
    "idx_attachments_defect",
    "idx_status_history_defect",
];
