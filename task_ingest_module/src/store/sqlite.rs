use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::model::{
    is_valid_project_identifier, normalize_project_identifier, NewTask, Project, ProjectId, Task,
    TaskId, User, UserId,
};

use super::{
    MembershipRepository, ProjectRepository, StoreError, TaskRepository, UserRepository,
};

/// SQLite-backed board, one connection per call.
#[derive(Debug, Clone)]
pub struct SqliteBoardStore {
    path: PathBuf,
}

impl SqliteBoardStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    pub fn create_project(
        &self,
        name: &str,
        identifier: Option<&str>,
    ) -> Result<ProjectId, StoreError> {
        let identifier = match identifier.and_then(normalize_project_identifier) {
            Some(value) if !is_valid_project_identifier(&value) => {
                return Err(StoreError::InvalidIdentifier(value));
            }
            other => other,
        };
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO projects (name, identifier) VALUES (?1, ?2)",
            params![name, identifier],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn create_user(
        &self,
        username: &str,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<UserId, StoreError> {
        let email = email.map(str::trim).filter(|value| !value.is_empty());
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO users (username, name, email) VALUES (?1, ?2, ?3)",
            params![username, name, email],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns false when the membership already existed.
    pub fn add_member(&self, project_id: ProjectId, user_id: UserId) -> Result<bool, StoreError> {
        let conn = self.open()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO project_members (project_id, user_id) VALUES (?1, ?2)",
            params![project_id, user_id],
        )?;
        Ok(inserted > 0)
    }

    pub fn remove_member(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        let conn = self.open()?;
        let removed = conn.execute(
            "DELETE FROM project_members WHERE project_id = ?1 AND user_id = ?2",
            params![project_id, user_id],
        )?;
        Ok(removed > 0)
    }

    pub fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, project_id, creator_id, title, description, created_at
                 FROM tasks
                 WHERE id = ?1",
                params![task_id],
                task_columns,
            )
            .optional()?;
        row.map(task_from_columns).transpose()
    }

    pub fn list_project_tasks(&self, project_id: ProjectId) -> Result<Vec<Task>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, creator_id, title, description, created_at
             FROM tasks
             WHERE project_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![project_id], task_columns)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(task_from_columns(row?)?);
        }
        Ok(tasks)
    }

    pub fn count_tasks(&self) -> Result<i64, StoreError> {
        let conn = self.open()?;
        let count = conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        Ok(count)
    }

    fn open(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                identifier TEXT UNIQUE
             );
             CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                name TEXT,
                email TEXT
             );
             CREATE INDEX IF NOT EXISTS users_email_idx ON users (email);
             CREATE TABLE IF NOT EXISTS project_members (
                project_id INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
                PRIMARY KEY (project_id, user_id)
             );
             CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
                creator_id INTEGER NOT NULL REFERENCES users (id),
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL
             );",
        )?;
        Ok(conn)
    }
}

impl ProjectRepository for SqliteBoardStore {
    fn find_project_by_identifier(&self, identifier: &str) -> Result<Option<Project>, StoreError> {
        let Some(identifier) = normalize_project_identifier(identifier) else {
            return Ok(None);
        };
        let conn = self.open()?;
        let project = conn
            .query_row(
                "SELECT id, name, identifier FROM projects WHERE identifier = ?1",
                params![identifier],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }
}

impl UserRepository for SqliteBoardStore {
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(None);
        }
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, username, name, email FROM users WHERE email = ?1 ORDER BY id LIMIT 2",
        )?;
        let rows = stmt.query_map(params![email], user_from_row)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        if users.len() > 1 {
            warn!("email {} is shared by several users; refusing to pick one", email);
            return Ok(None);
        }
        Ok(users.pop())
    }
}

impl MembershipRepository for SqliteBoardStore {
    fn is_member(&self, project_id: ProjectId, user_id: UserId) -> Result<bool, StoreError> {
        let conn = self.open()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM project_members WHERE project_id = ?1 AND user_id = ?2",
                params![project_id, user_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl TaskRepository for SqliteBoardStore {
    fn create_task(&self, task: &NewTask) -> Result<TaskId, StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO tasks (project_id, creator_id, title, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                task.project_id,
                task.creator_id,
                task.title,
                task.description,
                format_datetime(Utc::now())
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

type TaskColumns = (TaskId, ProjectId, UserId, String, String, String);

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        identifier: row.get(2)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
    })
}

fn task_columns(row: &Row<'_>) -> rusqlite::Result<TaskColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn task_from_columns(columns: TaskColumns) -> Result<Task, StoreError> {
    let (id, project_id, creator_id, title, description, created_at) = columns;
    Ok(Task {
        id,
        project_id,
        creator_id,
        title,
        description,
        created_at: parse_datetime(&created_at)?,
    })
}

fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
