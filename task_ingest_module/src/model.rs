use chrono::{DateTime, Utc};
use serde::Serialize;

pub type ProjectId = i64;
pub type UserId = i64;
pub type TaskId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

/// Task fields supplied by the caller; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub project_id: ProjectId,
    pub creator_id: UserId,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub creator_id: UserId,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Project identifiers are stored and compared upper-cased.
pub fn normalize_project_identifier(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_uppercase())
}

pub fn is_valid_project_identifier(identifier: &str) -> bool {
    !identifier.is_empty() && identifier.chars().all(|ch| ch.is_ascii_alphanumeric())
}
