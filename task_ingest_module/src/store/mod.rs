//! Board lookups consumed by the email receiver.
//!
//! The receiver only sees these traits; `SqliteBoardStore` is the bundled
//! implementation used by the gateway binary and the tests.

mod sqlite;

use crate::model::{NewTask, Project, ProjectId, TaskId, User, UserId};

pub use sqlite::SqliteBoardStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid project identifier: {0}")]
    InvalidIdentifier(String),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
}

pub trait ProjectRepository {
    /// Looks up the single project whose identifier equals the normalized token.
    fn find_project_by_identifier(&self, identifier: &str) -> Result<Option<Project>, StoreError>;
}

pub trait UserRepository {
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}

pub trait MembershipRepository {
    fn is_member(&self, project_id: ProjectId, user_id: UserId) -> Result<bool, StoreError>;
}

pub trait TaskRepository {
    fn create_task(&self, task: &NewTask) -> Result<TaskId, StoreError>;
}

/// Everything the receiver needs from the board.
pub trait BoardStore:
    ProjectRepository + UserRepository + MembershipRepository + TaskRepository
{
}

impl<T> BoardStore for T where
    T: ProjectRepository + UserRepository + MembershipRepository + TaskRepository
{
}
