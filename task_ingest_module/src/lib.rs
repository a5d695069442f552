//! Turns Postmark inbound emails into kanban board tasks.

pub mod config;
pub mod markup;
pub mod model;
pub mod notify;
pub mod postmark;
pub mod receiver;
pub mod server;
pub mod store;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::{ServiceConfig, DEFAULT_INBOUND_BODY_MAX_BYTES};
pub use markup::html_to_markdown;
pub use model::{NewTask, Project, ProjectId, Task, TaskId, User, UserId};
pub use notify::{PostmarkTaskNotifier, TaskNotifier};
pub use postmark::PostmarkInbound;
pub use receiver::{AcceptedTask, EmailTaskReceiver, ReceiveError};
pub use server::{build_receiver, router, run_server, AppState};
pub use store::{
    BoardStore, MembershipRepository, ProjectRepository, SqliteBoardStore, StoreError,
    TaskRepository, UserRepository,
};
