use tracing::{error, info, warn};

use crate::markup::html_to_markdown;
use crate::model::{NewTask, Project, ProjectId, TaskId, User, UserId};
use crate::notify::TaskNotifier;
use crate::postmark::PostmarkInbound;
use crate::store::{BoardStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("missing required field {0}")]
    MissingField(&'static str),
    #[error("no project matches routing token {0}")]
    UnknownProject(String),
    #[error("no user matches sender {0}")]
    UnknownUser(String),
    #[error("user {user_id} is not a member of project {project_id}")]
    NotMember {
        project_id: ProjectId,
        user_id: UserId,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReceiveError {
    /// Short machine-readable reason, used in webhook responses.
    pub fn reason(&self) -> &'static str {
        match self {
            ReceiveError::MissingField(_) => "missing_field",
            ReceiveError::UnknownProject(_) => "unknown_project",
            ReceiveError::UnknownUser(_) => "unknown_user",
            ReceiveError::NotMember { .. } => "not_member",
            ReceiveError::Store(_) => "store_error",
        }
    }
}

/// A task created from an inbound email, kept for the confirmation step.
#[derive(Debug, Clone)]
pub struct AcceptedTask {
    pub task_id: TaskId,
    pub project: Project,
    pub creator: User,
    pub task: NewTask,
}

/// Turns inbound Postmark emails into board tasks.
pub struct EmailTaskReceiver<S> {
    store: S,
    notifier: Option<Box<dyn TaskNotifier>>,
}

impl<S: BoardStore> EmailTaskReceiver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn TaskNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns true when a task was created; every rejection is logged and
    /// leaves the board untouched.
    pub fn receive_email(&self, payload: &PostmarkInbound) -> bool {
        match self.try_receive_email(payload) {
            Ok(_) => true,
            Err(ReceiveError::Store(err)) => {
                error!("inbound email dropped on store error: {}", err);
                false
            }
            Err(err) => {
                info!("skipping inbound email: {}", err);
                false
            }
        }
    }

    /// Creates the task and sends the confirmation before returning.
    pub fn try_receive_email(&self, payload: &PostmarkInbound) -> Result<TaskId, ReceiveError> {
        let accepted = self.accept_email(payload)?;
        self.notify(&accepted);
        Ok(accepted.task_id)
    }

    /// Creates the task without notifying; pair with [`Self::notify`].
    pub fn accept_email(&self, payload: &PostmarkInbound) -> Result<AcceptedTask, ReceiveError> {
        let sender = payload
            .sender_address()
            .ok_or(ReceiveError::MissingField("From"))?;
        let subject = payload
            .subject()
            .ok_or(ReceiveError::MissingField("Subject"))?;
        let mailbox_hash = payload
            .mailbox_hash()
            .ok_or(ReceiveError::MissingField("MailboxHash"))?;
        let text_body = payload
            .text_body()
            .ok_or(ReceiveError::MissingField("TextBody"))?;

        let project = self
            .store
            .find_project_by_identifier(mailbox_hash)?
            .ok_or_else(|| ReceiveError::UnknownProject(mailbox_hash.to_string()))?;
        let user = self
            .store
            .find_user_by_email(&sender)?
            .ok_or_else(|| ReceiveError::UnknownUser(sender.clone()))?;
        if !self.store.is_member(project.id, user.id)? {
            return Err(ReceiveError::NotMember {
                project_id: project.id,
                user_id: user.id,
            });
        }

        let task = NewTask {
            project_id: project.id,
            creator_id: user.id,
            title: subject.to_string(),
            description: task_description(payload.html_body(), text_body),
        };
        let task_id = self.store.create_task(&task)?;
        info!(
            "task created from email task_id={} project_id={} creator_id={} message_id={}",
            task_id,
            project.id,
            user.id,
            payload.message_id.as_deref().unwrap_or("-")
        );

        Ok(AcceptedTask {
            task_id,
            project,
            creator: user,
            task,
        })
    }

    /// Runs the configured notifier, if any. Failures are logged only.
    pub fn notify(&self, accepted: &AcceptedTask) {
        let Some(notifier) = self.notifier.as_ref() else {
            return;
        };
        if !notifier.task_created(
            &accepted.project,
            &accepted.creator,
            accepted.task_id,
            &accepted.task,
        ) {
            warn!(
                "task {} created but confirmation email was not sent",
                accepted.task_id
            );
        }
    }
}

/// Markdown from the HTML part when there is one, else the text part verbatim.
pub fn task_description(html_body: Option<&str>, text_body: &str) -> String {
    if let Some(html) = html_body.filter(|value| !value.trim().is_empty()) {
        let converted = html_to_markdown(html);
        if !converted.is_empty() {
            return converted;
        }
    }
    text_body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MembershipRepository, ProjectRepository, TaskRepository, UserRepository};
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct BrokenStore {
        create_calls: Cell<usize>,
    }

    impl ProjectRepository for BrokenStore {
        fn find_project_by_identifier(&self, _: &str) -> Result<Option<Project>, StoreError> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk gone",
            )))
        }
    }

    impl UserRepository for BrokenStore {
        fn find_user_by_email(&self, _: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
    }

    impl MembershipRepository for BrokenStore {
        fn is_member(&self, _: ProjectId, _: UserId) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    impl TaskRepository for BrokenStore {
        fn create_task(&self, _: &NewTask) -> Result<TaskId, StoreError> {
            self.create_calls.set(self.create_calls.get() + 1);
            Ok(1)
        }
    }

    fn payload() -> PostmarkInbound {
        PostmarkInbound {
            from: Some("me@localhost".to_string()),
            subject: Some("Email task".to_string()),
            mailbox_hash: Some("test1".to_string()),
            text_body: Some("boo".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn description_prefers_converted_html() {
        assert_eq!(
            task_description(Some("<p><strong>boo</strong></p>"), "boo"),
            "**boo**"
        );
    }

    #[test]
    fn description_uses_text_when_html_is_blank() {
        assert_eq!(task_description(Some(""), "**boo**"), "**boo**");
        assert_eq!(task_description(None, "**boo**"), "**boo**");
        assert_eq!(task_description(Some("<p> </p>"), "plain"), "plain");
    }

    #[test]
    fn missing_fields_are_reported_in_order() {
        let receiver = EmailTaskReceiver::new(BrokenStore {
            create_calls: Cell::new(0),
        });
        let err = receiver
            .try_receive_email(&PostmarkInbound::default())
            .unwrap_err();
        assert!(matches!(err, ReceiveError::MissingField("From")));

        let mut partial = payload();
        partial.text_body = None;
        let err = receiver.try_receive_email(&partial).unwrap_err();
        assert!(matches!(err, ReceiveError::MissingField("TextBody")));
        assert_eq!(err.reason(), "missing_field");
    }

    #[test]
    fn store_errors_become_false() {
        let receiver = EmailTaskReceiver::new(BrokenStore {
            create_calls: Cell::new(0),
        });
        assert!(!receiver.receive_email(&payload()));
        assert!(matches!(
            receiver.try_receive_email(&payload()),
            Err(ReceiveError::Store(_))
        ));
        assert_eq!(receiver.store().create_calls.get(), 0);
    }

    struct CountingNotifier {
        calls: Arc<AtomicUsize>,
    }

    impl TaskNotifier for CountingNotifier {
        fn task_created(&self, _: &Project, _: &User, _: TaskId, _: &NewTask) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    #[test]
    fn notifier_failure_does_not_fail_receive() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = crate::store::SqliteBoardStore::new(temp.path().join("board.db")).unwrap();
        let project = store.create_project("test2", Some("TEST1")).unwrap();
        let user = store.create_user("me", None, Some("me@localhost")).unwrap();
        store.add_member(project, user).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let receiver = EmailTaskReceiver::new(store).with_notifier(Box::new(CountingNotifier {
            calls: calls.clone(),
        }));

        assert!(receiver.receive_email(&payload()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(receiver.store().count_tasks().unwrap(), 1);
    }
}
