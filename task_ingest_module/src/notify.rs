use send_emails_module::{HttpClient, PostmarkSender, ReqwestHttpClient};
use tracing::debug;

use crate::model::{NewTask, Project, TaskId, User};

pub const DEFAULT_NOTIFICATION_FROM_NAME: &str = "Task Board";

/// Told about every task created from an inbound email.
pub trait TaskNotifier: Send + Sync {
    /// Returns whether the notification went out; failures never undo the task.
    fn task_created(&self, project: &Project, creator: &User, task_id: TaskId, task: &NewTask)
        -> bool;
}

/// Emails the creator a confirmation through Postmark.
pub struct PostmarkTaskNotifier<C = ReqwestHttpClient> {
    sender: PostmarkSender<C>,
    from_name: String,
}

impl<C: HttpClient> PostmarkTaskNotifier<C> {
    pub fn new(sender: PostmarkSender<C>, from_name: impl Into<String>) -> Self {
        Self {
            sender,
            from_name: from_name.into(),
        }
    }

    pub fn sender(&self) -> &PostmarkSender<C> {
        &self.sender
    }
}

impl<C: HttpClient + Send + Sync> TaskNotifier for PostmarkTaskNotifier<C> {
    fn task_created(
        &self,
        project: &Project,
        creator: &User,
        task_id: TaskId,
        task: &NewTask,
    ) -> bool {
        let Some(address) = creator.email.as_deref() else {
            debug!("creator {} has no email; skipping notification", creator.id);
            return false;
        };
        let subject = format!("[{}] New task #{}: {}", project.name, task_id, task.title);
        let html = format!(
            "<p>Task <strong>#{}</strong> &quot;{}&quot; was created in project <strong>{}</strong> from your email.</p>",
            task_id,
            escape_html(&task.title),
            escape_html(&project.name)
        );
        self.sender.send_email(
            address,
            creator.display_name(),
            &subject,
            &html,
            &self.from_name,
        )
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
