#![allow(dead_code)]

use task_ingest_module::{PostmarkInbound, SqliteBoardStore};
use tempfile::TempDir;

/// Fresh board whose first user is an admin, so the next user gets id 2.
pub fn board_with_admin() -> Result<(TempDir, SqliteBoardStore), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let store = SqliteBoardStore::new(temp.path().join("board.db"))?;
    store.create_user("admin", None, None)?;
    Ok((temp, store))
}

pub fn inbound(from: &str, subject: &str, mailbox_hash: &str, text_body: &str) -> PostmarkInbound {
    PostmarkInbound {
        from: Some(from.to_string()),
        subject: Some(subject.to_string()),
        mailbox_hash: Some(mailbox_hash.to_string()),
        text_body: Some(text_body.to_string()),
        ..Default::default()
    }
}
