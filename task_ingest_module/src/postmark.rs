use serde::Deserialize;

/// Fields of the Postmark inbound webhook used for task creation.
///
/// Any other key in the webhook body is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostmarkInbound {
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "Subject")]
    pub subject: Option<String>,
    #[serde(rename = "MailboxHash")]
    pub mailbox_hash: Option<String>,
    #[serde(rename = "TextBody")]
    pub text_body: Option<String>,
    #[serde(rename = "HtmlBody")]
    pub html_body: Option<String>,
    #[serde(rename = "MessageID", alias = "MessageId")]
    pub message_id: Option<String>,
}

impl PostmarkInbound {
    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    pub fn sender_address(&self) -> Option<String> {
        self.from.as_deref().and_then(extract_address)
    }

    pub fn subject(&self) -> Option<&str> {
        non_blank(self.subject.as_deref())
    }

    pub fn mailbox_hash(&self) -> Option<&str> {
        non_blank(self.mailbox_hash.as_deref())
    }

    pub fn text_body(&self) -> Option<&str> {
        non_blank(self.text_body.as_deref())
    }

    pub fn html_body(&self) -> Option<&str> {
        non_blank(self.html_body.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

/// Reduces `Name <addr>` to `addr`; a bare address is only trimmed.
pub fn extract_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let address = match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if start < end => trimmed[start + 1..end].trim(),
        _ => trimmed,
    };
    if address.is_empty() {
        return None;
    }
    Some(address.to_string())
}
