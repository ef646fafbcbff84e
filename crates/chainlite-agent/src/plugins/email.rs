//! Turns free text into an email draft. Nothing is sent; the rendered draft
//! is the output, so a later step (or a human) decides what to do with it.

use async_trait::async_trait;
use chainlite_core::ChainError;
use regex::Regex;

use crate::capability::Agent;

const ADDRESS_PATTERN: &str = r"[\w.-]+@[\w.-]+\.\w+";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDraft {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailDraft {
    pub fn render(&self) -> String {
        format!("To: {}\nSubject: {}\n\n{}", self.to, self.subject, self.body)
    }
}

pub struct EmailDraftAgent {
    name: String,
    address: Regex,
}

impl EmailDraftAgent {
    pub fn new(name: &str) -> Result<Self, ChainError> {
        let address = Regex::new(ADDRESS_PATTERN)
            .map_err(|e| ChainError::Configuration(format!("bad address pattern: {}", e)))?;
        Ok(Self {
            name: name.to_string(),
            address,
        })
    }

    /// `To:` / `Subject:` header lines, body after the first blank line that
    /// follows a recipient. Without a `To:` header the first address anywhere
    /// in the text is used and the whole text becomes the body.
    pub fn parse(&self, message: &str) -> Option<EmailDraft> {
        let lines: Vec<&str> = message.trim().lines().collect();
        let mut to: Option<String> = None;
        let mut subject = "No Subject".to_string();
        let mut body_start = 0;

        for (i, line) in lines.iter().enumerate() {
            let lower = line.to_lowercase();
            if lower.starts_with("to:") {
                to = Some(line[3..].trim().to_string());
            } else if lower.starts_with("subject:") {
                subject = line[8..].trim().to_string();
            } else if line.trim().is_empty() && to.is_some() {
                body_start = i + 1;
                break;
            }
        }

        let to = match to.filter(|t| !t.is_empty()) {
            Some(to) => to,
            None => {
                body_start = 0;
                self.address.find(message)?.as_str().to_string()
            }
        };

        Some(EmailDraft {
            to,
            subject,
            body: lines[body_start.min(lines.len())..].join("\n"),
        })
    }
}

#[async_trait]
impl Agent for EmailDraftAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: &str) -> Result<String, ChainError> {
        let draft = self.parse(input).ok_or_else(|| {
            ChainError::Execution(
                "Could not find a recipient email address. \
                 Please specify 'To: <email>' in the message or context."
                    .to_string(),
            )
        })?;
        tracing::debug!(agent = %self.name, to = %draft.to, "email drafted");
        Ok(draft.render())
    }
}
