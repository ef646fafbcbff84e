//! Built-in agent implementations and the `builtin:` catalog units.
//!
//! | unit | implementations |
//! |------|-----------------|
//! | `builtin:utilities` | `EchoAgent`, `UppercaseAgent`, `DocumentAnalyzerAgent`, `TextToBinaryAgent` |
//! | `builtin:prompt` | `PromptAgent` |
//! | `builtin:email` | `EmailDraftAgent` |

mod email;
mod prompt;
mod text;

pub use email::{EmailDraft, EmailDraftAgent};
pub use prompt::PromptAgent;
pub use text::{DocumentAnalyzerAgent, EchoAgent, TextToBinaryAgent, UppercaseAgent};

use crate::loader::AgentCatalog;

pub const UTILITIES_UNIT: &str = "builtin:utilities";
pub const PROMPT_UNIT: &str = "builtin:prompt";
pub const EMAIL_UNIT: &str = "builtin:email";

pub fn register_builtins(catalog: AgentCatalog) -> AgentCatalog {
    catalog
        .register(UTILITIES_UNIT, "EchoAgent", |init| {
            Ok(Box::new(EchoAgent::new(init.name)))
        })
        .register(UTILITIES_UNIT, "UppercaseAgent", |init| {
            Ok(Box::new(UppercaseAgent::new(init.name)))
        })
        .register(UTILITIES_UNIT, "DocumentAnalyzerAgent", |init| {
            Ok(Box::new(DocumentAnalyzerAgent::new(init.name)))
        })
        .register(UTILITIES_UNIT, "TextToBinaryAgent", |init| {
            Ok(Box::new(TextToBinaryAgent::new(init.name)))
        })
        .register(PROMPT_UNIT, "PromptAgent", |init| {
            Ok(Box::new(PromptAgent::from_init(init)?))
        })
        .register(EMAIL_UNIT, "EmailDraftAgent", |init| {
            Ok(Box::new(EmailDraftAgent::new(init.name)?))
        })
}
