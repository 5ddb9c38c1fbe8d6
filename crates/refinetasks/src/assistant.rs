use async_trait::async_trait;
use refinecore::StepError;

/// Opaque AI capability the transformation steps call.
///
/// The engine never interprets what comes back; it only moves the text
/// through the environment and the persisted records.
#[async_trait]
pub trait CodeAssistant: Send + Sync {
    async fn transform(&self, instruction: &str, code: &str) -> Result<String, StepError>;
}

/// Deterministic assistant for the CLI and tests: prepends the instruction
/// as a banner comment instead of calling a model.
pub struct AnnotatingAssistant;

#[async_trait]
impl CodeAssistant for AnnotatingAssistant {
    async fn transform(&self, instruction: &str, code: &str) -> Result<String, StepError> {
        Ok(format!("// {instruction}\n{code}"))
    }
}
