use thiserror::Error;

/// Main error type for the assistant pipeline.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("invalid client context: {0}")]
    InvalidContext(String),

    #[error("could not isolate the command: {0}")]
    ExtractionAmbiguous(String),

    #[error("ambiguous date expression: {0}")]
    AmbiguousDate(String),

    #[error("could not resolve a date/time from \"{0}\"")]
    UnresolvableDateTime(String),

    #[error("no pending action, or it was already resolved")]
    PendingActionExists,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("language model error: {0}")]
    Llm(String),

    #[error("event store error: {0}")]
    Store(String),
}

pub type AssistantResult<T> = Result<T, AssistantError>;

impl AssistantError {
    /// Ambiguity errors are recovered locally as clarification replies
    /// instead of being raised to the client.
    pub fn is_clarification(&self) -> bool {
        matches!(
            self,
            AssistantError::ExtractionAmbiguous(_)
                | AssistantError::AmbiguousDate(_)
                | AssistantError::UnresolvableDateTime(_)
        )
    }

    /// Conversational message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            AssistantError::InvalidContext(_) => {
                "I couldn't read the date and time your device sent. Please try again.".to_string()
            }
            AssistantError::ExtractionAmbiguous(_) => {
                "I couldn't quite work out what you want to schedule. Could you rephrase that with the event and its time?".to_string()
            }
            AssistantError::AmbiguousDate(detail) => {
                format!("I'm not sure which moment you mean: {detail}. Could you give me the date explicitly?")
            }
            AssistantError::UnresolvableDateTime(phrase) => {
                format!("I couldn't turn \"{phrase}\" into a date and time. Could you say when exactly?")
            }
            AssistantError::PendingActionExists => {
                "There's nothing waiting for confirmation right now.".to_string()
            }
            AssistantError::NotFound(detail) => {
                format!("I couldn't find that event ({detail}).")
            }
            AssistantError::Validation(detail) => {
                format!("That doesn't look right: {detail}.")
            }
            AssistantError::Llm(_) | AssistantError::Store(_) => {
                "Something went wrong on my side. Please try again in a moment.".to_string()
            }
        }
    }
}

pub fn validation_error(message: &str) -> AssistantError {
    AssistantError::Validation(message.to_string())
}

pub fn context_error(message: &str) -> AssistantError {
    AssistantError::InvalidContext(message.to_string())
}
