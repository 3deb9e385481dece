pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Model {0} is not supported")]
    UnknownModel(String),

    #[error("Model {model} does not support {command}")]
    UnsupportedCommand {
        model: String,
        command: String,
    },

    #[error("Invalid value {value:?} for {command} (expected one of {allowed:?})")]
    InvalidValue {
        command: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Parse error: {0}")]
    Parse(String),
}
