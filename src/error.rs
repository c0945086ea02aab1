#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FlowError {
    #[error("Approval level {actual} cannot act on a step requiring level {required}")]
    Authorization { required: u8, actual: u8 },
    #[error("{0}")]
    Validation(String),
    #[error("Approval flow has no pending step, it is already resolved")]
    AlreadyResolved,
    #[error("Submission has not been submitted for approval")]
    NotSubmitted,
    #[error("Submission is still awaiting approval at level {level}")]
    InFlight { level: u8 },
    #[error("Approval flow was modified concurrently, reload and retry")]
    Conflict,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Unknown form variant: {0}")]
    UnknownVariant(String),
    #[error("Submission {0} was not found")]
    NotFound(String),
    #[error("Submission {0} can only be edited while drafted or rejected")]
    NotEditable(String),
    #[error("Only the original submitter may edit or submit {0}")]
    NotSubmitter(String),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be an integer between 1 and 9, got {value:?}")]
    InvalidLevels { key: &'static str, value: String },
    #[error("{0} must not be empty")]
    Empty(&'static str),
}
