use thiserror::Error;

#[derive(Debug, Error)]
pub enum FarmError {
    #[error("too many errors: {errors} exceeds ceiling {ceiling}")]
    TooManyErrors { errors: u32, ceiling: u32 },

    #[error("invalid farmer key: {0}")]
    InvalidFarmerKey(String),

    #[error("bridge request to {path} failed with {status}: {body}")]
    Bridge {
        path: String,
        status: u16,
        body: String,
    },

    #[error("pow process stdout was not captured")]
    MissingStdout,

    #[error("empty command line")]
    EmptyCommand,
}
