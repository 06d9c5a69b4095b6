use std::fmt;
use std::path::PathBuf;

// Failure classes the pipeline cares about: everything after tag injection
// owes a restoration pass, so callers need to know which step failed, not
// just that something did.
#[derive(Debug)]
pub enum Error {
    /// The requested build target has no source subdirectory. Raised before
    /// any tag injection has happened.
    TargetNotFound(PathBuf),
    /// Certificate issuance failed or left expected output files missing.
    Issuance(String),
    /// The external compiler could not be spawned or exited non-zero.
    Compile(String),
    /// The artifact post-processing command failed.
    PostProcess(String),
    Msg(String),
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::Msg(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TargetNotFound(dir) => {
                write!(f, "target source directory {} does not exist", dir.display())
            }
            Error::Issuance(msg) => write!(f, "certificate issuance failed: {msg}"),
            Error::Compile(msg) => write!(f, "compile failed: {msg}"),
            Error::PostProcess(msg) => write!(f, "post-processing failed: {msg}"),
            Error::Msg(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
