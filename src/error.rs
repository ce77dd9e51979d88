use std::io;
use std::process::ExitStatus;

/// Everything that can abort a benchmark run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A tracing control operation (create/enable/start/stop/destroy) failed.
    #[error("LTTng: {op}: {message}")]
    Tracing { op: &'static str, message: String },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("malformed benchmark output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timing record has no `{field}` field")]
    MissingField { field: &'static str },

    #[error("CPU hot-plug: {0}")]
    Cpu(String),

    #[error("trace at {path} is not readable yet: {reason}")]
    TraceNotReady { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("interrupted")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn tracing(op: &'static str, message: impl Into<String>) -> Self {
        Error::Tracing {
            op,
            message: message.into(),
        }
    }
}
