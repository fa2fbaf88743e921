use std::path::PathBuf;

pub type ReelResult<T> = Result<T, ReelError>;

/// Coarse error classification used in reports and exit messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Navigation,
    TimeControl,
    Capture,
    ReadinessTimeout,
    Assembly,
    Publish,
    BatchAbort,
    Other,
}

#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("navigation error: {0}")]
    Navigation(String),

    #[error("time control error: {0}")]
    TimeControl(String),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("capture error: frame {index}: {message}")]
    Frame { index: u64, message: String },

    #[error(
        "readiness timeout: file {} not stable after {waited_ms}ms (last size {last_size} bytes)",
        display_path(.path)
    )]
    ReadinessTimeout {
        path: Option<PathBuf>,
        last_size: u64,
        waited_ms: u64,
    },

    #[error("assembly error: {0}")]
    Assembly(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("batch aborted by '{output_id}': {source}")]
    BatchAbort {
        output_id: String,
        #[source]
        source: Box<ReelError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn navigation(msg: impl Into<String>) -> Self {
        Self::Navigation(msg.into())
    }

    pub fn time_control(msg: impl Into<String>) -> Self {
        Self::TimeControl(msg.into())
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    pub fn frame(index: u64, msg: impl Into<String>) -> Self {
        Self::Frame {
            index,
            message: msg.into(),
        }
    }

    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    pub fn batch_abort(output_id: impl Into<String>, source: ReelError) -> Self {
        Self::BatchAbort {
            output_id: output_id.into(),
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Navigation(_) => ErrorKind::Navigation,
            Self::TimeControl(_) => ErrorKind::TimeControl,
            Self::Capture(_) | Self::Frame { .. } => ErrorKind::Capture,
            Self::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            Self::Assembly(_) => ErrorKind::Assembly,
            Self::Publish(_) => ErrorKind::Publish,
            Self::BatchAbort { .. } => ErrorKind::BatchAbort,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!("'{}'", p.display()),
        None => "<unknown>".to_owned(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
