//! Error types for the sink system

pub type Result<T> = std::result::Result<T, SinkError>;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Options could not be parsed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// File sink error with path
    #[error("File sink error for '{path}': {message}")]
    FileSinkError { path: String, message: String },

    /// File rotation error
    #[error("File rotation failed for '{path}': {message}")]
    FileRotationError { path: String, message: String },

    /// Operation on a sink that has already been closed
    #[error("Sink '{name}' is closed")]
    SinkClosed { name: String },

    /// The draining worker thread could not be started
    #[error("Failed to spawn draining worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// A sink operation panicked inside the draining worker
    #[error("Sink '{sink}' panicked during {operation}: {message}")]
    WorkerPanicked {
        sink: String,
        operation: &'static str,
        message: String,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl SinkError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        SinkError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        SinkError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a file sink error
    pub fn file_sink(path: impl Into<String>, message: impl Into<String>) -> Self {
        SinkError::FileSinkError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a file rotation error
    pub fn file_rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        SinkError::FileRotationError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn closed(name: impl Into<String>) -> Self {
        SinkError::SinkClosed { name: name.into() }
    }

    /// Create a worker panic report from a `catch_unwind` payload
    pub fn worker_panicked(
        sink: impl Into<String>,
        operation: &'static str,
        payload: &(dyn std::any::Any + Send),
    ) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        SinkError::WorkerPanicked {
            sink: sink.into(),
            operation,
            message,
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        SinkError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SinkError::config("ShardSet", "capacity must be at least 1");
        assert!(matches!(err, SinkError::InvalidConfiguration { .. }));

        let err = SinkError::file_sink("/var/log/app.log", "Permission denied");
        assert!(matches!(err, SinkError::FileSinkError { .. }));

        let err = SinkError::closed("file");
        assert!(matches!(err, SinkError::SinkClosed { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = SinkError::file_rotation("/var/log/app.log", "Disk full");
        assert_eq!(
            err.to_string(),
            "File rotation failed for '/var/log/app.log': Disk full"
        );

        let err = SinkError::closed("rotating_file");
        assert_eq!(err.to_string(), "Sink 'rotating_file' is closed");
    }

    #[test]
    fn test_worker_panicked_extracts_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        let err = SinkError::worker_panicked("memory", "write", payload.as_ref());
        assert_eq!(err.to_string(), "Sink 'memory' panicked during write: boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        let err = SinkError::worker_panicked("memory", "flush", payload.as_ref());
        assert!(err.to_string().ends_with("owned boom"));

        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u32);
        let err = SinkError::worker_panicked("memory", "flush", payload.as_ref());
        assert!(err.to_string().ends_with("Unknown panic"));
    }

    #[test]
    fn test_io_operation_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err =
            SinkError::io_operation("creating log directory", "cannot create /var/log", io_err);

        assert!(matches!(err, SinkError::IoOperation { .. }));
        assert!(err.to_string().contains("creating log directory"));
        assert!(err.to_string().contains("cannot create /var/log"));
    }
}
