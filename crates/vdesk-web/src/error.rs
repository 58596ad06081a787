use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebServerError {
    #[error("invalid listen address: {message}")]
    InvalidListen { message: String },

    #[error("front controller I/O error ({operation}): {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}
