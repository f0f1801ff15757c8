use thiserror::Error;

/// Coarse classification of [`Error`], used to pick an HTTP status or a
/// process exit code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    Conflict,
    Forbidden,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("unsupported database type `{0}`")]
    UnsupportedDatabase(String),

    #[error(transparent)]
    Sql(#[from] sqlx::Error),

    #[error("failed to render {what}: {message}")]
    Render { what: &'static str, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("read-only mode: {0} is disabled")]
    ReadOnly(&'static str),

    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedDatabase(_)
            | Error::InvalidInput(_)
            | Error::InvalidIdentifier(_)
            | Error::Config(_) => ErrorKind::Usage,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::ReadOnly(_) => ErrorKind::Forbidden,
            Error::Sql(sqlx::Error::RowNotFound) => ErrorKind::NotFound,
            Error::Sql(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                ErrorKind::Conflict
            }
            Error::Connection { .. } | Error::Sql(_) | Error::Render { .. } | Error::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal | ErrorKind::Conflict => 1,
        ErrorKind::Usage | ErrorKind::Forbidden => 2,
        ErrorKind::NotFound => 3,
    }
}
