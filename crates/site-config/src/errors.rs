use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid site table: {0}")]
    Invalid(String),
    #[error("unknown site '{0}'")]
    UnknownSite(String),
    #[error("site '{name}' extends unknown site '{base}'")]
    UnknownBase { name: String, base: String },
}
