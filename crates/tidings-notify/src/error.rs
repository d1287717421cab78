/// Errors raised while setting up email delivery.
///
/// Sending itself goes through [`crate::Mailer`], which reports failures as
/// `anyhow::Error` so transports can attach their own context.
///
/// # Examples
///
/// ```rust
/// use tidings_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing smtp host".to_string());
/// assert!(err.to_string().contains("smtp host"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Transport configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid mail configuration: {0}")]
    InvalidConfig(String),

    /// An email address could not be parsed.
    #[error("Notify: invalid address '{address}': {source}")]
    Address {
        address: String,
        source: lettre::address::AddressError,
    },

    /// SMTP transport error.
    #[error("Notify: SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Convenience `Result` alias for notification setup.
pub type Result<T> = std::result::Result<T, NotifyError>;
