//! Error types for MIME operations.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The message failed validation and was not encoded.
    #[error("failed to encode message: {0}")]
    Validation(#[from] ValidationError),
}

/// Reasons a message is rejected before encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The sender address is empty.
    #[error("from address cannot be empty")]
    EmptyFrom,

    /// The sender address does not parse.
    #[error("invalid from address {address:?}: {source}")]
    InvalidFrom {
        /// The address as given.
        address: String,
        /// Why it failed to parse.
        source: AddressError,
    },

    /// No primary recipients.
    #[error("recipients cannot be empty")]
    EmptyRecipients,

    /// A primary recipient does not parse.
    #[error("invalid recipient address {address:?}: {source}")]
    InvalidRecipient {
        /// The address as given.
        address: String,
        /// Why it failed to parse.
        source: AddressError,
    },

    /// An extra header would corrupt the header block.
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader {
        /// Header name as given.
        name: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl ValidationError {
    /// Returns the offending address, if this is an address error.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::InvalidFrom { address, .. } | Self::InvalidRecipient { address, .. } => {
                Some(address)
            }
            _ => None,
        }
    }
}

/// RFC 5322 address parse failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Nothing to parse.
    #[error("address is empty")]
    Empty,

    /// No `@` separating local part and domain.
    #[error("missing @ in address")]
    MissingAt,

    /// More than one unquoted `@`.
    #[error("address must contain exactly one @")]
    MultipleAt,

    /// Nothing before the `@`.
    #[error("local part is empty")]
    EmptyLocalPart,

    /// Nothing after the `@`.
    #[error("domain is empty")]
    EmptyDomain,

    /// Character not allowed in an address.
    #[error("invalid character {0:?} in address")]
    InvalidCharacter(char),

    /// `<` without a matching trailing `>`.
    #[error("unterminated angle address")]
    UnterminatedAngle,

    /// `(` without a matching `)`.
    #[error("unterminated comment")]
    UnterminatedComment,

    /// Domain with empty labels or illegal characters.
    #[error("invalid domain {0:?}")]
    InvalidDomain(String),
}
