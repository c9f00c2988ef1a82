use std::path::PathBuf;

use snafu::{Backtrace, Snafu};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error types
///
/// Every variant is fatal for the operation that raised it; there is no
/// retry of cryptographic or parsing failures. Signature and integrity
/// mismatches are not errors by default, they are reported through
/// [`crate::message::DecodeSummary`] unless strict mode is enabled.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid argument: {message}"))]
    InvalidArgument { message: String },
    #[snafu(display("key source not found: {}", path.display()))]
    KeySourceNotFound { path: PathBuf },
    #[snafu(display("no {capability} key matching {user_id:?} in the key ring bundle"))]
    KeyNotFound {
        capability: &'static str,
        user_id: String,
    },
    #[snafu(display("secret key unlock failed"))]
    InvalidPassphrase { source: pgp::errors::Error },
    #[snafu(display("plaintext source not found: {}", path.display()))]
    SourceNotFound { path: PathBuf },
    #[snafu(display("malformed message: {message}"))]
    MalformedMessage { message: String },
    #[snafu(display("no encryption method matches a secret key in the bundle"))]
    NoMatchingSecretKey,
    #[snafu(display("signer key {key_id} not present in the verification bundle"))]
    SignerKeyNotFound { key_id: String },
    #[snafu(display("nested encryption layers are not supported"))]
    UnsupportedNestedEncryption,
    #[snafu(display("payload is neither signed content nor literal data"))]
    UnrecognizedPayload,
    #[snafu(display("message encoding failed"))]
    EncodingFailed { source: pgp::errors::Error },
    #[snafu(display("signature verification failed"))]
    SignatureRejected,
    #[snafu(display("integrity protection check failed"))]
    IntegrityRejected,
    #[snafu(transparent)]
    Pgp { source: pgp::errors::Error },
    #[snafu(transparent)]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
}
