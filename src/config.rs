use pgp::crypto::hash::HashAlgorithm;
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::types::CompressionAlgorithm;

/// Algorithm selection for one encoding session.
///
/// Constructed once and passed into [`crate::message::MessageEncoder`] by
/// value; never shared mutable state. [`CompressionAlgorithm::Uncompressed`]
/// skips the compression layer entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageConfig {
    pub symmetric: SymmetricKeyAlgorithm,
    pub compression: CompressionAlgorithm,
    pub hash: HashAlgorithm,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            symmetric: SymmetricKeyAlgorithm::AES128,
            compression: CompressionAlgorithm::ZIP,
            hash: HashAlgorithm::SHA2_256,
        }
    }
}
