//! Layered message composition and decomposition.
//!
//! Writing layers a plaintext as literal data, a one-pass signature pair,
//! optional compression and symmetric encryption (plus optional armor);
//! reading reverses the layering, selects the right secret key, verifies
//! the embedded signature and checks integrity protection.

mod decode;
mod encode;
mod sig;

pub use self::decode::{
    decode, decode_file, DecodeOptions, DecodeReport, DecodeSummary, IntegrityStatus,
    SignatureStatus,
};
pub use self::encode::MessageEncoder;
