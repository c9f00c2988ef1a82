//! OpenPGP-style secure file exchange: layered message encoding and
//! decoding on top of the [`pgp`] primitives.
//!
//! Writing composes symmetric encryption, optional compression, literal
//! data and a one-pass signature pair (plus optional ASCII armor) around a
//! plaintext; reading reverses the layering, resolves the right secret key
//! among the message's encryption methods, verifies the embedded signature
//! against a public keyring and checks integrity protection.
//!
//! ```no_run
//! use pgp_exchange::{decode_file, DecodeOptions, ExchangeKeys, MessageConfig, MessageEncoder};
//!
//! # fn main() -> pgp_exchange::Result<()> {
//! let keys = ExchangeKeys::from_paths(
//!     "pubring.pgp",
//!     "alice@example.org",
//!     "secring.pgp",
//!     "alice@example.org",
//!     "correct-horse",
//! )?;
//! let encoder = MessageEncoder::new(keys, MessageConfig::default());
//! let mut out = std::fs::File::create("note.txt.pgp")?;
//! encoder.encode_and_sign(
//!     rand::thread_rng(),
//!     &mut out,
//!     "note.txt".as_ref(),
//!     true,
//!     true,
//! )?;
//!
//! let report = decode_file(
//!     "note.txt.pgp",
//!     "secring.pgp",
//!     "correct-horse",
//!     "note.txt.out",
//!     "pubring.pgp",
//!     DecodeOptions::default(),
//! )?;
//! println!("{:?}", report.summary);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod keyring;
pub mod message;

pub use pgp;

pub use crate::config::MessageConfig;
pub use crate::errors::{Error, Result};
pub use crate::keyring::{
    EncryptionKey, ExchangeKeys, PublicKeyPart, PublicKeyRingBundle, SecretKeyPart,
    SecretKeyRingBundle, SigningKey,
};
pub use crate::message::{
    decode, decode_file, DecodeOptions, DecodeReport, DecodeSummary, IntegrityStatus,
    MessageEncoder, SignatureStatus,
};
