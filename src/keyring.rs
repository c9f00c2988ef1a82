//! Key ring bundles and user-identity based key resolution.
//!
//! A bundle is an ordered collection of transferable keys ("rings"), loaded
//! from a binary or armored keyring file. Bundles are immutable after load
//! and only borrowed for lookups, so they can be shared across sessions.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::debug;
use pgp::composed::{Deserializable, SignedKeyDetails, SignedPublicKey, SignedSecretKey};
use pgp::crypto::public_key::PublicKeyAlgorithm;
use pgp::packet::{PublicKey, PublicSubkey, SecretKey, SecretSubkey};
use pgp::types::{KeyId, PublicKeyTrait, SecretKeyTrait};
use snafu::{ensure, ResultExt};
use zeroize::Zeroizing;

use crate::errors::{
    InvalidArgumentSnafu, InvalidPassphraseSnafu, KeyNotFoundSnafu, KeySourceNotFoundSnafu, Result,
};

const READ_BUFFER_SIZE: usize = 1 << 16;

/// Returns true if the given bytes look like an ASCII-armored stream.
///
/// Binary OpenPGP packet streams always start with a byte that has the high
/// bit set (the packet tag marker), armored streams are printable ASCII.
pub(crate) fn is_armored(bytes: &[u8]) -> bool {
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b) => b & 0x80 == 0,
        None => false,
    }
}

/// Keys that can wrap a session key for a recipient.
pub(crate) fn is_encryption_algorithm(alg: PublicKeyAlgorithm) -> bool {
    matches!(
        alg,
        PublicKeyAlgorithm::RSA
            | PublicKeyAlgorithm::RSAEncrypt
            | PublicKeyAlgorithm::Elgamal
            | PublicKeyAlgorithm::ECDH
            | PublicKeyAlgorithm::X25519
    )
}

/// Keys that can issue data signatures.
pub(crate) fn is_signing_algorithm(alg: PublicKeyAlgorithm) -> bool {
    matches!(
        alg,
        PublicKeyAlgorithm::RSA
            | PublicKeyAlgorithm::RSASign
            | PublicKeyAlgorithm::DSA
            | PublicKeyAlgorithm::ECDSA
            | PublicKeyAlgorithm::EdDSALegacy
            | PublicKeyAlgorithm::Ed25519
    )
}

fn ring_user_ids(details: &SignedKeyDetails) -> Vec<String> {
    details.users.iter().map(|u| u.id.id().to_string()).collect()
}

/// The selected public key of a ring, either the primary or a subkey.
#[derive(Debug, Clone)]
pub enum PublicKeyPart {
    Primary(PublicKey),
    Subkey(PublicSubkey),
}

impl PublicKeyPart {
    pub fn key_id(&self) -> KeyId {
        match self {
            Self::Primary(k) => k.key_id(),
            Self::Subkey(k) => k.key_id(),
        }
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        match self {
            Self::Primary(k) => k.algorithm(),
            Self::Subkey(k) => k.algorithm(),
        }
    }
}

/// The selected secret key of a ring, either the primary or a subkey.
#[derive(Debug, Clone)]
pub enum SecretKeyPart {
    Primary(SecretKey),
    Subkey(SecretSubkey),
}

impl SecretKeyPart {
    pub fn key_id(&self) -> KeyId {
        match self {
            Self::Primary(k) => k.key_id(),
            Self::Subkey(k) => k.key_id(),
        }
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        match self {
            Self::Primary(k) => k.algorithm(),
            Self::Subkey(k) => k.algorithm(),
        }
    }

    /// Unlocks the wrapped secret material once to validate the passphrase.
    /// The derived private key only exists inside the callback and is
    /// discarded immediately.
    pub(crate) fn unlock_check(&self, passphrase: &str) -> Result<()> {
        match self {
            Self::Primary(k) => k
                .unlock(|| passphrase.to_owned(), |_| Ok(()))
                .context(InvalidPassphraseSnafu),
            Self::Subkey(k) => k
                .unlock(|| passphrase.to_owned(), |_| Ok(()))
                .context(InvalidPassphraseSnafu),
        }
    }
}

/// A resolved recipient key plus the user ids of its ring.
#[derive(Debug, Clone)]
pub struct EncryptionKey {
    pub(crate) part: PublicKeyPart,
    user_ids: Vec<String>,
}

impl EncryptionKey {
    pub fn key_id(&self) -> KeyId {
        self.part.key_id()
    }

    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }
}

/// A resolved signer key plus the user ids of its ring.
#[derive(Debug, Clone)]
pub struct SigningKey {
    pub(crate) part: SecretKeyPart,
    user_ids: Vec<String>,
}

impl SigningKey {
    pub fn key_id(&self) -> KeyId {
        self.part.key_id()
    }

    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    pub fn first_user_id(&self) -> Option<&str> {
        self.user_ids.first().map(|s| s.as_str())
    }
}

/// Ordered collection of public key rings.
#[derive(Debug, Clone)]
pub struct PublicKeyRingBundle {
    rings: Vec<SignedPublicKey>,
}

impl PublicKeyRingBundle {
    pub fn from_rings(rings: Vec<SignedPublicKey>) -> Self {
        Self { rings }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure!(path.is_file(), KeySourceNotFoundSnafu { path });
        let file = BufReader::with_capacity(READ_BUFFER_SIZE, File::open(path)?);
        Self::from_reader(file)
    }

    pub fn from_reader(mut source: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        let rings = if is_armored(&bytes) {
            let (iter, _headers) = SignedPublicKey::from_armor_many(&bytes[..])?;
            iter.collect::<std::result::Result<Vec<_>, pgp::errors::Error>>()?
        } else {
            SignedPublicKey::from_bytes_many(&bytes[..])
                .collect::<std::result::Result<Vec<_>, pgp::errors::Error>>()?
        };
        debug!("loaded {} public key ring(s)", rings.len());
        Ok(Self { rings })
    }

    pub fn rings(&self) -> &[SignedPublicKey] {
        &self.rings
    }

    /// Scans the rings in bundle order. Within each ring the candidate is
    /// the first encryption-capable key in primary-then-subkeys order; the
    /// ring is selected if any of its user ids contains `user_id`
    /// (case-sensitive). First match across rings wins.
    pub fn resolve_encryption_key(&self, user_id: &str) -> Result<EncryptionKey> {
        for ring in &self.rings {
            let part = if is_encryption_algorithm(ring.primary_key.algorithm()) {
                Some(PublicKeyPart::Primary(ring.primary_key.clone()))
            } else {
                ring.public_subkeys
                    .iter()
                    .find(|sub| is_encryption_algorithm(sub.key.algorithm()))
                    .map(|sub| PublicKeyPart::Subkey(sub.key.clone()))
            };
            let Some(part) = part else {
                continue;
            };
            let user_ids = ring_user_ids(&ring.details);
            if user_ids.iter().any(|id| id.contains(user_id)) {
                debug!("resolved encryption key {:?}", part.key_id());
                return Ok(EncryptionKey { part, user_ids });
            }
        }
        KeyNotFoundSnafu {
            capability: "encryption",
            user_id,
        }
        .fail()
    }

    /// Looks up a key by id across all rings, primaries and subkeys alike.
    pub fn find_key_by_id(&self, key_id: &KeyId) -> Option<PublicKeyPart> {
        for ring in &self.rings {
            if ring.primary_key.key_id() == *key_id {
                return Some(PublicKeyPart::Primary(ring.primary_key.clone()));
            }
            for sub in &ring.public_subkeys {
                if sub.key.key_id() == *key_id {
                    return Some(PublicKeyPart::Subkey(sub.key.clone()));
                }
            }
        }
        None
    }
}

/// Ordered collection of secret key rings.
#[derive(Debug, Clone)]
pub struct SecretKeyRingBundle {
    rings: Vec<SignedSecretKey>,
}

impl SecretKeyRingBundle {
    pub fn from_rings(rings: Vec<SignedSecretKey>) -> Self {
        Self { rings }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure!(path.is_file(), KeySourceNotFoundSnafu { path });
        let file = BufReader::with_capacity(READ_BUFFER_SIZE, File::open(path)?);
        Self::from_reader(file)
    }

    pub fn from_reader(mut source: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        let rings = if is_armored(&bytes) {
            let (iter, _headers) = SignedSecretKey::from_armor_many(&bytes[..])?;
            iter.collect::<std::result::Result<Vec<_>, pgp::errors::Error>>()?
        } else {
            SignedSecretKey::from_bytes_many(&bytes[..])
                .collect::<std::result::Result<Vec<_>, pgp::errors::Error>>()?
        };
        debug!("loaded {} secret key ring(s)", rings.len());
        Ok(Self { rings })
    }

    pub fn rings(&self) -> &[SignedSecretKey] {
        &self.rings
    }

    /// Same scan as [`PublicKeyRingBundle::resolve_encryption_key`], with
    /// signing capability over secret keys.
    pub fn resolve_signing_key(&self, user_id: &str) -> Result<SigningKey> {
        for ring in &self.rings {
            let part = if is_signing_algorithm(ring.primary_key.algorithm()) {
                Some(SecretKeyPart::Primary(ring.primary_key.clone()))
            } else {
                ring.secret_subkeys
                    .iter()
                    .find(|sub| is_signing_algorithm(sub.key.algorithm()))
                    .map(|sub| SecretKeyPart::Subkey(sub.key.clone()))
            };
            let Some(part) = part else {
                continue;
            };
            let user_ids = ring_user_ids(&ring.details);
            if user_ids.iter().any(|id| id.contains(user_id)) {
                debug!("resolved signing key {:?}", part.key_id());
                return Ok(SigningKey { part, user_ids });
            }
        }
        KeyNotFoundSnafu {
            capability: "signing",
            user_id,
        }
        .fail()
    }

    /// Finds the ring holding the key with the given id, if any.
    pub fn find_ring_for_key_id(&self, key_id: &KeyId) -> Option<&SignedSecretKey> {
        self.rings.iter().find(|ring| {
            ring.primary_key.key_id() == *key_id
                || ring
                    .secret_subkeys
                    .iter()
                    .any(|sub| sub.key.key_id() == *key_id)
        })
    }
}

/// Finds the key with `key_id` inside `ring`, primary or subkey.
pub(crate) fn find_ring_secret_key(
    ring: &SignedSecretKey,
    key_id: &KeyId,
) -> Option<SecretKeyPart> {
    if ring.primary_key.key_id() == *key_id {
        return Some(SecretKeyPart::Primary(ring.primary_key.clone()));
    }
    ring.secret_subkeys
        .iter()
        .find(|sub| sub.key.key_id() == *key_id)
        .map(|sub| SecretKeyPart::Subkey(sub.key.clone()))
}

/// Unlocks the key with `key_id` inside `ring` once, to validate the
/// passphrase before decryption starts.
pub(crate) fn unlock_ring_key(
    ring: &SignedSecretKey,
    key_id: &KeyId,
    passphrase: &str,
) -> Result<()> {
    match find_ring_secret_key(ring, key_id) {
        Some(part) => part.unlock_check(passphrase),
        None => Ok(()),
    }
}

/// The fully resolved key material one encode session is configured with:
/// the recipient's public encryption key, the signer's secret key and the
/// passphrase that unlocks it.
///
/// The passphrase is zeroed on drop. Decrypted private key material never
/// lives outside the primitive unlock callbacks.
pub struct ExchangeKeys {
    encryption_key: EncryptionKey,
    signing_key: SigningKey,
    passphrase: Zeroizing<String>,
}

impl fmt::Debug for ExchangeKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeKeys")
            .field("encryption_key", &self.encryption_key)
            .field("signing_key", &self.signing_key)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

impl ExchangeKeys {
    /// Resolves a full key session from keyring files.
    ///
    /// Missing sources fail with `KeySourceNotFound` and an empty
    /// passphrase with `InvalidArgument`, both before any keyring is
    /// parsed. The signing key is unlocked once to validate the
    /// passphrase (`InvalidPassphrase` on mismatch).
    pub fn from_paths(
        public_path: impl AsRef<Path>,
        public_user_id: &str,
        secret_path: impl AsRef<Path>,
        secret_user_id: &str,
        passphrase: &str,
    ) -> Result<Self> {
        let public_path = public_path.as_ref();
        let secret_path = secret_path.as_ref();
        ensure!(
            public_path.is_file(),
            KeySourceNotFoundSnafu { path: public_path }
        );
        ensure!(
            secret_path.is_file(),
            KeySourceNotFoundSnafu { path: secret_path }
        );
        ensure!(
            !passphrase.is_empty(),
            InvalidArgumentSnafu {
                message: "passphrase is empty",
            }
        );
        let publics = PublicKeyRingBundle::from_path(public_path)?;
        let secrets = SecretKeyRingBundle::from_path(secret_path)?;
        Self::from_bundles(&publics, public_user_id, &secrets, secret_user_id, passphrase)
    }

    /// Stream-level equivalent of [`ExchangeKeys::from_paths`] for bundles
    /// the caller already loaded.
    pub fn from_bundles(
        publics: &PublicKeyRingBundle,
        public_user_id: &str,
        secrets: &SecretKeyRingBundle,
        secret_user_id: &str,
        passphrase: &str,
    ) -> Result<Self> {
        ensure!(
            !passphrase.is_empty(),
            InvalidArgumentSnafu {
                message: "passphrase is empty",
            }
        );
        let encryption_key = publics.resolve_encryption_key(public_user_id)?;
        let signing_key = secrets.resolve_signing_key(secret_user_id)?;
        signing_key.part.unlock_check(passphrase)?;
        Ok(Self {
            encryption_key,
            signing_key,
            passphrase: Zeroizing::new(passphrase.to_owned()),
        })
    }

    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption_key
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub(crate) fn passphrase(&self) -> &str {
        &self.passphrase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn armor_detection() {
        assert!(is_armored(b"-----BEGIN PGP MESSAGE-----\n"));
        assert!(is_armored(b"  \n-----BEGIN PGP MESSAGE-----\n"));
        assert!(!is_armored(&[0xc3, 0x20, 0x04]));
        assert!(!is_armored(&[0x95, 0x01]));
        assert!(!is_armored(b""));
    }

    #[test]
    fn algorithm_capabilities() {
        assert!(is_encryption_algorithm(PublicKeyAlgorithm::RSA));
        assert!(is_encryption_algorithm(PublicKeyAlgorithm::ECDH));
        assert!(!is_encryption_algorithm(PublicKeyAlgorithm::DSA));
        assert!(is_signing_algorithm(PublicKeyAlgorithm::RSA));
        assert!(is_signing_algorithm(PublicKeyAlgorithm::EdDSALegacy));
        assert!(!is_signing_algorithm(PublicKeyAlgorithm::ECDH));
        assert!(!is_signing_algorithm(PublicKeyAlgorithm::RSAEncrypt));
    }
}
