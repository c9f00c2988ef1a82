use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use pgp::composed::{
    decrypt_session_key, Deserializable, Edata, Esk, Message, PlainSessionKey, SignedSecretKey,
};
use pgp::errors::Error as PgpError;
use pgp::packet::{PublicKeyEncryptedSessionKey, SymEncryptedData};
use pgp::types::{EskType, KeyId};
use snafu::{ensure, OptionExt};
use zeroize::Zeroizing;

use crate::errors::{
    Error, InvalidArgumentSnafu, IntegrityRejectedSnafu, KeySourceNotFoundSnafu,
    MalformedMessageSnafu, NoMatchingSecretKeySnafu, Result, SignatureRejectedSnafu,
    SignerKeyNotFoundSnafu, SourceNotFoundSnafu, UnrecognizedPayloadSnafu,
    UnsupportedNestedEncryptionSnafu,
};
use crate::keyring::{
    find_ring_secret_key, is_armored, unlock_ring_key, PublicKeyPart, PublicKeyRingBundle,
    SecretKeyPart, SecretKeyRingBundle,
};
use crate::message::sig;

/// Authenticity of the recovered plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    NotSigned,
    Valid,
    Invalid,
}

/// Outcome of the encryption layer's modification detection code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityStatus {
    NotProtected,
    Ok,
    Failed,
}

/// Structured decode result. Mismatches are surfaced here instead of being
/// raised, unless strict mode is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    pub signature: SignatureStatus,
    pub integrity: IntegrityStatus,
}

/// Failure policy for signature and integrity mismatches.
///
/// The default keeps the recovered output and reports the mismatch.
/// Strict mode turns a mismatch into an error before output is written.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    pub strict: bool,
}

/// Result of a file based decode.
#[derive(Debug)]
pub struct DecodeReport {
    pub output_path: PathBuf,
    pub summary: DecodeSummary,
}

/// Reverses the message layering: de-armors if needed, selects a secret
/// key for one of the encryption methods, decrypts, decompresses, then
/// verifies any embedded signature against `verification` while streaming
/// the literal data to `output`.
pub fn decode(
    mut input: impl Read,
    secrets: &SecretKeyRingBundle,
    passphrase: &str,
    output: &mut impl Write,
    verification: &PublicKeyRingBundle,
    options: DecodeOptions,
) -> Result<DecodeSummary> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;

    // Armor is detected from the stream itself, never via a flag.
    let message = if is_armored(&bytes) {
        Message::from_armor_single(&bytes[..])
            .map(|(message, _headers)| message)
    } else {
        Message::from_bytes(&bytes[..])
    }
    .map_err(|err| Error::MalformedMessage {
        message: err.to_string(),
    })?;

    // The outer layer must be the encrypted-data list; the packet parser
    // already tolerates a leading marker packet.
    let Message::Encrypted { esk, edata } = message else {
        return MalformedMessageSnafu {
            message: "outer layer is not an encrypted-data list",
        }
        .fail();
    };
    let protected = matches!(edata, Edata::SymEncryptedProtectedData(_));

    // Method selection: first key-encrypted-session-key method whose key id
    // resolves in the secret bundle wins, in message order.
    let mut selected = None;
    for method in &esk {
        let Esk::PublicKeyEncryptedSessionKey(pkesk) = method else {
            continue;
        };
        // v6 methods carry a fingerprint instead of a key id; those are
        // skipped, not errors.
        let Ok(key_id) = pkesk.id() else {
            continue;
        };
        if let Some(ring) = secrets.find_ring_for_key_id(key_id) {
            selected = Some((ring, key_id.clone(), pkesk.clone()));
            break;
        }
    }
    let (ring, key_id, pkesk) = selected.context(NoMatchingSecretKeySnafu)?;
    debug!("decrypting with secret key {:?}", key_id);
    unlock_ring_key(ring, &key_id, passphrase)?;

    let inner = match edata {
        Edata::SymEncryptedProtectedData(_) => {
            let ring_passphrase = passphrase.to_owned();
            let encrypted = Message::Encrypted { esk, edata };
            match encrypted.decrypt(move || ring_passphrase, &[ring]) {
                Ok((inner, _ids)) => inner,
                Err(PgpError::MdcError) => {
                    // The primitive withholds the plaintext when the MDC
                    // does not match, so there is nothing to write; the
                    // mismatch is still a status, not an error, unless
                    // strict mode says otherwise.
                    warn!("message failed integrity check");
                    ensure!(!options.strict, IntegrityRejectedSnafu);
                    return Ok(DecodeSummary {
                        signature: SignatureStatus::NotSigned,
                        integrity: IntegrityStatus::Failed,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
        Edata::SymEncryptedData(ref sed) => {
            decrypt_legacy(ring, &key_id, passphrase, &pkesk, sed)?
        }
    };

    // A single compression layer is undone here; any further nesting is
    // handled by the payload dispatch below.
    let inner = if matches!(inner, Message::Compressed(_)) {
        debug!("decompressing inner layer");
        inner.decompress()?
    } else {
        inner
    };

    let integrity = if protected {
        IntegrityStatus::Ok
    } else {
        IntegrityStatus::NotProtected
    };

    let signature = match &inner {
        Message::Literal(literal) => {
            output.write_all(literal.data())?;
            SignatureStatus::NotSigned
        }
        Message::Signed { message, .. } => {
            let nested = message.as_deref().context(MalformedMessageSnafu {
                message: "signed layer without content",
            })?;
            match nested {
                Message::Literal(literal) => {
                    let signer = resolve_signer(&inner, verification)?;
                    let status = sig::verify(&inner, &signer);
                    ensure!(
                        !(options.strict && status == SignatureStatus::Invalid),
                        SignatureRejectedSnafu
                    );
                    output.write_all(literal.data())?;
                    status
                }
                Message::Encrypted { .. } => return UnsupportedNestedEncryptionSnafu.fail(),
                _ => return UnrecognizedPayloadSnafu.fail(),
            }
        }
        Message::Encrypted { .. } => return UnsupportedNestedEncryptionSnafu.fail(),
        _ => return UnrecognizedPayloadSnafu.fail(),
    };

    Ok(DecodeSummary {
        signature,
        integrity,
    })
}

/// Path based wrapper around [`decode`]. The recovered output stays on
/// disk whatever the signature and integrity statuses say; nothing is
/// deleted on a mismatch.
pub fn decode_file(
    input_path: impl AsRef<Path>,
    secret_keyring_path: impl AsRef<Path>,
    passphrase: &str,
    output_path: impl AsRef<Path>,
    public_keyring_path: impl AsRef<Path>,
    options: DecodeOptions,
) -> Result<DecodeReport> {
    let input_path = input_path.as_ref();
    let secret_keyring_path = secret_keyring_path.as_ref();
    let public_keyring_path = public_keyring_path.as_ref();
    let output_path = output_path.as_ref();
    ensure!(input_path.is_file(), SourceNotFoundSnafu { path: input_path });
    ensure!(
        secret_keyring_path.is_file(),
        KeySourceNotFoundSnafu {
            path: secret_keyring_path,
        }
    );
    ensure!(
        public_keyring_path.is_file(),
        KeySourceNotFoundSnafu {
            path: public_keyring_path,
        }
    );
    ensure!(
        !output_path.as_os_str().is_empty(),
        InvalidArgumentSnafu {
            message: "output path is empty",
        }
    );

    let secrets = SecretKeyRingBundle::from_path(secret_keyring_path)?;
    let verification = PublicKeyRingBundle::from_path(public_keyring_path)?;
    let input = File::open(input_path)?;
    let mut output = BufWriter::new(File::create(output_path)?);
    let summary = decode(
        input,
        &secrets,
        passphrase,
        &mut output,
        &verification,
        options,
    )?;
    output.flush()?;
    Ok(DecodeReport {
        output_path: output_path.to_path_buf(),
        summary,
    })
}

/// Resolves the signer's public key in the verification bundle via the
/// issuer key id announced by the signature layer.
fn resolve_signer(message: &Message, verification: &PublicKeyRingBundle) -> Result<PublicKeyPart> {
    let Message::Signed { signature, .. } = message else {
        return UnrecognizedPayloadSnafu.fail();
    };
    let issuers = signature.issuer();
    for id in &issuers {
        if let Some(part) = verification.find_key_by_id(id) {
            debug!("resolved signer key {:?}", part.key_id());
            return Ok(part);
        }
    }
    let key_id = issuers
        .first()
        .map(|id| format!("{id:?}"))
        .unwrap_or_else(|| "<missing issuer>".to_string());
    SignerKeyNotFoundSnafu { key_id }.fail()
}

/// Undoes a legacy encryption layer (no integrity protection). The
/// combined OpenPGP-CFB entry point is disabled in the primitives, so the
/// classic framing is undone from plain CFB: the bs+2 quick-check prefix
/// is decrypted from a zero IV and validated, then the body restarts CFB
/// keyed on the last bs ciphertext bytes of the prefix.
fn decrypt_legacy(
    ring: &SignedSecretKey,
    key_id: &KeyId,
    passphrase: &str,
    pkesk: &PublicKeyEncryptedSessionKey,
    edata: &SymEncryptedData,
) -> Result<Message> {
    let part = find_ring_secret_key(ring, key_id).context(NoMatchingSecretKeySnafu)?;
    let values = pkesk.values()?;
    let unlock = || passphrase.to_owned();
    let session = match &part {
        SecretKeyPart::Primary(k) => decrypt_session_key(k, unlock, values, EskType::V3_4),
        SecretKeyPart::Subkey(k) => decrypt_session_key(k, unlock, values, EskType::V3_4),
    }?;
    let PlainSessionKey::V3_4 { sym_alg, ref key } = session else {
        return MalformedMessageSnafu {
            message: "unexpected session key version for a legacy packet",
        }
        .fail();
    };
    let key = Zeroizing::new(key.clone());

    let bs = sym_alg.block_size();
    let data = edata.data();
    ensure!(
        data.len() > bs + 2,
        MalformedMessageSnafu {
            message: "legacy encrypted packet is too short",
        }
    );
    let zero_iv = vec![0u8; bs];
    let mut prefix = data[..bs + 2].to_vec();
    sym_alg.decrypt_with_iv_regular(&key, &zero_iv, &mut prefix)?;
    ensure!(
        prefix[bs - 2..bs] == prefix[bs..],
        MalformedMessageSnafu {
            message: "session key quick check failed",
        }
    );
    let mut body = data[bs + 2..].to_vec();
    sym_alg.decrypt_with_iv_regular(&key, &data[2..bs + 2], &mut body)?;
    Message::from_bytes(&body[..]).map_err(|err| Error::MalformedMessage {
        message: err.to_string(),
    })
}
