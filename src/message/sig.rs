//! Incremental signature generation and verification, shared by the
//! encoder and the decoder. The literal layer is the single data source
//! for both the signature hash and the recovered output, so every
//! plaintext byte reaches the accumulator exactly once, in order.

use log::{debug, warn};
use pgp::composed::Message;
use pgp::crypto::hash::HashAlgorithm;
use pgp::packet::{Subpacket, SubpacketData};
use rand::{CryptoRng, Rng};
use snafu::ResultExt;

use crate::errors::{EncodingFailedSnafu, Result};
use crate::keyring::{ExchangeKeys, PublicKeyPart, SecretKeyPart};
use crate::message::SignatureStatus;

/// Wraps `message` in a one-pass signature pair: the marker announces the
/// signer key id and algorithms ahead of the content, the finished
/// signature trails it. Single flat signature, never nested.
pub(crate) fn sign<R: Rng + CryptoRng>(
    rng: &mut R,
    message: Message,
    keys: &ExchangeKeys,
    hash: HashAlgorithm,
) -> Result<Message> {
    let passphrase = keys.passphrase().to_owned();
    let signed = match &keys.signing_key().part {
        SecretKeyPart::Primary(key) => message.sign(&mut *rng, key, move || passphrase, hash),
        SecretKeyPart::Subkey(key) => message.sign(&mut *rng, key, move || passphrase, hash),
    }
    .context(EncodingFailedSnafu)?;
    debug!("signed with key {:?}", keys.signing_key().key_id());
    Ok(attach_signer_hint(signed, keys.signing_key().first_user_id()))
}

/// The signer's first user id rides along as an unhashed subpacket, for
/// verifiers that want to display it. No user id, no subpacket.
fn attach_signer_hint(message: Message, user_id: Option<&str>) -> Message {
    let Some(user_id) = user_id else {
        return message;
    };
    match message {
        Message::Signed {
            message,
            one_pass_signature,
            mut signature,
        } => {
            signature.config.unhashed_subpackets.push(Subpacket::regular(
                SubpacketData::SignersUserID(user_id.to_owned().into()),
            ));
            Message::Signed {
                message,
                one_pass_signature,
                signature,
            }
        }
        other => other,
    }
}

/// Runs the verification pass of a signed message against the resolved
/// signer key. Mismatches are reported, not raised; the caller decides
/// the failure policy.
pub(crate) fn verify(message: &Message, key: &PublicKeyPart) -> SignatureStatus {
    let outcome = match key {
        PublicKeyPart::Primary(k) => message.verify(k),
        PublicKeyPart::Subkey(k) => message.verify(k),
    };
    match outcome {
        Ok(()) => {
            debug!("signature verified");
            SignatureStatus::Valid
        }
        Err(err) => {
            warn!("signature verification failed: {err}");
            SignatureStatus::Invalid
        }
    }
}
