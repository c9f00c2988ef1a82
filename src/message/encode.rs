use std::fs;
use std::io::Write;
use std::path::Path;

use log::debug;
use pgp::composed::{Edata, Esk, Message};
use pgp::packet::{PublicKeyEncryptedSessionKey, SymEncryptedData};
use pgp::ser::Serialize;
use pgp::types::{CompressionAlgorithm, Version};
use rand::{CryptoRng, Rng};
use snafu::{ensure, ResultExt};
use zeroize::Zeroizing;

use crate::config::MessageConfig;
use crate::errors::{EncodingFailedSnafu, Result, SourceNotFoundSnafu};
use crate::keyring::{ExchangeKeys, PublicKeyPart};
use crate::message::sig;

/// Serializes a plaintext source into a layered OpenPGP message.
///
/// Layer order on the wire, outermost first: optional armor, symmetric
/// encryption, optional compression, one-pass signature marker, literal
/// data, trailing signature.
pub struct MessageEncoder {
    keys: ExchangeKeys,
    config: MessageConfig,
}

impl MessageEncoder {
    pub fn new(keys: ExchangeKeys, config: MessageConfig) -> Self {
        Self { keys, config }
    }

    pub fn keys(&self) -> &ExchangeKeys {
        &self.keys
    }

    /// Encrypts and signs the file at `input`, writing the message to
    /// `output`. On failure after partial writes the partial output is
    /// left in place; callers needing atomicity write to a temporary
    /// path and rename.
    pub fn encode_and_sign<R, W>(
        &self,
        rng: R,
        output: &mut W,
        input: &Path,
        armor: bool,
        integrity_protect: bool,
    ) -> Result<()>
    where
        R: Rng + CryptoRng,
        W: Write,
    {
        ensure!(input.is_file(), SourceNotFoundSnafu { path: input });
        let plaintext = fs::read(input)?;
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.encode_bytes(
            rng,
            output,
            &file_name,
            &plaintext,
            armor,
            integrity_protect,
        )
    }

    /// In-memory variant of [`MessageEncoder::encode_and_sign`].
    pub fn encode_bytes<R, W>(
        &self,
        mut rng: R,
        output: &mut W,
        file_name: &str,
        plaintext: &[u8],
        armor: bool,
        integrity_protect: bool,
    ) -> Result<()>
    where
        R: Rng + CryptoRng,
        W: Write,
    {
        let literal = Message::new_literal_bytes(file_name, plaintext);
        let signed = sig::sign(&mut rng, literal, &self.keys, self.config.hash)?;
        let inner = if self.config.compression == CompressionAlgorithm::Uncompressed {
            signed
        } else {
            signed
                .compress(self.config.compression)
                .context(EncodingFailedSnafu)?
        };
        let encrypted = if integrity_protect {
            self.encrypt_protected(&mut rng, inner)?
        } else {
            self.encrypt_legacy(&mut rng, inner)?
        };
        debug!(
            "encoded message for {:?} ({} bytes of plaintext)",
            self.keys.encryption_key().key_id(),
            plaintext.len()
        );
        if armor {
            let armored = encrypted
                .to_armored_string(None.into())
                .context(EncodingFailedSnafu)?;
            output.write_all(armored.as_bytes())?;
        } else {
            encrypted.to_writer(output).context(EncodingFailedSnafu)?;
        }
        Ok(())
    }

    /// Symmetrically-encrypted integrity-protected layer (MDC). The fresh
    /// session key is generated and wrapped inside the primitive and never
    /// leaves the layer.
    fn encrypt_protected<R: Rng + CryptoRng>(&self, rng: &mut R, message: Message) -> Result<Message> {
        match &self.keys.encryption_key().part {
            PublicKeyPart::Primary(key) => {
                message.encrypt_to_keys_seipdv1(&mut *rng, self.config.symmetric, &[key])
            }
            PublicKeyPart::Subkey(key) => {
                message.encrypt_to_keys_seipdv1(&mut *rng, self.config.symmetric, &[key])
            }
        }
        .context(EncodingFailedSnafu)
    }

    /// Legacy symmetrically-encrypted layer without integrity protection.
    /// No composed constructor exists for this packet, so the session key
    /// is wrapped and the layer assembled from packets directly. The
    /// combined OpenPGP-CFB entry point is disabled in the primitives, so
    /// the classic framing is sequenced from plain CFB: the bs+2
    /// quick-check prefix is encrypted from a zero IV, then the body
    /// restarts CFB keyed on the last bs ciphertext bytes of the prefix.
    fn encrypt_legacy<R: Rng + CryptoRng>(&self, rng: &mut R, message: Message) -> Result<Message> {
        let symmetric = self.config.symmetric;
        let mut session_key = Zeroizing::new(vec![0u8; symmetric.key_size()]);
        rng.fill_bytes(&mut session_key);
        let esk = match &self.keys.encryption_key().part {
            PublicKeyPart::Primary(key) => PublicKeyEncryptedSessionKey::from_session_key_v3(
                &mut *rng,
                &session_key,
                symmetric,
                key,
            ),
            PublicKeyPart::Subkey(key) => PublicKeyEncryptedSessionKey::from_session_key_v3(
                &mut *rng,
                &session_key,
                symmetric,
                key,
            ),
        }
        .context(EncodingFailedSnafu)?;

        let bs = symmetric.block_size();
        let mut ciphertext = vec![0u8; bs + 2];
        rng.fill_bytes(&mut ciphertext[..bs]);
        ciphertext[bs] = ciphertext[bs - 2];
        ciphertext[bs + 1] = ciphertext[bs - 1];
        let zero_iv = vec![0u8; bs];
        symmetric
            .encrypt_with_iv_regular(&session_key, &zero_iv, &mut ciphertext)
            .context(EncodingFailedSnafu)?;
        let resync_iv = ciphertext[2..].to_vec();

        let mut body = message.to_bytes().context(EncodingFailedSnafu)?;
        symmetric
            .encrypt_with_iv_regular(&session_key, &resync_iv, &mut body)
            .context(EncodingFailedSnafu)?;
        ciphertext.extend_from_slice(&body);

        let edata = SymEncryptedData::from_slice(Version::New, &ciphertext)
            .context(EncodingFailedSnafu)?;
        Ok(Message::Encrypted {
            esk: vec![Esk::PublicKeyEncryptedSessionKey(esk)],
            edata: Edata::SymEncryptedData(edata),
        })
    }
}
