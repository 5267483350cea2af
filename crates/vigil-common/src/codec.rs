//! Batch payload transforms shared by agent and collector.
//!
//! Agent order: serialize → [`sign`] (over the plain bytes) → [`SealingKey::seal`]
//! → [`gzip`]. The collector undoes them in reverse and verifies the
//! signature last, over the recovered plain bytes.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::io::{Read, Write};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the plain batch bytes.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// Header carrying the hex RSA-wrapped per-message AES key.
pub const WRAPPED_KEY_HEADER: &str = "AES-Key";

const SYMMETRIC_KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("signature is not valid hex: {0}")]
    SignatureEncoding(#[from] hex::FromHexError),

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("inflated body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Hex HMAC-SHA256 of `body` keyed by `secret`.
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature produced by [`sign`].
pub fn verify(body: &[u8], secret: &str, signature_hex: &str) -> Result<(), CodecError> {
    let expected = hex::decode(signature_hex)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| CodecError::SignatureMismatch)
}

pub fn gzip(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    Ok(encoder.finish()?)
}

pub fn gunzip(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(body);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Like [`gunzip`], but stops with [`CodecError::TooLarge`] once the
/// inflated output passes `limit` bytes.
pub fn gunzip_limited(body: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(body).take(limit as u64 + 1);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    if out.len() > limit {
        return Err(CodecError::TooLarge { limit });
    }
    Ok(out)
}

/// Output of [`SealingKey::seal`]: `nonce || ciphertext || tag` plus the
/// wrapped symmetric key that opens it.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub ciphertext: Vec<u8>,
    pub wrapped_key: Vec<u8>,
}

/// Recipient public key (SPKI PEM) used by the agent.
#[derive(Clone)]
pub struct SealingKey {
    key: RsaPublicKey,
}

impl SealingKey {
    pub fn from_pem(pem: &str) -> Result<Self, CodecError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Encrypts `body` under a fresh AES-256-GCM key and wraps that key
    /// with RSA PKCS#1 v1.5.
    pub fn seal(&self, body: &[u8]) -> Result<Envelope, CodecError> {
        let rng = SystemRandom::new();
        let mut key_bytes = [0u8; SYMMETRIC_KEY_LEN];
        rng.fill(&mut key_bytes)
            .map_err(|_| CodecError::Encrypt("failed to generate symmetric key".into()))?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes)
            .map_err(|_| CodecError::Encrypt("failed to generate nonce".into()))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| CodecError::Encrypt("invalid symmetric key".into()))?;
        let key = LessSafeKey::new(unbound);
        let mut in_out = body.to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| CodecError::Encrypt("AES-GCM seal failed".into()))?;

        let mut ciphertext = nonce_bytes.to_vec();
        ciphertext.extend_from_slice(&in_out);

        let wrapped_key = self
            .key
            .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, &key_bytes)
            .map_err(|e| CodecError::Encrypt(e.to_string()))?;

        Ok(Envelope {
            ciphertext,
            wrapped_key,
        })
    }
}

/// Collector private key (PKCS#1 PEM).
#[derive(Clone)]
pub struct OpeningKey {
    key: RsaPrivateKey,
}

impl OpeningKey {
    pub fn from_pem(pem: &str) -> Result<Self, CodecError> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn open(&self, ciphertext: &[u8], wrapped_key: &[u8]) -> Result<Vec<u8>, CodecError> {
        let key_bytes = self
            .key
            .decrypt(Pkcs1v15Encrypt, wrapped_key)
            .map_err(|e| CodecError::Decrypt(e.to_string()))?;
        if ciphertext.len() < NONCE_LEN + aead::AES_256_GCM.tag_len() {
            return Err(CodecError::Decrypt("ciphertext too short".into()));
        }

        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| CodecError::Decrypt("invalid symmetric key".into()))?;
        let key = LessSafeKey::new(unbound);
        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CodecError::Decrypt("invalid nonce".into()))?;

        let mut in_out = sealed.to_vec();
        let plain = key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CodecError::Decrypt("AES-GCM open failed".into()))?;
        Ok(plain.to_vec())
    }
}

/// Generates an RSA key pair, returned as `(private PKCS#1 PEM, public SPKI PEM)`.
pub fn generate_key_pair(bits: usize) -> Result<(String, String), CodecError> {
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
        .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
    let public = RsaPublicKey::from(&private);
    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
    Ok(((*private_pem).clone(), public_pem))
}
