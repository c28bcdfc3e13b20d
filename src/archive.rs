//! Artifact transforms: gzip compression, AES-256-GCM encryption, and
//! SHA-256 integrity checksums. Compression always runs before encryption.

use std::io::{Read, Write};
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

/// AES-GCM nonce length in bytes, prepended to the ciphertext
const NONCE_LEN: usize = 12;

/// Compress with gzip
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| AppError::Archive(format!("compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| AppError::Archive(format!("compression failed: {}", e)))
}

/// Decompress gzip data
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| AppError::Archive(format!("decompression failed: {}", e)))?;
    Ok(out)
}

/// Encrypt with AES-256-GCM. A random 12-byte nonce is prepended to the
/// ciphertext so decryption needs only the key.
pub fn encrypt(data: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| AppError::Archive(format!("invalid encryption key: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, data)
        .map_err(|e| AppError::Archive(format!("encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt data produced by [`encrypt`]
pub fn decrypt(data: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    if data.len() < NONCE_LEN {
        return Err(AppError::Archive("ciphertext too short".to_string()));
    }
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| AppError::Archive(format!("invalid encryption key: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| AppError::Archive(format!("decryption failed: {}", e)))
}

/// Apply the requested transform chain to a raw dump: compress, then encrypt
pub fn seal(data: Vec<u8>, compress_flag: bool, key: Option<&[u8; 32]>) -> Result<Vec<u8>> {
    let mut artifact = data;
    if compress_flag {
        artifact = compress(&artifact)?;
    }
    if let Some(key) = key {
        artifact = encrypt(&artifact, key)?;
    }
    Ok(artifact)
}

/// Reverse [`seal`]: decrypt, then decompress
pub fn open(data: Vec<u8>, compressed: bool, key: Option<&[u8; 32]>) -> Result<Vec<u8>> {
    let mut artifact = data;
    if let Some(key) = key {
        artifact = decrypt(&artifact, key)?;
    }
    if compressed {
        artifact = decompress(&artifact)?;
    }
    Ok(artifact)
}

/// SHA-256 hex digest of a byte buffer
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// SHA-256 hex digest of a file on disk
pub async fn sha256_file(path: &Path) -> Result<String> {
    let contents = tokio::fs::read(path).await?;
    Ok(sha256_hex(&contents))
}
