//! Credential hashing envelope
//! ---------------------------
//! Argon2id password hashes serialized as a self-describing string:
//! `$argon2id$v=19$m=19456,t=2,p=1$<salt>$<key>` with unpadded standard
//! base64. Verification always recomputes the key with the parameters stored
//! in the envelope, never with caller defaults, and compares in constant
//! time. Parse failures are distinct from a well-formed hash that simply does
//! not match.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::alphabet;
use base64::engine::general_purpose::GeneralPurposeConfig;
use base64::engine::{DecodePaddingMode, GeneralPurpose};
use base64::Engine;
use subtle::ConstantTimeEq;
use thiserror::Error;

// Unpadded standard base64. Decoding tolerates non-zero trailing bits so a
// corrupted final character still yields bytes for the constant-time compare
// instead of a parse error.
const B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// Argon2 version byte serialized into the envelope (`v=19`).
pub const FORMAT_VERSION: u32 = Version::V0x13 as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameters {
    pub iterations: u32,
    pub memory_kib: u32,
    pub parallelism: u32,
    pub salt_length: u32,
    pub key_length: u32,
}

impl Default for Parameters {
    /// OWASP-recommended interactive login cost: m=19MiB, t=2, p=1.
    fn default() -> Self {
        Self { iterations: 2, memory_kib: 19 * 1024, parallelism: 1, salt_length: 16, key_length: 32 }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("the encoded hash is not in the correct format")]
    InvalidHash,
    #[error("the hash implementation is not argon2id")]
    IncompatibleImplementation,
    #[error("incompatible version of argon2")]
    IncompatibleVersion,
    #[error("the encoded hash is missing a cost parameter")]
    MissingParameters,
    #[error("the password does not match the encoded hash")]
    HashMismatch,
    #[error("argon2 key derivation failed: {0}")]
    Derivation(String),
}

fn derive_key(password: &[u8], salt: &[u8], parameters: &Parameters) -> Result<Vec<u8>, PasswordError> {
    let params = Params::new(
        parameters.memory_kib,
        parameters.iterations,
        parameters.parallelism,
        Some(parameters.key_length as usize),
    )
    .map_err(|e| PasswordError::Derivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = vec![0u8; parameters.key_length as usize];
    argon2
        .hash_password_into(password, salt, &mut key)
        .map_err(|e| PasswordError::Derivation(e.to_string()))?;
    Ok(key)
}

/// Hash `password` into an encoded envelope, generating a fresh random salt.
/// Two calls with the same inputs produce different strings.
pub fn encode_password(password: &str, parameters: &Parameters) -> Result<String, PasswordError> {
    let mut salt = vec![0u8; parameters.salt_length as usize];
    getrandom::getrandom(&mut salt).map_err(|e| PasswordError::Derivation(e.to_string()))?;
    let key = derive_key(password.as_bytes(), &salt, parameters)?;
    Ok(format!(
        "$argon2id$v={}$m={},t={},p={}${}${}",
        FORMAT_VERSION,
        parameters.memory_kib,
        parameters.iterations,
        parameters.parallelism,
        B64.encode(&salt),
        B64.encode(&key),
    ))
}

fn decode_hash(encoded: &str) -> Result<(Parameters, Vec<u8>, Vec<u8>), PasswordError> {
    let segments: Vec<&str> = encoded.split('$').collect();
    if segments.len() != 6 || !segments[0].is_empty() {
        return Err(PasswordError::InvalidHash);
    }
    if segments[1] != "argon2id" {
        return Err(PasswordError::IncompatibleImplementation);
    }

    let version: u32 = segments[2]
        .strip_prefix("v=")
        .and_then(|v| v.parse().ok())
        .ok_or(PasswordError::InvalidHash)?;
    if version != FORMAT_VERSION {
        return Err(PasswordError::IncompatibleVersion);
    }

    let pairs: Vec<&str> = segments[3].split(',').collect();
    if pairs.len() != 3 {
        return Err(PasswordError::MissingParameters);
    }
    let mut memory_kib = 0u32;
    let mut iterations = 0u32;
    let mut parallelism = 0u32;
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or(PasswordError::InvalidHash)?;
        let value: u32 = value.parse().map_err(|_| PasswordError::InvalidHash)?;
        match key {
            "m" => memory_kib = value,
            "t" => iterations = value,
            "p" => parallelism = value,
            _ => {}
        }
    }
    if memory_kib == 0 || iterations == 0 || parallelism == 0 {
        return Err(PasswordError::MissingParameters);
    }

    let salt = B64.decode(segments[4]).map_err(|_| PasswordError::InvalidHash)?;
    let key = B64.decode(segments[5]).map_err(|_| PasswordError::InvalidHash)?;

    let parameters = Parameters {
        iterations,
        memory_kib,
        parallelism,
        salt_length: salt.len() as u32,
        key_length: key.len() as u32,
    };
    Ok((parameters, salt, key))
}

/// Verify `password` against an encoded envelope. Returns `HashMismatch` for a
/// well-formed hash with the wrong password; malformed input yields one of the
/// parse errors instead.
pub fn verify_password(password: &str, encoded_hash: &str) -> Result<(), PasswordError> {
    let (parameters, salt, key) = decode_hash(encoded_hash)?;
    let derived = derive_key(password.as_bytes(), &salt, &parameters)?;
    if bool::from(key.as_slice().ct_eq(derived.as_slice())) {
        Ok(())
    } else {
        Err(PasswordError::HashMismatch)
    }
}
