//! TON mnemonic to ed25519 signing key
//!
//! Word list, seed-version check and PBKDF2 derivation are done by
//! `tonlib-core`; the resulting key pair is turned into an `ed25519-dalek`
//! signing key for the wallet.

use crate::error::{ExecutorError, ExecutorResult};

use ed25519_dalek::SigningKey;
use tonlib_core::mnemonic::Mnemonic;

const WORD_COUNT: usize = 24;

/// Words of a mnemonic, lowercased and trimmed
pub fn normalize(phrase: &str) -> Vec<String> {
    phrase
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect()
}

/// Derive the wallet signing key from a password-less 24-word mnemonic
pub fn derive_signing_key(phrase: &str) -> ExecutorResult<SigningKey> {
    let words = normalize(phrase);
    if words.len() != WORD_COUNT {
        return Err(ExecutorError::Wallet(format!(
            "mnemonic must have {} words, got {}",
            WORD_COUNT,
            words.len()
        )));
    }

    let mnemonic = Mnemonic::new(words.iter().map(String::as_str).collect(), &None)
        .map_err(|e| ExecutorError::Wallet(format!("invalid mnemonic: {}", e)))?;
    let key_pair = mnemonic
        .to_key_pair()
        .map_err(|e| ExecutorError::Wallet(format!("key derivation failed: {}", e)))?;

    // The secret key starts with the 32-byte ed25519 seed
    let seed: [u8; 32] = key_pair
        .secret_key
        .get(..32)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| ExecutorError::Wallet("derived secret key is too short".into()))?;
    let signing_key = SigningKey::from_bytes(&seed);

    if signing_key.verifying_key().as_bytes().as_slice() != key_pair.public_key.as_slice() {
        return Err(ExecutorError::Wallet(
            "derived public key does not match the mnemonic key pair".into(),
        ));
    }
    Ok(signing_key)
}
