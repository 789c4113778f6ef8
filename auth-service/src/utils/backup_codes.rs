//! MFA backup code generation and normalization.
//!
//! Codes are hashed with SHA-256 rather than a salted KDF so that consuming
//! one is a single conditional update keyed by the hash.

use rand::RngCore;

use crate::services::jwt::hash_token;

const BACKUP_CODE_LEN: usize = 12;
const BACKUP_CODE_GROUP_SIZE: usize = 4;
const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Plaintext codes for one-time display plus the hashes to persist.
#[derive(Debug)]
pub struct BackupCodeBatch {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl BackupCodeBatch {
    pub fn generate(count: usize) -> Self {
        let mut rng = rand::thread_rng();
        let mut codes = Vec::with_capacity(count);
        let mut code_hashes = Vec::with_capacity(count);
        for _ in 0..count {
            let normalized = generate_code(&mut rng);
            code_hashes.push(hash_token(&normalized));
            codes.push(format_code(&normalized));
        }
        Self { codes, code_hashes }
    }
}

/// Uppercase, drop separators and check length and alphabet.
pub fn normalize_backup_code(input: &str) -> Option<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != BACKUP_CODE_LEN {
        return None;
    }
    if !normalized
        .bytes()
        .all(|ch| BACKUP_CODE_ALPHABET.contains(&ch))
    {
        return None;
    }
    Some(normalized)
}

/// Hash of a user-supplied code, or `None` if it cannot be a backup code.
pub fn hash_backup_code(input: &str) -> Option<String> {
    normalize_backup_code(input).map(|normalized| hash_token(&normalized))
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let mut raw = [0u8; BACKUP_CODE_LEN];
    rng.fill_bytes(&mut raw);
    raw.iter()
        .map(|byte| BACKUP_CODE_ALPHABET[usize::from(*byte) % BACKUP_CODE_ALPHABET.len()] as char)
        .collect()
}

fn format_code(normalized: &str) -> String {
    normalized
        .as_bytes()
        .chunks(BACKUP_CODE_GROUP_SIZE)
        .map(|chunk| chunk.iter().map(|b| *b as char).collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}
