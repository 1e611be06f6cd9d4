use crate::error::{RealtimeError, Result};
use base64::Engine;
use rand::Rng;

/// Alphabet for generated identifiers; no `0`, `O`, `I` or `l`.
const ID_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

pub const DEFAULT_ID_LENGTH: usize = 21;

/// Generates `prefix` followed by random characters, `length` characters in total.
pub fn generate_id(prefix: &str, length: usize) -> Result<String> {
    if length <= prefix.len() {
        return Err(RealtimeError::Validation(
            "Length must be greater than the length of the prefix".to_string(),
        ));
    }
    let mut rng = rand::rng();
    let suffix: String = (0..length - prefix.len())
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    Ok(format!("{}{}", prefix, suffix))
}

/// Packs float samples into little-endian 16-bit PCM.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| {
            // NaN clamps to NaN and casts to 0.
            let s = s.clamp(-1.0, 1.0);
            let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
            let v = scaled as i16;
            v.to_le_bytes()
        })
        .collect()
}

pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Reads little-endian 16-bit samples; a trailing odd byte is ignored.
pub fn bytes_to_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

pub fn base64_to_bytes(encoded: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| RealtimeError::Validation(format!("invalid base64 audio: {}", e)))
}

pub fn bytes_to_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn merge_audio(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    merged.extend_from_slice(left);
    merged.extend_from_slice(right);
    merged
}
