use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audio encodings accepted by the realtime backend.
///
/// Payloads are opaque to this workspace; the format only tells us how many
/// bytes make up one sample and how many samples make up one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// 16-bit little-endian PCM at 24 kHz.
    #[default]
    Pcm16,
    /// G.711 mu-law at 8 kHz.
    G711Ulaw,
    /// G.711 A-law at 8 kHz.
    G711Alaw,
}

impl AudioFormat {
    pub fn sample_rate(self) -> u64 {
        match self {
            AudioFormat::Pcm16 => 24_000,
            AudioFormat::G711Ulaw | AudioFormat::G711Alaw => 8_000,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            AudioFormat::Pcm16 => 2,
            AudioFormat::G711Ulaw | AudioFormat::G711Alaw => 1,
        }
    }

    /// Sample index reached after `ms` milliseconds (floor division).
    ///
    /// Offsets come from the server; ones past `usize::MAX` saturate so callers
    /// can clamp them to their buffer.
    pub fn ms_to_samples(self, ms: u64) -> usize {
        let samples = u128::from(ms) * u128::from(self.sample_rate()) / 1000;
        usize::try_from(samples).unwrap_or(usize::MAX)
    }

    /// Byte offset of the sample reached after `ms` milliseconds.
    pub fn ms_to_byte_offset(self, ms: u64) -> usize {
        self.ms_to_samples(ms).saturating_mul(self.bytes_per_sample())
    }

    /// Whole milliseconds covered by `len` bytes of audio.
    pub fn bytes_to_ms(self, len: usize) -> u64 {
        let samples = (len / self.bytes_per_sample()) as u64;
        samples.saturating_mul(1000) / self.sample_rate()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AudioFormat::Pcm16 => "pcm16",
            AudioFormat::G711Ulaw => "g711_ulaw",
            AudioFormat::G711Alaw => "g711_alaw",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pcm16" => Ok(AudioFormat::Pcm16),
            "g711_ulaw" => Ok(AudioFormat::G711Ulaw),
            "g711_alaw" => Ok(AudioFormat::G711Alaw),
            other => Err(format!("'{}' is not a supported audio format", other)),
        }
    }
}
