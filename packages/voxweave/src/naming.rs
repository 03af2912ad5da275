//! Artifact file names.

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};

fn short_hash() -> String {
    let nonce: [u8; 16] = rand::rng().random();
    let digest = Sha256::digest(nonce);
    digest
        .iter()
        .take(3)
        .map(|b| format!("{b:02x}"))
        .collect::<String>()[..5]
        .to_string()
}

/// `{name}_{unix_ts}{hash5}.wav`, or `{name}.wav` without timestamping.
pub fn standard_output_name(name: &str, timestamp: bool) -> String {
    if timestamp {
        format!("{name}_{}{}.wav", Utc::now().timestamp(), short_hash())
    } else {
        format!("{name}.wav")
    }
}

/// 32 random alphanumerics plus `.wav`.
pub fn random_output_name() -> String {
    let stem: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("{stem}.wav")
}

/// Unique name for an intermediate narration segment.
pub fn segment_name(name: &str, index: usize) -> String {
    format!(
        "{name}_{index:03}_{}_{}.wav",
        short_hash(),
        Utc::now().timestamp_millis()
    )
}
