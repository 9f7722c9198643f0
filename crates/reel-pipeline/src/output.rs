//! Output file naming.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Longest file stem taken from a topic, in characters.
pub const MAX_STEM_CHARS: usize = 40;

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s-]").unwrap());

/// File stem for a topic: word characters, whitespace and `-` only, at most
/// 40 characters, trimmed, spaces turned into underscores.
pub fn sanitize_topic(topic: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(topic, "");
    let truncated: String = cleaned.chars().take(MAX_STEM_CHARS).collect();
    let stem = truncated.trim().replace(' ', "_");
    if stem.is_empty() {
        "video".to_string()
    } else {
        stem
    }
}

/// Final video path for `topic` under `output_dir`.
pub fn output_path(output_dir: &Path, topic: &str) -> PathBuf {
    output_dir.join(format!("{}.mp4", sanitize_topic(topic)))
}
