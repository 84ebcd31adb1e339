//! Output filename policy for episode downloads.
//!
//! `<title>_EP<nn><ext>`: the title is made safe on Windows, Linux and macOS while keeping
//! CJK and other Unicode text intact.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::task::{Anime, Episode};

/// Characters that are invalid in Windows filenames
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const DEFAULT_EXTENSION: &str = ".mp4";

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid number regex"));

/// Sanitize a string for use as a filename.
///
/// Control characters and `<>:"/\|?*` are each replaced by `_`; leading/trailing spaces and
/// dots are trimmed; Windows reserved names get a `_` prefix; an empty result becomes
/// `unnamed`.
pub fn sanitize_filename(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| {
            if c.is_control() || INVALID_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Trim leading/trailing spaces and dots (Windows restriction)
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    for reserved in WINDOWS_RESERVED_NAMES {
        if upper == *reserved || upper.starts_with(&format!("{reserved}.")) {
            return format!("_{trimmed}");
        }
    }

    trimmed.to_string()
}

/// Extension (with leading dot) for a download from `source`.
pub fn infer_extension(source: &Url) -> &'static str {
    let Some(last) = source.path_segments().and_then(|mut s| s.next_back()) else {
        return DEFAULT_EXTENSION;
    };
    let Some((_, ext)) = last.rsplit_once('.') else {
        return DEFAULT_EXTENSION;
    };
    // `.m3u8` and `.mp4` both land here
    match ext.to_ascii_lowercase().as_str() {
        "mkv" => ".mkv",
        "webm" => ".webm",
        "mov" => ".mov",
        _ => DEFAULT_EXTENSION,
    }
}

/// The `nn` of `EP<nn>`: the episode number, else the first number in its title, else its id.
fn episode_token(episode: &Episode) -> String {
    let number = episode.number.or_else(|| {
        FIRST_NUMBER
            .find(&episode.title)
            .and_then(|m| m.as_str().parse().ok())
    });
    match number {
        Some(n) => format!("{n:02}"),
        None => sanitize_filename(&episode.id),
    }
}

/// Full output filename for `episode` of `anime`.
pub fn episode_filename(anime: &Anime, episode: &Episode, source: &Url) -> String {
    format!(
        "{}_EP{}{}",
        sanitize_filename(&anime.title),
        episode_token(episode),
        infer_extension(source)
    )
}
