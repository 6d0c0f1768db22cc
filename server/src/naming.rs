use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use kernel::{file_extension, VideoFormat};
use rand::Rng;

/// Longest file name most file systems accept, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;

const FALLBACK_STEM: &str = "video";
const RESERVED: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// How a stored file name is derived from the client supplied one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingPolicy {
    /// `<base>-<millis><random>.<ext>`, concurrent uploads never collide
    #[default]
    UniqueSuffix,
    /// Sanitized name verbatim, a later upload replaces an earlier one
    PreserveOriginal,
}

impl FromStr for NamingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unique" | "unique-suffix" => Ok(NamingPolicy::UniqueSuffix),
            "preserve" | "preserve-original" => Ok(NamingPolicy::PreserveOriginal),
            other => Err(format!(
                "unknown naming policy '{other}', expected 'unique' or 'preserve'"
            )),
        }
    }
}

impl fmt::Display for NamingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingPolicy::UniqueSuffix => write!(f, "unique"),
            NamingPolicy::PreserveOriginal => write!(f, "preserve"),
        }
    }
}

/// Time and entropy that make a unique suffix. Passed in explicitly so naming stays pure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uniqueness {
    pub millis: i64,
    pub nonce: u32,
}

impl Uniqueness {
    #[must_use]
    pub fn now() -> Self {
        Self {
            millis: Utc::now().timestamp_millis(),
            nonce: rand::thread_rng().gen_range(0..1_000_000_000),
        }
    }
}

/// Turns an untrusted client file name into a bare file name.
///
/// Only the last `/` or `\` separated component survives, control characters
/// are dropped and characters reserved on common file systems become `_`.
/// Leading dots are stripped so the result is never hidden, and names that
/// end up empty (`..`, `" "`) are replaced.
#[must_use]
pub fn sanitize(original: &str) -> String {
    let bare = match original.rfind(['\\', '/']) {
        Some(ix) => &original[ix + 1..],
        None => original,
    };

    let cleaned: String = bare
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .collect();
    let cleaned = cleaned
        .trim()
        .trim_start_matches(|c: char| c == '.' || c.is_whitespace());

    if cleaned.is_empty() {
        return FALLBACK_STEM.to_owned();
    }

    let (stem, ext) = split_extension(cleaned);
    fit(stem, "", ext)
}

/// Name the upload is stored under according to `policy`.
///
/// The name always ends in an extension of `format`, the format the upload was
/// validated as. A sanitized name whose own extension no longer names that
/// format keeps its whole text as the stem.
#[must_use]
pub fn stored_name(
    policy: NamingPolicy,
    original: &str,
    format: VideoFormat,
    uniqueness: Uniqueness,
) -> String {
    let clean = sanitize(original);
    let (stem, ext) = match split_extension(&clean) {
        (stem, Some(ext)) if VideoFormat::from_extension(ext) == Some(format) => (stem, ext),
        _ => (clean.as_str(), format.extension()),
    };
    let suffix = match policy {
        NamingPolicy::PreserveOriginal => String::new(),
        NamingPolicy::UniqueSuffix => format!("-{}{}", uniqueness.millis, uniqueness.nonce),
    };
    fit(stem, &suffix, Some(ext))
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match file_extension(name) {
        Some(ext) => (&name[..name.len() - ext.len() - 1], Some(ext)),
        None => (name, None),
    }
}

/// Joins the parts, shortening the stem so the result stays within `MAX_FILE_NAME_LEN`.
fn fit(stem: &str, suffix: &str, ext: Option<&str>) -> String {
    let tail = match ext {
        Some(ext) => format!("{suffix}.{ext}"),
        None => suffix.to_owned(),
    };
    let budget = MAX_FILE_NAME_LEN.saturating_sub(tail.len());
    let mut end = stem.len().min(budget);
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    let stem = if end == 0 { FALLBACK_STEM } else { &stem[..end] };
    format!("{stem}{tail}")
}
