use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Video container formats the service accepts, stores and lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Avi,
    Mov,
    Wmv,
    Flv,
    Mkv,
    Webm,
}

impl VideoFormat {
    pub const ALL: [VideoFormat; 7] = [
        VideoFormat::Mp4,
        VideoFormat::Avi,
        VideoFormat::Mov,
        VideoFormat::Wmv,
        VideoFormat::Flv,
        VideoFormat::Mkv,
        VideoFormat::Webm,
    ];

    /// Lower case file extension without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Avi => "avi",
            VideoFormat::Mov => "mov",
            VideoFormat::Wmv => "wmv",
            VideoFormat::Flv => "flv",
            VideoFormat::Mkv => "mkv",
            VideoFormat::Webm => "webm",
        }
    }

    /// Registered MIME type used when sending a file of this format.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "video/mp4",
            VideoFormat::Avi => "video/x-msvideo",
            VideoFormat::Mov => "video/quicktime",
            VideoFormat::Wmv => "video/x-ms-wmv",
            VideoFormat::Flv => "video/x-flv",
            VideoFormat::Mkv => "video/x-matroska",
            VideoFormat::Webm => "video/webm",
        }
    }

    /// Case insensitive lookup by bare extension (`"MP4"`, `"webm"`).
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(extension))
    }

    /// Format of a file name judging by its extension only.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        file_extension(name).and_then(Self::from_extension)
    }

    /// Checks a declared content type against the allow-set.
    ///
    /// Parameters (`; codecs=...`) are ignored. A type is accepted when it names
    /// one of the extensions (`video/mp4`, `video/x-flv`) or is the registered
    /// type of a format whose registered name does not contain its extension
    /// (`video/quicktime` for mov, `video/x-matroska` for mkv).
    #[must_use]
    pub fn matches_mime(content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence.is_empty() {
            return false;
        }
        Self::ALL
            .into_iter()
            .any(|f| essence.contains(f.extension()) || essence == f.mime_type())
    }
}

/// Extension of the last path component, without the dot.
///
/// Leading dots do not start an extension, so `.mp4` has none while
/// `clip.tar.mp4` has `mp4`. Both `/` and `\` count as separators.
#[must_use]
pub fn file_extension(name: &str) -> Option<&str> {
    let bare = match name.rfind(['\\', '/']) {
        Some(ix) => &name[ix + 1..],
        None => name,
    };
    let stem_len = bare.trim_start_matches('.').len();
    let offset = bare.len() - stem_len;
    let ix = bare[offset..].rfind('.')?;
    let ext = &bare[offset + ix + 1..];
    if ext.is_empty() { None } else { Some(ext) }
}
