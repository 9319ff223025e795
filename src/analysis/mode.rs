use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "rst", "html", "json"];
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm"];

/// Kind of content a file holds, resolved once from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    Text,
    Image,
    Video,
}

impl ContentMode {
    pub const ALL: [ContentMode; 3] = [ContentMode::Text, ContentMode::Image, ContentMode::Video];

    /// Resolve a path's mode from its extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| Error::UnsupportedFileType(path.display().to_string()))?;
        Self::ALL
            .into_iter()
            .find(|mode| mode.extensions().contains(&ext.as_str()))
            .ok_or_else(|| Error::UnsupportedFileType(path.display().to_string()))
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Text => TEXT_EXTENSIONS,
            Self::Image => IMAGE_EXTENSIONS,
            Self::Video => VIDEO_EXTENSIONS,
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        Self::from_path(path).is_ok_and(|mode| mode == *self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// File name of this mode's prototype cache inside a directory.
    pub fn prototype_file_name(&self) -> String {
        format!(".{}_prototype_embedding.bin", self.as_str())
    }
}

impl fmt::Display for ContentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(Error::UnsupportedFileType(other.to_string())),
        }
    }
}

/// True if any component of `path` starts with a dot.
pub fn is_hidden(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| s.starts_with('.') && s != "." && s != "..")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_by_extension_case_insensitively() {
        assert_eq!(ContentMode::from_path(Path::new("a/notes.MD")).unwrap(), ContentMode::Text);
        assert_eq!(ContentMode::from_path(Path::new("photo.JPeG")).unwrap(), ContentMode::Image);
        assert_eq!(ContentMode::from_path(Path::new("clip.mkv")).unwrap(), ContentMode::Video);
    }

    #[test]
    fn unknown_or_missing_extension_is_unsupported() {
        assert!(matches!(
            ContentMode::from_path(Path::new("archive.zip")),
            Err(Error::UnsupportedFileType(_))
        ));
        assert!(matches!(
            ContentMode::from_path(Path::new("Makefile")),
            Err(Error::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn prototype_file_names_are_hidden_and_per_mode() {
        assert_eq!(
            ContentMode::Image.prototype_file_name(),
            ".image_prototype_embedding.bin"
        );
        assert!(is_hidden(Path::new(&ContentMode::Text.prototype_file_name())));
    }

    #[test]
    fn parses_from_str() {
        assert_eq!("video".parse::<ContentMode>().unwrap(), ContentMode::Video);
        assert!("audio".parse::<ContentMode>().is_err());
    }

    #[test]
    fn hidden_components() {
        assert!(is_hidden(Path::new("docs/.git/config")));
        assert!(!is_hidden(Path::new("./docs/readme.md")));
        assert!(!is_hidden(Path::new("../docs/readme.md")));
    }
}
