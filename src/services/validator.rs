//! Upload validation: presence, size, declared type and byte-level sniffing.
//!
//! Rules run in a fixed order and the first violation is reported. The payload
//! bytes are inspected so a spoofed `Content-Type` cannot smuggle a non-image
//! onto disk.

use crate::models::evidence::UploadedFile;
use image::ImageFormat;
use thiserror::Error;

/// Largest accepted payload, in bytes (5 MiB).
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no image file provided")]
    MissingFile,
    #[error("file size {actual} exceeds maximum allowed size of {limit} bytes")]
    FileTooLarge { actual: u64, limit: u64 },
    #[error("invalid file format `{declared}`; only JPEG, PNG, GIF, WebP are allowed")]
    InvalidFile { declared: String },
    #[error("file content is not a valid {declared} image")]
    InvalidImage {
        declared: String,
        detected: Option<&'static str>,
    },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFile => "missing_file",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::InvalidFile { .. } => "invalid_file",
            Self::InvalidImage { .. } => "invalid_image",
        }
    }
}

/// Image types accepted as evidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageKind {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    /// Canonical extension used when the original filename has no usable one.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Identify the image type from its leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Result<Self, Option<&'static str>> {
        match image::guess_format(bytes) {
            Ok(ImageFormat::Jpeg) => Ok(Self::Jpeg),
            Ok(ImageFormat::Png) => Ok(Self::Png),
            Ok(ImageFormat::Gif) => Ok(Self::Gif),
            Ok(ImageFormat::WebP) => Ok(Self::WebP),
            Ok(other) => Err(Some(other.to_mime_type())),
            Err(_) => Err(None),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Validator {
    max_size: u64,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            max_size: MAX_FILE_SIZE,
        }
    }
}

impl Validator {
    /// Check `file` and return the detected image type.
    pub fn validate(&self, file: Option<&UploadedFile>) -> Result<ImageKind, ValidationError> {
        let file = match file {
            Some(file) if !file.bytes.is_empty() => file,
            _ => return Err(ValidationError::MissingFile),
        };

        if file.size() > self.max_size {
            return Err(ValidationError::FileTooLarge {
                actual: file.size(),
                limit: self.max_size,
            });
        }

        let declared = normalize_mime(&file.declared_mime);
        let declared_kind =
            ImageKind::from_mime(&declared).ok_or_else(|| ValidationError::InvalidFile {
                declared: declared.clone(),
            })?;

        match ImageKind::sniff(&file.bytes) {
            Ok(detected) if detected == declared_kind => Ok(detected),
            Ok(detected) => Err(ValidationError::InvalidImage {
                declared,
                detected: Some(detected.mime()),
            }),
            Err(detected) => Err(ValidationError::InvalidImage { declared, detected }),
        }
    }
}

/// Lower-case and strip any `; param=value` suffix.
fn normalize_mime(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
