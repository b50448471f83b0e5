use crate::error::{UnsupportedFormatError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    #[default]
    Natural,
    Enhanced,
    Aerosol,
    Cloud,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Natural,
        Collection::Enhanced,
        Collection::Aerosol,
        Collection::Cloud,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Natural => "natural",
            Self::Enhanced => "enhanced",
            Self::Aerosol => "aerosol",
            Self::Cloud => "cloud",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Natural => "Natural color",
            Self::Enhanced => "Enhanced color",
            Self::Aerosol => "Aerosol index",
            Self::Cloud => "Cloud fraction",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Collection {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.key() == s.trim())
            .ok_or_else(|| ValidationError::UnknownCollection(s.to_string()))
    }
}

/// Archive rendition of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpg,
    Thumbs,
}

impl ImageFormat {
    /// Sub-directory under the archive day folder.
    pub fn directory(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Thumbs => "thumbs",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg | Self::Thumbs => "jpg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg | Self::Thumbs => "image/jpeg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directory())
    }
}

impl FromStr for ImageFormat {
    type Err = UnsupportedFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "thumbs" | "thumb" | "thumbnail" => Ok(Self::Thumbs),
            _ => Err(UnsupportedFormatError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_from_str() {
        assert_eq!("natural".parse::<Collection>().unwrap(), Collection::Natural);
        assert_eq!("cloud".parse::<Collection>().unwrap(), Collection::Cloud);
        assert!(matches!(
            "infrared".parse::<Collection>(),
            Err(ValidationError::UnknownCollection(_))
        ));
    }

    #[test]
    fn test_collection_serde_is_lowercase() {
        let json = serde_json::to_string(&Collection::Aerosol).unwrap();
        assert_eq!(json, "\"aerosol\"");
    }

    #[test]
    fn test_format_aliases() {
        assert_eq!("thumbnail".parse::<ImageFormat>().unwrap(), ImageFormat::Thumbs);
        assert_eq!("JPG".parse::<ImageFormat>().unwrap(), ImageFormat::Jpg);
        assert_eq!(ImageFormat::Thumbs.extension(), "jpg");
        assert!("tiff".parse::<ImageFormat>().is_err());
    }
}
