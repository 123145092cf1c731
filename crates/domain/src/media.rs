//! Media-loading node kinds whose file inputs must be uploaded.

use serde::{Deserialize, Serialize};

const IMAGE_LOADERS: &[&str] = &["LoadImage"];
const VIDEO_LOADERS: &[&str] = &["VHS_LoadVideo"];
const AUDIO_LOADERS: &[&str] = &["LoadAudio", "LoadVHSAudio", "VHS_LoadAudio"];

/// What kind of local media a loader node references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Classify a node by class type. `None` for nodes that load no local media.
    pub fn from_class_type(class_type: &str) -> Option<Self> {
        if IMAGE_LOADERS.contains(&class_type) {
            Some(Self::Image)
        } else if VIDEO_LOADERS.contains(&class_type) {
            Some(Self::Video)
        } else if AUDIO_LOADERS.contains(&class_type) {
            Some(Self::Audio)
        } else {
            None
        }
    }

    /// Input field holding the file reference.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_variants_are_classified() {
        assert_eq!(MediaKind::from_class_type("LoadImage"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_class_type("VHS_LoadVideo"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_class_type("VHS_LoadAudio"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_class_type("LoadVHSAudio"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_class_type("KSampler"), None);
    }

    #[test]
    fn fields_match_loader_inputs() {
        assert_eq!(MediaKind::Image.field(), "image");
        assert_eq!(MediaKind::Video.field(), "video");
        assert_eq!(MediaKind::Audio.field(), "audio");
    }
}
