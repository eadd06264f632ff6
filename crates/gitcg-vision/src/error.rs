use gitcg_capture::ScreenRect;
use thiserror::Error;

/// A recognition call that could not be evaluated at all.
///
/// A target that is simply absent from the frame is not an error; it comes
/// back as a [`crate::Recognition`] with `found == false`.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("template image is empty")]
    MissingTemplate,

    #[error("region of interest {0} is empty")]
    EmptyRegion(ScreenRect),

    #[error("region of interest {region} lies outside the {width}x{height} frame")]
    RegionOutsideFrame {
        region: ScreenRect,
        width: u32,
        height: u32,
    },

    #[error("template {width}x{height} does not fit in region {region}")]
    TemplateLargerThanRegion {
        width: u32,
        height: u32,
        region: ScreenRect,
    },

    #[error("color bounds are inverted: lower {lower:?} exceeds upper {upper:?}")]
    InvertedColorBounds { lower: [u8; 3], upper: [u8; 3] },

    #[error("invalid text pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("overlay drawing requires a non-empty name")]
    UnnamedOverlay,

    #[error("OCR failed: {0}")]
    Ocr(String),
}

impl RecognitionError {
    /// True when the recognition object itself is malformed, as opposed to a
    /// collaborator failing at evaluation time.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Ocr(_))
    }
}
