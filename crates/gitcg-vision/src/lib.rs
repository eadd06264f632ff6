//! Screen recognition for the card duel: declarative recognition objects and
//! the engine that evaluates them against captured frames.

mod color;
mod engine;
mod error;
mod ocr;
mod overlay;
mod recognition;
mod template;
mod text;

pub use engine::{MatchDetail, Recognition, RecognitionEngine};
pub use error::RecognitionError;
pub use ocr::{OcrOutput, TesseractOcr, TextRecognizer};
pub use overlay::{DrawList, DrawnShape, NoOverlay, Overlay};
pub use recognition::{
    ColorMatch, ColorSpace, MatchMethod, OcrProfile, OverlayStyle, PreparedRecognition,
    PreparedTemplate, RecognitionKind, RecognitionObject, TemplateMatch, TextMatch,
    TextReplacement, DEFAULT_MASK_COLOR, DEFAULT_MATCH_THRESHOLD,
};
pub use text::normalize_text;
