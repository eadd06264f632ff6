use gitcg_capture::ScreenRect;
use image::{GrayImage, Luma, RgbaImage};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RecognitionError;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;

/// Template pixels of this color are left out of scoring when masking is on
pub const DEFAULT_MASK_COLOR: [u8; 3] = [0, 255, 0];

/// Correlation used to score a template against each window of the region
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMethod {
    /// Zero-mean normalized cross-correlation
    #[default]
    CCoeffNormed,
    /// Normalized cross-correlation without mean removal
    CCorrNormed,
    /// Normalized squared difference, reported as `1 - difference`
    SqDiffNormed,
}

#[derive(Debug, Clone)]
pub struct TemplateMatch {
    pub template: RgbaImage,
    pub threshold: f64,
    /// Score on R, G and B instead of the grayscale pair
    pub use_3_channels: bool,
    pub method: MatchMethod,
    pub use_mask: bool,
    pub mask_color: [u8; 3],
}

impl TemplateMatch {
    pub fn new(template: RgbaImage) -> Self {
        Self {
            template,
            threshold: DEFAULT_MATCH_THRESHOLD,
            use_3_channels: false,
            method: MatchMethod::default(),
            use_mask: false,
            mask_color: DEFAULT_MASK_COLOR,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    #[default]
    Rgb,
    /// 8-bit HSV: hue in 0..180, saturation and value in 0..=255
    Hsv,
    /// Luma only; the first channel of each bound is used
    Gray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMatch {
    pub space: ColorSpace,
    pub lower: [u8; 3],
    pub upper: [u8; 3],
    /// Pixels inside the bounds needed for a match
    pub min_count: u32,
}

impl ColorMatch {
    pub fn new(space: ColorSpace, lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self {
            space,
            lower,
            upper,
            min_count: 1,
        }
    }

    pub fn min_count(mut self, count: u32) -> Self {
        self.min_count = count;
        self
    }
}

/// Which OCR setup the collaborator should use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OcrProfile {
    #[default]
    Text,
    Digits,
}

/// Known misreadings of `canonical`, rewritten before the text is checked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextReplacement {
    pub canonical: String,
    pub misreadings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMatch {
    pub profile: OcrProfile,
    pub replacements: Vec<TextReplacement>,
    /// Every substring must be present
    pub require_all: Vec<String>,
    /// At least one substring must be present
    pub require_any: Vec<String>,
    /// Every pattern must match
    pub require_all_regex: Vec<String>,
}

impl TextMatch {
    pub fn new(profile: OcrProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    pub fn replace(mut self, canonical: &str, misreadings: &[&str]) -> Self {
        self.replacements.push(TextReplacement {
            canonical: canonical.to_string(),
            misreadings: misreadings.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    pub fn all_of(mut self, texts: &[&str]) -> Self {
        self.require_all.extend(texts.iter().map(|t| t.to_string()));
        self
    }

    pub fn any_of(mut self, texts: &[&str]) -> Self {
        self.require_any.extend(texts.iter().map(|t| t.to_string()));
        self
    }

    pub fn matching(mut self, patterns: &[&str]) -> Self {
        self.require_all_regex
            .extend(patterns.iter().map(|p| p.to_string()));
        self
    }

    pub(crate) fn has_requirements(&self) -> bool {
        !self.require_all.is_empty()
            || !self.require_any.is_empty()
            || !self.require_all_regex.is_empty()
    }
}

/// One way of finding something on screen
#[derive(Debug, Clone)]
pub enum RecognitionKind {
    Template(TemplateMatch),
    Color(ColorMatch),
    Text(TextMatch),
    /// Binarise the region by color range, then read it
    ColorText { color: ColorMatch, text: TextMatch },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStyle {
    pub color: [u8; 3],
    pub thickness: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: [255, 0, 0],
            thickness: 2,
        }
    }
}

/// Describes a single perception task: where to look and how to decide.
#[derive(Debug, Clone)]
pub struct RecognitionObject {
    pub region: ScreenRect,
    pub kind: RecognitionKind,
    pub name: Option<String>,
    /// Draw a labelled rectangle on the overlay when found
    pub overlay: Option<OverlayStyle>,
}

impl RecognitionObject {
    pub fn new(region: ScreenRect, kind: RecognitionKind) -> Self {
        Self {
            region,
            kind,
            name: None,
            overlay: None,
        }
    }

    pub fn template(region: ScreenRect, template: TemplateMatch) -> Self {
        Self::new(region, RecognitionKind::Template(template))
    }

    pub fn color(region: ScreenRect, color: ColorMatch) -> Self {
        Self::new(region, RecognitionKind::Color(color))
    }

    pub fn text(region: ScreenRect, text: TextMatch) -> Self {
        Self::new(region, RecognitionKind::Text(text))
    }

    pub fn color_text(region: ScreenRect, color: ColorMatch, text: TextMatch) -> Self {
        Self::new(region, RecognitionKind::ColorText { color, text })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn drawn(mut self, style: OverlayStyle) -> Self {
        self.overlay = Some(style);
        self
    }

    /// Validate the object and derive everything evaluation needs.
    ///
    /// Pure: the same object always yields identical derived images, so
    /// preparing again is harmless.
    pub fn prepare(&self) -> Result<PreparedRecognition, RecognitionError> {
        if self.region.is_empty() {
            return Err(RecognitionError::EmptyRegion(self.region));
        }
        if self.overlay.is_some() && self.name.as_deref().map_or(true, str::is_empty) {
            return Err(RecognitionError::UnnamedOverlay);
        }

        let mut template = None;
        let mut patterns = Vec::new();
        match &self.kind {
            RecognitionKind::Template(params) => {
                template = Some(prepare_template(params)?);
            }
            RecognitionKind::Color(color) => check_bounds(color)?,
            RecognitionKind::Text(text) => patterns = compile_patterns(text)?,
            RecognitionKind::ColorText { color, text } => {
                check_bounds(color)?;
                patterns = compile_patterns(text)?;
            }
        }

        Ok(PreparedRecognition {
            object: self.clone(),
            template,
            patterns,
        })
    }
}

/// Grayscale template and optional scoring mask derived from a color template
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTemplate {
    pub gray: GrayImage,
    /// 255 where the template pixel is scored, 0 where it is masked out
    pub mask: Option<GrayImage>,
}

/// A validated recognition object with its derived data. Immutable once built.
#[derive(Debug, Clone)]
pub struct PreparedRecognition {
    object: RecognitionObject,
    template: Option<PreparedTemplate>,
    patterns: Vec<Regex>,
}

impl PreparedRecognition {
    pub fn object(&self) -> &RecognitionObject {
        &self.object
    }

    pub fn template(&self) -> Option<&PreparedTemplate> {
        self.template.as_ref()
    }

    pub(crate) fn patterns(&self) -> &[Regex] {
        &self.patterns
    }
}

fn prepare_template(params: &TemplateMatch) -> Result<PreparedTemplate, RecognitionError> {
    let (w, h) = params.template.dimensions();
    if w == 0 || h == 0 {
        return Err(RecognitionError::MissingTemplate);
    }

    let gray = image::imageops::grayscale(&params.template);
    let mask = params.use_mask.then(|| {
        GrayImage::from_fn(w, h, |x, y| {
            let px = params.template.get_pixel(x, y);
            if [px[0], px[1], px[2]] == params.mask_color {
                Luma([0u8])
            } else {
                Luma([255u8])
            }
        })
    });

    Ok(PreparedTemplate { gray, mask })
}

fn check_bounds(color: &ColorMatch) -> Result<(), RecognitionError> {
    let channels = if color.space == ColorSpace::Gray { 1 } else { 3 };
    if (0..channels).any(|c| color.lower[c] > color.upper[c]) {
        return Err(RecognitionError::InvertedColorBounds {
            lower: color.lower,
            upper: color.upper,
        });
    }
    Ok(())
}

fn compile_patterns(text: &TextMatch) -> Result<Vec<Regex>, RecognitionError> {
    text.require_all_regex
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| RecognitionError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}
