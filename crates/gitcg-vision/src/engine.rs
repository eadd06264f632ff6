use gitcg_capture::{crop_rect, ScreenRect};
use image::RgbaImage;
use std::sync::Arc;
use tracing::debug;

use crate::color;
use crate::error::RecognitionError;
use crate::ocr::TextRecognizer;
use crate::overlay::Overlay;
use crate::recognition::{PreparedRecognition, RecognitionKind, TextMatch};
use crate::template;
use crate::text;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchDetail {
    Template { confidence: f64 },
    Color { matched_pixels: u32 },
    Text { text: String, confidence: f32 },
}

/// Outcome of evaluating one recognition object against a frame
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub found: bool,
    /// Best template position, or the searched region for color and text
    pub area: ScreenRect,
    pub detail: MatchDetail,
}

impl Recognition {
    pub fn text(&self) -> Option<&str> {
        match &self.detail {
            MatchDetail::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match &self.detail {
            MatchDetail::Template { confidence } => Some(*confidence),
            MatchDetail::Text { confidence, .. } => Some(*confidence as f64),
            MatchDetail::Color { .. } => None,
        }
    }
}

/// Evaluates prepared recognition objects. Holds only collaborator handles.
#[derive(Clone)]
pub struct RecognitionEngine {
    ocr: Arc<dyn TextRecognizer>,
    overlay: Option<Arc<dyn Overlay>>,
}

impl RecognitionEngine {
    pub fn new(ocr: Arc<dyn TextRecognizer>) -> Self {
        Self { ocr, overlay: None }
    }

    pub fn with_overlay(mut self, overlay: Arc<dyn Overlay>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn evaluate(
        &self,
        frame: &RgbaImage,
        target: &PreparedRecognition,
    ) -> Result<Recognition, RecognitionError> {
        let object = target.object();
        let region = object
            .region
            .intersect(&ScreenRect::of_image(frame))
            .ok_or(RecognitionError::RegionOutsideFrame {
                region: object.region,
                width: frame.width(),
                height: frame.height(),
            })?;
        let crop = crop_rect(frame, &region);

        let recognition = match &object.kind {
            RecognitionKind::Template(params) => {
                let prepared = target.template().ok_or(RecognitionError::MissingTemplate)?;
                let (tw, th) = params.template.dimensions();
                if tw > region.width || th > region.height {
                    return Err(RecognitionError::TemplateLargerThanRegion {
                        width: tw,
                        height: th,
                        region,
                    });
                }
                match template::best_match(&crop, params, prepared) {
                    Some(m) => Recognition {
                        found: m.score >= params.threshold,
                        area: ScreenRect::new(region.x + m.x, region.y + m.y, tw, th),
                        detail: MatchDetail::Template { confidence: m.score },
                    },
                    None => Recognition {
                        found: false,
                        area: region,
                        detail: MatchDetail::Template { confidence: 0.0 },
                    },
                }
            }
            RecognitionKind::Color(params) => {
                let matched_pixels = color::count_in_range(&crop, params);
                Recognition {
                    found: matched_pixels >= params.min_count,
                    area: region,
                    detail: MatchDetail::Color { matched_pixels },
                }
            }
            RecognitionKind::Text(params) => self.read_text(&crop, region, params, target)?,
            RecognitionKind::ColorText { color: range, text: params } => {
                let binary = color::binarize(&crop, range);
                self.read_text(&binary, region, params, target)?
            }
        };

        debug!(
            "Recognition '{}' in {}: found={} {:?}",
            object.name.as_deref().unwrap_or("unnamed"),
            region,
            recognition.found,
            recognition.detail
        );

        if recognition.found {
            if let (Some(style), Some(overlay)) = (object.overlay, &self.overlay) {
                let label = object.name.as_deref().unwrap_or_default();
                overlay.draw_rectangle(recognition.area, style, label);
            }
        }

        Ok(recognition)
    }

    fn read_text(
        &self,
        image: &RgbaImage,
        region: ScreenRect,
        params: &TextMatch,
        target: &PreparedRecognition,
    ) -> Result<Recognition, RecognitionError> {
        let output = self
            .ocr
            .recognize(image, params.profile)
            .map_err(|e| RecognitionError::Ocr(format!("{:#}", e)))?;
        let text = text::normalize_text(&output.text, &params.replacements);
        Ok(Recognition {
            found: text::text_satisfies(&text, params, target.patterns()),
            area: region,
            detail: MatchDetail::Text {
                text,
                confidence: output.confidence,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrOutput;
    use crate::overlay::DrawList;
    use crate::recognition::{
        ColorMatch, ColorSpace, OcrProfile, OverlayStyle, RecognitionObject, TemplateMatch,
    };
    use anyhow::anyhow;
    use image::Rgba;
    use std::sync::Mutex;

    /// Returns a canned reading and keeps the last image it was shown
    struct FakeOcr {
        reply: anyhow::Result<String>,
        seen: Mutex<Option<RgbaImage>>,
    }

    impl FakeOcr {
        fn reading(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(anyhow!("engine crashed")),
                seen: Mutex::new(None),
            })
        }
    }

    impl TextRecognizer for FakeOcr {
        fn recognize(&self, image: &RgbaImage, _profile: OcrProfile) -> anyhow::Result<OcrOutput> {
            *self.seen.lock().unwrap() = Some(image.clone());
            match &self.reply {
                Ok(text) => Ok(OcrOutput {
                    text: text.clone(),
                    confidence: 0.9,
                }),
                Err(e) => Err(anyhow!("{}", e)),
            }
        }
    }

    fn noise(x: u32, y: u32) -> u8 {
        let mut h = x.wrapping_mul(2_654_435_761).wrapping_add(y.wrapping_mul(40_503));
        h ^= h >> 15;
        h = h.wrapping_mul(2_246_822_519);
        (h ^ (h >> 13)) as u8
    }

    fn noisy_frame() -> RgbaImage {
        RgbaImage::from_fn(200, 120, |x, y| Rgba([noise(x, y), noise(y, x), 60, 255]))
    }

    fn engine() -> RecognitionEngine {
        RecognitionEngine::new(FakeOcr::reading(""))
    }

    #[test]
    fn test_template_found_in_region() {
        let frame = noisy_frame();
        let template = image::imageops::crop_imm(&frame, 120, 50, 20, 15).to_image();
        let object = RecognitionObject::template(
            ScreenRect::new(100, 30, 80, 60),
            TemplateMatch::new(template),
        );

        let result = engine().evaluate(&frame, &object.prepare().unwrap()).unwrap();
        assert!(result.found);
        assert_eq!(result.area, ScreenRect::new(120, 50, 20, 15));
        assert!(result.confidence().unwrap() > 0.99);
    }

    #[test]
    fn test_template_outside_region_not_found() {
        let frame = noisy_frame();
        let template = image::imageops::crop_imm(&frame, 10, 10, 20, 15).to_image();
        let object = RecognitionObject::template(
            ScreenRect::new(100, 30, 80, 60),
            TemplateMatch::new(template),
        );

        let result = engine().evaluate(&frame, &object.prepare().unwrap()).unwrap();
        assert!(!result.found);
        assert!(result.confidence().unwrap() < 0.8);
    }

    #[test]
    fn test_template_larger_than_region() {
        let frame = noisy_frame();
        let object = RecognitionObject::template(
            ScreenRect::new(0, 0, 10, 10),
            TemplateMatch::new(RgbaImage::new(20, 20)),
        );
        let err = engine().evaluate(&frame, &object.prepare().unwrap()).unwrap_err();
        assert!(matches!(err, RecognitionError::TemplateLargerThanRegion { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_region_outside_frame() {
        let frame = noisy_frame();
        let object = RecognitionObject::color(
            ScreenRect::new(500, 500, 10, 10),
            ColorMatch::new(ColorSpace::Rgb, [0, 0, 0], [255, 255, 255]),
        );
        let err = engine().evaluate(&frame, &object.prepare().unwrap()).unwrap_err();
        assert!(matches!(err, RecognitionError::RegionOutsideFrame { .. }));
    }

    #[test]
    fn test_color_count_threshold() {
        let mut frame = RgbaImage::from_pixel(50, 50, Rgba([0, 0, 0, 255]));
        for x in 10..20 {
            frame.put_pixel(x, 10, Rgba([250, 200, 40, 255]));
        }
        let gold = ColorMatch::new(ColorSpace::Rgb, [200, 150, 0], [255, 255, 100]);

        let enough = RecognitionObject::color(ScreenRect::new(0, 0, 50, 50), gold.min_count(10));
        let result = engine().evaluate(&frame, &enough.prepare().unwrap()).unwrap();
        assert!(result.found);
        assert_eq!(result.detail, MatchDetail::Color { matched_pixels: 10 });

        let too_many = RecognitionObject::color(ScreenRect::new(0, 0, 50, 50), gold.min_count(11));
        assert!(!engine().evaluate(&frame, &too_many.prepare().unwrap()).unwrap().found);
    }

    #[test]
    fn test_color_match_in_hsv() {
        let frame = RgbaImage::from_fn(20, 20, |x, _| {
            if x < 5 {
                Rgba([40, 160, 230, 255]) // light blue
            } else {
                Rgba([200, 40, 40, 255])
            }
        });
        let blue = ColorMatch::new(ColorSpace::Hsv, [95, 100, 100], [115, 255, 255]);
        let object = RecognitionObject::color(ScreenRect::new(0, 0, 20, 20), blue);
        let result = engine().evaluate(&frame, &object.prepare().unwrap()).unwrap();
        assert_eq!(result.detail, MatchDetail::Color { matched_pixels: 100 });
    }

    #[test]
    fn test_text_normalised_then_checked() {
        let engine = RecognitionEngine::new(FakeOcr::reading("Rerol1 Dlce"));
        let object = RecognitionObject::text(
            ScreenRect::new(0, 0, 50, 20),
            TextMatch::default()
                .replace("Reroll", &["Rerol1"])
                .replace("Dice", &["Dlce"])
                .all_of(&["Reroll", "Dice"]),
        );
        let result = engine
            .evaluate(&RgbaImage::new(100, 100), &object.prepare().unwrap())
            .unwrap();
        assert!(result.found);
        assert_eq!(result.text(), Some("Reroll Dice"));
    }

    #[test]
    fn test_text_not_found_is_not_an_error() {
        let engine = RecognitionEngine::new(FakeOcr::reading("Opponent's turn"));
        let object = RecognitionObject::text(
            ScreenRect::new(0, 0, 50, 20),
            TextMatch::default().any_of(&["Your turn"]),
        );
        let result = engine
            .evaluate(&RgbaImage::new(100, 100), &object.prepare().unwrap())
            .unwrap();
        assert!(!result.found);
    }

    #[test]
    fn test_ocr_failure_is_reported() {
        let engine = RecognitionEngine::new(FakeOcr::failing());
        let object = RecognitionObject::text(ScreenRect::new(0, 0, 50, 20), TextMatch::default());
        let err = engine
            .evaluate(&RgbaImage::new(100, 100), &object.prepare().unwrap())
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Ocr(_)));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_color_text_reads_binarised_region() {
        let ocr = FakeOcr::reading("7");
        let engine = RecognitionEngine::new(ocr.clone());
        let frame = RgbaImage::from_fn(40, 20, |x, _| {
            if x < 10 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([90, 60, 30, 255])
            }
        });
        let white = ColorMatch::new(ColorSpace::Rgb, [230, 230, 230], [255, 255, 255]);
        let object = RecognitionObject::color_text(
            ScreenRect::new(0, 0, 40, 20),
            white,
            TextMatch::new(OcrProfile::Digits).matching(&[r"^\d+$"]),
        );

        let result = engine.evaluate(&frame, &object.prepare().unwrap()).unwrap();
        assert!(result.found);

        let seen = ocr.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(seen.get_pixel(39, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_overlay_drawn_only_when_found() {
        let overlay = Arc::new(DrawList::new());
        let engine = RecognitionEngine::new(FakeOcr::reading("")).with_overlay(overlay.clone());
        let frame = RgbaImage::from_pixel(30, 30, Rgba([255, 255, 255, 255]));

        let white = RecognitionObject::color(
            ScreenRect::new(5, 5, 10, 10),
            ColorMatch::new(ColorSpace::Gray, [200, 0, 0], [255, 0, 0]),
        )
        .named("white")
        .drawn(OverlayStyle::default());
        let black = RecognitionObject::color(
            ScreenRect::new(5, 5, 10, 10),
            ColorMatch::new(ColorSpace::Gray, [0, 0, 0], [20, 0, 0]),
        )
        .named("black")
        .drawn(OverlayStyle::default());

        assert!(engine.evaluate(&frame, &white.prepare().unwrap()).unwrap().found);
        assert!(!engine.evaluate(&frame, &black.prepare().unwrap()).unwrap().found);

        let shapes = overlay.shapes();
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].label, "white");
        assert_eq!(shapes[0].rect, ScreenRect::new(5, 5, 10, 10));
    }
}
