use anyhow::{anyhow, Context, Result};
use image::{GrayImage, RgbaImage};
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::recognition::OcrProfile;

/// Text read from an image, with the engine's confidence in 0.0-1.0
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f32,
}

/// OCR collaborator used for text recognition objects
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &RgbaImage, profile: OcrProfile) -> Result<OcrOutput>;
}

/// Reads text through the Tesseract command line tool.
/// Reports an error per call when Tesseract is not installed.
pub struct TesseractOcr {
    available: bool,
    languages: String,
    temp_dir: PathBuf,
    counter: AtomicU64,
}

impl TesseractOcr {
    pub fn new() -> Self {
        let available = check_tesseract();
        if available {
            debug!("Tesseract OCR available");
        } else {
            warn!("Tesseract not found. Text recognition disabled.");
        }

        let temp_dir = std::env::temp_dir().join("autoduel_ocr");
        let _ = std::fs::create_dir_all(&temp_dir);

        Self {
            available,
            languages: "eng".to_string(),
            temp_dir,
            counter: AtomicU64::new(0),
        }
    }

    /// Tesseract language list, e.g. `chi_sim+eng`
    pub fn with_languages(mut self, languages: impl Into<String>) -> Self {
        self.languages = languages.into();
        self
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    fn run_tesseract(&self, image: &GrayImage, profile: OcrProfile) -> Result<OcrOutput> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        let temp_path = self
            .temp_dir
            .join(format!("ocr_input_{}_{}.png", std::process::id(), id));
        image
            .save(&temp_path)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;

        let mut command = Command::new("tesseract");
        command
            .arg(&temp_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("--psm")
            .arg("7"); // Single text line
        if profile == OcrProfile::Digits {
            command.arg("-c").arg("tessedit_char_whitelist=0123456789");
        }
        let output = command.arg("tsv").output();
        let _ = std::fs::remove_file(&temp_path);

        let output = output.context("Failed to run tesseract")?;
        if !output.status.success() {
            return Err(anyhow!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let tsv = String::from_utf8(output.stdout).context("tesseract output is not UTF-8")?;
        let result = parse_tsv(&tsv);
        debug!("OCR result: '{}' ({:.2})", result.text, result.confidence);
        Ok(result)
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRecognizer for TesseractOcr {
    fn recognize(&self, image: &RgbaImage, profile: OcrProfile) -> Result<OcrOutput> {
        if !self.available {
            return Err(anyhow!("tesseract is not installed"));
        }
        let processed = preprocess_for_ocr(image);
        self.run_tesseract(&processed, profile)
    }
}

/// Pre-process an RGBA image for OCR:
/// 1. Convert to grayscale
/// 2. Threshold to isolate the text
/// 3. Make the text dark on white (Tesseract preference)
///
/// Game UI text is usually light on dark; regions that are already mostly
/// bright (e.g. binarised by color) keep their polarity.
fn preprocess_for_ocr(image: &RgbaImage) -> GrayImage {
    let gray = image::imageops::grayscale(image);
    let (w, h) = gray.dimensions();
    let pixels = (w as u64 * h as u64).max(1);
    let mean = gray.pixels().map(|p| p[0] as u64).sum::<u64>() / pixels;
    let light_background = mean > 127;

    GrayImage::from_fn(w, h, |x, y| {
        let bright = gray.get_pixel(x, y)[0] > 140;
        if bright != light_background {
            image::Luma([0u8]) // Text → black
        } else {
            image::Luma([255u8]) // Background → white
        }
    })
}

/// Join the recognised words of Tesseract's TSV output and average their confidence
fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut words = Vec::new();
    let mut confidence_sum = 0.0f32;

    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let conf: f32 = match cols[10].trim().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };
        let word = cols[11].trim();
        if conf < 0.0 || word.is_empty() {
            continue;
        }
        words.push(word.to_string());
        confidence_sum += conf;
    }

    if words.is_empty() {
        return OcrOutput::default();
    }
    OcrOutput {
        confidence: confidence_sum / words.len() as f32 / 100.0,
        text: words.join(" "),
    }
}

/// Check if Tesseract is installed and accessible
fn check_tesseract() -> bool {
    Command::new("tesseract")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
