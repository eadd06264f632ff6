use image::{GrayImage, RgbaImage};

use crate::recognition::{MatchMethod, PreparedTemplate, TemplateMatch};

/// Best-scoring template position inside a region, relative to the region origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MatchScore {
    pub x: u32,
    pub y: u32,
    pub score: f64,
}

/// Channel planes of an image as f64 samples, row-major
struct Planes {
    width: u32,
    height: u32,
    channels: Vec<Vec<f64>>,
}

impl Planes {
    fn gray(img: &GrayImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            channels: vec![img.pixels().map(|p| p[0] as f64).collect()],
        }
    }

    fn rgb(img: &RgbaImage) -> Self {
        let channels = (0..3)
            .map(|c| img.pixels().map(|p| p[c] as f64).collect())
            .collect();
        Self {
            width: img.width(),
            height: img.height(),
            channels,
        }
    }
}

/// Template samples restricted to the scored (unmasked) pixels
struct ScoredTemplate {
    offsets: Vec<(u32, u32)>,
    values: Vec<Vec<f64>>,
    sums: Vec<f64>,
    sums_sq: Vec<f64>,
}

impl ScoredTemplate {
    fn new(planes: &Planes, mask: Option<&GrayImage>) -> Self {
        let offsets: Vec<(u32, u32)> = (0..planes.height)
            .flat_map(|y| (0..planes.width).map(move |x| (x, y)))
            .filter(|&(x, y)| mask.map_or(true, |m| m.get_pixel(x, y)[0] != 0))
            .collect();

        let values: Vec<Vec<f64>> = planes
            .channels
            .iter()
            .map(|plane| {
                offsets
                    .iter()
                    .map(|&(x, y)| plane[(y * planes.width + x) as usize])
                    .collect()
            })
            .collect();
        let sums = values.iter().map(|v| v.iter().sum()).collect();
        let sums_sq = values.iter().map(|v| v.iter().map(|t| t * t).sum()).collect();

        Self {
            offsets,
            values,
            sums,
            sums_sq,
        }
    }
}

/// Slide the template over `region` and return the highest-scoring position.
///
/// Masked template pixels take no part in any sum, so whatever the frame
/// shows underneath them cannot move the score. Returns `None` when the mask
/// leaves nothing to score or the template does not fit.
pub(crate) fn best_match(
    region: &RgbaImage,
    params: &TemplateMatch,
    prepared: &PreparedTemplate,
) -> Option<MatchScore> {
    let (image, template) = if params.use_3_channels {
        (Planes::rgb(region), Planes::rgb(&params.template))
    } else {
        let gray = image::imageops::grayscale(region);
        (Planes::gray(&gray), Planes::gray(&prepared.gray))
    };

    if template.width > image.width || template.height > image.height {
        return None;
    }

    let scored = ScoredTemplate::new(&template, prepared.mask.as_ref());
    if scored.offsets.is_empty() {
        return None;
    }

    let mut best: Option<MatchScore> = None;
    for y in 0..=(image.height - template.height) {
        for x in 0..=(image.width - template.width) {
            let score = window_score(&image, &scored, x, y, params.method);
            if best.map_or(true, |b| score > b.score) {
                best = Some(MatchScore { x, y, score });
            }
        }
    }
    best
}

fn window_score(
    image: &Planes,
    tmpl: &ScoredTemplate,
    x: u32,
    y: u32,
    method: MatchMethod,
) -> f64 {
    let n = tmpl.offsets.len() as f64;
    let mut numerator = 0.0;
    let mut image_energy = 0.0;
    let mut template_energy = 0.0;

    for (c, plane) in image.channels.iter().enumerate() {
        let (mut si, mut si2, mut sit) = (0.0, 0.0, 0.0);
        for (k, &(dx, dy)) in tmpl.offsets.iter().enumerate() {
            let i = plane[((y + dy) * image.width + x + dx) as usize];
            let t = tmpl.values[c][k];
            si += i;
            si2 += i * i;
            sit += i * t;
        }
        let (st, st2) = (tmpl.sums[c], tmpl.sums_sq[c]);

        match method {
            MatchMethod::CCoeffNormed => {
                numerator += sit - si * st / n;
                image_energy += (si2 - si * si / n).max(0.0);
                template_energy += (st2 - st * st / n).max(0.0);
            }
            MatchMethod::CCorrNormed => {
                numerator += sit;
                image_energy += si2;
                template_energy += st2;
            }
            MatchMethod::SqDiffNormed => {
                numerator += (si2 - 2.0 * sit + st2).max(0.0);
                image_energy += si2;
                template_energy += st2;
            }
        }
    }

    let denom = (image_energy * template_energy).sqrt();
    match method {
        MatchMethod::SqDiffNormed => {
            if denom < 1e-10 {
                return if numerator < 1e-10 { 1.0 } else { 0.0 };
            }
            (1.0 - numerator / denom).clamp(0.0, 1.0)
        }
        _ => {
            if denom < 1e-10 {
                return 0.0;
            }
            numerator / denom
        }
    }
}
