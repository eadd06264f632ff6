use gitcg_capture::{crop_rect, ScreenRect};
use image::RgbaImage;
use tracing::debug;

/// Column brightness above which a column belongs to a card
const CARD_BRIGHTNESS: f64 = 60.0;

/// Perceived state of one character card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardState {
    pub area: ScreenRect,
    /// Top edge of the card as found in the frame
    pub top: u32,
    pub lifted: bool,
    pub defeated: bool,
    pub frozen: bool,
}

/// Find character cards inside `row` by analyzing column brightness.
/// Returned rectangles are in frame coordinates, left to right.
pub fn find_character_cards(frame: &RgbaImage, row: ScreenRect) -> Vec<ScreenRect> {
    let Some(row) = row.intersect(&ScreenRect::of_image(frame)) else {
        return Vec::new();
    };
    let area = crop_rect(frame, &row);
    let (w, h) = area.dimensions();
    if w < 10 || h < 10 {
        return Vec::new();
    }

    // Per-column average brightness over sampled rows
    let y_step = (h / 20).max(1);
    let profile: Vec<f64> = (0..w)
        .map(|x| {
            let mut sum = 0.0;
            let mut n = 0u32;
            let mut y = 0;
            while y < h {
                sum += brightness(&area, x, y);
                n += 1;
                y += y_step;
            }
            sum / n.max(1) as f64
        })
        .collect();

    let smoothed = smooth(&profile, (w as usize / 100).max(3));
    // Cards are narrow compared with the row; anything thinner is a highlight
    let segments = find_bright_segments(&smoothed, CARD_BRIGHTNESS, w as usize / 10);
    debug!("Character row {}: {} bright segment(s)", row, segments.len());

    segments
        .into_iter()
        .filter_map(|(start, end)| {
            let mid = ((start + end) / 2) as u32;
            let (top, bottom) = vertical_extent(&area, mid)?;
            Some(ScreenRect::new(
                row.x + start as u32,
                row.y + top,
                (end - start) as u32,
                bottom - top,
            ))
        })
        .collect()
}

/// Topmost card row at or above `area`, searching `lift_search` pixels higher.
/// Averages the middle third of the card's columns.
pub(crate) fn card_top(frame: &RgbaImage, area: ScreenRect, lift_search: u32) -> Option<u32> {
    let (w, h) = frame.dimensions();
    let x0 = area.x + area.width / 3;
    let x1 = (area.x + area.width * 2 / 3).min(w);
    if x0 >= x1 {
        return None;
    }
    let y_end = (area.y + area.height / 2).min(h);

    (area.y.saturating_sub(lift_search)..y_end).find(|&y| {
        let sum: f64 = (x0..x1).map(|x| brightness(frame, x, y)).sum();
        sum / (x1 - x0) as f64 > CARD_BRIGHTNESS
    })
}

fn vertical_extent(area: &RgbaImage, x: u32) -> Option<(u32, u32)> {
    let h = area.height();
    let top = (0..h).find(|&y| brightness(area, x, y) > CARD_BRIGHTNESS)?;
    let bottom = (top..h)
        .rev()
        .find(|&y| brightness(area, x, y) > CARD_BRIGHTNESS)?;
    Some((top, bottom + 1))
}

fn brightness(image: &RgbaImage, x: u32, y: u32) -> f64 {
    let px = image.get_pixel(x, y);
    (px[0] as f64 + px[1] as f64 + px[2] as f64) / 3.0
}

fn smooth(data: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..data.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(data.len());
            data[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

/// Contiguous runs above the threshold, at least `min_width` long
fn find_bright_segments(profile: &[f64], threshold: f64, min_width: usize) -> Vec<(usize, usize)> {
    let mut segments = Vec::new();
    let mut start = None;

    for (i, &val) in profile.iter().enumerate() {
        match start {
            None if val > threshold => start = Some(i),
            Some(s) if val <= threshold => {
                if i - s >= min_width {
                    segments.push((s, i));
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if profile.len() - s >= min_width {
            segments.push((s, profile.len()));
        }
    }

    segments
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgba;

    pub(crate) const BACKGROUND: Rgba<u8> = Rgba([20, 20, 30, 255]);

    pub(crate) fn fill(frame: &mut RgbaImage, rect: ScreenRect, color: Rgba<u8>) {
        for y in rect.y..rect.bottom().min(frame.height()) {
            for x in rect.x..rect.right().min(frame.width()) {
                frame.put_pixel(x, y, color);
            }
        }
    }

    #[test]
    fn test_find_bright_segments() {
        let profile = vec![
            10.0, 10.0, 10.0, 80.0, 80.0, 80.0, 80.0, 10.0, 10.0, 80.0, 80.0, 80.0, 10.0,
        ];
        let segments = find_bright_segments(&profile, 50.0, 3);
        assert_eq!(segments, vec![(3, 7), (9, 12)]);
        assert_eq!(find_bright_segments(&profile, 50.0, 4).len(), 1);
    }

    #[test]
    fn test_find_character_cards() {
        let mut frame = RgbaImage::from_pixel(400, 300, BACKGROUND);
        let cards = [
            ScreenRect::new(60, 120, 60, 100),
            ScreenRect::new(160, 120, 60, 100),
            ScreenRect::new(260, 100, 60, 100),
        ];
        for card in cards {
            fill(&mut frame, card, Rgba([180, 120, 60, 255]));
        }

        let found = find_character_cards(&frame, ScreenRect::new(20, 80, 360, 180));
        assert_eq!(found.len(), 3);
        for (found, card) in found.iter().zip(cards) {
            assert!(found.x.abs_diff(card.x) <= 2, "{} vs {}", found, card);
            assert!(found.width.abs_diff(card.width) <= 4, "{} vs {}", found, card);
            assert_eq!(found.y, card.y);
            assert_eq!(found.height, card.height);
        }
    }

    #[test]
    fn test_no_cards_on_dark_row() {
        let frame = RgbaImage::from_pixel(400, 300, BACKGROUND);
        assert!(find_character_cards(&frame, ScreenRect::new(20, 80, 360, 180)).is_empty());
        assert!(find_character_cards(&frame, ScreenRect::new(500, 500, 10, 10)).is_empty());
    }

    #[test]
    fn test_card_top_detects_lift() {
        let mut frame = RgbaImage::from_pixel(200, 200, BACKGROUND);
        fill(&mut frame, ScreenRect::new(20, 80, 40, 80), Rgba([180, 120, 60, 255]));
        fill(&mut frame, ScreenRect::new(100, 60, 40, 80), Rgba([180, 120, 60, 255]));

        assert_eq!(card_top(&frame, ScreenRect::new(20, 80, 40, 80), 30), Some(80));
        assert_eq!(card_top(&frame, ScreenRect::new(100, 80, 40, 80), 30), Some(60));
        assert_eq!(card_top(&frame, ScreenRect::new(160, 80, 30, 80), 30), None);
    }
}
