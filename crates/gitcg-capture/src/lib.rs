use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xcap::Window;

/// Pixel rectangle in game-window space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole image
    pub fn of_image(image: &RgbaImage) -> Self {
        Self::new(0, 0, image.width(), image.height())
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Multiply every coordinate by `factor` (asset scale relative to 1080p)
    pub fn scale(&self, factor: f64) -> Self {
        let s = |v: u32| (v as f64 * factor).round().max(0.0) as u32;
        Self::new(s(self.x), s(self.y), s(self.width), s(self.height))
    }

    /// Shift by a signed offset, saturating at the window origin
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        let shift = |v: u32, d: i32| (v as i64 + d as i64).max(0) as u32;
        Self::new(shift(self.x, dx), shift(self.y, dy), self.width, self.height)
    }

    /// Overlapping part of two rectangles, `None` when they do not overlap
    pub fn intersect(&self, other: &ScreenRect) -> Option<ScreenRect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(Self::new(x, y, right - x, bottom - y))
    }
}

impl std::fmt::Display for ScreenRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

/// Well-known regions of the duel screen at the 1920x1080 reference resolution.
/// Callers multiply by the asset scale for other window sizes.
pub mod regions {
    use super::ScreenRect;

    pub const REFERENCE_WIDTH: u32 = 1920;
    pub const REFERENCE_HEIGHT: u32 = 1080;

    /// Calibrated positions of our three character cards
    pub const CHARACTER_CARDS: [ScreenRect; 3] = [
        ScreenRect::new(667, 632, 165, 282),
        ScreenRect::new(877, 632, 165, 282),
        ScreenRect::new(1088, 632, 165, 282),
    ];

    /// Band containing our character cards, including the lift of the active card
    pub fn character_row() -> ScreenRect {
        ScreenRect::new(560, 560, 800, 380)
    }

    /// Dice counter bubble at the top left of the hand area
    pub fn dice_count() -> ScreenRect {
        ScreenRect::new(1833, 42, 46, 38)
    }

    /// Round / end-turn button on the left edge; it lights up during our action
    pub fn round_button() -> ScreenRect {
        ScreenRect::new(62, 500, 80, 80)
    }

    /// Title banner of the reroll screen
    pub fn reroll_title() -> ScreenRect {
        ScreenRect::new(760, 60, 400, 80)
    }

    /// One die on the reroll screen. Eight dice laid out as two rows of four.
    pub fn reroll_die(index: usize) -> ScreenRect {
        let col = (index % 4) as u32;
        let row = (index / 4) as u32;
        ScreenRect::new(598 + col * 190, 300 + row * 240, 130, 130)
    }

    /// Confirm button shared by the reroll, initial-hand and round-end prompts
    pub fn confirm_button() -> ScreenRect {
        ScreenRect::new(860, 940, 200, 70)
    }

    /// Skill button. Index 1 is the rightmost (elemental burst), higher indices go left.
    pub fn skill_button(index: usize) -> ScreenRect {
        let step = (index.max(1) - 1) as u32;
        ScreenRect::new(1690 - step * 130, 930, 100, 100)
    }

    /// Centre banner where the game shows rejection prompts
    pub fn prompt_banner() -> ScreenRect {
        ScreenRect::new(660, 460, 600, 160)
    }
}

/// Provides the current contents of the game window
pub trait FrameSource: Send {
    fn capture_frame(&self) -> Result<RgbaImage>;
}

/// Window focus and input injection for the game window
pub trait GameInput: Send {
    fn activate_window(&mut self) -> Result<()>;

    /// Click at a point in game-window coordinates
    fn click(&mut self, x: u32, y: u32) -> Result<()>;

    fn window_rect(&self) -> Result<ScreenRect>;
}

/// Game window titles to search for
const GAME_WINDOW_TITLES: &[&str] = &["原神", "genshin impact", "yuanshen"];

/// The live game window located through xcap
pub struct GameWindow {
    window: Window,
}

impl GameWindow {
    /// Find the game window by searching window titles
    pub fn find() -> Result<Self> {
        let windows = Window::all().context("Failed to enumerate windows")?;

        for window in windows {
            let title = match window.title() {
                Ok(t) => t.to_lowercase(),
                Err(_) => continue,
            };
            if GAME_WINDOW_TITLES.iter().any(|t| title.contains(t)) {
                debug!("Found game window: {}", title);
                return Ok(Self { window });
            }
        }
        Err(anyhow!("game window not found"))
    }

    pub fn window_rect(&self) -> Result<ScreenRect> {
        let x = self.window.x().context("Failed to read window x")?;
        let y = self.window.y().context("Failed to read window y")?;
        let width = self.window.width().context("Failed to read window width")?;
        let height = self.window.height().context("Failed to read window height")?;
        if x < 0 || y < 0 {
            warn!("Game window is partially off-screen at ({}, {})", x, y);
        }
        Ok(ScreenRect::new(x.max(0) as u32, y.max(0) as u32, width, height))
    }
}

impl FrameSource for GameWindow {
    fn capture_frame(&self) -> Result<RgbaImage> {
        self.window
            .capture_image()
            .context("Failed to capture window image")
    }
}

/// A fixed frame, used when analysing saved screenshots
pub struct StillFrame(pub RgbaImage);

impl FrameSource for StillFrame {
    fn capture_frame(&self) -> Result<RgbaImage> {
        Ok(self.0.clone())
    }
}

/// Input that only logs, for analysing screenshots without touching the game
pub struct DryRunInput {
    size: (u32, u32),
}

impl DryRunInput {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
        }
    }
}

impl GameInput for DryRunInput {
    fn activate_window(&mut self) -> Result<()> {
        debug!("Dry run: activate window");
        Ok(())
    }

    fn click(&mut self, x: u32, y: u32) -> Result<()> {
        debug!("Dry run: click ({}, {})", x, y);
        Ok(())
    }

    fn window_rect(&self) -> Result<ScreenRect> {
        Ok(ScreenRect::new(0, 0, self.size.0, self.size.1))
    }
}

/// Crop a rectangle out of a frame, clamped to the frame bounds
pub fn crop_rect(frame: &RgbaImage, rect: &ScreenRect) -> RgbaImage {
    let (w, h) = (frame.width(), frame.height());

    let x = rect.x.min(w.saturating_sub(1));
    let y = rect.y.min(h.saturating_sub(1));
    let rw = rect.width.min(w - x);
    let rh = rect.height.min(h - y);

    image::imageops::crop_imm(frame, x, y, rw, rh).to_image()
}
