use super::*;
use crate::cancel::{cancel_pair, Cancelled};
use crate::table::cards::tests::{fill, BACKGROUND};
use gitcg_data::{DuelTimings, Strategy};
use gitcg_vision::{DrawList, OcrOutput, TextRecognizer};
use image::Rgba;
use std::sync::{Arc, Mutex};

const SCALE: f64 = 0.5;
const CARD: Rgba<u8> = Rgba([180, 120, 60, 255]);

struct SharedFrame(Arc<Mutex<RgbaImage>>);

impl FrameSource for SharedFrame {
    fn capture_frame(&self) -> Result<RgbaImage> {
        Ok(self.0.lock().unwrap().clone())
    }
}

#[derive(Clone, Default)]
struct RecordingInput {
    clicks: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl GameInput for RecordingInput {
    fn activate_window(&mut self) -> Result<()> {
        Ok(())
    }

    fn click(&mut self, x: u32, y: u32) -> Result<()> {
        self.clicks.lock().unwrap().push((x, y));
        Ok(())
    }

    fn window_rect(&self) -> Result<ScreenRect> {
        Ok(ScreenRect::new(0, 0, 960, 540))
    }
}

/// Answers every text read with `text` and every digit read with `digits`
#[derive(Default)]
struct ScriptedOcr {
    text: Mutex<String>,
    digits: Mutex<Option<String>>,
}

impl ScriptedOcr {
    fn say(&self, text: &str) {
        *self.text.lock().unwrap() = text.to_string();
    }

    fn digits(&self, digits: Option<&str>) {
        *self.digits.lock().unwrap() = digits.map(str::to_string);
    }
}

impl TextRecognizer for ScriptedOcr {
    fn recognize(&self, _image: &RgbaImage, profile: OcrProfile) -> anyhow::Result<OcrOutput> {
        let text = match profile {
            OcrProfile::Text => self.text.lock().unwrap().clone(),
            OcrProfile::Digits => self
                .digits
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| anyhow!("tesseract is not installed"))?,
        };
        Ok(OcrOutput {
            text,
            confidence: 0.9,
        })
    }
}

struct Harness {
    table: ScreenTable<SharedFrame, RecordingInput>,
    frame: Arc<Mutex<RgbaImage>>,
    clicks: Arc<Mutex<Vec<(u32, u32)>>>,
    ocr: Arc<ScriptedOcr>,
    overlay: Arc<DrawList>,
}

impl Harness {
    fn new() -> Self {
        Self::with_click_interval(0)
    }

    fn with_click_interval(click_interval_ms: u64) -> Self {
        let frame = Arc::new(Mutex::new(RgbaImage::from_pixel(960, 540, BACKGROUND)));
        let input = RecordingInput::default();
        let clicks = input.clicks.clone();
        let ocr = Arc::new(ScriptedOcr::default());
        let overlay = Arc::new(DrawList::new());
        let engine = RecognitionEngine::new(ocr.clone()).with_overlay(overlay.clone());
        let config = DuelConfig {
            asset_scale: SCALE,
            timings: DuelTimings {
                click_interval_ms,
                ..DuelTimings::default()
            },
            ..DuelConfig::default()
        };
        let table = ScreenTable::new(SharedFrame(frame.clone()), input, engine, &config).unwrap();
        Self {
            table,
            frame,
            clicks,
            ocr,
            overlay,
        }
    }

    fn paint(&self, rect: ScreenRect, color: Rgba<u8>) {
        fill(&mut self.frame.lock().unwrap(), rect, color);
    }

    fn clicks(&self) -> Vec<(u32, u32)> {
        self.clicks.lock().unwrap().clone()
    }
}

fn card(i: usize) -> ScreenRect {
    regions::CHARACTER_CARDS[i].scale(SCALE)
}

fn model() -> DuelModel {
    let strategy = Strategy::parse(
        r#"{
            "characters": [
                {"name": "Ganyu", "element": "Cryo", "skills": []},
                {"name": "Mona", "element": "Hydro", "skills": []},
                {"name": "Diluc", "element": "Pyro", "skills": []}
            ],
            "commands": []
        }"#,
    )
    .unwrap();
    let mut model = DuelModel::from_strategy(&strategy).unwrap();
    for i in 0..3 {
        model.character_mut(i + 1).unwrap().area = Some(card(i));
    }
    model
}

#[test]
fn test_character_rects() {
    let mut h = Harness::new();
    for i in 0..3 {
        h.paint(card(i), CARD);
    }

    let rects = h.table.character_rects().unwrap();
    assert_eq!(rects.len(), 3);
    for (i, rect) in rects.iter().enumerate() {
        let expected = card(i);
        assert!(rect.x.abs_diff(expected.x) <= 2, "{} vs {}", rect, expected);
        assert_eq!(rect.y, expected.y);
        assert_eq!(rect.height, expected.height);
    }
}

#[test]
fn test_observe_characters() {
    let mut h = Harness::new();
    h.paint(card(0), CARD);
    h.paint(card(1).offset(0, -10), CARD);
    h.paint(
        ScreenRect::new(card(1).x, card(1).y + 60, card(1).width, 60),
        Rgba([120, 220, 240, 255]),
    );
    h.paint(card(2), Rgba([110, 110, 110, 255]));

    let observation = h.table.observe_characters(&model()).unwrap().unwrap();
    assert_eq!(observation.active, 2);
    assert_eq!(observation.defeated, BTreeSet::from([3]));
    assert_eq!(observation.statuses, vec![(2, CharacterStatus::Frozen)]);
}

#[test]
fn test_observe_without_lifted_card() {
    let mut h = Harness::new();
    for i in 0..3 {
        h.paint(card(i), CARD);
    }
    assert_eq!(h.table.observe_characters(&model()).unwrap(), None);
}

#[test]
fn test_dice_count() {
    let mut h = Harness::new();
    h.ocr.digits(Some("7"));
    assert_eq!(h.table.dice_count().unwrap(), Some(7));
    let shapes = h.overlay.shapes();
    assert_eq!(shapes.len(), 1);
    assert_eq!(shapes[0].label, "dice_count");

    h.ocr.digits(Some("7 1"));
    assert_eq!(h.table.dice_count().unwrap(), None);
    h.ocr.digits(Some(""));
    assert_eq!(h.table.dice_count().unwrap(), None);
}

#[test]
fn test_dice_count_without_ocr() {
    let mut h = Harness::new();
    h.ocr.digits(None);
    assert_eq!(h.table.dice_count().unwrap(), None);
}

#[test]
fn test_my_turn_follows_round_button() {
    let mut h = Harness::new();
    assert!(!h.table.is_my_turn().unwrap());
    assert!(!h.table.opponent_settled().unwrap());

    h.paint(regions::round_button().scale(SCALE), Rgba([230, 230, 230, 255]));
    assert!(h.table.is_my_turn().unwrap());
    assert!(h.table.opponent_settled().unwrap());
}

#[test]
fn test_reroll_screen_text() {
    let mut h = Harness::new();
    h.ocr.say("Round 2");
    assert!(!h.table.reroll_ready().unwrap());
    h.ocr.say("Rer0ll Dice");
    assert!(h.table.reroll_ready().unwrap());
    assert!(h.table.opponent_settled().unwrap());
}

#[test]
fn test_reroll_keeps_predicted_elements() {
    let mut h = Harness::new();
    let faces = [
        Rgba([240, 240, 240, 255]), // omni
        Rgba([120, 220, 240, 255]), // cryo
        Rgba([230, 60, 30, 255]),   // pyro
        Rgba([40, 90, 230, 255]),   // hydro
        Rgba([170, 70, 230, 255]),  // electro
        Rgba([60, 220, 170, 255]),  // anemo
        Rgba([230, 180, 40, 255]),  // geo
        Rgba([90, 200, 50, 255]),   // dendro
    ];
    for (i, face) in faces.iter().enumerate() {
        h.paint(regions::reroll_die(i).scale(SCALE), *face);
    }

    assert_eq!(
        h.table.read_dice().unwrap(),
        vec![
            Some(ElementalType::Omni),
            Some(ElementalType::Cryo),
            Some(ElementalType::Pyro),
            Some(ElementalType::Hydro),
            Some(ElementalType::Electro),
            Some(ElementalType::Anemo),
            Some(ElementalType::Geo),
            Some(ElementalType::Dendro),
        ]
    );

    let keep = BTreeSet::from([ElementalType::Omni, ElementalType::Cryo]);
    h.table.reroll_dice(&keep).unwrap();

    let mut expected: Vec<(u32, u32)> = (2..8)
        .map(|i| regions::reroll_die(i).scale(SCALE).center())
        .collect();
    expected.push(regions::confirm_button().scale(SCALE).center());
    assert_eq!(h.clicks(), expected);
}

#[test]
fn test_unreadable_die_is_rerolled() {
    let mut h = Harness::new();
    let keep = BTreeSet::from([ElementalType::Omni]);
    h.table.reroll_dice(&keep).unwrap();
    assert_eq!(h.clicks().len(), 9);
}

#[test]
fn test_reroll_clicks_stop_on_cancel() {
    let mut h = Harness::with_click_interval(400);
    let (handle, signal) = cancel_pair();
    h.table.bind_cancel(signal);
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(600));
        handle.cancel();
    });

    // Nine clicks would take 3.6s uninterrupted
    let start = std::time::Instant::now();
    let err = h
        .table
        .reroll_dice(&BTreeSet::from([ElementalType::Omni]))
        .unwrap_err();
    let elapsed = start.elapsed();
    canceller.join().unwrap();

    assert!(err.is::<Cancelled>());
    assert!(elapsed < Duration::from_millis(1000), "took {:?}", elapsed);
    assert_eq!(h.clicks().len(), 2);
}

#[test]
fn test_no_click_after_cancel() {
    let mut h = Harness::new();
    let (handle, signal) = cancel_pair();
    h.table.bind_cancel(signal);
    handle.cancel();
    assert!(h.table.end_round().unwrap_err().is::<Cancelled>());
    assert!(h.clicks().is_empty());
}

#[test]
fn test_use_skill_rejected() {
    let mut h = Harness::new();
    let model = model();
    let mona = model.character(2).unwrap();

    h.ocr.say("Not enongh Elemental Dice");
    assert!(!h.table.use_skill(mona, 2).unwrap());
    let button = regions::skill_button(2).scale(SCALE).center();
    assert_eq!(h.clicks(), vec![button, button]);

    h.ocr.say("");
    assert!(h.table.use_skill(mona, 2).unwrap());
}

#[test]
fn test_switch_and_round_end_clicks() {
    let mut h = Harness::new();
    let model = model();
    h.table.switch_character(model.character(3).unwrap()).unwrap();
    h.table.end_round().unwrap();
    h.table.click_center().unwrap();

    let burst = regions::skill_button(1).scale(SCALE).center();
    let round = regions::round_button().scale(SCALE).center();
    assert_eq!(
        h.clicks(),
        vec![card(2).center(), burst, round, round, (480, 270)]
    );
}

#[test]
fn test_choose_first_needs_card_position() {
    let mut h = Harness::new();
    let mut model = model();
    model.character_mut(1).unwrap().area = None;
    assert!(h.table.choose_first(model.character(1).unwrap()).is_err());
    h.table.choose_first(model.character(2).unwrap()).unwrap();
    assert_eq!(h.clicks().len(), 2);
}

#[test]
fn test_save_debug_crops() {
    let h = Harness::new();
    let dir = std::env::temp_dir().join(format!("autoduel_debug_{}", std::process::id()));
    h.table.save_debug_crops(&dir).unwrap();
    assert!(dir.join("frame_full.png").exists());
    assert!(dir.join("dice_count.png").exists());
    let regions = std::fs::read_to_string(dir.join("regions.txt")).unwrap();
    assert!(regions.contains("die_7"));
    let _ = std::fs::remove_dir_all(&dir);
}
