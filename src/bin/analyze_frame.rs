//! Run the table perceptions against a screenshot and print what they see.
//!
//! Usage: analyze_frame <screenshot.png | --window> [output_dir] [config.json]

use anyhow::{Context, Result};
use autoduel_lib::table::{DuelTable, ScreenTable};
use gitcg_capture::{regions, DryRunInput, FrameSource, GameWindow, StillFrame};
use gitcg_data::DuelConfig;
use gitcg_vision::{RecognitionEngine, TesseractOcr};
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    autoduel_lib::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let Some(source) = args.get(1) else {
        eprintln!("Usage: analyze_frame <screenshot.png | --window> [output_dir] [config.json]");
        std::process::exit(1);
    };
    let output_dir = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("autoduel_debug"));
    let mut config = match args.get(3) {
        Some(path) => DuelConfig::load(&PathBuf::from(path))?,
        None => DuelConfig::default(),
    };

    let frame = if source == "--window" {
        GameWindow::find()?.capture_frame()?
    } else {
        image::open(source)
            .with_context(|| format!("Failed to open {}", source))?
            .to_rgba8()
    };
    let (w, h) = frame.dimensions();
    config.asset_scale = w as f64 / regions::REFERENCE_WIDTH as f64;
    println!("Frame: {}x{} (scale {:.3})", w, h, config.asset_scale);

    let ocr = TesseractOcr::new().with_languages(config.ocr_languages.clone());
    if !ocr.is_available() {
        println!("tesseract not found, text reads will come back empty");
    }
    let engine = RecognitionEngine::new(Arc::new(ocr));
    let mut table = ScreenTable::new(StillFrame(frame), DryRunInput::new(w, h), engine, &config)?;

    let rects = table.character_rects()?;
    let cards = table.inspect_cards(&rects)?;
    println!("\nCharacter cards: {}", cards.len());
    for card in &cards {
        println!(
            "  {} top={} lifted={} defeated={} frozen={}",
            card.area, card.top, card.lifted, card.defeated, card.frozen
        );
    }

    let dice_count = table.dice_count()?;
    let my_turn = table.is_my_turn()?;
    let reroll_ready = table.reroll_ready()?;
    let dice = table.read_dice()?;
    println!("\nDice count: {:?}", dice_count);
    println!("My turn: {}", my_turn);
    println!("Reroll screen: {}", reroll_ready);
    let faces: Vec<String> = dice
        .iter()
        .map(|d| d.map_or("?".to_string(), |e| e.to_string()))
        .collect();
    println!("Reroll dice: [{}]", faces.join(", "));

    table.save_debug_crops(&output_dir)?;
    let findings = serde_json::json!({
        "frame": [w, h],
        "scale": config.asset_scale,
        "cards": cards.iter().map(|c| serde_json::json!({
            "area": c.area,
            "lifted": c.lifted,
            "defeated": c.defeated,
            "frozen": c.frozen,
        })).collect::<Vec<_>>(),
        "diceCount": dice_count,
        "myTurn": my_turn,
        "rerollReady": reroll_ready,
        "rerollDice": dice,
    });
    std::fs::write(
        output_dir.join("findings.json"),
        serde_json::to_string_pretty(&findings)?,
    )?;
    println!("\nCrops saved to {}", output_dir.display());
    Ok(())
}
