use gitcg_capture::ScreenRect;
use std::sync::Mutex;
use tracing::debug;

use crate::recognition::OverlayStyle;

/// Presentation collaborator that highlights recognised elements on screen.
/// Calls are fire-and-forget and never fail.
pub trait Overlay: Send + Sync {
    fn draw_rectangle(&self, rect: ScreenRect, style: OverlayStyle, label: &str);
    fn clear_all(&self);
}

pub struct NoOverlay;

impl Overlay for NoOverlay {
    fn draw_rectangle(&self, _rect: ScreenRect, _style: OverlayStyle, _label: &str) {}
    fn clear_all(&self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawnShape {
    pub label: String,
    pub rect: ScreenRect,
    pub style: OverlayStyle,
}

/// Keeps the current shapes, one per label, for a renderer to pick up
#[derive(Default)]
pub struct DrawList {
    shapes: Mutex<Vec<DrawnShape>>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shapes(&self) -> Vec<DrawnShape> {
        match self.shapes.lock() {
            Ok(shapes) => shapes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Overlay for DrawList {
    fn draw_rectangle(&self, rect: ScreenRect, style: OverlayStyle, label: &str) {
        let Ok(mut shapes) = self.shapes.lock() else {
            return;
        };
        debug!("Overlay draw '{}' at {}", label, rect);
        let shape = DrawnShape {
            label: label.to_string(),
            rect,
            style,
        };
        match shapes.iter_mut().find(|s| s.label == label) {
            Some(existing) => *existing = shape,
            None => shapes.push(shape),
        }
    }

    fn clear_all(&self) {
        if let Ok(mut shapes) = self.shapes.lock() {
            shapes.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_list_replaces_by_label() {
        let list = DrawList::new();
        let style = OverlayStyle::default();
        list.draw_rectangle(ScreenRect::new(0, 0, 5, 5), style, "dice");
        list.draw_rectangle(ScreenRect::new(1, 1, 5, 5), style, "dice");
        list.draw_rectangle(ScreenRect::new(2, 2, 5, 5), style, "turn");

        let shapes = list.shapes();
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes[0].rect, ScreenRect::new(1, 1, 5, 5));

        list.clear_all();
        assert!(list.shapes().is_empty());
    }
}
