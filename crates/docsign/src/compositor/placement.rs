use serde::Serialize;

use crate::locator::Anchor;

/// Signature pads render at roughly 3.3x the size the stamp should occupy.
pub const NATIVE_SCALE: f64 = 0.3;
/// Enlargement applied on top of the native scale.
pub const DISPLAY_SCALE: f64 = 1.5;
/// How far above the anchor the stamp's centre sits, in stamp heights.
pub const LIFT_RATIO: f64 = 0.75;
/// How far left of the anchor the stamp starts, in stamp widths.
pub const LEFT_SHIFT_RATIO: f64 = 0.2;

/// Stamp rectangle in the anchor's coordinate system (points, `top`
/// measured downward from the top of the page).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Stamp rectangle in PDF user space, ready for a `cm` operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Placement {
    pub fn for_anchor(anchor: &Anchor, pixel_width: u32, pixel_height: u32) -> Self {
        let width = f64::from(pixel_width) * NATIVE_SCALE * DISPLAY_SCALE;
        let height = f64::from(pixel_height) * NATIVE_SCALE * DISPLAY_SCALE;
        let centre_y = anchor.y - height * LIFT_RATIO;

        Self {
            left: anchor.x - width * LEFT_SHIFT_RATIO,
            top: centre_y - height / 2.0,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn to_user_space(&self, page_top: f64) -> UserRect {
        UserRect {
            x: self.left,
            y: page_top - self.bottom(),
            width: self.width,
            height: self.height,
        }
    }
}
