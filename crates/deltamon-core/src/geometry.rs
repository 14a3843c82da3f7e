//! Screen geometry types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in screen coordinates (pixels, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A rectangular screen region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center of the region.
    pub fn center(&self) -> Point {
        Point::new(
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    /// True if the region has no area.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Region of the given size whose top-left corner is offset from this
    /// region's top-left corner.
    ///
    /// Used to derive the expanded dropdown list area from the trigger bounds.
    pub fn offset_region(&self, dx: i32, dy: i32, width: u32, height: u32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, width, height)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center() {
        let rect = Rect::new(100, 50, 120, 30);
        assert_eq!(rect.center(), Point::new(160, 65));
    }

    #[test]
    fn test_offset_region() {
        let trigger = Rect::new(400, 200, 80, 20);
        let list = trigger.offset_region(-20, 25, 350, 500);
        assert_eq!(list, Rect::new(380, 225, 350, 500));
    }

    #[test]
    fn test_empty() {
        assert!(Rect::new(0, 0, 0, 10).is_empty());
        assert!(!Rect::new(0, 0, 1, 1).is_empty());
    }
}
