//! Common types shared across the graphics system.

// ============================================================================
// Extent3d
// ============================================================================

/// 3D extent for textures and render targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels (1 for 2D textures).
    pub depth: u32,
}

impl Extent3d {
    /// Create a new 2D extent.
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }

    /// Number of texels covered by this extent.
    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth.max(1) as u64
    }
}

// ============================================================================
// Rect
// ============================================================================

/// Axis-aligned pixel rectangle with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a rectangle.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a rectangle at the origin.
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Area in pixels.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// One past the right-most column, widened so it never overflows.
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// One past the bottom-most row, widened so it never overflows.
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Returns true if the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns true if the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && (self.x as u64) < other.right()
            && (other.x as u64) < self.right()
            && (self.y as u64) < other.bottom()
            && (other.y as u64) < self.bottom()
    }

    /// Returns true if `other` lies entirely within this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_texels() {
        assert_eq!(Extent3d::new_2d(4, 8).texel_count(), 32);
    }

    #[test]
    fn test_rect_edges() {
        let rect = Rect::new(10, 20, 30, 40);
        assert_eq!(rect.right(), 40);
        assert_eq!(rect.bottom(), 60);
        assert_eq!(rect.area(), 1200);
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0, 0, 64, 64);
        let touching = Rect::new(64, 0, 64, 64);
        let overlapping = Rect::new(63, 63, 2, 2);
        assert!(!a.intersects(&touching));
        assert!(a.intersects(&overlapping));
        assert!(!a.intersects(&Rect::new(10, 10, 0, 5)));
    }

    #[test]
    fn test_rect_containment() {
        let outer = Rect::from_size(256, 256);
        assert!(outer.contains_rect(&Rect::new(192, 192, 64, 64)));
        assert!(!outer.contains_rect(&Rect::new(200, 0, 64, 64)));
    }

    #[test]
    fn test_rect_edges_near_u32_max() {
        let far = Rect::new(u32::MAX, 0, 2, 1);
        assert_eq!(far.right(), u32::MAX as u64 + 2);
        assert!(!Rect::from_size(256, 256).contains_rect(&far));
        assert!(!Rect::from_size(256, 256).intersects(&far));
        assert!(Rect::new(u32::MAX - 1, 0, 1, 1).intersects(&Rect::new(u32::MAX - 1, 0, 1, 1)));
    }
}
