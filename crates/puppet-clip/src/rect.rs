use glam::Vec2;

/// Axis-aligned rectangle defined by min and max corners
///
/// Used both for model-space bounds and for normalized [0, 1] atlas sub-regions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_min_size(min: Vec2, size: Vec2) -> Self {
        Self {
            min,
            max: min + size,
        }
    }

    /// The whole normalized atlas, `[0, 1] x [0, 1]`.
    pub const fn unit() -> Self {
        Self::new(Vec2::ZERO, Vec2::ONE)
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Smallest rect containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Smallest rect containing `self` and `point`.
    pub fn include_point(&self, point: Vec2) -> Rect {
        Rect::new(self.min.min(point), self.max.max(point))
    }

    /// Grow the rect by `dx` on the left and right and by `dy` on top and bottom.
    pub fn expand(&self, dx: f32, dy: f32) -> Rect {
        let d = Vec2::new(dx, dy);
        Rect::new(self.min - d, self.max + d)
    }

    /// True when the rect has no area (zero or negative width or height).
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}
