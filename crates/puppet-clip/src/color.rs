/// RGBA color in linear space with values in [0, 1]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn transparent() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    pub const fn white() -> Self {
        Self::new(1.0, 1.0, 1.0, 1.0)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Number of independent mask planes per offscreen surface.
pub const CHANNEL_COUNT: usize = 4;

/// Color a mask surface is reset to before the first mask of a frame is drawn.
///
/// Mask draws subtract coverage from this, so a channel value of `1.0` means "nothing masked".
pub const MASK_CLEAR_COLOR: Color = Color::white();

/// Per-channel write/read selectors (R, G, B, A).
pub const CHANNEL_COLORS: [Color; CHANNEL_COUNT] = [
    Color::new(1.0, 0.0, 0.0, 0.0),
    Color::new(0.0, 1.0, 0.0, 0.0),
    Color::new(0.0, 0.0, 1.0, 0.0),
    Color::new(0.0, 0.0, 0.0, 1.0),
];

/// Color selector for `channel`, or `None` when the channel index is out of range.
pub fn channel_color(channel: usize) -> Option<Color> {
    CHANNEL_COLORS.get(channel).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_colors_are_one_hot() {
        for (i, color) in CHANNEL_COLORS.iter().enumerate() {
            let arr = color.to_array();
            assert_eq!(arr.iter().sum::<f32>(), 1.0);
            assert_eq!(arr[i], 1.0);
        }
    }

    #[test]
    fn test_channel_color_out_of_range() {
        assert_eq!(channel_color(3), Some(Color::new(0.0, 0.0, 0.0, 1.0)));
        assert_eq!(channel_color(4), None);
    }
}
