//! Common types shared across the graphics system.

/// A two-dimensional size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    /// Create a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Scale the extent by independent factors, rounding to the nearest pixel.
    ///
    /// Used for screen-relative textures; the result is never smaller than 1x1.
    pub fn scaled(&self, width_scale: f32, height_scale: f32) -> Self {
        let width = (self.width as f32 * width_scale).round().max(1.0) as u32;
        let height = (self.height as f32 * height_scale).round().max(1.0) as u32;
        Self { width, height }
    }
}

impl std::fmt::Display for Extent2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Queue a command list is recorded for and submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueType {
    /// Graphics queue, can also do compute and transfer work.
    #[default]
    Graphics,
    /// Dedicated transfer queue.
    Transfer,
    /// Async compute queue.
    AsyncCompute,
}

/// Primitive topology used by a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    Triangles,
    Lines,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_scaled() {
        let screen = Extent2d::new(1920, 1080);
        assert_eq!(screen.scaled(1.0, 1.0), screen);
        assert_eq!(screen.scaled(0.5, 0.5), Extent2d::new(960, 540));
        assert_eq!(Extent2d::new(1, 1).scaled(0.1, 0.1), Extent2d::new(1, 1));
    }

    #[test]
    fn test_extent_display() {
        assert_eq!(Extent2d::new(256, 512).to_string(), "256x512");
        assert!(Extent2d::new(0, 4).is_empty());
    }
}
