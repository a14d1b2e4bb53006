/// Sub-rectangle of a source, in logical pixels. All zeros means no clipping.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ClipRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl ClipRect {
    pub const NONE: ClipRect = ClipRect { x: 0.0, y: 0.0, w: 0.0, h: 0.0 };

    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_clipping(&self) -> bool {
        self.x != 0.0 || self.y != 0.0 || self.w != 0.0 || self.h != 0.0
    }

    /// The rectangle in source texels for the given pixel ratio.
    pub fn scaled(&self, pixel_ratio: f32) -> ClipRect {
        ClipRect {
            x: self.x * pixel_ratio,
            y: self.y * pixel_ratio,
            w: self.w * pixel_ratio,
            h: self.h * pixel_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rect_does_not_clip() {
        assert!(!ClipRect::NONE.is_clipping());
        assert!(ClipRect::new(0.0, 1.0, 0.0, 0.0).is_clipping());
    }

    #[test]
    fn scaled_multiplies_every_edge() {
        let r = ClipRect::new(1.0, 2.0, 3.0, 4.0).scaled(2.0);
        assert_eq!(r, ClipRect::new(2.0, 4.0, 6.0, 8.0));
    }
}
