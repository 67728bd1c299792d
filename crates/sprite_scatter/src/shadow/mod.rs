//! Drop-shadow baking for live previews and scatter groups.
//!
//! Shadows are baked into CPU accumulation surfaces the host uploads as
//! textures: silhouette splats approximate dilation, a separable blur
//! approximates the Gaussian filter, and string signatures skip bakes whose
//! inputs did not change. Scheduling coalesces dirty marks to one bake pass
//! per frame, with an explicit batch mode for drag gestures.
use serde::{Deserialize, Serialize};

pub mod bake;
pub mod compositor;
pub mod surface;
pub mod thumbnail;

pub use bake::{
    bake_group, bake_single, ShadowBake, SpriteGeometry, SpriteTexture, TextureCache,
};
pub use compositor::{ShadowCompositor, ShadowTarget};
pub use surface::ShadowSurface;
pub use thumbnail::{ThumbnailBaker, ThumbnailImage};

/// Soft drop-shadow parameters for one elevation band (or the single preview).
///
/// All setters clamp to the documented ranges; non-finite input is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowSettings {
    /// Shadow opacity in `[0, 1]`.
    pub alpha: f32,
    /// Silhouette dilation radius in pixels, `[0, 20]`.
    pub dilation: f32,
    /// Blur strength in `[0, 12]`; the effective blur radius scales with zoom.
    pub blur: f32,
    /// Offset distance in pixels, `[0, 40]`.
    pub offset_distance: f32,
    /// Offset angle in degrees, `[0, 360)`.
    pub offset_angle: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            dilation: 2.0,
            blur: 4.0,
            offset_distance: 6.0,
            offset_angle: 45.0,
        }
    }
}

impl ShadowSettings {
    pub fn set_alpha(&mut self, alpha: f32) {
        if alpha.is_finite() {
            self.alpha = alpha.clamp(0.0, 1.0);
        }
    }

    pub fn set_dilation(&mut self, dilation: f32) {
        if dilation.is_finite() {
            self.dilation = dilation.clamp(0.0, 20.0);
        }
    }

    pub fn set_blur(&mut self, blur: f32) {
        if blur.is_finite() {
            self.blur = blur.clamp(0.0, 12.0);
        }
    }

    pub fn set_offset_distance(&mut self, distance: f32) {
        if distance.is_finite() {
            self.offset_distance = distance.clamp(0.0, 40.0);
        }
    }

    pub fn set_offset_angle(&mut self, angle: f32) {
        if angle.is_finite() {
            self.offset_angle = angle.rem_euclid(360.0);
        }
    }

    /// Offset vector `(cos(angle) * d, sin(angle) * d)`.
    pub fn offset_vector(&self) -> (f32, f32) {
        let rad = self.offset_angle.to_radians();
        (
            rad.cos() * self.offset_distance,
            rad.sin() * self.offset_distance,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_clamp_to_documented_ranges() {
        let mut s = ShadowSettings::default();
        s.set_alpha(3.0);
        assert_eq!(s.alpha, 1.0);
        s.set_dilation(-5.0);
        assert_eq!(s.dilation, 0.0);
        s.set_blur(100.0);
        assert_eq!(s.blur, 12.0);
        s.set_offset_distance(41.0);
        assert_eq!(s.offset_distance, 40.0);
        s.set_offset_angle(400.0);
        assert_eq!(s.offset_angle, 40.0);
        s.set_alpha(f32::NAN);
        assert_eq!(s.alpha, 1.0);
    }

    #[test]
    fn offset_vector_follows_angle() {
        let mut s = ShadowSettings::default();
        s.set_offset_distance(10.0);
        s.set_offset_angle(0.0);
        let (x, y) = s.offset_vector();
        assert!((x - 10.0).abs() < 1e-4);
        assert!(y.abs() < 1e-4);

        s.set_offset_angle(90.0);
        let (x, y) = s.offset_vector();
        assert!(x.abs() < 1e-4);
        assert!((y - 10.0).abs() < 1e-4);
    }
}
