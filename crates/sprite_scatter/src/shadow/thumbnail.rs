//! Low-resolution circular shadow preview for UI feedback.
//!
//! Uses the same geometry math as the full bake but independent scale-to-fit
//! logic, and is throttled to the latest requested signature only: superseded
//! requests are dropped, never queued.
use glam::Vec2;

use crate::shadow::bake::{
    bake_group, plan_canvas, signature, SpriteGeometry, TextureCache,
};
use crate::shadow::ShadowSettings;

/// Default edge length of the thumbnail image in pixels.
pub const DEFAULT_THUMB_SIZE: u32 = 64;
/// Nominal thumbnail scale when content fits comfortably.
const BASE_SCALE: f32 = 1.0;
/// Floor applied to scale-to-fit, as a fraction of the base scale.
const MIN_SCALE_FACTOR: f32 = 0.68;

/// Finished circular thumbnail, row-major alpha.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailImage {
    pub size: u32,
    pub data: Vec<f32>,
}

/// Renders shadow thumbnails, keeping only the most recent request.
#[derive(Debug)]
pub struct ThumbnailBaker {
    size: u32,
    latest: Option<String>,
    result: Option<ThumbnailImage>,
    last_scale: f32,
    renders: usize,
    dropped: usize,
}

impl Default for ThumbnailBaker {
    fn default() -> Self {
        Self::with_size(DEFAULT_THUMB_SIZE)
    }
}

impl ThumbnailBaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(size: u32) -> Self {
        Self {
            size: size.max(8),
            latest: None,
            result: None,
            last_scale: BASE_SCALE,
            renders: 0,
            dropped: 0,
        }
    }

    pub fn result(&self) -> Option<&ThumbnailImage> {
        self.result.as_ref()
    }

    pub fn renders(&self) -> usize {
        self.renders
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn last_scale(&self) -> f32 {
        self.last_scale
    }

    /// Registers a thumbnail request, superseding any earlier one.
    /// Returns the request signature to pass back to `render`.
    pub fn request(&mut self, geoms: &[SpriteGeometry], settings: &ShadowSettings) -> String {
        let sig = match plan_canvas(geoms, settings) {
            Some(plan) => signature(geoms, settings, 1.0, &plan),
            None => String::from("empty"),
        };
        self.latest = Some(sig.clone());
        sig
    }

    /// Renders the request with the given signature.
    ///
    /// Returns `false` without rendering when the request was superseded or
    /// a texture is not ready.
    pub fn render(
        &mut self,
        sig: &str,
        geoms: &[SpriteGeometry],
        settings: &ShadowSettings,
        cache: &TextureCache,
    ) -> bool {
        if self.latest.as_deref() != Some(sig) {
            self.dropped += 1;
            return false;
        }
        let Some(plan) = plan_canvas(geoms, settings) else {
            return false;
        };

        let extent = plan.width.max(plan.height) as f32;
        let fit_scale = self.size as f32 / extent.max(1.0);
        let scale = fit_scale
            .min(BASE_SCALE)
            .max(BASE_SCALE * MIN_SCALE_FACTOR);
        self.last_scale = scale;

        // Re-center the content into thumbnail space at the chosen scale.
        let content_center = plan.origin + Vec2::new(plan.width as f32, plan.height as f32) * 0.5;
        let thumb_center = Vec2::splat(self.size as f32 * 0.5);
        let scaled: Vec<SpriteGeometry> = geoms
            .iter()
            .map(|g| SpriteGeometry {
                src: g.src.clone(),
                center: (g.center - content_center) * scale + thumb_center,
                w: g.w * scale,
                h: g.h * scale,
                rotation: g.rotation,
                flip_h: g.flip_h,
                flip_v: g.flip_v,
            })
            .collect();
        let mut scaled_settings = *settings;
        scaled_settings.dilation = settings.dilation * scale;
        scaled_settings.offset_distance = settings.offset_distance * scale;

        let Ok(bake) = bake_group(&scaled, &scaled_settings, scale, cache) else {
            return false;
        };

        let size = self.size as usize;
        let mut data = vec![0.0f32; size * size];
        let radius = self.size as f32 * 0.5;
        for py in 0..size {
            for px in 0..size {
                let p = Vec2::new(px as f32 + 0.5, py as f32 + 0.5);
                if p.distance(thumb_center) > radius {
                    continue;
                }
                let sx = (p.x - bake.origin.x) as isize;
                let sy = (p.y - bake.origin.y) as isize;
                data[py * size + px] = bake.surface.get(sx, sy);
            }
        }

        self.result = Some(ThumbnailImage {
            size: self.size,
            data,
        });
        self.renders += 1;
        true
    }
}
