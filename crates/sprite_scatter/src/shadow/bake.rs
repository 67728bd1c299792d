//! Shadow baking: canvas planning, silhouette rasterization, dilation
//! sampling, and the bake signature.
//!
//! Dilation is approximated by splatting the silhouette at 33 offsets
//! (center, 16 on the full-dilation ring, 16 on an inner ring at 0.55 of the
//! radius). This is a multi-sample approximation of morphological dilation,
//! not an exact Minkowski sum.
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use glam::Vec2;

use crate::error::{Error, Result};
use crate::group::ScatterInstance;
use crate::shadow::surface::ShadowSurface;
use crate::shadow::ShadowSettings;

/// Samples on each dilation ring.
const RING_SAMPLES: usize = 16;
/// Radius factor of the inner dilation ring.
const INNER_RING_FACTOR: f32 = 0.55;
/// Canvas margin contributed per unit of blur strength.
const BLUR_MARGIN_FACTOR: f32 = 12.0;

/// Decoded sprite alpha data used for silhouette rasterization.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteTexture {
    pub width: u32,
    pub height: u32,
    /// Row-major alpha, one byte per pixel.
    pub alpha: Vec<u8>,
}

impl SpriteTexture {
    /// Fully opaque rectangle.
    pub fn solid(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            alpha: vec![255; (width * height) as usize],
        }
    }

    /// Alpha at normalized coordinates; zero outside `[0, 1)`.
    pub fn alpha_at(&self, u: f32, v: f32) -> f32 {
        if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
            return 0.0;
        }
        let x = (u * self.width as f32) as u32;
        let y = (v * self.height as f32) as u32;
        let i = (y * self.width + x) as usize;
        self.alpha.get(i).copied().unwrap_or(0) as f32 / 255.0
    }
}

/// Cache of decoded sprite textures keyed by source reference.
#[derive(Debug, Default)]
pub struct TextureCache {
    textures: HashMap<String, Arc<SpriteTexture>>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, src: impl Into<String>, texture: Arc<SpriteTexture>) {
        self.textures.insert(src.into(), texture);
    }

    pub fn get(&self, src: &str) -> Option<Arc<SpriteTexture>> {
        self.textures.get(src).cloned()
    }

    pub fn contains(&self, src: &str) -> bool {
        self.textures.contains_key(src)
    }

    pub fn remove(&mut self, src: &str) -> bool {
        self.textures.remove(src).is_some()
    }

    pub fn clear(&mut self) {
        self.textures.clear();
    }
}

/// Geometry of one shadow-casting sprite, in world units.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteGeometry {
    pub src: String,
    pub center: Vec2,
    pub w: f32,
    pub h: f32,
    /// Rotation in degrees.
    pub rotation: f32,
    pub flip_h: bool,
    pub flip_v: bool,
}

impl From<&ScatterInstance> for SpriteGeometry {
    fn from(instance: &ScatterInstance) -> Self {
        Self {
            src: instance.src.clone(),
            center: instance.center(),
            w: instance.w,
            h: instance.h,
            rotation: instance.rotation,
            flip_h: instance.flip_h,
            flip_v: instance.flip_v,
        }
    }
}

/// Planned canvas placement for a bake.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasPlan {
    /// World position of the canvas top-left corner.
    pub origin: Vec2,
    pub width: usize,
    pub height: usize,
}

/// A finished bake: the blurred alpha surface and where it sits in the world.
#[derive(Debug, Clone)]
pub struct ShadowBake {
    pub surface: ShadowSurface,
    pub origin: Vec2,
    pub signature: String,
}

fn rotated_bounds(geoms: &[SpriteGeometry]) -> Option<(Vec2, Vec2)> {
    let mut min = Vec2::splat(f32::INFINITY);
    let mut max = Vec2::splat(f32::NEG_INFINITY);
    for g in geoms {
        let half = Vec2::new(g.w * 0.5, g.h * 0.5);
        let (sin, cos) = g.rotation.to_radians().sin_cos();
        for (sx, sy) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let local = Vec2::new(half.x * sx, half.y * sy);
            let corner = g.center
                + Vec2::new(
                    local.x * cos - local.y * sin,
                    local.x * sin + local.y * cos,
                );
            min = min.min(corner);
            max = max.max(corner);
        }
    }
    (min.x <= max.x).then_some((min, max))
}

/// Computes the bake canvas for the given content.
///
/// Margin per axis is `|offset| + dilation + blur * 12`, sized so rotation,
/// blur, and the shadow offset can never clip.
pub fn plan_canvas(geoms: &[SpriteGeometry], settings: &ShadowSettings) -> Option<CanvasPlan> {
    let (min, max) = rotated_bounds(geoms)?;
    let margin = Vec2::splat(
        settings.offset_distance + settings.dilation + settings.blur * BLUR_MARGIN_FACTOR,
    );
    let origin = min - margin;
    let size = max - min + margin * 2.0;
    Some(CanvasPlan {
        origin,
        width: size.x.ceil().max(1.0) as usize,
        height: size.y.ceil().max(1.0) as usize,
    })
}

/// Builds the string signature over every input that affects the bake.
pub fn signature(
    geoms: &[SpriteGeometry],
    settings: &ShadowSettings,
    zoom: f32,
    plan: &CanvasPlan,
) -> String {
    let mut sig = String::new();
    for g in geoms {
        let _ = write!(
            sig,
            "{}|{}x{}|r{}|f{}{}|p{},{};",
            g.src, g.w, g.h, g.rotation, g.flip_h as u8, g.flip_v as u8, g.center.x, g.center.y
        );
    }
    let _ = write!(
        sig,
        "a{}|d{}|b{}|od{}|oa{}|z{}|c{}x{}",
        settings.alpha,
        settings.dilation,
        settings.blur,
        settings.offset_distance,
        settings.offset_angle,
        zoom,
        plan.width,
        plan.height
    );
    sig
}

fn rasterize_silhouettes(
    geoms: &[SpriteGeometry],
    plan: &CanvasPlan,
    cache: &TextureCache,
) -> Result<ShadowSurface> {
    let mut scratch = ShadowSurface::new(plan.width, plan.height);
    for g in geoms {
        let texture = cache.get(&g.src).ok_or_else(|| Error::MissingTexture {
            id: g.src.clone(),
        })?;
        if g.w <= 0.0 || g.h <= 0.0 {
            continue;
        }
        let (sin, cos) = g.rotation.to_radians().sin_cos();
        // Conservative canvas-space AABB of this geometry.
        let reach = (g.w.abs() + g.h.abs()) * 0.5;
        let lo = g.center - Vec2::splat(reach) - plan.origin;
        let hi = g.center + Vec2::splat(reach) - plan.origin;
        let x0 = lo.x.floor().max(0.0) as usize;
        let y0 = lo.y.floor().max(0.0) as usize;
        let x1 = (hi.x.ceil() as usize).min(plan.width);
        let y1 = (hi.y.ceil() as usize).min(plan.height);

        for py in y0..y1 {
            for px in x0..x1 {
                let p = plan.origin + Vec2::new(px as f32 + 0.5, py as f32 + 0.5) - g.center;
                // Inverse rotation back into sprite space.
                let mut local = Vec2::new(p.x * cos + p.y * sin, -p.x * sin + p.y * cos);
                if g.flip_h {
                    local.x = -local.x;
                }
                if g.flip_v {
                    local.y = -local.y;
                }
                let u = local.x / g.w + 0.5;
                let v = local.y / g.h + 0.5;
                if texture.alpha_at(u, v) > 0.0 {
                    // Silhouette samples are fully opaque.
                    scratch.set(px, py, 1.0);
                }
            }
        }
    }
    Ok(scratch)
}

fn dilation_offsets(dilation: f32) -> Vec<Vec2> {
    let mut offsets = Vec::with_capacity(1 + 2 * RING_SAMPLES);
    offsets.push(Vec2::ZERO);
    for ring_radius in [dilation, dilation * INNER_RING_FACTOR] {
        for i in 0..RING_SAMPLES {
            let angle = i as f32 / RING_SAMPLES as f32 * std::f32::consts::TAU;
            offsets.push(Vec2::new(angle.cos(), angle.sin()) * ring_radius);
        }
    }
    offsets
}

/// Bakes a shadow for the given content using a precomputed plan/signature.
pub fn bake_planned(
    geoms: &[SpriteGeometry],
    settings: &ShadowSettings,
    zoom: f32,
    cache: &TextureCache,
    plan: &CanvasPlan,
    sig: String,
) -> Result<ShadowBake> {
    let scratch = rasterize_silhouettes(geoms, plan, cache)?;

    let mut surface = ShadowSurface::new(plan.width, plan.height);
    let (off_x, off_y) = settings.offset_vector();
    for sample in dilation_offsets(settings.dilation) {
        let dx = (off_x + sample.x).round() as isize;
        let dy = (off_y + sample.y).round() as isize;
        surface.splat_max(&scratch, dx, dy);
    }

    surface.blur(settings.blur * zoom.max(0.0));
    surface.scale_alpha(settings.alpha);

    Ok(ShadowBake {
        surface,
        origin: plan.origin,
        signature: sig,
    })
}

/// Bakes the drop shadow of the single live preview sprite.
pub fn bake_single(
    geom: &SpriteGeometry,
    settings: &ShadowSettings,
    zoom: f32,
    cache: &TextureCache,
) -> Result<ShadowBake> {
    bake_group(std::slice::from_ref(geom), settings, zoom, cache)
}

/// Bakes one shadow surface covering all of a group's instances.
pub fn bake_group(
    geoms: &[SpriteGeometry],
    settings: &ShadowSettings,
    zoom: f32,
    cache: &TextureCache,
) -> Result<ShadowBake> {
    let plan = plan_canvas(geoms, settings)
        .ok_or_else(|| Error::InvalidConfig("shadow bake needs content".into()))?;
    let sig = signature(geoms, settings, zoom, &plan);
    bake_planned(geoms, settings, zoom, cache, &plan, sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(src: &str) -> SpriteGeometry {
        SpriteGeometry {
            src: src.into(),
            center: Vec2::new(50.0, 50.0),
            w: 20.0,
            h: 10.0,
            rotation: 0.0,
            flip_h: false,
            flip_v: false,
        }
    }

    fn settings() -> ShadowSettings {
        let mut s = ShadowSettings::default();
        s.set_blur(1.0);
        s.set_dilation(2.0);
        s.set_offset_distance(4.0);
        s.set_offset_angle(0.0);
        s
    }

    #[test]
    fn canvas_margin_covers_offset_dilation_and_blur() {
        let geoms = [geometry("a.png")];
        let s = settings();
        let plan = plan_canvas(&geoms, &s).expect("plan");
        // margin = |offset| + dilation + blur*12 = 4 + 2 + 12 = 18 per side.
        assert_eq!(plan.width, 20 + 2 * 18);
        assert_eq!(plan.height, 10 + 2 * 18);
        assert_eq!(plan.origin, Vec2::new(40.0 - 18.0, 45.0 - 18.0));
    }

    #[test]
    fn rotation_grows_the_planned_canvas() {
        let mut g = geometry("a.png");
        g.rotation = 90.0;
        let plan = plan_canvas(std::slice::from_ref(&g), &settings()).expect("plan");
        // Width/height swap under a quarter turn.
        assert_eq!(plan.width, 10 + 2 * 18);
        assert_eq!(plan.height, 20 + 2 * 18);
    }

    #[test]
    fn bake_shifts_coverage_along_the_offset_vector() {
        let mut cache = TextureCache::new();
        cache.insert("a.png", Arc::new(SpriteTexture::solid(8, 8)));
        let mut s = ShadowSettings::default();
        s.set_blur(0.0);
        s.set_dilation(0.0);
        s.set_alpha(1.0);
        s.set_offset_distance(6.0);
        s.set_offset_angle(0.0);

        let g = geometry("a.png");
        let bake = bake_single(&g, &s, 1.0, &cache).expect("bake");
        // Center of the sprite in canvas space.
        let cx = (g.center.x - bake.origin.x) as isize;
        let cy = (g.center.y - bake.origin.y) as isize;
        assert_eq!(bake.surface.get(cx + 6, cy), 1.0);
        // The trailing edge moved with the offset: 10 px left of center is
        // outside the 20 px wide sprite once shifted right by 6.
        assert_eq!(bake.surface.get(cx - 10, cy), 0.0);
    }

    #[test]
    fn missing_texture_is_an_error() {
        let cache = TextureCache::new();
        let err = bake_single(&geometry("ghost.png"), &settings(), 1.0, &cache).unwrap_err();
        assert!(matches!(err, Error::MissingTexture { .. }));
    }

    #[test]
    fn signature_changes_with_any_visual_input() {
        let geoms = [geometry("a.png")];
        let s = settings();
        let plan = plan_canvas(&geoms, &s).expect("plan");
        let base = signature(&geoms, &s, 1.0, &plan);
        assert_eq!(signature(&geoms, &s, 1.0, &plan), base);

        let mut rotated = geoms.clone();
        rotated[0].rotation = 45.0;
        assert_ne!(signature(&rotated, &s, 1.0, &plan), base);

        let mut zoomed = s;
        zoomed.set_blur(2.0);
        assert_ne!(signature(&geoms, &zoomed, 1.0, &plan), base);
        assert_ne!(signature(&geoms, &s, 2.0, &plan), base);
    }

    #[test]
    fn dilation_offsets_are_fixed_33_samples() {
        let offsets = dilation_offsets(5.0);
        assert_eq!(offsets.len(), 33);
        assert_eq!(offsets[0], Vec2::ZERO);
        for o in &offsets[1..=RING_SAMPLES] {
            assert!((o.length() - 5.0).abs() < 1e-4);
        }
        for o in &offsets[RING_SAMPLES + 1..] {
            assert!((o.length() - 2.75).abs() < 1e-4);
        }
    }
}
