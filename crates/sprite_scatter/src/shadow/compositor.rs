//! Bake scheduling: signature-cached shadow rendering with frame coalescing
//! and batch mode.
//!
//! Setting changes mark a target dirty; at most one bake pass runs per
//! animation frame via [`ShadowCompositor::on_frame`]. Batch mode suspends
//! per-change bakes across a drag gesture or multi-field edit and flushes a
//! single deferred pass at the end, escalating to every group when any change
//! during the batch was global. Textures that are not yet decoded register a
//! one-shot waiter that re-marks the target dirty on arrival.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Error;
use crate::group::{GroupKey, PreviewGroupRegistry};
use crate::shadow::bake::{
    bake_planned, plan_canvas, signature, ShadowBake, SpriteGeometry, SpriteTexture, TextureCache,
};
use crate::shadow::ShadowSettings;

/// What a bake request refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShadowTarget {
    /// The single live preview sprite.
    SinglePreview,
    /// One preview group's combined shadow.
    Group(GroupKey),
}

/// Owner of baked shadows and their scheduling state for one session.
#[derive(Debug, Default)]
pub struct ShadowCompositor {
    textures: TextureCache,
    baked: HashMap<ShadowTarget, ShadowBake>,
    dirty: HashSet<ShadowTarget>,
    frame_requested: bool,
    batching: bool,
    batch_force_all: bool,
    force_all_next: bool,
    waiting: HashMap<String, HashSet<ShadowTarget>>,
    bake_count: usize,
}

impl ShadowCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already-decoded texture.
    pub fn register_texture(&mut self, src: impl Into<String>, texture: Arc<SpriteTexture>) {
        self.textures.insert(src, texture);
    }

    pub fn has_texture(&self, src: &str) -> bool {
        self.textures.contains(src)
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    /// Marks a target for re-bake on the next frame (or batch flush).
    pub fn mark_dirty(&mut self, target: ShadowTarget) {
        self.dirty.insert(target);
        if !self.batching {
            self.frame_requested = true;
        }
    }

    /// Records a change affecting every group (e.g. zoom or global default).
    pub fn note_global_change(&mut self) {
        if self.batching {
            self.batch_force_all = true;
        } else {
            self.force_all_next = true;
            self.frame_requested = true;
        }
    }

    /// Suspends per-change bakes until [`ShadowCompositor::end_batch`].
    pub fn begin_batch(&mut self) {
        self.batching = true;
    }

    pub fn is_batching(&self) -> bool {
        self.batching
    }

    /// Ends batch mode and requests exactly one deferred flush.
    pub fn end_batch(&mut self) {
        self.batching = false;
        if self.batch_force_all {
            self.force_all_next = true;
            self.batch_force_all = false;
        }
        self.frame_requested = !self.dirty.is_empty() || self.force_all_next;
    }

    /// Drops the cached bake so the next pass renders regardless of
    /// signature equality.
    pub fn force_refresh(&mut self, target: &ShadowTarget) {
        self.baked.remove(target);
    }

    /// Delivers a texture that finished decoding; re-marks every waiter.
    pub fn texture_ready(&mut self, src: &str, texture: Arc<SpriteTexture>) {
        self.textures.insert(src, texture);
        if let Some(waiters) = self.waiting.remove(src) {
            for target in waiters {
                self.dirty.insert(target);
            }
            if !self.batching {
                self.frame_requested = true;
            }
        }
    }

    pub fn get(&self, target: &ShadowTarget) -> Option<&ShadowBake> {
        self.baked.get(target)
    }

    /// Total bakes actually performed (signature skips excluded).
    pub fn bake_count(&self) -> usize {
        self.bake_count
    }

    /// Runs the per-frame bake pass. Returns the number of bakes performed.
    ///
    /// No-op while batching or when no frame was requested; dirty marks
    /// between frames coalesce into one pass.
    pub fn on_frame(
        &mut self,
        single: Option<(&SpriteGeometry, &ShadowSettings)>,
        registry: &PreviewGroupRegistry,
        zoom: f32,
    ) -> usize {
        if self.batching || !self.frame_requested {
            return 0;
        }
        self.frame_requested = false;

        let mut targets = std::mem::take(&mut self.dirty);
        if self.force_all_next {
            self.force_all_next = false;
            for group in registry.groups() {
                targets.insert(ShadowTarget::Group(group.key.clone()));
            }
            if single.is_some() {
                targets.insert(ShadowTarget::SinglePreview);
            }
        }

        let mut baked_now = 0;
        for target in targets {
            let (geoms, settings): (Vec<SpriteGeometry>, ShadowSettings) = match &target {
                ShadowTarget::SinglePreview => match single {
                    Some((geom, settings)) => (vec![geom.clone()], *settings),
                    None => {
                        // Preview went away since the mark; drop stale state.
                        self.baked.remove(&target);
                        continue;
                    }
                },
                ShadowTarget::Group(key) => match registry.get(key) {
                    Some(group) => (
                        group.instances.iter().map(SpriteGeometry::from).collect(),
                        group.shadow,
                    ),
                    None => {
                        self.baked.remove(&target);
                        continue;
                    }
                },
            };

            let Some(plan) = plan_canvas(&geoms, &settings) else {
                self.baked.remove(&target);
                continue;
            };
            let sig = signature(&geoms, &settings, zoom, &plan);
            if let Some(existing) = self.baked.get(&target) {
                if existing.signature == sig {
                    debug!("Shadow bake unchanged for {:?}; skipping.", target);
                    continue;
                }
            }

            match bake_planned(&geoms, &settings, zoom, &self.textures, &plan, sig) {
                Ok(bake) => {
                    self.baked.insert(target, bake);
                    self.bake_count += 1;
                    baked_now += 1;
                }
                Err(Error::MissingTexture { id }) => {
                    debug!("Texture '{}' not ready; deferring bake.", id);
                    self.waiting.entry(id).or_default().insert(target);
                }
                Err(e) => {
                    warn!("Shadow bake failed: {}.", e);
                }
            }
        }
        baked_now
    }

    /// Releases every baked surface, waiter, and cached texture.
    pub fn release(&mut self) {
        self.baked.clear();
        self.dirty.clear();
        self.waiting.clear();
        self.textures.clear();
        self.frame_requested = false;
        self.batching = false;
        self.batch_force_all = false;
        self.force_all_next = false;
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::group::{group_key, quantize_elevation, ScatterInstance};

    fn registry_with_group(elevation: f32, id: u64) -> PreviewGroupRegistry {
        let mut registry = PreviewGroupRegistry::new();
        registry.ensure_group(elevation, ShadowSettings::default(), 0);
        registry.add_instance(ScatterInstance {
            id,
            src: "a.png".into(),
            x: 10.0,
            y: 10.0,
            w: 8.0,
            h: 8.0,
            rotation: 0.0,
            flip_h: false,
            flip_v: false,
            elevation: quantize_elevation(elevation),
            group_key: group_key(elevation),
        });
        registry
    }

    fn compositor_with_texture() -> ShadowCompositor {
        let mut compositor = ShadowCompositor::new();
        compositor.register_texture("a.png", Arc::new(SpriteTexture::solid(4, 4)));
        compositor
    }

    #[test]
    fn identical_signature_skips_the_second_bake() {
        let mut compositor = compositor_with_texture();
        let registry = registry_with_group(0.0, 1);
        let target = ShadowTarget::Group(group_key(0.0));

        compositor.mark_dirty(target.clone());
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 1);

        compositor.mark_dirty(target.clone());
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 0);

        // Forcing drops the cached signature and rebakes.
        compositor.force_refresh(&target);
        compositor.mark_dirty(target);
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 1);
    }

    #[test]
    fn zoom_change_invalidates_the_signature() {
        let mut compositor = compositor_with_texture();
        let registry = registry_with_group(0.0, 1);
        let target = ShadowTarget::Group(group_key(0.0));

        compositor.mark_dirty(target.clone());
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 1);
        compositor.mark_dirty(target);
        assert_eq!(compositor.on_frame(None, &registry, 2.0), 1);
    }

    #[test]
    fn dirty_marks_coalesce_into_one_frame_pass() {
        let mut compositor = compositor_with_texture();
        let registry = registry_with_group(0.0, 1);
        let target = ShadowTarget::Group(group_key(0.0));

        compositor.mark_dirty(target.clone());
        compositor.mark_dirty(target.clone());
        compositor.mark_dirty(target);
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 1);
        // Nothing pending afterwards.
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 0);
    }

    #[test]
    fn batch_mode_defers_to_one_flush() {
        let mut compositor = compositor_with_texture();
        let registry = registry_with_group(0.0, 1);
        let target = ShadowTarget::Group(group_key(0.0));

        compositor.begin_batch();
        compositor.mark_dirty(target.clone());
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 0);
        compositor.mark_dirty(target);
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 0);

        compositor.end_batch();
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 1);
    }

    #[test]
    fn global_change_during_batch_escalates_to_all_groups() {
        let mut compositor = compositor_with_texture();
        let mut registry = registry_with_group(0.0, 1);
        registry.ensure_group(1.0, ShadowSettings::default(), 1);
        registry.add_instance(ScatterInstance {
            id: 2,
            src: "a.png".into(),
            x: 40.0,
            y: 40.0,
            w: 8.0,
            h: 8.0,
            rotation: 0.0,
            flip_h: false,
            flip_v: false,
            elevation: 1.0,
            group_key: group_key(1.0),
        });

        compositor.begin_batch();
        compositor.mark_dirty(ShadowTarget::Group(group_key(0.0)));
        compositor.note_global_change();
        compositor.end_batch();
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 2);
    }

    #[test]
    fn pending_texture_registers_waiter_and_rebakes_on_ready() {
        let mut compositor = ShadowCompositor::new();
        let registry = registry_with_group(0.0, 1);
        let target = ShadowTarget::Group(group_key(0.0));

        compositor.mark_dirty(target.clone());
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 0);
        assert!(compositor.get(&target).is_none());

        compositor.texture_ready("a.png", Arc::new(SpriteTexture::solid(4, 4)));
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 1);
        assert!(compositor.get(&target).is_some());
    }

    #[test]
    fn stale_targets_are_dropped_silently() {
        let mut compositor = compositor_with_texture();
        let registry = PreviewGroupRegistry::new();
        compositor.mark_dirty(ShadowTarget::Group(group_key(3.0)));
        compositor.mark_dirty(ShadowTarget::SinglePreview);
        assert_eq!(compositor.on_frame(None, &registry, 1.0), 0);
    }

    #[test]
    fn release_clears_all_session_resources() {
        let mut compositor = compositor_with_texture();
        let registry = registry_with_group(0.0, 1);
        let target = ShadowTarget::Group(group_key(0.0));
        compositor.mark_dirty(target.clone());
        compositor.on_frame(None, &registry, 1.0);
        assert!(compositor.get(&target).is_some());

        compositor.release();
        assert!(compositor.get(&target).is_none());
        assert!(!compositor.has_texture("a.png"));
    }
}
