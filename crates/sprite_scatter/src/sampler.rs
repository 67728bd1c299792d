//! Scatter brush sampling: spray deviation, stroke spacing, and the dab queue.
//!
//! A "dab" is one brush-triggered burst of instances at a point. This module
//! generates the clustered instances for a single dab, gates dabs along a
//! drag stroke by spacing, and owns the FIFO queue that serializes dab
//! processing so slow asset resolution cannot interleave side effects.
use std::collections::VecDeque;

use glam::Vec2;
use rand::RngCore;
use tracing::warn;

use crate::group::{group_key, ScatterInstance};
use crate::host::{AssetDescriptor, AssetSource};
use crate::jitter::TransformJitter;

/// Width of the edge ring used at low spray deviation, as a fraction of the
/// brush radius.
const RING_WIDTH: f32 = 0.2;
/// Exponent of the center-biased distribution used at high spray deviation.
const CENTER_BIAS_EXP: f32 = 2.5;

/// Generate a random float in the range [0, 1].
#[inline]
pub(crate) fn rand01(rng: &mut dyn RngCore) -> f32 {
    (rng.next_u32() as f32) / ((u32::MAX as f32) + 1.0)
}

/// Random index in `[0, n)`; `n` must be non-zero.
#[inline]
pub(crate) fn rand_index(rng: &mut dyn RngCore, n: usize) -> usize {
    ((rand01(rng) * n as f32) as usize).min(n - 1)
}

/// Grid snapping applied to final dab points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSnap {
    pub enabled: bool,
    /// Snap step in world units.
    pub step: f32,
}

impl Default for GridSnap {
    fn default() -> Self {
        Self {
            enabled: false,
            step: 0.0,
        }
    }
}

impl GridSnap {
    pub fn new(step: f32) -> Self {
        Self {
            enabled: step > 0.0,
            step,
        }
    }

    /// Snaps a world point to the nearest grid intersection, when enabled.
    pub fn apply(&self, p: Vec2) -> Vec2 {
        if !self.enabled || self.step <= 0.0 {
            return p;
        }
        Vec2::new(
            (p.x / self.step).round() * self.step,
            (p.y / self.step).round() * self.step,
        )
    }
}

/// Scatter brush parameters with clamped setters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterBrush {
    radius: f32,
    density: u32,
    deviation: f32,
    spacing_percent: f32,
}

impl Default for ScatterBrush {
    fn default() -> Self {
        Self {
            radius: 100.0,
            density: 3,
            deviation: 0.5,
            spacing_percent: 25.0,
        }
    }
}

impl ScatterBrush {
    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn density(&self) -> u32 {
        self.density
    }

    pub fn deviation(&self) -> f32 {
        self.deviation
    }

    pub fn spacing_percent(&self) -> f32 {
        self.spacing_percent
    }

    pub fn set_radius(&mut self, radius: f32) {
        if radius.is_finite() && radius > 0.0 {
            self.radius = radius;
        }
    }

    pub fn set_density(&mut self, density: u32) {
        self.density = density.clamp(1, 20);
    }

    pub fn set_deviation(&mut self, deviation: f32) {
        if deviation.is_finite() {
            self.deviation = deviation.clamp(0.0, 1.0);
        }
    }

    pub fn set_spacing_percent(&mut self, percent: f32) {
        if percent.is_finite() {
            self.spacing_percent = percent.clamp(1.0, 200.0);
        }
    }

    /// Stamp spacing in world units: percent of the brush diameter.
    pub fn spacing_world(&self) -> f32 {
        self.radius * 2.0 * self.spacing_percent / 100.0
    }
}

/// Samples one polar spray offset within the brush radius.
///
/// Deviation blends three radial distributions:
/// - `d <= 0.5`: thin edge ring toward a uniform disk, factor `d / 0.5`;
/// - `d > 0.5`: uniform disk toward a center-biased curve
///   (`u.powf(2.5)`), factor `(d - 0.5) / 0.5`.
pub fn sample_spray_offset(radius: f32, deviation: f32, rng: &mut dyn RngCore) -> Vec2 {
    let u = rand01(rng);
    let d = deviation.clamp(0.0, 1.0);

    let r = if d <= 0.5 {
        let ring = radius * (1.0 - RING_WIDTH * u);
        let disk = radius * u.sqrt();
        let t = d / 0.5;
        ring + (disk - ring) * t
    } else {
        let disk = radius * u.sqrt();
        let center = radius * u.powf(CENTER_BIAS_EXP);
        let t = (d - 0.5) / 0.5;
        disk + (center - disk) * t
    };

    let angle = rand01(rng) * std::f32::consts::TAU;
    Vec2::new(angle.cos(), angle.sin()) * r
}

/// Spacing-gated stroke interpolation.
///
/// Carries cumulative unconsumed distance across pointer-move segments and
/// emits one dab point per consumed spacing increment. Reaching exactly the
/// spacing counts as reaching, not exceeding.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrokeSpacer {
    carried: f32,
}

impl StrokeSpacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.carried = 0.0;
    }

    /// Walks the segment `from -> to`, returning the dab points due.
    ///
    /// With `spacing <= 0` every move stamps immediately at `to`; duplicate
    /// suppression is the caller's job via drag state.
    pub fn advance(&mut self, from: Vec2, to: Vec2, spacing: f32) -> Vec<Vec2> {
        if spacing <= 0.0 {
            return vec![to];
        }

        let delta = to - from;
        let len = delta.length();
        if len <= 0.0 || !len.is_finite() {
            return Vec::new();
        }
        let dir = delta / len;

        let mut out = Vec::new();
        let mut travelled = 0.0;
        while self.carried + (len - travelled) >= spacing {
            let step = spacing - self.carried;
            travelled += step;
            self.carried = 0.0;
            out.push(from + dir * travelled);
        }
        self.carried += len - travelled;
        out
    }
}

/// Action a queued dab performs; fixed at enqueue time from the mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DabKind {
    /// Stamp preview instances.
    Preview,
    /// Erase instances within the brush radius.
    Erase,
    /// Stamp onto an existing scatter object being edited.
    Tile,
}

/// One queued dab request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DabRequest {
    pub kind: DabKind,
    pub world: Vec2,
}

/// Strict FIFO dab queue drained by one logical worker at a time.
///
/// Requests enqueued while a drain is in progress are appended and picked up
/// by the outer drain loop, never processed concurrently.
#[derive(Debug, Default)]
pub struct DabQueue {
    pending: VecDeque<DabRequest>,
    draining: bool,
}

impl DabQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, kind: DabKind, world: Vec2) {
        self.pending.push_back(DabRequest { kind, world });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Claims the worker role. Returns `false` when a drain is already in
    /// progress; the caller must then leave its requests queued.
    pub fn try_begin_drain(&mut self) -> bool {
        if self.draining {
            return false;
        }
        self.draining = true;
        true
    }

    /// Pops the next request; only valid between `try_begin_drain` and
    /// `finish_drain`.
    pub fn pop(&mut self) -> Option<DabRequest> {
        self.pending.pop_front()
    }

    pub fn finish_drain(&mut self) {
        self.draining = false;
    }
}

/// Per-dab context shared by every sample in one dab.
pub struct DabContext<'a> {
    pub brush: &'a ScatterBrush,
    pub snap: GridSnap,
    pub jitter: &'a TransformJitter,
    /// Quantized elevation of the receiving group.
    pub elevation: f32,
    /// Grid cell size used when assets are grid-sized.
    pub cell_size: f32,
}

/// Cycling asset pool: fixed single asset or a shuffled random pool.
#[derive(Debug, Clone)]
pub struct AssetPool {
    assets: Vec<AssetDescriptor>,
    order: Vec<usize>,
    cursor: usize,
    random: bool,
}

impl AssetPool {
    /// Pool holding one fixed asset.
    pub fn fixed(asset: AssetDescriptor) -> Self {
        Self {
            assets: vec![asset],
            order: vec![0],
            cursor: 0,
            random: false,
        }
    }

    /// Random pool cycling through a shuffled order, reshuffling on wrap.
    pub fn random(assets: Vec<AssetDescriptor>) -> Self {
        let order = (0..assets.len()).collect();
        Self {
            assets,
            order,
            cursor: 0,
            random: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn is_random(&self) -> bool {
        self.random
    }

    pub fn assets(&self) -> &[AssetDescriptor] {
        &self.assets
    }

    /// The next asset in the cycle.
    pub fn next(&mut self, rng: &mut dyn RngCore) -> Option<AssetDescriptor> {
        if self.assets.is_empty() {
            return None;
        }
        if !self.random {
            return Some(self.assets[0].clone());
        }
        if self.cursor >= self.order.len() {
            self.cursor = 0;
            shuffle(&mut self.order, rng);
        }
        let asset = self.assets[self.order[self.cursor]].clone();
        self.cursor += 1;
        Some(asset)
    }
}

fn shuffle(order: &mut [usize], rng: &mut dyn RngCore) {
    for i in (1..order.len()).rev() {
        let j = rand_index(rng, i + 1);
        order.swap(i, j);
    }
}

/// Generates the instances for one dab at `center`.
///
/// Runs `density` iterations, resolving each asset through the content port
/// before inclusion; a failed resolution skips that sample with a warning
/// rather than failing the dab.
pub fn generate_dab(
    ctx: &DabContext<'_>,
    center: Vec2,
    pool: &mut AssetPool,
    assets: &mut dyn AssetSource,
    next_id: &mut u64,
    rng: &mut dyn RngCore,
) -> Vec<ScatterInstance> {
    let mut out = Vec::with_capacity(ctx.brush.density() as usize);
    for _ in 0..ctx.brush.density() {
        let Some(asset) = pool.next(rng) else {
            break;
        };

        let src = match assets.resolve_local_path(&asset) {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping dab sample for '{}': {}.", asset.source, e);
                continue;
            }
        };

        let offset = sample_spray_offset(ctx.brush.radius(), ctx.brush.deviation(), rng);
        let point = ctx.snap.apply(center + offset);
        let transform = ctx.jitter.sample_instance(rng);
        let (base_w, base_h) = asset.base_size(ctx.cell_size);

        *next_id += 1;
        out.push(ScatterInstance {
            id: *next_id,
            src,
            x: point.x,
            y: point.y,
            w: base_w * transform.scale,
            h: base_h * transform.scale,
            rotation: transform.rotation,
            flip_h: transform.flip_h,
            flip_v: transform.flip_v,
            elevation: ctx.elevation,
            group_key: group_key(ctx.elevation),
        });
    }
    out
}
