//! Randomized transform jitter for rotation, scale, and flip axes.
//!
//! Each axis holds a user-set base value, a random-enabled flag, a strength
//! (maximum deviation), and a pending offset that is either held stable across
//! placements or regenerated per placement. The per-axis math lives in a
//! [`JitterKernel`]; [`JitterAxis`] carries the shared state machine so the
//! rotation/scale/flip trios do not duplicate logic.
use rand::RngCore;

use crate::sampler::rand01;

/// Lower clamp for jittered scale results.
pub const SCALE_MIN: f32 = 0.1;
/// Upper clamp for jittered scale results.
pub const SCALE_MAX: f32 = 2.5;

/// Per-axis jitter math: how offsets are drawn and applied.
pub trait JitterKernel {
    type Value: Copy + PartialEq + std::fmt::Debug;
    type Offset: Copy + Default + std::fmt::Debug;

    /// Default base value for a fresh axis.
    const DEFAULT_BASE: Self::Value;
    /// Upper clamp for the strength setting.
    const MAX_STRENGTH: f32;

    /// Applies an offset to a base value, normalizing/clamping the result.
    fn apply(base: Self::Value, offset: Self::Offset) -> Self::Value;

    /// Computes the pending value for the next placement.
    ///
    /// With `regenerate` a fresh offset is drawn within `strength`; otherwise
    /// `previous_offset` is re-applied. Returns the pending value and the
    /// offset to store (which may be back-derived after clamping).
    fn compute_pending(
        base: Self::Value,
        strength: f32,
        regenerate: bool,
        previous_offset: Self::Offset,
        rng: &mut dyn RngCore,
    ) -> (Self::Value, Self::Offset);
}

/// Rotation jitter: degrees, offset in `[-strength, strength]`, result
/// normalized to `[0, 360)`.
#[derive(Debug, Clone, Copy)]
pub struct RotationKernel;

fn normalize_deg(value: f32) -> f32 {
    value.rem_euclid(360.0)
}

impl JitterKernel for RotationKernel {
    type Value = f32;
    type Offset = f32;

    const DEFAULT_BASE: f32 = 0.0;
    const MAX_STRENGTH: f32 = 180.0;

    fn apply(base: f32, offset: f32) -> f32 {
        normalize_deg(base + offset)
    }

    fn compute_pending(
        base: f32,
        strength: f32,
        regenerate: bool,
        previous_offset: f32,
        rng: &mut dyn RngCore,
    ) -> (f32, f32) {
        let offset = if regenerate {
            let s = strength.clamp(0.0, Self::MAX_STRENGTH);
            (rand01(rng) * 2.0 - 1.0) * s
        } else {
            previous_offset
        };
        (Self::apply(base, offset), offset)
    }
}

/// Scale jitter: offset is a fractional multiplier in
/// `[-strength/100, strength/100]`; the result is clamped to
/// `[`[`SCALE_MIN`]`, `[`SCALE_MAX`]`]`. When clamping altered the value the
/// stored offset is back-derived from the clamped result so subsequent hold
/// calls reproduce it.
#[derive(Debug, Clone, Copy)]
pub struct ScaleKernel;

impl JitterKernel for ScaleKernel {
    type Value = f32;
    type Offset = f32;

    const DEFAULT_BASE: f32 = 1.0;
    const MAX_STRENGTH: f32 = 100.0;

    fn apply(base: f32, offset: f32) -> f32 {
        (base * (1.0 + offset)).clamp(SCALE_MIN, SCALE_MAX)
    }

    fn compute_pending(
        base: f32,
        strength: f32,
        regenerate: bool,
        previous_offset: f32,
        rng: &mut dyn RngCore,
    ) -> (f32, f32) {
        let mut offset = if regenerate {
            let range = strength.clamp(0.0, Self::MAX_STRENGTH) / 100.0;
            (rand01(rng) * 2.0 - 1.0) * range
        } else {
            previous_offset
        };

        let raw = base * (1.0 + offset);
        let pending = raw.clamp(SCALE_MIN, SCALE_MAX);
        if pending != raw && base != 0.0 {
            offset = pending / base - 1.0;
        }
        (pending, offset)
    }
}

/// Flip jitter: one coin-flip toggle per axis per placement.
#[derive(Debug, Clone, Copy)]
pub struct FlipKernel;

impl JitterKernel for FlipKernel {
    type Value = bool;
    type Offset = bool;

    const DEFAULT_BASE: bool = false;
    const MAX_STRENGTH: f32 = 1.0;

    fn apply(base: bool, offset: bool) -> bool {
        base ^ offset
    }

    fn compute_pending(
        base: bool,
        _strength: f32,
        regenerate: bool,
        previous_offset: bool,
        rng: &mut dyn RngCore,
    ) -> (bool, bool) {
        let offset = if regenerate {
            rand01(rng) < 0.5
        } else {
            previous_offset
        };
        (Self::apply(base, offset), offset)
    }
}

/// Shared state machine for one jitter axis.
#[derive(Debug, Clone)]
pub struct JitterAxis<K: JitterKernel> {
    base: K::Value,
    random_enabled: bool,
    strength: f32,
    offset: K::Offset,
    pending: K::Value,
}

impl<K: JitterKernel> Default for JitterAxis<K> {
    fn default() -> Self {
        Self {
            base: K::DEFAULT_BASE,
            random_enabled: false,
            strength: 0.0,
            offset: K::Offset::default(),
            pending: K::apply(K::DEFAULT_BASE, K::Offset::default()),
        }
    }
}

impl<K: JitterKernel> JitterAxis<K> {
    pub fn base(&self) -> K::Value {
        self.base
    }

    pub fn pending(&self) -> K::Value {
        self.pending
    }

    pub fn offset(&self) -> K::Offset {
        self.offset
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    pub fn random_enabled(&self) -> bool {
        self.random_enabled
    }

    /// Sets the base value and re-applies the held offset.
    pub fn set_base(&mut self, base: K::Value) {
        self.base = base;
        self.refresh_hold();
    }

    /// Sets the strength, clamped to the kernel's allowed range.
    pub fn set_strength(&mut self, strength: f32) {
        if !strength.is_finite() {
            return;
        }
        self.strength = strength.clamp(0.0, K::MAX_STRENGTH);
    }

    pub fn set_random_enabled(&mut self, enabled: bool) {
        self.random_enabled = enabled;
        if !enabled {
            self.collapse_to_base();
        }
    }

    /// Starts a new placement cycle: regenerates the offset when random is
    /// enabled, otherwise collapses to the base value with zero offset.
    pub fn begin_placement(&mut self, rng: &mut dyn RngCore) {
        if self.random_enabled {
            let (pending, offset) =
                K::compute_pending(self.base, self.strength, true, self.offset, rng);
            self.pending = pending;
            self.offset = offset;
        } else {
            self.collapse_to_base();
        }
    }

    /// Recomputes the pending value keeping the current offset (hold mode).
    pub fn refresh_hold(&mut self) {
        if self.random_enabled {
            // Re-applying a held offset never draws randomness.
            let (pending, offset) = K::compute_pending(
                self.base,
                self.strength,
                false,
                self.offset,
                &mut NoRng,
            );
            self.pending = pending;
            self.offset = offset;
        } else {
            self.collapse_to_base();
        }
    }

    /// Resets the axis to its default base with randomness disabled.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Draws an independent value from the axis configuration without
    /// touching the held state. Used for per-instance scatter jitter.
    pub fn sample_independent(&self, rng: &mut dyn RngCore) -> K::Value {
        if self.random_enabled {
            K::compute_pending(self.base, self.strength, true, K::Offset::default(), rng).0
        } else {
            K::apply(self.base, K::Offset::default())
        }
    }

    fn collapse_to_base(&mut self) {
        self.offset = K::Offset::default();
        self.pending = K::apply(self.base, K::Offset::default());
    }
}

/// Panicking RNG used only on hold paths that must not draw randomness.
struct NoRng;

impl RngCore for NoRng {
    fn next_u32(&mut self) -> u32 {
        unreachable!("hold recomputation must not draw randomness")
    }

    fn next_u64(&mut self) -> u64 {
        unreachable!("hold recomputation must not draw randomness")
    }

    fn fill_bytes(&mut self, _dest: &mut [u8]) {
        unreachable!("hold recomputation must not draw randomness")
    }
}

/// Transform applied to one scatter instance or pending placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceTransform {
    pub rotation: f32,
    pub scale: f32,
    pub flip_h: bool,
    pub flip_v: bool,
}

/// The four jitter axes of a placement session.
#[derive(Debug, Clone, Default)]
pub struct TransformJitter {
    pub rotation: JitterAxis<RotationKernel>,
    pub scale: JitterAxis<ScaleKernel>,
    pub flip_h: JitterAxis<FlipKernel>,
    pub flip_v: JitterAxis<FlipKernel>,
}

impl TransformJitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every axis to defaults.
    pub fn reset(&mut self) {
        self.rotation.reset();
        self.scale.reset();
        self.flip_h.reset();
        self.flip_v.reset();
    }

    /// Begins a new placement cycle on every axis.
    pub fn begin_placement(&mut self, rng: &mut dyn RngCore) {
        self.rotation.begin_placement(rng);
        self.scale.begin_placement(rng);
        self.flip_h.begin_placement(rng);
        self.flip_v.begin_placement(rng);
    }

    /// The currently pending transform for the live single preview.
    pub fn pending(&self) -> InstanceTransform {
        InstanceTransform {
            rotation: self.rotation.pending(),
            scale: self.scale.pending(),
            flip_h: self.flip_h.pending(),
            flip_v: self.flip_v.pending(),
        }
    }

    /// Draws an independent transform for one scatter instance, never sharing
    /// the live-preview pending state.
    pub fn sample_instance(&self, rng: &mut dyn RngCore) -> InstanceTransform {
        InstanceTransform {
            rotation: self.rotation.sample_independent(rng),
            scale: self.scale.sample_independent(rng),
            flip_h: self.flip_h.sample_independent(rng),
            flip_v: self.flip_v.sample_independent(rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn rotation_offset_and_result_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for strength in [0.0_f32, 15.0, 90.0, 180.0] {
            let mut axis: JitterAxis<RotationKernel> = JitterAxis::default();
            axis.set_base(350.0);
            axis.set_random_enabled(true);
            axis.set_strength(strength);
            for _ in 0..200 {
                axis.begin_placement(&mut rng);
                assert!(axis.offset() >= -strength && axis.offset() <= strength);
                let pending = axis.pending();
                assert!((0.0..360.0).contains(&pending), "pending {pending}");
            }
        }
    }

    #[test]
    fn rotation_strength_is_clamped_to_half_turn() {
        let mut axis: JitterAxis<RotationKernel> = JitterAxis::default();
        axis.set_strength(500.0);
        assert_eq!(axis.strength(), 180.0);
        axis.set_strength(f32::NAN);
        assert_eq!(axis.strength(), 180.0);
    }

    #[test]
    fn scale_results_always_clamped() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut axis: JitterAxis<ScaleKernel> = JitterAxis::default();
        axis.set_base(2.4);
        axis.set_random_enabled(true);
        axis.set_strength(100.0);
        for _ in 0..500 {
            axis.begin_placement(&mut rng);
            let pending = axis.pending();
            assert!((SCALE_MIN..=SCALE_MAX).contains(&pending));
        }
    }

    #[test]
    fn scale_hold_reproduces_clamped_result() {
        // Offset 0.5 on base 2.0 lands at 3.0 and clamps to 2.5; the stored
        // offset is back-derived so hold mode reproduces the clamp exactly.
        let (pending, offset) =
            ScaleKernel::compute_pending(2.0, 100.0, false, 0.5, &mut StdRng::seed_from_u64(0));
        assert_eq!(pending, 2.5);
        assert!((offset - 0.25).abs() < 1e-6);

        let (again, offset_again) =
            ScaleKernel::compute_pending(2.0, 100.0, false, offset, &mut StdRng::seed_from_u64(0));
        assert_eq!(again, 2.5);
        assert_eq!(offset_again, offset);
    }

    #[test]
    fn disabled_axis_collapses_to_base_with_zero_offset() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut axis: JitterAxis<RotationKernel> = JitterAxis::default();
        axis.set_base(30.0);
        axis.set_random_enabled(true);
        axis.set_strength(90.0);
        axis.begin_placement(&mut rng);

        axis.set_random_enabled(false);
        axis.begin_placement(&mut rng);
        assert_eq!(axis.pending(), 30.0);
        assert_eq!(axis.offset(), 0.0);
    }

    #[test]
    fn flip_disabled_equals_base() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut axis: JitterAxis<FlipKernel> = JitterAxis::default();
        axis.set_base(true);
        for _ in 0..20 {
            axis.begin_placement(&mut rng);
            assert!(axis.pending());
        }
    }

    #[test]
    fn flip_enabled_toggles_eventually() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut axis: JitterAxis<FlipKernel> = JitterAxis::default();
        axis.set_random_enabled(true);
        let mut seen = [false, false];
        for _ in 0..64 {
            axis.begin_placement(&mut rng);
            seen[axis.pending() as usize] = true;
        }
        assert!(seen[0] && seen[1]);
    }

    #[test]
    fn sample_instance_does_not_touch_held_state() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut jitter = TransformJitter::new();
        jitter.rotation.set_random_enabled(true);
        jitter.rotation.set_strength(180.0);
        jitter.begin_placement(&mut rng);
        let held = jitter.pending();

        for _ in 0..10 {
            let _ = jitter.sample_instance(&mut rng);
        }
        assert_eq!(jitter.pending(), held);
    }
}
