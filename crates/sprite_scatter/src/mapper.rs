//! Screen/world coordinate mapping and pointer capture.
//!
//! [`CoordinateMapper`] converts pointer positions through the active
//! [`ViewTransform`], scores simultaneous pointer sources to pick the best
//! candidate, and supports a freeze mode that pins the preview to a captured
//! world anchor until released.
use glam::Vec2;
use mint::Vector2;

/// Active view transform of the render surface.
///
/// World position `w` maps to screen as `(w - pan) * zoom`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// World coordinate shown at the screen origin.
    pub pan: Vec2,
    /// Screen pixels per world unit.
    pub zoom: f32,
    /// Viewport size in screen pixels.
    pub viewport: Vec2,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
            viewport: Vec2::new(1920.0, 1080.0),
        }
    }
}

/// Origin of a pointer candidate, ordered by preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSource {
    /// Coordinates straight off the input event.
    RawEvent,
    /// Position supplied by the host alongside the call.
    Hint,
    /// Last-known pointer tracked by the tool controller.
    Tracked,
    /// Renderer-internal pointer state.
    RendererInternal,
}

impl PointerSource {
    /// Fixed preference weight; higher wins.
    pub fn weight(self) -> u8 {
        match self {
            PointerSource::RawEvent => 4,
            PointerSource::Hint => 3,
            PointerSource::Tracked => 2,
            PointerSource::RendererInternal => 1,
        }
    }
}

/// One pointer reading offered to [`CoordinateMapper::capture_best_pointer`].
#[derive(Debug, Clone, Copy)]
pub struct PointerCandidate {
    pub source: PointerSource,
    /// Screen-space position of the reading.
    pub screen: Vector2<f32>,
    /// Whether the reading lies over the render surface.
    pub over_surface: bool,
}

impl PointerCandidate {
    pub fn new(source: PointerSource, screen: Vector2<f32>, over_surface: bool) -> Self {
        Self {
            source,
            screen,
            over_surface,
        }
    }
}

/// Result of pointer capture: the chosen screen point and its world mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerCapture {
    pub screen: Vec2,
    pub world: Vec2,
}

/// Screen/world transform with freeze-anchor support.
#[derive(Debug, Clone, Default)]
pub struct CoordinateMapper {
    pub view: ViewTransform,
    frozen: Option<Vec2>,
}

impl CoordinateMapper {
    pub fn new(view: ViewTransform) -> Self {
        Self { view, frozen: None }
    }

    /// Converts a screen position to world coordinates.
    ///
    /// Returns `None` when the view transform is degenerate or the input is
    /// not finite.
    pub fn screen_to_world(&self, x: f32, y: f32) -> Option<Vec2> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        if !self.view.zoom.is_finite() || self.view.zoom <= 0.0 {
            return None;
        }
        Some(Vec2::new(x, y) / self.view.zoom + self.view.pan)
    }

    /// Converts a world position to screen coordinates.
    pub fn world_to_screen(&self, x: f32, y: f32) -> Option<Vec2> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        if !self.view.zoom.is_finite() || self.view.zoom <= 0.0 {
            return None;
        }
        Some((Vec2::new(x, y) - self.view.pan) * self.view.zoom)
    }

    /// Picks the highest-weighted valid candidate and maps it to world space.
    ///
    /// A candidate is valid when it lies over the render surface and converts
    /// cleanly. With no valid candidate the viewport center is used.
    pub fn capture_best_pointer(&self, candidates: &[PointerCandidate]) -> PointerCapture {
        let mut best: Option<(u8, Vec2, Vec2)> = None;
        for candidate in candidates {
            if !candidate.over_surface {
                continue;
            }
            let screen = Vec2::from(candidate.screen);
            let Some(world) = self.screen_to_world(screen.x, screen.y) else {
                continue;
            };
            let weight = candidate.source.weight();
            match best {
                Some((w, _, _)) if w >= weight => {}
                _ => best = Some((weight, screen, world)),
            }
        }

        if let Some((_, screen, world)) = best {
            return PointerCapture { screen, world };
        }

        let center = self.view.viewport * 0.5;
        let world = self
            .screen_to_world(center.x, center.y)
            .unwrap_or(self.view.pan);
        PointerCapture {
            screen: center,
            world,
        }
    }

    /// Pins the preview to `anchor` until [`CoordinateMapper::release_freeze`].
    pub fn freeze(&mut self, anchor: Vec2) {
        self.frozen = Some(anchor);
    }

    pub fn release_freeze(&mut self) {
        self.frozen = None;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// The world position the preview should track: the frozen anchor while
    /// frozen, otherwise the live position.
    pub fn effective_world(&self, live: Vec2) -> Vec2 {
        self.frozen.unwrap_or(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> CoordinateMapper {
        CoordinateMapper::new(ViewTransform {
            pan: Vec2::new(100.0, 50.0),
            zoom: 2.0,
            viewport: Vec2::new(800.0, 600.0),
        })
    }

    #[test]
    fn screen_world_round_trip() {
        let m = mapper();
        let world = m.screen_to_world(40.0, 20.0).expect("valid transform");
        assert_eq!(world, Vec2::new(120.0, 60.0));
        let screen = m.world_to_screen(world.x, world.y).expect("valid transform");
        assert_eq!(screen, Vec2::new(40.0, 20.0));
    }

    #[test]
    fn degenerate_zoom_returns_none() {
        let mut m = mapper();
        m.view.zoom = 0.0;
        assert!(m.screen_to_world(1.0, 1.0).is_none());
        assert!(m.world_to_screen(1.0, 1.0).is_none());
        assert!(m.screen_to_world(f32::NAN, 1.0).is_none());
    }

    #[test]
    fn capture_prefers_higher_weight_source() {
        let m = mapper();
        let capture = m.capture_best_pointer(&[
            PointerCandidate::new(
                PointerSource::Tracked,
                Vector2 { x: 10.0, y: 10.0 },
                true,
            ),
            PointerCandidate::new(
                PointerSource::RawEvent,
                Vector2 { x: 30.0, y: 30.0 },
                true,
            ),
            PointerCandidate::new(PointerSource::Hint, Vector2 { x: 20.0, y: 20.0 }, true),
        ]);
        assert_eq!(capture.screen, Vec2::new(30.0, 30.0));
    }

    #[test]
    fn capture_skips_candidates_off_surface() {
        let m = mapper();
        let capture = m.capture_best_pointer(&[
            PointerCandidate::new(
                PointerSource::RawEvent,
                Vector2 { x: 30.0, y: 30.0 },
                false,
            ),
            PointerCandidate::new(
                PointerSource::Tracked,
                Vector2 { x: 10.0, y: 10.0 },
                true,
            ),
        ]);
        assert_eq!(capture.screen, Vec2::new(10.0, 10.0));
    }

    #[test]
    fn capture_falls_back_to_viewport_center() {
        let m = mapper();
        let capture = m.capture_best_pointer(&[]);
        assert_eq!(capture.screen, Vec2::new(400.0, 300.0));
        assert_eq!(capture.world, Vec2::new(300.0, 200.0));
    }

    #[test]
    fn freeze_pins_effective_world() {
        let mut m = mapper();
        let anchor = Vec2::new(5.0, 6.0);
        m.freeze(anchor);
        assert!(m.is_frozen());
        assert_eq!(m.effective_world(Vec2::new(99.0, 99.0)), anchor);
        m.release_freeze();
        assert_eq!(m.effective_world(Vec2::new(99.0, 99.0)), Vec2::new(99.0, 99.0));
    }
}
