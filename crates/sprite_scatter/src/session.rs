//! The placement session state machine.
//!
//! A [`PlacementSession`] owns every per-session engine component and routes
//! host events (pointer input, settings, frame ticks) through them. At most
//! one placement is in progress at a time; the [`Mode`] determines how
//! pointer input is interpreted and what a commit writes to the scene store.
use glam::Vec2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::flags::{FlagInstance, ScatterPayload};
use crate::group::{
    compute_bounds, group_key, quantize_elevation, GroupKey, PreviewGroupRegistry,
    ScatterInstance,
};
use crate::history::{HistorySnapshot, ScatterHistory};
use crate::host::{AssetDescriptor, HostPorts, NoticeLevel, PlacedObject, ToolOptionsState};
use crate::jitter::TransformJitter;
use crate::mapper::{CoordinateMapper, PointerCandidate, ViewTransform};
use crate::sampler::{
    generate_dab, AssetPool, DabContext, DabKind, DabQueue, GridSnap, ScatterBrush, StrokeSpacer,
};
use crate::shadow::{
    ShadowCompositor, ShadowSettings, ShadowTarget, SpriteGeometry, ThumbnailBaker,
    ThumbnailImage,
};

/// Settings key persisting the last-used placement elevation.
pub const SETTING_LAST_ELEVATION: &str = "placement.lastElevation";
/// Settings key persisting the default shadow parameters.
pub const SETTING_SHADOW_DEFAULTS: &str = "placement.shadowDefaults";

/// What the session is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Idle,
    /// Placing one chosen asset per click.
    Single,
    /// Placing per click from a cycling random pool.
    Random,
    /// Editing one existing placed object with debounced saves.
    EditExisting,
    /// Painting new scatter instances into preview groups.
    ScatterPaint,
    /// Painting into an existing scatter object's instance list.
    ScatterEdit,
}

/// Why a session is being cancelled. System-driven reasons auto-commit a
/// pending merge session; a user request never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    TabSwitch,
    TabDeactivate,
    AppClose,
    CanvasTeardown,
    PathEdit,
    SwitchMode,
    UserRequest,
}

impl CancelReason {
    pub fn auto_commits(self) -> bool {
        !matches!(self, CancelReason::UserRequest)
    }
}

/// What a cancel actually did with pending work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Nothing pending, or pending work was dropped.
    Discarded,
    /// Pending work was written to the store before teardown.
    Committed,
    /// Pending work exists and the caller must confirm the discard.
    ConfirmationRequired,
}

/// Static session configuration supplied by the host.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SessionConfig {
    /// World units per grid cell, used for grid-sized assets.
    pub cell_size: f32,
    /// Grid snap step in world units; `0` disables snapping.
    pub snap_step: f32,
    /// Debounce window for edit-mode saves, in milliseconds.
    pub edit_debounce_ms: u64,
    /// Fixed RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cell_size: 100.0,
            snap_step: 0.0,
            edit_debounce_ms: 150,
            seed: None,
        }
    }
}

impl SessionConfig {
    pub fn with_cell_size(mut self, cell_size: f32) -> Self {
        self.cell_size = cell_size;
        self
    }

    pub fn with_snap_step(mut self, step: f32) -> Self {
        self.snap_step = step;
        self
    }

    pub fn with_edit_debounce_ms(mut self, ms: u64) -> Self {
        self.edit_debounce_ms = ms;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "cell_size must be positive, got {}",
                self.cell_size
            )));
        }
        if !self.snap_step.is_finite() || self.snap_step < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "snap_step must be non-negative, got {}",
                self.snap_step
            )));
        }
        Ok(())
    }
}

/// One interactive placement session over a set of host ports.
pub struct PlacementSession {
    config: SessionConfig,
    pub ports: HostPorts,
    pub mapper: CoordinateMapper,
    pub jitter: TransformJitter,
    pub compositor: ShadowCompositor,
    pub thumbnails: ThumbnailBaker,
    brush: ScatterBrush,
    snap: GridSnap,
    mode: Mode,
    sticky: bool,
    merge_enabled: bool,
    erase_enabled: bool,
    painting: bool,
    pool: AssetPool,
    current: Option<AssetDescriptor>,
    current_src: Option<String>,
    cursor_world: Vec2,
    last_pointer: Option<Vec2>,
    spacer: StrokeSpacer,
    queue: DabQueue,
    registry: PreviewGroupRegistry,
    history: ScatterHistory,
    shadow_defaults: ShadowSettings,
    preview_shadow: ShadowSettings,
    elevation: f32,
    last_elevation: f32,
    selection_elevation: Option<f32>,
    next_sort: i32,
    next_instance_id: u64,
    edit_target: Option<PlacedObject>,
    edit_flips: (bool, bool),
    edit_dirty: bool,
    edit_commit_due: Option<u64>,
    scatter_edit_target: Option<PlacedObject>,
    suspended_target: Option<String>,
    rng: StdRng,
}

impl PlacementSession {
    pub fn new(config: SessionConfig, ports: HostPorts) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let last_elevation = ports
            .settings
            .read(SETTING_LAST_ELEVATION)
            .and_then(|v| v.as_f64())
            .map(|v| v as f32)
            .unwrap_or(0.0);
        let shadow_defaults = ports
            .settings
            .read(SETTING_SHADOW_DEFAULTS)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let snap = GridSnap::new(config.snap_step);
        Ok(Self {
            config,
            ports,
            mapper: CoordinateMapper::default(),
            jitter: TransformJitter::new(),
            compositor: ShadowCompositor::new(),
            thumbnails: ThumbnailBaker::new(),
            brush: ScatterBrush::default(),
            snap,
            mode: Mode::Idle,
            sticky: false,
            merge_enabled: false,
            erase_enabled: false,
            painting: false,
            pool: AssetPool::random(Vec::new()),
            current: None,
            current_src: None,
            cursor_world: Vec2::ZERO,
            last_pointer: None,
            spacer: StrokeSpacer::new(),
            queue: DabQueue::new(),
            registry: PreviewGroupRegistry::new(),
            history: ScatterHistory::new(),
            shadow_defaults,
            preview_shadow: shadow_defaults,
            elevation: last_elevation,
            last_elevation,
            selection_elevation: None,
            next_sort: 0,
            next_instance_id: 0,
            edit_target: None,
            edit_flips: (false, false),
            edit_dirty: false,
            edit_commit_due: None,
            scatter_edit_target: None,
            suspended_target: None,
            rng,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_sticky(&self) -> bool {
        self.sticky
    }

    pub fn elevation(&self) -> f32 {
        self.elevation
    }

    pub fn shadow_defaults(&self) -> ShadowSettings {
        self.shadow_defaults
    }

    pub fn brush(&self) -> &ScatterBrush {
        &self.brush
    }

    pub fn registry(&self) -> &PreviewGroupRegistry {
        &self.registry
    }

    /// Uncommitted instance count of the merge session.
    pub fn merge_pending(&self) -> usize {
        self.registry.total_instances()
    }

    /// Id of the existing object whose visuals the host should hide while it
    /// is under edit.
    pub fn suspended_target(&self) -> Option<&str> {
        self.suspended_target.as_deref()
    }

    /// Begins single placement of one asset.
    pub fn start(&mut self, asset: AssetDescriptor, sticky: bool) -> Result<()> {
        self.prepare_start()?;
        let path = match self.ports.assets.resolve_local_path(&asset) {
            Ok(path) => path,
            Err(e) => {
                self.ports.notifier.notify(
                    NoticeLevel::Error,
                    &format!("Cannot load '{}': {}.", asset.source, e),
                );
                return Err(e);
            }
        };
        info!("Starting placement of '{}'.", asset.source);
        self.current_src = Some(path);
        self.pool = AssetPool::fixed(asset.clone());
        self.current = Some(asset);
        self.mode = Mode::Single;
        self.sticky = sticky;
        self.elevation = self.selection_elevation.unwrap_or(self.last_elevation);
        self.preview_shadow = self.shadow_defaults;
        self.jitter.reset();
        self.jitter.begin_placement(&mut self.rng);
        self.compositor.mark_dirty(ShadowTarget::SinglePreview);
        self.sync_options();
        Ok(())
    }

    /// Begins random placement from a pool of assets.
    ///
    /// Resolution is best-effort per asset: unresolvable entries are excluded
    /// with a warning, and only an entirely unusable pool fails the start.
    pub fn start_random(&mut self, assets: Vec<AssetDescriptor>, sticky: bool) -> Result<()> {
        self.prepare_start()?;
        if assets.is_empty() {
            return Err(Error::InvalidConfig(
                "random placement needs at least one asset".into(),
            ));
        }
        let mut usable = Vec::with_capacity(assets.len());
        for asset in assets {
            match self.ports.assets.resolve_local_path(&asset) {
                Ok(_) => usable.push(asset),
                Err(e) => {
                    warn!("Excluding '{}' from the random pool: {}.", asset.source, e);
                }
            }
        }
        if usable.is_empty() {
            self.ports
                .notifier
                .notify(NoticeLevel::Error, "None of the selected assets could be loaded.");
            return Err(Error::InvalidConfig("no usable assets in the pool".into()));
        }
        info!("Starting random placement from {} asset(s).", usable.len());
        self.pool = AssetPool::random(usable);
        self.mode = Mode::Random;
        self.sticky = sticky;
        self.elevation = self.selection_elevation.unwrap_or(self.last_elevation);
        self.preview_shadow = self.shadow_defaults;
        self.advance_random();
        self.jitter.reset();
        self.jitter.begin_placement(&mut self.rng);
        self.compositor.mark_dirty(ShadowTarget::SinglePreview);
        self.sync_options();
        Ok(())
    }

    /// Begins editing an existing placed object.
    pub fn edit_existing(&mut self, target: PlacedObject) -> Result<()> {
        if target.id.is_empty() {
            return Err(Error::MissingTarget {
                id: "<unsaved>".into(),
            });
        }
        self.prepare_start()?;
        let payload = ScatterPayload::decode(&target.flags);
        self.preview_shadow = payload
            .as_ref()
            .map(|p| p.shadow)
            .unwrap_or(self.shadow_defaults);
        self.edit_flips = payload.map(|p| (p.flip_h, p.flip_v)).unwrap_or_default();
        self.elevation = target.elevation;
        self.suspended_target = Some(target.id.clone());
        self.current_src = Some(target.texture_src.clone());
        self.edit_target = Some(target);
        self.mode = Mode::EditExisting;
        self.sticky = false;
        self.compositor.mark_dirty(ShadowTarget::SinglePreview);
        self.sync_options();
        Ok(())
    }

    /// Begins scatter editing of an existing object carrying a scatter
    /// payload. A missing or version-mismatched payload fails the entry.
    pub fn edit_scatter_group(&mut self, target: PlacedObject) -> Result<()> {
        if target.id.is_empty() {
            return Err(Error::MissingTarget {
                id: "<unsaved>".into(),
            });
        }
        let Some(payload) = ScatterPayload::decode(&target.flags) else {
            self.ports
                .notifier
                .notify(NoticeLevel::Warning, "This object has no scatter data to edit.");
            return Err(Error::InvalidConfig(
                "object carries no scatter payload".into(),
            ));
        };
        self.prepare_start()?;
        info!(
            "Editing scatter object {} with {} instance(s).",
            target.id,
            payload.instances.len()
        );
        let elevation = quantize_elevation(target.elevation);
        self.registry.ensure_group(elevation, payload.shadow, target.sort);
        for local in &payload.instances {
            self.next_instance_id += 1;
            self.registry.add_instance(ScatterInstance {
                id: self.next_instance_id,
                src: local.src.clone(),
                x: target.x + local.x,
                y: target.y + local.y,
                w: local.w,
                h: local.h,
                rotation: local.rotation,
                flip_h: local.flip_h,
                flip_v: local.flip_v,
                elevation,
                group_key: group_key(elevation),
            });
        }
        self.elevation = elevation;
        self.suspended_target = Some(target.id.clone());
        self.scatter_edit_target = Some(target);
        self.mode = Mode::ScatterEdit;
        self.merge_enabled = true;
        self.history
            .reset_with_baseline(HistorySnapshot::capture(&self.registry, true));
        self.compositor
            .mark_dirty(ShadowTarget::Group(group_key(elevation)));
        self.sync_options();
        Ok(())
    }

    /// Toggles scatter painting on the active single/random placement.
    ///
    /// Entering enables merge mode; leaving commits the pending session.
    pub fn set_scatter_mode(&mut self, enabled: bool) -> Result<()> {
        if enabled {
            if !matches!(self.mode, Mode::Single | Mode::Random) {
                return Err(Error::InvalidConfig(
                    "scatter painting needs an active placement".into(),
                ));
            }
            self.mode = Mode::ScatterPaint;
            self.merge_enabled = true;
            self.history
                .reset_with_baseline(HistorySnapshot::capture(&self.registry, true));
            self.sync_options();
            return Ok(());
        }
        match self.mode {
            Mode::ScatterPaint => {
                if !self.registry.is_empty() {
                    self.commit_paint_session()?;
                }
                self.clear_scatter_state();
                self.mode = if self.pool.is_random() {
                    Mode::Random
                } else {
                    Mode::Single
                };
                self.erase_enabled = false;
                self.sync_options();
                Ok(())
            }
            Mode::ScatterEdit => {
                let _ = self.cancel(CancelReason::SwitchMode, true)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn set_erase_enabled(&mut self, enabled: bool) {
        self.erase_enabled = enabled;
    }

    pub fn set_merge_enabled(&mut self, enabled: bool) {
        self.merge_enabled = enabled;
        self.sync_options();
    }

    pub fn set_elevation(&mut self, elevation: f32) {
        if elevation.is_finite() {
            self.elevation = elevation;
            self.sync_options();
        }
    }

    pub fn set_sort(&mut self, sort: i32) {
        self.next_sort = sort;
        self.sync_options();
    }

    pub fn set_grid_snap(&mut self, step: f32) {
        self.snap = GridSnap::new(step);
    }

    pub fn set_brush_radius(&mut self, radius: f32) {
        self.brush.set_radius(radius);
        self.sync_options();
    }

    pub fn set_brush_density(&mut self, density: u32) {
        self.brush.set_density(density);
        self.sync_options();
    }

    pub fn set_brush_deviation(&mut self, deviation: f32) {
        self.brush.set_deviation(deviation);
        self.sync_options();
    }

    pub fn set_brush_spacing_percent(&mut self, percent: f32) {
        self.brush.set_spacing_percent(percent);
        self.sync_options();
    }

    /// Elevations of the host's current selection; the maximum seeds the
    /// starting elevation of the next placement.
    pub fn note_selection_elevations(&mut self, elevations: &[f32]) {
        self.selection_elevation = elevations
            .iter()
            .copied()
            .filter(|e| e.is_finite())
            .fold(None, |acc: Option<f32>, e| {
                Some(acc.map_or(e, |a| a.max(e)))
            });
    }

    /// Applies new shadow settings to whatever the session is shading: the
    /// active paint group, the edited object, or the single-preview defaults.
    pub fn set_shadow(&mut self, settings: ShadowSettings) {
        match self.mode {
            Mode::ScatterPaint | Mode::ScatterEdit => {
                let key = self.registry.active_key().cloned();
                match key {
                    Some(key) => {
                        if let Some(group) = self.registry.get_mut(&key) {
                            group.shadow = settings;
                        }
                        self.compositor.mark_dirty(ShadowTarget::Group(key));
                    }
                    None => self.preview_shadow = settings,
                }
            }
            Mode::EditExisting => {
                self.preview_shadow = settings;
                if let Some(target) = self.edit_target.as_mut() {
                    let mut payload = ScatterPayload::decode(&target.flags)
                        .unwrap_or_else(|| ScatterPayload::shadow_only(settings));
                    payload.shadow = settings;
                    payload.write_into(&mut target.flags);
                    self.edit_dirty = true;
                }
                self.compositor.mark_dirty(ShadowTarget::SinglePreview);
            }
            _ => {
                self.shadow_defaults = settings;
                self.preview_shadow = settings;
                self.ports.settings.write(
                    SETTING_SHADOW_DEFAULTS,
                    serde_json::to_value(settings).unwrap_or(Value::Null),
                );
                self.compositor.mark_dirty(ShadowTarget::SinglePreview);
            }
        }
    }

    /// Brackets a drag gesture over shadow controls so bakes flush once at
    /// the end instead of per change.
    pub fn begin_shadow_drag(&mut self) {
        self.compositor.begin_batch();
    }

    pub fn end_shadow_drag(&mut self) {
        self.compositor.end_batch();
    }

    /// Pins the live preview to its current world position.
    pub fn freeze_preview(&mut self) {
        self.mapper.freeze(self.cursor_world);
    }

    pub fn release_preview_freeze(&mut self) {
        self.mapper.release_freeze();
    }

    /// Updates the view transform; a zoom change invalidates every bake.
    pub fn set_view(&mut self, view: ViewTransform) {
        let zoom_changed = self.mapper.view.zoom != view.zoom;
        self.mapper.view = view;
        if zoom_changed {
            self.compositor.note_global_change();
        }
    }

    /// Routes a pointer move into the current mode.
    pub fn pointer_move(&mut self, candidates: &[PointerCandidate]) {
        if self.mode == Mode::Idle {
            return;
        }
        let capture = self.mapper.capture_best_pointer(candidates);
        let world = self.mapper.effective_world(capture.world);
        self.cursor_world = world;
        match self.mode {
            Mode::ScatterPaint | Mode::ScatterEdit if self.painting => {
                let spacing = self.brush.spacing_world();
                let from = self.last_pointer.unwrap_or(world);
                self.last_pointer = Some(world);
                let points = self.spacer.advance(from, world, spacing);
                let kind = self.dab_kind();
                for point in points {
                    self.queue.enqueue(kind, point);
                }
                self.drain_queue();
            }
            Mode::Single | Mode::Random | Mode::EditExisting => {
                self.compositor.mark_dirty(ShadowTarget::SinglePreview);
            }
            _ => {}
        }
    }

    /// Routes a pointer press: places in single/random mode, starts a stroke
    /// in scatter modes.
    pub fn pointer_down(&mut self, candidates: &[PointerCandidate]) -> Result<()> {
        let capture = self.mapper.capture_best_pointer(candidates);
        let world = self.mapper.effective_world(capture.world);
        match self.mode {
            Mode::Single | Mode::Random => {
                self.cursor_world = world;
                self.place_single(world)
            }
            Mode::ScatterPaint | Mode::ScatterEdit => {
                self.cursor_world = world;
                self.painting = true;
                self.spacer.reset();
                self.last_pointer = Some(world);
                self.compositor.begin_batch();
                self.queue.enqueue(self.dab_kind(), world);
                self.drain_queue();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Ends a paint stroke: flushes the queue, ends frame batching, and
    /// records history (paint) or persists the edited object (scatter edit).
    pub fn pointer_up(&mut self) -> Result<()> {
        if !self.painting {
            return Ok(());
        }
        self.painting = false;
        self.last_pointer = None;
        self.drain_queue();
        self.compositor.end_batch();
        match self.mode {
            Mode::ScatterEdit => self.persist_scatter_edit(),
            Mode::ScatterPaint => {
                self.history
                    .record(HistorySnapshot::capture(&self.registry, true), false);
                self.sync_options();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Mutates the object under edit and schedules a debounced save.
    /// `immediate` flushes synchronously instead.
    pub fn edit_field(
        &mut self,
        now_ms: u64,
        immediate: bool,
        change: impl FnOnce(&mut PlacedObject),
    ) -> Result<()> {
        if self.mode != Mode::EditExisting {
            return Err(Error::InvalidConfig("no object under edit".into()));
        }
        let Some(target) = self.edit_target.as_mut() else {
            return Err(Error::InvalidConfig("no object under edit".into()));
        };
        change(target);
        self.edit_dirty = true;
        self.compositor.mark_dirty(ShadowTarget::SinglePreview);
        if immediate {
            self.flush_edit_commit()
        } else {
            self.edit_commit_due = Some(now_ms + self.config.edit_debounce_ms);
            Ok(())
        }
    }

    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo() else {
            return false;
        };
        snapshot.apply(&mut self.registry);
        self.compositor.note_global_change();
        self.sync_options();
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.history.redo() else {
            return false;
        };
        snapshot.apply(&mut self.registry);
        self.compositor.note_global_change();
        self.sync_options();
        true
    }

    /// Explicitly flushes whatever the current mode has pending.
    pub fn commit(&mut self) -> Result<()> {
        match self.mode {
            Mode::ScatterPaint => {
                if !self.registry.is_empty() {
                    self.commit_paint_session()?;
                    self.clear_scatter_state();
                    self.history
                        .reset_with_baseline(HistorySnapshot::capture(&self.registry, true));
                    self.sync_options();
                }
                Ok(())
            }
            Mode::ScatterEdit => self.persist_scatter_edit(),
            Mode::EditExisting => self.flush_edit_commit(),
            _ => Ok(()),
        }
    }

    /// Ends the session.
    ///
    /// With uncommitted merge work: system-driven reasons commit it, a user
    /// request without `force` asks for confirmation, and `force` discards.
    pub fn cancel(&mut self, reason: CancelReason, force: bool) -> Result<CancelOutcome> {
        if self.mode == Mode::Idle {
            return Ok(CancelOutcome::Discarded);
        }
        if self.mode == Mode::EditExisting {
            let flushed = self.edit_dirty;
            if flushed {
                self.flush_edit_commit()?;
            }
            self.finish_to_idle();
            self.sync_options();
            return Ok(if flushed {
                CancelOutcome::Committed
            } else {
                CancelOutcome::Discarded
            });
        }

        let pending = self.registry.total_instances();
        let outcome = if pending > 0 && self.merge_enabled && reason.auto_commits() {
            match self.mode {
                Mode::ScatterEdit => self.persist_scatter_edit()?,
                _ => self.commit_paint_session()?,
            }
            CancelOutcome::Committed
        } else if pending > 0 && !force && !reason.auto_commits() {
            self.ports.notifier.notify(
                NoticeLevel::Warning,
                &format!("{pending} unplaced instance(s) will be lost."),
            );
            return Ok(CancelOutcome::ConfirmationRequired);
        } else {
            CancelOutcome::Discarded
        };
        info!("Placement session ended ({:?}).", reason);
        self.finish_to_idle();
        self.sync_options();
        Ok(outcome)
    }

    /// Full teardown, releasing every session resource.
    pub fn teardown(&mut self) -> Result<CancelOutcome> {
        self.cancel(CancelReason::CanvasTeardown, true)
    }

    /// Reacts to a settings-store change broadcast by the host.
    pub fn handle_setting_changed(&mut self, key: &str, value: &Value) {
        match key {
            SETTING_LAST_ELEVATION => {
                if let Some(elevation) = value.as_f64() {
                    self.last_elevation = elevation as f32;
                }
            }
            SETTING_SHADOW_DEFAULTS => {
                if let Ok(settings) = serde_json::from_value::<ShadowSettings>(value.clone()) {
                    self.shadow_defaults = settings;
                    if self.mode != Mode::EditExisting {
                        self.preview_shadow = settings;
                    }
                    self.compositor.note_global_change();
                }
            }
            _ => debug!("Ignoring unrelated setting '{}'.", key),
        }
    }

    /// Per-frame tick: flushes due edit saves and runs the shadow bake pass.
    pub fn update(&mut self, now_ms: u64) {
        if self.edit_dirty && self.edit_commit_due.is_none() {
            self.edit_commit_due = Some(now_ms + self.config.edit_debounce_ms);
        }
        if let Some(due) = self.edit_commit_due {
            if now_ms >= due {
                if let Err(e) = self.flush_edit_commit() {
                    warn!("Deferred edit save failed: {}.", e);
                }
            }
        }
        let single = self.preview_geometry();
        let zoom = self.mapper.view.zoom;
        self.compositor.on_frame(
            single.as_ref().map(|g| (g, &self.preview_shadow)),
            &self.registry,
            zoom,
        );
    }

    /// Geometry of the live single preview, when one exists.
    pub fn preview_geometry(&self) -> Option<SpriteGeometry> {
        match self.mode {
            Mode::EditExisting => {
                let target = self.edit_target.as_ref()?;
                Some(SpriteGeometry {
                    src: target.texture_src.clone(),
                    center: Vec2::new(target.x, target.y),
                    w: target.width,
                    h: target.height,
                    rotation: target.rotation,
                    flip_h: self.edit_flips.0,
                    flip_v: self.edit_flips.1,
                })
            }
            Mode::Single | Mode::Random => {
                let asset = self.current.as_ref()?;
                let src = self.current_src.clone()?;
                let transform = self.jitter.pending();
                let center = self.snap.apply(self.mapper.effective_world(self.cursor_world));
                let (base_w, base_h) = asset.base_size(self.config.cell_size);
                Some(SpriteGeometry {
                    src,
                    center,
                    w: base_w * transform.scale,
                    h: base_h * transform.scale,
                    rotation: transform.rotation,
                    flip_h: transform.flip_h,
                    flip_v: transform.flip_v,
                })
            }
            _ => None,
        }
    }

    /// Renders the shadow thumbnail for the current shading target.
    pub fn refresh_shadow_thumbnail(&mut self) -> bool {
        let geoms: Vec<SpriteGeometry> = match self.mode {
            Mode::ScatterPaint | Mode::ScatterEdit => {
                let group = self
                    .registry
                    .active_key()
                    .and_then(|key| self.registry.get(key.as_str()));
                let Some(group) = group else {
                    return false;
                };
                group.instances.iter().map(SpriteGeometry::from).collect()
            }
            _ => match self.preview_geometry() {
                Some(geom) => vec![geom],
                None => return false,
            },
        };
        let settings = self.active_shadow();
        let sig = self.thumbnails.request(&geoms, &settings);
        self.thumbnails
            .render(&sig, &geoms, &settings, self.compositor.textures())
    }

    pub fn shadow_thumbnail(&self) -> Option<&ThumbnailImage> {
        self.thumbnails.result()
    }

    fn active_shadow(&self) -> ShadowSettings {
        match self.mode {
            Mode::ScatterPaint | Mode::ScatterEdit => self
                .registry
                .active_key()
                .and_then(|key| self.registry.get(key.as_str()))
                .map(|group| group.shadow)
                .unwrap_or(self.preview_shadow),
            _ => self.preview_shadow,
        }
    }

    fn prepare_start(&mut self) -> Result<()> {
        if self.mode != Mode::Idle {
            self.cancel(CancelReason::SwitchMode, true)?;
        }
        Ok(())
    }

    fn advance_random(&mut self) {
        self.current = self.pool.next(&mut self.rng);
        self.current_src = match &self.current {
            Some(asset) => match self.ports.assets.resolve_local_path(asset) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Late resolution failure for '{}': {}.", asset.source, e);
                    Some(asset.source.clone())
                }
            },
            None => None,
        };
    }

    fn dab_kind(&self) -> DabKind {
        if self.erase_enabled {
            DabKind::Erase
        } else if self.mode == Mode::ScatterEdit {
            DabKind::Tile
        } else {
            DabKind::Preview
        }
    }

    /// Drains the dab queue as the single logical worker. Requests whose mode
    /// has since ended are dropped, not replayed.
    fn drain_queue(&mut self) {
        if !self.queue.try_begin_drain() {
            return;
        }
        while let Some(request) = self.queue.pop() {
            if !matches!(self.mode, Mode::ScatterPaint | Mode::ScatterEdit) {
                continue;
            }
            match request.kind {
                DabKind::Preview | DabKind::Tile => self.apply_paint_dab(request.world),
                DabKind::Erase => self.apply_erase_dab(request.world),
            }
        }
        self.queue.finish_drain();
    }

    fn apply_paint_dab(&mut self, world: Vec2) {
        let elevation = quantize_elevation(self.elevation);
        let key = group_key(elevation);
        // A new band starts from the session override set before the first
        // dab (set_shadow with no active group), which tracks the defaults
        // until the host changes it.
        let shadow = self
            .registry
            .get(&key)
            .map(|group| group.shadow)
            .unwrap_or(self.preview_shadow);
        let existing = self.registry.group_count();
        self.registry.ensure_group(elevation, shadow, self.next_sort);
        if self.registry.group_count() > existing {
            self.next_sort += 1;
        }

        let ctx = DabContext {
            brush: &self.brush,
            snap: self.snap,
            jitter: &self.jitter,
            elevation,
            cell_size: self.config.cell_size,
        };
        let instances = generate_dab(
            &ctx,
            world,
            &mut self.pool,
            self.ports.assets.as_mut(),
            &mut self.next_instance_id,
            &mut self.rng,
        );
        if instances.is_empty() {
            return;
        }
        for instance in instances {
            self.registry.add_instance(instance);
        }
        self.history.mark_dirty();
        self.compositor.mark_dirty(ShadowTarget::Group(key));
    }

    fn apply_erase_dab(&mut self, world: Vec2) {
        let removed = self.registry.erase_within(world, self.brush.radius());
        if removed.is_empty() {
            return;
        }
        self.history.mark_dirty();
        let mut touched: Vec<GroupKey> = removed.into_iter().map(|i| i.group_key).collect();
        touched.sort_unstable();
        touched.dedup();
        for key in touched {
            self.compositor.mark_dirty(ShadowTarget::Group(key));
        }
    }

    fn place_single(&mut self, world: Vec2) -> Result<()> {
        let Some(asset) = self.current.clone() else {
            return Err(Error::InvalidConfig("no active asset".into()));
        };
        let Some(src) = self.current_src.clone() else {
            return Err(Error::InvalidConfig("no resolved texture".into()));
        };
        let transform = self.jitter.pending();
        let center = self.snap.apply(world);
        let (base_w, base_h) = asset.base_size(self.config.cell_size);
        let payload = ScatterPayload::shadow_only(self.preview_shadow)
            .with_flips(transform.flip_h, transform.flip_v);
        let object = PlacedObject {
            id: String::new(),
            texture_src: src,
            x: center.x,
            y: center.y,
            width: base_w * transform.scale,
            height: base_h * transform.scale,
            rotation: transform.rotation,
            elevation: quantize_elevation(self.elevation),
            sort: self.next_sort,
            flags: payload.encode(),
        };
        match self.ports.store.create_objects(vec![object]) {
            Ok(created) => {
                info!(
                    "Placed '{}' as {}.",
                    asset.source,
                    created.first().map(|o| o.id.as_str()).unwrap_or("?")
                );
                self.remember_elevation();
                if self.sticky {
                    if self.mode == Mode::Random {
                        self.advance_random();
                    }
                    self.jitter.begin_placement(&mut self.rng);
                    self.compositor.mark_dirty(ShadowTarget::SinglePreview);
                } else {
                    self.finish_to_idle();
                }
                self.sync_options();
                Ok(())
            }
            Err(e) => {
                // The preview survives so the user can retry.
                self.ports
                    .notifier
                    .notify(NoticeLevel::Error, &format!("Placement failed: {}.", e));
                Err(e)
            }
        }
    }

    /// Writes one merged object per touched elevation band.
    fn commit_paint_session(&mut self) -> Result<()> {
        let mut creates = Vec::new();
        for group in self.registry.groups() {
            let Some(bounds) = compute_bounds(&group.instances) else {
                continue;
            };
            let locals: Vec<FlagInstance> = group
                .instances
                .iter()
                .map(|i| FlagInstance {
                    src: i.src.clone(),
                    x: i.x - bounds.min.x,
                    y: i.y - bounds.min.y,
                    w: i.w,
                    h: i.h,
                    rotation: i.rotation,
                    flip_h: i.flip_h,
                    flip_v: i.flip_v,
                })
                .collect();
            let texture_src = group
                .instances
                .first()
                .map(|i| i.src.clone())
                .unwrap_or_default();
            creates.push(PlacedObject {
                id: String::new(),
                texture_src,
                x: bounds.min.x,
                y: bounds.min.y,
                width: bounds.width(),
                height: bounds.height(),
                rotation: 0.0,
                elevation: group.elevation,
                sort: group.sort,
                flags: ScatterPayload::new(group.shadow, locals).encode(),
            });
        }
        if creates.is_empty() {
            return Ok(());
        }
        match self.ports.store.create_objects(creates) {
            Ok(created) => {
                info!(
                    "Committed {} scatter group(s) with {} instance(s).",
                    created.len(),
                    self.registry.total_instances()
                );
                self.remember_elevation();
                Ok(())
            }
            Err(e) => {
                self.ports
                    .notifier
                    .notify(NoticeLevel::Error, &format!("Commit failed: {}.", e));
                Err(e)
            }
        }
    }

    /// Updates the edited scatter object in place, or deletes it once its
    /// instance list is empty.
    fn persist_scatter_edit(&mut self) -> Result<()> {
        let Some(mut target) = self.scatter_edit_target.clone() else {
            return Err(Error::InvalidConfig("no scatter object under edit".into()));
        };
        let instances = self.registry.snapshot_instances();
        if instances.is_empty() {
            self.ports
                .store
                .delete_objects(std::slice::from_ref(&target.id))?;
            info!("Deleted emptied scatter object {}.", target.id);
            self.finish_to_idle();
            self.sync_options();
            return Ok(());
        }
        let bounds = compute_bounds(&instances)
            .ok_or_else(|| Error::InvalidConfig("degenerate scatter bounds".into()))?;
        let shadow = self
            .registry
            .groups()
            .next()
            .map(|group| group.shadow)
            .unwrap_or(self.shadow_defaults);
        let locals: Vec<FlagInstance> = instances
            .iter()
            .map(|i| FlagInstance {
                src: i.src.clone(),
                x: i.x - bounds.min.x,
                y: i.y - bounds.min.y,
                w: i.w,
                h: i.h,
                rotation: i.rotation,
                flip_h: i.flip_h,
                flip_v: i.flip_v,
            })
            .collect();
        target.texture_src = instances[0].src.clone();
        target.x = bounds.min.x;
        target.y = bounds.min.y;
        target.width = bounds.width();
        target.height = bounds.height();
        ScatterPayload::new(shadow, locals).write_into(&mut target.flags);
        match self.ports.store.update_objects(vec![target.clone()]) {
            Ok(_) => {
                self.scatter_edit_target = Some(target);
                self.sync_options();
                Ok(())
            }
            Err(e) => {
                self.ports
                    .notifier
                    .notify(NoticeLevel::Warning, &format!("Could not save edit: {}.", e));
                Err(e)
            }
        }
    }

    fn flush_edit_commit(&mut self) -> Result<()> {
        self.edit_commit_due = None;
        if !self.edit_dirty {
            return Ok(());
        }
        let Some(target) = self.edit_target.clone() else {
            self.edit_dirty = false;
            return Ok(());
        };
        match self.ports.store.update_objects(vec![target]) {
            Ok(_) => {
                self.edit_dirty = false;
                Ok(())
            }
            Err(e) => {
                // Dirty stays set; the next tick reschedules a retry.
                self.ports
                    .notifier
                    .notify(NoticeLevel::Warning, &format!("Could not save edit: {}.", e));
                Err(e)
            }
        }
    }

    fn remember_elevation(&mut self) {
        self.last_elevation = self.elevation;
        self.ports
            .settings
            .write(SETTING_LAST_ELEVATION, json!(self.elevation));
    }

    fn clear_scatter_state(&mut self) {
        let keys: Vec<GroupKey> = self.registry.groups().map(|g| g.key.clone()).collect();
        for key in keys {
            self.compositor.mark_dirty(ShadowTarget::Group(key));
        }
        self.registry.clear();
        self.history.clear();
        self.queue.clear();
        self.spacer.reset();
        self.painting = false;
    }

    fn finish_to_idle(&mut self) {
        self.clear_scatter_state();
        self.mode = Mode::Idle;
        self.sticky = false;
        self.merge_enabled = false;
        self.erase_enabled = false;
        self.current = None;
        self.current_src = None;
        self.pool = AssetPool::random(Vec::new());
        self.last_pointer = None;
        self.compositor.release();
        self.mapper.release_freeze();
        self.edit_target = None;
        self.edit_flips = (false, false);
        self.edit_dirty = false;
        self.edit_commit_due = None;
        self.scatter_edit_target = None;
        self.suspended_target = None;
        self.preview_shadow = self.shadow_defaults;
    }

    fn hint_text(&self) -> &'static str {
        match self.mode {
            Mode::Idle => "",
            Mode::Single | Mode::Random => "Click to place.",
            Mode::EditExisting => "Changes save automatically.",
            Mode::ScatterPaint | Mode::ScatterEdit => "Drag to paint instances.",
        }
    }

    fn sync_options(&mut self) {
        let state = ToolOptionsState {
            elevation: self.elevation,
            sort: self.next_sort,
            rotation: self.jitter.rotation.base(),
            scale: self.jitter.scale.base(),
            flip_h: self.jitter.flip_h.base(),
            flip_v: self.jitter.flip_v.base(),
            scatter_enabled: matches!(self.mode, Mode::ScatterPaint | Mode::ScatterEdit),
            brush_radius: self.brush.radius(),
            density: self.brush.density(),
            deviation: self.brush.deviation(),
            spacing_percent: self.brush.spacing_percent(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            merge_pending: self.registry.total_instances(),
            hint: self.hint_text().to_owned(),
        };
        self.ports.options_ui.sync(&state);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use mint::Vector2;

    use super::*;
    use crate::host::{
        CollectingNotifier, MemoryAssetSource, MemorySceneStore, MemorySettings,
        RecordingOptionsUi, SceneStore,
    };
    use crate::mapper::PointerSource;

    struct Harness {
        session: PlacementSession,
        store: Rc<RefCell<MemorySceneStore>>,
        assets: Rc<RefCell<MemoryAssetSource>>,
        settings: Rc<RefCell<MemorySettings>>,
        notifier: Rc<RefCell<CollectingNotifier>>,
        options: Rc<RefCell<RecordingOptionsUi>>,
    }

    fn harness(config: SessionConfig) -> Harness {
        let store = Rc::new(RefCell::new(MemorySceneStore::new()));
        let assets = Rc::new(RefCell::new(MemoryAssetSource::new()));
        let settings = Rc::new(RefCell::new(MemorySettings::new()));
        let notifier = Rc::new(RefCell::new(CollectingNotifier::new()));
        let options = Rc::new(RefCell::new(RecordingOptionsUi::new()));
        let ports = HostPorts {
            store: Box::new(store.clone()),
            assets: Box::new(assets.clone()),
            settings: Box::new(settings.clone()),
            notifier: Box::new(notifier.clone()),
            options_ui: Box::new(options.clone()),
        };
        let session = PlacementSession::new(config, ports).expect("valid config");
        Harness {
            session,
            store,
            assets,
            settings,
            notifier,
            options,
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::default().with_seed(7)
    }

    fn pointer(x: f32, y: f32) -> Vec<PointerCandidate> {
        vec![PointerCandidate::new(
            PointerSource::RawEvent,
            Vector2 { x, y },
            true,
        )]
    }

    fn start_scatter(h: &mut Harness) {
        let asset = AssetDescriptor::new("a.png").with_pixel_size(32, 32);
        h.session.start(asset, true).expect("start");
        h.session.set_scatter_mode(true).expect("scatter mode");
    }

    #[test]
    fn single_placement_snaps_and_applies_transform() {
        let mut h = harness(config().with_snap_step(50.0));
        let asset = AssetDescriptor::new("trees/oak.png").with_pixel_size(100, 100);
        h.session.start(asset, false).expect("start");
        h.session.jitter.rotation.set_base(30.0);
        h.session.jitter.scale.set_base(1.5);
        h.session.pointer_move(&pointer(112.0, 87.0));
        h.session.pointer_down(&pointer(112.0, 87.0)).expect("place");

        {
            let store = h.store.borrow();
            assert_eq!(store.len(), 1);
            let object = &store.objects[&store.created_order[0]];
            assert_eq!(object.x, 100.0);
            assert_eq!(object.y, 100.0);
            assert_eq!(object.width, 150.0);
            assert_eq!(object.rotation, 30.0);
        }
        // Non-sticky placement ends the session.
        assert_eq!(h.session.mode(), Mode::Idle);
        assert_eq!(
            h.settings.borrow().values[SETTING_LAST_ELEVATION],
            serde_json::json!(0.0)
        );
    }

    #[test]
    fn sticky_random_placement_keeps_the_session_alive() {
        let mut h = harness(config());
        let pool = vec![AssetDescriptor::new("a.png"), AssetDescriptor::new("b.png")];
        h.session.start_random(pool, true).expect("start");
        h.session.pointer_down(&pointer(10.0, 10.0)).expect("first");
        h.session.pointer_down(&pointer(60.0, 60.0)).expect("second");
        assert_eq!(h.session.mode(), Mode::Random);
        assert_eq!(h.store.borrow().len(), 2);
    }

    #[test]
    fn unresolvable_asset_fails_the_start() {
        let mut h = harness(config());
        h.assets.borrow_mut().failing.push("bad.png".into());
        assert!(h.session.start(AssetDescriptor::new("bad.png"), false).is_err());
        assert_eq!(h.session.mode(), Mode::Idle);
        assert!(!h.notifier.borrow().notices.is_empty());
    }

    #[test]
    fn drag_stroke_gates_dabs_by_spacing() {
        let mut h = harness(config());
        start_scatter(&mut h);
        h.session.set_brush_radius(160.0);
        h.session.set_brush_density(3);
        h.session.set_brush_spacing_percent(25.0);

        h.session.pointer_down(&pointer(0.0, 0.0)).expect("down");
        for i in 1..=5 {
            h.session.pointer_move(&pointer(i as f32 * 100.0, 0.0));
        }
        h.session.pointer_up().expect("up");

        // Spacing is 25% of the 320-unit diameter, so a 500-unit stroke fits
        // six spacing steps after the initial dab: 7 dabs at density 3.
        assert_eq!(h.session.merge_pending(), 21);
        assert!(h.store.borrow().is_empty());
    }

    #[test]
    fn tab_switch_auto_commits_one_object_per_band() {
        let mut h = harness(config());
        start_scatter(&mut h);
        h.session.pointer_down(&pointer(100.0, 100.0)).expect("down");
        h.session.pointer_up().expect("up");
        h.session.set_elevation(2.0);
        h.session.pointer_down(&pointer(400.0, 400.0)).expect("down");
        h.session.pointer_up().expect("up");
        assert_eq!(h.session.registry().group_count(), 2);

        let outcome = h
            .session
            .cancel(CancelReason::TabSwitch, false)
            .expect("cancel");
        assert_eq!(outcome, CancelOutcome::Committed);
        assert_eq!(h.session.mode(), Mode::Idle);

        let store = h.store.borrow();
        assert_eq!(store.len(), 2);
        let first = &store.objects[&store.created_order[0]];
        let payload = ScatterPayload::decode(&first.flags).expect("payload");
        assert_eq!(payload.instances.len(), 3);
        // Stored instances are object-local.
        for local in &payload.instances {
            assert!(local.x >= 0.0 && local.y >= 0.0);
        }
    }

    #[test]
    fn user_cancel_requires_confirmation_then_discards() {
        let mut h = harness(config());
        start_scatter(&mut h);
        h.session.pointer_down(&pointer(50.0, 50.0)).expect("down");
        h.session.pointer_up().expect("up");
        assert!(h.session.merge_pending() > 0);

        let outcome = h
            .session
            .cancel(CancelReason::UserRequest, false)
            .expect("cancel");
        assert_eq!(outcome, CancelOutcome::ConfirmationRequired);
        assert_eq!(h.session.mode(), Mode::ScatterPaint);

        let outcome = h
            .session
            .cancel(CancelReason::UserRequest, true)
            .expect("cancel");
        assert_eq!(outcome, CancelOutcome::Discarded);
        assert!(h.store.borrow().is_empty());
        assert_eq!(h.session.mode(), Mode::Idle);
    }

    #[test]
    fn undo_restores_the_pre_stroke_state() {
        let mut h = harness(config());
        start_scatter(&mut h);
        h.session.pointer_down(&pointer(50.0, 50.0)).expect("down");
        h.session.pointer_up().expect("up");
        assert_eq!(h.session.merge_pending(), 3);

        assert!(h.session.undo());
        assert_eq!(h.session.merge_pending(), 0);
        assert!(h.session.redo());
        assert_eq!(h.session.merge_pending(), 3);
        assert!(!h.session.redo());
    }

    #[test]
    fn erase_dabs_remove_instances_within_the_brush() {
        let mut h = harness(config());
        start_scatter(&mut h);
        h.session.pointer_down(&pointer(100.0, 100.0)).expect("down");
        h.session.pointer_up().expect("up");
        assert_eq!(h.session.merge_pending(), 3);

        h.session.set_erase_enabled(true);
        h.session.pointer_down(&pointer(100.0, 100.0)).expect("erase");
        h.session.pointer_up().expect("up");
        assert_eq!(h.session.merge_pending(), 0);
    }

    #[test]
    fn edit_changes_commit_after_the_debounce_window() {
        let mut h = harness(config());
        let target = h
            .store
            .borrow_mut()
            .create_objects(vec![PlacedObject::new("a.png")])
            .expect("seed object")[0]
            .clone();
        h.session.edit_existing(target).expect("edit");
        assert_eq!(h.session.suspended_target(), Some("obj-1"));

        h.session
            .edit_field(1000, false, |object| object.rotation = 45.0)
            .expect("edit field");
        h.session.update(1100);
        assert_eq!(h.store.borrow().objects["obj-1"].rotation, 0.0);
        h.session.update(1150);
        assert_eq!(h.store.borrow().objects["obj-1"].rotation, 45.0);
    }

    #[test]
    fn immediate_edit_skips_the_debounce() {
        let mut h = harness(config());
        let target = h
            .store
            .borrow_mut()
            .create_objects(vec![PlacedObject::new("a.png")])
            .expect("seed object")[0]
            .clone();
        h.session.edit_existing(target).expect("edit");
        h.session
            .edit_field(0, true, |object| object.elevation = 3.0)
            .expect("edit field");
        assert_eq!(h.store.borrow().objects["obj-1"].elevation, 3.0);
    }

    #[test]
    fn scatter_group_edit_erase_to_empty_deletes_the_object() {
        let mut h = harness(config());
        start_scatter(&mut h);
        h.session.pointer_down(&pointer(100.0, 100.0)).expect("down");
        h.session.pointer_up().expect("up");
        h.session.set_scatter_mode(false).expect("commit");
        let target = {
            let store = h.store.borrow();
            assert_eq!(store.len(), 1);
            store.objects[&store.created_order[0]].clone()
        };

        h.session.edit_scatter_group(target).expect("edit");
        assert_eq!(h.session.mode(), Mode::ScatterEdit);
        assert_eq!(h.session.merge_pending(), 3);

        h.session.set_erase_enabled(true);
        h.session.pointer_down(&pointer(100.0, 100.0)).expect("erase");
        h.session.pointer_up().expect("up");
        assert!(h.store.borrow().is_empty());
        assert_eq!(h.session.mode(), Mode::Idle);
    }

    #[test]
    fn version_mismatched_payload_refuses_scatter_edit() {
        let mut h = harness(config());
        let mut seed = PlacedObject::new("a.png");
        seed.flags = serde_json::json!({
            "spriteScatter": { "version": 99, "shadow": {}, "instances": [] }
        });
        let target = h
            .store
            .borrow_mut()
            .create_objects(vec![seed])
            .expect("seed object")[0]
            .clone();
        assert!(h.session.edit_scatter_group(target).is_err());
        assert_eq!(h.session.mode(), Mode::Idle);
    }

    #[test]
    fn shadow_default_setting_change_applies_globally() {
        let mut h = harness(config());
        let mut settings = ShadowSettings::default();
        settings.set_alpha(0.9);
        let value = serde_json::to_value(settings).expect("serializable");
        h.session.handle_setting_changed(SETTING_SHADOW_DEFAULTS, &value);
        assert_eq!(h.session.shadow_defaults().alpha, 0.9);
    }

    #[test]
    fn shadow_override_before_the_first_stroke_seeds_the_group() {
        let mut h = harness(config());
        start_scatter(&mut h);
        let mut shadow = ShadowSettings::default();
        shadow.set_alpha(0.9);
        shadow.set_blur(11.0);
        h.session.set_shadow(shadow);
        h.session.pointer_down(&pointer(40.0, 40.0)).expect("down");
        h.session.pointer_up().expect("up");

        let group = h
            .session
            .registry
            .get(&group_key(0.0))
            .expect("band created by the stroke");
        assert_eq!(group.shadow.alpha, 0.9);
        assert_eq!(group.shadow.blur, 11.0);
    }

    #[test]
    fn options_panel_reflects_the_merge_session() {
        let mut h = harness(config());
        start_scatter(&mut h);
        h.session.pointer_down(&pointer(10.0, 10.0)).expect("down");
        h.session.pointer_up().expect("up");

        let last = h.options.borrow().last.clone().expect("synced");
        assert!(last.scatter_enabled);
        assert_eq!(last.merge_pending, 3);
        assert!(last.can_undo);
        assert!(!last.can_redo);
    }

    #[test]
    fn selection_elevation_seeds_the_next_placement() {
        let mut h = harness(config());
        h.session.note_selection_elevations(&[1.0, 4.5, 2.0]);
        h.session
            .start(AssetDescriptor::new("a.png"), true)
            .expect("start");
        assert_eq!(h.session.elevation(), 4.5);
    }
}
