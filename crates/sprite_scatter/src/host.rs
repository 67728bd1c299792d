//! Host collaborator ports and the data exchanged across the engine boundary.
//!
//! The engine never talks to a concrete scene store, asset downloader,
//! settings backend, or UI panel. Each collaborator is a trait defined here:
//! - [`SceneStore`]: create/update/delete of placed-object records.
//! - [`AssetSource`]: resolving an [`AssetDescriptor`] to a local path.
//! - [`SettingsStore`]: typed key/value settings with fire-and-forget writes.
//! - [`Notifier`]: user-visible notices.
//! - [`OptionsUi`]: declarative tool-options panel sync.
//!
//! Memory-backed implementations of every port ship in this module so hosts
//! can prototype and tests can observe engine behavior.
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{Error, Result};

/// Content tier of an asset, as reported by the content collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssetTier {
    /// Bundled or already-local content.
    #[default]
    Local,
    /// Content that may require a remote fetch before use.
    Remote,
}

/// Closed boundary struct describing one placeable asset.
///
/// Conversion from host-specific catalogue records is the host's job; the
/// engine only consumes this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetDescriptor {
    /// Stable source identifier (also used as the texture reference).
    pub source: String,
    /// Content tier; [`AssetTier::Remote`] sources go through
    /// [`AssetSource::resolve_local_path`] before use.
    pub tier: AssetTier,
    /// Local path, when already known.
    pub path: Option<String>,
    /// Footprint in grid cells, when the asset is grid-sized.
    pub grid_size: Option<(u32, u32)>,
    /// Pixel dimensions of the decoded texture, when known.
    pub pixel_size: Option<(u32, u32)>,
}

impl AssetDescriptor {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            tier: AssetTier::Local,
            path: None,
            grid_size: None,
            pixel_size: None,
        }
    }

    pub fn with_tier(mut self, tier: AssetTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_pixel_size(mut self, width: u32, height: u32) -> Self {
        self.pixel_size = Some((width, height));
        self
    }

    pub fn with_grid_size(mut self, width: u32, height: u32) -> Self {
        self.grid_size = Some((width, height));
        self
    }

    /// Base world size of the asset: pixel size when known, else grid size
    /// scaled by the given cell size, else one cell.
    pub fn base_size(&self, cell_size: f32) -> (f32, f32) {
        if let Some((w, h)) = self.pixel_size {
            (w as f32, h as f32)
        } else if let Some((gw, gh)) = self.grid_size {
            (gw as f32 * cell_size, gh as f32 * cell_size)
        } else {
            (cell_size, cell_size)
        }
    }
}

/// One placed-object record as exchanged with the scene store.
///
/// `flags` is an opaque namespaced JSON payload; the store persists it
/// verbatim and the engine owns its schema (see [`crate::flags`]).
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedObject {
    pub id: String,
    pub texture_src: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
    pub elevation: f32,
    pub sort: i32,
    pub flags: Value,
}

impl PlacedObject {
    pub fn new(texture_src: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            texture_src: texture_src.into(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            rotation: 0.0,
            elevation: 0.0,
            sort: 0,
            flags: Value::Null,
        }
    }
}

/// Persistence collaborator: the host scene/document store.
pub trait SceneStore {
    /// Creates the given objects, returning them with store-assigned ids.
    fn create_objects(&mut self, objects: Vec<PlacedObject>) -> Result<Vec<PlacedObject>>;

    /// Updates existing objects in place, returning the stored records.
    fn update_objects(&mut self, objects: Vec<PlacedObject>) -> Result<Vec<PlacedObject>>;

    /// Deletes the objects with the given ids.
    fn delete_objects(&mut self, ids: &[String]) -> Result<()>;
}

/// Content collaborator: resolves asset descriptors to local paths.
///
/// Resolution may involve a network fetch; implementations must be idempotent
/// once a source is cached.
pub trait AssetSource {
    fn resolve_local_path(&mut self, asset: &AssetDescriptor) -> Result<String>;
}

/// Settings collaborator: typed key/value persistence.
///
/// Writes are fire-and-forget; implementations swallow their own failures.
pub trait SettingsStore {
    fn read(&self, key: &str) -> Option<Value>;
    fn write(&mut self, key: &str, value: Value);
}

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-notification collaborator.
pub trait Notifier {
    fn notify(&mut self, level: NoticeLevel, message: &str);
}

/// Declarative state pushed to the tool-options panel.
///
/// The engine emits this after every mutating operation; the panel renders it
/// and routes its own widget events back into session methods.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolOptionsState {
    pub elevation: f32,
    pub sort: i32,
    pub rotation: f32,
    pub scale: f32,
    pub flip_h: bool,
    pub flip_v: bool,
    pub scatter_enabled: bool,
    pub brush_radius: f32,
    pub density: u32,
    pub deviation: f32,
    pub spacing_percent: f32,
    pub can_undo: bool,
    pub can_redo: bool,
    /// Number of uncommitted scatter instances in the merge session.
    pub merge_pending: usize,
    pub hint: String,
}

/// UI collaborator receiving [`ToolOptionsState`] snapshots.
pub trait OptionsUi {
    fn sync(&mut self, state: &ToolOptionsState);
}

/// The full set of host collaborators a session is constructed with.
pub struct HostPorts {
    pub store: Box<dyn SceneStore>,
    pub assets: Box<dyn AssetSource>,
    pub settings: Box<dyn SettingsStore>,
    pub notifier: Box<dyn Notifier>,
    pub options_ui: Box<dyn OptionsUi>,
}

impl HostPorts {
    /// All-memory ports, useful for prototyping and tests.
    pub fn in_memory() -> Self {
        Self {
            store: Box::new(MemorySceneStore::new()),
            assets: Box::new(MemoryAssetSource::new()),
            settings: Box::new(MemorySettings::new()),
            notifier: Box::new(CollectingNotifier::new()),
            options_ui: Box::new(RecordingOptionsUi::new()),
        }
    }
}

// Shared-handle adapters: a host (or test) can keep a clone of a port after
// handing the other clone to the session.
impl<T: SceneStore> SceneStore for Rc<RefCell<T>> {
    fn create_objects(&mut self, objects: Vec<PlacedObject>) -> Result<Vec<PlacedObject>> {
        self.borrow_mut().create_objects(objects)
    }

    fn update_objects(&mut self, objects: Vec<PlacedObject>) -> Result<Vec<PlacedObject>> {
        self.borrow_mut().update_objects(objects)
    }

    fn delete_objects(&mut self, ids: &[String]) -> Result<()> {
        self.borrow_mut().delete_objects(ids)
    }
}

impl<T: AssetSource> AssetSource for Rc<RefCell<T>> {
    fn resolve_local_path(&mut self, asset: &AssetDescriptor) -> Result<String> {
        self.borrow_mut().resolve_local_path(asset)
    }
}

impl<T: SettingsStore> SettingsStore for Rc<RefCell<T>> {
    fn read(&self, key: &str) -> Option<Value> {
        self.borrow().read(key)
    }

    fn write(&mut self, key: &str, value: Value) {
        self.borrow_mut().write(key, value)
    }
}

impl<T: Notifier> Notifier for Rc<RefCell<T>> {
    fn notify(&mut self, level: NoticeLevel, message: &str) {
        self.borrow_mut().notify(level, message)
    }
}

impl<T: OptionsUi> OptionsUi for Rc<RefCell<T>> {
    fn sync(&mut self, state: &ToolOptionsState) {
        self.borrow_mut().sync(state)
    }
}

/// In-memory [`SceneStore`] assigning sequential ids.
#[derive(Default)]
pub struct MemorySceneStore {
    next_id: u64,
    pub objects: HashMap<String, PlacedObject>,
    /// Ids in creation order, for deterministic inspection.
    pub created_order: Vec<String>,
}

impl MemorySceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl SceneStore for MemorySceneStore {
    fn create_objects(&mut self, objects: Vec<PlacedObject>) -> Result<Vec<PlacedObject>> {
        let mut stored = Vec::with_capacity(objects.len());
        for mut object in objects {
            self.next_id += 1;
            object.id = format!("obj-{}", self.next_id);
            self.created_order.push(object.id.clone());
            self.objects.insert(object.id.clone(), object.clone());
            stored.push(object);
        }
        Ok(stored)
    }

    fn update_objects(&mut self, objects: Vec<PlacedObject>) -> Result<Vec<PlacedObject>> {
        let mut stored = Vec::with_capacity(objects.len());
        for object in objects {
            if !self.objects.contains_key(&object.id) {
                return Err(Error::MissingTarget {
                    id: object.id.clone(),
                });
            }
            self.objects.insert(object.id.clone(), object.clone());
            stored.push(object);
        }
        Ok(stored)
    }

    fn delete_objects(&mut self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.objects.remove(id);
        }
        Ok(())
    }
}

/// In-memory [`AssetSource`]; sources listed in `failing` reject resolution.
#[derive(Default)]
pub struct MemoryAssetSource {
    cache: HashMap<String, String>,
    pub failing: Vec<String>,
    /// Number of resolution calls that went past the cache.
    pub fetches: usize,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssetSource for MemoryAssetSource {
    fn resolve_local_path(&mut self, asset: &AssetDescriptor) -> Result<String> {
        if let Some(path) = self.cache.get(&asset.source) {
            return Ok(path.clone());
        }
        if self.failing.iter().any(|s| s == &asset.source) {
            return Err(Error::AssetResolve {
                src: asset.source.clone(),
                reason: "unavailable".into(),
            });
        }
        self.fetches += 1;
        let path = asset.path.clone().unwrap_or_else(|| asset.source.clone());
        self.cache.insert(asset.source.clone(), path.clone());
        Ok(path)
    }
}

/// In-memory [`SettingsStore`].
#[derive(Default)]
pub struct MemorySettings {
    pub values: HashMap<String, Value>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn read(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn write(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_owned(), value);
    }
}

/// [`Notifier`] that collects notices in a `Vec`.
#[derive(Default)]
pub struct CollectingNotifier {
    pub notices: Vec<(NoticeLevel, String)>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&mut self, level: NoticeLevel, message: &str) {
        self.notices.push((level, message.to_owned()));
    }
}

/// [`OptionsUi`] that keeps the last synced state.
#[derive(Default)]
pub struct RecordingOptionsUi {
    pub last: Option<ToolOptionsState>,
    pub syncs: usize,
}

impl RecordingOptionsUi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OptionsUi for RecordingOptionsUi {
    fn sync(&mut self, state: &ToolOptionsState) {
        self.last = Some(state.clone());
        self.syncs += 1;
    }
}
