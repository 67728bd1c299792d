#![forbid(unsafe_code)]
//! sprite_scatter: Interactive sprite placement and scatter painting over host-provided ports.
//!
//! Modules:
//! - session: the placement state machine (single, random, edit, scatter paint/edit)
//! - sampler: spray deviation, stroke spacing, grid snap, and the dab queue
//! - jitter: randomized rotation/scale/flip transforms with hold semantics
//! - group: elevation-banded preview groups and bounds
//! - shadow: signature-cached drop-shadow baking, compositing, and thumbnails
//! - history: bounded snapshot undo/redo
//! - flags: the versioned payload persisted on placed objects
//! - host: the collaborator ports (scene store, assets, settings, notices, options UI)
//! - mapper: screen/world mapping and pointer capture
//!
//! For examples and docs, see README and docs.rs.
pub mod error;
pub mod flags;
pub mod group;
pub mod history;
pub mod host;
pub mod jitter;
pub mod mapper;
pub mod sampler;
pub mod session;
pub mod shadow;

/// Convenient re-exports for common types. Import with `use sprite_scatter::prelude::*;`.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::flags::{FlagInstance, ScatterPayload, FLAGS_NAMESPACE, PAYLOAD_VERSION};
    pub use crate::group::{
        compute_bounds, group_key, quantize_elevation, Aabb, GroupKey, GroupMeta, PreviewGroup,
        PreviewGroupRegistry, ScatterInstance,
    };
    pub use crate::history::{HistorySnapshot, ScatterHistory, HISTORY_CAP};
    pub use crate::host::{
        AssetDescriptor, AssetSource, AssetTier, HostPorts, NoticeLevel, Notifier, OptionsUi,
        PlacedObject, SceneStore, SettingsStore, ToolOptionsState,
    };
    pub use crate::jitter::{
        InstanceTransform, JitterAxis, JitterKernel, TransformJitter, SCALE_MAX, SCALE_MIN,
    };
    pub use crate::mapper::{
        CoordinateMapper, PointerCandidate, PointerCapture, PointerSource, ViewTransform,
    };
    pub use crate::sampler::{
        sample_spray_offset, AssetPool, DabKind, DabQueue, DabRequest, GridSnap, ScatterBrush,
        StrokeSpacer,
    };
    pub use crate::session::{
        CancelOutcome, CancelReason, Mode, PlacementSession, SessionConfig,
        SETTING_LAST_ELEVATION, SETTING_SHADOW_DEFAULTS,
    };
    pub use crate::shadow::{
        bake_group, bake_single, ShadowBake, ShadowCompositor, ShadowSettings, ShadowSurface,
        ShadowTarget, SpriteGeometry, SpriteTexture, TextureCache, ThumbnailBaker, ThumbnailImage,
    };
}
