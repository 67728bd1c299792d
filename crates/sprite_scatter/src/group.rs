//! Elevation-keyed preview groups holding live (uncommitted) scatter state.
//!
//! A [`PreviewGroup`] exists per elevation band touched during a session;
//! group keys derive from elevations quantized to two decimal places so keys
//! stay stable under float noise. The [`PreviewGroupRegistry`] owns all
//! groups, tracks the single active group receiving new paint, and provides
//! bounds computation and erase hit-testing.
use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::shadow::ShadowSettings;

pub type GroupKey = String;

/// Quantizes an elevation to two decimal places (group-key stability).
pub fn quantize_elevation(elevation: f32) -> f32 {
    let q = (elevation * 100.0).round() / 100.0;
    // Avoid a distinct "-0.00" band.
    if q == 0.0 {
        0.0
    } else {
        q
    }
}

/// Stable group key for an elevation band.
pub fn group_key(elevation: f32) -> GroupKey {
    format!("{:.2}", quantize_elevation(elevation))
}

/// One stamped sprite placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterInstance {
    pub id: u64,
    /// Resolved texture reference.
    pub src: String,
    /// World-space center.
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    /// Rotation in degrees.
    pub rotation: f32,
    pub flip_h: bool,
    pub flip_v: bool,
    /// Owning elevation band (quantized).
    pub elevation: f32,
    pub group_key: GroupKey,
}

impl ScatterInstance {
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Axis-aligned bounding box in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }
}

/// Bounds of a set of instances via rotated-rectangle corner projection.
///
/// Used for erase-radius context and shadow canvas sizing. Returns `None`
/// for an empty set.
pub fn compute_bounds(instances: &[ScatterInstance]) -> Option<Aabb> {
    let mut min = Vec2::splat(f32::INFINITY);
    let mut max = Vec2::splat(f32::NEG_INFINITY);
    for instance in instances {
        let center = instance.center();
        let half = Vec2::new(instance.w * 0.5, instance.h * 0.5);
        let rad = instance.rotation.to_radians();
        let (sin, cos) = rad.sin_cos();
        for (sx, sy) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let local = Vec2::new(half.x * sx, half.y * sy);
            let corner = center
                + Vec2::new(
                    local.x * cos - local.y * sin,
                    local.x * sin + local.y * cos,
                );
            min = min.min(corner);
            max = max.max(corner);
        }
    }
    if min.x > max.x {
        None
    } else {
        Some(Aabb { min, max })
    }
}

/// Per-group metadata captured into history snapshots and commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMeta {
    pub key: GroupKey,
    pub elevation: f32,
    pub sort: i32,
    pub shadow: ShadowSettings,
}

/// Live preview state for one elevation band.
///
/// The elevation is immutable after creation; the render container handle is
/// an opaque id the host maps to a display object.
#[derive(Debug, Clone)]
pub struct PreviewGroup {
    pub key: GroupKey,
    pub elevation: f32,
    pub sort: i32,
    pub instances: Vec<ScatterInstance>,
    pub shadow: ShadowSettings,
    pub container: u64,
}

impl PreviewGroup {
    pub fn meta(&self) -> GroupMeta {
        GroupMeta {
            key: self.key.clone(),
            elevation: self.elevation,
            sort: self.sort,
            shadow: self.shadow,
        }
    }
}

/// Owner of all live preview groups during a scatter session.
#[derive(Debug, Default)]
pub struct PreviewGroupRegistry {
    groups: BTreeMap<GroupKey, PreviewGroup>,
    active: Option<GroupKey>,
    next_container: u64,
}

impl PreviewGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotently creates the group for an elevation band and marks it
    /// active. New groups get a fresh render container and the supplied sort.
    pub fn ensure_group(
        &mut self,
        elevation: f32,
        shadow: ShadowSettings,
        next_sort: i32,
    ) -> &mut PreviewGroup {
        let elevation = quantize_elevation(elevation);
        let key = group_key(elevation);
        self.active = Some(key.clone());
        if !self.groups.contains_key(&key) {
            self.next_container += 1;
            self.groups.insert(
                key.clone(),
                PreviewGroup {
                    key: key.clone(),
                    elevation,
                    sort: next_sort,
                    instances: Vec::new(),
                    shadow,
                    container: self.next_container,
                },
            );
        }
        self.groups.get_mut(&key).expect("group inserted above")
    }

    pub fn get(&self, key: &str) -> Option<&PreviewGroup> {
        self.groups.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PreviewGroup> {
        self.groups.get_mut(key)
    }

    pub fn active_key(&self) -> Option<&GroupKey> {
        self.active.as_ref()
    }

    pub fn groups(&self) -> impl Iterator<Item = &PreviewGroup> {
        self.groups.values()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn total_instances(&self) -> usize {
        self.groups.values().map(|g| g.instances.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Adds an instance to its owning group. The group must exist; returns
    /// `false` (and drops the instance) otherwise.
    pub fn add_instance(&mut self, instance: ScatterInstance) -> bool {
        match self.groups.get_mut(&instance.group_key) {
            Some(group) => {
                group.instances.push(instance);
                true
            }
            None => false,
        }
    }

    /// Removes an instance by id, dropping its group if it becomes empty.
    pub fn remove_instance(&mut self, id: u64) -> Option<ScatterInstance> {
        let mut removed = None;
        let mut emptied: Option<GroupKey> = None;
        for (key, group) in self.groups.iter_mut() {
            if let Some(pos) = group.instances.iter().position(|i| i.id == id) {
                removed = Some(group.instances.remove(pos));
                if group.instances.is_empty() {
                    emptied = Some(key.clone());
                }
                break;
            }
        }
        if let Some(key) = emptied {
            self.groups.remove(&key);
            if self.active.as_deref() == Some(key.as_str()) {
                self.active = None;
            }
        }
        removed
    }

    /// Removes every instance whose center lies within Euclidean distance
    /// `radius` of `center` (distance equal to the radius is removed).
    /// Returns the removed instances.
    pub fn erase_within(&mut self, center: Vec2, radius: f32) -> Vec<ScatterInstance> {
        let mut hit: Vec<u64> = Vec::new();
        for group in self.groups.values() {
            for instance in &group.instances {
                if instance.center().distance(center) <= radius {
                    hit.push(instance.id);
                }
            }
        }
        hit.iter()
            .filter_map(|id| self.remove_instance(*id))
            .collect()
    }

    /// All instances in group order (deterministic snapshot order).
    pub fn snapshot_instances(&self) -> Vec<ScatterInstance> {
        self.groups
            .values()
            .flat_map(|g| g.instances.iter().cloned())
            .collect()
    }

    /// Metadata for every live group.
    pub fn snapshot_meta(&self) -> Vec<GroupMeta> {
        self.groups.values().map(PreviewGroup::meta).collect()
    }

    /// Full teardown and recreate from snapshot data (undo/redo path).
    /// No incremental reconciliation is attempted.
    pub fn rebuild_all(&mut self, meta: &[GroupMeta], instances: &[ScatterInstance]) {
        self.clear();
        for m in meta {
            self.next_container += 1;
            self.groups.insert(
                m.key.clone(),
                PreviewGroup {
                    key: m.key.clone(),
                    elevation: m.elevation,
                    sort: m.sort,
                    instances: Vec::new(),
                    shadow: m.shadow,
                    container: self.next_container,
                },
            );
        }
        for instance in instances {
            self.add_instance(instance.clone());
        }
        // Drop any group left without instances by the snapshot.
        let empty: Vec<GroupKey> = self
            .groups
            .iter()
            .filter(|(_, g)| g.instances.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        for key in empty {
            self.groups.remove(&key);
        }
    }

    /// Releases every group and its render container.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: u64, x: f32, y: f32, elevation: f32) -> ScatterInstance {
        ScatterInstance {
            id,
            src: "a.png".into(),
            x,
            y,
            w: 10.0,
            h: 10.0,
            rotation: 0.0,
            flip_h: false,
            flip_v: false,
            elevation: quantize_elevation(elevation),
            group_key: group_key(elevation),
        }
    }

    #[test]
    fn quantization_keeps_group_keys_stable() {
        assert_eq!(group_key(1.004), group_key(0.995));
        assert_eq!(group_key(1.004), "1.00");
        assert_eq!(group_key(-0.001), "0.00");
        assert_eq!(quantize_elevation(2.349), 2.35);
    }

    #[test]
    fn ensure_group_is_idempotent_and_marks_active() {
        let mut registry = PreviewGroupRegistry::new();
        let sort = {
            let group = registry.ensure_group(1.0, ShadowSettings::default(), 5);
            group.sort
        };
        assert_eq!(sort, 5);
        // Second ensure keeps the existing sort and container.
        let group = registry.ensure_group(1.0, ShadowSettings::default(), 99);
        assert_eq!(group.sort, 5);
        assert_eq!(registry.group_count(), 1);
        assert_eq!(registry.active_key().map(String::as_str), Some("1.00"));
    }

    #[test]
    fn removing_last_instance_drops_the_group() {
        let mut registry = PreviewGroupRegistry::new();
        registry.ensure_group(0.0, ShadowSettings::default(), 0);
        registry.add_instance(instance(1, 0.0, 0.0, 0.0));
        assert_eq!(registry.total_instances(), 1);

        let removed = registry.remove_instance(1).expect("instance removed");
        assert_eq!(removed.id, 1);
        assert!(registry.is_empty());
        assert!(registry.active_key().is_none());
    }

    #[test]
    fn erase_boundary_distance_is_inclusive() {
        let mut registry = PreviewGroupRegistry::new();
        registry.ensure_group(0.0, ShadowSettings::default(), 0);
        registry.add_instance(instance(1, 50.0, 0.0, 0.0));
        registry.add_instance(instance(2, 50.1, 0.0, 0.0));
        registry.add_instance(instance(3, 0.0, 0.0, 0.0));

        let removed = registry.erase_within(Vec2::ZERO, 50.0);
        let mut ids: Vec<u64> = removed.iter().map(|i| i.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(registry.total_instances(), 1);
    }

    #[test]
    fn bounds_account_for_rotation() {
        let mut i = instance(1, 0.0, 0.0, 0.0);
        i.w = 20.0;
        i.h = 10.0;
        i.rotation = 90.0;
        let bounds = compute_bounds(std::slice::from_ref(&i)).expect("bounds");
        assert!((bounds.width() - 10.0).abs() < 1e-4);
        assert!((bounds.height() - 20.0).abs() < 1e-4);
        assert!(compute_bounds(&[]).is_none());
    }

    #[test]
    fn rebuild_all_recreates_groups_from_snapshot() {
        let mut registry = PreviewGroupRegistry::new();
        registry.ensure_group(0.0, ShadowSettings::default(), 0);
        registry.add_instance(instance(1, 0.0, 0.0, 0.0));
        registry.ensure_group(1.5, ShadowSettings::default(), 1);
        registry.add_instance(instance(2, 5.0, 5.0, 1.5));

        let meta = registry.snapshot_meta();
        let instances = registry.snapshot_instances();

        let mut fresh = PreviewGroupRegistry::new();
        fresh.rebuild_all(&meta, &instances);
        assert_eq!(fresh.group_count(), 2);
        assert_eq!(fresh.total_instances(), 2);
        assert_eq!(fresh.snapshot_instances(), instances);

        // Rebuilding with no instances drops all groups.
        fresh.rebuild_all(&meta, &[]);
        assert!(fresh.is_empty());
    }
}
