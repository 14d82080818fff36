//! Inherited flag maintenance.
//!
//! Both the disable family and the detach family are driven by one transition table.
//! Each family has an explicit bit that only affects the component itself,
//! a cascading bit that also affects all descendants,
//! and an inherited bit that a component carries iff some ancestor has the cascading bit.
//!
//! A component *propagates* a family if it has either the cascading or the inherited bit.
//! Children inherit exactly when their parent propagates,
//! so a walk only continues into a child whose own propagation state changed.

use crate::data::{ComponentFlags, Flags};
use crate::scene_data::Notification;
use crate::{ComponentIdentifier, Scene};

/// One family of flags with cascading semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Family {
    /// Set by a request that only targets the component itself.
    pub(crate) local:     ComponentFlags,
    /// Set by a request that also targets all descendants.
    pub(crate) cascading: ComponentFlags,
    /// Set iff an ancestor has [`cascading`](Self::cascading).
    pub(crate) inherited: ComponentFlags,
}

impl Family {
    pub(crate) const DISABLE: Self = Self {
        local:     ComponentFlags::IS_DISABLED,
        cascading: ComponentFlags::IS_DISABLED_WITH_CHILDREN,
        inherited: ComponentFlags::WAS_DISABLED_BY_PARENT,
    };

    pub(crate) const DETACH: Self = Self {
        local:     ComponentFlags::IS_DETACHED_FROM_TREE,
        cascading: ComponentFlags::IS_DETACHED_FROM_TREE,
        inherited: ComponentFlags::WAS_DETACHED_FROM_OCTREE_BY_PARENT,
    };

    pub(crate) const ALL: [Self; 2] = [Self::DISABLE, Self::DETACH];

    fn state(self, flags: ComponentFlags) -> State {
        match (
            flags.intersects(self.local | self.cascading | self.inherited),
            flags.intersects(self.cascading | self.inherited),
        ) {
            (false, _) => State::Active,
            (true, false) => State::Inactive,
            (true, true) => State::Propagating,
        }
    }

    /// The inherited bit a child of a component with `parent_flags` should carry.
    pub(crate) fn inherited_from(self, parent_flags: ComponentFlags) -> ComponentFlags {
        if self.state(parent_flags) == State::Propagating {
            self.inherited
        } else {
            ComponentFlags::empty()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No bit of the family is set.
    Active,
    /// Only the local bit is set.
    Inactive,
    /// The cascading or inherited bit is set; children inherit.
    Propagating,
}

/// What has to happen after the flags of a component changed within one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transition {
    /// `Some(true)` if the component became active, `Some(false)` if it became inactive.
    effect:    Option<bool>,
    /// `Some(value)` if the inherited bit of every child must become `value`.
    propagate: Option<bool>,
}

fn transition(from: State, to: State) -> Transition {
    use State::*;

    let (effect, propagate) = match (from, to) {
        (Active, Active) | (Inactive, Inactive) | (Propagating, Propagating) => (None, None),
        (Active, Inactive) => (Some(false), None),
        (Active, Propagating) => (Some(false), Some(true)),
        (Inactive, Active) => (Some(true), None),
        (Inactive, Propagating) => (None, Some(true)),
        (Propagating, Active) => (Some(true), Some(false)),
        (Propagating, Inactive) => (None, Some(false)),
    };
    Transition { effect, propagate }
}

/// Atomically rewrites the flags of `id` with `f`, returning the old and new values.
///
/// Returns `None` if `id` has no flags.
pub(crate) fn update_flags(
    scene: &Scene,
    id: ComponentIdentifier,
    f: impl Fn(ComponentFlags) -> ComponentFlags,
) -> Option<(ComponentFlags, ComponentFlags)> {
    let flags = scene.registry().cached::<Flags>().get_component_implementation(id)?;
    let before = flags.0.fetch_update(|flags| Some(f(flags))).expect("closure always returns Some");
    Some((before, f(before)))
}

/// Sets or clears `bits` of `id` and applies the consequences within `family`.
///
/// Returns false if the flags did not change.
pub(crate) fn change(
    scene: &Scene,
    id: ComponentIdentifier,
    family: Family,
    bits: ComponentFlags,
    value: bool,
) -> bool {
    let (before, after) = match update_flags(scene, id, |flags| {
        if value {
            flags | bits
        } else {
            flags - bits
        }
    }) {
        Some(change) => change,
        None => return false,
    };

    if before == after {
        return false;
    }
    apply(scene, id, family, before, after);
    true
}

/// Runs the effects and the child walk for a flag change of `id` from `before` to `after`.
pub(crate) fn apply(
    scene: &Scene,
    id: ComponentIdentifier,
    family: Family,
    before: ComponentFlags,
    after: ComponentFlags,
) {
    let Transition { effect, propagate } = transition(family.state(before), family.state(after));

    if let Some(active) = effect {
        if !after.contains(ComponentFlags::IS_CONSTRUCTING) {
            run_effect(scene, id, family, active, after);
        }
    }

    if let Some(value) = propagate {
        for child in scene.children().snapshot(id) {
            change(scene, child, family, family.inherited, value);
        }
    }
}

fn run_effect(scene: &Scene, id: ComponentIdentifier, family: Family, active: bool, flags: ComponentFlags) {
    if family == Family::DISABLE {
        let notification = if active { Notification::Enable } else { Notification::Disable };
        super::notify_with_data_components(scene, id, notification);
    } else {
        if active {
            if !flags.contains(ComponentFlags::IS_ROOT_SCENE) && super::is_spatial(scene, id) {
                scene.octree().add_component(scene, id);
            }
            let parent = super::parent_of(scene, id);
            super::notify_with_data_components(scene, id, Notification::AttachedToTree { parent });
        } else {
            scene.octree().remove_component(scene, id);
            super::notify_with_data_components(scene, id, Notification::DetachedFromTree);
        }
    }
}
