//! A scene registry for game engines.
//!
//! A [`Scene`] stores a tree of *hierarchy components*,
//! each of which owns a set of small *data components*.
//! Every component is addressed by a [`ComponentIdentifier`],
//! a generation-salted index that never aliases a component created later at the same index.
//!
//! # Storage
//! All instances of a component type live in one dense table
//! ([`ComponentTypeSceneData`](scene_data::ComponentTypeSceneData)) indexed by identifier.
//! The data component types used by the engine itself are *cached*:
//! their tables are fields of the [`SceneRegistry`](registry::SceneRegistry)
//! and are resolved without any lookup.
//! All other types are *cold* and created lazily on first use.
//!
//! Each component also carries two type masks over its data components:
//! the *reserved* mask claims a type before its value is constructed,
//! and the *live* mask publishes it afterwards.
//! Readers only trust the live mask,
//! so a data component is never observed half-constructed or half-destroyed.
//!
//! # Hierarchy
//! Hierarchy components are created with [`Scene::spawn`]
//! and manipulated through [`HierarchyComponent`](hierarchy::HierarchyComponent) handles.
//! Disabling and detaching from the spatial tree cascade to descendants,
//! and destruction always runs in the same order:
//! disable, detach, unparent, destroy children, then release the identifier.
//!
//! # Octree
//! Components with a world transform are indexed by a dynamic octree
//! ([`RootSceneComponent`](octree::RootSceneComponent)).
//! Nodes are allocated from a fixed pool and split only while the component
//! is small relative to the node.
//! Empty nodes are destroyed by a frame graph stage at the end of each frame.
//!
//! # Frame graph
//! Each frame executes a DAG of stages anchored at fixed points
//! ([`Anchor`](frame_graph::Anchor)).
//! Component update stages and custom stages are added at runtime
//! through a command buffer that is flushed at the start of the next frame,
//! so the graph never changes while a frame runs.

#![cfg_attr(not(debug_assertions), deny(missing_docs))]
#![cfg_attr(doc, warn(missing_docs))]

pub mod component;
pub use component::Component;

pub mod config;
pub use config::SceneConfig;

pub mod data;

pub mod error;
pub use error::{Error, Result};

pub mod frame_graph;

pub mod hierarchy;
pub use hierarchy::{HierarchyComponent, Spawn};

pub mod identifier;
pub use identifier::ComponentIdentifier;

pub mod mask;

pub mod octree;

pub mod registry;

mod scene;
pub use scene::Scene;

pub mod scene_data;

mod serialize;

pub mod storage;

pub mod tracer;
pub use tracer::Tracer;

pub mod util;

#[cfg(any(test, feature = "internal-bench"))]
pub mod test_util;

static_assertions::assert_impl_all!(Scene: Send, Sync);
static_assertions::assert_impl_all!(registry::SceneRegistry: Send, Sync);
static_assertions::assert_impl_all!(component::ComponentTypeRegistry: Send, Sync);
static_assertions::assert_impl_all!(octree::RootSceneComponent: Send, Sync);
