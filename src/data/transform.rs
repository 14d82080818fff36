use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Location, rotation and scale of a component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Translation applied last.
    pub location: Vec3,
    /// Rotation applied after scaling.
    pub rotation: Quat,
    /// Per-axis scale applied first.
    pub scale:    Vec3,
}

impl Transform {
    /// The transform that maps every point to itself.
    pub const IDENTITY: Self = Self { location: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE };

    /// An unrotated, unscaled transform at `location`.
    pub fn from_location(location: Vec3) -> Self { Self { location, ..Self::IDENTITY } }

    /// Maps a point from the local space of this transform to its parent space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.location + self.rotation * (self.scale * point)
    }

    /// Maps a point from the parent space of this transform to its local space.
    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        (self.rotation.inverse() * (point - self.location)) / self.scale
    }

    /// Applies `local` inside this transform, yielding the world transform of a child.
    pub fn combine(&self, local: &Transform) -> Transform {
        Transform {
            location: self.transform_point(local.location),
            rotation: (self.rotation * local.rotation).normalize(),
            scale:    self.scale * local.scale,
        }
    }

    /// Expresses this world transform relative to `parent`.
    pub fn relative_to(&self, parent: &Transform) -> Transform {
        Transform {
            location: parent.inverse_transform_point(self.location),
            rotation: (parent.rotation.inverse() * self.rotation).normalize(),
            scale:    self.scale / parent.scale,
        }
    }
}

impl Default for Transform {
    fn default() -> Self { Self::IDENTITY }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// The corner with the smallest coordinates.
    pub min: Vec3,
    /// The corner with the largest coordinates.
    pub max: Vec3,
}

impl Aabb {
    /// Creates a box from two corners.
    pub fn new(min: Vec3, max: Vec3) -> Self { Self { min, max } }

    /// Creates a box centered at `center` extending `half_extents` in each direction.
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self { min: center - half_extents, max: center + half_extents }
    }

    /// Creates a cube centered at the origin.
    pub fn from_radius(radius: f32) -> Self {
        Self::from_center_half_extents(Vec3::ZERO, Vec3::splat(radius))
    }

    /// The center of the box.
    pub fn center(&self) -> Vec3 { (self.min + self.max) * 0.5 }

    /// Half of the size of the box along each axis.
    pub fn half_extents(&self) -> Vec3 { (self.max - self.min) * 0.5 }

    /// The squared distance from the center to a corner.
    pub fn radius_squared(&self) -> f32 { self.half_extents().length_squared() }

    /// Checks whether `point` lies inside the box or on its boundary.
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Checks whether `other` lies entirely inside this box.
    pub fn contains(&self, other: &Aabb) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }

    /// The smallest box containing both boxes.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    /// The eight corners of the box.
    pub fn corners(&self) -> [Vec3; 8] {
        let (min, max) = (self.min, self.max);
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ]
    }

    /// Maps a box in the local space of `transform` to an axis-aligned box in its parent space.
    pub fn transformed(&self, transform: &Transform) -> Aabb {
        let mut corners = self.corners().into_iter().map(|corner| transform.transform_point(corner));
        let first = corners.next().expect("a box has eight corners");
        corners.fold(Aabb { min: first, max: first }, |aabb, corner| Aabb {
            min: aabb.min.min(corner),
            max: aabb.max.max(corner),
        })
    }
}
