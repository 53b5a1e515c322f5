//! Octree of precomputed closest-surface samples used for collision.
//!
//! The index is built offline from scene geometry and handed to the
//! simulation as a flat array of [`SdfNode`]s. Children are referenced by
//! index into the same array, never by owning reference, so the exact same
//! bytes can be bound as a read-only GPU storage buffer.
//!
//! # Layout rules
//!
//! - Node 0 is the root; its box bounds the whole simulated volume.
//! - A node is a leaf iff `children[0] == NO_CHILD`.
//! - Unused child slots carry [`NO_CHILD`]. Gaps between live slots are
//!   allowed, but a leaf has no live slots at all.
//! - Every child box lies inside its parent box.
//!
//! # Traversal
//!
//! [`SdfTree::locate`] walks exactly one root-to-leaf path. At each level it
//! takes the first child whose box strictly contains the point and never
//! backtracks into siblings. Boundary points count as outside, which fixes
//! the tie-break between neighbouring cells.

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::error::SdfError;

/// Child-slot sentinel: "no child here" / "this node is a leaf".
pub const NO_CHILD: i32 = -1;

/// Size of one node in the uploaded buffer.
pub const NODE_STRIDE: usize = std::mem::size_of::<SdfNode>();

/// Axis-aligned bounding box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box from a center point and half extents.
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Strict containment: a point on any face is outside.
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpgt(self.min).all() && point.cmplt(self.max).all()
    }

    /// Non-strict containment of another box.
    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// The eight octants of this box, in `x + 2y + 4z` order.
    pub fn octants(&self) -> [Aabb; 8] {
        let center = self.center();
        std::array::from_fn(|i| {
            let pick = |bit: usize, lo: f32, mid: f32, hi: f32| {
                if i & bit == 0 {
                    (lo, mid)
                } else {
                    (mid, hi)
                }
            };
            let (x0, x1) = pick(1, self.min.x, center.x, self.max.x);
            let (y0, y1) = pick(2, self.min.y, center.y, self.max.y);
            let (z0, z1) = pick(4, self.min.z, center.z, self.max.z);
            Aabb::new(Vec3::new(x0, y0, z0), Vec3::new(x1, y1, z1))
        })
    }

    fn is_inverted(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }
}

/// One node of the flattened octree, laid out for GPU upload.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SdfNode {
    pub min: Vec3,
    _pad0: u32,
    pub max: Vec3,
    _pad1: u32,
    /// Approximate closest surface point; meaningful at leaves only.
    pub point: Vec3,
    _pad2: u32,
    pub children: [i32; 8],
}

impl SdfNode {
    /// A leaf carrying a surface sample.
    pub fn leaf(bounds: Aabb, point: Vec3) -> Self {
        Self {
            min: bounds.min,
            _pad0: 0,
            max: bounds.max,
            _pad1: 0,
            point,
            _pad2: 0,
            children: [NO_CHILD; 8],
        }
    }

    /// An interior node. At most eight children are kept; the rest of the
    /// slots are filled with [`NO_CHILD`].
    pub fn branch(bounds: Aabb, children: &[u32]) -> Self {
        let mut node = Self::leaf(bounds, bounds.center());
        for (slot, &child) in node.children.iter_mut().zip(children) {
            *slot = child as i32;
        }
        node
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::new(self.min, self.max)
    }

    pub fn is_leaf(&self) -> bool {
        self.children[0] == NO_CHILD
    }

    /// Live child indices, skipping sentinel slots.
    pub fn child_indices(&self) -> impl Iterator<Item = i32> + '_ {
        self.children.iter().copied().filter(|&c| c != NO_CHILD)
    }

    /// Approximate surface normal: from the box center toward the surface sample.
    ///
    /// Returns `None` when the sample sits on the center.
    pub fn surface_normal(&self) -> Option<Vec3> {
        (self.point - self.bounds().center()).try_normalize()
    }
}

/// Result of a [`SdfTree::locate`] query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Located {
    /// The point is not strictly inside the root box.
    Outside,
    /// Best-effort node index. Usually a leaf; re-validate with
    /// [`Located::leaf`] before reading surface data.
    Node(u32),
}

impl Located {
    pub fn is_outside(&self) -> bool {
        matches!(self, Located::Outside)
    }

    /// The node index, but only if it really is a leaf of `tree`.
    pub fn leaf(self, tree: &SdfTree) -> Option<u32> {
        match self {
            Located::Node(index) => tree
                .node(index)
                .filter(|node| node.is_leaf())
                .map(|_| index),
            Located::Outside => None,
        }
    }
}

/// Read-only spatial index of surface samples.
#[derive(Clone, Debug, Default)]
pub struct SdfTree {
    nodes: Vec<SdfNode>,
    depth: u32,
}

impl SdfTree {
    /// A tree with no collision geometry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate a node array and wrap it.
    pub fn from_nodes(nodes: Vec<SdfNode>) -> Result<Self, SdfError> {
        let depth = validate(&nodes)?;
        Ok(Self { nodes, depth })
    }

    /// Parse a native-endian node buffer (the GPU upload format).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SdfError> {
        if bytes.len() % NODE_STRIDE != 0 {
            return Err(SdfError::ByteLength {
                len: bytes.len(),
                stride: NODE_STRIDE,
            });
        }
        let nodes = bytes
            .chunks_exact(NODE_STRIDE)
            .map(bytemuck::pod_read_unaligned::<SdfNode>)
            .collect();
        Self::from_nodes(nodes)
    }

    /// Load a node buffer from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SdfError> {
        let bytes = std::fs::read(path.as_ref())?;
        let tree = Self::from_bytes(&bytes)?;
        log::info!(
            "Loaded SDF tree from {}: {} nodes, depth {}",
            path.as_ref().display(),
            tree.len(),
            tree.depth()
        );
        Ok(tree)
    }

    /// Raw bytes for upload or storage.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.nodes)
    }

    /// Number of nodes (`Octree_Size`).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Longest root-to-leaf edge count (`Octree_Depth`).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Trees with at most one node carry no usable geometry.
    pub fn has_geometry(&self) -> bool {
        self.nodes.len() > 1
    }

    pub fn nodes(&self) -> &[SdfNode] {
        &self.nodes
    }

    pub fn node(&self, index: u32) -> Option<&SdfNode> {
        self.nodes.get(index as usize)
    }

    pub fn root(&self) -> Option<&SdfNode> {
        self.nodes.first()
    }

    /// Floor plane height: half the root's vertical extent below zero.
    pub fn floor_height(&self) -> Option<f32> {
        self.root().map(|root| 0.0 - (root.max.y - root.min.y) * 0.5)
    }

    /// Find the leaf whose box contains `point`.
    ///
    /// Descends at most `depth` levels. If no child at some level contains
    /// the point (floating-point ties on shared faces), the deepest node
    /// known to contain it is returned, which may not be a leaf.
    pub fn locate(&self, point: Vec3) -> Located {
        let Some(root) = self.root() else {
            return Located::Outside;
        };
        if !root.bounds().contains_point(point) {
            return Located::Outside;
        }

        let mut current = 0usize;
        for _ in 0..self.depth {
            let next = self.nodes[current]
                .child_indices()
                .map(|child| child as usize)
                .find(|&child| self.nodes[child].bounds().contains_point(point));

            match next {
                Some(child) if self.nodes[child].is_leaf() => return Located::Node(child as u32),
                Some(child) => current = child,
                None => break,
            }
        }
        Located::Node(current as u32)
    }
}

/// Check structure and compute depth.
fn validate(nodes: &[SdfNode]) -> Result<u32, SdfError> {
    let len = nodes.len();

    for (index, node) in nodes.iter().enumerate() {
        if node.bounds().is_inverted() {
            return Err(SdfError::InvertedBounds { node: index });
        }
        for (slot, &child) in node.children.iter().enumerate() {
            if child == NO_CHILD {
                continue;
            }
            if node.is_leaf() {
                return Err(SdfError::ChildOfLeaf { node: index, slot });
            }
            if child < 0 || child as usize >= len {
                return Err(SdfError::ChildOutOfRange {
                    node: index,
                    slot,
                    child,
                });
            }
            if !node.bounds().contains_aabb(&nodes[child as usize].bounds()) {
                return Err(SdfError::ChildNotContained {
                    node: index,
                    child: child as usize,
                });
            }
        }
    }

    if nodes.is_empty() {
        return Ok(0);
    }

    // Every reachable node must have exactly one parent.
    let mut visited = vec![false; len];
    let mut stack = vec![(0usize, 0u32)];
    let mut depth = 0;
    while let Some((index, level)) = stack.pop() {
        if std::mem::replace(&mut visited[index], true) {
            return Err(SdfError::NotATree { node: index });
        }
        depth = depth.max(level);
        stack.extend(
            nodes[index]
                .child_indices()
                .map(|child| (child as usize, level + 1)),
        );
    }
    Ok(depth)
}

/// WGSL struct and traversal matching [`SdfNode`] and [`SdfTree::locate`].
///
/// Expects `nodes: array<SdfNode>` and `params.octree_depth` in scope.
pub const SDF_WGSL: &str = r#"
const NO_CHILD: i32 = -1;
const OUTSIDE: i32 = -1;

struct SdfNode {
    bounds_min: vec3<f32>,
    _pad0: u32,
    bounds_max: vec3<f32>,
    _pad1: u32,
    point: vec3<f32>,
    _pad2: u32,
    children: array<i32, 8>,
};

// Strict containment: points on a face are outside
fn aabb_contains(lo: vec3<f32>, hi: vec3<f32>, p: vec3<f32>) -> bool {
    return all(p > lo) && all(p < hi);
}

fn is_leaf(index: u32) -> bool {
    return nodes[index].children[0] == NO_CHILD;
}

// Depth-first, early-exit descent. Returns OUTSIDE or a best-effort node index.
fn locate(p: vec3<f32>) -> i32 {
    if !aabb_contains(nodes[0].bounds_min, nodes[0].bounds_max, p) {
        return OUTSIDE;
    }

    var current = 0u;
    for (var level = 0u; level < params.octree_depth; level++) {
        var next = NO_CHILD;
        for (var slot = 0u; slot < 8u; slot++) {
            let child = nodes[current].children[slot];
            if child == NO_CHILD {
                continue;
            }
            if aabb_contains(nodes[child].bounds_min, nodes[child].bounds_max, p) {
                next = child;
                break;
            }
        }

        if next == NO_CHILD {
            break;
        }
        if is_leaf(u32(next)) {
            return next;
        }
        current = u32(next);
    }
    return i32(current);
}
"#;
