//! Octree builders shared by the integration tests and benchmarks.

#![allow(dead_code)]

use sdf_particles::{Aabb, SdfNode, SdfTree, Vec3};

/// Full octree of the given depth over `bounds`. Each leaf samples
/// `surface(leaf_bounds)`.
pub fn full_tree(bounds: Aabb, depth: u32, surface: &dyn Fn(&Aabb) -> Vec3) -> SdfTree {
    let mut nodes = Vec::new();
    build(&mut nodes, bounds, depth, surface);
    SdfTree::from_nodes(nodes).unwrap()
}

fn build(nodes: &mut Vec<SdfNode>, bounds: Aabb, depth: u32, surface: &dyn Fn(&Aabb) -> Vec3) -> u32 {
    let index = nodes.len() as u32;
    if depth == 0 {
        nodes.push(SdfNode::leaf(bounds, surface(&bounds)));
        return index;
    }

    nodes.push(SdfNode::leaf(bounds, bounds.center()));
    let children: Vec<u32> = bounds
        .octants()
        .iter()
        .map(|octant| build(nodes, *octant, depth - 1, surface))
        .collect();
    nodes[index as usize] = SdfNode::branch(bounds, &children);
    index
}

/// Cube `[-half, half]^3` over a horizontal ground plane at `ground_y`.
/// Every leaf samples the plane point straight below (or above) its center.
pub fn ground_tree(half: f32, depth: u32, ground_y: f32) -> SdfTree {
    let bounds = Aabb::new(Vec3::splat(-half), Vec3::splat(half));
    full_tree(bounds, depth, &|leaf| {
        let c = leaf.center();
        Vec3::new(c.x, ground_y, c.z)
    })
}

/// A root with no children: present but carrying no geometry.
pub fn single_node_tree() -> SdfTree {
    let bounds = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
    SdfTree::from_nodes(vec![SdfNode::leaf(bounds, Vec3::ZERO)]).unwrap()
}

/// Variable-depth tree over `[-1, 1]^3`:
///
/// - node 0: root; children in slots 0 and 2, sentinel gap in slot 1
/// - node 1: leaf over `[-1, 0]^3`, sample on its bottom face
/// - node 2: branch over `[0, 1]^3` holding only nodes 3 and 4
/// - node 3: leaf over `[0, 0.5]^3`, sample on its bottom face
/// - node 4: branch over `[0.5, 1]^3` holding only node 5
/// - node 5: leaf over `[0.5, 0.75]^3`, sample on its bottom face
///
/// The rest of the root, node 2 and node 4 is covered by no child.
pub fn unbalanced_tree() -> SdfTree {
    let cube = |lo: f32, hi: f32| Aabb::new(Vec3::splat(lo), Vec3::splat(hi));
    let on_bottom = |b: Aabb| {
        let c = b.center();
        SdfNode::leaf(b, Vec3::new(c.x, b.min.y, c.z))
    };

    let mut root = SdfNode::branch(cube(-1.0, 1.0), &[1]);
    root.children[2] = 2;

    SdfTree::from_nodes(vec![
        root,
        on_bottom(cube(-1.0, 0.0)),
        SdfNode::branch(cube(0.0, 1.0), &[3, 4]),
        on_bottom(cube(0.0, 0.5)),
        SdfNode::branch(cube(0.5, 1.0), &[5]),
        on_bottom(cube(0.5, 0.75)),
    ])
    .unwrap()
}
