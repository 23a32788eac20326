use rustc_hash::FxHashMap;

use crate::constants::physics::BVH_FAT_MARGIN;
use crate::physics::broadphase::{finish_pairs, ordered, Broadphase, BroadphaseStats, Proxy};
use crate::physics::{Aabb, ShapeHandle};

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Leaf(ShapeHandle),
    Branch(usize, usize),
}

#[derive(Debug, Clone, Copy)]
struct Node {
    /// Leaves store fattened bounds so small moves skip reinsertion
    bounds: Aabb,
    parent: Option<usize>,
    kind: NodeKind,
}

/// Incrementally built AABB tree
pub struct DynamicBvh {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: Option<usize>,
    leaves: FxHashMap<ShapeHandle, (usize, Proxy)>,
}

impl DynamicBvh {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            leaves: FxHashMap::default(),
        }
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if let NodeKind::Branch(l, r) = self.nodes[parent].kind {
            self.nodes[parent].kind = if l == old {
                NodeKind::Branch(new, r)
            } else {
                NodeKind::Branch(l, new)
            };
        }
    }

    fn refit(&mut self, mut at: Option<usize>) {
        while let Some(index) = at {
            if let NodeKind::Branch(l, r) = self.nodes[index].kind {
                self.nodes[index].bounds = self.nodes[l].bounds.union(&self.nodes[r].bounds);
            }
            at = self.nodes[index].parent;
        }
    }

    fn insert_leaf(&mut self, leaf: usize) {
        let Some(root) = self.root else {
            self.nodes[leaf].parent = None;
            self.root = Some(leaf);
            return;
        };

        // Descend towards the child whose bounds grow least
        let fat = self.nodes[leaf].bounds;
        let mut index = root;
        while let NodeKind::Branch(l, r) = self.nodes[index].kind {
            let growth = |n: &Node| n.bounds.union(&fat).half_area() - n.bounds.half_area();
            index = if growth(&self.nodes[l]) <= growth(&self.nodes[r]) { l } else { r };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling].parent;
        let branch = self.alloc(Node {
            bounds: self.nodes[sibling].bounds.union(&fat),
            parent: old_parent,
            kind: NodeKind::Branch(sibling, leaf),
        });
        self.nodes[sibling].parent = Some(branch);
        self.nodes[leaf].parent = Some(branch);
        match old_parent {
            None => self.root = Some(branch),
            Some(p) => self.replace_child(p, sibling, branch),
        }
        self.refit(old_parent);
    }

    fn detach_leaf(&mut self, leaf: usize) {
        if self.root == Some(leaf) {
            self.root = None;
            return;
        }
        let Some(parent) = self.nodes[leaf].parent else {
            return;
        };
        let sibling = match self.nodes[parent].kind {
            NodeKind::Branch(l, r) if l == leaf => r,
            NodeKind::Branch(l, _) => l,
            NodeKind::Leaf(_) => return,
        };
        let grand = self.nodes[parent].parent;
        self.nodes[sibling].parent = grand;
        match grand {
            None => self.root = Some(sibling),
            Some(g) => {
                self.replace_child(g, parent, sibling);
                self.refit(Some(g));
            }
        }
        self.free.push(parent);
    }

    fn visit(&self, bounds: &Aabb, mut f: impl FnMut(&Proxy)) {
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.bounds.intersects(bounds) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf(handle) => {
                    if let Some((_, proxy)) = self.leaves.get(&handle) {
                        f(proxy);
                    }
                }
                NodeKind::Branch(l, r) => {
                    stack.push(l);
                    stack.push(r);
                }
            }
        }
    }
}

impl Default for DynamicBvh {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadphase for DynamicBvh {
    fn name(&self) -> &'static str {
        "dynamic_bvh"
    }

    fn insert(&mut self, proxy: Proxy) {
        self.remove(proxy.handle);
        let leaf = self.alloc(Node {
            bounds: proxy.bounds.expanded(BVH_FAT_MARGIN),
            parent: None,
            kind: NodeKind::Leaf(proxy.handle),
        });
        self.insert_leaf(leaf);
        self.leaves.insert(proxy.handle, (leaf, proxy));
    }

    fn update(&mut self, handle: ShapeHandle, bounds: Aabb) {
        let Some((leaf, proxy)) = self.leaves.get_mut(&handle) else {
            return;
        };
        proxy.bounds = bounds;
        let leaf = *leaf;
        if self.nodes[leaf].bounds.contains(&bounds) {
            return;
        }
        self.detach_leaf(leaf);
        self.nodes[leaf].bounds = bounds.expanded(BVH_FAT_MARGIN);
        self.insert_leaf(leaf);
    }

    fn remove(&mut self, handle: ShapeHandle) {
        if let Some((leaf, _)) = self.leaves.remove(&handle) {
            self.detach_leaf(leaf);
            self.free.push(leaf);
        }
    }

    fn query(&self, bounds: &Aabb, mask: u32) -> Vec<ShapeHandle> {
        let mut found = Vec::new();
        self.visit(bounds, |p| {
            if p.layers & mask != 0 && p.bounds.intersects(bounds) {
                found.push(p.handle);
            }
        });
        found
    }

    fn pairs(&self) -> Vec<(ShapeHandle, ShapeHandle)> {
        let mut pairs = Vec::new();
        for (_, proxy) in self.leaves.values() {
            self.visit(&proxy.bounds, |other| {
                if proxy.handle < other.handle && proxy.admits(other) {
                    pairs.push(ordered(proxy.handle, other.handle));
                }
            });
        }
        finish_pairs(pairs)
    }

    fn len(&self) -> usize {
        self.leaves.len()
    }

    fn stats(&self) -> BroadphaseStats {
        BroadphaseStats {
            proxies: self.leaves.len(),
            buckets: self.nodes.len() - self.free.len(),
            max_per_bucket: 1,
        }
    }
}
