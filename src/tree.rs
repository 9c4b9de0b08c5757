//! The prefix tree of candidate functional dependencies.
//!
//! Left-hand sides are paths through the tree, keyed by their attribute
//! indices in ascending order. Each vertex carries two bit sets: `fds`, the
//! right-hand sides for which the path to this vertex is currently believed
//! to be an exact minimal left-hand side, and `attrs`, the union of
//! right-hand sides reachable anywhere in the subtree, which lets lookups
//! skip whole branches.
//!
//! Vertices live in a slab owned by the tree and refer to their children by
//! index, so there is no reference counting and pruning a subtree is just a
//! push onto the free list. The tree has a single writer at any time; the
//! validator's parallel tasks only read it.

use crate::bitset::AttributeSet;
use crate::Fd;

/// Index of a vertex in the tree's slab.
pub type VertexId = u32;

/// The slab index of the root vertex (the empty left-hand side).
pub const ROOT: VertexId = 0;

struct Vertex {
    fds: AttributeSet,
    attrs: AttributeSet,
    /// Empty until the first child is added, then one slot per attribute.
    children: Vec<Option<VertexId>>,
}

impl Vertex {
    fn new(attributes: usize) -> Self {
        Vertex {
            fds: AttributeSet::empty(attributes),
            attrs: AttributeSet::empty(attributes),
            children: Vec::new(),
        }
    }
}

/// Prefix tree over candidate left-hand sides.
///
/// A fresh tree assumes everything: every attribute starts out as a
/// dependency of the empty left-hand side, to be refuted or specialized as
/// evidence arrives.
///
/// ```
/// use fundep::{AttributeSet, FdTree};
///
/// let mut tree = FdTree::new(4);
/// tree.remove(&AttributeSet::empty(4), 3);
///
/// let mut ab = AttributeSet::empty(4);
/// ab.set(0);
/// ab.set(1);
///
/// assert!(tree.add_fd(&ab, 3).is_some());
/// assert!(tree.contains_fd(&ab, 3));
/// // Supersets of a registered left-hand side are found by subset search,
/// // smaller sets are not.
/// assert!(tree.find_fd_or_general(&ab.with(2), 3));
/// assert!(!tree.find_fd_or_general(&AttributeSet::empty(4).with(0), 3));
///
/// tree.remove(&ab, 3);
/// assert!(!tree.contains_fd(&ab, 3));
/// ```
pub struct FdTree {
    vertices: Vec<Vertex>,
    free: Vec<VertexId>,
    attributes: usize,
}

impl FdTree {
    /// Creates a tree over `attributes` columns, with every attribute marked
    /// as a dependency of the empty left-hand side.
    pub fn new(attributes: usize) -> Self {
        let mut root = Vertex::new(attributes);
        root.fds = AttributeSet::full(attributes);
        FdTree {
            vertices: vec![root],
            free: Vec::new(),
            attributes,
        }
    }

    /// The number of columns this tree ranges over.
    pub fn num_attributes(&self) -> usize {
        self.attributes
    }

    fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id as usize]
    }

    fn vertex_mut(&mut self, id: VertexId) -> &mut Vertex {
        &mut self.vertices[id as usize]
    }

    /// The child of `vertex` keyed by `attribute`, if present.
    pub fn child_at(&self, vertex: VertexId, attribute: usize) -> Option<VertexId> {
        let children = &self.vertex(vertex).children;
        if children.is_empty() {
            None
        } else {
            children[attribute]
        }
    }

    /// The right-hand sides currently believed minimal at this vertex.
    pub fn fds_of(&self, vertex: VertexId) -> &AttributeSet {
        &self.vertex(vertex).fds
    }

    /// Returns `true` if `rhs` is marked as a dependency at this vertex.
    pub fn is_fd(&self, vertex: VertexId, rhs: usize) -> bool {
        self.vertex(vertex).fds.test(rhs)
    }

    /// Unsets a single dependency bit, leaving subtree bookkeeping to the
    /// caller's batch. Used by the validator's merge step; queries are only
    /// issued again once the batch is complete.
    pub(crate) fn remove_fd(&mut self, vertex: VertexId, rhs: usize) {
        self.vertex_mut(vertex).fds.clear(rhs);
    }

    fn alloc(&mut self) -> VertexId {
        if let Some(id) = self.free.pop() {
            let attributes = self.attributes;
            *self.vertex_mut(id) = Vertex::new(attributes);
            id
        } else {
            self.vertices.push(Vertex::new(self.attributes));
            (self.vertices.len() - 1) as VertexId
        }
    }

    /// Returns the child keyed by `attribute`, creating it if needed; the
    /// flag reports whether it was created.
    fn add_child(&mut self, parent: VertexId, attribute: usize) -> (VertexId, bool) {
        if self.vertex(parent).children.is_empty() {
            let slots = vec![None; self.attributes];
            self.vertex_mut(parent).children = slots;
        }
        if let Some(existing) = self.vertex(parent).children[attribute] {
            return (existing, false);
        }
        let child = self.alloc();
        self.vertex_mut(parent).children[attribute] = Some(child);
        (child, true)
    }

    /// Registers `lhs → rhs` as a candidate, marking `rhs` reachable along
    /// the whole path. Returns the terminal vertex only if it was newly
    /// created, which tells the validator the candidate is genuinely new.
    pub fn add_fd(&mut self, lhs: &AttributeSet, rhs: usize) -> Option<VertexId> {
        let mut current = ROOT;
        self.vertex_mut(current).attrs.set(rhs);

        let mut bit = lhs.first();
        while let Some(attribute) = bit {
            let next = lhs.next_after(attribute);
            let (child, created) = self.add_child(current, attribute);

            if created && next.is_none() {
                let vertex = self.vertex_mut(child);
                vertex.attrs.set(rhs);
                vertex.fds.set(rhs);
                return Some(child);
            }

            current = child;
            self.vertex_mut(current).attrs.set(rhs);
            bit = next;
        }
        self.vertex_mut(current).fds.set(rhs);
        None
    }

    /// Returns `true` if exactly `lhs → rhs` is registered.
    pub fn contains_fd(&self, lhs: &AttributeSet, rhs: usize) -> bool {
        let mut current = ROOT;
        let mut bit = lhs.first();
        while let Some(attribute) = bit {
            match self.child_at(current, attribute) {
                Some(child) => current = child,
                None => return false,
            }
            bit = lhs.next_after(attribute);
        }
        self.is_fd(current, rhs)
    }

    /// Removes `lhs → rhs`, pruning vertices whose subtree no longer carries
    /// any dependency.
    pub fn remove(&mut self, lhs: &AttributeSet, rhs: usize) {
        self.remove_rec(ROOT, lhs, rhs, lhs.first());
    }

    fn remove_rec(
        &mut self,
        vertex: VertexId,
        lhs: &AttributeSet,
        rhs: usize,
        bit: Option<usize>,
    ) -> bool {
        let attribute = match bit {
            Some(attribute) => attribute,
            None => {
                let terminal = self.vertex_mut(vertex);
                terminal.fds.clear(rhs);
                terminal.attrs.clear(rhs);
                return true;
            }
        };

        if let Some(child) = self.child_at(vertex, attribute) {
            if !self.remove_rec(child, lhs, rhs, lhs.next_after(attribute)) {
                return false;
            }
            if self.vertex(child).attrs.is_empty() {
                self.free_subtree(child);
                self.vertex_mut(vertex).children[attribute] = None;
            }
        }

        if self.is_last_node_of(vertex, rhs) {
            self.vertex_mut(vertex).attrs.clear(rhs);
            return true;
        }
        false
    }

    /// No child of `vertex` still carries `rhs` anywhere below it.
    fn is_last_node_of(&self, vertex: VertexId, rhs: usize) -> bool {
        self.vertex(vertex)
            .children
            .iter()
            .flatten()
            .all(|&child| !self.vertex(child).attrs.test(rhs))
    }

    fn free_subtree(&mut self, vertex: VertexId) {
        let mut stack = vec![vertex];
        while let Some(id) = stack.pop() {
            stack.extend(self.vertex(id).children.iter().flatten().copied());
            self.free.push(id);
        }
    }

    /// Returns `true` if some registered dependency has this `rhs` and a
    /// left-hand side contained in `lhs`.
    pub fn find_fd_or_general(&self, lhs: &AttributeSet, rhs: usize) -> bool {
        self.find_general_rec(ROOT, lhs, rhs, lhs.first())
    }

    fn find_general_rec(
        &self,
        vertex: VertexId,
        lhs: &AttributeSet,
        rhs: usize,
        bit: Option<usize>,
    ) -> bool {
        if self.is_fd(vertex, rhs) {
            return true;
        }
        if self.vertex(vertex).children.is_empty() {
            return false;
        }
        let mut bit = bit;
        while let Some(attribute) = bit {
            if let Some(child) = self.child_at(vertex, attribute) {
                if self.vertex(child).attrs.test(rhs)
                    && self.find_general_rec(child, lhs, rhs, lhs.next_after(attribute))
                {
                    return true;
                }
            }
            bit = lhs.next_after(attribute);
        }
        false
    }

    /// Collects the left-hand sides of every registered dependency with this
    /// `rhs` whose left-hand side is contained in `lhs` (including `lhs`
    /// itself).
    pub fn get_fd_and_generals(&self, lhs: &AttributeSet, rhs: usize) -> Vec<AttributeSet> {
        let mut result = Vec::new();
        let mut current = AttributeSet::empty(self.attributes);
        self.generals_rec(ROOT, lhs, &mut current, rhs, lhs.first(), &mut result);
        result
    }

    fn generals_rec(
        &self,
        vertex: VertexId,
        lhs: &AttributeSet,
        current: &mut AttributeSet,
        rhs: usize,
        bit: Option<usize>,
        result: &mut Vec<AttributeSet>,
    ) {
        if self.is_fd(vertex, rhs) {
            // No vertex below this one can carry the same rhs as a minimal
            // candidate, so the search stops here.
            result.push(current.clone());
            return;
        }
        if self.vertex(vertex).children.is_empty() {
            return;
        }
        let mut bit = bit;
        while let Some(attribute) = bit {
            if let Some(child) = self.child_at(vertex, attribute) {
                if self.vertex(child).attrs.test(rhs) {
                    current.set(attribute);
                    self.generals_rec(child, lhs, current, rhs, lhs.next_after(attribute), result);
                    current.clear(attribute);
                }
            }
            bit = lhs.next_after(attribute);
        }
    }

    /// Collects every vertex whose path has exactly `level` attributes and
    /// which still carries at least one dependency.
    pub fn get_level(&self, level: usize) -> Vec<(VertexId, AttributeSet)> {
        let mut result = Vec::new();
        let mut lhs = AttributeSet::empty(self.attributes);
        self.level_rec(ROOT, level, 0, &mut lhs, &mut result);
        result
    }

    fn level_rec(
        &self,
        vertex: VertexId,
        target: usize,
        depth: usize,
        lhs: &mut AttributeSet,
        result: &mut Vec<(VertexId, AttributeSet)>,
    ) {
        if depth == target {
            if !self.vertex(vertex).fds.is_empty() {
                result.push((vertex, lhs.clone()));
            }
            return;
        }
        if self.vertex(vertex).children.is_empty() {
            return;
        }
        // Path attributes ascend, so a vertex at this depth cannot have a
        // child keyed below it.
        for attribute in depth..self.attributes {
            if let Some(child) = self.child_at(vertex, attribute) {
                lhs.set(attribute);
                self.level_rec(child, target, depth + 1, lhs, result);
                lhs.clear(attribute);
            }
        }
    }

    /// Dumps every registered dependency.
    pub fn fill_fds(&self) -> Vec<Fd> {
        let mut result = Vec::new();
        let mut lhs = AttributeSet::empty(self.attributes);
        self.fill_rec(ROOT, &mut lhs, &mut result);
        result
    }

    fn fill_rec(&self, vertex: VertexId, lhs: &mut AttributeSet, result: &mut Vec<Fd>) {
        for rhs in self.vertex(vertex).fds.iter() {
            result.push(Fd {
                lhs: lhs.clone(),
                rhs,
            });
        }
        if self.vertex(vertex).children.is_empty() {
            return;
        }
        for attribute in 0..self.attributes {
            if let Some(child) = self.child_at(vertex, attribute) {
                lhs.set(attribute);
                self.fill_rec(child, lhs, result);
                lhs.clear(attribute);
            }
        }
    }
}
