//! Negative-evidence induction.
//!
//! An agree-set is a witness against a family of candidates: if two rows
//! agree on exactly the columns of `a`, then no subset of `a` can determine
//! any column outside of `a`. The inductor folds each new agree-set into the
//! candidate tree by removing every candidate it violates and re-inserting
//! the candidate's minimal one-attribute specializations.

use crate::agree_sets::ColumnCombinationList;
use crate::bitset::AttributeSet;
use crate::tree::FdTree;
use tracing::debug;

/// Folds a batch of sampled agree-sets into the candidate tree.
///
/// Levels are processed deepest first: a more specific agree-set invalidates
/// deeper candidates and thereby prunes the work the shallower sets would
/// otherwise redo.
pub fn update_fd_tree(tree: &mut FdTree, non_fds: &ColumnCombinationList) {
    let mut specialized = 0;
    for level in (0..=non_fds.depth()).rev() {
        for agreed in non_fds.level(level) {
            for rhs in agreed.complement().iter() {
                specialized += specialize(tree, agreed, rhs);
            }
        }
    }
    debug!(
        non_fds = non_fds.len(),
        specialized, "folded agree-sets into the candidate tree"
    );
}

/// Removes every candidate `lhs → rhs` with `lhs ⊆ agreed` and inserts its
/// minimal specializations. Returns the number of candidates inserted.
fn specialize(tree: &mut FdTree, agreed: &AttributeSet, rhs: usize) -> usize {
    let mut inserted = 0;
    for violated in tree.get_fd_and_generals(agreed, rhs) {
        tree.remove(&violated, rhs);

        for extension in 0..tree.num_attributes() {
            // Extending within the agree-set would leave the candidate
            // violated by the very same row pair.
            if agreed.test(extension) || extension == rhs || violated.test(extension) {
                continue;
            }
            let specialized = violated.with(extension);
            if !tree.find_fd_or_general(&specialized, rhs) {
                tree.add_fd(&specialized, rhs);
                inserted += 1;
            }
        }
    }
    inserted
}
