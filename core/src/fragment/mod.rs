//! The fragment DAG: the closed, acyclic, parent-pointing tagged-sum type every hyper-kernel's
//! device code is assembled from (spec §3, §4.6).
//!
//! Mirrors the closed-enum-of-node-kinds shape used throughout this crate's ancestry for
//! intermediate-representation graphs: one `Fragment` variant per node kind, each kind's own data
//! and accessors in its own module, and a `FragmentId` that indexes into the owning
//! [`crate::hyperkernel::HyperKernel`]'s arena rather than into a free-standing graph structure —
//! edges only ever point from child to parent (consumer to producer), so the DAG can never cycle
//! by construction.

pub mod input_field;
pub mod output_field;
pub mod translate;
pub mod user_code;
pub mod user_code_output;
pub mod write_type;

use smallvec::SmallVec;

pub use input_field::InputField;
pub use output_field::OutputField;
pub use user_code::UserCode;
pub use user_code_output::UserCodeOutput;

/// Index of a [`Fragment`] within its owning `HyperKernel`'s arena.
pub type FragmentId = usize;

/// One node of the fragment DAG (spec §3's closed tagged sum: `InputField`, `UserCode`,
/// `UserCodeOutput`, `OutputField`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    InputField(InputField),
    UserCode(UserCode),
    UserCodeOutput(UserCodeOutput),
    OutputField(OutputField),
}

impl Fragment {
    /// The parents (producers this fragment reads from) of this fragment, in traversal order.
    /// `InputField` is always a leaf; every other kind has at least one parent.
    pub fn parents(&self) -> SmallVec<[FragmentId; 4]> {
        match self {
            Fragment::InputField(_) => SmallVec::new(),
            Fragment::UserCode(uc) => SmallVec::from_slice(uc.inputs()),
            Fragment::UserCodeOutput(uco) => SmallVec::from_slice(&[uco.parent()]),
            Fragment::OutputField(of) => SmallVec::from_slice(&[of.parent()]),
        }
    }

    pub fn as_input_field(&self) -> Option<&InputField> {
        match self {
            Fragment::InputField(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_user_code(&self) -> Option<&UserCode> {
        match self {
            Fragment::UserCode(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_user_code_output(&self) -> Option<&UserCodeOutput> {
        match self {
            Fragment::UserCodeOutput(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_output_field(&self) -> Option<&OutputField> {
        match self {
            Fragment::OutputField(f) => Some(f),
            _ => None,
        }
    }
}

/// Returns the ids reachable from `roots` in post-order (every parent visited before its child),
/// the order [`crate::hyperkernel::HyperKernel`] emits fragment code in so that a fragment's
/// temporaries are always declared before they are read.
pub fn post_order(fragments: &[Fragment], roots: &[FragmentId]) -> Vec<FragmentId> {
    let mut visited = vec![false; fragments.len()];
    let mut order = Vec::with_capacity(fragments.len());

    fn visit(id: FragmentId, fragments: &[Fragment], visited: &mut [bool], order: &mut Vec<FragmentId>) {
        if visited[id] {
            return;
        }
        visited[id] = true;
        for parent in fragments[id].parents() {
            visit(parent, fragments, visited, order);
        }
        order.push(id);
    }

    for &root in roots {
        visit(root, fragments, &mut visited, &mut order);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ElementType, FieldType, Shape};

    fn scalar_field() -> FieldType {
        FieldType::new(Shape::d2(4, 4), Shape::scalar(), ElementType::Float32)
    }

    #[test]
    fn post_order_visits_parents_before_children() {
        let fragments = vec![
            Fragment::InputField(InputField::new(scalar_field(), 0, (0, 0))),
            Fragment::UserCode(UserCode::new("@out0 = @in0 + 1.0f;".to_string(), vec![0], 1).unwrap()),
            Fragment::UserCodeOutput(UserCodeOutput::new(1, 0, scalar_field())),
            Fragment::OutputField(OutputField::new(
                2,
                scalar_field(),
                0,
                crate::addressing::AddressingMode::SmallTensor,
            )),
        ];
        let order = post_order(&fragments, &[3]);
        assert_eq!(order, vec![0, 1, 2, 3]);
    }
}
