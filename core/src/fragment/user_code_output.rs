//! The `UserCodeOutput` fragment: names one output slot of a parent `UserCode` fragment
//! (spec §4.6).
//!
//! `UserCode` fragments are written once and may expose several outputs; every downstream
//! consumer of one of those outputs attaches to a distinct `UserCodeOutput` fragment rather than
//! to the `UserCode` fragment directly; this is what lets the merger re-home individual outputs
//! (spec §4.7) without needing to touch the `UserCode` fragment's own wiring.

use crate::fragment::FragmentId;
use crate::layout::FieldType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserCodeOutput {
    parent: FragmentId,
    output_index: usize,
    field_type: FieldType,
}

impl UserCodeOutput {
    pub fn new(parent: FragmentId, output_index: usize, field_type: FieldType) -> Self {
        Self { parent, output_index, field_type }
    }

    pub fn parent(&self) -> FragmentId {
        self.parent
    }

    pub fn output_index(&self) -> usize {
        self.output_index
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }
}
