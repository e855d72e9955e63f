//! The `OutputField` fragment: a sink that writes a parent fragment's value to one of the
//! kernel's output arguments (spec §4.6).

use crate::addressing::AddressingMode;
use crate::fragment::FragmentId;
use crate::layout::FieldType;

/// A leaf-facing sink fragment. Every kernel output argument has exactly one `OutputField`
/// fragment whose `parent` supplies the value it writes each invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputField {
    parent: FragmentId,
    field_type: FieldType,
    /// Index into the owning [`crate::hyperkernel::HyperKernel`]'s output list; also the `<i>` in
    /// the `_out_field_<i>` argument name this fragment writes to.
    output_index: usize,
    addressing_mode: AddressingMode,
}

impl OutputField {
    pub fn new(
        parent: FragmentId,
        field_type: FieldType,
        output_index: usize,
        addressing_mode: AddressingMode,
    ) -> Self {
        Self { parent, field_type, output_index, addressing_mode }
    }

    pub fn parent(&self) -> FragmentId {
        self.parent
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn output_index(&self) -> usize {
        self.output_index
    }

    pub fn addressing_mode(&self) -> AddressingMode {
        self.addressing_mode
    }

    /// The kernel-argument name this fragment writes to.
    pub fn argument_name(&self) -> String {
        format!("_out_field_{}", self.output_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ElementType, Shape};

    #[test]
    fn argument_name_is_positional() {
        let ft = FieldType::new(Shape::d2(4, 4), Shape::scalar(), ElementType::Float32);
        let output = OutputField::new(0, ft, 3, AddressingMode::SmallTensor);
        assert_eq!(output.argument_name(), "_out_field_3");
    }
}
