//! The `InputField` fragment: a leaf that reads one of the kernel's bound input fields
//! (spec §4.6).
//!
//! A `UserCode` fragment may read from any number of parent fragments (via `@in<i>` tokens) and
//! may produce any number of outputs (via `@out<i>` tokens), each picked up downstream by a
//! [`super::user_code_output::UserCodeOutput`] fragment. Its own write types are inferred once,
//! at construction, by scanning its source text.

use crate::layout::FieldType;

/// Identifies the [`crate::register::VirtualFieldRegister`] (spec's `<source kernel, source
/// output index>` pair) an `InputField` slot is bound to. This is the dedup *identity* spec
/// §4.7 step 1 means by "preserving insertion order and identity uniqueness" when unioning two
/// kernels' input lists: two `InputField`s with identical `FieldType` but different producers
/// (e.g. two distinct external buffers of the same shape) are never the same input, and must
/// never collapse onto one kernel argument.
pub type RegisterId = (usize, usize);

/// A leaf fragment binding one kernel input argument. Has no parents in the fragment DAG; every
/// other fragment kind's reads eventually bottom out at one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputField {
    field_type: FieldType,
    /// Index into the owning [`crate::hyperkernel::HyperKernel`]'s input list; also the `<i>` in
    /// the `_in_field_<i>` argument name this fragment is bound to.
    input_index: usize,
    /// The virtual field register this slot reads from; see [`RegisterId`].
    register_id: RegisterId,
}

impl InputField {
    pub fn new(field_type: FieldType, input_index: usize, register_id: RegisterId) -> Self {
        Self { field_type, input_index, register_id }
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn input_index(&self) -> usize {
        self.input_index
    }

    pub fn register_id(&self) -> RegisterId {
        self.register_id
    }

    /// The kernel-argument name this fragment reads from.
    pub fn argument_name(&self) -> String {
        format!("_in_field_{}", self.input_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ElementType, Shape};

    #[test]
    fn argument_name_is_positional() {
        let ft = FieldType::new(Shape::d2(4, 4), Shape::scalar(), ElementType::Float32);
        let input = InputField::new(ft, 2, (0, 0));
        assert_eq!(input.argument_name(), "_in_field_2");
    }

    #[test]
    fn distinct_registers_are_distinct_identity_even_with_equal_field_type() {
        let ft = FieldType::new(Shape::d2(4, 4), Shape::scalar(), ElementType::Float32);
        let a = InputField::new(ft, 0, (1, 0));
        let b = InputField::new(ft, 1, (2, 0));
        assert_ne!(a.register_id(), b.register_id());
    }
}
