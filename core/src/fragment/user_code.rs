//! The `UserCode` fragment: one opaque block of device code contributed by the front end
//! (spec §4.5/§4.6).
//!
//! A `UserCode` fragment may read from any number of parent fragments (via `@in<i>` tokens) and
//! may produce any number of outputs (via `@out<i>` tokens), each picked up downstream by a
//! [`super::user_code_output::UserCodeOutput`] fragment. Its own write types are inferred once,
//! at construction, by scanning its source text.

use crate::errors::FragmentError;
use crate::fragment::translate;
use crate::fragment::write_type::{self, WriteType};
use crate::fragment::FragmentId;

/// One opaque device-code block plus its `@in`/`@out` wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCode {
    code: String,
    /// Parent fragment bound to each `@in<i>` token, indexed by `i`.
    inputs: Vec<FragmentId>,
    /// [`WriteType`] of each `@out<i>` token this code uses, indexed by `i`.
    write_types: Vec<WriteType>,
    /// Whether the `@in<i>` token at each input index was read through one of the non-local
    /// families (`@inNonlocal`/`@inElementNonlocal`), indexed by `i` (spec §4.5).
    read_nonlocal: Vec<bool>,
}

impl UserCode {
    /// Builds a `UserCode` fragment, inferring each output's [`WriteType`] and each input's
    /// read locality by scanning `code`.
    ///
    /// `output_count` is the number of `@out<i>` slots this code is expected to address; the
    /// scan fills [`WriteType::Null`] for any slot the code never writes.
    pub fn new(code: String, inputs: Vec<FragmentId>, output_count: usize) -> Result<Self, FragmentError> {
        let write_types = write_type::scan(&code, output_count)?;
        let read_nonlocal = translate::scan_nonlocal_reads(&code, inputs.len());
        Ok(Self { code, inputs, write_types, read_nonlocal })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn inputs(&self) -> &[FragmentId] {
        &self.inputs
    }

    pub fn output_count(&self) -> usize {
        self.write_types.len()
    }

    pub fn write_type(&self, output_index: usize) -> WriteType {
        self.write_types[output_index]
    }

    pub fn write_types(&self) -> &[WriteType] {
        &self.write_types
    }

    /// Whether input slot `input_index` is read non-locally anywhere in this fragment's code
    /// (spec §4.5's `@inNonlocal`/`@inElementNonlocal` families).
    pub fn read_is_nonlocal(&self, input_index: usize) -> bool {
        self.read_nonlocal.get(input_index).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_local_write_type_from_code() {
        let uc = UserCode::new("@out0 = @in0 + 1.0f;".to_string(), vec![0], 1).unwrap();
        assert_eq!(uc.write_type(0), WriteType::Local);
    }

    #[test]
    fn rejects_conflicting_write_families_for_one_slot() {
        let err = UserCode::new("@out0 = a; @outNonlocal0 = b;".to_string(), vec![], 1).unwrap_err();
        assert!(matches!(err, FragmentError::MultipleWriteTypes { .. }));
    }

    #[test]
    fn infers_nonlocal_read_locality_per_input_slot() {
        let uc = UserCode::new("@out0 = @in0 + @inNonlocal1;".to_string(), vec![0, 1], 1).unwrap();
        assert!(!uc.read_is_nonlocal(0));
        assert!(uc.read_is_nonlocal(1));
    }
}
