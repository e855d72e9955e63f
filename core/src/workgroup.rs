//! Work-group parameter derivation (spec §4.4).
//!
//! Computed once per hyper-kernel from its addressing mode and work field shape, and re-derived
//! by the merger as a merge precondition (spec §4.7: two kernels may only merge if their
//! work-group parameters are equal).

use crate::addressing::AddressingMode;
use crate::layout::{round_up, FieldType};

/// Default local work-group extent on the row/column axes, the same shape every kernel in this
/// crate starts from before clamping to the work field's own extent.
const DEFAULT_LOCAL_ROWS: u32 = 16;
const DEFAULT_LOCAL_COLUMNS: u32 = 16;

/// `(local_size, global_size)` on each enqueued axis, derived from a hyper-kernel's addressing
/// mode and work field (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupParams {
    pub local_rows: u32,
    pub local_columns: u32,
    pub global_rows: u32,
    pub global_columns: u32,
    /// Present only in `TensorElement` addressing, where the tensor axis is folded into the
    /// dispatch's third (layer) global-id axis alongside the field's own layer axis.
    pub tensor_points: u32,
}

impl WorkgroupParams {
    /// Derives work-group parameters for `field_type` addressed in `mode` (spec §4.4).
    ///
    /// `SmallTensor` and `BigTensor` dispatch one work-item per field point; `TensorElement`
    /// dispatches one work-item per (field point, tensor element) pair, folding the tensor axis
    /// into the layer dimension with the field's own layer varying fastest and the tensor
    /// element varying slowest (an explicit decision recorded in `DESIGN.md`, since the spec's
    /// own open question leaves the fold order unspecified; `hyperkernel.rs`'s prolog recovers
    /// `_layer`/`_tensorElement` from the folded global id with `% layers`/`/ layers`
    /// accordingly).
    pub fn derive(mode: AddressingMode, field_type: &FieldType) -> Self {
        let field = field_type.field_shape();
        let rows = field.rows().max(1);
        let columns = field.columns().max(1);
        let layers = field.layers().max(1);

        let local_rows = DEFAULT_LOCAL_ROWS.min(rows);
        let local_columns = DEFAULT_LOCAL_COLUMNS.min(columns);

        let tensor_points = match mode {
            AddressingMode::TensorElement => field_type.tensor_points(),
            AddressingMode::SmallTensor | AddressingMode::BigTensor => 1,
        };
        let effective_layers = layers * tensor_points;

        Self {
            local_rows,
            local_columns,
            global_rows: round_up(local_rows, rows),
            global_columns: round_up(local_columns, columns),
            tensor_points: effective_layers,
        }
    }

    /// Work-group parameters are a merge precondition by direct equality (spec §4.7); two
    /// kernels whose global sizes round up to the same totals but whose local tiling differs
    /// still cannot share a dispatch.
    pub fn compatible_with(&self, other: &WorkgroupParams) -> bool {
        self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ElementType, Shape};

    #[test]
    fn small_tensor_ignores_tensor_shape_in_global_size() {
        let ft = FieldType::new(Shape::d2(20, 20), Shape::d1(4), ElementType::Float32);
        let params = WorkgroupParams::derive(AddressingMode::SmallTensor, &ft);
        assert_eq!(params.tensor_points, 1);
        assert_eq!(params.global_rows % params.local_rows, 0);
    }

    #[test]
    fn tensor_element_folds_tensor_axis_into_layer_count() {
        let ft = FieldType::new(Shape::d2(20, 20), Shape::d1(4), ElementType::Float32);
        let params = WorkgroupParams::derive(AddressingMode::TensorElement, &ft);
        assert_eq!(params.tensor_points, 4);
    }

    #[test]
    fn global_size_rounds_up_to_local_size_multiple() {
        let ft = FieldType::new(Shape::d2(17, 17), Shape::scalar(), ElementType::Float32);
        let params = WorkgroupParams::derive(AddressingMode::SmallTensor, &ft);
        assert_eq!(params.global_rows, 32);
        assert_eq!(params.global_columns, 32);
    }
}
