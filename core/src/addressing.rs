//! Addressing modes and sampling-mode compatibility (spec §3, §4.1).

use crate::cltype::CLType;
use crate::errors::FragmentError;
use crate::layout::{ElementType, FieldType};

// ADDRESSING MODE
// ================================================================================================

/// Fixes how each work-item maps to field points and tensor elements (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// Each thread produces one full tensor point. Valid for any field shape; valid tensor
    /// shapes are restricted to point counts in `{1, 2, 3, 4, 8, 16}` (spec §3 table).
    SmallTensor,
    /// Each thread produces one scalar tensor element. Valid for any field or tensor shape.
    TensorElement,
    /// Each thread produces one field point's worth of writes, possibly looping over tensor
    /// elements. Valid for any field or tensor shape. Can never be the source of a merge
    /// (spec §4.7).
    BigTensor,
}

impl AddressingMode {
    /// `clType(fieldType)` from spec §4.1: the OpenCL scalar/vector type a work-item in this
    /// addressing mode uses to hold one field point's tensor value.
    pub fn cl_type(&self, field_type: &FieldType) -> Result<CLType, FragmentError> {
        let tensor_points = field_type.tensor_points();
        let element = field_type.element_type();

        match self {
            AddressingMode::SmallTensor => small_tensor_cl_type(element, tensor_points),
            AddressingMode::TensorElement | AddressingMode::BigTensor => match element {
                ElementType::Float32 => Ok(CLType::Float),
                ElementType::Complex32 => Ok(CLType::Complex),
                ElementType::Uint8Pixel => Ok(CLType::Pixel),
            },
        }
    }

    /// True for any field shape (§3 table: "any" for all three modes); kept as a named check
    /// because the merger and prolog builder both gate behavior on field-shape validity, not
    /// just on the mode itself.
    pub fn allows_field_shape(&self, _field_rank: usize) -> bool {
        true
    }

    /// Valid tensor point counts for this mode (§3 table). `None` means "no restriction".
    pub fn valid_tensor_point_counts(&self) -> Option<&'static [u32]> {
        match self {
            AddressingMode::SmallTensor => Some(&[1, 2, 3, 4, 8, 16]),
            AddressingMode::TensorElement | AddressingMode::BigTensor => None,
        }
    }
}

fn small_tensor_cl_type(element: ElementType, tensor_points: u32) -> Result<CLType, FragmentError> {
    match element {
        ElementType::Uint8Pixel => Ok(CLType::Pixel),
        ElementType::Complex32 if tensor_points == 1 => Ok(CLType::Complex),
        ElementType::Float32 => match tensor_points {
            1 => Ok(CLType::Float),
            2 => Ok(CLType::Float2),
            3 => Ok(CLType::Float3),
            4 => Ok(CLType::Float4),
            8 => Ok(CLType::Float8),
            16 => Ok(CLType::Float16),
            n => Err(FragmentError::InvalidAddressingCombination {
                mode: AddressingMode::SmallTensor,
                element: "Float32",
                tensor_points: n as usize,
            }),
        },
        ElementType::Complex32 => Err(FragmentError::InvalidAddressingCombination {
            mode: AddressingMode::SmallTensor,
            element: "Complex32",
            tensor_points: tensor_points as usize,
        }),
    }
}

// SAMPLING MODE
// ================================================================================================

/// How an image-backed field is sampled. `DontCare` is compatible with anything; merging two
/// kernels with different concrete sampling modes is rejected (spec §4.1, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplingMode {
    DontCare,
    NearestClampToEdge,
    NearestClampToZero,
}

impl SamplingMode {
    /// True if this mode needs a `sampler_t` declared in the kernel prolog.
    pub fn needs_sampler(&self) -> bool {
        !matches!(self, SamplingMode::DontCare)
    }

    /// The `CLK_ADDRESS_*` flag text used when declaring the sampler (spec §4.3).
    pub fn address_flag(&self) -> Option<&'static str> {
        match self {
            SamplingMode::DontCare => None,
            SamplingMode::NearestClampToEdge => Some("CLK_ADDRESS_CLAMP_TO_EDGE"),
            SamplingMode::NearestClampToZero => Some("CLK_ADDRESS_CLAMP"),
        }
    }

    /// Merges two sampling modes as required by a fusion (spec §4.1): `DontCare` is compatible
    /// with anything and yields the other mode; two identical concrete modes are compatible and
    /// yield themselves; anything else is rejected.
    pub fn merge(a: SamplingMode, b: SamplingMode) -> Option<SamplingMode> {
        match (a, b) {
            (SamplingMode::DontCare, other) | (other, SamplingMode::DontCare) => Some(other),
            (a, b) if a == b => Some(a),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_tensor_picks_vector_width_by_point_count() {
        let f4 = FieldType::new(
            crate::layout::Shape::scalar(),
            crate::layout::Shape::d1(4),
            ElementType::Float32,
        );
        assert_eq!(AddressingMode::SmallTensor.cl_type(&f4).unwrap(), CLType::Float4);
    }

    #[test]
    fn tensor_element_mode_is_always_scalar() {
        let f4 = FieldType::new(
            crate::layout::Shape::scalar(),
            crate::layout::Shape::d1(4),
            ElementType::Float32,
        );
        assert_eq!(AddressingMode::TensorElement.cl_type(&f4).unwrap(), CLType::Float);
    }

    #[test]
    fn complex_small_tensor_requires_single_point() {
        let f2 = FieldType::new(
            crate::layout::Shape::scalar(),
            crate::layout::Shape::d1(2),
            ElementType::Complex32,
        );
        assert!(AddressingMode::SmallTensor.cl_type(&f2).is_err());
    }

    #[test]
    fn sampling_mode_merge_rules() {
        assert_eq!(
            SamplingMode::merge(SamplingMode::DontCare, SamplingMode::NearestClampToEdge),
            Some(SamplingMode::NearestClampToEdge)
        );
        assert_eq!(
            SamplingMode::merge(SamplingMode::NearestClampToEdge, SamplingMode::NearestClampToEdge),
            Some(SamplingMode::NearestClampToEdge)
        );
        assert_eq!(
            SamplingMode::merge(SamplingMode::NearestClampToEdge, SamplingMode::NearestClampToZero),
            None
        );
    }
}
