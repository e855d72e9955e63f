//! Pure, side-effect-free string builders for field-memory pointer arithmetic (spec §4.2).
//!
//! Every function here maps a `(FieldType, field name, CLType, ...)` tuple to a fragment of
//! OpenCL C text. None of them touch any mutable state (the thread-local unique-id counter in
//! [`crate::uid`] is the only place in this crate that does); callers splice the returned strings
//! directly into kernel source, so ordinary Rust string formatting is the whole implementation.

use itertools::Itertools;

use crate::cltype::CLType;
use crate::layout::{ElementType, FieldType};

/// `<fieldName> * <prefix>layer * <fieldName>_layerStride + <prefix>row * <fieldName>_rowStride
/// + <prefix>column`, trimmed to the field's live dimensions, with unit strides collapsed to a
/// bare variable reference (spec §4.2). `local` selects the immutable, thread-assigned coordinate
/// variables (`_layer`/`_row`/`_column`, declared once in the prolog) over the mutable ones a
/// fragment may have advanced (`layer`/`row`/`column`, spec §4.3).
pub fn field_offset(field_type: &FieldType, field_name: &str, local: bool) -> String {
    let rank = field_type.field_shape().rank();
    if rank == 0 {
        return "0".to_string();
    }
    let layout = field_type.layout();
    let prefix = if local { "_" } else { "" };

    let mut terms = Vec::new();
    if rank >= 3 {
        terms.push(strided_term(prefix, "layer", field_name, "layerStride", layout.layer_stride));
    }
    if rank >= 2 {
        terms.push(strided_term(prefix, "row", field_name, "rowStride", layout.field_row_stride));
    }
    terms.push(format!("{prefix}column"));

    terms.join(" + ")
}

fn strided_term(prefix: &str, var: &str, field_name: &str, stride_kind: &str, stride: u32) -> String {
    if stride == 1 {
        format!("{prefix}{var}")
    } else {
        format!("{prefix}{var} * {field_name}_{stride_kind}")
    }
}

/// `+ <prefix>tensorElement * <fieldName>_tensorStride`, the addend `readElement`/`writeElement`
/// append to a base [`field_offset`] to pick out one tensor point (spec §4.2). `tensor_local`
/// selects between the immutable `_tensorElement` and the mutable `tensorElement` loop variable,
/// mirroring the `local` parameter of `field_offset`.
pub fn tensor_offset(field_name: &str, tensor_local: bool) -> String {
    let prefix = if tensor_local { "_" } else { "" };
    format!(" + {prefix}tensorElement * {field_name}_tensorStride")
}

/// OpenCL C vector-component suffix for lane `i` of an `n`-wide vector: `.xyzw` for vectors of
/// width ≤ 4, `.s0`…`.sF` (hex digit, uppercase per OpenCL C's component-selection grammar)
/// otherwise, since `.x`/`.y`/`.z`/`.w` are not valid accessors on `float8`/`float16`.
fn lane_suffix(n: u32, i: u32) -> String {
    if n <= 4 {
        ["x", "y", "z", "w"][i as usize].to_string()
    } else {
        format!("s{:X}", i)
    }
}

/// Reads a single scalar tensor element (used by `TensorElement`/`BigTensor` addressing) from a
/// buffer-backed field. `cl_type` must be `CLType::Float` for `Float32` fields, `CLType::Complex`
/// for `Complex32` fields; any other pairing is a caller bug, not a recoverable condition, since
/// the element CL type is derived mechanically from the field's element type.
pub fn read_element(field_type: &FieldType, field_name: &str, local: bool, tensor_local: bool) -> String {
    let offset = field_offset(field_type, field_name, local);
    match field_type.element_type() {
        ElementType::Float32 | ElementType::Uint8Pixel => {
            format!("{field_name}[{offset}{}]", tensor_offset(field_name, tensor_local))
        }
        ElementType::Complex32 => {
            let layout = field_type.layout();
            let tensor_off = tensor_offset(field_name, tensor_local);
            format!(
                "(float2)({field_name}[{offset}{tensor_off}], \
                 {field_name}[{offset}{tensor_off} + {part_stride}])",
                part_stride = layout.part_stride,
            )
        }
    }
}

/// Reads the whole tensor point (all of its points, packed into `cl_type`), used by
/// `SmallTensor`-addressed reads (spec §4.2). `CLType::Float`/`Complex`/`Pixel` collapse to a
/// single [`read_element`] call; the wider `FloatN` forms are assembled from `N` sibling loads at
/// successive multiples of the field's `tensorStride`, per spec §4.2's worked `CLFloat4` example.
pub fn read_tensor(field_type: &FieldType, field_name: &str, cl_type: CLType, local: bool) -> String {
    let offset = field_offset(field_type, field_name, local);
    if cl_type.is_pixel() {
        return format!(
            "read_imagef({field_name}, {sampler}, (int2)({prefix}column, {prefix}row))",
            sampler = "sampler",
            prefix = if local { "_" } else { "" },
        );
    }
    if cl_type.is_complex() {
        return read_element(field_type, field_name, local, local);
    }
    let n = cl_type.lane_count();
    if n == 1 {
        return format!("{field_name}[{offset}]");
    }
    let layout = field_type.layout();
    let loads = (0..n)
        .map(|i| format!("{field_name}[{offset} + {}]", i * layout.tensor_stride))
        .join(", ");
    format!("({}) ({loads})", cl_type.name())
}

/// Writes a single scalar tensor element, the write-side counterpart of [`read_element`].
pub fn write_element(
    field_type: &FieldType,
    field_name: &str,
    value: &str,
    local: bool,
    tensor_local: bool,
) -> String {
    let offset = field_offset(field_type, field_name, local);
    let tensor_off = tensor_offset(field_name, tensor_local);
    match field_type.element_type() {
        ElementType::Float32 | ElementType::Uint8Pixel => {
            format!("{field_name}[{offset}{tensor_off}] = {value};")
        }
        ElementType::Complex32 => {
            let layout = field_type.layout();
            format!(
                "{field_name}[{offset}{tensor_off}] = ({value}).x; \
                 {field_name}[{offset}{tensor_off} + {part_stride}] = ({value}).y;",
                part_stride = layout.part_stride,
            )
        }
    }
}

/// Writes a whole tensor point, the write-side counterpart of [`read_tensor`]. `value` is the
/// OpenCL expression (already of type `cl_type`) being stored.
pub fn write_tensor(
    field_type: &FieldType,
    field_name: &str,
    cl_type: CLType,
    value: &str,
    local: bool,
) -> String {
    let offset = field_offset(field_type, field_name, local);
    if cl_type.is_pixel() {
        let prefix = if local { "_" } else { "" };
        return format!(
            "write_imagef({field_name}, (int2)({prefix}column, {prefix}row), {value});"
        );
    }
    if cl_type.is_complex() {
        return write_element(field_type, field_name, value, local, local);
    }
    let n = cl_type.lane_count();
    if n == 1 {
        return format!("{field_name}[{offset}] = {value};");
    }
    let layout = field_type.layout();
    (0..n)
        .map(|i| {
            format!(
                "{field_name}[{offset} + {stride}] = ({value}).{lane};",
                stride = i * layout.tensor_stride,
                lane = lane_suffix(n, i),
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns the raw address of one tensor point (no subscript), for fragments that perform
/// in-place non-local writes by advancing a field pointer themselves (spec §3's `fieldName(@out
/// <i>)` / `partStride(@out<i>)` surface). Once a fragment references this pointer, the output is
/// no longer eligible as a forward-merge source (spec §4.7).
pub fn write_pointer(field_type: &FieldType, field_name: &str, local: bool) -> String {
    format!("({field_name} + {})", field_offset(field_type, field_name, local))
}

/// The base pointer to tensor element `0` of a field, exposed to user code as `fieldName(@out
/// <i>)` (spec §3). Distinct from [`write_pointer`] only in always addressing tensor element `0`
/// regardless of any in-loop `tensorElement` advancement, matching the "write to field-point base"
/// semantics `@out<i>`'s pointer surface guarantees.
pub fn write_tensor0_field_pointer(field_type: &FieldType, field_name: &str, local: bool) -> String {
    write_pointer(field_type, field_name, local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Shape;

    fn scalar_2d_float() -> FieldType {
        FieldType::new(Shape::d2(4, 5), Shape::scalar(), ElementType::Float32)
    }

    #[test]
    fn field_offset_uses_underscore_coordinates_when_local() {
        let ft = scalar_2d_float();
        let offset = field_offset(&ft, "_out_field_0", true);
        assert_eq!(offset, "_row * _out_field_0_rowStride + _column");
    }

    #[test]
    fn field_offset_drops_layer_term_for_2d_field() {
        let ft = scalar_2d_float();
        assert!(!field_offset(&ft, "f", true).contains("layer"));
    }

    #[test]
    fn field_offset_of_scalar_field_is_zero() {
        let ft = FieldType::new(Shape::scalar(), Shape::scalar(), ElementType::Float32);
        assert_eq!(field_offset(&ft, "f", true), "0");
    }

    #[test]
    fn read_element_matches_write_element_addressing() {
        let ft = scalar_2d_float();
        let read = read_element(&ft, "_in_field_0", true, true);
        assert_eq!(read, "_in_field_0[_row * _in_field_0_rowStride + _column]");
        let write = write_element(&ft, "_out_field_0", "1.0f", true, true);
        assert_eq!(write, "_out_field_0[_row * _out_field_0_rowStride + _column] = 1.0f;");
    }

    #[test]
    fn small_tensor_float4_reads_four_sibling_loads() {
        let ft = FieldType::new(Shape::scalar(), Shape::d1(4), ElementType::Float32);
        let read = read_tensor(&ft, "f", CLType::Float4, true);
        assert!(read.starts_with("(float4) ("));
        assert_eq!(read.matches("f[").count(), 4);
    }

    #[test]
    fn complex_element_reads_real_and_imaginary_planes() {
        let ft = FieldType::new(Shape::d2(4, 5), Shape::scalar(), ElementType::Complex32);
        let layout = ft.layout();
        let read = read_element(&ft, "f", true, true);
        assert!(read.contains(&format!("+ {}", layout.part_stride)));
    }
}
