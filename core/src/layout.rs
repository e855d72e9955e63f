//! Field types and the memory layout derived from them (spec §3).
//!
//! A [`FieldType`] is the triple `<fieldShape, tensorShape, elementType>` that every other
//! component in this crate (addressing, the I/O helper, the prolog builder, the merger) reads
//! from. [`MemoryLayout`] is the pure function of a `FieldType` that exposes the stride
//! quantities the I/O helper stitches into pointer-arithmetic strings.
//!
//! Tensor elements (and, for `Complex32`, the real/imaginary parts within one element) are laid
//! out as separate planes spanning the whole field — the layout a GPU back-end wants so that a
//! `TensorElement`-addressed kernel can stream one plane with coalesced accesses. Within a single
//! plane, points are addressed by the ordinary layer/row/column geometry, with row storage padded
//! up to the platform's memory-block size.

// SHAPE
// ================================================================================================

/// A 0–3 dimensional extent, ordered `[layers, rows, columns]` with unused trailing dimensions
/// set to `1`. Used both for field shapes (0–3 dims) and tensor shapes (0–2 dims, per spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: [u32; 3],
    rank: u8,
}

impl Shape {
    pub const fn scalar() -> Self {
        Self { dims: [1, 1, 1], rank: 0 }
    }

    pub const fn d1(columns: u32) -> Self {
        Self { dims: [1, 1, columns], rank: 1 }
    }

    pub const fn d2(rows: u32, columns: u32) -> Self {
        Self { dims: [1, rows, columns], rank: 2 }
    }

    pub const fn d3(layers: u32, rows: u32, columns: u32) -> Self {
        Self { dims: [layers, rows, columns], rank: 3 }
    }

    /// Number of live dimensions (0–3).
    pub fn rank(&self) -> usize {
        self.rank as usize
    }

    pub fn layers(&self) -> u32 {
        self.dims[0]
    }

    pub fn rows(&self) -> u32 {
        self.dims[1]
    }

    pub fn columns(&self) -> u32 {
        self.dims[2]
    }

    /// Total number of points covered by this shape (e.g. a tensor shape's point count).
    pub fn point_count(&self) -> u32 {
        self.dims[0] * self.dims[1] * self.dims[2]
    }
}

// ELEMENT TYPE
// ================================================================================================

/// The scalar element type stored at each tensor point (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Float32,
    Complex32,
    Uint8Pixel,
}

impl ElementType {
    /// Number of `float` lanes (planes) one tensor element of this type occupies: 1 for
    /// `Float32`/`Uint8Pixel`, 2 for `Complex32` (a real plane and an imaginary plane).
    pub fn lanes(&self) -> u32 {
        match self {
            ElementType::Float32 => 1,
            ElementType::Complex32 => 2,
            ElementType::Uint8Pixel => 1,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ElementType::Uint8Pixel)
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, ElementType::Complex32)
    }
}

// FIELD TYPE
// ================================================================================================

/// `<fieldShape, tensorShape, elementType>` — the unit of data flowing along every edge of the
/// kernel graph (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldType {
    field_shape: Shape,
    tensor_shape: Shape,
    element_type: ElementType,
}

impl FieldType {
    pub const fn new(field_shape: Shape, tensor_shape: Shape, element_type: ElementType) -> Self {
        Self { field_shape, tensor_shape, element_type }
    }

    pub fn field_shape(&self) -> Shape {
        self.field_shape
    }

    pub fn tensor_shape(&self) -> Shape {
        self.tensor_shape
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn tensor_points(&self) -> u32 {
        self.tensor_shape.point_count().max(1)
    }

    pub fn layout(&self) -> MemoryLayout {
        MemoryLayout::from_field_type(self)
    }
}

// MEMORY LAYOUT
// ================================================================================================

/// The row/stride quantities derived from a [`FieldType`] (spec §3).
///
/// `row_stride` is the logical (unpadded) row extent, used only to derive `field_row_stride`;
/// every pointer-arithmetic string this crate emits uses `field_row_stride` (exposed to kernel
/// text as `<field>_rowStride`) and `layer_stride`, both of which already account for padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    pub layers: u32,
    pub rows: u32,
    pub columns: u32,
    pub row_stride: u32,
    pub field_row_stride: u32,
    pub layer_stride: u32,
    /// Stride, in scalar elements, between a complex element's real and imaginary planes (and,
    /// for any element type, between one field-point's tensor plane and the next axis-aligned
    /// plane group).
    pub part_stride: u32,
    /// Stride, in scalar elements, between consecutive tensor-point planes.
    pub tensor_stride: u32,
}

/// Row storage is padded up to this many elements; stands in for "the platform's memory-block
/// size" (spec §3).
pub const MEMORY_BLOCK_SIZE: u32 = 32;

impl MemoryLayout {
    pub fn from_field_type(field_type: &FieldType) -> Self {
        let field = field_type.field_shape();
        let lanes = field_type.element_type().lanes();

        let row_stride = field.columns().max(1);
        let field_row_stride = round_up(MEMORY_BLOCK_SIZE, row_stride);
        let layer_stride = field.rows().max(1) * field_row_stride;
        let plane_volume = field.layers().max(1) * layer_stride;

        let part_stride = plane_volume;
        let tensor_stride = part_stride * lanes;

        Self {
            layers: field.layers(),
            rows: field.rows(),
            columns: field.columns(),
            row_stride,
            field_row_stride,
            layer_stride,
            part_stride,
            tensor_stride,
        }
    }
}

/// `v` rounded up to the next multiple of `mult` (spec §4.4's `roundUp`).
pub fn round_up(mult: u32, v: u32) -> u32 {
    let mult = mult.max(1);
    v + (mult - v % mult) % mult
}
