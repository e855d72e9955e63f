//! The OpenCL scalar/vector type descriptor (spec §3, §4.1): a pair `<textualName,
//! zeroLiteral>` drawn from a closed set.

use core::fmt;

/// A named OpenCL C scalar, vector, complex or pixel type, paired with the literal text used to
/// zero-initialize it. The set is closed: every case the addressing model can produce is listed
/// here, and `CLType::name`/`CLType::zero_literal` are total over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CLType {
    Float,
    Float2,
    Float3,
    Float4,
    Float8,
    Float16,
    Int,
    Int2,
    Int3,
    Int4,
    /// Two packed `float`s (real, imaginary); spec §4.2 reads/writes them as a pair at offsets
    /// `0` and `partStride`.
    Complex,
    /// `uchar4`-backed image pixel, read/written via `read_imagef`/`write_imagef`.
    Pixel,
}

impl CLType {
    /// The textual OpenCL C type name, as it appears in a kernel argument or local declaration.
    pub fn name(&self) -> &'static str {
        match self {
            CLType::Float => "float",
            CLType::Float2 => "float2",
            CLType::Float3 => "float3",
            CLType::Float4 => "float4",
            CLType::Float8 => "float8",
            CLType::Float16 => "float16",
            CLType::Int => "int",
            CLType::Int2 => "int2",
            CLType::Int3 => "int3",
            CLType::Int4 => "int4",
            CLType::Complex => "float2",
            CLType::Pixel => "float4",
        }
    }

    /// The textual zero literal for this type, used to seed accumulators and deferred-write
    /// temporaries.
    pub fn zero_literal(&self) -> &'static str {
        match self {
            CLType::Float => "0.0f",
            CLType::Float2 => "(float2)(0.0f, 0.0f)",
            CLType::Float3 => "(float3)(0.0f, 0.0f, 0.0f)",
            CLType::Float4 => "(float4)(0.0f, 0.0f, 0.0f, 0.0f)",
            CLType::Float8 => "(float8)(0.0f)",
            CLType::Float16 => "(float16)(0.0f)",
            CLType::Int => "0",
            CLType::Int2 => "(int2)(0, 0)",
            CLType::Int3 => "(int3)(0, 0, 0)",
            CLType::Int4 => "(int4)(0, 0, 0, 0)",
            CLType::Complex => "(float2)(0.0f, 0.0f)",
            CLType::Pixel => "(float4)(0.0f, 0.0f, 0.0f, 1.0f)",
        }
    }

    /// Number of scalar lanes packed into this type (1 for `Float`/`Int`, up to 16 for the
    /// vector forms, 2 for `Complex`, 4 for `Pixel`).
    pub fn lane_count(&self) -> u32 {
        match self {
            CLType::Float | CLType::Int => 1,
            CLType::Float2 | CLType::Int2 | CLType::Complex => 2,
            CLType::Float3 | CLType::Int3 => 3,
            CLType::Float4 | CLType::Int4 => 4,
            CLType::Float8 => 8,
            CLType::Float16 => 16,
            CLType::Pixel => 4,
        }
    }

    pub fn is_pixel(&self) -> bool {
        matches!(self, CLType::Pixel)
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, CLType::Complex)
    }
}

impl fmt::Display for CLType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_zeros_are_paired_per_case() {
        for ty in [
            CLType::Float,
            CLType::Float2,
            CLType::Float4,
            CLType::Float8,
            CLType::Float16,
            CLType::Int,
            CLType::Int4,
            CLType::Complex,
            CLType::Pixel,
        ] {
            assert!(!ty.name().is_empty());
            assert!(!ty.zero_literal().is_empty());
        }
    }
}
