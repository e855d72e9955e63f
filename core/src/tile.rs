//! Local-memory tile loading for kernels that need a halo around each work-item's point
//! (spec §4.8).
//!
//! A `TileLoader` emits the `__local` array declaration, the barrier-guarded cooperative load
//! that fills it (including the halo), and a border policy that decides what value out-of-bounds
//! halo samples take. This is the one piece of kernel text whose presence changes where the
//! bounds check goes (spec §4.3): kernels with a tile load bounds-check *after* the load barrier,
//! since every work-item — even ones outside the field — must participate in the cooperative load.

use crate::errors::FragmentError;

// BORDER POLICY
// ================================================================================================

/// How a local tile loader fills halo samples that fall outside the backing field (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BorderPolicy {
    /// Out-of-bounds samples read as zero.
    BorderZero,
    /// The whole tile, including halo, is assumed in-bounds; no clamping is emitted. Valid only
    /// when the caller has already guaranteed the field is padded enough for this to hold.
    BorderFull,
    /// Only positions provably in-bounds are loaded; the tile's edge rows/columns are left
    /// undefined and must not be read by user code.
    BorderValid,
    /// Out-of-bounds samples clamp to the nearest in-bounds coordinate.
    BorderClamp,
    /// Out-of-bounds samples wrap around the field's extent.
    BorderCyclic,
}

impl BorderPolicy {
    /// The clamped/wrapped index expression for one axis, or `None` when the policy needs no
    /// per-sample guard (`BorderFull`) or forbids the load outright (`BorderValid`, handled by
    /// the caller skipping the out-of-bounds iterations rather than by an index expression).
    fn index_expr(&self, index: &str, extent: &str) -> Option<String> {
        match self {
            BorderPolicy::BorderZero => None,
            BorderPolicy::BorderFull => None,
            BorderPolicy::BorderValid => None,
            BorderPolicy::BorderClamp => {
                Some(format!("min(max({index}, 0), {extent} - 1)"))
            }
            BorderPolicy::BorderCyclic => Some(format!("(({index}) % {extent} + {extent}) % {extent}")),
        }
    }
}

// TILE LOADER
// ================================================================================================

/// Parameters of one local-memory tile: the halo radius on each side and the border policy
/// governing out-of-bounds samples.
#[derive(Debug, Clone, Copy)]
pub struct TileLoader {
    halo_rows: u32,
    halo_columns: u32,
    border: BorderPolicy,
}

impl TileLoader {
    pub fn new(halo_rows: u32, halo_columns: u32, border: BorderPolicy) -> Self {
        Self { halo_rows, halo_columns, border }
    }

    pub fn border(&self) -> BorderPolicy {
        self.border
    }

    /// `__local float _tile[localRows][localColumns];` sized to cover the workgroup plus halo on
    /// both sides of each axis. `local_rows`/`local_columns` must be the *compile-time* local
    /// work-group extent (spec §4.4's `WorkgroupParams`, not a runtime `get_local_size()` call —
    /// OpenCL C requires `__local` array bounds to be compile-time constants).
    pub fn declare(&self, cl_type_name: &str, local_rows: u32, local_columns: u32) -> String {
        let rows = local_rows + 2 * self.halo_rows;
        let cols = local_columns + 2 * self.halo_columns;
        format!("__local {cl_type_name} _tile[{rows}][{cols}];")
    }

    /// The cooperative load statement (spec §4.8): strides a double loop over the tile's
    /// `(localHeight × localWidth)` extent in steps of the workgroup's own local size, so that
    /// work-items also fill the halo-only cells beyond their own one-to-one position — a single
    /// per-thread sample would leave the tile's border rows/columns (anything past the
    /// workgroup's own footprint) never written. The caller must emit a
    /// `barrier(CLK_LOCAL_MEM_FENCE)` after this statement and before any read of `_tile`.
    pub fn load_statement(
        &self,
        field_name: &str,
        field_row_stride: &str,
        local_rows: u32,
        local_columns: u32,
    ) -> Result<String, FragmentError> {
        let row_extent = format!("{field_name}_rows");
        let col_extent = format!("{field_name}_columns");
        let tile_rows = local_rows + 2 * self.halo_rows;
        let tile_cols = local_columns + 2 * self.halo_columns;

        let row_index = match self.border.index_expr("_srcRow", &row_extent) {
            Some(expr) => expr,
            None if matches!(self.border, BorderPolicy::BorderValid) => {
                return Err(FragmentError::UnsupportedBorderPolicy(self.border));
            }
            None => "_srcRow".to_string(),
        };
        let col_index = match self.border.index_expr("_srcColumn", &col_extent) {
            Some(expr) => expr,
            None if matches!(self.border, BorderPolicy::BorderValid) => {
                return Err(FragmentError::UnsupportedBorderPolicy(self.border));
            }
            None => "_srcColumn".to_string(),
        };

        let fill = match self.border {
            BorderPolicy::BorderZero => format!(
                "(_srcRow >= 0 && _srcRow < {row_extent} && _srcColumn >= 0 && _srcColumn < \
                 {col_extent}) ? {field_name}[{row_index} * {field_row_stride} + {col_index}] : 0.0f"
            ),
            _ => format!("{field_name}[{row_index} * {field_row_stride} + {col_index}]"),
        };

        Ok(format!(
            "for (int r = _localRow; r < {tile_rows}; r += {local_rows}) {{ \
             for (int c = _localColumn; c < {tile_cols}; c += {local_columns}) {{ \
             int _srcRow = _groupRow * {local_rows} + r - {halo_rows}; \
             int _srcColumn = _groupColumn * {local_columns} + c - {halo_cols}; \
             _tile[r][c] = {fill}; }} }}",
            halo_rows = self.halo_rows,
            halo_cols = self.halo_columns,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_includes_halo_on_both_sides() {
        let loader = TileLoader::new(1, 1, BorderPolicy::BorderClamp);
        let decl = loader.declare("float", 16, 16);
        assert!(decl.contains("_tile[18][18]"));
    }

    #[test]
    fn border_valid_is_not_yet_supported_as_a_load_expression() {
        let loader = TileLoader::new(1, 1, BorderPolicy::BorderValid);
        assert!(loader.load_statement("f", "f_rowStride", 16, 16).is_err());
    }

    #[test]
    fn border_clamp_emits_min_max_form() {
        let loader = TileLoader::new(1, 1, BorderPolicy::BorderClamp);
        let stmt = loader.load_statement("f", "f_rowStride", 16, 16).unwrap();
        assert!(stmt.contains("min(max("));
    }

    #[test]
    fn border_zero_emits_bounds_ternary() {
        let loader = TileLoader::new(2, 2, BorderPolicy::BorderZero);
        let stmt = loader.load_statement("f", "f_rowStride", 16, 16).unwrap();
        assert!(stmt.contains("? f["));
        assert!(stmt.contains(": 0.0f"));
    }

    #[test]
    fn load_statement_strides_over_the_full_halo_inclusive_tile() {
        let loader = TileLoader::new(1, 1, BorderPolicy::BorderClamp);
        let stmt = loader.load_statement("f", "f_rowStride", 16, 16).unwrap();
        assert!(stmt.contains("r < 18"));
        assert!(stmt.contains("r += 16"));
        assert!(stmt.contains("c < 18"));
        assert!(stmt.contains("c += 16"));
    }
}
