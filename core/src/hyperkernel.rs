//! `HyperKernel`: a fragment DAG plus its input/output bindings, addressing mode and derived
//! work-group parameters — the unit the merger fuses and the graph ultimately emits as one
//! `__kernel` function (spec §3, §4.6).

use std::collections::HashMap;

use log::debug;

use crate::addressing::{AddressingMode, SamplingMode};
use crate::cltype::CLType;
use crate::errors::FragmentError;
use crate::fragment::write_type::WriteType;
use crate::fragment::{self, translate, Fragment, FragmentId, OutputField};
use crate::layout::FieldType;
use crate::tile::TileLoader;
use crate::uid;
use crate::workgroup::WorkgroupParams;

/// Index of a [`HyperKernel`] within the owning [`crate::graph::KernelGraph`].
pub type KernelId = usize;

/// Compiler-wide knobs that affect merge legality and argument budgeting (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Whether a kernel using local memory is allowed to be the *source* of a merge. Sinks
    /// already using local memory can never accept a merge regardless of this flag.
    pub local_memory_merging: bool,
    /// Byte budget for kernel arguments; each field/scalar argument is assumed to cost
    /// `bytes_per_argument` bytes of the device's argument space.
    pub argument_byte_budget: usize,
    pub bytes_per_argument: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self { local_memory_merging: false, argument_byte_budget: 1024, bytes_per_argument: 4 }
    }
}

impl CompilerOptions {
    /// Maximum argument count implied by the byte budget (`1024 / 4 = 256` by default, per
    /// spec §4.7's merge-legality argument cap).
    pub fn max_argument_count(&self) -> usize {
        self.argument_byte_budget / self.bytes_per_argument.max(1)
    }
}

/// A fragment DAG, its bound inputs/outputs, addressing mode and (optional) local-memory tile
/// loader — everything needed to emit one complete OpenCL kernel.
#[derive(Debug, Clone)]
pub struct HyperKernel {
    fragments: Vec<Fragment>,
    inputs: Vec<FragmentId>,
    outputs: Vec<FragmentId>,
    addressing_mode: AddressingMode,
    sampling_mode: SamplingMode,
    tile_loader: Option<TileLoader>,
}

impl HyperKernel {
    pub fn new(
        fragments: Vec<Fragment>,
        inputs: Vec<FragmentId>,
        outputs: Vec<FragmentId>,
        addressing_mode: AddressingMode,
        sampling_mode: SamplingMode,
    ) -> Self {
        Self { fragments, inputs, outputs, addressing_mode, sampling_mode, tile_loader: None }
    }

    pub fn with_tile_loader(mut self, loader: TileLoader) -> Self {
        self.tile_loader = Some(loader);
        self
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn inputs(&self) -> &[FragmentId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[FragmentId] {
        &self.outputs
    }

    pub fn addressing_mode(&self) -> AddressingMode {
        self.addressing_mode
    }

    pub fn sampling_mode(&self) -> SamplingMode {
        self.sampling_mode
    }

    pub fn uses_local_memory(&self) -> bool {
        self.tile_loader.is_some()
    }

    /// The field shape every work-item is dispatched over: taken from the first output, since
    /// every output of one hyper-kernel shares a single dispatch geometry by construction.
    pub fn work_field_type(&self) -> FieldType {
        self.fragments[self.outputs[0]].as_output_field().expect("output fragment id").field_type()
    }

    pub fn workgroup_params(&self) -> WorkgroupParams {
        WorkgroupParams::derive(self.addressing_mode, &self.work_field_type())
    }

    /// Number of kernel arguments this hyper-kernel would need: one per input field, one per
    /// output field, plus one sampler if any bound field needs sampling (spec §4.7's argument
    /// cap check).
    pub fn argument_count(&self) -> usize {
        self.inputs.len() + self.outputs.len() + usize::from(self.sampling_mode.needs_sampler())
    }

    /// Input fragment ids that are themselves `InputField`s bound to `register_id`, used by the
    /// merger to detect duplicated inputs after re-homing (spec §4.7's `findMergeableInput`,
    /// `hasDuplicatedInputs`). Keyed on the virtual field register's identity, *not* on
    /// `FieldType`: two distinct buffers of identical shape/element type are still distinct
    /// inputs.
    pub fn find_input_by_register(&self, register_id: fragment::input_field::RegisterId) -> Option<usize> {
        self.inputs.iter().position(|&id| {
            self.fragments[id].as_input_field().map(|f| f.register_id()) == Some(register_id)
        })
    }

    /// True if two distinct input slots bind `InputField`s to the same virtual field register —
    /// the condition `removeRedundantInputs` (spec §4.7) collapses. Identical `FieldType` alone
    /// is not enough: e.g. `@out0 = @in0 + @in1` over two distinct external 4×5 float buffers is
    /// not a duplicate, even though both inputs share a `FieldType`.
    pub fn has_duplicated_inputs(&self) -> bool {
        let mut seen = Vec::new();
        for &id in &self.inputs {
            if let Some(field) = self.fragments[id].as_input_field() {
                if seen.contains(&field.register_id()) {
                    return true;
                }
                seen.push(field.register_id());
            }
        }
        false
    }

    /// Spec §4.7's `removeRedundantInputs`, run before the source/sink merger ever sees a
    /// kernel with `has_duplicated_inputs()` true (the merger assumes a de-duplicated input
    /// list). Collapses every input slot that binds the same virtual field register as an
    /// earlier slot onto that earlier slot's `InputField`, repointing every dependent fragment
    /// (`UserCode`, `UserCodeOutput`, `OutputField`) at the surviving fragment id via the same
    /// `retarget` splice the merger itself uses, then renumbers the remaining inputs to their
    /// new position (spec §8 scenario S6: `[a, b, a]` becomes `[a, b]`, with the old slot-2
    /// `InputField`'s dependents now pointing at slot 0's surviving fragment). A no-op when no
    /// duplicate input exists.
    pub fn remove_redundant_inputs(&self) -> HyperKernel {
        let mut fragments = self.fragments.clone();
        let mut inputs: Vec<FragmentId> = Vec::new();
        let mut surviving_by_register: HashMap<fragment::input_field::RegisterId, FragmentId> = HashMap::new();

        for &id in &self.inputs {
            let Some(field) = fragments[id].as_input_field() else {
                inputs.push(id);
                continue;
            };
            if let Some(&surviving) = surviving_by_register.get(&field.register_id()) {
                crate::merger::retarget(&mut fragments, id, surviving);
            } else {
                surviving_by_register.insert(field.register_id(), id);
                inputs.push(id);
            }
        }

        for (new_index, &id) in inputs.iter().enumerate() {
            if let Some(f) = fragments[id].as_input_field() {
                if f.input_index() != new_index {
                    fragments[id] = Fragment::InputField(fragment::InputField::new(
                        f.field_type(),
                        new_index,
                        f.register_id(),
                    ));
                }
            }
        }

        HyperKernel {
            fragments,
            inputs,
            outputs: self.outputs.clone(),
            addressing_mode: self.addressing_mode,
            sampling_mode: self.sampling_mode,
            tile_loader: self.tile_loader,
        }
    }

    /// Assembles this hyper-kernel's complete OpenCL C source (spec §4.3/§4.6).
    ///
    /// Emission walks the fragment DAG in post-order from the output fragments: `InputField`
    /// fragments contribute nothing (their value is read lazily wherever a sibling references
    /// them), `UserCode` fragments allocate one temporary per output slot and splice their
    /// translated body into the kernel, and `OutputField` fragments perform the final store.
    /// The whole pass runs under a fresh [`uid`] scope so that every `_temp<N>_` name this kernel
    /// introduces is renumbered to `_temp_1, _temp_2, …` in first-appearance order before the
    /// source is returned — this is what lets two structurally-identical kernels compile to
    /// byte-identical text and share a source-cache entry (spec §8 property 1).
    pub fn compile(&self, function_name: &str, options: &CompilerOptions) -> Result<String, FragmentError> {
        let work_field = self.work_field_type();
        let value_cl_type = self.addressing_mode.cl_type(&work_field)?;
        let params = self.workgroup_params();

        let mut body = String::new();
        let mut temps: HashMap<(FragmentId, usize), String> = HashMap::new();
        // Output slots a `UserCode` fragment wrote directly to a field address (spec §4.5 step
        // 3): their `OutputField` epilog emits nothing, since there is no temporary left to
        // store and the write already landed in the buffer.
        let mut in_place_written: std::collections::HashSet<(FragmentId, usize)> = std::collections::HashSet::new();

        for id in fragment::post_order(&self.fragments, &self.outputs) {
            match &self.fragments[id] {
                Fragment::InputField(_) => {}
                Fragment::UserCode(uc) => {
                    let mut read_exprs = Vec::with_capacity(uc.inputs().len());
                    for (idx, &parent_id) in uc.inputs().iter().enumerate() {
                        read_exprs.push(self.read_expr_for(parent_id, &temps, uc.read_is_nonlocal(idx))?);
                    }
                    let with_reads = translate::substitute_reads(uc.code(), &read_exprs);

                    let mut write_idents = Vec::with_capacity(uc.output_count());
                    for out_idx in 0..uc.output_count() {
                        let write_type = uc.write_type(out_idx);
                        match self.in_place_write_target(write_type, id, out_idx)? {
                            Some(lvalue) => {
                                in_place_written.insert((id, out_idx));
                                write_idents.push(lvalue);
                            }
                            None => {
                                let temp = uid::next_temp_name();
                                body.push_str(&format!(
                                    "{} {} = {};\n",
                                    value_cl_type.name(),
                                    temp,
                                    value_cl_type.zero_literal()
                                ));
                                temps.insert((id, out_idx), temp.clone());
                                write_idents.push(temp);
                            }
                        }
                    }
                    let statement = translate::substitute_writes(&with_reads, &write_idents);
                    body.push_str(&statement);
                    body.push('\n');
                }
                Fragment::UserCodeOutput(_) => {}
                Fragment::OutputField(of) => {
                    // `writeResult`: a Null/Unknown write type means this output slot was never
                    // actually assigned by its driving UserCode, so the epilog emits nothing for
                    // it (spec §4.6).
                    if !self.output_is_written(of.parent()) {
                        continue;
                    }
                    if let Some(uco) = self.fragments[of.parent()].as_user_code_output() {
                        if in_place_written.contains(&(uco.parent(), uco.output_index())) {
                            continue;
                        }
                    }
                    let value = self.read_expr_for(of.parent(), &temps, false)?;
                    let stmt = crate::io::write_tensor(
                        &of.field_type(),
                        &of.argument_name(),
                        value_cl_type,
                        &value,
                        true,
                    );
                    body.push_str(&stmt);
                    body.push('\n');
                }
            }
        }

        debug!("assembling hyper-kernel body for {function_name}: {params:?}");

        let signature = self.signature(function_name, value_cl_type);
        let defines = self.geometry_defines();
        let prolog = self.prolog(options);
        let bounds_check = self.bounds_check();
        let undefs = self.geometry_undefs();

        let source = if self.uses_local_memory() {
            format!(
                "{HELPER_PREAMBLE}{signature} {{\n{defines}{prolog}{tile}{bounds_check}{body}{undefs}}}\n",
                tile = self.tile_load_statement()?,
            )
        } else {
            format!("{HELPER_PREAMBLE}{signature} {{\n{defines}{prolog}{bounds_check}{body}{undefs}}}\n")
        };

        Ok(renumber_temps(&source))
    }

    /// Whether `parent` (a `UserCode` fragment id reached through a `UserCodeOutput`) actually
    /// wrote the output slot it drives. `Null`/`Unknown` write types correspond to an output
    /// argument the front end declared but whose slot the user code never assigned.
    fn output_is_written(&self, user_code_output_id: FragmentId) -> bool {
        let Some(uco) = self.fragments[user_code_output_id].as_user_code_output() else {
            return true;
        };
        let Some(uc) = self.fragments[uco.parent()].as_user_code() else { return true };
        !matches!(
            uc.write_type(uco.output_index()),
            crate::fragment::write_type::WriteType::Null | crate::fragment::write_type::WriteType::Unknown
        )
    }

    /// Non-`None` exactly when output `out_idx` of `user_code_id` performs an in-place non-local
    /// write (spec §4.5 step 2): its write type is `Nonlocal`/`ElementNonlocal` and the kernel's
    /// addressing mode allows writing straight through rather than deferring through a temporary.
    /// A `SmallTensor`-addressed non-local write with more than one tensor point can't be done
    /// in-place (the fragment runs once per field point, not once per tensor point) and must
    /// still defer through a temporary the `OutputField` epilog stores.
    fn in_place_write_target(
        &self,
        write_type: WriteType,
        user_code_id: FragmentId,
        out_idx: usize,
    ) -> Result<Option<String>, FragmentError> {
        let per_element = match write_type {
            WriteType::Nonlocal => false,
            WriteType::ElementNonlocal => true,
            WriteType::Local | WriteType::Null | WriteType::Unknown => return Ok(None),
        };
        let Some(of) = self.output_field_for(user_code_id, out_idx) else { return Ok(None) };
        if !allows_inplace_nonlocal_write(self.addressing_mode, &of.field_type()) {
            return Ok(None);
        }
        let cl_type = self.addressing_mode.cl_type(&of.field_type())?;
        let binding = translate::WriteBinding {
            index: out_idx,
            field_type: of.field_type(),
            field_name: of.argument_name(),
            cl_type,
        };
        translate::in_place_write_target(&binding, per_element).map(Some)
    }

    /// Finds the `OutputField` fragment (if any) this kernel uses to store output `out_idx` of
    /// `UserCode` fragment `user_code_id`, by walking through its `UserCodeOutput` fragment.
    fn output_field_for(&self, user_code_id: FragmentId, out_idx: usize) -> Option<&OutputField> {
        self.outputs.iter().find_map(|&oid| {
            let of = self.fragments[oid].as_output_field()?;
            let uco = self.fragments[of.parent()].as_user_code_output()?;
            (uco.parent() == user_code_id && uco.output_index() == out_idx).then_some(of)
        })
    }

    /// Resolves the read expression for fragment `parent_id`, as seen from a sibling reading it
    /// via an `@in<i>`-family token. `nonlocal` selects between the immutable, prolog-declared
    /// coordinates (`_row`/`_column`/…) and the mutable ones a fragment may have advanced
    /// (`row`/`column`/…), matching the token family actually used (spec §4.5): a plain `@in<i>`
    /// reads locally, `@inNonlocal<i>`/`@inElementNonlocal<i>` read non-locally. A non-local read
    /// of another fragment's temporary (a `UserCodeOutput`, not a buffer) can't be lowered at
    /// all — there is no buffer to re-address — and is the fatal "non-local read of embedded
    /// merged kernel" case spec §7 names.
    fn read_expr_for(
        &self,
        parent_id: FragmentId,
        temps: &HashMap<(FragmentId, usize), String>,
        nonlocal: bool,
    ) -> Result<String, FragmentError> {
        match &self.fragments[parent_id] {
            Fragment::InputField(input) => {
                let cl_type = self.addressing_mode.cl_type(&input.field_type())?;
                Ok(crate::io::read_tensor(&input.field_type(), &input.argument_name(), cl_type, !nonlocal))
            }
            Fragment::UserCodeOutput(uco) => {
                if nonlocal {
                    return Err(FragmentError::NonlocalReadOfEmbeddedMergedKernel);
                }
                Ok(temps.get(&(uco.parent(), uco.output_index())).cloned().unwrap_or_else(|| "0".to_string()))
            }
            _ => Err(FragmentError::UnsetOutputIndex { output_index: parent_id }),
        }
    }

    fn signature(&self, function_name: &str, _value_cl_type: CLType) -> String {
        let mut args = Vec::new();
        for &id in &self.inputs {
            if let Some(input) = self.fragments[id].as_input_field() {
                args.push(format!("__global const float *{}", input.argument_name()));
            }
        }
        for &id in &self.outputs {
            if let Some(output) = self.fragments[id].as_output_field() {
                args.push(format!("__global float *{}", output.argument_name()));
            }
        }
        if self.sampling_mode.needs_sampler() {
            args.push("sampler_t sampler".to_string());
        }
        format!("__kernel void {function_name}({})", args.join(", "))
    }

    /// Emits the geometry `#define`s exposed per bound field name (spec §6): `F_layers`,
    /// `F_rows`, `F_columns`, `F_layerStride`, `F_rowStride`, `F_tensorStride`, `F_partStride`,
    /// `F_tensorElements`. Image-backed fields omit `F_layers` for 2-D fields so user code can
    /// branch on `#ifdef F_layers` to tell a 2-D image from a 3-D one.
    fn geometry_defines(&self) -> String {
        let mut out = String::new();
        for &id in self.inputs.iter().chain(self.outputs.iter()) {
            let (name, field_type) = match &self.fragments[id] {
                Fragment::InputField(f) => (f.argument_name(), f.field_type()),
                Fragment::OutputField(f) => (f.argument_name(), f.field_type()),
                _ => continue,
            };
            out.push_str(&field_defines(&name, &field_type));
        }
        out
    }

    fn geometry_undefs(&self) -> String {
        let mut out = String::new();
        for &id in self.inputs.iter().chain(self.outputs.iter()) {
            let name = match &self.fragments[id] {
                Fragment::InputField(f) => f.argument_name(),
                Fragment::OutputField(f) => f.argument_name(),
                _ => continue,
            };
            out.push_str(&field_undefines(&name));
        }
        out
    }

    /// Emits the prolog block (spec §4.3): always the immutable `_column`/`_row`/`_layer`/
    /// `_tensorElement` coordinate set derived from the work-item's global id per this kernel's
    /// addressing mode, a mutable `layer`/`row`/`column`/`tensorElement` quadruple a fragment may
    /// advance to redirect a later write site, the live-dimension `_local*`/`_group*` pairs, and
    /// (when needed) the sampler declaration.
    fn prolog(&self, _options: &CompilerOptions) -> String {
        let work_field = self.work_field_type();
        let rank = work_field.field_shape().rank();
        let mut out = String::new();

        out.push_str("    const int _column = get_global_id(0);\n");
        if rank >= 2 {
            out.push_str("    const int _row = get_global_id(1);\n");
        } else {
            out.push_str("    const int _row = 0;\n");
        }

        match self.addressing_mode {
            AddressingMode::TensorElement if rank >= 3 => {
                // Modulo-first: layer varies fastest, tensor element varies slowest, per spec
                // §4.3's explicit resolution of the layer/tensor-element fold order.
                out.push_str(&format!(
                    "    const int _layer = get_global_id(2) % {layers};\n    \
                     const int _tensorElement = get_global_id(2) / {layers};\n",
                    layers = work_field.field_shape().layers().max(1),
                ));
            }
            AddressingMode::TensorElement if rank == 2 => {
                out.push_str(
                    "    const int _layer = 0;\n    const int _tensorElement = get_global_id(2);\n",
                );
            }
            AddressingMode::TensorElement => {
                out.push_str(
                    "    const int _layer = 0;\n    const int _tensorElement = get_global_id(1);\n",
                );
            }
            _ => {
                if rank >= 3 {
                    out.push_str("    const int _layer = get_global_id(2);\n");
                } else {
                    out.push_str("    const int _layer = 0;\n");
                }
                out.push_str("    const int _tensorElement = 0;\n");
            }
        }

        out.push_str(
            "    int layer = 0, row = 0, column = 0, tensorElement = 0;\n",
        );
        out.push_str(
            "    const int _localColumn = get_local_id(0);\n    const int _groupColumn = \
             get_group_id(0);\n",
        );
        if rank >= 2 {
            out.push_str(
                "    const int _localRow = get_local_id(1);\n    const int _groupRow = \
                 get_group_id(1);\n",
            );
        }
        if rank >= 3 || matches!(self.addressing_mode, AddressingMode::TensorElement) {
            out.push_str(
                "    const int _localLayer = get_local_id(2);\n    const int _groupLayer = \
                 get_group_id(2);\n",
            );
        }

        if let Some(flag) = self.sampling_mode.address_flag() {
            out.push_str(&format!(
                "    const sampler_t sampler = {flag} | CLK_FILTER_NEAREST;\n"
            ));
        }

        out
    }

    fn bounds_check(&self) -> String {
        let work_field = self.work_field_type();
        format!(
            "    if (_row >= {rows} || _column >= {columns}) return;\n",
            rows = work_field.field_shape().rows().max(1),
            columns = work_field.field_shape().columns().max(1),
        )
    }

    fn tile_load_statement(&self) -> Result<String, FragmentError> {
        let loader = self.tile_loader.as_ref().expect("uses_local_memory checked by caller");
        let input_name = self.inputs.iter().find_map(|&id| self.fragments[id].as_input_field());
        let field_name = input_name.map(|f| f.argument_name()).unwrap_or_default();
        let params = self.workgroup_params();
        let statement = loader.load_statement(
            &field_name,
            &format!("{field_name}_rowStride"),
            params.local_rows,
            params.local_columns,
        )?;
        Ok(format!(
            "    {decl}\n    {stmt}\n    barrier(CLK_LOCAL_MEM_FENCE);\n",
            decl = loader.declare("float", params.local_rows, params.local_columns),
            stmt = statement,
        ))
    }
}

/// Whether a non-local write to `field_type` under `mode` can be performed in place rather than
/// deferred through a temporary (spec §4.5 step 2): a `SmallTensor`-addressed field with a single
/// tensor point, or any `TensorElement`/`BigTensor` addressing, since those dispatch one work-item
/// per tensor point already and so have nothing left to defer.
fn allows_inplace_nonlocal_write(mode: AddressingMode, field_type: &FieldType) -> bool {
    match mode {
        AddressingMode::SmallTensor => field_type.tensor_points() == 1,
        AddressingMode::TensorElement | AddressingMode::BigTensor => true,
    }
}

/// Small fixed preamble of helper functions every emitted kernel carries (spec §4.6): `real`
/// extracts a complex value's real component, `complex` packs a real/imaginary pair, and
/// `realToComplex`/`complexToReal` convert between the two representations at a fragment
/// boundary where one side is `CLComplex` and the other a bare `float`.
const HELPER_PREAMBLE: &str = "static inline float real(float2 c) { return c.x; }\n\
static inline float2 complex(float re, float im) { return (float2)(re, im); }\n\
static inline float2 realToComplex(float re) { return (float2)(re, 0.0f); }\n\
static inline float complexToReal(float2 c) { return c.x; }\n\n";

/// The eight `#define`s exposed per bound field name `F` (spec §6).
fn field_defines(name: &str, field_type: &FieldType) -> String {
    let layout = field_type.layout();
    let mut out = String::new();
    if field_type.field_shape().rank() >= 3 || !field_type.element_type().is_image() {
        out.push_str(&format!("#define {name}_layers {}\n", layout.layers.max(1)));
    }
    out.push_str(&format!("#define {name}_rows {}\n", layout.rows.max(1)));
    out.push_str(&format!("#define {name}_columns {}\n", layout.columns.max(1)));
    out.push_str(&format!("#define {name}_layerStride {}\n", layout.layer_stride));
    out.push_str(&format!("#define {name}_rowStride {}\n", layout.field_row_stride));
    out.push_str(&format!("#define {name}_tensorStride {}\n", layout.tensor_stride));
    out.push_str(&format!("#define {name}_partStride {}\n", layout.part_stride));
    out.push_str(&format!("#define {name}_tensorElements {}\n", field_type.tensor_points()));
    out
}

fn field_undefines(name: &str) -> String {
    format!(
        "#undef {name}_layers\n#undef {name}_rows\n#undef {name}_columns\n#undef {name}_layerStride\n\
         #undef {name}_rowStride\n#undef {name}_tensorStride\n#undef {name}_partStride\n\
         #undef {name}_tensorElements\n"
    )
}

/// Renumbers every `_temp<N>_` occurrence in `source` to `_temp_1, _temp_2, …` in
/// first-appearance order (spec §4.6/§8 property 1).
fn renumber_temps(source: &str) -> String {
    let mut mapping: HashMap<String, String> = HashMap::new();
    let mut next = 1usize;
    let mut out = String::with_capacity(source.len());
    let bytes = source.as_bytes();
    let mut pos = 0;

    while let Some(rel) = source[pos..].find("_temp") {
        let start = pos + rel;
        out.push_str(&source[pos..start]);
        let digits_start = start + "_temp".len();
        let digits_end = bytes[digits_start..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
            + digits_start;
        if digits_end > digits_start && source[digits_end..].starts_with('_') {
            let token = &source[start..=digits_end];
            let renamed = mapping.entry(token.to_string()).or_insert_with(|| {
                let name = format!("_temp_{next}");
                next += 1;
                name
            });
            out.push_str(renamed);
            pos = digits_end + 1;
        } else {
            out.push_str("_temp");
            pos = start + "_temp".len();
        }
    }
    out.push_str(&source[pos..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{InputField, OutputField, UserCode, UserCodeOutput};
    use crate::layout::{ElementType, Shape};

    fn scalar_field() -> FieldType {
        FieldType::new(Shape::d2(4, 5), Shape::scalar(), ElementType::Float32)
    }

    fn add_constant_kernel() -> HyperKernel {
        let ft = scalar_field();
        let fragments = vec![
            Fragment::InputField(InputField::new(ft, 0, (0, 0))),
            Fragment::UserCode(UserCode::new("@out0 = @in0 + 0.5f;".to_string(), vec![0], 1).unwrap()),
            Fragment::UserCodeOutput(UserCodeOutput::new(1, 0, ft)),
            Fragment::OutputField(OutputField::new(2, ft, 0, AddressingMode::SmallTensor)),
        ];
        HyperKernel::new(fragments, vec![0], vec![3], AddressingMode::SmallTensor, SamplingMode::DontCare)
    }

    #[test]
    fn compiles_scalar_add_constant_kernel() {
        uid::reset();
        let kernel = add_constant_kernel();
        let source = kernel.compile("scalar_add", &CompilerOptions::default()).unwrap();
        assert!(source.contains("__kernel void scalar_add("));
        assert!(source.contains("_in_field_0[_row * _in_field_0_rowStride + _column]"));
        assert!(source.contains("+ 0.5f"));
        assert!(source.contains("if (_row >= 4 || _column >= 5) return;"));
        assert!(!source.contains("__local"));
    }

    #[test]
    fn renumbers_temps_in_first_appearance_order() {
        let source = "float _temp3_ = 0.0f; float _temp1_ = _temp3_;";
        let renamed = renumber_temps(source);
        assert_eq!(renamed, "float _temp_1 = 0.0f; float _temp_2 = _temp_1;");
    }

    #[test]
    fn duplicated_inputs_are_detected() {
        let ft = scalar_field();
        let fragments = vec![
            Fragment::InputField(InputField::new(ft, 0, (0, 0))),
            Fragment::InputField(InputField::new(ft, 0, (0, 0))),
        ];
        let kernel =
            HyperKernel::new(fragments, vec![0, 1], vec![], AddressingMode::SmallTensor, SamplingMode::DontCare);
        assert!(kernel.has_duplicated_inputs());
    }

    /// Two input slots with identical `FieldType` but distinct registers (independent external
    /// buffers of the same shape) are never duplicates, even though their shapes coincide.
    #[test]
    fn same_field_type_but_distinct_registers_are_not_duplicated() {
        let ft = scalar_field();
        let fragments = vec![
            Fragment::InputField(InputField::new(ft, 0, (1, 0))),
            Fragment::InputField(InputField::new(ft, 1, (2, 0))),
        ];
        let kernel =
            HyperKernel::new(fragments, vec![0, 1], vec![], AddressingMode::SmallTensor, SamplingMode::DontCare);
        assert!(!kernel.has_duplicated_inputs());
    }

    /// Spec §8 scenario S6: a kernel with inputs `[a, b, a]` (three slots, two distinct field
    /// types) normalizes to `[a, b]`, with the old slot-2 `InputField`'s dependent (here, the
    /// `UserCode` fragment reading it) now pointing at the surviving slot-0 fragment.
    #[test]
    fn remove_redundant_inputs_collapses_duplicate_slot_and_retargets_dependents() {
        let a = scalar_field();
        let b = FieldType::new(crate::layout::Shape::d2(4, 5), crate::layout::Shape::scalar(), ElementType::Complex32);
        let fragments = vec![
            Fragment::InputField(InputField::new(a, 0, (0, 0))),
            Fragment::InputField(InputField::new(b, 1, (1, 0))),
            Fragment::InputField(InputField::new(a, 2, (0, 0))),
            Fragment::UserCode(UserCode::new("@out0 = @in0 + @in1 + @in2;".to_string(), vec![0, 1, 2], 1).unwrap()),
            Fragment::UserCodeOutput(UserCodeOutput::new(3, 0, a)),
            Fragment::OutputField(OutputField::new(4, a, 0, AddressingMode::SmallTensor)),
        ];
        let kernel = HyperKernel::new(
            fragments,
            vec![0, 1, 2],
            vec![5],
            AddressingMode::SmallTensor,
            SamplingMode::DontCare,
        );
        assert!(kernel.has_duplicated_inputs());

        let normalized = kernel.remove_redundant_inputs();
        assert!(!normalized.has_duplicated_inputs());
        assert_eq!(normalized.inputs().len(), 2);

        let user_code = normalized.fragments()[3].as_user_code().expect("still a UserCode at the same slot");
        assert_eq!(user_code.inputs(), &[0, 1, 0]);
    }

    #[test]
    fn argument_count_includes_sampler_when_needed() {
        let ft = scalar_field();
        let fragments = vec![Fragment::InputField(InputField::new(ft, 0, (0, 0)))];
        let kernel = HyperKernel::new(
            fragments,
            vec![0],
            vec![],
            AddressingMode::SmallTensor,
            SamplingMode::NearestClampToEdge,
        );
        assert_eq!(kernel.argument_count(), 2);
    }

    #[test]
    fn max_argument_count_matches_default_budget() {
        assert_eq!(CompilerOptions::default().max_argument_count(), 256);
    }

    #[test]
    fn nonlocal_write_under_tensor_element_addressing_stores_in_place() {
        uid::reset();
        let ft = scalar_field();
        let fragments = vec![
            Fragment::InputField(InputField::new(ft, 0, (0, 0))),
            Fragment::UserCode(UserCode::new("@outNonlocal0 = @in0 * 2.0f;".to_string(), vec![0], 1).unwrap()),
            Fragment::UserCodeOutput(UserCodeOutput::new(1, 0, ft)),
            Fragment::OutputField(OutputField::new(2, ft, 0, AddressingMode::TensorElement)),
        ];
        let kernel = HyperKernel::new(
            fragments,
            vec![0],
            vec![3],
            AddressingMode::TensorElement,
            SamplingMode::DontCare,
        );
        let source = kernel.compile("nonlocal_write", &CompilerOptions::default()).unwrap();
        // Written straight to the output buffer via the mutable coordinates, not a `_temp` that
        // the epilog then stores.
        assert!(source.contains("_out_field_0[row"));
        assert!(!source.contains("_temp"));
    }

    #[test]
    fn nonlocal_write_under_small_tensor_multi_point_addressing_defers_through_temp() {
        uid::reset();
        let ft = FieldType::new(Shape::d2(4, 5), Shape::scalar(), ElementType::Float32);
        let multi_point_ft = FieldType::new(Shape::d2(4, 5), Shape::d1(4), ElementType::Float32);
        let fragments = vec![
            Fragment::InputField(InputField::new(ft, 0, (0, 0))),
            Fragment::UserCode(UserCode::new("@outNonlocal0 = @in0;".to_string(), vec![0], 1).unwrap()),
            Fragment::UserCodeOutput(UserCodeOutput::new(1, 0, multi_point_ft)),
            Fragment::OutputField(OutputField::new(2, multi_point_ft, 0, AddressingMode::SmallTensor)),
        ];
        let kernel =
            HyperKernel::new(fragments, vec![0], vec![3], AddressingMode::SmallTensor, SamplingMode::DontCare);
        let source = kernel.compile("nonlocal_deferred", &CompilerOptions::default()).unwrap();
        assert!(source.contains("_temp_1"));
    }

    /// A plain `@in<i>` read lowers through the immutable, prolog-declared coordinates even when
    /// the fragment's output is itself written non-locally.
    #[test]
    fn local_read_uses_immutable_prolog_coordinates() {
        uid::reset();
        let ft = scalar_field();
        let fragments = vec![
            Fragment::InputField(InputField::new(ft, 0, (0, 0))),
            Fragment::UserCode(UserCode::new("@out0 = @in0 + 1.0f;".to_string(), vec![0], 1).unwrap()),
            Fragment::UserCodeOutput(UserCodeOutput::new(1, 0, ft)),
            Fragment::OutputField(OutputField::new(2, ft, 0, AddressingMode::SmallTensor)),
        ];
        let kernel =
            HyperKernel::new(fragments, vec![0], vec![3], AddressingMode::SmallTensor, SamplingMode::DontCare);
        let source = kernel.compile("local_read", &CompilerOptions::default()).unwrap();
        assert!(source.contains("_in_field_0[_row * _in_field_0_rowStride + _column]"));
    }

    /// A `@inNonlocal<i>` read lowers through the mutable coordinates a fragment may have
    /// advanced, not the prolog's immutable per-thread ones (spec §4.5).
    #[test]
    fn nonlocal_read_uses_mutable_coordinates() {
        uid::reset();
        let ft = scalar_field();
        let fragments = vec![
            Fragment::InputField(InputField::new(ft, 0, (0, 0))),
            Fragment::UserCode(UserCode::new("@out0 = @inNonlocal0 + 1.0f;".to_string(), vec![0], 1).unwrap()),
            Fragment::UserCodeOutput(UserCodeOutput::new(1, 0, ft)),
            Fragment::OutputField(OutputField::new(2, ft, 0, AddressingMode::SmallTensor)),
        ];
        let kernel =
            HyperKernel::new(fragments, vec![0], vec![3], AddressingMode::SmallTensor, SamplingMode::DontCare);
        let source = kernel.compile("nonlocal_read", &CompilerOptions::default()).unwrap();
        assert!(source.contains("_in_field_0[row * _in_field_0_rowStride + column]"));
        assert!(!source.contains("_in_field_0[_row"));
    }

    /// A non-local read of a `UserCodeOutput` parent (another fragment's temporary, not a
    /// buffer) has no address to re-resolve through and is rejected.
    #[test]
    fn nonlocal_read_of_user_code_output_parent_is_rejected() {
        uid::reset();
        let ft = scalar_field();
        let fragments = vec![
            Fragment::InputField(InputField::new(ft, 0, (0, 0))),
            Fragment::UserCode(UserCode::new("@out0 = @in0 + 1.0f;".to_string(), vec![0], 1).unwrap()),
            Fragment::UserCodeOutput(UserCodeOutput::new(1, 0, ft)),
            Fragment::UserCode(UserCode::new("@out0 = @inNonlocal0 * 2.0f;".to_string(), vec![2], 1).unwrap()),
            Fragment::UserCodeOutput(UserCodeOutput::new(3, 0, ft)),
            Fragment::OutputField(OutputField::new(4, ft, 0, AddressingMode::SmallTensor)),
        ];
        let kernel =
            HyperKernel::new(fragments, vec![0], vec![5], AddressingMode::SmallTensor, SamplingMode::DontCare);
        let err = kernel.compile("nonlocal_read_of_temp", &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, FragmentError::NonlocalReadOfEmbeddedMergedKernel));
    }
}
