//! Kernel fusion: legality predicates and the merge procedure (spec §4.7).
//!
//! A merge always has a *source* (the producer being folded away) and a *sink* (the consumer
//! that absorbs it). `Merger::can_merge` re-derives every clause of the legality predicate so a
//! caller gets a precise [`MergeError`] rather than a panic or a silently-wrong graph; `Merger::
//! merge` performs the fold once legality has been established.

use log::info;

use crate::errors::MergeError;
use crate::fragment::{self, write_type::WriteType, Fragment, FragmentId};
use crate::hyperkernel::{CompilerOptions, HyperKernel, KernelId};

pub struct Merger;

impl Merger {
    /// Checks every clause of the merge-legality predicate (spec §4.7) without mutating either
    /// kernel. `source` must drive `sink` (directly or through one of `sink`'s other inputs) for
    /// this check to be meaningful; the cycle-avoidance clause additionally requires that `source`
    /// drives *only* `sink`, or all of `sink`'s inputs that it drives at all.
    pub fn can_merge(
        source: &HyperKernel,
        sink: &HyperKernel,
        source_is_sole_consumer: bool,
        options: &CompilerOptions,
    ) -> Result<(), MergeError> {
        use crate::addressing::AddressingMode;

        if matches!(source.addressing_mode(), AddressingMode::BigTensor) {
            return Err(MergeError::SourceIsBigTensor);
        }
        if source.addressing_mode() != sink.addressing_mode() {
            return Err(MergeError::AddressingModeMismatch);
        }
        if source.work_field_type().field_shape() != sink.work_field_type().field_shape() {
            return Err(MergeError::WorkfieldShapeMismatch);
        }
        if matches!(source.addressing_mode(), AddressingMode::TensorElement)
            && source.work_field_type().tensor_shape() != sink.work_field_type().tensor_shape()
        {
            return Err(MergeError::TensorShapeMismatch);
        }
        if source.workgroup_params() != sink.workgroup_params() {
            return Err(MergeError::WorkgroupMismatch);
        }
        if sink.uses_local_memory() {
            return Err(MergeError::SinkUsesLocalMemory);
        }
        if source.uses_local_memory() && !options.local_memory_merging {
            return Err(MergeError::SourceLocalMemoryDisallowed);
        }
        if source_performs_nonlocal_write(source) {
            return Err(MergeError::SourcePerformsNonlocalWrite);
        }
        if sink_reads_source_nonlocally(sink) {
            return Err(MergeError::SinkReadsSourceNonlocally);
        }
        if !source_is_sole_consumer {
            return Err(MergeError::WouldCreateCycle);
        }
        if crate::addressing::SamplingMode::merge(source.sampling_mode(), sink.sampling_mode()).is_none() {
            return Err(MergeError::IncompatibleSamplingModes);
        }

        let merged_argument_count =
            source.inputs().len() + sink.inputs().len() + sink.outputs().len();
        let max = options.max_argument_count();
        if merged_argument_count > max {
            return Err(MergeError::ArgumentCountOverflow { count: merged_argument_count, max });
        }

        Ok(())
    }

    /// Folds `source` into `sink`, returning the merged [`HyperKernel`].
    ///
    /// The merged fragment arena is `source`'s fragments followed by `sink`'s, with every
    /// fragment id `sink` used to reference one of its own fragments shifted by `source`'s arena
    /// length; everywhere `sink` referenced one of its own `InputField` fragments that duplicates
    /// a field `source` also reads, that reference is rewritten to `source`'s corresponding input
    /// instead, so the merge never introduces a duplicated kernel argument (spec §4.7's
    /// `removeRedundantInputs`). `sink`'s inputs that used to read one of `source`'s outputs are
    /// rewired directly onto `source`'s internal fragment producing that value — the edge that
    /// becomes purely internal to the merged kernel.
    pub fn merge(
        source: &HyperKernel,
        sink: &HyperKernel,
        source_output_for_sink_input: &[(usize, usize)],
        options: &CompilerOptions,
    ) -> Result<HyperKernel, MergeError> {
        Self::can_merge(source, sink, true, options)?;

        let offset = source.fragments().len();
        let mut fragments: Vec<Fragment> = source.fragments().to_vec();
        fragments.extend(sink.fragments().iter().cloned().map(|f| shift_fragment(f, offset)));

        // `source.outputs()[o]` is an `OutputField` fragment id; the sink must bind its dropped
        // input directly to the `UserCodeOutput` that field wraps (spec §4.7 step 5), not to the
        // `OutputField` itself, or the merged DAG would still contain a dangling write to a
        // field that source.rs no longer has a fragment table entry for past `compile`'s
        // `OutputField` epilog, and `read_expr_for` has no arm for reading an `OutputField`.
        let rewired: std::collections::HashMap<usize, FragmentId> = source_output_for_sink_input
            .iter()
            .map(|&(sink_input_slot, source_output_index)| {
                let output_field_id = source.outputs()[source_output_index];
                let parent = source.fragments()[output_field_id]
                    .as_output_field()
                    .expect("source.outputs() only contains OutputField fragment ids")
                    .parent();
                (sink_input_slot, parent)
            })
            .collect();

        let mut inputs: Vec<FragmentId> = source.inputs().to_vec();
        let mut seen_registers = std::collections::HashSet::new();
        for &id in source.inputs() {
            if let Some(f) = source.fragments()[id].as_input_field() {
                seen_registers.insert(f.register_id());
            }
        }

        for (slot, &sink_input_id) in sink.inputs().iter().enumerate() {
            if let Some(&redirect) = rewired.get(&slot) {
                // This input now reads an internal value of `source` directly; drop it from the
                // merged kernel's own input list and patch every consumer fragment that
                // referenced the old `sink` input id to point at `redirect` instead.
                retarget(&mut fragments, sink_input_id + offset, redirect);
                continue;
            }
            let shifted = sink_input_id + offset;
            if let Some(f) = fragments[shifted].as_input_field() {
                if seen_registers.contains(&f.register_id()) {
                    if let Some(existing) = source.find_input_by_register(f.register_id()) {
                        retarget(&mut fragments, shifted, source.inputs()[existing]);
                        continue;
                    }
                }
                seen_registers.insert(f.register_id());
            }
            inputs.push(shifted);
        }

        let mut outputs: Vec<FragmentId> = sink.outputs().iter().map(|&id| id + offset).collect();
        outputs.extend(
            source
                .outputs()
                .iter()
                .enumerate()
                .filter(|(idx, _)| !source_output_for_sink_input.iter().any(|&(_, o)| o == *idx))
                .map(|(_, &id)| id),
        );

        // Both `source` and `sink` number their own inputs/outputs from 0, so the union built
        // above generally contains duplicate `input_index`/`output_index` values; since those
        // values are what `argument_name()` turns into `_in_field_<i>`/`_out_field_<i>`, an
        // unrenumbered merge would emit a kernel signature with duplicate argument names (spec
        // §8 scenario S5 exercises exactly this: a probe-preserved source output surviving
        // alongside a sink output that was also originally numbered 0). Renumber every kept
        // `InputField`/`OutputField` fragment to its position in the final list.
        for (new_index, &id) in inputs.iter().enumerate() {
            if let Some(f) = fragments[id].as_input_field() {
                if f.input_index() != new_index {
                    fragments[id] = Fragment::InputField(crate::fragment::InputField::new(
                        f.field_type(),
                        new_index,
                        f.register_id(),
                    ));
                }
            }
        }
        for (new_index, &id) in outputs.iter().enumerate() {
            if let Some(f) = fragments[id].as_output_field() {
                if f.output_index() != new_index {
                    fragments[id] = Fragment::OutputField(crate::fragment::OutputField::new(
                        f.parent(),
                        f.field_type(),
                        new_index,
                        f.addressing_mode(),
                    ));
                }
            }
        }

        info!(
            "merged kernel with {} inputs and {} outputs ({} fragments)",
            inputs.len(),
            outputs.len(),
            fragments.len()
        );

        Ok(HyperKernel::new(fragments, inputs, outputs, sink.addressing_mode(), sink.sampling_mode()))
    }

    /// Horizontal merge: two kernels that share no producer/consumer relationship but dispatch
    /// over the same work-group parameters can be emitted as one kernel with a combined argument
    /// list, provided the combination still respects the argument-count cap (spec §4.7).
    pub fn can_share_multi_output_kernel(
        a: &HyperKernel,
        b: &HyperKernel,
        options: &CompilerOptions,
    ) -> bool {
        a.addressing_mode() == b.addressing_mode()
            && a.work_field_type().field_shape() == b.work_field_type().field_shape()
            && a.workgroup_params() == b.workgroup_params()
            && !a.uses_local_memory()
            && !b.uses_local_memory()
            && crate::addressing::SamplingMode::merge(a.sampling_mode(), b.sampling_mode()).is_some()
            && a.inputs().len() + a.outputs().len() + b.inputs().len() + b.outputs().len()
                <= options.max_argument_count()
    }
}

fn source_performs_nonlocal_write(kernel: &HyperKernel) -> bool {
    kernel.outputs().iter().any(|&id| {
        let Some(out) = kernel.fragments()[id].as_output_field() else { return false };
        let Some(uco) = kernel.fragments()[out.parent()].as_user_code_output() else { return false };
        let Some(uc) = kernel.fragments()[uco.parent()].as_user_code() else { return false };
        matches!(
            uc.write_type(uco.output_index()),
            WriteType::Nonlocal | WriteType::ElementNonlocal
        )
    })
}

/// Spec §4.7's "sink must not read any of source's would-be-merged outputs non-locally"
/// legality clause (the `_readTensor*`-on-an-embedded-merged-kernel case spec §4.5/§4.6 marks
/// fatal). This checks for *any* non-local read/write token anywhere in the sink's code rather
/// than tracing whether a specific non-local read targets the specific input slot source would
/// occupy post-merge — coarser than the spec's per-input `nonlocallyReadInputIndices`, but
/// conservative in the safe direction: it can reject a legal merge (a sink that reads some
/// *other* input non-locally, or only writes non-locally, with no non-local read of source's
/// slot at all) but never accepts an illegal one. Precise per-slot tracking would need the
/// merger to know which input slot a candidate source will land in before deciding legality,
/// which today is the caller's (`KernelGraph::find_mergeable_input`) job, not this function's.
fn sink_reads_source_nonlocally(sink: &HyperKernel) -> bool {
    sink.fragments().iter().any(|f| matches!(f, Fragment::UserCode(uc) if uc.code().contains("Nonlocal")))
}

fn shift_fragment(fragment: Fragment, offset: usize) -> Fragment {
    match fragment {
        Fragment::InputField(f) => Fragment::InputField(f),
        Fragment::UserCode(uc) => {
            let shifted_inputs = uc.inputs().iter().map(|id| id + offset).collect();
            Fragment::UserCode(
                crate::fragment::UserCode::new(uc.code().to_string(), shifted_inputs, uc.output_count())
                    .expect("previously-validated code re-scans identically"),
            )
        }
        Fragment::UserCodeOutput(uco) => Fragment::UserCodeOutput(
            crate::fragment::UserCodeOutput::new(uco.parent() + offset, uco.output_index(), uco.field_type()),
        ),
        Fragment::OutputField(of) => Fragment::OutputField(crate::fragment::OutputField::new(
            of.parent() + offset,
            of.field_type(),
            of.output_index(),
            of.addressing_mode(),
        )),
    }
}

/// Rewrites every reference to `from` in `fragments` to point at `to` instead, used to splice a
/// dropped duplicate/internalized input out of the merged arena (spec §4.7). Also used directly
/// by `HyperKernel::remove_redundant_inputs` for the single-kernel input-dedup pass, since it is
/// the same "repoint every dependent, drop the old slot" operation on one fewer kernel.
pub(crate) fn retarget(fragments: &mut [Fragment], from: FragmentId, to: FragmentId) {
    for fragment in fragments.iter_mut() {
        match fragment {
            Fragment::UserCode(uc) => {
                let remapped: Vec<FragmentId> =
                    uc.inputs().iter().map(|&id| if id == from { to } else { id }).collect();
                *uc = crate::fragment::UserCode::new(uc.code().to_string(), remapped, uc.output_count())
                    .expect("previously-validated code re-scans identically");
            }
            Fragment::UserCodeOutput(uco) => {
                if uco.parent() == from {
                    *uco = crate::fragment::UserCodeOutput::new(to, uco.output_index(), uco.field_type());
                }
            }
            Fragment::OutputField(of) => {
                if of.parent() == from {
                    *of = crate::fragment::OutputField::new(
                        to,
                        of.field_type(),
                        of.output_index(),
                        of.addressing_mode(),
                    );
                }
            }
            Fragment::InputField(_) => {}
        }
    }
}

/// Marker kept for documentation purposes: every `KernelId`/`FragmentId` pair the merger touches
/// is a plain arena index, never a pointer — see `crate::graph::KernelGraph` for the owning
/// arena's lifetime story.
#[allow(dead_code)]
fn _assert_kernel_id_is_plain_index(_id: KernelId) {}
