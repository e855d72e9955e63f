//! `KernelGraph`: the live set of hyper-kernels and virtual field registers a compilation pass
//! works over (spec §4.6/§4.7's merge-driver loop).

use std::collections::HashMap;

use log::trace;

use crate::hyperkernel::{CompilerOptions, HyperKernel, KernelId};
use crate::merger::Merger;
use crate::register::VirtualFieldRegister;

/// Owns every live [`HyperKernel`] and [`VirtualFieldRegister`] during a compilation pass. The
/// merger removes a kernel by folding it into another rather than mutating it in place, so
/// `KernelGraph` is the thing that actually tracks which ids are still live.
#[derive(Debug, Default)]
pub struct KernelGraph {
    kernels: HashMap<KernelId, HyperKernel>,
    registers: HashMap<KernelId, Vec<VirtualFieldRegister>>,
    next_id: KernelId,
}

impl KernelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `kernel` and its per-output registers, returning the id it was assigned.
    pub fn push(&mut self, kernel: HyperKernel, registers: Vec<VirtualFieldRegister>) -> KernelId {
        let id = self.next_id;
        self.next_id += 1;
        trace!("kernel graph: inserting kernel {id} ({} fragment(s))", kernel.fragments().len());
        self.kernels.insert(id, kernel);
        self.registers.insert(id, registers);
        id
    }

    pub fn get(&self, id: KernelId) -> Option<&HyperKernel> {
        self.kernels.get(&id)
    }

    pub fn registers(&self, id: KernelId) -> Option<&[VirtualFieldRegister]> {
        self.registers.get(&id).map(Vec::as_slice)
    }

    pub fn registers_mut(&mut self, id: KernelId) -> Option<&mut Vec<VirtualFieldRegister>> {
        self.registers.get_mut(&id)
    }

    /// Removes a kernel and its registers. `must_exist` documents caller intent: the merge driver
    /// loop always removes a kernel it just finished folding into another and expects that entry
    /// to still be present; a graph cleanup pass sweeping dead ids may legitimately find one
    /// already gone.
    pub fn remove(&mut self, id: KernelId, must_exist: bool) -> Option<HyperKernel> {
        let kernel = self.kernels.remove(&id);
        self.registers.remove(&id);
        if must_exist && kernel.is_none() {
            panic!("kernel graph: expected kernel {id} to still be live");
        }
        kernel
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = KernelId> + '_ {
        self.kernels.keys().copied()
    }

    /// Spec §6's `HyperKernel.findMergeableInput()`, lifted onto `KernelGraph` rather than onto
    /// one `HyperKernel` in isolation: legality depends on whether a candidate source's outputs
    /// are consumed anywhere else in the *live graph* (spec §4.7's cycle-avoidance clause,
    /// "source drives only sink, or all of sink's inputs"), which only the graph — not a single
    /// kernel — can answer. Returns the id of a live kernel that legally drives `sink_id` as a
    /// merge source, along with the `(sink_input_slot, source_output_index)` pairs `Merger::merge`
    /// needs, or `None` once no further legal fusion into this sink exists. A host compiler (spec
    /// §6's "driver that repeatedly calls it and invokes the merger until it returns none") calls
    /// this once per live sink until every sink returns `None`.
    pub fn find_mergeable_input(
        &self,
        sink_id: KernelId,
        options: &CompilerOptions,
    ) -> Option<(KernelId, Vec<(usize, usize)>)> {
        let sink = self.get(sink_id)?;

        for source_id in self.ids() {
            if source_id == sink_id {
                continue;
            }
            let Some(source) = self.get(source_id) else { continue };
            let Some(source_registers) = self.registers(source_id) else { continue };

            let mut mapping = Vec::new();
            let mut sole_consumer = true;
            let mut drives_sink = false;
            for (out_idx, register) in source_registers.iter().enumerate() {
                for &(consumer_id, input_slot) in register.sinks() {
                    if consumer_id == sink_id {
                        drives_sink = true;
                        mapping.push((input_slot, out_idx));
                    } else {
                        sole_consumer = false;
                    }
                }
            }
            if !drives_sink {
                continue;
            }

            if Merger::can_merge(source, sink, sole_consumer, options).is_ok() {
                trace!("kernel graph: {source_id} is a legal merge source for sink {sink_id}");
                return Some((source_id, mapping));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::{AddressingMode, SamplingMode};
    use crate::fragment::{Fragment, InputField, OutputField, UserCode, UserCodeOutput};
    use crate::layout::{ElementType, FieldType, Shape};

    fn trivial_kernel() -> HyperKernel {
        let ft = FieldType::new(Shape::d2(2, 2), Shape::scalar(), ElementType::Float32);
        let fragments = vec![
            Fragment::InputField(InputField::new(ft, 0, (0, 0))),
            Fragment::UserCode(UserCode::new("@out0 = @in0;".to_string(), vec![0], 1).unwrap()),
            Fragment::UserCodeOutput(UserCodeOutput::new(1, 0, ft)),
            Fragment::OutputField(OutputField::new(2, ft, 0, AddressingMode::SmallTensor)),
        ];
        HyperKernel::new(fragments, vec![0], vec![3], AddressingMode::SmallTensor, SamplingMode::DontCare)
    }

    #[test]
    fn push_then_get_round_trips() {
        let mut graph = KernelGraph::new();
        let id = graph.push(trivial_kernel(), vec![VirtualFieldRegister::new(0, 0)]);
        assert!(graph.get(id).is_some());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn remove_drops_kernel_and_its_registers() {
        let mut graph = KernelGraph::new();
        let id = graph.push(trivial_kernel(), vec![VirtualFieldRegister::new(0, 0)]);
        graph.remove(id, true);
        assert!(graph.get(id).is_none());
        assert!(graph.registers(id).is_none());
    }

    #[test]
    #[should_panic(expected = "expected kernel")]
    fn removing_a_required_missing_kernel_panics() {
        let mut graph = KernelGraph::new();
        graph.remove(0, true);
    }

    fn producer_consumer_pair() -> (HyperKernel, HyperKernel) {
        let ft = FieldType::new(Shape::d2(4, 5), Shape::scalar(), ElementType::Float32);
        let producer_fragments = vec![
            Fragment::InputField(InputField::new(ft, 0, (0, 0))),
            Fragment::UserCode(UserCode::new("@out0 = @in0 + 1.0f;".to_string(), vec![0], 1).unwrap()),
            Fragment::UserCodeOutput(UserCodeOutput::new(1, 0, ft)),
            Fragment::OutputField(OutputField::new(2, ft, 0, AddressingMode::SmallTensor)),
        ];
        let producer = HyperKernel::new(
            producer_fragments,
            vec![0],
            vec![3],
            AddressingMode::SmallTensor,
            SamplingMode::DontCare,
        );
        let consumer_fragments = vec![
            Fragment::InputField(InputField::new(ft, 0, (1, 0))),
            Fragment::UserCode(UserCode::new("@out0 = @in0 * 2.0f;".to_string(), vec![0], 1).unwrap()),
            Fragment::UserCodeOutput(UserCodeOutput::new(1, 0, ft)),
            Fragment::OutputField(OutputField::new(2, ft, 0, AddressingMode::SmallTensor)),
        ];
        let consumer = HyperKernel::new(
            consumer_fragments,
            vec![0],
            vec![3],
            AddressingMode::SmallTensor,
            SamplingMode::DontCare,
        );
        (producer, consumer)
    }

    #[test]
    fn find_mergeable_input_locates_sole_producer() {
        let (producer, consumer) = producer_consumer_pair();
        let mut graph = KernelGraph::new();
        let producer_id = graph.push(producer, vec![VirtualFieldRegister::new(0, 0)]);
        let consumer_id = graph.push(consumer, vec![VirtualFieldRegister::new(0, 0)]);
        graph.registers_mut(producer_id).unwrap()[0].add_sink(consumer_id, 0);

        let options = CompilerOptions::default();
        let (found_source, mapping) = graph.find_mergeable_input(consumer_id, &options).unwrap();
        assert_eq!(found_source, producer_id);
        assert_eq!(mapping, vec![(0, 0)]);
    }

    #[test]
    fn find_mergeable_input_is_none_once_no_producer_feeds_the_sink() {
        let (_, consumer) = producer_consumer_pair();
        let mut graph = KernelGraph::new();
        let consumer_id = graph.push(consumer, vec![VirtualFieldRegister::new(0, 0)]);

        let options = CompilerOptions::default();
        assert!(graph.find_mergeable_input(consumer_id, &options).is_none());
    }
}
