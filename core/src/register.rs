//! `VirtualFieldRegister`: a live value flowing between hyper-kernels in the kernel graph
//! (spec §4.6/§4.7).
//!
//! Every hyper-kernel output has exactly one register; every hyper-kernel input is bound to
//! exactly one register's value. Merging two kernels re-homes registers rather than copying
//! field data: the merger moves a soon-to-be-internal output's sinks, probe flag and name onto
//! whichever register survives the merge (spec §4.7's "probe preservation" requirement).

use crate::hyperkernel::KernelId;

/// One sink: a kernel that reads this register as one of its inputs, and which input slot.
pub type Sink = (KernelId, usize);

/// A named, possibly-probed, possibly-multiply-consumed value produced by one hyper-kernel
/// output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFieldRegister {
    source: KernelId,
    source_output_index: usize,
    sinks: Vec<Sink>,
    /// Set when a caller has asked to read this register's value directly (e.g. for debugging),
    /// which pins its producing output from ever being folded away by a merge.
    probed: bool,
    name: Option<String>,
}

impl VirtualFieldRegister {
    pub fn new(source: KernelId, source_output_index: usize) -> Self {
        Self { source, source_output_index, sinks: Vec::new(), probed: false, name: None }
    }

    pub fn source(&self) -> KernelId {
        self.source
    }

    pub fn source_output_index(&self) -> usize {
        self.source_output_index
    }

    pub fn sinks(&self) -> &[Sink] {
        &self.sinks
    }

    pub fn add_sink(&mut self, kernel: KernelId, input_index: usize) {
        self.sinks.push((kernel, input_index));
    }

    pub fn is_probed(&self) -> bool {
        self.probed
    }

    pub fn set_probed(&mut self, probed: bool) {
        self.probed = probed;
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Moves every sink of `other` onto `self`, leaving `other` with none. Used when a merge
    /// folds `other`'s producing output into `self`'s.
    pub fn steal_sinks_from(&mut self, other: &mut VirtualFieldRegister) {
        self.sinks.append(&mut other.sinks);
    }

    /// Moves `other`'s probe flag and name onto `self` (spec §4.7's probe-preservation
    /// requirement): a merge must never silently drop a probed or named output. `self`'s own
    /// probe flag and name, if already set, are kept.
    pub fn steal_probe_and_name_from(&mut self, other: &mut VirtualFieldRegister) {
        self.probed |= other.probed;
        other.probed = false;
        if self.name.is_none() {
            self.name = other.name.take();
        } else {
            other.name = None;
        }
    }

    /// Convenience combining [`Self::steal_sinks_from`] and [`Self::steal_probe_and_name_from`],
    /// the full re-homing a merge performs when one output of the source kernel becomes an
    /// internal value of the merged kernel.
    pub fn steal_outputs_from(&mut self, other: &mut VirtualFieldRegister) {
        self.steal_sinks_from(other);
        self.steal_probe_and_name_from(other);
    }

    /// Detaches this register from the circuit: clears its sinks and probe/name state. Callers
    /// remove the register from the owning graph's table separately; this only severs the edges
    /// so no dangling sink survives the removal.
    pub fn remove_from_circuit(&mut self) {
        self.sinks.clear();
        self.probed = false;
        self.name = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steal_sinks_moves_and_empties() {
        let mut a = VirtualFieldRegister::new(0, 0);
        let mut b = VirtualFieldRegister::new(1, 0);
        b.add_sink(2, 0);
        b.add_sink(3, 1);
        a.steal_sinks_from(&mut b);
        assert_eq!(a.sinks(), &[(2, 0), (3, 1)]);
        assert!(b.sinks().is_empty());
    }

    #[test]
    fn steal_probe_and_name_prefers_existing_name() {
        let mut a = VirtualFieldRegister::new(0, 0);
        a.set_name("kept");
        let mut b = VirtualFieldRegister::new(1, 0);
        b.set_probed(true);
        b.set_name("dropped");
        a.steal_probe_and_name_from(&mut b);
        assert!(a.is_probed());
        assert_eq!(a.name(), Some("kept"));
        assert!(!b.is_probed());
        assert_eq!(b.name(), None);
    }
}
