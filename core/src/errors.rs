//! Error types for the fragment model, the code-template expander and the merger.
//!
//! These are compile-back-end errors, not runtime errors: every variant here corresponds to a
//! bug in the graph the front-end dispatcher built, or in a user-supplied code string, never to
//! a condition that can arise from legitimate OpenCL device behavior. Nothing here is recovered
//! locally; callers surface these as terminating compile failures (spec §7).

use crate::addressing::AddressingMode;
use crate::fragment::write_type::WriteType;
use crate::tile::BorderPolicy;

// FRAGMENT ERROR
// ================================================================================================

/// Errors raised while scanning, translating or assembling a fragment DAG into OpenCL source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    /// Two distinct write-type tokens (e.g. `@out0` and `@outNonlocal0`) targeted the same
    /// output slot. Fatal per spec §3/§7.
    #[error(
        "output slot {output_index} has conflicting write statements: {first:?} and {second:?} \
         (multiple kernel output statements must be of same type)"
    )]
    MultipleWriteTypes { output_index: usize, first: WriteType, second: WriteType },

    /// `@outNonlocal<i>` (or `_writeTensorNonlocal<i>`) appeared in a BigTensor-addressed
    /// fragment. Not a valid combination per the token table in spec §6.
    #[error("non-local write is not valid in BigTensor addressing mode")]
    NonlocalWriteInBigTensor,

    /// A non-local read (`_readTensorNonlocal`/`_readTensorElementNonlocal`) was requested
    /// against a `UserCode` fragment that is itself embedded inside an already-merged kernel.
    #[error("non-local read of embedded merged kernel not expected")]
    NonlocalReadOfEmbeddedMergedKernel,

    /// Emission reached an `@outElement<i>`/`@outElementNonlocal<i>` site whose output index was
    /// never assigned (still the sentinel `-1`).
    #[error("output index for slot {output_index} was never set before emission")]
    UnsetOutputIndex { output_index: usize },

    /// `readElement`/`readTensor`/`writeElement`/`writeTensor` was asked to emit code for a
    /// field/CL-type combination the I/O helper has no rule for.
    #[error("unsupported field/CL-type combination in {operation}: {detail}")]
    UnsupportedFieldType { operation: &'static str, detail: std::string::String },

    /// The local-tile builder was asked for a border policy it does not implement.
    #[error("unsupported border policy: {0:?}")]
    UnsupportedBorderPolicy(BorderPolicy),

    /// `AddressingMode::cl_type` was asked for a (field type, tensor point count) combination
    /// that cannot occur in a well-formed graph; this is an internal consistency error, not a
    /// user-code mistake.
    #[error("internal error: no OpenCL type for addressing mode {mode:?} with {tensor_points} tensor point(s) of {element}")]
    InvalidAddressingCombination {
        mode: AddressingMode,
        element: &'static str,
        tensor_points: usize,
    },
}

// MERGE ERROR
// ================================================================================================

/// Reasons a fusion is illegal. Every variant mirrors one clause of the merge-legality predicate
/// in spec §4.7; `HyperKernel::can_merge_with_sink` returns `Ok(())` only when none apply, and
/// `Merger::merge` re-derives the same check so a caller that skips `can_merge_with_sink` still
/// gets a precise diagnostic rather than a silently-wrong graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("source uses BigTensor addressing, which can never drive a merge")]
    SourceIsBigTensor,

    #[error("source and sink addressing modes differ")]
    AddressingModeMismatch,

    #[error("source and sink work field shapes differ")]
    WorkfieldShapeMismatch,

    #[error("source and sink tensor shapes differ (required in TensorElement addressing)")]
    TensorShapeMismatch,

    #[error("source and sink workgroup parameters differ")]
    WorkgroupMismatch,

    #[error("sink already uses local memory")]
    SinkUsesLocalMemory,

    #[error("source uses local memory but local-memory merging is disabled")]
    SourceLocalMemoryDisallowed,

    #[error("sink reads an output of source non-locally")]
    SinkReadsSourceNonlocally,

    #[error("an output of source performs a non-local write")]
    SourcePerformsNonlocalWrite,

    #[error("source does not drive only the sink, or all of the sink's inputs; merging would \
             make an input of the merged kernel depend on one of its own outputs")]
    WouldCreateCycle,

    #[error("sampling modes are incompatible")]
    IncompatibleSamplingModes,

    #[error("merged kernel would require {count} arguments, exceeding the {max}-argument budget")]
    ArgumentCountOverflow { count: usize, max: usize },
}
