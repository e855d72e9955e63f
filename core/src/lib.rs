//! OpenCL kernel fragment model, code-template expansion, work-group derivation and kernel
//! fusion: the back-end that turns a DAG of field operations into a minimal set of `__kernel`
//! functions.
//!
//! The pieces, roughly leaves-first:
//!
//! - [`cltype`] / [`addressing`] — the OpenCL type descriptor and the three addressing modes
//!   that pick one.
//! - [`layout`] — field/tensor shapes and the memory layout (strides) derived from them.
//! - [`uid`] — the per-thread temporary-name allocator every code emitter draws from.
//! - [`io`] — pure pointer-arithmetic string builders over a field's memory layout.
//! - [`tile`] — local-memory tile loading with border policies.
//! - [`fragment`] — the closed fragment DAG (`InputField`, `UserCode`, `UserCodeOutput`,
//!   `OutputField`) and its write-type inference and template-expansion passes.
//! - [`workgroup`] — work-group parameter derivation.
//! - [`hyperkernel`] — a fragment DAG plus bindings, compiling to one kernel's OpenCL source.
//! - [`register`] — `VirtualFieldRegister`, the live-value bookkeeping a merge re-homes.
//! - [`merger`] — fusion legality and the merge procedure.
//! - [`graph`] — the live kernel graph a compilation pass works over.
//! - [`errors`] — the error types every fallible operation above returns.

pub mod addressing;
pub mod cltype;
pub mod errors;
pub mod fragment;
pub mod graph;
pub mod hyperkernel;
pub mod io;
pub mod layout;
pub mod merger;
pub mod register;
pub mod tile;
pub mod uid;
pub mod workgroup;

pub use addressing::{AddressingMode, SamplingMode};
pub use cltype::CLType;
pub use errors::{FragmentError, MergeError};
pub use hyperkernel::{CompilerOptions, HyperKernel, KernelId};
pub use layout::{ElementType, FieldType, MemoryLayout, Shape};
pub use merger::Merger;
