//! A GPU-kernel intermediate representation built around arena-indexed
//! values and blocks rather than `Rc<RefCell<_>>` graphs, so that cyclic
//! structures (phis referencing phis across a loop header) are ordinary
//! data instead of something `unsafe` or reference-counting has to paper
//! over.
//!
//! The construction surface follows Braun, Buchwald & Hack's "Simple and
//! Efficient Construction of Static Single Assignment Form": callers
//! write straight-line code per block and call into [`ssa::SsaBuilder`]
//! for variable reads; blocks seal once every predecessor is known, and
//! sealing resolves any phi left incomplete in the meantime.
//!
//! Module map:
//! - [`location`] — opaque source-location tags carried on every value.
//! - [`diagnostics`] — the crate's error type and invariant checks.
//! - [`types`] — the type arena ([`types::TypeContext`]) and [`types::TypeId`].
//! - [`value`] — [`value::ValueKind`], the arena index types, and constants.
//! - [`kinds`] — arithmetic/compare operator kinds and their flag sets.
//! - [`interner`] — the C1 content-addressing table for pure values.
//! - [`context`] — [`context::IrContext`], the per-compilation method registry.
//! - [`method`] — [`method::MethodBuilder`] and the frozen [`method::Method`].
//! - [`block`] — [`block::BlockBuilder`], the per-block append surface.
//! - [`builder`] — the typed factory methods (arithmetic, control flow,
//!   memory) with their folds and peepholes.
//! - [`ssa`] — [`ssa::SsaBuilder`], the Braun-et-al variable resolver.
//! - [`rebuilder`] — [`rebuilder::Rebuilder`], for cloning/inlining/
//!   specializing a finalized method through the same factory surface.

pub mod block;
pub mod builder;
pub mod context;
pub mod diagnostics;
pub mod interner;
pub mod kinds;
pub mod location;
pub mod method;
pub mod rebuilder;
pub mod ssa;
pub mod types;
pub mod value;

pub use block::BlockBuilder;
pub use builder::PhiBuilder;
pub use context::{IrContext, MethodDecl};
pub use diagnostics::{IrError, IrResult};
pub use kinds::{
    ArithmeticFlags, BinaryArithKind, CompareFlags, CompareKind, TernaryArithKind, UnaryArithKind,
};
pub use location::Location;
pub use method::{Method, MethodBuilder, Parameter};
pub use rebuilder::{ExitPair, RebuildMode, Rebuilder, TypeSpecializer};
pub use ssa::{SsaBuilder, Variable};
pub use types::{AddressSpace, BasicValueType, Type, TypeContext, TypeId};
pub use value::{
    AtomicKind, BarrierKind, BlockId, ConstantValue, MethodId, ShuffleKind, Value, ValueId,
    ValueKind,
};
