//! Property-based tests for the universal invariants listed in the
//! specification's TESTABLE PROPERTIES section. Each property is checked
//! against freshly built methods rather than fixed examples, the way the
//! corresponding seed scenarios in `construction_scenarios.rs` check fixed
//! examples.

use gpu_ir::types::BasicValueType;
use gpu_ir::value::ValueKind;
use gpu_ir::{
    ArithmeticFlags, BinaryArithKind, IrContext, Location, MethodBuilder, MethodDecl, SsaBuilder,
    TypeContext, Variable,
};
use proptest::prelude::*;

fn fresh() -> (IrContext, TypeContext) {
    (IrContext::new(), TypeContext::new())
}

/// `Not(Not(x)) == x`: no randomized input needed, the peephole's
/// correctness does not depend on which `Int1` parameter it is applied to.
#[test]
fn double_not_cancels() {
    let (ctx, types) = fresh();
    let i1 = types.get_primitive(BasicValueType::Int1);
    let (id, _) = ctx.declare_method(MethodDecl::new("not_not"));
    let mb = MethodBuilder::new(&ctx, &types, id, i1);
    let entry = mb.create_entry_block(Location::unknown()).unwrap();
    let bb = mb.block(entry);
    let x = mb.add_parameter(i1, "x");

    let not_x = bb.unary(Location::unknown(), x, gpu_ir::UnaryArithKind::Not, ArithmeticFlags::NONE).unwrap();
    let not_not_x = bb.unary(Location::unknown(), not_x, gpu_ir::UnaryArithKind::Not, ArithmeticFlags::NONE).unwrap();
    assert_eq!(not_not_x, x);
}

proptest! {
    /// Interning identity: constructing the same `(kind, type, operands,
    /// flags)` twice within one method builder returns identity-equal
    /// references, for arbitrary flag combinations (two distinct
    /// parameters as operands, so the peepholes have nothing to collapse).
    #[test]
    fn binary_arith_interning_is_identity_stable(with_unsigned in any::<bool>()) {
        let (ctx, types) = fresh();
        let i32_ty = types.get_primitive(BasicValueType::Int32);
        let (id, _) = ctx.declare_method(MethodDecl::new("interning"));
        let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);
        let entry = mb.create_entry_block(Location::unknown()).unwrap();
        let bb = mb.block(entry);
        let x = mb.add_parameter(i32_ty, "x");
        let y = mb.add_parameter(i32_ty, "y");

        // Max/Min never fold two distinct parameters together and is not
        // targeted by any peephole, so both constructions reach the
        // interner unchanged.
        let flags = if with_unsigned { ArithmeticFlags::Unsigned } else { ArithmeticFlags::NONE };
        let first = bb.binary(Location::unknown(), x, y, BinaryArithKind::Max, flags).unwrap();
        let second = bb.binary(Location::unknown(), x, y, BinaryArithKind::Max, flags).unwrap();
        prop_assert_eq!(first, second);

        // The opposite flag setting is a different unification key.
        let other_flags = if with_unsigned { ArithmeticFlags::NONE } else { ArithmeticFlags::Unsigned };
        let other = bb.binary(Location::unknown(), x, y, BinaryArithKind::Max, other_flags).unwrap();
        prop_assert_ne!(first, other);
    }

    /// Constant-fold correctness: folding `Add`/`Sub`/`Mul` on two constant
    /// operands must equal evaluating the kind's wrapping semantics
    /// directly on the same two values.
    #[test]
    fn binary_fold_matches_direct_evaluation(a in any::<i32>(), b in any::<i32>()) {
        let (ctx, types) = fresh();
        let i32_ty = types.get_primitive(BasicValueType::Int32);
        let (id, _) = ctx.declare_method(MethodDecl::new("fold"));
        let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);
        let entry = mb.create_entry_block(Location::unknown()).unwrap();
        let bb = mb.block(entry);

        let ca = bb.primitive_int(Location::unknown(), i32_ty, a as i64).unwrap();
        let cb = bb.primitive_int(Location::unknown(), i32_ty, b as i64).unwrap();

        for (kind, expected) in [
            (BinaryArithKind::Add, (a as i64).wrapping_add(b as i64)),
            (BinaryArithKind::Sub, (a as i64).wrapping_sub(b as i64)),
            (BinaryArithKind::Mul, (a as i64).wrapping_mul(b as i64)),
        ] {
            let result = bb.binary(Location::unknown(), ca, cb, kind, ArithmeticFlags::NONE).unwrap();
            match mb.value_kind(result) {
                ValueKind::Constant(gpu_ir::value::ConstantValue::Int(v)) => {
                    prop_assert_eq!(v, expected, "kind {:?} mismatched direct evaluation", kind);
                }
                other => prop_assert!(false, "expected a folded constant for {:?}, got {:?}", kind, other),
            }
        }
    }

    /// Trivial-phi property: an SSA diamond where both branches assign the
    /// same arbitrary constant collapses its join phi to that constant,
    /// for any seed value (not just a fixed literal).
    #[test]
    fn trivial_phi_collapses_for_any_shared_constant(value in any::<i32>()) {
        let (ctx, types) = fresh();
        let i32_ty = types.get_primitive(BasicValueType::Int32);
        let i1_ty = types.get_primitive(BasicValueType::Int1);
        let (id, _) = ctx.declare_method(MethodDecl::new("trivial_any"));
        let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);

        let entry = mb.create_entry_block(Location::unknown()).unwrap();
        let b1 = mb.create_basic_block(Location::unknown(), "b1");
        let b2 = mb.create_basic_block(Location::unknown(), "b2");
        let join = mb.create_basic_block(Location::unknown(), "join");

        let ssa = SsaBuilder::new(&mb);
        let x = Variable::new("x");
        let cond = mb.add_parameter(i1_ty, "cond");

        mb.block(entry).if_branch(Location::unknown(), cond, b1, b2).unwrap();
        mb.mark_processed(entry);
        ssa.seal(entry).unwrap();

        let v1 = mb.block(b1).primitive_int(Location::unknown(), i32_ty, value as i64).unwrap();
        ssa.set_value(b1, &x, v1);
        mb.block(b1).branch(Location::unknown(), join).unwrap();
        mb.mark_processed(b1);
        ssa.seal(b1).unwrap();

        let v2 = mb.block(b2).primitive_int(Location::unknown(), i32_ty, value as i64).unwrap();
        ssa.set_value(b2, &x, v2);
        mb.block(b2).branch(Location::unknown(), join).unwrap();
        mb.mark_processed(b2);
        ssa.seal(b2).unwrap();

        prop_assert_eq!(v1, v2, "equal constants must intern to one representative");
        let joined = ssa.get_value(join, &x).unwrap();
        prop_assert_eq!(joined, v1);
        prop_assert!(!matches!(mb.value_kind(joined), ValueKind::Phi { .. }));
    }

    /// After sealing, every phi in a loop header has exactly as many
    /// `(block, value)` arguments as the block has predecessors, for loops
    /// of varying (small) trip-count shape driven by how many times the
    /// caller chooses to "unroll" the back edge before closing it — here
    /// modeled simply as a fixed two-predecessor loop header (entry,
    /// latch) against an arbitrary loop-carried seed, since predecessor
    /// *count* is structural and does not vary with the carried value.
    #[test]
    fn sealed_loop_header_phi_arity_matches_predecessor_count(seed in any::<i32>()) {
        let (ctx, types) = fresh();
        let i32_ty = types.get_primitive(BasicValueType::Int32);
        let (id, _) = ctx.declare_method(MethodDecl::new("loop"));
        let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);

        let entry = mb.create_entry_block(Location::unknown()).unwrap();
        let header = mb.create_basic_block(Location::unknown(), "header");
        let latch = mb.create_basic_block(Location::unknown(), "latch");
        let exit = mb.create_basic_block(Location::unknown(), "exit");

        let ssa = SsaBuilder::new(&mb);
        let x = Variable::new("x");

        let init = mb.block(entry).primitive_int(Location::unknown(), i32_ty, seed as i64).unwrap();
        ssa.set_value(entry, &x, init);
        mb.block(entry).branch(Location::unknown(), header).unwrap();
        mb.mark_processed(entry);
        ssa.seal(entry).unwrap();

        // header has two predecessors (entry, latch) but latch has not been
        // visited yet, so header cannot be sealed until the latch exists.
        let header_val = ssa.get_value(header, &x).unwrap();
        mb.block(header).if_branch(
            Location::unknown(),
            {
                let i1_ty = types.get_primitive(BasicValueType::Int1);
                mb.block(header).primitive_int(Location::unknown(), i1_ty, 0).unwrap()
            },
            latch,
            exit,
        ).unwrap();
        mb.mark_processed(header);

        let bumped = mb.block(latch).binary(
            Location::unknown(),
            header_val,
            mb.block(latch).primitive_int(Location::unknown(), i32_ty, 1).unwrap(),
            BinaryArithKind::Add,
            ArithmeticFlags::NONE,
        ).unwrap();
        ssa.set_value(latch, &x, bumped);
        mb.block(latch).branch(Location::unknown(), header).unwrap();
        mb.mark_processed(latch);
        ssa.seal(latch).unwrap();
        ssa.seal(header).unwrap();
        ssa.seal_remaining_blocks().unwrap();

        let preds = mb.predecessors(header);
        match mb.value_kind(header_val) {
            ValueKind::Phi { args } => {
                prop_assert_eq!(args.len(), preds.len());
                let arg_blocks: std::collections::HashSet<_> = args.iter().map(|(b, _)| *b).collect();
                let pred_blocks: std::collections::HashSet<_> = preds.iter().copied().collect();
                prop_assert_eq!(arg_blocks, pred_blocks);
            }
            // A loop-carried variable bumped every iteration never becomes
            // trivial, so it must still be a phi; if peephole logic ever
            // changes to fold it away, this property should fail loudly.
            other => prop_assert!(false, "expected header variable to remain a phi, got {:?}", other),
        }
    }
}
