//! End-to-end seed scenarios from the specification's TESTABLE PROPERTIES
//! section, one `#[test]` per scenario, exercised through the public crate
//! surface rather than any module-internal helper.

use std::collections::HashMap;

use gpu_ir::{
    ArithmeticFlags, BinaryArithKind, CompareFlags, IrContext, Location, Method, MethodBuilder,
    MethodDecl, RebuildMode, Rebuilder, SsaBuilder, TypeContext, UnaryArithKind, Variable,
};
use gpu_ir::types::BasicValueType;
use gpu_ir::value::ValueKind;
use pretty_assertions::assert_eq;

fn fresh() -> (IrContext, TypeContext) {
    (IrContext::new(), TypeContext::new())
}

/// Scenario 1 — Algebraic collapse: `Mul(x, 4)` then `Add(_, 0)` collapses
/// all the way to a single `Shl(x, 2)`, with no `Mul` or `Add` left in the
/// emitted IR.
#[test]
fn scenario_1_algebraic_collapse() {
    let (ctx, types) = fresh();
    let i32_ty = types.get_primitive(BasicValueType::Int32);
    let (id, _) = ctx.declare_method(MethodDecl::new("collapse"));
    let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);
    let entry = mb.create_entry_block(Location::unknown()).unwrap();
    let bb = mb.block(entry);
    let x = mb.add_parameter(i32_ty, "x");
    let y = mb.add_parameter(i32_ty, "y");

    let four = bb.primitive_int(Location::unknown(), i32_ty, 4).unwrap();
    let a = bb
        .binary(Location::unknown(), x, four, BinaryArithKind::Mul, ArithmeticFlags::NONE)
        .unwrap();
    let zero = bb.primitive_int(Location::unknown(), i32_ty, 0).unwrap();
    let b = bb
        .binary(Location::unknown(), a, zero, BinaryArithKind::Add, ArithmeticFlags::NONE)
        .unwrap();
    bb.ret(Location::unknown(), i32_ty, Some(b)).unwrap();
    let method = mb.finalize().unwrap();
    let _ = y;

    let mut saw_shl = false;
    for value in &method.arena {
        match &value.kind {
            ValueKind::BinaryArith { kind: BinaryArithKind::Mul, .. } => {
                panic!("Mul should have been rewritten away")
            }
            ValueKind::BinaryArith { kind: BinaryArithKind::Add, .. } => {
                panic!("Add(_, 0) should have collapsed to its left operand")
            }
            ValueKind::BinaryArith { kind: BinaryArithKind::Shl, .. } => saw_shl = true,
            _ => {}
        }
    }
    assert!(saw_shl, "expected exactly one Shl in the emitted IR");

    let term = method.value(method.block(entry).terminator.unwrap());
    match &term.kind {
        ValueKind::Return(Some(v)) => {
            assert!(matches!(
                method.value(method.resolve(*v)).kind,
                ValueKind::BinaryArith { kind: BinaryArithKind::Shl, .. }
            ));
        }
        other => panic!("expected Return(Some(Shl)), got {other:?}"),
    }
}

/// Scenario 2 — Predicate simplification: `Predicate(Not(c), true, c)`
/// collapses through the `Not`-swap and Int1-specialization rules into
/// `Or(c, c)`, which the interner then deduplicates down to `c` itself.
#[test]
fn scenario_2_predicate_simplification() {
    let (ctx, types) = fresh();
    let i1 = types.get_primitive(BasicValueType::Int1);
    let (id, _) = ctx.declare_method(MethodDecl::new("select"));
    let mb = MethodBuilder::new(&ctx, &types, id, i1);
    let entry = mb.create_entry_block(Location::unknown()).unwrap();
    let bb = mb.block(entry);
    let c = mb.add_parameter(i1, "c");

    let not_c = bb.unary(Location::unknown(), c, UnaryArithKind::Not, ArithmeticFlags::NONE).unwrap();
    let true_const = bb.primitive_int(Location::unknown(), i1, 1).unwrap();
    let result = bb.predicate(Location::unknown(), not_c, true_const, c).unwrap();

    assert_eq!(result, c, "Predicate(Not(c), true, c) must collapse all the way to c");
}

/// Scenario 3 — SSA diamond: a phi at the join with arguments `(B1, 2)` and
/// `(B2, 1)`.
#[test]
fn scenario_3_ssa_diamond() {
    let (ctx, types) = fresh();
    let i32_ty = types.get_primitive(BasicValueType::Int32);
    let i1_ty = types.get_primitive(BasicValueType::Int1);
    let (id, _) = ctx.declare_method(MethodDecl::new("diamond"));
    let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);

    let entry = mb.create_entry_block(Location::unknown()).unwrap();
    let b1 = mb.create_basic_block(Location::unknown(), "b1");
    let b2 = mb.create_basic_block(Location::unknown(), "b2");
    let join = mb.create_basic_block(Location::unknown(), "join");

    let ssa = SsaBuilder::new(&mb);
    let x = Variable::new("x");
    let cond = mb.add_parameter(i1_ty, "cond");

    let one = mb.block(entry).primitive_int(Location::unknown(), i32_ty, 1).unwrap();
    ssa.set_value(entry, &x, one);
    mb.block(entry).if_branch(Location::unknown(), cond, b1, b2).unwrap();
    mb.mark_processed(entry);
    ssa.seal(entry).unwrap();

    let two = mb.block(b1).primitive_int(Location::unknown(), i32_ty, 2).unwrap();
    ssa.set_value(b1, &x, two);
    mb.block(b1).branch(Location::unknown(), join).unwrap();
    mb.mark_processed(b1);
    ssa.seal(b1).unwrap();

    mb.block(b2).branch(Location::unknown(), join).unwrap();
    mb.mark_processed(b2);
    ssa.seal(b2).unwrap();

    let joined = ssa.get_value(join, &x).unwrap();
    match mb.value_kind(joined) {
        ValueKind::Phi { args } => {
            let mut by_block: HashMap<_, _> = args.into_iter().collect();
            assert_eq!(by_block.remove(&b1), Some(two));
            assert_eq!(by_block.remove(&b2), Some(one));
        }
        other => panic!("expected phi at join, got {other:?}"),
    }
}

/// Scenario 4 — Trivial phi elimination: both branches set `x = 7`, so the
/// join's phi collapses to the shared constant representative.
#[test]
fn scenario_4_trivial_phi_elimination() {
    let (ctx, types) = fresh();
    let i32_ty = types.get_primitive(BasicValueType::Int32);
    let i1_ty = types.get_primitive(BasicValueType::Int1);
    let (id, _) = ctx.declare_method(MethodDecl::new("trivial"));
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

    let seven_a = mb.block(b1).primitive_int(Location::unknown(), i32_ty, 7).unwrap();
    ssa.set_value(b1, &x, seven_a);
    mb.block(b1).branch(Location::unknown(), join).unwrap();
    mb.mark_processed(b1);
    ssa.seal(b1).unwrap();

    let seven_b = mb.block(b2).primitive_int(Location::unknown(), i32_ty, 7).unwrap();
    ssa.set_value(b2, &x, seven_b);
    mb.block(b2).branch(Location::unknown(), join).unwrap();
    mb.mark_processed(b2);
    ssa.seal(b2).unwrap();

    assert_eq!(seven_a, seven_b, "interning must unify the two constant 7s first");
    let joined = ssa.get_value(join, &x).unwrap();
    assert_eq!(joined, seven_a, "the phi must eliminate to the shared constant");
}

/// Scenario 5 — Inline rebuild: `f(a, b) = return Add(a, b)` inlined with
/// `a -> 3, b -> 4` folds the addition into the constant 7 at the inline
/// site.
#[test]
fn scenario_5_inline_rebuild_folds() {
    let (ctx, types) = fresh();
    let i32_ty = types.get_primitive(BasicValueType::Int32);

    let (callee_id, _) = ctx.declare_method(MethodDecl::new("f"));
    let callee_mb = MethodBuilder::new(&ctx, &types, callee_id, i32_ty);
    callee_mb.create_entry_block(Location::unknown()).unwrap();
    let callee_entry = callee_mb.entry_block().unwrap();
    let callee_bb = callee_mb.block(callee_entry);
    let a = callee_mb.add_parameter(i32_ty, "a");
    let b = callee_mb.add_parameter(i32_ty, "b");
    let sum = callee_bb
        .binary(Location::unknown(), a, b, BinaryArithKind::Add, ArithmeticFlags::NONE)
        .unwrap();
    callee_bb.ret(Location::unknown(), i32_ty, Some(sum)).unwrap();
    let callee: Method = callee_mb.finalize().unwrap();

    let (caller_id, _) = ctx.declare_method(MethodDecl::new("caller"));
    let caller_mb = MethodBuilder::new(&ctx, &types, caller_id, i32_ty);
    caller_mb.create_entry_block(Location::unknown()).unwrap();
    let caller_entry = caller_mb.entry_block().unwrap();
    let caller_bb = caller_mb.block(caller_entry);
    let three = caller_bb.primitive_int(Location::unknown(), i32_ty, 3).unwrap();
    let four = caller_bb.primitive_int(Location::unknown(), i32_ty, 4).unwrap();

    let method_map = HashMap::new();
    let rebuilder = Rebuilder::new(
        &callee,
        &caller_mb,
        RebuildMode::Inline,
        &[three, four],
        &method_map,
        None,
    )
    .unwrap();
    let exits = rebuilder.rebuild().unwrap();

    assert_eq!(exits.len(), 1);
    let (_, return_value) = exits[0];
    match caller_mb.value_kind(return_value.unwrap()) {
        ValueKind::Constant(gpu_ir::value::ConstantValue::Int(7)) => {}
        other => panic!("expected the inlined addition to fold to 7, got {other:?}"),
    }
}

/// Scenario 6 — Rebuild-time fold: `GetField(param, 0)` cannot fold in the
/// callee (the parameter is an opaque base, not a `SetField`/`Null` chain),
/// but inlining it against a caller-side `SetField(Null, 0, 42)` argument
/// lets the rebuilt `GetField` see straight through to the constant — a fold
/// the source method never had the information to perform itself.
#[test]
fn scenario_6_get_field_folds_harder_across_inline_boundary() {
    let (ctx, types) = fresh();
    let i32_ty = types.get_primitive(BasicValueType::Int32);
    let f32_ty = types.get_primitive(BasicValueType::Float32);
    let struct_ty = types.create_structure("Pair", vec![i32_ty, f32_ty]);

    let (callee_id, _) = ctx.declare_method(MethodDecl::new("read_first"));
    let callee_mb = MethodBuilder::new(&ctx, &types, callee_id, i32_ty);
    callee_mb.create_entry_block(Location::unknown()).unwrap();
    let callee_entry = callee_mb.entry_block().unwrap();
    let callee_bb = callee_mb.block(callee_entry);
    let s = callee_mb.add_parameter(struct_ty, "s");
    let first = callee_bb.get_field(Location::unknown(), s, 0).unwrap();
    // Not foldable yet: `s` is a bare parameter, not a SetField/Null chain.
    assert!(matches!(callee_mb.value_kind(first), ValueKind::GetField { .. }));
    callee_bb.ret(Location::unknown(), i32_ty, Some(first)).unwrap();
    let callee: Method = callee_mb.finalize().unwrap();

    let (caller_id, _) = ctx.declare_method(MethodDecl::new("caller"));
    let caller_mb = MethodBuilder::new(&ctx, &types, caller_id, i32_ty);
    caller_mb.create_entry_block(Location::unknown()).unwrap();
    let caller_entry = caller_mb.entry_block().unwrap();
    let caller_bb = caller_mb.block(caller_entry);
    let forty_two = caller_bb.primitive_int(Location::unknown(), i32_ty, 42).unwrap();
    let pair = caller_bb.null(Location::unknown(), struct_ty).unwrap();
    let pair = caller_bb.set_field(Location::unknown(), pair, 0, forty_two).unwrap();

    let method_map = HashMap::new();
    let rebuilder = Rebuilder::new(
        &callee,
        &caller_mb,
        RebuildMode::Inline,
        &[pair],
        &method_map,
        None,
    )
    .unwrap();
    let exits = rebuilder.rebuild().unwrap();

    assert_eq!(exits.len(), 1);
    let (_, return_value) = exits[0];
    match caller_mb.value_kind(return_value.unwrap()) {
        ValueKind::Constant(gpu_ir::value::ConstantValue::Int(42)) => {}
        other => panic!("expected the rebuilt GetField to fold through the inlined SetField to 42, got {other:?}"),
    }
}

/// Scenario 7 — Array linearization: a 1-D extent/index pair linearizes to
/// the bare index; attempting the 2-D case (multi-dimensional arrays are
/// not yet enabled) raises `UnsupportedOperation` rather than miscomputing.
#[test]
fn scenario_7_array_linearization_1d_and_rejected_2d() {
    let (ctx, types) = fresh();
    let i32_ty = types.get_primitive(BasicValueType::Int32);
    let (id, _) = ctx.declare_method(MethodDecl::new("index"));
    let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);
    let entry = mb.create_entry_block(Location::unknown()).unwrap();
    let bb = mb.block(entry);

    let i = mb.add_parameter(i32_ty, "i");
    let n = mb.add_parameter(i32_ty, "n");
    let addr = bb.array_address(Location::unknown(), &[i], &[n], 0).unwrap();
    assert_eq!(addr, i, "a single-dimension ArrayAddress must yield the bare index");

    let j = mb.add_parameter(i32_ty, "j");
    let m = mb.add_parameter(i32_ty, "m");
    let err = bb.array_address(Location::unknown(), &[i, j], &[n, m], 0);
    assert!(err.is_err(), "2-D array addressing must be rejected until multi-dim support lands");
}

/// Boundary law: `SwitchBranch(v, [a, b]) ≡ IfBranch(Equal(v, 0), a, b)`.
#[test]
fn switch_with_two_targets_collapses_to_if_branch() {
    let (ctx, types) = fresh();
    let i32_ty = types.get_primitive(BasicValueType::Int32);
    let (id, _) = ctx.declare_method(MethodDecl::new("switch2"));
    let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);
    let entry = mb.create_entry_block(Location::unknown()).unwrap();
    let t1 = mb.create_basic_block(Location::unknown(), "t1");
    let t2 = mb.create_basic_block(Location::unknown(), "t2");
    let bb = mb.block(entry);
    let v = mb.add_parameter(i32_ty, "v");
    let term = bb.switch_branch(Location::unknown(), v, vec![t1, t2]).unwrap();
    match mb.value_kind(term) {
        ValueKind::IfBranch { on_true, on_false, .. } => {
            assert_eq!(on_true, t1);
            assert_eq!(on_false, t2);
        }
        other => panic!("expected IfBranch, got {other:?}"),
    }
}

/// Boundary law: `Predicate(true, t, f) ≡ t`, `Predicate(false, t, f) ≡ f`.
#[test]
fn predicate_on_constant_condition_picks_branch() {
    let (ctx, types) = fresh();
    let i32_ty = types.get_primitive(BasicValueType::Int32);
    let i1 = types.get_primitive(BasicValueType::Int1);
    let (id, _) = ctx.declare_method(MethodDecl::new("pick"));
    let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);
    let entry = mb.create_entry_block(Location::unknown()).unwrap();
    let bb = mb.block(entry);
    let t = mb.add_parameter(i32_ty, "t");
    let f = mb.add_parameter(i32_ty, "f");

    let true_c = bb.primitive_int(Location::unknown(), i1, 1).unwrap();
    let false_c = bb.primitive_int(Location::unknown(), i1, 0).unwrap();
    assert_eq!(bb.predicate(Location::unknown(), true_c, t, f).unwrap(), t);
    assert_eq!(bb.predicate(Location::unknown(), false_c, t, f).unwrap(), f);
}

/// `GetField(SetField(s, i, v), i) == v`, and an unrelated index still sees
/// through to the untouched base (already covered at the unit level in
/// `builder.rs`; repeated here against the public surface with a second
/// write layered on top, matching "access chains are desugared into the
/// obvious sequence").
#[test]
fn field_chain_round_trips_through_two_writes() {
    let (ctx, types) = fresh();
    let i32_ty = types.get_primitive(BasicValueType::Int32);
    let f32_ty = types.get_primitive(BasicValueType::Float32);
    let struct_ty = types.create_structure("Pair", vec![i32_ty, f32_ty]);
    let (id, _) = ctx.declare_method(MethodDecl::new("fields"));
    let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);
    let entry = mb.create_entry_block(Location::unknown()).unwrap();
    let bb = mb.block(entry);

    let base = bb.null(Location::unknown(), struct_ty).unwrap();
    let first = bb.primitive_int(Location::unknown(), i32_ty, 11).unwrap();
    let second = bb.primitive_float(Location::unknown(), f32_ty, 2.5).unwrap();
    let with_first = bb.set_field(Location::unknown(), base, 0, first).unwrap();
    let with_both = bb.set_field(Location::unknown(), with_first, 1, second).unwrap();

    assert_eq!(bb.get_field(Location::unknown(), with_both, 1).unwrap(), second);
    assert_eq!(bb.get_field(Location::unknown(), with_both, 0).unwrap(), first);
}

/// `CompareFlags::NONE` round-trip through empty flags, confirming the
/// public re-export is wired through to a real variant.
#[test]
fn compare_flags_none_is_exposed_publicly() {
    assert!(CompareFlags::NONE.is_none());
}
