#![allow(
    clippy::disallowed_types,
    reason = "proptest macros internally use Arc"
)]

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use weft_ir::{Arg, BuiltinOp, Literal, Name, PrimType, Type, Var};

use crate::error::IcError;
use crate::refcount::RefCountType;
use crate::rename::{RenameMode, Renames};
use crate::test_helpers::{int_future, int_value, plus, store};

use super::make_imm::ALIAS_PREFIX;
use super::{
    CallProps, ClosedSet, Folded, Instr, MakeImmRequest, OutputChange, TaskMode, UpdateMode,
};

fn int_array(name: &str) -> Var {
    Var::temp(name, Type::array(PrimType::Int, Type::Future(PrimType::Int)))
}

fn int_ref(name: &str) -> Var {
    Var::temp(name, Type::ref_to(Type::Future(PrimType::Int)))
}

fn knows<'a>(pairs: &'a [(&'a str, Literal)]) -> impl Fn(&Name) -> Option<Literal> + 'a {
    move |name| {
        pairs
            .iter()
            .find(|(n, _)| *n == name.as_str())
            .map(|(_, lit)| lit.clone())
    }
}

fn async_plus(dst: &Var, a: impl Into<Arg>, b: impl Into<Arg>) -> Instr {
    Instr::AsyncOp {
        op: BuiltinOp::PlusInt,
        dst: Some(dst.clone()),
        inputs: vec![a.into(), b.into()],
    }
}

// Operands and printing

#[test]
fn display_lists_outputs_then_inputs() {
    let x = int_future("x");
    assert_eq!(store(&x, Arg::int(1)).to_string(), "store x <- 1");
    assert_eq!(
        plus(&int_value("z"), &int_value("a"), Arg::int(2)).to_string(),
        "local_op plus_int z <- a 2"
    );
}

#[test]
fn rename_inputs_only_leaves_outputs() {
    let mut instr = plus(&int_value("z"), &int_value("a"), &int_value("b"));
    let mut renames = Renames::new();
    renames.insert(Name::new("a"), Arg::int(4));
    renames.insert(Name::new("z"), Arg::from(&int_value("w")));
    assert!(instr.rename_vars(&renames, RenameMode::InputsOnly));
    assert_eq!(instr, plus(&int_value("z"), Arg::int(4), &int_value("b")));
    assert!(instr.writes(&Name::new("z")));
    assert!(instr.reads(&Name::new("b")));
}

// Side effects and modes

#[test]
fn stores_are_effect_free_unless_observable() {
    let plain = int_future("x");
    let alias = Var::alias("y", Type::Future(PrimType::Int));
    let mapped = int_future("m").with_mapping("file.txt");
    assert!(!store(&plain, Arg::int(1)).has_side_effects());
    assert!(store(&alias, Arg::int(1)).has_side_effects());
    assert!(store(&mapped, Arg::int(1)).has_side_effects());
}

#[test]
fn load_with_release_has_side_effects() {
    let load = |n| Instr::Load {
        dst: int_value("v"),
        src: int_future("x"),
        decr_read: Arg::int(n),
    };
    assert!(!load(0).has_side_effects());
    assert!(load(1).has_side_effects());
    assert!(load(0).is_sync());
    assert_eq!(load(0).closed_inputs().as_slice(), &[&int_future("x")]);
}

#[test]
fn calls_follow_declared_properties() {
    let foreign = |props| Instr::CallForeign {
        func: "sin".into(),
        outputs: vec![int_future("y")],
        inputs: vec![Arg::from(&int_future("x"))],
        mode: TaskMode::Worker,
        props,
    };
    assert!(!foreign(CallProps::PURE_LOCAL).has_side_effects());
    assert!(foreign(CallProps::default()).has_side_effects());
    assert_eq!(foreign(CallProps::PURE_LOCAL).mode(), TaskMode::Worker);
    let call = Instr::Call {
        func: "g".into(),
        outputs: vec![],
        inputs: vec![],
        mode: TaskMode::Local,
    };
    assert!(call.has_side_effects());
}

#[test]
fn async_op_blocks_on_future_inputs_only() {
    let instr = async_plus(&int_future("z"), &int_future("x"), &int_value("v"));
    assert_eq!(instr.mode(), TaskMode::Local);
    assert_eq!(instr.blocking_inputs().as_slice(), &[&int_future("x")]);
}

// Reference counts

#[test]
fn load_absorbs_read_decrements() {
    let x = int_future("x");
    let mut load = Instr::Load {
        dst: int_value("v"),
        src: x.clone(),
        decr_read: Arg::int(0),
    };
    assert!(load.can_piggyback(&x.name, RefCountType::Readers, -2));
    assert!(!load.can_piggyback(&x.name, RefCountType::Writers, -2));
    assert!(!load.can_piggyback(&x.name, RefCountType::Readers, 2));
    assert!(!load.can_piggyback(&Name::new("other"), RefCountType::Readers, -2));

    assert!(load.try_piggyback(&x.name, RefCountType::Readers, -2));
    let contributions = load.rc_contributions();
    assert_eq!(contributions.len(), 1);
    assert_eq!(contributions[0].amount, &Arg::int(2));
    assert_eq!(contributions[0].sign, -1);
}

#[test]
fn bag_insert_absorbs_write_decrements_only() {
    let bag = Var::temp("b", Type::bag(Type::Future(PrimType::Int)));
    let mut insert = Instr::BagInsert {
        bag: bag.clone(),
        member: Arg::int(1),
        writers_decr: Arg::int(1),
    };
    assert!(!insert.try_piggyback(&bag.name, RefCountType::Readers, -1));
    assert!(insert.try_piggyback(&bag.name, RefCountType::Writers, -3));
    assert_eq!(
        insert,
        Instr::BagInsert {
            bag,
            member: Arg::int(1),
            writers_decr: Arg::int(4),
        }
    );
}

#[test]
fn deref_consumes_a_read_reference() {
    let p = int_ref("p");
    let instr = Instr::Deref {
        dst: int_future("t"),
        src: p.clone(),
    };
    let uses = instr.in_ref_counts();
    assert_eq!(uses.len(), 1);
    assert_eq!(uses[0].var, &p);
    assert_eq!(uses[0].kind, RefCountType::Readers);
    assert!(instr.out_ref_counts().is_empty());
}

// Computed values and folding

#[test]
fn commutative_operands_share_a_computed_value() {
    let (a, b) = (int_value("a"), int_value("b"));
    let first = plus(&int_value("z1"), &a, &b).computed_values();
    let second = plus(&int_value("z2"), &b, &a).computed_values();
    assert_eq!(first[0].value, second[0].value);
    assert!(first[0].defines_output);
    assert_eq!(first[0].result, Arg::from(&int_value("z1")));
}

#[test]
fn store_makes_its_source_available() {
    let x = int_future("x");
    let facts = store(&x, Arg::int(7)).computed_values();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].result, Arg::int(7));
    assert!(!facts[0].defines_output);
    assert_eq!(facts[0].value.to_string(), "retrieve(x)");
}

#[test]
fn fold_evaluates_with_known_inputs() {
    let z = int_value("z");
    let known = [("a", Literal::Int(3))];
    let folded = plus(&z, &int_value("a"), Arg::int(2)).constant_fold(&knows(&known));
    assert_eq!(
        folded,
        Some(Folded::Value {
            dst: z.clone(),
            value: Literal::Int(5)
        })
    );
    assert_eq!(
        plus(&z, &int_value("b"), Arg::int(2)).constant_fold(&knows(&known)),
        None
    );
}

#[test]
fn fold_leaves_overflow_to_runtime() {
    let instr = plus(&int_value("z"), Arg::int(i64::MAX), Arg::int(1));
    assert_eq!(instr.constant_fold(&knows(&[])), None);
}

#[test]
fn fold_decides_assertions() {
    let failing = Instr::LocalOp {
        op: BuiltinOp::Assert,
        dst: None,
        inputs: vec![Arg::bool(false), Arg::str("boom")],
    };
    assert_eq!(
        failing.constant_fold(&knows(&[])),
        Some(Folded::AssertFail {
            message: "boom".to_owned()
        })
    );
    let passing = Instr::AsyncOp {
        op: BuiltinOp::AssertEq,
        dst: None,
        inputs: vec![Arg::int(1), Arg::int(1)],
    };
    assert_eq!(passing.constant_fold(&knows(&[])), Some(Folded::AssertPass));
}

#[test]
fn fold_load_of_known_future() {
    let known = [("x", Literal::Bool(true))];
    let load = Instr::Load {
        dst: int_value("v"),
        src: int_future("x"),
        decr_read: Arg::int(0),
    };
    assert_eq!(
        load.constant_fold(&knows(&known)),
        Some(Folded::Value {
            dst: int_value("v"),
            value: Literal::Bool(true)
        })
    );
}

#[test]
fn replace_switches_future_index_to_immediate() {
    let known = [("i", Literal::Int(2))];
    let mut lookup = Instr::ArrayLookupFuture {
        dst: int_ref("r"),
        array: int_array("A"),
        index: int_future("i"),
    };
    assert!(lookup.constant_replace(&knows(&known)));
    assert_eq!(
        lookup,
        Instr::ArrayLookupRefImm {
            dst: int_ref("r"),
            array: int_array("A"),
            index: Arg::int(2),
        }
    );
    assert!(!lookup.constant_replace(&knows(&known)));
}

#[test]
fn replace_turns_update_into_immediate_update() {
    let cell = Var::temp("c", Type::Updateable(PrimType::Float));
    let known = [("v", Literal::float(0.5))];
    let mut update = Instr::Update {
        mode: UpdateMode::Min,
        cell: cell.clone(),
        value: Var::future("v", PrimType::Float),
    };
    assert!(update.constant_replace(&knows(&known)));
    assert_eq!(
        update,
        Instr::UpdateImm {
            mode: UpdateMode::Min,
            cell,
            value: Arg::float(0.5),
        }
    );
}

// Make-immediate

#[test]
fn closed_set_scopes_are_monotone() {
    let mut closed = ClosedSet::from_names([Name::new("a")]);
    closed.enter();
    closed.close(Name::new("b"));
    assert!(closed.is_closed(&Name::new("a")));
    assert!(closed.is_closed(&Name::new("b")));
    assert_eq!(closed.len(), 2);
    closed.exit();
    assert!(!closed.is_closed(&Name::new("b")));
    closed.exit();
    assert!(closed.is_closed(&Name::new("a")));
    assert!(!ClosedSet::new().is_closed(&Name::new("a")));
    assert!(ClosedSet::new().is_empty());
}

/// A lookup into a closed array needs no fetch, and its reference output
/// becomes an alias of the member.
#[test]
fn lookup_into_closed_array_produces_alias() {
    let r = int_ref("r");
    let lookup = Instr::ArrayLookupRefImm {
        dst: r.clone(),
        array: int_array("A"),
        index: Arg::int(3),
    };
    assert_eq!(lookup.can_make_immediate(&ClosedSet::new(), false), None);

    let closed = ClosedSet::from_names([Name::new("A")]);
    let Some(request) = lookup.can_make_immediate(&closed, false) else {
        panic!("closed array should allow an immediate lookup");
    };
    assert!(request.inputs.is_empty());
    assert!(request.out.is_empty());
    assert_eq!(request.mode, TaskMode::Sync);

    let alias = Var::alias(
        Name::new("r").with_prefix(ALIAS_PREFIX),
        Type::Future(PrimType::Int),
    );
    let change = match lookup.make_immediate(&request, &[], &[]) {
        Ok(change) => change,
        Err(err) => panic!("make_immediate failed: {err}"),
    };
    assert_eq!(
        change.new_instr,
        Instr::ArrayLookupImm {
            dst: alias.clone(),
            array: int_array("A"),
            index: Arg::int(3),
        }
    );
    assert_eq!(
        change.output_change,
        Some(OutputChange {
            old_out: r,
            new_out: alias,
        })
    );
}

#[test]
fn async_op_becomes_local_op_once_inputs_close() {
    let (x, z) = (int_future("x"), int_future("z"));
    let op = async_plus(&z, &x, Arg::int(1));
    assert_eq!(op.can_make_immediate(&ClosedSet::new(), false), None);
    let assumed = op.can_make_immediate(&ClosedSet::new(), true);
    assert!(assumed.is_some());

    let closed = ClosedSet::from_names([x.name.clone()]);
    let Some(request) = op.can_make_immediate(&closed, false) else {
        panic!("inputs are closed");
    };
    assert_eq!(
        request,
        MakeImmRequest {
            out: vec![z.clone()],
            inputs: vec![x.clone()],
            mode: TaskMode::Sync,
        }
    );

    let (xv, zv) = (int_value("x:v"), int_value("z:v"));
    let change = op.make_immediate(&request, &[zv.clone()], &[Arg::from(&xv)]);
    assert_eq!(
        change.map(|c| c.new_instr),
        Ok(plus(&zv, &xv, Arg::int(1)))
    );
}

#[test]
fn deref_becomes_copy_of_fetched_alias() {
    let (t, p) = (int_future("t"), int_ref("p"));
    let deref = Instr::Deref {
        dst: t.clone(),
        src: p.clone(),
    };
    let closed = ClosedSet::from_names([p.name.clone()]);
    let Some(request) = deref.can_make_immediate(&closed, false) else {
        panic!("reference is closed");
    };
    let target = Var::alias("p:target", Type::Future(PrimType::Int));
    let change = deref.make_immediate(&request, &[], &[Arg::from(&target)]);
    assert_eq!(
        change.map(|c| c.new_instr),
        Ok(Instr::AsyncOp {
            op: BuiltinOp::CopyInt,
            dst: Some(t),
            inputs: vec![Arg::from(&target)],
        })
    );

    let literal = deref.make_immediate(&request, &[], &[Arg::int(1)]);
    assert!(matches!(literal, Err(IcError::OperandMismatch { .. })));
}

#[test]
fn foreign_call_without_local_form_stays_async() {
    let call = Instr::CallForeign {
        func: "sleep".into(),
        outputs: vec![],
        inputs: vec![Arg::int(1)],
        mode: TaskMode::Worker,
        props: CallProps::default(),
    };
    assert_eq!(call.can_make_immediate(&ClosedSet::new(), true), None);
}

/// Field lookup aliases the field and insertion stores the member
/// handle, so neither waits on anything a closed set could release.
#[test]
fn struct_lookup_and_member_insert_never_suspend() {
    let pair = Var::temp(
        "pair",
        Type::structure("pair", vec![("left".into(), Type::Future(PrimType::Int))]),
    );
    let (m, arr) = (int_future("m"), int_array("arr"));
    let lookup = Instr::StructLookup {
        dst: Var::alias("pair.left", Type::Future(PrimType::Int)),
        strct: pair.clone(),
        field: "left".into(),
    };
    let insert = Instr::ArrayInsertImm {
        array: arr.clone(),
        index: Arg::int(0),
        member: m.clone(),
    };
    let closed = ClosedSet::from_names([pair.name, arr.name, m.name]);
    for instr in [lookup, insert] {
        assert!(instr.is_sync(), "{instr}");
        assert!(instr.blocking_inputs().is_empty(), "{instr}");
        assert_eq!(instr.can_make_immediate(&closed, true), None);
    }
}

#[test]
fn make_immediate_checks_fetch_counts() {
    let op = async_plus(&int_future("z"), &int_future("x"), Arg::int(1));
    let Some(request) = op.can_make_immediate(&ClosedSet::new(), true) else {
        panic!("all inputs assumed closed");
    };
    let err = op.make_immediate(&request, &[], &[]);
    assert!(matches!(err, Err(IcError::OperandMismatch { .. })));
}

#[test]
fn make_immediate_rejects_opcodes_without_cheaper_form() {
    let instr = store(&int_future("x"), Arg::int(1));
    let request = MakeImmRequest {
        out: Vec::new(),
        inputs: Vec::new(),
        mode: TaskMode::Sync,
    };
    assert_eq!(
        instr.make_immediate(&request, &[], &[]),
        Err(IcError::NoImmediateForm {
            instr: "store x <- 1".to_owned()
        })
    );
}

proptest! {
    #[test]
    fn folded_sum_matches_checked_arithmetic(a in any::<i64>(), b in any::<i64>()) {
        let known = [("a", Literal::Int(a))];
        let folded = plus(&int_value("z"), &int_value("a"), Arg::int(b))
            .constant_fold(&knows(&known));
        let expected = a.checked_add(b).map(|sum| Folded::Value {
            dst: int_value("z"),
            value: Literal::Int(sum),
        });
        prop_assert_eq!(folded, expected);
    }
}
