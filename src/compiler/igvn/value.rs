//! Transfer functions.
//!
//! [`compute_type`] evaluates a node's operation over the cached types of its
//! inputs. The result is sound for the inputs' current types; the engine joins
//! it with the node's old type, so types only ever move toward Top.
//!
//! Range arithmetic is done in `i64`. A result that does not fit in `i32`
//! wraps at runtime and is widened to the full integer range, except when both
//! operands are constants, where the wrapped value is computed exactly.

use crate::{
    ir::{eval_binary, CmpTest, Graph, JoinSemiLattice, MeetSemiLattice, NodeId, Op, PhiKind, Type, TypeInt},
    utils::covering_mask,
};

/// Computes the type of `id` from the types of its inputs.
#[must_use]
pub fn compute_type(graph: &Graph, id: NodeId) -> Type {
    let op = graph.op(id);
    let inputs = graph.inputs(id);
    let top = |n: NodeId| graph.ty(n).is_top();

    match op {
        Op::Start | Op::Root => Type::Control,
        Op::Top => Type::Top,
        Op::ConI(c) => Type::con(*c),
        Op::Parm(_) => Type::INT,
        Op::InitMem => Type::Memory,

        Op::Region => {
            if inputs.iter().all(|&p| top(p)) {
                Type::Top
            } else {
                Type::Control
            }
        }
        Op::Loop(_) => {
            if top(inputs[0]) {
                Type::Top
            } else {
                Type::Control
            }
        }
        Op::If | Op::RangeCheck | Op::Return | Op::Trap(_) => {
            if inputs.iter().any(|&i| top(i)) {
                Type::Top
            } else {
                Type::Control
            }
        }
        Op::IfTrue | Op::IfFalse => projection_type(graph, id),

        Op::Phi(kind) => phi_type(graph, id, *kind),

        Op::CastII(range) => {
            if top(inputs[0]) || top(inputs[1]) {
                return Type::Top;
            }
            match graph.ty(inputs[1]).join(&Type::Int(*range)) {
                // Disjoint: the cast sits on a path its own test excludes. Dead-path
                // propagation removes it once the test folds.
                Type::Top => Type::Int(*range),
                narrowed => narrowed,
            }
        }

        Op::Load(_) => {
            if inputs.iter().any(|&i| top(i)) {
                Type::Top
            } else {
                Type::INT
            }
        }
        Op::Store(_) | Op::MergeMem(_) => {
            if inputs.iter().any(|&i| top(i)) {
                Type::Top
            } else {
                Type::Memory
            }
        }

        Op::CmpI(test) | Op::CmpU(test) => {
            let (a, b) = (inputs[0], inputs[1]);
            if top(a) || top(b) {
                return Type::Top;
            }
            if a == b {
                return Type::con(i32::from(test.eval(0, 0)));
            }
            let (Some(ta), Some(tb)) = (graph.ty(a).as_int(), graph.ty(b).as_int()) else {
                return Type::BOOL;
            };
            let decided = if matches!(op, Op::CmpI(_)) {
                decide_signed(*test, ta, tb)
            } else {
                decide_unsigned(*test, ta, tb)
            };
            decided.map_or(Type::BOOL, |holds| Type::con(i32::from(holds)))
        }

        op if op.is_int_binary() => {
            let (a, b) = (inputs[0], inputs[1]);
            if top(a) || top(b) {
                return Type::Top;
            }
            if a == b && matches!(op, Op::SubI | Op::XorI) {
                return Type::con(0);
            }
            match (graph.ty(a).as_int(), graph.ty(b).as_int()) {
                (Some(ta), Some(tb)) => Type::Int(binary_range(op, ta, tb)),
                _ => Type::INT,
            }
        }

        _ => op.bottom_type(),
    }
}

fn projection_type(graph: &Graph, id: NodeId) -> Type {
    let branch = graph.input(id, 0);
    if graph.ty(branch).is_top() {
        return Type::Top;
    }
    let cond = graph.input(branch, 1);
    let taken = matches!(graph.op(id), Op::IfTrue);
    match graph.ty(cond) {
        Type::Top => Type::Top,
        ty => match ty.get_con() {
            Some(c) if (c != 0) != taken => Type::Top,
            _ => Type::Control,
        },
    }
}

fn phi_type(graph: &Graph, id: NodeId, kind: PhiKind) -> Type {
    let inputs = graph.inputs(id);
    let region = inputs[0];
    if graph.ty(region).is_top() {
        return Type::Top;
    }
    let preds = graph.inputs(region);
    let mut result = Type::Top;
    for (k, &value) in inputs.iter().enumerate().skip(1) {
        let Some(&pred) = preds.get(k - 1) else {
            break;
        };
        if graph.ty(pred).is_top() {
            continue;
        }
        result = result.meet(&graph.ty(value));
    }
    match (kind, result) {
        (_, Type::Top) => Type::Top,
        (PhiKind::Memory(_), _) => Type::Memory,
        (PhiKind::Value, Type::Int(range)) if matches!(graph.op(region), Op::Loop(_)) => {
            Type::Int(range.widen())
        }
        (PhiKind::Value, Type::Int(range)) => Type::Int(range),
        (PhiKind::Value, _) => Type::INT,
    }
}

/// Decides a signed comparison over two ranges; `None` when both outcomes are
/// possible.
#[must_use]
pub fn decide_signed(test: CmpTest, a: TypeInt, b: TypeInt) -> Option<bool> {
    match test {
        CmpTest::Lt => {
            if a.hi() < b.lo() {
                Some(true)
            } else if a.lo() >= b.hi() {
                Some(false)
            } else {
                None
            }
        }
        CmpTest::Le => {
            if a.hi() <= b.lo() {
                Some(true)
            } else if a.lo() > b.hi() {
                Some(false)
            } else {
                None
            }
        }
        CmpTest::Gt | CmpTest::Ge => decide_signed(test.commute(), b, a),
        CmpTest::Eq => {
            if a.is_con() && a == b {
                Some(true)
            } else if a.intersect(&b).is_none() {
                Some(false)
            } else {
                None
            }
        }
        CmpTest::Ne => decide_signed(CmpTest::Eq, a, b).map(|eq| !eq),
    }
}

/// Decides an unsigned comparison over two signed ranges.
///
/// Within one half of the integer range (all non-negative or all negative)
/// unsigned order equals signed order; across halves every non-negative value is
/// unsigned-below every negative one.
#[must_use]
pub fn decide_unsigned(test: CmpTest, a: TypeInt, b: TypeInt) -> Option<bool> {
    let negative = |t: TypeInt| t.hi() < 0;
    if (a.is_nonneg() && b.is_nonneg()) || (negative(a) && negative(b)) {
        return decide_signed(test, a, b);
    }
    let below = if a.is_nonneg() && negative(b) {
        true
    } else if negative(a) && b.is_nonneg() {
        false
    } else {
        return match test {
            CmpTest::Eq | CmpTest::Ne => decide_signed(test, a, b),
            _ => None,
        };
    };
    Some(match test {
        CmpTest::Lt | CmpTest::Le | CmpTest::Ne => below,
        CmpTest::Gt | CmpTest::Ge => !below,
        CmpTest::Eq => false,
    })
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn binary_range(op: &Op, a: TypeInt, b: TypeInt) -> TypeInt {
    if let (Some(x), Some(y)) = (a.get_con(), b.get_con()) {
        return TypeInt::con(eval_binary(op, x, y));
    }
    let (alo, ahi, blo, bhi) = (a.lo_wide(), a.hi_wide(), b.lo_wide(), b.hi_wide());
    match op {
        Op::AddI => TypeInt::from_wide(alo + blo, ahi + bhi),
        Op::SubI => TypeInt::from_wide(alo - bhi, ahi - blo),
        Op::MulI => {
            let products = [alo * blo, alo * bhi, ahi * blo, ahi * bhi];
            let lo = products.iter().copied().min().unwrap_or(i64::MIN);
            let hi = products.iter().copied().max().unwrap_or(i64::MAX);
            TypeInt::from_wide(lo, hi)
        }
        Op::AndI => match (a.is_nonneg(), b.is_nonneg()) {
            (true, true) => TypeInt::from_wide(0, ahi.min(bhi)),
            (true, false) => TypeInt::from_wide(0, ahi),
            (false, true) => TypeInt::from_wide(0, bhi),
            (false, false) if a.hi() < 0 && b.hi() < 0 => TypeInt::from_wide(i64::from(i32::MIN), ahi.min(bhi)),
            (false, false) => TypeInt::INT,
        },
        Op::OrI => {
            if a.is_nonneg() && b.is_nonneg() {
                TypeInt::from_wide(alo.max(blo), i64::from(covering_mask(a.hi().max(b.hi()))))
            } else {
                TypeInt::INT
            }
        }
        Op::XorI => {
            if a.is_nonneg() && b.is_nonneg() {
                TypeInt::from_wide(0, i64::from(covering_mask(a.hi().max(b.hi()))))
            } else {
                TypeInt::INT
            }
        }
        Op::LShiftI => match b.get_con() {
            Some(count) => {
                let k = count & 31;
                TypeInt::from_wide(alo << k, ahi << k)
            }
            None => TypeInt::INT,
        },
        Op::RShiftI => match b.get_con() {
            Some(count) => {
                let k = count & 31;
                TypeInt::from_wide(alo >> k, ahi >> k)
            }
            None => TypeInt::from_wide(alo.min(0), ahi.max(0)),
        },
        Op::URShiftI => match b.get_con() {
            Some(count) => {
                let k = (count & 31) as u32;
                if k == 0 {
                    a
                } else if a.is_nonneg() {
                    TypeInt::from_wide(alo >> k, ahi >> k)
                } else if a.hi() < 0 {
                    let lo = i64::from((a.lo() as u32) >> k);
                    let hi = i64::from((a.hi() as u32) >> k);
                    TypeInt::from_wide(lo, hi)
                } else {
                    TypeInt::from_wide(0, i64::from(u32::MAX >> k))
                }
            }
            None if a.is_nonneg() => TypeInt::from_wide(0, ahi),
            None => TypeInt::INT,
        },
        Op::MinI => TypeInt::from_wide(alo.min(blo), ahi.min(bhi)),
        Op::MaxI => TypeInt::from_wide(alo.max(blo), ahi.max(bhi)),
        _ => TypeInt::INT,
    }
}
