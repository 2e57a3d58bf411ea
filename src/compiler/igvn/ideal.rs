//! Ideal and identity rules for integer arithmetic and comparisons.
//!
//! Ideal rules rewrite a node into a cheaper or more canonical form; identity
//! rules find an existing node computing the same value. Merge, projection and
//! memory rules live in [`crate::compiler::deadpath`] and
//! [`crate::compiler::memory`].

use crate::{
    compiler::{
        events::EventKind,
        igvn::{IterGvn, Progress},
    },
    ir::{CmpTest, NodeId, Op, PhiKind},
    utils::is_power_of_two,
};

impl IterGvn<'_> {
    /// Applies the first matching ideal rule to `id`.
    pub(crate) fn ideal(&mut self, id: NodeId) -> Progress {
        let op = self.graph.op(id).clone();
        match op {
            Op::Region | Op::Loop(_) => self.ideal_merge(id),
            _ if !self.is_full() => Progress::Unchanged,
            Op::Load(access) => self.ideal_load(id, access),
            Op::Store(access) => self.ideal_store(id, access),
            Op::MergeMem(ref aliases) => self.ideal_merge_mem(id, aliases),
            Op::Phi(PhiKind::Memory(alias)) if !alias.is_bottom() => {
                self.ideal_narrow_phi(id, alias)
            }
            Op::CmpI(test) => self.ideal_cmp(id, test, true),
            Op::CmpU(test) => self.ideal_cmp(id, test, false),
            ref op if op.is_int_binary() => self.ideal_arith(id, op),
            _ => Progress::Unchanged,
        }
    }

    /// Returns an existing node equivalent to `id`.
    pub(crate) fn identity(&self, id: NodeId) -> Option<NodeId> {
        match self.graph.op(id) {
            Op::IfTrue | Op::IfFalse => self.projection_identity(id),
            Op::Phi(_) => self.phi_identity(id),
            Op::CastII(range) => {
                let value = self.graph.input(id, 1);
                let ty = self.graph.ty(value).as_int()?;
                ty.is_subset_of(range).then_some(value)
            }
            op if self.is_full() && op.is_int_binary() => self.arith_identity(id, op),
            _ => None,
        }
    }

    fn phi_identity(&self, id: NodeId) -> Option<NodeId> {
        let graph = &*self.graph;
        let region = graph.input(id, 0);
        let preds = graph.inputs(region);
        let mut unique = None;
        for (slot, &value) in graph.inputs(id).iter().enumerate().skip(1) {
            if value == id {
                continue;
            }
            let live = preds.get(slot - 1).is_some_and(|&p| !graph.ty(p).is_top());
            if !live {
                continue;
            }
            match unique {
                None => unique = Some(value),
                Some(u) if u == value => {}
                Some(_) => return None,
            }
        }
        if unique.is_some() {
            self.note(EventKind::PhiSimplified, id, || {
                "all live inputs are equal".to_string()
            });
        }
        unique
    }

    fn arith_identity(&self, id: NodeId, op: &Op) -> Option<NodeId> {
        let graph = &*self.graph;
        let a = graph.input(id, 0);
        let b = graph.input(id, 1);
        let ca = graph.con_value(a);
        let cb = graph.con_value(b);
        let same = match op {
            Op::AddI | Op::OrI | Op::XorI => match (ca, cb) {
                (_, Some(0)) => Some(a),
                (Some(0), _) => Some(b),
                _ if a == b && matches!(op, Op::OrI) => Some(a),
                _ => None,
            },
            Op::SubI => {
                if cb == Some(0) {
                    Some(a)
                } else if matches!(graph.op(a), Op::AddI) {
                    // (x + y) - y and (y + x) - y
                    let (x, y) = (graph.input(a, 0), graph.input(a, 1));
                    if y == b {
                        Some(x)
                    } else if x == b {
                        Some(y)
                    } else {
                        None
                    }
                } else {
                    None
                }
            }
            Op::MulI => match (ca, cb) {
                (_, Some(1)) => Some(a),
                (Some(1), _) => Some(b),
                _ => None,
            },
            Op::AndI => match (ca, cb) {
                (_, Some(-1)) => Some(a),
                (Some(-1), _) => Some(b),
                _ if a == b => Some(a),
                _ => None,
            },
            Op::LShiftI | Op::RShiftI | Op::URShiftI => {
                cb.filter(|c| c & 31 == 0).map(|_| a)
            }
            Op::MinI | Op::MaxI => (a == b).then_some(a),
            _ => None,
        };
        if let Some(same) = same {
            self.note(EventKind::AlgebraicSimplified, id, || {
                format!("{op} is its input {same}")
            });
        }
        same
    }

    fn ideal_arith(&mut self, id: NodeId, op: &Op) -> Progress {
        let a = self.graph.input(id, 0);
        let b = self.graph.input(id, 1);

        if op.is_commutative() {
            let a_con = self.graph.con_value(a).is_some();
            let b_con = self.graph.con_value(b).is_some();
            if (a_con && !b_con) || (a_con == b_con && a > b) {
                self.graph.swap_inputs(id, 0, 1);
                return Progress::Changed;
            }
        }

        let Some(c) = self.graph.con_value(b) else {
            return Progress::Unchanged;
        };
        let inner = self.graph.op(a).clone();
        let inner_con = if inner.is_int_binary() {
            self.graph.con_value(self.graph.input(a, 1))
        } else {
            None
        };

        let replacement = match (op, &inner, inner_con) {
            // (x + c1) + c2 -> x + (c1 + c2)
            (Op::AddI, Op::AddI, Some(c1)) => {
                let x = self.graph.input(a, 0);
                let k = self.make_con(c1.wrapping_add(c));
                self.transform(Op::AddI, &[x, k])
            }
            // x - c -> x + (-c)
            (Op::SubI, _, _) if c != 0 => {
                let k = self.make_con(c.wrapping_neg());
                self.transform(Op::AddI, &[a, k])
            }
            // x * 2^k -> x << k
            (Op::MulI, _, _) => match is_power_of_two(i64::from(c)) {
                Some(k) if k > 0 && k < 31 => {
                    let k = self.make_con(i32::from(k));
                    self.transform(Op::LShiftI, &[a, k])
                }
                _ => return Progress::Unchanged,
            },
            // (x & c1) & c2 -> x & (c1 & c2)
            (Op::AndI, Op::AndI, Some(c1)) => {
                let x = self.graph.input(a, 0);
                let k = self.make_con(c1 & c);
                self.transform(Op::AndI, &[x, k])
            }
            (shift, _, _) if shift.is_shift() && c != c & 31 => {
                let k = self.make_con(c & 31);
                self.transform(shift.clone(), &[a, k])
            }
            (shift, _, _) if shift.is_shift() && c != 0 => {
                match self.ideal_shift(shift, a, &inner, inner_con, c) {
                    Some(n) => n,
                    None => return Progress::Unchanged,
                }
            }
            _ => return Progress::Unchanged,
        };
        self.note(EventKind::AlgebraicSimplified, id, || {
            format!("{op} rewritten to {replacement}")
        });
        Progress::Replaced(replacement)
    }

    /// Shift rules with a count already in `1..32`.
    fn ideal_shift(
        &mut self,
        shift: &Op,
        a: NodeId,
        inner: &Op,
        inner_con: Option<i32>,
        s: i32,
    ) -> Option<NodeId> {
        if !matches!(inner, Op::AndI | Op::RShiftI | Op::URShiftI | Op::LShiftI) {
            return None;
        }
        let x = self.graph.input(a, 0);
        let t = inner_con.filter(|t| *t == t & 31);
        match (shift, inner) {
            // (x & m) >> s -> (x >> s) & (m >> s), same for >>>
            (Op::RShiftI | Op::URShiftI, Op::AndI) => {
                let m = inner_con?;
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
                let mask = if matches!(shift, Op::RShiftI) {
                    m >> s
                } else {
                    ((m as u32) >> s) as i32
                };
                let count = self.make_con(s);
                let shifted = self.transform(shift.clone(), &[x, count]);
                let mask = self.make_con(mask);
                Some(self.transform(Op::AndI, &[shifted, mask]))
            }
            (Op::RShiftI, Op::RShiftI) => {
                let k = self.make_con((t? + s).min(31));
                Some(self.transform(Op::RShiftI, &[x, k]))
            }
            (Op::URShiftI, Op::URShiftI) | (Op::LShiftI, Op::LShiftI) => {
                let total = t? + s;
                if total < 32 {
                    let k = self.make_con(total);
                    Some(self.transform(shift.clone(), &[x, k]))
                } else {
                    Some(self.make_con(0))
                }
            }
            _ => None,
        }
    }

    fn ideal_cmp(&mut self, id: NodeId, test: CmpTest, signed: bool) -> Progress {
        let a = self.graph.input(id, 0);
        let b = self.graph.input(id, 1);

        if self.graph.con_value(a).is_some() && self.graph.con_value(b).is_none() {
            let commuted = if signed {
                Op::CmpI(test.commute())
            } else {
                Op::CmpU(test.commute())
            };
            self.graph.set_op(id, commuted);
            self.graph.swap_inputs(id, 0, 1);
            return Progress::Changed;
        }

        if signed && self.config.fold_unsigned_compares {
            if let Some(folded) = self.fold_biased_compare(id, test, a, b) {
                return Progress::Replaced(folded);
            }
        }
        Progress::Unchanged
    }

    /// `CmpI(x + MIN, y + MIN)` and `CmpI(x + MIN, c)` compare unsigned.
    fn fold_biased_compare(
        &mut self,
        id: NodeId,
        test: CmpTest,
        a: NodeId,
        b: NodeId,
    ) -> Option<NodeId> {
        let graph = &*self.graph;
        let unbias = |n: NodeId| {
            (matches!(graph.op(n), Op::AddI) && graph.con_value(graph.input(n, 1)) == Some(i32::MIN))
                .then(|| graph.input(n, 0))
        };
        let x = unbias(a)?;
        let rhs = match unbias(b) {
            Some(y) => Ok(y),
            None => Err(graph.con_value(b)? ^ i32::MIN),
        };

        // Keep loop exit tests and induction variables recognizable.
        let loop_value_phi = |n: NodeId| {
            matches!(graph.op(n), Op::Phi(PhiKind::Value))
                && matches!(graph.op(graph.input(n, 0)), Op::Loop(_))
        };
        if loop_value_phi(x) || matches!(rhs, Ok(y) if loop_value_phi(y)) {
            return None;
        }
        let feeds_loop_exit = graph.users(id).iter().any(|&u| {
            matches!(graph.op(u), Op::If) && matches!(graph.op(graph.input(u, 0)), Op::Loop(_))
        });
        if feeds_loop_exit {
            return None;
        }

        let y = match rhs {
            Ok(y) => y,
            Err(c) => self.make_con(c),
        };
        let folded = self.transform(Op::CmpU(test), &[x, y]);
        self.note(EventKind::CompareUnsigned, id, || {
            format!("biased signed compare {test} became unsigned")
        });
        Some(folded)
    }
}
