//! `IntervalDomain<Num>`: a numeric interval domain over a signed integer
//! type, with MIN/MAX of the type standing in for -infinity/+infinity.
//!
//! Bottom is encoded as the specific empty interval `[MAX, MIN]` (lower
//! bound greater than upper bound) rather than through the scaffolding, so
//! this implements `AbstractDomain` directly.

use crate::lattice::AbstractDomain;

/// An interval `[lb, ub]` over `Num`, where `Num::MIN`/`Num::MAX` represent
/// unbounded below/above. Bottom is the unique interval `[MAX, MIN]`.
#[derive(Clone, Copy, Debug)]
pub struct IntervalDomain {
    lb: i64,
    ub: i64,
}

const MIN: i64 = i64::MIN;
const MAX: i64 = i64::MAX;

fn clamped_add(a: i64, b: i64) -> i64 {
    if a > 0 && b > MAX - a {
        MAX
    } else if a < 0 && b < MIN - a {
        MIN
    } else {
        a + b
    }
}

impl IntervalDomain {
    /// `[lb, ub]`, both finite. Panics if `lb > ub` or either bound is an
    /// infinity sentinel; use `bounded_below`/`bounded_above`/`top` for
    /// unbounded intervals.
    pub fn finite(lb: i64, ub: i64) -> Self {
        assert!(MIN < lb, "interval not bounded below");
        assert!(lb <= ub, "interval inverted");
        assert!(ub < MAX, "interval not bounded above");
        IntervalDomain { lb, ub }
    }

    pub fn bounded_below(lb: i64) -> Self {
        assert!(MIN < lb, "interval underflow");
        IntervalDomain { lb, ub: MAX }
    }

    pub fn bounded_above(ub: i64) -> Self {
        assert!(ub < MAX, "interval overflow");
        IntervalDomain { lb: MIN, ub }
    }

    pub fn high() -> Self {
        IntervalDomain { lb: MAX, ub: MAX }
    }

    pub fn low() -> Self {
        IntervalDomain { lb: MIN, ub: MIN }
    }

    pub fn lower_bound(&self) -> i64 {
        assert!(!self.is_bottom());
        self.lb
    }

    pub fn upper_bound(&self) -> i64 {
        assert!(!self.is_bottom());
        self.ub
    }

    /// Interval (Minkowski) addition, clamped to avoid overflow past the
    /// infinity sentinels.
    pub fn add(&self, other: &Self) -> Self {
        let mut result = *self;
        if other.is_bottom() {
            result.set_to_bottom();
        } else if !result.is_bottom() {
            result.lb = if result.lb == MIN {
                result.lb
            } else {
                clamped_add(result.lb, other.lb)
            };
            result.ub = if result.ub == MAX {
                result.ub
            } else {
                clamped_add(result.ub, other.ub)
            };
        }
        result
    }
}

impl AbstractDomain for IntervalDomain {
    fn bottom() -> Self {
        IntervalDomain { lb: MAX, ub: MIN }
    }

    fn top() -> Self {
        IntervalDomain { lb: MIN, ub: MAX }
    }

    fn is_bottom(&self) -> bool {
        self.lb > self.ub
    }

    fn is_top(&self) -> bool {
        self.lb == MIN && self.ub == MAX
    }

    fn leq(&self, other: &Self) -> bool {
        self.is_bottom() || (other.lb <= self.lb && self.ub <= other.ub)
    }

    fn equals(&self, other: &Self) -> bool {
        self.lb == other.lb && self.ub == other.ub
    }

    fn set_to_bottom(&mut self) {
        self.lb = MAX;
        self.ub = MIN;
    }

    fn set_to_top(&mut self) {
        self.lb = MIN;
        self.ub = MAX;
    }

    /// `join([a,b], [c,d]) = [min(a,c), max(b,d)]`.
    fn join_with(&mut self, other: &Self) {
        self.lb = self.lb.min(other.lb);
        self.ub = self.ub.max(other.ub);
    }

    /// `widen([a,b], [c,d]) = [c < a ? MIN : a, b < d ? MAX : b]`.
    fn widen_with(&mut self, other: &Self) {
        if self.is_bottom() {
            *self = *other;
            return;
        }
        if other.lb < self.lb {
            self.lb = MIN;
        }
        if self.ub < other.ub {
            self.ub = MAX;
        }
    }

    /// `meet([a,b], [c,d]) = [max(a,c), min(b,d)]`.
    fn meet_with(&mut self, other: &Self) {
        self.lb = self.lb.max(other.lb);
        self.ub = self.ub.min(other.ub);
        if self.is_bottom() {
            self.set_to_bottom();
        }
    }

    /// `narrow([a,b], [c,d]) = [a == MIN ? c : a, b == MAX ? d : b]`.
    fn narrow_with(&mut self, other: &Self) {
        if other.is_bottom() {
            self.set_to_bottom();
            return;
        }
        if self.lb == MIN {
            self.lb = other.lb;
        }
        if self.ub == MAX {
            self.ub = other.ub;
        }
        if self.is_bottom() {
            self.set_to_bottom();
        }
    }
}
