//! `HashedAbstractEnvironment<Var, Domain>`: maps program variables to a
//! common abstract domain, with a default binding of Top for any variable
//! not explicitly represented. Assigning Bottom to any single variable
//! collapses the whole environment to Bottom — there is no well-defined
//! program state in which one variable has an impossible value.
//!
//! Bindings equal to Top are never stored, keeping the map sparse; this
//! means `kind()` can read Top directly off an empty map rather than
//! needing a separate flag.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::DomainKind;
use crate::lattice::{AbstractDomain, AbstractDomainScaffolding, AbstractValue};

#[derive(Clone, Debug)]
pub struct EnvironmentValue<Var: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> {
    map: HashMap<Var, D>,
}

impl<Var: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> Default
    for EnvironmentValue<Var, D>
{
    fn default() -> Self {
        EnvironmentValue {
            map: HashMap::new(),
        }
    }
}

impl<Var: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> EnvironmentValue<Var, D> {
    /// Panics if `value.is_bottom()`: collapsing the whole environment to
    /// bottom on a bottom binding is `Environment::set`'s job, one layer up.
    fn insert_binding(&mut self, variable: Var, value: D) {
        debug_assert!(!value.is_bottom());
        if value.is_top() {
            self.map.remove(&variable);
        } else {
            self.map.insert(variable, value);
        }
    }

    fn join_like(&mut self, other: &Self, op: impl Fn(&mut D, &D)) {
        self.map.retain(|variable, value| {
            match other.map.get(variable) {
                None => false, // other is implicitly Top; drop the binding.
                Some(other_value) => {
                    op(value, other_value);
                    !value.is_top()
                }
            }
        });
    }

    fn meet_like(&mut self, other: &Self, op: impl Fn(&mut D, &D)) -> bool {
        for (variable, other_value) in &other.map {
            match self.map.get_mut(variable) {
                None => {
                    // self is implicitly Top; adopt other's value outright.
                    self.map.insert(variable.clone(), other_value.clone());
                }
                Some(value) => op(value, other_value),
            }
        }
        self.map.values().any(|v| v.is_bottom())
    }
}

impl<Var: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> AbstractValue
    for EnvironmentValue<Var, D>
{
    fn kind(&self) -> DomainKind {
        if self.map.is_empty() {
            DomainKind::Top
        } else {
            DomainKind::Value
        }
    }

    fn leq(&self, other: &Self) -> bool {
        if other.map.len() > self.map.len() {
            return false;
        }
        for (variable, value) in &self.map {
            if let Some(other_value) = other.map.get(variable) {
                if !value.leq(other_value) {
                    return false;
                }
            }
        }
        for variable in other.map.keys() {
            if !self.map.contains_key(variable) {
                return false;
            }
        }
        true
    }

    fn join_with(&mut self, other: &Self) -> DomainKind {
        self.join_like(other, |x, y| x.join_with(y));
        self.kind()
    }

    fn meet_with(&mut self, other: &Self) -> DomainKind {
        if self.meet_like(other, |x, y| x.meet_with(y)) {
            DomainKind::Bottom
        } else {
            self.kind()
        }
    }
}

impl<Var: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> PartialEq
    for EnvironmentValue<Var, D>
{
    fn eq(&self, other: &Self) -> bool {
        self.map.len() == other.map.len()
            && self.map.iter().all(|(k, v)| {
                other
                    .map
                    .get(k)
                    .map(|other_v| v.equals(other_v))
                    .unwrap_or(false)
            })
    }
}

pub type Environment<Var, D> = AbstractDomainScaffolding<EnvironmentValue<Var, D>>;

/// Convenience constructors/accessors matching the original kernel's
/// `get`/`set`/`update` surface, since the scaffolding alone only exposes
/// `get()`/`get_mut()` on the raw payload.
pub trait EnvironmentExt<Var: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> {
    fn get_binding(&self, variable: &Var) -> D;
    fn set(&mut self, variable: Var, value: D);
    /// Every variable with a non-Top binding, for callers (e.g. CSE's
    /// barrier reset) that need to scan an entire environment rather than
    /// querying one variable at a time.
    fn bindings(&self) -> Vec<(Var, D)>;
}

impl<Var: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> EnvironmentExt<Var, D>
    for Environment<Var, D>
{
    fn get_binding(&self, variable: &Var) -> D {
        if self.is_bottom() {
            return D::bottom();
        }
        match self.get() {
            Ok(value) => value
                .map
                .get(variable)
                .cloned()
                .unwrap_or_else(D::top),
            Err(_) => D::top(),
        }
    }

    fn set(&mut self, variable: Var, value: D) {
        if self.is_bottom() {
            return;
        }
        if value.is_bottom() {
            self.set_to_bottom();
            return;
        }
        // The scaffolding discards its payload whenever the domain is
        // Top, so there is nothing to mutate in place; start from a fresh
        // (possibly empty, i.e. Top) map and reinsert.
        let mut payload = self.get().ok().cloned().unwrap_or_default();
        payload.insert_binding(variable, value);
        *self = Environment::from_value(payload);
    }

    fn bindings(&self) -> Vec<(Var, D)> {
        match self.get() {
            Ok(value) => value.map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::constant::Constant;

    type ConstD = AbstractDomainScaffolding<Constant<i32>>;
    type Env = Environment<&'static str, ConstD>;

    #[test]
    fn default_is_top_and_missing_var_reads_top() {
        let env = Env::top();
        assert!(env.get_binding(&"x").is_top());
    }

    #[test]
    fn set_then_get_roundtrips() {
        let mut env = Env::top();
        env.set("x", ConstD::from_value(Constant::new(1)));
        assert_eq!(env.get_binding(&"x").get().unwrap().get(), &1);
        assert!(env.get_binding(&"y").is_top());
    }

    #[test]
    fn setting_bottom_collapses_whole_environment() {
        let mut env = Env::top();
        env.set("x", ConstD::bottom());
        assert!(env.is_bottom());
    }

    #[test]
    fn join_drops_bindings_absent_on_either_side() {
        let mut a = Env::top();
        a.set("x", ConstD::from_value(Constant::new(1)));
        a.set("y", ConstD::from_value(Constant::new(2)));
        let mut b = Env::top();
        b.set("x", ConstD::from_value(Constant::new(1)));
        let j = a.join(&b);
        assert_eq!(j.get_binding(&"x").get().unwrap().get(), &1);
        assert!(j.get_binding(&"y").is_top());
    }
}
