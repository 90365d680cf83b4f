//! Lattice trait definition and some common implementations.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

/// Whether a join changed the value it was applied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinEffect {
    Unchanged,
    Changed,
}

impl JoinEffect {
    #[inline]
    pub fn changed(self) -> bool {
        matches!(self, JoinEffect::Changed)
    }
}

impl From<bool> for JoinEffect {
    fn from(changed: bool) -> JoinEffect {
        if changed {
            JoinEffect::Changed
        } else {
            JoinEffect::Unchanged
        }
    }
}

impl std::ops::BitOr for JoinEffect {
    type Output = JoinEffect;

    #[inline]
    fn bitor(self, rhs: JoinEffect) -> JoinEffect {
        JoinEffect::from(self.changed() || rhs.changed())
    }
}

impl std::ops::BitOrAssign for JoinEffect {
    #[inline]
    fn bitor_assign(&mut self, rhs: JoinEffect) {
        *self = *self | rhs;
    }
}

impl std::fmt::Display for JoinEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.changed() {
            f.write_str("changed")
        } else {
            f.write_str("unchanged")
        }
    }
}

/// A lattice type used for an analysis.
///
/// Values must form a bounded join-semilattice. The `join` operator must
/// compute the least upper bound of its operands and obey the usual laws:
///
/// * a `join` a == a  (idempotence)
/// * a `join` b == b `join` a (commutativity)
/// * a `join` (b `join` c) == (a `join` b) `join` c (associativity)
///
/// and every ascending chain must be finite, so that repeated joins from
/// any starting value reach a fixed point. None of this is checked at
/// runtime: a lattice that breaks these laws makes the engine loop
/// forever or compute unsound results.
///
/// `equals` must agree with `join`: if `a.join(&b)` reports
/// `Unchanged`, then `a` already covered `b`.
///
/// Values must be `Send + Sync` so that results can move between threads.
pub trait Lattice: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// The value modeling "no information yet".
    fn initial() -> Self;

    /// Mutates self to `join(self, other)`, reporting whether anything
    /// changed.
    fn join(&mut self, other: &Self) -> JoinEffect;

    fn equals(&self, other: &Self) -> bool {
        self == other
    }
}

/// A lattice with a single value, for analyses that only model the
/// environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NoopLattice;

impl Lattice for NoopLattice {
    fn initial() -> Self {
        NoopLattice
    }

    fn join(&mut self, _: &NoopLattice) -> JoinEffect {
        JoinEffect::Unchanged
    }
}

/// The two-element lattice `Bottom < Top`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TwoPoint {
    Bottom,
    Top,
}

impl Lattice for TwoPoint {
    fn initial() -> Self {
        TwoPoint::Bottom
    }

    fn join(&mut self, other: &TwoPoint) -> JoinEffect {
        if *self == TwoPoint::Bottom && *other == TwoPoint::Top {
            *self = TwoPoint::Top;
            JoinEffect::Changed
        } else {
            JoinEffect::Unchanged
        }
    }
}

/// The flat lattice over `T`: `Bottom` below every `Value`, and `Top`
/// above all of them. Two different values join to `Top`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Flat<T> {
    Bottom,
    Value(T),
    Top,
}

impl<T> Flat<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Flat::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl<T: Clone + Debug + PartialEq + Send + Sync + 'static> Lattice for Flat<T> {
    fn initial() -> Self {
        Flat::Bottom
    }

    fn join(&mut self, other: &Flat<T>) -> JoinEffect {
        let joined = match (&*self, other) {
            (_, Flat::Bottom) | (Flat::Top, _) => return JoinEffect::Unchanged,
            (Flat::Value(a), Flat::Value(b)) if a == b => return JoinEffect::Unchanged,
            (Flat::Bottom, _) => other.clone(),
            _ => Flat::Top,
        };
        *self = joined;
        JoinEffect::Changed
    }
}

/// A map from keys to lattice values, joined pointwise. A key missing
/// from one side takes the other side's value.
#[derive(Clone, Debug, PartialEq)]
pub struct MapLattice<K: Ord, V> {
    map: BTreeMap<K, V>,
}

impl<K: Ord, V> Default for MapLattice<K, V> {
    fn default() -> Self {
        MapLattice {
            map: BTreeMap::new(),
        }
    }
}

impl<K: Ord, V> MapLattice<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.map.insert(key, value);
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.map.remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map.iter()
    }
}

impl<K, V> Lattice for MapLattice<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Lattice,
{
    fn initial() -> Self {
        MapLattice::default()
    }

    fn join(&mut self, other: &MapLattice<K, V>) -> JoinEffect {
        let mut effect = JoinEffect::Unchanged;
        for (key, value) in &other.map {
            match self.map.get_mut(key) {
                Some(mine) => effect |= mine.join(value),
                None => {
                    self.map.insert(key.clone(), value.clone());
                    effect = JoinEffect::Changed;
                }
            }
        }
        effect
    }
}

/// A may-set: values are sets and join is union. Useful when an analysis
/// computes whether a property *may* hold on some path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnionSet<T: Ord> {
    set: BTreeSet<T>,
}

impl<T: Ord> Default for UnionSet<T> {
    fn default() -> Self {
        UnionSet {
            set: BTreeSet::new(),
        }
    }
}

impl<T: Ord> UnionSet<T> {
    pub fn contains(&self, value: &T) -> bool {
        self.set.contains(value)
    }

    pub fn insert(&mut self, value: T) -> bool {
        self.set.insert(value)
    }

    pub fn remove(&mut self, value: &T) -> bool {
        self.set.remove(value)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.set.iter()
    }
}

impl<T: Ord + Clone + Debug + Send + Sync + 'static> Lattice for UnionSet<T> {
    fn initial() -> Self {
        UnionSet::default()
    }

    fn join(&mut self, other: &UnionSet<T>) -> JoinEffect {
        let before = self.set.len();
        self.set.extend(other.set.iter().cloned());
        JoinEffect::from(self.set.len() != before)
    }
}

/// A must-set: values are sets and join is intersection. Useful when an
/// analysis computes whether a property *must* hold on every path.
///
/// The lattice order is reversed set inclusion, so the least upper bound
/// of two sets is their intersection. Every chain is bounded by the size
/// of the first set a block sees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntersectionSet<T: Ord> {
    set: BTreeSet<T>,
}

impl<T: Ord> Default for IntersectionSet<T> {
    fn default() -> Self {
        IntersectionSet {
            set: BTreeSet::new(),
        }
    }
}

impl<T: Ord> IntersectionSet<T> {
    pub fn contains(&self, value: &T) -> bool {
        self.set.contains(value)
    }

    pub fn insert(&mut self, value: T) -> bool {
        self.set.insert(value)
    }

    pub fn remove(&mut self, value: &T) -> bool {
        self.set.remove(value)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.set.iter()
    }
}

impl<T: Ord + Clone + Debug + Send + Sync + 'static> Lattice for IntersectionSet<T> {
    fn initial() -> Self {
        IntersectionSet::default()
    }

    fn join(&mut self, other: &IntersectionSet<T>) -> JoinEffect {
        let before = self.set.len();
        self.set.retain(|value| other.set.contains(value));
        JoinEffect::from(self.set.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn two_point() -> impl Strategy<Value = TwoPoint> {
        prop_oneof![Just(TwoPoint::Bottom), Just(TwoPoint::Top)]
    }

    fn rank(value: TwoPoint) -> u8 {
        match value {
            TwoPoint::Bottom => 0,
            TwoPoint::Top => 1,
        }
    }

    proptest! {
        #[test]
        fn two_point_joins_never_decrease(
            start in two_point(),
            others in prop::collection::vec(two_point(), 0..64),
        ) {
            let mut acc = start;
            for other in others {
                let before = acc;
                let effect = acc.join(&other);
                prop_assert!(rank(acc) >= rank(before));
                prop_assert!(rank(acc) >= rank(other));
                prop_assert_eq!(effect.changed(), acc != before);
            }
        }

        #[test]
        fn flat_join_is_commutative(
            a in prop::option::of(0u8..4),
            b in prop::option::of(0u8..4),
        ) {
            let lift = |v: Option<u8>| v.map(Flat::Value).unwrap_or(Flat::Bottom);
            let mut ab = lift(a);
            ab.join(&lift(b));
            let mut ba = lift(b);
            ba.join(&lift(a));
            prop_assert_eq!(ab, ba);
        }

        #[test]
        fn union_set_join_is_idempotent(items in prop::collection::btree_set(0u32..32, 0..16)) {
            let mut set = UnionSet::default();
            for item in items {
                set.insert(item);
            }
            let copy = set.clone();
            prop_assert_eq!(set.join(&copy), JoinEffect::Unchanged);
            prop_assert_eq!(set, copy);
        }
    }

    #[test]
    fn idempotent_join_reports_unchanged() {
        let mut top = TwoPoint::Top;
        assert_eq!(top.join(&TwoPoint::Top), JoinEffect::Unchanged);
        let mut bottom = TwoPoint::Bottom;
        assert_eq!(bottom.join(&TwoPoint::Bottom), JoinEffect::Unchanged);
        assert_eq!(bottom, TwoPoint::Bottom);

        let mut flat = Flat::Value(3);
        assert_eq!(flat.join(&Flat::Value(3)), JoinEffect::Unchanged);
        assert_eq!(flat, Flat::Value(3));

        let mut noop = NoopLattice;
        assert_eq!(noop.join(&NoopLattice), JoinEffect::Unchanged);
    }

    #[test]
    fn flat_join_goes_to_top_on_conflict() {
        let mut flat = Flat::Bottom;
        assert_eq!(flat.join(&Flat::Value(1)), JoinEffect::Changed);
        assert_eq!(flat.join(&Flat::Bottom), JoinEffect::Unchanged);
        assert_eq!(flat.join(&Flat::Value(2)), JoinEffect::Changed);
        assert_eq!(flat, Flat::Top);
        assert_eq!(flat.join(&Flat::Value(1)), JoinEffect::Unchanged);
    }

    #[test]
    fn map_lattice_joins_pointwise() {
        let mut a: MapLattice<&'static str, Flat<i64>> = MapLattice::default();
        a.insert("x", Flat::Value(1));
        let mut b = MapLattice::default();
        b.insert("x", Flat::Value(2));
        b.insert("y", Flat::Value(5));

        assert_eq!(a.join(&b), JoinEffect::Changed);
        assert_eq!(a.get(&"x"), Some(&Flat::Top));
        assert_eq!(a.get(&"y"), Some(&Flat::Value(5)));
        assert_eq!(a.join(&b), JoinEffect::Unchanged);
    }

    #[test]
    fn intersection_set_keeps_common_elements() {
        let mut a = IntersectionSet::default();
        a.insert(1);
        a.insert(2);
        let mut b = IntersectionSet::default();
        b.insert(2);
        b.insert(3);
        assert_eq!(a.join(&b), JoinEffect::Changed);
        assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(a.join(&b), JoinEffect::Unchanged);
    }

    #[test]
    fn join_effects_combine() {
        use JoinEffect::*;
        assert_eq!(Unchanged | Unchanged, Unchanged);
        assert_eq!(Unchanged | Changed, Changed);
        let mut effect = Unchanged;
        effect |= Changed;
        assert_eq!(effect, Changed);
        assert_eq!(format!("{}", effect), "changed");
    }
}
