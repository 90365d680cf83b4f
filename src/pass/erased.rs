//! Type-erased container for lattice values.
//!
//! The engine is written once against `ErasedLattice` and never learns
//! the concrete lattice type of the analysis it runs. Only the analysis
//! adapter, which created the values, reinterprets them; asking for any
//! other type is a wiring bug and panics.

use super::Lattice;
use std::any::Any;
use std::fmt::Debug;

trait ErasedValue: Debug + Send + Sync {
    fn clone_box(&self) -> Box<dyn ErasedValue>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn type_name(&self) -> &'static str;
}

impl<T: Lattice> ErasedValue for T {
    fn clone_box(&self) -> Box<dyn ErasedValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Holds exactly one lattice value of a type known only at runtime.
pub struct ErasedLattice(Box<dyn ErasedValue>);

impl ErasedLattice {
    pub fn wrap<T: Lattice>(value: T) -> ErasedLattice {
        ErasedLattice(Box::new(value))
    }

    /// Moves the held value out as a `T`.
    ///
    /// Panics if the container holds any other type.
    pub fn unwrap_as<T: Lattice>(self) -> T {
        let held = self.0.type_name();
        match self.0.into_any().downcast::<T>() {
            Ok(value) => *value,
            Err(_) => mismatch::<T>(held),
        }
    }

    /// Borrows the held value as a `T`.
    ///
    /// Panics if the container holds any other type.
    pub fn get<T: Lattice>(&self) -> &T {
        match self.0.as_any().downcast_ref::<T>() {
            Some(value) => value,
            None => mismatch::<T>(self.0.type_name()),
        }
    }

    /// Mutably borrows the held value as a `T`.
    ///
    /// Panics if the container holds any other type.
    pub fn get_mut<T: Lattice>(&mut self) -> &mut T {
        let held = self.0.type_name();
        match self.0.as_any_mut().downcast_mut::<T>() {
            Some(value) => value,
            None => mismatch::<T>(held),
        }
    }

    /// Borrows the held value if it is a `T`.
    pub fn try_get<T: Lattice>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    /// Name of the held value's concrete type.
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }
}

#[cold]
fn mismatch<T>(held: &'static str) -> ! {
    panic!(
        "erased lattice holds `{}` but was accessed as `{}`",
        held,
        std::any::type_name::<T>()
    )
}

impl Clone for ErasedLattice {
    fn clone(&self) -> Self {
        ErasedLattice(self.0.clone_box())
    }
}

impl Debug for ErasedLattice {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        Debug::fmt(&*self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::{Flat, TwoPoint, UnionSet};

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn erased_values_are_thread_safe() {
        assert_send_sync::<ErasedLattice>();
        let mut set = UnionSet::default();
        set.insert(1u32);
        set.insert(2);
        let erased = ErasedLattice::wrap(set);
        let moved = std::thread::spawn(move || erased.clone()).join().unwrap();
        assert_eq!(moved.get::<UnionSet<u32>>().len(), 2);
    }

    #[test]
    fn wrap_then_unwrap_returns_the_value() {
        let erased = ErasedLattice::wrap(Flat::Value(7i64));
        assert_eq!(erased.get::<Flat<i64>>(), &Flat::Value(7));
        assert_eq!(erased.unwrap_as::<Flat<i64>>(), Flat::Value(7));
    }

    #[test]
    fn clones_are_independent() {
        let mut set = UnionSet::default();
        set.insert(1u32);
        let mut a = ErasedLattice::wrap(set);
        let b = a.clone();
        a.get_mut::<UnionSet<u32>>().insert(2);
        assert_eq!(a.get::<UnionSet<u32>>().len(), 2);
        assert_eq!(b.get::<UnionSet<u32>>().len(), 1);
        assert_eq!(format!("{:?}", b), "UnionSet { set: {1} }");
    }

    #[test]
    fn try_get_reports_a_mismatch_without_panicking() {
        let erased = ErasedLattice::wrap(TwoPoint::Top);
        assert!(erased.try_get::<Flat<i64>>().is_none());
        assert_eq!(erased.try_get::<TwoPoint>(), Some(&TwoPoint::Top));
        assert!(erased.type_name().ends_with("TwoPoint"));
    }

    #[test]
    #[should_panic(expected = "was accessed as")]
    fn borrowing_as_the_wrong_type_panics() {
        let erased = ErasedLattice::wrap(TwoPoint::Bottom);
        let _ = erased.get::<Flat<i64>>();
    }

    #[test]
    #[should_panic(expected = "erased lattice holds")]
    fn unwrapping_as_the_wrong_type_panics() {
        let erased = ErasedLattice::wrap(Flat::<i64>::Top);
        let _ = erased.unwrap_as::<TwoPoint>();
    }
}
