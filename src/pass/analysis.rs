//! Analysis definitions and the adapter that erases their lattice type.
//!
//! An analysis author implements [`DataflowAnalysis`] for a concrete
//! lattice. The engine only ever sees [`TypeErasedAnalysis`], which
//! [`AnalysisAdapter`] implements for any `DataflowAnalysis` by
//! unwrapping the erased values it created and delegating to the concrete
//! lattice and transfer functions.

use super::{ErasedLattice, JoinEffect, Lattice};
use crate::env::{Environment, Value, ValueMerger};
use crate::ir::{Element, Stmt, Type};

/// Which transfer hooks an analysis implements.
///
/// Analyses migrating from the element-level hook to the statement-level
/// hook may enable both for a while; both then run for every statement,
/// element-level first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferKinds {
    /// Run `DataflowAnalysis::transfer_element` on every element.
    pub element: bool,
    /// Run `DataflowAnalysis::transfer_stmt` on statement elements.
    pub statement: bool,
}

impl TransferKinds {
    pub const ELEMENT: TransferKinds = TransferKinds {
        element: true,
        statement: false,
    };
    pub const STATEMENT: TransferKinds = TransferKinds {
        element: false,
        statement: true,
    };
    pub const BOTH: TransferKinds = TransferKinds {
        element: true,
        statement: true,
    };
}

/// Framework-level switches that apply to one analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Apply the environment's builtin transfer (assignments,
    /// initializers, scope ends) before the analysis's own hooks.
    pub builtin_transfer: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            builtin_transfer: true,
        }
    }
}

/// A dataflow analysis over a single lattice type.
pub trait DataflowAnalysis {
    type Lattice: Lattice;

    /// The lattice value at function entry.
    fn initial_element(&self) -> Self::Lattice {
        Self::Lattice::initial()
    }

    /// The transfer hooks this analysis implements. Read once, when the
    /// adapter is built.
    fn transfer_kinds(&self) -> TransferKinds {
        TransferKinds::ELEMENT
    }

    /// Element-level transfer function.
    fn transfer_element(
        &self,
        _element: &Element,
        _lattice: &mut Self::Lattice,
        _env: &mut Environment,
    ) {
    }

    /// Statement-level transfer function.
    fn transfer_stmt(&self, _stmt: &Stmt, _lattice: &mut Self::Lattice, _env: &mut Environment) {}

    /// Merges two distinct environment values of a variable of type `ty`
    /// at a join point. This can be a strict join or a widening. The
    /// default forgets the value.
    fn merge(
        &self,
        _ty: &Type,
        _a: &Value,
        _b: &Value,
        _merged: &mut Environment,
    ) -> Option<Value> {
        None
    }

    fn options(&self) -> AnalysisOptions {
        AnalysisOptions::default()
    }
}

/// A reusable component that models one aspect of program semantics in
/// the environment.
pub trait DataflowModel {
    /// Applies the model to `element`. Returns whether the model handled
    /// it.
    fn transfer(&self, element: &Element, env: &mut Environment) -> bool;
}

/// The lattice-agnostic face of an analysis, as seen by the engine.
pub trait TypeErasedAnalysis: ValueMerger {
    fn initial_element_erased(&self) -> ErasedLattice;

    /// Joins `b` into `a`.
    fn join_erased(&self, a: &mut ErasedLattice, b: &ErasedLattice) -> JoinEffect;

    fn equal_erased(&self, a: &ErasedLattice, b: &ErasedLattice) -> bool;

    /// Applies the models and the analysis's transfer hooks to one
    /// element.
    fn transfer_erased(
        &self,
        element: &Element,
        lattice: &mut ErasedLattice,
        env: &mut Environment,
    );

    fn options(&self) -> &AnalysisOptions;
}

/// Adapts a [`DataflowAnalysis`] to [`TypeErasedAnalysis`].
pub struct AnalysisAdapter<A: DataflowAnalysis> {
    analysis: A,
    transfers: TransferKinds,
    options: AnalysisOptions,
    models: Vec<Box<dyn DataflowModel>>,
}

impl<A: DataflowAnalysis> AnalysisAdapter<A> {
    /// Wraps `analysis`, enabling the transfer hooks it declares.
    pub fn new(analysis: A) -> Self {
        let transfers = analysis.transfer_kinds();
        Self::with_transfers(analysis, transfers)
    }

    /// Wraps `analysis`, enabling exactly the transfer hooks in
    /// `transfers`.
    pub fn with_transfers(analysis: A, transfers: TransferKinds) -> Self {
        let options = analysis.options();
        log::debug!(
            "adapter for {}: transfers {:?}, options {:?}",
            std::any::type_name::<A>(),
            transfers,
            options
        );
        AnalysisAdapter {
            analysis,
            transfers,
            options,
            models: vec![],
        }
    }

    /// Attaches a model that runs before the analysis's hooks.
    pub fn with_model<M: DataflowModel + 'static>(mut self, model: M) -> Self {
        self.models.push(Box::new(model));
        self
    }

    pub fn analysis(&self) -> &A {
        &self.analysis
    }

    pub fn transfers(&self) -> TransferKinds {
        self.transfers
    }
}

impl<A: DataflowAnalysis> ValueMerger for AnalysisAdapter<A> {
    fn merge(&self, ty: &Type, a: &Value, b: &Value, merged: &mut Environment) -> Option<Value> {
        self.analysis.merge(ty, a, b, merged)
    }
}

impl<A: DataflowAnalysis> TypeErasedAnalysis for AnalysisAdapter<A> {
    fn initial_element_erased(&self) -> ErasedLattice {
        ErasedLattice::wrap(self.analysis.initial_element())
    }

    fn join_erased(&self, a: &mut ErasedLattice, b: &ErasedLattice) -> JoinEffect {
        let b = b.get::<A::Lattice>();
        a.get_mut::<A::Lattice>().join(b)
    }

    fn equal_erased(&self, a: &ErasedLattice, b: &ErasedLattice) -> bool {
        a.get::<A::Lattice>().equals(b.get::<A::Lattice>())
    }

    fn transfer_erased(
        &self,
        element: &Element,
        lattice: &mut ErasedLattice,
        env: &mut Environment,
    ) {
        let handled = self
            .models
            .iter()
            .filter(|model| model.transfer(element, env))
            .count();
        log::trace!(
            "models: {} of {} handled {:?}",
            handled,
            self.models.len(),
            element
        );

        let lattice = lattice.get_mut::<A::Lattice>();
        // Both hooks run when both are enabled. This keeps analyses that
        // are partway through moving to the statement-level hook working;
        // once none remain, only the most specific hook should run.
        if self.transfers.element {
            self.analysis.transfer_element(element, lattice, env);
        }
        if self.transfers.statement {
            if let Some(stmt) = element.as_stmt() {
                self.analysis.transfer_stmt(stmt, lattice, env);
            }
        }
    }

    fn options(&self) -> &AnalysisOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::ir::{Expr, Operand, Var};
    use crate::pass::{Flat, MapLattice, TwoPoint};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Records which hooks ran, in order.
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<&'static str>>,
        kinds: Option<TransferKinds>,
    }

    impl DataflowAnalysis for Recorder {
        type Lattice = TwoPoint;

        fn transfer_kinds(&self) -> TransferKinds {
            self.kinds.unwrap_or(TransferKinds::ELEMENT)
        }

        fn transfer_element(&self, _: &Element, lattice: &mut TwoPoint, _: &mut Environment) {
            self.calls.borrow_mut().push("element");
            *lattice = TwoPoint::Top;
        }

        fn transfer_stmt(&self, _: &Stmt, _: &mut TwoPoint, _: &mut Environment) {
            self.calls.borrow_mut().push("stmt");
        }
    }

    fn eval_stmt() -> Element {
        Element::Statement(Stmt::Eval(Expr::Use(Operand::Var(Var::new(0)))))
    }

    fn run_one(adapter: &AnalysisAdapter<Recorder>, element: &Element) -> ErasedLattice {
        let mut lattice = adapter.initial_element_erased();
        let mut env = Environment::empty();
        adapter.transfer_erased(element, &mut lattice, &mut env);
        lattice
    }

    #[test]
    fn both_hooks_run_in_fixed_order() {
        let adapter = AnalysisAdapter::new(Recorder {
            kinds: Some(TransferKinds::BOTH),
            ..Recorder::default()
        });
        let lattice = run_one(&adapter, &eval_stmt());
        assert_eq!(*adapter.analysis().calls.borrow(), vec!["element", "stmt"]);
        assert_eq!(lattice.get::<TwoPoint>(), &TwoPoint::Top);
    }

    #[test]
    fn statement_hook_skips_other_elements() {
        let adapter = AnalysisAdapter::new(Recorder {
            kinds: Some(TransferKinds::BOTH),
            ..Recorder::default()
        });
        run_one(&adapter, &Element::ScopeEnd(Var::new(0)));
        assert_eq!(*adapter.analysis().calls.borrow(), vec!["element"]);
    }

    #[test]
    fn explicit_transfer_kinds_override_the_declaration() {
        let adapter =
            AnalysisAdapter::with_transfers(Recorder::default(), TransferKinds::STATEMENT);
        let lattice = run_one(&adapter, &eval_stmt());
        assert_eq!(*adapter.analysis().calls.borrow(), vec!["stmt"]);
        assert_eq!(lattice.get::<TwoPoint>(), &TwoPoint::Bottom);
        assert_eq!(adapter.transfers(), TransferKinds::STATEMENT);
    }

    #[test]
    fn join_and_equal_delegate_to_the_lattice() {
        let adapter = AnalysisAdapter::new(Recorder::default());
        let mut a = adapter.initial_element_erased();
        let b = ErasedLattice::wrap(TwoPoint::Top);
        assert!(!adapter.equal_erased(&a, &b));
        assert_eq!(adapter.join_erased(&mut a, &b), JoinEffect::Changed);
        assert!(adapter.equal_erased(&a, &b));
        assert_eq!(adapter.join_erased(&mut a, &b), JoinEffect::Unchanged);
    }

    #[test]
    #[should_panic(expected = "erased lattice holds")]
    fn foreign_erased_values_are_rejected() {
        let adapter = AnalysisAdapter::new(Recorder::default());
        let mut a = adapter.initial_element_erased();
        let foreign = ErasedLattice::wrap(MapLattice::<u32, Flat<i64>>::default());
        adapter.join_erased(&mut a, &foreign);
    }

    struct CountingModel {
        calls: Rc<Cell<usize>>,
        handles: bool,
    }

    impl DataflowModel for CountingModel {
        fn transfer(&self, _: &Element, _: &mut Environment) -> bool {
            self.calls.set(self.calls.get() + 1);
            self.handles
        }
    }

    #[test]
    fn models_run_for_every_element() {
        let count = Rc::new(Cell::new(0));
        let adapter = AnalysisAdapter::new(Recorder::default()).with_model(CountingModel {
            calls: count.clone(),
            handles: true,
        });
        run_one(&adapter, &eval_stmt());
        run_one(&adapter, &Element::ScopeEnd(Var::new(0)));
        assert_eq!(count.get(), 2);
        assert_eq!(adapter.analysis().calls.borrow().len(), 2);
    }

    #[test]
    fn every_model_runs_whether_or_not_others_handle_the_element() {
        let skipped = Rc::new(Cell::new(0));
        let handled = Rc::new(Cell::new(0));
        let adapter = AnalysisAdapter::new(Recorder::default())
            .with_model(CountingModel {
                calls: handled.clone(),
                handles: true,
            })
            .with_model(CountingModel {
                calls: skipped.clone(),
                handles: false,
            });
        let lattice = run_one(&adapter, &eval_stmt());
        assert_eq!((handled.get(), skipped.get()), (1, 1));
        // The analysis's own hook still runs after the models.
        assert_eq!(*adapter.analysis().calls.borrow(), vec!["element"]);
        assert_eq!(lattice.get::<TwoPoint>(), &TwoPoint::Top);
    }
}
