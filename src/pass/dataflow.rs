//! Forward worklist dataflow engine over type-erased analysis state.
//!
//! The engine is written once against [`TypeErasedAnalysis`]; the typed
//! front door [`run_dataflow_analysis`] wraps a concrete analysis and
//! unwraps the converged table again.

use super::{AnalysisAdapter, DataflowAnalysis, ErasedLattice, TypeErasedAnalysis};
use crate::cfg::{CFGInfo, RPOIndex};
use crate::entity::EntityVec;
use crate::env::Environment;
use crate::errors::DataflowError;
use crate::ir::{Block, Element, FunctionBody};
use fxhash::FxHashSet;
use std::collections::{BTreeSet, VecDeque};

/// Analysis state at a control-flow point, as seen by the engine.
#[derive(Clone, Debug)]
pub struct TypeErasedState {
    pub lattice: ErasedLattice,
    pub env: Environment,
}

/// Analysis state at a control-flow point, for a concrete lattice.
#[derive(Clone, Debug)]
pub struct AnalysisState<L> {
    pub lattice: L,
    pub env: Environment,
}

/// The state recorded for one block.
#[derive(Clone, Debug)]
pub enum BlockState<S> {
    /// The engine never reached this block.
    Unvisited,
    /// State at the exit of the block.
    Visited(S),
}

impl<S> Default for BlockState<S> {
    fn default() -> Self {
        BlockState::Unvisited
    }
}

impl<S> BlockState<S> {
    pub fn is_visited(&self) -> bool {
        matches!(self, BlockState::Visited(_))
    }

    pub fn as_visited(&self) -> Option<&S> {
        match self {
            BlockState::Visited(state) => Some(state),
            BlockState::Unvisited => None,
        }
    }

    pub fn map<T, F: FnOnce(S) -> T>(self, f: F) -> BlockState<T> {
        match self {
            BlockState::Visited(state) => BlockState::Visited(f(state)),
            BlockState::Unvisited => BlockState::Unvisited,
        }
    }
}

/// Order in which the worklist hands out blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorklistOrder {
    /// Lowest reverse-postorder position first.
    ReversePostorder,
    /// First queued, first visited.
    Fifo,
}

impl Default for WorklistOrder {
    fn default() -> Self {
        WorklistOrder::ReversePostorder
    }
}

#[derive(Clone, Debug, Default)]
pub struct DataflowConfig {
    pub order: WorklistOrder,
}

/// Converged per-block exit states of one run.
#[derive(Clone, Debug)]
pub struct BlockStates<S> {
    states: EntityVec<Block, BlockState<S>>,
    visits: usize,
}

impl<S> BlockStates<S> {
    pub fn get(&self, block: Block) -> &BlockState<S> {
        &self.states[block]
    }

    /// Exit state of `block`, if the engine reached it.
    pub fn exit(&self, block: Block) -> Option<&S> {
        self.states[block].as_visited()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (Block, &BlockState<S>)> {
        self.states.entries()
    }

    /// Total number of block visits it took to converge.
    pub fn visits(&self) -> usize {
        self.visits
    }

    pub fn map<T, F: FnMut(S) -> T>(self, mut f: F) -> BlockStates<T> {
        let states = self
            .states
            .into_vec()
            .into_iter()
            .map(|state| state.map(&mut f))
            .collect::<Vec<_>>();
        BlockStates {
            states: EntityVec::from(states),
            visits: self.visits,
        }
    }
}

impl<S> std::ops::Index<Block> for BlockStates<S> {
    type Output = BlockState<S>;
    fn index(&self, block: Block) -> &BlockState<S> {
        &self.states[block]
    }
}

enum Worklist {
    Rpo(BTreeSet<RPOIndex>),
    Fifo {
        queue: VecDeque<Block>,
        queued: FxHashSet<Block>,
    },
}

impl Worklist {
    fn new(order: WorklistOrder) -> Worklist {
        match order {
            WorklistOrder::ReversePostorder => Worklist::Rpo(BTreeSet::new()),
            WorklistOrder::Fifo => Worklist::Fifo {
                queue: VecDeque::new(),
                queued: FxHashSet::default(),
            },
        }
    }

    fn push(&mut self, block: Block, cfg: &CFGInfo) {
        match self {
            Worklist::Rpo(set) => {
                if let Some(pos) = cfg.rpo_pos[block] {
                    set.insert(pos);
                }
            }
            Worklist::Fifo { queue, queued } => {
                if queued.insert(block) {
                    queue.push_back(block);
                }
            }
        }
    }

    fn pop(&mut self, cfg: &CFGInfo) -> Option<Block> {
        match self {
            Worklist::Rpo(set) => {
                let pos = *set.iter().next()?;
                set.remove(&pos);
                Some(cfg.rpo[pos])
            }
            Worklist::Fifo { queue, queued } => {
                let block = queue.pop_front()?;
                queued.remove(&block);
                Some(block)
            }
        }
    }
}

/// Joins the exit states of `block`'s visited predecessors (plus the
/// initial state, for the entry block) into its input state. `None` if
/// nothing reaches the block yet.
fn block_input(
    body: &FunctionBody,
    analysis: &dyn TypeErasedAnalysis,
    block: Block,
    exits: &EntityVec<Block, BlockState<TypeErasedState>>,
    initial: &TypeErasedState,
) -> Option<TypeErasedState> {
    let mut input = if block == body.entry {
        Some(initial.clone())
    } else {
        None
    };
    for &pred in &body.blocks[block].preds {
        let exit = match &exits[pred] {
            BlockState::Visited(exit) => exit,
            BlockState::Unvisited => continue,
        };
        input = Some(match input {
            None => exit.clone(),
            Some(mut state) => {
                analysis.join_erased(&mut state.lattice, &exit.lattice);
                state.env = state.env.join(&exit.env, analysis);
                state
            }
        });
    }
    input
}

fn transfer(analysis: &dyn TypeErasedAnalysis, element: &Element, state: &mut TypeErasedState) {
    if analysis.options().builtin_transfer {
        state.env.apply_builtin(element);
    }
    analysis.transfer_erased(element, &mut state.lattice, &mut state.env);
}

/// Runs `analysis` over `body` to a fixed point.
///
/// The graph and every element are checked before anything runs, so an
/// error never comes with a partial table. When `observer` is given, each
/// reached block is replayed from its converged input state in reverse
/// postorder once the run has converged, and the observer sees the state
/// after every element.
pub fn run_type_erased_analysis(
    body: &FunctionBody,
    analysis: &dyn TypeErasedAnalysis,
    initial_env: &Environment,
    config: &DataflowConfig,
    observer: Option<&mut dyn FnMut(&Element, &ErasedLattice, &Environment) -> anyhow::Result<()>>,
) -> Result<BlockStates<TypeErasedState>, DataflowError> {
    let cfg = CFGInfo::new(body)?;
    for (block, def) in body.blocks.entries() {
        for (index, element) in def.elements.iter().enumerate() {
            initial_env.check_element(block, index, element)?;
        }
    }

    let initial = TypeErasedState {
        lattice: analysis.initial_element_erased(),
        env: initial_env.fork(),
    };
    let mut exits: EntityVec<Block, BlockState<TypeErasedState>> =
        EntityVec::from_fn(body.blocks.len(), |_| BlockState::Unvisited);
    let mut worklist = Worklist::new(config.order);
    for block in cfg.reachable_blocks() {
        worklist.push(block, &cfg);
    }

    let mut visits = 0;
    while let Some(block) = worklist.pop(&cfg) {
        let mut state = match block_input(body, analysis, block, &exits, &initial) {
            Some(state) => state,
            None => {
                log::trace!("dataflow: {} has no input yet", block);
                continue;
            }
        };
        visits += 1;

        for element in &body.blocks[block].elements {
            transfer(analysis, element, &mut state);
        }

        // Only the lattice decides whether successors are queued again.
        let (changed, env_changed) = match &exits[block] {
            BlockState::Visited(old) => (
                !analysis.equal_erased(&old.lattice, &state.lattice),
                !old.env.equivalent_to(&state.env),
            ),
            BlockState::Unvisited => (true, true),
        };
        log::trace!(
            "dataflow: visited {} (changed: {}, env changed: {}): {:?}",
            block,
            changed,
            env_changed,
            state.lattice
        );
        exits[block] = BlockState::Visited(state);

        if changed {
            for &succ in &body.blocks[block].succs {
                worklist.push(succ, &cfg);
            }
        }
    }
    log::debug!(
        "dataflow: {} converged after {} visits of {} blocks",
        body.name,
        visits,
        body.blocks.len()
    );

    if let Some(observer) = observer {
        for block in cfg.reachable_blocks() {
            if !exits[block].is_visited() {
                continue;
            }
            let mut state = match block_input(body, analysis, block, &exits, &initial) {
                Some(state) => state,
                None => continue,
            };
            for element in &body.blocks[block].elements {
                transfer(analysis, element, &mut state);
                observer(element, &state.lattice, &state.env).map_err(DataflowError::Observer)?;
            }
        }
    }

    Ok(BlockStates {
        states: exits,
        visits,
    })
}

/// Runs a concrete analysis over `body` to a fixed point. See
/// [`run_type_erased_analysis`].
pub fn run_dataflow_analysis<A: DataflowAnalysis>(
    body: &FunctionBody,
    analysis: &AnalysisAdapter<A>,
    initial_env: &Environment,
    config: &DataflowConfig,
    mut observer: Option<
        &mut dyn FnMut(&Element, &A::Lattice, &Environment) -> anyhow::Result<()>,
    >,
) -> Result<BlockStates<AnalysisState<A::Lattice>>, DataflowError> {
    let observing = observer.is_some();
    let mut erased_observer =
        |element: &Element, lattice: &ErasedLattice, env: &Environment| -> anyhow::Result<()> {
            match observer.as_deref_mut() {
                Some(observer) => observer(element, lattice.get::<A::Lattice>(), env),
                None => Ok(()),
            }
        };
    let erased_observer = if observing {
        Some(
            &mut erased_observer
                as &mut dyn FnMut(&Element, &ErasedLattice, &Environment) -> anyhow::Result<()>,
        )
    } else {
        None
    };

    let states = run_type_erased_analysis(body, analysis, initial_env, config, erased_observer)?;
    Ok(states.map(|state| AnalysisState {
        lattice: state.lattice.unwrap_as::<A::Lattice>(),
        env: state.env,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::ir::{parse_function, Stmt, Var};
    use crate::pass::{
        Flat, IntersectionSet, JoinEffect, Lattice, TransferKinds, TwoPoint, UnionSet,
    };

    /// Variables definitely assigned on every path.
    struct Assigned;

    impl DataflowAnalysis for Assigned {
        type Lattice = IntersectionSet<Var>;

        fn transfer_element(
            &self,
            element: &Element,
            lattice: &mut IntersectionSet<Var>,
            _: &mut Environment,
        ) {
            if let Some(var) = element.def() {
                lattice.insert(var);
            }
        }
    }

    fn run<A: DataflowAnalysis>(
        text: &str,
        analysis: A,
        order: WorklistOrder,
    ) -> (FunctionBody, BlockStates<AnalysisState<A::Lattice>>) {
        let body = parse_function(text).unwrap();
        let adapter = AnalysisAdapter::new(analysis);
        let states = run_dataflow_analysis(
            &body,
            &adapter,
            &Environment::new(&body),
            &DataflowConfig { order },
            None,
        )
        .unwrap();
        (body, states)
    }

    const DIAMOND: &str = "
        var c: bool
        var x: i64
        b0:
            c = call cond()
            branch c
            goto b1, b2
        b1:
            x = 1
            goto b3
        b2:
            goto b3
        b3:
            return x
        dead:
            x = 2
            goto b3
    ";

    fn block(body: &FunctionBody, label: &str) -> Block {
        body.blocks
            .iter()
            .find(|&b| body.blocks[b].label.as_deref() == Some(label))
            .unwrap()
    }

    #[test]
    fn diamond_intersects_at_the_merge() {
        let (body, states) = run(DIAMOND, Assigned, WorklistOrder::ReversePostorder);
        let x = body.var_named("x").unwrap();
        let c = body.var_named("c").unwrap();

        let b1 = states.exit(block(&body, "b1")).unwrap();
        assert!(b1.lattice.contains(&x));
        let b3 = states.exit(block(&body, "b3")).unwrap();
        assert!(!b3.lattice.contains(&x));
        assert!(b3.lattice.contains(&c));
        assert!(states.visits() <= 4);
    }

    #[test]
    fn unreachable_blocks_stay_unvisited() {
        let (body, states) = run(DIAMOND, Assigned, WorklistOrder::Fifo);
        assert!(!states[block(&body, "dead")].is_visited());
        assert_eq!(
            states.entries().filter(|(_, state)| state.is_visited()).count(),
            4
        );
    }

    #[test]
    fn environment_is_threaded_and_joined() {
        let (body, states) = run(
            "var x: i64
             var y: i64
             var c: bool
             entry:
                 x = 3
                 c = call cond()
                 branch c
                 goto left, right
             left:
                 y = x + 1
                 goto join
             right:
                 y = 5
                 goto join
             join:
                 return y",
            Assigned,
            WorklistOrder::ReversePostorder,
        );
        let x = body.var_named("x").unwrap();
        let y = body.var_named("y").unwrap();
        let left = states.exit(block(&body, "left")).unwrap();
        assert_eq!(left.env.get(y), Some(crate::env::Value::I64(4)));
        let join = states.exit(block(&body, "join")).unwrap();
        assert_eq!(join.env.get(x), Some(crate::env::Value::I64(3)));
        assert_eq!(join.env.get(y), None);
    }

    /// Counts loop iterations up to a height-3 lattice: Bottom, a single
    /// known count, Top.
    struct Trips;

    impl DataflowAnalysis for Trips {
        type Lattice = Flat<i64>;

        fn initial_element(&self) -> Flat<i64> {
            Flat::Value(0)
        }

        fn transfer_kinds(&self) -> TransferKinds {
            TransferKinds::STATEMENT
        }

        fn transfer_stmt(&self, stmt: &Stmt, lattice: &mut Flat<i64>, _: &mut Environment) {
            let trips = match (stmt, lattice.value()) {
                (Stmt::Eval(_), Some(&n)) => n,
                _ => return,
            };
            *lattice = Flat::Value(trips + 1);
        }
    }

    #[test]
    fn self_loop_terminates_within_lattice_height() {
        let (body, states) = run(
            "var c: bool
             entry:
                 goto head
             head:
                 eval call tick()
                 c = call more()
                 branch c
                 goto head, exit
             exit:
                 return",
            Trips,
            WorklistOrder::ReversePostorder,
        );
        let head = states.exit(block(&body, "head")).unwrap();
        assert_eq!(head.lattice, Flat::Top);
        let exit = states.exit(block(&body, "exit")).unwrap();
        assert_eq!(exit.lattice, Flat::Top);
        // Entry once; head and exit at most once per lattice level.
        assert!(states.visits() <= 1 + 3 + 3);
    }

    #[test]
    fn fifo_and_rpo_agree() {
        let (body, rpo) = run(DIAMOND, Assigned, WorklistOrder::ReversePostorder);
        let (_, fifo) = run(DIAMOND, Assigned, WorklistOrder::Fifo);
        for b in body.blocks.iter() {
            assert_eq!(
                rpo.exit(b).map(|s| s.lattice.clone()),
                fifo.exit(b).map(|s| s.lattice.clone())
            );
        }
    }

    #[test]
    fn observer_sees_every_reached_element_once_in_order() {
        let body = parse_function(DIAMOND).unwrap();
        let adapter = AnalysisAdapter::new(Assigned);
        let mut seen = vec![];
        let mut observer =
            |element: &Element, _: &IntersectionSet<Var>, _: &Environment| -> anyhow::Result<()> {
                seen.push(element.clone());
                Ok(())
            };
        run_dataflow_analysis(
            &body,
            &adapter,
            &Environment::new(&body),
            &DataflowConfig::default(),
            Some(&mut observer),
        )
        .unwrap();

        // Reverse postorder: the second successor of b0 comes first.
        let expected = ["b0", "b2", "b1", "b3"]
            .iter()
            .flat_map(|label| body.blocks[block(&body, label)].elements.iter().cloned())
            .collect::<Vec<_>>();
        assert_eq!(seen, expected);
    }

    /// Variables assigned on some path.
    struct Written;

    impl DataflowAnalysis for Written {
        type Lattice = UnionSet<Var>;

        fn transfer_element(
            &self,
            element: &Element,
            lattice: &mut UnionSet<Var>,
            _: &mut Environment,
        ) {
            if let Some(var) = element.def() {
                lattice.insert(var);
            }
        }
    }

    #[test]
    fn observer_states_never_decrease_along_a_block() {
        let body = parse_function(
            "var a: i64
             var b: i64
             entry:
                 a = 1
                 eval a
                 b = a
                 a = b
                 return b",
        )
        .unwrap();
        let adapter = AnalysisAdapter::new(Written);
        let mut seen: Vec<UnionSet<Var>> = vec![];
        let mut observer =
            |_: &Element, lattice: &UnionSet<Var>, _: &Environment| -> anyhow::Result<()> {
                seen.push(lattice.clone());
                Ok(())
            };
        run_dataflow_analysis(
            &body,
            &adapter,
            &Environment::new(&body),
            &DataflowConfig::default(),
            Some(&mut observer),
        )
        .unwrap();

        assert_eq!(seen.len(), body.blocks[body.entry].elements.len());
        let mut grew = false;
        for pair in seen.windows(2) {
            let mut later = pair[1].clone();
            assert_eq!(later.join(&pair[0]), JoinEffect::Unchanged, "{:?}", pair);
            let mut earlier = pair[0].clone();
            grew |= earlier.join(&pair[1]).changed();
        }
        assert!(grew);
    }

    #[test]
    fn observer_errors_abort_the_run() {
        let body = parse_function(DIAMOND).unwrap();
        let adapter = AnalysisAdapter::new(Assigned);
        let mut calls = 0;
        let mut observer =
            |_: &Element, _: &IntersectionSet<Var>, _: &Environment| -> anyhow::Result<()> {
                calls += 1;
                anyhow::bail!("stop")
            };
        let result = run_dataflow_analysis(
            &body,
            &adapter,
            &Environment::new(&body),
            &DataflowConfig::default(),
            Some(&mut observer),
        );
        assert!(matches!(result, Err(DataflowError::Observer(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn structural_errors_come_without_a_table() {
        let mut body = parse_function(DIAMOND).unwrap();
        body.entry = Block::new(99);
        let adapter = AnalysisAdapter::new(Assigned);
        let env = Environment::new(&body);
        assert!(matches!(
            run_dataflow_analysis(&body, &adapter, &env, &DataflowConfig::default(), None),
            Err(DataflowError::InvalidEntry(_))
        ));

        let body = parse_function(DIAMOND).unwrap();
        assert!(matches!(
            run_dataflow_analysis(
                &body,
                &adapter,
                &Environment::empty(),
                &DataflowConfig::default(),
                None
            ),
            Err(DataflowError::UnknownVariable { index: 0, .. })
        ));
    }

    #[test]
    fn records_are_rejected_even_in_dead_code() {
        let body = parse_function(
            "var p: record point
             entry:
                 return
             dead:
                 end p
                 goto entry",
        )
        .unwrap();
        let adapter = AnalysisAdapter::new(Assigned);
        let result = run_dataflow_analysis(
            &body,
            &adapter,
            &Environment::new(&body),
            &DataflowConfig::default(),
            None,
        );
        assert!(matches!(result, Err(DataflowError::UnsupportedType { .. })));
    }

    /// Ignores the program entirely; exercises the lattice defaults.
    struct Constant;

    impl DataflowAnalysis for Constant {
        type Lattice = TwoPoint;
    }

    #[test]
    fn default_hooks_leave_the_initial_element() {
        let (body, states) = run(DIAMOND, Constant, WorklistOrder::ReversePostorder);
        for b in body.blocks.iter() {
            if let Some(state) = states.exit(b) {
                assert_eq!(state.lattice, TwoPoint::initial());
            }
        }
    }
}
