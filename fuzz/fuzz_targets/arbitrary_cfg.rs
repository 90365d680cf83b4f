//! Fuzzing the fixed-point engine on arbitrary CFGs.
//!
//! 1. Generate a function body with an arbitrary CFG and arbitrary
//!    assignments.
//! 2. Run definite assignment and constant propagation with both
//!    worklist orders.
//! 3. Check that exactly the reachable blocks are visited and that the
//!    orders agree.

#![no_main]
use flowsense::cfg::CFGInfo;
use flowsense::env::Environment;
use flowsense::ir::{BinaryOp, Const, Element, Expr, FunctionBody, Operand, Stmt, Type};
use flowsense::pass::{
    run_dataflow_analysis, AnalysisAdapter, DataflowAnalysis, DataflowConfig, WorklistOrder,
};
use flowsense::passes::{ConstantPropagation, DefiniteAssignment};
use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;

#[derive(Clone, Debug, Arbitrary)]
struct CFG {
    num_blocks: u8,
    edges: Vec<(u8, u8)>,
    assigns: Vec<(u8, u8, i8)>,
}

const NUM_VARS: u8 = 4;

impl CFG {
    fn to_body(&self) -> FunctionBody {
        let mut body = FunctionBody::new("fuzz");
        let vars = (0..NUM_VARS)
            .map(|i| body.add_var(&format!("v{}", i), Type::I64))
            .collect::<Vec<_>>();

        let num_blocks = std::cmp::max(1, self.num_blocks);
        let mut blocks = vec![body.entry];
        for _ in 1..num_blocks {
            blocks.push(body.add_block());
        }

        for &(from, to) in &self.edges {
            let from = blocks[usize::from(from % num_blocks)];
            let to = blocks[usize::from(to % num_blocks)];
            body.add_edge(from, to);
        }

        for &(block, var, value) in &self.assigns {
            let block = blocks[usize::from(block % num_blocks)];
            let dst = vars[usize::from(var % NUM_VARS)];
            let src = vars[usize::from(var.wrapping_add(1) % NUM_VARS)];
            let src = Expr::Binary(
                BinaryOp::Add,
                Operand::Var(src),
                Operand::Const(Const::I64(i64::from(value))),
            );
            body.push_element(block, Element::Statement(Stmt::Assign { dst, src }));
        }

        log::debug!("body:\n{}", body.display("| "));
        body
    }
}

fn check<A: DataflowAnalysis>(body: &FunctionBody, cfg: &CFGInfo, analysis: A) {
    let adapter = AnalysisAdapter::new(analysis);
    let env = Environment::new(body);
    let run = |order| {
        run_dataflow_analysis(body, &adapter, &env, &DataflowConfig { order }, None)
            .expect("generated bodies are well-formed")
    };
    let rpo = run(WorklistOrder::ReversePostorder);
    let fifo = run(WorklistOrder::Fifo);

    for block in body.blocks.iter() {
        assert_eq!(rpo[block].is_visited(), cfg.is_reachable(block));
        assert_eq!(fifo[block].is_visited(), cfg.is_reachable(block));
        assert_eq!(
            rpo.exit(block).map(|state| &state.lattice),
            fifo.exit(block).map(|state| &state.lattice)
        );
    }
}

fuzz_target!(|cfg: CFG| {
    let _ = env_logger::try_init();

    let body = cfg.to_body();
    let cfginfo = CFGInfo::new(&body).expect("add_edge keeps edges consistent");
    check(&body, &cfginfo, DefiniteAssignment);
    check(&body, &cfginfo, ConstantPropagation);
});
