//! flowsense command-line tool.

use anyhow::{anyhow, Context, Result};
use flowsense::env::Environment;
use flowsense::ir::{parse_function, Element, ElementDisplay, FunctionBody, Var};
use flowsense::pass::{
    run_dataflow_analysis, AnalysisAdapter, DataflowAnalysis, DataflowConfig, Flat,
    IntersectionSet, WorklistOrder,
};
use flowsense::passes::{constants::Constants, ConstantPropagation, DefiniteAssignment};
use log::debug;
use rayon::prelude::*;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "flowsense-util", about = "flowsense utility.")]
struct Options {
    #[structopt(short, long)]
    debug: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    #[structopt(name = "print", about = "Parse a function body and print it back")]
    Print {
        #[structopt(help = "Function body in text form")]
        file: PathBuf,
    },
    #[structopt(name = "analyze", about = "Run an analysis and print per-block results")]
    Analyze {
        #[structopt(
            short,
            long,
            default_value = "definite-assignment",
            help = "Analysis to run: definite-assignment or constants"
        )]
        analysis: AnalysisKind,
        #[structopt(long, default_value = "rpo", help = "Worklist order: rpo or fifo")]
        order: Order,
        #[structopt(long, help = "Also print the state after every element")]
        trace: bool,
        #[structopt(help = "Function bodies in text form")]
        files: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug)]
enum AnalysisKind {
    DefiniteAssignment,
    Constants,
}

impl FromStr for AnalysisKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "definite-assignment" => Ok(AnalysisKind::DefiniteAssignment),
            "constants" => Ok(AnalysisKind::Constants),
            _ => Err(anyhow!("unknown analysis `{}`", s)),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Order(WorklistOrder);

impl FromStr for Order {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rpo" => Ok(Order(WorklistOrder::ReversePostorder)),
            "fifo" => Ok(Order(WorklistOrder::Fifo)),
            _ => Err(anyhow!("unknown worklist order `{}`", s)),
        }
    }
}

fn main() -> Result<()> {
    let opts = Options::from_args();

    let mut logger = env_logger::Builder::from_default_env();
    if opts.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    let _ = logger.try_init();

    match opts.command {
        Command::Print { file } => {
            let body = load(&file)?;
            print!("{}", body.display(""));
        }
        Command::Analyze {
            analysis,
            order,
            trace,
            files,
        } => {
            let config = DataflowConfig { order: order.0 };
            let reports = files
                .par_iter()
                .map(|file| {
                    let body = load(file)?;
                    let report = match analysis {
                        AnalysisKind::DefiniteAssignment => {
                            analyze(&body, DefiniteAssignment, &config, trace, show_assigned)
                        }
                        AnalysisKind::Constants => {
                            analyze(&body, ConstantPropagation, &config, trace, show_constants)
                        }
                    };
                    report.with_context(|| format!("analyzing {}", file.display()))
                })
                .collect::<Result<Vec<_>>>()?;
            for report in reports {
                print!("{}", report);
            }
        }
    }

    Ok(())
}

fn load(file: &Path) -> Result<FunctionBody> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    debug!("Loaded {} bytes from {}", text.len(), file.display());
    parse_function(&text).with_context(|| format!("parsing {}", file.display()))
}

fn analyze<A: DataflowAnalysis>(
    body: &FunctionBody,
    analysis: A,
    config: &DataflowConfig,
    trace: bool,
    show: fn(&FunctionBody, &A::Lattice) -> String,
) -> Result<String> {
    let adapter = AnalysisAdapter::new(analysis);
    let env = Environment::new(body);

    let mut out = String::new();
    writeln!(out, "function {}:", body.name)?;
    let mut observer = |element: &Element, lattice: &A::Lattice, env: &Environment| -> Result<()> {
        writeln!(
            out,
            "  {:<24} ; {} {}",
            ElementDisplay(element, body).to_string(),
            show(body, lattice),
            env.display(body)
        )?;
        Ok(())
    };
    let observer = if trace {
        Some(&mut observer as &mut dyn FnMut(&Element, &A::Lattice, &Environment) -> Result<()>)
    } else {
        None
    };
    let states = run_dataflow_analysis(body, &adapter, &env, config, observer)?;

    for (block, state) in states.entries() {
        let label = body.block_label(block);
        match state.as_visited() {
            Some(state) => writeln!(
                out,
                "{}: {} {}",
                label,
                show(body, &state.lattice),
                state.env.display(body)
            )?,
            None => writeln!(out, "{}: unreachable", label)?,
        }
    }
    writeln!(out, "({} block visits)", states.visits())?;
    Ok(out)
}

fn show_assigned(body: &FunctionBody, assigned: &IntersectionSet<Var>) -> String {
    let names = assigned
        .iter()
        .map(|&var| body.var_name(var))
        .collect::<Vec<_>>();
    format!("assigned [{}]", names.join(", "))
}

fn show_constants(body: &FunctionBody, constants: &Constants) -> String {
    let entries = constants
        .iter()
        .map(|(&var, value)| {
            let value = match value {
                Flat::Bottom => "bottom".to_owned(),
                Flat::Value(value) => value.to_string(),
                Flat::Top => "top".to_owned(),
            };
            format!("{} = {}", body.var_name(var), value)
        })
        .collect::<Vec<_>>();
    format!("constants [{}]", entries.join(", "))
}
