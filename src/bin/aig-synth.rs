use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use aig_synth::circuit::Circuit;
use aig_synth::config::{SolverConfig, TransitionMode};
use aig_synth::solver::{SafetySolver, Verdict};
use aig_synth::strategy::Strategy;
use clap::Parser;
use color_eyre::Result;

const EXIT_REALIZABLE: i32 = 10;
const EXIT_UNREALIZABLE: i32 = 20;

#[derive(Parser)]
#[command(author, version, about = "BDD-based safety game solver and controller synthesizer")]
struct Cli {
    /// Safety game in ASCII AIGER format ('-' for stdin)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Write the controller circuit to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Only decide realizability, do not synthesize a controller
    #[arg(short, long)]
    realizability: bool,

    /// Use a monolithic transition relation instead of function substitution
    #[arg(short, long)]
    monolithic: bool,

    /// Maximum number of diagram nodes
    #[arg(long, value_name = "INT")]
    node_limit: Option<usize>,

    /// Maximum number of fixpoint iterations
    #[arg(long, value_name = "INT")]
    max_iterations: Option<usize>,

    /// Compute the whole losing region even if an initial state is losing early
    #[arg(long)]
    no_early_termination: bool,

    /// Verbose logging (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => simplelog::LevelFilter::Error,
        (false, 0) => simplelog::LevelFilter::Warn,
        (false, 1) => simplelog::LevelFilter::Info,
        (false, 2) => simplelog::LevelFilter::Debug,
        (false, _) => simplelog::LevelFilter::Trace,
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = Instant::now();

    let circuit = if cli.input.as_os_str() == "-" {
        Circuit::read(std::io::stdin().lock())?
    } else {
        Circuit::from_file(&cli.input)?
    };
    log::info!("Loaded {:?}", cli.input);

    let mut config = SolverConfig::default()
        .with_early_termination(!cli.no_early_termination)
        .with_transition(if cli.monolithic {
            TransitionMode::Relational
        } else {
            TransitionMode::Functional
        });
    if let Some(limit) = cli.node_limit {
        config = config.with_node_limit(limit);
    }
    if let Some(limit) = cli.max_iterations {
        config = config.with_max_iterations(limit);
    }

    let solver = SafetySolver::new(&circuit, config)?;
    let (verdict, stats) = solver.solve()?;
    log::info!(
        "{} iterations, peak {} nodes, {} nodes at the end",
        stats.iterations,
        stats.peak_nodes,
        stats.final_nodes
    );

    let winning = match verdict {
        Verdict::Unrealizable { .. } => {
            println!("UNREALIZABLE");
            log::info!("Done in {:.3} s", time_total.elapsed().as_secs_f64());
            std::process::exit(EXIT_UNREALIZABLE);
        }
        Verdict::Realizable { winning } => winning,
    };
    println!("REALIZABLE");

    if !cli.realizability {
        let strategy = Strategy::extract(&solver, winning)?;
        let mut controller = strategy.to_circuit(&solver, &circuit)?;
        controller
            .comments
            .push(format!("controller synthesized by aig-synth {}", env!("CARGO_PKG_VERSION")));

        match &cli.output {
            Some(path) => {
                let mut file = File::create(path)?;
                controller.write_aag(&mut file)?;
                log::info!("Controller written to {:?}", path);
            }
            None => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                controller.write_aag(&mut out)?;
                out.flush()?;
            }
        }
    }

    log::info!("Done in {:.3} s", time_total.elapsed().as_secs_f64());
    std::process::exit(EXIT_REALIZABLE);
}
