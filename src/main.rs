use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use log::{error, info};
use std::path::Path;

use photonsim::cli::{CliArgs, SweepOverride};
use photonsim::simulator::{export_results, SweepSimulator};
use photonsim::{
    CircuitDescription, EnsembleStatistics, MonteCarloConfig, MonteCarloSweepSimulator, SParameterMethod,
    SimulationResult,
};

fn main() {
    let matches = create_cli().get_matches();

    let level = match matches.get_count("verbose") {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run_application(&matches) {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn create_cli() -> Command {
    Command::new("photonsim")
        .version(photonsim::VERSION)
        .about("Frequency-domain S-parameter simulator for photonic integrated circuits")
        .arg(
            Arg::new("input")
                .help("Circuit description file (.json)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file for simulation results"),
        )
        .arg(
            Arg::new("sweep")
                .long("sweep")
                .value_names(["START", "STOP", "POINTS"])
                .num_args(3)
                .help("Sweep bounds (wavelengths below 1 m, otherwise frequencies) and point count"),
        )
        .arg(
            Arg::new("runs")
                .long("runs")
                .value_name("N")
                .help("Number of Monte Carlo trials; more than one enables variation"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .help("Seed for Monte Carlo parameter draws"),
        )
        .arg(
            Arg::new("parallel-trials")
                .long("parallel-trials")
                .action(ArgAction::SetTrue)
                .help("Evaluate Monte Carlo trials concurrently"),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .action(ArgAction::SetTrue)
                .help("Report log10 of the power ratio"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("csv")
                .value_parser(["csv", "json"])
                .help("Output format"),
        )
}

fn run_application(matches: &ArgMatches) -> anyhow::Result<()> {
    let args = CliArgs::from_matches(matches)?;

    info!("{}", "Starting photonsim".green().bold());
    info!("Input file: {}", args.input_file.bright_blue());

    if !Path::new(&args.input_file).exists() {
        return Err(anyhow::anyhow!("Input file '{}' not found", args.input_file));
    }

    let description = CircuitDescription::from_file(&args.input_file)?;
    let (mut circuit, simulator) = description.build()?;
    circuit.print_summary();

    let bounds = args.sweep.or_else(|| {
        description.sweep.map(|spec| SweepOverride {
            start: spec.start,
            stop: spec.stop,
            num: spec.num,
        })
    });
    let mut sweep = match bounds {
        Some(SweepOverride { start, stop, num }) => SweepSimulator::new(start, stop, num)?,
        None => SweepSimulator::default(),
    };
    if let Some(input) = simulator.input() {
        sweep.connect_input(input);
    }
    if let Some(output) = simulator.output() {
        sweep.connect_output(output);
    }

    let mut config = description.monte_carlo.clone().unwrap_or_default();
    if let Some(runs) = args.runs {
        config.runs = runs;
    } else if description.monte_carlo.is_none() {
        config.runs = 1;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.parallel_trials |= args.parallel_trials;

    let results = if config.runs > 1 {
        info!("Running Monte Carlo sweep: {} trials over {} points", config.runs, sweep.grid().len());
        run_monte_carlo(sweep, config, &mut circuit, args.db)?
    } else {
        info!("Running sweep over {} points", sweep.grid().len());
        vec![sweep.simulate(&circuit, args.db, SParameterMethod::Nominal)?]
    };

    if let Some(output_file) = args.output_file {
        export_results(&results, Path::new(&output_file), args.output_format)?;
        info!("Results exported to: {}", output_file.bright_green());
    } else {
        print_summary(&results)?;
    }

    info!("{}", "Simulation completed successfully!".green().bold());
    Ok(())
}

fn run_monte_carlo(
    sweep: SweepSimulator,
    config: MonteCarloConfig,
    circuit: &mut photonsim::Circuit,
    db: bool,
) -> anyhow::Result<Vec<SimulationResult>> {
    let simulator = MonteCarloSweepSimulator::from_sweep(sweep, config);
    Ok(simulator.simulate(circuit, db)?)
}

fn print_summary(results: &[SimulationResult]) -> anyhow::Result<()> {
    println!("\n{}", "=== Sweep Results ===".cyan().bold());

    if let [result] = results {
        let (min_index, min) = extreme(&result.ratios, |a, b| a < b);
        let (max_index, max) = extreme(&result.ratios, |a, b| a > b);
        println!("Points: {}", result.points.len());
        println!("Minimum: {:.6e} at {} = {:.6e}", min, result.domain.column(), result.points[min_index]);
        println!("Maximum: {:.6e} at {} = {:.6e}", max, result.domain.column(), result.points[max_index]);
        return Ok(());
    }

    let stats = EnsembleStatistics::from_trials(results)?;
    let spread = stats
        .max
        .iter()
        .zip(&stats.min)
        .map(|(hi, lo)| hi - lo)
        .fold(0.0, f64::max);
    let (min_index, min) = extreme(&stats.mean, |a, b| a < b);
    println!("Trials: {}", results.len());
    println!("Points: {}", stats.points.len());
    println!("Mean minimum: {:.6e} at {} = {:.6e}", min, stats.domain.column(), stats.points[min_index]);
    println!("Largest trial spread: {:.6e}", spread);
    Ok(())
}

/// Index and value of the extreme element under `better`
fn extreme(values: &[f64], better: impl Fn(f64, f64) -> bool) -> (usize, f64) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, values.first().copied().unwrap_or(f64::NAN)), |best, (index, value)| {
            if better(value, best.1) {
                (index, value)
            } else {
                best
            }
        })
}
