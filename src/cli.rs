use clap::ArgMatches;
use anyhow::{anyhow, Result};

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub input_file: String,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
    pub sweep: Option<SweepOverride>,
    pub runs: Option<usize>,
    pub seed: Option<u64>,
    pub parallel_trials: bool,
    pub db: bool,
    pub verbose_level: u8,
}

/// Sweep bounds given on the command line, replacing the description's
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepOverride {
    pub start: f64,
    pub stop: f64,
    pub num: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .ok_or_else(|| anyhow!("Input file is required"))?
            .clone();

        let output_file = matches.get_one::<String>("output").cloned();

        let verbose_level = matches.get_count("verbose");

        let output_format = match matches.get_one::<String>("format").map(String::as_str) {
            Some("csv") | None => OutputFormat::Csv,
            Some("json") => OutputFormat::Json,
            Some(other) => return Err(anyhow!("Invalid output format '{}'", other)),
        };

        let sweep = if let Some(sweep_values) = matches.get_many::<String>("sweep") {
            let values: Vec<&String> = sweep_values.collect();
            if values.len() != 3 {
                return Err(anyhow!("Sweep requires exactly 3 parameters: start, stop and points"));
            }

            let start = parse_optical_value(values[0])?;
            let stop = parse_optical_value(values[1])?;
            let num = values[2]
                .parse::<usize>()
                .map_err(|_| anyhow!("Invalid point count '{}'", values[2]))?;

            if num == 0 {
                return Err(anyhow!("Sweep needs at least one point"));
            }

            Some(SweepOverride { start, stop, num })
        } else {
            None
        };

        let runs = matches
            .get_one::<String>("runs")
            .map(|value| value.parse::<usize>().map_err(|_| anyhow!("Invalid run count '{}'", value)))
            .transpose()?;

        let seed = matches
            .get_one::<String>("seed")
            .map(|value| value.parse::<u64>().map_err(|_| anyhow!("Invalid seed '{}'", value)))
            .transpose()?;

        Ok(CliArgs {
            input_file,
            output_file,
            output_format,
            sweep,
            runs,
            seed,
            parallel_trials: matches.get_flag("parallel-trials"),
            db: matches.get_flag("db"),
            verbose_level,
        })
    }
}

/// Parse a wavelength or frequency with unit (e.g., "1.55um", "1550nm", "193.4THz")
fn parse_optical_value(value: &str) -> Result<f64> {
    let value = value.trim().to_lowercase();

    if let Some(num_str) = value.strip_suffix("thz") {
        Ok(num_str.parse::<f64>()? * 1e12)
    } else if let Some(num_str) = value.strip_suffix("ghz") {
        Ok(num_str.parse::<f64>()? * 1e9)
    } else if let Some(num_str) = value.strip_suffix("hz") {
        Ok(num_str.parse::<f64>()?)
    } else if let Some(num_str) = value.strip_suffix("nm") {
        Ok(num_str.parse::<f64>()? * 1e-9)
    } else if let Some(num_str) = value.strip_suffix("um") {
        Ok(num_str.parse::<f64>()? * 1e-6)
    } else if let Some(num_str) = value.strip_suffix('m') {
        Ok(num_str.parse::<f64>()?)
    } else {
        // Bare numbers are taken in SI units
        Ok(value.parse::<f64>()?)
    }
}
