use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use sylva_blueprints::{input_schemas, Encoding, ExplorationInput, ExplorationInputPaths};
use sylva_orchestration::engine_for;

#[derive(Parser, Debug)]
#[command(
    author = "The Sylva developers",
    about = "Maps synchronous dataflow graphs onto a coarse grained reconfigurable fabric."
)]
struct Args {
    #[arg(
        short = 'g',
        long,
        required_unless_present = "print_schema",
        help = "The dataflow graph, as JSON."
    )]
    graph: Option<PathBuf>,
    #[arg(
        short = 'i',
        long,
        required_unless_present = "print_schema",
        help = "The implementation catalog, as JSON."
    )]
    catalog: Option<PathBuf>,
    #[arg(
        short = 'f',
        long,
        required_unless_present = "print_schema",
        help = "The fabric resource model, as JSON."
    )]
    fabric: Option<PathBuf>,
    #[arg(
        short = 's',
        long = "specification",
        required_unless_present = "print_schema",
        help = "The design constraints and objectives, as JSON."
    )]
    specification: Option<PathBuf>,
    #[arg(
        short = 'c',
        long = "options",
        help = "Solver options, as JSON. Defaults are used when absent."
    )]
    options: Option<PathBuf>,
    #[arg(
        short = 'o',
        long,
        help = "The directory where the selected system models and the report are written."
    )]
    output: Option<PathBuf>,
    #[arg(
        short = 'e',
        long,
        value_enum,
        default_value = "json",
        help = "The encoding of the written system models."
    )]
    encoding: Encoding,
    #[arg(long, help = "Writes the metrics of the Pareto front as CSV to this path.")]
    csv: Option<PathBuf>,
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "More output: info, debug and trace for one, two and three flags. RUST_LOG takes precedence."
    )]
    verbosity: u8,
    #[arg(
        long = "schemas",
        help = "Prints the JSON schemas of every input document.",
        default_value = "false"
    )]
    print_schema: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = match args.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    if args.print_schema {
        for (name, schema) in input_schemas() {
            println!("// {}", name);
            println!("{}", schema);
        }
        return Ok(());
    }
    let paths = ExplorationInputPaths {
        graph: args.graph.context("the dataflow graph is required")?,
        catalog: args.catalog.context("the implementation catalog is required")?,
        fabric: args.fabric.context("the fabric resource model is required")?,
        specification: args
            .specification
            .context("the design specification is required")?,
        options: args.options,
    };
    let input = ExplorationInput::load(&paths, 3).context("failed to load the inputs")?;
    let engine = engine_for(input).context("the exploration cannot start")?;
    let report = engine.run();
    print!("{}", report);
    if report.feasible == 0 {
        warn!("No feasible design found, check the constraint tally above");
    }
    let message = report.to_message();
    if let Some(out) = &args.output {
        fs::create_dir_all(out)
            .with_context(|| format!("failed to create {}", out.display()))?;
        let ext = args.encoding.extension();
        for (i, m) in message.pareto_front.iter().enumerate() {
            let path = out.join(format!("system_model_{}.{}", i, ext));
            fs::write(&path, m.encode(args.encoding)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        let path = out.join(format!("report.{}", ext));
        fs::write(&path, message.encode(args.encoding)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(
            "Wrote {} system model(s) and the report to {}",
            message.pareto_front.len(),
            out.display()
        );
    }
    if let Some(csv) = &args.csv {
        let mut file = fs::File::create(csv)
            .with_context(|| format!("failed to create {}", csv.display()))?;
        message
            .write_csv(&mut file)
            .with_context(|| format!("failed to write {}", csv.display()))?;
    }
    Ok(())
}
