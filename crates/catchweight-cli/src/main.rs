mod commands;
mod output;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "catchweight",
    version,
    about = "Estimate fish weights from length measurements with weight-length and round-weight conversions"
)]
struct Cli {
    /// Debug logging (unless RUST_LOG is set)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate weights for one or more length measurements (JSON)
    Estimate {
        /// JSON file holding one estimate input or an array of them
        input_file: PathBuf,

        /// Conversion table file(s)
        #[arg(short, long = "tables", value_name = "FILE")]
        tables: Vec<PathBuf>,

        /// Embedded table set(s) (default: sample, if no --tables given)
        #[arg(short, long = "preset", value_name = "NAME")]
        preset: Vec<String>,

        /// Engine settings file
        #[arg(short, long, value_name = "FILE")]
        settings: Option<PathBuf>,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,
    },
    /// Convert a length or weight between units
    Convert {
        #[command(subcommand)]
        kind: ConvertKind,
    },
    /// Inspect conversion tables
    Tables {
        #[command(subcommand)]
        action: TablesAction,
    },
    /// Recompute every individual weight of a catch batch tree (JSON)
    Reconcile {
        /// JSON file holding the catch batch, its pmfms and data context
        input_file: PathBuf,

        /// Conversion table file(s)
        #[arg(short, long = "tables", value_name = "FILE")]
        tables: Vec<PathBuf>,

        /// Embedded table set(s) (default: sample, if no --tables given)
        #[arg(short, long = "preset", value_name = "NAME")]
        preset: Vec<String>,

        /// Engine settings file
        #[arg(short, long, value_name = "FILE")]
        settings: Option<PathBuf>,

        /// Statistical rectangle, overriding the data context
        #[arg(long, value_name = "LABEL")]
        rectangle: Option<String>,

        /// Measurement date (YYYY-MM-DD), overriding the data context
        #[arg(long, value_name = "DATE")]
        date: Option<NaiveDate>,

        /// Pmfm splitting groups into qualitative-value children
        #[arg(long, value_name = "ID")]
        qv_pmfm_id: Option<i32>,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,
    },
}

#[derive(Subcommand)]
enum ConvertKind {
    /// Convert a length (km, m, dm, cm, mm)
    Length {
        value: Decimal,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// Measurement step of the result, in the target unit
        #[arg(long, default_value = "0")]
        precision: Decimal,
    },
    /// Convert a weight (t, kg, g, mg)
    Weight {
        value: Decimal,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
}

#[derive(Subcommand)]
enum TablesAction {
    /// List embedded table sets
    List,
    /// Validate a conversion table file
    Validate {
        /// Path to JSON table file
        file: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    // Target prefix: also covers catchweight_core.
    let default = if verbose {
        "catchweight=debug"
    } else {
        "catchweight=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Estimate {
            input_file,
            tables,
            preset,
            settings,
            output,
        } => commands::estimate::run(input_file, tables, preset, settings, &output, cli.verbose).await,
        Commands::Convert { kind } => match kind {
            ConvertKind::Length {
                value,
                from,
                to,
                precision,
            } => commands::convert::length(value, &from, &to, precision),
            ConvertKind::Weight { value, from, to } => commands::convert::weight(value, &from, &to),
        },
        Commands::Tables { action } => match action {
            TablesAction::List => commands::tables::list(),
            TablesAction::Validate { file } => commands::tables::validate(&file),
        },
        Commands::Reconcile {
            input_file,
            tables,
            preset,
            settings,
            rectangle,
            date,
            qv_pmfm_id,
            output,
        } => {
            let options = commands::reconcile::ReconcileOptions {
                rectangle,
                date,
                qv_pmfm_id,
            };
            commands::reconcile::run(input_file, tables, preset, settings, options, &output).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
