use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use ww_sample_manager::aggregate::AggregateReport;
use ww_sample_manager::app::{
    App, CompareRequest, EnrichRequest, LinkRequest, MappingInputs, ProgressSink,
};
use ww_sample_manager::config::ConfigLoader;
use ww_sample_manager::domain::IdMode;
use ww_sample_manager::error::SampleError;
use ww_sample_manager::merge::MergeOptions;
use ww_sample_manager::output::{JsonOutput, OutputMode, TextOutput};

#[derive(Parser)]
#[command(name = "wwsm")]
#[command(about = "Wastewater sequencing sample housekeeping")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON reports instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (defaults to ./wwsm.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Hard link sample outputs into <dest>/<group>/<label>/{out,data}")]
    Aggregate(LinkArgs),
    #[command(about = "Hard link sample files into <dest>/<YYYYMMDD>.<name>")]
    Stage(LinkArgs),
    #[command(about = "Print one summary row for a demix report")]
    Demix(DemixArgs),
    #[command(about = "Append coverage and demix summaries to the sample sheet")]
    Enrich(EnrichArgs),
    #[command(about = "Append columns of spreadsheet a to spreadsheet b by key")]
    Merge(MergeArgs),
    #[command(about = "Compare demix outputs of two tool versions")]
    Compare(CompareArgs),
}

#[derive(Args)]
struct TableArgs {
    /// Tab-separated sample metadata sheet.
    #[arg(short = 'm', long)]
    mapping_file: Option<Utf8PathBuf>,

    /// Tab-separated site label table (id_pattern, siteId, label columns).
    #[arg(long)]
    sites_file: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct LinkArgs {
    #[arg(short, long)]
    source: Utf8PathBuf,

    #[arg(short, long)]
    destination: Utf8PathBuf,

    #[command(flatten)]
    tables: TableArgs,

    #[arg(long, value_enum)]
    id_mode: Option<IdMode>,

    #[arg(long)]
    suffix: Option<String>,

    /// Prefix link names with the collection date.
    #[arg(long)]
    date_prefix: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct DemixArgs {
    out_file: Utf8PathBuf,

    #[arg(short = 'm', long)]
    mapping_file: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct EnrichArgs {
    #[arg(short = 'm', long)]
    mapping_file: Option<Utf8PathBuf>,

    /// Lines of `<file name>\t<coverage>`.
    #[arg(long)]
    coverage_file: Option<Utf8PathBuf>,

    /// Directory holding one demix report per sample.
    #[arg(long)]
    demix_dir: Option<Utf8PathBuf>,

    #[arg(long, value_enum)]
    id_mode: Option<IdMode>,
}

#[derive(Args)]
struct MergeArgs {
    #[arg(long)]
    spreadsheet_a: Utf8PathBuf,

    #[arg(long)]
    spreadsheet_b: Utf8PathBuf,

    #[arg(long, default_value_t = 1)]
    key_in_a: usize,

    /// Defaults to the key column of spreadsheet a.
    #[arg(long)]
    key_in_b: Option<usize>,

    #[arg(long = "add-column-from-a")]
    add_columns: Vec<usize>,

    #[arg(long)]
    has_header: bool,
}

#[derive(Args)]
struct CompareArgs {
    v1_dir: Utf8PathBuf,

    v2_dir: Utf8PathBuf,

    /// Jaccard similarity below this marks a sample discordant.
    #[arg(long)]
    threshold: Option<f64>,

    /// Write the comparison tables and reports here.
    #[arg(long)]
    analysis_dir: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SampleError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SampleError) -> u8 {
    match error {
        SampleError::MissingInput(_)
        | SampleError::NotADirectory(_)
        | SampleError::EmptyTable(_)
        | SampleError::InvalidSiteTable { .. }
        | SampleError::MissingArgument(_)
        | SampleError::ColumnOutOfRange { .. }
        | SampleError::InvalidColumn(_)
        | SampleError::ConfigRead(_)
        | SampleError::ConfigParse(_)
        | SampleError::InvalidThreshold(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = App::new(config);

    match cli.command {
        Commands::Aggregate(args) => run_link(&app, args, output_mode, false),
        Commands::Stage(args) => run_link(&app, args, output_mode, true),
        Commands::Demix(args) => {
            let row = app.demix_row(&args.out_file, args.mapping_file.as_deref())?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_json(&row).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_demix_row(&row)?,
            }
            Ok(())
        }
        Commands::Enrich(args) => {
            let request = EnrichRequest {
                mapping_file: args.mapping_file,
                coverage_file: args.coverage_file,
                demix_dir: args.demix_dir,
                id_mode: args.id_mode,
            };
            match output_mode {
                OutputMode::Json => {
                    let table = app.enrich(&request, &JsonOutput)?;
                    JsonOutput::print_json(&table).into_diagnostic()?;
                }
                OutputMode::Text => {
                    let table = app.enrich(&request, &TextOutput)?;
                    TextOutput::print_table(&table)?;
                }
            }
            Ok(())
        }
        Commands::Merge(args) => {
            let options = MergeOptions {
                key_a: args.key_in_a,
                key_b: args.key_in_b,
                columns: args.add_columns,
                has_header: args.has_header,
            };
            let table = app.merge(&args.spreadsheet_a, &args.spreadsheet_b, &options)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_json(&table).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_table(&table)?,
            }
            Ok(())
        }
        Commands::Compare(args) => {
            let request = CompareRequest {
                v1_dir: args.v1_dir,
                v2_dir: args.v2_dir,
                threshold: args.threshold,
                analysis_dir: args.analysis_dir,
            };
            match output_mode {
                OutputMode::Json => {
                    let result = app.compare(&request, &JsonOutput)?;
                    JsonOutput::print_json(&result).into_diagnostic()?;
                }
                OutputMode::Text => {
                    let result = app.compare(&request, &TextOutput)?;
                    TextOutput::print_comparison(&result);
                }
            }
            Ok(())
        }
    }
}

fn run_link(app: &App, args: LinkArgs, output_mode: OutputMode, by_date: bool) -> miette::Result<()> {
    let request = LinkRequest {
        source: args.source,
        destination: args.destination,
        tables: MappingInputs {
            mapping_file: args.tables.mapping_file,
            sites_file: args.tables.sites_file,
        },
        id_mode: args.id_mode,
        suffix: args.suffix,
        date_prefix: args.date_prefix,
        dry_run: args.dry_run,
    };
    match output_mode {
        OutputMode::Json => {
            let report = link(app, &request, by_date, &JsonOutput)?;
            JsonOutput::print_json(&report).into_diagnostic()?;
        }
        OutputMode::Text => {
            let report = link(app, &request, by_date, &TextOutput)?;
            TextOutput::print_links(&report);
        }
    }
    Ok(())
}

fn link(
    app: &App,
    request: &LinkRequest,
    by_date: bool,
    sink: &dyn ProgressSink,
) -> Result<AggregateReport, SampleError> {
    if by_date {
        app.stage(request, sink)
    } else {
        app.aggregate(request, sink)
    }
}
