use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use ncbi_assembly_fetch::app::App;
use ncbi_assembly_fetch::assembly::DownloadOptions;
use ncbi_assembly_fetch::config::{AssemblyRequest, ConfigLoader, SequenceRequest};
use ncbi_assembly_fetch::domain::{AssemblyAccession, ContigAccession};
use ncbi_assembly_fetch::error::AssemblyError;
use ncbi_assembly_fetch::ncbi::{AssemblyDirectory, NcbiClient, NcbiHttpClient, NcbiSettings};
use ncbi_assembly_fetch::output::{self, JsonOutput, LogSink, OutputMode};
use ncbi_assembly_fetch::store::Store;

#[derive(Parser)]
#[command(name = "assembly-fetch")]
#[command(about = "Download NCBI genome assemblies and contigs into a local FASTA cache")]
#[command(version, author)]
struct Cli {
    /// Root of the genome cache (default: ~/.cache/ncbi-assembly-fetch/genomes)
    #[arg(long, global = true)]
    genome_root: Option<Utf8PathBuf>,

    /// Print results as JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    /// Retries for transient NCBI failures
    #[arg(long, global = true)]
    retries: Option<usize>,

    /// Connect timeout for NCBI requests, in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Give up on a single download after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    download_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download or incrementally construct an assembly FASTA")]
    Assembly(AssemblyArgs),
    #[command(about = "Download a single contig FASTA")]
    Sequence(SequenceArgs),
    #[command(about = "Fetch every assembly and sequence listed in a config file")]
    Fetch(FetchArgs),
    #[command(about = "Show the rows of an assembly report")]
    Report(ReportArgs),
    #[command(about = "List the contig accessions written to a FASTA file")]
    Contigs(ContigsArgs),
    #[command(about = "List cached assemblies")]
    List,
}

#[derive(Args)]
struct AssemblyArgs {
    accession: String,

    #[arg(long)]
    species: String,

    #[arg(long)]
    genbank_only: bool,

    #[arg(long)]
    overwrite: bool,
}

#[derive(Args)]
struct SequenceArgs {
    accession: String,

    #[arg(long)]
    species: String,

    #[arg(long)]
    genbank_only: bool,
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long)]
    config: Option<String>,
}

#[derive(Args)]
struct ReportArgs {
    accession: String,

    #[arg(long)]
    species: String,
}

#[derive(Args)]
struct ContigsArgs {
    fasta: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<AssemblyError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &AssemblyError) -> u8 {
    match error {
        AssemblyError::InvalidAccession(_)
        | AssemblyError::InvalidAssemblyAccession(_)
        | AssemblyError::MissingConfig
        | AssemblyError::ConfigRead(_)
        | AssemblyError::ConfigParse(_) => 2,
        AssemblyError::NcbiHttp(_)
        | AssemblyError::NcbiStatus { .. }
        | AssemblyError::MissingAsset(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Table
    };

    let mut settings = NcbiSettings::default();
    if let Some(retries) = cli.retries {
        settings.retry.max_retries = retries;
    }
    if let Some(secs) = cli.timeout {
        settings.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = cli.download_timeout {
        settings.download_timeout = Some(Duration::from_secs(secs));
    }

    match cli.command {
        Commands::Assembly(args) => {
            let request = AssemblyRequest {
                accession: args.accession.parse::<AssemblyAccession>()?,
                species: args.species,
                genbank_only: args.genbank_only,
            };
            let options = DownloadOptions {
                genbank_only: args.genbank_only,
                overwrite: args.overwrite,
            };
            let app = App::new(resolve_store(cli.genome_root)?, NcbiHttpClient::new(settings)?);
            let item = app.fetch_assembly(&request, options, &LogSink)?;
            print_fetch(vec![item], output_mode)
        }
        Commands::Sequence(args) => {
            let request = SequenceRequest {
                accession: ContigAccession::parse(&args.accession, args.genbank_only)?,
                species: args.species,
            };
            let app = App::new(resolve_store(cli.genome_root)?, NcbiHttpClient::new(settings)?);
            let item = app.fetch_sequence(&request, &LogSink)?;
            print_fetch(vec![item], output_mode)
        }
        Commands::Fetch(args) => {
            let mut resolved = ConfigLoader::resolve(args.config.as_deref())?;
            if let Some(retries) = cli.retries {
                resolved.ncbi.retry.max_retries = retries;
            }
            if let Some(secs) = cli.timeout {
                resolved.ncbi.timeout = Duration::from_secs(secs);
            }
            if cli.download_timeout.is_some() {
                resolved.ncbi.download_timeout = settings.download_timeout;
            }
            let root = cli.genome_root.or_else(|| resolved.genome_root.clone());
            let app = App::new(
                resolve_store(root)?,
                NcbiHttpClient::new(resolved.ncbi.clone())?,
            );
            let result = app.fetch(&resolved, &LogSink)?;
            print_fetch(result.items, output_mode)
        }
        Commands::Report(args) => {
            let request = AssemblyRequest {
                accession: args.accession.parse::<AssemblyAccession>()?,
                species: args.species,
                genbank_only: false,
            };
            let app = App::new(resolve_store(cli.genome_root)?, NcbiHttpClient::new(settings)?);
            let result = app.report(&request)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_report(&result).into_diagnostic(),
                OutputMode::Table => {
                    output::print_report_table(&result);
                    Ok(())
                }
            }
        }
        Commands::Contigs(args) => {
            let result = App::<NopNcbi>::contigs(&args.fasta)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_contigs(&result).into_diagnostic(),
                OutputMode::Table => {
                    for contig in &result.contigs {
                        println!("{contig}");
                    }
                    Ok(())
                }
            }
        }
        Commands::List => {
            let app = App::new(resolve_store(cli.genome_root)?, NopNcbi);
            let result = app.list(&LogSink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_list(&result).into_diagnostic(),
                OutputMode::Table => {
                    output::print_list_table(&result);
                    Ok(())
                }
            }
        }
    }
}

fn resolve_store(genome_root: Option<Utf8PathBuf>) -> Result<Store, AssemblyError> {
    match genome_root {
        Some(root) => Ok(Store::new_with_root(root)),
        None => Store::new(),
    }
}

fn print_fetch(
    items: Vec<ncbi_assembly_fetch::app::FetchItemResult>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let result = ncbi_assembly_fetch::app::FetchResult { items };
    match output_mode {
        OutputMode::Json => JsonOutput::print_fetch(&result).into_diagnostic(),
        OutputMode::Table => {
            output::print_fetch_table(&result);
            Ok(())
        }
    }
}

/// Client for commands that never reach NCBI.
struct NopNcbi;

impl NcbiClient for NopNcbi {
    fn list_assembly_directory(
        &self,
        accession: &AssemblyAccession,
    ) -> Result<AssemblyDirectory, AssemblyError> {
        Err(AssemblyError::NcbiHttp(format!(
            "offline command cannot list {accession}"
        )))
    }

    fn download_to(&self, url: &str, _destination: &Path) -> Result<(), AssemblyError> {
        Err(AssemblyError::NcbiHttp(format!(
            "offline command cannot download {url}"
        )))
    }

    fn download_contig_fasta(
        &self,
        accession: &ContigAccession,
        _destination: &Path,
    ) -> Result<(), AssemblyError> {
        Err(AssemblyError::NcbiHttp(format!(
            "offline command cannot fetch {accession}"
        )))
    }
}
