use clap::{Parser, Subcommand};
use costsheet::api::{run_api_server, server::ApiConfig};
use costsheet::cli;
use costsheet::config::AppConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "costsheet")]
#[command(about = "Part cost estimation: material/processing cost and Excel cost sheet export")]
#[command(long_about = "costsheet - Part cost estimation worksheet

Computes material and processing costs for a part, keeps named snapshots,
and fills the company cost sheet template (.xlsx).

COMMANDS:
  calc    - Compute and print material/processing costs
  new     - Create a blank estimate file
  save    - Save an estimate as a named snapshot
  list    - List saved snapshots (newest first)
  show    - Print one saved snapshot
  load    - Write a saved snapshot back to an estimate file
  export  - Fill the cost sheet template
  serve   - Start the HTTP API

EXAMPLES:
  costsheet new estimate.yaml
  costsheet calc estimate.yaml -v
  costsheet save estimate.yaml --name \"1st quote\"
  costsheet export estimate.yaml --template template.xlsx

Config: --config costsheet.yaml (template_path, store_path, default_labor_rate,
access_key, host, port, layout)")]
#[command(version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "COSTSHEET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Compute material and processing costs.

MATERIAL COST:
  amount        = unit price × NET × U/S
  LOSS          = amount × LOSS rate / 100
  material cost = amount + LOSS + waste cost + die-cast allowance

PROCESSING COST:
  rate          = basis rate if > 0, else the applied labor rate
  cost          = CT(s) / 3600 × rate × headcount × U/S
  setup         = setup(min) / 60 × rate × headcount × U/S
  total         = cost × (1 + allowance / 100) + setup")]
    /// Compute and print material/processing costs
    Calc {
        /// Estimate file (YAML)
        file: PathBuf,

        /// Show each line's intermediate amounts
        #[arg(short, long)]
        verbose: bool,
    },

    /// Create a blank estimate file
    New {
        /// Estimate file to create
        file: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Save an estimate as a named snapshot
    Save {
        /// Estimate file (YAML)
        file: PathBuf,

        /// Snapshot name (default: "<part number> - <part name>")
        #[arg(short, long)]
        name: Option<String>,

        /// Snapshot store (default from config)
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// List saved snapshots, newest first
    List {
        /// Snapshot store (default from config)
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Print one saved snapshot
    Show {
        /// Snapshot ID
        id: String,

        /// Snapshot store (default from config)
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Write a saved snapshot back to an estimate file
    Load {
        /// Snapshot ID
        id: String,

        /// Estimate file to write
        file: PathBuf,

        /// Snapshot store (default from config)
        #[arg(long)]
        store: Option<PathBuf>,
    },

    #[command(long_about = "Fill the cost sheet template with an estimate.

The template's columns are discovered from header text, so a reshuffled
template still fills correctly as long as the headers are present.

WHAT IS WRITTEN:
  Basic information next to 품번/품명/차종/업체/적용임율 labels
  Material lines into rows 9-24 (extra lines are dropped)
  Process lines into their labeled row, else the first free row of 27-45
  The processing cost total next to the '(4) 가공비' label

Cells inside merged regions are skipped and reported.

EXAMPLE:
  costsheet export estimate.yaml --template template.xlsx -o quote.xlsx")]
    /// Fill the cost sheet template
    Export {
        /// Estimate file (YAML)
        file: PathBuf,

        /// Template workbook (default from config)
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// Output file (default: 원가계산서_<part number>_<part name>.xlsx)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// List every skipped cell
        #[arg(short, long)]
        verbose: bool,
    },

    /// Start the HTTP API server
    Serve {
        /// Host address to bind to
        #[arg(short = 'H', long, env = "COSTSHEET_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "COSTSHEET_PORT")]
        port: Option<u16>,

        /// API access key
        #[arg(long, env = "COSTSHEET_ACCESS_KEY", hide_env_values = true)]
        access_key: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::init_logging("costsheet=info,tower_http=info");
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Calc { file, verbose } => cli::calc(file, verbose)?,

        Commands::New { file, force } => cli::new_estimate(file, config.default_labor_rate, force)?,

        Commands::Save { file, name, store } => {
            cli::save(file, name, store.unwrap_or(config.store_path))?
        }

        Commands::List { store } => {
            cli::list(store.unwrap_or(config.store_path))?
        }

        Commands::Show { id, store } => {
            cli::show(id, store.unwrap_or(config.store_path))?
        }

        Commands::Load { id, file, store } => {
            cli::load(id, file, store.unwrap_or(config.store_path))?
        }

        Commands::Export {
            file,
            template,
            output,
            verbose,
        } => {
            cli::export(
                file,
                template.unwrap_or(config.template_path),
                output,
                config.layout,
                verbose,
            )?
        }

        Commands::Serve {
            host,
            port,
            access_key,
        } => {
            let mut config = config;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(key) = access_key {
                config.access_key = key;
            }

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_api_server(ApiConfig::from(config)))?
        }
    }

    Ok(())
}
