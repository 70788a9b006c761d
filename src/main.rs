use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, LevelFilter};
use serde::Serialize;
use serde_json::json;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use filter_bridge::config::BridgeConfig;
use filter_bridge::error_codes::{coded_error_for, CodedError};
use filter_bridge::filter_data::{decode, encode, FilterIdentity};
use filter_bridge::region::{resolve_region, LayerExtent, NormalizedRegion};
use filter_bridge::session::FilterSession;
use filter_bridge::{CatalogLookup, FilterDefinition, Parameter};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("FILTER_BRIDGE_GIT_HASH"),
    ")"
);

#[derive(Debug, Parser)]
#[command(name = "filter-bridge")]
#[command(about = "Inspect, encode and resolve stored image filter data")]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    /// Machine-readable output; failures become a JSON envelope on stderr.
    #[arg(long, global = true)]
    json: bool,
    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Config file (defaults to $XDG_CONFIG_HOME/filter-bridge/config.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct IdentityArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    command: String,
    #[arg(long)]
    preview: String,
}

impl IdentityArgs {
    fn identity(&self) -> FilterIdentity {
        FilterIdentity::new(&self.name, &self.command, &self.preview)
    }
}

#[derive(Debug, Args)]
struct CatalogArgs {
    /// Catalog text file holding `#@gui` declarations.
    #[arg(long)]
    catalog: PathBuf,
    /// Two-letter language tag; overrides config and locale.
    #[arg(long)]
    language: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a filter data buffer.
    Encode {
        #[command(flatten)]
        identity: IdentityArgs,
        /// One parameter value, repeatable and kept in order.
        #[arg(long = "value", allow_hyphen_values = true)]
        values: Vec<String>,
        /// Destination file; raw bytes go to stdout when omitted.
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Print the identity and values stored in a filter data buffer.
    Decode {
        input: PathBuf,
        /// Number of bytes to read; defaults to the file size.
        #[arg(long)]
        length: Option<usize>,
    },
    /// Show the parameters a catalog declares for one filter.
    Lookup {
        #[command(flatten)]
        catalog: CatalogArgs,
        #[command(flatten)]
        identity: IdentityArgs,
    },
    /// List every filter header for the active language.
    List {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
    /// Load stored filter data against a catalog and print the command line.
    Resolve {
        #[command(flatten)]
        catalog: CatalogArgs,
        input: PathBuf,
        #[arg(long)]
        length: Option<usize>,
    },
    /// Convert a normalized region to pixels.
    Region {
        #[arg(long)]
        width: i32,
        #[arg(long)]
        height: i32,
        #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
        x: f64,
        #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
        y: f64,
        #[arg(long = "region-width", default_value_t = -1.0, allow_negative_numbers = true)]
        region_width: f64,
        #[arg(long = "region-height", default_value_t = -1.0, allow_negative_numbers = true)]
        region_height: f64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let json = cli.json;

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_failure(&error, json),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    if let Err(error) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("warning: logging disabled: {error}");
    }
}

fn report_failure(error: &anyhow::Error, json: bool) -> ExitCode {
    let coded = coded_error_for(error);
    if json {
        match serde_json::to_string_pretty(&coded.envelope()) {
            Ok(text) => eprintln!("{text}"),
            Err(_) => eprintln!("error: {error:#}"),
        }
    } else {
        eprintln!("error: {error:#}");
    }
    ExitCode::from(coded.exit_code())
}

fn run(cli: Cli) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Encode {
            identity,
            values,
            output,
        } => run_encode(&identity.identity(), &values, output.as_deref(), json),
        Commands::Decode { input, length } => run_decode(&input, length, json),
        Commands::Lookup { catalog, identity } => {
            let config = load_config(cli.config.as_deref(), &catalog)?;
            run_lookup(&catalog.catalog, &config, &identity.identity(), json)
        }
        Commands::List { catalog } => {
            let config = load_config(cli.config.as_deref(), &catalog)?;
            run_list(&catalog.catalog, &config, json)
        }
        Commands::Resolve {
            catalog,
            input,
            length,
        } => {
            let config = load_config(cli.config.as_deref(), &catalog)?;
            run_resolve(&catalog.catalog, &config, &input, length, json)
        }
        Commands::Region {
            width,
            height,
            x,
            y,
            region_width,
            region_height,
        } => run_region(
            LayerExtent::new(width, height),
            NormalizedRegion::new(x, y, region_width, region_height),
            json,
        ),
    }
}

fn load_config(path: Option<&Path>, catalog: &CatalogArgs) -> Result<BridgeConfig> {
    let mut config = BridgeConfig::load(path)?;
    if let Some(language) = &catalog.language {
        config.language = Some(language.clone());
    }
    debug!("config: {config:?}");
    Ok(config)
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|error| {
        anyhow!(CodedError::usage(
            "INPUT_UNREADABLE",
            format!("failed to read {}: {error}", path.display()),
        )
        .with_details(json!({ "path": path.display().to_string() })))
    })
}

fn read_catalog(path: &Path) -> Result<String> {
    let bytes = read_input(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize output")?
    );
    Ok(())
}

fn run_encode(
    identity: &FilterIdentity,
    values: &[String],
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let buffer = encode(identity, values)?;
    let Some(output) = output else {
        io::stdout()
            .write_all(buffer.as_bytes())
            .context("failed to write filter data to stdout")?;
        return Ok(());
    };

    fs::write(output, buffer.as_bytes())
        .with_context(|| format!("failed to write {}", output.display()))?;
    if json {
        print_json(&json!({
            "ok": true,
            "path": output.display().to_string(),
            "length": buffer.len(),
        }))
    } else {
        println!("Wrote {} bytes to {}", buffer.len(), output.display());
        Ok(())
    }
}

fn run_decode(input: &Path, length: Option<usize>, json: bool) -> Result<()> {
    let bytes = read_input(input)?;
    let length = length.unwrap_or(bytes.len());
    let decoded = decode(&bytes, length);
    if json {
        return print_json(&json!({
            "ok": true,
            "length": length.min(bytes.len()),
            "identity": decoded.identity,
            "values": decoded.values,
        }));
    }

    print_identity(&decoded.identity);
    println!("values: {}", decoded.values.len());
    for (index, value) in decoded.values.iter().enumerate() {
        println!("  [{index}] {value:?}");
    }
    Ok(())
}

fn run_lookup(
    catalog_path: &Path,
    config: &BridgeConfig,
    identity: &FilterIdentity,
    json: bool,
) -> Result<()> {
    let catalog = read_catalog(catalog_path)?;
    let lookup = CatalogLookup::new(&catalog, config.language.as_deref());
    let definition = lookup.find(identity)?;
    if json {
        return print_json(&json!({
            "ok": true,
            "language": lookup.language(),
            "definition": definition,
        }));
    }
    print_definition(&definition);
    Ok(())
}

fn run_list(catalog_path: &Path, config: &BridgeConfig, json: bool) -> Result<()> {
    let catalog = read_catalog(catalog_path)?;
    let lookup = CatalogLookup::new(&catalog, config.language.as_deref());
    let filters = lookup.filters();
    if json {
        return print_json(&json!({
            "ok": true,
            "language": lookup.language(),
            "filters": filters,
        }));
    }
    for entry in &filters {
        let marker = if entry.warning { "!" } else { " " };
        println!(
            "{marker} {}\t{}\t{}",
            entry.identity.name, entry.identity.command, entry.identity.preview_command
        );
    }
    Ok(())
}

fn run_resolve(
    catalog_path: &Path,
    config: &BridgeConfig,
    input: &Path,
    length: Option<usize>,
    json: bool,
) -> Result<()> {
    let catalog = read_catalog(catalog_path)?;
    let bytes = read_input(input)?;
    let length = length.unwrap_or(bytes.len());
    let session = FilterSession::from_config(&catalog, config);
    let definition = session
        .definition_from_filter_data(&bytes, length)
        .with_context(|| format!("failed to resolve {}", input.display()))?;
    let command_line = session.command_line_for(&definition);
    if json {
        return print_json(&json!({
            "ok": true,
            "definition": definition,
            "command_line": command_line,
        }));
    }
    print_definition(&definition);
    println!("command line: {command_line}");
    Ok(())
}

fn run_region(extent: LayerExtent, region: NormalizedRegion, json: bool) -> Result<()> {
    if !extent.is_known() {
        return Err(anyhow!(CodedError::usage(
            "INVALID_ARGUMENT",
            format!(
                "image size must not be negative, got {}x{}",
                extent.width, extent.height
            ),
        )
        .with_details(json!({ "width": extent.width, "height": extent.height }))));
    }
    let rect = resolve_region(region, extent);
    if json {
        return print_json(&json!({ "ok": true, "rect": rect }));
    }
    println!("{} {} {} {}", rect.x, rect.y, rect.width, rect.height);
    Ok(())
}

fn print_identity(identity: &FilterIdentity) {
    println!("name: {}", identity.name);
    println!("command: {}", identity.command);
    println!("preview command: {}", identity.preview_command);
}

fn print_definition(definition: &FilterDefinition) {
    print_identity(definition.identity());
    if definition.warning {
        println!("warning: filter is flagged in the catalog");
    }
    for parameter in &definition.parameters.parameters {
        print_parameter(parameter);
    }
}

fn print_parameter(parameter: &Parameter) {
    let keyword = parameter.parameter_type().keyword();
    match parameter.current_value() {
        Some(value) => println!("  {} ({keyword}) = {value}", parameter.name),
        None => println!("  {} ({keyword})", parameter.name),
    }
}
