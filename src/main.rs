use anyhow::{Context, Result};
use clap::Parser;
use pila::analysis::Analysis;
use pila::call_tree::load_calls;
use pila::cancellation::CancellationToken;
use pila::cli::{Cli, Command, InputArgs, OutputFormat};
use pila::config::{AnalysisConfig, AnalysisKind};
use pila::detection::{is_metadata_compatible, AnomalyRun, ResultTimeline};
use pila::report::{self, JsonReport};
use pila::store::{ArrayStore, EncodingMode, ModelContainer};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    } else if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Config file (if any) with command-line overrides applied
fn load_config(input: &InputArgs) -> Result<AnalysisConfig> {
    let mut config = match &input.config {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    input.apply_to(&mut config);
    Ok(config)
}

fn print_run(run: &AnomalyRun, timeline: &ResultTimeline, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", report::render_run(run)),
        OutputFormat::Json => {
            let json = JsonReport::new(run, timeline)
                .to_json()
                .context("Failed to serialize report")?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn encode(input: &InputArgs, encoding: Option<EncodingMode>) -> Result<()> {
    let mut config = load_config(input)?;
    if let Some(mode) = encoding {
        config.encoding = mode;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let calls = load_calls(&input.calls)?;
    let mut store = ArrayStore::new(&config.work_dir);
    store.dispose()?;
    let header = Analysis::generate_arrays(
        &calls,
        config.target_depth,
        config.encoding,
        &mut store,
        &CancellationToken::new(),
    )
    .context("Failed to generate call-stack arrays")?;

    println!(
        "Encoded {} root calls into {}",
        header.record_count,
        config.work_dir.display()
    );
    print!("{}", report::render_header(&header));
    Ok(())
}

fn detect(
    input: &InputArgs,
    n_value: Option<u32>,
    fresh: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut config = load_config(input)?;
    config.analysis = AnalysisKind::Statistical;
    if let Some(n) = n_value {
        config.n_value = n;
    }

    if fresh {
        ArrayStore::new(&config.work_dir).dispose()?;
    }

    let calls = load_calls(&input.calls)?;
    let mut timeline = ResultTimeline::new();
    let run = Analysis::run(
        &config,
        &calls,
        &mut timeline,
        None,
        &CancellationToken::new(),
    )
    .context("Statistical analysis failed")?;
    print_run(&run, &timeline, format)
}

fn check(input: &InputArgs, model_dir: &Path, format: OutputFormat) -> Result<()> {
    let mut config = load_config(input)?;
    config.analysis = AnalysisKind::Model;
    config.model_dir = Some(model_dir.to_path_buf());

    let calls = load_calls(&input.calls)?;
    let mut timeline = ResultTimeline::new();
    let run = Analysis::run(
        &config,
        &calls,
        &mut timeline,
        None,
        &CancellationToken::new(),
    )
    .context("Model compatibility check failed")?;

    if format == OutputFormat::Text {
        let trace = ArrayStore::new(&config.work_dir).load_header()?.metadata;
        let model = ModelContainer::read_metadata(model_dir)?;
        let compatible = is_metadata_compatible(
            trace.depth_size,
            trace.address_size(),
            model.depth_size,
            model.address_size(),
        );
        println!(
            "trace arrays {}x{}, model arrays {}x{}: {}",
            trace.depth_size,
            trace.address_size(),
            model.depth_size,
            model.address_size(),
            if compatible { "compatible" } else { "incompatible" }
        );
    }
    print_run(&run, &timeline, format)
}

fn inspect(work_dir: &Path, header_only: bool) -> Result<()> {
    let mut store = ArrayStore::new(work_dir);
    if !store.exists() {
        anyhow::bail!("No array store in {}", work_dir.display());
    }

    let header = store.load_header()?;
    print!("{}", report::render_header(&header));
    if header_only {
        return Ok(());
    }

    store.init_read()?;
    let mut outcome = Ok(());
    for record in store.records() {
        match record {
            Ok(array) => println!("{}", report::render_record(&array)),
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    store.close_read();
    outcome.context("Failed to read array store")
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    match &args.command {
        Command::Encode { input, encoding } => encode(input, *encoding),
        Command::Detect {
            input,
            n_value,
            fresh,
            format,
        } => detect(input, *n_value, *fresh, *format),
        Command::Check {
            input,
            model_dir,
            format,
        } => check(input, model_dir, *format),
        Command::Inspect {
            work_dir,
            header_only,
        } => inspect(work_dir, *header_only),
    }
}
