use std::error::Error;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use visa_checklist::api::{start_server, ApiContext};
use visa_checklist::config::{EngineConfig, ServerConfig, APP_VERSION};
use visa_checklist::models::{ApplicantContext, ChecklistRequest, CountryCode, ModelError, VisaType};
use visa_checklist::pipeline::checklist::{
    ChecklistEngine, EngineData, ModelResolver, OpenAiCompatibleClient,
};

#[derive(Parser, Debug)]
#[command(
    name = "visa-checklist",
    about = "Generate visa document checklists from rules, AI enrichment and fallbacks",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Generate one checklist and print it as JSON
    Generate(GenerateArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override CHECKLIST_HOST
    #[arg(long)]
    host: Option<IpAddr>,
    /// Override CHECKLIST_PORT
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Destination country code, e.g. US
    #[arg(long)]
    country: String,
    /// Visa type: tourist or student
    #[arg(long)]
    visa_type: String,
    /// JSON file with {questionnaireAnswers, riskScore}
    #[arg(long)]
    context: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    visa_checklist::init_tracing();
    tracing::info!("visa-checklist starting v{APP_VERSION}");

    let config = EngineConfig::from_env()?;
    tracing::debug!(?config, "Engine configuration");
    // Built before any async runtime exists: the blocking HTTP client
    // must not be created or dropped inside one.
    let engine = Arc::new(build_engine(&config)?);

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(Arc::clone(&engine), args),
        Command::Generate(args) => generate(&engine, args),
    }
}

fn build_engine(config: &EngineConfig) -> Result<ChecklistEngine, Box<dyn Error>> {
    let data = EngineData::load(config.data_dir.as_deref())?;
    let client = OpenAiCompatibleClient::new(&config.api_base_url, config.api_key.clone())?;
    if !client.is_configured() {
        tracing::warn!("No API key configured, every checklist will be built from fallback data");
    }
    let models = ModelResolver::new(&config.models);

    Ok(ChecklistEngine::from_data(Arc::new(client), data, models)
        .with_policy(config.policy)
        .with_settings(config.settings))
}

fn serve(engine: Arc<ChecklistEngine>, args: ServeArgs) -> Result<(), Box<dyn Error>> {
    let mut server_config = ServerConfig::from_env()?;
    if let Some(host) = args.host {
        server_config.host = host;
    }
    if let Some(port) = args.port {
        server_config.port = port;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let server = start_server(ApiContext::new(engine), server_config.addr()).await?;
        tokio::signal::ctrl_c().await?;
        tracing::info!("Interrupt received, shutting down");
        server.shutdown().await;
        Ok::<(), Box<dyn Error>>(())
    })?;
    drop(runtime);
    Ok(())
}

fn generate(engine: &ChecklistEngine, args: GenerateArgs) -> Result<(), Box<dyn Error>> {
    let country = CountryCode::parse(&args.country)?;
    let visa_type = VisaType::parse_lenient(&args.visa_type).ok_or_else(|| ModelError::InvalidEnum {
        field: "visaType".into(),
        value: args.visa_type.clone(),
    })?;
    let context = match &args.context {
        Some(path) => serde_json::from_str::<ApplicantContext>(&std::fs::read_to_string(path)?)?,
        None => ApplicantContext::default(),
    };

    let checklist = engine.generate_checklist(&ChecklistRequest::new(country, visa_type, context));
    println!("{}", serde_json::to_string_pretty(&checklist)?);
    Ok(())
}
