use clap::{Parser, Subcommand, ValueEnum};
use eyre::{Result, WrapErr};
use std::fs;
use std::path::{Path, PathBuf};

use nutripredict::predictor::PredictorService;
use nutripredict::profile::UserProfile;
use nutripredict::server::{ServerConfig, DEFAULT_MODEL_DIR};

#[derive(Parser)]
#[command(
    name = "nutripredict",
    version,
    about = "Nutrient deficiency risk screening from demographic data."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Summary,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP prediction service
    Serve {
        /// Address to bind to
        #[arg(long, env = "NUTRIPREDICT_BIND", default_value = "0.0.0.0:8000")]
        bind: String,

        /// Directory containing the trained model artifacts
        #[arg(long, env = "NUTRIPREDICT_MODEL_DIR", default_value = DEFAULT_MODEL_DIR)]
        model_dir: PathBuf,

        /// Path for JSONL access log
        #[arg(long, env = "NUTRIPREDICT_ACCESS_LOG", default_value = "nutripredict-access.jsonl")]
        access_log: String,

        /// Directory for metrics.json
        #[arg(long, env = "NUTRIPREDICT_DATA_DIR", default_value = ".")]
        data_dir: String,

        /// Allowed CORS origins (comma separated)
        #[arg(
            long,
            env = "NUTRIPREDICT_CORS_ORIGINS",
            value_delimiter = ',',
            default_value = "http://localhost:3000,http://localhost:5173"
        )]
        cors_origins: Vec<String>,
    },

    /// Assess a single profile from a JSON file (local CLI)
    Predict {
        /// Path to a JSON user profile
        #[arg(long)]
        input: PathBuf,

        /// Directory containing the trained model artifacts
        #[arg(long, env = "NUTRIPREDICT_MODEL_DIR", default_value = DEFAULT_MODEL_DIR)]
        model_dir: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },

    /// List the model's feature codes and descriptions
    Features {
        /// Directory containing the trained model artifacts
        #[arg(long, env = "NUTRIPREDICT_MODEL_DIR", default_value = DEFAULT_MODEL_DIR)]
        model_dir: PathBuf,
    },
}

fn cmd_serve(
    bind: String,
    model_dir: PathBuf,
    access_log: String,
    data_dir: String,
    cors_origins: Vec<String>,
) -> Result<()> {
    use nutripredict::server::run_server;

    let bind_addr = bind
        .parse()
        .wrap_err_with(|| format!("Invalid bind address: {}", bind))?;

    let config = ServerConfig {
        bind_addr,
        model_dir,
        access_log_path: access_log,
        data_dir,
        cors_origins,
        ..ServerConfig::default()
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_server(config))?;

    Ok(())
}

fn load_service(model_dir: &Path) -> Result<PredictorService> {
    let service = PredictorService::load(model_dir);
    if !service.is_ready() {
        eyre::bail!("Models not loaded from {}", model_dir.display());
    }
    Ok(service)
}

fn cmd_predict(input: PathBuf, model_dir: PathBuf, format: OutputFormat) -> Result<()> {
    let content = fs::read_to_string(&input)
        .wrap_err_with(|| format!("Failed to read {}", input.display()))?;
    let body: serde_json::Value = serde_json::from_str(&content)
        .wrap_err_with(|| format!("Invalid JSON in {}", input.display()))?;
    let profile = UserProfile::from_json(&body)?;

    let service = load_service(&model_dir)?;
    let response = nutripredict::assess(&service, &profile)?;

    match format {
        OutputFormat::Json => {
            let result = serde_json::json!({
                "assessment": response,
                "model_hash": service.model_hash(),
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Summary => {
            println!("Nutrient Risk Assessment");
            println!("========================");
            println!(
                "Profile: {} y/o {}, BMI {:.1}",
                profile.age,
                profile.gender,
                profile.bmi()
            );
            println!();
            for p in &response.predictions {
                println!(
                    "{:<26} {:<9} {:>5.1}%  ({:.1}% - {:.1}%)",
                    p.nutrient,
                    p.risk_category.as_str(),
                    p.risk_score * 100.0,
                    p.confidence_lower * 100.0,
                    p.confidence_upper * 100.0
                );
            }
            println!();
            println!("Top features:");
            for f in &response.top_features {
                println!("  {:<30} value {:>8.2}  impact {:+.4}", f.feature_name, f.value, f.impact);
            }
            println!();
            println!("Recommendations:");
            for r in &response.recommendations {
                println!("  [{:?}/{:?}] {}", r.category, r.priority, r.recommendation);
            }
            println!();
            println!("Overall health score: {:.2}", response.overall_health_score);
            if let Some(hash) = service.model_hash() {
                println!("Model Hash: {}", hash);
            }
        }
    }

    Ok(())
}

fn cmd_features(model_dir: PathBuf) -> Result<()> {
    let service = load_service(&model_dir)?;
    let info = service.feature_info()?;
    for f in &info.features {
        println!("{:<10} {}", f.code, f.description);
    }
    println!();
    println!("{} features", info.total_features);
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            bind,
            model_dir,
            access_log,
            data_dir,
            cors_origins,
        } => cmd_serve(bind, model_dir, access_log, data_dir, cors_origins),
        Commands::Predict {
            input,
            model_dir,
            format,
        } => cmd_predict(input, model_dir, format),
        Commands::Features { model_dir } => cmd_features(model_dir),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}
