mod display;
mod serve;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ecgedge_ai::{InferenceService, OnnxClassifier, OnnxValidator, Scaler};
use ecgedge_core::{FeatureRecord, PayloadCipher, SharedSecret};
use ecgedge_store::{ArtifactStore, AuditLog};
use ecgedge_sync::HttpArtifactSource;
use ecgedge_updater::{UpdateReport, Updater};

#[derive(Parser)]
#[command(
    name = "ecgedge",
    version,
    about = "ECG classification on edge devices, with safe model updates"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify one set of ECG measurements with the current model
    Predict {
        #[command(flatten)]
        features: FeatureArgs,
        #[command(flatten)]
        artifacts: ModelArgs,
        /// Model file to use instead of the current artifact
        #[arg(long)]
        model: Option<PathBuf>,
        /// Also print the inputs as the model saw them
        #[arg(short, long)]
        verbose: bool,
    },
    /// Download, validate and promote a new model artifact
    Update {
        #[command(flatten)]
        store: StoreArgs,
        /// Artifact download URL
        #[arg(
            long,
            env = "ECGEDGE_UPDATE_URL",
            default_value = "http://localhost:8000/download-model"
        )]
        url: String,
        /// Whole-download timeout in seconds
        #[arg(long, env = "ECGEDGE_DOWNLOAD_TIMEOUT_SECS", default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Re-validate the newest backup and promote it back to current
    Rollback {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Show the model update log
    Log {
        #[arg(long, env = "ECGEDGE_LOG_PATH", default_value = "model_update.log")]
        log_path: PathBuf,
        /// Only show the newest N entries
        #[arg(long)]
        last: Option<usize>,
    },
    /// Encrypt measurements into a request body for POST /predict
    Encrypt {
        #[command(flatten)]
        features: FeatureArgs,
        #[command(flatten)]
        secret: SecretArgs,
    },
    /// Run the inference server
    Serve {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        secret: SecretArgs,
        #[arg(long, env = "ECGEDGE_BIND", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
    },
}

#[derive(Args)]
struct StoreArgs {
    /// Directory holding the current, backup and incoming artifacts
    #[arg(long, env = "ECGEDGE_MODEL_DIR", default_value = ".")]
    model_dir: PathBuf,
    #[arg(long, env = "ECGEDGE_LOG_PATH", default_value = "model_update.log")]
    log_path: PathBuf,
}

#[derive(Args)]
struct ModelArgs {
    #[arg(long, env = "ECGEDGE_MODEL_DIR", default_value = ".")]
    model_dir: PathBuf,
    /// Feature scaler parameters (JSON with `mean` and `scale`)
    #[arg(long, env = "ECGEDGE_SCALER")]
    scaler: Option<PathBuf>,
}

#[derive(Args)]
struct SecretArgs {
    /// Pre-shared AES key (16, 24 or 32 bytes)
    #[arg(long, env = "ECGEDGE_AES_KEY", hide_env_values = true)]
    aes_key: String,
    /// Pre-shared AES-CBC IV (16 bytes)
    #[arg(long, env = "ECGEDGE_AES_IV", hide_env_values = true)]
    aes_iv: String,
}

#[derive(Args)]
struct FeatureArgs {
    /// Heart rate (bpm)
    #[arg(long)]
    hr: f64,
    /// PR interval (ms)
    #[arg(long)]
    pr: f64,
    /// QRS duration (ms)
    #[arg(long)]
    qrs: f64,
    /// ST segment (mV)
    #[arg(long, allow_hyphen_values = true)]
    st: f64,
    /// QTc interval (ms)
    #[arg(long)]
    qtc: f64,
    /// Electrical axis (degrees)
    #[arg(long, allow_hyphen_values = true)]
    axis: f64,
    /// Sinus, Bradycardia, Tachycardia or "Atrial Fibrillation"
    #[arg(long)]
    rhythm: String,
    /// Normal, Inverted, Peaked or Flattened
    #[arg(long, alias = "t_wave")]
    t_wave: String,
}

impl FeatureArgs {
    fn to_record(&self) -> anyhow::Result<FeatureRecord> {
        let record = FeatureRecord {
            heart_rate: self.hr,
            pr_interval: self.pr,
            qrs_duration: self.qrs,
            st_segment: self.st,
            qtc_interval: self.qtc,
            electrical_axis: self.axis,
            rhythm: self.rhythm.clone(),
            t_wave: self.t_wave.clone(),
        };
        record.validate().context("invalid measurements")?;
        Ok(record)
    }
}

impl SecretArgs {
    fn cipher(&self) -> anyhow::Result<PayloadCipher> {
        let secret = SharedSecret::new(self.aes_key.as_bytes(), self.aes_iv.as_bytes())
            .context("loading pre-shared AES key")?;
        Ok(PayloadCipher::new(secret))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    tracing::debug!("ecgedge v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    match cli.command {
        Command::Predict {
            features,
            artifacts,
            model,
            verbose,
        } => {
            let record = features.to_record()?;
            let path = model.unwrap_or_else(|| current_artifact(&artifacts.model_dir));
            let service = load_service(&path, artifacts.scaler.as_deref())?;
            let prediction = service.classify(&record).context("running inference")?;
            if verbose {
                print!("{}", display::render_record_card(&record));
            }
            print!("{}", display::render_prediction(&prediction));
        }
        Command::Update {
            store,
            url,
            timeout_secs,
        } => {
            let source = HttpArtifactSource::new(Duration::from_secs(timeout_secs))
                .context("building HTTP client")?;
            let updater = build_updater(&store)?.with_source(Arc::new(source));
            println!("Downloading updated model from {url}...");
            let report = updater.run(&url).await.context("model update failed")?;
            print_report(&report, &updater);
        }
        Command::Rollback { store } => {
            let updater = build_updater(&store)?;
            let report = updater.rollback().await.context("rollback failed")?;
            print_report(&report, &updater);
        }
        Command::Log { log_path, last } => {
            let entries = AuditLog::new(&log_path)
                .read_all()
                .with_context(|| format!("reading {}", log_path.display()))?;
            print!("{}", display::render_log(&entries, last));
        }
        Command::Encrypt { features, secret } => {
            let record = features.to_record()?;
            let envelope = secret.cipher()?.encrypt(&record)?;
            println!("{}", serde_json::json!({ "data": envelope.to_base64() }));
        }
        Command::Serve {
            model,
            secret,
            bind,
        } => {
            let model_path = current_artifact(&model.model_dir);
            let service = load_service(&model_path, model.scaler.as_deref())?;
            let state = serve::AppState {
                service: Arc::new(service),
                cipher: Arc::new(secret.cipher()?),
                model_path,
            };
            serve::serve(bind, state).await?;
        }
    }

    Ok(())
}

fn current_artifact(model_dir: &Path) -> PathBuf {
    model_dir.join(ecgedge_store::artifact::CURRENT_FILE)
}

fn load_service(model_path: &Path, scaler: Option<&Path>) -> anyhow::Result<InferenceService> {
    let classifier = OnnxClassifier::load(model_path)
        .with_context(|| format!("loading model {}", model_path.display()))?;
    let scaler = match scaler {
        Some(path) => Scaler::load(path)?,
        None => Scaler::identity(),
    };
    Ok(InferenceService::new(Arc::new(classifier), scaler))
}

/// Rollback-only updater; `update` adds its HTTP source.
fn build_updater(store: &StoreArgs) -> anyhow::Result<Updater> {
    let artifacts = ArtifactStore::open(&store.model_dir)
        .with_context(|| format!("opening model directory {}", store.model_dir.display()))?;
    let log = Arc::new(AuditLog::new(&store.log_path));
    Ok(Updater::new(artifacts, log, Arc::new(OnnxValidator)))
}

fn print_report(report: &UpdateReport, updater: &Updater) {
    if let Some(backup) = &report.backup {
        println!("Previous model backed up as '{}'.", backup.display());
    }
    println!(
        "Model successfully updated from {} and saved to '{}' ({} bytes).",
        report.source,
        updater.store().current_path().display(),
        report.artifact.size_bytes
    );
}
