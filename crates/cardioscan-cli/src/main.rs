mod analyze;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use cardioscan_ai::{Architecture, DEFAULT_INPUT_SIZE, ModelConfig};
use cardioscan_core::{AnalysisError, ClinicalTable, DiagnosticReport, PatientData};
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cardioscan", version, about = "Cardiac condition screening for chest X-ray images")]
struct Cli {
    /// Chest X-ray image (PNG, JPEG, BMP, ...)
    image: Option<PathBuf>,

    /// Patient metadata as a JSON object, e.g. '{"age": 70}'
    patient_data: Option<String>,

    /// Trained ONNX model; used whenever the file exists
    #[arg(long, env = "CARDIOSCAN_MODEL")]
    model: Option<PathBuf>,

    /// Architecture to build when no trained model is available
    #[arg(long, value_enum, env = "CARDIOSCAN_ARCHITECTURE", default_value = "transfer")]
    architecture: ArchitectureArg,

    /// Pretrained ONNX feature extractor for the transfer architecture
    #[arg(long, env = "CARDIOSCAN_BACKBONE")]
    backbone: Option<PathBuf>,

    /// Run a freshly initialised architecture if no trained model is found
    #[arg(long, env = "CARDIOSCAN_ALLOW_UNTRAINED")]
    allow_untrained: bool,

    /// Square input resolution for built architectures and dynamic-shape models
    #[arg(long, env = "CARDIOSCAN_IMG_SIZE", default_value_t = DEFAULT_INPUT_SIZE,
          value_parser = clap::value_parser!(u32).range(1..))]
    img_size: u32,

    /// Seed for fresh weight initialisation
    #[arg(long, env = "CARDIOSCAN_SEED", default_value_t = 42)]
    seed: u64,

    /// JSON file overriding the built-in clinical findings and recommendations
    #[arg(long, env = "CARDIOSCAN_CLINICAL_TABLE")]
    clinical_table: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ArchitectureArg {
    Transfer,
    Custom,
}

impl From<ArchitectureArg> for Architecture {
    fn from(arg: ArchitectureArg) -> Self {
        match arg {
            ArchitectureArg::Transfer => Architecture::Transfer,
            ArchitectureArg::Custom => Architecture::Custom,
        }
    }
}

impl Cli {
    fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model_path: self.model.clone(),
            architecture: self.architecture.into(),
            backbone_path: self.backbone.clone(),
            allow_untrained: self.allow_untrained,
            input_size: (self.img_size, self.img_size),
            seed: self.seed,
        }
    }
}

fn main() -> ExitCode {
    // Stdout carries the JSON result only; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::DisplayHelp
                    | ErrorKind::DisplayVersion
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) =>
        {
            e.exit()
        }
        Err(e) => {
            let message = e.to_string();
            let first = message.lines().next().unwrap_or("invalid arguments");
            return fail(&AnalysisError::Argument(first.trim_start_matches("error: ").to_string()));
        }
    };

    match run(&cli).and_then(|report| output::render_success(&report)) {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run(cli: &Cli) -> Result<DiagnosticReport, AnalysisError> {
    let image = cli
        .image
        .as_deref()
        .ok_or_else(|| AnalysisError::Argument("No image path provided".into()))?;
    let patient = cli
        .patient_data
        .as_deref()
        .map(PatientData::from_json_str)
        .transpose()?;
    let table = match &cli.clinical_table {
        Some(path) => ClinicalTable::from_path(path)?,
        None => ClinicalTable::builtin()?,
    };

    analyze::run_analysis(&cli.model_config(), &table, image, patient.as_ref())
}

fn fail(error: &AnalysisError) -> ExitCode {
    tracing::error!(kind = error.kind(), "{error}");
    println!("{}", output::render_failure(&error.to_string()));
    ExitCode::FAILURE
}
