use std::path::{Path, PathBuf};

use anyhow::Context;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use captioner_core::{Captioner, LstmCaptionDecoder, Vocabulary};
use clap::{Args, Parser, Subcommand};

use captioner_cli::config::{CliConfig, Strategy};
use captioner_cli::features::load_features;
use captioner_cli::logging;

#[derive(Parser)]
#[command(name = "captioner", about = "Generate image captions with a recurrent decoder")]
struct Cli {
    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Caption one image from its precomputed encoder features
    Caption(CaptionArgs),

    /// Print the effective configuration as TOML
    ShowConfig {
        /// Config file (default: ~/.config/captioner/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct CaptionArgs {
    /// Decoder weights (safetensors)
    #[arg(long)]
    weights: Option<PathBuf>,

    /// JSON file with the encoder output: {"features": [...]}
    #[arg(long)]
    features: PathBuf,

    /// Vocabulary JSON; without it token ids are printed
    #[arg(long)]
    vocab: Option<PathBuf>,

    /// Search strategy
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Number of hypotheses kept by beam search
    #[arg(long)]
    beam_width: Option<usize>,

    /// Number of tokens to generate
    #[arg(long)]
    max_length: Option<usize>,

    /// Id of the start token
    #[arg(long)]
    start_token_id: Option<u32>,

    /// Cache recurrent state per hypothesis instead of replaying prefixes
    /// (`--cached-state false` forces replay over the config file)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    cached_state: Option<bool>,

    /// Output vocabulary size when no vocabulary file is given
    #[arg(long)]
    vocab_size: Option<usize>,

    /// Config file (default: ~/.config/captioner/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl CaptionArgs {
    fn as_config(&self) -> CliConfig {
        CliConfig {
            weights: self.weights.clone(),
            vocab: self.vocab.clone(),
            strategy: self.strategy,
            beam_width: self.beam_width,
            max_length: self.max_length,
            start_token_id: self.start_token_id,
            cached_state: self.cached_state,
            vocab_size: self.vocab_size,
            ..Default::default()
        }
    }
}

fn load_file_config(path: Option<&Path>) -> anyhow::Result<CliConfig> {
    match path {
        Some(path) => CliConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            if let Some(path) = CliConfig::default_path() {
                if path.exists() {
                    eprintln!("Loaded config from: {}", path.display());
                }
            }
            Ok(CliConfig::load())
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    match cli.command {
        Command::Caption(args) => {
            let mut config = load_file_config(args.config.as_deref())?;
            config.merge(&args.as_config());
            run_caption(&config, &args.features)
        }
        Command::ShowConfig { config } => {
            let config = load_file_config(config.as_deref())?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn run_caption(config: &CliConfig, features_path: &Path) -> anyhow::Result<()> {
    let device = Device::Cpu;

    let vocab = config
        .vocab
        .as_deref()
        .map(Vocabulary::from_file)
        .transpose()?;
    let vocab_size = match (&vocab, config.vocab_size) {
        (Some(vocab), _) => vocab.len(),
        (None, Some(size)) => size,
        (None, None) => anyhow::bail!("either --vocab or --vocab-size is required"),
    };

    let weights = config
        .weights
        .as_ref()
        .context("no decoder weights given (--weights or `weights` in the config file)")?;
    let model_config = config.decoder_config(vocab_size);
    tracing::info!(
        weights = %weights.display(),
        embed_size = model_config.embed_size,
        hidden_size = model_config.hidden_size,
        num_layers = model_config.num_layers,
        vocab_size,
        "loading decoder"
    );
    // SAFETY: the weights file is memory-mapped read-only and is not
    // modified while the process runs.
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)? };
    let decoder = LstmCaptionDecoder::new(&model_config, vb)?;

    let features = load_features(features_path, &device)?;
    let decoding = config.decoding_config();
    let strategy = config.strategy();

    let mut captioner = Captioner::new(decoder, decoding)?;
    if let Some(vocab) = vocab {
        captioner = captioner.with_vocabulary(vocab)?;
    }

    let ids = match strategy {
        Strategy::Greedy => captioner.greedy(&features)?,
        Strategy::Beam => captioner.beam(&features)?,
    };
    tracing::info!(?strategy, tokens = ids.len(), "caption generated");

    println!(
        "{}",
        ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    );
    if captioner.vocabulary().is_some() {
        println!("{}", captioner.render(&ids));
    }
    Ok(())
}
