//! Translator Pro CLI - Translate text, documents, images and recordings.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;
use translator_pro_core::model::supported_pairs;
use translator_pro_core::util::file_extension;
use translator_pro_core::{
    AppConfig, Device, DocumentKind, FileExtractor, Lang, TesseractOcr, TextTranslator,
    WhisperCppTranscriber, languages, translated_file_name,
};

#[derive(Parser, Debug)]
#[command(name = "translator-pro")]
#[command(author, version, about = "Translate text, documents, images and audio", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Source language code (fr, en, ar, es, de, it)
    #[arg(short = 's', long, global = true)]
    source: Option<Lang>,

    /// Target language code
    #[arg(short = 't', long, global = true)]
    target: Option<Lang>,

    /// Inference server base URL
    #[arg(long, env = "TRANSLATOR_API_BASE", global = true)]
    api_base: Option<String>,

    /// Inference server API key
    #[arg(long, env = "TRANSLATOR_API_KEY", global = true)]
    api_key: Option<String>,

    /// Compute device (cpu, cuda, cuda:N)
    #[arg(long, global = true)]
    device: Option<Device>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output file (default: translated_<name>.txt next to the input)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate text given as argument or on stdin
    Text {
        text: Option<String>,
    },
    /// Translate a TXT, PDF or DOCX document
    File {
        path: PathBuf,
    },
    /// Translate the text in an image
    Image {
        path: PathBuf,
    },
    /// Transcribe and translate a recording
    Audio {
        path: PathBuf,
    },
    /// List supported languages and pairs
    Languages,
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).context(format!("Failed to read input: {}", path.display()))
}

/// Write the translation next to the input unless an output path was given
fn write_output(input: &Path, output: Option<PathBuf>, text: &str) -> Result<PathBuf> {
    let output_path = output.unwrap_or_else(|| {
        let name = input
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        input.with_file_name(translated_file_name(name))
    });

    std::fs::write(&output_path, text)
        .context(format!("Failed to write output: {}", output_path.display()))?;

    Ok(output_path)
}

fn extension_of(path: &Path) -> Result<String> {
    path.to_str()
        .and_then(file_extension)
        .context(format!("Input has no file extension: {}", path.display()))
}

// CLI output is intentional
#[allow(clippy::print_stdout)]
fn print_languages() {
    println!("Languages:");
    for option in languages() {
        println!("  {} {:<3} {}", option.flag, option.lang.as_str(), option.name);
    }

    println!("\nPairs:");
    for pair in supported_pairs() {
        println!("  {pair}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    if matches!(args.command, Command::Languages) {
        print_languages();
        return Ok(());
    }

    // Load or create config
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };

    // Override config with CLI arguments
    if let Some(source) = args.source {
        config.source_lang = source;
    }
    if let Some(target) = args.target {
        config.target_lang = target;
    }
    if let Some(api_base) = args.api_base {
        config.model.api_base = api_base;
    }
    if args.api_key.is_some() {
        config.model.api_key = args.api_key;
    }
    if args.device.is_some() {
        config.device = args.device;
    }

    let (source, target) = (config.source_lang, config.target_lang);
    if source == target {
        anyhow::bail!("Source and target language are both {source}");
    }

    let translator = TextTranslator::new(&config).context("Failed to initialize translator")?;

    match args.command {
        Command::Text { text } => {
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read stdin")?;
                    buf
                }
            };

            let pb = spinner(&format!("Translating {source} → {target}"));
            let translated = translator.translate(&text, source, target).await;
            pb.finish_and_clear();
            let translated = translated.context("Translation failed")?;

            #[allow(clippy::print_stdout)]
            {
                println!("{translated}");
            }
        }
        Command::File { path } => {
            let kind = DocumentKind::from_extension(&extension_of(&path)?)?;
            let bytes = read_input(&path)?;
            info!("Translating {} document {}", kind, path.display());

            let pb = spinner(&format!("Translating {}", path.display()));
            let result = translator
                .translate_document(&FileExtractor::new(), &bytes, kind, source, target)
                .await;
            pb.finish_and_clear();
            let result = result.context("Document translation failed")?;

            let output_path = write_output(&path, args.output, &result.translated)?;
            #[allow(clippy::print_stdout)]
            {
                println!("Translation saved to: {}", output_path.display());
            }
        }
        Command::Image { path } => {
            let bytes = read_input(&path)?;
            let ocr = TesseractOcr::new(&config.ocr);

            let pb = spinner(&format!("Reading and translating {}", path.display()));
            let result = translator.translate_image(&ocr, &bytes, source, target).await;
            pb.finish_and_clear();
            let translated = result.context("Image translation failed")?;

            let output_path = write_output(&path, args.output, &translated)?;
            #[allow(clippy::print_stdout)]
            {
                println!("Translation saved to: {}", output_path.display());
            }
        }
        Command::Audio { path } => {
            let format = extension_of(&path)?;
            let bytes = read_input(&path)?;
            let transcriber = WhisperCppTranscriber::new(&config.speech);

            let pb = spinner(&format!("Transcribing {}", path.display()));
            let result = translator
                .translate_audio(&transcriber, &bytes, &format, source, target)
                .await;
            pb.finish_and_clear();
            let result = result.context("Audio translation failed")?;

            let output_path = write_output(&path, args.output, &result.translated)?;
            #[allow(clippy::print_stdout)]
            {
                println!("Transcript: {}", result.transcript);
                println!("Translation saved to: {}", output_path.display());
            }
        }
        Command::Languages => {}
    }

    Ok(())
}
