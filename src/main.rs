// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use yantwai::app_config::{Config, LogLevel, TranslationProvider};
use yantwai::chapter::{Chapter, ChapterService, TranslationRequest};
use yantwai::database::{ChapterRepository, DatabaseConnection};
use yantwai::providers::ConfigProviderFactory;
use yantwai::translation::glossary::Glossary;
use yantwai::translation::pipeline::{PipelineOptions, PipelineProgress, ProgressCallback};
use yantwai::translation::ParagraphStatus;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    OpenAI,
    Anthropic,
    LMStudio,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import a chapter from a plain text file
    Import {
        /// Text file holding the chapter, paragraphs separated by blank lines
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Chapter number within the project
        #[arg(short, long)]
        number: u32,

        /// Chapter title
        #[arg(long)]
        title: Option<String>,
    },

    /// Translate a chapter
    Translate(TranslateArgs),

    /// List the chapters of the project, or print one chapter's translation
    Show {
        /// Chapter to print; lists all chapters when omitted
        #[arg(value_name = "CHAPTER_ID")]
        chapter_id: Option<String>,

        /// Write the translation to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace one paragraph's translation by hand
    Edit {
        #[arg(value_name = "CHAPTER_ID")]
        chapter_id: String,

        #[arg(value_name = "PARAGRAPH_ID")]
        paragraph_id: String,

        /// New translated text
        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// Approve every translated paragraph of a chapter
    ApproveAll {
        #[arg(value_name = "CHAPTER_ID")]
        chapter_id: String,
    },

    /// Reset a chapter stuck in the translating state
    Cancel {
        #[arg(value_name = "CHAPTER_ID")]
        chapter_id: String,
    },

    /// Generate shell completions for yantwai
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// Chapter to translate
    #[arg(value_name = "CHAPTER_ID")]
    chapter_id: String,

    /// Only translate paragraphs without a valid translation
    #[arg(long)]
    partial: bool,

    /// Skip the analysis stage
    #[arg(long)]
    skip_analysis: bool,

    /// Skip the editing stage
    #[arg(long)]
    skip_editing: bool,

    /// Token budget per chunk for this run
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Source language code (e.g., 'en', 'zh', 'ko')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'ru', 'en', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Glossary JSON file injected into every prompt
    #[arg(short, long)]
    glossary: Option<PathBuf>,
}

/// YANTwAI - Yet Another Novel Translator with AI
///
/// Translates novel chapters paragraph by paragraph through an
/// analyze, translate and edit pipeline.
#[derive(Parser, Debug)]
#[command(name = "yantwai")]
#[command(version)]
#[command(about = "AI-powered novel chapter translation tool")]
#[command(long_about = "YANTwAI translates novel chapters with LLM providers while keeping every paragraph reviewable.

EXAMPLES:
    yantwai import chapter-01.txt -n 1             # Import a chapter
    yantwai show                                   # List chapters with their progress
    yantwai translate <CHAPTER_ID>                 # Full three-stage translation
    yantwai translate --partial <CHAPTER_ID>       # Fill in missing paragraphs only
    yantwai translate -p openai -m gpt-4o <ID>     # Use a specific provider and model
    yantwai show <CHAPTER_ID> -o chapter-01.ru.txt # Export the translation
    yantwai completions bash > yantwai.bash        # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: String,

    /// Project the chapters belong to
    #[arg(long, default_value = "default", env = "YANTWAI_PROJECT", global = true)]
    project: String,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji and ANSI colour for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("❌ ", "1;31"),
            Level::Warn => ("🚧 ", "1;33"),
            Level::Info => ("", "1;32"),
            Level::Debug => ("🔍 ", "1;36"),
            Level::Trace => ("📋 ", "1;35"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (emoji, colour) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {}{}\x1B[0m",
                colour,
                now,
                emoji,
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Start at info; the configured level is applied once the config is loaded
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "yantwai", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = Config::load_or_create(&cli.config_path)
        .with_context(|| format!("Failed to load configuration from {}", cli.config_path))?;

    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }
    log::set_max_level(config.log_level.to_level_filter());

    match cli.command {
        Commands::Import { file, number, title } => {
            let service = build_service(&config, None)?;
            run_import(&service, &cli.project, &file, number, title.as_deref()).await
        }
        Commands::Translate(args) => run_translate(config, &cli.project, args).await,
        Commands::Show { chapter_id, output } => {
            let service = build_service(&config, None)?;
            match chapter_id {
                Some(id) => run_show(&service, &cli.project, &id, output.as_deref()).await,
                None => run_list(&service, &cli.project).await,
            }
        }
        Commands::Edit {
            chapter_id,
            paragraph_id,
            text,
        } => {
            let service = build_service(&config, None)?;
            service
                .edit_paragraph(&cli.project, &chapter_id, &paragraph_id, &text)
                .await?;
            info!("Paragraph {} updated", paragraph_id);
            Ok(())
        }
        Commands::ApproveAll { chapter_id } => {
            let service = build_service(&config, None)?;
            let changed = service
                .set_all_paragraph_status(&cli.project, &chapter_id, ParagraphStatus::Approved)
                .await?;
            info!("Approved {} paragraph(s)", changed);
            Ok(())
        }
        Commands::Cancel { chapter_id } => {
            let service = build_service(&config, None)?;
            let chapter = service.cancel_translation(&cli.project, &chapter_id).await?;
            info!("Chapter {} is now {}", chapter.number, chapter.status);
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

/// Open the database and wire the chapter service
fn build_service(config: &Config, progress: Option<ProgressCallback>) -> Result<ChapterService> {
    let db = DatabaseConnection::new(config.resolve_database_path())?;
    debug!("Chapter store: {}", db.stats()?);
    let repository = ChapterRepository::new(db);
    let factory = ConfigProviderFactory::new(config.translation.clone());

    let mut service = ChapterService::new(Arc::new(repository), Arc::new(factory), config.pipeline_config())
        .with_sync_settings(config.sync.clone());
    if let Some(progress) = progress {
        service = service.with_progress(progress);
    }

    Ok(service)
}

async fn run_import(
    service: &ChapterService,
    project: &str,
    file: &Path,
    number: u32,
    title: Option<&str>,
) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read chapter file: {}", file.display()))?;
    if source.trim().is_empty() {
        return Err(anyhow!("Chapter file is empty: {}", file.display()));
    }

    let chapter = service.import_chapter(project, number, title, &source).await?;
    println!("{}", chapter.id);
    Ok(())
}

async fn run_translate(mut config: Config, project: &str, args: TranslateArgs) -> Result<()> {
    if let Some(provider) = args.provider {
        config.translation.provider = provider.into();
    }
    if let Some(model) = &args.model {
        let provider_str = config.translation.provider.to_lowercase_string();
        if let Some(provider_config) = config
            .translation
            .available_providers
            .iter_mut()
            .find(|p| p.provider_type == provider_str)
        {
            provider_config.model = model.clone();
        }
    }
    if let Some(source_lang) = args.source_language {
        config.source_language = source_lang;
    }
    if let Some(target_lang) = args.target_language {
        config.target_language = target_lang;
    }

    config.validate().context("Configuration validation failed")?;

    let progress_bar = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress_bar.set_style(style.progress_chars("█▓▒░"));

    let pb = progress_bar.clone();
    let on_progress: ProgressCallback = Arc::new(move |progress: PipelineProgress| {
        pb.set_position((progress.overall_fraction() * 100.0).round() as u64);
        pb.set_message(format!(
            "{} {}/{}",
            progress.state, progress.chunks_done, progress.chunks_total
        ));
    });

    let mut service = build_service(&config, Some(on_progress))?;
    if let Some(path) = &args.glossary {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read glossary: {}", path.display()))?;
        let glossary: Glossary = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse glossary: {}", path.display()))?;
        service = service.with_glossary(Arc::new(glossary));
    }

    info!(
        "🚀 YANTwAI: {} - {}",
        config.translation.provider.display_name(),
        config.translation.get_model(config.translation.translate_provider())
    );

    let request = TranslationRequest {
        partial: args.partial,
        options: PipelineOptions {
            skip_analysis: args.skip_analysis || config.pipeline.skip_analysis,
            skip_editing: args.skip_editing || config.pipeline.skip_editing,
            chunk_size: args.chunk_size,
        },
    };

    let handle = service
        .start_translation(project, &args.chapter_id, request)
        .await?;

    let outcome = tokio::select! {
        joined = handle => Some(joined.context("Translation task panicked")?),
        _ = tokio::signal::ctrl_c() => None,
    };
    progress_bar.finish_and_clear();

    match outcome {
        Some(Ok(chapter)) => {
            report_chapter(&chapter);
            Ok(())
        }
        Some(Err(e)) => {
            error!("Translation failed: {}", e);
            Err(e.into())
        }
        None => {
            warn!("Interrupted, cancelling translation");
            service.cancel_translation(project, &args.chapter_id).await?;
            Ok(())
        }
    }
}

fn report_chapter(chapter: &Chapter) {
    let (translated, total) = chapter.translation_progress();
    match chapter.error_message.as_deref() {
        Some(message) => warn!(
            "Chapter {} is {}: {} ({}/{} paragraphs translated)",
            chapter.number, chapter.status, message, translated, total
        ),
        None => info!(
            "Chapter {} is {} ({}/{} paragraphs translated)",
            chapter.number, chapter.status, translated, total
        ),
    }
}

async fn run_list(service: &ChapterService, project: &str) -> Result<()> {
    let chapters = service.list_chapters(project).await?;
    if chapters.is_empty() {
        info!("No chapters in project {}", project);
        return Ok(());
    }

    for chapter in chapters {
        let (translated, total) = chapter.translation_progress();
        println!(
            "{:>4}  {}  {:<11}  {:>3}/{:<3}  {}",
            chapter.number,
            chapter.id,
            chapter.status.to_string(),
            translated,
            total,
            chapter.title.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn run_show(service: &ChapterService, project: &str, chapter_id: &str, output: Option<&Path>) -> Result<()> {
    let chapter = service.get_chapter(project, chapter_id).await?;
    let text = chapter
        .translated_text
        .clone()
        .unwrap_or_else(|| chapter.assemble_translation());

    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write translation to {}", path.display()))?;
            info!("Success: {}", path.display());
        }
        None => println!("{}", text),
    }

    report_chapter(&chapter);
    Ok(())
}
