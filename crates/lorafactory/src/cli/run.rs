//! The `lorafactory run` command: one generation batch with live progress
//! and a manifest of item results.

use clap::{Args, ValueEnum};
use lorafactory_core::{
    cost_multiplier, BatchEvent, BatchSummary, Config, GenerationJob, GenerationMode, LoraFactory,
    ManifestWriter, OutputFormat, PromptRecord, ReferenceAsset,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Generation modes as spelled on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Mode {
    /// Primary image plus an edited twin
    Paired,
    /// One image per prompt
    Single,
    /// Variations of a reference image
    Reference,
}

impl From<Mode> for GenerationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Paired => GenerationMode::PairedTransform,
            Mode::Single => GenerationMode::Single,
            Mode::Reference => GenerationMode::ReferenceVariation,
        }
    }
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(s).ok_or_else(|| format!("unknown manifest format '{s}' (json, jsonl)"))
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Theme for prompt synthesis (not needed with --prompts)
    pub theme: Option<String>,

    /// Generation mode (defaults to batch.mode, or reference with --reference)
    #[arg(short, long, value_enum)]
    pub mode: Option<Mode>,

    /// Number of items
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Items running at once (1-10)
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Transformation applied to each primary image (paired mode)
    #[arg(short, long)]
    pub transformation: Option<String>,

    /// Image provider id
    #[arg(long)]
    pub provider: Option<String>,

    /// Model for primary images
    #[arg(long)]
    pub model: Option<String>,

    /// Model for edits and variations
    #[arg(long)]
    pub edit_model: Option<String>,

    /// Provider for prompt synthesis and captions
    #[arg(long)]
    pub prompt_provider: Option<String>,

    /// Model for prompt synthesis
    #[arg(long)]
    pub prompt_model: Option<String>,

    /// Model for captions (disables action-text captions)
    #[arg(long)]
    pub caption_model: Option<String>,

    /// Token prefixed to every caption
    #[arg(long)]
    pub trigger_word: Option<String>,

    /// Reference image file or URL (reference mode)
    #[arg(long)]
    pub reference: Option<String>,

    /// Prompt file: JSON array of strings or records, or one prompt per line
    #[arg(long)]
    pub prompts: Option<PathBuf>,

    /// Generic parameter as key=value (repeatable; values parsed as JSON when possible)
    #[arg(short, long = "param", value_parser = super::parse_param)]
    pub params: Vec<(String, Value)>,

    /// API key for the image provider (session only)
    #[arg(long, env = "LORAFACTORY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Manifest file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Manifest format: json or jsonl
    #[arg(short, long, value_parser = parse_format, default_value = "jsonl")]
    pub format: OutputFormat,

    /// Validate and print the translated request without calling any provider
    #[arg(long)]
    pub dry_run: bool,
}

/// Execute the run command.
pub async fn execute(args: RunArgs, config: Config) -> anyhow::Result<()> {
    let mut factory = LoraFactory::new(config)?;
    if let Some(provider) = &args.provider {
        factory.registry_mut().set_active(provider)?;
    }

    let job = build_job(&factory, &args)?;
    if let Some(key) = &args.api_key {
        factory.registry().set_credential(&job.provider_id, Some(key))?;
    }

    let report = factory.validate_job(&job).await;
    let mapped = factory.translator().map_parameters(
        job.primary_model(),
        &job.provider_id,
        &job.parameters,
        &job.overrides,
    );
    let estimate = estimated_cost(&job, &mapped);

    if args.dry_run {
        let plan = json!({
            "mode": job.mode,
            "count": job.count,
            "concurrency": job.effective_concurrency(),
            "provider": job.provider_id,
            "model": job.primary_model(),
            "edit_model": job.edit_model_id,
            "parameters": mapped,
            "validation": report,
            "estimated_cost": estimate,
        });
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    tracing::info!("Estimated cost: {estimate:.1} units");

    let orchestrator = factory.orchestrator().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after in-flight items");
            orchestrator.stop_batch();
        }
    });

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = ManifestWriter::new(sink, args.format, true);

    let mut run = factory.run(job).await?;
    let progress = create_progress_bar();

    while let Some(event) = run.next_event().await {
        match event {
            BatchEvent::Item(item) => {
                if let Some(failure) = &item.failure {
                    progress.suspend(|| {
                        tracing::error!(
                            "Item {} failed at {} on {}: {}",
                            item.sequence_id,
                            failure.stage,
                            failure.provider_id,
                            failure.message
                        )
                    });
                }
                writer.write_item(&item)?;
            }
            BatchEvent::Progress(p) => {
                progress.set_length(p.total as u64);
                progress.set_position(p.resolved() as u64);
                progress.set_message(format!("{} ok, {} failed", p.completed, p.failed));
            }
            BatchEvent::Finished(_) => {}
        }
    }

    let summary = run.finish().await?;
    progress.finish_and_clear();
    let records = writer.items_written();
    writer.finish(&summary)?;
    if let Some(path) = &args.output {
        tracing::info!("Manifest with {records} item(s) written to {:?}", path);
    }
    print_summary(&summary);

    if summary.total > 0 && summary.completed == 0 {
        anyhow::bail!("No item completed");
    }
    Ok(())
}

/// Apply the command-line overrides to a job built from config defaults.
fn build_job(factory: &LoraFactory, args: &RunArgs) -> anyhow::Result<GenerationJob> {
    let mut job = factory.job(args.theme.clone().unwrap_or_default());

    if let Some(mode) = args.mode {
        job.mode = mode.into();
    }
    if let Some(count) = args.count {
        job.count = count;
    }
    if let Some(concurrency) = args.concurrency {
        job.concurrency_limit = concurrency;
    }
    if let Some(transformation) = &args.transformation {
        job.transformation = transformation.clone();
    }
    if let Some(model) = &args.model {
        job.model_id = model.clone();
    }
    set_optional(&mut job.edit_model_id, &args.edit_model);
    set_optional(&mut job.prompt_provider_id, &args.prompt_provider);
    set_optional(&mut job.prompt_model_id, &args.prompt_model);
    set_optional(&mut job.caption_model_id, &args.caption_model);
    set_optional(&mut job.trigger_word, &args.trigger_word);

    for (key, value) in &args.params {
        job.parameters.insert(key.clone(), value.clone());
    }

    if let Some(path) = &args.prompts {
        let prompts = read_prompts(path)?;
        if args.count.is_none() {
            job.count = prompts.len();
        }
        job.prompts = Some(prompts);
    }

    if let Some(reference) = &args.reference {
        job.reference = Some(load_reference(reference)?);
        if args.mode.is_none() {
            job.mode = GenerationMode::ReferenceVariation;
        }
    }
    Ok(job)
}

/// An empty flag value clears the configured default.
fn set_optional(field: &mut Option<String>, flag: &Option<String>) {
    if let Some(value) = flag {
        let trimmed = value.trim();
        *field = (!trimmed.is_empty()).then(|| trimmed.to_string());
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PromptInput {
    Text(String),
    Record(PromptRecord),
}

fn read_prompts(path: &Path) -> anyhow::Result<Vec<PromptRecord>> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let prompts: Vec<PromptRecord> = if is_json {
        serde_json::from_str::<Vec<PromptInput>>(&content)?
            .into_iter()
            .map(|input| match input {
                PromptInput::Text(text) => PromptRecord::new(text),
                PromptInput::Record(record) => record,
            })
            .collect()
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(PromptRecord::new)
            .collect()
    };

    if prompts.is_empty() {
        anyhow::bail!("No prompts found in {}", path.display());
    }
    Ok(prompts)
}

fn load_reference(raw: &str) -> anyhow::Result<ReferenceAsset> {
    if ["http://", "https://", "data:"]
        .iter()
        .any(|scheme| raw.starts_with(scheme))
    {
        return Ok(ReferenceAsset::Locator(raw.to_string()));
    }

    let path = PathBuf::from(shellexpand::tilde(raw).into_owned());
    let data = std::fs::read(&path).map_err(|e| {
        anyhow::anyhow!(
            "Cannot read reference image {:?}: {e}\n\n  Hint: pass a file path or an http(s) URL.",
            path
        )
    })?;
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("png")
        .to_ascii_lowercase();
    Ok(ReferenceAsset::Bytes { data, format })
}

/// Relative cost of the whole job; paired items cost a generation and an edit.
fn estimated_cost(job: &GenerationJob, mapped: &lorafactory_core::ParamMap) -> f64 {
    let per_request = cost_multiplier(mapped);
    let requests_per_item = match job.mode {
        GenerationMode::PairedTransform => 2.0,
        _ => 1.0,
    };
    per_request * requests_per_item * job.count as f64
}

fn create_progress_bar() -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message("synthesizing prompts...");
    pb
}

fn print_summary(summary: &BatchSummary) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Completed:    {:>8}", summary.completed);
    if summary.failed > 0 {
        eprintln!("    Failed:       {:>8}", summary.failed);
    }
    eprintln!("    Total:        {:>8}", summary.total);
    if summary.stopped {
        eprintln!("    Stopped early");
    }
    eprintln!(
        "    Duration:     {:>7.1}s",
        summary.elapsed_ms as f64 / 1000.0
    );
    eprintln!("  ====================================");
}
