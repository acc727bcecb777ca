use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;
use vmod::config::{self, VmodConfig};
use vmod::db::models::JobFilter;
use vmod::db::Database;
use vmod::media::FfmpegExtractor;
use vmod::models::JobStatus;
use vmod::output::{json as json_out, table};
use vmod::pipeline::batch::{run_batch, BatchOutcome};
use vmod::pipeline::setup::{build_pipeline, resolve_endpoints, ProviderOverrides};
use vmod::pipeline::{self, Pipeline, PipelineEvent};
use vmod::signals::check_health;

#[derive(Parser)]
#[command(name = "vmod", version, about = "Video moderation: score frames and speech, build a timeline, recommend an action")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to database file (default: ~/.vmod/vmod.db)
    #[arg(long, global = true, env = "VMOD_DB")]
    db: Option<PathBuf>,
}

#[derive(Args, Clone, Default)]
struct ProviderArgs {
    /// Vision service base URL (POST <url>/analyze)
    #[arg(long)]
    vision_url: Option<String>,

    /// Transcription service base URL (POST <url>/transcribe)
    #[arg(long)]
    asr_url: Option<String>,

    /// Report generation endpoint
    #[arg(long)]
    report_url: Option<String>,

    /// API key for the report endpoint
    #[arg(long)]
    report_api_key: Option<String>,

    /// Ignore configured endpoints and use the local simulators
    #[arg(long)]
    offline: bool,
}

impl ProviderArgs {
    fn overrides(&self) -> ProviderOverrides {
        ProviderOverrides {
            vision_url: self.vision_url.clone(),
            asr_url: self.asr_url.clone(),
            report_url: self.report_url.clone(),
            report_api_key: self.report_api_key.clone(),
            offline: self.offline,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Queue and analyze one or more videos
    Analyze {
        /// Video files or glob patterns
        paths: Vec<String>,

        /// Owner recorded on each job
        #[arg(long, env = "VMOD_OWNER", default_value = "local")]
        owner: String,

        /// Number of videos to analyze concurrently
        #[arg(long, default_value = "1")]
        jobs: usize,

        #[command(flatten)]
        providers: ProviderArgs,
    },

    /// Queue a video without analyzing it
    Queue {
        /// Video file
        path: PathBuf,

        /// Owner recorded on the job
        #[arg(long, env = "VMOD_OWNER", default_value = "local")]
        owner: String,
    },

    /// Run a queued (or failed) job
    Run {
        /// Job ID
        id: String,

        #[command(flatten)]
        providers: ProviderArgs,
    },

    /// Analyze a job's video again as a new job
    Reprocess {
        /// Job ID to supersede
        id: String,

        /// Only queue the new job
        #[arg(long)]
        queue_only: bool,

        #[command(flatten)]
        providers: ProviderArgs,
    },

    /// Show job details, scores and verdict
    Show {
        /// Job ID
        id: String,
    },

    /// Print a job's moderation report
    Report {
        /// Job ID
        id: String,
    },

    /// Print a job's flagged moments
    Timeline {
        /// Job ID
        id: String,
    },

    /// List jobs
    List {
        /// Filter by status: pending, running, completed, failed
        #[arg(long)]
        status: Option<String>,

        /// Filter by owner
        #[arg(long)]
        owner: Option<String>,

        /// Maximum results
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Delete a job and its results
    Delete {
        /// Job ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Show database statistics
    Stats,

    /// Check ffmpeg, providers and the database
    Doctor {
        #[command(flatten)]
        providers: ProviderArgs,
    },

    /// Manage ~/.vmod/config.toml
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented default config if none exists
    Init,
    /// Print the effective config with secrets redacted
    Show,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let json_output = cli.json;

    if let Commands::Config { ref action } = cli.command {
        return run_config(action, json_output);
    }

    let config = VmodConfig::load()?;
    let db_path = match cli.db {
        Some(p) => p,
        None => Database::default_db_path()?,
    };
    let db = Database::open(&db_path)?;

    match cli.command {
        Commands::Analyze {
            paths,
            owner,
            jobs,
            providers,
        } => {
            let files = expand_paths(&paths)?;
            run_analyze(&config, &db, &db_path, &files, &owner, jobs, &providers, json_output)?;
        }

        Commands::Queue { path, owner } => {
            let job = pipeline::queue_video(&db, &path, &owner)?;
            if json_output {
                json_out::print_json(&job)?;
            } else {
                println!("Queued {} ({})", job.id, job.source_path);
            }
        }

        Commands::Run { id, providers } => {
            let pipeline = make_pipeline(&config, &providers)?;
            let printer = (!json_output).then(|| spawn_progress_printer(&pipeline));
            let outcomes = run_batch(&pipeline, &db_path, &[id], 1);
            finish_printer(pipeline, printer);

            report_outcomes(&outcomes, json_output)?;
        }

        Commands::Reprocess {
            id,
            queue_only,
            providers,
        } => {
            let pipeline = if queue_only {
                None
            } else {
                Some(make_pipeline(&config, &providers)?)
            };
            let job = pipeline::reprocess(&db, &id)?;
            let Some(pipeline) = pipeline else {
                if json_output {
                    json_out::print_json(&job)?;
                } else {
                    println!("Queued {} (supersedes {id})", job.id);
                }
                return Ok(());
            };

            if !json_output {
                eprintln!("Queued {} (supersedes {id})", job.id);
            }
            let printer = (!json_output).then(|| spawn_progress_printer(&pipeline));
            let outcomes = run_batch(&pipeline, &db_path, &[job.id], 1);
            finish_printer(pipeline, printer);

            report_outcomes(&outcomes, json_output)?;
        }

        Commands::Show { id } => {
            let job = db
                .get_job(&id)?
                .with_context(|| format!("Job not found: {id}"))?;
            let scores = db.get_scores(&id)?;
            let verdict = db.get_verdict(&id)?;
            let transcript = db.get_transcript(&id)?;
            let timeline = db.get_timeline(&id)?;

            if json_output {
                json_out::print_json(&serde_json::json!({
                    "job": job,
                    "scores": scores,
                    "verdict": verdict,
                    "transcript": transcript,
                    "timeline": timeline,
                }))?;
            } else {
                table::print_job_detail(
                    &job,
                    scores.as_ref(),
                    verdict.as_ref(),
                    transcript.as_ref(),
                    timeline.len(),
                );
            }
        }

        Commands::Report { id } => {
            let verdict = db
                .get_verdict(&id)?
                .with_context(|| format!("No verdict for job {id}. Has it completed?"))?;
            if json_output {
                json_out::print_json(&verdict)?;
            } else {
                println!("{}", verdict.report_text.trim_end());
            }
        }

        Commands::Timeline { id } => {
            if !db.job_exists(&id)? {
                bail!("Job not found: {id}");
            }
            let events = db.get_timeline(&id)?;
            if json_output {
                json_out::print_json(&serde_json::json!({
                    "job_id": id,
                    "total": events.len(),
                    "events": events,
                }))?;
            } else {
                table::print_timeline(&events);
            }
        }

        Commands::List {
            status,
            owner,
            limit,
        } => {
            let status = status
                .as_deref()
                .map(|s| {
                    JobStatus::from_str(s).with_context(|| {
                        format!("Unknown status: {s}. Use: pending, running, completed, failed")
                    })
                })
                .transpose()?;
            let jobs = db.list_jobs(&JobFilter {
                status,
                owner,
                limit,
            })?;
            if json_output {
                json_out::print_json(&jobs)?;
            } else {
                table::print_job_list(&jobs);
            }
        }

        Commands::Delete { id, force } => {
            let job = db
                .get_job(&id)?
                .with_context(|| format!("Job not found: {id}"))?;
            if job.status == JobStatus::Running {
                bail!("Job {id} is running; wait for it to finish before deleting");
            }

            if !force {
                eprint!("Delete job {} ({})? [y/N] ", id, job.source_path);
                let mut answer = String::new();
                std::io::stdin().read_line(&mut answer)?;
                if !answer.trim().eq_ignore_ascii_case("y") {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            db.delete_job(&id)?;
            println!("Deleted: {id}");
        }

        Commands::Stats => {
            let stats = db.stats()?;
            if json_output {
                json_out::print_json(&stats)?;
            } else {
                table::print_stats(&stats);
            }
        }

        Commands::Doctor { providers } => {
            run_doctor(&config, &providers, &db, json_output)?;
        }

        // Handled before the database is opened.
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn run_config(action: &ConfigAction, json_output: bool) -> Result<()> {
    match action {
        ConfigAction::Init => {
            let path = config::config_path()?;
            if config::init_config()? {
                println!("Wrote {}", path.display());
            } else {
                println!("Config already exists: {}", path.display());
            }
        }
        ConfigAction::Show => {
            let config = VmodConfig::load()?;
            if json_output {
                json_out::print_json(&serde_json::json!({
                    "path": config::config_path()?.display().to_string(),
                    "pipeline": config.pipeline,
                    "timeline": config.timeline,
                    "classifier": config.classifier,
                }))?;
            } else {
                println!("{}", config.display_redacted());
            }
        }
    }
    Ok(())
}

/// Queue every file and run the batch.
#[allow(clippy::too_many_arguments)]
fn run_analyze(
    config: &VmodConfig,
    db: &Database,
    db_path: &Path,
    files: &[PathBuf],
    owner: &str,
    jobs: usize,
    providers: &ProviderArgs,
    json_output: bool,
) -> Result<()> {
    if files.is_empty() {
        bail!("No video files matched.");
    }

    // Missing tools are fatal before anything is queued.
    let runner = make_pipeline(config, providers)?;

    let mut job_ids = Vec::with_capacity(files.len());
    for file in files {
        let job = pipeline::queue_video(db, file, owner)?;
        if !json_output {
            eprintln!("Queued {} ({})", job.id, file.display());
        }
        job_ids.push(job.id);
    }

    let printer = (!json_output).then(|| spawn_progress_printer(&runner));
    let outcomes = run_batch(&runner, db_path, &job_ids, jobs);
    finish_printer(runner, printer);

    report_outcomes(&outcomes, json_output)
}

fn make_pipeline(config: &VmodConfig, providers: &ProviderArgs) -> Result<Pipeline> {
    let extractor = FfmpegExtractor::new()?;
    build_pipeline(config, &providers.overrides(), Box::new(extractor))
}

/// Literal paths pass through; anything with glob metacharacters is expanded.
fn expand_paths(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        if pattern.contains(['*', '?', '[']) {
            let matches = glob::glob(pattern).with_context(|| format!("Invalid glob: {pattern}"))?;
            for entry in matches {
                let path = entry?;
                if path.is_file() {
                    files.push(path);
                }
            }
        } else {
            files.push(PathBuf::from(pattern));
        }
    }
    Ok(files)
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn spawn_progress_printer(pipeline: &Pipeline) -> JoinHandle<()> {
    let rx = pipeline.bus().subscribe_all();
    std::thread::spawn(move || {
        for event in rx {
            match event {
                PipelineEvent::Progress {
                    job_id,
                    progress,
                    message,
                    ..
                } => eprintln!("  [{}] {progress:>3}% {message}", short_id(&job_id)),
                PipelineEvent::Completed {
                    job_id,
                    label,
                    recommended_action,
                    ..
                } => eprintln!("  [{}] done: {label} / {recommended_action}", short_id(&job_id)),
                PipelineEvent::Failed {
                    job_id,
                    error_message,
                    ..
                } => eprintln!("  [{}] failed: {error_message}", short_id(&job_id)),
            }
        }
    })
}

/// Dropping the pipeline closes the bus, which ends the printer's loop.
fn finish_printer(pipeline: Pipeline, printer: Option<JoinHandle<()>>) {
    drop(pipeline);
    if let Some(handle) = printer {
        let _ = handle.join();
    }
}

fn report_outcomes(outcomes: &[BatchOutcome], json_output: bool) -> Result<()> {
    if json_output {
        json_out::print_json(&json_out::batch_json(outcomes))?;
    } else {
        println!();
        table::print_batch_outcomes(outcomes);
    }

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 {
        bail!("{failed} of {} job{} failed", outcomes.len(), if outcomes.len() == 1 { "" } else { "s" });
    }
    Ok(())
}

fn run_doctor(config: &VmodConfig, providers: &ProviderArgs, db: &Database, json_output: bool) -> Result<()> {
    let tools = FfmpegExtractor::tool_status();
    let endpoints = resolve_endpoints(config, &providers.overrides());
    let timeout = Duration::from_secs(5);

    let mut checks = Vec::new();
    for (name, url) in [("vision", &endpoints.vision), ("transcription", &endpoints.transcription)] {
        let status = match url {
            Some(url) => match check_health(url, timeout) {
                Ok(()) => format!("ok ({url})"),
                Err(e) => format!("unreachable, will fall back to simulator ({e})"),
            },
            None => "not configured, using simulator".to_string(),
        };
        checks.push((name, status));
    }
    let report_status = match endpoints.report {
        Some(ref url) => format!("configured ({url})"),
        None => "not configured, using template".to_string(),
    };
    checks.push(("report", report_status));

    let schema = db.schema_version()?.unwrap_or_else(|| "unknown".to_string());

    if json_output {
        json_out::print_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "tools": tools
                .iter()
                .map(|(name, path)| (name.to_string(), path.as_ref().map(|p| p.display().to_string())))
                .collect::<std::collections::BTreeMap<_, _>>(),
            "providers": checks
                .iter()
                .map(|(name, status)| (name.to_string(), status.clone()))
                .collect::<std::collections::BTreeMap<_, _>>(),
            "db_path": db.path.display().to_string(),
            "schema_version": schema,
        }))?;
    } else {
        println!("vmod v{}", env!("CARGO_PKG_VERSION"));
        for (name, path) in &tools {
            match path {
                Some(p) => println!("  {name:<14} {}", p.display()),
                None => println!("  {name:<14} MISSING (install ffmpeg and make sure it is on PATH)"),
            }
        }
        for (name, status) in &checks {
            println!("  {name:<14} {status}");
        }
        println!("  {:<14} {} (schema v{schema})", "database", display_path(&db.path));
    }

    if tools.iter().any(|(_, p)| p.is_none()) {
        bail!("ffmpeg/ffprobe not found");
    }
    Ok(())
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
