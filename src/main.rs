mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ConvertModeArg, RunArgs};

use mf_av::ToolRegistry;
use mf_core::config::Config;
use mf_core::{
    ChatId, ConvertConfig, ConvertMode, DeliveryMode, EncodeConfig, IncomingFile, InputSource,
    JobConfig, JobKind, SampleConfig, SessionStore, TaskRecord, TaskStatus, TaskStore,
    UploadTarget, UserId, WatermarkConfig,
};
use mf_db::SqliteStore;
use mf_pipeline::TaskAdmission;
use mf_service::{AppContext, JobService, LocalEndpoint, Submission};

/// Build the job configuration from the `run` flags.
fn job_config(config: &Config, args: &RunArgs) -> Result<Option<JobConfig>> {
    let cfg = match args.job {
        JobKind::Encode => {
            let name = args
                .preset
                .as_deref()
                .context("encode needs --preset (see `mediaforge presets`)")?;
            let preset = config.preset(name).with_context(|| {
                let known: Vec<&str> = config.presets.keys().map(String::as_str).collect();
                format!("unknown preset {name}; known presets: {}", known.join(", "))
            })?;
            Some(JobConfig::Encode(EncodeConfig { preset }))
        }
        JobKind::Trim => {
            let range = args.range.as_deref().context("trim needs --range start:end")?;
            Some(JobConfig::trim_from_range(range)?)
        }
        JobKind::Sample => args
            .duration
            .map(|duration_secs| JobConfig::Sample(SampleConfig { duration_secs })),
        JobKind::Watermark => args
            .position
            .map(|position| JobConfig::Watermark(WatermarkConfig { position })),
        JobKind::Convert => args.mode.map(|mode| {
            JobConfig::Convert(ConvertConfig {
                mode: match mode {
                    ConvertModeArg::ToDocument => ConvertMode::ToDocument,
                    ConvertModeArg::ToStream => ConvertMode::ToStream,
                },
            })
        }),
        JobKind::Merge(_) | JobKind::MediaInfo => None,
    };
    Ok(cfg)
}

async fn run_job(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let mut config = Config::load_or_default(config_path);
    for warning in config.validate() {
        tracing::warn!("config: {warning}");
    }
    let job = job_config(&config, &args)?;

    // The local operator acts as the owner in their own private chat.
    let user = *config.access.owner_id.get_or_insert(UserId(0));
    let chat = ChatId(user.get());

    let endpoint = Arc::new(LocalEndpoint::new(args.out.clone()));
    let ctx = AppContext::production(config, endpoint)?;
    let service = JobService::new(ctx);
    service.reset_orphaned_tasks()?;

    let mut prefs = service.preferences(user)?;
    if let Some(container) = args.container {
        prefs.container = container;
    }
    if args.stream {
        prefs.delivery = DeliveryMode::Stream;
    }
    if args.upload {
        prefs.upload = UploadTarget::ObjectStorage;
    }
    service.set_preferences(user, prefs)?;
    service.on_job_kind_selected(user, chat, args.job, job)?;

    let mut started = None;
    for (idx, path) in args.inputs.iter().enumerate() {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("{} has no file name", path.display()))?;
        let file = IncomingFile {
            name,
            size: meta.len(),
            source: InputSource::Endpoint {
                chat_id: chat,
                message_id: idx as i64 + 1,
                file_ref: path.to_string_lossy().to_string(),
            },
        };

        match service.on_file_received(user, chat, file)? {
            Submission::Staged { missing } => {
                println!("Staged {}; still needed: {}", path.display(), missing.join(", "));
            }
            Submission::Started { task_id } => {
                println!("Started task {task_id}");
                started = Some(task_id);
                break;
            }
        }
    }

    let Some(task_id) = started else {
        service.reset(user)?;
        bail!("not enough inputs for {}", args.job.descriptor().label);
    };

    let record = service.wait_for(task_id).await?;
    service.shutdown().await;
    print_task(&record);
    if record.status != TaskStatus::Completed {
        bail!("task {} ended as {}", record.id, record.status);
    }
    println!("Results are in {}", args.out.display());
    Ok(())
}

fn open_store(config_path: Option<&Path>) -> Result<Arc<SqliteStore>> {
    let config = Config::load_or_default(config_path);
    let db_path = config.storage.db_path.to_string_lossy().to_string();
    let pool = mf_db::init_pool(&db_path)
        .with_context(|| format!("cannot open database {db_path}"))?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

fn list_tasks(config_path: Option<&Path>, user: i64, limit: usize) -> Result<()> {
    let store = open_store(config_path)?;
    let tasks = store.list_tasks(UserId(user), limit)?;
    if tasks.is_empty() {
        println!("No tasks for user {user}");
    }
    for task in &tasks {
        print_task(task);
    }
    Ok(())
}

fn cancel_task(config_path: Option<&Path>, user: i64) -> Result<()> {
    let store = open_store(config_path)?;
    let user = UserId(user);
    let admission = TaskAdmission::new(store.clone(), store.clone());
    let cancelled = admission.cancel(user)?;
    store.reset_job(user)?;
    match cancelled {
        Some(id) => println!("Cancelled task {id}"),
        None => println!("No active task for user {user}"),
    }
    Ok(())
}

fn reset_orphans(config_path: Option<&Path>) -> Result<()> {
    let store = open_store(config_path)?;
    let count = store.reset_orphaned()?;
    println!("Reset {count} orphaned task(s)");
    Ok(())
}

fn show_stats(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let store = open_store(config_path)?;
    let stats = store.stats()?;

    println!("Users:");
    println!("  Total: {}", stats.total_users);
    println!("  Banned: {}", stats.banned_users);
    println!("  Active: {}", stats.active_users());
    println!("Tasks:");
    println!("  Pending: {}", stats.pending_tasks);
    println!("  Running: {}", stats.running_tasks);
    println!("Access:");
    println!("  Authorized groups: {}", config.access.authorized_groups.len());
    println!("  Sudo users: {}", config.access.sudo_users.len());
    Ok(())
}

fn print_task(task: &TaskRecord) {
    print!(
        "{} {} {} {:.1}%",
        task.id,
        task.kind,
        task.status,
        task.progress
    );
    if let Some(stage) = task.stage {
        print!(" [{stage}]");
    }
    if let Some(ref error) = task.error {
        print!(" - {error}");
    }
    println!();
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to run jobs.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("cannot read {}", p.display()))?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("✓ Configuration is valid");
    println!("  Work dir: {}", config.storage.work_dir.display());
    println!("  Database: {}", config.storage.db_path.display());
    println!("  Max file size: {} bytes", config.storage.max_file_size);
    println!("  Presets: {}", config.presets.len());

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
    }
    Ok(())
}

fn list_presets(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    for (name, p) in &config.presets {
        println!(
            "{name}: {}x{} {} crf {} preset {} video {} audio {}",
            p.width, p.height, p.codec, p.crf, p.speed, p.video_bitrate, p.audio_bitrate
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediaforge=trace,mf_service=debug,mf_pipeline=debug,mf_av=debug,mf_db=debug,mf_core=debug".to_string()
        } else {
            "mediaforge=info,mf_service=info,mf_pipeline=info,mf_av=warn,mf_db=warn,mf_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_job(config_path, args))
        }
        Commands::CheckTools => check_tools(config_path),
        Commands::Validate { config } => {
            let path = config.or_else(|| cli.config.clone());
            validate_config(path.as_deref())
        }
        Commands::Presets => list_presets(config_path),
        Commands::Tasks { user, limit } => list_tasks(config_path, user, limit),
        Commands::Cancel { user } => cancel_task(config_path, user),
        Commands::ResetOrphans => reset_orphans(config_path),
        Commands::Stats => show_stats(config_path),
        Commands::Version => {
            println!("mediaforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
