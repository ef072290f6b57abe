use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use shootsorter::catalog::{ApiCatalog, CachedCatalog, CatalogBackend, DirectCatalog};
use shootsorter::config::{CatalogMode, Config, FallbackPolicy};
use shootsorter::interact::{Interaction, NonInteractive, StdinPrompt};
use shootsorter::{SceneResolver, ShootIdRecognizer, ShootSorter};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("shootsorter")
        .version("0.1.0")
        .about("Shoot-ID based scene identification and storage sorting")
        .arg(
            Arg::new("storage")
                .value_name("STORAGE_ROOT")
                .help("Storage root directory to scan and sort")
                .required(true),
        )
        .arg(
            Arg::new("revert")
                .long("revert")
                .help("Undo a previous sort of this storage root")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("tested")
                .short('t')
                .long("tested")
                .help("Actually move files instead of the symlink simulation")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .help("Prompt on ambiguous or unconfident decisions")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("templates")
                .long("templates")
                .value_name("DIR")
                .help("Directory with overlay template images"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file to use"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let filter = if matches.get_flag("verbose") {
        "shootsorter=debug,info"
    } else {
        "shootsorter=info,warn"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(std::path::Path::new(path))?,
        None => Config::load().unwrap_or_else(|e| {
            warn!("No configuration found, using defaults: {}", e);
            Config::default()
        }),
    };
    if matches.get_flag("tested") {
        config.storage.simulation = false;
    }
    if matches.get_flag("interactive") {
        config.interaction.interactive = true;
    }
    if let Some(templates) = matches.get_one::<String>("templates") {
        config.recognition.template_dir = PathBuf::from(templates);
    }
    config.validate()?;

    let storage_root = PathBuf::from(matches.get_one::<String>("storage").unwrap());
    if !storage_root.is_dir() {
        error!("Storage root does not exist: {}", storage_root.display());
        return Err(anyhow::anyhow!("storage root not found"));
    }

    let backend: Arc<dyn CatalogBackend> = match config.catalog.mode {
        CatalogMode::Direct => Arc::new(DirectCatalog::new(&config.catalog)),
        CatalogMode::Api => Arc::new(ApiCatalog::new(&config.catalog)),
        CatalogMode::Cached => {
            let cached = CachedCatalog::new(&config.catalog);
            cached.start_population();
            Arc::new(cached)
        }
    };

    let interaction: Arc<dyn Interaction> = if config.interaction.interactive {
        Arc::new(StdinPrompt)
    } else {
        Arc::new(NonInteractive::new(config.interaction.fallback))
    };

    let recognizer = Arc::new(ShootIdRecognizer::load(config.recognition.clone()));
    if !recognizer.has_templates() {
        warn!("No overlay templates loaded, frame recognition is disabled");
    }

    let resolver = SceneResolver::new(
        Arc::clone(&backend),
        recognizer,
        interaction,
        config.extraction.clone(),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing the current movie...");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    let simulation = config.storage.simulation;
    let fallback = config.interaction.fallback;
    let sorter = ShootSorter::new(config, backend, resolver, shutdown);

    info!("Storage root: {}", storage_root.display());
    let start = std::time::Instant::now();

    if matches.get_flag("revert") {
        sorter.revert(&storage_root).await?;
    } else {
        if simulation {
            info!("Simulation mode: the sorted tree will hold symlinks only");
        }
        if matches!(fallback, FallbackPolicy::LeaveUntagged) {
            info!("Unconfident matches will be left untagged");
        }
        let diff = sorter.run(&storage_root).await?;
        if !diff.is_empty() {
            info!("Files to get ({}):", diff.len());
            for path in &diff {
                info!("  {}", path.display());
            }
        }
    }

    info!("Done in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}
