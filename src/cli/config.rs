use crate::config::generate::generate_starter_config;
use crate::config::parse::load_config_dir;
use crate::config::types::SourceKind;
use crate::config::SYSTEM_CONFIG_DIR;
use std::fs;
use std::path::{Path, PathBuf};

const STARTER_FILE: &str = "default.yml";

/// Write the starter configuration, or print it with `stdout`.
pub fn init(stdout: bool, config_dir: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let content = generate_starter_config();
    if stdout {
        print!("{}", content);
        return Ok(());
    }

    let dir = match config_dir {
        Some(dir) => crate::config::expand_tilde(dir),
        None => user_config_dir().unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG_DIR)),
    };

    let path = dir.join(STARTER_FILE);
    if path.exists() {
        return Err(format!(
            "Config file already exists at {}. Remove it first or use --stdout to print the config",
            path.display()
        )
        .into());
    }

    fs::create_dir_all(&dir)?;
    fs::write(&path, content)?;
    println!("Config file written to {}", path.display());
    Ok(())
}

// Falls back to the system directory when the user one cannot be created
fn user_config_dir() -> Option<PathBuf> {
    let dir = dirs::home_dir()?.join(".config/logrelay.d");
    match fs::create_dir_all(&dir) {
        Ok(()) => Some(dir),
        Err(_) => {
            eprintln!("Warning: Could not create directory {}", dir.display());
            eprintln!("Falling back to {}", SYSTEM_CONFIG_DIR);
            None
        }
    }
}

/// Load the configuration and print what would be watched.
pub fn check(config_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Checking configuration directory: {}", config_dir.display());
    let config = load_config_dir(config_dir)?;
    let settings = &config.settings;

    println!("\nSources ({}):", config.sources.len());
    for desc in &config.sources {
        let kind = match desc.kind {
            SourceKind::File => "file",
            SourceKind::Journal => "journal",
        };
        let sinks: Vec<String> = desc.sinks.iter().map(|s| s.instance_key()).collect();
        println!("  [{}] {}", kind, desc.key());
        if let Some(rate) = desc.rate_limit {
            println!("      rate_limit: {}/s", rate);
        }
        if let Some(size) = desc.batch_size {
            println!("      batch_size: {}", size);
        }
        if desc.disk_buffer {
            println!("      disk_buffer: on");
        }
        println!("      sinks: {}", sinks.join(", "));
    }

    println!("\nSettings:");
    println!("  buffer_dir: {}", settings.buffer_dir.display());
    match settings.queue_size_limit {
        Some(limit) => println!("  queue_size_limit: {} (overflow drains to disk)", limit),
        None => println!("  queue_size_limit: unset (overflow discards)"),
    }
    println!("  auto_reload_interval: {}s", settings.auto_reload_interval);
    println!("  wal_retention: {:?}", settings.wal_retention);
    println!("  replay_interval: {:?}", settings.replay_interval);

    println!("\nConfiguration is valid");
    Ok(())
}
