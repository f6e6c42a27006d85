use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use paket::{builder::PaketBuilder, config, container::Container, index::Index, key_manager::KeyManager};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Paket - random-access encrypted containers (AES-CFB, SHA-256 index)
#[derive(Parser)]
#[command(name = "paket")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults to $PAKET_CONFIG, then paket.json)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a configuration file and generate an encryption key
    Init {
        /// Container blob path
        #[arg(long, default_value = "./data.pkt")]
        container: String,

        /// Index file path
        #[arg(long, default_value = "./data.index.json")]
        index: String,

        /// Encryption key file path
        #[arg(short, long, default_value = "./paket.key")]
        key_path: String,

        /// Key length in bytes (16, 24 or 32)
        #[arg(long, default_value_t = 32)]
        key_len: usize,
    },

    /// Pack files into the container and write its index
    Pack {
        /// Files to pack; each is stored under its file name
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Read one entry through the shared handle
    Get {
        /// Entry name in the index
        name: String,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Return the stored segment without decrypting it
        #[arg(long)]
        raw: bool,

        /// Skip digest verification
        #[arg(long)]
        no_verify: bool,
    },

    /// Extract every entry into a directory using parallel reads
    Extract {
        /// Destination directory
        dir: PathBuf,
    },

    /// List all entries
    List {
        /// Show offsets and lengths
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show container status and totals
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Use RUST_LOG environment variable to control log level (e.g., RUST_LOG=info,paket=debug)
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "paket starting");
    let config_path = config::Config::resolve_path(cli.config.as_deref());

    match cli.command {
        Commands::Init {
            container,
            index,
            key_path,
            key_len,
        } => cmd_init(&config_path, &container, &index, &key_path, key_len).await,

        Commands::Pack { inputs } => cmd_pack(&config_path, &inputs).await,

        Commands::Get {
            name,
            output,
            raw,
            no_verify,
        } => cmd_get(&config_path, &name, output.as_ref(), raw, !no_verify).await,

        Commands::Extract { dir } => cmd_extract(&config_path, &dir).await,

        Commands::List { verbose } => cmd_list(&config_path, verbose).await,

        Commands::Status => cmd_status(&config_path).await,
    }
}

/// Create a styled progress bar for file operations
fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}

/// Open the configured container with its key and index
async fn open_container(config_path: &str) -> Result<Container> {
    let cfg = config::Config::load_with_env(Some(config_path))?;
    let km = KeyManager::load(&cfg).await?;
    let index = Index::load_json(&cfg.index_path)
        .with_context(|| format!("loading index from '{}'", cfg.index_path))?;
    let container = Container::open(km.key().as_bytes(), &cfg.container_path, index)
        .with_context(|| format!("opening container '{}'", cfg.container_path))?;
    Ok(container)
}

async fn cmd_init(
    config_path: &str,
    container: &str,
    index: &str,
    key_path: &str,
    key_len: usize,
) -> Result<()> {
    println!("Initializing paket...");

    let cfg = config::Config::new(container, index, key_path);
    cfg.validate()?;

    if fs::try_exists(config_path).await.unwrap_or(false) {
        anyhow::bail!(
            "Configuration file '{}' already exists. Remove it first or use a different path.",
            config_path
        );
    }

    if fs::try_exists(key_path).await.unwrap_or(false) {
        anyhow::bail!(
            "Key file '{}' already exists. Remove it first or use a different path.",
            key_path
        );
    }

    let _km = KeyManager::new(&cfg, key_len).await?;

    let config_json = serde_json::to_string_pretty(&cfg)?;
    fs::write(config_path, config_json)
        .await
        .with_context(|| format!("writing config to '{}'", config_path))?;

    println!("Initialization complete!");
    println!("Config:    {}", config_path);
    println!("Key:       {} ({} bytes)", key_path, key_len);
    println!("Container: {}", container);
    println!("Index:     {}", index);
    println!();
    println!("IMPORTANT: Keep your key file secure and backed up!");
    println!("Without it, packed files cannot be recovered.");

    Ok(())
}

async fn cmd_pack(config_path: &str, inputs: &[PathBuf]) -> Result<()> {
    let cfg = config::Config::load_with_env(Some(config_path))?;
    let km = KeyManager::load(&cfg).await?;

    let out = std::fs::File::create(&cfg.container_path)
        .with_context(|| format!("creating {}", cfg.container_path))?;
    let mut builder = PaketBuilder::new(km.key().as_bytes(), BufWriter::new(out))?;

    let pb = create_progress_bar(inputs.len() as u64, "Packing");
    for input in inputs {
        let name = input
            .file_name()
            .context("input file has no filename")?
            .to_string_lossy()
            .to_string();
        let data = fs::read(input)
            .await
            .with_context(|| format!("reading {:?}", input))?;
        builder
            .add(&name, &data)
            .with_context(|| format!("packing {}", name))?;
        pb.inc(1);
    }

    let written = builder.position();
    let (_writer, index) = builder.finish()?;
    index
        .save_json(&cfg.index_path)
        .with_context(|| format!("writing index to {}", cfg.index_path))?;

    pb.finish_with_message(format!("Packed {} files ({} bytes)", index.len(), written));
    println!("  container: {}", cfg.container_path);
    println!("  index:     {}", cfg.index_path);
    Ok(())
}

async fn cmd_get(
    config_path: &str,
    name: &str,
    output: Option<&PathBuf>,
    raw: bool,
    verify: bool,
) -> Result<()> {
    let container = open_container(config_path).await?;
    let (data, verified) = container.read_serialized(name, !raw, verify)?;
    container.shutdown()?;

    if verify && !verified {
        warn!(entry = name, "digest mismatch");
        eprintln!("WARNING: '{}' failed digest verification; data may be corrupt or the key wrong", name);
    }

    match output {
        Some(output_path) => {
            fs::write(output_path, &data)
                .await
                .with_context(|| format!("writing to {:?}", output_path))?;
            println!("Read {} bytes -> {:?}", data.len(), output_path);
        }
        None => {
            io::stdout().write_all(&data)?;
            eprintln!("Read {} bytes to stdout", data.len());
        }
    }

    Ok(())
}

async fn cmd_extract(config_path: &str, dir: &PathBuf) -> Result<()> {
    let container = Arc::new(open_container(config_path).await?);
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {:?}", dir))?;

    let names: Vec<String> = container.index().names().map(String::from).collect();
    let pb = create_progress_bar(names.len() as u64, "Extracting");

    let mut handles = Vec::with_capacity(names.len());
    for name in names {
        let container = Arc::clone(&container);
        let handle = tokio::task::spawn_blocking(move || {
            let data = container.read_parallel(&name);
            (name, data)
        });
        handles.push(handle);
    }

    for handle in handles {
        let (name, data) = handle.await?;
        let data = data.with_context(|| format!("reading {}", name))?;
        fs::write(dir.join(&name), &data)
            .await
            .with_context(|| format!("writing {}", name))?;
        pb.inc(1);
    }

    container.shutdown()?;
    pb.finish_with_message(format!("Extracted to {:?}", dir));
    Ok(())
}

async fn cmd_list(config_path: &str, verbose: bool) -> Result<()> {
    let cfg = config::Config::load_with_env(Some(config_path))?;
    let index = Index::load_json(&cfg.index_path)
        .with_context(|| format!("loading index from '{}'", cfg.index_path))?;

    if index.is_empty() {
        println!("No entries found");
        return Ok(());
    }

    println!("Entries ({} total):", index.len());
    println!();

    if verbose {
        println!("{:<32} {:>12} {:>12} {:>12}", "NAME", "OFFSET", "SIZE", "STORED");
        println!("{}", "-".repeat(71));
        for (name, d) in index.iter() {
            println!(
                "{:<32} {:>12} {:>12} {:>12}",
                name, d.start_offset, d.original_length, d.encrypted_length
            );
        }
    } else {
        for (name, d) in index.iter() {
            println!("  {} ({} bytes)", name, d.original_length);
        }
    }

    Ok(())
}

async fn cmd_status(config_path: &str) -> Result<()> {
    let cfg = config::Config::load_with_env(Some(config_path))?;

    println!("Paket Status");
    println!();
    println!("Configuration:");
    println!("  Config file:   {}", config_path);
    println!("  Key file:      {}", cfg.key_path);
    println!("  Container:     {}", cfg.container_path);
    println!("  Index:         {}", cfg.index_path);
    println!();

    let key_exists = fs::try_exists(&cfg.key_path).await.unwrap_or(false);
    println!("Key Status:      {}", if key_exists { "Present" } else { "Missing" });
    println!();

    let container = open_container(config_path).await?;
    let totals = container.aggregate_sizes();
    let entries = container.index().len();
    container.shutdown()?;

    println!("Container Statistics:");
    println!("  Entries:           {}", entries);
    match totals {
        Ok([original, encrypted]) => {
            println!("  Original size:     {} bytes ({:.2} MB)", original, original as f64 / 1_048_576.0);
            println!("  Stored size:       {} bytes ({:.2} MB)", encrypted, encrypted as f64 / 1_048_576.0);
        }
        Err(e) => {
            println!();
            println!("WARNING: {}", e);
        }
    }

    Ok(())
}
