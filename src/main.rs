use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use simcull::{
    Config, EmbedderKind, History, ImageId, LoadOutcome, Overrides, Session, SimilarImage, View,
};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "simcull", version, about = "Review and cull near-duplicate images")]
struct Cli {
    /// Config file (default: `<config dir>/simcull/config.json`)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Step through a folder and delete near-duplicates interactively
    Review {
        /// Directory to review
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Print the ranked similar images for every image in a folder
    Scan {
        /// Directory to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        session: SessionArgs,
    },

    /// List images deleted from a folder
    History {
        /// Directory containing the photos
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// Print the effective configuration
    Config {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Minimum similarity for an image to be listed (0-1)
    #[arg(short, long)]
    threshold: Option<f32>,
    /// How many similar images to show
    #[arg(short = 'n', long)]
    top_n: Option<usize>,
    /// Embedding worker threads (0 = one per core)
    #[arg(short, long)]
    workers: Option<usize>,
    /// Embedding method
    #[arg(short, long, value_enum)]
    embedder: Option<EmbedderKind>,
    /// Do not record deletions in the folder's history file
    #[arg(long)]
    no_history: bool,
}

impl SessionArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            threshold: self.threshold,
            top_n: self.top_n,
            workers: self.workers,
            embedder: self.embedder,
            no_history: self.no_history,
        }
    }
}

#[derive(Serialize)]
struct ScanEntry<'a> {
    image: &'a ImageId,
    similar: Vec<SimilarImage>,
}

enum Action {
    Next,
    Previous,
    Delete(ImageId),
    Threshold,
    Quit,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Review { path, session } => {
            let config = load_config(cli.config.as_deref(), &session)?;
            review(&path, &config)?;
        }

        Commands::Scan {
            path,
            json,
            session,
        } => {
            let config = load_config(cli.config.as_deref(), &session)?;
            scan(&path, &config, json)?;
        }

        Commands::History { path } => {
            let history = History::in_folder(&path);
            let records = history
                .records()
                .with_context(|| format!("Could not read history in {}", path.display()))?;
            if records.is_empty() {
                println!("No deletions recorded in {}", path.display());
                return Ok(());
            }

            println!("🗂️  Deletion History:");
            for (i, rec) in records.iter().enumerate() {
                println!("[{}] {}\n     deleted: {}", i, rec.timestamp, rec.image);
                if let Some(digest) = &rec.digest {
                    println!("     blake3: {}", digest);
                }
                if let (Some(kept), Some(score)) = (&rec.kept, rec.score) {
                    println!("     kept: {} (score {:.2})", kept, score);
                }
                println!();
            }
        }

        Commands::Config { session } => {
            let config = load_config(cli.config.as_deref(), &session)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>, args: &SessionArgs) -> Result<Config> {
    let config = Config::load(path)?.with_overrides(&args.overrides());
    config.validate()?;
    Ok(config)
}

fn open_session(config: &Config) -> Result<Session> {
    let progress = ProgressBar::new(0);
    progress.set_style(ProgressStyle::with_template(
        "{spinner:.green} Embedding [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
    )?);

    let session = Session::new(
        config.embedder.build(),
        Box::new(config.image_store()),
        config.session_settings(),
    )?
    .with_progress(progress);
    Ok(session)
}

fn load_folder(session: &mut Session, path: &Path) -> Result<bool> {
    println!("▶ Loading images from: {}", path.display());
    let outcome = benchmark("loading folder", || session.load(path))
        .with_context(|| format!("Failed to load {}", path.display()))?;

    match outcome {
        LoadOutcome::NoImages => {
            println!("No images found.");
            Ok(false)
        }
        LoadOutcome::Loaded {
            images,
            embedded,
            failed,
        } => {
            println!("✅ {} image(s), {} embedded", images, embedded);
            if failed > 0 {
                println!("⚠️  {} image(s) could not be embedded and will not be matched", failed);
            }
            Ok(true)
        }
    }
}

fn scan(path: &Path, config: &Config, json: bool) -> Result<()> {
    let mut session = open_session(config)?;
    if !load_folder(&mut session, path)? {
        return Ok(());
    }

    let entries: Vec<ScanEntry> = session
        .working_set()
        .iter()
        .map(|image| ScanEntry {
            image,
            similar: session.similar_to(image.as_str()),
        })
        .filter(|entry| !entry.similar.is_empty())
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No similar images above {:.2}.", session.threshold());
        return Ok(());
    }
    for entry in &entries {
        println!("\n✨ {}", entry.image);
        for hit in &entry.similar {
            println!("   ▶ {} (score {:.2})", hit.image, hit.score);
        }
    }
    Ok(())
}

fn review(path: &Path, config: &Config) -> Result<()> {
    let mut session = open_session(config)?;
    if !load_folder(&mut session, path)? {
        return Ok(());
    }

    loop {
        let view = session.current_view();
        let View::Image {
            image,
            position,
            total,
            similar,
            ..
        } = view
        else {
            println!("No images left in the folder.");
            break;
        };

        println!(
            "\n🖼  [{}/{}] {}  (threshold {:.2})",
            position + 1,
            total,
            image,
            session.threshold()
        );
        if similar.is_empty() {
            println!("   No similar image found");
        }
        for (i, hit) in similar.iter().enumerate() {
            println!("   {}. {} (score {:.2})", i + 1, hit.image, hit.score);
        }

        let mut actions = vec![
            ("Next".to_string(), Action::Next),
            ("Previous".to_string(), Action::Previous),
            (format!("Delete current ({})", image), Action::Delete(image.clone())),
        ];
        for (i, hit) in similar.iter().enumerate() {
            actions.push((
                format!("Delete similar {} ({})", i + 1, hit.image),
                Action::Delete(hit.image.clone()),
            ));
        }
        actions.push(("Change threshold".to_string(), Action::Threshold));
        actions.push(("Quit".to_string(), Action::Quit));

        let labels: Vec<&str> = actions.iter().map(|(label, _)| label.as_str()).collect();
        let choice = Select::new()
            .with_prompt("Action")
            .items(&labels[..])
            .default(0)
            .interact()?;

        match &actions[choice].1 {
            Action::Next => {
                session.next();
            }
            Action::Previous => {
                session.previous();
            }
            Action::Delete(target) => {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Permanently delete {}?", target))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    continue;
                }
                match session.delete(target.as_str()) {
                    Ok(_) => println!("🗑️  Deleted {}", target),
                    Err(e) => println!("⚠️  {}", e),
                }
            }
            Action::Threshold => {
                let value: f32 = Input::new()
                    .with_prompt("Threshold (0-1)")
                    .with_initial_text(format!("{:.2}", session.threshold()))
                    .interact_text()?;
                if let Err(e) = session.set_threshold(value) {
                    println!("⚠️  {}", e);
                }
            }
            Action::Quit => break,
        }
    }

    if let Some(history) = session.history() {
        if history.path().exists() {
            println!("\n✅ Deletions recorded in {}", history.path().display());
        }
    }
    Ok(())
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
