//! Vigil CLI - watch a directory tree and stream change events

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use vigil_core::{Event, EventKind, EventKinds};
use vigil_watcher::{WatchRequest, WatchService};

/// Watch a directory tree and print filesystem change events
#[derive(Parser)]
#[command(name = "vigil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to watch
    path: PathBuf,

    /// Report only these kinds (comma separated: create,modify,delete)
    #[arg(long, value_delimiter = ',')]
    kinds: Vec<String>,

    /// Respect the root's .gitignore when scanning
    #[arg(long)]
    gitignore: bool,

    /// Print events as JSON lines instead of colored text
    #[arg(long)]
    json: bool,

    /// Warn when the watched file count exceeds this threshold
    #[arg(long)]
    warn_above: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut request = WatchRequest::new().kinds(parse_kinds(&cli.kinds)?);
    if let Some(limit) = cli.warn_above {
        request = request.warn_above(limit);
    }
    if cli.gitignore {
        if let Some(matcher) = gitignore_matcher(&cli.path)? {
            request = request.include(move |path: &Path| !matcher.matched(path, true).is_ignore());
        }
    }

    let service = WatchService::new();
    service
        .register(&cli.path, request)
        .with_context(|| format!("Failed to watch {}", cli.path.display()))?;

    eprintln!("watching {} (Ctrl-C to stop)", cli.path.display());

    loop {
        let ready = service.take()?;
        for event in ready.poll_events() {
            if cli.json {
                println!("{}", serde_json::to_string(&event)?);
            } else {
                print_event(&event);
            }
        }
    }
}

/// Build an inclusion matcher from the root's .gitignore, if present
fn gitignore_matcher(root: &Path) -> Result<Option<ignore::gitignore::Gitignore>> {
    let root = root
        .canonicalize()
        .context("Failed to resolve watch root")?;
    let gitignore_path = root.join(".gitignore");
    if !gitignore_path.exists() {
        return Ok(None);
    }

    let mut builder = ignore::gitignore::GitignoreBuilder::new(&root);
    builder.add(&gitignore_path);
    let matcher = builder.build().context("Failed to parse .gitignore")?;
    Ok(Some(matcher))
}

fn parse_kinds(raw: &[String]) -> Result<EventKinds> {
    if raw.is_empty() {
        return Ok(EventKinds::all());
    }
    let mut kinds = EventKinds::none();
    for name in raw {
        kinds = match name.as_str() {
            "create" => kinds.with(EventKind::Create),
            "modify" => kinds.with(EventKind::Modify),
            "delete" => kinds.with(EventKind::Delete),
            other => anyhow::bail!("Unknown event kind: {other}"),
        };
    }
    Ok(kinds)
}

fn print_event(event: &Event) {
    let kind = match event.kind {
        EventKind::Create => event.kind.as_str().green().to_string(),
        EventKind::Modify => event.kind.as_str().yellow().to_string(),
        EventKind::Delete => event.kind.as_str().red().to_string(),
    };
    if event.count > 1 {
        println!("{}  {} (x{})", kind, event.path.display(), event.count);
    } else {
        println!("{}  {}", kind, event.path.display());
    }
}
