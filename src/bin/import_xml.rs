//! Bulk import of batch documents from a directory.
//!
//! Every `*.xml` file in the directory is pushed through the same ingestion
//! pipeline as the HTTP endpoint, with bounded parallelism. Ctrl-C stops
//! new files from starting and lets in-flight batches stop between entries.
//! With `--skip-existing`, re-running a directory reports readings that are
//! already stored as duplicates instead of appending them again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use migration::{Migrator, MigratorTrait};
use probe_ingest::config::ConfigLoader;
use probe_ingest::ingest::{BatchResult, IngestError, IngestionService};
use probe_ingest::{db, telemetry};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(
    name = "import-xml",
    version,
    about = "Import tank-probe batch documents from a directory"
)]
struct Cli {
    /// Directory containing batch documents
    dir: PathBuf,

    /// Number of files processed concurrently
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..=64))]
    workers: u16,

    /// Skip applying database migrations before importing
    #[arg(long)]
    no_migrate: bool,

    /// Do not re-append readings whose probe and timestamp are already stored
    #[arg(long)]
    skip_existing: bool,
}

#[derive(Debug, Default)]
struct ImportTotals {
    files: usize,
    skipped: usize,
    rejected: usize,
    entries: usize,
    processed: usize,
    failed: usize,
    duplicates: usize,
}

impl ImportTotals {
    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Ingested(result) => {
                self.files += 1;
                self.entries += result.entries;
                self.processed += result.processed;
                self.failed += result.failed;
                self.duplicates += result.duplicates;
            }
            FileOutcome::Rejected(_) | FileOutcome::Unreadable(_) => {
                self.files += 1;
                self.rejected += 1;
            }
            FileOutcome::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug)]
enum FileOutcome {
    Ingested(BatchResult),
    Rejected(IngestError),
    Unreadable(std::io::Error),
    Skipped,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    let files = collect_documents(&cli.dir)
        .with_context(|| format!("Failed to list {}", cli.dir.display()))?;
    if files.is_empty() {
        println!("No XML documents found in {}", cli.dir.display());
        return Ok(());
    }

    let db = db::init_pool(&config).await?;
    if !cli.no_migrate {
        Migrator::up(&db, None).await?;
    }

    let service = Arc::new(
        IngestionService::new(Arc::new(db), &config.ingest).with_skip_existing(cli.skip_existing),
    );
    let cancel = CancellationToken::new();
    let permits = Arc::new(Semaphore::new(usize::from(cli.workers)));

    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received; stopping after in-flight entries");
            ctrl_c_token.cancel();
        }
    });

    let mut tasks = JoinSet::new();
    for path in files {
        let service = service.clone();
        let cancel = cancel.clone();
        let permits = permits.clone();

        tasks.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => FileOutcome::Skipped,
                permit = permits.acquire_owned() => match permit {
                    Ok(_permit) if !cancel.is_cancelled() => import_file(&service, &path, &cancel).await,
                    _ => FileOutcome::Skipped,
                },
            };
            (path, outcome)
        });
    }

    let mut totals = ImportTotals::default();
    while let Some(joined) = tasks.join_next().await {
        let (path, outcome) = joined.context("Import task panicked")?;
        report(&path, &outcome);
        totals.record(&outcome);
    }

    println!(
        "files={} rejected={} skipped={} entries={} processed={} failed={} duplicates={}",
        totals.files,
        totals.rejected,
        totals.skipped,
        totals.entries,
        totals.processed,
        totals.failed,
        totals.duplicates
    );

    Ok(())
}

async fn import_file(
    service: &IngestionService,
    path: &Path,
    cancel: &CancellationToken,
) -> FileOutcome {
    let payload = match tokio::fs::read(path).await {
        Ok(payload) => payload,
        Err(err) => return FileOutcome::Unreadable(err),
    };

    match service.ingest(&payload, cancel).await {
        Ok(result) => FileOutcome::Ingested(result),
        Err(err) => FileOutcome::Rejected(err),
    }
}

fn report(path: &Path, outcome: &FileOutcome) {
    let name = path.display();
    match outcome {
        FileOutcome::Ingested(result) => println!(
            "{name}: customer={} site={} entries={} processed={} failed={} duplicates={}{}",
            result.customer_id,
            result.site_id,
            result.entries,
            result.processed,
            result.failed,
            result.duplicates,
            if result.cancelled { " (cancelled)" } else { "" }
        ),
        FileOutcome::Rejected(err) => println!("{name}: rejected: {err}"),
        FileOutcome::Unreadable(err) => println!("{name}: unreadable: {err}"),
        FileOutcome::Skipped => println!("{name}: skipped"),
    }
}

fn collect_documents(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        })
        .collect();
    files.sort();
    Ok(files)
}
