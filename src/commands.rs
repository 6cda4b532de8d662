//! Handlers behind each CLI subcommand.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, Utc};
use console::Style;
use tokio_util::sync::CancellationToken;

use crate::config::{VeoConfig, check_concurrency};
use crate::export::write_csv;
use crate::kie::KieClient;
use crate::poller::{PollExit, Poller};
use crate::prompts::split_prompts;
use crate::session::SessionStore;
use crate::submitter::Submitter;
use crate::tracking::{Batch, BatchStats};
use crate::ui::{self, BatchProgress};

pub struct GenerateArgs {
    pub prompts: Vec<String>,
    pub file: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub session: Option<PathBuf>,
    pub aspect_ratio: Option<String>,
    pub no_watch: bool,
    pub force: bool,
}

fn store_for(config: &VeoConfig, session: Option<PathBuf>) -> SessionStore {
    SessionStore::new(session.unwrap_or_else(|| PathBuf::from(&config.session_file)))
}

fn concurrency_for(config: &VeoConfig, flag: Option<usize>) -> Result<usize> {
    Ok(check_concurrency(flag.unwrap_or(config.max_concurrent_requests))?)
}

fn client_for(config: &VeoConfig) -> Result<Arc<KieClient>> {
    let key = config.require_api_key()?.to_string();
    let client = KieClient::with_base_url(key, config.base_url.clone())
        .context("failed to build HTTP client")?;
    Ok(Arc::new(client))
}

fn collect_prompts(args: &GenerateArgs) -> Result<Vec<String>> {
    let mut prompts: Vec<String> = args
        .prompts
        .iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if let Some(path) = &args.file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prompts from {}", path.display()))?;
        prompts.extend(split_prompts(&text));
    }
    Ok(prompts)
}

pub async fn generate(config: &VeoConfig, args: GenerateArgs) -> Result<()> {
    let store = store_for(config, args.session.clone());
    if !args.force && store.exists() {
        let existing = store.load()?;
        if !existing.is_finished() {
            bail!(
                "{} holds a batch with unfinished jobs; run `veobatch resume` or pass --force",
                store.path().display()
            );
        }
    }

    let concurrency = concurrency_for(config, args.concurrency)?;
    let client = client_for(config)?;
    let mut settings = config.video_settings();
    if let Some(ratio) = &args.aspect_ratio {
        settings.aspect_ratio = ratio.clone();
    }

    let mut batch = Batch::new(collect_prompts(&args)?, settings)?;
    tracing::info!(
        batch_id = batch.id(),
        jobs = batch.len(),
        concurrency,
        "Starting batch",
    );
    // Persist before any network call so an interrupted run can resume.
    store.save(&batch)?;

    let cancel = cancel_on_ctrl_c();
    let submitter = Submitter::new(Arc::clone(&client), concurrency, config.retry_config());
    let report = submitter
        .run(&mut batch, &cancel, |b| save_or_log(&store, b))
        .await;
    store.save(&batch)?;
    println!(
        "Submitted {} job(s), {} failed at submission. Session: {}",
        report.submitted,
        report.failed,
        store.path().display()
    );

    if report.pending > 0 {
        print_resume_hint(&store);
        return Ok(());
    }
    if args.no_watch {
        return Ok(());
    }
    watch(config, client, concurrency, &mut batch, &store, &cancel).await
}

pub async fn resume(config: &VeoConfig, session: Option<PathBuf>, concurrency: Option<usize>) -> Result<()> {
    let store = store_for(config, session);
    let mut batch = store.load()?;
    if batch.is_finished() {
        println!("Every job in this batch has already finished.");
        ui::print_summary(&BatchStats::compute(&batch, Utc::now()));
        return Ok(());
    }

    let concurrency = concurrency_for(config, concurrency)?;
    let client = client_for(config)?;

    let cancel = cancel_on_ctrl_c();
    if !batch.pending_submission().is_empty() {
        let submitter = Submitter::new(Arc::clone(&client), concurrency, config.retry_config());
        let report = submitter
            .run(&mut batch, &cancel, |b| save_or_log(&store, b))
            .await;
        store.save(&batch)?;
        if report.pending > 0 {
            print_resume_hint(&store);
            return Ok(());
        }
    }

    tracing::info!(batch_id = batch.id(), pending = batch.pending_poll().len(), "Resuming batch");
    watch(config, client, concurrency, &mut batch, &store, &cancel).await
}

/// Token cancelled by the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });
    cancel
}

fn save_or_log(store: &SessionStore, batch: &Batch) {
    if let Err(e) = store.save(batch) {
        tracing::error!(error = %e, "Failed to save session");
    }
}

fn print_resume_hint(store: &SessionStore) {
    println!(
        "{} Stopped. Continue with `veobatch resume --session {}`.",
        Style::new().yellow().apply_to("↻"),
        store.path().display()
    );
}

/// Poll until done or Ctrl-C, saving the session after every round.
async fn watch(
    config: &VeoConfig,
    client: Arc<KieClient>,
    concurrency: usize,
    batch: &mut Batch,
    store: &SessionStore,
    cancel: &CancellationToken,
) -> Result<()> {
    let poller = Poller::new(client, config.poll_interval(), concurrency);
    let progress = BatchProgress::start(batch.len());
    progress.update(&BatchStats::compute(batch, Utc::now()));

    let exit = poller
        .run(batch, cancel, |b, report| {
            progress.update(&BatchStats::compute(b, Utc::now()));
            if report.transient_errors > 0 {
                progress.note(&format!(
                    "  {} status quer{} failed, retrying next round",
                    report.transient_errors,
                    if report.transient_errors == 1 { "y" } else { "ies" }
                ));
            }
            save_or_log(store, b);
        })
        .await;
    progress.finish();
    store.save(batch)?;

    if exit == PollExit::Cancelled {
        print_resume_hint(store);
    }
    ui::print_summary(&BatchStats::compute(batch, Utc::now()));
    Ok(())
}

pub fn status(config: &VeoConfig, session: Option<PathBuf>) -> Result<()> {
    let store = store_for(config, session);
    let snapshot = store.load_snapshot()?;
    let batch = &snapshot.batch;

    let local = |t: DateTime<Utc>| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
    println!(
        "Batch {} ({} job(s), {} / {}), created {}, saved {}",
        batch.id(),
        batch.len(),
        batch.settings().model,
        batch.settings().aspect_ratio,
        local(batch.created_at()),
        local(snapshot.saved_at),
    );
    ui::print_jobs(batch);
    ui::print_summary(&BatchStats::compute(batch, Utc::now()));
    Ok(())
}

pub fn select(config: &VeoConfig, ids: &[String], off: bool, session: Option<PathBuf>) -> Result<()> {
    let store = store_for(config, session);
    let mut batch = store.load()?;
    for id in ids {
        let job = batch.select(id, !off)?;
        println!(
            "{} {}",
            if off { "Unselected" } else { "Selected" },
            job.id()
        );
    }
    store.save(&batch)?;
    Ok(())
}

pub fn export(config: &VeoConfig, session: Option<PathBuf>, output: Option<PathBuf>, bom: bool) -> Result<()> {
    let store = store_for(config, session);
    let batch = store.load()?;

    let output = output.unwrap_or_else(default_export_path);
    if output == Path::new("-") {
        write_csv(&batch, io::stdout().lock(), bom)?;
        return Ok(());
    }

    let file = File::create(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    write_csv(&batch, BufWriter::new(file), bom)?;
    tracing::info!(path = %output.display(), rows = batch.len(), "CSV exported");
    println!("Wrote {} row(s) to {}", batch.len(), output.display());
    Ok(())
}

fn default_export_path() -> PathBuf {
    PathBuf::from(format!("video_results_{}.csv", Local::now().format("%Y%m%d_%H%M%S")))
}
