// src/pipeline.rs

use crate::aggregate::{Aggregator, CategorySummary};
use crate::artifact::{self, ArtifactMeta};
use crate::config::Config;
use crate::error::{ExtractionError, PipelineError, SkipReason};
use crate::extract::load_document;
use crate::harvest::{DocumentHarvester, HarvestedFile};
use crate::heuristics::{self, RateConfidence};
use crate::normalize::{CurrencyNormalizer, NormalizedPrice};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tracing::{Instrument, info, info_span, warn};

/// Per-document work run on the blocking pool.
type Processor = fn(&HarvestedFile, &Config) -> Result<NormalizedPrice, SkipReason>;

/// Counters and results of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub harvested: usize,
    pub accepted: usize,
    pub fallback_accepted: usize,
    pub skipped: BTreeMap<&'static str, usize>,
    pub summaries: Vec<CategorySummary>,
    pub artifact: Option<ArtifactMeta>,
}

impl RunReport {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Extract, infer, resolve and normalize a single document.
pub fn process_document(
    file: &HarvestedFile,
    config: &Config,
) -> Result<NormalizedPrice, SkipReason> {
    let doc = load_document(file)?;
    let (fields, rate) = heuristics::analyze(&doc, config)?;
    CurrencyNormalizer::new(&config.normalize, config.resolver.fallback_policy).normalize(
        &rate,
        fields.category,
        doc.file_name(),
    )
}

/// Run the pipeline and publish the artifact. Ctrl-C aborts before publish.
pub async fn run(config: Arc<Config>) -> Result<RunReport, PipelineError> {
    run_until(config, interrupted(tokio::signal::ctrl_c())).await
}

/// Resolves when `signal` fires. A signal that cannot be registered never
/// resolves, so the run goes on without interrupt support.
async fn interrupted(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        warn!(error = %e, "Unable to listen for Ctrl-C, running without interrupt");
        std::future::pending::<()>().await;
    }
}

/// Like [`run`], but stops without publishing as soon as `shutdown` resolves.
pub async fn run_until(
    config: Arc<Config>,
    shutdown: impl Future<Output = ()>,
) -> Result<RunReport, PipelineError> {
    run_with(config, shutdown, process_document).await
}

async fn run_with(
    config: Arc<Config>,
    shutdown: impl Future<Output = ()>,
    processor: Processor,
) -> Result<RunReport, PipelineError> {
    let files = DocumentHarvester::new(&config.harvest).harvest(&config.harvest.root)?;

    let (aggregator, mut report) = tokio::select! {
        biased;
        _ = shutdown => {
            warn!("Interrupted, previous artifact left in place");
            return Err(PipelineError::Interrupted);
        }
        collected = process_all(files, config.clone(), processor) => collected?,
    };

    report.summaries = aggregator.summarize();
    report.artifact = Some(artifact::write_artifact(
        &config.output_path,
        &report.summaries,
    )?);

    info!(
        harvested = report.harvested,
        accepted = report.accepted,
        fallback = report.fallback_accepted,
        skipped = report.skipped_total(),
        categories = report.summaries.len(),
        "Run complete"
    );
    Ok(report)
}

/// Map every file through `processor` on a bounded worker pool and fold the
/// outcomes in a single aggregation task.
pub async fn process_all(
    files: Vec<HarvestedFile>,
    config: Arc<Config>,
    processor: Processor,
) -> Result<(Aggregator, RunReport), PipelineError> {
    let workers = config.pipeline.workers.max(1);
    let budget = config.pipeline.document_timeout_secs;
    let harvested = files.len();

    let (tx, mut rx) =
        mpsc::channel::<(PathBuf, Result<NormalizedPrice, SkipReason>)>(workers * 2);

    let collector = tokio::spawn(async move {
        let mut aggregator = Aggregator::new();
        let mut report = RunReport {
            harvested,
            ..RunReport::default()
        };
        while let Some((path, outcome)) = rx.recv().await {
            match outcome {
                Ok(price) => {
                    info!(
                        path = %path.display(),
                        category = %price.category,
                        usd = price.usd_amount,
                        confidence = ?price.confidence,
                        "Accepted"
                    );
                    report.accepted += 1;
                    if price.confidence == RateConfidence::Fallback {
                        report.fallback_accepted += 1;
                    }
                    aggregator.add(price);
                }
                Err(reason) => {
                    match &reason {
                        SkipReason::Extraction(e) => {
                            warn!(
                                path = %path.display(),
                                reason = %e,
                                "Extraction failed, skipping"
                            )
                        }
                        other => info!(path = %path.display(), reason = %other, "Skipped"),
                    }
                    *report.skipped.entry(reason.label()).or_insert(0) += 1;
                }
            }
        }
        (aggregator, report)
    });

    let semaphore = Arc::new(Semaphore::new(workers));
    for file in files {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let tx = tx.clone();
        let config = config.clone();
        let span = info_span!("document", path = %file.path.display());

        tokio::spawn(
            async move {
                let _permit = permit;
                let path = file.path.clone();
                let blocking_span = tracing::Span::current();
                let outcome = within_budget(budget, move || {
                    let _guard = blocking_span.enter();
                    processor(&file, &config)
                })
                .await;
                let _ = tx.send((path, outcome)).await;
            }
            .instrument(span),
        );
    }
    drop(tx);

    collector
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))
}

/// Run `work` on the blocking pool. Overrunning `budget_secs` or panicking
/// counts as an extraction failure; an overrunning thread is abandoned.
async fn within_budget<F>(budget_secs: u64, work: F) -> Result<NormalizedPrice, SkipReason>
where
    F: FnOnce() -> Result<NormalizedPrice, SkipReason> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(Duration::from_secs(budget_secs), handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(ExtractionError::Worker(e.to_string()).into()),
        Err(_) => Err(ExtractionError::Timeout(budget_secs).into()),
    }
}
