//! Sweep coordinator: fans site probes out over a fixed pool of workers.

use crate::config::DEFAULT_CONCURRENCY;
use crate::error::{Result, SweepError};
use crate::sweep::enumerator::{list_sites, EnumerateOptions};
use crate::sweep::identity::IdentityMatcher;
use crate::sweep::model::{SiteDescriptor, SiteError, SiteOutcome, StopReason, SweepResult};
use crate::sweep::probe::{probe_site, ProbeOptions, ProbeReport};
use crate::sweep::provider::TenantSession;
use chrono::Utc;
use futures::{FutureExt, StreamExt};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct SweepOptions {
    pub concurrency: usize,
    pub include_personal_sites: bool,
    pub max_sites: Option<usize>,
    pub remove_on_match: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            include_personal_sites: false,
            max_sites: None,
            remove_on_match: false,
        }
    }
}

/// Snapshot handed to the progress callback after every completed site
#[derive(Debug, Clone)]
pub struct SweepProgress {
    pub sites_completed: usize,
    pub matches_found: usize,
    pub elapsed: Duration,
    pub site_url: String,
    pub outcome: SiteOutcome,
}

pub type ProgressFn = Arc<dyn Fn(&SweepProgress) + Send + Sync>;

pub struct SweepCoordinator {
    tenant: Arc<dyn TenantSession>,
    target: Arc<IdentityMatcher>,
    options: SweepOptions,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl SweepCoordinator {
    pub fn new(
        tenant: Arc<dyn TenantSession>,
        target: Arc<IdentityMatcher>,
        options: SweepOptions,
    ) -> Self {
        Self {
            tenant,
            target,
            options,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the sweep to completion, cap or cancellation.
    ///
    /// Fails only when the target is empty or the site list fails before any site was
    /// dispatched. Per-site failures end up in `SweepResult::errors`.
    pub async fn run(self) -> Result<SweepResult> {
        if self.target.is_empty() {
            return Err(SweepError::InvalidConfig(
                "at least one target identity is required".into(),
            ));
        }

        let workers = self.options.concurrency.max(1);
        let started_at = Utc::now();
        let start = Instant::now();

        tracing::info!(
            targets = ?self.target.targets(),
            strategy = %self.target.strategy(),
            workers,
            remove = self.options.remove_on_match,
            "Starting sweep"
        );

        let (tx, rx) = mpsc::channel::<SiteDescriptor>(workers);
        let rx = Arc::new(Mutex::new(rx));
        let completed = Arc::new(AtomicUsize::new(0));
        let matches_found = Arc::new(AtomicUsize::new(0));
        let probe_options = ProbeOptions {
            remove_on_match: self.options.remove_on_match,
        };

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let rx = rx.clone();
            let tenant = self.tenant.clone();
            let target = self.target.clone();
            let cancel = self.cancel.clone();
            let progress = self.progress.clone();
            let completed = completed.clone();
            let matches_found = matches_found.clone();

            handles.push(tokio::spawn(async move {
                let mut output = WorkerOutput::default();
                loop {
                    let site = { rx.lock().await.recv().await };
                    let Some(site) = site else { break };

                    if cancel.is_cancelled() {
                        tracing::debug!(worker_id, site = %site.url, "Cancelled, skipping site");
                        output.skipped.push(site.url);
                        continue;
                    }

                    let finished = AssertUnwindSafe(async {
                        let report =
                            probe_site(tenant.as_ref(), &site, &target, &probe_options).await;

                        let sites_completed = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        let found = matches_found
                            .fetch_add(report.matches.len(), Ordering::SeqCst)
                            + report.matches.len();
                        if let Some(progress) = &progress {
                            progress(&SweepProgress {
                                sites_completed,
                                matches_found: found,
                                elapsed: start.elapsed(),
                                site_url: site.url.clone(),
                                outcome: report.outcome(),
                            });
                        }
                        report
                    })
                    .catch_unwind()
                    .await;

                    match finished {
                        Ok(report) => output.reports.push(report),
                        Err(_) => {
                            tracing::error!(worker_id, site = %site.url, "Probe panicked");
                            output.aborted.push(site);
                        }
                    }
                }
                output
            }));
        }
        // Only workers hold the receiver, so sends fail once every worker has died
        drop(rx);

        let mut sites = list_sites(
            self.tenant.clone(),
            EnumerateOptions {
                include_personal_sites: self.options.include_personal_sites,
                max_sites: self.options.max_sites,
            },
        );

        let mut dispatched = 0usize;
        let mut handed_out: Vec<SiteDescriptor> = Vec::new();
        let mut stop_reason = StopReason::Exhausted;
        let mut fatal = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    stop_reason = StopReason::Cancelled;
                    break;
                }
                next = sites.next() => next,
            };

            let site = match next {
                None => break,
                Some(Ok(site)) => site,
                Some(Err(e)) if dispatched == 0 => {
                    fatal = Some(e);
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(dispatched, error = %e, "Site listing failed mid-sweep, draining workers");
                    stop_reason = StopReason::EnumerationFailed(e.to_string());
                    break;
                }
            };

            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    stop_reason = StopReason::Cancelled;
                    break;
                }
                sent = tx.send(site.clone()) => sent,
            };
            handed_out.push(site);
            if sent.is_err() {
                tracing::error!("All sweep workers exited early");
                break;
            }
            dispatched += 1;
        }
        drop(tx);

        if stop_reason == StopReason::Exhausted && self.options.max_sites == Some(dispatched) {
            stop_reason = StopReason::SiteCap;
        }

        let mut reports = Vec::with_capacity(dispatched);
        let mut skipped: Vec<String> = Vec::new();
        let mut aborted: Vec<SiteDescriptor> = Vec::new();
        let mut failed_workers = 0usize;
        for handle in handles {
            match handle.await {
                Ok(output) => {
                    reports.extend(output.reports);
                    skipped.extend(output.skipped);
                    aborted.extend(output.aborted);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Sweep worker panicked");
                    failed_workers += 1;
                }
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        // Sites handed to a worker that died before reporting them
        let lost: Vec<SiteDescriptor> = if failed_workers > 0 {
            stop_reason = StopReason::WorkerFailed(failed_workers);
            let finished: HashSet<&str> = reports
                .iter()
                .map(|r| r.site.url.as_str())
                .chain(skipped.iter().map(String::as_str))
                .chain(aborted.iter().map(|s| s.url.as_str()))
                .collect();
            handed_out
                .into_iter()
                .filter(|s| !finished.contains(s.url.as_str()))
                .collect()
        } else {
            Vec::new()
        };

        let mut result = SweepResult {
            targets: self.target.targets().to_vec(),
            strategy: self.target.strategy(),
            removal_enabled: self.options.remove_on_match,
            started_at,
            sites_scanned: 0,
            sites_with_match: 0,
            sites_inconclusive: 0,
            matches: Vec::new(),
            errors: Vec::new(),
            elapsed: Duration::ZERO,
            stop_reason,
        };

        for report in reports {
            match report.outcome() {
                SiteOutcome::Clean => result.sites_scanned += 1,
                SiteOutcome::Matched => {
                    result.sites_scanned += 1;
                    result.sites_with_match += 1;
                }
                SiteOutcome::Inconclusive => result.sites_inconclusive += 1,
            }
            if let Some(error) = report.site_error() {
                result.errors.push(error);
            }
            result.matches.extend(report.matches);
        }
        for site in aborted {
            result.sites_inconclusive += 1;
            result.errors.push(SiteError {
                site,
                message: "probe aborted: internal error".to_string(),
                unreachable: false,
            });
        }
        for site in lost {
            result.sites_inconclusive += 1;
            result.errors.push(SiteError {
                site,
                message: "probe did not finish: sweep worker failed".to_string(),
                unreachable: false,
            });
        }

        result.elapsed = start.elapsed();
        result.finalize();

        tracing::info!(
            scanned = result.sites_scanned,
            matched = result.sites_with_match,
            inconclusive = result.sites_inconclusive,
            matches = result.matches.len(),
            stop = ?result.stop_reason,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Sweep finished"
        );

        Ok(result)
    }
}

#[derive(Default)]
struct WorkerOutput {
    reports: Vec<ProbeReport>,
    /// Sites received after cancellation
    skipped: Vec<String>,
    /// Sites whose probe panicked
    aborted: Vec<SiteDescriptor>,
}

/// Run a sweep without progress reporting or external cancellation
pub async fn run_sweep(
    tenant: Arc<dyn TenantSession>,
    target: IdentityMatcher,
    options: SweepOptions,
) -> Result<SweepResult> {
    SweepCoordinator::new(tenant, Arc::new(target), options)
        .run()
        .await
}
