use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::archiver::{archive_stale, ArchiveReport, ArchiveSettings};
use crate::board::{BoardService, TrelloClient};
use crate::categorizer::Categorizer;
use crate::chat::SlackWebhook;
use crate::config::Config;
use crate::dispatch::{DispatchQueue, DispatchStats};
use crate::feed::{FeedSource, RssFeed};
use crate::model::NotificationTask;
use crate::store::DedupStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Age after which dedup entries are forgotten and board cards archived.
    pub retention: chrono::Duration,
    pub archive: ArchiveSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            retention: chrono::Duration::days(7),
            archive: ArchiveSettings::default(),
        }
    }
}

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub swept: usize,
    /// `None` when the archive sweep could not list cards.
    pub archive: Option<ArchiveReport>,
    pub fetched: usize,
    pub already_seen: usize,
    pub carded: Vec<String>,
    pub board_failures: usize,
    pub persisted: bool,
    pub dispatch: DispatchStats,
}

pub struct Pipeline {
    feed: Arc<dyn FeedSource>,
    board: Arc<dyn BoardService>,
    queue: DispatchQueue,
    store: DedupStore,
    categorizer: Categorizer,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        board: Arc<dyn BoardService>,
        queue: DispatchQueue,
        store: DedupStore,
        categorizer: Categorizer,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            feed,
            board,
            queue,
            store,
            categorizer,
            settings,
        }
    }

    /// Wire the Trello, Slack and RSS adapters from configuration.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let chat = Arc::new(SlackWebhook::from_config(cfg)?);
        let queue = DispatchQueue::new(chat, cfg.slack.rate_limit.min_interval());
        Ok(Self::new(
            Arc::new(RssFeed::from_config(cfg)),
            Arc::new(TrelloClient::from_config(cfg)),
            queue,
            DedupStore::new(cfg.processed_jobs_path()),
            Categorizer::from_config(&cfg.categories),
            PipelineSettings {
                retention: cfg.retention_window(),
                archive: ArchiveSettings {
                    batch_size: cfg.slack.rate_limit.batch_size,
                    pause: cfg.slack.rate_limit.batch_pause(),
                },
            },
        ))
    }

    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    pub async fn run(&self) -> RunReport {
        self.run_at(Utc::now()).await
    }

    /// One full pass. `now` anchors the retention cutoffs; admissions are
    /// stamped with the wall clock. Never fails: every stage logs its own
    /// errors and the run moves on.
    #[instrument(skip_all)]
    pub async fn run_at(&self, now: DateTime<Utc>) -> RunReport {
        let mut report = RunReport::default();

        if let Err(err) = self.board.initialize().await {
            error!(?err, "board initialization failed");
        }

        report.swept = self.store.cleanup(self.settings.retention, now).await;

        let archived = archive_stale(
            self.board.as_ref(),
            self.settings.retention,
            now,
            self.settings.archive,
        )
        .await;
        match archived {
            Ok(archived) => report.archive = Some(archived),
            Err(err) => error!(?err, "card archiving failed"),
        }

        let mut snapshot = self.store.load().await;
        let jobs = match self.feed.fetch_jobs().await {
            Ok(jobs) => jobs,
            Err(err) => {
                error!(?err, "failed to fetch feed");
                Vec::new()
            }
        };
        report.fetched = jobs.len();

        let (new_jobs, seen): (Vec<_>, Vec<_>) =
            jobs.into_iter().partition(|job| snapshot.is_new(&job.id));
        report.already_seen = seen.len();
        info!(fetched = report.fetched, new = new_jobs.len(), "filtered feed");

        for job in new_jobs {
            // a feed may repeat an id within one fetch
            if !snapshot.is_new(&job.id) {
                report.already_seen += 1;
                continue;
            }
            let (category, priority) = self.categorizer.categorize(&job);
            match self.board.create_card(&job, category, priority).await {
                Ok(card_id) => {
                    info!(
                        id = %job.id,
                        card_id = %card_id,
                        category = category.as_str(),
                        priority = priority.as_str(),
                        "added card"
                    );
                    snapshot.admit(&job.id, Utc::now());
                    report.carded.push(job.id.clone());
                    self.queue.enqueue(NotificationTask {
                        record: job,
                        category,
                        priority,
                    });
                }
                Err(err) => {
                    warn!(?err, id = %job.id, "failed to add card; skipping");
                    report.board_failures += 1;
                }
            }
        }

        report.persisted = self.store.persist(&snapshot).await;
        report.dispatch = self.queue.wait_for_drain().await;
        info!(
            carded = report.carded.len(),
            delivered = report.dispatch.delivered,
            dropped = report.dispatch.dropped,
            "run complete"
        );
        report
    }
}
