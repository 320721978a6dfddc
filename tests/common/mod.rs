#![allow(dead_code)]

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use job_relay::board::BoardService;
use job_relay::chat::ChatService;
use job_relay::error::DeliveryError;
use job_relay::feed::FeedSource;
use job_relay::model::{BoardCard, BudgetCategory, JobRecord, NotificationTask, Priority};
use reqwest::StatusCode;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub fn job(id: &str, budget: f64, verified: bool, spent: f64) -> JobRecord {
    JobRecord {
        id: id.into(),
        title: format!("Job {id}"),
        summary: format!("Summary for {id}"),
        url: format!("https://example.com/jobs/{id}"),
        budget,
        client_verified: verified,
        client_spent: spent,
    }
}

pub fn task(id: &str) -> NotificationTask {
    NotificationTask {
        record: job(id, 100.0, true, 0.0),
        category: BudgetCategory::QuickWins,
        priority: Priority::Medium,
    }
}

pub fn rate_limited(retry_after: Option<Duration>) -> DeliveryError {
    DeliveryError::RateLimited {
        sink: "slack",
        retry_after,
    }
}

pub fn server_error() -> DeliveryError {
    DeliveryError::Status {
        sink: "test",
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "boom".into(),
    }
}

/// Chat sink that replays scripted outcomes (then succeeds) and records
/// every attempt with its time.
#[derive(Clone, Default)]
pub struct RecordingChat {
    responses: Arc<Mutex<VecDeque<Result<(), DeliveryError>>>>,
    calls: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl RecordingChat {
    pub fn with_responses(responses: Vec<Result<(), DeliveryError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    pub async fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().await.clone()
    }

    pub async fn call_ids(&self) -> Vec<String> {
        self.calls.lock().await.iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait::async_trait]
impl ChatService for RecordingChat {
    async fn post(&self, task: &NotificationTask) -> Result<(), DeliveryError> {
        self.calls
            .lock()
            .await
            .push((task.record.id.clone(), Instant::now()));
        self.responses.lock().await.pop_front().unwrap_or(Ok(()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedCard {
    pub id: String,
    pub category: BudgetCategory,
    pub priority: Priority,
}

/// Board sink backed by in-memory state.
#[derive(Clone, Default)]
pub struct RecordingBoard {
    pub cards: Arc<Mutex<Vec<BoardCard>>>,
    create_responses: Arc<Mutex<VecDeque<Result<String, DeliveryError>>>>,
    created: Arc<Mutex<Vec<CreatedCard>>>,
    close_calls: Arc<Mutex<Vec<(String, Instant)>>>,
    failing_closes: Arc<Mutex<HashSet<String>>>,
    fail_initialize: bool,
    fail_listing: bool,
    close_latency: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl RecordingBoard {
    pub fn with_cards(cards: Vec<BoardCard>) -> Self {
        Self {
            cards: Arc::new(Mutex::new(cards)),
            close_latency: Duration::from_millis(10),
            ..Default::default()
        }
    }

    pub fn with_create_responses(responses: Vec<Result<String, DeliveryError>>) -> Self {
        Self {
            create_responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    pub fn failing_setup(mut self) -> Self {
        self.fail_initialize = true;
        self.fail_listing = true;
        self
    }

    pub async fn fail_close(&self, card_id: &str) {
        self.failing_closes.lock().await.insert(card_id.to_string());
    }

    pub async fn created(&self) -> Vec<CreatedCard> {
        self.created.lock().await.clone()
    }

    pub async fn close_calls(&self) -> Vec<(String, Instant)> {
        self.close_calls.lock().await.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BoardService for RecordingBoard {
    async fn initialize(&self) -> Result<()> {
        if self.fail_initialize {
            return Err(anyhow!("board unavailable"));
        }
        Ok(())
    }

    async fn create_card(
        &self,
        record: &JobRecord,
        category: BudgetCategory,
        priority: Priority,
    ) -> Result<String, DeliveryError> {
        let response = self
            .create_responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(format!("card-{}", record.id)));
        if response.is_ok() {
            self.created.lock().await.push(CreatedCard {
                id: record.id.clone(),
                category,
                priority,
            });
        }
        response
    }

    async fn list_cards(&self) -> Result<Vec<BoardCard>, DeliveryError> {
        if self.fail_listing {
            return Err(server_error());
        }
        Ok(self.cards.lock().await.clone())
    }

    async fn close_card(&self, card: &BoardCard) -> Result<(), DeliveryError> {
        self.close_calls
            .lock()
            .await
            .push((card.id.clone(), Instant::now()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.close_latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_closes.lock().await.contains(&card.id) {
            return Err(server_error());
        }
        if let Some(c) = self.cards.lock().await.iter_mut().find(|c| c.id == card.id) {
            c.closed = true;
        }
        Ok(())
    }
}

/// Feed returning a fixed list, or an error.
pub struct StaticFeed {
    jobs: Option<Vec<JobRecord>>,
}

impl StaticFeed {
    pub fn new(jobs: Vec<JobRecord>) -> Self {
        Self { jobs: Some(jobs) }
    }

    pub fn failing() -> Self {
        Self { jobs: None }
    }
}

#[async_trait::async_trait]
impl FeedSource for StaticFeed {
    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>> {
        self.jobs.clone().ok_or_else(|| anyhow!("feed down"))
    }
}

pub fn card(id: &str, last_activity: DateTime<Utc>) -> BoardCard {
    BoardCard {
        id: id.into(),
        name: format!("card {id}"),
        last_activity,
        closed: false,
    }
}
