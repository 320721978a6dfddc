use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, TrelloLists};
use crate::error::{check_response, DeliveryError};
use crate::model::{BoardCard, BudgetCategory, JobRecord, Priority};

const TRELLO_API_BASE: &str = "https://api.trello.com/";
const SINK: &str = "trello";
const LIST_POS_STEP: f64 = 16384.0;

/// Kanban board that receives one card per new posting.
#[async_trait]
pub trait BoardService: Send + Sync {
    /// Make sure every category has a list, in category order.
    async fn initialize(&self) -> Result<()>;

    /// Create a card at the top of the category's list. Returns the card id.
    async fn create_card(
        &self,
        record: &JobRecord,
        category: BudgetCategory,
        priority: Priority,
    ) -> Result<String, DeliveryError>;

    async fn list_cards(&self) -> Result<Vec<BoardCard>, DeliveryError>;

    async fn close_card(&self, card: &BoardCard) -> Result<(), DeliveryError>;
}

pub struct TrelloClient {
    http: Client,
    base_url: Url,
    api_key: String,
    token: String,
    board_id: String,
    lists: RwLock<TrelloLists>,
}

impl fmt::Debug for TrelloClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrelloClient")
            .field("base_url", &self.base_url)
            .field("board_id", &self.board_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TrelloList {
    id: String,
    name: String,
    #[serde(default)]
    pos: f64,
}

#[derive(Deserialize)]
struct CreatedResponse {
    id: String,
}

impl TrelloClient {
    pub fn new(api_key: String, token: String, board_id: String, lists: TrelloLists) -> Self {
        let base_url = Url::parse(TRELLO_API_BASE).expect("valid default Trello URL");
        Self::with_base_url(api_key, token, board_id, lists, base_url, Duration::from_secs(30))
    }

    pub fn from_config(cfg: &Config) -> Self {
        let base_url = Url::parse(TRELLO_API_BASE).expect("valid default Trello URL");
        Self::with_base_url(
            cfg.trello.api_key.clone(),
            cfg.trello.token.clone(),
            cfg.trello.board_id.clone(),
            cfg.trello.lists.clone(),
            base_url,
            cfg.http_timeout(),
        )
    }

    pub fn with_base_url(
        api_key: String,
        token: String,
        board_id: String,
        lists: TrelloLists,
        base_url: Url,
        timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .user_agent("job-relay/0.1")
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
            token,
            board_id,
            lists: RwLock::new(lists),
        }
    }

    /// Build an authenticated request against `path` (relative to `/1/`).
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let mut endpoint = self
            .base_url
            .join("1/")
            .and_then(|u| u.join(path))
            .context("invalid Trello base URL")?;
        endpoint
            .query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("token", &self.token);
        Ok(self.http.request(method, endpoint))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, DeliveryError> {
        let res = builder
            .send()
            .await
            .map_err(|source| DeliveryError::Transport { sink: SINK, source })?;
        check_response(SINK, res).await
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, DeliveryError> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| DeliveryError::Decode {
                sink: SINK,
                message: e.to_string(),
            })
    }

    fn build(&self, method: Method, path: &str) -> Result<RequestBuilder, DeliveryError> {
        self.request(method, path).map_err(|e| DeliveryError::Decode {
            sink: SINK,
            message: e.to_string(),
        })
    }

    async fn board_lists(&self) -> Result<Vec<TrelloList>, DeliveryError> {
        let path = format!("boards/{}/lists", self.board_id);
        self.send_json(self.build(Method::GET, &path)?).await
    }

    async fn create_list(&self, name: &str) -> Result<TrelloList, DeliveryError> {
        let body = json!({
            "name": name,
            "idBoard": self.board_id,
            "pos": "bottom",
        });
        self.send_json(self.build(Method::POST, "lists")?.json(&body))
            .await
    }

    async fn update_list_position(&self, list_id: &str, pos: f64) -> Result<(), DeliveryError> {
        let path = format!("lists/{}", list_id);
        self.send(self.build(Method::PUT, &path)?.json(&json!({ "pos": pos })))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BoardService for TrelloClient {
    #[instrument(skip_all, fields(board = %self.board_id))]
    async fn initialize(&self) -> Result<()> {
        let mut existing = self
            .board_lists()
            .await
            .context("failed to fetch board lists")?;

        let mut lists = self.lists.write().await;
        for category in BudgetCategory::ALL {
            if !list_id(&lists, category).is_empty() {
                continue;
            }
            let found = existing
                .iter()
                .find(|l| l.name.eq_ignore_ascii_case(category.label()))
                .map(|l| l.id.clone());
            let id = match found {
                Some(id) => id,
                None => {
                    let created = self
                        .create_list(category.label())
                        .await
                        .with_context(|| format!("failed to create list {}", category.label()))?;
                    info!(list = category.label(), id = %created.id, "created board list");
                    let id = created.id.clone();
                    existing.push(created);
                    id
                }
            };
            set_list_id(&mut lists, category, id);
        }

        for (id, pos) in reorder_plan(&lists, &existing) {
            if let Err(err) = self.update_list_position(&id, pos).await {
                warn!(?err, list = %id, "failed to update list position");
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(id = %record.id, category = category.as_str()))]
    async fn create_card(
        &self,
        record: &JobRecord,
        category: BudgetCategory,
        priority: Priority,
    ) -> Result<String, DeliveryError> {
        let list = list_id(&*self.lists.read().await, category).to_string();
        let body = build_card_request(&list, record, priority);
        debug!(payload = %body, "creating trello card");
        let created: CreatedResponse = self
            .send_json(self.build(Method::POST, "cards")?.json(&body))
            .await?;
        Ok(created.id)
    }

    async fn list_cards(&self) -> Result<Vec<BoardCard>, DeliveryError> {
        let path = format!("boards/{}/cards", self.board_id);
        self.send_json(self.build(Method::GET, &path)?).await
    }

    async fn close_card(&self, card: &BoardCard) -> Result<(), DeliveryError> {
        let path = format!("cards/{}", card.id);
        self.send(self.build(Method::PUT, &path)?.json(&json!({ "closed": true })))
            .await?;
        Ok(())
    }
}

pub fn list_id(lists: &TrelloLists, category: BudgetCategory) -> &str {
    match category {
        BudgetCategory::QuickWins => &lists.quick_wins,
        BudgetCategory::MediumProjects => &lists.medium_projects,
        BudgetCategory::HighValue => &lists.high_value,
    }
}

fn set_list_id(lists: &mut TrelloLists, category: BudgetCategory, id: String) {
    match category {
        BudgetCategory::QuickWins => lists.quick_wins = id,
        BudgetCategory::MediumProjects => lists.medium_projects = id,
        BudgetCategory::HighValue => lists.high_value = id,
    }
}

/// Position updates needed so the category lists read left to right in
/// category order. Empty when they already do.
fn reorder_plan(lists: &TrelloLists, existing: &[TrelloList]) -> Vec<(String, f64)> {
    let current: Vec<(String, Option<f64>)> = BudgetCategory::ALL
        .iter()
        .map(|c| {
            let id = list_id(lists, *c).to_string();
            let pos = existing.iter().find(|l| l.id == id).map(|l| l.pos);
            (id, pos)
        })
        .collect();

    let ordered = current
        .windows(2)
        .all(|w| matches!((w[0].1, w[1].1), (Some(a), Some(b)) if a < b));
    if ordered {
        return Vec::new();
    }
    current
        .into_iter()
        .enumerate()
        .map(|(i, (id, _))| (id, (i as f64 + 1.0) * LIST_POS_STEP))
        .collect()
}

/// Card payload for a posting. New cards always go to the top of the list.
pub fn build_card_request(list_id: &str, record: &JobRecord, priority: Priority) -> Value {
    json!({
        "idList": list_id,
        "name": format!("[{}] {}", priority.as_str().to_uppercase(), record.title),
        "desc": card_description(record),
        "pos": "top",
    })
}

fn card_description(record: &JobRecord) -> String {
    let (status_emoji, status) = if record.client_verified {
        ("✅", "Payment Verified")
    } else {
        ("⚠️", "Not Verified")
    };
    format!(
        "{summary}\n\n{status_emoji} Client Status: {status}\n💰 Budget: {budget}\n💵 Client Spent: ${spent}\n🔗 [Apply Here]({url})",
        summary = record.summary,
        budget = record.budget_display(),
        spent = record.client_spent,
        url = record.url,
    )
    .trim()
    .to_string()
}
