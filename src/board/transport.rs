use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::models::{Card, ColumnId, MoveIntent};
use crate::errors::TransportError;

/// Persists a move. May be slow, may fail, and calls for the same card may
/// complete in any order.
#[async_trait]
pub trait MoveTransport: Send + Sync {
    async fn move_card(&self, input: &MoveIntent) -> Result<Card, TransportError>;
}

/// Loads the authoritative list for one column.
#[async_trait]
pub trait ColumnFetcher: Send + Sync {
    async fn fetch_column(&self, column: &ColumnId) -> Result<Vec<Card>, TransportError>;
}

// ── HTTP client for the board server ─────────────────────────────────

#[derive(Serialize)]
struct MoveRequestBody<'a> {
    column: &'a str,
    position: usize,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct BoardPayload {
    columns: Vec<ColumnPayload>,
}

#[derive(Deserialize)]
struct ColumnPayload {
    name: ColumnId,
    #[serde(default)]
    issues: Vec<IssuePayload>,
}

#[derive(Deserialize)]
struct IssuePayload {
    issue: Card,
}

/// `reqwest` client against the board server's REST API.
///
/// Moves go to `PATCH /api/issues/:id/move`; column lists come from
/// `GET /api/projects/:id/board`.
#[derive(Clone)]
pub struct HttpBoardClient {
    client: reqwest::Client,
    base_url: String,
    project_id: i64,
}

impl HttpBoardClient {
    pub fn new(base_url: &str, project_id: i64) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, project_id)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, project_id: i64) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
        }
    }

    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a non-2xx response into `TransportError::Status`, preferring the
/// server's `{"error": ...}` message over the raw body.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    Err(TransportError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl MoveTransport for HttpBoardClient {
    async fn move_card(&self, input: &MoveIntent) -> Result<Card, TransportError> {
        let url = self.url(&format!("/api/issues/{}/move", input.card_id));
        tracing::debug!(card_id = %input.card_id, %url, "sending move");
        let resp = self
            .client
            .patch(&url)
            .json(&MoveRequestBody {
                column: input.destination_column_id.as_str(),
                position: input.new_order,
            })
            .send()
            .await?;
        let resp = check_status(resp).await?;
        resp.json::<Card>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ColumnFetcher for HttpBoardClient {
    async fn fetch_column(&self, column: &ColumnId) -> Result<Vec<Card>, TransportError> {
        let url = self.url(&format!("/api/projects/{}/board", self.project_id));
        tracing::debug!(%column, %url, "fetching column");
        let resp = self.client.get(&url).send().await?;
        let resp = check_status(resp).await?;
        let board = resp
            .json::<BoardPayload>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        let col = board
            .columns
            .into_iter()
            .find(|c| &c.name == column)
            .ok_or_else(|| TransportError::ColumnNotFound {
                column: column.to_string(),
            })?;

        let mut cards: Vec<Card> = col.issues.into_iter().map(|i| i.issue).collect();
        cards.sort_by_key(|c| c.order);
        Ok(cards)
    }
}
