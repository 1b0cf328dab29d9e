//! Snowflake warehouse client implementation.
//!
//! Talks to Snowflake over the connector REST protocol: a password login that
//! yields a session token, then one `query-request` per statement with the
//! result delivered as JSON row arrays. Geography columns come back as GeoJSON
//! text because the session pins `GEOGRAPHY_OUTPUT_FORMAT`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::config::WarehouseConfig;
use crate::error::{AtlasError, Result};
use crate::warehouse::{ColumnInfo, Row, RowSet, Value, WarehouseBackend, WarehouseClient};

/// Client identifier reported at login.
const CLIENT_APP_ID: &str = "sales-atlas";

/// Maximum number of login attempts for transient transport errors.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between login attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Delay between polls of a statement that is still running.
const POLL_INTERVAL_MS: u64 = 500;

/// Response codes meaning the statement is still executing.
const QUERY_IN_PROGRESS_CODES: [&str; 2] = ["333333", "333334"];

/// Response codes for a session token that is expired or no longer valid.
const SESSION_EXPIRED_CODES: [&str; 2] = ["390112", "390114"];

/// Snowflake warehouse client holding one authenticated session.
#[derive(Debug)]
pub struct SnowflakeWarehouse {
    client: Client,
    base_url: Url,
    token: String,
    query_timeout: Duration,
    sequence: AtomicU64,
}

/// Common envelope wrapping every Snowflake REST response.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    success: bool,
}

impl Envelope {
    fn failure_message(&self) -> String {
        let message = self.message.as_deref().unwrap_or("unknown error");
        match &self.code {
            Some(code) => format!("{message} (code {code})"),
            None => message.to_string(),
        }
    }

    fn is_in_progress(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| QUERY_IN_PROGRESS_CODES.contains(&code))
    }

    fn is_session_expired(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| SESSION_EXPIRED_CODES.contains(&code))
    }

    /// Maps an unsuccessful statement response to an error.
    fn into_error(self) -> AtlasError {
        if self.is_session_expired() {
            AtlasError::connection(format!(
                "Snowflake session is no longer valid: {}",
                self.failure_message()
            ))
        } else {
            AtlasError::query(self.failure_message())
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    #[serde(default)]
    rowtype: Vec<RowType>,
    #[serde(default)]
    rowset: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    chunks: Vec<ChunkInfo>,
    #[serde(default)]
    chunk_headers: HashMap<String, String>,
    #[serde(default)]
    query_id: Option<String>,
    #[serde(default)]
    get_result_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RowType {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    scale: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkInfo {
    url: String,
    #[serde(default)]
    row_count: usize,
}

impl SnowflakeWarehouse {
    /// Logs in and returns a client bound to the new session.
    ///
    /// Transport failures (timeouts, refused connections) are retried with
    /// exponential backoff; a rejected login is not.
    pub async fn connect(config: &WarehouseConfig, password: Option<&str>) -> Result<Self> {
        let account = config
            .account
            .as_deref()
            .ok_or_else(|| AtlasError::config("Snowflake account is required"))?;
        let user = config
            .user
            .as_deref()
            .ok_or_else(|| AtlasError::config("Snowflake user is required"))?;
        let password =
            password.ok_or_else(|| AtlasError::config("Snowflake password is required"))?;

        let base_url = base_url(account, config.host.as_deref())?;
        let query_timeout = Duration::from_secs(config.query_timeout_secs);

        let client = Client::builder()
            .timeout(query_timeout + Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("sales-atlas/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AtlasError::connection(format!("Failed to create HTTP client: {e}")))?;

        let mut login_url = base_url
            .join("session/v1/login-request")
            .map_err(|e| AtlasError::config(format!("Invalid Snowflake URL: {e}")))?;
        {
            let mut pairs = login_url.query_pairs_mut();
            pairs.append_pair("warehouse", &config.warehouse);
            pairs.append_pair("roleName", &config.role);
            if let Some(database) = &config.database {
                pairs.append_pair("databaseName", database);
            }
            if let Some(schema) = &config.schema {
                pairs.append_pair("schemaName", schema);
            }
        }

        let body = json!({
            "data": {
                "CLIENT_APP_ID": CLIENT_APP_ID,
                "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
                "ACCOUNT_NAME": account_name(account),
                "LOGIN_NAME": user,
                "PASSWORD": password,
                "SESSION_PARAMETERS": {
                    "QUERY_RESULT_FORMAT": "JSON",
                    "GEOGRAPHY_OUTPUT_FORMAT": "GeoJSON",
                },
            }
        });

        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        let response = loop {
            debug!("Snowflake login attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            match client
                .post(login_url.clone())
                .header("Accept", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(response) => break response,
                Err(e) if is_transient_error(&e) && attempt < MAX_RETRY_ATTEMPTS => {
                    warn!(
                        "Snowflake login attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(map_connection_error(&e, account)),
            }
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AtlasError::connection(format!("Failed to read login response: {e}")))?;

        if !status.is_success() {
            return Err(AtlasError::connection(format!(
                "Snowflake login to '{account}' failed with HTTP {status}"
            )));
        }

        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|e| AtlasError::connection(format!("Unexpected login response: {e}")))?;

        if !envelope.success {
            return Err(AtlasError::connection(format!(
                "Snowflake login for user '{user}' rejected: {}",
                envelope.failure_message()
            )));
        }

        let login: LoginData = serde_json::from_value(envelope.data)
            .map_err(|e| AtlasError::connection(format!("Login response missing token: {e}")))?;

        debug!("Snowflake session established");

        Ok(Self {
            client,
            base_url,
            token: login.token,
            query_timeout,
            sequence: AtomicU64::new(0),
        })
    }

    fn authorization(&self) -> String {
        format!("Snowflake Token=\"{}\"", self.token)
    }

    /// Submits a statement and waits for its first result page.
    async fn submit(&self, sql: &str) -> Result<QueryData> {
        let mut url = self
            .base_url
            .join("queries/v1/query-request")
            .map_err(|e| AtlasError::internal(format!("Invalid query URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("requestId", &uuid::Uuid::new_v4().to_string());

        let submission_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        let body = json!({
            "sqlText": sql,
            "asyncExec": false,
            "sequenceId": self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            "querySubmissionTime": submission_time,
        });

        let response = self
            .client
            .post(url)
            .header("Authorization", self.authorization())
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_request_error(&e, "submit statement"))?;

        let mut envelope = read_envelope(response).await?;
        let deadline = Instant::now() + self.query_timeout;

        while envelope.is_in_progress() {
            let pending: QueryData = serde_json::from_value(envelope.data).unwrap_or_default();
            let result_url = pending.get_result_url.ok_or_else(|| {
                AtlasError::query("Statement still running but no result URL was returned")
            })?;

            if Instant::now() >= deadline {
                return Err(AtlasError::query(format!(
                    "Query timed out after {} seconds",
                    self.query_timeout.as_secs()
                )));
            }

            debug!(
                "Statement {} still running, polling",
                pending.query_id.as_deref().unwrap_or("?")
            );
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;

            let poll_url = self
                .base_url
                .join(result_url.trim_start_matches('/'))
                .map_err(|e| AtlasError::query(format!("Invalid result URL: {e}")))?;

            let response = self
                .client
                .get(poll_url)
                .header("Authorization", self.authorization())
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|e| map_request_error(&e, "poll statement"))?;

            envelope = read_envelope(response).await?;
        }

        if !envelope.success {
            return Err(envelope.into_error());
        }

        serde_json::from_value(envelope.data)
            .map_err(|e| AtlasError::query(format!("Unexpected result payload: {e}")))
    }

    /// Downloads one result chunk; chunk bodies omit the enclosing brackets.
    async fn fetch_chunk(
        &self,
        chunk: &ChunkInfo,
        headers: &HashMap<String, String>,
    ) -> Result<Vec<Vec<serde_json::Value>>> {
        let mut request = self.client.get(&chunk.url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_request_error(&e, "download result chunk"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AtlasError::query(format!(
                "Result chunk download failed with HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AtlasError::query(format!("Failed to read result chunk: {e}")))?;

        parse_chunk(&body)
    }
}

#[async_trait]
impl WarehouseClient for SnowflakeWarehouse {
    fn backend(&self) -> WarehouseBackend {
        WarehouseBackend::Snowflake
    }

    async fn execute_query(&self, sql: &str) -> Result<RowSet> {
        let start = Instant::now();

        let mut data = tokio::time::timeout(self.query_timeout, self.submit(sql))
            .await
            .map_err(|_| {
                AtlasError::query(format!(
                    "Query timed out after {} seconds",
                    self.query_timeout.as_secs()
                ))
            })??;

        let chunks = std::mem::take(&mut data.chunks);
        for chunk in &chunks {
            debug!("Fetching result chunk of {} rows", chunk.row_count);
            let rows = self.fetch_chunk(chunk, &data.chunk_headers).await?;
            data.rowset.extend(rows);
        }

        let row_set = convert_result(&data)?.with_execution_time(start.elapsed());
        Ok(row_set)
    }

    async fn close(&self) -> Result<()> {
        let mut url = self
            .base_url
            .join("session")
            .map_err(|e| AtlasError::internal(format!("Invalid session URL: {e}")))?;
        url.query_pairs_mut().append_pair("delete", "true");

        let response = self
            .client
            .post(url)
            .header("Authorization", self.authorization())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AtlasError::connection(format!("Failed to close session: {e}")))?;

        if !response.status().is_success() {
            return Err(AtlasError::connection(format!(
                "Closing session failed with HTTP {}",
                response.status()
            )));
        }

        debug!("Snowflake session closed");
        Ok(())
    }
}

/// Reads a statement response into its envelope, mapping HTTP-level failures.
async fn read_envelope(response: reqwest::Response) -> Result<Envelope> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| AtlasError::query(format!("Failed to read response: {e}")))?;

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(AtlasError::connection(format!(
            "Snowflake rejected the session token (HTTP {status})"
        )));
    }
    if !status.is_success() {
        return Err(AtlasError::query(format!(
            "Snowflake API error ({status}): {text}"
        )));
    }

    serde_json::from_str(&text)
        .map_err(|e| AtlasError::query(format!("Failed to parse response: {e}")))
}

/// Builds the account base URL, honouring an explicit host override.
fn base_url(account: &str, host: Option<&str>) -> Result<Url> {
    let raw = match host {
        Some(host) if host.contains("://") => host.to_string(),
        Some(host) => format!("https://{host}"),
        None => {
            let valid = Regex::new(r"^[A-Za-z0-9_.-]+$")
                .map_err(|e| AtlasError::internal(format!("Invalid account pattern: {e}")))?;
            if !valid.is_match(account) {
                return Err(AtlasError::config(format!(
                    "Invalid Snowflake account identifier '{account}'"
                )));
            }
            format!("https://{account}.snowflakecomputing.com")
        }
    };

    let normalised = format!("{}/", raw.trim_end_matches('/'));
    Url::parse(&normalised)
        .map_err(|e| AtlasError::config(format!("Invalid Snowflake URL '{raw}': {e}")))
}

/// Returns the account name without region or cloud qualifiers.
fn account_name(account: &str) -> String {
    account
        .split('.')
        .next()
        .unwrap_or(account)
        .to_uppercase()
}

/// Parses a chunk body of comma-separated row arrays.
fn parse_chunk(body: &str) -> Result<Vec<Vec<serde_json::Value>>> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&format!("[{trimmed}]"))
        .map_err(|e| AtlasError::query(format!("Failed to parse result chunk: {e}")))
}

/// Converts the JSON result payload into a row set, typing cells by rowtype.
fn convert_result(data: &QueryData) -> Result<RowSet> {
    let columns: Vec<ColumnInfo> = data
        .rowtype
        .iter()
        .map(|col| ColumnInfo::new(col.name.clone(), col.type_name.clone()))
        .collect();

    let rows = data
        .rowset
        .iter()
        .enumerate()
        .map(|(index, cells)| {
            if cells.len() != data.rowtype.len() {
                return Err(AtlasError::query(format!(
                    "Row {index} has {} cells but {} columns were declared",
                    cells.len(),
                    data.rowtype.len()
                )));
            }
            Ok(cells
                .iter()
                .zip(&data.rowtype)
                .map(|(cell, column)| convert_cell(cell, column))
                .collect::<Row>())
        })
        .collect::<Result<Vec<Row>>>()?;

    Ok(RowSet::with_data(columns, rows))
}

/// Converts one JSON cell according to its declared Snowflake type.
fn convert_cell(cell: &serde_json::Value, column: &RowType) -> Value {
    match cell {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        serde_json::Value::String(s) => convert_text(s, column),
        other => Value::String(other.to_string()),
    }
}

fn convert_text(text: &str, column: &RowType) -> Value {
    match column.type_name.to_lowercase().as_str() {
        "fixed" if column.scale.unwrap_or(0) == 0 => text
            .parse::<i64>()
            .map(Value::Int)
            .or_else(|_| text.parse::<f64>().map(Value::Float))
            .unwrap_or_else(|_| Value::String(text.to_string())),
        "fixed" | "real" => text
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        "boolean" => match text {
            "1" | "true" | "TRUE" => Value::Bool(true),
            "0" | "false" | "FALSE" => Value::Bool(false),
            _ => Value::String(text.to_string()),
        },
        _ => Value::String(text.to_string()),
    }
}

/// Determines if a transport error is worth retrying.
fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Maps a transport error on an open session.
///
/// An unreachable endpoint ends the session; anything else fails only the
/// statement.
fn map_request_error(error: &reqwest::Error, action: &str) -> AtlasError {
    if error.is_connect() {
        AtlasError::connection(format!("Failed to {action}: Snowflake is unreachable ({error})"))
    } else {
        AtlasError::query(format!("Failed to {action}: {error}"))
    }
}

/// Maps transport errors during login to user-friendly messages.
fn map_connection_error(error: &reqwest::Error, account: &str) -> AtlasError {
    if error.is_connect() {
        AtlasError::connection(format!(
            "Cannot reach Snowflake account '{account}'. Check the account identifier and network."
        ))
    } else if error.is_timeout() {
        AtlasError::connection(format!(
            "Login to Snowflake account '{account}' timed out."
        ))
    } else {
        AtlasError::connection(error.to_string())
    }
}
