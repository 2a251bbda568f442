//! Ledger node access.
//!
//! - [`Transport`]: the live node RPC (smart-contract query and transaction
//!   broadcast). [`HttpTransport`] speaks the JSON/base64 envelope over reqwest.
//! - [`ArchiveSource`]: historical bets, already decoded by the archive
//!   service. [`HttpArchive`] fetches them as JSON.
//! - [`Signer`]: opaque signing capability supplied by the wallet layer.
//! - [`BetProvider`]: one session. Owns the [`BetCache`], routes every call
//!   through [`with_retry`], normalizes identities at ingestion and reconciles
//!   the two sources.
use crate::aggregate;
use crate::bet::{BetRecord, CreateBetInput, Description, HexIdentity, IdentityFormat, Identifier, JoinBetInput, PublishResultInput};
use crate::cache::BetCache;
use crate::capture::CaptureSink;
use crate::codec::{self, CodecError, PackedDate};
use crate::config::ClientConfig;
use crate::node_info::{NodeInfo, decode_active_bet_ids};
use crate::record::{DecodeError, EncodeError};
use crate::retry::{RetryError, with_retry};
use crate::schema::{self, INPUT_ACTIVE_BETS, INPUT_BET_INFO, INPUT_NODE_INFO};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub contract_index: u32,
    pub input_type: u16,
    pub input_size: u32,
    /// Base64 of the raw input bytes.
    pub request_data: String,
}

impl QueryRequest {
    pub fn new(contract_index: u32, input_type: u16, input: &[u8]) -> Self {
        Self {
            contract_index,
            input_type,
            input_size: input.len() as u32,
            request_data: codec::encode_base64(input),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub response_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub encoded_transaction: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastResponse {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub peers_broadcasted: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn query(&self, req: &QueryRequest) -> Result<QueryResponse, TransportError>;
    async fn broadcast(&self, req: &BroadcastRequest) -> Result<BroadcastResponse, TransportError>;
}

/// Bet as published by the archive service: identities already resolved,
/// dates as strings, fees in raw hundredths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedBet {
    pub bet_id: u32,
    pub creator: String,
    pub bet_desc: String,
    pub option_desc: Vec<String>,
    pub oracle_id: Vec<String>,
    pub oracle_fee: Vec<u32>,
    pub open_date: String,
    pub open_time: String,
    pub close_date: String,
    pub close_time: String,
    pub end_date: String,
    pub end_time: String,
    pub amount_per_slot: u64,
    pub max_slots_per_option: u32,
    pub current_bet_state: Vec<u32>,
    #[serde(default)]
    pub result_won_option: Vec<i8>,
    #[serde(default)]
    pub result_oracle_id: Vec<i8>,
}

fn archive_date(field: &'static str, date: &str, time: &str) -> Result<PackedDate, DecodeError> {
    PackedDate::parse(date, time).map_err(|e: CodecError| DecodeError::InvalidFieldRange { field, reason: e.to_string() })
}

fn vote_slots(mut v: Vec<i8>) -> Vec<i8> {
    v.resize(schema::MAX_ORACLES, crate::bet::NOT_VOTED);
    v
}

impl TryFrom<ArchivedBet> for BetRecord {
    type Error = DecodeError;

    fn try_from(a: ArchivedBet) -> Result<Self, Self::Error> {
        let option_count = a.current_bet_state.len();
        if !(1..=schema::MAX_OPTIONS).contains(&option_count) {
            return Err(DecodeError::InvalidFieldRange {
                field: "current_bet_state",
                reason: format!("{option_count} options"),
            });
        }
        if a.oracle_id.len() > schema::MAX_ORACLES || a.result_won_option.len() > schema::MAX_ORACLES {
            return Err(DecodeError::UnresolvableArraySize {
                field: "oracle_id",
                count: a.oracle_id.len().max(a.result_won_option.len()) as u64,
                capacity: schema::MAX_ORACLES,
            });
        }
        let mut oracle_provider_ids = Vec::new();
        let mut oracle_fees = Vec::new();
        for (i, id) in a.oracle_id.into_iter().enumerate() {
            if id.trim().is_empty() {
                continue;
            }
            oracle_provider_ids.push(Identifier::Resolved(id));
            oracle_fees.push(a.oracle_fee.get(i).copied().unwrap_or_default());
        }
        let mut bet = BetRecord {
            id: a.bet_id,
            option_count: option_count as u32,
            creator: Identifier::Resolved(a.creator),
            description: Description::from_wire(a.bet_desc.trim().to_string()),
            option_descriptions: a
                .option_desc
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            oracle_provider_ids,
            oracle_fees,
            open_date: archive_date("open_date", &a.open_date, &a.open_time)?,
            close_date: archive_date("close_date", &a.close_date, &a.close_time)?,
            end_date: archive_date("end_date", &a.end_date, &a.end_time)?,
            amount_per_slot: a.amount_per_slot,
            max_slots_per_option: a.max_slots_per_option,
            selection_counts: a.current_bet_state,
            won_option_votes: vote_slots(a.result_won_option),
            vote_oracle_index: vote_slots(a.result_oracle_id),
            total_selections: 0,
            total_pot: 0,
            betting_odds: Vec::new(),
            resolved_option: crate::bet::NOT_VOTED,
        };
        bet.annotate();
        Ok(bet)
    }
}

#[async_trait]
pub trait ArchiveSource: Send + Sync {
    async fn fetch_bets(&self) -> Result<Vec<ArchivedBet>, TransportError>;
}

/// Opaque signing capability. Receives the contract call and returns the
/// fully signed transaction bytes ready for broadcast.
pub trait Signer: Send + Sync {
    fn sign(&self, call: &ContractCall) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub contract_index: u32,
    pub input_type: u16,
    /// Amount attached to the call, in atomic units.
    pub amount: u64,
    pub payload: Vec<u8>,
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_decode() {
        TransportError::MalformedResponse(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

async fn post_json<Req: Serialize + Sync, Resp: for<'de> Deserialize<'de>>(
    http: &reqwest::Client,
    url: &str,
    body: &Req,
) -> Result<Resp, TransportError> {
    let resp = http
        .post(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .json(body)
        .send()
        .await
        .map_err(classify_reqwest_error)?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TransportError::Status { status: status.as_u16(), body });
    }
    resp.json::<Resp>().await.map_err(classify_reqwest_error)
}

pub struct HttpTransport {
    http: reqwest::Client,
    query_url: String,
    broadcast_url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { http, query_url: config.query_url(), broadcast_url: config.broadcast_url() })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn query(&self, req: &QueryRequest) -> Result<QueryResponse, TransportError> {
        post_json(&self.http, &self.query_url, req).await
    }

    async fn broadcast(&self, req: &BroadcastRequest) -> Result<BroadcastResponse, TransportError> {
        post_json(&self.http, &self.broadcast_url, req).await
    }
}

#[derive(Debug, Deserialize)]
struct ArchivePage {
    bets: Vec<ArchivedBet>,
}

pub struct HttpArchive {
    http: reqwest::Client,
    url: String,
}

impl HttpArchive {
    pub fn new(url: String, config: &ClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl ArchiveSource for HttpArchive {
    async fn fetch_bets(&self) -> Result<Vec<ArchivedBet>, TransportError> {
        let resp = self.http.get(&self.url).send().await.map_err(classify_reqwest_error)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status { status: status.as_u16(), body });
        }
        Ok(resp.json::<ArchivePage>().await.map_err(classify_reqwest_error)?.bets)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Network(#[from] TransportError),
    #[error("{op}: {source}")]
    RetriesExhausted {
        op: &'static str,
        #[source]
        source: RetryError<TransportError>,
    },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("bet {0} not found")]
    NotFound(u32),
    #[error("no archive source configured")]
    NoArchive,
    #[error("signer failed: {0}")]
    Signer(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ClientError {
    /// True when the failure came from the network, as opposed to bad data.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::RetriesExhausted { .. })
    }
}

/// One client session against a node (and optionally an archive).
pub struct BetProvider {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    archive: Option<Arc<dyn ArchiveSource>>,
    identity: Arc<dyn IdentityFormat>,
    cache: BetCache,
    capture: Option<CaptureSink>,
}

impl BetProvider {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            archive: None,
            identity: Arc::new(HexIdentity),
            cache: BetCache::new(),
            capture: None,
        }
    }

    /// HTTP transport and, when configured, HTTP archive.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        let archive = match config.archive_bets_url() {
            Some(url) => Some(Arc::new(HttpArchive::new(url, &config)?) as Arc<dyn ArchiveSource>),
            None => None,
        };
        let mut p = Self::new(config, transport);
        p.archive = archive;
        Ok(p)
    }

    pub fn with_archive(mut self, archive: Arc<dyn ArchiveSource>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityFormat>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_capture(mut self, sink: CaptureSink) -> Self {
        self.capture = Some(sink);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &BetCache {
        &self.cache
    }

    /// Stop capturing and flush the capture file. Returns the number of
    /// response frames written, if capture was on.
    pub fn finish_capture(&mut self) -> Result<Option<u64>, crate::capture::CaptureError> {
        self.capture.take().map(CaptureSink::finish).transpose()
    }

    /// Run one contract query and return the raw response bytes.
    pub async fn query_raw(&self, input_type: u16, input: &[u8]) -> Result<Vec<u8>, ClientError> {
        let req = QueryRequest::new(self.config.contract_index, input_type, input);
        let policy = self.config.retry_policy();
        let resp = with_retry(&policy, "query", || self.transport.query(&req))
            .await
            .map_err(|source| ClientError::RetriesExhausted { op: "query", source })?;
        let bytes = codec::decode_base64(&resp.response_data)
            .map_err(|e| TransportError::MalformedResponse(e.to_string()))?;
        debug!(input_type, len = bytes.len(), "query response");
        if let Some(sink) = &self.capture {
            sink.record(input_type, input, &bytes);
        }
        Ok(bytes)
    }

    pub async fn node_info(&self) -> Result<NodeInfo, ClientError> {
        let buf = self.query_raw(INPUT_NODE_INFO, &[]).await?;
        Ok(NodeInfo::decode(&buf)?.normalize(self.identity.as_ref()))
    }

    pub async fn active_bet_ids(&self) -> Result<Vec<u32>, ClientError> {
        let buf = self.query_raw(INPUT_ACTIVE_BETS, &[]).await?;
        Ok(decode_active_bet_ids(&buf)?)
    }

    /// One bet, from the cache unless `refresh` is set.
    pub async fn bet(&self, id: u32, refresh: bool) -> Result<BetRecord, ClientError> {
        if !refresh {
            if let Some(hit) = self.cache.get(id) {
                debug!(bet_id = id, "cache hit");
                return Ok(hit);
            }
        }
        let buf = self.query_raw(INPUT_BET_INFO, &id.to_le_bytes()).await?;
        // Unknown ids come back zero-filled.
        if codec::read_u32(&buf, 4).map_or(true, |n| n == 0) {
            return Err(ClientError::NotFound(id));
        }
        let bet = BetRecord::decode(&buf)?.normalize(self.identity.as_ref());
        self.cache.put(id, bet.clone());
        Ok(bet)
    }

    /// Every bet on the active list, fetched concurrently. Ids the node no
    /// longer knows are skipped. `refresh` bypasses the cache for each bet.
    pub async fn live_bets(&self, refresh: bool) -> Result<Vec<BetRecord>, ClientError> {
        let ids = self.active_bet_ids().await?;
        let results = join_all(ids.iter().map(|id| self.bet(*id, refresh))).await;
        let mut out = Vec::with_capacity(results.len());
        for r in results {
            match r {
                Ok(b) => out.push(b),
                Err(ClientError::NotFound(id)) => debug!(bet_id = id, "listed bet not found"),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Historical bets from the archive. Records that fail conversion are
    /// skipped with a warning.
    pub async fn archived_bets(&self) -> Result<Vec<BetRecord>, ClientError> {
        let archive = self.archive.as_ref().ok_or(ClientError::NoArchive)?;
        let policy = self.config.retry_policy();
        let raw = with_retry(&policy, "archive", || archive.fetch_bets())
            .await
            .map_err(|source| ClientError::RetriesExhausted { op: "archive", source })?;
        let mut out = Vec::with_capacity(raw.len());
        for a in raw {
            let id = a.bet_id;
            match BetRecord::try_from(a) {
                Ok(b) => out.push(b.normalize(self.identity.as_ref())),
                Err(e) => warn!(bet_id = id, "skipping archived bet: {e}"),
            }
        }
        Ok(out)
    }

    /// Live and archival bets reconciled into one set.
    ///
    /// A live transport failure degrades to archival data. Decode errors in
    /// live data are returned as is. When both sources are unusable the live
    /// error is returned.
    pub async fn all_bets(&self, refresh: bool) -> Result<Vec<BetRecord>, ClientError> {
        let (live, archival) = futures::join!(self.live_bets(refresh), self.archived_bets());
        match (live, archival) {
            (Err(live_err), _) if !live_err.is_transport() => Err(live_err),
            (Err(live_err), Err(arch_err)) => {
                warn!("archive unavailable: {arch_err}");
                Err(live_err)
            }
            (live, Ok(archival)) => Ok(aggregate::reconcile(live, archival)),
            (Ok(live), Err(arch_err)) => {
                if !matches!(arch_err, ClientError::NoArchive) {
                    warn!("archive unavailable, live data only: {arch_err}");
                }
                Ok(live)
            }
        }
    }

    /// Sign `payload` as a call to `input_type` and broadcast it.
    pub async fn submit(&self, input_type: u16, amount: u64, payload: Vec<u8>, signer: &dyn Signer) -> Result<BroadcastResponse, ClientError> {
        let call = ContractCall { contract_index: self.config.contract_index, input_type, amount, payload };
        let signed = signer.sign(&call).map_err(ClientError::Signer)?;
        let req = BroadcastRequest { encoded_transaction: codec::encode_base64(&signed) };
        let policy = self.config.retry_policy();
        let resp = with_retry(&policy, "broadcast", || self.transport.broadcast(&req))
            .await
            .map_err(|source| ClientError::RetriesExhausted { op: "broadcast", source })?;
        info!(input_type, tx = resp.transaction_id.as_deref().unwrap_or("-"), "transaction broadcast");
        Ok(resp)
    }

    /// Validation happens before anything leaves the process.
    pub async fn create_bet(&self, input: &CreateBetInput, fee: u64, signer: &dyn Signer) -> Result<BroadcastResponse, ClientError> {
        let payload = input.encode()?;
        self.submit(schema::PROC_CREATE_BET, fee, payload, signer).await
    }

    pub async fn join_bet(&self, input: &JoinBetInput, amount: u64, signer: &dyn Signer) -> Result<BroadcastResponse, ClientError> {
        let payload = input.encode()?;
        self.submit(schema::PROC_JOIN_BET, amount, payload, signer).await
    }

    pub async fn publish_result(&self, input: &PublishResultInput, signer: &dyn Signer) -> Result<BroadcastResponse, ClientError> {
        let payload = input.encode()?;
        self.submit(schema::PROC_PUBLISH_RESULT, 0, payload, signer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_request_envelope() {
        let req = QueryRequest::new(2, INPUT_BET_INFO, &7u32.to_le_bytes());
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["contractIndex"], 2);
        assert_eq!(json["inputType"], 2);
        assert_eq!(json["inputSize"], 4);
        assert_eq!(json["requestData"], "BwAAAA==");
    }

    #[test]
    fn response_envelope_parses() {
        let resp: QueryResponse = serde_json::from_str(r#"{"responseData":"AQID"}"#).unwrap();
        assert_eq!(codec::decode_base64(&resp.response_data).unwrap(), [1, 2, 3]);
    }

    fn archived() -> ArchivedBet {
        ArchivedBet {
            bet_id: 3,
            creator: "alice".into(),
            bet_desc: "###abc".into(),
            option_desc: vec![" x".into(), "y  ".into(), "   ".into()],
            oracle_id: vec!["o1".into(), String::new(), "o3".into()],
            oracle_fee: vec![100, 0, 200],
            open_date: "2025-01-01".into(),
            open_time: "00:00:00".into(),
            close_date: "2025-01-02".into(),
            close_time: "12:00:00".into(),
            end_date: "2025-01-03".into(),
            end_time: "12:00:00".into(),
            amount_per_slot: 5,
            max_slots_per_option: 10,
            current_bet_state: vec![2, 2],
            result_won_option: vec![0, 0],
            result_oracle_id: vec![0, 1],
        }
    }

    #[test]
    fn archived_bet_converts() {
        let bet = BetRecord::try_from(archived()).unwrap();
        assert_eq!(bet.description, Description::Reference("abc".into()));
        assert_eq!(bet.option_descriptions, ["x", "y"]);
        assert_eq!(bet.oracle_provider_ids, [Identifier::Resolved("o1".into()), Identifier::Resolved("o3".into())]);
        assert_eq!(bet.oracle_fees, [100, 200]);
        assert_eq!(bet.close_date, PackedDate::new(25, 1, 2, 12, 0, 0));
        assert_eq!(bet.won_option_votes.len(), 8);
        assert_eq!(bet.total_pot, 20);
        assert_eq!(bet.betting_odds, ["2.0", "2.0"]);
        // Two providers need two votes; both voted option 0.
        assert_eq!(bet.resolved_option, 0);
    }

    #[test]
    fn archived_bet_bad_date() {
        let mut a = archived();
        a.end_date = "2025-02-30".into();
        assert!(matches!(
            BetRecord::try_from(a),
            Err(DecodeError::InvalidFieldRange { field: "end_date", .. })
        ));
    }
}
