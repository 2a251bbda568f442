//! Typed bet record and write-path inputs.
//!
//! - [`BetRecord::decode`] applies the [`schema::BET`] layout, drops empty
//!   oracle slots (and their fees) and empty option texts, then runs
//!   [`BetRecord::annotate`] to fill the derived fields.
//! - Derived fields (`total_selections`, `total_pot`, `betting_odds`,
//!   `resolved_option`) are recomputed from the raw fields every time and are
//!   never written to the wire.
//! - [`CreateBetInput`], [`JoinBetInput`] and [`PublishResultInput`] validate
//!   before producing the procedure payload bytes.
use crate::codec::PackedDate;
use crate::record::{self, DecodeError, EncodeError, Record, Value};
use crate::schema::{self, ID_SIZE, MAX_OPTIONS, MAX_ORACLES};
use serde::{Deserialize, Serialize};

/// Vote slot value meaning "not voted yet".
pub const NOT_VOTED: i8 = -1;
/// Oracle fees are in hundredths of a percent; 10000 is 100%.
pub const MAX_FEE_SUM: u64 = 10_000;
pub const MAX_SLOTS_PER_OPTION: u32 = 1024;

/// A 32-byte ledger identity, either as read off the wire or already turned
/// into its display form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Raw([u8; ID_SIZE]),
    Resolved(String),
}

impl Identifier {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; ID_SIZE]>::try_from(bytes).ok().map(Identifier::Raw)
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Identifier::Raw(b) if b.iter().all(|x| *x == 0))
    }

    /// Turn a raw identity into its display string. Resolved values pass through.
    pub fn normalize(self, fmt: &dyn IdentityFormat) -> Self {
        match self {
            Identifier::Raw(b) => Identifier::Resolved(fmt.display(&b)),
            resolved => resolved,
        }
    }

    pub fn as_resolved(&self) -> Option<&str> {
        match self {
            Identifier::Resolved(s) => Some(s),
            Identifier::Raw(_) => None,
        }
    }

    /// Wire bytes, converting back through `fmt` when needed.
    pub fn to_raw(&self, fmt: &dyn IdentityFormat) -> Option<[u8; ID_SIZE]> {
        match self {
            Identifier::Raw(b) => Some(*b),
            Identifier::Resolved(s) => fmt.parse(s),
        }
    }
}

/// Conversion between raw identities and their human-readable form.
pub trait IdentityFormat: Send + Sync {
    fn display(&self, raw: &[u8; ID_SIZE]) -> String;
    fn parse(&self, s: &str) -> Option<[u8; ID_SIZE]>;
}

/// Lowercase hex rendering.
#[derive(Debug, Default, Clone, Copy)]
pub struct HexIdentity;

impl IdentityFormat for HexIdentity {
    fn display(&self, raw: &[u8; ID_SIZE]) -> String {
        hex::encode(raw)
    }

    fn parse(&self, s: &str) -> Option<[u8; ID_SIZE]> {
        let s = s.trim();
        if s.len() != ID_SIZE * 2 {
            return None;
        }
        hex::decode(s).ok()?.try_into().ok()
    }
}

/// Bet description: a short literal, or `###<hash>` pointing at the full text
/// stored elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Description {
    Text(String),
    Reference(String),
}

pub const REFERENCE_PREFIX: &str = "###";

impl Description {
    pub fn from_wire(s: String) -> Self {
        match s.strip_prefix(REFERENCE_PREFIX) {
            Some(hash) => Description::Reference(hash.to_string()),
            None => Description::Text(s),
        }
    }

    pub fn to_wire(&self) -> String {
        match self {
            Description::Text(s) => s.clone(),
            Description::Reference(h) => format!("{REFERENCE_PREFIX}{h}"),
        }
    }
}

/// A packed date split into display strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeField {
    pub date: String,
    pub time: String,
}

impl From<PackedDate> for DateTimeField {
    fn from(d: PackedDate) -> Self {
        Self { date: d.date_string(), time: d.time_string() }
    }
}

/// Lifecycle position of a bet relative to a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetPhase {
    /// Before the close date; slots can still be bought.
    Active,
    /// Closed for joining, waiting for the end date.
    Locked,
    /// Past the end date.
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRecord {
    pub id: u32,
    pub option_count: u32,
    pub creator: Identifier,
    pub description: Description,
    pub option_descriptions: Vec<String>,
    pub oracle_provider_ids: Vec<Identifier>,
    /// Raw hundredths of a percent, aligned with `oracle_provider_ids`.
    pub oracle_fees: Vec<u32>,
    pub open_date: PackedDate,
    pub close_date: PackedDate,
    pub end_date: PackedDate,
    pub amount_per_slot: u64,
    pub max_slots_per_option: u32,
    pub selection_counts: Vec<u32>,
    /// Winning option voted by each oracle slot, or [`NOT_VOTED`].
    pub won_option_votes: Vec<i8>,
    /// Index of the oracle that cast each vote slot, or [`NOT_VOTED`].
    pub vote_oracle_index: Vec<i8>,

    pub total_selections: u64,
    pub total_pot: u128,
    pub betting_odds: Vec<String>,
    /// Option that reached a two-thirds supermajority, else [`NOT_VOTED`].
    pub resolved_option: i8,
}

fn decode_i8s(rec: &Record, field: &'static str) -> Result<Vec<i8>, DecodeError> {
    rec.array(field)?
        .into_iter()
        .map(|v| match v {
            Value::I8(x) => Ok(x),
            _ => Err(DecodeError::TypeMismatch { field, expected: "i8" }),
        })
        .collect()
}

fn decode_u32s(rec: &Record, field: &'static str) -> Result<Vec<u32>, DecodeError> {
    rec.array(field)?
        .into_iter()
        .map(|v| match v {
            Value::U32(x) => Ok(x),
            _ => Err(DecodeError::TypeMismatch { field, expected: "u32" }),
        })
        .collect()
}

fn identifier(v: &[u8], field: &'static str) -> Result<Identifier, DecodeError> {
    Identifier::from_slice(v).ok_or(DecodeError::TypeMismatch { field, expected: "32-byte identity" })
}

impl BetRecord {
    /// Decode a raw bet buffer and compute the derived fields.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        Self::from_record(&record::decode(&schema::BET, buf)?)
    }

    pub fn from_record(rec: &Record) -> Result<Self, DecodeError> {
        let option_count = rec.u32("option_count")?;
        if !(1..=MAX_OPTIONS as u32).contains(&option_count) {
            return Err(DecodeError::InvalidFieldRange {
                field: "option_count",
                reason: format!("{option_count} not in 1..=8"),
            });
        }

        let option_descriptions = rec
            .array("option_descriptions")?
            .into_iter()
            .filter_map(|v| match v {
                Value::Str(s) if s.is_empty() => None,
                Value::Str(s) => Some(Ok(s)),
                _ => Some(Err(DecodeError::TypeMismatch { field: "option_descriptions", expected: "string" })),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let fees = decode_u32s(rec, "oracle_fees")?;
        let mut oracle_provider_ids = Vec::new();
        let mut oracle_fees = Vec::new();
        for (slot, v) in rec.array("oracle_provider_ids")?.into_iter().enumerate() {
            let Value::Bytes(b) = v else {
                return Err(DecodeError::TypeMismatch { field: "oracle_provider_ids", expected: "bytes" });
            };
            let id = identifier(&b, "oracle_provider_ids")?;
            if id.is_zero() {
                continue;
            }
            oracle_provider_ids.push(id);
            oracle_fees.push(fees.get(slot).copied().unwrap_or_default());
        }

        let mut bet = Self {
            id: rec.u32("bet_id")?,
            option_count,
            creator: identifier(&rec.bytes("creator")?, "creator")?,
            description: Description::from_wire(rec.string("description")?),
            option_descriptions,
            oracle_provider_ids,
            oracle_fees,
            open_date: rec.date("open_date")?,
            close_date: rec.date("close_date")?,
            end_date: rec.date("end_date")?,
            amount_per_slot: rec.u64("amount_per_slot")?,
            max_slots_per_option: rec.u32("max_slots_per_option")?,
            selection_counts: decode_u32s(rec, "selection_counts")?,
            won_option_votes: decode_i8s(rec, "won_option_votes")?,
            vote_oracle_index: decode_i8s(rec, "vote_oracle_index")?,
            total_selections: 0,
            total_pot: 0,
            betting_odds: Vec::new(),
            resolved_option: NOT_VOTED,
        };
        bet.annotate();
        Ok(bet)
    }

    /// Recompute every derived field from the raw ones.
    pub fn annotate(&mut self) {
        self.total_selections = self.selection_counts.iter().map(|c| u64::from(*c)).sum();
        self.total_pot = u128::from(self.total_selections) * u128::from(self.amount_per_slot);
        self.betting_odds = betting_odds(&self.selection_counts);
        self.resolved_option = resolve_votes(&self.won_option_votes, self.oracle_provider_ids.len());
    }

    /// Replace raw identities with their display form. Run once at ingestion
    /// so live and archival records compare field for field.
    pub fn normalize(mut self, fmt: &dyn IdentityFormat) -> Self {
        self.creator = self.creator.normalize(fmt);
        self.oracle_provider_ids = self.oracle_provider_ids.into_iter().map(|id| id.normalize(fmt)).collect();
        self
    }

    /// Oracle fees as percentages (`1223` becomes `12.23`).
    pub fn oracle_fee_percents(&self) -> Vec<f64> {
        self.oracle_fees.iter().map(|f| fee_percent(*f)).collect()
    }

    pub fn dates(&self) -> [DateTimeField; 3] {
        [self.open_date.into(), self.close_date.into(), self.end_date.into()]
    }

    pub fn phase(&self, now: PackedDate) -> BetPhase {
        if now < self.close_date {
            BetPhase::Active
        } else if now < self.end_date {
            BetPhase::Locked
        } else {
            BetPhase::Inactive
        }
    }

    pub fn to_record(&self, fmt: &dyn IdentityFormat) -> Result<Record, EncodeError> {
        let raw = |id: &Identifier, field: &'static str| -> Result<Value, EncodeError> {
            id.to_raw(fmt)
                .map(|b| Value::Bytes(b.to_vec()))
                .ok_or_else(|| EncodeError::InvalidFieldRange { field, reason: "identity cannot be converted to bytes".into() })
        };
        Ok(Record::new()
            .with("bet_id", Value::U32(self.id))
            .with("option_count", Value::U32(self.option_count))
            .with("creator", raw(&self.creator, "creator")?)
            .with("description", Value::Str(self.description.to_wire()))
            .with("option_descriptions", strings(&self.option_descriptions))
            .with(
                "oracle_provider_ids",
                Value::Array(
                    self.oracle_provider_ids
                        .iter()
                        .map(|id| raw(id, "oracle_provider_ids"))
                        .collect::<Result<_, _>>()?,
                ),
            )
            .with("oracle_fees", u32s(&self.oracle_fees))
            .with("open_date", Value::Date(self.open_date))
            .with("close_date", Value::Date(self.close_date))
            .with("end_date", Value::Date(self.end_date))
            .with("amount_per_slot", Value::U64(self.amount_per_slot))
            .with("max_slots_per_option", Value::U32(self.max_slots_per_option))
            .with("selection_counts", u32s(&self.selection_counts))
            .with("won_option_votes", i8s(&self.won_option_votes))
            .with("vote_oracle_index", i8s(&self.vote_oracle_index)))
    }

    /// Full 692-byte ledger image. Used for fixtures and capture replay;
    /// the ledger itself only accepts [`CreateBetInput`] payloads.
    pub fn encode(&self, fmt: &dyn IdentityFormat) -> Result<Vec<u8>, EncodeError> {
        self.validate()?;
        record::encode(&schema::BET, &self.to_record(fmt)?)
    }

    /// Same bounds the ledger enforces on creation, plus consistency between
    /// the count field and the arrays it governs.
    pub fn validate(&self) -> Result<(), EncodeError> {
        let options = self.option_count as usize;
        check_range("option_count", options, 2..=MAX_OPTIONS)?;
        if self.selection_counts.len() != options {
            return Err(EncodeError::InvalidFieldRange {
                field: "selection_counts",
                reason: format!("{} counts for {} options", self.selection_counts.len(), options),
            });
        }
        if self.option_descriptions.len() > options {
            return Err(EncodeError::InvalidFieldRange {
                field: "option_descriptions",
                reason: format!("{} descriptions for {} options", self.option_descriptions.len(), options),
            });
        }
        check_oracles(&self.oracle_provider_ids, &self.oracle_fees)
    }
}

fn strings(xs: &[String]) -> Value {
    Value::Array(xs.iter().cloned().map(Value::Str).collect())
}

fn u32s(xs: &[u32]) -> Value {
    Value::Array(xs.iter().copied().map(Value::U32).collect())
}

fn i8s(xs: &[i8]) -> Value {
    Value::Array(xs.iter().copied().map(Value::I8).collect())
}

pub fn fee_percent(raw: u32) -> f64 {
    f64::from(raw) / 100.0
}

/// Votes needed to settle a bet with `providers` oracles: `ceil(2n/3)`.
pub fn supermajority_threshold(providers: usize) -> usize {
    (2 * providers).div_ceil(3)
}

/// Tally cast votes and return the option holding a supermajority.
///
/// Ties on the maximum keep the option seen first in slot order. Returns
/// [`NOT_VOTED`] when nothing was cast or the leader is below threshold.
pub fn resolve_votes(won_option_votes: &[i8], providers: usize) -> i8 {
    let mut tally: Vec<(i8, usize)> = Vec::new();
    for &vote in won_option_votes.iter().filter(|v| **v >= 0) {
        match tally.iter_mut().find(|(opt, _)| *opt == vote) {
            Some((_, n)) => *n += 1,
            None => tally.push((vote, 1)),
        }
    }
    let mut best: Option<(i8, usize)> = None;
    for &(opt, n) in &tally {
        if best.is_none_or(|(_, m)| n > m) {
            best = Some((opt, n));
        }
    }
    match best {
        Some((opt, n)) if n >= supermajority_threshold(providers) => opt,
        _ => NOT_VOTED,
    }
}

/// Display odds per option.
///
/// With no selections at all every option shows `1.0`. An option nobody has
/// picked yet shows the total rather than infinity.
pub fn betting_odds(selection_counts: &[u32]) -> Vec<String> {
    let total: u64 = selection_counts.iter().map(|c| u64::from(*c)).sum();
    selection_counts
        .iter()
        .map(|&c| {
            let odds = match (total, c) {
                (0, _) => 1.0,
                (t, 0) => t as f64,
                (t, c) => t as f64 / f64::from(c),
            };
            format_odds(odds)
        })
        .collect()
}

/// Two decimals at most, one at least: `1.33`, `4.0`, `2.5`.
pub fn format_odds(x: f64) -> String {
    let r = (x * 100.0).round() / 100.0;
    if r.fract() == 0.0 { format!("{r:.1}") } else { format!("{r}") }
}

fn check_range(field: &'static str, n: usize, range: std::ops::RangeInclusive<usize>) -> Result<(), EncodeError> {
    if range.contains(&n) {
        Ok(())
    } else {
        Err(EncodeError::InvalidFieldRange {
            field,
            reason: format!("{n} not in {}..={}", range.start(), range.end()),
        })
    }
}

/// One to eight providers, one fee each, fees summing to at most 100.00%.
fn check_oracles<T>(providers: &[T], fees: &[u32]) -> Result<(), EncodeError> {
    check_range("oracle_provider_ids", providers.len(), 1..=MAX_ORACLES)?;
    if fees.len() != providers.len() {
        return Err(EncodeError::InvalidFieldRange {
            field: "oracle_fees",
            reason: format!("{} fees for {} providers", fees.len(), providers.len()),
        });
    }
    let sum: u64 = fees.iter().map(|f| u64::from(*f)).sum();
    if sum > MAX_FEE_SUM {
        return Err(EncodeError::FeeSumExceeded { sum });
    }
    Ok(())
}

/// Create-bet procedure input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBetInput {
    /// Literal text or `###<hash>`; longer than 32 bytes is truncated.
    pub description: String,
    pub options: Vec<String>,
    pub oracle_provider_ids: Vec<[u8; ID_SIZE]>,
    pub oracle_fees: Vec<u32>,
    pub close_date: PackedDate,
    pub end_date: PackedDate,
    pub amount_per_slot: u64,
    pub max_slots_per_option: u32,
}

impl CreateBetInput {
    pub fn validate(&self) -> Result<(), EncodeError> {
        check_range("option_descriptions", self.options.len(), 2..=MAX_OPTIONS)?;
        check_oracles(&self.oracle_provider_ids, &self.oracle_fees)?;
        check_range("max_slots_per_option", self.max_slots_per_option as usize, 1..=MAX_SLOTS_PER_OPTION as usize)?;
        for (field, d) in [("close_date", self.close_date), ("end_date", self.end_date)] {
            d.validate().map_err(|e| EncodeError::InvalidFieldRange { field, reason: e.to_string() })?;
        }
        Ok(())
    }

    /// Validate, then build the 600-byte payload.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        self.validate()?;
        let rec = Record::new()
            .with("description", Value::Str(self.description.clone()))
            .with("option_descriptions", strings(&self.options))
            .with(
                "oracle_provider_ids",
                Value::Array(self.oracle_provider_ids.iter().map(|b| Value::Bytes(b.to_vec())).collect()),
            )
            .with("oracle_fees", u32s(&self.oracle_fees))
            .with("close_date", Value::Date(self.close_date))
            .with("end_date", Value::Date(self.end_date))
            .with("amount_per_slot", Value::U64(self.amount_per_slot))
            .with("max_slots_per_option", Value::U32(self.max_slots_per_option))
            .with("option_count", Value::U32(self.options.len() as u32));
        record::encode(&schema::CREATE_BET, &rec)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinBetInput {
    pub bet_id: u32,
    pub slot_count: u32,
    pub option: u32,
}

impl JoinBetInput {
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        check_range("slot_count", self.slot_count as usize, 1..=MAX_SLOTS_PER_OPTION as usize)?;
        check_range("option", self.option as usize, 0..=MAX_OPTIONS - 1)?;
        let rec = Record::new()
            .with("bet_id", Value::U32(self.bet_id))
            .with("slot_count", Value::U32(self.slot_count))
            .with("option", Value::U32(self.option))
            .with("reserved", Value::U32(0));
        record::encode(&schema::JOIN_BET, &rec)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResultInput {
    pub bet_id: u32,
    pub option: u32,
}

impl PublishResultInput {
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        check_range("option", self.option as usize, 0..=MAX_OPTIONS - 1)?;
        let rec = Record::new()
            .with("bet_id", Value::U32(self.bet_id))
            .with("option", Value::U32(self.option));
        record::encode(&schema::PUBLISH_RESULT, &rec)
    }
}
