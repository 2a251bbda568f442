//! Reconciliation of live and archival bet sets.
//!
//! - [`merge`]: live order preserved, archival entries appended unless they
//!   are structurally equal to something already in the result
//! - [`reconcile`]: same, but a failed live fetch degrades to archival only
//! - [`by_phase`] / [`active`] / [`locked`] / [`inactive`]: views over a
//!   merged set against a caller-supplied "now"
use crate::bet::{BetPhase, BetRecord};
use crate::codec::PackedDate;
use std::fmt::Display;
use tracing::{debug, warn};

/// Merge two independently sourced sets.
///
/// Equality is full structural equality over every field, so an archival copy
/// that differs from the live one in any field (for example a stale selection
/// count) is kept alongside it.
pub fn merge(live: Vec<BetRecord>, archival: Vec<BetRecord>) -> Vec<BetRecord> {
    let live_len = live.len();
    let mut out = live;
    for rec in archival {
        if !out.contains(&rec) {
            out.push(rec);
        }
    }
    debug!(live = live_len, merged = out.len(), "merged live and archival bets");
    out
}

/// Merge with fallback: when the live source failed, the archival set is the
/// result and the failure is only logged.
pub fn reconcile<E: Display>(live: Result<Vec<BetRecord>, E>, archival: Vec<BetRecord>) -> Vec<BetRecord> {
    match live {
        Ok(live) => merge(live, archival),
        Err(e) => {
            warn!(archival = archival.len(), "live source unavailable, using archival data only: {e}");
            archival
        }
    }
}

pub fn by_phase(records: &[BetRecord], phase: BetPhase, now: PackedDate) -> Vec<&BetRecord> {
    records.iter().filter(|r| r.phase(now) == phase).collect()
}

pub fn active(records: &[BetRecord], now: PackedDate) -> Vec<&BetRecord> {
    by_phase(records, BetPhase::Active, now)
}

pub fn locked(records: &[BetRecord], now: PackedDate) -> Vec<&BetRecord> {
    by_phase(records, BetPhase::Locked, now)
}

pub fn inactive(records: &[BetRecord], now: PackedDate) -> Vec<&BetRecord> {
    by_phase(records, BetPhase::Inactive, now)
}
