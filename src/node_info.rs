//! Contract-wide statistics and the active bet id list.
use crate::bet::{IdentityFormat, Identifier};
use crate::record::{self, DecodeError, Value};
use crate::schema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub fee_per_slot_per_hour: u64,
    pub game_operator_fee: u64,
    pub shareholder_fee: u64,
    pub min_bet_slot_amount: u64,
    pub burn_fee: u64,
    pub issued_bet_count: u64,
    pub money_flow: u64,
    pub money_flow_issue_bet: u64,
    pub money_flow_join_bet: u64,
    pub money_flow_finalize_bet: u64,
    pub earned_for_shareholders: u64,
    pub paid_to_shareholders: u64,
    pub earned_for_winners: u64,
    pub distributed_amount: u64,
    pub burned_amount: u64,
    pub operator: Identifier,
}

impl NodeInfo {
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = record::decode(&schema::NODE_INFO, buf)?;
        let operator = Identifier::from_slice(&r.bytes("operator")?)
            .ok_or(DecodeError::TypeMismatch { field: "operator", expected: "32-byte identity" })?;
        Ok(Self {
            fee_per_slot_per_hour: r.u64("fee_per_slot_per_hour")?,
            game_operator_fee: r.u64("game_operator_fee")?,
            shareholder_fee: r.u64("shareholder_fee")?,
            min_bet_slot_amount: r.u64("min_bet_slot_amount")?,
            burn_fee: r.u64("burn_fee")?,
            issued_bet_count: r.u64("issued_bet_count")?,
            money_flow: r.u64("money_flow")?,
            money_flow_issue_bet: r.u64("money_flow_issue_bet")?,
            money_flow_join_bet: r.u64("money_flow_join_bet")?,
            money_flow_finalize_bet: r.u64("money_flow_finalize_bet")?,
            earned_for_shareholders: r.u64("earned_for_shareholders")?,
            paid_to_shareholders: r.u64("paid_to_shareholders")?,
            earned_for_winners: r.u64("earned_for_winners")?,
            distributed_amount: r.u64("distributed_amount")?,
            burned_amount: r.u64("burned_amount")?,
            operator,
        })
    }

    pub fn normalize(mut self, fmt: &dyn IdentityFormat) -> Self {
        self.operator = self.operator.normalize(fmt);
        self
    }
}

/// Ids of bets the ledger still tracks, in ledger order.
pub fn decode_active_bet_ids(buf: &[u8]) -> Result<Vec<u32>, DecodeError> {
    record::decode(&schema::ACTIVE_BETS, buf)?
        .array("bet_ids")?
        .into_iter()
        .map(|v| match v {
            Value::U32(id) => Ok(id),
            _ => Err(DecodeError::TypeMismatch { field: "bet_ids", expected: "u32" }),
        })
        .collect()
}
