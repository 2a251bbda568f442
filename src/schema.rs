//! Declarative wire layouts.
//!
//! Each [`Schema`] lists its fields with an absolute byte offset. Offsets are
//! not derived from the previous field: several layouts contain padding gaps
//! (the bet record skips 628..632 so the 64-bit amount is 8-byte aligned).
//! All offsets used anywhere in the crate live in this file.
//!
//! The vote arrays of the bet record sit at 676 and 684. That is the only
//! placement consistent with eight 4-byte selection counts starting at 644.
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Type of a single field or array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U8,
    I8,
    U16,
    U32,
    U64,
    /// Opaque fixed-size bytes (32-byte identities).
    Bytes(usize),
    /// NUL-padded text.
    Str(usize),
    /// 32-bit packed date.
    Date,
}

impl FieldType {
    pub const fn width(&self) -> usize {
        match self {
            FieldType::U8 | FieldType::I8 => 1,
            FieldType::U16 => 2,
            FieldType::U32 | FieldType::Date => 4,
            FieldType::U64 => 8,
            FieldType::Bytes(n) | FieldType::Str(n) => *n,
        }
    }
}

/// Repetition of an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArraySpec {
    pub element: FieldType,
    /// Capacity on the wire.
    pub capacity: usize,
    pub stride: usize,
    /// Earlier field holding the live element count; `None` reads all slots.
    pub len_from: Option<&'static str>,
    /// Byte written to every slot past the last encoded element.
    pub fill: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Scalar(FieldType),
    Array(ArraySpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub layout: Layout,
}

impl Field {
    /// Bytes reserved on the wire, for arrays the full capacity.
    pub const fn span(&self) -> usize {
        match &self.layout {
            Layout::Scalar(t) => t.width(),
            Layout::Array(a) => a.stride * (a.capacity - 1) + a.element.width(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub version: u16,
    pub size: usize,
    pub fields: &'static [Field],
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check that every field fits in `size`, that no two fields overlap and
    /// that count fields precede the arrays they size.
    pub fn validate(&self) -> Result<(), String> {
        let mut spans: Vec<(usize, usize, &str)> = Vec::with_capacity(self.fields.len());
        for (i, f) in self.fields.iter().enumerate() {
            let end = f.offset + f.span();
            if end > self.size {
                return Err(format!("{}.{} ends at {} past size {}", self.name, f.name, end, self.size));
            }
            if let Layout::Array(a) = &f.layout {
                if a.stride < a.element.width() || a.capacity == 0 {
                    return Err(format!("{}.{} has a bad stride or capacity", self.name, f.name));
                }
                if let Some(count) = a.len_from {
                    if !self.fields[..i].iter().any(|p| p.name == count) {
                        return Err(format!("{}.{} counted by unknown or later field {}", self.name, f.name, count));
                    }
                }
            }
            spans.push((f.offset, end, f.name));
        }
        spans.sort_unstable();
        for w in spans.windows(2) {
            if w[0].1 > w[1].0 {
                return Err(format!("{}: {} overlaps {}", self.name, w[0].2, w[1].2));
            }
        }
        Ok(())
    }
}

const fn scalar(name: &'static str, offset: usize, t: FieldType) -> Field {
    Field { name, offset, layout: Layout::Scalar(t) }
}

const fn array(name: &'static str, offset: usize, element: FieldType, capacity: usize, len_from: Option<&'static str>) -> Field {
    Field {
        name,
        offset,
        layout: Layout::Array(ArraySpec { element, capacity, stride: element.width(), len_from, fill: 0 }),
    }
}

/// Array whose empty slots carry a sentinel instead of zero.
const fn filled_array(name: &'static str, offset: usize, element: FieldType, capacity: usize, fill: u8) -> Field {
    Field {
        name,
        offset,
        layout: Layout::Array(ArraySpec { element, capacity, stride: element.width(), len_from: None, fill }),
    }
}

/// `-1` as a signed byte: vote slot not used yet.
const NOT_VOTED_BYTE: u8 = 0xff;

pub const MAX_OPTIONS: usize = 8;
pub const MAX_ORACLES: usize = 8;
pub const MAX_ACTIVE_BETS: usize = 1024;
pub const ID_SIZE: usize = 32;
pub const TEXT_SIZE: usize = 32;

/// Query input types.
pub const INPUT_NODE_INFO: u16 = 1;
pub const INPUT_BET_INFO: u16 = 2;
pub const INPUT_ACTIVE_BETS: u16 = 4;

/// Procedure input types.
pub const PROC_CREATE_BET: u16 = 1;
pub const PROC_JOIN_BET: u16 = 2;
pub const PROC_PUBLISH_RESULT: u16 = 4;

pub static BET: Schema = Schema {
    name: "bet",
    version: 1,
    size: 692,
    fields: &[
        scalar("bet_id", 0, FieldType::U32),
        scalar("option_count", 4, FieldType::U32),
        scalar("creator", 8, FieldType::Bytes(ID_SIZE)),
        scalar("description", 40, FieldType::Str(TEXT_SIZE)),
        array("option_descriptions", 72, FieldType::Str(TEXT_SIZE), MAX_OPTIONS, None),
        array("oracle_provider_ids", 328, FieldType::Bytes(ID_SIZE), MAX_ORACLES, None),
        array("oracle_fees", 584, FieldType::U32, MAX_ORACLES, None),
        scalar("open_date", 616, FieldType::Date),
        scalar("close_date", 620, FieldType::Date),
        scalar("end_date", 624, FieldType::Date),
        scalar("amount_per_slot", 632, FieldType::U64),
        scalar("max_slots_per_option", 640, FieldType::U32),
        array("selection_counts", 644, FieldType::U32, MAX_OPTIONS, Some("option_count")),
        filled_array("won_option_votes", 676, FieldType::I8, MAX_ORACLES, NOT_VOTED_BYTE),
        filled_array("vote_oracle_index", 684, FieldType::I8, MAX_ORACLES, NOT_VOTED_BYTE),
    ],
};

pub static NODE_INFO: Schema = Schema {
    name: "node_info",
    version: 1,
    size: 152,
    fields: &[
        scalar("fee_per_slot_per_hour", 0, FieldType::U64),
        scalar("game_operator_fee", 8, FieldType::U64),
        scalar("shareholder_fee", 16, FieldType::U64),
        scalar("min_bet_slot_amount", 24, FieldType::U64),
        scalar("burn_fee", 32, FieldType::U64),
        scalar("issued_bet_count", 40, FieldType::U64),
        scalar("money_flow", 48, FieldType::U64),
        scalar("money_flow_issue_bet", 56, FieldType::U64),
        scalar("money_flow_join_bet", 64, FieldType::U64),
        scalar("money_flow_finalize_bet", 72, FieldType::U64),
        scalar("earned_for_shareholders", 80, FieldType::U64),
        scalar("paid_to_shareholders", 88, FieldType::U64),
        scalar("earned_for_winners", 96, FieldType::U64),
        scalar("distributed_amount", 104, FieldType::U64),
        scalar("burned_amount", 112, FieldType::U64),
        scalar("operator", 120, FieldType::Bytes(ID_SIZE)),
    ],
};

pub static ACTIVE_BETS: Schema = Schema {
    name: "active_bets",
    version: 1,
    size: 4 + 4 * MAX_ACTIVE_BETS,
    fields: &[
        scalar("count", 0, FieldType::U32),
        array("bet_ids", 4, FieldType::U32, MAX_ACTIVE_BETS, Some("count")),
    ],
};

/// Create-bet procedure input, 600 bytes.
pub static CREATE_BET: Schema = Schema {
    name: "create_bet",
    version: 1,
    size: 600,
    fields: &[
        scalar("description", 0, FieldType::Str(TEXT_SIZE)),
        array("option_descriptions", 32, FieldType::Str(TEXT_SIZE), MAX_OPTIONS, None),
        array("oracle_provider_ids", 288, FieldType::Bytes(ID_SIZE), MAX_ORACLES, None),
        array("oracle_fees", 544, FieldType::U32, MAX_ORACLES, None),
        scalar("close_date", 576, FieldType::Date),
        scalar("end_date", 580, FieldType::Date),
        scalar("amount_per_slot", 584, FieldType::U64),
        scalar("max_slots_per_option", 592, FieldType::U32),
        scalar("option_count", 596, FieldType::U32),
    ],
};

pub static JOIN_BET: Schema = Schema {
    name: "join_bet",
    version: 1,
    size: 16,
    fields: &[
        scalar("bet_id", 0, FieldType::U32),
        scalar("slot_count", 4, FieldType::U32),
        scalar("option", 8, FieldType::U32),
        scalar("reserved", 12, FieldType::U32),
    ],
};

pub static PUBLISH_RESULT: Schema = Schema {
    name: "publish_result",
    version: 1,
    size: 8,
    fields: &[
        scalar("bet_id", 0, FieldType::U32),
        scalar("option", 4, FieldType::U32),
    ],
};

/// Response layout for each query input type.
static QUERY_SCHEMAS: Lazy<HashMap<u16, &'static Schema>> = Lazy::new(|| {
    HashMap::from([
        (INPUT_NODE_INFO, &NODE_INFO),
        (INPUT_BET_INFO, &BET),
        (INPUT_ACTIVE_BETS, &ACTIVE_BETS),
    ])
});

pub fn response_schema(input_type: u16) -> Option<&'static Schema> {
    QUERY_SCHEMAS.get(&input_type).copied()
}

pub fn all() -> [&'static Schema; 6] {
    [&BET, &NODE_INFO, &ACTIVE_BETS, &CREATE_BET, &JOIN_BET, &PUBLISH_RESULT]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_schema_is_consistent() {
        for s in all() {
            s.validate().unwrap_or_else(|e| panic!("{e}"));
        }
    }

    #[test]
    fn fixed_sizes() {
        assert_eq!(BET.size, 692);
        assert_eq!(NODE_INFO.size, 152);
        assert_eq!(CREATE_BET.size, 600);
        let last = CREATE_BET.fields.last().unwrap();
        assert_eq!(last.offset + last.span(), 600);
    }

    #[test]
    fn bet_offsets_match_the_ledger_layout() {
        let at = |n: &str| BET.field(n).unwrap().offset;
        assert_eq!(at("creator"), 8);
        assert_eq!(at("description"), 40);
        assert_eq!(at("option_descriptions"), 72);
        assert_eq!(at("oracle_provider_ids"), 328);
        assert_eq!(at("oracle_fees"), 584);
        assert_eq!(at("open_date"), 616);
        assert_eq!(at("end_date"), 624);
        assert_eq!(at("amount_per_slot"), 632);
        assert_eq!(at("selection_counts"), 644);
        assert_eq!(at("won_option_votes"), 676);
        assert_eq!(at("vote_oracle_index"), 684);
    }

    #[test]
    fn vote_arrays_pad_with_not_voted() {
        for name in ["won_option_votes", "vote_oracle_index"] {
            let Layout::Array(a) = &BET.field(name).unwrap().layout else {
                panic!("{name} is not an array");
            };
            assert_eq!(a.fill, 0xff);
            assert_eq!(a.len_from, None);
        }
        let Layout::Array(counts) = &BET.field("selection_counts").unwrap().layout else {
            panic!("selection_counts is not an array");
        };
        assert_eq!(counts.fill, 0);
    }

    #[test]
    fn validate_catches_overlap_and_bad_count() {
        static OVERLAP: Schema = Schema {
            name: "overlap",
            version: 1,
            size: 8,
            fields: &[scalar("a", 0, FieldType::U32), scalar("b", 2, FieldType::U32)],
        };
        assert!(OVERLAP.validate().is_err());

        static LATE_COUNT: Schema = Schema {
            name: "late",
            version: 1,
            size: 12,
            fields: &[
                array("xs", 0, FieldType::U32, 2, Some("n")),
                scalar("n", 8, FieldType::U32),
            ],
        };
        assert!(LATE_COUNT.validate().is_err());
    }

    #[test]
    fn query_registry() {
        assert_eq!(response_schema(INPUT_BET_INFO).map(|s| s.name), Some("bet"));
        assert!(response_schema(99).is_none());
    }
}
