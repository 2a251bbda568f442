use bet_rpc::bet::{BetRecord, Description, HexIdentity, Identifier, NOT_VOTED};
use bet_rpc::codec::PackedDate;
use bet_rpc::node_info::decode_active_bet_ids;
use bet_rpc::record::{DecodeError, EncodeError};

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn packed(yy: u32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> [u8; 4] {
    (((yy - 24) << 26) | (mo << 22) | (d << 17) | (h << 12) | (mi << 6) | s).to_le_bytes()
}

/// 692-byte bet image laid out by hand, independent of the schema tables.
fn fixture() -> Vec<u8> {
    let mut b = vec![0u8; 692];
    put(&mut b, 0, &7u32.to_le_bytes());
    put(&mut b, 4, &3u32.to_le_bytes());
    put(&mut b, 8, &[0xab; 32]);
    put(&mut b, 40, b"Who wins?");
    for (i, opt) in ["red", "green", "blue"].iter().enumerate() {
        put(&mut b, 72 + i * 32, opt.as_bytes());
    }
    // Slot 1 left empty; its fee must go with it.
    put(&mut b, 328, &[1; 32]);
    put(&mut b, 328 + 2 * 32, &[3; 32]);
    for (i, fee) in [100u32, 999, 250].iter().enumerate() {
        put(&mut b, 584 + i * 4, &fee.to_le_bytes());
    }
    put(&mut b, 616, &packed(25, 6, 1, 12, 30, 0));
    put(&mut b, 620, &packed(25, 6, 2, 0, 0, 0));
    put(&mut b, 624, &packed(25, 6, 3, 0, 0, 0));
    // Padding is never read.
    put(&mut b, 628, &[0xee; 4]);
    put(&mut b, 632, &5_000_000_000u64.to_le_bytes());
    put(&mut b, 640, &50u32.to_le_bytes());
    for (i, n) in [2u32, 0, 6, 0xffff_ffff, 0xffff_ffff].iter().enumerate() {
        put(&mut b, 644 + i * 4, &n.to_le_bytes());
    }
    let mut votes = [NOT_VOTED as u8; 8];
    votes[0] = 2;
    votes[1] = 2;
    put(&mut b, 676, &votes);
    let mut idx = [NOT_VOTED as u8; 8];
    idx[0] = 0;
    idx[1] = 2;
    put(&mut b, 684, &idx);
    b
}

#[test]
fn hand_built_bet_decodes_at_canonical_offsets() {
    let bet = BetRecord::decode(&fixture()).unwrap();
    assert_eq!(bet.id, 7);
    assert_eq!(bet.option_count, 3);
    assert_eq!(bet.creator, Identifier::Raw([0xab; 32]));
    assert_eq!(bet.description, Description::Text("Who wins?".into()));
    assert_eq!(bet.option_descriptions, ["red", "green", "blue"]);
    assert_eq!(bet.oracle_provider_ids, [Identifier::Raw([1; 32]), Identifier::Raw([3; 32])]);
    assert_eq!(bet.oracle_fees, [100, 250]);
    assert_eq!(bet.open_date, PackedDate::new(25, 6, 1, 12, 30, 0));
    assert_eq!(bet.end_date.date_string(), "2025-06-03");
    assert_eq!(bet.amount_per_slot, 5_000_000_000);
    assert_eq!(bet.max_slots_per_option, 50);
    assert_eq!(bet.selection_counts, [2, 0, 6]);
    assert_eq!(bet.won_option_votes[..3], [2, 2, NOT_VOTED]);
    assert_eq!(bet.vote_oracle_index[..3], [0, 2, NOT_VOTED]);

    assert_eq!(bet.total_selections, 8);
    assert_eq!(bet.total_pot, 40_000_000_000);
    assert_eq!(bet.betting_odds, ["4.0", "8.0", "1.33"]);
    // Two providers, threshold 2, both voted option 2.
    assert_eq!(bet.resolved_option, 2);
}

#[test]
fn encode_reproduces_the_fixture_except_ignored_bytes() {
    let original = fixture();
    let bet = BetRecord::decode(&original).unwrap();
    // The empty oracle slot is compacted away, so provider 3 moves to slot 1.
    let out = bet.encode(&HexIdentity).unwrap();
    assert_eq!(out.len(), 692);
    assert_eq!(out[..328], original[..328]);
    assert_eq!(out[328..360], original[328..360]);
    assert_eq!(out[360..392], [3; 32]);
    assert_eq!(out[584..592], [100u32.to_le_bytes(), 250u32.to_le_bytes()].concat()[..]);
    assert_eq!(out[616..628], original[616..628]);
    assert_eq!(out[628..632], [0; 4]);
    assert_eq!(out[632..656], original[632..656]);
    assert_eq!(out[656..676], [0; 20]);
    assert_eq!(out[676..692], original[676..692]);
}

#[test]
fn normalized_identities_are_hex() {
    let bet = BetRecord::decode(&fixture()).unwrap().normalize(&HexIdentity);
    assert_eq!(bet.creator, Identifier::Resolved("ab".repeat(32)));
    assert_eq!(bet.oracle_provider_ids[1], Identifier::Resolved("03".repeat(32)));
}

#[test]
fn oversized_option_count_is_rejected() {
    let mut b = fixture();
    put(&mut b, 4, &9u32.to_le_bytes());
    assert!(matches!(
        BetRecord::decode(&b),
        Err(DecodeError::UnresolvableArraySize { field: "selection_counts", count: 9, capacity: 8 })
    ));
}

#[test]
fn invalid_date_is_rejected() {
    let mut b = fixture();
    put(&mut b, 620, &packed(25, 13, 1, 0, 0, 0));
    assert!(matches!(BetRecord::decode(&b), Err(DecodeError::InvalidFieldRange { field: "close_date", .. })));
}

#[test]
fn truncated_bet_is_rejected() {
    let b = fixture();
    assert!(BetRecord::decode(&b[..600]).is_err());
}

#[test]
fn active_ids_follow_their_count() {
    let mut b = vec![0u8; 4 + 4 * 1024];
    put(&mut b, 0, &3u32.to_le_bytes());
    for (i, id) in [11u32, 5, 9, 77].iter().enumerate() {
        put(&mut b, 4 + i * 4, &id.to_le_bytes());
    }
    assert_eq!(decode_active_bet_ids(&b).unwrap(), [11, 5, 9]);

    put(&mut b, 0, &1025u32.to_le_bytes());
    assert!(matches!(decode_active_bet_ids(&b), Err(DecodeError::UnresolvableArraySize { .. })));
}

fn bet_with_options(n: usize) -> BetRecord {
    let mut bet = BetRecord {
        id: 21,
        option_count: n as u32,
        creator: Identifier::Raw([0x11; 32]),
        description: Description::Reference("cafe".into()),
        option_descriptions: (0..n).map(|i| format!("option {i}")).collect(),
        oracle_provider_ids: (1..=3u8).map(|i| Identifier::Raw([i; 32])).collect(),
        oracle_fees: vec![100, 200, 300],
        open_date: PackedDate::new(25, 1, 1, 0, 0, 0),
        close_date: PackedDate::new(25, 1, 2, 0, 0, 0),
        end_date: PackedDate::new(25, 1, 3, 0, 0, 0),
        amount_per_slot: 10,
        max_slots_per_option: 1024,
        selection_counts: (0..n as u32).map(|i| 0x0101_0101 * (i + 1)).collect(),
        won_option_votes: vec![NOT_VOTED; 8],
        vote_oracle_index: vec![NOT_VOTED; 8],
        total_selections: 0,
        total_pot: 0,
        betting_odds: Vec::new(),
        resolved_option: NOT_VOTED,
    };
    bet.won_option_votes[0] = n as i8 - 1;
    bet.won_option_votes[2] = n as i8 - 1;
    bet.vote_oracle_index[0] = 0;
    bet.vote_oracle_index[2] = 2;
    bet.annotate();
    bet
}

#[test]
fn eight_options_fill_counts_up_to_the_vote_arrays() {
    let bet = bet_with_options(8);
    let buf = bet.encode(&HexIdentity).unwrap();
    assert_eq!(buf.len(), 692);
    for i in 0..8u32 {
        let at = 644 + i as usize * 4;
        assert_eq!(buf[at..at + 4], (0x0101_0101 * (i + 1)).to_le_bytes());
    }
    assert_eq!(buf[72 + 7 * 32..72 + 7 * 32 + 8], *b"option 7");
    assert_eq!(buf[676..684], [7, 0xff, 7, 0xff, 0xff, 0xff, 0xff, 0xff]);
    assert_eq!(buf[684..692], [0, 0xff, 2, 0xff, 0xff, 0xff, 0xff, 0xff]);

    let back = BetRecord::decode(&buf).unwrap();
    assert_eq!(back, bet);
    // Three providers need two votes; option 7 has them.
    assert_eq!(back.resolved_option, 7);
}

#[test]
fn two_options_leave_the_rest_of_the_counts_zeroed() {
    let bet = bet_with_options(2);
    let buf = bet.encode(&HexIdentity).unwrap();
    assert_eq!(buf[652..676], [0; 24]);
    assert_eq!(BetRecord::decode(&buf).unwrap(), bet);
}

#[test]
fn missing_votes_round_trip_as_not_voted() {
    let mut bet = bet_with_options(2);
    bet.won_option_votes.clear();
    bet.vote_oracle_index.clear();
    bet.annotate();
    assert_eq!(bet.resolved_option, NOT_VOTED);

    let buf = bet.encode(&HexIdentity).unwrap();
    assert_eq!(buf[676..692], [0xff; 16]);
    let back = BetRecord::decode(&buf).unwrap();
    assert_eq!(back.won_option_votes, [NOT_VOTED; 8]);
    assert_eq!(back.vote_oracle_index, [NOT_VOTED; 8]);
    assert_eq!(back.resolved_option, NOT_VOTED);
}

#[test]
fn encode_rejects_records_the_ledger_would_not_hold() {
    let mut one_option = bet_with_options(2);
    one_option.option_count = 1;
    one_option.selection_counts.truncate(1);
    one_option.option_descriptions.truncate(1);
    assert!(matches!(
        one_option.encode(&HexIdentity),
        Err(EncodeError::InvalidFieldRange { field: "option_count", .. })
    ));

    let mut no_oracles = bet_with_options(2);
    no_oracles.oracle_provider_ids.clear();
    no_oracles.oracle_fees.clear();
    assert!(matches!(
        no_oracles.encode(&HexIdentity),
        Err(EncodeError::InvalidFieldRange { field: "oracle_provider_ids", .. })
    ));

    let mut nine_oracles = bet_with_options(2);
    nine_oracles.oracle_provider_ids = (1..=9u8).map(|i| Identifier::Raw([i; 32])).collect();
    nine_oracles.oracle_fees = vec![1; 9];
    assert!(nine_oracles.encode(&HexIdentity).is_err());

    let mut greedy = bet_with_options(2);
    greedy.oracle_fees = vec![9000, 1000, 1];
    assert_eq!(greedy.encode(&HexIdentity), Err(EncodeError::FeeSumExceeded { sum: 10001 }));
}
