use bet_rpc::capture::{CAPTURE_VERSION, CaptureError, CaptureFrame, CaptureHeader, CaptureReader, CaptureSink};
use bet_rpc::node_info::decode_active_bet_ids;
use bet_rpc::schema::{self, INPUT_ACTIVE_BETS, INPUT_BET_INFO};
use std::fs;

fn header() -> CaptureHeader {
    CaptureHeader { version: CAPTURE_VERSION, created_unix_ns: 42, node_url: "http://node".into(), contract_index: 2 }
}

fn active_ids(ids: &[u32]) -> Vec<u8> {
    let mut b = vec![0u8; schema::ACTIVE_BETS.size];
    b[..4].copy_from_slice(&(ids.len() as u32).to_le_bytes());
    for (i, id) in ids.iter().enumerate() {
        b[4 + i * 4..8 + i * 4].copy_from_slice(&id.to_le_bytes());
    }
    b
}

#[test]
fn sink_writes_frames_the_reader_replays() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("session.bin");

    let sink = CaptureSink::create(&path, header()).unwrap();
    sink.record(INPUT_ACTIVE_BETS, &[], &active_ids(&[4, 8]));
    sink.record(INPUT_BET_INFO, &4u32.to_le_bytes(), &[0u8; 692]);
    assert_eq!(sink.finish().unwrap(), 2);

    let mut r = CaptureReader::open(&path).unwrap();
    assert_eq!(r.next_frame().unwrap(), Some(CaptureFrame::Header(header())));

    let Some(CaptureFrame::Response(first)) = r.next_frame().unwrap() else {
        panic!("expected a response frame");
    };
    assert_eq!(first.seq, 0);
    assert_eq!(first.input_type, INPUT_ACTIVE_BETS);
    assert_eq!(decode_active_bet_ids(&first.response).unwrap(), [4, 8]);

    let Some(CaptureFrame::Response(second)) = r.next_frame().unwrap() else {
        panic!("expected a response frame");
    };
    assert_eq!(second.seq, 1);
    assert_eq!(second.request, 4u32.to_le_bytes());
    assert_eq!(second.response.len(), schema::BET.size);

    assert_eq!(r.next_frame().unwrap(), None);
    assert_eq!(r.frames_read(), 3);
}

#[test]
fn flipped_byte_on_disk_fails_crc() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.bin");
    let sink = CaptureSink::create(&path, header()).unwrap();
    sink.record(INPUT_ACTIVE_BETS, &[], &active_ids(&[1]));
    sink.finish().unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x5a;
    fs::write(&path, &bytes).unwrap();

    let mut r = CaptureReader::open(&path).unwrap();
    assert!(matches!(r.next_frame(), Ok(Some(CaptureFrame::Header(_)))));
    assert!(matches!(r.next_frame(), Err(CaptureError::CrcMismatch { frame: 1, .. })));
}

#[test]
fn truncated_tail_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.bin");
    let sink = CaptureSink::create(&path, header()).unwrap();
    sink.record(INPUT_BET_INFO, &[], &[7u8; 692]);
    sink.finish().unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

    let mut r = CaptureReader::open(&path).unwrap();
    r.next_frame().unwrap();
    assert!(matches!(r.next_frame(), Err(CaptureError::Io(_))));
}
