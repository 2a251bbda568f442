//! Client core for the betting smart contract.
//!
//! This crate holds everything between the node's HTTP API and the code that
//! displays bets:
//!
//! - `codec`: little-endian primitives, fixed strings, packed dates, base64
//! - `schema`: declarative byte layouts (bet record, node info, active ids,
//!   create/join/publish payloads); the single source of truth for offsets
//! - `record`: generic schema walk producing/consuming named values
//! - `bet` / `node_info`: typed records, derived fields, write-path validation
//! - `aggregate`: live/archival reconciliation and phase views
//! - `retry`: bounded retry for network calls
//! - `cache`: per-session bet memo
//! - `client`: transports, signer seam and the `BetProvider` session
//! - `capture`: CRC-framed response capture files
//! - `config`: client settings
//!
//! The binaries in this repository (`src/main.rs` and `src/bin/replay.rs`)
//! query a live node and replay capture files offline.
pub mod aggregate;
pub mod bet;
pub mod cache;
pub mod capture;
pub mod client;
pub mod codec;
pub mod config;
pub mod node_info;
pub mod record;
pub mod retry;
pub mod schema;
