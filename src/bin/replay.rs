use anyhow::{Context, Result};
use bet_rpc::bet::{BetRecord, HexIdentity};
use bet_rpc::capture::{CaptureFrame, CaptureReader};
use bet_rpc::node_info::{NodeInfo, decode_active_bet_ids};
use bet_rpc::schema::{self, INPUT_ACTIVE_BETS, INPUT_BET_INFO, INPUT_NODE_INFO};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(about = "Replay a capture file and decode every recorded response")]
struct Args {
    /// Input file path to read (recorded .bin)
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Print each decoded response as JSON
    #[arg(long, default_value_t = false)]
    print: bool,

    /// Exit with an error if any response fails to decode
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Debug, Default)]
struct Tally {
    bets: usize,
    node_infos: usize,
    id_lists: usize,
    unknown: usize,
    failed: usize,
}

fn decode_response(input_type: u16, response: &[u8], print: bool) -> Result<()> {
    let json = match input_type {
        INPUT_BET_INFO => serde_json::to_string(&BetRecord::decode(response)?.normalize(&HexIdentity))?,
        INPUT_NODE_INFO => serde_json::to_string(&NodeInfo::decode(response)?.normalize(&HexIdentity))?,
        INPUT_ACTIVE_BETS => serde_json::to_string(&decode_active_bet_ids(response)?)?,
        other => anyhow::bail!("no decoder for input type {other}"),
    };
    if print {
        println!("{json}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rdr = CaptureReader::open(&args.input).with_context(|| format!("open {:?}", args.input))?;
    let mut tally = Tally::default();

    while let Some(frame) = rdr.next_frame()? {
        match frame {
            CaptureFrame::Header(h) => {
                eprintln!("Header: v{} node={} contract={} created={}ns", h.version, h.node_url, h.contract_index, h.created_unix_ns);
            }
            CaptureFrame::Response(r) => {
                let Some(layout) = schema::response_schema(r.input_type) else {
                    tally.unknown += 1;
                    continue;
                };
                if r.response.len() != layout.size {
                    eprintln!("seq={} {}: {} bytes, layout says {}", r.seq, layout.name, r.response.len(), layout.size);
                }
                match decode_response(r.input_type, &r.response, args.print) {
                    Ok(()) => match r.input_type {
                        INPUT_BET_INFO => tally.bets += 1,
                        INPUT_NODE_INFO => tally.node_infos += 1,
                        _ => tally.id_lists += 1,
                    },
                    Err(e) => {
                        tally.failed += 1;
                        eprintln!("seq={} {}: {e:#}", r.seq, layout.name);
                    }
                }
            }
        }
    }

    eprintln!(
        "Read {} frames: {} bets, {} node infos, {} id lists, {} unknown, {} failed.",
        rdr.frames_read(),
        tally.bets,
        tally.node_infos,
        tally.id_lists,
        tally.unknown,
        tally.failed
    );
    if args.strict && tally.failed > 0 {
        anyhow::bail!("{} responses failed to decode", tally.failed);
    }
    Ok(())
}
