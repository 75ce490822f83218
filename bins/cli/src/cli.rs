//! The command set itself, spec.md §6 "CLI surface (minimal)". Structured
//! the way the teacher's `adex_cli::cli::Cli`/`Command` pair does: one
//! `clap::Parser` root, one `Subcommand` enum, one `execute` match arm per
//! command. Structured payloads (destination lists, UTXO sets, transactions)
//! are accepted as inline JSON, since the wire format underneath is JSON
//! throughout this tool.
use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Subcommand)]
enum Command {
    #[command(about = "Start a new multi-hop mixing session")]
    Create {
        #[arg(long, help = "JSON array of {address, amount} destinations")]
        destinations: String,
        #[arg(long, help = "total amount to mix, in sompi")]
        total_amount: u64,
    },
    #[command(about = "List mixing sessions (private keys redacted)")]
    List,
    #[command(about = "Get one mixing session by id (private keys redacted)")]
    Status { id: String },
    #[command(about = "Delete a mixing session")]
    Delete { id: String },
    #[command(about = "Export a mixing session's private keys")]
    ExportKeys { id: String },
    #[command(about = "Commit to a new CoinJoin round")]
    CoinjoinCreate {
        #[arg(long, help = "per-participant amount, in sompi")]
        amount: u64,
        #[arg(long, help = "payout address")]
        destination: String,
        #[arg(long, help = "address to source the exact-amount UTXO from")]
        source_address: String,
        #[arg(long, help = "source address's private key, lowercase hex")]
        source_private_key_hex: String,
        #[arg(long, help = "always self-send a fresh UTXO instead of reusing a matching one", default_value_t = false)]
        force_fresh: bool,
    },
    #[command(about = "Reveal a CoinJoin session's destination and UTXOs")]
    CoinjoinReveal { id: String },
    #[command(about = "Assemble the unsigned transaction for a round")]
    CoinjoinBuild {
        #[arg(long, help = "the round's 10 revealed session ids, in order", num_args = 1..)]
        session_ids: Vec<String>,
    },
    #[command(about = "Sign this session's inputs in an assembled transaction")]
    CoinjoinSign {
        id: String,
        #[arg(long, help = "the assembled transaction, as JSON")]
        tx: String,
        #[arg(long, help = "JSON array mapping input index to owning session id")]
        owning_session_by_input: String,
        #[arg(long, help = "this session's private key, lowercase hex")]
        private_key_hex: String,
        #[arg(long, help = "the unsigned transaction id the assembler produced")]
        expected_unsigned_id: String,
    },
    #[command(about = "Submit a fully-signed CoinJoin transaction")]
    CoinjoinSubmit {
        #[arg(long, help = "the assembled transaction, as JSON")]
        tx: String,
        #[arg(long, help = "JSON array mapping input index to owning session id")]
        owning_session_by_input: String,
        #[arg(long, help = "JSON object mapping input index to signature hex")]
        signature_shares: String,
    },
    #[command(about = "Counts-by-status for both session kinds")]
    Stats,
}

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(long, env = "KPRIV_IPC_SOCKET", default_value = "/tmp/kpriv.sock", help = "control socket path")]
    socket: String,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub async fn execute() -> i32 {
        let cli = Self::parse();
        let socket = cli.socket.as_str();
        match cli.command {
            Command::Create { destinations, total_amount } => commands::create(socket, &destinations, total_amount).await,
            Command::List => commands::list(socket).await,
            Command::Status { id } => commands::status(socket, &id).await,
            Command::Delete { id } => commands::delete(socket, &id).await,
            Command::ExportKeys { id } => commands::export_keys(socket, &id).await,
            Command::CoinjoinCreate { amount, destination, source_address, source_private_key_hex, force_fresh } => {
                commands::coinjoin_create(socket, amount, &destination, &source_address, &source_private_key_hex, force_fresh)
                    .await
            },
            Command::CoinjoinReveal { id } => commands::coinjoin_reveal(socket, &id).await,
            Command::CoinjoinBuild { session_ids } => commands::coinjoin_build(socket, session_ids).await,
            Command::CoinjoinSign { id, tx, owning_session_by_input, private_key_hex, expected_unsigned_id } => {
                commands::coinjoin_sign(socket, &id, &tx, &owning_session_by_input, &private_key_hex, &expected_unsigned_id).await
            },
            Command::CoinjoinSubmit { tx, owning_session_by_input, signature_shares } => {
                commands::coinjoin_submit(socket, &tx, &owning_session_by_input, &signature_shares).await
            },
            Command::Stats => commands::stats(socket).await,
        }
    }
}
