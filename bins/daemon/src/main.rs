//! The long-running process: one Chain Adapter connection, one persistence
//! handle, the engines built on top of them, the Coordinator Bridge relay,
//! the Scheduler's single cooperative tick loop, and the Control IPC socket
//! the CLI talks to. Wiring mirrors the teacher's `mm2_bin_lib`/`lp_init`
//! "build the context, spawn the loops, wait for shutdown" shape.

use chain_adapter::kaspa_ws::KaspaWsChainAdapter;
use coinjoin_engine::CoinJoinEngine;
use control::Controller;
use coord_bridge::BridgeServer;
use kaspa_privacy_common::clock::SystemClock;
use kaspa_privacy_common::config::{env_or, env_or_string, BridgeConfig, ChainAdapterConfig, DbConfig, SessionConfig};
use mixer_engine::MixerEngine;
use privacy_db::sqlite::SqliteSessionStore;
use scheduler::Scheduler;
use std::sync::Arc;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::watch;
use utxo_service::UtxoService;

#[tokio::main]
async fn main() {
    env_logger::init();

    let db_path = env_or_string("DB_PATH", &DbConfig::default().path);
    let socket_path = env_or_string("IPC_SOCKET", "/tmp/kpriv.sock");
    let node_url = env_or_string("NODE_URL", &ChainAdapterConfig::default().node_url);
    let bridge_port = env_or::<u16>("BRIDGE_PORT", BridgeConfig::default().port);
    let participant_count = env_or::<usize>("PARTICIPANT_COUNT", SessionConfig::default().participant_count);
    let intermediate_delay_ms = env_or::<u64>("INTERMEDIATE_DELAY_MS", SessionConfig::default().intermediate_delay_ms);

    let session_config = SessionConfig { intermediate_delay_ms, participant_count, ..SessionConfig::default() };
    let chain_config = ChainAdapterConfig { node_url, ..ChainAdapterConfig::default() };
    let bridge_config = BridgeConfig { port: bridge_port, ..BridgeConfig::default() };

    log::info!("connecting to kaspa node at {}", chain_config.node_url);
    let chain = match KaspaWsChainAdapter::connect(chain_config).await {
        Ok(chain) => Arc::new(chain),
        Err(e) => {
            log::error!("could not connect to chain adapter: {e}");
            std::process::exit(2);
        },
    };

    let db: Arc<dyn privacy_db::SessionStore> = match SqliteSessionStore::open(&db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log::error!("could not open session store at {db_path}: {e}");
            std::process::exit(1);
        },
    };

    let clock = Arc::new(SystemClock);
    let mixer = Arc::new(MixerEngine::new(chain.clone(), db.clone(), clock.clone(), session_config.clone()));
    let utxos = Arc::new(UtxoService::new(chain.clone()));
    let coinjoin =
        Arc::new(CoinJoinEngine::new(chain.clone(), db.clone(), clock.clone(), session_config.clone(), utxos.clone()));
    let bridge = BridgeServer::new(participant_count, clock.clone(), bridge_config.clone());
    let controller = Arc::new(Controller::new(mixer.clone(), coinjoin.clone(), utxos.clone(), participant_count));

    let (stop_tx, stop_rx) = watch::channel(false);

    let bridge_listener = match TcpListener::bind(("0.0.0.0", bridge_config.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("could not bind coordinator bridge on port {}: {e}", bridge_config.port);
            std::process::exit(1);
        },
    };
    log::info!("coordinator bridge listening on 0.0.0.0:{}", bridge_config.port);
    tokio::spawn(bridge.clone().serve(bridge_listener));

    if std::path::Path::new(&socket_path).exists() {
        let _ = std::fs::remove_file(&socket_path);
    }
    let ipc_listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("could not bind control socket at {socket_path}: {e}");
            std::process::exit(1);
        },
    };
    log::info!("control ipc listening on {socket_path}");
    tokio::spawn(control::ipc::serve(controller.clone(), ipc_listener));

    let scheduler = Arc::new(Scheduler::new(mixer.clone(), Some(bridge.clone())));
    tokio::spawn(scheduler.run(stop_rx));

    if tokio::signal::ctrl_c().await.is_ok() {
        log::info!("shutting down");
    }
    let _ = stop_tx.send(true);
}
