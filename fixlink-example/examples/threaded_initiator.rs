/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Threaded Initiator Example
//!
//! Runs two sessions in the background: one at `FIX_HOST:FIX_PORT` and one
//! on the next port, which is usually unreachable and keeps retrying. Stops
//! after `FIX_RUN_SECS` seconds or on Ctrl-C.

use fixlink_initiator::{DriveMode, InitiatorBuilder};
use std::sync::Arc;
use tracing::info;

mod common;
use common::{ExampleConfig, LoggingApplication, init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = ExampleConfig::from_env();

    let initiator = Arc::new(
        InitiatorBuilder::new()
            .with_application(LoggingApplication)
            .add_session(cfg.session(&cfg.target_comp_id, cfg.port))
            .add_session(cfg.session("BACKUP", cfg.port + 1))
            .with_drive_mode(DriveMode::Threaded)
            .build(),
    );
    info!(mode = %initiator.drive_mode(), sessions = initiator.sessions().len(), "initiator built");

    let driver = tokio::spawn({
        let initiator = Arc::clone(&initiator);
        async move { initiator.block().await }
    });

    tokio::select! {
        _ = tokio::time::sleep(cfg.run_for()) => info!("run time elapsed"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    for snapshot in initiator.session_states() {
        info!(
            session = %snapshot.session_id,
            state = %snapshot.state,
            attempts = snapshot.connect_attempts,
            "session status"
        );
    }

    initiator.stop().await;
    driver.await??;
    info!("done");
    Ok(())
}
