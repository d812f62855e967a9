/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Polling Initiator Example
//!
//! Drives a single session from the application's own loop. Sessions only
//! make progress while `poll` is being called.

use fixlink_initiator::{DriveMode, InitiatorBuilder};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

mod common;
use common::{ExampleConfig, LoggingApplication, init_logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = ExampleConfig::from_env();

    let initiator = InitiatorBuilder::new()
        .with_application(LoggingApplication)
        .add_session(cfg.session(&cfg.target_comp_id, cfg.port))
        .with_drive_mode(DriveMode::Polling)
        .with_poll_step(Duration::from_millis(20))
        .build();
    info!(mode = %initiator.drive_mode(), sessions = initiator.sessions().len(), "initiator built");

    let deadline = Instant::now() + cfg.run_for();
    let mut was_logged_on = false;
    while Instant::now() < deadline && initiator.poll().await? {
        let logged_on = initiator.is_logged_on();
        if logged_on != was_logged_on {
            info!(logged_on, "session status changed");
            was_logged_on = logged_on;
        }
        // Application work goes here.
    }

    initiator.stop().await;
    info!("done");
    Ok(())
}
