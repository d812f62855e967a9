/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Settings Initiator Example
//!
//! Builds sessions from flat key/value settings, the way they would be read
//! from a configuration file, and shows how configuration errors surface when
//! the initiator starts.

use fixlink_initiator::InitiatorBuilder;
use fixlink_session::config::{SessionConfig, settings};
use std::collections::HashMap;
use tracing::{info, warn};

mod common;
use common::{ExampleConfig, init_logging};

fn session_settings(cfg: &ExampleConfig, target: &str, port: Option<u16>) -> HashMap<String, String> {
    let mut values = HashMap::from([
        (settings::BEGIN_STRING.to_string(), "FIX.4.2".to_string()),
        (settings::SENDER_COMP_ID.to_string(), cfg.sender_comp_id.clone()),
        (settings::TARGET_COMP_ID.to_string(), target.to_string()),
        (settings::SOCKET_CONNECT_HOST.to_string(), cfg.host.clone()),
        (settings::RECONNECT_INTERVAL.to_string(), cfg.reconnect_interval.to_string()),
        (settings::HEART_BT_INT.to_string(), "20".to_string()),
        (settings::RESET_ON_LOGON.to_string(), "Y".to_string()),
    ]);
    if let Some(port) = port {
        values.insert(settings::SOCKET_CONNECT_PORT.to_string(), port.to_string());
    }
    values
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = ExampleConfig::from_env();

    // A session without SocketConnectPort parses, but fails validation.
    let incomplete = SessionConfig::from_settings(&session_settings(&cfg, "NOPORT", None))?;
    let rejected = InitiatorBuilder::new().add_session(incomplete).build();
    if let Err(e) = rejected.start().await {
        warn!(error = %e, "configuration rejected");
    }

    let config = SessionConfig::from_settings(&session_settings(&cfg, &cfg.target_comp_id, Some(cfg.port)))?;
    info!(session = %config.session_id, addr = %config.connect_addr(), "loaded session");

    let initiator = InitiatorBuilder::new().add_session(config).build();
    initiator.start().await?;
    tokio::time::sleep(cfg.run_for()).await;

    info!(logged_on = initiator.is_logged_on(), "stopping");
    initiator.stop().await;
    Ok(())
}
