/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Session configuration.
//!
//! A [`SessionConfig`] is built either with the `with_*` setters or from a
//! flat settings dictionary keyed by the names in [`settings`]. Parsing only
//! checks that values are well-formed; [`SessionConfig::validate`] applies the
//! structural rules the initiator enforces when it starts.

use fixlink_core::error::ConfigError;
use fixlink_core::types::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Recognised settings keys.
pub mod settings {
    /// FIX version of the session.
    pub const BEGIN_STRING: &str = "BeginString";
    /// Local CompID.
    pub const SENDER_COMP_ID: &str = "SenderCompID";
    /// Counterparty CompID.
    pub const TARGET_COMP_ID: &str = "TargetCompID";
    /// Local sub ID.
    pub const SENDER_SUB_ID: &str = "SenderSubID";
    /// Counterparty sub ID.
    pub const TARGET_SUB_ID: &str = "TargetSubID";
    /// Qualifier separating sessions with identical CompIDs.
    pub const SESSION_QUALIFIER: &str = "SessionQualifier";
    /// Seconds between a disconnect and the next connect attempt.
    pub const RECONNECT_INTERVAL: &str = "ReconnectInterval";
    /// Remote address to connect to.
    pub const SOCKET_CONNECT_HOST: &str = "SocketConnectHost";
    /// Remote port to connect to.
    pub const SOCKET_CONNECT_PORT: &str = "SocketConnectPort";
    /// Heartbeat interval in seconds.
    pub const HEART_BT_INT: &str = "HeartBtInt";
    /// Seconds allowed for the transport connect.
    pub const CONNECT_TIMEOUT: &str = "ConnectTimeout";
    /// Seconds allowed for the Logon acknowledgement.
    pub const LOGON_TIMEOUT: &str = "LogonTimeout";
    /// Seconds allowed for the Logout acknowledgement.
    pub const LOGOUT_TIMEOUT: &str = "LogoutTimeout";
    /// Reset sequence numbers on every logon (`Y`/`N`).
    pub const RESET_ON_LOGON: &str = "ResetOnLogon";
    /// Reset sequence numbers whenever the transport drops (`Y`/`N`).
    pub const RESET_ON_DISCONNECT: &str = "ResetOnDisconnect";
}

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(30);

/// Longest accepted interval or timeout.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for one initiated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Identity of the session.
    pub session_id: SessionId,
    /// Remote host (`SocketConnectHost`).
    pub connect_host: Option<String>,
    /// Remote port (`SocketConnectPort`).
    pub connect_port: Option<u16>,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_interval: Duration,
    /// Heartbeat interval announced in the Logon.
    pub heartbeat_interval: Duration,
    /// Bound on a single transport connect.
    pub connect_timeout: Duration,
    /// Bound on the logon handshake.
    pub logon_timeout: Duration,
    /// Bound on the graceful logoff handshake.
    pub logout_timeout: Duration,
    /// Whether to reset sequence numbers on logon.
    pub reset_on_logon: bool,
    /// Whether to reset sequence numbers when the transport drops.
    pub reset_on_disconnect: bool,
    /// Maximum frame size in bytes.
    pub max_message_size: usize,
}

impl SessionConfig {
    /// Creates a configuration with default timings and no connect address.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            connect_host: None,
            connect_port: None,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            logon_timeout: Duration::from_secs(10),
            logout_timeout: Duration::from_secs(2),
            reset_on_logon: false,
            reset_on_disconnect: false,
            max_message_size: 1024 * 1024, // 1MB
        }
    }

    /// Sets the remote address.
    #[must_use]
    pub fn with_connect_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.connect_host = Some(host.into());
        self.connect_port = Some(port);
        self
    }

    /// Sets the reconnect interval.
    #[must_use]
    pub const fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub const fn with_logon_timeout(mut self, timeout: Duration) -> Self {
        self.logon_timeout = timeout;
        self
    }

    /// Sets the logout timeout.
    #[must_use]
    pub const fn with_logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = timeout;
        self
    }

    /// Sets whether to reset sequence numbers on logon.
    #[must_use]
    pub const fn with_reset_on_logon(mut self, reset: bool) -> Self {
        self.reset_on_logon = reset;
        self
    }

    /// Sets whether to reset sequence numbers on disconnect.
    #[must_use]
    pub const fn with_reset_on_disconnect(mut self, reset: bool) -> Self {
        self.reset_on_disconnect = reset;
        self
    }

    /// Sets the maximum frame size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Parses a configuration from a settings dictionary.
    ///
    /// `BeginString`, `SenderCompID` and `TargetCompID` are required; every
    /// other key falls back to its default. Timing values are whole seconds.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingSetting` for an absent identity key and
    /// `ConfigError::InvalidSetting` for a value that does not parse.
    pub fn from_settings(values: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let raw = RawSettings { values };

        let mut session_id = SessionId::new(
            raw.required(settings::BEGIN_STRING)?,
            raw.required(settings::SENDER_COMP_ID)?,
            raw.required(settings::TARGET_COMP_ID)?,
        );
        session_id.sender_sub_id = raw.get(settings::SENDER_SUB_ID).map(str::to_string);
        session_id.target_sub_id = raw.get(settings::TARGET_SUB_ID).map(str::to_string);
        session_id.session_qualifier = raw.get(settings::SESSION_QUALIFIER).map(str::to_string);

        let label = session_id.to_string();
        let mut config = Self::new(session_id);
        config.connect_host = raw.get(settings::SOCKET_CONNECT_HOST).map(str::to_string);
        if let Some(port) = raw.get(settings::SOCKET_CONNECT_PORT) {
            config.connect_port = Some(port.parse().map_err(|_| ConfigError::InvalidSetting {
                session: label.clone(),
                setting: settings::SOCKET_CONNECT_PORT,
                value: port.to_string(),
                reason: "expected a port number between 0 and 65535".to_string(),
            })?);
        }

        let seconds = |key: &'static str, slot: &mut Duration| -> Result<(), ConfigError> {
            if let Some(value) = raw.get(key) {
                let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidSetting {
                    session: label.clone(),
                    setting: key,
                    value: value.to_string(),
                    reason: "expected a whole number of seconds".to_string(),
                })?;
                *slot = Duration::from_secs(secs);
            }
            Ok(())
        };
        seconds(settings::RECONNECT_INTERVAL, &mut config.reconnect_interval)?;
        seconds(settings::HEART_BT_INT, &mut config.heartbeat_interval)?;
        seconds(settings::CONNECT_TIMEOUT, &mut config.connect_timeout)?;
        seconds(settings::LOGON_TIMEOUT, &mut config.logon_timeout)?;
        seconds(settings::LOGOUT_TIMEOUT, &mut config.logout_timeout)?;

        let flag = |key: &'static str, slot: &mut bool| -> Result<(), ConfigError> {
            match raw.get(key) {
                None => Ok(()),
                Some("Y") => {
                    *slot = true;
                    Ok(())
                }
                Some("N") => {
                    *slot = false;
                    Ok(())
                }
                Some(other) => Err(ConfigError::InvalidSetting {
                    session: label.clone(),
                    setting: key,
                    value: other.to_string(),
                    reason: "expected Y or N".to_string(),
                }),
            }
        };
        flag(settings::RESET_ON_LOGON, &mut config.reset_on_logon)?;
        flag(settings::RESET_ON_DISCONNECT, &mut config.reset_on_disconnect)?;

        Ok(config)
    }

    /// Checks the rules the initiator needs before it can dial out.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingSetting` when host or port is absent and
    /// `ConfigError::InvalidSetting` for empty identity fields, port 0 or an
    /// interval that is zero or longer than [`MAX_DURATION`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let label = self.session_id.to_string();
        let invalid = |setting: &'static str, value: String, reason: &str| {
            ConfigError::InvalidSetting {
                session: label.clone(),
                setting,
                value,
                reason: reason.to_string(),
            }
        };

        for (setting, value) in [
            (settings::BEGIN_STRING, &self.session_id.begin_string),
            (settings::SENDER_COMP_ID, &self.session_id.sender_comp_id),
            (settings::TARGET_COMP_ID, &self.session_id.target_comp_id),
        ] {
            if value.is_empty() {
                return Err(invalid(setting, String::new(), "must not be empty"));
            }
        }

        match self.connect_host.as_deref() {
            None => {
                return Err(ConfigError::MissingSetting {
                    session: label.clone(),
                    setting: settings::SOCKET_CONNECT_HOST,
                });
            }
            Some("") => {
                return Err(invalid(
                    settings::SOCKET_CONNECT_HOST,
                    String::new(),
                    "must not be empty",
                ));
            }
            Some(_) => {}
        }
        match self.connect_port {
            None => {
                return Err(ConfigError::MissingSetting {
                    session: label.clone(),
                    setting: settings::SOCKET_CONNECT_PORT,
                });
            }
            Some(0) => {
                return Err(invalid(
                    settings::SOCKET_CONNECT_PORT,
                    "0".to_string(),
                    "port must be positive",
                ));
            }
            Some(_) => {}
        }

        for (setting, value) in [
            (settings::RECONNECT_INTERVAL, self.reconnect_interval),
            (settings::HEART_BT_INT, self.heartbeat_interval),
            (settings::CONNECT_TIMEOUT, self.connect_timeout),
            (settings::LOGON_TIMEOUT, self.logon_timeout),
            (settings::LOGOUT_TIMEOUT, self.logout_timeout),
        ] {
            if value.is_zero() {
                return Err(invalid(setting, "0".to_string(), "must be positive"));
            }
            if value > MAX_DURATION {
                return Err(invalid(
                    setting,
                    value.as_secs().to_string(),
                    "must not exceed one day",
                ));
            }
        }
        Ok(())
    }

    /// Returns `host:port`, or an empty string if either part is missing.
    #[must_use]
    pub fn connect_addr(&self) -> String {
        match (&self.connect_host, self.connect_port) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            _ => String::new(),
        }
    }
}

struct RawSettings<'a> {
    values: &'a HashMap<String, String>,
}

impl RawSettings<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.trim())
    }

    fn required(&self, key: &'static str) -> Result<&str, ConfigError> {
        self.get(key).ok_or(ConfigError::MissingSetting {
            session: "<unnamed>".to_string(),
            setting: key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("BeginString", "FIX.4.4"),
            ("SenderCompID", "CLIENT"),
            ("TargetCompID", "SERVER"),
        ]
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::new(SessionId::new("FIX.4.4", "CLIENT", "SERVER"));
        assert_eq!(config.reconnect_interval, DEFAULT_RECONNECT_INTERVAL);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert!(config.connect_host.is_none());
        assert_eq!(config.connect_addr(), "");
    }

    #[test]
    fn test_from_settings_full() {
        let mut pairs = base();
        pairs.extend([
            ("SessionQualifier", "MD"),
            ("SocketConnectHost", "10.0.0.5"),
            ("SocketConnectPort", "9876"),
            ("ReconnectInterval", "5"),
            ("HeartBtInt", "20"),
            ("ResetOnLogon", "Y"),
        ]);
        let config = SessionConfig::from_settings(&dictionary(&pairs)).unwrap();

        assert_eq!(config.session_id.session_qualifier.as_deref(), Some("MD"));
        assert_eq!(config.connect_addr(), "10.0.0.5:9876");
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(20));
        assert!(config.reset_on_logon);
        assert!(!config.reset_on_disconnect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_settings_missing_identity() {
        let settings = dictionary(&[("BeginString", "FIX.4.4"), ("SenderCompID", "CLIENT")]);
        assert_eq!(
            SessionConfig::from_settings(&settings),
            Err(ConfigError::MissingSetting {
                session: "<unnamed>".to_string(),
                setting: "TargetCompID",
            })
        );
    }

    #[test]
    fn test_from_settings_rejects_malformed_values() {
        let mut pairs = base();
        pairs.push(("ReconnectInterval", "-3"));
        assert!(matches!(
            SessionConfig::from_settings(&dictionary(&pairs)),
            Err(ConfigError::InvalidSetting {
                setting: "ReconnectInterval",
                ..
            })
        ));

        let mut pairs = base();
        pairs.push(("SocketConnectPort", "70000"));
        assert!(matches!(
            SessionConfig::from_settings(&dictionary(&pairs)),
            Err(ConfigError::InvalidSetting {
                setting: "SocketConnectPort",
                ..
            })
        ));

        let mut pairs = base();
        pairs.push(("ResetOnLogon", "yes"));
        assert!(SessionConfig::from_settings(&dictionary(&pairs)).is_err());
    }

    #[test]
    fn test_validate_requires_address() {
        let config = SessionConfig::new(SessionId::new("FIX.4.4", "CLIENT", "SERVER"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSetting {
                setting: "SocketConnectHost",
                ..
            })
        ));

        let mut config = config.with_connect_address("localhost", 9876);
        config.connect_port = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSetting {
                setting: "SocketConnectPort",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_reconnect_interval() {
        let mut pairs = base();
        pairs.extend([
            ("SocketConnectHost", "localhost"),
            ("SocketConnectPort", "9876"),
            ("ReconnectInterval", "0"),
        ]);
        let config = SessionConfig::from_settings(&dictionary(&pairs)).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting {
                setting: "ReconnectInterval",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_unbounded_timeouts() {
        let config = SessionConfig::new(SessionId::new("FIX.4.4", "CLIENT", "SERVER"))
            .with_connect_address("localhost", 9876)
            .with_logout_timeout(Duration::from_secs(u64::MAX));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting {
                setting: "LogoutTimeout",
                ..
            })
        ));

        let config = SessionConfig::new(SessionId::new("FIX.4.4", "CLIENT", "SERVER"))
            .with_connect_address("localhost", 9876)
            .with_heartbeat_interval(MAX_DURATION + Duration::from_secs(1));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting {
                setting: "HeartBtInt",
                ..
            })
        ));

        let config = SessionConfig::new(SessionId::new("FIX.4.4", "CLIENT", "SERVER"))
            .with_connect_address("localhost", 9876)
            .with_reconnect_interval(MAX_DURATION);
        assert!(config.validate().is_ok());
    }
}
