//! Idle time via systemd-logind `DBus` interface.
//!
//! Reads `IdleHint` and `IdleSinceHint` from the current session. The
//! reading is the time since `IdleSinceHint` while `IdleHint` is set, and
//! zero otherwise.
//!
//! `IdleSinceHint` is when `IdleHint` last flipped, not when input last
//! arrived. The desktop only sets the hint after its own idle delay (300 s
//! on a stock GNOME session), so readings run short of true input idleness
//! by that delay. Nothing is added to compensate: the delay is desktop
//! configuration this process cannot see. Pick the threshold accordingly.

use std::env;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;
use tracing::info;
use tracing::trace;
use zbus::Connection;

use super::IdleSource;

/// `DBus` service and path for login1.
const LOGIND_SERVICE: &str = "org.freedesktop.login1";
const LOGIND_PATH: &str = "/org/freedesktop/login1";
const SESSION_INTERFACE: &str = "org.freedesktop.login1.Session";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Idle source backed by the logind session object.
///
/// Reports time since the session was marked idle, which trails the last
/// input by the desktop's idle delay.
pub struct LogindIdleSource {
    conn: Connection,

    /// Session object path in `DBus`.
    session_path: String,
}

impl LogindIdleSource {
    /// Connect to the system bus and resolve the current session.
    pub async fn connect() -> Result<Self> {
        let conn = Connection::system()
            .await
            .context("Failed to connect to system DBus")?;

        let session_path = resolve_session_path(&conn).await?;
        info!("Resolved session path: {}", session_path);

        Ok(Self { conn, session_path })
    }

    async fn query(&self) -> Result<f64> {
        let idle: bool = get_property(&self.conn, &self.session_path, "IdleHint").await?;
        if !idle {
            trace!("IdleHint not set");
            return Ok(0.0);
        }

        let since_usec: u64 = get_property(&self.conn, &self.session_path, "IdleSinceHint").await?;
        let now_usec = u64::try_from(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("System clock before Unix epoch")?
                .as_micros(),
        )
        .context("System clock out of range")?;

        Ok(idle_seconds_since(since_usec, now_usec))
    }
}

#[async_trait]
impl IdleSource for LogindIdleSource {
    async fn idle_seconds(&self) -> f64 {
        super::sanitize(self.query().await, self.name())
    }

    fn name(&self) -> &'static str {
        "logind"
    }
}

/// Seconds between two realtime microsecond stamps (zero if `since` is ahead).
#[allow(clippy::cast_precision_loss)]
fn idle_seconds_since(since_usec: u64, now_usec: u64) -> f64 {
    if since_usec == 0 {
        return 0.0;
    }
    now_usec.saturating_sub(since_usec) as f64 / 1_000_000.0
}

/// Resolve the session object path for the current session.
async fn resolve_session_path(conn: &Connection) -> Result<String> {
    // First try XDG_SESSION_ID if available
    if let Ok(session_id) = env::var("XDG_SESSION_ID") {
        debug!("Using XDG_SESSION_ID: {}", session_id);

        const MANAGER_INTERFACE: &str = "org.freedesktop.login1.Manager";

        let proxy = zbus::Proxy::new(conn, LOGIND_SERVICE, LOGIND_PATH, MANAGER_INTERFACE)
            .await
            .context("Failed to create Manager proxy")?;

        let path: zbus::zvariant::OwnedObjectPath = proxy
            .call("GetSession", &(&session_id,))
            .await
            .context("GetSession call failed")?;

        return Ok(path.to_string());
    }

    debug!("XDG_SESSION_ID not set, probing self/auto sessions");

    for alias in ["self", "auto"] {
        let path = format!("{LOGIND_PATH}/session/{alias}");
        if get_property::<bool>(conn, &path, "IdleHint").await.is_ok() {
            return Ok(path);
        }
    }

    anyhow::bail!(
        "Could not resolve session path. Set XDG_SESSION_ID or ensure logind session is available."
    )
}

/// Read a property from the session interface.
async fn get_property<T>(conn: &Connection, session_path: &str, name: &str) -> Result<T>
where
    T: TryFrom<zbus::zvariant::OwnedValue>,
{
    let proxy = zbus::Proxy::new(conn, LOGIND_SERVICE, session_path, PROPERTIES_INTERFACE)
        .await
        .context("Failed to create Properties proxy")?;

    let value: zbus::zvariant::OwnedValue = proxy
        .call("Get", &(SESSION_INTERFACE, name))
        .await
        .with_context(|| format!("Failed to get {name} property"))?;

    T::try_from(value).map_err(|_| anyhow::anyhow!("{name} has an unexpected type"))
}
