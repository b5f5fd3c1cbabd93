//! Idle time via the X11 `XScreenSaver` extension.

use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;
use x11rb::connection::Connection;
use x11rb::connection::RequestConnection;
use x11rb::protocol::screensaver::ConnectionExt;
use x11rb::protocol::xproto::Window;
use x11rb::rust_connection::RustConnection;

use super::IdleSource;

/// Idle source that asks the X server for `ms_since_user_input`.
pub struct X11IdleSource {
    conn: Arc<RustConnection>,
    root: Window,
}

impl X11IdleSource {
    /// Connect to the display named by `DISPLAY`.
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .context("X server reported no screens")?;

        conn.extension_information(x11rb::protocol::screensaver::X11_EXTENSION_NAME)
            .context("Failed to query X extensions")?
            .context("MIT-SCREEN-SAVER extension not available")?;

        info!("Connected to X server (screen {})", screen_num);

        Ok(Self {
            conn: Arc::new(conn),
            root,
        })
    }

    async fn query(&self) -> Result<f64> {
        let conn = Arc::clone(&self.conn);
        let root = self.root;

        // Replies are synchronous; keep them off the async workers.
        let millis = tokio::task::spawn_blocking(move || -> Result<u32> {
            let reply = conn
                .screensaver_query_info(root)
                .context("Failed to send ScreenSaverQueryInfo")?
                .reply()
                .context("ScreenSaverQueryInfo failed")?;
            Ok(reply.ms_since_user_input)
        })
        .await
        .context("Idle query task panicked")??;

        Ok(f64::from(millis) / 1000.0)
    }
}

#[async_trait]
impl IdleSource for X11IdleSource {
    async fn idle_seconds(&self) -> f64 {
        super::sanitize(self.query().await, self.name())
    }

    fn name(&self) -> &'static str {
        "x11"
    }
}
