//! Idle-duration sources.
//!
//! The monitor asks a single [`IdleSource`] for the current idle duration
//! once per tick. Sources never fail from the caller's point of view: when
//! the platform query fails they log it and report zero, so a broken source
//! can never start a warning.

pub mod logind;
pub mod x11;

use std::env;
use std::ffi::OsString;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

pub use logind::LogindIdleSource;
pub use x11::X11IdleSource;

/// Supplies the time since the last keyboard/mouse input.
#[async_trait]
pub trait IdleSource: Send + Sync {
    /// Current idle duration in seconds, zero or positive.
    ///
    /// Returns 0 if the platform query fails.
    async fn idle_seconds(&self) -> f64;

    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Which idle backend to use.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdleBackend {
    /// X11 on an X11 session, logind otherwise (Wayland included).
    #[default]
    Auto,
    /// systemd-logind `IdleHint`/`IdleSinceHint`.
    Logind,
    /// `XScreenSaver` extension.
    X11,
}

impl IdleBackend {
    /// Resolve `Auto` against the environment.
    pub fn resolve(self) -> Self {
        self.resolve_with(|name| env::var_os(name))
    }

    /// Resolve `Auto` using `var` to read environment variables.
    ///
    /// Wayland sessions export `DISPLAY` for XWayland, but the screensaver
    /// extension there only sees input sent to X clients, so Wayland is
    /// checked first.
    fn resolve_with(self, var: impl Fn(&str) -> Option<OsString>) -> Self {
        let is_set = |name: &str| var(name).is_some_and(|v| !v.is_empty());
        match self {
            Self::Auto => {
                let wayland = is_set("WAYLAND_DISPLAY")
                    || var("XDG_SESSION_TYPE").is_some_and(|t| t == "wayland");
                if !wayland && is_set("DISPLAY") {
                    Self::X11
                } else {
                    Self::Logind
                }
            }
            other => other,
        }
    }
}

/// Connect the configured backend.
pub async fn connect(backend: IdleBackend) -> Result<Box<dyn IdleSource>> {
    let resolved = backend.resolve();
    debug!("Idle backend {:?} resolved to {:?}", backend, resolved);

    match resolved {
        IdleBackend::X11 => Ok(Box::new(X11IdleSource::connect()?)),
        IdleBackend::Logind | IdleBackend::Auto => Ok(Box::new(LogindIdleSource::connect().await?)),
    }
}

/// Convert a failed or negative reading into the "not idle" value.
pub(crate) fn sanitize(reading: Result<f64>, backend: &str) -> f64 {
    match reading {
        Ok(secs) if secs.is_finite() && secs > 0.0 => secs,
        Ok(_) => 0.0,
        Err(e) => {
            tracing::warn!("Failed to query idle time from {}: {:#}", backend, e);
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert!((sanitize(Ok(12.5), "test") - 12.5).abs() < f64::EPSILON);
        assert!(sanitize(Ok(-3.0), "test").abs() < f64::EPSILON);
        assert!(sanitize(Ok(f64::NAN), "test").abs() < f64::EPSILON);
        assert!(sanitize(Err(anyhow::anyhow!("no display")), "test").abs() < f64::EPSILON);
    }

    #[test]
    fn test_explicit_backend_resolves_to_itself() {
        assert_eq!(IdleBackend::Logind.resolve(), IdleBackend::Logind);
        assert_eq!(IdleBackend::X11.resolve(), IdleBackend::X11);
        assert_ne!(IdleBackend::Auto.resolve(), IdleBackend::Auto);
    }

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| {
            vars.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| OsString::from(v))
        }
    }

    #[test]
    fn test_auto_picks_x11_on_x11_session() {
        let env = env_of(&[("DISPLAY", ":0"), ("XDG_SESSION_TYPE", "x11")]);
        assert_eq!(IdleBackend::Auto.resolve_with(env), IdleBackend::X11);
    }

    #[test]
    fn test_auto_picks_logind_on_wayland() {
        let env = env_of(&[
            ("DISPLAY", ":0"),
            ("WAYLAND_DISPLAY", "wayland-0"),
            ("XDG_SESSION_TYPE", "wayland"),
        ]);
        assert_eq!(IdleBackend::Auto.resolve_with(env), IdleBackend::Logind);

        let env = env_of(&[("DISPLAY", ":0"), ("XDG_SESSION_TYPE", "wayland")]);
        assert_eq!(IdleBackend::Auto.resolve_with(env), IdleBackend::Logind);

        let env = env_of(&[("DISPLAY", ":0"), ("WAYLAND_DISPLAY", "wayland-1")]);
        assert_eq!(IdleBackend::Auto.resolve_with(env), IdleBackend::Logind);
    }

    #[test]
    fn test_auto_without_display_picks_logind() {
        assert_eq!(IdleBackend::Auto.resolve_with(env_of(&[])), IdleBackend::Logind);
        let env = env_of(&[("DISPLAY", "")]);
        assert_eq!(IdleBackend::Auto.resolve_with(env), IdleBackend::Logind);
    }

    #[test]
    fn test_explicit_x11_ignores_wayland() {
        let env = env_of(&[("WAYLAND_DISPLAY", "wayland-0")]);
        assert_eq!(IdleBackend::X11.resolve_with(env), IdleBackend::X11);
    }

    #[test]
    fn test_backend_parse() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: IdleBackend,
        }

        let parsed: Wrapper = toml::from_str(r#"backend = "x11""#).unwrap();
        assert_eq!(parsed.backend, IdleBackend::X11);
    }
}
