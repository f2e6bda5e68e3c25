//! Helper-process dial strategy: for protocols the prober can't
//! dial directly (anything beyond HTTP/HTTPS/SOCKS4/SOCKS5), a short-lived
//! external client binary terminates the proxy protocol on a loopback port
//! so the prober can then speak plain HTTP/SOCKS through it.
//!
//! Which binary and what argument shape is deliberately left as a
//! configuration detail — this module only owns the
//! process lifecycle: lease a loopback port, spawn, guarantee teardown on
//! every exit path (including panics unwinding through the guard), return
//! the port to the pool.

use crate::error::{Error, Result};
use std::net::TcpListener;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::time::{timeout, Duration};

/// Template for the command used to start a helper for a given protocol.
/// `{port}` and `{config}` are substituted at spawn time. Left generic
/// because the concrete client binary is an operator choice, not something
/// this crate hardcodes.
#[derive(Debug, Clone)]
pub struct HelperCommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl HelperCommandTemplate {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    fn render(&self, port: u16, raw_uri: &str) -> (String, Vec<String>) {
        let args = self
            .args
            .iter()
            .map(|a| a.replace("{port}", &port.to_string()).replace("{uri}", raw_uri))
            .collect();
        (self.program.clone(), args)
    }
}

/// Find a free loopback TCP port by binding to port 0 and releasing it
/// immediately. There's an inherent (tiny, accepted) race between release
/// and the helper binding it, same as any "ask the OS for a free port" idiom.
fn lease_loopback_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").map_err(|e| Error::probe(format!("no loopback port available: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::probe(format!("failed to read loopback port: {e}")))?
        .port();
    drop(listener);
    Ok(port)
}

/// RAII guard around a running helper process. Dropping it — on any path,
/// including an early `?` return from the prober — kills the child and
/// frees the port for reuse.
pub struct HelperProcess {
    child: Child,
    port: u16,
}

impl HelperProcess {
    /// Spawn a helper for `raw_uri`, waiting up to `startup_timeout` for the
    /// loopback port to start accepting connections before declaring
    /// `helper_startup_failed`.
    pub async fn spawn(
        template: &HelperCommandTemplate,
        raw_uri: &str,
        startup_timeout: Duration,
    ) -> Result<Self> {
        let port = lease_loopback_port()?;
        let (program, args) = template.render(port, raw_uri);

        tracing::debug!(
            program = %program,
            uri = %proxyforge_observability::logging::mask_if_sensitive(raw_uri, true),
            port,
            "spawning helper process"
        );

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::probe(format!("helper spawn failed: {e}")))?;

        let mut helper = Self { child, port };
        helper.wait_until_ready(startup_timeout).await?;
        Ok(helper)
    }

    async fn wait_until_ready(&mut self, startup_timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + startup_timeout;
        loop {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(Error::probe(format!("helper exited early with {status}")));
            }
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::probe("helper did not open its loopback port in time"));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// The loopback address the prober should now dial as an ordinary
    /// HTTP/SOCKS proxy.
    pub fn proxy_addr(&self) -> (&'static str, u16) {
        ("127.0.0.1", self.port)
    }

    /// Explicit, awaited teardown for the common-path exit (as opposed to
    /// the `Drop`-driven teardown on error/cancellation paths).
    pub async fn shutdown(mut self) {
        let _ = self.child.start_kill();
        let _ = timeout(Duration::from_secs(2), self.child.wait()).await;
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        // `kill_on_drop(true)` on the Command handles the actual kill;
        // this just guarantees we don't leak a zombie on an abrupt drop
        // without an await point available (e.g. unwinding).
        let _ = self.child.start_kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_loopback_port_returns_usable_port() {
        let port = lease_loopback_port().unwrap();
        assert!(port > 0);
    }

    #[test]
    fn command_template_substitutes_port_and_uri() {
        let template = HelperCommandTemplate::new(
            "proxy-helper",
            vec!["--listen".into(), "127.0.0.1:{port}".into(), "--uri".into(), "{uri}".into()],
        );
        let (program, args) = template.render(18080, "trojan://pw@example.com:443");
        assert_eq!(program, "proxy-helper");
        assert_eq!(args[1], "127.0.0.1:18080");
        assert_eq!(args[3], "trojan://pw@example.com:443");
    }

    #[tokio::test]
    async fn spawning_a_missing_binary_fails_cleanly() {
        let template = HelperCommandTemplate::new("this-binary-does-not-exist-anywhere", vec![]);
        let result = HelperProcess::spawn(&template, "trojan://pw@example.com:443", Duration::from_millis(200)).await;
        assert!(result.is_err());
    }
}
