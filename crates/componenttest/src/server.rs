//! Spawning and supervising helper processes (redis-server and friends)

use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{ComponentError, ComponentResult};

/// How long a process gets between SIGTERM and SIGKILL
const GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Configuration for spawning a helper process
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Short name used in logs and errors
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(String, String)>,
}

impl ProcessConfig {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Handle to a running process; the process is stopped on drop
pub struct ProcessHandle {
    name: String,
    child: Option<Child>,
}

impl ProcessHandle {
    pub fn spawn(config: ProcessConfig) -> ComponentResult<Self> {
        info!("Spawning {} ({})", config.name, config.program.display());

        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args)
            .envs(config.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd.spawn().map_err(|e| {
            ComponentError::ProcessStartup(format!(
                "Failed to spawn {}: {}",
                config.program.display(),
                e
            ))
        })?;

        Ok(Self {
            name: config.name,
            child: Some(child),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Whether the process has been started and has not exited
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) | Some(Err(_)) | None => false,
        }
    }

    /// Poll `probe` every `interval` until it reports ready or `timeout` passes
    pub async fn wait_until_ready<F, Fut>(
        &mut self,
        timeout: Duration,
        interval: Duration,
        mut probe: F,
    ) -> ComponentResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout {
            attempts += 1;
            if probe().await {
                debug!("{} ready after {} attempts", self.name, attempts);
                return Ok(());
            }
            if !self.is_running() {
                return Err(ComponentError::ProcessStartup(format!(
                    "{} exited before becoming ready",
                    self.name
                )));
            }
            if attempts == 1 {
                info!("Waiting for {} to start...", self.name);
            }
            sleep(interval).await;
        }

        Err(ComponentError::ProcessNotReady {
            name: self.name.clone(),
            attempts,
        })
    }

    /// SIGTERM, a short grace period, then kill
    pub fn stop(&mut self) -> ComponentResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        info!("Stopping {} (pid: {})", self.name, child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                let deadline = Instant::now() + GRACE_PERIOD;
                while Instant::now() < deadline {
                    if let Ok(Some(_)) = child.try_wait() {
                        return Ok(());
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
        }

        if let Err(e) = child.kill() {
            warn!("Failed to kill {}: {}", self.name, e);
        }
        child.wait()?;
        Ok(())
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("name", &self.name)
            .field("pid", &self.pid())
            .finish()
    }
}

/// Ask the OS for a port that is free right now
pub fn find_free_port() -> ComponentResult<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port() {
        let port = find_free_port().unwrap();
        assert!(port > 1024);
    }

    #[test]
    fn test_spawn_missing_binary() {
        let err = ProcessHandle::spawn(ProcessConfig::new("ghost", "/nonexistent/ghost-binary"))
            .unwrap_err();
        assert!(matches!(err, ComponentError::ProcessStartup(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_running_process() {
        let mut handle = ProcessHandle::spawn(ProcessConfig::new("sleeper", "sleep").arg("30")).unwrap();
        assert!(handle.is_running());

        handle
            .wait_until_ready(Duration::from_secs(1), Duration::from_millis(10), || async { true })
            .await
            .unwrap();

        handle.stop().unwrap();
        assert!(!handle.is_running());
        assert!(handle.pid().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_times_out() {
        let mut handle = ProcessHandle::spawn(ProcessConfig::new("sleeper", "sleep").arg("30")).unwrap();
        let err = handle
            .wait_until_ready(Duration::from_millis(250), Duration::from_millis(100), || async { false })
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentError::ProcessNotReady { attempts, .. } if attempts >= 2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_process_is_not_ready() {
        let mut handle = ProcessHandle::spawn(ProcessConfig::new("quick", "true")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let err = handle
            .wait_until_ready(Duration::from_secs(2), Duration::from_millis(50), || async { false })
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentError::ProcessStartup(_)));
    }
}
