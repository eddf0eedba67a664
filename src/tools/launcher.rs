//! 应用启动器：按名称启动本机应用，只负责拉起进程，不等待、不检查退出码
//!
//! Windows 走 `cmd /C start "" <app>`，macOS 走 `open -a <app>`，其它平台直接以应用名为可执行文件。

use std::io;
use std::process::Stdio;
use std::sync::Mutex;

use tokio::process::Command;

/// 启动接口（测试中用 RecordingLauncher 替换）
pub trait AppLauncher: Send + Sync {
    fn launch(&self, app: &str) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl SystemLauncher {
    fn command(app: &str) -> Command {
        if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", "", app]);
            cmd
        } else if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.args(["-a", app]);
            cmd
        } else {
            Command::new(app)
        }
    }
}

impl AppLauncher for SystemLauncher {
    fn launch(&self, app: &str) -> io::Result<()> {
        let child = Self::command(app)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()?;
        tracing::info!(app = %app, pid = ?child.id(), "application launched");
        Ok(())
    }
}

/// 只记录、不启动
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    launched: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次启动都返回 NotFound
    pub fn failing() -> Self {
        Self {
            launched: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl AppLauncher for RecordingLauncher {
    fn launch(&self, app: &str) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::NotFound, app.to_string()));
        }
        if let Ok(mut launched) = self.launched.lock() {
            launched.push(app.to_string());
        }
        Ok(())
    }
}
