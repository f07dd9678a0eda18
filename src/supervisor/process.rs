//! Child process spawning, output capture and termination

use crate::constants::PUMP_CHUNK_LIMIT;
use crate::error::{Result, ServyError};
use crate::rotation::{RotatingWriter, RotationPolicy};
use crate::service::{PostLaunchConfig, PreLaunchConfig, ProcessPriority, ServiceConfiguration};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Everything needed to start one process
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    /// Argument string exactly as configured
    pub args: String,
    pub working_directory: Option<String>,
    pub env: Vec<(String, String)>,
    pub priority: ProcessPriority,
}

impl CommandSpec {
    pub fn for_service(config: &ServiceConfiguration) -> Self {
        CommandSpec {
            program: config.executable_path.clone(),
            args: config.arguments.clone(),
            working_directory: config.working_directory.clone(),
            env: config.environment_variables.clone(),
            priority: config.priority,
        }
    }

    pub fn for_pre_launch(pre: &PreLaunchConfig) -> Self {
        CommandSpec {
            program: pre.exe_path.clone(),
            args: pre.args.clone(),
            working_directory: pre.working_directory.clone(),
            env: pre.env.clone(),
            priority: ProcessPriority::Normal,
        }
    }

    pub fn for_post_launch(post: &PostLaunchConfig) -> Self {
        CommandSpec {
            program: post.exe_path.clone(),
            args: post.args.clone(),
            working_directory: post.working_directory.clone(),
            env: Vec::new(),
            priority: ProcessPriority::Normal,
        }
    }

    fn command(&self, capture_stdout: bool, capture_stderr: bool) -> Command {
        let mut cmd = std::process::Command::new(&self.program);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            // hidden console of its own; no new process group, so Ctrl+C stays enabled
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            if !self.args.is_empty() {
                // the argument string is already quoted for the Windows parser
                cmd.raw_arg(&self.args);
            }
            cmd.creation_flags(self.priority.creation_flag() | CREATE_NO_WINDOW);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.args(crate::wrapper_args::split_command_line(&self.args));
            // own process group so a stop reaches the whole tree
            cmd.process_group(0);
        }

        if let Some(dir) = self.working_directory.as_deref().filter(|d| !d.is_empty()) {
            cmd.current_dir(dir);
        }
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
        cmd.stdin(Stdio::null());
        cmd.stdout(if capture_stdout { Stdio::piped() } else { Stdio::null() });
        cmd.stderr(if capture_stderr { Stdio::piped() } else { Stdio::null() });

        let mut cmd = Command::from(cmd);
        cmd.kill_on_drop(true);
        cmd
    }
}

/// Open the capture writers for a stdout/stderr path pair. Identical paths share one
/// writer. A path that cannot be opened is logged and left uncaptured.
pub fn open_writers(
    stdout: Option<&str>,
    stderr: Option<&str>,
    policy: RotationPolicy,
) -> (Option<Arc<RotatingWriter>>, Option<Arc<RotatingWriter>>) {
    let open = |path: &str| match RotatingWriter::open(path, policy) {
        Ok(writer) => Some(Arc::new(writer)),
        Err(e) => {
            tracing::warn!("Cannot open capture file {}: {}", path, e);
            None
        }
    };

    let stdout = stdout.filter(|p| !p.is_empty());
    let stderr = stderr.filter(|p| !p.is_empty());

    let out = stdout.and_then(open);
    let err = match (stdout, stderr) {
        (Some(a), Some(b)) if same_path(a, b) => out.clone(),
        (_, Some(b)) => open(b),
        _ => None,
    };
    (out, err)
}

fn same_path(a: &str, b: &str) -> bool {
    if cfg!(windows) {
        a.eq_ignore_ascii_case(b)
    } else {
        Path::new(a) == Path::new(b)
    }
}

/// Copy lines from a child pipe into `writer` until EOF. Output without a newline is
/// written in chunks of at most [`PUMP_CHUNK_LIMIT`] bytes.
fn spawn_pump<R>(source: R, writer: Arc<RotatingWriter>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(source);
        let mut line = Vec::with_capacity(256);
        loop {
            line.clear();
            let mut limited = (&mut reader).take(PUMP_CHUNK_LIMIT);
            match limited.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    if let Err(e) = writer.write(&line) {
                        tracing::warn!("Dropped output for {}: {}", writer.path().display(), e);
                    }
                }
                Err(e) => {
                    tracing::debug!("Output pipe closed: {}", e);
                    break;
                }
            }
        }
        let _ = writer.flush();
    })
}

/// A running child with its output pumps
pub struct ManagedChild {
    child: Child,
    pid: Option<u32>,
    pumps: Vec<JoinHandle<()>>,
}

impl ManagedChild {
    pub fn spawn(
        spec: &CommandSpec,
        stdout: Option<Arc<RotatingWriter>>,
        stderr: Option<Arc<RotatingWriter>>,
    ) -> Result<Self> {
        let mut child = spec
            .command(stdout.is_some(), stderr.is_some())
            .spawn()
            .map_err(|e| ServyError::ProcessStart(spec.program.clone(), e.to_string()))?;
        let pid = child.id();

        let mut pumps = Vec::new();
        if let (Some(pipe), Some(writer)) = (child.stdout.take(), stdout) {
            pumps.push(spawn_pump(pipe, writer));
        }
        if let (Some(pipe), Some(writer)) = (child.stderr.take(), stderr) {
            pumps.push(spawn_pump(pipe, writer));
        }

        #[cfg(unix)]
        if let Some(pid) = pid {
            apply_nice(pid, spec.priority);
        }

        tracing::debug!("Spawned {} (pid {:?})", spec.program, pid);
        Ok(ManagedChild { child, pid, pumps })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status if the child has already exited
    pub fn try_exit(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Failed to poll child {:?}: {}", self.pid, e);
                None
            }
        }
    }

    pub fn is_running(&mut self) -> bool {
        self.try_exit().is_none()
    }

    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Ask the child to exit, force it after `grace`, then let the pumps drain
    pub async fn stop(&mut self, grace: Duration, drain: Duration) -> Result<Option<ExitStatus>> {
        let status = if let Some(status) = self.try_exit() {
            Some(status)
        } else {
            self.terminate(grace).await?
        };
        self.drain(drain).await;
        Ok(status)
    }

    /// Wait for the output pumps to reach EOF
    pub async fn drain(&mut self, timeout: Duration) {
        for pump in self.pumps.drain(..) {
            if tokio::time::timeout(timeout, pump).await.is_err() {
                tracing::debug!("Output pump for {:?} did not finish in {:?}", self.pid, timeout);
            }
        }
    }

    #[cfg(unix)]
    async fn terminate(&mut self, grace: Duration) -> Result<Option<ExitStatus>> {
        use libc::{SIGKILL, SIGTERM, kill};

        if let Some(pid) = self.pid {
            let group_result = unsafe { kill(-(pid as i32), SIGTERM) };
            if group_result != 0 {
                let _ = unsafe { kill(pid as i32, SIGTERM) };
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => Ok(Some(status?)),
            Err(_) => {
                tracing::warn!("Process {:?} ignored SIGTERM for {:?}, killing", self.pid, grace);
                if let Some(pid) = self.pid {
                    let _ = unsafe { kill(-(pid as i32), SIGKILL) };
                }
                self.child
                    .kill()
                    .await
                    .map_err(|e| ServyError::ProcessStop(e.to_string()))?;
                Ok(self.child.try_wait()?)
            }
        }
    }

    #[cfg(windows)]
    async fn terminate(&mut self, grace: Duration) -> Result<Option<ExitStatus>> {
        let _console = console::LOCK.lock().await;
        let interrupt = match self.pid {
            Some(pid) => match console::send_ctrl_c(pid) {
                Ok(sent) => Some(sent),
                Err(e) => {
                    tracing::warn!("Could not send Ctrl+C to pid {}: {}", pid, e);
                    None
                }
            },
            None => None,
        };

        if interrupt.is_some() {
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(status) => return Ok(Some(status?)),
                Err(_) => {
                    tracing::warn!("Process {:?} ignored Ctrl+C for {:?}, killing", self.pid, grace);
                }
            }
        }
        drop(interrupt);

        self.child
            .kill()
            .await
            .map_err(|e| ServyError::ProcessStop(e.to_string()))?;
        Ok(self.child.try_wait()?)
    }
}

/// Whether `pid` is still running. An exited child that has not been reaped yet
/// counts as gone.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    // WNOWAIT leaves the exit status for `wait` to collect
    let result = unsafe {
        libc::waitid(
            libc::P_PID,
            pid as libc::id_t,
            &mut info,
            libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
        )
    };
    result == 0 && info.si_signo == 0
}

#[cfg(windows)]
pub fn is_alive(pid: u32) -> bool {
    use windows::Win32::Foundation::{BOOL, CloseHandle};
    use windows::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };
    const STILL_ACTIVE: u32 = 259;

    unsafe {
        let Ok(handle) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, BOOL::from(false), pid) else {
            return false;
        };
        let mut code = 0u32;
        let alive = GetExitCodeProcess(handle, &mut code).is_ok() && code == STILL_ACTIVE;
        let _ = CloseHandle(handle);
        alive
    }
}

/// Ctrl+C delivery to a child running on its own hidden console
#[cfg(windows)]
mod console {
    use windows::Win32::Foundation::BOOL;
    use windows::Win32::System::Console::{
        ATTACH_PARENT_PROCESS, AttachConsole, CTRL_C_EVENT, FreeConsole, GenerateConsoleCtrlEvent,
        GetConsoleWindow, SetConsoleCtrlHandler,
    };

    /// Console attachment is process-wide; one stop switches it at a time
    pub static LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    /// Ctrl+C stays ignored by this process until dropped
    pub struct CtrlCSent;

    impl Drop for CtrlCSent {
        fn drop(&mut self) {
            let _ = unsafe { SetConsoleCtrlHandler(None, BOOL::from(false)) };
        }
    }

    /// Attach to the child's console, raise Ctrl+C there, then return to our own
    pub fn send_ctrl_c(pid: u32) -> windows::core::Result<CtrlCSent> {
        unsafe {
            let had_console = !GetConsoleWindow().0.is_null();
            let _ = FreeConsole();
            let sent = AttachConsole(pid).and_then(|()| {
                SetConsoleCtrlHandler(None, BOOL::from(true))?;
                let guard = CtrlCSent;
                GenerateConsoleCtrlEvent(CTRL_C_EVENT, 0)?;
                Ok(guard)
            });
            let _ = FreeConsole();
            if had_console {
                let _ = AttachConsole(ATTACH_PARENT_PROCESS);
            }
            sent
        }
    }
}

#[cfg(unix)]
fn apply_nice(pid: u32, priority: ProcessPriority) {
    let nice = priority.nice();
    if nice == 0 {
        return;
    }
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, pid as libc::id_t, nice) };
    if result != 0 {
        tracing::warn!(
            "Could not set priority {} on pid {}: {}",
            priority,
            pid,
            std::io::Error::last_os_error()
        );
    }
}

/// Print a diagnosis of why an executable might fail to start
pub fn diagnose_executable(path: &str) -> Result<()> {
    use std::io::Read;

    let p = Path::new(path);
    println!("🔍 Diagnosing executable: {}", path);
    println!();

    if !p.exists() {
        println!("❌ File does not exist");
        return Err(ServyError::Config(format!("executable not found: {}", path)));
    }
    println!("✅ File exists");

    let metadata = std::fs::metadata(p)?;
    if metadata.is_dir() {
        println!("❌ Path points to a directory, not a file");
        return Err(ServyError::Config(format!("executable path is a directory: {}", path)));
    }
    println!("✅ Is a file ({} bytes)", metadata.len());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        println!("📋 File permissions: {:o}", mode & 0o777);
        if mode & 0o111 == 0 {
            println!("❌ File is not executable");
            println!("💡 Fix with: chmod +x {}", path);
            return Err(ServyError::Config(format!("not executable: {}", path)));
        }
    }

    let mut header = [0u8; 4];
    let read = std::fs::File::open(p)?.read(&mut header)?;
    match &header[..read] {
        [b'M', b'Z', ..] => println!("📋 Format: PE executable (Windows)"),
        [0x7f, b'E', b'L', b'F'] => println!("📋 Format: ELF executable (Linux)"),
        [0xcf, 0xfa, 0xed, 0xfe] | [0xce, 0xfa, 0xed, 0xfe] => {
            println!("📋 Format: Mach-O executable (macOS)")
        }
        [b'#', b'!', ..] => println!("📋 Format: script with shebang"),
        [] => {
            println!("❌ File is empty");
            return Err(ServyError::Config(format!("executable is empty: {}", path)));
        }
        _ => {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
            if matches!(ext.as_str(), "bat" | "cmd" | "ps1") {
                println!("📋 Format: {} script", ext);
            } else {
                println!("⚠️  Format: unknown, the service may fail to launch it");
            }
        }
    }

    println!();
    println!("🎯 Diagnosis complete");
    Ok(())
}
