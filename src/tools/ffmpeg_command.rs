use anyhow::{Context, Result, bail};
use log::{debug, warn};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// 子程序狀態輪詢間隔
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
}

/// 執行外部程序直到結束、逾時或被要求停止
///
/// stdout/stderr 由背景執行緒讀取，避免管線緩衝區塞滿造成死結。
/// 逾時或 `should_stop` 回傳 true 時終止子程序並回傳錯誤；此時不等待讀取執行緒，
/// 孫程序仍持有管線時它們會在管線關閉後自行結束。
pub fn run_command(
    mut command: Command,
    timeout: Duration,
    should_stop: &dyn Fn() -> bool,
) -> Result<CommandOutput> {
    let program = command.get_program().to_string_lossy().to_string();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("無法執行 {program}"))?;
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                terminate(&mut child, &program);
                bail!("無法檢查 {program} 程序狀態: {e}");
            }
        }

        if should_stop() {
            terminate(&mut child, &program);
            bail!("{program} 已中止");
        }

        if started.elapsed() >= timeout {
            terminate(&mut child, &program);
            bail!("{program} 執行逾時 ({:.1}s)", timeout.as_secs_f64());
        }

        thread::sleep(POLL_INTERVAL);
    };

    let stdout = collect(stdout_reader);
    let stderr = String::from_utf8_lossy(&collect(stderr_reader)).to_string();

    if !status.success() {
        bail!("{program} 執行失敗 ({status}): {}", stderr.trim());
    }

    debug!("{program} 完成，耗時 {:.2}s", started.elapsed().as_secs_f64());
    if !stderr.trim().is_empty() {
        debug!("{program} stderr: {}", stderr.trim());
    }
    Ok(CommandOutput { stdout })
}

/// 檢查 PATH 上是否有可執行的工具（例如 `ffmpeg`、`ffprobe`）
#[must_use]
pub fn tool_available(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

fn terminate(child: &mut Child, program: &str) {
    warn!("終止程序 {program} [{}]", child.id());
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    source.map(|mut reader| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
