//! PTY runtime for one shell session.
//!
//! A blocking reader thread drains the PTY master and feeds an unbounded
//! channel, so the async connection loop can `select!` on shell output next
//! to WebSocket traffic.

use std::{
    io::{Read, Write},
    path::PathBuf,
};

use {
    codequest_config::GatewayConfig,
    codequest_protocol::TERM_VALUE,
    portable_pty::{CommandBuilder, PtySize, native_pty_system},
};

pub enum OutputEvent {
    Output(Vec<u8>),
    Error(String),
    Closed,
}

pub struct PtyRuntime {
    master: Box<dyn portable_pty::MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
    pub output_rx: tokio::sync::mpsc::UnboundedReceiver<OutputEvent>,
}

fn working_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
}

fn shell_command(config: &GatewayConfig) -> CommandBuilder {
    let mut cmd = CommandBuilder::new(config.shell_program());
    cmd.env("TERM", TERM_VALUE);
    cmd.env("COLORTERM", "truecolor");
    cmd.arg("-l");
    if let Some(dir) = working_dir() {
        cmd.cwd(dir);
    }
    cmd
}

/// Allocate a PTY and spawn the configured shell in it. Errors are plain
/// strings so they can be forwarded to the client verbatim.
pub fn spawn_runtime(config: &GatewayConfig, cols: u16, rows: u16) -> Result<PtyRuntime, String> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: rows.max(1),
            cols: cols.max(2),
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|err| format!("failed to allocate PTY: {err}"))?;

    let portable_pty::PtyPair { master, slave } = pair;
    let child = slave
        .spawn_command(shell_command(config))
        .map_err(|err| format!("failed to spawn shell: {err}"))?;
    drop(slave);

    let writer = master
        .take_writer()
        .map_err(|err| format!("failed to open PTY writer: {err}"))?;
    let reader = master
        .try_clone_reader()
        .map_err(|err| format!("failed to open PTY reader: {err}"))?;
    let output_rx = spawn_reader(reader)?;

    Ok(PtyRuntime {
        master,
        writer,
        child,
        output_rx,
    })
}

fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
) -> Result<tokio::sync::mpsc::UnboundedReceiver<OutputEvent>, String> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<OutputEvent>();
    std::thread::Builder::new()
        .name("codequest-pty-reader".to_string())
        .spawn(move || {
            let mut buf = vec![0_u8; 16 * 1024];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        let _ = tx.send(OutputEvent::Closed);
                        break;
                    },
                    Ok(n) => {
                        if tx.send(OutputEvent::Output(buf[..n].to_vec())).is_err() {
                            return;
                        }
                    },
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        let _ = tx.send(OutputEvent::Error(format!("PTY stream error: {err}")));
                        let _ = tx.send(OutputEvent::Closed);
                        break;
                    },
                }
            }
        })
        .map_err(|err| format!("failed to launch PTY reader thread: {err}"))?;
    Ok(rx)
}

impl PtyRuntime {
    pub fn write_input(&mut self, input: &str) -> Result<(), String> {
        self.writer
            .write_all(input.as_bytes())
            .map_err(|err| format!("failed to write to PTY: {err}"))?;
        self.writer
            .flush()
            .map_err(|err| format!("failed to flush PTY input: {err}"))?;
        Ok(())
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), String> {
        self.master
            .resize(PtySize {
                rows: rows.max(1),
                cols: cols.max(2),
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| format!("failed to resize PTY: {err}"))
    }

    /// Exit code of the shell, if it has already terminated.
    pub fn exit_code(&mut self) -> Option<u32> {
        self.child
            .try_wait()
            .ok()
            .flatten()
            .map(|status| status.exit_code())
    }

    pub fn kill(&mut self) {
        let _ = self.child.kill();
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::time::Duration};

    fn sh_config() -> GatewayConfig {
        GatewayConfig {
            shell: Some("/bin/sh".into()),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn shell_round_trip() {
        let mut runtime = spawn_runtime(&sh_config(), 80, 24).unwrap();
        runtime.write_input("echo pty-check-$((20+22))\r").unwrap();

        let mut collected = Vec::new();
        let deadline = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(event) = runtime.output_rx.recv().await {
                if let OutputEvent::Output(data) = event {
                    collected.extend_from_slice(&data);
                    if String::from_utf8_lossy(&collected).contains("pty-check-42") {
                        return;
                    }
                }
            }
        })
        .await;
        assert!(deadline.is_ok(), "shell output never arrived");
        runtime.kill();
    }

    #[tokio::test]
    async fn exit_is_observed() {
        let mut runtime = spawn_runtime(&sh_config(), 80, 24).unwrap();
        runtime.write_input("exit 7\r").unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(event) = runtime.output_rx.recv().await {
                if matches!(event, OutputEvent::Closed) {
                    return;
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "PTY never closed");
        // The reader can observe EOF slightly before the child is reaped.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runtime.exit_code(), Some(7));
    }

    #[test]
    fn resize_clamps_degenerate_sizes() {
        let mut runtime = spawn_runtime(&sh_config(), 80, 24).unwrap();
        assert!(runtime.resize(0, 0).is_ok());
        runtime.kill();
    }
}
