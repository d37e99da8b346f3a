use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Subprocess boundary for the ffmpeg-backed engines.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &Path, args: &[String], cwd: Option<&Path>)
        -> std::io::Result<Output>;

    /// Like `run`, handing each stdout line to `on_line` as it is produced.
    async fn run_streaming(
        &self,
        program: &Path,
        args: &[String],
        cwd: Option<&Path>,
        on_line: &(dyn for<'l> Fn(&'l str) + Send + Sync),
    ) -> std::io::Result<Output> {
        let output = self.run(program, args, cwd).await?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            on_line(line);
        }
        Ok(output)
    }

    /// Absolute location of `program`, when it can be executed at all.
    fn locate(&self, program: &Path) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

impl SystemCommandExecutor {
    fn command(program: &Path, args: &[String], cwd: Option<&Path>) -> Command {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        command
    }
}

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        cwd: Option<&Path>,
    ) -> std::io::Result<Output> {
        Self::command(program, args, cwd).output().await
    }

    async fn run_streaming(
        &self,
        program: &Path,
        args: &[String],
        cwd: Option<&Path>,
        on_line: &(dyn for<'l> Fn(&'l str) + Send + Sync),
    ) -> std::io::Result<Output> {
        let mut child = Self::command(program, args, cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let read_stdout = async {
            let mut captured = Vec::new();
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next_line().await? {
                    on_line(&line);
                    captured.extend_from_slice(line.as_bytes());
                    captured.push(b'\n');
                }
            }
            Ok::<_, std::io::Error>(captured)
        };
        let read_stderr = async {
            let mut captured = Vec::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_end(&mut captured).await?;
            }
            Ok::<_, std::io::Error>(captured)
        };
        let (stdout, stderr) = tokio::try_join!(read_stdout, read_stderr)?;
        let status = child.wait().await?;
        Ok(Output {
            status,
            stdout,
            stderr,
        })
    }
}

pub(crate) fn render_command(program: &Path, args: &[String]) -> String {
    format!("{} {}", program.display(), args.join(" "))
}
