//! Versioning of run outputs with git and dvc.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub code: i32,
    pub output: String,
}

pub trait CommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs commands as child processes of the current directory.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Unable to start {program}"))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            output: format!("{stdout}\n{stderr}"),
        })
    }
}

async fn run_checked(runner: &impl CommandRunner, program: &str, args: &[&str]) -> Result<()> {
    let args = args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
    let command = format!("{program} {}", args.join(" "));
    debug!(command = %command, "Running");
    let result = runner.run(program, &args).await?;
    if result.code != 0 {
        return Err(anyhow!(
            "`{command}` exited with code {}: {}",
            result.code,
            result.output.trim()
        ));
    }
    Ok(())
}

/// AOI output directories under `data_dir`, sorted by name.
pub fn aoi_directories(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = std::fs::read_dir(data_dir)
        .with_context(|| format!("Unable to read {}", data_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .filter(|p| !p.file_name().is_some_and(|n| n.to_string_lossy().starts_with('.')))
        .collect::<Vec<_>>();
    dirs.sort();
    Ok(dirs)
}

pub fn branch_name(day: NaiveDate, dirs: &[PathBuf]) -> String {
    let names = dirs
        .iter()
        .filter_map(|d| d.file_name())
        .map(|n| n.to_string_lossy().replace(' ', "-"))
        .collect::<Vec<_>>();
    format!("{}-{}", day.format("%Y-%m-%d"), names.join("-"))
}

/// Tracks every AOI directory with dvc on a new branch and pushes it.
///
/// Returns the name of the branch.
pub async fn publish(data_dir: &Path, runner: &impl CommandRunner, today: NaiveDate) -> Result<String> {
    let dirs = aoi_directories(data_dir)?;
    if dirs.is_empty() {
        return Err(anyhow!("No AOI outputs in {}", data_dir.display()));
    }
    let branch = branch_name(today, &dirs);
    info!(branch = %branch, aois = dirs.len(), "Publishing outputs");

    run_checked(runner, "git", &["checkout", "-b", branch.as_str()]).await?;
    for dir in dirs.iter() {
        let dir = dir.to_string_lossy().into_owned();
        run_checked(runner, "dvc", &["add", dir.as_str()]).await?;
        let dvc_file = format!("{dir}.dvc");
        run_checked(runner, "git", &["add", dvc_file.as_str()]).await?;
    }
    run_checked(runner, "dvc", &["push"]).await?;
    let message = format!("Add data for {}", today.format("%Y-%m-%d"));
    run_checked(runner, "git", &["commit", "-m", message.as_str()]).await?;
    run_checked(runner, "git", &["push", "origin", "HEAD"]).await?;
    Ok(branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl CommandRunner for RecordingRunner {
        async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
            let call = format!("{program} {}", args.join(" "));
            let code = match self.fail_on {
                Some(prefix) if call.starts_with(prefix) => 1,
                _ => 0,
            };
            self.calls.lock().unwrap().push(call);
            Ok(CommandOutput {
                code,
                output: String::new(),
            })
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn test_publish_commands() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("new york")).unwrap();
        std::fs::create_dir(dir.path().join("budapest")).unwrap();
        std::fs::write(dir.path().join("budapest.dvc"), "").unwrap();

        let runner = RecordingRunner::default();
        let branch = publish(dir.path(), &runner, today()).await.unwrap();
        assert_eq!(branch, "2024-06-01-budapest-new-york");

        let budapest = dir.path().join("budapest");
        let new_york = dir.path().join("new york");
        let calls = runner.calls.into_inner().unwrap();
        assert_eq!(
            calls,
            vec![
                "git checkout -b 2024-06-01-budapest-new-york".to_string(),
                format!("dvc add {}", budapest.display()),
                format!("git add {}.dvc", budapest.display()),
                format!("dvc add {}", new_york.display()),
                format!("git add {}.dvc", new_york.display()),
                "dvc push".to_string(),
                "git commit -m Add data for 2024-06-01".to_string(),
                "git push origin HEAD".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_command_stops_publishing() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("budapest")).unwrap();

        let runner = RecordingRunner {
            fail_on: Some("dvc push"),
            ..Default::default()
        };
        let err = publish(dir.path(), &runner, today()).await.unwrap_err();
        assert!(err.to_string().contains("dvc push"));
        assert_eq!(runner.calls.lock().unwrap().last().unwrap(), "dvc push");
    }

    #[tokio::test]
    async fn test_nothing_to_publish() {
        let dir = tempdir().unwrap();
        assert!(publish(dir.path(), &RecordingRunner::default(), today()).await.is_err());
    }
}
