//! Shell command templates, substituted and executed the way
//! `command_manager.py` did: `%p`/`%m`/`%t`/`%a` stand in for pgdata,
//! primary host, timeout, and a free-form argument.

use std::process::Stdio;
use std::time::Duration;

use pgsentry_config::CommandsConfig;
use tokio::process::Command;
use tracing::{instrument, warn};

use crate::error::{CmdError, CmdResult};

const PLACEHOLDER_PGDATA: &str = "%p";
const PLACEHOLDER_PRIMARY_HOST: &str = "%m";
const PLACEHOLDER_TIMEOUT: &str = "%t";
const PLACEHOLDER_ARGUMENT: &str = "%a";

/// Output of a completed command, kept even on non-zero exit so callers can
/// inspect stdout/stderr for parsing (`get_control_parameter`) or logging.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Placeholders to substitute into a command template before execution.
#[derive(Debug, Clone, Default)]
pub struct Substitutions<'a> {
    pub pgdata: Option<&'a str>,
    pub primary_host: Option<&'a str>,
    pub timeout: Option<Duration>,
    pub argument: Option<&'a str>,
}

/// Executes the shell templates configured under `[commands]`.
pub struct CommandRunner {
    commands: CommandsConfig,
}

impl CommandRunner {
    #[must_use]
    pub fn new(commands: CommandsConfig) -> Self {
        Self { commands }
    }

    fn prepare(template: &str, subs: &Substitutions<'_>) -> String {
        let mut command = template.to_string();
        if let Some(pgdata) = subs.pgdata {
            command = command.replace(PLACEHOLDER_PGDATA, pgdata);
        }
        if let Some(host) = subs.primary_host {
            command = command.replace(PLACEHOLDER_PRIMARY_HOST, host);
        }
        if let Some(timeout) = subs.timeout {
            command = command.replace(PLACEHOLDER_TIMEOUT, &timeout.as_secs().to_string());
        }
        if let Some(arg) = subs.argument {
            command = command.replace(PLACEHOLDER_ARGUMENT, arg);
        }
        command
    }

    /// Runs a prepared shell command line, optionally bounded by `deadline`.
    #[instrument(skip(self, command), fields(command = %command))]
    async fn exec(&self, command: String, deadline: Option<Duration>) -> CmdResult<CommandOutput> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CmdError::Spawn { command: command.clone(), source })?;

        let wait = child.wait_with_output();
        let output = match deadline {
            Some(d) => tokio::time::timeout(d, wait)
                .await
                .map_err(|_| CmdError::Timeout { command: command.clone(), timeout: d })?
                .map_err(|source| CmdError::Spawn { command: command.clone(), source })?,
            None => wait.await.map_err(|source| CmdError::Spawn { command: command.clone(), source })?,
        };

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| CmdError::NonUtf8Output { command: command.clone() })?;
        let stderr = String::from_utf8(output.stderr)
            .map_err(|_| CmdError::NonUtf8Output { command: command.clone() })?;

        if !output.status.success() {
            warn!(command = %command, code = ?output.status.code(), %stderr, "command exited non-zero");
        }

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout,
            stderr,
        })
    }

    fn template_of(&self, name: &str) -> &str {
        match name {
            "promote" => &self.commands.promote,
            "rewind" => &self.commands.rewind,
            "get_control_parameter" => &self.commands.get_control_parameter,
            "pg_start" => &self.commands.pg_start,
            "pg_stop" => &self.commands.pg_stop,
            "pg_status" => &self.commands.pg_status,
            "pg_reload" => &self.commands.pg_reload,
            "pooler_start" => &self.commands.pooler_start,
            "pooler_stop" => &self.commands.pooler_stop,
            "pooler_status" => &self.commands.pooler_status,
            "list_clusters" => &self.commands.list_clusters,
            "generate_recovery_conf" => &self.commands.generate_recovery_conf,
            other => unreachable!("unknown command template {other}"),
        }
    }

    async fn run_named(&self, name: &str, subs: Substitutions<'_>) -> CmdResult<CommandOutput> {
        let command = Self::prepare(self.template_of(name), &subs);
        self.exec(command, None).await
    }

    pub async fn promote(&self, pgdata: &str) -> CmdResult<CommandOutput> {
        self.run_named("promote", Substitutions { pgdata: Some(pgdata), ..Default::default() }).await
    }

    pub async fn rewind(&self, pgdata: &str, primary_host: &str) -> CmdResult<CommandOutput> {
        self.run_named(
            "rewind",
            Substitutions { pgdata: Some(pgdata), primary_host: Some(primary_host), ..Default::default() },
        )
        .await
    }

    /// Runs `get_control_parameter`, returning the value after the last
    /// `:` on stdout (matches pg_controldata's `key: value` layout).
    pub async fn get_control_parameter(&self, pgdata: &str, parameter: &str) -> CmdResult<Option<String>> {
        let out = self
            .run_named(
                "get_control_parameter",
                Substitutions { pgdata: Some(pgdata), argument: Some(parameter), ..Default::default() },
            )
            .await?;
        if !out.success {
            return Ok(None);
        }
        Ok(out.stdout.rsplit(':').next().map(|v| v.trim().to_string()))
    }

    pub async fn list_clusters(&self) -> CmdResult<Vec<String>> {
        let out = self.run_named("list_clusters", Substitutions::default()).await?;
        Ok(out.stdout.trim_end_matches('\n').split('\n').map(str::to_string).collect())
    }

    pub async fn start_postgresql(&self, pgdata: &str, timeout: Duration) -> CmdResult<CommandOutput> {
        let command = Self::prepare(
            self.template_of("pg_start"),
            &Substitutions { pgdata: Some(pgdata), timeout: Some(timeout), ..Default::default() },
        );
        self.exec(command, Some(timeout)).await
    }

    pub async fn stop_postgresql(&self, pgdata: &str, timeout: Duration) -> CmdResult<CommandOutput> {
        let command = Self::prepare(
            self.template_of("pg_stop"),
            &Substitutions { pgdata: Some(pgdata), timeout: Some(timeout), ..Default::default() },
        );
        self.exec(command, Some(timeout)).await
    }

    pub async fn postgresql_status(&self, pgdata: &str) -> CmdResult<CommandOutput> {
        self.run_named("pg_status", Substitutions { pgdata: Some(pgdata), ..Default::default() }).await
    }

    pub async fn reload_postgresql(&self, pgdata: &str) -> CmdResult<CommandOutput> {
        self.run_named("pg_reload", Substitutions { pgdata: Some(pgdata), ..Default::default() }).await
    }

    pub async fn start_pooler(&self) -> CmdResult<CommandOutput> {
        self.run_named("pooler_start", Substitutions::default()).await
    }

    pub async fn stop_pooler(&self) -> CmdResult<CommandOutput> {
        self.run_named("pooler_stop", Substitutions::default()).await
    }

    pub async fn pooler_status(&self) -> CmdResult<CommandOutput> {
        self.run_named("pooler_status", Substitutions::default()).await
    }

    pub async fn generate_recovery_conf(&self, filepath: &str, primary_host: &str) -> CmdResult<CommandOutput> {
        self.run_named(
            "generate_recovery_conf",
            Substitutions { pgdata: Some(filepath), primary_host: Some(primary_host), ..Default::default() },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_commands() -> CommandsConfig {
        CommandsConfig {
            promote: "touch %p/promoted".into(),
            rewind: "echo rewind %p from %m".into(),
            get_control_parameter: "echo 'Latest checkpoint location: %a'".into(),
            pg_start: "true".into(),
            pg_stop: "true".into(),
            pg_status: "true".into(),
            pg_reload: "true".into(),
            pooler_start: "true".into(),
            pooler_stop: "true".into(),
            pooler_status: "true".into(),
            list_clusters: "printf 'a\\nb\\n'".into(),
            generate_recovery_conf: "true".into(),
        }
    }

    #[tokio::test]
    async fn substitutes_pgdata_and_primary_host() {
        let runner = CommandRunner::new(test_commands());
        let out = runner.rewind("/data/pg", "db-a").await.unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "rewind /data/pg from db-a");
    }

    #[tokio::test]
    async fn control_parameter_takes_value_after_last_colon() {
        let runner = CommandRunner::new(test_commands());
        let value = runner.get_control_parameter("/data/pg", "0/5000028").await.unwrap();
        assert_eq!(value.as_deref(), Some("0/5000028"));
    }

    #[tokio::test]
    async fn list_clusters_splits_on_newline() {
        let runner = CommandRunner::new(test_commands());
        let clusters = runner.list_clusters().await.unwrap();
        assert_eq!(clusters, vec!["a".to_string(), "b".to_string()]);
    }
}
