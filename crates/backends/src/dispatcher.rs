//! Backend dispatcher.
//!
//! `BackendDispatcher` presents one interface over both backends:
//! 1. Looks up the backend's command table for the action.
//! 2. Runs each command in order through the injected [`ProcessRunner`].
//! 3. Stops at the first failing command and reports it as a failed
//!    [`StepResult`]; nothing is retried.

use std::sync::Arc;

use safety::{Backend, Config, Environment, IntendedAction, ToolPaths};
use tracing::{error, info, instrument};

use crate::{commands_for, CommandSpec, DispatchError, ProcessRunner, StepResult};

pub struct BackendDispatcher {
    runner: Arc<dyn ProcessRunner>,
    tools: ToolPaths,
    database_url: String,
}

impl BackendDispatcher {
    pub fn new(config: &Config, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            tools: config.tools.clone(),
            database_url: config.database_url.clone(),
        }
    }

    pub fn runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.runner
    }

    /// The commands `execute` would run, without running them.
    pub fn plan(&self, action: IntendedAction, backend: Backend) -> Result<Vec<CommandSpec>, DispatchError> {
        commands_for(backend, &self.tools, &self.database_url).commands(action)
    }

    /// Run `action` on `backend`.
    ///
    /// Process failures are folded into the returned [`StepResult`];
    /// backend-specific exit codes are passed through uninterpreted.
    #[instrument(skip(self))]
    pub async fn execute(&self, action: IntendedAction, backend: Backend, environment: Environment) -> StepResult {
        let commands = match self.plan(action, backend) {
            Ok(commands) => commands,
            Err(e) => {
                error!("{e}");
                return StepResult::failed(e.to_string());
            }
        };

        if commands.is_empty() {
            info!("nothing to run");
            return StepResult::ok(format!("{action}: nothing to do on the {backend} backend"));
        }

        let env = vec![
            ("DATABASE_URL".to_owned(), self.database_url.clone()),
            ("APP_ENV".to_owned(), environment.as_str().to_owned()),
        ];
        let mut transcript: Vec<String> = Vec::with_capacity(commands.len());

        for (index, command) in commands.iter().enumerate() {
            info!(step = index + 1, total = commands.len(), "running `{command}`");

            let output = match self.runner.run(command, &env).await {
                Ok(output) => output,
                Err(e) => {
                    error!("`{command}` could not run: {e}");
                    return StepResult::failed(e.to_string()).with_output(transcript.join("\n"));
                }
            };

            let stdout = output.stdout.trim();
            if !stdout.is_empty() {
                transcript.push(stdout.to_owned());
            }

            if !output.success() {
                let stderr = output.stderr.trim();
                let message = if stderr.is_empty() {
                    format!("`{command}` exited with status {}", output.exit_code)
                } else {
                    format!("`{command}` exited with status {}: {stderr}", output.exit_code)
                };
                error!("{message}");
                return StepResult::failed(message).with_output(transcript.join("\n"));
            }
        }

        info!("{action} completed on the {backend} backend");
        StepResult::ok(transcript.join("\n"))
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;

    fn config(backend: &str) -> Config {
        Config::from_vars(vec![
            ("DATABASE_URL", "postgres://u:p@localhost/km0_db_dev"),
            ("DB_BACKEND", backend),
        ])
        .unwrap()
    }

    fn dispatcher(backend: &str, runner: &MockRunner) -> BackendDispatcher {
        BackendDispatcher::new(&config(backend), Arc::new(runner.clone()))
    }

    #[tokio::test]
    async fn runs_declarative_migrate_deploy() {
        let runner = MockRunner::succeeding().replying("migrate deploy", "2 migrations applied");
        let result = dispatcher("declarative", &runner)
            .execute(IntendedAction::MigrateDeploy, Backend::Declarative, Environment::Production)
            .await;
        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("2 migrations applied"));
        assert_eq!(runner.command_lines(), vec!["prisma migrate deploy"]);
    }

    #[tokio::test]
    async fn child_env_carries_url_and_environment() {
        let runner = MockRunner::succeeding();
        dispatcher("sql", &runner)
            .execute(IntendedAction::Push, Backend::SqlMigrations, Environment::Test)
            .await;
        let call = &runner.recorded()[0];
        assert!(call.env.contains(&("DATABASE_URL".into(), "postgres://u:p@localhost/km0_db_dev".into())));
        assert!(call.env.contains(&("APP_ENV".into(), "test".into())));
    }

    #[tokio::test]
    async fn sql_reset_runs_drop_then_migrate() {
        let runner = MockRunner::succeeding();
        let result = dispatcher("sql", &runner)
            .execute(IntendedAction::Reset, Backend::SqlMigrations, Environment::Development)
            .await;
        assert!(result.success);
        let lines = runner.command_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("psql "));
        assert_eq!(lines[1], "drizzle-kit migrate");
    }

    #[tokio::test]
    async fn failed_drop_stops_the_sequence() {
        let runner = MockRunner::succeeding().failing_on("DROP SCHEMA", 3, "permission denied for schema public");
        let result = dispatcher("sql", &runner)
            .execute(IntendedAction::Reset, Backend::SqlMigrations, Environment::Development)
            .await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("status 3"));
        assert!(error.contains("permission denied"));
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn spawn_errors_are_reported_not_retried() {
        let runner = MockRunner::succeeding().spawn_error_on("prisma", "No such file or directory");
        let result = dispatcher("declarative", &runner)
            .execute(IntendedAction::Generate, Backend::Declarative, Environment::Development)
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("failed to start 'prisma'"));
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn unsupported_action_fails_without_spawning() {
        let runner = MockRunner::succeeding();
        let result = dispatcher("sql", &runner)
            .execute(IntendedAction::Seed, Backend::SqlMigrations, Environment::Development)
            .await;
        assert!(!result.success);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_plan_is_a_successful_no_op() {
        let runner = MockRunner::succeeding();
        let result = dispatcher("sql", &runner)
            .execute(IntendedAction::GenerateClient, Backend::SqlMigrations, Environment::Development)
            .await;
        assert!(result.success);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn result_shape_is_identical_across_backends() {
        for backend in [Backend::Declarative, Backend::SqlMigrations] {
            let program = if backend == Backend::Declarative { "prisma" } else { "drizzle-kit" };
            let runner = MockRunner::succeeding().failing_on(program, 1, "");
            let result = dispatcher(backend.as_str(), &runner)
                .execute(IntendedAction::Generate, backend, Environment::Development)
                .await;
            assert!(!result.success, "{backend}");
            assert!(result.error.unwrap().contains("exited with status 1"));
        }
    }
}
