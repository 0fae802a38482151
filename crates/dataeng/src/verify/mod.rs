//! Post-deployment checks run through the `snow` command-line client.
//!
//! Every check prints its own marker; failures are reported, never fatal.

use std::io::Write;
use std::process::Command;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::WorkspaceTarget;
use crate::pipeline::{IdentifierError, QualifiedName, TRACKER_TABLE};

pub const DEFAULT_CLIENT: &str = "snow";
pub const REQUIRED_PROCEDURES: [&str; 5] = [
    "GENERATE_STORAGE_INTEGRATION_DDL",
    "GENERATE_FILE_FORMAT_DDL",
    "GENERATE_EXTERNAL_STAGE_DDL",
    "GENERATE_EXTERNAL_TABLE_DDL",
    "EXECUTE_DDL_AND_TRACK",
];

const BANNER_WIDTH: usize = 60;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner {
    fn run(&mut self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&mut self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyPlan {
    pub database: String,
    pub schema: String,
    pub agent: String,
    pub connection: String,
    pub client: String,
}

impl VerifyPlan {
    /// Object names are interpolated into `snow sql -q`, so each must be a plain identifier.
    pub fn new(target: &WorkspaceTarget, connection: &str) -> Result<Self, IdentifierError> {
        let agent = QualifiedName::new(&target.database, &target.schema, "agent", &target.agent)?;
        Ok(Self {
            database: target.database.clone(),
            schema: target.schema.clone(),
            agent: agent.object().to_string(),
            connection: connection.to_string(),
            client: DEFAULT_CLIENT.to_string(),
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = client.into();
        self
    }

    fn scope(&self) -> String {
        format!("{}.{}", self.database, self.schema)
    }

    #[must_use]
    pub fn show_agents_query(&self) -> String {
        format!("SHOW AGENTS LIKE '{}' IN SCHEMA {};", self.agent, self.scope())
    }

    #[must_use]
    pub fn describe_agent_query(&self) -> String {
        format!("DESCRIBE AGENT {}.{};", self.scope(), self.agent)
    }

    #[must_use]
    pub fn show_procedure_query(&self, procedure: &str) -> String {
        format!("SHOW PROCEDURES LIKE '{procedure}' IN SCHEMA {};", self.scope())
    }

    #[must_use]
    pub fn tracker_count_query(&self) -> String {
        format!("SELECT COUNT(*) FROM {}.{TRACKER_TABLE};", self.scope())
    }

    fn sql_args(&self, query: String) -> Vec<String> {
        vec![
            "sql".to_string(),
            "-q".to_string(),
            query,
            "-c".to_string(),
            self.connection.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub checks: Vec<CheckOutcome>,
}

impl VerificationReport {
    fn record(&mut self, name: impl Into<String>, passed: bool) {
        self.checks.push(CheckOutcome {
            name: name.into(),
            passed,
        });
    }

    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|check| check.passed).count()
    }
}

fn marker(passed: bool) -> &'static str {
    if passed { "✅" } else { "❌" }
}

struct Verifier<'a, R: CommandRunner + ?Sized> {
    plan: &'a VerifyPlan,
    runner: &'a mut R,
    out: &'a mut dyn Write,
}

impl<R: CommandRunner + ?Sized> Verifier<'_, R> {
    /// Runs one query; a client that cannot be spawned yields `None` after
    /// reporting why.
    fn query(&mut self, query: String) -> Result<Option<CommandOutput>> {
        debug!(client = %self.plan.client, query = %query, "running verification query");
        match self.runner.run(&self.plan.client, &self.plan.sql_args(query)) {
            Ok(output) => Ok(Some(output)),
            Err(error) => {
                warn!(client = %self.plan.client, error = %error, "verification client unavailable");
                writeln!(self.out, "could not run `{}`: {error}", self.plan.client)?;
                Ok(None)
            }
        }
    }

    fn show_agent(&mut self, report: &mut VerificationReport) -> Result<()> {
        writeln!(self.out, "Step 1: Verify agent exists")?;
        let output = self.query(self.plan.show_agents_query())?;
        let passed = output
            .as_ref()
            .is_some_and(|output| output.success && output.stdout.contains(&self.plan.agent));
        if let Some(output) = &output {
            writeln!(self.out, "{}", output.stdout)?;
        }
        writeln!(self.out, "{} Agent listed in {}", marker(passed), self.plan.scope())?;
        report.record("show_agent", passed);
        Ok(())
    }

    fn describe_agent(&mut self, report: &mut VerificationReport) -> Result<()> {
        writeln!(self.out, "\nStep 2: Describe agent configuration")?;
        let output = self.query(self.plan.describe_agent_query())?;
        let passed = output
            .as_ref()
            .is_some_and(|output| output.stdout.contains(&self.plan.agent));
        if passed {
            writeln!(self.out, "{} Agent exists and is configured", marker(true))?;
        } else {
            writeln!(self.out, "{} Agent not found", marker(false))?;
            if let Some(output) = &output {
                writeln!(self.out, "{}", output.stdout)?;
            }
        }
        report.record("describe_agent", passed);
        Ok(())
    }

    fn procedures(&mut self, report: &mut VerificationReport) -> Result<()> {
        writeln!(self.out, "\nStep 3: Check stored procedures")?;
        for procedure in REQUIRED_PROCEDURES {
            let output = self.query(self.plan.show_procedure_query(procedure))?;
            let passed = output
                .as_ref()
                .is_some_and(|output| output.stdout.contains(procedure));
            if passed {
                writeln!(self.out, "{} {procedure}", marker(true))?;
            } else {
                writeln!(self.out, "{} {procedure} not found", marker(false))?;
            }
            report.record(procedure, passed);
        }
        Ok(())
    }

    fn tracker(&mut self, report: &mut VerificationReport) -> Result<()> {
        writeln!(self.out, "\nStep 4: Check tracker table")?;
        let output = self.query(self.plan.tracker_count_query())?;
        let passed = output.as_ref().is_some_and(|output| output.success);
        if passed {
            writeln!(self.out, "{} Pipeline tracker table exists", marker(true))?;
        } else {
            writeln!(self.out, "{} Pipeline tracker table not reachable", marker(false))?;
        }
        if let Some(output) = &output {
            writeln!(self.out, "{}", output.stdout)?;
            if !output.success && !output.stderr.trim().is_empty() {
                writeln!(self.out, "{}", output.stderr.trim_end())?;
            }
        }
        report.record("tracker_table", passed);
        Ok(())
    }

    fn closing_banner(&mut self) -> Result<()> {
        let rule = "=".repeat(BANNER_WIDTH);
        writeln!(self.out, "\n{rule}")?;
        writeln!(self.out, "✅ All components verified!")?;
        writeln!(self.out, "{rule}")?;
        writeln!(self.out)?;
        writeln!(self.out, "To deploy to SPCS, run:")?;
        writeln!(self.out, "  ./deploy.sh")?;
        writeln!(self.out)?;
        writeln!(self.out, "To test the agent directly, run:")?;
        writeln!(
            self.out,
            "  {} sql -q \"SELECT SYSTEM\\$CREATE_CORTEX_THREAD('test');\" -c {}",
            self.plan.client, self.plan.connection
        )?;
        Ok(())
    }
}

/// Runs every check in order and always finishes with the closing banner.
pub fn run_verification<R: CommandRunner + ?Sized>(
    plan: &VerifyPlan,
    runner: &mut R,
    out: &mut dyn Write,
) -> Result<VerificationReport> {
    let mut verifier = Verifier { plan, runner, out };
    let mut report = VerificationReport::default();

    writeln!(verifier.out, "🧪 Testing Data Engineer Agent...\n")?;
    verifier.show_agent(&mut report)?;
    verifier.describe_agent(&mut report)?;
    verifier.procedures(&mut report)?;
    verifier.tracker(&mut report)?;
    verifier.closing_banner()?;

    Ok(report)
}
