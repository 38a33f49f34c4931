//! Reconciliation
//!
//! Drives one specification through probe, decision and (at most one) mutation
//! per address family:
//!
//! ```text
//! Start ──probe──▶ Probed ──decide──▶ Skip | Simulate | Mutate ──▶ Done
//! ```
//!
//! The decision is a pure function of the mode, the probe result and the
//! simulate flag, so it is tested without any process execution. Simulation
//! never runs a mutating command but reports the `changed` flag a real run would.

use crate::core::error::{Error, Result};
use crate::core::probe::{ProbeResult, probe};
use crate::core::rule::{Family, Intent, Mode, RuleSpec};
use crate::core::synth::{Operation, active_blocks, synthesize};
use crate::exec::{BinaryResolver, CommandRunner};
use tracing::{debug, info};

/// What to do after probing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Already in the desired state
    Skip,
    /// A change is needed but only reported
    Simulate,
    /// Run this mutating operation
    Mutate(Operation),
}

impl Decision {
    pub const fn changed(self) -> bool {
        !matches!(self, Decision::Skip)
    }
}

/// Decides the next step from the probe result.
///
/// # Errors
///
/// Returns [`Error::Internal`] if the probe result does not belong to the mode.
pub fn decide(mode: &Mode, probe: &ProbeResult, simulate: bool) -> Result<Decision> {
    let operation = match (mode, probe) {
        (Mode::Flush, ProbeResult::Skipped) => Some(Operation::Flush),
        (Mode::Policy(desired), ProbeResult::Policy { current }) => {
            let desired: &str = desired.as_ref();
            (current != desired).then_some(Operation::SetPolicy)
        }
        (Mode::Rule { intent, .. }, ProbeResult::Presence { present }) => {
            (*present != intent.wants_present()).then(|| Operation::for_intent(*intent))
        }
        (mode, probe) => {
            return Err(Error::Internal(format!(
                "probe result {probe:?} does not match mode {mode:?}"
            )));
        }
    };

    Ok(match operation {
        None => Decision::Skip,
        Some(_) if simulate => Decision::Simulate,
        Some(operation) => Decision::Mutate(operation),
    })
}

/// Result of reconciling one specification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// A change was made, or would be made under simulation
    pub changed: bool,
    /// Read-only commands that were run (`-C`, `-L`)
    pub probe_commands: Vec<Vec<String>>,
    /// Mutating commands that were run; always empty under simulation
    pub executed_commands: Vec<Vec<String>>,
}

/// Reconciles specifications against the live system
pub struct Reconciler<R, B> {
    runner: R,
    resolver: B,
    simulate: bool,
}

impl<R: CommandRunner, B: BinaryResolver> Reconciler<R, B> {
    pub fn new(runner: R, resolver: B) -> Self {
        Self {
            runner,
            resolver,
            simulate: false,
        }
    }

    /// Probe only; report what would change without mutating.
    #[must_use]
    pub fn simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Reconciles `spec` for every family it targets, IPv4 first.
    ///
    /// # Errors
    ///
    /// Stops at the first failure:
    /// - [`Error::Execution`] if a binary cannot be resolved or run
    /// - [`Error::Probe`] if the policy cannot be read
    /// - [`Error::Mutation`] if the mutating command exits non-zero
    pub fn reconcile(&mut self, spec: &RuleSpec) -> Result<Outcome> {
        let mut outcome = Outcome::default();
        for &family in spec.ip_version().families() {
            self.reconcile_family(spec, family, &mut outcome)?;
        }
        info!(
            "Reconciled {} {} ({}): changed={}",
            spec.table(),
            spec.chain().unwrap_or("*"),
            mode_name(spec.mode()),
            outcome.changed
        );
        Ok(outcome)
    }

    fn reconcile_family(
        &mut self,
        spec: &RuleSpec,
        family: Family,
        outcome: &mut Outcome,
    ) -> Result<()> {
        let binary = self.resolver.resolve(family)?;
        if let Some(body) = spec.body() {
            debug!("{family}: rule options [{}]", active_blocks(body).join(", "));
        }

        let probe = probe(&mut self.runner, spec, family, &binary)?;
        if let Some(command) = probe.command {
            outcome.probe_commands.push(command);
        }
        debug!("{family}: probed {:?}", probe.result);

        let decision = decide(spec.mode(), &probe.result, self.simulate)?;
        debug!("{family}: decision {decision:?}");
        outcome.changed |= decision.changed();

        if let Decision::Mutate(operation) = decision {
            let command = synthesize(spec, family, &binary, operation)?;
            let output = self.runner.run(&command)?;
            if !output.success() {
                let stderr = output.stderr.trim();
                return Err(Error::Mutation {
                    message: if stderr.is_empty() {
                        format!("{operation} exited with status {}", output.exit_code)
                    } else {
                        stderr.to_string()
                    },
                    stderr: output.stderr,
                    exit_code: output.exit_code,
                    command,
                });
            }
            info!("{family}: {operation} applied");
            outcome.executed_commands.push(command);
        }

        Ok(())
    }
}

fn mode_name(mode: &Mode) -> &'static str {
    match mode {
        Mode::Rule {
            intent: Intent::InsertPresent { .. },
            ..
        } => "insert",
        Mode::Rule {
            intent: Intent::AppendPresent,
            ..
        } => "append",
        Mode::Rule {
            intent: Intent::DeleteAbsent,
            ..
        } => "remove",
        Mode::Policy(_) => "policy",
        Mode::Flush => "flush",
    }
}
