//! Per-item outcomes and the terminal status of a provisioning run.

use std::fmt;

/// The seven ordered provisioning steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Tables,
    Role,
    Policies,
    Functions,
    Routes,
    Methods,
    Deployment,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::Tables,
        Step::Role,
        Step::Policies,
        Step::Functions,
        Step::Routes,
        Step::Methods,
        Step::Deployment,
    ];

    pub fn number(&self) -> usize {
        *self as usize + 1
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::Tables => "tables",
            Step::Role => "role",
            Step::Policies => "policies",
            Step::Functions => "functions",
            Step::Routes => "routes",
            Step::Methods => "methods",
            Step::Deployment => "deployment",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.number(), Step::ALL.len(), self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Table,
    Role,
    Policy,
    Function,
    Permission,
    Api,
    RouteNode,
    Method,
    Cors,
    Deployment,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Table => "table",
            ResourceKind::Role => "role",
            ResourceKind::Policy => "policy",
            ResourceKind::Function => "function",
            ResourceKind::Permission => "permission",
            ResourceKind::Api => "api",
            ResourceKind::RouteNode => "route",
            ResourceKind::Method => "method",
            ResourceKind::Cors => "cors",
            ResourceKind::Deployment => "deployment",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created,
    /// Existed but was brought in line (code replaced, binding completed).
    Updated,
    AlreadySatisfied,
    Failed(String),
    /// Not attempted because something it depends on failed.
    Skipped(String),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Outcome::Created | Outcome::Updated)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Created => f.write_str("created"),
            Outcome::Updated => f.write_str("updated"),
            Outcome::AlreadySatisfied => f.write_str("already satisfied"),
            Outcome::Failed(reason) => write!(f, "FAILED: {reason}"),
            Outcome::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub step: Step,
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    FullyDeployed,
    Partial { failed: usize, skipped: usize },
    Aborted { step: Step, error: String },
}

/// Everything a run did, in order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub items: Vec<ItemReport>,
    pub aborted: Option<(Step, String)>,
    /// Id of the gateway API, once known.
    pub api_id: Option<String>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: Step, kind: ResourceKind, name: impl Into<String>, outcome: Outcome) {
        self.items.push(ItemReport {
            step,
            kind,
            name: name.into(),
            outcome,
        });
    }

    pub fn abort(&mut self, step: Step, error: impl Into<String>) {
        self.aborted = Some((step, error.into()));
    }

    pub fn status(&self) -> RunStatus {
        if let Some((step, error)) = &self.aborted {
            return RunStatus::Aborted {
                step: *step,
                error: error.clone(),
            };
        }
        let failed = self.items.iter().filter(|i| i.outcome.is_failure()).count();
        let skipped = self
            .items
            .iter()
            .filter(|i| matches!(i.outcome, Outcome::Skipped(_)))
            .count();
        if failed == 0 && skipped == 0 {
            RunStatus::FullyDeployed
        } else {
            RunStatus::Partial { failed, skipped }
        }
    }

    /// Items of `kind` whose outcome matches `pred`.
    pub fn count(&self, kind: ResourceKind, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.items
            .iter()
            .filter(|i| i.kind == kind && pred(&i.outcome))
            .count()
    }

    pub fn created(&self, kind: ResourceKind) -> usize {
        self.count(kind, |o| *o == Outcome::Created)
    }

    /// Items that were created or updated, of any kind.
    pub fn changes(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_change()).count()
    }

    pub fn outcome_of(&self, kind: ResourceKind, name: &str) -> Option<&Outcome> {
        self.items
            .iter()
            .rev()
            .find(|i| i.kind == kind && i.name == name)
            .map(|i| &i.outcome)
    }

    /// Process exit code: 0 when deployed (partially or fully), 1 when
    /// aborted. With `strict`, a partial run exits 2.
    pub fn exit_code(&self, strict: bool) -> i32 {
        match self.status() {
            RunStatus::FullyDeployed => 0,
            RunStatus::Partial { .. } if strict => 2,
            RunStatus::Partial { .. } => 0,
            RunStatus::Aborted { .. } => 1,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            writeln!(
                f,
                "  [{}] {:<10} {:<40} {}",
                item.step.number(),
                item.kind,
                item.name,
                item.outcome
            )?;
        }
        match self.status() {
            RunStatus::FullyDeployed => write!(f, "fully deployed ({} changes)", self.changes()),
            RunStatus::Partial { failed, skipped } => write!(
                f,
                "deployed with {failed} failed and {skipped} skipped items"
            ),
            RunStatus::Aborted { step, error } => write!(f, "aborted at step {step}: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_fully_deployed() {
        let report = RunReport::new();
        assert_eq!(report.status(), RunStatus::FullyDeployed);
        assert_eq!(report.exit_code(true), 0);
    }

    #[test]
    fn failures_make_run_partial() {
        let mut report = RunReport::new();
        report.record(Step::Functions, ResourceKind::Function, "getAd", Outcome::Failed("boom".into()));
        report.record(
            Step::Functions,
            ResourceKind::Permission,
            "getAd",
            Outcome::Skipped("function failed".into()),
        );
        report.record(Step::Functions, ResourceKind::Function, "listAds", Outcome::Created);

        assert_eq!(report.status(), RunStatus::Partial { failed: 1, skipped: 1 });
        assert_eq!(report.exit_code(false), 0);
        assert_eq!(report.exit_code(true), 2);
        assert!(report.to_string().ends_with("deployed with 1 failed and 1 skipped items"));
    }

    #[test]
    fn abort_wins_over_partial() {
        let mut report = RunReport::new();
        report.record(Step::Tables, ResourceKind::Table, "Listings", Outcome::Created);
        report.abort(Step::Role, "access denied");
        assert_eq!(report.exit_code(false), 1);
        assert!(report.to_string().contains("aborted at step 2/7 role: access denied"));
    }

    #[test]
    fn outcome_of_returns_latest_entry() {
        let mut report = RunReport::new();
        report.record(Step::Tables, ResourceKind::Table, "Listings", Outcome::Created);
        assert_eq!(
            report.outcome_of(ResourceKind::Table, "Listings"),
            Some(&Outcome::Created)
        );
        assert_eq!(report.created(ResourceKind::Table), 1);
        assert!(report.outcome_of(ResourceKind::Table, "Comments").is_none());
    }
}
