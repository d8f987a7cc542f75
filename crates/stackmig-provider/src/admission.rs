//! Upload admission
//!
//! Whether a new configuration may be uploaded is decided by a table over
//! the stack's latest configuration and its deployment count. Rules are
//! matched in order; `None` in a rule column matches anything.

use stackmig_platform::{Stack, StackConfiguration};

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Upload a new configuration
    Upload,
    /// Reuse the latest configuration and wait for it to settle
    Defer,
    /// Deployments exist on a settled configuration
    Forbid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatestClass {
    Absent,
    Terminal,
    Transitional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentClass {
    Zero,
    Present,
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    latest: LatestClass,
    deployments: Option<DeploymentClass>,
    decision: Admission,
}

const ADMISSION_TABLE: &[Rule] = &[
    Rule {
        latest: LatestClass::Absent,
        deployments: None,
        decision: Admission::Upload,
    },
    Rule {
        latest: LatestClass::Terminal,
        deployments: Some(DeploymentClass::Zero),
        decision: Admission::Upload,
    },
    Rule {
        latest: LatestClass::Terminal,
        deployments: Some(DeploymentClass::Present),
        decision: Admission::Forbid,
    },
    Rule {
        latest: LatestClass::Transitional,
        deployments: None,
        decision: Admission::Defer,
    },
];

/// Look up the decision for a classified stack
pub fn decide(latest: LatestClass, deployments: DeploymentClass) -> Admission {
    ADMISSION_TABLE
        .iter()
        .find(|rule| {
            rule.latest == latest && rule.deployments.is_none_or(|d| d == deployments)
        })
        .map(|rule| rule.decision)
        // every (latest, deployments) pair has a rule
        .unwrap_or(Admission::Defer)
}

fn classify_latest(latest: Option<&StackConfiguration>) -> LatestClass {
    match latest {
        None => LatestClass::Absent,
        Some(c) if c.status.is_terminal() => LatestClass::Terminal,
        Some(_) => LatestClass::Transitional,
    }
}

/// Deployments counted against the stack: the latest configuration's,
/// falling back to the stack's own list.
pub fn deployments(stack: &Stack) -> &[String] {
    match &stack.latest_configuration {
        Some(c) if !c.deployment_names.is_empty() => &c.deployment_names,
        _ => &stack.deployment_names,
    }
}

/// Admission for `stack` as currently observed
pub fn admit(stack: &Stack) -> Admission {
    let deployment_class = if deployments(stack).is_empty() {
        DeploymentClass::Zero
    } else {
        DeploymentClass::Present
    };
    decide(
        classify_latest(stack.latest_configuration.as_ref()),
        deployment_class,
    )
}
