//! Lifecycle driver
//!
//! Runs a [`Resource`] the way a plugin host would: validate, modify the
//! plan, diff against prior state, then create, update, replace or delete.

use stackmig_framework::{
    ActionType, CancelToken, Diagnostics, Plan, Resource, ResourceResponse,
};

/// One instance after planning
#[derive(Debug)]
pub struct Planned<M> {
    pub key: String,
    pub prior: Option<M>,
    /// `None` when the instance is gone from the config
    pub planned: Option<M>,
    /// `None` when planning produced errors
    pub plan: Option<Plan>,
    pub diagnostics: Diagnostics,
}

impl<M> Planned<M> {
    pub fn action(&self) -> Option<ActionType> {
        self.plan.as_ref().map(|p| p.action_type)
    }
}

/// One instance after apply
#[derive(Debug)]
pub struct Applied<M> {
    pub key: String,
    /// State to persist; `None` removes the instance
    pub state: Option<M>,
    pub diagnostics: Diagnostics,
}

pub async fn plan_instance<R: Resource>(
    resource: &R,
    cancel: &CancelToken,
    key: &str,
    config: Option<R::Model>,
    prior: Option<R::Model>,
) -> anyhow::Result<Planned<R::Model>> {
    let Some(mut config) = config else {
        let plan = match &prior {
            Some(prior) => Some(Plan::delete(&serde_json::to_value(prior)?)),
            None => None,
        };
        return Ok(Planned {
            key: key.to_string(),
            prior,
            planned: None,
            plan,
            diagnostics: Diagnostics::new(),
        });
    };

    let mut diagnostics = resource.validate_config(&mut config).await;
    if !diagnostics.has_error() {
        diagnostics.extend(
            resource
                .modify_plan(cancel, prior.as_ref(), &mut config)
                .await,
        );
    }

    let plan = if diagnostics.has_error() {
        None
    } else {
        let prior_json = prior.as_ref().map(serde_json::to_value).transpose()?;
        Some(Plan::diff(
            &resource.schema(),
            prior_json.as_ref(),
            &serde_json::to_value(&config)?,
        ))
    };
    tracing::debug!(key, action = ?plan.as_ref().map(|p| p.action_type), "planned");

    Ok(Planned {
        key: key.to_string(),
        prior,
        planned: Some(config),
        plan,
        diagnostics,
    })
}

fn absorb<M>(diagnostics: &mut Diagnostics, response: ResourceResponse<M>) -> Option<M> {
    diagnostics.extend(response.diagnostics);
    response.state
}

pub async fn apply_instance<R: Resource>(
    resource: &R,
    cancel: &CancelToken,
    planned: Planned<R::Model>,
) -> Applied<R::Model> {
    let Planned {
        key,
        prior,
        planned,
        plan,
        mut diagnostics,
    } = planned;
    let action = plan.map(|p| p.action_type);

    let state = match (action, prior, planned) {
        (None, prior, _) | (Some(ActionType::NoOp), prior, _) => prior,
        (Some(ActionType::Create), _, Some(planned)) => {
            absorb(&mut diagnostics, resource.create(cancel, planned).await)
        }
        (Some(ActionType::Update), Some(prior), Some(planned)) => {
            let fallback = prior.clone();
            absorb(&mut diagnostics, resource.update(cancel, prior, planned).await)
                .or(Some(fallback))
        }
        (Some(ActionType::Replace), Some(prior), Some(planned)) => {
            diagnostics.extend(resource.delete(cancel, prior).await);
            absorb(&mut diagnostics, resource.create(cancel, planned).await)
        }
        (Some(ActionType::Delete), Some(prior), _) => {
            diagnostics.extend(resource.delete(cancel, prior).await);
            None
        }
        (Some(action), prior, _) => {
            tracing::warn!(key = %key, %action, "inconsistent plan, leaving state untouched");
            prior
        }
    };

    Applied {
        key,
        state,
        diagnostics,
    }
}

/// Re-read one recorded instance
pub async fn refresh_instance<R: Resource>(
    resource: &R,
    cancel: &CancelToken,
    key: &str,
    prior: R::Model,
) -> Applied<R::Model> {
    let fallback = prior.clone();
    let response = resource.read(cancel, prior).await;
    let failed = response.diagnostics.has_error();
    let mut diagnostics = Diagnostics::new();
    let state = absorb(&mut diagnostics, response);

    Applied {
        key: key.to_string(),
        // a failed read keeps what we had
        state: if failed { Some(fallback) } else { state },
        diagnostics,
    }
}
