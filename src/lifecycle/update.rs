//! Compound Volume Update
//!
//! Applies a [`VolumeSetRequest`] as an ordered chain of steps: metadata
//! set, then the attach toggle, then the mount toggle. The chain stops at
//! the first failing step and returns only that step's error. Steps that
//! already ran are not rolled back.

use crate::domain::requests::{VolumeActionParam, VolumeSetRequest};
use crate::domain::volume::VolumeId;
use crate::drivers::DriverHandle;
use crate::error::{Error, Result};
use tracing::{debug, warn};

/// One step of a compound update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStep {
    Set,
    Attach,
    Detach,
    Mount(String),
    Unmount(String),
}

impl std::fmt::Display for UpdateStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateStep::Set => write!(f, "set"),
            UpdateStep::Attach => write!(f, "attach"),
            UpdateStep::Detach => write!(f, "detach"),
            UpdateStep::Mount(path) => write!(f, "mount {}", path),
            UpdateStep::Unmount(path) => write!(f, "unmount {}", path),
        }
    }
}

/// Steps requested by `req`, in execution order
pub fn plan(req: &VolumeSetRequest) -> Vec<UpdateStep> {
    let mut steps = Vec::new();

    if req.locator.is_some() || req.spec.is_some() {
        steps.push(UpdateStep::Set);
    }

    if let Some(action) = &req.action {
        match action.attach {
            VolumeActionParam::On => steps.push(UpdateStep::Attach),
            VolumeActionParam::Off => steps.push(UpdateStep::Detach),
            VolumeActionParam::None => {}
        }
        match action.mount {
            VolumeActionParam::On => steps.push(UpdateStep::Mount(action.mount_path.clone())),
            VolumeActionParam::Off => steps.push(UpdateStep::Unmount(action.mount_path.clone())),
            VolumeActionParam::None => {}
        }
    }

    steps
}

/// Run the chain for `req` against `driver`, returning the steps that ran
pub async fn apply(
    driver: &DriverHandle,
    id: &VolumeId,
    req: &VolumeSetRequest,
) -> Result<Vec<UpdateStep>> {
    let steps = plan(req);
    let mut done = Vec::with_capacity(steps.len());

    for step in steps {
        let result = match &step {
            UpdateStep::Set => {
                driver
                    .set(id, req.locator.clone(), req.spec.clone())
                    .await
            }
            UpdateStep::Attach => driver.attach(id).await.map(|_| ()),
            UpdateStep::Detach => driver.detach(id).await,
            UpdateStep::Mount(path) if path.is_empty() => {
                Err(Error::BadRequest("invalid mount path".into()))
            }
            UpdateStep::Mount(path) => driver.mount(id, path).await,
            UpdateStep::Unmount(path) => driver.unmount(id, path).await,
        };

        if let Err(e) = result {
            warn!(
                volume_id = %id,
                step = %step,
                completed = done.len(),
                error = %e,
                "compound update stopped"
            );
            return Err(e);
        }
        debug!(volume_id = %id, step = %step, "update step applied");
        done.push(step);
    }

    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::requests::VolumeStateAction;
    use crate::domain::volume::{VolumeLocator, VolumeSpec};

    #[test]
    fn test_plan_order() {
        let req = VolumeSetRequest {
            locator: Some(VolumeLocator::new("v2")),
            spec: None,
            action: Some(VolumeStateAction {
                attach: VolumeActionParam::On,
                mount: VolumeActionParam::On,
                mount_path: "/mnt/a".into(),
            }),
        };
        assert_eq!(
            plan(&req),
            vec![
                UpdateStep::Set,
                UpdateStep::Attach,
                UpdateStep::Mount("/mnt/a".into())
            ]
        );
    }

    #[test]
    fn test_plan_skips_none_toggles() {
        assert!(plan(&VolumeSetRequest::default()).is_empty());

        let req = VolumeSetRequest {
            spec: Some(VolumeSpec::default()),
            action: Some(VolumeStateAction::default()),
            ..Default::default()
        };
        assert_eq!(plan(&req), vec![UpdateStep::Set]);

        assert_eq!(
            plan(&VolumeSetRequest::unmount("/mnt/a")),
            vec![UpdateStep::Unmount("/mnt/a".into())]
        );
        assert_eq!(
            plan(&VolumeSetRequest::attach(VolumeActionParam::Off)),
            vec![UpdateStep::Detach]
        );
    }
}
