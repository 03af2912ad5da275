//! Which device holds the model, and exclusive access to it.
//!
//! The engine lives behind one mutex. A [`ModelLease`] is the only way to
//! reach it: taking a lease under [`ResidencyPolicy::LowResource`] moves the
//! model to the GPU, and dropping the lease moves it back to the CPU,
//! whether the work inside succeeded or not.
//!
//! Lease acquisition and release call into the engine synchronously, so
//! both must happen on a blocking thread (`spawn_blocking`).

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use voxweave_domain::{Residency, ResidencyPolicy, VoiceError};

use crate::Result;
use crate::engine::SynthesisEngine;

struct EngineSlot {
    engine: Box<dyn SynthesisEngine>,
}

#[derive(Debug, Clone, Copy)]
struct ResidencyState {
    policy: ResidencyPolicy,
    residency: Residency,
}

/// Snapshot for status endpoints; never waits on an in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResidencyStatus {
    pub policy: ResidencyPolicy,
    pub residency: Residency,
    pub gpu_available: bool,
}

/// Outcome of [`ModelResidencyController::set_policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyChange {
    AlreadySet,
    Applied { residency: Residency },
}

#[derive(Clone)]
pub struct ModelResidencyController {
    slot: Arc<Mutex<EngineSlot>>,
    state: Arc<RwLock<ResidencyState>>,
    gpu_available: bool,
    engine_name: Arc<str>,
}

impl std::fmt::Debug for ModelResidencyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelResidencyController")
            .field("engine", &self.engine_name)
            .field("status", &self.status())
            .finish()
    }
}

impl ModelResidencyController {
    /// Take ownership of `engine` and place it according to `policy`:
    /// GPU when one exists and the policy is standard, CPU otherwise.
    ///
    /// Blocking.
    pub fn start(mut engine: Box<dyn SynthesisEngine>, policy: ResidencyPolicy) -> Result<Self> {
        let gpu_available = engine.gpu_available();
        let residency = if gpu_available && !policy.is_low_resource() {
            Residency::Gpu
        } else {
            Residency::Cpu
        };
        if policy.is_low_resource() && !gpu_available {
            warn!("low-resource mode requested without a GPU; residency moves will be skipped");
        }
        engine.relocate(residency)?;

        let engine_name: Arc<str> = Arc::from(engine.name());
        info!(engine = %engine_name, %residency, ?policy, gpu_available, "model resident");
        Ok(Self {
            slot: Arc::new(Mutex::new(EngineSlot { engine })),
            state: Arc::new(RwLock::new(ResidencyState { policy, residency })),
            gpu_available,
            engine_name,
        })
    }

    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    pub fn status(&self) -> ResidencyStatus {
        let state = *self.state.read();
        ResidencyStatus {
            policy: state.policy,
            residency: state.residency,
            gpu_available: self.gpu_available,
        }
    }

    fn lock_slot(&self) -> OwnedMutexGuard<EngineSlot> {
        futures::executor::block_on(Arc::clone(&self.slot).lock_owned())
    }

    /// Exclusive access to the engine for one request. Blocking.
    pub fn lease(&self) -> ModelLease {
        let mut lease = ModelLease {
            slot: self.lock_slot(),
            state: Arc::clone(&self.state),
            gpu_available: self.gpu_available,
        };
        if self.state.read().policy.is_low_resource() {
            if let Err(e) = lease.move_to(Residency::Gpu) {
                log_transition_failure(&e, Residency::Gpu);
            }
        }
        lease
    }

    /// Switch policy at runtime, moving the model to match. Blocking; waits
    /// for any in-flight lease.
    ///
    /// Enabling low-resource mode without a GPU is refused.
    pub fn set_policy(&self, policy: ResidencyPolicy) -> Result<PolicyChange> {
        let mut lease = ModelLease {
            slot: self.lock_slot(),
            state: Arc::clone(&self.state),
            gpu_available: self.gpu_available,
        };
        if self.state.read().policy == policy {
            return Ok(PolicyChange::AlreadySet);
        }

        match policy {
            ResidencyPolicy::LowResource => {
                if !self.gpu_available {
                    let err = VoiceError::ResidencyTransitionUnavailable(
                        "low-resource mode needs a GPU to move the model to".into(),
                    );
                    error!(%err, "refusing policy change");
                    return Err(err);
                }
                lease.move_to(Residency::Cpu)?;
            }
            ResidencyPolicy::Standard => {
                if self.gpu_available {
                    lease.move_to(Residency::Gpu)?;
                }
            }
        }

        let residency = {
            let mut state = self.state.write();
            state.policy = policy;
            state.residency
        };
        info!(?policy, %residency, "residency policy changed");
        Ok(PolicyChange::Applied { residency })
    }
}

fn log_transition_failure(err: &VoiceError, target: Residency) {
    match err {
        VoiceError::ResidencyTransitionUnavailable(_) => {
            warn!(%err, %target, "residency transition skipped")
        }
        _ => error!(%err, %target, "residency transition failed"),
    }
}

/// Exclusive handle on the engine. Dropping it ends the request's critical
/// section and, under low-resource policy, returns the model to the CPU.
pub struct ModelLease {
    slot: OwnedMutexGuard<EngineSlot>,
    state: Arc<RwLock<ResidencyState>>,
    gpu_available: bool,
}

impl ModelLease {
    pub fn engine(&mut self) -> &mut dyn SynthesisEngine {
        self.slot.engine.as_mut()
    }

    pub fn residency(&self) -> Residency {
        self.state.read().residency
    }

    fn move_to(&mut self, target: Residency) -> Result<()> {
        let current = self.state.read().residency;
        if current == target {
            return Ok(());
        }
        if !self.gpu_available {
            return Err(VoiceError::ResidencyTransitionUnavailable(format!(
                "no GPU present, model stays on {current}"
            )));
        }
        self.slot.engine.relocate(target)?;
        self.state.write().residency = target;
        Ok(())
    }
}

impl Drop for ModelLease {
    fn drop(&mut self) {
        if !self.state.read().policy.is_low_resource() {
            return;
        }
        if let Err(e) = self.move_to(Residency::Cpu) {
            log_transition_failure(&e, Residency::Cpu);
        }
    }
}
