//! Witness-phase mode: the fidelity pull with a coherence preservation check.
//!
//! Runs the same bounded uniform pull as fidelity mode, but tracks the
//! phase-coherence scalar derived from the invocation context across the
//! transform. If post-transform coherence lands below the configured floor
//! the whole transform is rejected — a mode-local guard, distinct from the
//! guard set that runs before dispatch.

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::distribution::Distribution;
use crate::metrics::phase_coherence;

use super::fidelity::bounded_uniform_pull;
use super::{ModeError, ModeOutcome, ModeReport};

pub(super) fn apply(
    input: &Distribution,
    context: &EngineContext,
    config: &EngineConfig,
) -> Result<ModeOutcome, ModeError> {
    let coherence_before = phase_coherence(context, input);
    let (pulled, tv_from_input) = bounded_uniform_pull(input, config.fidelity_tv_cap)?;
    let coherence_after = phase_coherence(context, &pulled);

    if coherence_after < config.coherence_floor {
        return Err(ModeError::CoherenceFloor {
            floor: config.coherence_floor,
            achieved: coherence_after,
        });
    }

    Ok(ModeOutcome {
        distribution: pulled,
        report: ModeReport::WitnessPhase {
            tv_from_input,
            coherence_before,
            coherence_after,
        },
    })
}
