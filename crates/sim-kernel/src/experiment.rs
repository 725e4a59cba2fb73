//! Coarse parallelism across independent simulation replicas.
//!
//! Each replicate is a fully isolated kernel with its own heap, registry,
//! and derived seed; nothing is shared between them while they run. The
//! setup closure is applied to every fresh kernel before execution, so
//! registration order, and therefore behavior, is identical across
//! replicates up to the seed.

use contracts::{OutputRecord, SimConfig};
use rayon::prelude::*;
use tracing::debug;

use crate::error::SimError;
use crate::kernel::{ExecutionSummary, Kernel};
use crate::random;

/// Everything one replicate produced.
#[derive(Debug)]
pub struct ReplicateOutput {
    pub replicate: usize,
    pub summary: ExecutionSummary,
    pub outputs: Vec<OutputRecord>,
}

/// Run `replicates` isolated copies of the simulation in parallel and return
/// their outputs in replicate order. Replicate `i` runs under run id
/// `"<base>_<i>"` with a seed derived from the base seed, so the whole
/// experiment is reproducible from one configuration.
pub fn run_replicates<F>(
    base: &SimConfig,
    replicates: usize,
    setup: F,
) -> Result<Vec<ReplicateOutput>, SimError>
where
    F: Fn(&mut Kernel, usize) -> Result<(), SimError> + Sync,
{
    debug!(run_id = %base.run_id, replicates, "running replicate set");
    (0..replicates)
        .into_par_iter()
        .map(|replicate| {
            let mut config = base.clone();
            config.run_id = format!("{}_{replicate:03}", base.run_id);
            config.seed = random::stream_seed(base.seed, &format!("replicate:{replicate}"));
            let mut kernel = Kernel::new(config);
            setup(&mut kernel, replicate)?;
            let summary = kernel.execute()?;
            Ok(ReplicateOutput {
                replicate,
                summary,
                outputs: kernel.take_outputs(),
            })
        })
        .collect()
}
