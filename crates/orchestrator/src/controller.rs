//! The per-worker step loop: displace, exchange, snapshot.

use kernel::{ExchangeStats, MigrationEngine, MigrationError, ParticleStore, Transport};

use crate::mover::Mover;
use crate::timing::Timer;
use crate::writer::XyzWriter;

/// Totals a worker hands back after its last step.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerTotals {
    /// Particles sent to neighbors over the whole run.
    pub sent: u64,
    /// Particles received from neighbors over the whole run.
    pub received: u64,
    /// Wrapped particles kept locally on degenerate periodic axes.
    pub kept_local: u64,
    /// Seconds spent displacing particles.
    pub step_seconds: f64,
    /// Seconds spent in the exchange protocol.
    pub comm_seconds: f64,
}

/// Drives one worker's store through the step loop.
///
/// A frame is written every `write_interval` steps, counting down from the
/// interval, so the first frame lands after `write_interval` steps.  A zero
/// interval or an absent writer disables output.
pub struct StepController<M: Mover> {
    engine: MigrationEngine,
    store: ParticleStore,
    mover: M,
    writer: Option<XyzWriter>,
    write_interval: u64,
    steps_to_write: u64,
    step_timer: Timer,
    comm_timer: Timer,
    totals: ControllerTotals,
}

impl<M: Mover> StepController<M> {
    /// Assemble the loop for one worker.
    pub fn new(
        engine: MigrationEngine,
        store: ParticleStore,
        mover: M,
        writer: Option<XyzWriter>,
        write_interval: u64,
    ) -> Self {
        let writer = if write_interval == 0 { None } else { writer };
        Self {
            engine,
            store,
            mover,
            writer,
            write_interval,
            steps_to_write: write_interval,
            step_timer: Timer::new(),
            comm_timer: Timer::new(),
            totals: ControllerTotals::default(),
        }
    }

    /// Particles currently owned by this worker.
    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    /// Run one step: displace every particle, settle ownership, then write
    /// a frame when the countdown hits zero.
    pub fn run_step<T: Transport>(
        &mut self,
        step: u64,
        transport: &mut T,
    ) -> Result<ExchangeStats, crate::RunError> {
        self.step_timer.start();
        self.mover.advance(step, self.store.particles_mut());
        self.step_timer.stop();

        self.comm_timer.start();
        let stats = self.engine.exchange(step, &mut self.store, transport)?;
        self.comm_timer.stop();

        self.totals.sent += stats.sent as u64;
        self.totals.received += stats.received as u64;
        self.totals.kept_local += stats.kept_local as u64;

        if let Some(writer) = self.writer.as_mut() {
            self.steps_to_write -= 1;
            if self.steps_to_write == 0 {
                writer.write_snapshot(step, self.store.particles())?;
                self.steps_to_write = self.write_interval;
            }
        }
        Ok(stats)
    }

    /// Run `max_steps` steps back to back.
    pub fn run<T: Transport>(
        &mut self,
        max_steps: u64,
        transport: &mut T,
    ) -> Result<(), crate::RunError> {
        for step in 0..max_steps {
            let stats = self.run_step(step, transport)?;
            tracing::trace!(
                "rank {} step {}: sent {}, received {}, kept {}",
                transport.rank(),
                step,
                stats.sent,
                stats.received,
                stats.kept_local
            );
        }
        Ok(())
    }

    /// Tear down the loop, releasing the store and the accumulated totals.
    pub fn finish(self) -> (ParticleStore, ControllerTotals) {
        let mut totals = self.totals;
        totals.step_seconds = self.step_timer.seconds();
        totals.comm_seconds = self.comm_timer.seconds();
        (self.store, totals)
    }
}
