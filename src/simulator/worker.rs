//! Background tick loop.

use std::sync::Arc;
use std::time::Instant;

use super::Shared;

/// Runs ticks until the stop flag is raised.
///
/// The worker parks whenever the simulator is not running or a pause is
/// requested, and announces it through `Control::parked` so pausers can
/// rendezvous on the same condition variable. Between ticks it sleeps until
/// the next deadline when throttling is on.
pub(crate) fn run(shared: Arc<Shared>) {
    tracing::debug!("simulation worker started");
    let mut deadline = Instant::now();

    loop {
        {
            let mut control = shared.control.lock();
            loop {
                if control.stop {
                    control.parked = true;
                    shared.wake.notify_all();
                    tracing::debug!("simulation worker stopped");
                    return;
                }

                if !control.running || control.pause_requests > 0 {
                    if !control.parked {
                        control.parked = true;
                        shared.wake.notify_all();
                    }
                    shared.wake.wait(&mut control);
                    continue;
                }

                if control.parked || control.deadline_reset {
                    control.parked = false;
                    control.deadline_reset = false;
                    deadline = Instant::now();
                }

                if control.throttle && Instant::now() < deadline {
                    shared.wake.wait_until(&mut control, deadline);
                    continue;
                }

                deadline = Instant::now() + control.tick_period();
                break;
            }
        }

        shared.tick();
    }
}
