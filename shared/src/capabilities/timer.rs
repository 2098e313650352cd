use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::gesture::{TimerRequest, TimerToken};

/// One-shot timers for long-press detection. The shell sleeps for
/// `delay_ms` and answers; a newer timer's token supersedes older ones.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum TimerOperation {
    Start { token: TimerToken, delay_ms: u64 },
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerElapsed;

impl Operation for TimerOperation {
    type Output = TimerElapsed;
}

pub struct GestureTimer<Ev> {
    context: CapabilityContext<TimerOperation, Ev>,
}

impl<Ev> Capability<Ev> for GestureTimer<Ev> {
    type Operation = TimerOperation;
    type MappedSelf<MappedEv> = GestureTimer<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        GestureTimer::new(self.context.map_event(f))
    }
}

impl<Ev> GestureTimer<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<TimerOperation, Ev>) -> Self {
        Self { context }
    }

    /// Arms `request`; `make_event` runs with it once the shell reports expiry.
    pub fn start<F>(&self, request: TimerRequest, make_event: F)
    where
        F: FnOnce(TimerRequest) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.request_from_shell(TimerOperation::Start {
                token: request.token,
                delay_ms: request.delay_ms,
            })
            .await;
            ctx.update_app(make_event(request));
        });
    }
}
