//! Exchange lifecycle: dispatch, suspension, resume.

use crate::accept;
use crate::config::GzipConfig;
use crate::dispatch::{DispatchController, DispatchState, ResumeReason};
use crate::error::GzipError;
use crate::interceptor::ResponseInterceptor;
use crate::scheduler::Scheduler;
use crate::sink::ResponseSink;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Content-producing callback pair driven by an exchange.
pub trait Handler<S: ResponseSink>: Send + Sync {
    /// Normal entry point: the initial dispatch and every explicit
    /// redispatch land here.
    fn handle(&self, ctx: &mut Context<'_, S>) -> Result<(), GzipError>;

    /// Timeout entry point: runs when a suspension expires without an
    /// explicit dispatch. Defaults to the normal entry point.
    fn handle_timeout(&self, ctx: &mut Context<'_, S>) -> Result<(), GzipError> {
        self.handle(ctx)
    }
}

/// Handler-facing view of one entry into the exchange.
pub struct Context<'a, S: ResponseSink> {
    response: &'a mut ResponseInterceptor<S>,
    resumed: Option<ResumeReason>,
    suspend_request: Option<Duration>,
}

impl<S: ResponseSink> Context<'_, S> {
    /// The response being produced.
    pub fn response(&mut self) -> &mut ResponseInterceptor<S> {
        self.response
    }

    /// Why this entry is running: `None` on the initial dispatch, the
    /// resume reason on re-entry.
    pub fn resumed(&self) -> Option<ResumeReason> {
        self.resumed
    }

    /// Requests that the exchange be parked when this entry returns.
    ///
    /// A zero `expiry` waits indefinitely for an explicit wake-up; a
    /// nonzero expiry arms a timer that races the explicit dispatch.
    pub fn suspend(&mut self, expiry: Duration) -> Result<(), GzipError> {
        if self.suspend_request.is_some() {
            return Err(GzipError::DoubleSuspend);
        }
        self.suspend_request = Some(expiry);
        Ok(())
    }
}

/// Outcome of driving an exchange entry to its return.
pub enum DispatchOutcome<S: ResponseSink> {
    /// The handler finished and the response is complete.
    Completed,
    /// The handler parked the exchange; resume through the token or
    /// wait for the expiry timer.
    Suspended(SuspendToken<S>),
}

/// Handle for a parked exchange.
///
/// Consumed exactly once by [`SuspendToken::resume`]; if the timeout
/// path wins the race first, resuming fails with
/// [`GzipError::DoubleResume`] and the response is untouched.
pub struct SuspendToken<S: ResponseSink> {
    exchange: Arc<Exchange<S>>,
    cycle: u64,
}

impl<S: ResponseSink + 'static> SuspendToken<S> {
    /// Re-enters the handler's normal entry point.
    pub fn resume(self) -> Result<DispatchOutcome<S>, GzipError> {
        self.exchange.enter(Entry::Resume {
            cycle: self.cycle,
            reason: ResumeReason::ExplicitDispatch,
        })
    }

    /// The exchange this token parks.
    pub fn exchange(&self) -> &Arc<Exchange<S>> {
        &self.exchange
    }
}

enum Entry {
    Initial,
    Resume { cycle: u64, reason: ResumeReason },
}

/// One request/response interaction.
///
/// All response and dispatch state sits behind a single mutex, so one
/// worker at a time runs the handler, decides the compression mode,
/// or completes the body, no matter which thread a resume lands on.
pub struct Exchange<S: ResponseSink> {
    handler: Arc<dyn Handler<S>>,
    scheduler: Arc<dyn Scheduler>,
    inner: Mutex<Inner<S>>,
}

struct Inner<S: ResponseSink> {
    response: ResponseInterceptor<S>,
    dispatch: DispatchController,
    timer: Option<crate::scheduler::CancelToken>,
}

impl<S: ResponseSink + 'static> Exchange<S> {
    /// Creates an exchange for a client that accepts gzip.
    pub fn new(
        config: GzipConfig,
        sink: S,
        handler: Arc<dyn Handler<S>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Arc<Self> {
        Self::build(config, sink, handler, scheduler, true)
    }

    /// Creates an exchange, evaluating the request's Accept-Encoding
    /// header to decide whether gzip is on the table at all.
    pub fn for_request(
        accept_encoding: Option<&str>,
        config: GzipConfig,
        sink: S,
        handler: Arc<dyn Handler<S>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Arc<Self> {
        let gzip_accepted = accept_encoding.is_some_and(accept::accepts_gzip);
        Self::build(config, sink, handler, scheduler, gzip_accepted)
    }

    fn build(
        config: GzipConfig,
        sink: S,
        handler: Arc<dyn Handler<S>>,
        scheduler: Arc<dyn Scheduler>,
        gzip_accepted: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler,
            scheduler,
            inner: Mutex::new(Inner {
                response: ResponseInterceptor::new(config, sink, gzip_accepted),
                dispatch: DispatchController::new(),
                timer: None,
            }),
        })
    }

    /// Runs the handler for the first time. Valid exactly once.
    pub fn dispatch(self: &Arc<Self>) -> Result<DispatchOutcome<S>, GzipError> {
        self.enter(Entry::Initial)
    }

    /// Current dispatch state.
    pub fn state(&self) -> DispatchState {
        self.inner.lock().dispatch.state()
    }

    /// Tears the exchange down after a transport close.
    ///
    /// A parked exchange goes straight to `Complete`: the timer is
    /// cancelled, the token is invalidated, and no handler tail logic
    /// runs.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
        if inner.dispatch.state() != DispatchState::Complete {
            inner.response.abort();
            inner.dispatch.complete();
        }
    }

    fn enter(self: &Arc<Self>, entry: Entry) -> Result<DispatchOutcome<S>, GzipError> {
        let (cycle, expiry) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            let reason = match entry {
                Entry::Initial => {
                    inner.dispatch.begin_initial()?;
                    None
                }
                Entry::Resume { cycle, reason } => {
                    inner.dispatch.begin_resume(cycle)?;
                    if let Some(timer) = inner.timer.take() {
                        timer.cancel();
                    }
                    inner.dispatch.resume_running();
                    debug!(cycle, ?reason, "exchange resumed");
                    Some(reason)
                }
            };

            let mut ctx = Context {
                response: &mut inner.response,
                resumed: reason,
                suspend_request: None,
            };
            let outcome = match reason {
                Some(ResumeReason::Timeout) => self.handler.handle_timeout(&mut ctx),
                _ => self.handler.handle(&mut ctx),
            };
            let suspend_request = ctx.suspend_request;

            if let Err(err) = outcome {
                inner.response.abort();
                inner.dispatch.complete();
                return Err(err);
            }

            match suspend_request {
                Some(expiry) => {
                    let cycle = inner.dispatch.suspend();
                    debug!(cycle, ?expiry, "exchange suspended");
                    (cycle, expiry)
                }
                None => {
                    if !inner.response.is_completed()
                        && let Err(err) = inner.response.complete()
                    {
                        inner.dispatch.complete();
                        return Err(err);
                    }
                    inner.dispatch.complete();
                    return Ok(DispatchOutcome::Completed);
                }
            }
        };

        // Arm the expiry timer outside the critical section so a timer
        // that fires immediately cannot deadlock against it.
        if !expiry.is_zero() {
            let weak = Arc::downgrade(self);
            let cancel = self.scheduler.schedule(
                expiry,
                Box::new(move || {
                    if let Some(exchange) = weak.upgrade()
                        && let Err(err) = exchange.enter(Entry::Resume {
                            cycle,
                            reason: ResumeReason::Timeout,
                        })
                    {
                        debug!(cycle, %err, "expired suspension was already resumed");
                    }
                }),
            );

            let mut inner = self.inner.lock();
            if inner.dispatch.state() == DispatchState::Suspended
                && inner.dispatch.cycle() == cycle
            {
                inner.timer = Some(cancel);
            } else {
                // The cycle already resolved while we were scheduling
                cancel.cancel();
            }
        }

        Ok(DispatchOutcome::Suspended(SuspendToken {
            exchange: Arc::clone(self),
            cycle,
        }))
    }
}
