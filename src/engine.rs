//! Engine owning the inputs and publishing one immutable plan per recomputation.

mod recompute;

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::NaiveDateTime;
use enumset::EnumSet;
use tokio::{
    runtime::Handle,
    sync::{oneshot, watch},
};

use self::recompute::{Inputs, recompute};
use crate::{
    attribution::{PeriodAttribution, Reading, SavingsAttribution},
    battery::{BatteryState, InvalidBatteryError},
    dispatch::InfeasibleHorizonError,
    forecast::{Forecast, ForecastAdapter, InvalidForecastError, RawSample},
    plan::Plan,
    prelude::*,
    recommendation::{Ranker, Recommendation, RecommendationKind},
    scheduler::{Appliance, InvalidApplianceError},
    settings::Settings,
    tariff::{InvalidScheduleError, TariffPeriod, TariffSchedule},
};

#[derive(Clone, Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid tariff schedule")]
    InvalidSchedule(#[from] InvalidScheduleError),

    #[error("invalid forecast")]
    InvalidForecast(#[from] InvalidForecastError),

    #[error("invalid battery")]
    InvalidBattery(#[from] InvalidBatteryError),

    #[error("invalid appliance")]
    InvalidAppliance(#[from] InvalidApplianceError),

    #[error("recomputation failed, the previous plan remains published")]
    Infeasible(#[from] InfeasibleHorizonError),

    #[error("recomputation panicked, the previous plan remains published")]
    Panicked,

    #[error("the engine must be created within a Tokio runtime")]
    NoRuntime,

    #[error("the recomputation worker has stopped")]
    WorkerStopped,
}

type PlanResult = Result<Arc<Plan>, EngineError>;

type RecomputeFn =
    dyn Fn(&Settings, &Inputs, u64) -> Result<Plan, InfeasibleHorizonError> + Send + Sync;

/// Caller awaiting a plan that reflects its input change.
struct Waiter {
    generation: u64,
    sender: oneshot::Sender<PlanResult>,
}

struct State {
    inputs: Inputs,

    /// Bumped on every new forecast, a running recomputation of an older one is abandoned.
    forecast_version: u64,

    /// Bumped on every input change.
    generation: u64,

    /// Whether the worker is alive.
    is_running: bool,

    /// Whether the inputs have changed since the worker took its last snapshot.
    is_dirty: bool,

    n_recomputations: u64,
    waiters: Vec<Waiter>,
}

struct Snapshot {
    inputs: Inputs,
    forecast_version: u64,
    generation: u64,
}

struct Shared {
    settings: Settings,
    recompute: Box<RecomputeFn>,
    state: Mutex<State>,
    plan: watch::Sender<Arc<Plan>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Worker loop: recompute until no trigger is pending.
    fn run(&self) {
        loop {
            let snapshot = {
                let mut state = self.lock();
                if !state.is_dirty {
                    state.is_running = false;
                    return;
                }
                state.is_dirty = false;
                state.n_recomputations += 1;
                Snapshot {
                    inputs: state.inputs.clone(),
                    forecast_version: state.forecast_version,
                    generation: state.generation,
                }
            };

            // A panic must not take the worker down with the pending waiters:
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                (self.recompute)(&self.settings, &snapshot.inputs, snapshot.forecast_version)
            }));

            let mut state = self.lock();
            if state.forecast_version > snapshot.forecast_version {
                warn!(
                    version = snapshot.forecast_version,
                    latest_version = state.forecast_version,
                    "discarding the plan of a superseded forecast",
                );
                continue;
            }
            let result = match result {
                Ok(result) => result.map(Arc::new).map_err(EngineError::from),
                Err(_) => Err(EngineError::Panicked),
            };
            match &result {
                Ok(plan) => {
                    self.plan.send_replace(Arc::clone(plan));
                    info!(
                        version = plan.forecast_version,
                        total_cost = %plan.total_cost,
                        n_slots = plan.dispatch.len(),
                        "published",
                    );
                }
                Err(error) => {
                    warn!(version = snapshot.forecast_version, "{error:#}");
                }
            }
            let (ready, pending): (Vec<_>, Vec<_>) = state
                .waiters
                .drain(..)
                .partition(|waiter| waiter.generation <= snapshot.generation);
            state.waiters = pending;
            drop(state);

            for waiter in ready {
                if waiter.sender.send(result.clone()).is_err() {
                    debug!(generation = waiter.generation, "the waiter has gone");
                }
            }
        }
    }
}

/// Time-of-use optimization engine.
///
/// Input changes trigger a recomputation on a blocking worker. At most one recomputation is in
/// flight, and the changes arriving meanwhile are coalesced into a single follow-up run.
/// Readers get the latest published plan without ever blocking on the worker.
pub struct Engine {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl Engine {
    /// Create the engine with an empty plan.
    ///
    /// Must be called within a Tokio runtime, whose blocking pool runs the recomputations.
    pub fn new(settings: Settings) -> Result<Self, EngineError> {
        Self::with_recompute(settings, recompute)
    }

    fn with_recompute(
        settings: Settings,
        recompute: impl Fn(&Settings, &Inputs, u64) -> Result<Plan, InfeasibleHorizonError>
        + Send
        + Sync
        + 'static,
    ) -> Result<Self, EngineError> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let (plan, _) = watch::channel(Arc::new(Plan::empty(settings.slot_width())));
        let state = State {
            inputs: Inputs::new(&settings),
            forecast_version: 0,
            generation: 0,
            is_running: false,
            is_dirty: false,
            n_recomputations: 0,
            waiters: Vec::new(),
        };
        let shared =
            Shared { settings, recompute: Box::new(recompute), state: Mutex::new(state), plan };
        Ok(Self { shared: Arc::new(shared), runtime })
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    /// Latest published plan.
    #[must_use]
    pub fn current_plan(&self) -> Arc<Plan> {
        Arc::clone(&self.shared.plan.borrow())
    }

    /// Receiver notified on every published plan.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Plan>> {
        self.shared.plan.subscribe()
    }

    /// Number of recomputations started so far.
    #[must_use]
    pub fn n_recomputations(&self) -> u64 {
        self.shared.lock().n_recomputations
    }

    /// Validate and install the schedule, then re-price the forecast and recompute.
    ///
    /// An invalid schedule is rejected and the previous one stays active.
    #[instrument(skip_all, fields(n_periods = periods.len()))]
    pub fn install_tariff_schedule(
        &self,
        periods: Vec<TariffPeriod>,
    ) -> Result<(), InvalidScheduleError> {
        let schedule = Arc::new(TariffSchedule::try_new(periods)?);
        self.update(|inputs| {
            inputs.forecast = Arc::new(Forecast::clone(&inputs.forecast).with_tariff(&schedule));
            inputs.schedule = Some(schedule);
            false
        });
        info!("installed the tariff schedule");
        Ok(())
    }

    #[must_use]
    pub fn tariff_schedule(&self) -> Option<Arc<TariffSchedule>> {
        self.shared.lock().inputs.schedule.clone()
    }

    /// Submit a new forecast and wait for the plan that reflects it, or a newer one.
    ///
    /// On a failed recomputation, the previous plan remains published.
    #[instrument(skip_all, fields(n_slots = forecast.len()))]
    pub async fn submit_forecast(&self, forecast: Forecast) -> PlanResult {
        let settings = &self.shared.settings;
        if forecast.slot_width() != settings.slot_width() {
            return Err(InvalidForecastError::SlotWidthMismatch {
                expected: settings.slot_width(),
                actual: forecast.slot_width(),
            }
            .into());
        }
        if forecast.len() > settings.max_slots() {
            return Err(InvalidForecastError::HorizonTooLong {
                n_slots: forecast.len(),
                max_slots: settings.max_slots(),
            }
            .into());
        }
        let receiver = self.update(|inputs| {
            inputs.forecast = Arc::new(match &inputs.schedule {
                Some(schedule) => forecast.with_tariff(schedule),
                None => forecast,
            });
            true
        });
        Self::wait(receiver).await
    }

    /// Normalize the raw samples into the slot grid and submit them as a forecast.
    pub async fn submit_samples(&self, samples: &[RawSample]) -> PlanResult {
        let schedule = self.tariff_schedule();
        let forecast = ForecastAdapter::builder()
            .slot_width(self.shared.settings.slot_width())
            .max_slots(self.shared.settings.max_slots())
            .maybe_schedule(schedule.as_deref())
            .build()
            .normalize(samples)?;
        self.submit_forecast(forecast).await
    }

    /// Drop the elapsed slots from the forecast and wait for the new plan.
    #[instrument(skip_all, fields(now = %now))]
    pub async fn advance(&self, now: NaiveDateTime) -> PlanResult {
        let receiver = self.update(|inputs| {
            inputs.forecast = Arc::new(Forecast::clone(&inputs.forecast).since(now));
            true
        });
        Self::wait(receiver).await
    }

    pub fn update_battery(&self, battery: BatteryState) -> Result<(), InvalidBatteryError> {
        battery.validate()?;
        self.update(|inputs| {
            inputs.battery = battery;
            false
        });
        Ok(())
    }

    pub fn set_appliances(&self, appliances: Vec<Appliance>) -> Result<(), InvalidApplianceError> {
        for appliance in &appliances {
            appliance.validate()?;
        }
        self.update(|inputs| {
            inputs.appliances = Arc::from(appliances);
            false
        });
        Ok(())
    }

    /// Wait for a plan that reflects all the inputs installed so far.
    pub async fn refresh(&self) -> PlanResult {
        let receiver = self.update(|_| false);
        Self::wait(receiver).await
    }

    /// Attribute the realized savings of the plan.
    pub fn attribute_savings(&self, readings: &[Reading], plan: &Plan) -> SavingsAttribution {
        SavingsAttribution::compute(&plan.dispatch, readings)
    }

    /// Realized consumption and savings per period of the installed tariff schedule.
    ///
    /// Empty without a schedule.
    pub fn attribute_by_period(&self, readings: &[Reading], plan: &Plan) -> Vec<PeriodAttribution> {
        self.tariff_schedule().map_or_else(Vec::new, |schedule| {
            SavingsAttribution::by_period(&plan.dispatch, readings, &schedule)
        })
    }

    /// Ranked recommendations of the given kinds.
    pub fn recommendations(
        &self,
        plan: &Plan,
        attribution: Option<&SavingsAttribution>,
        kinds: EnumSet<RecommendationKind>,
    ) -> Vec<Recommendation> {
        Ranker::builder()
            .plan(plan)
            .maybe_attribution(attribution)
            .settings(&self.shared.settings.recommendations)
            .kinds(kinds)
            .rank()
    }

    /// Apply the change, register a waiter, and trigger a recomputation.
    ///
    /// The closure returns whether the forecast has been replaced.
    fn update(&self, change: impl FnOnce(&mut Inputs) -> bool) -> oneshot::Receiver<PlanResult> {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.shared.lock();
        if change(&mut state.inputs) {
            state.forecast_version += 1;
        }
        state.generation += 1;
        let generation = state.generation;
        state.waiters.push(Waiter { generation, sender });
        state.is_dirty = true;
        if !state.is_running {
            state.is_running = true;
            let shared = Arc::clone(&self.shared);
            drop(self.runtime.spawn_blocking(move || shared.run()));
        }
        receiver
    }

    async fn wait(receiver: oneshot::Receiver<PlanResult>) -> PlanResult {
        receiver.await.map_err(|_| EngineError::WorkerStopped)?
    }
}
