//! Keeps the weight of an edited sub-batch in step with its inputs.
//!
//! Every change of a watched field stamps a new generation and wakes a
//! background task. The task drops any computation in flight when a newer
//! stamp arrives, and writes a result only if its stamp is still the latest
//! and the handle has not been disposed.

pub mod field;
pub mod form;
pub mod state;

pub use field::{ChangeCallback, Field, FieldWatcher, ListenerId};
pub use form::{MeasurementField, SubBatchForm, WatchedFields};
pub use state::{next_weight_update, WeightFieldState, WeightUpdate};

use crate::context::MeasurementContext;
use crate::conversion::ConversionLookup;
use crate::error::CatchWeightError;
use crate::estimate::{DressingContext, EstimateInput, LengthMeasurement, WeightEstimationEngine};
use crate::model::{BatchGroup, MeasurementValue, Pmfm, WeightResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Host callbacks.
pub trait RecomputeListener: Send + Sync {
    fn on_error(&self, _error: &CatchWeightError) {}
    fn on_computing_changed(&self, _computing: bool) {}
}

pub struct NoopListener;

impl RecomputeListener for NoopListener {}

#[derive(Debug, Clone)]
pub struct RecomputeOptions {
    pub context: MeasurementContext,
    /// Slot receiving the weight; its unit and decimals shape the result.
    pub weight_pmfm: Pmfm,
    pub qv_pmfm: Option<Pmfm>,
    /// Used when the parent group field is empty.
    pub parent_group: Option<Arc<BatchGroup>>,
}

impl RecomputeOptions {
    pub fn new(context: MeasurementContext, weight_pmfm: Pmfm) -> Self {
        Self {
            context,
            weight_pmfm,
            qv_pmfm: None,
            parent_group: None,
        }
    }

    pub fn with_qv_pmfm(mut self, qv_pmfm: Pmfm) -> Self {
        self.qv_pmfm = Some(qv_pmfm);
        self
    }

    pub fn with_parent_group(mut self, parent_group: Arc<BatchGroup>) -> Self {
        self.parent_group = Some(parent_group);
        self
    }
}

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Live subscription of one record. Dropping it disposes it.
pub struct RecomputeHandle {
    cancel: CancellationToken,
    generation: Arc<AtomicU64>,
    computing: Arc<AtomicBool>,
    weight: Arc<dyn FieldWatcher<Option<WeightResult>>>,
    subscriptions: Mutex<Vec<Unsubscribe>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RecomputeHandle {
    /// Stop listening. A computation in flight is never written back.
    pub fn dispose(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        let subscriptions =
            std::mem::take(&mut *self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner));
        for unsubscribe in subscriptions {
            unsubscribe();
        }
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        debug!("weight-length recomputation disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of input changes seen so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_computing(&self) -> bool {
        self.computing.load(Ordering::SeqCst)
    }

    pub fn weight_state(&self) -> WeightFieldState {
        WeightFieldState::of(self.weight.current_value().as_ref(), self.is_computing())
    }
}

impl Drop for RecomputeHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn subscribe<T: 'static>(
    subscriptions: &mut Vec<Unsubscribe>,
    field: &Arc<dyn FieldWatcher<T>>,
    trigger: &ChangeCallback,
) {
    let id = field.on_change(Arc::clone(trigger));
    let field = Arc::clone(field);
    subscriptions.push(Box::new(move || field.remove_listener(id)));
}

/// Start recomputing the weight whenever one of its inputs changes.
///
/// Fails, after reporting through `on_error`, when the context has no
/// statistical rectangle or no length field is given. The first computation
/// runs right away. Must be called within a tokio runtime.
pub fn attach<L>(
    fields: WatchedFields,
    engine: Arc<WeightEstimationEngine<L>>,
    options: RecomputeOptions,
    listener: Arc<dyn RecomputeListener>,
) -> Result<RecomputeHandle, CatchWeightError>
where
    L: ConversionLookup + ?Sized + 'static,
{
    if !options.context.has_rectangle() {
        let err = CatchWeightError::NoRectangle;
        warn!("{err}");
        listener.on_error(&err);
        return Err(err);
    }
    if fields.lengths.is_empty() {
        let err = CatchWeightError::NoLengthPmfm;
        warn!("{err}");
        listener.on_error(&err);
        return Err(err);
    }

    // Inputs stay locked until the first answer.
    for (_, length) in &fields.lengths {
        length.set_enabled(false);
    }
    fields.weight.set_enabled(false);

    let (tx, rx) = mpsc::unbounded_channel::<u64>();
    let generation = Arc::new(AtomicU64::new(0));
    let trigger: ChangeCallback = {
        let generation = Arc::clone(&generation);
        Arc::new(move || {
            let stamp = generation.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = tx.send(stamp);
        })
    };

    let mut subscriptions = Vec::new();
    for (_, length) in &fields.lengths {
        subscribe(&mut subscriptions, length, &trigger);
    }
    subscribe(&mut subscriptions, &fields.taxon_name, &trigger);
    subscribe(&mut subscriptions, &fields.individual_count, &trigger);
    if let Some(sex) = &fields.sex {
        subscribe(&mut subscriptions, sex, &trigger);
    }
    if let Some(parent_group) = &fields.parent_group {
        subscribe(&mut subscriptions, parent_group, &trigger);
    }
    if let Some(qv) = &fields.qv {
        subscribe(&mut subscriptions, qv, &trigger);
    }

    let cancel = CancellationToken::new();
    let computing = Arc::new(AtomicBool::new(false));
    let weight = Arc::clone(&fields.weight);
    let worker = Worker {
        fields,
        engine,
        options,
        listener,
        generation: Arc::clone(&generation),
        computing: Arc::clone(&computing),
        cancel: cancel.clone(),
    };
    let task = tokio::spawn(worker.run(rx));
    trigger();

    Ok(RecomputeHandle {
        cancel,
        generation,
        computing,
        weight,
        subscriptions: Mutex::new(subscriptions),
        task: Mutex::new(Some(task)),
    })
}

enum Outcome {
    Weight(Option<WeightResult>),
    Failed(CatchWeightError),
}

enum Step {
    Cancelled,
    Superseded(u64),
    Closed,
    Done(Outcome),
}

struct Worker<L: ?Sized> {
    fields: WatchedFields,
    engine: Arc<WeightEstimationEngine<L>>,
    options: RecomputeOptions,
    listener: Arc<dyn RecomputeListener>,
    generation: Arc<AtomicU64>,
    computing: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl<L: ConversionLookup + ?Sized> Worker<L> {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<u64>) {
        let mut next: Option<u64> = None;
        loop {
            let mut stamp = match next.take() {
                Some(stamp) => stamp,
                None => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        received = rx.recv() => match received {
                            Some(stamp) => stamp,
                            None => break,
                        },
                    }
                }
            };
            while let Ok(newer) = rx.try_recv() {
                stamp = newer;
            }

            self.set_computing(true);
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancelled,
                newer = rx.recv() => match newer {
                    Some(newer) => Step::Superseded(newer),
                    None => Step::Closed,
                },
                outcome = self.compute() => Step::Done(outcome),
            };
            match step {
                Step::Cancelled | Step::Closed => {
                    self.set_computing(false);
                    break;
                }
                Step::Superseded(newer) => {
                    debug!("computation {stamp} superseded by {newer}");
                    next = Some(newer);
                }
                Step::Done(outcome) => {
                    if self.generation.load(Ordering::SeqCst) == stamp && !self.cancel.is_cancelled() {
                        self.commit(outcome);
                    } else {
                        debug!("discarding stale computation {stamp}");
                    }
                    self.set_computing(false);
                }
            }
        }
    }

    fn set_computing(&self, computing: bool) {
        if self.computing.swap(computing, Ordering::SeqCst) != computing {
            self.listener.on_computing_changed(computing);
        }
    }

    async fn compute(&self) -> Outcome {
        let fields = &self.fields;
        let settings = self.engine.settings();

        let length = fields.lengths.iter().find_map(|(pmfm, field)| {
            let value = field.current_value()?.as_decimal()?;
            Some(LengthMeasurement::from_pmfm(pmfm, Some(value)))
        });
        for (_, field) in &fields.lengths {
            field.set_enabled(true);
        }
        fields.weight.set_enabled(true);

        let Some(length) = length else {
            debug!("no length value");
            return Outcome::Weight(None);
        };

        let taxon_name = fields.taxon_name.current_value();
        let sex_id = fields
            .sex
            .as_ref()
            .and_then(|f| f.current_value())
            .and_then(|v| v.qualitative_id());
        let qv_value: Option<MeasurementValue> = fields.qv.as_ref().and_then(|f| f.current_value());
        let parent_group = fields
            .parent_group
            .as_ref()
            .and_then(|f| f.current_value())
            .or_else(|| self.options.parent_group.clone());
        let dressing = parent_group.as_deref().and_then(|group| {
            DressingContext::from_parent(
                group,
                qv_value.as_ref(),
                self.options.qv_pmfm.as_ref(),
                settings,
            )
        });

        let weight_pmfm = &self.options.weight_pmfm;
        let input = EstimateInput {
            sex_id,
            individual_count: fields.individual_count.current_value(),
            target_unit: weight_pmfm.weight_unit(),
            dressing,
            max_decimals: weight_pmfm.maximum_number_decimals,
            ..EstimateInput::new(
                length,
                taxon_name.and_then(|t| t.reference_taxon_id),
                self.options.context.clone(),
            )
        };

        let timeout = settings.lookup_timeout();
        match tokio::time::timeout(timeout, self.engine.estimate_weight(&input)).await {
            Ok(Ok(weight)) => Outcome::Weight(weight),
            Ok(Err(e)) => Outcome::Failed(e),
            Err(_) => Outcome::Failed(CatchWeightError::Timeout(timeout)),
        }
    }

    fn commit(&self, outcome: Outcome) {
        let current = self.fields.weight.current_value();
        let estimate = match outcome {
            Outcome::Weight(weight) => weight,
            Outcome::Failed(e) => {
                warn!("weight-length conversion failed: {e}");
                self.listener.on_error(&e);
                None
            }
        };

        match next_weight_update(current.as_ref(), estimate.as_ref()) {
            WeightUpdate::Keep => {}
            WeightUpdate::Write(weight) => {
                info!("computed weight {:?} {}", weight.value, weight.unit);
                let mirror = weight.value.map(MeasurementValue::numeric);
                self.fields.weight.set_value(Some(weight));
                if let Some(m) = &self.fields.weight_measurement {
                    m.set_value(mirror);
                }
            }
            WeightUpdate::Clear => {
                debug!("resetting previously computed weight");
                self.fields
                    .weight
                    .set_value(Some(WeightResult::cleared(self.options.weight_pmfm.weight_unit())));
                if let Some(m) = &self.fields.weight_measurement {
                    m.set_value(None);
                }
            }
        }
    }
}
