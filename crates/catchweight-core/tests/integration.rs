//! End-to-end tests: estimation, reactive recomputation and catch tree
//! reconciliation.
//!
//! Uses a MockLookup wrapping in-memory tables, which counts calls and can
//! be told to fail or to answer late.

use async_trait::async_trait;
use catchweight_core::context::{
    ContextOverrides, DataContext, FishingArea, Location, MeasurementContext,
};
use catchweight_core::conversion::builtin::load_preset;
use catchweight_core::conversion::schema::{
    ConversionTables, RoundWeightConversion, RoundWeightQuery, WeightLengthConversion,
    WeightLengthQuery,
};
use catchweight_core::conversion::ConversionLookup;
use catchweight_core::error::CatchWeightError;
use catchweight_core::estimate::{
    DressingContext, EstimateInput, LengthMeasurement, WeightEstimationEngine,
};
use catchweight_core::model::{
    Batch, BatchGroup, MeasurementValue, Pmfm, PmfmKind, ReferentialRef, SubBatch, TaxonNameRef,
    WeightResult,
};
use catchweight_core::recompute::{
    attach, FieldWatcher, RecomputeListener, RecomputeOptions, SubBatchForm, WeightFieldState,
};
use catchweight_core::settings::EngineSettings;
use catchweight_core::units::WeightUnit;
use catchweight_core::{batch, reconcile_catch, ReconcileRequest};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct MockLookup {
    tables: ConversionTables,
    calls: AtomicUsize,
    fail: AtomicBool,
    delays: Mutex<VecDeque<Duration>>,
}

impl MockLookup {
    fn new() -> Self {
        Self {
            tables: load_preset("sample").unwrap(),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delays: Mutex::new(VecDeque::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn delay_next(&self, delay: Duration) {
        self.delays.lock().unwrap().push_back(delay);
    }

    async fn answer(&self) -> Result<(), CatchWeightError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CatchWeightError::ConversionLookup("referential offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversionLookup for MockLookup {
    async fn find_weight_length_conversion(
        &self,
        query: &WeightLengthQuery,
    ) -> Result<Option<WeightLengthConversion>, CatchWeightError> {
        self.answer().await?;
        Ok(self.tables.find_weight_length(query).cloned())
    }

    async fn find_round_weight_conversion(
        &self,
        query: &RoundWeightQuery,
    ) -> Result<Option<RoundWeightConversion>, CatchWeightError> {
        self.answer().await?;
        Ok(self.tables.find_round_weight(query).cloned())
    }
}

#[derive(Default)]
struct RecordingListener {
    errors: Mutex<Vec<String>>,
    computing: Mutex<Vec<bool>>,
}

impl RecordingListener {
    fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl RecomputeListener for RecordingListener {
    fn on_error(&self, error: &CatchWeightError) {
        self.errors.lock().unwrap().push(error.code().to_string());
    }

    fn on_computing_changed(&self, computing: bool) {
        self.computing.lock().unwrap().push(computing);
    }
}

const COD_TAXON: i32 = 1001;
const COD_GROUP: i32 = 1120;

fn setup() -> (Arc<MockLookup>, Arc<WeightEstimationEngine<MockLookup>>) {
    let lookup = Arc::new(MockLookup::new());
    let engine = Arc::new(WeightEstimationEngine::new(
        Arc::clone(&lookup),
        EngineSettings::default(),
    ));
    (lookup, engine)
}

fn march_2024(rectangle: &str) -> MeasurementContext {
    MeasurementContext::new(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), rectangle, None)
}

fn length_pmfm() -> Pmfm {
    Pmfm {
        id: 81,
        label: "LENGTH_TOTAL".into(),
        unit_label: Some("cm".into()),
        precision: Some(dec!(0.000001)),
        ..Pmfm::default()
    }
}

fn landing_pmfm() -> Pmfm {
    Pmfm {
        id: 90,
        label: "DISCARD_OR_LANDING".into(),
        kind: PmfmKind::QualitativeValue,
        qualitative_values: vec![ReferentialRef::new(190, "LAN"), ReferentialRef::new(191, "DIS")],
        ..Pmfm::default()
    }
}

fn cod() -> TaxonNameRef {
    TaxonNameRef {
        id: Some(7),
        label: "Gadus morhua".into(),
        reference_taxon_id: Some(COD_TAXON),
    }
}

fn cod_length(length: Decimal) -> EstimateInput {
    EstimateInput::new(
        LengthMeasurement::from_pmfm(&length_pmfm(), Some(length)),
        Some(COD_TAXON),
        march_2024("24E4"),
    )
}

fn length_value(v: Decimal) -> Option<MeasurementValue> {
    Some(MeasurementValue::numeric(v))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(500)).await;
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn live_weight_from_length() {
    let (_, engine) = setup();
    let weight = engine.estimate_weight(&cod_length(dec!(25))).await.unwrap().unwrap();
    // 0.00001 x 25^3
    assert_eq!(weight.value, Some(dec!(0.156250)));
    assert_eq!(weight.value.unwrap().to_string(), "0.156250");
    assert_eq!(weight.unit, WeightUnit::Kg);
    assert!(weight.computed);
}

#[tokio::test]
async fn dressed_weight_uses_inverse_round_weight() {
    let (_, engine) = setup();
    let mut input = cod_length(dec!(25));
    input.dressing = Some(DressingContext {
        taxon_group_id: COD_GROUP,
        dressing_id: 382,
        preserving_id: None,
    });
    let weight = engine.estimate_weight(&input).await.unwrap().unwrap();
    // live 0.15625 / 1.25
    assert_eq!(weight.value, Some(dec!(0.125)));
}

#[tokio::test]
async fn country_specific_round_weight() {
    let (_, engine) = setup();
    let mut input = cod_length(dec!(25));
    input.context.country_id = Some(1);
    input.dressing = Some(DressingContext {
        taxon_group_id: COD_GROUP,
        dressing_id: 382,
        preserving_id: Some(332),
    });
    let weight = engine.estimate_weight(&input).await.unwrap().unwrap();
    // 0.15625 / 1.18 = 0.13241525...
    assert_eq!(weight.value, Some(dec!(0.132415)));
}

#[tokio::test]
async fn no_estimate_without_inputs_and_no_lookup() {
    let (lookup, engine) = setup();

    let mut no_taxon = cod_length(dec!(25));
    no_taxon.reference_taxon_id = None;
    assert!(engine.estimate_weight(&no_taxon).await.unwrap().is_none());

    let mut no_rectangle = cod_length(dec!(25));
    no_rectangle.context.rectangle_label = String::new();
    assert!(engine.estimate_weight(&no_rectangle).await.unwrap().is_none());

    let mut no_length = cod_length(dec!(25));
    no_length.length.value = None;
    assert!(engine.estimate_weight(&no_length).await.unwrap().is_none());

    assert_eq!(lookup.calls(), 0);
}

#[tokio::test]
async fn female_record_then_unsexed_fallback() {
    let (_, engine) = setup();
    let mut female = cod_length(dec!(25));
    female.sex_id = Some(186);
    let w = engine.estimate_weight(&female).await.unwrap().unwrap();
    assert_ne!(w.value, Some(dec!(0.156250)));

    let mut male = cod_length(dec!(25));
    male.sex_id = Some(185);
    let w = engine.estimate_weight(&male).await.unwrap().unwrap();
    assert_eq!(w.value, Some(dec!(0.156250)));
}

#[tokio::test]
async fn lookup_failure_is_an_error() {
    let (lookup, engine) = setup();
    lookup.fail.store(true, Ordering::SeqCst);
    let err = engine.estimate_weight(&cod_length(dec!(25))).await.unwrap_err();
    assert_eq!(err.code(), "WEIGHT_LENGTH_CONVERSION_FAILED");
}

// ---------------------------------------------------------------------------
// Reactive recomputation
// ---------------------------------------------------------------------------

fn cod_form() -> SubBatchForm {
    let sub = SubBatch {
        taxon_name: Some(cod()),
        ..SubBatch::default()
    };
    SubBatchForm::from_sub_batch(&sub, &[length_pmfm()])
}

fn options() -> RecomputeOptions {
    RecomputeOptions::new(
        march_2024("24E4"),
        EngineSettings::default().default_weight_pmfm(),
    )
}

#[tokio::test(start_paused = true)]
async fn no_rectangle_fails_attach_without_lookup() {
    let (lookup, engine) = setup();
    let listener = Arc::new(RecordingListener::default());
    let mut form = cod_form();
    let fields = form.watched_fields(&[length_pmfm()], Some(80), None, Some(122));
    let opts = RecomputeOptions::new(march_2024(""), EngineSettings::default().default_weight_pmfm());

    let result = attach(fields, engine, opts, listener.clone());
    assert!(matches!(result, Err(CatchWeightError::NoRectangle)));
    assert_eq!(listener.errors(), vec!["WEIGHT_LENGTH_CONVERSION_NO_RECTANGLE"]);

    form.measurement(81).unwrap().set_value(length_value(dec!(25)));
    settle().await;
    assert_eq!(lookup.calls(), 0);
    assert_eq!(form.weight.current_value(), None);
}

#[tokio::test(start_paused = true)]
async fn recomputes_on_each_input_change() {
    let (_, engine) = setup();
    let listener = Arc::new(RecordingListener::default());
    let mut form = cod_form();
    let fields = form.watched_fields(&[length_pmfm()], Some(80), None, Some(122));
    let handle = attach(fields, engine, options(), listener.clone()).unwrap();

    form.measurement(81).unwrap().set_value(length_value(dec!(25)));
    settle().await;
    assert_eq!(form.weight.current_value().unwrap().value, Some(dec!(0.156250)));

    form.individual_count.set_value(Some(2));
    settle().await;
    assert_eq!(form.weight.current_value().unwrap().value, Some(dec!(0.312500)));
    assert_eq!(
        form.measurement(122).unwrap().current_value(),
        length_value(dec!(0.3125))
    );

    // clearing the length clears the computed weight
    form.measurement(81).unwrap().set_value(None);
    settle().await;
    let weight = form.weight.current_value().unwrap();
    assert_eq!(weight.value, None);
    assert!(!weight.computed);
    assert_eq!(form.measurement(122).unwrap().current_value(), None);
    assert_eq!(handle.weight_state(), WeightFieldState::Empty);

    let transitions = listener.computing.lock().unwrap().clone();
    assert!(transitions.len() >= 2);
    assert_eq!(transitions.last(), Some(&false));
}

#[tokio::test(start_paused = true)]
async fn manual_weight_is_never_overwritten() {
    let (_, engine) = setup();
    let sub = SubBatch {
        taxon_name: Some(cod()),
        weight: Some(WeightResult::manual(dec!(1.0), WeightUnit::Kg)),
        ..SubBatch::default()
    };
    let mut form = SubBatchForm::from_sub_batch(&sub, &[length_pmfm()]);
    let fields = form.watched_fields(&[length_pmfm()], None, None, Some(122));
    let handle = attach(fields, engine, options(), Arc::new(RecordingListener::default())).unwrap();

    for length in [dec!(25), dec!(30), dec!(12)] {
        form.measurement(81).unwrap().set_value(length_value(length));
        settle().await;
    }
    form.measurement(81).unwrap().set_value(None);
    settle().await;

    assert_eq!(
        form.weight.current_value(),
        Some(WeightResult::manual(dec!(1.0), WeightUnit::Kg))
    );
    assert_eq!(handle.weight_state(), WeightFieldState::Manual);
}

#[tokio::test(start_paused = true)]
async fn last_trigger_wins() {
    let (lookup, engine) = setup();
    let mut form = cod_form();
    let fields = form.watched_fields(&[length_pmfm()], None, None, Some(122));
    let _handle = attach(fields, engine, options(), Arc::new(RecordingListener::default())).unwrap();
    settle().await;

    lookup.delay_next(Duration::from_millis(300));
    lookup.delay_next(Duration::from_millis(10));
    form.measurement(81).unwrap().set_value(length_value(dec!(25)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    form.measurement(81).unwrap().set_value(length_value(dec!(30)));
    settle().await;

    // 0.00001 x 30^3, never the slower answer for 25 cm
    assert_eq!(form.weight.current_value().unwrap().value, Some(dec!(0.270000)));
    assert_eq!(lookup.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_pending_write_back() {
    let (lookup, engine) = setup();
    let mut form = cod_form();
    let fields = form.watched_fields(&[length_pmfm()], None, None, Some(122));
    let handle = attach(fields, engine, options(), Arc::new(RecordingListener::default())).unwrap();
    settle().await;

    lookup.delay_next(Duration::from_millis(300));
    form.measurement(81).unwrap().set_value(length_value(dec!(25)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(handle);
    settle().await;

    assert_eq!(form.weight.current_value(), None);
    assert_eq!(form.measurement(81).unwrap().listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_reports_and_clears_computed_weight() {
    let (lookup, engine) = setup();
    let listener = Arc::new(RecordingListener::default());
    let mut form = cod_form();
    let fields = form.watched_fields(&[length_pmfm()], None, None, Some(122));
    let _handle = attach(fields, engine, options(), listener.clone()).unwrap();

    form.measurement(81).unwrap().set_value(length_value(dec!(25)));
    settle().await;
    assert!(form.weight.current_value().unwrap().computed);

    lookup.delay_next(Duration::from_secs(60));
    form.measurement(81).unwrap().set_value(length_value(dec!(30)));
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(listener.errors(), vec!["WEIGHT_LENGTH_CONVERSION_TIMEOUT"]);
    assert_eq!(form.weight.current_value().unwrap().value, None);
}

#[tokio::test(start_paused = true)]
async fn lookup_failure_keeps_subscription_alive() {
    let (lookup, engine) = setup();
    let listener = Arc::new(RecordingListener::default());
    let mut form = cod_form();
    let fields = form.watched_fields(&[length_pmfm()], None, None, Some(122));
    let _handle = attach(fields, engine, options(), listener.clone()).unwrap();

    lookup.fail.store(true, Ordering::SeqCst);
    form.measurement(81).unwrap().set_value(length_value(dec!(25)));
    settle().await;
    assert_eq!(listener.errors(), vec!["WEIGHT_LENGTH_CONVERSION_FAILED"]);
    assert_eq!(form.weight.current_value(), None);

    lookup.fail.store(false, Ordering::SeqCst);
    form.measurement(81).unwrap().set_value(length_value(dec!(26)));
    settle().await;
    // 0.00001 x 26^3
    assert_eq!(form.weight.current_value().unwrap().value, Some(dec!(0.175760)));
}

#[tokio::test(start_paused = true)]
async fn parent_dressing_applies_to_form() {
    let (_, engine) = setup();
    let group = Arc::new(qv_group());
    let sub = SubBatch {
        taxon_name: Some(cod()),
        parent_group: Some(Arc::clone(&group)),
        measurement_values: [(90, MeasurementValue::Model { id: 190 })].into_iter().collect(),
        ..SubBatch::default()
    };
    let mut form = SubBatchForm::from_sub_batch(&sub, &[length_pmfm(), landing_pmfm()]);
    let fields = form.watched_fields(&[length_pmfm()], None, Some(90), Some(122));
    let opts = options().with_qv_pmfm(landing_pmfm());
    let _handle = attach(fields, engine, opts, Arc::new(RecordingListener::default())).unwrap();

    form.measurement(81).unwrap().set_value(length_value(dec!(25)));
    settle().await;
    assert_eq!(form.weight.current_value().unwrap().value, Some(dec!(0.125)));

    // switching to discard: whole fish, live weight
    form.measurement(90)
        .unwrap()
        .set_value(Some(MeasurementValue::Model { id: 191 }));
    settle().await;
    assert_eq!(form.weight.current_value().unwrap().value, Some(dec!(0.15625)));
}

// ---------------------------------------------------------------------------
// Batch tree
// ---------------------------------------------------------------------------

fn individual(rank: i32, length: Decimal, weight: Option<WeightResult>) -> Batch {
    Batch {
        label: format!("SORTING_BATCH_INDIVIDUAL#{rank}"),
        rank_order: rank,
        taxon_name: Some(cod()),
        measurement_values: [(81, MeasurementValue::numeric(length))].into_iter().collect(),
        weight,
        ..Batch::default()
    }
}

fn qv_child(label: &str, rank: i32, qv: i32, extra: &[(i32, i32)], children: Vec<Batch>) -> Batch {
    let mut measurement_values: std::collections::BTreeMap<i32, MeasurementValue> =
        [(90, MeasurementValue::Model { id: qv })].into_iter().collect();
    for (pmfm, value) in extra {
        measurement_values.insert(*pmfm, MeasurementValue::Model { id: *value });
    }
    Batch {
        label: format!("SORTING_BATCH#1.{label}"),
        rank_order: rank,
        individual_count: Some(children.len() as i32),
        measurement_values,
        children,
        ..Batch::default()
    }
}

fn qv_group() -> BatchGroup {
    BatchGroup::from_batch(Batch {
        id: Some(100),
        label: "SORTING_BATCH#1".into(),
        rank_order: 1,
        taxon_group: Some(ReferentialRef::new(COD_GROUP, "COD")),
        children: vec![
            qv_child(
                "LAN",
                1,
                190,
                &[(151, 382)],
                vec![
                    individual(1, dec!(25), None),
                    individual(2, dec!(40), Some(WeightResult::manual(dec!(2.0), WeightUnit::Kg))),
                ],
            ),
            qv_child("DIS", 2, 191, &[], vec![individual(3, dec!(25), None)]),
        ],
        ..Batch::default()
    })
}

#[test]
fn merge_identical_sub_batches_adds_counts() {
    let group = Arc::new(qv_group());
    let pmfms = vec![length_pmfm()];
    let make = |count| SubBatch {
        taxon_name: Some(cod()),
        individual_count: Some(count),
        measurement_values: [(81, MeasurementValue::numeric(dec!(25)))].into_iter().collect(),
        parent_group: Some(Arc::clone(&group)),
        ..SubBatch::default()
    };
    let mut rows = Vec::new();
    batch::add_sub_batch(&mut rows, make(3), &pmfms, true);
    batch::add_sub_batch(&mut rows, make(2), &pmfms, true);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].individual_count, Some(5));
}

#[test]
fn orphans_are_relinked_or_dropped() {
    let old = Arc::new(qv_group());
    let subs = batch::explode_groups_to_sub_batches(
        &[Arc::clone(&old)],
        Some(&landing_pmfm()),
        catchweight_core::model::ValueRepresentation::Model,
    );
    assert_eq!(subs.len(), 3);

    // same group, reloaded
    let reloaded = Arc::new(qv_group());
    let (kept, report) = batch::set_available_parents(subs.clone(), &[Arc::clone(&reloaded)]);
    assert_eq!(kept.len(), 3);
    assert!(report.orphans.is_empty());
    assert!(kept
        .iter()
        .all(|s| Arc::ptr_eq(s.parent_group.as_ref().unwrap(), &reloaded)));

    // group removed
    let (kept, report) = batch::set_available_parents(subs, &[]);
    assert!(kept.is_empty());
    assert_eq!(report.orphans.len(), 3);
}

#[tokio::test]
async fn reconcile_catch_tree() {
    let (_, engine) = setup();
    let request = ReconcileRequest {
        catch_batch: Batch {
            id: Some(1),
            label: "CATCH_BATCH".into(),
            children: vec![qv_group().batch],
            ..Batch::default()
        },
        pmfms: vec![length_pmfm(), landing_pmfm()],
        qv_pmfm_id: Some(90),
        length_pmfm_id: None,
        data_context: DataContext {
            date: NaiveDate::from_ymd_opt(2024, 3, 15),
            fishing_areas: vec![FishingArea {
                location: Some(Location {
                    id: Some(5),
                    label: "24E4".into(),
                    level_id: Some(4),
                }),
            }],
            ..DataContext::default()
        },
    };

    let result = reconcile_catch(&request, &*engine, &ContextOverrides::default())
        .await
        .unwrap();
    assert_eq!(result.context.rectangle_label, "24E4");
    assert_eq!(result.report.sub_batches, 3);
    assert_eq!(result.report.estimated, 3);
    assert_eq!(result.report.kept_manual, 1);
    assert_eq!(result.report.unmatched, 0);

    let group = &result.catch_batch.children[0];
    let landing = &group.children[0];
    let discard = &group.children[1];
    assert_eq!(landing.children.len(), 2);
    assert_eq!(landing.children[0].weight.as_ref().unwrap().value, Some(dec!(0.125)));
    assert_eq!(
        landing.children[1].weight,
        Some(WeightResult::manual(dec!(2.0), WeightUnit::Kg))
    );
    assert_eq!(discard.children[0].weight.as_ref().unwrap().value, Some(dec!(0.15625)));
    assert_eq!(discard.children[0].label, "SORTING_BATCH_INDIVIDUAL#1");
    assert!(!discard.children[0].measurement_values.contains_key(&90));

    // 0.125 + manual 2.0 + 0.15625, to the gram
    let sum = group.children_weight.as_ref().unwrap();
    assert_eq!(sum.value, Some(dec!(2.281)));
    assert_eq!(sum.method_id, Some(EngineSettings::default().calculated_method_id));
    let discard_sum = discard.children_weight.as_ref().unwrap();
    assert_eq!(discard_sum.value, Some(dec!(0.156)));
    assert_eq!(discard_sum.method_id, Some(283));
}

fn cod_catch(groups: Vec<Batch>) -> ReconcileRequest {
    ReconcileRequest {
        catch_batch: Batch {
            id: Some(1),
            label: "CATCH_BATCH".into(),
            children: groups,
            ..Batch::default()
        },
        pmfms: vec![length_pmfm(), landing_pmfm()],
        qv_pmfm_id: Some(90),
        length_pmfm_id: None,
        data_context: DataContext {
            date: NaiveDate::from_ymd_opt(2024, 3, 15),
            fishing_areas: vec![FishingArea {
                location: Some(Location {
                    id: Some(5),
                    label: "24E4".into(),
                    level_id: Some(4),
                }),
            }],
            ..DataContext::default()
        },
    }
}

#[tokio::test]
async fn reconcile_sum_skips_groups_with_unweighed_individuals() {
    let (_, engine) = setup();
    let mut group = qv_group().batch;
    // no length, so no weight
    let mut unmeasured = individual(3, dec!(0), None);
    unmeasured.measurement_values.clear();
    group.children[0].children.push(unmeasured);
    group.children[0].individual_count = Some(3);

    let request = cod_catch(vec![group]);
    let result = reconcile_catch(&request, &*engine, &ContextOverrides::default())
        .await
        .unwrap();
    assert_eq!(result.report.skipped, 1);

    let group = &result.catch_batch.children[0];
    assert_eq!(group.children[0].children.len(), 3);
    assert_eq!(group.children[0].children_weight, None);
    // the landing subtree is left out of the group sum
    let sum = group.children_weight.as_ref().unwrap();
    assert_eq!(sum.value, Some(dec!(0.156)));
    assert_eq!(sum.method_id, Some(283));
}

#[tokio::test]
async fn reconcile_with_failing_lookup_warns_and_continues() {
    let (lookup, engine) = setup();
    lookup.fail.store(true, Ordering::SeqCst);

    let request = cod_catch(vec![qv_group().batch]);
    let result = reconcile_catch(&request, &*engine, &ContextOverrides::default())
        .await
        .unwrap();
    assert_eq!(lookup.calls(), 3);
    assert_eq!(result.report.estimated, 0);
    assert_eq!(result.report.skipped, 3);
    let failures = result
        .report
        .warnings
        .iter()
        .filter(|w| w.ends_with(": TRIP.SUB_BATCH.ERROR.WEIGHT_LENGTH_CONVERSION_FAILED"))
        .count();
    assert_eq!(failures, 3);

    let group = &result.catch_batch.children[0];
    assert_eq!(group.children[0].children[0].weight.as_ref().and_then(|w| w.value), None);
    assert_eq!(
        group.children[0].children[1].weight,
        Some(WeightResult::manual(dec!(2.0), WeightUnit::Kg))
    );
    assert_eq!(group.children_weight, None);
}

#[test]
fn explode_and_fold_without_qv_pmfm() {
    let original = BatchGroup::from_batch(Batch {
        id: Some(200),
        label: "SORTING_BATCH#2".into(),
        rank_order: 2,
        taxon_group: Some(ReferentialRef::new(COD_GROUP, "COD")),
        children: vec![Batch {
            label: "SORTING_BATCH#2.%".into(),
            rank_order: 1,
            individual_count: Some(2),
            children: vec![
                individual(1, dec!(25), None),
                individual(2, dec!(40), Some(WeightResult::manual(dec!(2.0), WeightUnit::Kg))),
            ],
            ..Batch::default()
        }],
        ..Batch::default()
    });

    let subs = batch::explode_groups_to_sub_batches(
        &[Arc::new(original.clone())],
        None,
        catchweight_core::model::ValueRepresentation::Model,
    );
    assert_eq!(subs.len(), 2);
    assert!(subs.iter().all(|s| s.parent_id == Some(200)));

    let mut groups = vec![original.clone()];
    let report = batch::fold_sub_batches_into_parents(&mut groups, subs, None);
    assert_eq!(report.assigned, 2);
    assert!(report.unmatched.is_empty());

    let folded = &groups[0].batch;
    assert_eq!(folded.children.len(), 1);
    let before = &original.batch.children[0].children;
    let after = &folded.children[0].children;
    assert_eq!(after.len(), before.len());
    for (a, b) in after.iter().zip(before) {
        assert_eq!(a.label, b.label);
        assert_eq!(a.measurement_values, b.measurement_values);
        assert_eq!(a.weight, b.weight);
    }
    assert_eq!(groups[0].observed_individual_count, Some(2));
}

#[tokio::test]
async fn reconcile_without_rectangle_warns() {
    let (lookup, engine) = setup();
    let request = ReconcileRequest {
        catch_batch: Batch {
            label: "CATCH_BATCH".into(),
            children: vec![qv_group().batch],
            ..Batch::default()
        },
        pmfms: vec![length_pmfm(), landing_pmfm()],
        qv_pmfm_id: Some(90),
        length_pmfm_id: None,
        data_context: DataContext {
            date: NaiveDate::from_ymd_opt(2024, 3, 15),
            ..DataContext::default()
        },
    };
    let result = reconcile_catch(&request, &*engine, &ContextOverrides::default())
        .await
        .unwrap();
    assert_eq!(result.report.estimated, 0);
    assert!(result
        .report
        .warnings
        .contains(&"TRIP.SUB_BATCH.ERROR.WEIGHT_LENGTH_CONVERSION_NO_RECTANGLE".to_string()));
    assert_eq!(lookup.calls(), 0);
}
