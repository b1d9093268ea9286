// Event reconciler: the mirror's single entry point.
//
// `EventReconciler` owns everything: the immutable config, the virtual clock,
// the scene PRNG, the scheduler queue, the `City`, and the chart registry. It
// is the only thing that mutates any of them.
//
// ## Stepping
//
// `step(inbound, target_ms)` runs the clock forward. At each instant it
// first applies every inbound message timestamped at or before now (in slice
// order), then fires every scheduled event due at or before now (frame ticks,
// person entries), then jumps to the next instant that has something to do,
// capped at `target_ms`. Messages timestamped after `target_ms` are left for
// the next call; `StepResult::consumed` tells the caller how far it got.
// Messages timestamped in the past are applied at the current instant.
//
// `apply` / `apply_frame` apply one message at the current instant without
// moving the clock, for callers that receive messages as they arrive.
//
// ## Routing
//
// - `setup`: bump the generation, reset the grid, bind building ids, create
//   the population, and schedule every person's first entry with jitter.
// - `buildings`: add or remove a tenant. A full building drops the tenant
//   (`TenantRejected`, logged). Unknown building or tenant ids are no-ops.
// - `person`: employment changes flash a cue; `died` removes the person.
//   Unknown ids are no-ops.
// - `graph`: append to the named series and redraw. Unknown names are no-ops.
//
// Nothing here returns an error or panics on bad input. A frame whose payload
// does not decode, or a tenant with an unknown type name, produces an
// `Ignored` event and a warning, and the loop carries on.
//
// ## Re-entry guard
//
// Entry timers cannot be cancelled. Each carries the generation it was
// scheduled under; at fire time the entry is dropped if the generation is
// stale or the person is no longer tracked (died) or is already on screen.
//
// See also: `city.rs`, `event.rs` for the queue and narrative events,
// `skyline_replay` for the driver that feeds recorded logs through here.

use tracing::{debug, info, warn};

use skyline_prng::SceneRng;
use skyline_protocol::framing::Frame;
use skyline_protocol::message::{
    BuildingEvent, BuildingsPayload, GraphPayload, InboundMessage, PersonEvent, PersonPayload,
    SetupPayload,
};

use crate::building::{TenantCategory, TenantOutcome};
use crate::city::City;
use crate::config::MirrorConfig;
use crate::event::{EventQueue, MirrorEvent, MirrorEventKind, ScheduledEvent, ScheduledEventKind};
use crate::render::RenderSurface;
use crate::series::SeriesRegistry;
use crate::types::PersonId;

/// An inbound message stamped with the virtual time it arrived.
#[derive(Clone, Debug, PartialEq)]
pub struct TimedMessage {
    pub at_ms: u64,
    pub message: InboundMessage,
}

/// What one call to `step` did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepResult {
    pub events: Vec<MirrorEvent>,
    /// Number of leading inbound messages applied.
    pub consumed: usize,
}

pub struct EventReconciler<S> {
    config: MirrorConfig,
    now_ms: u64,
    rng: SceneRng,
    queue: EventQueue,
    city: City<S>,
    series: SeriesRegistry,
    /// Bumped on every `setup`; entry timers from older generations are void.
    generation: u64,
}

impl<S: RenderSurface> EventReconciler<S> {
    /// Build the mirror at time zero. The lattice and roads are laid out
    /// immediately; the population arrives with the first `setup`.
    pub fn new(config: MirrorConfig, surface: S) -> Self {
        let city = City::new(&config, surface);
        let series = SeriesRegistry::new(
            config.metrics.iter().cloned(),
            config.series_capacity,
            config.chart_transition_ms,
        );
        let mut queue = EventQueue::new();
        queue.schedule(config.frame_interval_ms(), ScheduledEventKind::FrameTick);
        Self {
            rng: SceneRng::new(config.seed),
            config,
            now_ms: 0,
            queue,
            city,
            series,
            generation: 0,
        }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn city(&self) -> &City<S> {
        &self.city
    }

    pub fn series(&self) -> &SeriesRegistry {
        &self.series
    }

    pub fn surface(&self) -> &S {
        self.city.surface()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Pending entry timers for a person, stale generations included.
    pub fn pending_entries_for(&self, person: &PersonId) -> usize {
        self.queue.pending_entries_for(person)
    }

    /// Hand back the surface, tearing the grid down first.
    pub fn into_surface(self) -> S {
        self.city.teardown()
    }

    // -----------------------------------------------------------------------
    // Clock
    // -----------------------------------------------------------------------

    /// Advance to `target_ms`, interleaving inbound messages with scheduled
    /// events. `inbound` must be sorted by `at_ms`.
    pub fn step(&mut self, inbound: &[TimedMessage], target_ms: u64) -> StepResult {
        let mut result = StepResult::default();
        loop {
            while let Some(timed) = inbound.get(result.consumed) {
                if timed.at_ms > self.now_ms {
                    break;
                }
                self.handle_message(timed.message.clone(), &mut result.events);
                result.consumed += 1;
            }
            while let Some(event) = self.queue.pop_due(self.now_ms) {
                self.process_event(event, &mut result.events);
            }
            if self.now_ms >= target_ms {
                break;
            }
            let next_message = inbound.get(result.consumed).map(|m| m.at_ms);
            let next = [self.queue.peek_due(), next_message]
                .into_iter()
                .flatten()
                .min()
                .map_or(target_ms, |t| t.min(target_ms));
            self.now_ms = next.max(self.now_ms);
        }
        result
    }

    /// Advance with no inbound messages.
    pub fn advance_to(&mut self, target_ms: u64) -> StepResult {
        self.step(&[], target_ms)
    }

    /// Apply one message at the current instant.
    pub fn apply(&mut self, message: InboundMessage) -> Vec<MirrorEvent> {
        let mut events = Vec::new();
        self.handle_message(message, &mut events);
        events
    }

    /// Decode and apply one wire frame at the current instant. Frames on
    /// channels the mirror does not model are skipped.
    pub fn apply_frame(&mut self, frame: &Frame) -> Vec<MirrorEvent> {
        match InboundMessage::decode(frame) {
            Ok(Some(message)) => self.apply(message),
            Ok(None) => {
                debug!(channel = %frame.channel, "skipping unmodeled channel");
                Vec::new()
            }
            Err(err) => {
                warn!(channel = %frame.channel, error = %err, "dropping malformed event");
                vec![self.event(MirrorEventKind::Ignored {
                    channel: frame.channel.clone(),
                    reason: err.to_string(),
                })]
            }
        }
    }

    fn event(&self, kind: MirrorEventKind) -> MirrorEvent {
        MirrorEvent {
            time_ms: self.now_ms,
            kind,
        }
    }

    // -----------------------------------------------------------------------
    // Scheduled events
    // -----------------------------------------------------------------------

    fn process_event(&mut self, event: ScheduledEvent, events: &mut Vec<MirrorEvent>) {
        match event.kind {
            ScheduledEventKind::FrameTick => {
                for person in self.city.update() {
                    let reentry_at_ms = self.schedule_entry(person.clone());
                    events.push(self.event(MirrorEventKind::PersonExited {
                        person,
                        reentry_at_ms,
                    }));
                }
                let next = self.now_ms + self.config.frame_interval_ms();
                self.queue.schedule(next, ScheduledEventKind::FrameTick);
            }
            ScheduledEventKind::PersonEntry {
                person_id,
                generation,
            } => {
                if generation != self.generation {
                    debug!(person = %person_id, generation, "dropping entry from a previous setup");
                    return;
                }
                if self.city.place_person(&person_id, &mut self.rng) {
                    events.push(self.event(MirrorEventKind::PersonEntered { person: person_id }));
                } else {
                    debug!(person = %person_id, "entry skipped, person gone or already placed");
                }
            }
        }
    }

    /// Schedule a jittered entry for a person. Returns the due time.
    fn schedule_entry(&mut self, person_id: PersonId) -> u64 {
        let delay = self.rng.range_inclusive_u64(0, self.config.reentry_jitter_ms);
        let due = self.now_ms + delay;
        self.queue.schedule(
            due,
            ScheduledEventKind::PersonEntry {
                person_id,
                generation: self.generation,
            },
        );
        due
    }

    // -----------------------------------------------------------------------
    // Inbound messages
    // -----------------------------------------------------------------------

    fn handle_message(&mut self, message: InboundMessage, events: &mut Vec<MirrorEvent>) {
        match message {
            InboundMessage::Setup(setup) => self.handle_setup(setup, events),
            InboundMessage::Buildings(payload) => self.handle_buildings(payload, events),
            InboundMessage::Person(payload) => self.handle_person(payload, events),
            InboundMessage::Graph(payload) => self.handle_graph(payload, events),
        }
    }

    fn handle_setup(&mut self, setup: SetupPayload, events: &mut Vec<MirrorEvent>) {
        self.generation += 1;
        self.city.reset();

        let buildings = self.city.assign_building_ids(&setup.buildings);
        if buildings < setup.buildings.len() {
            warn!(
                received = setup.buildings.len(),
                lattice = buildings,
                "more buildings than lattice sites, extra ids ignored"
            );
        }
        for record in &setup.population {
            if self.city.add_person(record) {
                self.schedule_entry(record.id.clone());
            } else {
                debug!(person = %record.id, "duplicate person in setup");
            }
        }
        let population = self.city.population_len();
        info!(buildings, population, generation = self.generation, "city bootstrapped");
        events.push(self.event(MirrorEventKind::Bootstrapped {
            buildings,
            population,
        }));
    }

    fn handle_buildings(&mut self, payload: BuildingsPayload, events: &mut Vec<MirrorEvent>) {
        let BuildingsPayload {
            id: building,
            event,
            tenant,
        } = payload;
        match event {
            BuildingEvent::AddedTenant => {
                let category = tenant
                    .type_name
                    .as_deref()
                    .and_then(TenantCategory::from_type_name);
                let Some(category) = category else {
                    let type_name = tenant.type_name.as_deref().unwrap_or("<missing>");
                    warn!(%building, tenant = %tenant.id, type_name, "unknown tenant type");
                    events.push(self.event(MirrorEventKind::Ignored {
                        channel: "buildings".to_owned(),
                        reason: format!("unknown tenant type `{type_name}`"),
                    }));
                    return;
                };
                match self.city.add_tenant(&building, tenant.id.clone(), category) {
                    TenantOutcome::Added => events.push(self.event(MirrorEventKind::TenantAdded {
                        building,
                        tenant: tenant.id,
                        category,
                    })),
                    TenantOutcome::CapacityExceeded => {
                        warn!(%building, tenant = %tenant.id, "building full, tenant dropped");
                        events.push(self.event(MirrorEventKind::TenantRejected {
                            building,
                            tenant: tenant.id,
                        }));
                    }
                    TenantOutcome::NotFound | TenantOutcome::Removed => {
                        debug!(%building, "tenant added to unknown building");
                    }
                }
            }
            BuildingEvent::RemovedTenant => match self.city.remove_tenant(&building, &tenant.id) {
                TenantOutcome::Removed => events.push(self.event(MirrorEventKind::TenantRemoved {
                    building,
                    tenant: tenant.id,
                })),
                _ => debug!(%building, tenant = %tenant.id, "removal of untracked tenant"),
            },
        }
    }

    fn handle_person(&mut self, payload: PersonPayload, events: &mut Vec<MirrorEvent>) {
        let PersonPayload { id, event } = payload;
        if event == PersonEvent::Died {
            if self.city.remove_person(&id).is_some() {
                events.push(self.event(MirrorEventKind::PersonDied { person: id }));
            } else {
                debug!(person = %id, "death of untracked person");
            }
            return;
        }
        match self.city.apply_person_event(&id, event).map(|p| p.status()) {
            Some(status) => events.push(self.event(MirrorEventKind::PersonStatusChanged {
                person: id,
                status,
            })),
            None => debug!(person = %id, ?event, "event for untracked person"),
        }
    }

    fn handle_graph(&mut self, payload: GraphPayload, events: &mut Vec<MirrorEvent>) {
        let GraphPayload { graph, data } = payload;
        let Some(frame) = self.series.append(&graph, data.as_slice()) else {
            debug!(metric = %graph, "no chart for metric");
            return;
        };
        self.city.stage_mut().draw_chart(&graph, &frame);
        events.push(self.event(MirrorEventKind::ChartRedrawn {
            metric: graph,
            samples: frame.path.len(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RecordingSurface, SurfaceOp};
    use crate::types::{BuildingId, TenantId};
    use skyline_protocol::framing::decode_line;
    use skyline_protocol::message::{
        BuildingRecord, EmploymentFlag, PersonRecord, Sample, SampleBatch, TenantRecord,
    };

    type Mirror = EventReconciler<RecordingSurface>;

    fn mirror() -> Mirror {
        EventReconciler::new(MirrorConfig::default(), RecordingSurface::new())
    }

    fn person_record(id: u64) -> PersonRecord {
        PersonRecord {
            id: PersonId::from(id),
            race: 0,
            employed: EmploymentFlag::Flag(true),
            firm_owner: false,
        }
    }

    fn setup(buildings: u64, people: u64) -> InboundMessage {
        InboundMessage::Setup(SetupPayload {
            population: (0..people).map(person_record).collect(),
            buildings: (0..buildings)
                .map(|i| BuildingRecord {
                    id: BuildingId::from(i),
                })
                .collect(),
        })
    }

    fn added(building: u64, tenant: u64, type_name: &str) -> InboundMessage {
        InboundMessage::Buildings(BuildingsPayload {
            id: BuildingId::from(building),
            event: BuildingEvent::AddedTenant,
            tenant: TenantRecord {
                id: TenantId::from(tenant),
                type_name: Some(type_name.to_owned()),
            },
        })
    }

    fn removed(building: u64, tenant: u64) -> InboundMessage {
        InboundMessage::Buildings(BuildingsPayload {
            id: BuildingId::from(building),
            event: BuildingEvent::RemovedTenant,
            tenant: TenantRecord {
                id: TenantId::from(tenant),
                type_name: None,
            },
        })
    }

    fn person(id: u64, event: PersonEvent) -> InboundMessage {
        InboundMessage::Person(PersonPayload {
            id: PersonId::from(id),
            event,
        })
    }

    fn graph(name: &str, samples: &[(i64, f64)]) -> InboundMessage {
        InboundMessage::Graph(GraphPayload {
            graph: name.to_owned(),
            data: SampleBatch::Many(
                samples
                    .iter()
                    .map(|&(time, value)| Sample { time, value })
                    .collect(),
            ),
        })
    }

    fn count(events: &[MirrorEvent], pred: impl Fn(&MirrorEventKind) -> bool) -> usize {
        events.iter().filter(|e| pred(&e.kind)).count()
    }

    #[test]
    fn tenants_stack_and_restack_end_to_end() {
        let mut m = mirror();
        m.apply(setup(1, 0));
        for _ in 0..3 {
            let events = m.apply(added(0, 7, "Residential"));
            assert!(matches!(events[0].kind, MirrorEventKind::TenantAdded { .. }));
        }
        let b = m.city().building(&BuildingId::from(0)).unwrap();
        assert_eq!(b.len(), 3);
        assert_eq!(b.stack_height(), 3.0 * 0.5);

        m.apply(removed(0, 7));
        let b = m.city().building(&BuildingId::from(0)).unwrap();
        assert_eq!(b.len(), 2);
        let ys: Vec<f64> = b.tenants().iter().map(|t| t.visual.position.y).collect();
        assert_eq!(ys, vec![0.25, 0.75]);
        assert_eq!(b.stack_height(), 1.0);
        // Road plus the two rebuilt tenants.
        assert_eq!(m.surface().live_count(), 3);
    }

    #[test]
    fn full_building_rejects_and_logs() {
        let config = MirrorConfig {
            max_tenants: 2,
            ..MirrorConfig::default()
        };
        let mut m = EventReconciler::new(config, RecordingSurface::new());
        m.apply(setup(1, 0));
        m.apply(added(0, 1, "Hospital"));
        m.apply(added(0, 2, "ConsumerGoodFirm"));
        let events = m.apply(added(0, 3, "Household"));
        assert!(matches!(events[0].kind, MirrorEventKind::TenantRejected { .. }));
        assert_eq!(m.city().building(&BuildingId::from(0)).unwrap().len(), 2);
    }

    #[test]
    fn unknown_references_leave_state_untouched() {
        let mut m = mirror();
        m.apply(setup(1, 1));
        m.apply(added(0, 1, "Business"));
        let ops_before = m.surface().ops.len();

        assert!(m.apply(added(5, 1, "Business")).is_empty());
        assert!(m.apply(removed(0, 99)).is_empty());
        assert!(m.apply(removed(5, 1)).is_empty());
        assert!(m.apply(person(42, PersonEvent::Hired)).is_empty());
        assert!(m.apply(person(42, PersonEvent::Died)).is_empty());
        assert!(m.apply(graph("gdp", &[(0, 1.0)])).is_empty());

        assert_eq!(m.surface().ops.len(), ops_before);
        assert_eq!(m.city().building(&BuildingId::from(0)).unwrap().len(), 1);
        assert!(m.series().get("gdp").is_none());
    }

    #[test]
    fn unknown_tenant_type_is_ignored() {
        let mut m = mirror();
        m.apply(setup(1, 0));
        let events = m.apply(added(0, 1, "Spaceport"));
        assert!(matches!(&events[0].kind, MirrorEventKind::Ignored { channel, .. } if channel == "buildings"));
        assert!(m.city().building(&BuildingId::from(0)).unwrap().is_empty());
    }

    #[test]
    fn malformed_frames_fail_closed() {
        let mut m = mirror();
        let frame = decode_line(r#"person:{"id":1,"event":"promoted"}"#).unwrap();
        let events = m.apply_frame(&frame);
        assert!(matches!(&events[0].kind, MirrorEventKind::Ignored { channel, .. } if channel == "person"));

        let chatter = decode_line(r#"twooter:{"name":"x","body":"y"}"#).unwrap();
        assert!(m.apply_frame(&chatter).is_empty());
    }

    /// People walk slowly enough that nobody finishes a crossing within the
    /// first few seconds.
    fn slow_mirror() -> Mirror {
        let config = MirrorConfig {
            person_speed: 0.01,
            ..MirrorConfig::default()
        };
        EventReconciler::new(config, RecordingSurface::new())
    }

    /// Step frame by frame until someone exits. Returns the re-entry time.
    fn run_until_exit(m: &mut Mirror) -> u64 {
        loop {
            assert!(m.now_ms() < 60_000, "nobody exited");
            let target = m.now_ms() + 33;
            let result = m.advance_to(target);
            let reentry = result.events.iter().find_map(|e| match &e.kind {
                MirrorEventKind::PersonExited { reentry_at_ms, .. } => Some(*reentry_at_ms),
                _ => None,
            });
            if let Some(reentry) = reentry {
                return reentry;
            }
        }
    }

    #[test]
    fn population_enters_within_the_jitter_window() {
        let mut m = slow_mirror();
        let inbound = [TimedMessage {
            at_ms: 0,
            message: setup(36, 20),
        }];
        let result = m.step(&inbound, 5_000);
        assert_eq!(result.consumed, 1);
        assert_eq!(
            count(&result.events, |k| matches!(k, MirrorEventKind::PersonEntered { .. })),
            20
        );
        assert_eq!(m.city().wandering_count(), 20);
        assert_eq!(m.now_ms(), 5_000);
    }

    #[test]
    fn exit_then_reentry_round_trip() {
        let mut m = mirror();
        m.apply(setup(1, 1));
        let id = PersonId::from(0);
        let visual = m.city().person(&id).unwrap().visual.id;

        let reentry = run_until_exit(&mut m);
        assert!(reentry >= m.now_ms() - 33);
        assert!(reentry <= m.now_ms() + 5_000);
        assert_eq!(m.pending_entries_for(&id) + usize::from(m.city().person(&id).unwrap().is_wandering()), 1);

        m.advance_to(reentry);
        let p = m.city().person(&id).unwrap();
        assert!(p.is_wandering());
        assert!(p.odometer().x <= 0.1 + 1e-9 && p.odometer().z <= 0.1 + 1e-9);
        assert_eq!(m.surface().adds_of(visual), 2);
        assert_eq!(m.surface().stray_removes, 0);
    }

    #[test]
    fn dead_person_is_never_replaced() {
        let mut m = mirror();
        m.apply(setup(1, 1));
        let id = PersonId::from(0);
        // Dies before the first entry timer fires.
        assert_eq!(m.pending_entries_for(&id), 1);
        let events = m.apply(person(0, PersonEvent::Died));
        assert!(matches!(events[0].kind, MirrorEventKind::PersonDied { .. }));

        let result = m.advance_to(20_000);
        assert_eq!(
            count(&result.events, |k| matches!(k, MirrorEventKind::PersonEntered { .. })),
            0
        );
        assert!(m.city().person(&id).is_none());
        assert_eq!(m.surface().live_count(), 1);
    }

    #[test]
    fn dead_after_exit_is_never_replaced() {
        let mut m = mirror();
        m.apply(setup(1, 1));
        let id = PersonId::from(0);
        let reentry = run_until_exit(&mut m);

        m.apply(person(0, PersonEvent::Died));
        let result = m.advance_to(reentry + 10_000);
        assert_eq!(
            count(&result.events, |k| matches!(k, MirrorEventKind::PersonEntered { .. })),
            0
        );
        assert!(m.city().person(&id).is_none());
        // Only the road is left on screen.
        assert_eq!(m.surface().live_count(), 1);
        assert_eq!(m.surface().stray_removes, 0);
    }

    #[test]
    fn resetup_voids_old_entry_timers() {
        let mut m = slow_mirror();
        m.apply(setup(1, 3));
        assert_eq!(m.generation(), 1);
        m.apply(setup(1, 3));
        assert_eq!(m.generation(), 2);
        // Old and new timers are both queued; only the new ones place anyone.
        assert_eq!(m.pending_entries_for(&PersonId::from(0)), 2);

        let result = m.advance_to(5_000);
        assert_eq!(
            count(&result.events, |k| matches!(k, MirrorEventKind::PersonEntered { .. })),
            3
        );
        assert_eq!(m.city().wandering_count(), 3);
        assert_eq!(m.surface().stray_removes, 0);
    }

    #[test]
    fn status_events_pulse_on_screen_people() {
        let mut m = slow_mirror();
        m.apply(setup(1, 1));
        m.advance_to(5_000);
        let events = m.apply(person(0, PersonEvent::Fired));
        assert!(matches!(
            events[0].kind,
            MirrorEventKind::PersonStatusChanged {
                status: crate::person::EmploymentStatus::Unemployed,
                ..
            }
        ));
        assert!(m.surface().ops.iter().any(|op| matches!(op, SurfaceOp::Pulse { .. })));
    }

    #[test]
    fn graph_samples_redraw_the_chart() {
        let mut m = mirror();
        for i in 0..60 {
            m.apply(graph("welfare", &[(i, i as f64)]));
        }
        let frame = m.surface().charts.get("welfare").unwrap();
        assert_eq!(frame.path.len(), 51);
        assert_eq!(frame.x_domain, (9, 59));
        assert_eq!(frame.y_domain, (9.0, 59.0));
    }

    #[test]
    fn messages_apply_before_events_at_the_same_instant() {
        let mut m = mirror();
        let inbound = [
            TimedMessage {
                at_ms: 0,
                message: setup(1, 0),
            },
            TimedMessage {
                at_ms: 33,
                message: added(0, 1, "Business"),
            },
            TimedMessage {
                at_ms: 10_000,
                message: added(0, 2, "Business"),
            },
        ];
        let result = m.step(&inbound, 33);
        assert_eq!(result.consumed, 2);
        let added_at = result
            .events
            .iter()
            .find(|e| matches!(e.kind, MirrorEventKind::TenantAdded { .. }))
            .unwrap()
            .time_ms;
        assert_eq!(added_at, 33);

        let rest = m.step(&inbound[result.consumed..], 10_000);
        assert_eq!(rest.consumed, 1);
        assert_eq!(m.city().building(&BuildingId::from(0)).unwrap().len(), 2);
    }

    #[test]
    fn same_seed_same_story() {
        let run = || {
            let mut m = mirror();
            m.apply(setup(36, 10));
            m.advance_to(20_000).events
        };
        assert_eq!(run(), run());
    }
}
