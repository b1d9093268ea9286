// The city grid: lattice of buildings plus the wandering population.
//
// `City` owns the spatial state of the mirror:
// - one `Building` per lattice coordinate, laid out row-major at spawn and
//   kept for the lifetime of the grid;
// - the population, keyed by server id (a `BTreeMap`, so per-frame iteration
//   order is deterministic);
// - the road plane under the lattice;
// - the `Stage`, which owns the render surface and the centering offset.
//
// ## Coordinates
//
// `full_side = cell_side + 2 * margin`, `grid_width = full_side * cols`,
// `grid_depth = full_side * rows`. Logical coordinates are relative to the
// lattice corner. `Stage::place` adds the centering offset
// `(-grid_width / 2 + nudge.0, -grid_depth / 2 + nudge.1)` and is the only
// place a world position is computed from logical coordinates. The building
// at `(row, col)` stands at logical `(row * full_side, col * full_side)`.
//
// ## Building ids
//
// The lattice exists before the server says anything. A `setup` message then
// names the buildings, and ids are bound to lattice sites in message order
// (row-major). Events for ids that were never bound are no-ops.
//
// ## Entry and exit
//
// `place_person` drops a person just outside one edge of the grid (a coin
// flip picks north/south or east/west, a second flip picks the edge) on a
// random street, biased one radius to the side so opposing traffic uses
// different lanes. `update` advances every wandering person one frame and
// retires those whose odometer has passed the grid span plus a radius on each
// side. Scheduling the re-entry is the reconciler's job; `update` just
// reports who left.
//
// See also: `building.rs`, `person.rs`, `reconciler.rs` which drives `update`
// from the frame tick.

use std::collections::BTreeMap;

use skyline_prng::SceneRng;
use skyline_protocol::message::{BuildingRecord, PersonEvent, PersonRecord};

use crate::building::{Building, TenantCategory, TenantOutcome, TenantStyle};
use crate::config::MirrorConfig;
use crate::person::{Person, appearance_for};
use crate::render::{RenderSurface, SceneObject, Shape, StatusCue};
use crate::series::ChartFrame;
use crate::types::{
    BuildingId, Color, LatticeCoord, PersonId, PlaneVec, TenantId, VisualId, WorldPos,
};

pub const ROAD_COLOR: Color = Color(0x333333);

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// The render surface plus the logical-to-world transform. Every add,
/// remove, and move against the surface goes through here.
#[derive(Debug)]
pub struct Stage<S> {
    offset: PlaneVec,
    surface: S,
    next_visual: u64,
}

impl<S: RenderSurface> Stage<S> {
    pub fn new(offset: PlaneVec, surface: S) -> Self {
        Self {
            offset,
            surface,
            next_visual: 0,
        }
    }

    pub fn offset(&self) -> PlaneVec {
        self.offset
    }

    /// Mint an unplaced visual with a fresh id.
    pub fn spawn(&mut self, shape: Shape) -> SceneObject {
        let id = VisualId(self.next_visual);
        self.next_visual += 1;
        SceneObject {
            id,
            shape,
            position: WorldPos::default(),
        }
    }

    /// Set the object's world position from logical coordinates and put it
    /// on the surface. No bounds checks.
    pub fn place(&mut self, object: &mut SceneObject, x: f64, y: f64, z: f64) {
        object.position = WorldPos::new(x + self.offset.x, y, z + self.offset.z);
        self.surface.add(object.id, &object.shape, object.position);
    }

    /// Take the object off the surface. Whoever holds the object still does.
    pub fn remove(&mut self, object: &SceneObject) {
        self.surface.remove(object.id);
    }

    /// Push the object's current position to the surface.
    pub fn sync(&mut self, object: &SceneObject) {
        self.surface.move_to(object.id, object.position);
    }

    pub fn pulse(&mut self, object: &SceneObject, cue: StatusCue) {
        self.surface.pulse(object.id, cue);
    }

    pub fn draw_chart(&mut self, name: &str, frame: &ChartFrame) {
        self.surface.draw_chart(name, frame);
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }
}

// ---------------------------------------------------------------------------
// City
// ---------------------------------------------------------------------------

pub struct City<S> {
    rows: u32,
    cols: u32,
    cell_side: f64,
    margin: f64,
    full_side: f64,
    grid_width: f64,
    grid_depth: f64,
    capacity: usize,
    tenant_style: TenantStyle,
    person_radius: f64,
    person_speed: f64,

    stage: Stage<S>,
    /// Row-major, `rows * cols` entries.
    buildings: Vec<Building>,
    building_index: BTreeMap<BuildingId, usize>,
    population: BTreeMap<PersonId, Person>,
    road: Option<SceneObject>,
}

impl<S: RenderSurface> City<S> {
    /// Lay out the lattice and roads on a fresh surface.
    pub fn new(config: &MirrorConfig, surface: S) -> Self {
        let full_side = config.full_side();
        let grid_width = full_side * f64::from(config.cols);
        let grid_depth = full_side * f64::from(config.rows);
        let offset = PlaneVec::new(
            -grid_width / 2.0 + config.centering_nudge.0,
            -grid_depth / 2.0 + config.centering_nudge.1,
        );
        let mut city = Self {
            rows: config.rows,
            cols: config.cols,
            cell_side: config.cell_side,
            margin: config.margin,
            full_side,
            grid_width,
            grid_depth,
            capacity: config.max_tenants,
            tenant_style: TenantStyle {
                side: config.tenant_side,
                unit_height: config.tenant_unit_height,
            },
            person_radius: config.person_radius,
            person_speed: config.person_speed,
            stage: Stage::new(offset, surface),
            buildings: Vec::new(),
            building_index: BTreeMap::new(),
            population: BTreeMap::new(),
            road: None,
        };
        city.spawn_buildings();
        city.spawn_roads();
        city
    }

    fn spawn_buildings(&mut self) {
        self.buildings = (0..self.rows)
            .flat_map(|row| (0..self.cols).map(move |col| LatticeCoord::new(row, col)))
            .map(|coord| {
                let origin = PlaneVec::new(
                    f64::from(coord.row) * self.full_side,
                    f64::from(coord.col) * self.full_side,
                );
                Building::new(coord, origin, self.capacity, self.tenant_style)
            })
            .collect();
    }

    fn spawn_roads(&mut self) {
        let mut road = self.stage.spawn(Shape::Plane {
            width: self.grid_width,
            depth: self.grid_depth,
            color: ROAD_COLOR,
        });
        self.stage.place(
            &mut road,
            self.grid_width / 2.0 - self.margin,
            0.0,
            self.grid_depth / 2.0 - self.margin,
        );
        self.road = Some(road);
    }

    /// Remove every visual from the surface and drop all state.
    fn clear_scene(&mut self) {
        for building in &mut self.buildings {
            building.teardown(&mut self.stage);
        }
        for person in self.population.values().filter(|p| p.is_wandering()) {
            self.stage.remove(&person.visual);
        }
        if let Some(road) = self.road.take() {
            self.stage.remove(&road);
        }
        self.buildings.clear();
        self.building_index.clear();
        self.population.clear();
    }

    /// Tear the grid down and lay out a fresh one on the same surface.
    pub fn reset(&mut self) {
        self.clear_scene();
        self.spawn_buildings();
        self.spawn_roads();
    }

    /// Tear the grid down and hand back the surface.
    pub fn teardown(mut self) -> S {
        self.clear_scene();
        self.stage.into_surface()
    }

    // -- Accessors ----------------------------------------------------------

    pub fn grid_width(&self) -> f64 {
        self.grid_width
    }

    pub fn grid_depth(&self) -> f64 {
        self.grid_depth
    }

    pub fn full_side(&self) -> f64 {
        self.full_side
    }

    pub fn offset(&self) -> PlaneVec {
        self.stage.offset()
    }

    pub fn stage(&self) -> &Stage<S> {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut Stage<S> {
        &mut self.stage
    }

    pub fn surface(&self) -> &S {
        self.stage.surface()
    }

    pub fn road(&self) -> Option<&SceneObject> {
        self.road.as_ref()
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn building_at(&self, coord: LatticeCoord) -> Option<&Building> {
        if coord.row >= self.rows || coord.col >= self.cols {
            return None;
        }
        self.buildings
            .get((coord.row * self.cols + coord.col) as usize)
    }

    pub fn building(&self, id: &BuildingId) -> Option<&Building> {
        self.building_index.get(id).map(|&i| &self.buildings[i])
    }

    pub fn bound_building_count(&self) -> usize {
        self.building_index.len()
    }

    pub fn person(&self, id: &PersonId) -> Option<&Person> {
        self.population.get(id)
    }

    pub fn population(&self) -> impl Iterator<Item = &Person> {
        self.population.values()
    }

    pub fn population_len(&self) -> usize {
        self.population.len()
    }

    pub fn wandering_count(&self) -> usize {
        self.population.values().filter(|p| p.is_wandering()).count()
    }

    // -- Buildings ----------------------------------------------------------

    /// Bind server building ids to lattice sites in row-major order.
    /// Returns how many were bound; records beyond the lattice are dropped.
    pub fn assign_building_ids(&mut self, records: &[BuildingRecord]) -> usize {
        let bound = records.len().min(self.buildings.len());
        for (index, record) in records[..bound].iter().enumerate() {
            self.building_index.insert(record.id.clone(), index);
        }
        bound
    }

    pub fn add_tenant(
        &mut self,
        building: &BuildingId,
        tenant: TenantId,
        category: TenantCategory,
    ) -> TenantOutcome {
        let Some(&index) = self.building_index.get(building) else {
            return TenantOutcome::NotFound;
        };
        self.buildings[index].add_tenant(tenant, category, &mut self.stage)
    }

    pub fn remove_tenant(&mut self, building: &BuildingId, tenant: &TenantId) -> TenantOutcome {
        let Some(&index) = self.building_index.get(building) else {
            return TenantOutcome::NotFound;
        };
        self.buildings[index].remove_tenant(tenant, &mut self.stage)
    }

    // -- Population ---------------------------------------------------------

    /// Track a new pending person. Returns false if the id is already known.
    pub fn add_person(&mut self, record: &PersonRecord) -> bool {
        if self.population.contains_key(&record.id) {
            return false;
        }
        let visual = self.stage.spawn(Shape::Sphere {
            radius: self.person_radius,
            color: appearance_for(record.race),
        });
        let person = Person::new(record, visual, self.person_radius);
        self.population.insert(record.id.clone(), person);
        true
    }

    /// Put a person at a random entry point and start them walking. Returns
    /// false if the person is unknown or already on screen.
    pub fn place_person(&mut self, id: &PersonId, rng: &mut SceneRng) -> bool {
        let Some(person) = self.population.get_mut(id) else {
            return false;
        };
        if !person.awaiting_entry() {
            return false;
        }
        let r = person.radius();
        let street = self.cell_side / 2.0 + self.margin;
        let speed = self.person_speed;
        let mut velocity = PlaneVec::ZERO;
        let (x, z);
        if rng.coin_flip() {
            let near = rng.coin_flip();
            let col = rng.range_inclusive_u64(0, u64::from(self.cols)) as f64;
            let lane = (col - 1.0) * self.full_side + street;
            if near {
                z = -r;
                x = lane - r;
                velocity.z = speed;
            } else {
                z = self.grid_depth + r;
                x = lane + r;
                velocity.z = -speed;
            }
        } else {
            let near = rng.coin_flip();
            let row = rng.range_inclusive_u64(0, u64::from(self.rows)) as f64;
            let lane = (row - 1.0) * self.full_side + street;
            if near {
                x = -r;
                z = lane - r;
                velocity.x = speed;
            } else {
                x = self.grid_width + r;
                z = lane + r;
                velocity.x = -speed;
            }
        }
        self.stage.place(&mut person.visual, x - r, r, z - r);
        person.wander(velocity);
        true
    }

    /// Advance every wandering person one frame. Returns the ids of those
    /// that walked off the grid this frame, already taken off the surface.
    pub fn update(&mut self) -> Vec<PersonId> {
        let mut exited = Vec::new();
        for person in self.population.values_mut() {
            if !person.is_wandering() {
                continue;
            }
            person.update();
            self.stage.sync(&person.visual);
            let pad = 2.0 * person.radius();
            let traveled = person.odometer();
            if traveled.x > self.grid_width + pad || traveled.z > self.grid_depth + pad {
                person.stop();
                self.stage.remove(&person.visual);
                person.mark_exited();
                exited.push(person.id.clone());
            }
        }
        exited
    }

    /// Apply an employment event and flash the cue if the person is on
    /// screen. Returns the updated person, or `None` if unknown.
    pub fn apply_person_event(&mut self, id: &PersonId, event: PersonEvent) -> Option<&Person> {
        let person = self.population.get_mut(id)?;
        if let Some(cue) = person.apply_event(event) {
            if person.is_wandering() {
                self.stage.pulse(&person.visual, cue);
            }
        }
        Some(&*person)
    }

    /// Drop a person for good: stop them, take them off the surface, and
    /// forget them. Any pending entry timer then finds nobody to place.
    pub fn remove_person(&mut self, id: &PersonId) -> Option<Person> {
        let mut person = self.population.remove(id)?;
        person.stop();
        if person.is_wandering() {
            self.stage.remove(&person.visual);
        }
        Some(person)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingSurface;
    use skyline_protocol::message::EmploymentFlag;

    fn city() -> City<RecordingSurface> {
        City::new(&MirrorConfig::default(), RecordingSurface::new())
    }

    fn record(id: u64) -> PersonRecord {
        PersonRecord {
            id: PersonId::from(id),
            race: id as u32,
            employed: EmploymentFlag::Flag(false),
            firm_owner: false,
        }
    }

    fn bind(city: &mut City<RecordingSurface>, n: u64) {
        let records: Vec<BuildingRecord> = (0..n)
            .map(|i| BuildingRecord {
                id: BuildingId::from(i),
            })
            .collect();
        city.assign_building_ids(&records);
    }

    #[test]
    fn lattice_geometry_and_offset() {
        let city = city();
        assert_eq!(city.full_side(), 2.0);
        assert_eq!(city.grid_width(), 12.0);
        assert_eq!(city.grid_depth(), 12.0);
        assert_eq!(city.offset(), PlaneVec::new(-3.0, -3.0));
        assert_eq!(city.buildings().len(), 36);

        let b = city.building_at(LatticeCoord::new(2, 5)).unwrap();
        assert_eq!(b.origin(), PlaneVec::new(4.0, 10.0));
        assert!(city.building_at(LatticeCoord::new(6, 0)).is_none());
    }

    #[test]
    fn roads_cover_the_lattice() {
        let city = city();
        let road = city.road().unwrap();
        assert_eq!(road.position, WorldPos::new(5.5 - 3.0, 0.0, 5.5 - 3.0));
        assert_eq!(city.surface().live_count(), 1);
    }

    #[test]
    fn place_applies_the_offset() {
        let mut city = city();
        let mut obj = city.stage_mut().spawn(Shape::Sphere {
            radius: 0.2,
            color: Color(0),
        });
        city.stage_mut().place(&mut obj, 1.0, 0.5, 2.0);
        assert_eq!(obj.position, WorldPos::new(-2.0, 0.5, -1.0));
        assert_eq!(city.surface().position(obj.id), Some(obj.position));
    }

    #[test]
    fn building_ids_bind_row_major_and_extra_records_are_dropped() {
        let mut city = city();
        bind(&mut city, 40);
        assert_eq!(city.bound_building_count(), 36);
        let b = city.building(&BuildingId::from(7)).unwrap();
        assert_eq!(b.coord(), LatticeCoord::new(1, 1));
        assert!(city.building(&BuildingId::from(36)).is_none());
    }

    #[test]
    fn tenant_events_for_unbound_buildings_are_not_found() {
        let mut city = city();
        bind(&mut city, 1);
        assert_eq!(
            city.add_tenant(&BuildingId::from(99), TenantId::from(1), TenantCategory::Hospital),
            TenantOutcome::NotFound
        );
        assert_eq!(
            city.add_tenant(&BuildingId::from(0), TenantId::from(1), TenantCategory::Hospital),
            TenantOutcome::Added
        );
        assert_eq!(city.building(&BuildingId::from(0)).unwrap().len(), 1);
    }

    #[test]
    fn entry_points_sit_just_outside_an_edge() {
        let mut city = city();
        let mut rng = SceneRng::new(11);
        let r = 0.2;
        for id in 0..200 {
            assert!(city.add_person(&record(id)));
            assert!(city.place_person(&PersonId::from(id), &mut rng));
            let p = city.person(&PersonId::from(id)).unwrap();
            let x = p.visual.position.x - city.offset().x;
            let z = p.visual.position.z - city.offset().z;
            assert!((p.visual.position.y - r).abs() < 1e-9);
            let v = p.velocity();
            if v.z != 0.0 {
                assert_eq!(v.x, 0.0);
                let expected_z = if v.z > 0.0 { -2.0 * r } else { 12.0 };
                assert!((z - expected_z).abs() < 1e-9, "z={z}");
            } else {
                assert_ne!(v.x, 0.0);
                let expected_x = if v.x > 0.0 { -2.0 * r } else { 12.0 };
                assert!((x - expected_x).abs() < 1e-9, "x={x}");
            }
            assert!((v.x.abs() + v.z.abs() - 0.1).abs() < 1e-12);
        }
        assert_eq!(city.wandering_count(), 200);
    }

    #[test]
    fn placing_twice_is_refused() {
        let mut city = city();
        let mut rng = SceneRng::new(1);
        city.add_person(&record(1));
        assert!(city.place_person(&PersonId::from(1), &mut rng));
        assert!(!city.place_person(&PersonId::from(1), &mut rng));
        assert!(!city.place_person(&PersonId::from(2), &mut rng));
    }

    #[test]
    fn wanderer_exits_exactly_once_after_crossing() {
        let mut city = city();
        let mut rng = SceneRng::new(3);
        let id = PersonId::from(1);
        city.add_person(&record(1));
        city.place_person(&id, &mut rng);
        let visual = city.person(&id).unwrap().visual.id;

        let mut exits = Vec::new();
        for frame in 0..200 {
            for gone in city.update() {
                exits.push((frame, gone));
            }
        }
        assert_eq!(exits.len(), 1);
        // (12 + 0.4) / 0.1 frames, give or take float accumulation.
        assert!((123..=125).contains(&exits[0].0), "exited on frame {}", exits[0].0);

        let p = city.person(&id).unwrap();
        assert!(p.awaiting_entry());
        assert!(p.velocity().is_zero());
        assert!(!city.surface().is_live(visual));
        assert_eq!(city.surface().stray_removes, 0);

        // Re-entry resets the odometer and reuses the same visual.
        assert!(city.place_person(&id, &mut rng));
        let p = city.person(&id).unwrap();
        assert_eq!(p.odometer(), PlaneVec::ZERO);
        assert!(city.surface().is_live(visual));
        assert_eq!(city.surface().adds_of(visual), 2);
    }

    #[test]
    fn removed_person_leaves_the_surface() {
        let mut city = city();
        let mut rng = SceneRng::new(5);
        let id = PersonId::from(4);
        city.add_person(&record(4));
        city.place_person(&id, &mut rng);
        let visual = city.person(&id).unwrap().visual.id;

        let gone = city.remove_person(&id).unwrap();
        assert!(gone.velocity().is_zero());
        assert!(!city.surface().is_live(visual));
        assert!(city.person(&id).is_none());
        assert!(!city.place_person(&id, &mut rng));
        assert!(city.remove_person(&id).is_none());
    }

    #[test]
    fn status_pulse_only_on_screen() {
        let mut city = city();
        let mut rng = SceneRng::new(5);
        let id = PersonId::from(2);
        city.add_person(&record(2));
        city.apply_person_event(&id, PersonEvent::Hired);
        assert!(city.surface().ops.iter().all(|op| !matches!(op, crate::render::SurfaceOp::Pulse { .. })));

        city.place_person(&id, &mut rng);
        city.apply_person_event(&id, PersonEvent::Fired);
        let pulses = city
            .surface()
            .ops
            .iter()
            .filter(|op| matches!(op, crate::render::SurfaceOp::Pulse { cue: StatusCue::LostJob, .. }))
            .count();
        assert_eq!(pulses, 1);
        assert!(city.apply_person_event(&PersonId::from(77), PersonEvent::Hired).is_none());
    }

    #[test]
    fn reset_clears_every_visual_and_relays_the_grid() {
        let mut city = city();
        let mut rng = SceneRng::new(8);
        bind(&mut city, 36);
        for i in 0..5 {
            let _ = city.add_tenant(&BuildingId::from(i), TenantId::from(i), TenantCategory::Business);
            city.add_person(&record(i));
            city.place_person(&PersonId::from(i), &mut rng);
        }
        city.reset();
        assert_eq!(city.population_len(), 0);
        assert_eq!(city.bound_building_count(), 0);
        assert_eq!(city.buildings().len(), 36);
        assert!(city.buildings().iter().all(Building::is_empty));
        // Only the new road is left.
        assert_eq!(city.surface().live_count(), 1);
        assert_eq!(city.surface().stray_removes, 0);

        let surface = city.teardown();
        assert_eq!(surface.live_count(), 0);
    }
}
