// Buildings: bounded tenant stacks at one lattice site.
//
// A `Building` is the occupancy cell for one lattice coordinate. It holds an
// ordered list of tenants, each drawn as a box stacked on top of the
// previous one. Capacity is fixed at construction (`max_tenants` in the
// config).
//
// ## Stacking
//
// A new tenant's box is centered at `stack_height() + height / 2`, where
// `stack_height()` is the sum of the heights of the tenants already present.
// The height is always summed from the current list, never cached.
//
// ## Removal rebuilds the stack
//
// Removing a tenant from the middle of a stack would leave a gap. Instead of
// shifting boxes, `remove_tenant` takes every tenant's visual off the
// surface, drops the removed tenant from the list, and re-adds the rest in
// their original order through `add_tenant`. Each survivor gets a fresh
// visual at its recomputed height. No index or visual id survives a removal.
//
// ## Outcomes
//
// Nothing here fails loudly. `add_tenant` on a full building and
// `remove_tenant` for an id that is not present return
// `TenantOutcome::CapacityExceeded` / `TenantOutcome::NotFound` and leave the
// building untouched. The server's event stream can run ahead of or behind
// this client, so both are expected.
//
// See also: `city.rs` which owns the lattice of buildings and the `Stage`
// passed into every mutating call here, `render.rs` for `Shape`.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::city::Stage;
use crate::render::{RenderSurface, SceneObject, Shape};
use crate::types::{Color, LatticeCoord, PlaneVec, TenantId};

/// Tenant archetypes. Fixed at tenant creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TenantCategory {
    /// Institutional (hospitals).
    Hospital,
    Business,
    Residential,
}

impl TenantCategory {
    /// Map a server-side type name onto an archetype. The server reports the
    /// tenant's class name, so firm subclasses all land on `Business`.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "Hospital" => Some(Self::Hospital),
            "Residential" | "Household" => Some(Self::Residential),
            "Business" | "Firm" | "ConsumerGoodFirm" | "CapitalEquipmentFirm"
            | "RawMaterialFirm" => Some(Self::Business),
            _ => None,
        }
    }

    pub fn color(self) -> Color {
        match self {
            Self::Hospital => Color(0xff2222),
            Self::Business => Color(0x555555),
            Self::Residential => Color(0xffff44),
        }
    }
}

/// Visual dimensions shared by every tenant box in a building.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TenantStyle {
    pub side: f64,
    pub unit_height: f64,
}

impl TenantStyle {
    fn shape(self, category: TenantCategory) -> Shape {
        Shape::Box {
            side: self.side,
            height: self.unit_height,
            color: category.color(),
        }
    }
}

/// One occupant and its box on the surface.
#[derive(Clone, Debug, PartialEq)]
pub struct Tenant {
    pub id: TenantId,
    pub category: TenantCategory,
    pub visual: SceneObject,
}

impl Tenant {
    pub fn visual_height(&self) -> f64 {
        self.visual.shape.height()
    }
}

/// Result of a tenant mutation. Never an error: every variant is an
/// expected outcome under an unsynchronized event stream.
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantOutcome {
    Added,
    Removed,
    CapacityExceeded,
    NotFound,
}

/// Inline room for the default capacity; larger configs spill to the heap.
type TenantList = SmallVec<[Tenant; 10]>;

/// The occupancy cell at one lattice site.
#[derive(Clone, Debug)]
pub struct Building {
    coord: LatticeCoord,
    /// Logical (pre-offset) ground position of the stack.
    origin: PlaneVec,
    capacity: usize,
    style: TenantStyle,
    tenants: TenantList,
}

impl Building {
    pub fn new(coord: LatticeCoord, origin: PlaneVec, capacity: usize, style: TenantStyle) -> Self {
        Self {
            coord,
            origin,
            capacity,
            style,
            tenants: TenantList::new(),
        }
    }

    pub fn coord(&self) -> LatticeCoord {
        self.coord
    }

    pub fn origin(&self) -> PlaneVec {
        self.origin
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tenants.len() >= self.capacity
    }

    pub fn vacancies(&self) -> usize {
        self.capacity.saturating_sub(self.tenants.len())
    }

    pub fn tenants(&self) -> &[Tenant] {
        &self.tenants
    }

    /// Sum of the heights of all current tenants.
    pub fn stack_height(&self) -> f64 {
        self.tenants.iter().map(Tenant::visual_height).sum()
    }

    /// First tenant with the given id.
    pub fn tenant(&self, id: &TenantId) -> Option<&Tenant> {
        self.tenants.iter().find(|t| &t.id == id)
    }

    fn position_of(&self, id: &TenantId) -> Option<usize> {
        self.tenants.iter().position(|t| &t.id == id)
    }

    /// Stack a new tenant on top, unless the building is full.
    pub fn add_tenant<S: RenderSurface>(
        &mut self,
        id: TenantId,
        category: TenantCategory,
        stage: &mut Stage<S>,
    ) -> TenantOutcome {
        if self.is_full() {
            return TenantOutcome::CapacityExceeded;
        }
        let shape = self.style.shape(category);
        let y = self.stack_height() + shape.height() / 2.0;
        let mut visual = stage.spawn(shape);
        stage.place(&mut visual, self.origin.x, y, self.origin.z);
        self.tenants.push(Tenant {
            id,
            category,
            visual,
        });
        TenantOutcome::Added
    }

    /// Remove the first tenant with this id and rebuild the stack from the
    /// ground up. Unknown ids leave the building and the surface untouched.
    pub fn remove_tenant<S: RenderSurface>(
        &mut self,
        id: &TenantId,
        stage: &mut Stage<S>,
    ) -> TenantOutcome {
        let Some(index) = self.position_of(id) else {
            return TenantOutcome::NotFound;
        };
        for tenant in &self.tenants {
            stage.remove(&tenant.visual);
        }
        let mut survivors = std::mem::take(&mut self.tenants);
        survivors.remove(index);
        for tenant in survivors {
            // Fewer tenants than before, so this cannot hit capacity.
            let _ = self.add_tenant(tenant.id, tenant.category, stage);
        }
        TenantOutcome::Removed
    }

    /// Take every tenant visual off the surface and empty the building.
    pub fn teardown<S: RenderSurface>(&mut self, stage: &mut Stage<S>) {
        for tenant in self.tenants.drain(..) {
            stage.remove(&tenant.visual);
        }
    }
}
