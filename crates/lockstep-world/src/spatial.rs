//! Uniform-grid spatial index over entity positions.
//!
//! Positions are read from a configurable component and pair of float
//! fields. Entities without a finite position are not indexed. The index is
//! built once per frame from the frozen Current State and never updated.
//!
//! Query results are deterministic: radius queries are ordered by
//! ascending distance with ties broken by ascending entity id; box queries
//! are ordered by ascending entity id.

use std::collections::BTreeMap;

use serde::Deserialize;

use lockstep_types::{ComponentType, EntityId};

use crate::state::WorldState;

/// Where positions live and how coarse the grid is.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpatialConfig {
    /// Edge length of one grid cell.
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,

    /// Component holding positions.
    #[serde(default = "default_position_component")]
    pub position_component: ComponentType,

    /// Field holding the x coordinate.
    #[serde(default = "default_x_field")]
    pub x_field: String,

    /// Field holding the y coordinate.
    #[serde(default = "default_y_field")]
    pub y_field: String,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            cell_size: default_cell_size(),
            position_component: default_position_component(),
            x_field: default_x_field(),
            y_field: default_y_field(),
        }
    }
}

const fn default_cell_size() -> f64 {
    100.0
}

fn default_position_component() -> ComponentType {
    ComponentType::from("Transform")
}

fn default_x_field() -> String {
    "x".to_owned()
}

fn default_y_field() -> String {
    "y".to_owned()
}

type Cell = (i64, i64);

/// Grid of entity positions for one frame.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    cell_size: f64,
    position_component: ComponentType,
    cells: BTreeMap<Cell, Vec<(EntityId, f64, f64)>>,
    positions: BTreeMap<EntityId, (f64, f64)>,
}

impl SpatialIndex {
    /// Index every entity with a finite position.
    pub fn build(state: &WorldState, config: &SpatialConfig) -> Self {
        let cell_size = if config.cell_size.is_finite() && config.cell_size > 0.0 {
            config.cell_size
        } else {
            default_cell_size()
        };
        let mut index = Self {
            cell_size,
            position_component: config.position_component.clone(),
            cells: BTreeMap::new(),
            positions: BTreeMap::new(),
        };
        for entity in state.entities() {
            let Some(component) = entity.component(&config.position_component) else {
                continue;
            };
            let (Some(x), Some(y)) = (
                component.float(&config.x_field),
                component.float(&config.y_field),
            ) else {
                continue;
            };
            if !(x.is_finite() && y.is_finite()) {
                continue;
            }
            index
                .cells
                .entry(index.cell_of(x, y))
                .or_default()
                .push((entity.id(), x, y));
            index.positions.insert(entity.id(), (x, y));
        }
        index
    }

    /// Component the positions were read from.
    pub const fn position_component(&self) -> &ComponentType {
        &self.position_component
    }

    /// Indexed position of an entity.
    pub fn position(&self, id: EntityId) -> Option<(f64, f64)> {
        self.positions.get(&id).copied()
    }

    /// Number of indexed entities.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Entities within `radius` of `(x, y)`, nearest first, ties by id.
    pub fn within_radius(&self, x: f64, y: f64, radius: f64) -> Vec<EntityId> {
        if !(x.is_finite() && y.is_finite() && radius.is_finite()) || radius < 0.0 {
            return Vec::new();
        }
        let r2 = radius * radius;
        let mut hits: Vec<(f64, EntityId)> = self
            .candidates(x - radius, y - radius, x + radius, y + radius)
            .filter_map(|&(id, ex, ey)| {
                let d2 = (ex - x).mul_add(ex - x, (ey - y) * (ey - y));
                (d2 <= r2).then_some((d2, id))
            })
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.into_iter().map(|(_, id)| id).collect()
    }

    /// Entities inside the axis-aligned box (inclusive), ascending id.
    pub fn within_box(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<EntityId> {
        let finite = [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite());
        if !finite || min_x > max_x || min_y > max_y {
            return Vec::new();
        }
        let mut hits: Vec<EntityId> = self
            .candidates(min_x, min_y, max_x, max_y)
            .filter(|&&(_, ex, ey)| ex >= min_x && ex <= max_x && ey >= min_y && ey <= max_y)
            .map(|&(id, _, _)| id)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Indexed entries whose cell overlaps the box.
    ///
    /// Falls back to a full scan when the box spans more cells than there
    /// are occupied cells.
    fn candidates(
        &self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> Box<dyn Iterator<Item = &(EntityId, f64, f64)> + '_> {
        let (lo_x, lo_y) = self.cell_of(min_x, min_y);
        let (hi_x, hi_y) = self.cell_of(max_x, max_y);
        let span = |lo: i64, hi: i64| {
            let width = i128::from(hi).saturating_sub(i128::from(lo)).saturating_add(1);
            u128::try_from(width).unwrap_or(0)
        };
        let (span_x, span_y) = (span(lo_x, hi_x), span(lo_y, hi_y));
        let occupied = u128::try_from(self.cells.len()).unwrap_or(u128::MAX);
        if span_x.saturating_mul(span_y) > occupied {
            return Box::new(self.cells.values().flatten());
        }
        Box::new(
            self.cells
                .range((lo_x, lo_y)..=(hi_x, hi_y))
                .filter(move |((cx, cy), _)| (lo_x..=hi_x).contains(cx) && (lo_y..=hi_y).contains(cy))
                .flat_map(|(_, entries)| entries.iter()),
        )
    }

    #[allow(clippy::cast_possible_truncation)]
    fn cell_of(&self, x: f64, y: f64) -> Cell {
        // `as` saturates for out-of-range floats.
        ((x / self.cell_size).floor() as i64, (y / self.cell_size).floor() as i64)
    }
}
