// SPDX-License-Identifier: MPL-2.0

use crate::remote::Runestone;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key under which a completed full-catalog fetch is recorded
const WORLD_KEY: &str = "*";

/// Geographic rectangle in degrees. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub const WORLD: Self = Self {
        west: -180.0,
        south: -90.0,
        east: 180.0,
        north: 90.0,
    };

    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Canonical `west,south,east,north` key
    pub fn key(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.south
            && latitude <= self.north
            && longitude >= self.west
            && longitude <= self.east
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        !(self.east < other.west
            || self.west > other.east
            || self.north < other.south
            || self.south > other.north)
    }

    /// Keep the items located inside this box, preserving order.
    pub fn filter(&self, items: Vec<Runestone>) -> Vec<Runestone> {
        items
            .into_iter()
            .filter(|stone| self.contains(stone.latitude, stone.longitude))
            .collect()
    }
}

/// Regions already fetched this session. Never persisted.
///
/// Once the whole catalog has been mirrored the world entry supersedes
/// every region-specific entry.
#[derive(Debug, Default)]
pub struct CoveredRegions {
    regions: HashMap<String, BoundingBox>,
}

impl CoveredRegions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_world(&mut self) {
        self.regions.clear();
        self.regions
            .insert(WORLD_KEY.to_string(), BoundingBox::WORLD);
    }

    pub fn has_world(&self) -> bool {
        self.regions.contains_key(WORLD_KEY)
    }

    pub fn record(&mut self, bbox: BoundingBox) {
        if self.has_world() {
            return;
        }
        self.regions.insert(bbox.key(), bbox);
    }

    /// True when the world is mirrored or a recorded region overlaps `bbox`.
    pub fn covers(&self, bbox: &BoundingBox) -> bool {
        self.has_world() || self.regions.values().any(|region| region.overlaps(bbox))
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
