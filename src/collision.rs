//! Drop target resolution under overlapping droppable regions.
//!
//! Month columns and the cards inside them are both droppable, so a pointer
//! over a card is also over its column. Resolution picks exactly one
//! [`TargetRef`], refining a column hit down to the closest card in that
//! column so drops land between cards rather than snapping to the top.

use std::cmp::Ordering;

use crate::model::{Board, DealId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetRef {
    Bucket(String),
    Card(DealId),
}

impl TargetRef {
    pub fn id(&self) -> &str {
        match self {
            TargetRef::Bucket(key) => key,
            TargetRef::Card(id) => id,
        }
    }

    /// Bucket the target belongs to on the given board.
    pub fn bucket_key<'b>(&'b self, board: &'b Board) -> Option<&'b str> {
        match self {
            TargetRef::Bucket(key) => board.is_bucket_key(key).then_some(key.as_str()),
            TargetRef::Card(id) => board.bucket_of(id),
        }
    }
}

/// What is being dragged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveDrag {
    Card(DealId),
    Bucket(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance(&self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Rect {
            left,
            top,
            width,
            height,
        }
    }

    /// Rectangle of the given size centred on `center`.
    pub fn centered(center: Point, width: f64, height: f64) -> Self {
        Rect::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x <= self.right() && point.y >= self.top && point.y <= self.bottom()
    }

    fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.left, self.top),
            Point::new(self.right(), self.top),
            Point::new(self.left, self.bottom()),
            Point::new(self.right(), self.bottom()),
        ]
    }

    fn intersection_area(&self, other: &Rect) -> f64 {
        let width = self.right().min(other.right()) - self.left.max(other.left);
        let height = self.bottom().min(other.bottom()) - self.top.max(other.top);
        if width <= 0.0 || height <= 0.0 {
            return 0.0;
        }
        width * height
    }

    /// Intersection over union; 0 when disjoint.
    fn intersection_ratio(&self, other: &Rect) -> f64 {
        let overlap = self.intersection_area(other);
        if overlap == 0.0 {
            return 0.0;
        }
        overlap / (self.area() + other.area() - overlap)
    }
}

/// A registered drop region. Registration order is the final tie-break.
#[derive(Debug, Clone, PartialEq)]
pub struct Droppable {
    pub target: TargetRef,
    pub rect: Rect,
}

impl Droppable {
    pub fn bucket(key: impl Into<String>, rect: Rect) -> Self {
        Droppable {
            target: TargetRef::Bucket(key.into()),
            rect,
        }
    }

    pub fn card(id: impl Into<DealId>, rect: Rect) -> Self {
        Droppable {
            target: TargetRef::Card(id.into()),
            rect,
        }
    }
}

/// Pointer position (when known) and the dragged item's current rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerGeometry {
    pub pointer: Option<Point>,
    pub active_rect: Rect,
}

pub fn resolve_drop_target(
    geometry: &PointerGeometry,
    candidates: &[Droppable],
    active: &ActiveDrag,
    board: &Board,
) -> Option<TargetRef> {
    if let ActiveDrag::Bucket(_) = active {
        let buckets = candidates
            .iter()
            .filter(|c| matches!(c.target, TargetRef::Bucket(_)));
        return closest_center(&geometry.active_rect, buckets);
    }

    let mut hits = match geometry.pointer {
        Some(pointer) => pointer_within(pointer, candidates),
        None => Vec::new(),
    };
    if hits.is_empty() {
        hits = rect_intersection(&geometry.active_rect, candidates);
    }
    let first = hits.into_iter().next()?;

    if let TargetRef::Bucket(key) = &first {
        let members = match board.bucket(key) {
            Some(bucket) if !bucket.deal_ids.is_empty() => &bucket.deal_ids,
            _ => return Some(first),
        };
        let cards = candidates.iter().filter(|c| match &c.target {
            TargetRef::Card(id) => members.contains(id),
            TargetRef::Bucket(_) => false,
        });
        return closest_center(&geometry.active_rect, cards).or(Some(first));
    }
    Some(first)
}

/// Regions containing the pointer, closest by summed corner distance first so
/// the innermost region wins.
fn pointer_within(pointer: Point, candidates: &[Droppable]) -> Vec<TargetRef> {
    let mut hits: Vec<(f64, &Droppable)> = candidates
        .iter()
        .filter(|c| c.rect.contains(pointer))
        .map(|c| {
            let spread: f64 = c.rect.corners().iter().map(|corner| corner.distance(pointer)).sum();
            (spread, c)
        })
        .collect();
    hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    hits.into_iter().map(|(_, c)| c.target.clone()).collect()
}

/// Regions overlapping the active rectangle, largest overlap ratio first.
fn rect_intersection(active: &Rect, candidates: &[Droppable]) -> Vec<TargetRef> {
    let mut hits: Vec<(f64, &Droppable)> = candidates
        .iter()
        .map(|c| (active.intersection_ratio(&c.rect), c))
        .filter(|(ratio, _)| *ratio > 0.0)
        .collect();
    hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    hits.into_iter().map(|(_, c)| c.target.clone()).collect()
}

fn closest_center<'a, I>(active: &Rect, candidates: I) -> Option<TargetRef>
where
    I: IntoIterator<Item = &'a Droppable>,
{
    let origin = active.center();
    let mut best: Option<(f64, &Droppable)> = None;
    for candidate in candidates {
        let distance = candidate.rect.center().distance(origin);
        match best {
            Some((d, _)) if d <= distance => {}
            _ => best = Some((distance, candidate)),
        }
    }
    best.map(|(_, c)| c.target.clone())
}
