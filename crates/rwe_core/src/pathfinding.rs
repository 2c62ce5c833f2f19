//! Jump point search over footprint walkability.
//!
//! The search runs on top-left footprint cells: a cell is walkable when a
//! footprint of the moving unit placed with its top-left corner there lies
//! on terrain its movement class can cross and is not occupied by anything
//! other than the unit itself. Diagonal steps are only taken when both
//! orthogonal neighbours are walkable, so no corner is ever cut.
//!
//! All calculations use fixed-point costs and a deterministic tie-breaker,
//! so every peer produces the same path for the same request.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tracing::{debug, trace};

use crate::constants::{MAX_PATH_EXPANSIONS, MAX_PATH_TASKS_PER_TICK};
use crate::grid::{DiscreteRect, OctileDistance, Point};
use crate::ids::UnitId;
use crate::math::{SimScalar, SimVector};
use crate::simulation::GameSimulation;
use crate::unit::{NavigationGoal, NavigationState, PathType, UnitPath};

/// Where a search may stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathGoal {
    /// Reach exactly this cell.
    Cell(Point),
    /// Reach any cell adjacent to this rectangle.
    AdjacentTo(DiscreteRect),
}

impl PathGoal {
    fn is_goal(&self, p: Point) -> bool {
        match self {
            Self::Cell(cell) => *cell == p,
            Self::AdjacentTo(rect) => rect.is_adjacent_to(p.x, p.y),
        }
    }

    fn heuristic(&self, p: Point) -> SimScalar {
        match self {
            Self::Cell(cell) => {
                let dx = (cell.x - p.x).unsigned_abs();
                let dy = (cell.y - p.y).unsigned_abs();
                let diagonal = dx.min(dy);
                OctileDistance {
                    straight: dx.max(dy) - diagonal,
                    diagonal,
                }
                .cost()
            }
            Self::AdjacentTo(rect) => rect.octile_distance_to_perimeter(p.x, p.y).cost(),
        }
    }
}

/// Outcome of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResult {
    /// Jump points from the start cell (included) to the last cell reached.
    pub cells: Vec<Point>,
    /// Whether the last cell satisfies the goal.
    pub path_type: PathType,
    /// Nodes expanded.
    pub expansions: usize,
}

/// A node in the open set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    point: Point,
    f_score: SimScalar,
    g_score: SimScalar,
    /// Lower coordinates first when scores are equal.
    tie_breaker: u64,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for lowest f first.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.tie_breaker.cmp(&self.tie_breaker))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy)]
struct NodeRecord {
    g_score: SimScalar,
    parent: Option<Point>,
    closed: bool,
}

fn tie_breaker(p: Point) -> u64 {
    ((p.y as u32 as u64) << 32) | u64::from(p.x as u32)
}

fn step_cost(from: Point, to: Point) -> SimScalar {
    let dx = (to.x - from.x).unsigned_abs();
    let dy = (to.y - from.y).unsigned_abs();
    let diagonal = dx.min(dy);
    OctileDistance {
        straight: dx.max(dy) - diagonal,
        diagonal,
    }
    .cost()
}

struct JumpPointSearch<'a, F: Fn(Point) -> bool> {
    is_walkable: &'a F,
    goal: &'a PathGoal,
}

impl<F: Fn(Point) -> bool> JumpPointSearch<'_, F> {
    fn walkable(&self, x: i32, y: i32) -> bool {
        (self.is_walkable)(Point::new(x, y))
    }

    /// Neighbours of a node with no parent: every walkable neighbour,
    /// diagonals only when both adjacent orthogonals are walkable.
    fn all_neighbours(&self, p: Point, out: &mut Vec<Point>) {
        let up = self.walkable(p.x, p.y - 1);
        let right = self.walkable(p.x + 1, p.y);
        let down = self.walkable(p.x, p.y + 1);
        let left = self.walkable(p.x - 1, p.y);
        if up {
            out.push(p.offset(0, -1));
        }
        if right {
            out.push(p.offset(1, 0));
        }
        if down {
            out.push(p.offset(0, 1));
        }
        if left {
            out.push(p.offset(-1, 0));
        }
        if left && up && self.walkable(p.x - 1, p.y - 1) {
            out.push(p.offset(-1, -1));
        }
        if up && right && self.walkable(p.x + 1, p.y - 1) {
            out.push(p.offset(1, -1));
        }
        if right && down && self.walkable(p.x + 1, p.y + 1) {
            out.push(p.offset(1, 1));
        }
        if down && left && self.walkable(p.x - 1, p.y + 1) {
            out.push(p.offset(-1, 1));
        }
    }

    /// Pruned neighbours for a node reached from `parent`.
    fn neighbours(&self, p: Point, parent: Option<Point>, out: &mut Vec<Point>) {
        out.clear();
        let Some(parent) = parent else {
            self.all_neighbours(p, out);
            return;
        };
        let dx = (p.x - parent.x).signum();
        let dy = (p.y - parent.y).signum();
        let (x, y) = (p.x, p.y);

        if dx != 0 && dy != 0 {
            let vertical = self.walkable(x, y + dy);
            let horizontal = self.walkable(x + dx, y);
            if vertical {
                out.push(Point::new(x, y + dy));
            }
            if horizontal {
                out.push(Point::new(x + dx, y));
            }
            if vertical && horizontal {
                out.push(Point::new(x + dx, y + dy));
            }
        } else if dx != 0 {
            let next = self.walkable(x + dx, y);
            let top = self.walkable(x, y + 1);
            let bottom = self.walkable(x, y - 1);
            if next {
                out.push(Point::new(x + dx, y));
                if top {
                    out.push(Point::new(x + dx, y + 1));
                }
                if bottom {
                    out.push(Point::new(x + dx, y - 1));
                }
            }
            if top {
                out.push(Point::new(x, y + 1));
            }
            if bottom {
                out.push(Point::new(x, y - 1));
            }
        } else {
            let next = self.walkable(x, y + dy);
            let right = self.walkable(x + 1, y);
            let left = self.walkable(x - 1, y);
            if next {
                out.push(Point::new(x, y + dy));
                if right {
                    out.push(Point::new(x + 1, y + dy));
                }
                if left {
                    out.push(Point::new(x - 1, y + dy));
                }
            }
            if right {
                out.push(Point::new(x + 1, y));
            }
            if left {
                out.push(Point::new(x - 1, y));
            }
        }
    }

    /// Straight jump with no diagonal component.
    fn jump_straight(&self, mut p: Point, dx: i32, dy: i32) -> Option<Point> {
        loop {
            if !self.walkable(p.x, p.y) {
                return None;
            }
            if self.goal.is_goal(p) {
                return Some(p);
            }
            let (x, y) = (p.x, p.y);
            let forced = if dx != 0 {
                (self.walkable(x, y - 1) && !self.walkable(x - dx, y - 1))
                    || (self.walkable(x, y + 1) && !self.walkable(x - dx, y + 1))
            } else {
                (self.walkable(x - 1, y) && !self.walkable(x - 1, y - dy))
                    || (self.walkable(x + 1, y) && !self.walkable(x + 1, y - dy))
            };
            if forced {
                return Some(p);
            }
            p = p.offset(dx, dy);
        }
    }

    /// Jump from `from` toward `to`, returning the next jump point.
    fn jump(&self, to: Point, from: Point) -> Option<Point> {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        if dx == 0 || dy == 0 {
            return self.jump_straight(to, dx, dy);
        }
        let mut p = to;
        loop {
            if !self.walkable(p.x, p.y) {
                return None;
            }
            if self.goal.is_goal(p) {
                return Some(p);
            }
            if self.jump_straight(p.offset(dx, 0), dx, 0).is_some()
                || self.jump_straight(p.offset(0, dy), 0, dy).is_some()
            {
                return Some(p);
            }
            if !(self.walkable(p.x + dx, p.y) && self.walkable(p.x, p.y + dy)) {
                return None;
            }
            p = p.offset(dx, dy);
        }
    }
}

/// Search from `start` toward `goal`.
///
/// The start cell is never tested for walkability. If the goal cannot be
/// reached within `max_expansions`, the path leads to the expanded node
/// closest to the goal and is marked [`PathType::Partial`].
pub fn find_path<F: Fn(Point) -> bool>(
    start: Point,
    goal: &PathGoal,
    is_walkable: &F,
    max_expansions: usize,
) -> PathResult {
    let search = JumpPointSearch { is_walkable, goal };
    let mut open: BinaryHeap<OpenNode> = BinaryHeap::new();
    let mut records: HashMap<Point, NodeRecord> = HashMap::new();

    records.insert(
        start,
        NodeRecord {
            g_score: SimScalar::ZERO,
            parent: None,
            closed: false,
        },
    );
    open.push(OpenNode {
        point: start,
        f_score: goal.heuristic(start),
        g_score: SimScalar::ZERO,
        tie_breaker: tie_breaker(start),
    });

    let mut best = (goal.heuristic(start), SimScalar::ZERO, start);
    let mut expansions = 0;
    let mut neighbours = Vec::with_capacity(8);

    while let Some(current) = open.pop() {
        let Some(record) = records.get_mut(&current.point) else {
            continue;
        };
        if record.closed || current.g_score > record.g_score {
            continue;
        }
        record.closed = true;
        let parent = record.parent;

        if goal.is_goal(current.point) {
            return PathResult {
                cells: reconstruct(&records, current.point),
                path_type: PathType::Complete,
                expansions,
            };
        }

        let h = goal.heuristic(current.point);
        if (h, current.g_score) < (best.0, best.1) {
            best = (h, current.g_score, current.point);
        }

        if expansions >= max_expansions {
            break;
        }
        expansions += 1;

        search.neighbours(current.point, parent, &mut neighbours);
        for &neighbour in &neighbours {
            let Some(jump_point) = search.jump(neighbour, current.point) else {
                continue;
            };
            let g = current.g_score + step_cost(current.point, jump_point);
            let entry = records.entry(jump_point).or_insert(NodeRecord {
                g_score: SimScalar::MAX,
                parent: None,
                closed: false,
            });
            if entry.closed || g >= entry.g_score {
                continue;
            }
            entry.g_score = g;
            entry.parent = Some(current.point);
            open.push(OpenNode {
                point: jump_point,
                f_score: g + goal.heuristic(jump_point),
                g_score: g,
                tie_breaker: tie_breaker(jump_point),
            });
        }
    }

    PathResult {
        cells: reconstruct(&records, best.2),
        path_type: PathType::Partial,
        expansions,
    }
}

fn reconstruct(records: &HashMap<Point, NodeRecord>, end: Point) -> Vec<Point> {
    let mut cells = vec![end];
    let mut current = end;
    while let Some(parent) = records.get(&current).and_then(|r| r.parent) {
        cells.push(parent);
        current = parent;
    }
    cells.reverse();
    cells
}

/// A queued path request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PathRequest {
    /// The unit wanting a path.
    pub unit_id: UnitId,
}

/// Services path requests a bounded number at a time.
#[derive(Debug, Clone, Default)]
pub struct PathFindingService {
    /// Nodes expanded during the last update.
    pub expansions_last_update: usize,
    /// Paths delivered since creation.
    pub paths_delivered: u64,
}

impl PathFindingService {
    /// New service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Service up to [`MAX_PATH_TASKS_PER_TICK`] queued requests.
    pub fn update(&mut self, sim: &mut GameSimulation) {
        self.expansions_last_update = 0;
        for _ in 0..MAX_PATH_TASKS_PER_TICK {
            let Some(request) = sim.path_requests.pop_front() else {
                break;
            };
            let goal = match sim.units.get(request.unit_id).map(|u| &u.navigation_state) {
                Some(NavigationState::Moving(moving)) => moving.goal,
                _ => continue,
            };
            let Some((path, expansions)) = find_unit_path(sim, request.unit_id, &goal) else {
                continue;
            };
            self.expansions_last_update += expansions;
            self.paths_delivered += 1;
            trace!(
                unit = %request.unit_id,
                waypoints = path.waypoints.len(),
                partial = path.path_type == PathType::Partial,
                expansions,
                "path delivered"
            );
            let now = sim.game_time;
            if let Some(unit) = sim.units.get_mut(request.unit_id) {
                if let NavigationState::Moving(moving) = &mut unit.navigation_state {
                    moving.path = Some(path);
                    moving.path_creation_time = now;
                    moving.path_requested = false;
                }
            }
        }
    }
}

/// Compute a path for a unit toward `goal`. Returns the path and the
/// number of expansions, or `None` if the unit is gone.
pub fn find_unit_path(sim: &GameSimulation, unit_id: UnitId, goal: &NavigationGoal) -> Option<(UnitPath, usize)> {
    let unit = sim.units.get(unit_id)?;
    let terrain = &sim.terrain;
    let (fx, fz) = (unit.footprint_x, unit.footprint_z);
    let start = unit.footprint_rect(terrain).top_left();
    let class = &unit.movement_class;

    let path_goal = match goal {
        NavigationGoal::Position(position) => PathGoal::Cell(unit.footprint_rect_at(terrain, *position).top_left()),
        NavigationGoal::Rect(rect) => PathGoal::AdjacentTo(rect.expand_top_left(fx - 1, fz - 1)),
    };

    let movement = sim.movement_classes();
    let occupancy = &sim.occupancy;
    let is_walkable = |p: Point| {
        movement.is_walkable(class, p) && !occupancy.is_blocked(&DiscreteRect::new(p.x, p.y, fx, fz), Some(unit_id))
    };
    let result = find_path(start, &path_goal, &is_walkable, MAX_PATH_EXPANSIONS);

    let mut waypoints: Vec<SimVector> = result
        .cells
        .iter()
        .skip(1)
        .map(|p| terrain.footprint_center(*p, fx, fz))
        .collect();

    if result.path_type == PathType::Complete {
        if let NavigationGoal::Position(position) = goal {
            let exact = SimVector::new(position.x, terrain.height_at(position.x, position.z), position.z);
            match waypoints.last_mut() {
                Some(last) => *last = exact,
                None => waypoints.push(exact),
            }
        }
    }
    if waypoints.is_empty() {
        waypoints.push(terrain.footprint_center(start, fx, fz));
    }
    if result.path_type == PathType::Partial {
        debug!(unit = %unit_id, expansions = result.expansions, "goal unreachable, partial path");
    }
    Some((UnitPath::new(waypoints, result.path_type), result.expansions))
}
