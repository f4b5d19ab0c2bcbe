use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn validate(&self) -> Result<()> {
        let mut node_exists: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
        for n in &self.nodes {
            if !node_exists.insert(n.id.as_str()) {
                return Err(Error::DuplicateNode {
                    node_id: n.id.clone(),
                });
            }
        }
        for e in &self.edges {
            if !node_exists.contains(e.source.as_str()) || !node_exists.contains(e.target.as_str())
            {
                return Err(Error::MissingEndpoint {
                    edge_id: e.id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub width: f64,
    pub height: f64,
    /// Optional initial center. Used as the starting point when `randomize` is off.
    pub position: Option<Point>,
    /// Compound parent, if any. Classifiers commonly cluster by this field.
    pub parent: Option<String>,
    /// Compound parents are not simulated; the result reports their bounds instead.
    pub is_parent: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            position: None,
            parent: None,
            is_parent: false,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Point { x, y });
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned box, top-left anchored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

/// Non-fatal findings reported alongside a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// `quality = draft` only runs the spectral step, which requires `randomize = true`.
    /// The run keeps the caller's positions.
    DraftWithoutRandomize,
    /// The wall-clock budget ran out before the simulation converged.
    TimeBudgetExhausted { iterations: usize },
}

#[derive(Debug, Clone, Default)]
pub struct LayoutResult {
    pub positions: std::collections::BTreeMap<String, Point>,
    pub parent_bounds: std::collections::BTreeMap<String, Rect>,
    pub diagnostics: Vec<Diagnostic>,
}
