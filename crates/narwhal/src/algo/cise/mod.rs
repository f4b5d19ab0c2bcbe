//! Circular spring embedder driver.
//!
//! [`CiseLayout::prerun`] seeds the layout (spectral embedding, circle ordering, cluster
//! placement). Every [`CiseLayout::tick`] then advances the constrained simulation by `refresh`
//! iterations through steps A to E:
//!
//! - A, C: circles move as rigid bodies,
//! - B: same, plus periodic circle reversal,
//! - D: neighbors on a circle may swap; afterwards tangled in-nodes may move inside,
//! - E: polish with stretched ideal lengths.

pub(crate) mod arrange;
pub(crate) mod circle;
pub(crate) mod forces;
pub(crate) mod inner;
pub(crate) mod model;
pub(crate) mod physics;
pub(crate) mod placer;
pub(crate) mod reverse;
pub(crate) mod swap;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use self::forces::{FINAL_EDGE_LENGTH_SCALE, ForceParams};
use self::model::GraphManager;
use self::placer::ClusterPlacer;
use self::swap::{SwapMemory, SwapPhase};
use super::pack::{self, Bounds};
use super::rng::XorShift64Star;
use super::spectral::{self, SpectralParams};
use super::{CiseOptions, Layout, Quality};
use crate::error::Result;
use crate::graph::{Diagnostic, Graph, LayoutResult, Point, Rect};

pub(crate) const CONVERGENCE_CHECK_PERIOD: usize = 100;
pub(crate) const COOLING_FACTOR_INCREMENTAL: f64 = 0.3;
pub(crate) const FINAL_TEMPERATURE: f64 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    A,
    B,
    C,
    D,
    E,
    Done,
}

impl Step {
    fn next(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::C,
            Self::C => Self::D,
            Self::D => Self::E,
            Self::E | Self::Done => Self::Done,
        }
    }

    /// Share of `num_iter` granted to the step.
    fn budget_fraction(self) -> f64 {
        match self {
            Self::A => 0.20,
            Self::B => 0.20,
            Self::C => 0.10,
            Self::D => 0.35,
            Self::E => 0.15,
            Self::Done => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Created,
    Simulating,
    Finished,
    PostProcessed,
}

/// CoSE cooling schedule over the whole simulation.
#[derive(Debug, Clone, Copy)]
struct Cooling {
    factor: f64,
    cycle: f64,
    max_cycle: f64,
}

impl Cooling {
    fn new(num_iter: usize, quality: Quality) -> Self {
        let mut max_cycle = num_iter as f64 / CONVERGENCE_CHECK_PERIOD as f64;
        if quality == Quality::Proof {
            max_cycle *= 2.0;
        }
        Self {
            factor: COOLING_FACTOR_INCREMENTAL,
            cycle: 0.0,
            max_cycle,
        }
    }

    fn advance(&mut self) {
        self.cycle += 1.0;
        let numerator = (100.0 * (COOLING_FACTOR_INCREMENTAL - FINAL_TEMPERATURE)).ln();
        let denominator = self.max_cycle.ln().max(1e-9);
        let schedule = self.cycle.powf(numerator / denominator) / 100.0;
        self.factor = (COOLING_FACTOR_INCREMENTAL - schedule).max(FINAL_TEMPERATURE);
    }
}

/// One CiSE layout run.
///
/// Drive it with the [`Layout`] trait (or [`Layout::run`]) and read positions with
/// [`CiseLayout::snapshot`] at any point.
#[derive(Debug)]
pub struct CiseLayout {
    opts: CiseOptions,
    gm: GraphManager,
    rng: XorShift64Star,
    params: ForceParams,
    stage: Stage,
    step: Step,
    step_iteration: usize,
    step_budget: usize,
    total_iterations: usize,
    cooling: Cooling,
    convergence_threshold: f64,
    old_total_displacement: f64,
    last_total_displacement: f64,
    root_connected: bool,
    swap_memory: SwapMemory,
    started: Option<Instant>,
    initial_center: Option<(f64, f64)>,
    keep_positions: bool,
    diagnostics: Vec<Diagnostic>,
}

impl CiseLayout {
    /// Validates `graph` against `opts` and builds the layout model.
    pub fn new(graph: &Graph, opts: CiseOptions) -> Result<Self> {
        let gm = GraphManager::build(graph, &opts)?;

        let initial_center = if opts.randomize {
            None
        } else {
            let mut b = Bounds::default();
            for v in 0..gm.real_count {
                b.include(&gm.nodes[v].frame());
            }
            (!b.is_empty()).then(|| b.center())
        };
        let simulated = gm.simulated_real_nodes().count().max(1) as f64;
        let convergence_threshold = (3.0 * opts.ideal_edge_length()) / 100.0 * simulated;

        Ok(Self {
            rng: XorShift64Star::new(opts.random_seed),
            params: ForceParams::from_options(&opts),
            cooling: Cooling::new(opts.num_iter, opts.quality),
            gm,
            stage: Stage::Created,
            step: Step::A,
            step_iteration: 0,
            step_budget: 0,
            total_iterations: 0,
            convergence_threshold,
            old_total_displacement: 0.0,
            last_total_displacement: 0.0,
            root_connected: true,
            swap_memory: SwapMemory::default(),
            started: None,
            initial_center,
            keep_positions: false,
            diagnostics: Vec::new(),
            opts,
        })
    }

    /// Whether the simulation has finished (converged, budget spent or skipped).
    pub fn is_done(&self) -> bool {
        matches!(self.stage, Stage::Finished | Stage::PostProcessed)
    }

    /// Simulator iterations run so far.
    pub fn iterations(&self) -> usize {
        self.total_iterations
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Current positions of every input node, bounds of every compound parent and the
    /// diagnostics collected so far.
    pub fn snapshot(&self) -> LayoutResult {
        let gm = &self.gm;
        let mut positions: BTreeMap<String, Point> = BTreeMap::new();
        for node in &gm.nodes[..gm.real_count] {
            if let Some(id) = &node.id {
                let (x, y) = node.center();
                positions.insert(id.clone(), Point { x, y });
            }
        }

        let mut parent_bounds: BTreeMap<String, Rect> = BTreeMap::new();
        for parent in &gm.parents {
            let mut b = Bounds::default();
            for node in &gm.nodes[..gm.real_count] {
                if node.parent.as_deref() != Some(parent.as_str()) {
                    continue;
                }
                b.include(&node.frame());
                if let Some(c) = node.cluster {
                    b.include(&gm.nodes[gm.circles[c].parent].frame());
                }
            }
            if !b.is_empty() {
                parent_bounds.insert(
                    parent.clone(),
                    Rect {
                        x: b.min_x,
                        y: b.min_y,
                        width: b.width(),
                        height: b.height(),
                    },
                );
            }
        }

        LayoutResult {
            positions,
            parent_bounds,
            diagnostics: self.diagnostics.clone(),
        }
    }

    fn seed_spectral(&mut self) {
        let real: Vec<usize> = self.gm.simulated_real_nodes().collect();
        let mut local = vec![usize::MAX; self.gm.real_count];
        for (i, &v) in real.iter().enumerate() {
            local[v] = i;
        }
        let mut centers: Vec<(f64, f64)> =
            real.iter().map(|&v| self.gm.nodes[v].center()).collect();
        let sizes: Vec<(f64, f64)> = real
            .iter()
            .map(|&v| (self.gm.nodes[v].width, self.gm.nodes[v].height))
            .collect();
        let edges: Vec<(usize, usize)> = self
            .gm
            .edges
            .iter()
            .map(|e| (local[e.source], local[e.target]))
            .filter(|&(a, b)| a != usize::MAX && b != usize::MAX)
            .collect();

        let params = SpectralParams {
            sampling: self.opts.sampling_type,
            sample_size: self.opts.sample_size,
            node_separation: self.opts.node_separation(),
            ideal_edge_length: self.opts.ideal_edge_length(),
            pi_tol: self.opts.pi_tol(),
        };
        let outcome = spectral::embed(&mut centers, &sizes, &edges, &params, &mut self.rng);
        tracing::debug!(?outcome, nodes = real.len(), "spectral embedding");

        for (&v, &(x, y)) in real.iter().zip(&centers) {
            self.gm.nodes[v].set_center(x, y);
        }
    }

    /// Puts every super-node on the centroid of its members.
    fn seed_super_nodes(&mut self) {
        for c in 0..self.gm.circles.len() {
            let members = &self.gm.circles[c].order;
            if members.is_empty() {
                continue;
            }
            let k = members.len() as f64;
            let (sx, sy) = members.iter().fold((0.0, 0.0), |(sx, sy), &v| {
                let (x, y) = self.gm.nodes[v].center();
                (sx + x, sy + y)
            });
            let parent = self.gm.circles[c].parent;
            self.gm.nodes[parent].set_center(sx / k, sy / k);
        }
    }

    fn budget_for(&self, step: Step) -> usize {
        (self.opts.num_iter as f64 * step.budget_fraction()).floor() as usize
    }

    fn enter_step(&mut self, step: Step) {
        self.step = step;
        self.step_iteration = 0;
        self.old_total_displacement = 0.0;
        self.last_total_displacement = 0.0;
        self.step_budget = self.budget_for(step);
        match step {
            Step::B => {
                for c in 0..self.gm.circles.len() {
                    self.gm.compute_order_matrix(c);
                }
            }
            Step::D => swap::compute_swap_eligibility(&mut self.gm),
            Step::E => {
                forces::compute_ideal_lengths(&mut self.gm, &self.opts, FINAL_EDGE_LENGTH_SCALE)
            }
            Step::A | Step::C | Step::Done => {}
        }
        tracing::debug!(step = ?step, budget = self.step_budget, "simulation step");
    }

    /// Leaves the current step, skipping steps without budget.
    fn advance_step(&mut self) {
        loop {
            let finished = self.step;
            if finished == Step::D && self.opts.allow_nodes_inside_circle {
                let moved = inner::relocate_inner_nodes(
                    &mut self.gm,
                    self.opts.max_ratio_inside(),
                    self.opts.node_separation(),
                );
                tracing::debug!(moved, "inner node relocation");
            }
            if finished == Step::Done {
                self.stage = Stage::Finished;
                return;
            }
            let next = finished.next();
            self.enter_step(next);
            if next == Step::Done {
                self.stage = Stage::Finished;
                tracing::debug!(iterations = self.total_iterations, "simulation finished");
                return;
            }
            if self.step_budget > 0 {
                return;
            }
        }
    }

    fn converged(&mut self) -> bool {
        let last = self.last_total_displacement;
        let oscillating = self.step_iteration > self.step_budget / 3
            && (last - self.old_total_displacement).abs() < 2.0;
        let converged = last < self.convergence_threshold;
        self.old_total_displacement = last;
        // Swap rounds need time to settle before step D may end early.
        let early_exit_allowed =
            self.step != Step::D || self.step_iteration * 4 >= self.step_budget;
        early_exit_allowed && (converged || oscillating)
    }

    fn out_of_time(&self) -> bool {
        match (self.opts.time_budget_ms, self.started) {
            (Some(ms), Some(started)) => started.elapsed() >= Duration::from_millis(ms),
            _ => false,
        }
    }

    fn iterate(&mut self) {
        self.step_iteration += 1;
        self.total_iterations += 1;
        if self.total_iterations.is_multiple_of(CONVERGENCE_CHECK_PERIOD) {
            self.cooling.advance();
        }

        let phase = if self.step == Step::D {
            swap::phase(self.step_iteration)
        } else {
            SwapPhase::Idle
        };
        if phase == SwapPhase::BeginPreparation {
            swap::compute_swap_eligibility(&mut self.gm);
        }

        forces::calc_forces(&mut self.gm, &self.params, self.root_connected);
        let prepare = matches!(phase, SwapPhase::BeginPreparation | SwapPhase::Preparation);
        self.last_total_displacement =
            forces::move_nodes(&mut self.gm, self.cooling.factor, prepare);

        if self.step == Step::B && self.step_iteration.is_multiple_of(reverse::REVERSE_PERIOD) {
            for c in 0..self.gm.circles.len() {
                reverse::try_reverse(&mut self.gm, c);
            }
        }
        if phase == SwapPhase::Perform {
            let swapped = swap::perform_swaps(&mut self.gm, &mut self.swap_memory);
            if swapped > 0 {
                tracing::trace!(swapped, iteration = self.total_iterations, "swap round");
            }
        }

        if self.step_iteration >= self.step_budget
            || (self.step_iteration.is_multiple_of(CONVERGENCE_CHECK_PERIOD) && self.converged())
        {
            self.advance_step();
        }
    }
}

impl Layout for CiseLayout {
    fn prerun(&mut self) {
        if self.stage != Stage::Created {
            return;
        }
        self.started = Some(Instant::now());
        tracing::debug!(
            nodes = self.gm.real_count,
            edges = self.gm.edges.len(),
            clusters = self.gm.circles.len(),
            "cise prerun"
        );

        if self.opts.quality == Quality::Draft && !self.opts.randomize {
            tracing::warn!("draft quality requires randomize; keeping the caller's positions");
            self.diagnostics.push(Diagnostic::DraftWithoutRandomize);
            self.keep_positions = true;
            self.step = Step::Done;
            self.stage = Stage::Finished;
            return;
        }

        if self.opts.randomize {
            self.seed_spectral();
        }
        self.seed_super_nodes();

        let separation = self.opts.node_separation();
        for c in 0..self.gm.circles.len() {
            arrange::arrange_circle(&mut self.gm, c, separation);
        }
        forces::compute_ideal_lengths(&mut self.gm, &self.opts, 1.0);

        let mut placer = ClusterPlacer::new(&self.gm, &self.opts);
        placer.run();
        placer.apply(&mut self.gm);
        tracing::debug!(iterations = placer.iterations(), "clusters placed");
        self.root_connected = self.gm.root_is_connected();

        if self.opts.quality == Quality::Draft {
            self.step = Step::Done;
            self.stage = Stage::Finished;
            return;
        }
        self.stage = Stage::Simulating;
        self.enter_step(Step::A);
        if self.step_budget == 0 {
            self.advance_step();
        }
    }

    fn tick(&mut self) -> bool {
        if self.stage == Stage::Created {
            self.prerun();
        }
        if self.stage != Stage::Simulating {
            return true;
        }
        for _ in 0..self.opts.refresh.max(1) {
            if self.out_of_time() {
                tracing::warn!(
                    iterations = self.total_iterations,
                    "time budget exhausted, stopping the simulation"
                );
                self.diagnostics.push(Diagnostic::TimeBudgetExhausted {
                    iterations: self.total_iterations,
                });
                self.step = Step::Done;
                self.stage = Stage::Finished;
                break;
            }
            self.iterate();
            if self.stage != Stage::Simulating {
                break;
            }
        }
        self.stage != Stage::Simulating
    }

    fn postrun(&mut self) {
        if matches!(self.stage, Stage::Created | Stage::PostProcessed) {
            return;
        }
        self.stage = Stage::PostProcessed;
        if self.keep_positions {
            return;
        }
        if self.opts.pack_components {
            pack::pack_components(&mut self.gm, self.opts.ideal_edge_length());
        }
        if self.opts.tile {
            pack::tile_isolated(
                &mut self.gm,
                self.opts.tiling_padding_horizontal,
                self.opts.tiling_padding_vertical,
            );
        }
        if let Some(center) = self.initial_center {
            pack::relocate(&mut self.gm, center);
        }
    }
}
