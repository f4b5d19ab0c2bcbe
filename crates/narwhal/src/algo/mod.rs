pub mod align;
pub mod cise;
pub mod geometry;
pub(crate) mod pack;
pub(crate) mod rng;
pub(crate) mod spectral;

use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::graph::Node;

/// A layout stage driven by an external loop.
///
/// `prerun` performs the one-off setup, every `tick` advances the stage by a bounded amount of
/// work and reports whether the stage is finished, and `postrun` is called once at the end.
pub trait Layout {
    fn prerun(&mut self);

    fn tick(&mut self) -> bool;

    fn postrun(&mut self) {}

    /// Runs the stage to completion.
    fn run(&mut self) {
        self.prerun();
        while !self.tick() {}
        self.postrun();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Spectral embedding only.
    Draft,
    #[default]
    Default,
    /// Spectral embedding plus a slower cooling schedule.
    Proof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingType {
    Random,
    #[default]
    Greedy,
}

/// Maps a node to a cluster id. Negative or `None` means unclustered.
pub type ClusterClassifier = Arc<dyn Fn(&Node) -> Option<i64> + Send + Sync>;

#[derive(Clone, Default)]
pub enum Clustering {
    #[default]
    None,
    /// Disjoint cells of node ids. Nodes absent from every cell are unclustered.
    Partition(Vec<Vec<String>>),
    Classifier(ClusterClassifier),
}

impl std::fmt::Debug for Clustering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Partition(cells) => f.debug_tuple("Partition").field(cells).finish(),
            Self::Classifier(_) => f.write_str("Classifier(..)"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CiseOptions {
    /// Seed for the run-local RNG (landmark sampling, power-iteration start vectors).
    pub random_seed: u64,
    /// Seed from a spectral embedding (`true`) or from the caller's positions (`false`).
    pub randomize: bool,
    pub quality: Quality,
    /// Gap between neighboring nodes on a circle, also the hop length of the spectral step.
    pub node_separation: f64,
    pub ideal_edge_length: f64,
    pub ideal_inter_cluster_edge_length_coefficient: f64,
    pub node_repulsion: f64,
    pub gravity: f64,
    /// Multiple of the estimated graph size beyond which gravity kicks in.
    pub gravity_range: f64,
    #[serde(rename = "springCoeff")]
    pub spring_coefficient: f64,
    #[serde(alias = "maxIterations")]
    pub num_iter: usize,
    /// Simulator iterations per tick.
    pub refresh: usize,
    pub sampling_type: SamplingType,
    pub sample_size: usize,
    pub pi_tol: f64,
    pub allow_nodes_inside_circle: bool,
    pub max_ratio_of_nodes_inside_circle: f64,
    pub pack_components: bool,
    pub tile: bool,
    pub tiling_padding_vertical: f64,
    pub tiling_padding_horizontal: f64,
    /// Rendering hint for the host; never changes the solved positions.
    pub animate: bool,
    /// Rendering hint for the host, in milliseconds.
    pub animation_duration: u64,
    /// Optional wall-clock budget for the simulation, in milliseconds.
    pub time_budget_ms: Option<u64>,
    #[serde(skip)]
    pub clusters: Clustering,
}

impl Default for CiseOptions {
    fn default() -> Self {
        Self {
            random_seed: 0,
            randomize: true,
            quality: Quality::Default,
            node_separation: 12.5,
            ideal_edge_length: 50.0,
            ideal_inter_cluster_edge_length_coefficient: 1.4,
            node_repulsion: 4500.0,
            gravity: 0.25,
            gravity_range: 3.8,
            spring_coefficient: 0.45,
            num_iter: 2500,
            refresh: 10,
            sampling_type: SamplingType::Greedy,
            sample_size: 25,
            pi_tol: 1e-7,
            allow_nodes_inside_circle: false,
            max_ratio_of_nodes_inside_circle: 0.1,
            pack_components: true,
            tile: true,
            tiling_padding_vertical: 10.0,
            tiling_padding_horizontal: 10.0,
            animate: false,
            animation_duration: 500,
            time_budget_ms: None,
            clusters: Clustering::None,
        }
    }
}

impl CiseOptions {
    /// Parses a camelCase option object. A `clusters` member, if present, must be an array of
    /// arrays of node ids and becomes a [`Clustering::Partition`].
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let mut opts: CiseOptions = serde_json::from_value(value.clone())?;
        if let Some(clusters) = value.get("clusters") {
            let cells: Vec<Vec<String>> = serde_json::from_value(clusters.clone())?;
            opts.clusters = Clustering::Partition(cells);
        }
        if opts.refresh == 0 {
            return Err(Error::InvalidOptions {
                message: "refresh must be at least 1".to_string(),
            });
        }
        Ok(opts)
    }

    pub fn with_clusters(mut self, cells: Vec<Vec<String>>) -> Self {
        self.clusters = Clustering::Partition(cells);
        self
    }

    pub fn with_classifier<F>(mut self, classify: F) -> Self
    where
        F: Fn(&Node) -> Option<i64> + Send + Sync + 'static,
    {
        self.clusters = Clustering::Classifier(Arc::new(classify));
        self
    }

    pub(crate) fn ideal_edge_length(&self) -> f64 {
        positive_or(self.ideal_edge_length, 50.0)
    }

    pub(crate) fn inter_cluster_coefficient(&self) -> f64 {
        positive_or(self.ideal_inter_cluster_edge_length_coefficient, 1.4)
    }

    pub(crate) fn node_separation(&self) -> f64 {
        positive_or(self.node_separation, 12.5)
    }

    pub(crate) fn node_repulsion(&self) -> f64 {
        positive_or(self.node_repulsion, 4500.0)
    }

    pub(crate) fn spring_coefficient(&self) -> f64 {
        positive_or(self.spring_coefficient, 0.45)
    }

    pub(crate) fn gravity(&self) -> f64 {
        if self.gravity.is_finite() && self.gravity >= 0.0 {
            self.gravity
        } else {
            0.25
        }
    }

    pub(crate) fn gravity_range(&self) -> f64 {
        positive_or(self.gravity_range, 3.8)
    }

    pub(crate) fn pi_tol(&self) -> f64 {
        positive_or(self.pi_tol, 1e-7)
    }

    pub(crate) fn max_ratio_inside(&self) -> f64 {
        if self.max_ratio_of_nodes_inside_circle.is_finite() {
            self.max_ratio_of_nodes_inside_circle.clamp(0.0, 1.0)
        } else {
            0.1
        }
    }
}

fn positive_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { fallback }
}
