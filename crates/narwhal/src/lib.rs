#![forbid(unsafe_code)]

//! Headless circular spring embedder (CiSE) for clustered graphs.
//!
//! Every cluster is drawn on its own circle. The run seeds coordinates with a landmark-based
//! spectral embedding, orders each circle to keep its chords apart, spreads the clusters with a
//! CoSE-style force-directed pass, and then refines everything with a constrained spring
//! simulation that rotates, translates, swaps and reverses circles.
//!
//! Use [`layout`] for a run to completion, or drive a [`CiseLayout`] tick by tick to render
//! intermediate states.

pub mod algo;
pub mod error;
pub mod graph;

pub use algo::cise::CiseLayout;
pub use algo::{CiseOptions, Clustering, Layout, Quality, SamplingType};
pub use error::{Error, Result};
pub use graph::{Diagnostic, Edge, Graph, LayoutResult, Node, Point, Rect};

/// Headless layout entry point.
pub fn layout(graph: &Graph, opts: &CiseOptions) -> Result<LayoutResult> {
    layout_with_progress(graph, opts, |_| {})
}

/// Like [`layout`], but hands the partial positions to `progress` after every tick.
pub fn layout_with_progress<F>(
    graph: &Graph,
    opts: &CiseOptions,
    mut progress: F,
) -> Result<LayoutResult>
where
    F: FnMut(&LayoutResult),
{
    let mut cise = CiseLayout::new(graph, opts.clone())?;
    cise.prerun();
    loop {
        let done = cise.tick();
        progress(&cise.snapshot());
        if done {
            break;
        }
    }
    cise.postrun();
    Ok(cise.snapshot())
}
