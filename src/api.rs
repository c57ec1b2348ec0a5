//! Python binding layer.
//!
//! Exposes the circular split operators, the equal-angle layout of a Newick
//! tree, median-joining networks and pairwise ML distances.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::alphabet::Alphabet;
use crate::circular;
use crate::compare::CompareOptions;
use crate::distance::ml_distance_matrix;
use crate::equal_angle::EqualAngle;
use crate::error::SplitNetError;
use crate::median_joining::MedianJoining;
use crate::model::ReversibleModel;
use crate::progress::NoProgress;
use crate::snapshot::TreeSnapshot;

fn to_py_err(e: SplitNetError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn check_pair_vector(n: usize, v: &[f64]) -> PyResult<()> {
    if n < 2 || v.len() != circular::npairs(n) {
        return Err(PyValueError::new_err(format!(
            "expected {} pair values for n = {n}, got {}",
            circular::npairs(n),
            v.len()
        )));
    }
    Ok(())
}

/// Recover split weights from circular distances.
///
/// Args:
///     n: Number of taxa (at least 2)
///     y: Distances in lexicographic pair order along the circular ordering
///
/// Returns:
///     Split weights, same layout (pair (k, l) is the split {k, ..., l-1})
#[pyfunction]
fn circular_solve(n: usize, y: Vec<f64>) -> PyResult<Vec<f64>> {
    check_pair_vector(n, &y)?;
    Ok(circular::solve(n, &y))
}

/// Distances induced by circular split weights (inverse of `circular_solve`).
#[pyfunction]
fn circular_forward_map(n: usize, x: Vec<f64>) -> PyResult<Vec<f64>> {
    check_pair_vector(n, &x)?;
    Ok(circular::forward_map(n, &x))
}

type PyNode = (f64, f64, Vec<String>);
type PyEdge = (usize, usize, Option<usize>, f64, f64);

/// Equal-angle layout of the split network of a Newick tree.
///
/// Returns:
///     A tuple (nodes, edges): nodes are (x, y, taxon labels), edges are
///     (source, target, split index, weight, angle in degrees)
///
/// Raises:
///     ValueError: If the tree cannot be parsed or laid out
#[pyfunction]
#[pyo3(signature = (newick, use_weights=true))]
fn equal_angle_layout_newick(newick: &str, use_weights: bool) -> PyResult<(Vec<PyNode>, Vec<PyEdge>)> {
    let snapshot = TreeSnapshot::from_newick(newick).map_err(to_py_err)?;
    let layout = EqualAngle::new(use_weights)
        .apply(&snapshot.splits, &NoProgress)
        .map_err(to_py_err)?;
    let net = &layout.network;
    let nodes = net
        .node_ids()
        .map(|v| {
            let p = layout.point(v);
            let labels = net.node(v).taxa.iter().map(|&t| snapshot.names[t - 1].clone()).collect();
            (p.x, p.y, labels)
        })
        .collect();
    let edges = net
        .edge_ids()
        .map(|e| {
            let (s, t) = net.endpoints(e);
            let data = net.edge(e);
            (s.0, t.0, data.split_id(), data.weight, data.angle)
        })
        .collect();
    Ok((nodes, edges))
}

/// Median-joining network of aligned sequences.
///
/// Returns:
///     A tuple (nodes, edges): nodes are (sequence, 0-based input indices,
///     empty for medians), edges are (source, target, distance)
#[pyfunction]
#[pyo3(signature = (sequences, weights=None, epsilon=0.0))]
fn median_joining(
    sequences: Vec<String>,
    weights: Option<Vec<f64>>,
    epsilon: f64,
) -> PyResult<(Vec<(String, Vec<usize>)>, Vec<(usize, usize, f64)>)> {
    let rows: Vec<Vec<u8>> = sequences.into_iter().map(String::into_bytes).collect();
    let network = MedianJoining::new(epsilon)
        .apply(&rows, weights.as_deref(), &NoProgress)
        .map_err(to_py_err)?;
    let nodes = network
        .node_ids()
        .map(|v| {
            let h = network.node(v);
            let seq = String::from_utf8_lossy(&h.sequence).into_owned();
            (seq, h.taxa.iter().map(|&t| t - 1).collect())
        })
        .collect();
    let edges = network
        .edge_ids()
        .map(|e| {
            let (s, t) = network.endpoints(e);
            (s.0, t.0, *network.edge(e))
        })
        .collect();
    Ok((nodes, edges))
}

/// Pairwise maximum-likelihood distances between DNA sequences.
///
/// Args:
///     sequences: Aligned sequences of equal length
///     model: "jc69" or "k2p" (default: "jc69")
///     kappa: Transition/transversion ratio for K2P (default: 2.0)
///
/// Returns:
///     A symmetric distance matrix; saturated pairs get twice the largest
///     finite distance
#[pyfunction]
#[pyo3(signature = (sequences, model="jc69", kappa=2.0))]
fn pairwise_ml_distances(sequences: Vec<String>, model: &str, kappa: f64) -> PyResult<Vec<Vec<f64>>> {
    let model = match model.to_ascii_lowercase().as_str() {
        "jc69" => ReversibleModel::jc69(),
        "k2p" => ReversibleModel::k2p(kappa).map_err(to_py_err)?,
        other => return Err(PyValueError::new_err(format!("unknown model '{other}'"))),
    };
    let rows: Vec<Vec<u8>> = sequences.into_iter().map(String::into_bytes).collect();
    let matrix = ml_distance_matrix(&Alphabet::dna(), &rows, &model, &CompareOptions::new(), &NoProgress)
        .map_err(to_py_err)?;
    Ok(matrix.to_rows())
}

/// Python module definition
#[pymodule]
fn splitnet(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(circular_solve, m)?)?;
    m.add_function(wrap_pyfunction!(circular_forward_map, m)?)?;
    m.add_function(wrap_pyfunction!(equal_angle_layout_newick, m)?)?;
    m.add_function(wrap_pyfunction!(median_joining, m)?)?;
    m.add_function(wrap_pyfunction!(pairwise_ml_distances, m)?)?;
    Ok(())
}
