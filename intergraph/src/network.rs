//! Reading an interaction network from a delimited file, and
//! building the directed, weighted graph it describes.

use csv::{ReaderBuilder, StringRecord};
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Graph;
use serde_derive::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

/// Error type for reading in a DSV.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Problem reading from path {path}: {source}")]
    FromPath { path: String, source: csv::Error },
    #[error("Problem with record on line {line}: {source}")]
    Record { line: u64, source: csv::Error },
}

/// One interaction, taken positionally from the first three
/// columns of a row. Column names in the header don't matter.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Row {
    /// The actor species (column 0).
    pub from: String,
    /// The recipient species (column 1).
    pub to: String,
    /// Interaction strength (column 2). Can be negative.
    pub weight: f64,
}

/// Species is a String
pub type Species = String;
/// Interaction weights are f64.
pub type Weight = f64;

/// A directed, weighted interaction network.
///
/// Nodes are species names, in the order they were first seen
/// in the input. There is at most one edge per ordered pair.
#[derive(Debug, Clone)]
pub struct InteractionGraph(pub Graph<Species, Weight>);

/// Counts describing an `InteractionGraph`.
#[derive(Debug, PartialEq, Eq)]
pub struct NetworkStats {
    pub no_nodes: usize,
    pub no_edges: usize,
    pub no_self_loops: usize,
}

/// Read the interaction records of a DSV.
///
/// Only the first three columns are used: from, to and weight.
/// Rows may carry extra columns, which are ignored. If
/// `has_headers` is true, the first row is skipped whatever it contains.
#[instrument(skip(input), fields(path = %input.as_ref().display()))]
pub fn read_rows<P: AsRef<Path>>(
    input: P,
    delimiter: u8,
    has_headers: bool,
) -> Result<Vec<Row>, ReadError> {
    let input = input.as_ref();
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_headers)
        .flexible(true)
        .from_path(input)
        .map_err(|source| ReadError::FromPath {
            path: input.display().to_string(),
            source,
        })?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|source| ReadError::Record {
            line: source.position().map_or(0, |p| p.line()),
            source,
        })?;
        let line = record.position().map_or(0, |p| p.line());
        // trim to the three positional columns, then deserialize
        // without headers so fields are matched by position.
        let trimmed: StringRecord = record.iter().take(3).collect();
        let row: Row = trimmed
            .deserialize(None)
            .map_err(|source| ReadError::Record { line, source })?;
        rows.push(row);
    }

    debug!(rows = rows.len(), "read interaction records");
    Ok(rows)
}

impl InteractionGraph {
    /// Read a DSV and build the graph in one go.
    pub fn from_dsv<P: AsRef<Path>>(
        input: P,
        delimiter: u8,
        has_headers: bool,
    ) -> Result<Self, ReadError> {
        let rows = read_rows(input, delimiter, has_headers)?;
        Ok(Self::from_rows(rows))
    }

    /// Build a graph from interaction records.
    ///
    /// Nodes are added as their names first appear (from before to,
    /// within a row). A repeated (from, to) pair overwrites the
    /// weight of the existing edge, so the last row wins.
    #[instrument(skip_all, fields(rows = rows.len()))]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut graph: Graph<Species, Weight> = Graph::new();
        let mut node_index_map: HashMap<String, NodeIndex> = HashMap::new();

        let mut overwritten = 0usize;
        for Row { from, to, weight } in rows {
            let from_ix = intern(&mut graph, &mut node_index_map, from);
            let to_ix = intern(&mut graph, &mut node_index_map, to);

            if graph.find_edge(from_ix, to_ix).is_some() {
                overwritten += 1;
            }
            graph.update_edge(from_ix, to_ix, weight);
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            overwritten,
            "built interaction graph"
        );
        InteractionGraph(graph)
    }

    /// Node names, in node index order.
    pub fn node_names(&self) -> Vec<Species> {
        self.0.node_weights().cloned().collect()
    }

    /// Look up a node by its species name.
    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.0.node_indices().find(|ix| self.0[*ix] == name)
    }

    /// The weight of the edge `from -> to`, if there is one.
    pub fn edge_weight(&self, from: &str, to: &str) -> Option<Weight> {
        let a = self.node_index(from)?;
        let b = self.node_index(to)?;
        let e: EdgeIndex = self.0.find_edge(a, b)?;
        self.0.edge_weight(e).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.node_count() == 0
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            no_nodes: self.0.node_count(),
            no_edges: self.0.edge_count(),
            no_self_loops: self
                .0
                .edge_references()
                .filter(|e| e.source() == e.target())
                .count(),
        }
    }
}

/// Get the index for `name`, adding a node if it's new.
fn intern(
    graph: &mut Graph<Species, Weight>,
    map: &mut HashMap<String, NodeIndex>,
    name: String,
) -> NodeIndex {
    if let Some(ix) = map.get(&name) {
        return *ix;
    }
    let ix = graph.add_node(name.clone());
    map.insert(name, ix);
    ix
}
