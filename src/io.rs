use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use needletail::parse_fastx_file;
use phylotree::tree::Tree;
use std::collections::HashMap;

use crate::equal_angle::EqualAngleResult;
use crate::error::{Result, SplitNetError};
use crate::median_joining::MedianJoiningNetwork;
use crate::split::Split;

fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

/// Reads a whole text file, gunzipping it if the name ends with `.gz`.
fn read_text(path: &Path) -> Result<String> {
    if is_gz(path) {
        let mut text = String::new();
        GzDecoder::new(File::open(path)?).read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

/// Output sink behind every TSV writer. Call `finish` to complete the stream:
/// the gzip trailer is only written there.
enum Output {
    Plain(BufWriter<Box<dyn Write>>),
    Gzip(BufWriter<GzEncoder<File>>),
}

impl Output {
    /// Opens `path` for writing; `.gz` gets gzip compression, `-` is stdout.
    fn create(path: &Path) -> Result<Self> {
        if path.as_os_str() == "-" {
            return Ok(Output::Plain(BufWriter::new(Box::new(io::stdout().lock()))));
        }
        let f = File::create(path)?;
        Ok(if is_gz(path) {
            Output::Gzip(BufWriter::new(GzEncoder::new(f, Compression::default())))
        } else {
            Output::Plain(BufWriter::new(Box::new(f)))
        })
    }

    /// Flushes buffered data and, for gzip, writes the trailer.
    fn finish(self) -> Result<()> {
        match self {
            Output::Plain(mut w) => w.flush()?,
            Output::Gzip(w) => {
                let encoder = w.into_inner().map_err(io::IntoInnerError::into_error)?;
                encoder.finish()?;
            }
        }
        Ok(())
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Plain(w) => w.write(buf),
            Output::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Plain(w) => w.flush(),
            Output::Gzip(w) => w.flush(),
        }
    }
}

/// Reads aligned sequences from a FASTA file (plain or gzipped).
///
/// Returns the record names (the id up to the first whitespace) and the
/// sequences with line breaks removed.
pub fn read_fasta<P: AsRef<Path>>(path: P) -> Result<(Vec<String>, Vec<Vec<u8>>)> {
    let path = path.as_ref();
    let mut reader = parse_fastx_file(path).map_err(|e| SplitNetError::Parse(e.to_string()))?;

    let mut names = Vec::new();
    let mut rows = Vec::new();
    while let Some(record) = reader.next() {
        let record = record.map_err(|e| SplitNetError::Parse(e.to_string()))?;
        let id = String::from_utf8_lossy(record.id());
        names.push(id.split_whitespace().next().unwrap_or_default().to_string());
        rows.push(record.seq().iter().copied().filter(|b| !b.is_ascii_whitespace()).collect());
    }
    if names.is_empty() {
        return Err(SplitNetError::Parse(format!("no FASTA records in {}", path.display())));
    }
    Ok((names, rows))
}

/// Removes bracketed comments such as BEAST's `[&rate=0.123]`.
///
/// Branch lengths following an annotation are kept: `:[&rate=X]2.45` becomes `:2.45`.
fn strip_comments(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut depth = 0usize;
    for ch in newick.chars() {
        match ch {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => result.push(ch),
            _ => {}
        }
    }
    result
}

/// Reads named trees from a NEXUS file (`TREE name = ...;` lines with an
/// optional `TRANSLATE` block) or from plain Newick (one or more `;`-terminated
/// trees, named `tree1`, `tree2`, ...).
pub fn read_trees<P: AsRef<Path>>(path: P) -> Result<Vec<(String, Tree)>> {
    parse_trees(&read_text(path.as_ref())?)
}

fn parse_trees(content: &str) -> Result<Vec<(String, Tree)>> {
    let is_nexus = content.trim_start().to_ascii_uppercase().starts_with("#NEXUS");
    let named: Vec<(String, String)> = if is_nexus {
        collect_tree_blocks(content)
    } else {
        strip_comments(content)
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .enumerate()
            .map(|(idx, t)| (format!("tree{}", idx + 1), format!("{t};")))
            .collect()
    };
    let translate = if is_nexus { parse_translate_block(content) } else { HashMap::new() };

    let mut trees = Vec::with_capacity(named.len());
    for (name, newick) in named {
        let mut tree = Tree::from_newick(&newick)
            .map_err(|e| SplitNetError::Parse(format!("tree '{name}': {e}")))?;
        if !translate.is_empty() {
            rename_leaf_nodes(&mut tree, &translate);
        }
        trees.push((name, tree));
    }
    if trees.is_empty() {
        return Err(SplitNetError::Parse("no trees found".into()));
    }
    log::debug!("read {} tree(s)", trees.len());
    Ok(trees)
}

fn collect_tree_blocks(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| line.to_ascii_uppercase().starts_with("TREE "))
        .filter_map(|line| {
            // comments first: BEAST headers look like `tree STATE_0 [&lnP=-1.5] = ...`
            let line = strip_comments(line);
            let (header, body) = line.split_once('=')?;
            let name = header[5..].trim().trim_start_matches('*').trim().to_string();
            Some((name, body.trim().to_string()))
        })
        .collect()
}

fn parse_translate_block(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1)
        .take_while(|line| !line.trim().starts_with(';'))
        // 1 '1959.M.CD.59.ZR59',
        .filter_map(|line| {
            let line = line.trim().trim_end_matches([',', ';']);
            let mut parts = line.split_whitespace();
            let id = parts.next()?.to_string();
            let label = parts.next()?.trim_matches('\'').to_string();
            Some((id, label))
        })
        .collect()
}

fn rename_leaf_nodes(tree: &mut Tree, translate: &HashMap<String, String>) {
    for leaf_id in tree.get_leaves() {
        if let Ok(node) = tree.get_mut(&leaf_id) {
            if let Some(label) = node.name.as_ref().and_then(|n| translate.get(n)) {
                node.name = Some(label.clone());
            }
        }
    }
}

/// Writes a labeled square matrix as TSV.
/// If `path` ends with `.gz`, the output is gzip-compressed; `-` is stdout.
pub fn write_matrix_tsv<P: AsRef<Path>, T: std::fmt::Display>(
    path: P,
    names: &[String],
    mat: &[Vec<T>],
) -> Result<()> {
    let mut out = Output::create(path.as_ref())?;

    // Header row
    write!(out, "\t")?;
    for (k, name) in names.iter().enumerate() {
        if k > 0 {
            write!(out, "\t")?;
        }
        write!(out, "{name}")?;
    }
    writeln!(out)?;

    for (name, row) in names.iter().zip(mat) {
        write!(out, "{name}")?;
        for val in row {
            write!(out, "\t{val}")?;
        }
        writeln!(out)?;
    }
    out.finish()
}

fn taxon_labels(taxa: &[usize], names: &[String]) -> String {
    let labels: Vec<&str> = taxa
        .iter()
        .map(|&t| names.get(t - 1).map_or("?", String::as_str))
        .collect();
    labels.join(",")
}

/// Writes an equal-angle layout as two TSV tables in one stream:
/// `node id x y taxa` rows followed by `edge id source target split weight angle` rows.
pub fn write_layout_tsv<P: AsRef<Path>>(path: P, layout: &EqualAngleResult, names: &[String]) -> Result<()> {
    let mut out = Output::create(path.as_ref())?;
    let net = &layout.network;
    writeln!(out, "#node\tid\tx\ty\ttaxa")?;
    for v in net.node_ids() {
        let p = layout.point(v);
        writeln!(
            out,
            "node\t{}\t{:.6}\t{:.6}\t{}",
            v.0,
            p.x,
            p.y,
            taxon_labels(&net.node(v).taxa, names)
        )?;
    }
    writeln!(out, "#edge\tid\tsource\ttarget\tsplit\tweight\tangle")?;
    for e in net.edge_ids() {
        let (s, t) = net.endpoints(e);
        let data = net.edge(e);
        let split = data.split_id().map_or_else(|| "-".to_string(), |id| (id + 1).to_string());
        writeln!(
            out,
            "edge\t{}\t{}\t{}\t{split}\t{}\t{:.3}",
            e.0, s.0, t.0, data.weight, data.angle
        )?;
    }
    out.finish()
}

/// Writes a median-joining network as `node` and `edge` TSV rows.
pub fn write_network_tsv<P: AsRef<Path>>(path: P, network: &MedianJoiningNetwork, names: &[String]) -> Result<()> {
    let mut out = Output::create(path.as_ref())?;
    writeln!(out, "#node\tid\tsequence\ttaxa")?;
    for v in network.node_ids() {
        let h = network.node(v);
        let taxa = if h.is_median() { "-".to_string() } else { taxon_labels(&h.taxa, names) };
        writeln!(out, "node\t{}\t{}\t{taxa}", v.0, String::from_utf8_lossy(&h.sequence))?;
    }
    writeln!(out, "#edge\tid\tsource\ttarget\tweight")?;
    for e in network.edge_ids() {
        let (s, t) = network.endpoints(e);
        writeln!(out, "edge\t{}\t{}\t{}\t{}", e.0, s.0, t.0, network.edge(e))?;
    }
    out.finish()
}

/// Writes splits as `weight side` rows, the side listed by taxon label.
pub fn write_splits_tsv<P: AsRef<Path>>(path: P, splits: &[Split], names: &[String]) -> Result<()> {
    let mut out = Output::create(path.as_ref())?;
    writeln!(out, "weight\tside")?;
    for split in splits {
        let side: Vec<usize> = split.part().iter().collect();
        writeln!(out, "{:.6}\t{}", split.weight(), taxon_labels(&side, names))?;
    }
    out.finish()
}
