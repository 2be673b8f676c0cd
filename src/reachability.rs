//! The k-paths reachability explorer (§4.7, §9): a BFS-with-memoization
//! traversal over a directed graph of non-terminal names, producing every
//! length-`k` expansion path. Orthogonal to the mutation core; reimplemented
//! as an explicit worklist BFS rather than the original's recursive
//! `std::list` splicing.

use std::collections::HashMap;

/// Returns every path of exactly `k` non-terminals reachable by following
/// edges in `graph`, starting from each node that appears as a key.
/// A node with no outgoing edges terminates any path that reaches it early
/// (it contributes no further extensions), matching the original's
/// behavior of silently stopping at leaves rather than erroring.
pub fn k_paths(graph: &HashMap<String, Vec<String>>, k: usize) -> Vec<Vec<String>> {
    if k == 0 {
        return Vec::new();
    }

    let mut frontier: Vec<Vec<String>> = graph.keys().map(|n| vec![n.clone()]).collect();
    frontier.sort();
    frontier.dedup();

    let mut complete = Vec::new();
    let mut seen: std::collections::HashSet<Vec<String>> = std::collections::HashSet::new();

    while let Some(path) = frontier.pop() {
        if path.len() == k {
            if seen.insert(path.clone()) {
                complete.push(path);
            }
            continue;
        }
        let last = path.last().expect("path is never empty");
        match graph.get(last) {
            Some(neighbors) if !neighbors.is_empty() => {
                for next in neighbors {
                    let mut extended = path.clone();
                    extended.push(next.clone());
                    frontier.push(extended);
                }
            }
            _ => {
                // Leaf reached before length k: matches the original's
                // silent termination, the path is simply dropped.
            }
        }
    }

    complete.sort();
    complete
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> HashMap<String, Vec<String>> {
        let mut g = HashMap::new();
        g.insert("A".to_string(), vec!["B".to_string(), "C".to_string()]);
        g.insert("B".to_string(), vec!["C".to_string()]);
        g.insert("C".to_string(), vec![]);
        g
    }

    #[test]
    fn k_one_is_every_node_alone() {
        let paths = k_paths(&graph(), 1);
        assert_eq!(paths, vec![vec!["A"], vec!["B"], vec!["C"]]);
    }

    #[test]
    fn k_two_follows_edges() {
        let paths = k_paths(&graph(), 2);
        assert_eq!(paths, vec![vec!["A", "B"], vec!["A", "C"], vec!["B", "C"]]);
    }

    #[test]
    fn k_longer_than_any_path_yields_nothing() {
        let paths = k_paths(&graph(), 5);
        assert!(paths.is_empty());
    }

    #[test]
    fn zero_length_is_empty() {
        assert!(k_paths(&graph(), 0).is_empty());
    }
}
