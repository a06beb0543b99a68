//! Index-based directed graph with strongly connected components.

/// Directed graph over nodes `0..n`.
#[derive(Debug, Clone, Default)]
pub struct Digraph {
    adjacency: Vec<Vec<usize>>,
}

impl Digraph {
    /// Create a graph with `n` nodes and no edges.
    pub fn new(n: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); n],
        }
    }

    /// Add an edge `from -> to`.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.adjacency[from].push(to);
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Direct successors of a node.
    pub fn successors(&self, node: usize) -> &[usize] {
        &self.adjacency[node]
    }

    /// Whether the node has an edge to itself.
    pub fn has_self_loop(&self, node: usize) -> bool {
        self.adjacency[node].contains(&node)
    }

    /// Whether a component contains a cycle (more than one member, or a self-loop).
    pub fn is_cyclic(&self, component: &[usize]) -> bool {
        component.len() > 1 || component.first().is_some_and(|n| self.has_self_loop(*n))
    }

    /// Strongly connected components (Tarjan, iterative).
    ///
    /// Members of each component are sorted ascending and components are
    /// ordered by their smallest member.
    pub fn strongly_connected_components(&self) -> Vec<Vec<usize>> {
        let n = self.adjacency.len();
        let mut next_index = 0usize;
        let mut index: Vec<Option<usize>> = vec![None; n];
        let mut lowlink = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut components: Vec<Vec<usize>> = Vec::new();

        for root in 0..n {
            if index[root].is_some() {
                continue;
            }

            // (node, position of the next successor to visit)
            let mut call_stack: Vec<(usize, usize)> = vec![(root, 0)];
            index[root] = Some(next_index);
            lowlink[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;

            while let Some(&(v, child)) = call_stack.last() {
                if let Some(&w) = self.adjacency[v].get(child) {
                    if let Some(top) = call_stack.last_mut() {
                        top.1 += 1;
                    }
                    match index[w] {
                        None => {
                            index[w] = Some(next_index);
                            lowlink[w] = next_index;
                            next_index += 1;
                            stack.push(w);
                            on_stack[w] = true;
                            call_stack.push((w, 0));
                        }
                        Some(w_index) if on_stack[w] => {
                            lowlink[v] = lowlink[v].min(w_index);
                        }
                        Some(_) => {}
                    }
                    continue;
                }

                call_stack.pop();
                if let Some(&(parent, _)) = call_stack.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if Some(lowlink[v]) == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    component.sort_unstable();
                    components.push(component);
                }
            }
        }

        components.sort_by_key(|c| c[0]);
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acyclic_graph_has_singleton_components() {
        let mut g = Digraph::new(3);
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        let sccs = g.strongly_connected_components();
        assert_eq!(sccs, vec![vec![0], vec![1], vec![2]]);
        assert!(sccs.iter().all(|c| !g.is_cyclic(c)));
    }

    #[test]
    fn test_cycles_and_self_loops() {
        let mut g = Digraph::new(6);
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        g.add_edge(2, 0);
        g.add_edge(2, 3);
        g.add_edge(4, 4);
        g.add_edge(5, 3);
        let sccs = g.strongly_connected_components();
        assert_eq!(sccs, vec![vec![0, 1, 2], vec![3], vec![4], vec![5]]);
        assert!(g.is_cyclic(&sccs[0]));
        assert!(!g.is_cyclic(&sccs[1]));
        assert!(g.is_cyclic(&sccs[2]));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let n = 100_000;
        let mut g = Digraph::new(n);
        for i in 0..n - 1 {
            g.add_edge(i, i + 1);
        }
        g.add_edge(n - 1, 0);
        let sccs = g.strongly_connected_components();
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].len(), n);
    }
}
