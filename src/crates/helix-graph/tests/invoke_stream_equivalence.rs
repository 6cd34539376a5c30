//! invoke and stream share one step machine: same graph, same input, same
//! final state, whatever path the routers take.

use futures::StreamExt;
use helix_graph::{CompiledGraph, GraphError, StateGraph, END};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Walk {
    hops: Vec<u8>,
    budget: u32,
    path: Vec<String>,
}

/// A ring of `size` nodes; each node spends one unit of budget and routes
/// to the node named by the next hop, or to END once hops or budget run out.
fn ring(size: u8) -> CompiledGraph<Walk> {
    let mut graph = StateGraph::new();
    for idx in 0..size {
        let name = format!("n{idx}");
        let own = name.clone();
        graph.add_node(name.clone(), move |mut walk: Walk| {
            let own = own.clone();
            async move {
                walk.path.push(own);
                walk.budget = walk.budget.saturating_sub(1);
                Ok::<_, GraphError>(walk)
            }
        });

        let branches: Vec<(String, String)> = (0..size)
            .map(|t| (format!("n{t}"), format!("n{t}")))
            .chain(std::iter::once(("end".to_string(), END.to_string())))
            .collect();
        graph.add_conditional_edge(
            name,
            move |walk: &Walk| {
                let taken = walk.path.len();
                match walk.hops.get(taken) {
                    Some(hop) if walk.budget > 0 => format!("n{}", hop % size),
                    _ => "end".to_string(),
                }
            },
            branches,
        );
    }
    graph.set_entry("n0");
    graph.compile().unwrap()
}

async fn run_both(compiled: &CompiledGraph<Walk>, input: Walk) -> (Walk, Walk, usize) {
    let invoked = compiled.invoke(input.clone()).await.unwrap();

    let events: Vec<_> = compiled
        .stream(input)
        .map(|e| e.unwrap())
        .collect()
        .await;
    let streamed = events.last().unwrap().state.clone();
    (invoked, streamed, events.len())
}

#[tokio::test]
async fn test_fixed_walk() {
    let compiled = ring(3);
    let input = Walk {
        hops: vec![2, 1, 2],
        budget: 10,
        path: Vec::new(),
    };

    let (invoked, streamed, steps) = run_both(&compiled, input).await;
    assert_eq!(invoked, streamed);
    assert_eq!(invoked.path, vec!["n0", "n1", "n2"]);
    assert_eq!(steps, 3);
}

proptest! {
    #[test]
    fn prop_invoke_matches_stream(
        size in 1u8..6,
        hops in proptest::collection::vec(any::<u8>(), 0..20),
        budget in 1u32..30,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let compiled = ring(size).with_max_steps(64);
        let input = Walk { hops, budget, path: Vec::new() };

        let (invoked, streamed, steps) = rt.block_on(run_both(&compiled, input));
        prop_assert_eq!(&invoked, &streamed);
        prop_assert_eq!(invoked.path.len(), steps);
        prop_assert!(steps as u32 <= budget.max(1));
    }
}
