//! The render graph: node arena, connection set and ordered traversal

use std::collections::{BTreeMap, BTreeSet};

use smallvec::SmallVec;

use crate::context::AudioParamId;
use crate::node::{ChannelConfig, ChannelCountMode};
use crate::render::bus::{Alloc, AudioBus};
use crate::render::processor::{AudioParamValues, AudioProcessor, RenderScope};

/// Hidden input port connecting a param processor to its owning node
///
/// The edge forces the param to render before its owner but carries no
/// signal into the owner's summing junctions.
pub(crate) const PARAM_INPUT: usize = usize::MAX;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub(crate) struct NodeIndex(pub u64);

impl From<&AudioParamId> for NodeIndex {
    fn from(id: &AudioParamId) -> Self {
        NodeIndex(id.0)
    }
}

/// A node of the render graph: the processor plus its preallocated buses
pub(crate) struct Node {
    processor: Box<dyn AudioProcessor>,
    /// summing junction scratch, one bus per input port
    inputs: Vec<AudioBus>,
    /// rendered output, one bus per output port
    outputs: Vec<AudioBus>,
    channel_config: ChannelConfig,
    /// control handle dropped, reclaim when the processor reports exhaustion
    free_when_finished: bool,
}

impl Node {
    fn process(&mut self, params: AudioParamValues<'_>, scope: &RenderScope) -> bool {
        self.processor
            .process(&self.inputs[..], &mut self.outputs[..], params, scope)
    }

    pub fn get_buffer(&self) -> &AudioBus {
        &self.outputs[0]
    }
}

/// Connection from `(node, output port)` to `(node, input port)`
type Edge = ((NodeIndex, usize), (NodeIndex, usize));

pub(crate) struct Graph {
    nodes: BTreeMap<NodeIndex, Node>,
    edges: BTreeSet<Edge>,

    // ordering scratch, reused between re-orders
    ordered: Vec<NodeIndex>,
    marked: Vec<NodeIndex>,

    alloc: Alloc,
}

impl Graph {
    pub fn new(alloc: Alloc) -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: BTreeSet::new(),
            ordered: vec![],
            marked: vec![],
            alloc,
        }
    }

    pub fn add_node(
        &mut self,
        index: NodeIndex,
        processor: Box<dyn AudioProcessor>,
        inputs: usize,
        outputs: usize,
        channel_config: ChannelConfig,
    ) {
        let inputs = (0..inputs)
            .map(|_| AudioBus::new(self.alloc.silence()))
            .collect();
        let outputs = (0..outputs)
            .map(|_| AudioBus::new(self.alloc.silence()))
            .collect();

        self.nodes.insert(
            index,
            Node {
                processor,
                inputs,
                outputs,
                channel_config,
                free_when_finished: false,
            },
        );

        self.order_nodes();
    }

    pub fn add_edge(&mut self, source: (NodeIndex, usize), dest: (NodeIndex, usize)) {
        self.edges.insert((source, dest));
        self.order_nodes();
    }

    pub fn remove_edge(&mut self, source: NodeIndex, dest: NodeIndex) {
        self.edges.retain(|&(s, d)| s.0 != source || d.0 != dest);
        self.order_nodes();
    }

    pub fn remove_edges_from(&mut self, source: NodeIndex) {
        self.edges.retain(|&(s, _d)| s.0 != source);
        self.order_nodes();
    }

    pub fn mark_free_when_finished(&mut self, index: NodeIndex) {
        if let Some(node) = self.nodes.get_mut(&index) {
            node.free_when_finished = true;
        }
    }

    /// Nodes feeding into `node`
    fn children(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.edges
            .iter()
            .filter(move |&&(_s, d)| d.0 == node)
            .map(|&(s, _d)| s.0)
    }

    fn visit(&self, n: NodeIndex, marked: &mut Vec<NodeIndex>, ordered: &mut Vec<NodeIndex>) {
        if marked.contains(&n) {
            return;
        }
        marked.push(n);
        self.children(n).for_each(|c| self.visit(c, marked, ordered));
        ordered.push(n);
    }

    /// Re-derive the processing order
    ///
    /// Every node is visited, dependencies before their consumers, so a
    /// disconnected source keeps rendering (and can still finish and emit
    /// its ended event). Node and edge sets iterate in key order, which
    /// keeps the traversal, and hence summing order, deterministic.
    fn order_nodes(&mut self) {
        // temporarily move the scratch vectors out of self, keeping their
        // allocations
        let mut ordered = std::mem::replace(&mut self.ordered, vec![]);
        ordered.clear();
        let mut marked = std::mem::replace(&mut self.marked, vec![]);
        marked.clear();

        for (&index, _node) in self.nodes.iter() {
            self.visit(index, &mut marked, &mut ordered);
        }

        self.ordered = ordered;
        self.marked = marked;
    }

    /// Render one quantum and return the destination's output bus
    pub fn render(&mut self, scope: &RenderScope) -> &AudioBus {
        // split borrows
        let ordered = &self.ordered;
        let edges = &self.edges;
        let nodes = &mut self.nodes;

        let mut finished: SmallVec<[NodeIndex; 8]> = SmallVec::new();

        for index in ordered.iter() {
            // take the node out of the map so its sources can be read while
            // it is processed
            let mut node = match nodes.remove(index) {
                Some(node) => node,
                None => continue,
            };

            // fill the summing junctions
            for input in node.inputs.iter_mut() {
                input.make_silent();
            }
            let interpretation = node.channel_config.interpretation();

            for &((from, output), (to, input)) in edges.iter() {
                if to != *index || input == PARAM_INPUT {
                    continue;
                }
                // a missing source or port yields silence, never an error
                let source = match nodes.get(&from).and_then(|n| n.outputs.get(output)) {
                    Some(bus) => bus,
                    None => continue,
                };
                match node.inputs.get_mut(input) {
                    Some(junction) => junction.add(source, interpretation),
                    None => log::warn!("connection to missing input port {} dropped", input),
                }
            }

            // negotiate the computed channel count per input
            let mode = node.channel_config.count_mode();
            let count = node.channel_config.count();
            for input in node.inputs.iter_mut() {
                let computed = match mode {
                    ChannelCountMode::Max => input.number_of_channels(),
                    ChannelCountMode::ClampedMax => input.number_of_channels().min(count),
                    ChannelCountMode::Explicit => count,
                };
                input.mix(computed, interpretation);
            }

            let params = AudioParamValues::from(&*nodes);
            let active = node.process(params, scope);

            // A node is reclaimed only when it is fully detached: a param
            // processor is pinned while its owning node is still in the
            // graph (the hidden edge disappears with the owner), and a
            // transform keeps its slot while any upstream connection could
            // still feed it, however silent it is right now.
            let mut pinned = false;
            let mut connected = false;
            for &((from, _), (to, input)) in edges.iter() {
                pinned |= from == *index && input == PARAM_INPUT;
                connected |= to == *index && input != PARAM_INPUT;
            }

            if !active && node.free_when_finished && !pinned && !connected {
                // dropped, the buses return to the pool
                finished.push(*index);
            } else {
                nodes.insert(*index, node);
            }
        }

        if !finished.is_empty() {
            for index in finished.iter() {
                log::debug!("reclaiming finished node {:?}", index);
                self.edges
                    .retain(|&((from, _), (to, _))| from != *index && to != *index);
            }
            self.order_nodes();
        }

        self.nodes
            .get(&NodeIndex(crate::context::DESTINATION_NODE_ID))
            .expect("destination node not registered")
            .get_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ChannelConfigOptions;
    use crate::RENDER_QUANTUM_SIZE;

    struct PassThrough;

    impl AudioProcessor for PassThrough {
        fn process(
            &mut self,
            inputs: &[AudioBus],
            outputs: &mut [AudioBus],
            _params: AudioParamValues<'_>,
            _scope: &RenderScope,
        ) -> bool {
            if let (Some(input), Some(output)) = (inputs.first(), outputs.first_mut()) {
                *output = input.clone();
            }
            true
        }
    }

    struct Constant {
        value: f32,
        active: bool,
    }

    impl AudioProcessor for Constant {
        fn process(
            &mut self,
            _inputs: &[AudioBus],
            outputs: &mut [AudioBus],
            _params: AudioParamValues<'_>,
            _scope: &RenderScope,
        ) -> bool {
            let output = &mut outputs[0];
            output.set_number_of_channels(1);
            let value = self.value;
            output
                .channel_data_mut(0)
                .iter_mut()
                .for_each(|s| *s = value);
            self.active
        }
    }

    fn config() -> ChannelConfig {
        ChannelConfigOptions::default().into()
    }

    fn scope() -> RenderScope {
        let (sender, _receiver) = crossbeam_channel::unbounded();
        RenderScope {
            current_frame: 0,
            current_time: 0.,
            sample_rate: 48_000.,
            events: sender,
        }
    }

    fn test_graph() -> Graph {
        let mut graph = Graph::new(Alloc::with_capacity(32));
        // the destination is always node 0
        graph.add_node(NodeIndex(0), Box::new(PassThrough), 1, 1, config());
        graph
    }

    #[test]
    fn test_ordering_puts_dependencies_first() {
        let mut graph = test_graph();

        graph.add_node(NodeIndex(1), Box::new(PassThrough), 1, 1, config());
        graph.add_node(NodeIndex(2), Box::new(PassThrough), 1, 1, config());
        graph.add_node(NodeIndex(3), Box::new(PassThrough), 1, 1, config());

        graph.add_edge((NodeIndex(1), 0), (NodeIndex(0), 0));
        graph.add_edge((NodeIndex(2), 0), (NodeIndex(1), 0));
        graph.add_edge((NodeIndex(3), 0), (NodeIndex(0), 0));

        assert_eq!(
            graph.ordered,
            vec![NodeIndex(2), NodeIndex(1), NodeIndex(3), NodeIndex(0)]
        );

        graph.remove_edge(NodeIndex(1), NodeIndex(0));

        // disconnected nodes are still ordered, after the reachable part
        assert_eq!(
            graph.ordered,
            vec![NodeIndex(3), NodeIndex(0), NodeIndex(2), NodeIndex(1)]
        );
    }

    #[test]
    fn test_remove_all_edges_from() {
        let mut graph = test_graph();

        graph.add_node(NodeIndex(1), Box::new(PassThrough), 1, 1, config());
        graph.add_node(NodeIndex(2), Box::new(PassThrough), 1, 1, config());

        graph.add_edge((NodeIndex(1), 0), (NodeIndex(0), 0));
        graph.add_edge((NodeIndex(2), 0), (NodeIndex(0), 0));
        graph.add_edge((NodeIndex(2), 0), (NodeIndex(1), 0));

        assert_eq!(
            graph.ordered,
            vec![NodeIndex(2), NodeIndex(1), NodeIndex(0)]
        );

        graph.remove_edges_from(NodeIndex(2));

        assert_eq!(
            graph.ordered,
            vec![NodeIndex(1), NodeIndex(0), NodeIndex(2)]
        );
    }

    #[test]
    fn test_render_sums_fan_in() {
        let mut graph = test_graph();

        let source = |value| {
            Box::new(Constant {
                value,
                active: true,
            })
        };
        graph.add_node(NodeIndex(1), source(0.25), 0, 1, config());
        graph.add_node(NodeIndex(2), source(0.5), 0, 1, config());

        graph.add_edge((NodeIndex(1), 0), (NodeIndex(0), 0));
        graph.add_edge((NodeIndex(2), 0), (NodeIndex(0), 0));

        let scope = scope();
        let output = graph.render(&scope);

        assert_eq!(output.number_of_channels(), 1);
        for i in 0..RENDER_QUANTUM_SIZE {
            assert!((output.channel_data(0)[i] - 0.75).abs() < 1e-6);
        }
    }

    #[test]
    fn test_finished_node_is_reclaimed() {
        let mut graph = test_graph();

        graph.add_node(
            NodeIndex(1),
            Box::new(Constant {
                value: 1.,
                active: false,
            }),
            0,
            1,
            config(),
        );
        graph.add_edge((NodeIndex(1), 0), (NodeIndex(0), 0));

        let scope = scope();

        // still referenced from the control thread
        graph.render(&scope);
        assert!(graph.nodes.contains_key(&NodeIndex(1)));

        // handle dropped, reclaimed after the next render
        graph.mark_free_when_finished(NodeIndex(1));
        graph.render(&scope);
        assert!(!graph.nodes.contains_key(&NodeIndex(1)));
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_connected_transform_is_not_reclaimed() {
        let mut graph = test_graph();

        // a tail-less transform fed by a source that emits nothing yet
        struct NoTail;
        impl AudioProcessor for NoTail {
            fn process(
                &mut self,
                _inputs: &[AudioBus],
                outputs: &mut [AudioBus],
                _params: AudioParamValues<'_>,
                _scope: &RenderScope,
            ) -> bool {
                outputs[0].make_silent();
                false
            }
        }

        graph.add_node(NodeIndex(1), Box::new(NoTail), 1, 1, config());
        graph.add_node(
            NodeIndex(2),
            Box::new(Constant {
                value: 0.,
                active: true,
            }),
            0,
            1,
            config(),
        );
        graph.add_edge((NodeIndex(1), 0), (NodeIndex(0), 0));
        graph.add_edge((NodeIndex(2), 0), (NodeIndex(1), 0));

        graph.mark_free_when_finished(NodeIndex(1));

        let scope = scope();

        // while the upstream connection exists the transform keeps its
        // slot, silent quanta notwithstanding
        graph.render(&scope);
        graph.render(&scope);
        assert!(graph.nodes.contains_key(&NodeIndex(1)));

        // once detached it is reclaimed
        graph.remove_edge(NodeIndex(2), NodeIndex(1));
        graph.render(&scope);
        assert!(!graph.nodes.contains_key(&NodeIndex(1)));
    }

    #[test]
    fn test_unconnected_input_renders_silence() {
        let mut graph = test_graph();

        let scope = scope();
        let output = graph.render(&scope);
        assert!(output.is_silent());
    }
}
