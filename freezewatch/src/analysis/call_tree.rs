//! Weighted call tree built from sampled stacks.
//!
//! Each sample contributes one stack (the "cause" thread of that tick). The
//! stack is walked from the entry point towards the executing frame and every
//! node on the path gets the tick's weight added, so a node's time
//! approximates how long the thread spent anywhere below that call path.
//!
//! ## Data Flow
//!
//! ```text
//! cause thread per tick ──► CallTree::add_stack() ──► weighted tree
//!                                                        │
//!                     find_dominant_common_stack() ◄─────┤
//!                                          dump()  ◄─────┘
//! ```
//!
//! Nodes live in an arena (`Vec<CallTreeNode>`) owned by the tree; children are
//! indices and the parent link is a plain index, so there are no reference
//! cycles to manage.

use std::fmt::Write as _;

use freezewatch_common::{StackFrame, ThreadInfo, ThreadState};

/// Index of a node inside its [`CallTree`].
pub type NodeId = usize;

/// Thread attached to the node where one of its stacks ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafThread {
    pub name: String,
    pub state: ThreadState,
}

/// One call-tree node.
#[derive(Debug, Clone)]
pub struct CallTreeNode {
    /// `None` only for the root
    pub frame: Option<StackFrame>,
    /// Accumulated sample weight in milliseconds
    pub time_ms: u64,
    pub parent: Option<NodeId>,
    /// In order of first occurrence
    pub children: Vec<NodeId>,
    /// Set when a sampled stack ended at this node
    pub thread: Option<LeafThread>,
}

/// Call tree owned by one freeze analysis.
#[derive(Debug, Clone)]
pub struct CallTree {
    nodes: Vec<CallTreeNode>,
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTree {
    pub const ROOT: NodeId = 0;

    /// Tree with only the root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![CallTreeNode {
                frame: None,
                time_ms: 0,
                parent: None,
                children: Vec::new(),
                thread: None,
            }],
        }
    }

    /// Fold every thread's stack into a fresh tree with `per_tick_weight_ms` each.
    pub fn build<'a>(threads: impl IntoIterator<Item = &'a ThreadInfo>, per_tick_weight_ms: u64) -> Self {
        let mut tree = Self::new();
        for thread in threads {
            tree.add_stack(thread, per_tick_weight_ms);
        }
        tree
    }

    /// Fold one sampled stack into the tree.
    ///
    /// Frames match existing children by class, method and file; line numbers
    /// are ignored.
    pub fn add_stack(&mut self, thread: &ThreadInfo, weight_ms: u64) {
        let mut current = Self::ROOT;
        self.nodes[current].time_ms += weight_ms;

        // Stacks are innermost first; walk from the entry point inwards.
        for frame in thread.stack.iter().rev() {
            current = self.find_or_create_child(current, frame);
            self.nodes[current].time_ms += weight_ms;
        }

        if current != Self::ROOT {
            self.nodes[current].thread =
                Some(LeafThread { name: thread.name.clone(), state: thread.state });
        }
    }

    fn find_or_create_child(&mut self, parent: NodeId, frame: &StackFrame) -> NodeId {
        let existing = self.nodes[parent].children.iter().copied().find(|&child| {
            self.nodes[child].frame.as_ref().is_some_and(|f| f.same_location(frame))
        });
        if let Some(child) = existing {
            return child;
        }

        let id = self.nodes.len();
        self.nodes.push(CallTreeNode {
            frame: Some(frame.clone()),
            time_ms: 0,
            parent: Some(parent),
            children: Vec::new(),
            thread: None,
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// # Panics
    /// Panics if `id` doesn't belong to this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &CallTreeNode {
        &self.nodes[id]
    }

    /// Total sample weight folded in so far.
    #[must_use]
    pub fn total_time_ms(&self) -> u64 {
        self.nodes[Self::ROOT].time_ms
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes[Self::ROOT].children.is_empty()
    }

    /// Heaviest child; on equal time the earliest inserted one wins.
    fn heaviest_child(&self, id: NodeId) -> Option<NodeId> {
        let mut best: Option<NodeId> = None;
        for &child in &self.nodes[id].children {
            if best.map_or(true, |b| self.nodes[child].time_ms > self.nodes[b].time_ms) {
                best = Some(child);
            }
        }
        best
    }

    /// Deepest node on the heaviest path whose time exceeds `threshold_ms`.
    ///
    /// Starts at the root's heaviest child and keeps descending into the
    /// heaviest child while it stays above the threshold. Returns `None` when
    /// not even the top-level call path is above it.
    #[must_use]
    pub fn find_dominant_common_stack(&self, threshold_ms: u64) -> Option<NodeId> {
        let mut current = self.heaviest_child(Self::ROOT)?;
        if self.nodes[current].time_ms <= threshold_ms {
            return None;
        }
        while let Some(child) = self.heaviest_child(current) {
            if self.nodes[child].time_ms <= threshold_ms {
                break;
            }
            current = child;
        }
        Some(current)
    }

    /// Frames from the entry point down to `id` (outermost first).
    #[must_use]
    pub fn stack_to(&self, id: NodeId) -> Vec<StackFrame> {
        let mut frames = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id];
            if let Some(ref frame) = node.frame {
                frames.push(frame.clone());
            }
            current = node.parent;
        }
        frames.reverse();
        frames
    }

    /// Indented pre-order dump, heaviest child first at each level.
    ///
    /// ```text
    /// Total 12000ms
    ///   app.EventLoop.run(EventLoop.java) 12000ms
    ///     app.Editor.paint(Editor.java:120) 9000ms [AWT-EventQueue-0 RUNNABLE]
    ///     app.Index.lookup(Index.java:12) 3000ms
    /// ```
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Total {}ms", self.total_time_ms());
        self.dump_children(Self::ROOT, 1, &mut out);
        out
    }

    fn dump_children(&self, id: NodeId, depth: usize, out: &mut String) {
        let mut children = self.nodes[id].children.clone();
        // Stable sort keeps first-inserted order among equal times
        children.sort_by_key(|&c| std::cmp::Reverse(self.nodes[c].time_ms));

        for child in children {
            let node = &self.nodes[child];
            let frame = node.frame.as_ref().map(ToString::to_string).unwrap_or_default();
            let _ = write!(out, "{:indent$}{frame} {}ms", "", node.time_ms, indent = depth * 2);
            if let Some(ref thread) = node.thread {
                let _ = write!(out, " [{} {}]", thread.name, thread.state);
            }
            out.push('\n');
            self.dump_children(child, depth + 1, out);
        }
    }
}
