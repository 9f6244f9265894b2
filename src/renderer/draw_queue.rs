use super::*;

/// World space of the scene graph. Positions in it are only used as sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldSpace;

pub type WorldPoint = euclid::Point2D<f32, WorldSpace>;

/// Post-processing chain attached to a drawable or a container.
pub type ShaderChain = SmallVec<[ShaderId; 4]>;

/// Deferred draw of one leaf. Receives the draw context and the shaders inherited from the
/// enclosing containers, innermost container first.
pub type DrawFn<Cx> = Box<dyn FnOnce(&mut Cx, &[ShaderId]) -> Result<(), PipelineError>>;

pub(super) enum QueueNode<Cx> {
    Root,
    Container {
        position: WorldPoint,
        shaders: ShaderChain,
    },
    Leaf {
        position: WorldPoint,
        draw: Option<DrawFn<Cx>>,
    },
}

impl<Cx> QueueNode<Cx> {
    pub(super) fn sort_key(&self) -> f32 {
        match self {
            QueueNode::Root => f32::NEG_INFINITY,
            QueueNode::Container { position, .. } | QueueNode::Leaf { position, .. } => {
                position.y
            }
        }
    }
}

impl<Cx> std::fmt::Debug for QueueNode<Cx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueNode::Root => f.write_str("Root"),
            QueueNode::Container { position, shaders } => f
                .debug_struct("Container")
                .field("position", position)
                .field("shaders", shaders)
                .finish(),
            QueueNode::Leaf { position, draw } => f
                .debug_struct("Leaf")
                .field("position", position)
                .field("pending", &draw.is_some())
                .finish(),
        }
    }
}

/// Counts reported by [`RenderQueue::draw_frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub leaves_drawn: usize,
    pub containers_visited: usize,
}

/// One frame's worth of drawables, nested the way the scene graph nests them.
///
/// Items are painted in ascending world-space y within each level, ties in enqueue order.
/// Shaders attached to a container apply to everything below it.
pub struct RenderQueue<Cx> {
    pub(super) tree: easy_tree::Tree<QueueNode<Cx>>,
    /// Open levels, innermost last. Index 0 is the implicit root and is never popped.
    open: Vec<usize>,
}

impl<Cx> Default for RenderQueue<Cx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Cx> RenderQueue<Cx> {
    pub fn new() -> Self {
        let mut tree = easy_tree::Tree::new();
        let root = tree.add_node(QueueNode::Root);
        Self {
            tree,
            open: vec![root],
        }
    }

    /// Drops every queued item and reopens a single empty root level.
    pub fn clear_render_queue(&mut self) {
        self.tree.clear();
        let root = self.tree.add_node(QueueNode::Root);
        self.open.clear();
        self.open.push(root);
    }

    /// Appends a leaf to the innermost open level.
    pub fn enqueue_renderable<F>(&mut self, position: impl Into<WorldPoint>, draw: F)
    where
        F: FnOnce(&mut Cx, &[ShaderId]) -> Result<(), PipelineError> + 'static,
    {
        let position = position.into();
        self.tree.add_child(
            self.current_level(),
            QueueNode::Leaf {
                position,
                draw: Some(Box::new(draw)),
            },
        );
    }

    /// Appends a container to the innermost open level and makes it the innermost level.
    pub fn open_container(&mut self, position: impl Into<WorldPoint>, shaders: &[ShaderId]) {
        let node = self.tree.add_child(
            self.current_level(),
            QueueNode::Container {
                position: position.into(),
                shaders: ShaderChain::from_slice(shaders),
            },
        );
        self.open.push(node);
    }

    /// Closes the innermost open container.
    ///
    /// Fails with [`PipelineError::ContainerStackUnderflow`] when only the root level is open.
    pub fn close_container(&mut self) -> Result<(), PipelineError> {
        if self.open.len() == 1 {
            return Err(PipelineError::ContainerStackUnderflow);
        }
        self.open.pop();
        Ok(())
    }

    /// Number of open levels, the root included.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Queued items, containers included.
    pub fn len(&self) -> usize {
        self.tree.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorts every level, runs every leaf in paint order and leaves the queue empty.
    ///
    /// Containers still open are flushed like closed ones. The queue is cleared before any
    /// draw function runs, so a failing frame does not leak into the next one.
    pub fn draw_frame(&mut self, cx: &mut Cx) -> Result<QueueStats, PipelineError> {
        let root = self.open[0];
        let mut tree = std::mem::replace(&mut self.tree, easy_tree::Tree::new());
        self.clear_render_queue();

        let orders = plan_paint_order(&tree, root);

        let mut stats = QueueStats::default();
        execute_level(&mut tree, &orders, root, &[], cx, &mut stats)?;

        trace!(
            "Drew {} leaves in {} containers",
            stats.leaves_drawn,
            stats.containers_visited
        );
        Ok(stats)
    }

    fn current_level(&self) -> usize {
        self.open[self.open.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn record(
        log: &Log,
        name: &'static str,
    ) -> impl FnOnce(&mut (), &[ShaderId]) -> Result<(), PipelineError> {
        let log = log.clone();
        move |_: &mut (), _: &[ShaderId]| {
            log.borrow_mut().push(name);
            Ok(())
        }
    }

    #[test]
    fn leaves_paint_in_ascending_y_with_stable_ties() {
        let log = Log::default();
        let mut queue = RenderQueue::new();
        queue.enqueue_renderable([0.0, 50.0], record(&log, "A"));
        queue.enqueue_renderable([0.0, 10.0], record(&log, "B"));
        queue.enqueue_renderable([0.0, 50.0], record(&log, "C"));

        let stats = queue.draw_frame(&mut ()).unwrap();

        assert_eq!(*log.borrow(), vec!["B", "A", "C"]);
        assert_eq!(stats.leaves_drawn, 3);
    }

    #[test]
    fn containers_sort_as_a_unit_among_their_siblings() {
        let log = Log::default();
        let mut queue = RenderQueue::new();
        queue.enqueue_renderable([0.0, 20.0], record(&log, "late"));
        queue.open_container([0.0, 5.0], &[]);
        queue.enqueue_renderable([0.0, 100.0], record(&log, "inner-low"));
        queue.enqueue_renderable([0.0, -100.0], record(&log, "inner-high"));
        queue.close_container().unwrap();

        queue.draw_frame(&mut ()).unwrap();

        assert_eq!(*log.borrow(), vec!["inner-high", "inner-low", "late"]);
    }

    #[test]
    fn closing_the_root_level_underflows() {
        let mut queue: RenderQueue<()> = RenderQueue::new();
        assert!(matches!(
            queue.close_container(),
            Err(PipelineError::ContainerStackUnderflow)
        ));

        queue.open_container([0.0, 0.0], &[]);
        assert!(queue.close_container().is_ok());
        assert!(queue.close_container().is_err());
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn open_containers_are_flushed_at_frame_end() {
        let log = Log::default();
        let mut queue = RenderQueue::new();
        queue.open_container([0.0, 0.0], &[]);
        queue.enqueue_renderable([5.0, 5.0], record(&log, "fn"));

        queue.draw_frame(&mut ()).unwrap();

        assert_eq!(*log.borrow(), vec!["fn"]);
        assert_eq!(queue.depth(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn container_shaders_are_inherited_innermost_first() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut queue = RenderQueue::new();
        queue.open_container([0.0, 0.0], &[ShaderId(1)]);
        queue.open_container([0.0, 0.0], &[ShaderId(2), ShaderId(3)]);
        let sink = seen.clone();
        queue.enqueue_renderable([0.0, 0.0], move |_: &mut (), inherited: &[ShaderId]| {
            sink.borrow_mut().push(inherited.to_vec());
            Ok(())
        });
        queue.close_container().unwrap();
        let sink = seen.clone();
        queue.enqueue_renderable([0.0, 1.0], move |_: &mut (), inherited: &[ShaderId]| {
            sink.borrow_mut().push(inherited.to_vec());
            Ok(())
        });

        queue.draw_frame(&mut ()).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                vec![ShaderId(2), ShaderId(3), ShaderId(1)],
                vec![ShaderId(1)]
            ]
        );
    }

    #[test]
    fn failing_leaf_aborts_the_frame_and_leaves_the_queue_clean() {
        let log = Log::default();
        let mut queue = RenderQueue::new();
        queue.enqueue_renderable([0.0, 0.0], |_: &mut (), _: &[ShaderId]| {
            Err(PipelineError::InactiveShader(ShaderId(7)))
        });
        queue.enqueue_renderable([0.0, 1.0], record(&log, "after"));
        queue.open_container([0.0, 2.0], &[]);

        assert!(queue.draw_frame(&mut ()).is_err());
        assert!(log.borrow().is_empty());
        assert!(queue.is_empty());
        assert_eq!(queue.depth(), 1);

        queue.enqueue_renderable([0.0, 0.0], record(&log, "next"));
        queue.draw_frame(&mut ()).unwrap();
        assert_eq!(*log.borrow(), vec!["next"]);
    }

    #[test]
    fn clear_render_queue_discards_items_and_open_levels() {
        let log = Log::default();
        let mut queue = RenderQueue::new();
        queue.open_container([0.0, 0.0], &[]);
        queue.enqueue_renderable([0.0, 0.0], record(&log, "dropped"));

        queue.clear_render_queue();
        queue.draw_frame(&mut ()).unwrap();

        assert!(log.borrow().is_empty());
        assert_eq!(queue.depth(), 1);
    }
}
