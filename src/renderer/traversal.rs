use super::draw_queue::{QueueNode, QueueStats, ShaderChain};
use super::*;

/// Paint order of one level: child node ids sorted by world-space y.
pub(super) type LevelOrder = SmallVec<[usize; 8]>;

/// Computes the paint order of every level below `root`.
///
/// The sort is stable, so items sharing a y keep their enqueue order. NaN keys sort after
/// every finite one whatever their sign bit.
pub(super) fn plan_paint_order<Cx>(
    tree: &easy_tree::Tree<QueueNode<Cx>>,
    root: usize,
) -> Vec<LevelOrder> {
    let key = |node_id: usize| tree.get(node_id).map_or(f32::INFINITY, QueueNode::sort_key);

    let mut orders = vec![LevelOrder::new(); tree.len()];
    let mut pending = vec![root];
    while let Some(node_id) = pending.pop() {
        let children = tree.children(node_id);
        pending.extend_from_slice(children);

        let mut order = LevelOrder::from_slice(children);
        order.sort_by(|&a, &b| {
            let (a, b) = (key(a), key(b));
            a.is_nan().cmp(&b.is_nan()).then_with(|| a.total_cmp(&b))
        });
        orders[node_id] = order;
    }
    orders
}

/// Runs the leaves below `node_id` in paint order.
///
/// `inherited` holds the shaders of the enclosing containers. A container hands its own
/// chain followed by the chain it received to its children; the children's own chains are
/// never touched. Levels are walked with an explicit stack, so nesting depth is bounded by
/// memory rather than by the thread's stack.
pub(super) fn execute_level<Cx>(
    tree: &mut easy_tree::Tree<QueueNode<Cx>>,
    orders: &[LevelOrder],
    node_id: usize,
    inherited: &[ShaderId],
    cx: &mut Cx,
    stats: &mut QueueStats,
) -> Result<(), PipelineError> {
    let mut levels = vec![(orders[node_id].iter(), ShaderChain::from_slice(inherited))];

    while let Some((children, chain)) = levels.last_mut() {
        let Some(&child_id) = children.next() else {
            levels.pop();
            continue;
        };

        match tree.get_mut(child_id) {
            Some(QueueNode::Leaf { draw, .. }) => {
                if let Some(draw) = draw.take() {
                    draw(cx, &chain[..])?;
                    stats.leaves_drawn += 1;
                }
            }
            Some(QueueNode::Container { shaders, .. }) => {
                stats.containers_visited += 1;
                let mut nested: ShaderChain = shaders.clone();
                nested.extend_from_slice(&chain[..]);
                levels.push((orders[child_id].iter(), nested));
            }
            Some(QueueNode::Root) | None => {}
        }
    }
    Ok(())
}
