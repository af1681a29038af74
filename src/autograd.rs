use crate::tensor::{RawTensor, Tensor};
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

// ===== GRADIENT FUNCTION TRAIT =====

/// Trait for gradient computation functions.
///
/// Each operation type implements this to define how gradients flow backward.
/// The `backward` method takes:
/// - `out_grad`: gradient of loss w.r.t. this operation's output (flat, output shape)
/// - `parents`: the input tensors to this operation
///
/// Returns: one entry per parent (Some if that parent requires grad, None otherwise)
pub trait GradFn {
    fn backward(&self, out_grad: &[f32], parents: &[Tensor]) -> Vec<Option<Vec<f32>>>;
}

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// Run `f` without recording a graph. Outputs created inside never require grad.
pub fn no_grad<T>(f: impl FnOnce() -> T) -> T {
    let previous = GRAD_ENABLED.with(|g| g.replace(false));
    let out = f();
    GRAD_ENABLED.with(|g| g.set(previous));
    out
}

type NodeId = *const std::cell::RefCell<RawTensor>;

fn node_id(t: &Tensor) -> NodeId {
    Rc::as_ptr(t)
}

/// Topological order of every node reachable from `root`, leaves first.
///
/// A simple visited set in naive DFS is insufficient for "diamond" graphs
/// (nodes reachable via multiple paths), so we emit in post-order and walk
/// it reversed. Recursion is simulated with a stack; U-Net graphs are deep.
fn topo_order(root: &Tensor) -> Vec<Tensor> {
    enum Action {
        Visit(Tensor),
        PostVisit(Tensor),
    }

    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![Action::Visit(root.clone())];

    while let Some(action) = stack.pop() {
        match action {
            Action::Visit(t) => {
                if !visited.insert(node_id(&t)) {
                    continue;
                }
                stack.push(Action::PostVisit(t.clone()));
                for parent in t.borrow().parents.iter() {
                    if parent.borrow().requires_grad {
                        stack.push(Action::Visit(parent.clone()));
                    }
                }
            }
            Action::PostVisit(t) => order.push(t),
        }
    }
    order
}

fn accumulate(into: &mut Vec<f32>, add: &[f32]) {
    assert_eq!(
        into.len(),
        add.len(),
        "Gradient size mismatch during accumulation"
    );
    for (a, b) in into.iter_mut().zip(add) {
        *a += *b;
    }
}

/// Propagate d(root)/d(node) through the graph.
///
/// Returns the gradients of the leaves (nodes without a `grad_fn`). Interior
/// gradients are dropped as soon as they have been pushed to their parents.
fn propagate(root: &Tensor) -> HashMap<NodeId, Vec<f32>> {
    let seed_len = root.borrow().data.len();
    let mut grads: HashMap<NodeId, Vec<f32>> = HashMap::new();
    grads.insert(node_id(root), vec![1.0; seed_len]);

    let mut leaves = HashMap::new();
    for node in topo_order(root).into_iter().rev() {
        let id = node_id(&node);
        let Some(out_grad) = grads.remove(&id) else {
            continue;
        };
        let (grad_fn, parents) = {
            let n = node.borrow();
            (n.grad_fn.clone(), n.parents.clone())
        };
        let Some(grad_fn) = grad_fn else {
            leaves.insert(id, out_grad);
            continue;
        };

        let parent_grads = grad_fn.backward(&out_grad, &parents);
        for (parent_grad, parent) in parent_grads.into_iter().zip(parents.iter()) {
            let Some(g) = parent_grad else { continue };
            if !parent.borrow().requires_grad {
                continue;
            }
            match grads.get_mut(&node_id(parent)) {
                Some(existing) => accumulate(existing, &g),
                None => {
                    grads.insert(node_id(parent), g);
                }
            }
        }
    }
    leaves
}

/// Run backpropagation from `tensor`, accumulating into the `grad` of every
/// reachable leaf.
///
/// # Panics
/// Calling on a tensor that doesn't need gradients
pub fn backward(tensor: &Tensor) {
    assert!(
        tensor.borrow().requires_grad,
        "Called backward on a tensor that doesn't require grad"
    );
    let order = topo_order(tensor);
    let mut leaf_grads = propagate(tensor);
    for node in order {
        if let Some(g) = leaf_grads.remove(&node_id(&node)) {
            let mut n = node.borrow_mut();
            match n.grad {
                Some(ref mut existing) => accumulate(existing, &g),
                None => n.grad = Some(g),
            }
        }
    }
}

/// Gradients of `loss` with respect to `params`, without touching any
/// tensor's `grad` field.
///
/// Entries are `None` for parameters the loss does not depend on. Used to
/// give the generator and discriminator disjoint gradients from one graph.
pub fn grad(loss: &Tensor, params: &[Tensor]) -> Vec<Option<Vec<f32>>> {
    if !loss.borrow().requires_grad {
        return vec![None; params.len()];
    }
    let mut leaf_grads = propagate(loss);
    params
        .iter()
        .map(|p| leaf_grads.remove(&node_id(p)))
        .collect()
}
