use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Tree of shutdown signals: cancelling a node cancels its whole subtree.
/// The system owns the root, every dispatcher a child.
#[derive(Clone)]
pub(crate) struct ShutdownToken {
	inner: Arc<Node>,
}

struct Node {
	state: watch::Sender<bool>,
	children: Mutex<Vec<Arc<Node>>>,
}

impl Node {
	fn new() -> Arc<Self> {
		Arc::new(Self {
			state: watch::Sender::new(false),
			children: Mutex::new(Vec::new()),
		})
	}

	fn cancel(&self) {
		// locking to prevent adding new children while we are cancelling
		let children = self.children.lock();
		let changed = self.state.send_if_modified(|cancelled| {
			// do not re-cancel
			!std::mem::replace(cancelled, true)
		});
		if changed {
			for child in children.iter() {
				child.cancel();
			}
		}
	}
}

impl Default for ShutdownToken {
	fn default() -> Self {
		Self::new()
	}
}

impl ShutdownToken {
	pub fn new() -> Self {
		Self { inner: Node::new() }
	}

	pub fn child(&self) -> Self {
		let mut children = self.inner.children.lock();
		let node = Node::new();
		if *self.inner.state.borrow() {
			node.state.send_replace(true);
		} else {
			children.push(node.clone());
		}
		Self { inner: node }
	}

	pub fn cancel(&self) {
		self.inner.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		*self.inner.state.borrow()
	}

	pub async fn cancelled(&self) {
		let mut rx = self.inner.state.subscribe();
		// the sender lives as long as `self`, so this only returns on cancel
		let _ = rx.wait_for(|cancelled| *cancelled).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn cancelling_parent_reaches_children() {
		let root = ShutdownToken::new();
		let child = root.child();
		let grandchild = child.child();

		root.cancel();
		grandchild.cancelled().await;
		assert!(child.is_cancelled());

		let late = root.child();
		assert!(late.is_cancelled());
	}

	#[test]
	fn cancelling_child_leaves_parent_running() {
		let root = ShutdownToken::new();
		let child = root.child();
		child.cancel();
		assert!(!root.is_cancelled());
	}
}
