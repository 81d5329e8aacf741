use std::any::Any;

use crate::envelope::Envelope;
use crate::path::ActorPath;

/// Outbound side of remoting. The runtime hands over envelopes addressed
/// to paths outside the local system and expects nothing back: delivery is
/// fire and forget, and any ordering beyond per (sender, receiver) FIFO is
/// up to the implementation.
pub trait Transport: Send + Sync + 'static {
	fn deliver(&self, recipient: &ActorPath, envelope: Envelope<Box<dyn Any + Send>>);
}
