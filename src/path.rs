use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::sync::Arc;

/// URI scheme every actor path starts with.
pub const SCHEME: &str = "runy://";

/// Identity of one cell inside the arena of an actor system.
///
/// Ids are never reused within a system, so a stale id simply fails to
/// resolve once its cell terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub(crate) u64);

impl ActorId {
	/// Raw numeric id.
	pub fn get(&self) -> u64 {
		self.0
	}
}

impl Display for ActorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Hierarchical actor address: `runy://<system>[@<host:port>]/<segment>/...`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorPath {
	full: Arc<str>,
}

impl ActorPath {
	pub(crate) fn root(system: &str) -> Self {
		Self {
			full: format!("{SCHEME}{system}").into(),
		}
	}

	/// Parses an absolute path. Returns `None` when the scheme or the
	/// address part is missing or a segment is empty.
	pub fn parse(value: &str) -> Option<Self> {
		let rest = value.strip_prefix(SCHEME)?;
		let (address, segments) = match rest.find('/') {
			Some(index) => (&rest[..index], Some(&rest[index + 1..])),
			None => (rest, None),
		};
		if address.is_empty() {
			return None;
		}
		if let Some(segments) = segments {
			if segments.split('/').any(str::is_empty) {
				return None;
			}
		}
		Some(Self { full: value.into() })
	}

	/// Path one level below, named `name`.
	pub fn child(&self, name: &str) -> Self {
		Self {
			full: format!("{}/{}", self.full, name).into(),
		}
	}

	/// `runy://system` or `runy://system@host:port`.
	pub fn address(&self) -> &str {
		let rest = &self.full[SCHEME.len()..];
		match rest.find('/') {
			Some(index) => &self.full[..SCHEME.len() + index],
			None => &self.full,
		}
	}

	/// Path segments below the address.
	pub fn elements(&self) -> impl Iterator<Item = &str> {
		let address = self.address().len();
		self.full[address..].split('/').filter(|s| !s.is_empty())
	}

	/// Last segment, or an empty string for the root.
	pub fn name(&self) -> &str {
		self.elements().last().unwrap_or("")
	}

	/// One level up; `None` for the system root.
	pub fn parent(&self) -> Option<Self> {
		if self.full.len() == self.address().len() {
			return None;
		}
		let index = self.full.rfind('/')?;
		Some(Self {
			full: self.full[..index].into(),
		})
	}

	/// The full `runy://...` string.
	pub fn as_str(&self) -> &str {
		&self.full
	}
}

impl Display for ActorPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.full)
	}
}

impl Debug for ActorPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		Debug::fmt(&*self.full, f)
	}
}

/// Names chosen by users: non-empty, no `/`, and not starting with `$`
/// (that prefix belongs to generated names).
pub(crate) fn is_valid_name(name: &str) -> bool {
	!name.is_empty() && !name.contains('/') && !name.starts_with('$')
}
