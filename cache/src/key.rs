use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Separates a key's namespace from the rest of the key.
pub const NAMESPACE_SEPARATOR: char = ':';

/// The identity of a cached resource.
///
/// Keys are plain strings with a colon-delimited namespace convention, e.g.
/// `"teacher:stats"` or `"tenant-42:lessons:upcoming"`. The convention is what
/// makes prefix invalidation work: invalidating `"teacher"` removes
/// `"teacher"` itself and everything under `"teacher:"`, but not
/// `"teacher-other"`.
///
/// A `CacheKey` is an `Arc<str>` underneath, so cloning it is cheap.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
  pub fn new(key: impl Into<Arc<str>>) -> Self {
    Self(key.into())
  }

  /// Builds `"{namespace}:{id}"`.
  pub fn scoped(namespace: &str, id: impl fmt::Display) -> Self {
    Self(format!("{namespace}{NAMESPACE_SEPARATOR}{id}").into())
  }

  /// Builds a child key `"{self}:{segment}"`.
  pub fn child(&self, segment: impl fmt::Display) -> Self {
    Self::scoped(&self.0, segment)
  }

  #[inline]
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The text before the first separator, if the key has one.
  pub fn namespace(&self) -> Option<&str> {
    self
      .0
      .split_once(NAMESPACE_SEPARATOR)
      .map(|(namespace, _)| namespace)
  }

  /// Returns `true` if this key equals `prefix` or lives under `prefix:`.
  pub fn is_within(&self, prefix: &str) -> bool {
    is_within(&self.0, prefix)
  }
}

/// Prefix matching on raw strings, shared with the entry store.
#[inline]
pub(crate) fn is_within(key: &str, prefix: &str) -> bool {
  match key.strip_prefix(prefix) {
    Some(rest) => rest.is_empty() || rest.starts_with(NAMESPACE_SEPARATOR),
    None => false,
  }
}

impl fmt::Debug for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(&*self.0, f)
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl Borrow<str> for CacheKey {
  fn borrow(&self) -> &str {
    &self.0
  }
}

impl AsRef<str> for CacheKey {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl From<&str> for CacheKey {
  fn from(key: &str) -> Self {
    Self(key.into())
  }
}

impl From<String> for CacheKey {
  fn from(key: String) -> Self {
    Self(key.into())
  }
}

impl From<&String> for CacheKey {
  fn from(key: &String) -> Self {
    Self(key.as_str().into())
  }
}

impl From<&CacheKey> for CacheKey {
  fn from(key: &CacheKey) -> Self {
    key.clone()
  }
}

impl From<Arc<str>> for CacheKey {
  fn from(key: Arc<str>) -> Self {
    Self(key)
  }
}
