//! Parameters captured from a templated route.
//!
//! A template such as `/users/:id/posts/:post_id` yields one entry per
//! `:name` segment, in the order the names appear in the template. Most
//! templates carry one or two names, so the pairs live inline until a
//! template has more than [`INLINE_PARAMS`] of them.

use smallvec::SmallVec;

/// Number of parameters stored without a heap allocation.
const INLINE_PARAMS: usize = 4;

/// Ordered `(name, value)` pairs extracted by a route match.
///
/// # Example
///
/// ```rust
/// use courier_router::Params;
///
/// let mut params = Params::new();
/// params.push("id", "222");
/// params.push("post_id", "7");
///
/// assert_eq!(params.get("id"), Some("222"));
/// assert_eq!(params.get("post_id"), Some("7"));
/// assert!(!params.contains("missing"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the value captured for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if a parameter named `name` was captured.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(n, _)| n == name)
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of captured parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Iterates over the pairs in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Iterates over the parameter names in capture order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.iter().map(|(n, _)| n.as_str())
    }
}

impl IntoIterator for Params {
    type Item = (String, String);
    type IntoIter = smallvec::IntoIter<[(String, String); INLINE_PARAMS]>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a str, &'a str);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, String)>,
        fn(&'a (String, String)) -> (&'a str, &'a str),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}
