//! Field path addressing.
//!
//! Paths are dotted: `form.title`, `form.authors.authors-0.name`.  Children of a list are named
//! `<list>-<index>` after their current position, so a name has to be parsed back to an index
//! before it can address a list entry.  The index is the segment after the *last* hyphen, which
//! keeps hyphenated list names such as `co-authors` addressable.

/// The separator between path segments.
pub const SEPARATOR: char = '.';

/// The separator between a list name and an entry position.
pub const ITEM_SEPARATOR: char = '-';

/// Joins a child name onto its parent path.
pub fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else if child.is_empty() {
        parent.to_string()
    } else {
        format!("{}{}{}", parent, SEPARATOR, child)
    }
}

/// The name given to the child at `index` of the list named `list`.
pub fn item_name(list: &str, index: usize) -> String {
    format!("{}{}{}", list, ITEM_SEPARATOR, index)
}

/// Recovers the position from a list child name.  Returns `None` for names that carry no
/// parseable index.
pub fn item_index(name: &str) -> Option<usize> {
    let (_, index) = name.rsplit_once(ITEM_SEPARATOR)?;
    index.parse().ok()
}

/// One segment of a parsed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// A keyed child of an object.
    Key(&'a str),
    /// A positional child of a list.
    Item {
        /// The list name, without the position suffix.
        list: &'a str,
        /// The position within the list.
        index: usize,
    },
}

impl<'a> Segment<'a> {
    /// Classifies a single segment.
    pub fn classify(segment: &'a str) -> Self {
        match segment.rsplit_once(ITEM_SEPARATOR) {
            Some((list, index)) if !list.is_empty() => match index.parse() {
                Ok(index) => Segment::Item { list, index },
                Err(_) => Segment::Key(segment),
            },
            _ => Segment::Key(segment),
        }
    }
}

/// A path split into its root, the next segment, and whatever follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedPath<'a> {
    /// The first segment.
    pub root: &'a str,
    /// The second segment, when present.
    pub segment: Option<Segment<'a>>,
    /// Everything after the second segment.
    pub remainder: Option<&'a str>,
}

/// Parses a path into `(root, index-or-key, remainder)`.  Returns `None` for an empty path.
pub fn parse(path: &str) -> Option<ParsedPath<'_>> {
    if path.is_empty() {
        return None;
    }
    let mut parts = path.splitn(3, SEPARATOR);
    let root = parts.next()?;
    let segment = parts.next().map(Segment::classify);
    let remainder = parts.next();
    Some(ParsedPath {
        root,
        segment,
        remainder,
    })
}

/// Iterates the segments of a path.
pub fn split(path: &str) -> impl Iterator<Item = Segment<'_>> {
    path.split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(Segment::classify)
}

/// The last segment of a path.
pub fn leaf_name(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}
