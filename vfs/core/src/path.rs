//! Bounded, component-indexed absolute paths.
//!
//! A [`ParsedPath`] always holds the canonical absolute form (`/` for the
//! root, `/a/b` otherwise) with `.` removed and `..` applied, plus the start
//! offset of every component so it can be cut back to any earlier
//! component boundary in O(1).

use crate::config::VfsConfig;
use crate::{VfsError, VfsErrorKind, VfsResult};
use smallvec::SmallVec;
use std::fmt;

const SEPARATOR: char = '/';

#[derive(Clone, PartialEq, Eq)]
pub struct ParsedPath {
    path: String,
    offsets: SmallVec<[u16; 16]>,
    must_be_dir: bool,
    limit: usize,
    name_limit: usize,
}

impl ParsedPath {
    /// The root path with the default limits.
    pub fn root() -> Self {
        let config = VfsConfig::default();
        Self::root_with(config.max_path_len, config.max_name_len)
    }

    fn root_with(limit: usize, name_limit: usize) -> Self {
        let mut path = String::with_capacity(64);
        path.push(SEPARATOR);
        Self {
            path,
            offsets: SmallVec::new(),
            must_be_dir: false,
            // Offsets are 16-bit.
            limit: limit.min(u16::MAX as usize),
            name_limit,
        }
    }

    /// Parse `path`; a relative path is resolved against `cwd`, which must
    /// be absolute. Without a `cwd` relative paths start at the root.
    pub fn parse(path: &str, cwd: Option<&str>) -> VfsResult<Self> {
        Self::parse_with_config(path, cwd, &VfsConfig::default())
    }

    pub fn parse_with_config(path: &str, cwd: Option<&str>, config: &VfsConfig) -> VfsResult<Self> {
        Self::parse_inner(path, cwd, config.max_path_len, config.max_name_len)
    }

    /// Like [`ParsedPath::parse`] with `limit` as the bound on the
    /// canonical length.
    pub fn parse_with_limit(path: &str, cwd: Option<&str>, limit: usize) -> VfsResult<Self> {
        Self::parse_inner(path, cwd, limit, VfsConfig::default().max_name_len)
    }

    fn parse_inner(
        path: &str,
        cwd: Option<&str>,
        limit: usize,
        name_limit: usize,
    ) -> VfsResult<Self> {
        let mut parsed = match cwd {
            _ if path.starts_with(SEPARATOR) => Self::root_with(limit, name_limit),
            None => Self::root_with(limit, name_limit),
            Some(cwd) => {
                debug_assert!(cwd.starts_with(SEPARATOR), "cwd must be absolute: {cwd:?}");
                if !cwd.starts_with(SEPARATOR) {
                    return Err(VfsError::new(
                        VfsErrorKind::InvalidInput,
                        "path.parse.relative_cwd",
                    ));
                }
                Self::parse_inner(cwd, None, limit, name_limit)?
            }
        };
        parsed.append(path)?;
        Ok(parsed)
    }

    /// Append a relative suffix (leading separators are ignored).
    pub fn append(&mut self, suffix: &str) -> VfsResult<()> {
        let mut restart = self.len();
        self.append_tracked(suffix, &mut restart)
    }

    /// Like [`ParsedPath::append`], lowering `restart_index` whenever `..`
    /// pops below it so a caller resolving components from that index
    /// knows where to resume. On failure the path is left unchanged.
    pub fn append_tracked(&mut self, suffix: &str, restart_index: &mut usize) -> VfsResult<()> {
        let saved = (self.path.clone(), self.offsets.clone(), self.must_be_dir);
        let result = self.append_components(suffix, restart_index);
        if result.is_err() {
            (self.path, self.offsets, self.must_be_dir) = saved;
        }
        result
    }

    fn append_components(&mut self, suffix: &str, restart_index: &mut usize) -> VfsResult<()> {
        let mut last = None;
        for name in suffix.split(SEPARATOR) {
            last = Some(name);
            match name {
                "" | "." => {}
                ".." => {
                    if let Some(parent) = self.len().checked_sub(1) {
                        self.truncate(parent);
                        *restart_index = (*restart_index).min(parent);
                    }
                }
                name => self.push(name)?,
            }
        }
        if let Some(last) = last.filter(|_| !suffix.is_empty()) {
            self.must_be_dir = matches!(last, "" | "." | "..");
        }
        Ok(())
    }

    fn push(&mut self, name: &str) -> VfsResult<()> {
        if name.contains('\0') {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "path.append.nul"));
        }
        if name.len() > self.name_limit {
            return Err(VfsError::new(VfsErrorKind::NameTooLong, "path.append.name"));
        }
        let needs_separator = !self.is_root();
        let new_len = self.path.len() + usize::from(needs_separator) + name.len();
        if new_len > self.limit {
            return Err(VfsError::new(VfsErrorKind::NameTooLong, "path.append.length"));
        }
        if needs_separator {
            self.path.push(SEPARATOR);
        }
        self.offsets.push(self.path.len() as u16);
        self.path.push_str(name);
        Ok(())
    }

    /// Keep only the first `count` components.
    pub fn truncate(&mut self, count: usize) {
        if count >= self.len() {
            return;
        }
        let cut = if count == 0 {
            1
        } else {
            usize::from(self.offsets[count]) - 1
        };
        self.path.truncate(cut);
        self.offsets.truncate(count);
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn component(&self, index: usize) -> Option<&str> {
        let start = usize::from(*self.offsets.get(index)?);
        let end = self
            .offsets
            .get(index + 1)
            .map_or(self.path.len(), |next| usize::from(*next) - 1);
        Some(&self.path[start..end])
    }

    pub fn components(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.len()).filter_map(move |index| self.component(index))
    }

    pub fn last(&self) -> Option<&str> {
        self.len().checked_sub(1).and_then(|index| self.component(index))
    }

    /// The components from `index` on, joined into a relative path.
    pub fn components_from(&self, index: usize) -> &str {
        match self.offsets.get(index) {
            Some(start) => &self.path[usize::from(*start)..],
            None => "",
        }
    }

    /// The canonical form.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// The original path ended in a separator (or `.`/`..`), so its final
    /// component has to be a directory.
    pub fn must_be_dir(&self) -> bool {
        self.must_be_dir
    }

    pub fn set_must_be_dir(&mut self, must_be_dir: bool) {
        self.must_be_dir = must_be_dir;
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for ParsedPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for ParsedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl fmt::Debug for ParsedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedPath")
            .field("path", &self.path)
            .field("components", &self.len())
            .field("must_be_dir", &self.must_be_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(path: &ParsedPath) -> Vec<&str> {
        path.components().collect()
    }

    #[test]
    fn dot_and_dotdot_are_resolved() {
        let path = ParsedPath::parse("/a/b/../c/", Some("/")).unwrap();
        assert_eq!(path.as_str(), "/a/c");
        assert!(path.must_be_dir());
        assert_eq!(names(&path), ["a", "c"]);

        let path = ParsedPath::parse("/a/./b/../c", None).unwrap();
        assert_eq!(names(&path), ["a", "c"]);
        assert!(!path.must_be_dir());
    }

    #[test]
    fn relative_paths_start_at_cwd() {
        let path = ParsedPath::parse("x/y", Some("/a/b")).unwrap();
        assert_eq!(path.as_str(), "/a/b/x/y");
        assert_eq!(path.len(), 4);

        let up = ParsedPath::parse("../../../z", Some("/a/b")).unwrap();
        assert_eq!(up.as_str(), "/z");
    }

    #[test]
    fn empty_and_separator_only_paths_are_root() {
        for input in ["", "/", "//", "/./", "/.."] {
            let path = ParsedPath::parse(input, None).unwrap();
            assert!(path.is_root(), "{input:?}");
            assert_eq!(path.as_str(), "/");
            assert_eq!(path.last(), None);
        }
    }

    #[test]
    fn repeated_separators_collapse() {
        let path = ParsedPath::parse("//usr///lib//", None).unwrap();
        assert_eq!(path.as_str(), "/usr/lib");
        assert!(path.must_be_dir());
    }

    #[test]
    fn components_rejoin_to_canonical_form() {
        for input in ["/a", "/a/b/c", "/x/../y/./z/", "/one/two/../../three"] {
            let path = ParsedPath::parse(input, None).unwrap();
            let rejoined = format!("/{}", names(&path).join("/"));
            assert_eq!(rejoined, path.as_str());
            assert!(names(&path).iter().all(|name| *name != "." && *name != ".."));
        }
    }

    #[test]
    fn truncate_cuts_at_component_boundaries() {
        let mut path = ParsedPath::parse("/alpha/beta/gamma", None).unwrap();
        assert_eq!(path.components_from(1), "beta/gamma");
        path.truncate(2);
        assert_eq!(path.as_str(), "/alpha/beta");
        assert_eq!(path.last(), Some("beta"));
        path.truncate(5);
        assert_eq!(path.len(), 2);
        path.truncate(0);
        assert_eq!(path.as_str(), "/");
        path.append("delta").unwrap();
        assert_eq!(path.as_str(), "/delta");
    }

    #[test]
    fn tracked_append_reports_earliest_touched_component() {
        let mut path = ParsedPath::parse("/a/b/c", None).unwrap();
        let mut restart = path.len();
        path.append_tracked("../../d", &mut restart).unwrap();
        assert_eq!(path.as_str(), "/a/d");
        assert_eq!(restart, 1);

        let mut restart = path.len();
        path.append_tracked("e/f", &mut restart).unwrap();
        assert_eq!(restart, 2);
    }

    #[test]
    fn overlong_names_and_paths_fail() {
        let long = "n".repeat(256);
        let err = ParsedPath::parse(&format!("/ok/{long}"), None).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::NameTooLong);
        assert!(ParsedPath::parse(&format!("/{}", "n".repeat(255)), None).is_ok());

        let err = ParsedPath::parse_with_limit("/abc/def", None, 6).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::NameTooLong);
        assert_eq!(err.context(), "path.append.length");
    }

    #[test]
    fn failed_append_leaves_path_unchanged() {
        let mut path = ParsedPath::parse_with_limit("/abc", None, 8).unwrap();
        let err = path.append("../x/toolong").unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::NameTooLong);
        assert_eq!(path.as_str(), "/abc");
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn nul_bytes_are_rejected() {
        let err = ParsedPath::parse("/a\0b", None).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::InvalidInput);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "cwd must be absolute")]
    fn relative_cwd_is_a_contract_error() {
        let _ = ParsedPath::parse("x", Some("relative"));
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn relative_cwd_is_rejected() {
        let err = ParsedPath::parse("x", Some("relative")).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::InvalidInput);
    }
}
