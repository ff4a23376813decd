//! Plaintext paths as seen through the mount.

use relative_path::{Component, RelativePath, RelativePathBuf};
use std::fmt;

/// User-facing path inside the filesystem.
///
/// Virtual paths always use `/` as the separator. A leading slash is optional
/// and `.` components are dropped, so `"/a/./b"` and `"a/b"` are equal. `..`
/// components are kept and rejected when the path is resolved.
///
/// # Examples
///
/// ```
/// use ivfs_core::overlay::VirtualPath;
///
/// let path = VirtualPath::new("/docs/2024");
/// assert_eq!(path.file_name(), Some("2024"));
/// assert_eq!(path.parent().unwrap().to_string(), "/docs");
/// assert_eq!(path, VirtualPath::new("docs/./2024"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualPath(RelativePathBuf);

impl VirtualPath {
    /// The root path (empty).
    #[inline]
    pub fn root() -> Self {
        VirtualPath(RelativePathBuf::new())
    }

    pub fn new(path: impl AsRef<str>) -> Self {
        let s = path.as_ref().trim_start_matches('/');
        let mut buf = RelativePathBuf::new();
        for component in RelativePath::new(s).components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => buf.push(".."),
                Component::Normal(name) => buf.push(name),
            }
        }
        VirtualPath(buf)
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.as_str().is_empty()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn join(&self, component: impl AsRef<str>) -> Self {
        VirtualPath(self.0.join(component.as_ref()))
    }

    /// Returns `None` for the root path.
    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }
        self.0.parent().map(|p| VirtualPath(p.to_relative_path_buf()))
    }

    /// Returns `None` for the root path.
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.components().map(|c| c.as_str())
    }

    /// Split into parent directory path and final component.
    pub fn split(&self) -> Option<(VirtualPath, &str)> {
        let parent = self.parent()?;
        let name = self.file_name()?;
        Some((parent, name))
    }
}

impl AsRef<str> for VirtualPath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl From<&str> for VirtualPath {
    fn from(s: &str) -> Self {
        VirtualPath::new(s)
    }
}

impl From<String> for VirtualPath {
    fn from(s: String) -> Self {
        VirtualPath::new(s)
    }
}

impl From<&VirtualPath> for VirtualPath {
    fn from(p: &VirtualPath) -> Self {
        p.clone()
    }
}
