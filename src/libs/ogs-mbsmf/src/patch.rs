//! Patch Operations
//!
//! JSON-Patch style operations produced by the diff engine. Paths are
//! `/`-separated pointers rooted at the resource; `"/"` designates the whole
//! resource.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encode::Document;

/// Patch operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
    Replace,
    Remove,
}

impl PatchOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for PatchOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchOpKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Document>,
}

impl PatchOp {
    pub fn add(path: impl Into<String>, value: Option<Document>) -> Self {
        Self {
            op: PatchOpKind::Add,
            path: path.into(),
            value,
        }
    }

    pub fn replace(path: impl Into<String>, value: Option<Document>) -> Self {
        Self {
            op: PatchOpKind::Replace,
            path: path.into(),
            value,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOpKind::Remove,
            path: path.into(),
            value: None,
        }
    }

    /// Whole-resource operation
    pub fn is_root(&self) -> bool {
        self.path == ROOT
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {} {}", self.op, self.path, value),
            None => write!(f, "{} {}", self.op, self.path),
        }
    }
}

/// Pointer of the whole resource
pub const ROOT: &str = "/";

/// Pointer segment appending to the end of an array
pub const APPEND: &str = "-";

/// Escape one pointer segment (`~` → `~0`, `/` → `~1`)
pub fn escape_segment(segment: &str) -> Cow<'_, str> {
    if segment.contains(['~', '/']) {
        Cow::Owned(segment.replace('~', "~0").replace('/', "~1"))
    } else {
        Cow::Borrowed(segment)
    }
}

/// Join unescaped segments into a pointer; no segments is the root
pub fn format_pointer<S: AsRef<str>>(segments: &[S]) -> String {
    if segments.is_empty() {
        return ROOT.to_string();
    }
    let mut path = String::new();
    for segment in segments {
        path.push('/');
        path.push_str(&escape_segment(segment.as_ref()));
    }
    path
}
