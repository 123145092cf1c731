//! Host folder layout (`input/`, `output/`, `temp/`) and path safety checks.

use std::path::{Component, Path, PathBuf};

/// Folder types the host knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderType {
    Input,
    Output,
    Temp,
}

impl FolderType {
    /// Parse a folder type tag; an empty tag means output.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "input" => Some(Self::Input),
            "output" | "" => Some(Self::Output),
            "temp" => Some(Self::Temp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostFolders {
    input: PathBuf,
    output: PathBuf,
    temp: PathBuf,
}

impl HostFolders {
    /// Standard layout below `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            input: base.join("input"),
            output: base.join("output"),
            temp: base.join("temp"),
        }
    }

    pub fn directory(&self, folder: FolderType) -> &Path {
        match folder {
            FolderType::Input => &self.input,
            FolderType::Output => &self.output,
            FolderType::Temp => &self.temp,
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output
    }

    /// Resolve a host file reference such as `"cat.png [output]"`.
    ///
    /// References without an annotation live in the input folder.
    pub fn annotated_filepath(&self, reference: &str) -> PathBuf {
        let (name, folder) = split_annotation(reference);
        self.directory(folder.unwrap_or(FolderType::Input)).join(name)
    }
}

/// Split a trailing ` [output]`/` [input]`/` [temp]` annotation off a file name.
pub fn split_annotation(reference: &str) -> (&str, Option<FolderType>) {
    for (suffix, folder) in [
        (" [output]", FolderType::Output),
        (" [input]", FolderType::Input),
        (" [temp]", FolderType::Temp),
    ] {
        if let Some(name) = reference.strip_suffix(suffix) {
            return (name, Some(folder));
        }
    }
    (reference, None)
}

/// Normalize `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `candidate` stays inside `root` after lexical normalization.
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    normalize_lexically(candidate).starts_with(normalize_lexically(root))
}
