//! Names of the artifacts kept in an owner's job directory.

use serde::{Deserialize, Serialize};

/// One of the (at most three) files in an owner directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Artifact {
    /// JSON array of input records written by the producer.
    Input,
    /// Progress marker, see [`crate::Progress`].
    Progress,
    /// Result rows written by the worker.
    Result,
}

impl Artifact {
    pub const ALL: [Artifact; 3] = [Artifact::Input, Artifact::Progress, Artifact::Result];

    /// File name inside the owner directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Input => "input",
            Artifact::Progress => "progress",
            Artifact::Result => "result",
        }
    }

    /// Side-channel file a write session goes to before it is installed:
    /// `<name>.<session>.tmp`. Every session uses its own name so two
    /// writers of one artifact never share a file.
    pub fn tmp_file_name(self, session: &str) -> String {
        format!("{}.{}.tmp", self.file_name(), session)
    }

    /// Whether `name` is a temporary file of some write session of this
    /// artifact.
    pub fn is_tmp_file_name(self, name: &str) -> bool {
        name.strip_prefix(self.file_name())
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(|rest| rest.strip_suffix(".tmp"))
            .is_some_and(|session| !session.is_empty() && !session.contains('.'))
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}
