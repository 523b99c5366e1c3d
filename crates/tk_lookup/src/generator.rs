//! The closed set of lookup table generators.
//!
//! Every generator consumes the same list of version roots, builds a private
//! consolidated model, and encodes that model into one binary per tag. The
//! trait is sealed: the four generators of this crate are the only
//! implementors.

use crate::error::{Error, Result};
use camino::Utf8PathBuf;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// A lookup table generator.
pub trait Generator: sealed::Sealed + Send {
    /// Names one binary output of the generator.
    type Tag: Copy + fmt::Display + Send + Sync + 'static;

    /// The serializable view written to the debug JSON snapshot.
    type Snapshot<'a>: Serialize
    where
        Self: 'a;

    /// Generator name, used in logs and the debug snapshot file name.
    const NAME: &'static str;

    /// Output file name template; `{tag}` is replaced by the tag.
    const FILE_NAME: &'static str;

    /// Whether binaries are written through the compressor by default.
    const COMPRESSED: bool = false;

    /// Tags written by this generator, in output order.
    const TAGS: &'static [Self::Tag];

    /// Output file name for `tag`, before any compression suffix.
    fn file_name(tag: Self::Tag) -> String {
        Self::FILE_NAME.replace("{tag}", &tag.to_string())
    }

    /// Consolidate every version root into the in-memory model.
    ///
    /// Roots are processed one after another; work inside one root may fan
    /// out across threads.
    fn generate(&mut self, roots: &[Utf8PathBuf], cancel: &CancellationToken) -> Result<()>;

    /// The debug view of the consolidated model.
    fn snapshot(&self) -> Self::Snapshot<'_>;

    /// Encode the consolidated model for `tag`.
    fn write_binary<W: Write>(&self, out: &mut W, tag: Self::Tag) -> Result<()>;
}

/// Tag of generators that write a single binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SingleTag(pub &'static str);

impl fmt::Display for SingleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Best-effort cancellation shared between the orchestrator and generators.
///
/// Generators check the token between version roots and between the
/// directories of a walk; work already in flight is not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Returns [`Error::Cancelled`] once [`cancel`](Self::cancel) was called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());

        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }
}
