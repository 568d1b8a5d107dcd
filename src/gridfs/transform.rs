//! Per-chunk transform hook, generalizing the global process-wide function
//! pointers `setBufferProcessingProcs`/`defaultPreProcessChunk`/
//! `defaultPostProcessChunk` installed in `original_source/src/gridfs.c`
//! into a per-[`crate::gridfs::GridStore`] configuration object, the way a
//! Rust library prefers an injected trait object over mutable global state.

use std::borrow::Cow;

/// Transforms chunk bytes on the way into and out of storage, e.g. for
/// compression. The default is the identity transform: when output equals
/// input, no copy happens (`Cow::Borrowed`), matching the original's
/// contract that a pass-through pre/post process function performs no
/// extra allocation.
pub trait ChunkTransform: Send + Sync {
    fn pre_process<'a>(&self, data: &'a [u8]) -> Cow<'a, [u8]>;
    fn post_process<'a>(&self, data: &'a [u8]) -> Cow<'a, [u8]>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransform;

impl ChunkTransform for IdentityTransform {
    fn pre_process<'a>(&self, data: &'a [u8]) -> Cow<'a, [u8]> {
        Cow::Borrowed(data)
    }

    fn post_process<'a>(&self, data: &'a [u8]) -> Cow<'a, [u8]> {
        Cow::Borrowed(data)
    }
}
