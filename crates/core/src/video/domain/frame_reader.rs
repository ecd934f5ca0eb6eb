use std::path::{Path, PathBuf};

use crate::shared::error::Result;
use crate::shared::frame::Frame;

/// What an opened source holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    pub source_path: PathBuf,
    pub frame_count: usize,
    /// Dimensions of the first frame; later frames may differ.
    pub width: u32,
    pub height: u32,
}

/// Produces frames for the engine from a file-system source.
pub trait FrameReader: Send {
    fn open(&mut self, path: &Path) -> Result<SourceInfo>;

    /// Frames in source order, each tagged with its position.
    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame>> + '_>;

    fn close(&mut self);
}
