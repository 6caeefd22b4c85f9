//! The change-tracking interface consumed by `PTRACK` mode (§6).
//!
//! The engine's live buffer manager is an external collaborator; this
//! crate only specifies the shape of the call and how its result feeds
//! back into [`crate::core::reader::PageReader`].

use crate::error::Result;
use super::constants::BLOCK_SIZE;

/// Identifies a relation block to fetch from the engine's change tracker.
#[derive(Debug, Clone, Copy)]
pub struct BlockRef {
    pub db_oid: u32,
    pub tablespace_oid: u32,
    pub relation_oid: u32,
    pub block_no: u32,
}

/// A page fetched from the live engine, or `None` meaning the block was
/// truncated away between the file-level read and the tracker call.
pub type TrackedPage = Option<[u8; BLOCK_SIZE]>;

/// Consumed by `PTRACK`-mode backups. Implementations talk to the engine
/// over whatever RPC the deployment uses; failure of the call itself is
/// always fatal (§4.3).
pub trait ChangeTracker {
    fn get_block(&self, block: BlockRef, tracker_version: u32) -> Result<TrackedPage>;
}

/// A tracker that never has anything to report; used by backup modes that
/// do not consult the change tracker, and in tests exercising non-PTRACK
/// paths.
pub struct NullChangeTracker;

impl ChangeTracker for NullChangeTracker {
    fn get_block(&self, _block: BlockRef, _tracker_version: u32) -> Result<TrackedPage> {
        Ok(None)
    }
}
