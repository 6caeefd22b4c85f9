//! Page-level incremental backup and restore core for databases whose
//! heap is a fixed-size block store.
//!
//! This crate owns the part of a physical backup tool that is hard to get
//! right: validating a page's structural and checksum invariants,
//! deciding which blocks an incremental backup needs to transmit,
//! compressing and framing those blocks into a compact per-file stream,
//! and replaying a chain of such streams back into a restored file.
//!
//! It does not discover which files exist, does not talk to the engine's
//! catalog, and does not parse a command line; those are the embedder's
//! job. See [`core`] for the module layout.
//!
//! ## Quick example
//!
//! ```no_run
//! use pagebackup_core::core::cancel::CancelToken;
//! use pagebackup_core::core::change_tracker::NullChangeTracker;
//! use pagebackup_core::core::codec::CompressAlg;
//! use pagebackup_core::core::file_record::{FileRecord, RelFileId};
//! use pagebackup_core::core::reader::BackupMode;
//! use pagebackup_core::core::writer::{backup_data_file, BackupOptions};
//!
//! let rel = RelFileId { db_oid: 1, tablespace_oid: 1, relation_oid: 16384, segment_no: 0 };
//! let mut file = FileRecord::new(rel, 0);
//! let cancel = CancelToken::new();
//! let tracker = NullChangeTracker;
//! let opts = BackupOptions {
//!     mode: BackupMode::Full,
//!     strict: true,
//!     prev_start_lsn: 0,
//!     checksums_enabled: true,
//!     tracker_version: 2,
//!     missing_ok: true,
//!     compress_alg: CompressAlg::None,
//!     compress_level: 1,
//!     producer_version: 20030,
//!     change_tracker: &tracker,
//!     cancel: &cancel,
//! };
//! backup_data_file("/path/to/16384", "/path/to/out/16384", &mut file, &opts).unwrap();
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`core::page`] | Page header parsing and structural invariants |
//! | [`core::checksum`] | Per-page checksum computation |
//! | [`core::validator`] | Page classification (valid/zeroed/corrupt/future-LSN) |
//! | [`core::codec`] | Per-block compression (LZ4, zlib) |
//! | [`core::pagemap`] | Changed-block bitmap and ordered iteration |
//! | [`core::change_tracker`] | The live engine's page-change interface |
//! | [`core::reader`] | Torn-read-tolerant block reads |
//! | [`core::framer`] | The binary backup stream frame format |
//! | [`core::file_record`] | Per-file bookkeeping carried across a pass |
//! | [`core::writer`] | Per-file backup orchestration |
//! | [`core::restore`] | Chain-replay restore |
//! | [`core::backup_validator`] | Write-free backup stream validation |
//! | [`core::nondata`] | Non-data file copy with mtime+CRC dedup |
//! | [`core::remote`] | The remote page-transport result contract |
//! | [`core::cancel`] | Cooperative cancellation token |

pub mod core;
pub mod error;

pub use error::{CoreError, Result};
