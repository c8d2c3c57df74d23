//! MiniDB v1: a minimal single-file record store. Persists fixed-size
//! 128-byte records inside a file organized as an array of fixed-size
//! 4096-byte pages, chained into linear per-table page lists.
//!
//! Three layers, leaves first:
//!   - [`pager`]: opens and validates the file header; reads, writes, and
//!     appends whole pages.
//!   - [`leaf`]: pure in-memory codec for a single leaf page's header,
//!     occupancy bitmap, and packed records.
//!   - [`table`]: composes the two into the logical table API — create,
//!     insert, get, update, delete, scan, validate-all — walking page
//!     chains and allocating new pages as needed.
//!
//! [`projection`] is a separate, optional consumer of the scan interface
//! that interprets record bytes through a user-supplied field schema; it
//! has no knowledge of the on-disk format.

pub mod leaf;
pub mod pager;
pub mod projection;
pub mod table;
