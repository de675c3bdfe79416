//! In-memory catalog state and on-disk image storage.

/// Chunked image uploads, persisted atomically.
pub mod image;

/// Laptop table with copy-on-read lookups and cancellable scans.
pub mod laptop;

/// Per-laptop rating aggregates.
pub mod rating;

pub use image::{ImageStore, StoredImage, UploadSession};
pub use laptop::{canonical_id, LaptopStore, Scan, ScanStep, SearchOutcome};
pub use rating::{Rating, RatingStore};
