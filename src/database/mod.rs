/*!
 * SQLite persistence for chapters and their paragraphs.
 *
 * `ChapterRepository` implements the `ChapterStore` contract, so the
 * chapter service runs unchanged against memory or disk.
 */

pub mod connection;
pub mod models;
pub mod repository;
pub mod schema;

// Re-export main types
pub use connection::{DatabaseConnection, DatabaseStats};
pub use repository::ChapterRepository;
