/*!
 * Chapters and their translation lifecycle.
 *
 * - `models`: Chapter record, status and partial updates
 * - `store`: Storage contract and an in-memory store
 * - `service`: Import, translation runs, cancellation and review
 */

pub use self::models::{hash_source, Chapter, ChapterStatus, ChapterUpdate};
pub use self::service::{ChapterService, TranslationRequest};
pub use self::store::{ChapterStore, InMemoryChapterStore};

pub mod models;
pub mod service;
pub mod store;
