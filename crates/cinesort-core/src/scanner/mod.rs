pub mod walk;

pub use walk::{category_roots, discover_videos, DiscoveredFile};
