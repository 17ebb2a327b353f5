//! Page fetching, price extraction, and the items being tracked.

pub mod client;
pub mod item;
pub mod selector;
pub mod tweak;

pub use client::{HttpFetcher, PageFetch};
pub use item::{GroupSpec, Item, ItemGroup, ItemSpec};
pub use selector::PriceSelector;
pub use tweak::SpecialTweak;
