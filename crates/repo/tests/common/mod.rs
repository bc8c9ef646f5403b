pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{content_record, pack_id, repository_with_contents};
#[allow(unused_imports)]
pub use mocks::{FailingListingBackend, StaticContentReader};
