//! Value types shared by every Palisade crate.

mod entry;
mod identity;
mod proptests;
mod sid;

pub use entry::AccessControlEntry;
pub use identity::ObjectIdentity;
pub use sid::Sid;
