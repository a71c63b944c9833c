//! Domain types shared by the iLoved marketplace crates.

pub mod conversation;
pub mod currency;
pub mod error;
pub mod identity;
pub mod message;
pub mod product;
pub mod profile;
pub mod report;
pub mod wishlist;

pub use error::ValidationError;
