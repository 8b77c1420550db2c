//! Runtime support for code compiled with encoded class ids.
//! Every object carries the Cid of its dynamic class; a type test is a
//! single remainder operation.

pub mod type_tag;

pub use type_tag::{checked_cast, is_instance, Tagged, TypeTag};
