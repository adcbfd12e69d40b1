/*
    Cell subsystem - Observable state owned by sync units

    - observable: read / write / subscribe
    - path: deep update of nested values for structured units
*/

pub mod observable;
pub mod path;

pub use observable::{Observable, Subscription};
pub use path::{shallow_merge, update_at_path, value_at_path, PathError, PathSegment};
